//! Layout descriptor parsing.
//!
//! A descriptor is page-scoped text made of entries separated by lines of three or
//! more `-` or `=` characters:
//!
//! ```text
//! Text: Acme Solar GmbH
//! Position: (72.0, 101.5, 240.0, 113.5)
//! Font: Arial-BoldMT
//! FontSize: 11,5
//! Color: #1F3A5F
//! ---
//! Id: offer_total
//! Sample: 12.345,00 EUR
//! Position: (400, 700, 540, 712)
//! Align: right
//! ```
//!
//! Each entry yields zero or one [`LayoutElement`]. Malformed entries are dropped
//! and never reach rendering.

use crate::error::OfferStampError;
use crate::types::{Color, Pt, Rect};
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_FONT_SIZE: f32 = 10.0;
pub const DEFAULT_FONT_NAME: &str = "Helvetica";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
    Center,
}

impl Align {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Align::Left),
            "right" => Some(Align::Right),
            "center" | "centre" => Some(Align::Center),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Text,
    FooterPageNumber,
    SectionTitle,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Role::Text),
            "footer-page-number" | "page-number" => Some(Role::FooterPageNumber),
            "section-title" | "title" => Some(Role::SectionTitle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRole {
    Label,
    Value,
}

impl RowRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "label" => Some(RowRole::Label),
            "value" => Some(RowRole::Value),
            _ => None,
        }
    }
}

/// One static text slot on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutElement {
    /// Text the slot was authored with. Legacy descriptors use it as the lookup key.
    pub sample_text: String,
    /// Explicit symbolic key (`Id:`); takes precedence over the sample text.
    pub key: Option<String>,
    pub bbox: Rect,
    pub font_name: String,
    pub font_size: Pt,
    pub color: Color,
    pub align: Option<Align>,
    pub role: Option<Role>,
    pub row: Option<RowRole>,
    pub category: Option<String>,
}

impl LayoutElement {
    pub fn new(sample_text: impl Into<String>, bbox: Rect) -> Self {
        Self {
            sample_text: sample_text.into(),
            key: None,
            bbox,
            font_name: DEFAULT_FONT_NAME.to_string(),
            font_size: Pt::from_f32(DEFAULT_FONT_SIZE),
            color: Color::BLACK,
            align: None,
            role: None,
            row: None,
            category: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = Some(align);
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_row(mut self, row: RowRole) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Ordered elements of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub elements: Vec<LayoutElement>,
}

impl PageLayout {
    pub fn new(elements: Vec<LayoutElement>) -> Self {
        Self { elements }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}

fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:-{3,}|={3,})\s*$").expect("separator regex must compile"))
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:[.,]\d+)?").expect("number regex must compile"))
}

fn period_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number regex must compile"))
}

fn comma_decimal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+,\d+").expect("number regex must compile"))
}

/// First number in `raw`, accepting a comma as decimal separator.
pub fn parse_number(raw: &str) -> Option<f32> {
    let found = number_regex().find(raw)?;
    let value = found.as_str().replace(',', ".").parse::<f32>().ok()?;
    value.is_finite().then_some(value)
}

/// Parses `(x0,y0,x1,y1)`. Commas are ambiguous between field and decimal
/// separators, so three readings are tried: period decimals, `;`-separated
/// fields, then comma decimals.
pub fn parse_position(raw: &str) -> Option<[f32; 4]> {
    let period: Vec<f32> = period_number_regex()
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse::<f32>().ok())
        .collect();
    if period.len() == 4 {
        return to_box(&period);
    }
    if raw.contains(';') {
        let fields: Vec<f32> = raw
            .split(';')
            .filter_map(parse_number)
            .collect();
        if fields.len() == 4 {
            return to_box(&fields);
        }
    }
    let comma: Vec<f32> = comma_decimal_regex()
        .find_iter(raw)
        .filter_map(|m| m.as_str().replace(',', ".").parse::<f32>().ok())
        .collect();
    if comma.len() == 4 {
        return to_box(&comma);
    }
    None
}

fn to_box(values: &[f32]) -> Option<[f32; 4]> {
    let [x0, y0, x1, y1] = [values[0], values[1], values[2], values[3]];
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) || x1 < x0 || y1 < y0 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

fn split_entries(source: &str) -> Vec<Vec<&str>> {
    let mut entries: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in source.lines() {
        if separator_regex().is_match(line) {
            if !current.is_empty() {
                entries.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        entries.push(current);
    }
    entries
}

fn parse_entry(lines: &[&str]) -> Result<LayoutElement, OfferStampError> {
    let mut text: Option<String> = None;
    let mut sample: Option<String> = None;
    let mut key: Option<String> = None;
    let mut position: Option<&str> = None;
    let mut font_name: Option<String> = None;
    let mut font_size = DEFAULT_FONT_SIZE;
    let mut color = Color::BLACK;
    let mut align = None;
    let mut role = None;
    let mut row = None;
    let mut category = None;

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        // Text values keep inner whitespace; only the single space after the colon goes.
        let raw_value = value.strip_prefix(' ').unwrap_or(value);
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "text" => text = Some(raw_value.trim_end().to_string()),
            "sample" => sample = Some(raw_value.trim_end().to_string()),
            "id" if !value.is_empty() => key = Some(value.to_string()),
            "position" => position = Some(value),
            "font" if !value.is_empty() => font_name = Some(value.to_string()),
            "fontsize" | "font_size" | "font size" => {
                font_size = parse_number(value)
                    .filter(|v| *v > 0.0)
                    .unwrap_or(DEFAULT_FONT_SIZE);
            }
            "color" | "colour" => color = Color::parse(value).unwrap_or(Color::BLACK),
            "align" => align = Align::parse(value),
            "role" => role = Role::parse(value),
            "row" => row = RowRole::parse(value),
            "category" if !value.is_empty() => category = Some(value.to_string()),
            _ => {}
        }
    }

    let Some(position) = position else {
        return Err(OfferStampError::Malformed(
            "entry has no Position field".to_string(),
        ));
    };
    let Some([x0, y0, x1, y1]) = parse_position(position) else {
        return Err(OfferStampError::Malformed(format!(
            "unparsable Position: {}",
            position
        )));
    };
    let sample_text = text.or(sample).unwrap_or_default();
    if sample_text.is_empty() && key.is_none() {
        return Err(OfferStampError::Malformed(
            "entry has neither Text nor Id".to_string(),
        ));
    }

    Ok(LayoutElement {
        sample_text,
        key,
        bbox: Rect::from_corners(x0, y0, x1, y1),
        font_name: font_name.unwrap_or_else(|| DEFAULT_FONT_NAME.to_string()),
        font_size: Pt::from_f32(font_size),
        color,
        align,
        role,
        row,
        category,
    })
}

/// Per-entry results, in source order.
pub fn parse_entries(source: &str) -> Vec<Result<LayoutElement, OfferStampError>> {
    split_entries(source)
        .iter()
        .map(|lines| parse_entry(lines))
        .collect()
}

/// Parses a descriptor, dropping malformed entries. Empty input yields an empty layout.
pub fn parse_descriptor(source: &str) -> PageLayout {
    parse_descriptor_counting(source).0
}

/// Like [`parse_descriptor`] but also returns how many entries were dropped.
pub fn parse_descriptor_counting(source: &str) -> (PageLayout, usize) {
    let mut elements = Vec::new();
    let mut dropped = 0usize;
    for result in parse_entries(source) {
        match result {
            Ok(element) => elements.push(element),
            Err(err) => {
                dropped += 1;
                log::debug!("dropping descriptor entry: {}", err);
            }
        }
    }
    (PageLayout::new(elements), dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Text: Acme Solar GmbH
Position: (72.0, 101.5, 240.0, 113.5)
Font: Arial-BoldMT
FontSize: 11,5
Color: #1F3A5F
---
Id: offer_total
Sample: 12.345,00 EUR
Position: (400, 700, 540, 712)
Align: right
-----
Text: broken
Position: (1, 2, 3)
=====
Text: 3
Position: (540,5; 800,0; 560,0; 812,0)
Color: 8421504
Role: footer-page-number
";

    #[test]
    fn parses_fields_and_drops_malformed_entries() {
        let (layout, dropped) = parse_descriptor_counting(SAMPLE);
        assert_eq!(dropped, 1);
        assert_eq!(layout.len(), 3);

        let first = &layout.elements[0];
        assert_eq!(first.sample_text, "Acme Solar GmbH");
        assert_eq!(first.font_name, "Arial-BoldMT");
        assert_eq!(first.font_size.to_milli_i64(), 11500);
        assert_eq!(first.color.to_packed(), 0x1F3A5F);
        assert_eq!(first.bbox.y.to_milli_i64(), 101500);

        let second = &layout.elements[1];
        assert_eq!(second.key.as_deref(), Some("offer_total"));
        assert_eq!(second.sample_text, "12.345,00 EUR");
        assert_eq!(second.align, Some(Align::Right));

        let third = &layout.elements[2];
        assert_eq!(third.bbox.x.to_milli_i64(), 540500);
        assert_eq!(third.color.to_packed(), 8421504);
        assert_eq!(third.role, Some(Role::FooterPageNumber));
    }

    #[test]
    fn bad_font_size_falls_back_instead_of_dropping() {
        let layout = parse_descriptor("Text: Hi\nPosition: (1,1,5,5)\nFontSize: large\n");
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.elements[0].font_size.to_milli_i64(), 10000);
    }

    #[test]
    fn empty_source_is_empty_layout() {
        assert!(parse_descriptor("").is_empty());
        assert!(parse_descriptor("\n---\n\n").is_empty());
    }

    #[test]
    fn position_accepts_comma_decimals() {
        assert_eq!(
            parse_position("(72,0, 100,5, 200,25, 112,0)"),
            Some([72.0, 100.5, 200.25, 112.0])
        );
        assert_eq!(parse_position("(10, 20, 30, 40)"), Some([10.0, 20.0, 30.0, 40.0]));
        assert_eq!(parse_position("(30, 20, 10, 40)"), None);
    }

    #[test]
    fn entry_errors_are_tagged() {
        let results = parse_entries("Text: no box\n---\nPosition: (1,1,2,2)\n");
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(OfferStampError::Malformed(_))));
        assert!(matches!(results[1], Err(OfferStampError::Malformed(_))));
    }
}
