//! Re-flow of optional label/value rows.
//!
//! A band of line items is authored with a fixed number of rows. When some of them
//! resolve to nothing, the remaining rows are moved up so the list reads without
//! blank gaps.

use crate::config::RowBandConfig;
use crate::descriptor::{LayoutElement, RowRole};
use crate::types::{Pt, Rect};

/// A layout element together with its resolved display text.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedElement {
    pub element: LayoutElement,
    pub text: String,
}

impl ResolvedElement {
    pub fn new(element: LayoutElement, text: impl Into<String>) -> Self {
        Self {
            element,
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn bbox(&self) -> Rect {
        self.element.bbox
    }

    fn shift_y(&mut self, dy: Pt) {
        self.element.bbox = self.element.bbox.translated_y(dy);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowPair {
    pub label: ResolvedElement,
    pub value: ResolvedElement,
}

impl RowPair {
    pub fn top(&self) -> Pt {
        self.label.bbox().y.min(self.value.bbox().y)
    }

    pub fn bottom(&self) -> Pt {
        self.label.bbox().bottom().max(self.value.bbox().bottom())
    }

    pub fn height(&self) -> Pt {
        self.bottom() - self.top()
    }

    /// A pair is dropped only when both sides resolve to nothing.
    pub fn is_empty(&self) -> bool {
        self.label.is_blank() && self.value.is_blank()
    }

    fn shift_y(&mut self, dy: Pt) {
        self.label.shift_y(dy);
        self.value.shift_y(dy);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowBand {
    pub y_min: Pt,
    pub y_max: Pt,
    pub value_column_x: Pt,
    pub min_gap: Pt,
    pub max_gap: Pt,
}

impl RowBand {
    pub fn new(y_min: f32, y_max: f32, value_column_x: f32) -> Self {
        Self {
            y_min: Pt::from_f32(y_min),
            y_max: Pt::from_f32(y_max),
            value_column_x: Pt::from_f32(value_column_x),
            min_gap: Pt::from_f32(2.0),
            max_gap: Pt::from_f32(30.0),
        }
    }

    pub fn with_gap_range(mut self, min_gap: f32, max_gap: f32) -> Self {
        self.min_gap = Pt::from_f32(min_gap);
        self.max_gap = Pt::from_f32(max_gap);
        self
    }

    /// Membership is decided by the vertical center of the box.
    pub fn contains(&self, bbox: &Rect) -> bool {
        let center = bbox.center_y();
        center >= self.y_min && center <= self.y_max
    }

    pub fn role_of(&self, element: &LayoutElement) -> RowRole {
        match element.row {
            Some(role) => role,
            None if element.bbox.x < self.value_column_x => RowRole::Label,
            None => RowRole::Value,
        }
    }
}

impl From<&RowBandConfig> for RowBand {
    fn from(config: &RowBandConfig) -> Self {
        RowBand::new(config.y_min, config.y_max, config.value_column_x)
            .with_gap_range(config.min_gap, config.max_gap)
    }
}

/// Pairs in-band labels with the closest value (by vertical center) in
/// top-to-bottom order. Returns index pairs into `elements`.
fn pair_indices(elements: &[ResolvedElement], band: &RowBand) -> Vec<(usize, usize)> {
    let mut labels: Vec<usize> = Vec::new();
    let mut values: Vec<usize> = Vec::new();
    for (idx, resolved) in elements.iter().enumerate() {
        if !band.contains(&resolved.bbox()) {
            continue;
        }
        match band.role_of(&resolved.element) {
            RowRole::Label => labels.push(idx),
            RowRole::Value => values.push(idx),
        }
    }
    let center = |idx: usize| elements[idx].bbox().center_y();
    labels.sort_by(|a, b| center(*a).partial_cmp(&center(*b)).unwrap_or(std::cmp::Ordering::Equal));

    let mut used = vec![false; values.len()];
    let mut pairs = Vec::new();
    for label in labels {
        let label_box = elements[label].bbox();
        let best = values
            .iter()
            .enumerate()
            .filter(|(slot, _)| !used[*slot])
            .map(|(slot, value)| (slot, *value, (center(*value) - center(label)).abs()))
            .filter(|(_, value, distance)| {
                *distance <= label_box.height.max(elements[*value].bbox().height)
            })
            .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((slot, value, _)) = best {
            used[slot] = true;
            pairs.push((label, value));
        }
    }
    pairs
}

/// Vertical extent of one re-flow unit: a label/value pair or a lone in-band element.
#[derive(Debug, Clone, Copy)]
struct Slot {
    top: Pt,
    bottom: Pt,
    removable: bool,
}

impl Slot {
    fn of_pair(pair: &RowPair) -> Self {
        Self::spanning(&pair.label, &pair.value)
    }

    fn spanning(label: &ResolvedElement, value: &ResolvedElement) -> Self {
        Self {
            top: label.bbox().y.min(value.bbox().y),
            bottom: label.bbox().bottom().max(value.bbox().bottom()),
            removable: label.is_blank() && value.is_blank(),
        }
    }

    fn of_element(resolved: &ResolvedElement) -> Self {
        let bbox = resolved.bbox();
        Self {
            top: bbox.y,
            bottom: bbox.bottom(),
            removable: false,
        }
    }

    fn height(&self) -> Pt {
        self.bottom - self.top
    }
}

/// Mean gap between consecutive slots, clamped to the band's gap range.
fn derived_gap(slots: &[Slot], band: &RowBand) -> Pt {
    if slots.len() < 2 {
        return band.min_gap;
    }
    let total: Pt = slots.windows(2).map(|w| w[1].top - w[0].bottom).sum();
    let mean = total.mul_ratio(1, (slots.len() - 1) as i32);
    mean.max(band.min_gap).min(band.max_gap)
}

/// Vertical shift for every slot (sorted top to bottom), `None` for removed ones.
fn relayout(slots: &[Slot], band: &RowBand) -> Vec<Option<Pt>> {
    let Some(first) = slots.first() else {
        return Vec::new();
    };
    let gap = derived_gap(slots, band);
    let mut cursor = first.top;
    slots
        .iter()
        .map(|slot| {
            if slot.removable {
                return None;
            }
            let dy = cursor - slot.top;
            cursor += slot.height() + gap;
            Some(dy)
        })
        .collect()
}

/// Drops empty pairs and closes the gaps they leave, top to bottom.
pub fn compact(mut pairs: Vec<RowPair>, band: &RowBand) -> Vec<RowPair> {
    pairs.sort_by(|a, b| a.top().partial_cmp(&b.top()).unwrap_or(std::cmp::Ordering::Equal));
    let slots: Vec<Slot> = pairs.iter().map(Slot::of_pair).collect();
    let shifts = relayout(&slots, band);
    pairs
        .into_iter()
        .zip(shifts)
        .filter_map(|(mut pair, shift)| {
            let dy = shift?;
            pair.shift_y(dy);
            Some(pair)
        })
        .collect()
}

/// Compacts the rows inside `band`. Paired rows may be removed; unpaired in-band
/// elements (headings, notes) move with the flow but are never removed. Elements
/// outside the band are untouched and the original element order is kept.
pub fn compact_elements(elements: Vec<ResolvedElement>, band: &RowBand) -> Vec<ResolvedElement> {
    let index_pairs = pair_indices(&elements, band);
    if index_pairs.is_empty() {
        return elements;
    }
    let mut paired = vec![false; elements.len()];
    let mut units: Vec<(Vec<usize>, Slot)> = Vec::new();
    for (label, value) in &index_pairs {
        paired[*label] = true;
        paired[*value] = true;
        let slot = Slot::spanning(&elements[*label], &elements[*value]);
        units.push((vec![*label, *value], slot));
    }
    for (idx, resolved) in elements.iter().enumerate() {
        if !paired[idx] && band.contains(&resolved.bbox()) {
            units.push((vec![idx], Slot::of_element(resolved)));
        }
    }
    units.sort_by(|a, b| a.1.top.partial_cmp(&b.1.top).unwrap_or(std::cmp::Ordering::Equal));
    let slots: Vec<Slot> = units.iter().map(|(_, slot)| *slot).collect();
    let shifts = relayout(&slots, band);

    // Per element: Some(dy) to move, None to drop; elements outside the band are untouched.
    let mut plan: Vec<Option<Option<Pt>>> = vec![None; elements.len()];
    for ((members, _), shift) in units.iter().zip(shifts) {
        for idx in members {
            plan[*idx] = Some(shift);
        }
    }

    let before = elements.len();
    let out: Vec<ResolvedElement> = elements
        .into_iter()
        .zip(plan)
        .filter_map(|(mut resolved, action)| match action {
            None => Some(resolved),
            Some(None) => None,
            Some(Some(dy)) => {
                resolved.shift_y(dy);
                Some(resolved)
            }
        })
        .collect();
    log::debug!(
        "row compaction kept {} of {} elements in band {}..{}",
        out.len(),
        before,
        band.y_min.to_f32(),
        band.y_max.to_f32()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(text: &str, x: f32, y: f32) -> ResolvedElement {
        ResolvedElement::new(
            LayoutElement::new(text, Rect::new(x, y, 120.0, 12.0)),
            text,
        )
    }

    fn line_items(blank: &[usize]) -> Vec<ResolvedElement> {
        let mut out = Vec::new();
        for row in 0..10 {
            let y = 300.0 + row as f32 * 20.0;
            let (label, value) = if blank.contains(&row) {
                (String::new(), String::new())
            } else {
                (format!("Item {row}"), format!("{row} pcs"))
            };
            out.push(resolved(&label, 50.0, y));
            out.push(resolved(&value, 400.0, y));
        }
        out
    }

    fn band() -> RowBand {
        RowBand::new(290.0, 500.0, 300.0)
    }

    #[test]
    fn dropped_rows_close_up_without_gaps() {
        let out = compact_elements(line_items(&[3, 6, 9]), &band());
        assert_eq!(out.len(), 14);
        let label_tops: Vec<i64> = out
            .iter()
            .filter(|r| r.element.bbox.x < Pt::from_i32(300))
            .map(|r| r.element.bbox.y.to_milli_i64())
            .collect();
        let expected: Vec<i64> = (0..7).map(|k| (300 + k * 20) * 1000).collect();
        assert_eq!(label_tops, expected);
        let texts: Vec<&str> = out.iter().map(|r| r.text.as_str()).step_by(2).collect();
        assert_eq!(
            texts,
            vec!["Item 0", "Item 1", "Item 2", "Item 4", "Item 5", "Item 7", "Item 8"]
        );
    }

    #[test]
    fn pair_with_one_side_present_is_kept() {
        let mut items = line_items(&[]);
        items[4].text.clear();
        let out = compact_elements(items, &band());
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn elements_outside_band_are_untouched() {
        let mut items = line_items(&[0, 1]);
        let header = resolved("Your components", 50.0, 100.0);
        let footer = resolved("Thank you", 50.0, 700.0);
        items.insert(0, header.clone());
        items.push(footer.clone());
        let out = compact_elements(items, &band());
        assert_eq!(out.first(), Some(&header));
        assert_eq!(out.last(), Some(&footer));
        assert_eq!(out[1].element.bbox.y.to_milli_i64(), 300_000);
        assert_eq!(out[1].text, "Item 2");
    }

    #[test]
    fn lone_heading_moves_with_the_rows() {
        let mut items = vec![
            resolved("", 50.0, 300.0),
            resolved("", 400.0, 300.0),
            resolved("Optional extras", 50.0, 320.0),
        ];
        items.push(resolved("Item A", 50.0, 340.0));
        items.push(resolved("1 pcs", 400.0, 340.0));
        items.push(resolved("Item B", 50.0, 360.0));
        items.push(resolved("2 pcs", 400.0, 360.0));
        let out = compact_elements(items, &band());
        assert_eq!(out.len(), 5);
        let tops: Vec<(&str, i64)> = out
            .iter()
            .map(|r| (r.text.as_str(), r.element.bbox.y.to_milli_i64()))
            .collect();
        assert_eq!(
            tops,
            vec![
                ("Optional extras", 300_000),
                ("Item A", 320_000),
                ("1 pcs", 320_000),
                ("Item B", 340_000),
                ("2 pcs", 340_000),
            ]
        );
        for (i, a) in out.iter().enumerate() {
            for b in out.iter().skip(i + 1) {
                let (ra, rb) = (a.element.bbox, b.element.bbox);
                let overlaps_x = ra.x < rb.right() && rb.x < ra.right();
                let overlaps_y = ra.y < rb.bottom() && rb.y < ra.bottom();
                assert!(!(overlaps_x && overlaps_y), "{} overlaps {}", a.text, b.text);
            }
        }
    }

    #[test]
    fn gap_is_clamped_to_range() {
        let mut items = Vec::new();
        for row in 0..3 {
            let y = 300.0 + row as f32 * 80.0;
            items.push(resolved("Label", 50.0, y));
            items.push(resolved("Value", 400.0, y));
        }
        items[2].text.clear();
        items[3].text.clear();
        let out = compact_elements(items, &RowBand::new(290.0, 520.0, 300.0));
        assert_eq!(out.len(), 4);
        // Observed gap 68 clamps to 30: next row starts at 300 + 12 + 30.
        assert_eq!(out[2].element.bbox.y.to_milli_i64(), 342_000);
    }

    #[test]
    fn explicit_row_tag_overrides_column() {
        let band = band();
        let element = LayoutElement::new("x", Rect::new(450.0, 300.0, 50.0, 12.0))
            .with_row(RowRole::Label);
        assert_eq!(band.role_of(&element), RowRole::Label);
        let untagged = LayoutElement::new("x", Rect::new(450.0, 300.0, 50.0, 12.0));
        assert_eq!(band.role_of(&untagged), RowRole::Value);
    }

    #[test]
    fn compact_pairs_preserves_order() {
        let pairs: Vec<RowPair> = (0..4)
            .map(|row| {
                let y = 300.0 + row as f32 * 20.0;
                let text = if row == 1 { "" } else { "x" };
                RowPair {
                    label: resolved(text, 50.0, y),
                    value: resolved(text, 400.0, y),
                }
            })
            .collect();
        let out = compact(pairs, &band());
        assert_eq!(out.len(), 3);
        assert!(out.windows(2).all(|w| w[0].bottom() <= w[1].top()));
        assert_eq!(out[1].top().to_milli_i64(), 320_000);
    }
}
