use crate::error::OfferStampError;
use crate::placeholder::OverrideEntry;
use crate::types::{Color, Pt, Rect, Size};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Box in page points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoxConfig {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoxConfig {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Largest absolute difference of any edge parameter.
    pub fn deviation(&self, other: &BoxConfig) -> f32 {
        [
            self.x - other.x,
            self.y - other.y,
            self.width - other.width,
            self.height - other.height,
        ]
        .into_iter()
        .map(f32::abs)
        .fold(0.0, f32::max)
    }

    fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompanyLogoConfig {
    pub image_key: String,
    pub title_box: BoxConfig,
    pub page_box: BoxConfig,
}

impl Default for CompanyLogoConfig {
    fn default() -> Self {
        Self {
            image_key: "company_logo".to_string(),
            title_box: BoxConfig::new(40.0, 40.0, 160.0, 60.0),
            page_box: BoxConfig::new(455.0, 20.0, 110.0, 36.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogoCategoryConfig {
    pub default_box: BoxConfig,
    pub configured_box: Option<BoxConfig>,
    /// Vertical shift applied after title alignment.
    pub offset: f32,
}

impl Default for LogoCategoryConfig {
    fn default() -> Self {
        Self {
            default_box: BoxConfig::new(400.0, 100.0, 120.0, 40.0),
            configured_box: None,
            offset: 0.0,
        }
    }
}

impl LogoCategoryConfig {
    pub fn effective_box(&self) -> BoxConfig {
        self.configured_box.unwrap_or(self.default_box)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrandLogoConfig {
    pub manual: bool,
    pub align_to_title: bool,
    pub keep_alignment: bool,
    pub tolerance: f32,
    pub min_right_margin: f32,
    pub categories: BTreeMap<String, LogoCategoryConfig>,
}

impl Default for BrandLogoConfig {
    fn default() -> Self {
        Self {
            manual: false,
            align_to_title: true,
            keep_alignment: false,
            tolerance: 2.0,
            min_right_margin: 20.0,
            categories: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Semantic keys always centered in their box.
    pub centered_keys: Vec<String>,
    pub company_name_key: String,
    pub default_company_name: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            centered_keys: Vec::new(),
            company_name_key: "company_name".to_string(),
            default_company_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FooterConfig {
    pub region: BoxConfig,
    pub marker_color: String,
    /// `{page}` and `{pages}` are substituted.
    pub template: String,
}

impl Default for FooterConfig {
    fn default() -> Self {
        Self {
            region: BoxConfig::new(0.0, 780.0, 595.28, 61.89),
            marker_color: "#808080".to_string(),
            template: "Page {page} of {pages}".to_string(),
        }
    }
}

impl FooterConfig {
    pub fn marker(&self) -> Color {
        Color::parse(&self.marker_color).unwrap_or(Color::BLACK)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RowBandConfig {
    pub page: usize,
    pub y_min: f32,
    pub y_max: f32,
    pub value_column_x: f32,
    pub min_gap: f32,
    pub max_gap: f32,
}

impl Default for RowBandConfig {
    fn default() -> Self {
        Self {
            page: 1,
            y_min: 0.0,
            y_max: 0.0,
            value_column_x: 300.0,
            min_gap: 2.0,
            max_gap: 30.0,
        }
    }
}

/// Text style forced onto elements inside a row band.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LineItemStyle {
    pub font_name: Option<String>,
    pub font_size: Option<f32>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WaterfallComponentConfig {
    pub label: String,
    pub value_key: String,
    pub display_key: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_total_label() -> String {
    "Total".to_string()
}

/// Page-specific custom drawing, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawingConfig {
    Ring {
        #[serde(default = "default_page")]
        page: usize,
        center_x: f32,
        center_y: f32,
        outer_radius: f32,
        inner_radius: f32,
        percentage_key: String,
        #[serde(default)]
        foreground: Option<String>,
        #[serde(default)]
        background: Option<String>,
        #[serde(default)]
        hole: Option<String>,
    },
    Waterfall {
        #[serde(default = "default_page")]
        page: usize,
        bounds: BoxConfig,
        components: Vec<WaterfallComponentConfig>,
        #[serde(default)]
        total_key: Option<String>,
        #[serde(default)]
        total_display_key: Option<String>,
        #[serde(default = "default_total_label")]
        total_label: String,
        #[serde(default)]
        font_size: Option<f32>,
    },
    Panel {
        #[serde(default = "default_page")]
        page: usize,
        rect: BoxConfig,
        color: String,
    },
    BrandLogo {
        #[serde(default = "default_page")]
        page: usize,
        category: String,
    },
    ProductImage {
        #[serde(default = "default_page")]
        page: usize,
        rect: BoxConfig,
        image_key: String,
    },
}

impl DrawingConfig {
    pub fn page(&self) -> usize {
        match self {
            DrawingConfig::Ring { page, .. }
            | DrawingConfig::Waterfall { page, .. }
            | DrawingConfig::Panel { page, .. }
            | DrawingConfig::BrandLogo { page, .. }
            | DrawingConfig::ProductImage { page, .. } => *page,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DrawingConfig::Ring { .. } => "ring",
            DrawingConfig::Waterfall { .. } => "waterfall",
            DrawingConfig::Panel { .. } => "panel",
            DrawingConfig::BrandLogo { .. } => "brand_logo",
            DrawingConfig::ProductImage { .. } => "product_image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SecondaryGraphicConfig {
    pub page: usize,
    pub rect: BoxConfig,
}

impl Default for SecondaryGraphicConfig {
    fn default() -> Self {
        Self {
            page: 1,
            rect: BoxConfig::new(40.0, 420.0, 515.0, 300.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub page_width: f32,
    pub page_height: f32,
    pub title_page: usize,
    pub company_logo: CompanyLogoConfig,
    pub brand_logos: BrandLogoConfig,
    pub text: TextConfig,
    pub footer: FooterConfig,
    pub row_bands: Vec<RowBandConfig>,
    pub line_items: LineItemStyle,
    pub drawings: Vec<DrawingConfig>,
    pub overrides: Vec<OverrideEntry>,
    pub secondary_graphic: SecondaryGraphicConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let a4 = Size::a4();
        Self {
            page_width: a4.width.to_f32(),
            page_height: a4.height.to_f32(),
            title_page: 1,
            company_logo: CompanyLogoConfig::default(),
            brand_logos: BrandLogoConfig::default(),
            text: TextConfig::default(),
            footer: FooterConfig::default(),
            row_bands: Vec::new(),
            line_items: LineItemStyle::default(),
            drawings: Vec::new(),
            overrides: Vec::new(),
            secondary_graphic: SecondaryGraphicConfig::default(),
        }
    }
}

impl RenderConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, OfferStampError> {
        let config: RenderConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, OfferStampError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn page_size(&self) -> Size {
        Size::new(self.page_width, self.page_height)
    }

    pub fn page_width(&self) -> Pt {
        Pt::from_f32(self.page_width)
    }

    pub fn row_band_for(&self, page: usize) -> Option<&RowBandConfig> {
        self.row_bands.iter().find(|band| band.page == page)
    }

    pub fn drawings_for(&self, page: usize) -> impl Iterator<Item = &DrawingConfig> {
        self.drawings.iter().filter(move |d| d.page() == page)
    }

    pub fn validate(&self) -> Result<(), OfferStampError> {
        let invalid = |msg: String| Err(OfferStampError::InvalidConfiguration(msg));
        if !(self.page_width > 0.0 && self.page_height > 0.0) {
            return invalid(format!(
                "page size must be positive, got {}x{}",
                self.page_width, self.page_height
            ));
        }
        if self.title_page == 0 {
            return invalid("title_page is 1-based".to_string());
        }
        if Color::parse(&self.footer.marker_color).is_none() {
            return invalid(format!(
                "footer.marker_color is not a color: {}",
                self.footer.marker_color
            ));
        }
        if let Some(raw) = &self.line_items.color {
            if Color::parse(raw).is_none() {
                return invalid(format!("line_items.color is not a color: {raw}"));
            }
        }
        for band in &self.row_bands {
            if band.page == 0 || band.y_min > band.y_max || band.min_gap > band.max_gap {
                return invalid(format!(
                    "row band on page {} is inconsistent (y {}..{}, gap {}..{})",
                    band.page, band.y_min, band.y_max, band.min_gap, band.max_gap
                ));
            }
        }
        for (name, category) in &self.brand_logos.categories {
            let boxes_ok = category.default_box.is_valid()
                && category.configured_box.is_none_or(|b| b.is_valid());
            if !boxes_ok {
                return invalid(format!("logo category '{name}' has an invalid box"));
            }
        }
        for drawing in &self.drawings {
            if drawing.page() == 0 {
                return invalid(format!("{} drawing uses page 0", drawing.kind()));
            }
            let colors: Vec<&String> = match drawing {
                DrawingConfig::Ring {
                    foreground,
                    background,
                    hole,
                    ..
                } => [foreground, background, hole]
                    .into_iter()
                    .flatten()
                    .collect(),
                DrawingConfig::Panel { color, .. } => vec![color],
                _ => Vec::new(),
            };
            if let Some(bad) = colors.into_iter().find(|c| Color::parse(c).is_none()) {
                return invalid(format!("{} drawing color is not a color: {bad}", drawing.kind()));
            }
        }
        Ok(())
    }
}
