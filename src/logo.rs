use crate::config::BrandLogoConfig;
use crate::error::{Diagnostic, DiagnosticKind};
use crate::placeholder::RenderContext;
use crate::types::{Pt, Rect};
use std::collections::HashMap;

/// Legal-form suffixes, longest first so compound forms win over their tails.
const LEGAL_FORM_SUFFIXES: &[&str] = &[
    "gmbh & co. kg",
    "gmbh & co kg",
    "co., ltd.",
    "co., ltd",
    "co. ltd.",
    "co. ltd",
    "gmbh",
    "mbh",
    "ag",
    "kg",
    "se",
    "ltd.",
    "ltd",
    "inc.",
    "inc",
    "llc",
    "corp.",
    "corp",
    "corporation",
    "s.a.",
    "b.v.",
];

/// Generic descriptors stripped after the legal form.
const DESCRIPTOR_SUFFIXES: &[&str] = &[
    "technologies",
    "technology",
    "international",
    "holding",
    "group",
    "energy",
    "solar",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementSource {
    Manual,
    TitleAligned,
    Configured,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogoPlacement {
    pub rect: Rect,
    pub aligned: bool,
    pub source: PlacementSource,
}

/// Per-run brand logo placement. Alignment is decided once when the resolver is
/// built and then holds for every page of the run.
#[derive(Debug, Clone)]
pub struct LogoResolver {
    config: BrandLogoConfig,
    page_width: Pt,
    alignment_enabled: bool,
}

impl LogoResolver {
    /// Returns the resolver plus a diagnostic when title alignment had to be
    /// switched off for this run.
    pub fn new(config: &BrandLogoConfig, page_width: Pt) -> (Self, Option<Diagnostic>) {
        let mut alignment_enabled = config.align_to_title && !config.manual;
        let mut diagnostic = None;
        if alignment_enabled && !config.keep_alignment {
            let deviating: Vec<&str> = config
                .categories
                .iter()
                .filter(|(_, c)| {
                    c.configured_box
                        .is_some_and(|b| b.deviation(&c.default_box) > config.tolerance)
                })
                .map(|(name, _)| name.as_str())
                .collect();
            if !deviating.is_empty() {
                alignment_enabled = false;
                diagnostic = Some(Diagnostic::new(
                    DiagnosticKind::AlignmentDisabled,
                    None,
                    format!(
                        "logo boxes for [{}] deviate from defaults by more than {}pt; title alignment disabled",
                        deviating.join(", "),
                        config.tolerance
                    ),
                ));
            }
        }
        (
            Self {
                config: config.clone(),
                page_width,
                alignment_enabled,
            },
            diagnostic,
        )
    }

    pub fn alignment_enabled(&self) -> bool {
        self.alignment_enabled
    }

    /// Box for the logo of `category`, or `None` when the category is not configured.
    pub fn resolve_position(
        &self,
        category: &str,
        title_y_centers: &HashMap<String, Pt>,
    ) -> Option<LogoPlacement> {
        let entry = self.config.categories.get(category)?;
        let base = entry.effective_box().rect();
        if self.config.manual {
            return Some(LogoPlacement {
                rect: base,
                aligned: false,
                source: PlacementSource::Manual,
            });
        }

        let mut placement = LogoPlacement {
            rect: base,
            aligned: false,
            source: PlacementSource::Configured,
        };
        if self.alignment_enabled {
            if let Some(center) = title_y_centers.get(category) {
                placement.rect.y =
                    *center - base.height.mul_ratio(1, 2) + Pt::from_f32(entry.offset);
                placement.aligned = true;
                placement.source = PlacementSource::TitleAligned;
            }
        }

        let limit = self.page_width - Pt::from_f32(self.config.min_right_margin);
        if placement.rect.right() > limit {
            placement.rect.x = (limit - placement.rect.width).max(Pt::ZERO);
        }
        Some(placement)
    }
}

/// Largest rect with the image's aspect ratio inside `bounds`, left-aligned and
/// vertically centered.
pub fn fit_image(bounds: Rect, pixel_width: u32, pixel_height: u32) -> Rect {
    if pixel_width == 0 || pixel_height == 0 {
        return bounds;
    }
    let bw = bounds.width.to_f32();
    let bh = bounds.height.to_f32();
    let scale = (bw / pixel_width as f32).min(bh / pixel_height as f32);
    let width = Pt::from_f32(pixel_width as f32 * scale);
    let height = Pt::from_f32(pixel_height as f32 * scale);
    Rect {
        x: bounds.x,
        y: bounds.y + (bounds.height - height).mul_ratio(1, 2),
        width,
        height,
    }
}

fn strip_first_suffix(name: &str, table: &[&str]) -> Option<String> {
    table.iter().find_map(|suffix| {
        let head = name.strip_suffix(suffix)?;
        let head = head.strip_suffix(' ')?.trim_end_matches([',', ' ']);
        (!head.is_empty()).then(|| head.to_string())
    })
}

/// Canonical brand key used for `brand/<key>` image lookups.
///
/// One legal-form suffix is removed, then one descriptor suffix; each table is
/// consulted in order and stripping never empties the name.
pub fn normalize_brand(name: &str) -> String {
    let mut current = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if let Some(stripped) = strip_first_suffix(&current, LEGAL_FORM_SUFFIXES) {
        current = stripped;
    }
    if let Some(stripped) = strip_first_suffix(&current, DESCRIPTOR_SUFFIXES) {
        current = stripped;
    }
    current
        .chars()
        .filter_map(|ch| match ch {
            ' ' => Some('_'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

/// Image payload for a category logo: an explicit `logo/<category>` image first,
/// then the normalized brand image.
pub fn brand_logo_payload<'a>(ctx: &'a RenderContext, category: &str) -> Option<&'a str> {
    if let Some(explicit) = ctx.image(&format!("logo/{category}")) {
        return Some(explicit);
    }
    let brand = ctx.brands.get(category)?;
    ctx.image(&format!("brand/{}", normalize_brand(brand)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoxConfig, LogoCategoryConfig};

    fn config() -> BrandLogoConfig {
        let mut config = BrandLogoConfig::default();
        config.categories.insert(
            "inverter".to_string(),
            LogoCategoryConfig {
                default_box: BoxConfig::new(430.0, 200.0, 120.0, 40.0),
                configured_box: None,
                offset: 0.0,
            },
        );
        config
    }

    fn centers(y: f32) -> HashMap<String, Pt> {
        HashMap::from([("inverter".to_string(), Pt::from_f32(y))])
    }

    #[test]
    fn aligns_to_title_center() {
        let (resolver, diag) = LogoResolver::new(&config(), Pt::from_f32(595.28));
        assert!(diag.is_none());
        let placement = resolver
            .resolve_position("inverter", &centers(300.0))
            .expect("placement");
        assert!(placement.aligned);
        assert_eq!(placement.rect.y.to_milli_i64(), 280_000);
    }

    #[test]
    fn deviation_beyond_tolerance_disables_alignment() {
        let mut cfg = config();
        if let Some(entry) = cfg.categories.get_mut("inverter") {
            entry.configured_box = Some(BoxConfig::new(430.0, 260.0, 120.0, 40.0));
        }
        let (resolver, diag) = LogoResolver::new(&cfg, Pt::from_f32(595.28));
        assert_eq!(
            diag.map(|d| d.kind),
            Some(DiagnosticKind::AlignmentDisabled)
        );
        let placement = resolver
            .resolve_position("inverter", &centers(300.0))
            .expect("placement");
        assert!(!placement.aligned);
        assert_eq!(placement.rect.y.to_milli_i64(), 260_000);

        cfg.keep_alignment = true;
        let (resolver, diag) = LogoResolver::new(&cfg, Pt::from_f32(595.28));
        assert!(diag.is_none());
        assert!(resolver.alignment_enabled());
    }

    #[test]
    fn manual_mode_uses_box_verbatim() {
        let mut cfg = config();
        cfg.manual = true;
        if let Some(entry) = cfg.categories.get_mut("inverter") {
            entry.configured_box = Some(BoxConfig::new(560.0, 50.0, 100.0, 30.0));
        }
        let (resolver, _) = LogoResolver::new(&cfg, Pt::from_f32(595.28));
        let placement = resolver
            .resolve_position("inverter", &centers(300.0))
            .expect("placement");
        assert_eq!(placement.source, PlacementSource::Manual);
        assert_eq!(placement.rect.x.to_milli_i64(), 560_000);
    }

    #[test]
    fn right_margin_pushes_box_left() {
        let mut cfg = config();
        cfg.keep_alignment = true;
        if let Some(entry) = cfg.categories.get_mut("inverter") {
            entry.configured_box = Some(BoxConfig::new(500.0, 200.0, 120.0, 40.0));
        }
        let (resolver, _) = LogoResolver::new(&cfg, Pt::from_f32(600.0));
        let placement = resolver
            .resolve_position("inverter", &HashMap::new())
            .expect("placement");
        assert_eq!(placement.rect.x.to_milli_i64(), 460_000);
        assert!(resolver.resolve_position("battery", &HashMap::new()).is_none());
    }

    #[test]
    fn fit_keeps_aspect_and_centers_vertically() {
        let fitted = fit_image(Rect::new(0.0, 0.0, 200.0, 100.0), 400, 100);
        assert_eq!(fitted.width.to_milli_i64(), 200_000);
        assert_eq!(fitted.height.to_milli_i64(), 50_000);
        assert_eq!(fitted.y.to_milli_i64(), 25_000);
    }

    #[test]
    fn normalizes_brand_names_with_precedence() {
        assert_eq!(normalize_brand("SMA Solar Technology AG"), "sma_solar");
        assert_eq!(normalize_brand("Huawei Technologies Co., Ltd."), "huawei");
        assert_eq!(normalize_brand("  BYD   "), "byd");
        assert_eq!(normalize_brand("Solar"), "solar");
        assert_eq!(normalize_brand("Fronius International GmbH"), "fronius");
    }

    #[test]
    fn brand_payload_prefers_explicit_logo() {
        let ctx = RenderContext::new()
            .with_brand("inverter", "SMA Solar Technology AG")
            .with_image("brand/sma_solar", "AAAA");
        assert_eq!(brand_logo_payload(&ctx, "inverter"), Some("AAAA"));
        let ctx = ctx.with_image("logo/inverter", "BBBB");
        assert_eq!(brand_logo_payload(&ctx, "inverter"), Some("BBBB"));
        assert_eq!(brand_logo_payload(&ctx, "battery"), None);
    }
}
