use crate::canvas::Canvas;
use crate::chart::{
    RingChart, RingStyle, WaterfallChart, WaterfallComponent, WaterfallStyle, draw_ring,
    draw_waterfall,
};
use crate::config::{DrawingConfig, RenderConfig};
use crate::descriptor::{Align, LayoutElement, PageLayout, Role};
use crate::doc_context::DocContext;
use crate::error::{DiagnosticKind, Diagnostics, OfferStampError};
use crate::font::measure_text_width;
use crate::logo::{LogoResolver, brand_logo_payload, fit_image};
use crate::page_template::PageTemplates;
use crate::pdf::ImageStore;
use crate::placeholder::{PlaceholderResolver, RenderContext};
use crate::rows::{ResolvedElement, RowBand, compact_elements};
use crate::types::{Color, Pt, Rect};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Start,
    LogoDrawn,
    CustomDrawingsDrawn,
    TextLayerDrawn,
    Finalized,
}

/// Read-only inputs shared by every page of one document.
pub struct RenderEnv<'a> {
    pub config: &'a RenderConfig,
    pub resolver: &'a PlaceholderResolver,
    pub logos: &'a LogoResolver,
    pub templates: &'a PageTemplates,
    pub ctx: &'a RenderContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStats {
    pub page: usize,
    pub elements: usize,
    pub text_drawn: usize,
    pub skipped_empty: usize,
    pub drawings: usize,
    pub failed_drawings: usize,
}

/// Substitutes `{page}` and `{pages}` in a footer template.
pub fn format_footer(template: &str, page: usize, pages: usize) -> String {
    template
        .replace("{page}", &page.to_string())
        .replace("{pages}", &pages.to_string())
}

fn diagnostic_kind(err: &OfferStampError) -> DiagnosticKind {
    match err {
        OfferStampError::ImageDecode(_) => DiagnosticKind::ImageDecode,
        OfferStampError::Malformed(_) => DiagnosticKind::MalformedEntry,
        OfferStampError::Merge(_) => DiagnosticKind::Merge,
        _ => DiagnosticKind::ChartDraw,
    }
}

fn color_or(raw: Option<&String>, fallback: Color) -> Color {
    raw.and_then(|value| Color::parse(value)).unwrap_or(fallback)
}

/// Overlay renderer for one page. Steps must run in order:
/// logo, custom drawings, text layer, finalize.
pub struct PageRenderer<'a> {
    env: &'a RenderEnv<'a>,
    doc: DocContext,
    layout: PageLayout,
    state: RenderState,
    stats: PageStats,
}

impl<'a> PageRenderer<'a> {
    pub fn new(env: &'a RenderEnv<'a>, doc: DocContext, layout: PageLayout) -> Self {
        let stats = PageStats {
            page: doc.page_number,
            elements: layout.len(),
            ..PageStats::default()
        };
        Self {
            env,
            doc,
            layout,
            state: RenderState::Start,
            stats,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    fn advance(&mut self, from: RenderState, to: RenderState) -> Result<(), OfferStampError> {
        if self.state != from {
            return Err(OfferStampError::Unexpected(format!(
                "page {}: cannot move to {:?} from {:?}",
                self.doc.page_number, to, self.state
            )));
        }
        self.state = to;
        Ok(())
    }

    fn page(&self) -> usize {
        self.doc.page_number
    }

    /// Registers and draws an image payload fitted into `bounds`.
    fn place_image(
        &self,
        canvas: &mut Canvas,
        images: &mut ImageStore,
        resource_id: &str,
        payload: &str,
        bounds: Rect,
    ) -> Result<(), OfferStampError> {
        let (w, h) = images.register(resource_id, payload)?;
        canvas.draw_image(fit_image(bounds, w, h), resource_id);
        Ok(())
    }

    pub fn draw_logo(
        &mut self,
        canvas: &mut Canvas,
        images: &mut ImageStore,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), OfferStampError> {
        self.advance(RenderState::Start, RenderState::LogoDrawn)?;
        canvas.meta("page", format!("{}/{}", self.doc.page_number, self.doc.page_count));
        let logo = &self.env.config.company_logo;
        let Some(payload) = self.env.ctx.image(&logo.image_key) else {
            return Ok(());
        };
        let bounds = if self.doc.is_title_page {
            logo.title_box.rect()
        } else {
            logo.page_box.rect()
        };
        let resource_id = format!("image:{}", logo.image_key);
        if let Err(err) = self.place_image(canvas, images, &resource_id, payload, bounds) {
            diagnostics.report(
                DiagnosticKind::ImageDecode,
                Some(self.page()),
                format!("company logo skipped: {err}"),
            );
        }
        Ok(())
    }

    fn title_centers(&self) -> HashMap<String, Pt> {
        let mut centers = HashMap::new();
        for element in &self.layout.elements {
            if element.role != Some(Role::SectionTitle) {
                continue;
            }
            if let Some(category) = &element.category {
                centers
                    .entry(category.clone())
                    .or_insert_with(|| element.bbox.center_y());
            }
        }
        centers
    }

    fn draw_configured(
        &self,
        drawing: &DrawingConfig,
        canvas: &mut Canvas,
        images: &mut ImageStore,
        title_centers: &HashMap<String, Pt>,
    ) -> Result<bool, OfferStampError> {
        let ctx = self.env.ctx;
        match drawing {
            DrawingConfig::Ring {
                center_x,
                center_y,
                outer_radius,
                inner_radius,
                percentage_key,
                foreground,
                background,
                hole,
                ..
            } => {
                let Some(percentage) = ctx.number(percentage_key) else {
                    log::debug!("page {}: no value for ring '{}'", self.page(), percentage_key);
                    return Ok(false);
                };
                let defaults = RingStyle::default();
                let ring = RingChart {
                    center_x: Pt::from_f32(*center_x),
                    center_y: Pt::from_f32(*center_y),
                    percentage: percentage as f32,
                    outer_radius: Pt::from_f32(*outer_radius),
                    inner_radius: Pt::from_f32(*inner_radius),
                    style: RingStyle {
                        foreground: color_or(foreground.as_ref(), defaults.foreground),
                        background: color_or(background.as_ref(), defaults.background),
                        hole: color_or(hole.as_ref(), defaults.hole),
                    },
                };
                draw_ring(canvas, &ring)
            }
            DrawingConfig::Waterfall {
                bounds,
                components,
                total_key,
                total_display_key,
                total_label,
                font_size,
                ..
            } => {
                let mut style = WaterfallStyle::default();
                if let Some(size) = font_size {
                    style.font_size = *size;
                }
                let chart = WaterfallChart {
                    components: components
                        .iter()
                        .map(|c| WaterfallComponent {
                            label: c.label.clone(),
                            value: ctx.number(&c.value_key).unwrap_or(0.0),
                            display: c
                                .display_key
                                .as_deref()
                                .and_then(|k| ctx.value(k))
                                .map(str::to_string),
                        })
                        .collect(),
                    total: total_key.as_deref().and_then(|k| ctx.number(k)),
                    total_label: total_label.clone(),
                    total_display: total_display_key
                        .as_deref()
                        .and_then(|k| ctx.value(k))
                        .map(str::to_string),
                    style,
                };
                draw_waterfall(canvas, bounds.rect(), &chart).map(|_| true)
            }
            DrawingConfig::Panel { rect, color, .. } => {
                canvas.fill_rect(rect.rect(), color_or(Some(color), Color::WHITE));
                Ok(true)
            }
            DrawingConfig::BrandLogo { category, .. } => {
                let Some(placement) = self.env.logos.resolve_position(category, title_centers)
                else {
                    log::debug!("page {}: logo category '{}' not configured", self.page(), category);
                    return Ok(false);
                };
                let Some(payload) = brand_logo_payload(ctx, category) else {
                    return Ok(false);
                };
                let resource_id = format!("logo:{category}");
                self.place_image(canvas, images, &resource_id, payload, placement.rect)?;
                Ok(true)
            }
            DrawingConfig::ProductImage {
                rect, image_key, ..
            } => {
                let Some(payload) = ctx.image(image_key) else {
                    return Ok(false);
                };
                let resource_id = format!("image:{image_key}");
                self.place_image(canvas, images, &resource_id, payload, rect.rect())?;
                Ok(true)
            }
        }
    }

    /// Configured drawings first, then code hooks. A failing drawing is reported
    /// and skipped; the rest of the page still renders.
    pub fn draw_custom(
        &mut self,
        canvas: &mut Canvas,
        images: &mut ImageStore,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), OfferStampError> {
        self.advance(RenderState::LogoDrawn, RenderState::CustomDrawingsDrawn)?;
        let page = self.page();
        let env = self.env;
        let title_centers = self.title_centers();

        for drawing in env.config.drawings_for(page) {
            canvas.save_state();
            match self.draw_configured(drawing, canvas, images, &title_centers) {
                Ok(true) => self.stats.drawings += 1,
                Ok(false) => {}
                Err(err) => {
                    self.stats.failed_drawings += 1;
                    diagnostics.report(
                        diagnostic_kind(&err),
                        Some(page),
                        format!("{} drawing skipped: {err}", drawing.kind()),
                    );
                }
            }
            canvas.restore_state();
        }

        for template in env.templates.for_page(page) {
            for hook in template.on_page() {
                canvas.save_state();
                match hook(canvas, &self.doc, env.ctx) {
                    Ok(()) => self.stats.drawings += 1,
                    Err(err) => {
                        self.stats.failed_drawings += 1;
                        diagnostics.report(
                            diagnostic_kind(&err),
                            Some(page),
                            format!("page hook '{}' failed: {err}", template.name),
                        );
                    }
                }
                canvas.restore_state();
            }
        }
        Ok(())
    }

    fn is_footer_slot(&self, resolved: &ResolvedElement) -> bool {
        let element = &resolved.element;
        if element.role == Some(Role::FooterPageNumber) {
            return true;
        }
        let footer = &self.env.config.footer;
        let text = resolved.text.trim();
        !text.is_empty()
            && text.chars().all(|c| c.is_ascii_digit())
            && footer.region.rect().contains(&element.bbox)
            && element.color.to_packed() == footer.marker().to_packed()
    }

    fn alignment_for(&self, element: &LayoutElement) -> Align {
        let centered_key = self
            .env
            .resolver
            .semantic_key(element)
            .is_some_and(|key| self.env.config.text.centered_keys.iter().any(|k| k == key));
        match element.align {
            Some(Align::Center) => Align::Center,
            _ if centered_key => Align::Center,
            Some(Align::Right) => Align::Right,
            _ => Align::Left,
        }
    }

    pub fn draw_text(&mut self, canvas: &mut Canvas) -> Result<(), OfferStampError> {
        self.advance(RenderState::CustomDrawingsDrawn, RenderState::TextLayerDrawn)?;
        let page = self.page();
        let config = self.env.config;

        let mut resolved: Vec<ResolvedElement> = self
            .layout
            .elements
            .iter()
            .map(|element| {
                let text = self.env.resolver.resolve(element, self.env.ctx, page);
                ResolvedElement::new(element.clone(), text)
            })
            .collect();

        let band = config.row_band_for(page).map(RowBand::from);
        if let Some(band) = &band {
            resolved = compact_elements(resolved, band);
        }
        let line_style = &config.line_items;
        let line_color = line_style.color.as_deref().and_then(Color::parse);

        for item in &resolved {
            let element = &item.element;
            let (text, align) = if self.is_footer_slot(item) {
                (
                    format_footer(&config.footer.template, page, self.doc.page_count),
                    Align::Right,
                )
            } else {
                (item.text.clone(), self.alignment_for(element))
            };
            if text.trim().is_empty() {
                self.stats.skipped_empty += 1;
                continue;
            }

            let in_band = band.as_ref().is_some_and(|b| b.contains(&element.bbox));
            let (font_name, font_size, color) = if in_band {
                (
                    line_style.font_name.as_deref().unwrap_or(&element.font_name),
                    line_style
                        .font_size
                        .map(Pt::from_f32)
                        .unwrap_or(element.font_size),
                    line_color.unwrap_or(element.color),
                )
            } else {
                (element.font_name.as_str(), element.font_size, element.color)
            };

            let width = measure_text_width(font_name, font_size, &text);
            let x = match align {
                Align::Left => element.bbox.x,
                Align::Right => element.bbox.right() - width,
                Align::Center => element.bbox.center_x() - width.mul_ratio(1, 2),
            };
            canvas.set_fill_color(color);
            canvas.set_font_name(font_name);
            canvas.set_font_size(font_size);
            canvas.draw_string(x, element.bbox.y, text);
            self.stats.text_drawn += 1;
        }
        Ok(())
    }

    pub fn finalize(&mut self, canvas: &mut Canvas) -> Result<PageStats, OfferStampError> {
        self.advance(RenderState::TextLayerDrawn, RenderState::Finalized)?;
        canvas.show_page();
        Ok(self.stats.clone())
    }

    /// Runs every step in order and flushes the page.
    pub fn render(
        mut self,
        canvas: &mut Canvas,
        images: &mut ImageStore,
        diagnostics: &mut Diagnostics,
    ) -> Result<PageStats, OfferStampError> {
        self.draw_logo(canvas, images, diagnostics)?;
        self.draw_custom(canvas, images, diagnostics)?;
        self.draw_text(canvas)?;
        self.finalize(canvas)
    }
}
