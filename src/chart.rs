//! Ring and waterfall chart primitives.
//!
//! Both primitives read only their arguments and write only to the canvas they
//! are given. Geometry is validated before the first command is recorded, so a
//! rejected chart leaves the page untouched.

use crate::canvas::Canvas;
use crate::error::OfferStampError;
use crate::font::{measure_text_width, wrap_words};
use crate::types::{Color, Pt, Rect};
use std::f32::consts::PI;

/// Share of the plot height the tallest bar may occupy; the rest is label headroom.
pub const FILL_FRACTION: f32 = 0.72;
pub const MIN_BAR_HEIGHT: f32 = 5.0;
/// Right-hand share of the chart width reserved for the total bar.
pub const TOTAL_REGION_FRACTION: f32 = 0.22;
const BAR_WIDTH_FRACTION: f32 = 0.6;
const LABEL_LINES: usize = 2;
const LINE_HEIGHT_FACTOR: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingStyle {
    pub foreground: Color,
    pub background: Color,
    /// Fill of the center hole; normally the page color.
    pub hole: Color,
}

impl Default for RingStyle {
    fn default() -> Self {
        Self {
            foreground: Color::rgb(0.96, 0.65, 0.14),
            background: Color::rgb(0.88, 0.88, 0.88),
            hole: Color::WHITE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RingChart {
    pub center_x: Pt,
    pub center_y: Pt,
    pub percentage: f32,
    pub outer_radius: Pt,
    pub inner_radius: Pt,
    pub style: RingStyle,
}

/// Sweep of the ring wedge in degrees. Negative means clockwise from 12 o'clock.
pub fn ring_sweep_degrees(percentage: f32) -> f32 {
    if !percentage.is_finite() {
        return 0.0;
    }
    -360.0 * (percentage.clamp(0.0, 100.0) / 100.0)
}

/// Draws a percentage ring. Returns `Ok(false)` without recording anything when
/// the percentage is zero or below.
pub fn draw_ring(canvas: &mut Canvas, chart: &RingChart) -> Result<bool, OfferStampError> {
    if !chart.percentage.is_finite() || chart.percentage <= 0.0 {
        return Ok(false);
    }
    if chart.outer_radius <= Pt::ZERO {
        return Err(OfferStampError::Chart(format!(
            "ring outer radius must be positive, got {}",
            chart.outer_radius.to_f32()
        )));
    }
    if chart.inner_radius < Pt::ZERO || chart.inner_radius >= chart.outer_radius {
        return Err(OfferStampError::Chart(format!(
            "ring inner radius {} must lie in [0, {})",
            chart.inner_radius.to_f32(),
            chart.outer_radius.to_f32()
        )));
    }

    let cx = chart.center_x.to_f32();
    let cy = chart.center_y.to_f32();
    let outer = chart.outer_radius.to_f32();
    let sweep = ring_sweep_degrees(chart.percentage);

    canvas.save_state();

    canvas.set_fill_color(chart.style.background);
    circle_path(canvas, cx, cy, outer);
    canvas.fill();

    canvas.set_fill_color(chart.style.foreground);
    canvas.move_to(Pt::from_f32(cx), Pt::from_f32(cy));
    let (sx, sy) = polar(cx, cy, outer, 90.0);
    canvas.line_to(Pt::from_f32(sx), Pt::from_f32(sy));
    arc_path(canvas, cx, cy, outer, 90.0, sweep);
    canvas.close_path();
    canvas.fill();

    if chart.inner_radius > Pt::ZERO {
        canvas.set_fill_color(chart.style.hole);
        circle_path(canvas, cx, cy, chart.inner_radius.to_f32());
        canvas.fill();
    }

    canvas.restore_state();
    Ok(true)
}

// Angles are mathematical (counter-clockwise, y up); page space has y down.
fn polar(cx: f32, cy: f32, r: f32, angle_deg: f32) -> (f32, f32) {
    let t = angle_deg * (PI / 180.0);
    (cx + r * libm::cosf(t), cy - r * libm::sinf(t))
}

fn circle_path(canvas: &mut Canvas, cx: f32, cy: f32, r: f32) {
    let (sx, sy) = polar(cx, cy, r, 90.0);
    canvas.move_to(Pt::from_f32(sx), Pt::from_f32(sy));
    arc_path(canvas, cx, cy, r, 90.0, -360.0);
    canvas.close_path();
}

/// Appends cubic segments (at most 90 degrees each) continuing from the point at
/// `start_deg`.
fn arc_path(canvas: &mut Canvas, cx: f32, cy: f32, r: f32, start_deg: f32, sweep_deg: f32) {
    if sweep_deg.abs() <= f32::EPSILON {
        return;
    }
    let segments = libm::ceilf(sweep_deg.abs() / 90.0).max(1.0) as i32;
    let delta = (sweep_deg / segments as f32) * (PI / 180.0);
    let mut t1 = start_deg * (PI / 180.0);
    for _ in 0..segments {
        let t2 = t1 + delta;
        let k = (4.0 / 3.0) * libm::tanf((t2 - t1) / 4.0);
        let (s1, c1) = (libm::sinf(t1), libm::cosf(t1));
        let (s2, c2) = (libm::sinf(t2), libm::cosf(t2));
        let map = |x: f32, y: f32| (Pt::from_f32(cx + r * x), Pt::from_f32(cy - r * y));
        let (x1, y1) = map(c1 - k * s1, s1 + k * c1);
        let (x2, y2) = map(c2 + k * s2, s2 - k * c2);
        let (x3, y3) = map(c2, s2);
        canvas.curve_to(x1, y1, x2, y2, x3, y3);
        t1 = t2;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallComponent {
    pub label: String,
    pub value: f64,
    /// Pre-formatted value label; defaults to [`format_amount`].
    pub display: Option<String>,
}

impl WaterfallComponent {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
            display: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallStyle {
    pub bar_color: Color,
    pub total_color: Color,
    pub connector_color: Color,
    pub label_color: Color,
    pub font_name: String,
    pub font_size: f32,
}

impl Default for WaterfallStyle {
    fn default() -> Self {
        Self {
            bar_color: Color::rgb(0.16, 0.36, 0.58),
            total_color: Color::rgb(0.96, 0.65, 0.14),
            connector_color: Color::rgb(0.45, 0.45, 0.45),
            label_color: Color::BLACK,
            font_name: "Helvetica".to_string(),
            font_size: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallChart {
    pub components: Vec<WaterfallComponent>,
    /// Used as-is when positive; otherwise the component sum.
    pub total: Option<f64>,
    pub total_label: String,
    pub total_display: Option<String>,
    pub style: WaterfallStyle,
}

impl WaterfallChart {
    pub fn new(components: Vec<WaterfallComponent>) -> Self {
        Self {
            components,
            total: None,
            total_label: "Total".to_string(),
            total_display: None,
            style: WaterfallStyle::default(),
        }
    }

    pub fn effective_total(&self) -> f64 {
        match self.total {
            Some(total) if total > 0.0 => total,
            _ => self.components.iter().map(|c| c.value).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarGeometry {
    pub rect: Rect,
    pub value: f64,
    pub value_label: String,
    pub label_lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connector {
    pub x0: Pt,
    pub x1: Pt,
    pub y: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallLayout {
    pub bars: Vec<BarGeometry>,
    pub total_bar: BarGeometry,
    pub connectors: Vec<Connector>,
    pub total: f64,
    pub scale: f64,
    pub baseline: Pt,
}

/// Integral amounts print without decimals, everything else with two.
pub fn format_amount(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.2}", value)
    }
}

pub fn layout_waterfall(
    bounds: Rect,
    chart: &WaterfallChart,
) -> Result<WaterfallLayout, OfferStampError> {
    if chart.components.is_empty() {
        return Err(OfferStampError::Chart(
            "waterfall needs at least one component".to_string(),
        ));
    }
    if let Some(bad) = chart
        .components
        .iter()
        .find(|c| !c.value.is_finite() || c.value < 0.0)
    {
        return Err(OfferStampError::Chart(format!(
            "waterfall component '{}' has invalid value {}",
            bad.label, bad.value
        )));
    }

    let font_size = chart.style.font_size.max(1.0);
    let line_height = font_size * LINE_HEIGHT_FACTOR;
    let top_band = font_size + 4.0;
    let bottom_band = line_height * LABEL_LINES as f32 + 4.0;
    let x0 = bounds.x.to_f32();
    let width = bounds.width.to_f32();
    let plot_top = bounds.y.to_f32() + top_band;
    let baseline = bounds.bottom().to_f32() - bottom_band;
    let plot_height = baseline - plot_top;
    if width <= 0.0 || plot_height <= 0.0 {
        return Err(OfferStampError::Chart(format!(
            "waterfall bounds too small ({}x{})",
            width,
            bounds.height.to_f32()
        )));
    }

    let total = chart.effective_total();
    let max_component = chart
        .components
        .iter()
        .map(|c| c.value)
        .fold(0.0f64, f64::max);
    let mut scale = total.max(max_component);
    if scale <= 0.0 {
        scale = 1.0;
    }
    let height_for = |value: f64| (value / scale) as f32 * plot_height * FILL_FRACTION;

    let components_width = width * (1.0 - TOTAL_REGION_FRACTION);
    let slot = components_width / chart.components.len() as f32;
    let bar_width = slot * BAR_WIDTH_FRACTION;
    let label_width = Pt::from_f32(slot * 0.95);
    let font_pt = Pt::from_f32(font_size);

    let mut bars = Vec::with_capacity(chart.components.len());
    let mut levels = Vec::with_capacity(chart.components.len());
    let mut offset = 0.0f32;
    for (idx, component) in chart.components.iter().enumerate() {
        let stacked = component.value > 0.0;
        let height = if stacked {
            height_for(component.value)
        } else {
            MIN_BAR_HEIGHT
        };
        let bottom = (baseline - offset).max(plot_top + height);
        let left = x0 + slot * idx as f32 + (slot - bar_width) / 2.0;
        bars.push(BarGeometry {
            rect: Rect::new(left, bottom - height, bar_width, height),
            value: component.value,
            value_label: component
                .display
                .clone()
                .unwrap_or_else(|| format_amount(component.value)),
            label_lines: wrap_words(
                &chart.style.font_name,
                font_pt,
                &component.label,
                label_width,
                LABEL_LINES,
            ),
        });
        if stacked {
            offset += height;
        }
        levels.push(baseline - offset);
    }

    let region_left = x0 + components_width;
    let region_width = width - components_width;
    let total_width = region_width * BAR_WIDTH_FRACTION;
    let total_height = if total > 0.0 {
        height_for(total)
    } else {
        MIN_BAR_HEIGHT
    };
    let total_bar = BarGeometry {
        rect: Rect::new(
            region_left + (region_width - total_width) / 2.0,
            baseline - total_height,
            total_width,
            total_height,
        ),
        value: total,
        value_label: chart
            .total_display
            .clone()
            .unwrap_or_else(|| format_amount(total)),
        label_lines: wrap_words(
            &chart.style.font_name,
            font_pt,
            &chart.total_label,
            Pt::from_f32(region_width * 0.95),
            LABEL_LINES,
        ),
    };

    let mut connectors = Vec::with_capacity(bars.len());
    for idx in 0..bars.len() {
        let next_left = bars
            .get(idx + 1)
            .map(|b| b.rect.x)
            .unwrap_or(total_bar.rect.x);
        connectors.push(Connector {
            x0: bars[idx].rect.right(),
            x1: next_left,
            y: Pt::from_f32(levels[idx]),
        });
    }

    Ok(WaterfallLayout {
        bars,
        total_bar,
        connectors,
        total,
        scale,
        baseline: Pt::from_f32(baseline),
    })
}

pub fn draw_waterfall(
    canvas: &mut Canvas,
    bounds: Rect,
    chart: &WaterfallChart,
) -> Result<WaterfallLayout, OfferStampError> {
    let layout = layout_waterfall(bounds, chart)?;
    let style = &chart.style;
    let font_size = Pt::from_f32(style.font_size.max(1.0));
    let line_height = font_size * LINE_HEIGHT_FACTOR;

    canvas.save_state();

    for bar in &layout.bars {
        canvas.fill_rect(bar.rect, style.bar_color);
    }
    canvas.fill_rect(layout.total_bar.rect, style.total_color);

    canvas.set_stroke_color(style.connector_color);
    canvas.set_line_width(Pt::from_f32(0.75));
    canvas.set_dash(vec![Pt::from_i32(2), Pt::from_i32(2)], Pt::ZERO);
    for connector in &layout.connectors {
        canvas.move_to(connector.x0, connector.y);
        canvas.line_to(connector.x1, connector.y);
        canvas.stroke();
    }
    canvas.set_dash(Vec::new(), Pt::ZERO);

    canvas.set_fill_color(style.label_color);
    canvas.set_font_name(&style.font_name);
    canvas.set_font_size(font_size);
    for bar in layout.bars.iter().chain(std::iter::once(&layout.total_bar)) {
        let center = bar.rect.center_x();
        let value_y = bar.rect.y - font_size - Pt::from_i32(2);
        draw_centered(canvas, &style.font_name, font_size, center, value_y, &bar.value_label);
        let mut line_y = layout.baseline + Pt::from_i32(3);
        for line in &bar.label_lines {
            draw_centered(canvas, &style.font_name, font_size, center, line_y, line);
            line_y += line_height;
        }
    }

    canvas.restore_state();
    Ok(layout)
}

fn draw_centered(canvas: &mut Canvas, font: &str, size: Pt, center_x: Pt, y: Pt, text: &str) {
    let width = measure_text_width(font, size, text);
    canvas.draw_string(center_x - width.mul_ratio(1, 2), y, text);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartSpec {
    Ring(RingChart),
    Waterfall { bounds: Rect, chart: WaterfallChart },
}

/// Draws either chart kind; returns whether anything was drawn.
pub fn draw_chart(canvas: &mut Canvas, spec: &ChartSpec) -> Result<bool, OfferStampError> {
    match spec {
        ChartSpec::Ring(ring) => draw_ring(canvas, ring),
        ChartSpec::Waterfall { bounds, chart } => {
            draw_waterfall(canvas, *bounds, chart).map(|_| true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::types::Size;

    fn ring(percentage: f32) -> RingChart {
        RingChart {
            center_x: Pt::from_i32(100),
            center_y: Pt::from_i32(100),
            percentage,
            outer_radius: Pt::from_i32(40),
            inner_radius: Pt::from_i32(28),
            style: RingStyle::default(),
        }
    }

    #[test]
    fn ring_sweep_is_proportional_and_clamped() {
        for p in [0.0f32, 12.5, 50.0, 73.0, 100.0] {
            let expected = -360.0 * p / 100.0;
            assert!((ring_sweep_degrees(p) - expected).abs() < 1e-4);
        }
        assert_eq!(ring_sweep_degrees(150.0), -360.0);
        assert_eq!(ring_sweep_degrees(-5.0), 0.0);
    }

    #[test]
    fn ring_with_zero_percentage_records_nothing() {
        let mut canvas = Canvas::new(Size::a4());
        assert!(!draw_ring(&mut canvas, &ring(0.0)).expect("ring"));
        assert!(!draw_ring(&mut canvas, &ring(-12.0)).expect("ring"));
        assert_eq!(canvas.current_command_count(), 0);
    }

    #[test]
    fn ring_draws_disc_wedge_and_hole() {
        let mut canvas = Canvas::new(Size::a4());
        assert!(draw_ring(&mut canvas, &ring(25.0)).expect("ring"));
        let fills = canvas
            .current_commands()
            .iter()
            .filter(|c| matches!(c, Command::Fill))
            .count();
        assert_eq!(fills, 3);
        // A quarter sweep from 12 o'clock ends at 3 o'clock.
        let last_wedge_curve = canvas
            .current_commands()
            .iter()
            .filter_map(|c| match c {
                Command::CurveTo { x, y, .. } => Some((x.to_f32(), y.to_f32())),
                _ => None,
            })
            .nth(4)
            .expect("wedge curve");
        assert!((last_wedge_curve.0 - 140.0).abs() < 0.01);
        assert!((last_wedge_curve.1 - 100.0).abs() < 0.01);
    }

    #[test]
    fn ring_rejects_bad_geometry_without_drawing() {
        let mut canvas = Canvas::new(Size::a4());
        let mut bad = ring(50.0);
        bad.inner_radius = Pt::from_i32(50);
        assert!(draw_ring(&mut canvas, &bad).is_err());
        assert!(canvas.is_current_empty());
    }

    fn bounds() -> Rect {
        Rect::new(50.0, 400.0, 400.0, 200.0)
    }

    #[test]
    fn waterfall_total_defaults_to_component_sum() {
        let chart = WaterfallChart::new(vec![
            WaterfallComponent::new("Modules", 500.0),
            WaterfallComponent::new("Optional extras", 0.0),
            WaterfallComponent::new("Installation", 250.0),
        ]);
        let layout = layout_waterfall(bounds(), &chart).expect("layout");
        assert_eq!(layout.total, 750.0);
        assert_eq!(layout.total_bar.value_label, "750");
        assert_eq!(layout.bars.len(), 3);
        assert!((layout.bars[1].rect.height.to_f32() - MIN_BAR_HEIGHT).abs() < 0.01);
    }

    #[test]
    fn waterfall_supplied_total_is_kept() {
        let mut chart = WaterfallChart::new(vec![
            WaterfallComponent::new("A", 100.0),
            WaterfallComponent::new("B", 200.0),
        ]);
        chart.total = Some(1000.0);
        assert_eq!(layout_waterfall(bounds(), &chart).expect("layout").total, 1000.0);
        chart.total = Some(-3.0);
        assert_eq!(layout_waterfall(bounds(), &chart).expect("layout").total, 300.0);
    }

    #[test]
    fn waterfall_bars_cascade_and_zero_bars_do_not_advance() {
        let chart = WaterfallChart::new(vec![
            WaterfallComponent::new("A", 500.0),
            WaterfallComponent::new("B", 0.0),
            WaterfallComponent::new("C", 250.0),
        ]);
        let layout = layout_waterfall(bounds(), &chart).expect("layout");
        let a = layout.bars[0].rect;
        let b = layout.bars[1].rect;
        let c = layout.bars[2].rect;
        let close = |l: Pt, r: Pt| (l.to_f32() - r.to_f32()).abs() < 0.01;
        assert!(close(a.bottom(), layout.baseline));
        assert!(close(b.bottom(), a.y));
        assert!(close(c.bottom(), a.y));
        // Cascade reaches the total bar top when the total is the sum.
        let diff = (c.y.to_f32() - layout.total_bar.rect.y.to_f32()).abs();
        assert!(diff < 0.05, "cascade top off by {diff}");
        assert_eq!(layout.connectors.len(), 3);
        assert_eq!(layout.connectors[2].x1, layout.total_bar.rect.x);
    }

    #[test]
    fn waterfall_rejects_negative_components() {
        let chart = WaterfallChart::new(vec![WaterfallComponent::new("Refund", -10.0)]);
        assert!(matches!(
            layout_waterfall(bounds(), &chart),
            Err(OfferStampError::Chart(_))
        ));
    }

    #[test]
    fn waterfall_draw_emits_value_labels_and_dashes() {
        let mut canvas = Canvas::new(Size::a4());
        let chart = WaterfallChart::new(vec![
            WaterfallComponent::new("Modules", 500.0),
            WaterfallComponent::new("Battery storage system", 0.0),
            WaterfallComponent::new("Installation", 250.0),
        ]);
        draw_waterfall(&mut canvas, bounds(), &chart).expect("draw");
        let texts: Vec<&str> = canvas
            .current_commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(texts.contains(&"750"));
        assert!(texts.contains(&"0"));
        assert!(canvas
            .current_commands()
            .iter()
            .any(|c| matches!(c, Command::SetDash { pattern, .. } if !pattern.is_empty())));
    }

    #[test]
    fn format_amount_drops_zero_decimals() {
        assert_eq!(format_amount(750.0), "750");
        assert_eq!(format_amount(12.5), "12.50");
    }
}
