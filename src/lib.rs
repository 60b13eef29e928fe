mod assembler;
mod assets;
mod canvas;
mod chart;
mod config;
mod debug;
mod descriptor;
mod doc_context;
mod error;
mod finalize;
mod font;
mod logo;
mod page_template;
mod pdf;
mod placeholder;
mod render;
mod rows;
mod types;

pub use assembler::{AssembledDocument, Assembler, AssemblerBuilder, AssemblyJob};
pub use assets::{AssetKind, AssetSource, DirectoryLibrary, MemoryLibrary};
pub use canvas::{Canvas, Command, Document, Page};
pub use chart::{
    BarGeometry, ChartSpec, Connector, RingChart, RingStyle, WaterfallChart, WaterfallComponent,
    WaterfallLayout, WaterfallStyle, draw_chart, draw_ring, draw_waterfall, layout_waterfall,
    ring_sweep_degrees,
};
pub use config::{
    BoxConfig, BrandLogoConfig, CompanyLogoConfig, DrawingConfig, FooterConfig, LineItemStyle,
    LogoCategoryConfig, RenderConfig, RowBandConfig, SecondaryGraphicConfig, TextConfig,
    WaterfallComponentConfig,
};
pub use debug::{DebugLogger, DebugRun};
pub use descriptor::{
    Align, LayoutElement, PageLayout, Role, RowRole, parse_descriptor, parse_descriptor_counting,
    parse_entries,
};
pub use doc_context::DocContext;
pub use error::{Diagnostic, DiagnosticKind, Diagnostics, OfferStampError};
pub use finalize::{ComposeInput, ComposeSummary, SecondaryGraphic, compose_document, fit_matrix};
pub use font::{BaseFont, measure_text_width};
pub use logo::{
    LogoPlacement, LogoResolver, PlacementSource, brand_logo_payload, fit_image, normalize_brand,
};
pub use page_template::{OnPageCallback, PageTemplate, PageTemplates};
pub use pdf::{ImageStore, decode_payload, overlay_to_lopdf};
pub use placeholder::{
    OverrideEntry, OverrideRule, PlaceholderMap, PlaceholderResolver, RenderContext,
};
pub use render::{PageRenderer, PageStats, RenderEnv, RenderState, format_footer};
pub use rows::{ResolvedElement, RowBand, RowPair, compact, compact_elements};
pub use types::{Color, Pt, Rect, Size};
