use crate::assets::AssetSource;
use crate::canvas::Canvas;
use crate::config::RenderConfig;
use crate::debug::{DebugLogger, DebugRun};
use crate::descriptor::parse_descriptor_counting;
use crate::doc_context::DocContext;
use crate::error::{Diagnostic, DiagnosticKind, Diagnostics, OfferStampError};
use crate::finalize::{ComposeInput, SecondaryGraphic, compose_document, load_appended};
use crate::logo::LogoResolver;
use crate::page_template::{PageTemplate, PageTemplates};
use crate::pdf::{ImageStore, overlay_to_lopdf};
use crate::placeholder::{PlaceholderMap, PlaceholderResolver, RenderContext};
use crate::render::{PageRenderer, RenderEnv};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Final output of one assembly run.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    /// Rendered plus appended pages.
    pub page_count: usize,
    pub rendered_pages: usize,
    pub appended_pages: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// One independent generation request for [`Assembler::assemble_batch`].
#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub target_pages: usize,
    pub context: RenderContext,
    pub variant: String,
    pub appended: Option<Vec<u8>>,
}

impl AssemblyJob {
    pub fn new(target_pages: usize, context: RenderContext, variant: impl Into<String>) -> Self {
        Self {
            target_pages,
            context,
            variant: variant.into(),
            appended: None,
        }
    }

    pub fn with_appended(mut self, pdf: Vec<u8>) -> Self {
        self.appended = Some(pdf);
        self
    }
}

pub struct Assembler {
    library: Arc<dyn AssetSource>,
    config: RenderConfig,
    resolver: PlaceholderResolver,
    logos: LogoResolver,
    alignment_notice: Option<Diagnostic>,
    templates: PageTemplates,
    secondary: Option<Vec<u8>>,
    debug: Option<DebugLogger>,
}

pub struct AssemblerBuilder {
    library: Arc<dyn AssetSource>,
    config: RenderConfig,
    placeholders: Arc<PlaceholderMap>,
    templates: PageTemplates,
    secondary: Option<Vec<u8>>,
    debug_path: Option<PathBuf>,
}

impl AssemblerBuilder {
    pub fn new(library: Arc<dyn AssetSource>) -> Self {
        Self {
            library,
            config: RenderConfig::default(),
            placeholders: Arc::new(PlaceholderMap::new()),
            templates: PageTemplates::new(),
            secondary: None,
            debug_path: None,
        }
    }

    pub fn config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn placeholders(mut self, map: Arc<PlaceholderMap>) -> Self {
        self.placeholders = map;
        self
    }

    pub fn template(mut self, template: PageTemplate) -> Self {
        self.templates.register(template);
        self
    }

    /// Single-page PDF drawn onto the configured page between background and overlay.
    pub fn secondary_graphic(mut self, pdf: Vec<u8>) -> Self {
        self.secondary = Some(pdf);
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Assembler, OfferStampError> {
        self.config.validate()?;
        let resolver = PlaceholderResolver::new(self.placeholders)
            .with_overrides(&self.config.overrides)
            .with_company_name(
                self.config.text.company_name_key.as_str(),
                self.config.text.default_company_name.as_str(),
            );
        let (logos, alignment_notice) =
            LogoResolver::new(&self.config.brand_logos, self.config.page_width());
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(Assembler {
            library: self.library,
            config: self.config,
            resolver,
            logos,
            alignment_notice,
            templates: self.templates,
            secondary: self.secondary,
            debug,
        })
    }
}

impl Assembler {
    pub fn builder(library: Arc<dyn AssetSource>) -> AssemblerBuilder {
        AssemblerBuilder::new(library)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Pages in `1..=pages` lacking a descriptor or background, with their locations.
    fn missing_pages(&self, pages: usize, variant: &str) -> Vec<(usize, Vec<String>)> {
        (1..=pages)
            .filter_map(|page| {
                let missing = self.library.missing(page, variant);
                (!missing.is_empty()).then_some((page, missing))
            })
            .collect()
    }

    /// Checks asset completeness and applies the single-step trailing-page fallback.
    fn resolve_page_count(
        &self,
        target: usize,
        variant: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<usize, OfferStampError> {
        let missing = self.missing_pages(target, variant);
        if missing.is_empty() {
            return Ok(target);
        }
        let only_last = missing.len() == 1 && missing[0].0 == target;
        if only_last && target > 1 {
            let fallback = target - 1;
            let recheck = self.missing_pages(fallback, variant);
            if recheck.is_empty() {
                diagnostics.report(
                    DiagnosticKind::PageCountFallback,
                    Some(target),
                    format!(
                        "assets for page {} missing ({}); generating {} pages",
                        target,
                        missing[0].1.join(", "),
                        fallback
                    ),
                );
                return Ok(fallback);
            }
            return Err(OfferStampError::AssetMissing(
                recheck.into_iter().flat_map(|(_, paths)| paths).collect(),
            ));
        }
        Err(OfferStampError::AssetMissing(
            missing.into_iter().flat_map(|(_, paths)| paths).collect(),
        ))
    }

    pub fn assemble(
        &self,
        target_pages: usize,
        ctx: &RenderContext,
        variant: &str,
        appended: Option<&[u8]>,
    ) -> Result<AssembledDocument, OfferStampError> {
        let started = Instant::now();
        if target_pages == 0 {
            return Err(OfferStampError::InvalidConfiguration(
                "target page count must be at least 1".to_string(),
            ));
        }
        let mut diagnostics = Diagnostics::default();
        if let Some(notice) = &self.alignment_notice {
            diagnostics.push(notice.clone());
        }

        let pages = self.resolve_page_count(target_pages, variant, &mut diagnostics)?;
        let appended = appended.map(load_appended).transpose()?;
        let appended_count = appended.as_ref().map(|(_, count)| *count).unwrap_or(0);
        let total = pages + appended_count;
        let mut run: Option<DebugRun> = self.debug.as_ref().map(|d| d.begin_run("assemble"));
        if let Some(run) = &run {
            run.event(
                "assemble.start",
                json!({
                    "variant": variant,
                    "target_pages": target_pages,
                    "pages": pages,
                    "appended_pages": appended_count,
                }),
            );
        }

        let env = RenderEnv {
            config: &self.config,
            resolver: &self.resolver,
            logos: &self.logos,
            templates: &self.templates,
            ctx,
        };
        let mut canvas = Canvas::new(self.config.page_size());
        let mut images = ImageStore::new();
        let mut backgrounds = Vec::with_capacity(pages);
        for page in 1..=pages {
            let source = self.library.descriptor(page, variant)?;
            let (layout, dropped) = parse_descriptor_counting(&source);
            if dropped > 0 {
                diagnostics.report(
                    DiagnosticKind::MalformedEntry,
                    Some(page),
                    format!("{dropped} descriptor entries dropped"),
                );
            }
            let doc = DocContext::new(page, total, variant).with_title_page(self.config.title_page);
            let stats =
                PageRenderer::new(&env, doc, layout).render(&mut canvas, &mut images, &mut diagnostics)?;
            if let Some(run) = &mut run {
                run.event(
                    "page.rendered",
                    json!({
                        "page": stats.page,
                        "elements": stats.elements,
                        "text_drawn": stats.text_drawn,
                        "skipped_empty": stats.skipped_empty,
                        "drawings": stats.drawings,
                        "failed_drawings": stats.failed_drawings,
                    }),
                );
                run.increment("pages", 1);
                run.increment("text_drawn", stats.text_drawn as u64);
            }
            backgrounds.push(self.library.background(page, variant)?);
        }
        let render_ms = started.elapsed().as_secs_f64() * 1000.0;

        let overlay = canvas.finish_without_show();
        if overlay.pages.len() != pages {
            return Err(OfferStampError::Unexpected(format!(
                "rendered {} overlay pages for {} target pages",
                overlay.pages.len(),
                pages
            )));
        }
        let overlay = overlay_to_lopdf(&overlay, &images)?;
        let secondary_config = &self.config.secondary_graphic;
        let secondary = self
            .secondary
            .as_ref()
            .filter(|_| secondary_config.page <= pages)
            .map(|pdf| SecondaryGraphic {
                page: secondary_config.page,
                rect: secondary_config.rect.rect(),
                pdf: pdf.clone(),
            });
        let (bytes, summary) = compose_document(
            ComposeInput {
                overlay,
                backgrounds,
                secondary,
                appended: appended.map(|(doc, _)| doc),
            },
            &mut diagnostics,
        )?;
        let total_ms = started.elapsed().as_secs_f64() * 1000.0;

        log::info!(
            "assembled {} pages ({} rendered, {} appended) variant={} render_ms={:.1} total_ms={:.1} diagnostics={}",
            summary.pages_written,
            pages,
            summary.appended_pages,
            variant,
            render_ms,
            total_ms,
            diagnostics.entries().len()
        );
        if let Some(mut run) = run {
            for diagnostic in diagnostics.entries() {
                run.event(
                    "diagnostic",
                    json!({
                        "kind": diagnostic.kind.as_str(),
                        "page": diagnostic.page,
                        "message": diagnostic.message,
                    }),
                );
            }
            run.increment("diagnostics", diagnostics.entries().len() as u64);
            run.event(
                "assemble.done",
                json!({
                    "pages": summary.pages_written,
                    "overlay_only_pages": summary.overlay_only_pages,
                    "render_ms": render_ms,
                    "total_ms": total_ms,
                }),
            );
            run.emit_summary();
        }

        Ok(AssembledDocument {
            bytes,
            page_count: summary.pages_written,
            rendered_pages: pages,
            appended_pages: summary.appended_pages,
            diagnostics: diagnostics.into_vec(),
        })
    }

    /// Runs independent jobs in parallel; results keep the order of `jobs`.
    pub fn assemble_batch(&self, jobs: &[AssemblyJob]) -> Vec<Result<AssembledDocument, OfferStampError>> {
        use rayon::prelude::*;

        jobs.par_iter()
            .map(|job| {
                self.assemble(
                    job.target_pages,
                    &job.context,
                    &job.variant,
                    job.appended.as_deref(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryLibrary;
    use crate::finalize::tests::make_single_page_pdf;

    fn library(pages: usize, skip_background: &[usize]) -> MemoryLibrary {
        let mut lib = MemoryLibrary::new();
        for page in 1..=pages {
            lib.insert_descriptor(
                page,
                None,
                "Text: 1\nPosition: (500, 800, 560, 812)\nColor: #808080\n",
            );
            if !skip_background.contains(&page) {
                lib.insert_background(page, "standard", make_single_page_pdf(&format!("bg {page}")));
            }
        }
        lib
    }

    fn assembler(lib: MemoryLibrary) -> Assembler {
        Assembler::builder(Arc::new(lib)).build().expect("build")
    }

    #[test]
    fn zero_pages_is_rejected() {
        let asm = assembler(library(2, &[]));
        assert!(matches!(
            asm.assemble(0, &RenderContext::new(), "standard", None),
            Err(OfferStampError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn missing_last_page_falls_back_once() {
        let asm = assembler(library(3, &[3]));
        let out = asm
            .assemble(3, &RenderContext::new(), "standard", None)
            .expect("fallback");
        assert_eq!(out.rendered_pages, 2);
        assert_eq!(out.page_count, 2);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::PageCountFallback);
    }

    #[test]
    fn missing_middle_page_lists_locations() {
        let asm = assembler(library(3, &[2]));
        match asm.assemble(3, &RenderContext::new(), "standard", None) {
            Err(OfferStampError::AssetMissing(paths)) => {
                assert_eq!(paths, vec!["memory:background/standard/page_2".to_string()]);
            }
            other => panic!("expected AssetMissing, got {:?}", other.map(|d| d.page_count)),
        }
    }

    #[test]
    fn single_missing_page_does_not_fall_back_to_zero() {
        let asm = assembler(library(1, &[1]));
        assert!(matches!(
            asm.assemble(1, &RenderContext::new(), "standard", None),
            Err(OfferStampError::AssetMissing(_))
        ));
    }

    #[test]
    fn unreadable_appended_document_aborts() {
        let asm = assembler(library(1, &[]));
        assert!(matches!(
            asm.assemble(1, &RenderContext::new(), "standard", Some(b"nope")),
            Err(OfferStampError::Malformed(_))
        ));
    }

    #[test]
    fn batch_keeps_job_order() {
        let asm = assembler(library(3, &[]));
        let jobs = vec![
            AssemblyJob::new(3, RenderContext::new(), "standard"),
            AssemblyJob::new(1, RenderContext::new(), "standard")
                .with_appended(make_single_page_pdf("appendix")),
            AssemblyJob::new(0, RenderContext::new(), "standard"),
        ];
        let results = asm.assemble_batch(&jobs);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().expect("first").page_count, 3);
        let second = results[1].as_ref().expect("second");
        assert_eq!(second.page_count, 2);
        assert_eq!(second.appended_pages, 1);
        assert!(results[2].is_err());
    }

    #[test]
    fn debug_log_records_pages() {
        let path = std::env::temp_dir().join(format!(
            "offerstamp-debug-{}-{:?}.jsonl",
            std::process::id(),
            std::thread::current().id()
        ));
        let asm = Assembler::builder(Arc::new(library(2, &[])))
            .debug_log(&path)
            .build()
            .expect("build");
        asm.assemble(2, &RenderContext::new(), "standard", None)
            .expect("assemble");
        let text = std::fs::read_to_string(&path).expect("trace");
        let rendered = text
            .lines()
            .filter(|line| line.contains("\"page.rendered\""))
            .count();
        assert_eq!(rendered, 2);
        assert!(text.contains("\"debug.summary\""));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn batch_debug_summaries_count_each_job() {
        let path = std::env::temp_dir().join(format!(
            "offerstamp-batch-debug-{}-{:?}.jsonl",
            std::process::id(),
            std::thread::current().id()
        ));
        let asm = Assembler::builder(Arc::new(library(3, &[])))
            .debug_log(&path)
            .build()
            .expect("build");
        let jobs = vec![
            AssemblyJob::new(3, RenderContext::new(), "standard"),
            AssemblyJob::new(1, RenderContext::new(), "standard"),
        ];
        for result in asm.assemble_batch(&jobs) {
            result.expect("job");
        }
        let text = std::fs::read_to_string(&path).expect("trace");
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        let summaries: Vec<&serde_json::Value> = records
            .iter()
            .filter(|r| r["type"] == "debug.summary")
            .collect();
        assert_eq!(summaries.len(), 2);
        let mut page_counts: Vec<u64> = Vec::new();
        for summary in summaries {
            let run = &summary["run"];
            let rendered = records
                .iter()
                .filter(|r| r["type"] == "page.rendered" && &r["run"] == run)
                .count() as u64;
            let counted = summary["counts"]["pages"].as_u64().expect("pages counter");
            assert_eq!(counted, rendered);
            page_counts.push(counted);
        }
        page_counts.sort_unstable();
        assert_eq!(page_counts, vec![1, 3]);
        let _ = std::fs::remove_file(path);
    }
}
