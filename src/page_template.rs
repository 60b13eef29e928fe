use crate::Canvas;
use crate::doc_context::DocContext;
use crate::error::OfferStampError;
use crate::placeholder::RenderContext;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type OnPageCallback =
    Arc<dyn Fn(&mut Canvas, &DocContext, &RenderContext) -> Result<(), OfferStampError> + Send + Sync>;

/// Code-defined decorations for one page index, run after the configured drawings.
#[derive(Clone)]
pub struct PageTemplate {
    pub name: String,
    pub page: usize,
    on_page: Vec<OnPageCallback>,
}

impl PageTemplate {
    pub fn new(name: impl Into<String>, page: usize) -> Self {
        Self {
            name: name.into(),
            page,
            on_page: Vec::new(),
        }
    }

    pub fn set_on_page<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Canvas, &DocContext, &RenderContext) -> Result<(), OfferStampError>
            + Send
            + Sync
            + 'static,
    {
        self.on_page.push(Arc::new(callback));
        self
    }

    pub fn on_page(&self) -> &[OnPageCallback] {
        &self.on_page
    }
}

impl std::fmt::Debug for PageTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTemplate")
            .field("name", &self.name)
            .field("page", &self.page)
            .field("hooks", &self.on_page.len())
            .finish()
    }
}

/// Page index -> templates. Several templates may target the same page; they run
/// in registration order.
#[derive(Clone, Debug, Default)]
pub struct PageTemplates {
    by_page: BTreeMap<usize, Vec<PageTemplate>>,
}

impl PageTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: PageTemplate) {
        self.by_page.entry(template.page).or_default().push(template);
    }

    pub fn for_page(&self, page: usize) -> impl Iterator<Item = &PageTemplate> {
        self.by_page.get(&page).into_iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.by_page.is_empty()
    }
}
