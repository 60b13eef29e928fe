/// Where a page sits in the document being assembled; handed to page hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocContext {
    pub page_number: usize,
    /// Final page total, appended pages included.
    pub page_count: usize,
    pub variant: String,
    pub is_title_page: bool,
}

impl DocContext {
    pub fn new(page_number: usize, page_count: usize, variant: impl Into<String>) -> Self {
        Self {
            page_number,
            page_count,
            variant: variant.into(),
            is_title_page: page_number == 1,
        }
    }

    pub fn with_title_page(mut self, title_page: usize) -> Self {
        self.is_title_page = self.page_number == title_page;
        self
    }
}
