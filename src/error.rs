use std::fmt;

#[derive(Debug)]
pub enum OfferStampError {
    /// Descriptor or background asset absent; carries every missing location.
    AssetMissing(Vec<String>),
    Malformed(String),
    ImageDecode(String),
    Chart(String),
    Merge(String),
    InvalidConfiguration(String),
    Unexpected(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl OfferStampError {
    /// Errors that are recovered in place (element, image, chart or page slot)
    /// instead of aborting generation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OfferStampError::Malformed(_)
                | OfferStampError::ImageDecode(_)
                | OfferStampError::Chart(_)
                | OfferStampError::Merge(_)
        )
    }
}

impl fmt::Display for OfferStampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferStampError::AssetMissing(paths) => {
                write!(f, "missing assets: {}", paths.join(", "))
            }
            OfferStampError::Malformed(message) => write!(f, "malformed input: {}", message),
            OfferStampError::ImageDecode(message) => {
                write!(f, "image decode failed: {}", message)
            }
            OfferStampError::Chart(message) => write!(f, "chart draw failed: {}", message),
            OfferStampError::Merge(message) => write!(f, "merge failed: {}", message),
            OfferStampError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            OfferStampError::Unexpected(message) => write!(f, "unexpected: {}", message),
            OfferStampError::Io(err) => write!(f, "io error: {}", err),
            OfferStampError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for OfferStampError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OfferStampError::Io(err) => Some(err),
            OfferStampError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OfferStampError {
    fn from(value: std::io::Error) -> Self {
        OfferStampError::Io(value)
    }
}

impl From<serde_json::Error> for OfferStampError {
    fn from(value: serde_json::Error) -> Self {
        OfferStampError::Json(value)
    }
}

impl From<lopdf::Error> for OfferStampError {
    fn from(value: lopdf::Error) -> Self {
        OfferStampError::Merge(format!("pdf error: {}", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    PageCountFallback,
    MalformedEntry,
    ImageDecode,
    ChartDraw,
    Merge,
    AlignmentDisabled,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::PageCountFallback => "page_count_fallback",
            DiagnosticKind::MalformedEntry => "malformed_entry",
            DiagnosticKind::ImageDecode => "image_decode",
            DiagnosticKind::ChartDraw => "chart_draw",
            DiagnosticKind::Merge => "merge",
            DiagnosticKind::AlignmentDisabled => "alignment_disabled",
        }
    }
}

/// A problem that was recovered in place and reported alongside the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub page: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, page: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            kind,
            page,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "[{}] page {}: {}", self.kind.as_str(), page, self.message),
            None => write!(f, "[{}] {}", self.kind.as_str(), self.message),
        }
    }
}

/// Collects diagnostics for one generation run and mirrors each to the log.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub fn report(&mut self, kind: DiagnosticKind, page: Option<usize>, message: impl Into<String>) {
        self.push(Diagnostic::new(kind, page, message));
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
