use crate::error::OfferStampError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Background,
    Descriptor,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Background => "background",
            AssetKind::Descriptor => "descriptor",
        }
    }
}

/// Read-only library of background pages and layout descriptors, addressed by
/// 1-based page number and variant.
pub trait AssetSource: Send + Sync {
    fn has(&self, kind: AssetKind, page: usize, variant: &str) -> bool;

    /// Human-readable location, used in missing-asset reports.
    fn location(&self, kind: AssetKind, page: usize, variant: &str) -> String;

    fn background(&self, page: usize, variant: &str) -> Result<Vec<u8>, OfferStampError>;

    fn descriptor(&self, page: usize, variant: &str) -> Result<String, OfferStampError>;

    /// Locations of every asset page `page` needs but the library lacks.
    fn missing(&self, page: usize, variant: &str) -> Vec<String> {
        [AssetKind::Descriptor, AssetKind::Background]
            .into_iter()
            .filter(|kind| !self.has(*kind, page, variant))
            .map(|kind| self.location(kind, page, variant))
            .collect()
    }
}

/// `<root>/backgrounds/<variant>/page_<n>.pdf` and
/// `<root>/layouts/<variant>/page_<n>.txt`, falling back to `<root>/layouts/page_<n>.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn background_path(&self, page: usize, variant: &str) -> PathBuf {
        self.root
            .join("backgrounds")
            .join(variant)
            .join(format!("page_{page}.pdf"))
    }

    fn descriptor_path(&self, page: usize, variant: &str) -> PathBuf {
        let file = format!("page_{page}.txt");
        let specific = self.root.join("layouts").join(variant).join(&file);
        if specific.is_file() {
            return specific;
        }
        let shared = self.root.join("layouts").join(&file);
        if shared.is_file() { shared } else { specific }
    }

    fn path(&self, kind: AssetKind, page: usize, variant: &str) -> PathBuf {
        match kind {
            AssetKind::Background => self.background_path(page, variant),
            AssetKind::Descriptor => self.descriptor_path(page, variant),
        }
    }

    fn missing_error(&self, kind: AssetKind, page: usize, variant: &str) -> OfferStampError {
        OfferStampError::AssetMissing(vec![self.location(kind, page, variant)])
    }
}

impl AssetSource for DirectoryLibrary {
    fn has(&self, kind: AssetKind, page: usize, variant: &str) -> bool {
        self.path(kind, page, variant).is_file()
    }

    fn location(&self, kind: AssetKind, page: usize, variant: &str) -> String {
        self.path(kind, page, variant).display().to_string()
    }

    fn background(&self, page: usize, variant: &str) -> Result<Vec<u8>, OfferStampError> {
        let path = self.background_path(page, variant);
        if !path.is_file() {
            return Err(self.missing_error(AssetKind::Background, page, variant));
        }
        Ok(std::fs::read(path)?)
    }

    fn descriptor(&self, page: usize, variant: &str) -> Result<String, OfferStampError> {
        let path = self.descriptor_path(page, variant);
        if !path.is_file() {
            return Err(self.missing_error(AssetKind::Descriptor, page, variant));
        }
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// In-memory library. Descriptors registered without a variant serve every variant.
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    backgrounds: HashMap<(usize, String), Vec<u8>>,
    descriptors: HashMap<(usize, Option<String>), String>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_background(&mut self, page: usize, variant: &str, bytes: Vec<u8>) {
        self.backgrounds.insert((page, variant.to_string()), bytes);
    }

    pub fn insert_descriptor(&mut self, page: usize, variant: Option<&str>, text: impl Into<String>) {
        self.descriptors
            .insert((page, variant.map(str::to_string)), text.into());
    }

    fn find_descriptor(&self, page: usize, variant: &str) -> Option<&String> {
        self.descriptors
            .get(&(page, Some(variant.to_string())))
            .or_else(|| self.descriptors.get(&(page, None)))
    }
}

impl AssetSource for MemoryLibrary {
    fn has(&self, kind: AssetKind, page: usize, variant: &str) -> bool {
        match kind {
            AssetKind::Background => self.backgrounds.contains_key(&(page, variant.to_string())),
            AssetKind::Descriptor => self.find_descriptor(page, variant).is_some(),
        }
    }

    fn location(&self, kind: AssetKind, page: usize, variant: &str) -> String {
        format!("memory:{}/{}/page_{}", kind.as_str(), variant, page)
    }

    fn background(&self, page: usize, variant: &str) -> Result<Vec<u8>, OfferStampError> {
        self.backgrounds
            .get(&(page, variant.to_string()))
            .cloned()
            .ok_or_else(|| {
                OfferStampError::AssetMissing(vec![self.location(
                    AssetKind::Background,
                    page,
                    variant,
                )])
            })
    }

    fn descriptor(&self, page: usize, variant: &str) -> Result<String, OfferStampError> {
        self.find_descriptor(page, variant).cloned().ok_or_else(|| {
            OfferStampError::AssetMissing(vec![self.location(
                AssetKind::Descriptor,
                page,
                variant,
            )])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let root = std::env::temp_dir().join(format!(
            "offerstamp-{name}-{}-{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&root).expect("temp root");
        root
    }

    #[test]
    fn directory_library_falls_back_to_shared_layouts() {
        let root = temp_root("layouts");
        std::fs::create_dir_all(root.join("layouts/premium")).expect("dirs");
        std::fs::create_dir_all(root.join("backgrounds/premium")).expect("dirs");
        std::fs::write(root.join("layouts/page_1.txt"), "Text: shared").expect("write");
        std::fs::write(root.join("layouts/premium/page_2.txt"), "Text: own").expect("write");
        std::fs::write(root.join("backgrounds/premium/page_1.pdf"), b"%PDF").expect("write");

        let lib = DirectoryLibrary::new(&root);
        assert_eq!(lib.descriptor(1, "premium").expect("shared"), "Text: shared");
        assert_eq!(lib.descriptor(2, "premium").expect("own"), "Text: own");
        assert!(lib.missing(1, "premium").is_empty());
        let missing = lib.missing(2, "premium");
        assert_eq!(missing.len(), 1);
        assert!(missing[0].ends_with("page_2.pdf"));
        assert!(matches!(
            lib.background(3, "premium"),
            Err(OfferStampError::AssetMissing(_))
        ));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn memory_library_shares_variantless_descriptors() {
        let mut lib = MemoryLibrary::new();
        lib.insert_descriptor(1, None, "Text: a");
        lib.insert_descriptor(1, Some("premium"), "Text: b");
        lib.insert_background(1, "standard", vec![1, 2, 3]);
        assert_eq!(lib.descriptor(1, "standard").expect("shared"), "Text: a");
        assert_eq!(lib.descriptor(1, "premium").expect("specific"), "Text: b");
        assert!(lib.missing(1, "standard").is_empty());
        assert_eq!(lib.missing(1, "premium").len(), 1);
        assert_eq!(lib.missing(2, "standard").len(), 2);
    }
}
