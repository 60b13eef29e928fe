use crate::descriptor::LayoutElement;
use crate::error::OfferStampError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// `sample text -> semantic key` dictionary. Read-only once built; share it via `Arc`.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderMap {
    entries: HashMap<String, String>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Reads a flat JSON object `{ "sample text": "semantic_key", ... }`.
    pub fn from_json_str(raw: &str) -> Result<Self, OfferStampError> {
        let entries: HashMap<String, String> = serde_json::from_str(raw)?;
        Ok(Self { entries })
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self, OfferStampError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn lookup(&self, sample_text: &str) -> Option<&str> {
        self.entries
            .get(sample_text)
            .or_else(|| self.entries.get(sample_text.trim()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Live values for one generation run, supplied by the business-data side.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenderContext {
    pub values: HashMap<String, String>,
    pub numbers: HashMap<String, f64>,
    /// Base64 image payloads (optionally as `data:` URIs).
    pub images: HashMap<String, String>,
    /// Brand name per logo category.
    pub brands: HashMap<String, String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, OfferStampError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.numbers.insert(key.into(), value);
        self
    }

    pub fn with_image(mut self, key: impl Into<String>, base64: impl Into<String>) -> Self {
        self.images.insert(key.into(), base64.into());
        self
    }

    pub fn with_brand(mut self, category: impl Into<String>, brand: impl Into<String>) -> Self {
        self.brands.insert(category.into(), brand.into());
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.numbers.get(key).copied()
    }

    pub fn image(&self, key: &str) -> Option<&str> {
        self.images.get(key).map(String::as_str)
    }
}

/// Page-specific replacement for a semantic key, consulted before the generic lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideRule {
    Literal(String),
    Blank,
    Alias(String),
    CompanyName,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OverrideEntry {
    #[serde(default)]
    pub page: Option<usize>,
    pub key: String,
    pub rule: OverrideRule,
}

#[derive(Debug, Clone)]
pub struct PlaceholderResolver {
    map: Arc<PlaceholderMap>,
    overrides: HashMap<(Option<usize>, String), OverrideRule>,
    company_name_key: String,
    default_company_name: String,
}

impl PlaceholderResolver {
    pub fn new(map: Arc<PlaceholderMap>) -> Self {
        Self {
            map,
            overrides: HashMap::new(),
            company_name_key: "company_name".to_string(),
            default_company_name: String::new(),
        }
    }

    pub fn with_overrides(mut self, entries: &[OverrideEntry]) -> Self {
        for entry in entries {
            self.overrides
                .insert((entry.page, entry.key.clone()), entry.rule.clone());
        }
        self
    }

    pub fn with_company_name(
        mut self,
        key: impl Into<String>,
        default_name: impl Into<String>,
    ) -> Self {
        self.company_name_key = key.into();
        self.default_company_name = default_name.into();
        self
    }

    /// Semantic key of an element: explicit id first, then the legacy sample-text map.
    pub fn semantic_key<'a>(&'a self, element: &'a LayoutElement) -> Option<&'a str> {
        element
            .key
            .as_deref()
            .or_else(|| self.map.lookup(&element.sample_text))
    }

    pub fn resolve(&self, element: &LayoutElement, ctx: &RenderContext, page: usize) -> String {
        let Some(key) = self.semantic_key(element) else {
            return element.sample_text.clone();
        };
        if let Some(rule) = self.override_for(page, key) {
            return self.apply_rule(rule, ctx);
        }
        ctx.value(key).unwrap_or_default().to_string()
    }

    fn override_for(&self, page: usize, key: &str) -> Option<&OverrideRule> {
        self.overrides
            .get(&(Some(page), key.to_string()))
            .or_else(|| self.overrides.get(&(None, key.to_string())))
    }

    fn apply_rule(&self, rule: &OverrideRule, ctx: &RenderContext) -> String {
        match rule {
            OverrideRule::Literal(text) => text.clone(),
            OverrideRule::Blank => String::new(),
            OverrideRule::Alias(other) => ctx.value(other).unwrap_or_default().to_string(),
            OverrideRule::CompanyName => ctx
                .value(&self.company_name_key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(&self.default_company_name)
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;

    fn resolver() -> PlaceholderResolver {
        let map = PlaceholderMap::from_pairs([
            ("Max Mustermann", "customer_name"),
            ("12.345,00 EUR", "offer_total"),
            ("Solar GmbH", "installer_name"),
        ]);
        PlaceholderResolver::new(Arc::new(map))
    }

    fn element(text: &str) -> LayoutElement {
        LayoutElement::new(text, Rect::new(0.0, 0.0, 100.0, 12.0))
    }

    #[test]
    fn unmapped_text_passes_through_and_mapped_missing_is_empty() {
        let r = resolver();
        let ctx = RenderContext::new().with_value("customer_name", "Erika Example");
        assert_eq!(r.resolve(&element("Max Mustermann"), &ctx, 1), "Erika Example");
        assert_eq!(r.resolve(&element("12.345,00 EUR"), &ctx, 1), "");
        assert_eq!(r.resolve(&element("Your offer"), &ctx, 1), "Your offer");
    }

    #[test]
    fn explicit_key_wins_over_sample_text() {
        let r = resolver();
        let ctx = RenderContext::new()
            .with_value("customer_name", "Erika")
            .with_value("offer_total", "9.999,00 EUR");
        let el = element("Max Mustermann").with_key("offer_total");
        assert_eq!(r.resolve(&el, &ctx, 2), "9.999,00 EUR");
    }

    #[test]
    fn page_specific_override_beats_global_override() {
        let entries = vec![
            OverrideEntry {
                page: None,
                key: "installer_name".to_string(),
                rule: OverrideRule::CompanyName,
            },
            OverrideEntry {
                page: Some(1),
                key: "installer_name".to_string(),
                rule: OverrideRule::Blank,
            },
        ];
        let r = resolver()
            .with_overrides(&entries)
            .with_company_name("company_name", "Default Energy");
        let ctx = RenderContext::new().with_value("company_name", "Acme");
        assert_eq!(r.resolve(&element("Solar GmbH"), &ctx, 1), "");
        assert_eq!(r.resolve(&element("Solar GmbH"), &ctx, 3), "Acme");
        let empty = RenderContext::new();
        assert_eq!(r.resolve(&element("Solar GmbH"), &empty, 3), "Default Energy");
    }

    #[test]
    fn override_entries_deserialize_from_json() {
        let raw = r#"[
            {"key": "title", "rule": {"literal": "Angebot"}},
            {"page": 2, "key": "total", "rule": {"alias": "net_total"}},
            {"key": "installer", "rule": "company_name"}
        ]"#;
        let entries: Vec<OverrideEntry> = serde_json::from_str(raw).expect("parse");
        assert_eq!(entries[0].rule, OverrideRule::Literal("Angebot".to_string()));
        assert_eq!(entries[1].page, Some(2));
        assert_eq!(entries[2].rule, OverrideRule::CompanyName);
    }

    #[test]
    fn placeholder_map_reads_json_object() {
        let map = PlaceholderMap::from_json_str(r#"{"Max Mustermann": "customer_name"}"#)
            .expect("map");
        assert_eq!(map.lookup("Max Mustermann"), Some("customer_name"));
        assert_eq!(map.lookup(" Max Mustermann "), Some("customer_name"));
        assert_eq!(map.lookup("unknown"), None);
    }
}
