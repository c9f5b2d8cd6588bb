//! Message catalogue loaded from JSON:
//!
//! ```json
//! { "default_exceptions": { "GATEWAY_TIMEOUT": "The provider did not answer in {seconds}s" } }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

use crate::ports::Translator;

type Catalog = HashMap<String, HashMap<String, String>>;

#[derive(Debug, Clone, Default)]
pub struct CatalogTranslator {
    catalog: Catalog,
}

impl CatalogTranslator {
    /// Translator with no messages; every lookup returns its key.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let catalog: Catalog = serde_json::from_str(json).context("invalid message catalogue")?;
        Ok(Self { catalog })
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read message catalogue {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.catalog.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Translator for CatalogTranslator {
    fn translate(&self, domain: &str, key: &str, args: &[(&str, &str)]) -> String {
        let Some(template) = self.catalog.get(domain).and_then(|messages| messages.get(key)) else {
            return key.to_string();
        };
        args.iter().fold(template.clone(), |message, (name, value)| {
            message.replace(&format!("{{{name}}}"), value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"{
        "default_exceptions": {
            "GATEWAY_TIMEOUT": "The provider did not answer in {seconds}s"
        },
        "chargeback": {
            "AM04": "Insufficient funds"
        }
    }"#;

    #[test]
    fn test_translate_substitutes_arguments() {
        let translator = CatalogTranslator::from_json(CATALOG).unwrap();
        assert_eq!(
            translator.translate("default_exceptions", "GATEWAY_TIMEOUT", &[("seconds", "30")]),
            "The provider did not answer in 30s"
        );
        assert_eq!(translator.len(), 2);
    }

    #[test]
    fn test_unknown_keys_fall_back_to_key() {
        let translator = CatalogTranslator::from_json(CATALOG).unwrap();
        assert_eq!(translator.translate("chargeback", "XX99", &[]), "XX99");
        assert_eq!(translator.translate("missing", "AM04", &[]), "AM04");
        assert_eq!(CatalogTranslator::empty().translate("chargeback", "AM04", &[]), "AM04");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let translator = CatalogTranslator::from_file(file.path()).unwrap();
        assert_eq!(translator.translate("chargeback", "AM04", &[]), "Insufficient funds");
    }

    #[test]
    fn test_invalid_catalogue_is_rejected() {
        assert!(CatalogTranslator::from_json("[1, 2]").is_err());
    }
}
