//! Record formatters
//!
//! A formatter turns an [`AuditRecord`] into the text written by a handler's
//! transport. The built-in [`JsonFormatter`] covers the common cases; custom
//! formatters are produced by named factories registered on
//! [`FormatterFactories`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::record::AuditRecord;
use crate::error::{Error, Result};

pub mod json;

pub use json::{strip_date_prefix, unescape_control_characters, JsonFormatter, JsonFormatterOptions};

/// Turns audit records into bytes for a destination
///
/// Implementations must be pure with respect to the record: the same record
/// and options always produce the same output.
pub trait AuditFormatter: Send + Sync {
    /// Render a record
    fn format(&self, record: &AuditRecord) -> Result<String>;
}

/// A named formatter definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatterConfig {
    /// Unique formatter name referenced by handlers
    pub name: String,
    /// Formatter kind and options
    #[serde(flatten)]
    pub kind: FormatterKind,
}

/// Formatter kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FormatterKind {
    /// Built-in JSON formatter
    Json(JsonFormatterOptions),
    /// Formatter produced by a registered factory
    Custom {
        /// Name of the registered factory
        factory: String,
        /// Free-form properties, in configured order
        #[serde(default)]
        properties: Vec<FormatterProperty>,
    },
}

/// One entry of a custom formatter's ordered property list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatterProperty {
    /// Property key
    pub name: String,
    /// Property value
    pub value: String,
}

impl FormatterProperty {
    /// Create a property entry
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl FormatterConfig {
    /// A JSON formatter with the given options
    pub fn json(name: impl Into<String>, options: JsonFormatterOptions) -> Self {
        Self {
            name: name.into(),
            kind: FormatterKind::Json(options),
        }
    }

    /// A custom formatter built by `factory`
    pub fn custom(
        name: impl Into<String>,
        factory: impl Into<String>,
        properties: Vec<FormatterProperty>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FormatterKind::Custom {
                factory: factory.into(),
                properties,
            },
        }
    }
}

/// Factory function producing a custom formatter from its properties
pub type FormatterFactory =
    Arc<dyn Fn(&[FormatterProperty]) -> Result<Arc<dyn AuditFormatter>> + Send + Sync>;

/// Registry of custom formatter factories, looked up by name
#[derive(Clone, Default)]
pub struct FormatterFactories {
    factories: HashMap<String, FormatterFactory>,
}

impl std::fmt::Debug for FormatterFactories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("FormatterFactories")
            .field("factories", &names)
            .finish()
    }
}

impl FormatterFactories {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&[FormatterProperty]) -> Result<Arc<dyn AuditFormatter>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Whether a factory with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build a formatter from its configuration
    pub fn build(&self, config: &FormatterConfig) -> Result<Arc<dyn AuditFormatter>> {
        match &config.kind {
            FormatterKind::Json(options) => Ok(Arc::new(JsonFormatter::new(options.clone())?)),
            FormatterKind::Custom {
                factory,
                properties,
            } => {
                let factory_fn = self.factories.get(factory).ok_or_else(|| {
                    Error::NotFound(format!(
                        "formatter factory '{}' for formatter '{}'",
                        factory, config.name
                    ))
                })?;
                factory_fn(properties)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct KeyValueFormatter {
        separator: String,
    }

    impl AuditFormatter for KeyValueFormatter {
        fn format(&self, record: &AuditRecord) -> Result<String> {
            Ok(format!(
                "type={}{}success={}",
                record.record_type(),
                self.separator,
                record.success
            ))
        }
    }

    fn factories() -> FormatterFactories {
        let mut factories = FormatterFactories::new();
        factories.register("key-value", |props: &[FormatterProperty]| {
            let separator = props
                .iter()
                .find(|p| p.name == "separator")
                .map(|p| p.value.clone())
                .unwrap_or_else(|| " ".to_string());
            Ok(Arc::new(KeyValueFormatter { separator }) as Arc<dyn AuditFormatter>)
        });
        factories
    }

    #[test]
    fn test_custom_factory_lookup() {
        let config = FormatterConfig::custom(
            "kv",
            "key-value",
            vec![FormatterProperty::new("separator", ";")],
        );
        let formatter = factories().build(&config).unwrap();
        let record = AuditRecord::core(vec![], false, true);

        assert_eq!(formatter.format(&record).unwrap(), "type=core;success=true");
    }

    #[test]
    fn test_unknown_factory_rejected() {
        let config = FormatterConfig::custom("kv", "missing", vec![]);
        let err = factories().build(&config).err().unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_formatter_config_serde() {
        let config = FormatterConfig::custom(
            "kv",
            "key-value",
            vec![
                FormatterProperty::new("b", "2"),
                FormatterProperty::new("a", "1"),
            ],
        );
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["kind"], "custom");
        // Property order is preserved
        assert_eq!(value["properties"][0]["name"], "b");

        let parsed: FormatterConfig = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, config);

        let json: FormatterConfig =
            serde_json::from_str(r#"{"name": "j", "kind": "json", "compact": true}"#).unwrap();
        match json.kind {
            FormatterKind::Json(options) => {
                assert!(options.compact);
                assert!(options.include_date);
            }
            _ => panic!("expected json formatter"),
        }
    }
}
