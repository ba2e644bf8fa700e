//! Field specifications and value conversion.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::pattern::Signature;

/// Where a matched field's raw value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    /// The text content of the matched element.
    Text,
    /// A named attribute of the matched element. Some values (download
    /// URLs, outbound links) live in attributes, not text nodes.
    Attribute(String),
}

/// Conversion failure. Non-fatal: the field is left unset and a diagnostic
/// is logged.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConvertError(pub String);

/// Pure transform from raw matched text (or attribute value) to a typed
/// value.
pub type Converter = Arc<dyn Fn(&str) -> Result<Value, ConvertError> + Send + Sync>;

/// A named field: where to find it and how to type it.
#[derive(Clone)]
pub struct FieldSpec {
    name: String,
    signature: Signature,
    source: ValueSource,
    converter: Option<Converter>,
}

impl FieldSpec {
    /// A field read from the matched element's text content.
    pub fn text(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            source: ValueSource::Text,
            converter: None,
        }
    }

    /// A field read from an attribute of the matched element.
    pub fn attribute(
        name: impl Into<String>,
        signature: Signature,
        attr: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            signature,
            source: ValueSource::Attribute(attr.into()),
            converter: None,
        }
    }

    pub fn with_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&str) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(converter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn source(&self) -> &ValueSource {
        &self.source
    }

    /// Run the registered converter; without one the raw text passes
    /// through as a string.
    pub fn convert(&self, raw: &str) -> Result<Value, ConvertError> {
        match &self.converter {
            Some(converter) => converter(raw),
            None => Ok(Value::String(raw.to_string())),
        }
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("source", &self.source)
            .field("converter", &self.converter.as_ref().map(|_| "fn"))
            .finish()
    }
}

/// What to do when a field's signature matches more than once within one
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the last conversion (observed site behavior).
    #[default]
    LastWins,
    /// Keep the first conversion.
    FirstWins,
    /// Fail the parse.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pattern::PatternStep;

    fn sig() -> Signature {
        Signature::new(vec![PatternStep::tag("a")])
    }

    #[test]
    fn test_identity_conversion_by_default() {
        let spec = FieldSpec::text("title", sig());
        assert_eq!(spec.convert("My Song").unwrap(), Value::from("My Song"));
    }

    #[test]
    fn test_registered_converter_runs() {
        let spec = FieldSpec::text("comments", sig()).with_converter(|raw| {
            raw.trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| ConvertError(e.to_string()))
        });
        assert_eq!(spec.convert(" 12 ").unwrap(), Value::from(12));
        assert!(spec.convert("twelve").is_err());
    }
}
