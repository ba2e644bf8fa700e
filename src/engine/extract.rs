//! Single-pass record extraction over the structural event stream.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::fields::{ConflictPolicy, FieldSpec, ValueSource};
use super::path::{ElementFrame, PathTracker};
use super::pattern::MarkerPattern;
use super::tokenizer::{Event, Tokenizer};
use super::ExtractError;

/// Everything the engine needs to know about one page family, passed in
/// explicitly at construction. No module-level defaults.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    marker: MarkerPattern,
    ignore: Vec<String>,
    fields: Vec<FieldSpec>,
    conflicts: ConflictPolicy,
}

impl ExtractConfig {
    pub fn new(marker: MarkerPattern) -> Self {
        Self {
            marker,
            ignore: Vec::new(),
            fields: Vec::new(),
            conflicts: ConflictPolicy::default(),
        }
    }

    /// Element names the source markup never closes; they are matched
    /// transiently and never pushed onto the path stack.
    pub fn ignore_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Layer further field specs on top of an existing set. Composition,
    /// not inheritance: a caller extends a base spec list by value.
    pub fn extend_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.conflicts = policy;
        self
    }
}

/// One extracted record: the marker's identifying attribute plus the
/// converted field values, in field-name order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn int_field(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }
}

/// The extraction engine.
///
/// An instance holds configuration only; every [`extract`](Self::extract)
/// call is an independent single pass, so one engine can serve many
/// documents, including from different threads.
pub struct Extractor {
    config: ExtractConfig,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Extract all records from one document, in document order.
    pub fn extract(&self, html: &str) -> Result<Vec<Record>, ExtractError> {
        let mut pass = Pass::new(&self.config);
        for event in Tokenizer::new(html) {
            match event {
                Event::Open {
                    name,
                    attributes,
                    self_closing,
                } => pass.on_open(ElementFrame { name, attributes }, self_closing)?,
                Event::Close { name } => pass.on_close(&name)?,
                Event::Text(text) => pass.on_text(&text)?,
            }
        }
        pass.finish()
    }
}

/// State for one document pass: the live path, the at-most-one open
/// record, and the sealed output.
struct Pass<'a> {
    config: &'a ExtractConfig,
    path: PathTracker,
    current: Option<OpenRecord>,
    sealed: Vec<Record>,
}

struct OpenRecord {
    record: Record,
    /// Path depth at which the marker sits; the record seals when depth
    /// drops strictly below this.
    depth: usize,
    /// Per-field match counts, for cardinality diagnostics.
    matches: HashMap<String, u32>,
}

impl<'a> Pass<'a> {
    fn new(config: &'a ExtractConfig) -> Self {
        Self {
            config,
            path: PathTracker::new(config.ignore.iter().cloned()),
            current: None,
            sealed: Vec::new(),
        }
    }

    fn on_open(&mut self, frame: ElementFrame, self_closing: bool) -> Result<(), ExtractError> {
        let config = self.config;
        let transient = self_closing || self.path.is_ignored(&frame.name);

        if !transient && config.marker.matches(&frame) {
            if let Some(open) = &self.current {
                return Err(ExtractError::UnclosedRecord {
                    id: open.record.id.clone(),
                    cause: "the next record marker",
                });
            }
            let id = config.marker.identity(&frame).ok_or_else(|| {
                ExtractError::MissingIdentifyingAttribute {
                    tag: frame.name.clone(),
                    attr: config.marker.id_attr().to_string(),
                }
            })?;
            self.current = Some(OpenRecord {
                record: Record::new(id),
                depth: self.path.depth() + 1,
                matches: HashMap::new(),
            });
        }

        self.path.open(frame);

        // Attribute-sourced fields carry their value on the element itself,
        // so they are resolved here; transient frames participate for the
        // duration of this event only.
        if self.current.is_some() {
            for spec in &config.fields {
                let ValueSource::Attribute(attr) = spec.source() else {
                    continue;
                };
                let raw = {
                    let path = self.path.path();
                    if !spec.signature().matches_path(path) {
                        continue;
                    }
                    match path.last().and_then(|f| f.attr(attr)) {
                        Some(value) => value.to_string(),
                        None => continue,
                    }
                };
                self.assign(spec, &raw)?;
            }
        }

        if transient {
            self.path.pop();
        }
        Ok(())
    }

    fn on_close(&mut self, name: &str) -> Result<(), ExtractError> {
        if self.path.is_ignored(name) {
            return Ok(());
        }
        self.path.close(name)?;
        if let Some(open) = &self.current {
            if self.path.depth() < open.depth {
                self.seal();
            }
        }
        Ok(())
    }

    fn on_text(&mut self, text: &str) -> Result<(), ExtractError> {
        if self.current.is_none() || text.trim().is_empty() {
            return Ok(());
        }
        let config = self.config;
        for spec in &config.fields {
            if spec.source() != &ValueSource::Text {
                continue;
            }
            if !spec.signature().matches_path(self.path.path()) {
                continue;
            }
            self.assign(spec, text)?;
        }
        Ok(())
    }

    fn assign(&mut self, spec: &FieldSpec, raw: &str) -> Result<(), ExtractError> {
        let policy = self.config.conflicts;
        let Some(open) = self.current.as_mut() else {
            return Ok(());
        };
        let count = open.matches.entry(spec.name().to_string()).or_insert(0);
        *count += 1;
        if *count > 1 {
            match policy {
                ConflictPolicy::Error => {
                    return Err(ExtractError::FieldConflict {
                        field: spec.name().to_string(),
                        id: open.record.id.clone(),
                    });
                }
                ConflictPolicy::FirstWins => return Ok(()),
                ConflictPolicy::LastWins => {}
            }
        }
        match spec.convert(raw) {
            Ok(value) => {
                open.record.fields.insert(spec.name().to_string(), value);
            }
            Err(err) => warn!(
                field = spec.name(),
                id = %open.record.id,
                %err,
                "field conversion failed, leaving field unset"
            ),
        }
        Ok(())
    }

    fn seal(&mut self) {
        let Some(open) = self.current.take() else {
            return;
        };
        for spec in &self.config.fields {
            match open.matches.get(spec.name()).copied().unwrap_or(0) {
                0 => warn!(
                    field = spec.name(),
                    id = %open.record.id,
                    "field signature matched nothing in this record"
                ),
                1 => {}
                n => warn!(
                    field = spec.name(),
                    id = %open.record.id,
                    matches = n,
                    "field signature matched multiple locations"
                ),
            }
        }
        self.sealed.push(open.record);
    }

    fn finish(mut self) -> Result<Vec<Record>, ExtractError> {
        if let Some(open) = self.current.take() {
            return Err(ExtractError::UnclosedRecord {
                id: open.record.id,
                cause: "end of input",
            });
        }
        Ok(self.sealed)
    }
}
