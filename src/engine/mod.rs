//! Structural pattern extraction over streaming markup events.
//!
//! The engine consumes a flat stream of element-open / element-close / text
//! events and extracts one record per "marker" block, without ever building
//! a document tree:
//!
//! - [`tokenizer`] turns raw HTML into the event stream
//! - a path tracker maintains the stack of currently-open elements
//! - the marker pattern delimits records, by open-depth comparison
//! - field signatures are matched right-to-left against the ancestor path
//! - converters turn matched text (or attribute values) into typed values
//!
//! Memory use is bounded by nesting depth plus the in-progress record, not
//! by document size. An engine instance holds no per-document state, so
//! independent passes can run on separate threads.

mod extract;
mod fields;
mod path;
mod pattern;
pub mod tokenizer;

pub use extract::{ExtractConfig, Extractor, Record};
pub use fields::{ConflictPolicy, ConvertError, Converter, FieldSpec, ValueSource};
pub use path::{ElementFrame, PathTracker};
pub use pattern::{AttrConstraint, MarkerPattern, PatternStep, Signature};

use thiserror::Error;

/// Fatal extraction failures.
///
/// Structural failures abort the current document entirely: once depth
/// tracking is off, no further output can be trusted, so no partial record
/// list is returned.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A closing tag did not match the innermost open element.
    #[error("mismatched closing tag </{found}> at depth {depth}")]
    StructuralMismatch { found: String, depth: usize },

    /// A record was still open when the next marker or end of input arrived.
    #[error("record `{id}` was not closed before {cause}")]
    UnclosedRecord { id: String, cause: &'static str },

    /// A marker element lacked the attribute that identifies its record.
    #[error("record marker <{tag}> is missing its `{attr}` attribute")]
    MissingIdentifyingAttribute { tag: String, attr: String },

    /// A field matched twice under [`ConflictPolicy::Error`].
    #[error("field `{field}` matched more than once in record `{id}`")]
    FieldConflict { field: String, id: String },
}
