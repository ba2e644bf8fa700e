//! Structural patterns: attribute constraints, pattern steps, field
//! signatures and the record marker.

use super::path::ElementFrame;

/// Constraint on a single attribute value.
///
/// One type with two variants, so a signature definition works regardless
/// of whether an element writes its class-like attribute as a single value
/// or as a whitespace-separated token list.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrConstraint {
    /// The whole attribute value must equal the given string.
    Exact(String),
    /// The whitespace-split attribute value must contain the given token.
    HasToken(String),
}

impl AttrConstraint {
    pub fn satisfied_by(&self, value: &str) -> bool {
        match self {
            AttrConstraint::Exact(want) => value == want,
            AttrConstraint::HasToken(token) => value.split_whitespace().any(|t| t == token),
        }
    }
}

/// One step of a signature: a tag name plus required attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternStep {
    name: String,
    required: Vec<(String, AttrConstraint)>,
}

impl PatternStep {
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
        }
    }

    pub fn attr_exact(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.required
            .push((attr.into(), AttrConstraint::Exact(value.into())));
        self
    }

    pub fn attr_token(mut self, attr: impl Into<String>, token: impl Into<String>) -> Self {
        self.required
            .push((attr.into(), AttrConstraint::HasToken(token.into())));
        self
    }

    /// Shorthand for the common `class`-token requirement.
    pub fn class_token(self, token: impl Into<String>) -> Self {
        self.attr_token("class", token)
    }

    /// True iff the frame's tag name matches and every required attribute
    /// is present and satisfies its constraint. A missing attribute is an
    /// ordinary non-match, not an error.
    pub fn matches(&self, frame: &ElementFrame) -> bool {
        frame.name == self.name
            && self
                .required
                .iter()
                .all(|(attr, constraint)| {
                    frame.attr(attr).is_some_and(|v| constraint.satisfied_by(v))
                })
    }
}

/// Ordered sequence of steps identifying a field by its position in the
/// ancestor path.
///
/// Read right-to-left: the last step must match the current (innermost)
/// element, each earlier step must match some further-out ancestor, in
/// order, with non-matching ancestors in between skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    steps: Vec<PatternStep>,
}

impl Signature {
    /// An empty signature matches nothing.
    pub fn new(steps: Vec<PatternStep>) -> Self {
        Self { steps }
    }

    pub fn matches_path(&self, path: &[ElementFrame]) -> bool {
        let Some((last, earlier)) = self.steps.split_last() else {
            return false;
        };
        let Some((current, ancestors)) = path.split_last() else {
            return false;
        };
        if !last.matches(current) {
            return false;
        }
        let mut idx = ancestors.len();
        for step in earlier.iter().rev() {
            loop {
                if idx == 0 {
                    return false;
                }
                idx -= 1;
                if step.matches(&ancestors[idx]) {
                    break;
                }
            }
        }
        true
    }
}

/// The structural signature that delimits the start of a new record: an
/// element name, a prefix test on a class-like attribute, and the name of
/// the attribute carrying the record id.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerPattern {
    name: String,
    attr: String,
    prefix: String,
    id_attr: String,
}

impl MarkerPattern {
    pub fn new(
        name: impl Into<String>,
        attr: impl Into<String>,
        prefix: impl Into<String>,
        id_attr: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            attr: attr.into(),
            prefix: prefix.into(),
            id_attr: id_attr.into(),
        }
    }

    pub fn matches(&self, frame: &ElementFrame) -> bool {
        frame.name == self.name
            && frame
                .attr(&self.attr)
                .is_some_and(|v| v.starts_with(&self.prefix))
    }

    pub fn id_attr(&self) -> &str {
        &self.id_attr
    }

    /// The marker's identifying attribute value, if present.
    pub fn identity<'a>(&self, frame: &'a ElementFrame) -> Option<&'a str> {
        frame.attr(&self.id_attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, attrs: &[(&str, &str)]) -> ElementFrame {
        let mut f = ElementFrame::new(name);
        for (k, v) in attrs {
            f = f.with_attr(*k, *v);
        }
        f
    }

    #[test]
    fn test_exact_and_token_constraints() {
        assert!(AttrConstraint::Exact("item-subject".into()).satisfied_by("item-subject"));
        assert!(!AttrConstraint::Exact("item-subject".into()).satisfied_by("item-subject hot"));
        assert!(AttrConstraint::HasToken("item-subject".into()).satisfied_by("item-subject hot"));
        assert!(!AttrConstraint::HasToken("item".into()).satisfied_by("item-subject"));
    }

    #[test]
    fn test_step_requires_all_attributes() {
        let step = PatternStep::tag("div").class_token("a").attr_exact("id", "x");
        assert!(step.matches(&frame("div", &[("class", "a b"), ("id", "x")])));
        assert!(!step.matches(&frame("div", &[("class", "a b")])));
        assert!(!step.matches(&frame("span", &[("class", "a"), ("id", "x")])));
    }

    #[test]
    fn test_signature_suffix_match() {
        let sig = Signature::new(vec![
            PatternStep::tag("div").class_token("item-subject"),
            PatternStep::tag("h3"),
            PatternStep::tag("a"),
        ]);
        let path = [
            frame("body", &[]),
            frame("div", &[("class", "main-item odd")]),
            frame("div", &[("class", "item-subject")]),
            frame("h3", &[]),
            frame("a", &[]),
        ];
        assert!(sig.matches_path(&path));
        // last step must match the innermost element
        assert!(!sig.matches_path(&path[..4]));
    }

    #[test]
    fn test_signature_skips_intermediate_ancestors() {
        let sig = Signature::new(vec![
            PatternStep::tag("div").class_token("item-subject"),
            PatternStep::tag("a"),
        ]);
        let path = [
            frame("div", &[("class", "item-subject")]),
            frame("h3", &[]),
            frame("span", &[]),
            frame("a", &[]),
        ];
        assert!(sig.matches_path(&path));
    }

    #[test]
    fn test_signature_respects_step_order() {
        let sig = Signature::new(vec![
            PatternStep::tag("h3"),
            PatternStep::tag("div"),
            PatternStep::tag("a"),
        ]);
        let path = [frame("div", &[]), frame("h3", &[]), frame("a", &[])];
        // h3 is above div in the path, so step order cannot be satisfied
        assert!(!sig.matches_path(&path));
    }

    #[test]
    fn test_empty_signature_matches_nothing() {
        let sig = Signature::new(Vec::new());
        assert!(!sig.matches_path(&[frame("div", &[])]));
    }

    #[test]
    fn test_marker_prefix_and_identity() {
        let marker = MarkerPattern::new("div", "class", "main-item", "id");
        let hit = frame("div", &[("class", "main-item odd"), ("id", "p107")]);
        let miss = frame("div", &[("class", "sub-item")]);
        assert!(marker.matches(&hit));
        assert!(!marker.matches(&miss));
        assert_eq!(marker.identity(&hit), Some("p107"));
        assert_eq!(marker.identity(&frame("div", &[("class", "main-item")])), None);
    }
}
