//! Branded identifiers and byte-precise source spans.
//!
//! Every cross-phase reference in this crate is by id, never by pointer or
//! borrow: `NodeId`s index into a `DomNode` arena, `FrameId`s index into a
//! scope frame vector, `ExprId`s index into an expression table. This file
//! owns those id types plus the span/provenance machinery every other
//! module threads through its output.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Interned, canonical identity for a source file.
///
/// Two different path strings that refer to the same file MUST resolve to
/// the same id; canonicalization (lowercasing on case-insensitive
/// filesystems, absolute-path resolution) is the `SourceFileResolver`'s job
/// (see `external.rs`) — this type only carries the already-canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceFileId(pub u32);

/// Interner mapping canonical path strings to `SourceFileId`s.
#[derive(Debug, Default)]
pub struct SourceFileRegistry {
    paths: Vec<String>,
    by_path: HashMap<String, SourceFileId>,
}

impl SourceFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `canonical_path`, returning the same id for repeat calls with
    /// the same string.
    pub fn intern(&mut self, canonical_path: impl Into<String>) -> SourceFileId {
        let canonical_path = canonical_path.into();
        if let Some(id) = self.by_path.get(&canonical_path) {
            return *id;
        }
        let id = SourceFileId(self.paths.len() as u32);
        self.paths.push(canonical_path.clone());
        self.by_path.insert(canonical_path, id);
        id
    }

    pub fn path(&self, id: SourceFileId) -> &str {
        &self.paths[id.0 as usize]
    }
}

/// A byte range `[start, end)` into one source file's raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file: SourceFileId,
    pub start: u32,
    pub end: u32,
}

impl SourceSpan {
    pub fn new(file: SourceFileId, start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start must not exceed end");
        SourceSpan { file, start, end }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Slices `text` (the full content of `self.file`) to this span's bytes.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start as usize..self.end as usize]
    }

    /// Builds the span of a sub-range of this span given offsets relative to
    /// `self.start` — used when an attribute value's inner expression needs
    /// an absolute span computed from the attribute's own span.
    pub fn sub_span(&self, relative_start: u32, relative_end: u32) -> SourceSpan {
        SourceSpan {
            file: self.file,
            start: self.start + relative_start,
            end: self.start + relative_end,
        }
    }
}

/// One step recorded in an `Origin`'s trace as a value moves through phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub by: String,
    pub span: Option<SourceSpan>,
}

/// Where a value came from: authored by a human in source text, synthesized
/// by a phase (e.g. a controller's wrapper template), or inferred from
/// context (e.g. a default binding mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Authored {
        span: SourceSpan,
        description: Option<String>,
        trace: Vec<TraceStep>,
    },
    Synthetic {
        description: String,
        span: Option<SourceSpan>,
        derived_from: Option<Box<Origin>>,
        trace: Vec<TraceStep>,
    },
    Inferred {
        description: String,
        span: Option<SourceSpan>,
        derived_from: Option<Box<Origin>>,
        trace: Vec<TraceStep>,
    },
}

impl Origin {
    pub fn authored(span: SourceSpan) -> Self {
        Origin::Authored { span, description: None, trace: Vec::new() }
    }

    pub fn synthetic(description: impl Into<String>) -> Self {
        Origin::Synthetic { description: description.into(), span: None, derived_from: None, trace: Vec::new() }
    }

    pub fn inferred(description: impl Into<String>) -> Self {
        Origin::Inferred { description: description.into(), span: None, derived_from: None, trace: Vec::new() }
    }

    /// Appends a trace step recording which phase touched this value.
    pub fn trace(mut self, by: impl Into<String>, span: Option<SourceSpan>) -> Self {
        let step = TraceStep { by: by.into(), span };
        match &mut self {
            Origin::Authored { trace, .. }
            | Origin::Synthetic { trace, .. }
            | Origin::Inferred { trace, .. } => trace.push(step),
        }
        self
    }

    pub fn span(&self) -> Option<SourceSpan> {
        match self {
            Origin::Authored { span, .. } => Some(*span),
            Origin::Synthetic { span, .. } | Origin::Inferred { span, .. } => *span,
        }
    }
}

/// Carries a value's origin plus a fallback span to use when the origin has
/// none (e.g. a purely synthetic value with no useful source location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Provenance {
    pub origin: Option<Origin>,
    pub fallback_span: Option<SourceSpan>,
}

impl Provenance {
    pub fn authored(span: SourceSpan) -> Self {
        Provenance { origin: Some(Origin::authored(span)), fallback_span: Some(span) }
    }

    pub fn synthetic(description: impl Into<String>) -> Self {
        Provenance { origin: Some(Origin::synthetic(description)), fallback_span: None }
    }

    /// The span to report diagnostics against: the origin's own span if it
    /// has one, else the fallback.
    pub fn provenance_span(&self) -> Option<SourceSpan> {
        self.origin.as_ref().and_then(Origin::span).or(self.fallback_span)
    }
}

macro_rules! dense_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

dense_id!(ExprId);
dense_id!(FrameId);
dense_id!(TemplateId);

/// Monotonic per-template counter producing deterministic `ExprId`s.
///
/// Chosen over hashing `(file, start, end, code)`: a counter reset at the
/// start of each template's lowering is cheaper and just as deterministic
/// given identical input order.
#[derive(Debug, Default)]
pub struct ExprIdAllocator {
    next: u32,
}

impl ExprIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ExprId {
        let id = ExprId(self.next);
        self.next += 1;
        id
    }
}

/// Monotonic per-template counter producing dense `FrameId`s starting at 0.
#[derive(Debug, Default)]
pub struct FrameIdAllocator {
    next: u32,
}

impl FrameIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> FrameId {
        let id = FrameId(self.next);
        self.next += 1;
        id
    }
}

/// Monotonic counter allocating `TemplateId`s across a whole compile (root
/// template plus every synthetic controller/branch/projection template it
/// spawns).
#[derive(Debug, Default)]
pub struct TemplateIdAllocator {
    next: u32,
}

impl TemplateIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> TemplateId {
        let id = TemplateId(self.next);
        self.next += 1;
        id
    }
}

/// Hierarchical, deterministic node identity: children append `/<index>` to
/// the parent, text nodes append `#text@<index>`, comments append
/// `#comment@<index>`, with a separate child counter per kind at each depth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn root() -> Self {
        NodeId("0".to_string())
    }

    fn child(&self, suffix: impl fmt::Display) -> NodeId {
        NodeId(format!("{}{}", self.0, suffix))
    }

    pub fn element_child(&self, index: u32) -> NodeId {
        self.child(format_args!("/{}", index))
    }

    pub fn text_child(&self, index: u32) -> NodeId {
        self.child(format_args!("#text@{}", index))
    }

    pub fn comment_child(&self, index: u32) -> NodeId {
        self.child(format_args!("#comment@{}", index))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-depth child counters used while walking an `HtmlNode` tree, one
/// instance per DOM node currently being lowered.
#[derive(Debug, Default)]
pub struct NodeIdAllocator {
    elements: u32,
    texts: u32,
    comments: u32,
}

impl NodeIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_element(&mut self, parent: &NodeId) -> NodeId {
        let id = parent.element_child(self.elements);
        self.elements += 1;
        id
    }

    pub fn next_text(&mut self, parent: &NodeId) -> NodeId {
        let id = parent.text_child(self.texts);
        self.texts += 1;
        id
    }

    pub fn next_comment(&mut self, parent: &NodeId) -> NodeId {
        let id = parent.comment_child(self.comments);
        self.comments += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_children_are_stable() {
        let root = NodeId::root();
        let mut alloc = NodeIdAllocator::new();
        assert_eq!(alloc.next_element(&root).0, "0/0");
        assert_eq!(alloc.next_text(&root).0, "0#text@0");
        assert_eq!(alloc.next_element(&root).0, "0/1");
        assert_eq!(alloc.next_comment(&root).0, "0#comment@0");
    }

    #[test]
    fn expr_ids_are_monotonic() {
        let mut alloc = ExprIdAllocator::new();
        assert_eq!(alloc.next_id(), ExprId(0));
        assert_eq!(alloc.next_id(), ExprId(1));
    }

    #[test]
    fn same_path_interns_to_same_id() {
        let mut reg = SourceFileRegistry::new();
        let a = reg.intern("/a/b.html");
        let b = reg.intern("/a/b.html");
        assert_eq!(a, b);
    }

    #[test]
    fn provenance_prefers_origin_span_over_fallback() {
        let mut reg = SourceFileRegistry::new();
        let file = reg.intern("/a.html");
        let origin_span = SourceSpan::new(file, 0, 3);
        let fallback_span = SourceSpan::new(file, 10, 13);
        let prov = Provenance {
            origin: Some(Origin::authored(origin_span)),
            fallback_span: Some(fallback_span),
        };
        assert_eq!(prov.provenance_span(), Some(origin_span));
    }
}
