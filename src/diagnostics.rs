//! Structured diagnostics collected by every phase.
//!
//! Diagnostics are never thrown; each phase appends to a shared
//! `DiagnosticsRuntime` and keeps going rather than aborting the compile.
//! Ordering is deterministic: per-source, in source order, phases
//! concatenated in pipeline order.

use crate::identity::{Origin, SourceFileId, SourceSpan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// One coded diagnostic, stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub severity: Severity,
    pub span: SourceSpan,
    pub origin: Option<Origin>,
}

impl Diagnostic {
    pub fn new(code: &'static str, message: impl Into<String>, severity: Severity, span: SourceSpan) -> Self {
        Diagnostic { code, message: message.into(), severity, span, origin: None }
    }

    pub fn error(code: &'static str, message: impl Into<String>, span: SourceSpan) -> Self {
        Self::new(code, message, Severity::Error, span)
    }

    pub fn warning(code: &'static str, message: impl Into<String>, span: SourceSpan) -> Self {
        Self::new(code, message, Severity::Warning, span)
    }
}

/// Per-source-file diagnostics channel, append-only within a compile.
///
/// `BTreeMap` keeps files in a stable order for iteration (`all()`) without
/// needing a separate sort step; within one file, diagnostics are kept in
/// push order, which every phase preserves by appending source-ordered
/// instructions/rows before moving on to the next phase.
#[derive(Debug, Default)]
pub struct DiagnosticsRuntime {
    by_file: BTreeMap<SourceFileId, Vec<Diagnostic>>,
}

impl DiagnosticsRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.by_file.entry(diagnostic.span.file).or_default().push(diagnostic);
    }

    pub fn for_file(&self, file: SourceFileId) -> &[Diagnostic] {
        self.by_file.get(&file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    /// All diagnostics in deterministic order: files in registration order,
    /// each file's diagnostics in the order phases appended them.
    pub fn all(&self) -> Vec<Diagnostic> {
        self.by_file.values().flat_map(|v| v.iter().cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SourceFileRegistry;

    #[test]
    fn diagnostics_are_grouped_per_file_in_push_order() {
        let mut reg = SourceFileRegistry::new();
        let a = reg.intern("/a.html");
        let b = reg.intern("/b.html");
        let mut runtime = DiagnosticsRuntime::new();
        runtime.push(Diagnostic::error("AU1101", "unknown controller", SourceSpan::new(b, 0, 1)));
        runtime.push(Diagnostic::error("AU1102", "unknown element", SourceSpan::new(a, 0, 1)));
        runtime.push(Diagnostic::error("AU1103", "unknown event", SourceSpan::new(a, 2, 3)));
        let a_diags = runtime.for_file(a);
        assert_eq!(a_diags.len(), 2);
        assert_eq!(a_diags[0].code, "AU1102");
        assert_eq!(a_diags[1].code, "AU1103");
        assert_eq!(runtime.len(), 3);
    }
}
