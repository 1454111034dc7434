//! Interfaces to the collaborators this core consumes but never implements:
//! the HTML parser, the expression parser, the attribute parser, and the
//! source-file resolver. This core only depends on the shapes declared
//! here — it must never reach into a concrete parser's internals.

use crate::identity::{SourceFileId, SourceSpan};
use std::fmt;

// ---------------------------------------------------------------------
// HTML parser
// ---------------------------------------------------------------------

/// One authored attribute, with the byte ranges of its name and value when
/// the parser recorded them (value ranges are absent for boolean/value-less
/// attributes).
#[derive(Debug, Clone)]
pub struct HtmlAttr {
    pub name: String,
    pub value: String,
    pub name_span: Option<SourceSpan>,
    pub value_span: Option<SourceSpan>,
}

#[derive(Debug, Clone)]
pub struct HtmlElement {
    pub tag_name: String,
    pub attrs: Vec<HtmlAttr>,
    pub children: Vec<HtmlNode>,
    pub source_span: SourceSpan,
    pub start_tag_span: Option<SourceSpan>,
    pub end_tag_span: Option<SourceSpan>,
    pub is_self_closing: bool,
}

impl HtmlElement {
    pub fn attr(&self, name: &str) -> Option<&HtmlAttr> {
        self.attrs.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
pub struct HtmlText {
    pub value: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct HtmlComment {
    pub value: String,
    pub span: SourceSpan,
}

/// A document-fragment node, produced by the external HTML parser with
/// byte-precise source locations for every element, start tag, end tag, and
/// attribute.
#[derive(Debug, Clone)]
pub enum HtmlNode {
    Element(HtmlElement),
    Text(HtmlText),
    Comment(HtmlComment),
}

impl HtmlNode {
    pub fn as_element(&self) -> Option<&HtmlElement> {
        match self {
            HtmlNode::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// Parses raw HTML text into a document-fragment forest.
pub trait HtmlParser {
    fn parse(&self, file: SourceFileId, source: &str) -> Vec<HtmlNode>;
}

// ---------------------------------------------------------------------
// Expression parser
// ---------------------------------------------------------------------

/// What grammar production the expression parser should target, mirroring
/// the authored context the expression was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseContext {
    IsAssign,
    IsIterator,
    Interpolation,
    BindingBehavior,
    Primary,
    None,
}

/// A binding-identifier pattern extracted from a `repeat.for` declaration
/// (`item`, `[a, b]`, `{a, b: renamed}`, with optional defaults/rest),
/// resolved through the expression AST's own visitor interface rather than
/// this core inspecting its internal node shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingPattern {
    Identifier(String),
    Array(Vec<Option<BindingPattern>>, Option<Box<BindingPattern>>),
    Object(Vec<(String, BindingPattern)>, Option<Box<BindingPattern>>),
    Default(Box<BindingPattern>),
}

impl BindingPattern {
    /// Every bound name this pattern introduces, in authored order —
    /// `repeat`'s iterator locals come from this.
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            BindingPattern::Identifier(name) => out.push(name.clone()),
            BindingPattern::Array(elements, rest) => {
                for el in elements.iter().flatten() {
                    el.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            BindingPattern::Object(fields, rest) => {
                for (_, pattern) in fields {
                    pattern.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            BindingPattern::Default(inner) => inner.bound_names(out),
        }
    }
}

/// A parsed `for-of` header (`item of items`). Declaration parsing can fail
/// independently of the iterable expression; a bad declaration carries a
/// message instead of a pattern.
#[derive(Debug)]
pub struct ForOfStatement {
    pub declaration: Result<BindingPattern, String>,
    pub iterable: Box<dyn ExpressionAst>,
}

/// Opaque handle to whatever AST node the external parser produced. This
/// core never matches on a concrete variant set from it — only the methods
/// below, which the parser backend is responsible for answering correctly.
pub trait ExpressionAst: fmt::Debug {
    fn is_bad_expression(&self) -> bool;
    fn bad_message(&self) -> Option<String> {
        None
    }
    /// Present only when parsed with `ParseContext::IsIterator`.
    fn as_for_of(&self) -> Option<&ForOfStatement> {
        None
    }
    /// Value converter names applied via `| name` inside this expression,
    /// surfaced so Link can validate them against the catalog (`AU0103`)
    /// without this core inspecting the expression's internal node shapes.
    fn value_converter_names(&self) -> Vec<String> {
        Vec::new()
    }
    /// Binding behavior names applied via `& name` inside this expression
    /// (`AU0101`).
    fn binding_behavior_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A trivially "bad" AST node, useful for collaborators and tests that need
/// to report a parse failure without building a full AST type.
#[derive(Debug)]
pub struct BadExpression {
    pub message: String,
}

impl ExpressionAst for BadExpression {
    fn is_bad_expression(&self) -> bool {
        true
    }
    fn bad_message(&self) -> Option<String> {
        Some(self.message.clone())
    }
}

pub trait ExpressionParser {
    fn parse(&self, code: &str, ctx: ParseContext) -> Box<dyn ExpressionAst>;
}

// ---------------------------------------------------------------------
// Attribute parser
// ---------------------------------------------------------------------

/// The decomposition of one authored attribute name into a binding target
/// and an optional command suffix: `route.bind` → `{ target: "route",
/// command: Some("bind") }`; a plain attribute like `class` has no command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttribute {
    pub target: String,
    pub command: Option<String>,
    pub raw_name: String,
    pub raw_value: String,
}

pub trait AttributeParser {
    fn parse(&self, name: &str, value: &str) -> ParsedAttribute;
}

/// Splits `name` on the last `.` into `(target, command)`, the default
/// syntax this core's scenarios assume (`prop.bind`, `event.trigger`, …).
/// Collaborators with a richer attribute-pattern language provide their
/// own `AttributeParser`.
pub struct DefaultAttributeParser;

impl AttributeParser for DefaultAttributeParser {
    fn parse(&self, name: &str, value: &str) -> ParsedAttribute {
        match name.rfind('.') {
            Some(idx) => ParsedAttribute {
                target: name[..idx].to_string(),
                command: Some(name[idx + 1..].to_string()),
                raw_name: name.to_string(),
                raw_value: value.to_string(),
            },
            None => ParsedAttribute {
                target: name.to_string(),
                command: None,
                raw_name: name.to_string(),
                raw_value: value.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------
// Source file resolver
// ---------------------------------------------------------------------

use crate::error::CoreError;

/// Converts a raw, possibly relative path into a canonical `SourceFileId`.
pub trait SourceFileResolver {
    fn resolve(&mut self, raw_path: &str) -> Result<SourceFileId, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_attribute_parser_splits_on_last_dot() {
        let parsed = DefaultAttributeParser.parse("route.bind", "currentRoute");
        assert_eq!(parsed.target, "route");
        assert_eq!(parsed.command.as_deref(), Some("bind"));
    }

    #[test]
    fn default_attribute_parser_handles_plain_names() {
        let parsed = DefaultAttributeParser.parse("class", "active");
        assert_eq!(parsed.target, "class");
        assert_eq!(parsed.command, None);
    }

    #[test]
    fn binding_pattern_collects_array_and_object_names() {
        let pattern = BindingPattern::Array(
            vec![Some(BindingPattern::Identifier("a".into())), None],
            Some(Box::new(BindingPattern::Identifier("rest".into()))),
        );
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        assert_eq!(names, vec!["a".to_string(), "rest".to_string()]);
    }
}
