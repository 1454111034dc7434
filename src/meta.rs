//! Meta extraction: finds compile-time-only elements/attributes
//! (`<import>`, `<bindable>`, `<use-shadow-dom>`, …) before Lower ever sees
//! the tree, and records the byte ranges that must be stripped from the
//! rendered output.

use crate::external::{HtmlAttr, HtmlElement, HtmlNode};
use crate::identity::SourceSpan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    pub value: T,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct ImportMeta {
    pub from: Located<String>,
    pub named_aliases: Vec<NamedAlias>,
}

#[derive(Debug, Clone)]
pub struct NamedAlias {
    pub export_name: Located<String>,
    pub alias: Located<String>,
}

#[derive(Debug, Clone)]
pub enum ImportKind {
    Import,
    Require,
}

#[derive(Debug, Clone)]
pub struct ImportEntry {
    pub kind: ImportKind,
    pub meta: ImportMeta,
}

#[derive(Debug, Clone)]
pub struct BindableMeta {
    pub name: Located<String>,
    pub attribute: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AliasMeta {
    pub names: Vec<Located<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct MetaResult {
    pub imports: Vec<ImportEntry>,
    pub bindables: Vec<BindableMeta>,
    pub use_shadow_dom: bool,
    pub containerless: bool,
    pub capture: bool,
    pub aliases: Vec<AliasMeta>,
    pub has_slot: bool,
}

/// Walks `nodes`, collecting meta entries and the spans that must be
/// removed from the rendered HTML. `<template as-custom-element>` roots are
/// not descended into — their content is a local element definition, out
/// of scope for the enclosing template's meta.
pub fn extract_meta(nodes: &[HtmlNode]) -> (MetaResult, Vec<SourceSpan>) {
    let mut result = MetaResult::default();
    let mut remove_ranges = Vec::new();
    for node in nodes {
        walk(node, &mut result, &mut remove_ranges, true);
    }
    remove_ranges.sort_by_key(|s: &SourceSpan| s.start);
    (result, remove_ranges)
}

fn walk(node: &HtmlNode, result: &mut MetaResult, remove_ranges: &mut Vec<SourceSpan>, top_level: bool) {
    let element = match node.as_element() {
        Some(e) => e,
        None => return,
    };

    let tag = element.tag_name.to_ascii_lowercase();
    let mut handled = false;

    match tag.as_str() {
        "import" | "require" => {
            if let Some(entry) = extract_import(element, matches!(tag.as_str(), "require")) {
                remove_ranges.push(element.source_span);
                result.imports.push(entry);
            }
            handled = true;
        }
        "bindable" => {
            if let Some(b) = extract_bindable(element) {
                remove_ranges.push(element.source_span);
                result.bindables.push(b);
            }
            handled = true;
        }
        "use-shadow-dom" => {
            result.use_shadow_dom = true;
            remove_ranges.push(element.source_span);
            handled = true;
        }
        "containerless" => {
            result.containerless = true;
            remove_ranges.push(element.source_span);
            handled = true;
        }
        "capture" => {
            result.capture = true;
            remove_ranges.push(element.source_span);
            handled = true;
        }
        "alias" => {
            if let Some(a) = extract_alias(element) {
                remove_ranges.push(element.source_span);
                result.aliases.push(a);
            }
            handled = true;
        }
        "slot" => {
            result.has_slot = true;
            // not stripped: only presence is recorded.
        }
        "template" => {
            extract_template_attrs(element, result, remove_ranges);
            if has_attr(element, "as-custom-element") {
                // local element definition: its own meta is scoped to
                // itself, not the enclosing template.
                return;
            }
        }
        _ => {}
    }

    if handled {
        return;
    }

    for child in &element.children {
        walk(child, result, remove_ranges, false);
    }
    let _ = top_level;
}

fn has_attr(element: &HtmlElement, name: &str) -> bool {
    element.attr(name).is_some()
}

fn extract_template_attrs(element: &HtmlElement, result: &mut MetaResult, remove_ranges: &mut Vec<SourceSpan>) {
    for attr in &element.attrs {
        let name = attr.name.to_ascii_lowercase();
        let span = attr_span(attr, element);
        match name.as_str() {
            "use-shadow-dom" => {
                result.use_shadow_dom = true;
                if let Some(s) = span {
                    remove_ranges.push(s);
                }
            }
            "containerless" => {
                result.containerless = true;
                if let Some(s) = span {
                    remove_ranges.push(s);
                }
            }
            "capture" => {
                result.capture = true;
                if let Some(s) = span {
                    remove_ranges.push(s);
                }
            }
            "alias" => {
                if let Some(span) = span {
                    let names = split_alias_names(&attr.value, span);
                    result.aliases.push(AliasMeta { names });
                    remove_ranges.push(span);
                }
            }
            "bindable" => {
                if let Some(span) = span {
                    for name in attr.value.split(',') {
                        let trimmed = name.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        result.bindables.push(BindableMeta {
                            name: Located { value: trimmed.to_string(), span },
                            attribute: None,
                            mode: None,
                        });
                    }
                    remove_ranges.push(span);
                }
            }
            _ => {}
        }
    }
}

fn attr_span(attr: &HtmlAttr, element: &HtmlElement) -> Option<SourceSpan> {
    attr.value_span.or(attr.name_span).or(Some(element.source_span))
}

/// `<alias name="a, b, c">` → one `AliasMeta` with three independently
/// spanned `Located<Name>`s.
fn split_alias_names(value: &str, attr_value_span: SourceSpan) -> Vec<Located<String>> {
    let mut out = Vec::new();
    let mut offset: u32 = 0;
    for part in value.split(',') {
        let leading_ws = (part.len() - part.trim_start().len()) as u32;
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            let start = offset + leading_ws;
            let end = start + trimmed.len() as u32;
            out.push(Located {
                value: trimmed.to_string(),
                span: attr_value_span.sub_span(start, end),
            });
        }
        offset += part.len() as u32 + 1; // +1 for the consumed comma
    }
    out
}

fn extract_alias(element: &HtmlElement) -> Option<AliasMeta> {
    let attr = element.attr("name")?;
    let span = attr_span(attr, element)?;
    Some(AliasMeta { names: split_alias_names(&attr.value, span) })
}

fn extract_bindable(element: &HtmlElement) -> Option<BindableMeta> {
    let attr = element.attr("name")?;
    let span = attr_span(attr, element)?;
    Some(BindableMeta {
        name: Located { value: attr.value.clone(), span },
        attribute: element.attr("attribute").map(|a| a.value.clone()),
        mode: element.attr("mode").map(|a| a.value.clone()),
    })
}

/// `<import from="./converters" DateFormat.as="df">`: `from` is required;
/// any other attribute `X.as="Y"` is a named alias. Export names preserve
/// authored casing (the HTML parser may hand us lowercased attribute
/// names; the span lets a caller recover the original text if needed).
fn extract_import(element: &HtmlElement, is_require: bool) -> Option<ImportEntry> {
    let from_attr = element.attr("from")?;
    let from_span = attr_span(from_attr, element)?;
    let from = Located { value: from_attr.value.clone(), span: from_span };

    let mut named_aliases = Vec::new();
    for attr in &element.attrs {
        let lower_name = attr.name.to_ascii_lowercase();
        if lower_name == "from" {
            continue;
        }
        if let Some(idx) = attr.name.to_ascii_lowercase().find(".as") {
            let export_name_text = &attr.name[..idx];
            let full_name_span = attr.name_span.unwrap_or(element.source_span);
            let name_span = full_name_span.sub_span(0, idx as u32);
            let value_span = attr_span(attr, element).unwrap_or(element.source_span);
            named_aliases.push(NamedAlias {
                export_name: Located { value: export_name_text.to_string(), span: name_span },
                alias: Located { value: attr.value.clone(), span: value_span },
            });
        }
    }

    Some(ImportEntry {
        kind: if is_require { ImportKind::Require } else { ImportKind::Import },
        meta: ImportMeta { from, named_aliases },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{SourceFileRegistry, SourceSpan};

    fn span(file: crate::identity::SourceFileId, start: u32, end: u32) -> SourceSpan {
        SourceSpan::new(file, start, end)
    }

    #[test]
    fn import_requires_from_and_skips_silently_without_it() {
        let mut reg = SourceFileRegistry::new();
        let file = reg.intern("/a.html");
        let element = HtmlElement {
            tag_name: "import".into(),
            attrs: vec![],
            children: vec![],
            source_span: span(file, 0, 10),
            start_tag_span: None,
            end_tag_span: None,
            is_self_closing: true,
        };
        assert!(extract_import(&element, false).is_none());
    }

    #[test]
    fn alias_name_list_splits_into_located_entries() {
        let names = split_alias_names(" a, b ,c", SourceSpan::new(crate::identity::SourceFileId(0), 100, 108));
        assert_eq!(names.len(), 3);
        assert_eq!(names[0].value, "a");
        assert_eq!(names[1].value, "b");
        assert_eq!(names[2].value, "c");
    }

    #[test]
    fn slot_is_recorded_but_not_stripped() {
        let mut reg = SourceFileRegistry::new();
        let file = reg.intern("/a.html");
        let slot = HtmlNode::Element(HtmlElement {
            tag_name: "slot".into(),
            attrs: vec![],
            children: vec![],
            source_span: span(file, 0, 6),
            start_tag_span: None,
            end_tag_span: None,
            is_self_closing: true,
        });
        let (meta, ranges) = extract_meta(&[slot]);
        assert!(meta.has_slot);
        assert!(ranges.is_empty());
    }
}
