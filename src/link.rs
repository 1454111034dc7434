//! Phase 20 — Link: resolves every instruction's target against the
//! catalog, normalizes attribute names to properties, computes effective
//! binding modes, and resolves template controllers.

use crate::catalog::{AttrRes, Catalog, ControllerConfig};
use crate::diagnostics::{Diagnostic, DiagnosticsRuntime};
use crate::ir::{BindingMode, DomNode, Instruction, TemplateIR};
use crate::identity::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeSem {
    Element { tag: String, custom: bool, native: bool },
    Template,
    Text,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnknownReason {
    NoProp,
    NoElement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSem {
    ElementBindable,
    ElementNativeProp,
    AttributeBindable,
    ControllerProp,
    Attribute { attr: String },
    Style,
    Unknown { reason: UnknownReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedController {
    pub name: String,
    pub is_stub: bool,
}

/// One linked instruction: the original's shape plus its resolved target.
/// Carries the `NodeId` it targets so consumers don't need to zip it back
/// against the row it came from.
#[derive(Debug)]
pub struct LinkedInstruction {
    pub target_node: NodeId,
    pub target: TargetSem,
    pub effective_mode: Option<BindingMode>,
    pub event_type: Option<String>,
    pub controller: Option<ResolvedController>,
    pub branch_label: Option<String>,
}

#[derive(Debug, Default)]
pub struct LinkedTemplate {
    pub instructions: Vec<LinkedInstruction>,
    pub node_sem: HashMap<String, NodeSem>,
}

#[derive(Debug, Default)]
pub struct LinkedModule {
    pub root: LinkedTemplate,
}

/// Links one `TemplateIR` (and, recursively, every controller/branch
/// template it contains) against `catalog`, appending diagnostics.
pub fn link(ir: &TemplateIR, catalog: &dyn Catalog, diagnostics: &mut DiagnosticsRuntime) -> LinkedTemplate {
    let mut linked = LinkedTemplate::default();
    link_template(ir, catalog, diagnostics, &mut linked);
    linked
}

fn link_template(ir: &TemplateIR, catalog: &dyn Catalog, diagnostics: &mut DiagnosticsRuntime, linked: &mut LinkedTemplate) {
    classify_dom(&ir.dom, catalog, diagnostics, &mut linked.node_sem);
    check_expr_table(catalog, ir, diagnostics);
    for row in &ir.rows {
        let tag = host_tag(&ir.dom, &row.target);
        let node_sem = linked.node_sem.get(&row.target.0).cloned();
        for ins in &row.instructions {
            link_instruction(ins, &row.target, tag.as_deref(), node_sem.as_ref(), catalog, diagnostics, &mut linked.instructions);
            if let Instruction::HydrateTemplateController { def, .. } = ins {
                link_template(def, catalog, diagnostics, linked);
            }
        }
    }
}

fn classify_dom(node: &DomNode, catalog: &dyn Catalog, diagnostics: &mut DiagnosticsRuntime, out: &mut HashMap<String, NodeSem>) {
    match node {
        DomNode::Element { id, tag, source_span, .. } => {
            let custom = catalog.element(tag).is_some();
            let native = catalog.dom_element(tag).is_some();
            if !custom && !native {
                diagnostics.push(Diagnostic::error("AU1102", format!("unknown custom element '{tag}'"), *source_span));
            }
            out.insert(id.0.clone(), NodeSem::Element { tag: tag.clone(), custom, native });
            for child in node.children() {
                classify_dom(child, catalog, diagnostics, out);
            }
        }
        DomNode::Template { id, .. } => {
            out.insert(id.0.clone(), NodeSem::Template);
            for child in node.children() {
                classify_dom(child, catalog, diagnostics, out);
            }
        }
        DomNode::Text { id, .. } => {
            out.insert(id.0.clone(), NodeSem::Text);
        }
        DomNode::Comment { id, .. } => {
            out.insert(id.0.clone(), NodeSem::Comment);
        }
    }
}

fn host_tag(root: &DomNode, target: &NodeId) -> Option<String> {
    find_tag(root, target)
}

fn find_tag(node: &DomNode, target: &NodeId) -> Option<String> {
    if node.id() == target {
        return match node {
            DomNode::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        };
    }
    node.children().iter().find_map(|c| find_tag(c, target))
}

/// Attr→prop normalization order: preserved prefixes → naming rule exact
/// match → DOM `attrToProp` → global naming map →
/// case-insensitive bindable/prop union match → kebab→camelCase fallback.
pub fn normalize_attr_to_prop(catalog: &dyn Catalog, attr: &str, tag: &str, custom: Option<&crate::catalog::ElementRes>) -> (String, bool) {
    for prefix in catalog.preserved_attr_prefixes() {
        if attr.starts_with(prefix.as_str()) {
            return (attr.to_string(), true);
        }
    }
    if let Some(rule) = catalog.naming_rule(attr, Some(tag)) {
        return (rule.to_string(), false);
    }
    if let Some(dom) = catalog.dom_element(tag) {
        if let Some(prop) = dom.attr_to_prop.get(attr) {
            return (prop.clone(), false);
        }
    }
    if let Some(prop) = catalog.global_naming_map().get(attr) {
        return (prop.clone(), false);
    }
    let lower_attr = attr.to_ascii_lowercase();
    if let Some(custom) = custom {
        if let Some((name, _)) = custom.bindables.iter().find(|(k, _)| k.to_ascii_lowercase() == lower_attr) {
            return (name.clone(), false);
        }
    }
    if let Some(dom) = catalog.dom_element(tag) {
        if let Some((name, _)) = dom.props.iter().find(|(k, _)| k.to_ascii_lowercase() == lower_attr) {
            return (name.clone(), false);
        }
    }
    (crate::util::dash_case_to_camel_case(attr), false)
}

fn resolve_target(catalog: &dyn Catalog, to: &str, tag: Option<&str>, attr_preserved: bool, attr_name: &str) -> TargetSem {
    let tag = match tag {
        Some(t) => t,
        None => return TargetSem::Unknown { reason: UnknownReason::NoElement },
    };
    if let Some(custom) = catalog.element(tag) {
        if custom.bindables.keys().any(|k| k.eq_ignore_ascii_case(to)) {
            return TargetSem::ElementBindable;
        }
    }
    if let Some(dom) = catalog.dom_element(tag) {
        if dom.props.keys().any(|k| k.eq_ignore_ascii_case(to)) {
            return TargetSem::ElementNativeProp;
        }
    }
    if attr_preserved {
        return TargetSem::Attribute { attr: attr_name.to_string() };
    }
    TargetSem::Unknown { reason: UnknownReason::NoProp }
}

/// Resolves a `HydrateAttribute` prop's `to` against the owning custom
/// attribute's own bindables. A multi-binding part (`prop_count > 1`) must
/// name a real bindable; a bare `name.bind="x"` (`prop_count == 1` with `to`
/// equal to the attribute's own name) binds the attribute's primary
/// bindable even though `to` never names one literally.
fn resolve_attribute_target(attr_cfg: Option<&AttrRes>, to: &str, attr_name: &str, prop_count: usize) -> TargetSem {
    let Some(cfg) = attr_cfg else {
        return TargetSem::Unknown { reason: UnknownReason::NoProp };
    };
    if cfg.bindables.keys().any(|k| k.eq_ignore_ascii_case(to)) {
        return TargetSem::AttributeBindable;
    }
    if prop_count == 1 && to.eq_ignore_ascii_case(attr_name) && !cfg.bindables.is_empty() {
        return TargetSem::AttributeBindable;
    }
    TargetSem::Unknown { reason: UnknownReason::NoProp }
}

fn effective_mode(catalog: &dyn Catalog, authored: BindingMode, target: &TargetSem, tag: Option<&str>, to: &str) -> BindingMode {
    if !matches!(authored, BindingMode::Default) {
        return authored;
    }
    match target {
        TargetSem::ElementBindable | TargetSem::ControllerProp | TargetSem::AttributeBindable => BindingMode::ToView,
        TargetSem::ElementNativeProp => {
            if let Some(tag) = tag {
                if catalog.two_way_defaults(tag).iter().any(|n| n == to) {
                    return BindingMode::TwoWay;
                }
                if catalog.global_naming_map().contains_key(to) {
                    return BindingMode::TwoWay;
                }
            }
            BindingMode::ToView
        }
        TargetSem::Attribute { .. } | TargetSem::Unknown { .. } | TargetSem::Style => BindingMode::ToView,
    }
}

#[allow(clippy::too_many_arguments)]
fn link_instruction(
    ins: &Instruction,
    target_node: &NodeId,
    tag: Option<&str>,
    node_sem: Option<&NodeSem>,
    catalog: &dyn Catalog,
    diagnostics: &mut DiagnosticsRuntime,
    out: &mut Vec<LinkedInstruction>,
) {
    match ins {
        Instruction::PropertyBinding { to, mode, span, .. } | Instruction::AttributeBinding { to, mode, span, .. } => {
            let custom_tag = tag.unwrap_or_default();
            let custom = catalog.element(custom_tag);
            let (normalized, preserved) = normalize_attr_to_prop(catalog, to, custom_tag, custom);
            let target = resolve_target(catalog, &normalized, tag, preserved, to);
            if let TargetSem::Unknown { reason: UnknownReason::NoProp } = target {
                diagnostics.push(Diagnostic::error("AU1104", format!("property target '{to}' not found on host"), *span));
            }
            let eff = effective_mode(catalog, *mode, &target, tag, &normalized);
            out.push(LinkedInstruction {
                target_node: target_node.clone(),
                target,
                effective_mode: Some(eff),
                event_type: None,
                controller: None,
                branch_label: None,
            });
        }
        Instruction::StylePropertyBinding { span, .. } => {
            out.push(LinkedInstruction {
                target_node: target_node.clone(),
                target: TargetSem::Style,
                effective_mode: Some(BindingMode::ToView),
                event_type: None,
                controller: None,
                branch_label: None,
            });
            let _ = span;
        }
        Instruction::ListenerBinding { to, span, .. } => {
            let event_type = catalog.event(to, tag).cloned();
            if event_type.is_none() {
                diagnostics.push(Diagnostic::error("AU1103", format!("unknown event '{to}'"), *span));
            }
            out.push(LinkedInstruction {
                target_node: target_node.clone(),
                target: TargetSem::Unknown { reason: UnknownReason::NoProp },
                effective_mode: None,
                event_type,
                controller: None,
                branch_label: None,
            });
        }
        Instruction::HydrateElement { .. } => {
            out.push(LinkedInstruction {
                target_node: target_node.clone(),
                target: TargetSem::ElementBindable,
                effective_mode: None,
                event_type: None,
                controller: None,
                branch_label: None,
            });
        }
        Instruction::HydrateAttribute { name, props, .. } => {
            let attr_cfg = catalog.attribute(name);
            for inner in props {
                let Instruction::PropertyBinding { to, mode, span, .. } = inner else { continue };
                let target = resolve_attribute_target(attr_cfg, to, name, props.len());
                if let TargetSem::Unknown { reason: UnknownReason::NoProp } = target {
                    diagnostics.push(Diagnostic::error("AU1104", format!("property target '{to}' not found on attribute '{name}'"), *span));
                }
                let eff = effective_mode(catalog, *mode, &target, tag, to);
                out.push(LinkedInstruction {
                    target_node: target_node.clone(),
                    target,
                    effective_mode: Some(eff),
                    event_type: None,
                    controller: None,
                    branch_label: None,
                });
            }
        }
        Instruction::HydrateTemplateController { name, branch, span, .. } => {
            let config = resolve_controller(catalog, name, diagnostics, *span);
            out.push(LinkedInstruction {
                target_node: target_node.clone(),
                target: TargetSem::ControllerProp,
                effective_mode: None,
                event_type: None,
                controller: Some(ResolvedController { name: config.name.clone(), is_stub: config.is_stub }),
                branch_label: branch.as_ref().map(branch_label),
            });
        }
        _ => {
            out.push(LinkedInstruction {
                target_node: target_node.clone(),
                target: TargetSem::Unknown { reason: UnknownReason::NoProp },
                effective_mode: None,
                event_type: None,
                controller: None,
                branch_label: None,
            });
        }
    }
    let _ = node_sem;
}

fn branch_label(b: &crate::ir::Branch) -> String {
    match b {
        crate::ir::Branch::Else => "else".to_string(),
    }
}

/// Resolves a controller name against the catalog: a missing config that
/// nonetheless names a custom attribute with `isTemplateController` is
/// synthesized as a stub; a fully-unknown name is stub-flagged and reported
/// as `AU1101`.
fn resolve_controller(catalog: &dyn Catalog, name: &str, diagnostics: &mut DiagnosticsRuntime, span: crate::identity::SourceSpan) -> ControllerConfig {
    if let Some(cfg) = catalog.controller_config(name) {
        return cfg.clone();
    }
    if let Some(attr) = catalog.attribute(name) {
        if attr.is_template_controller {
            let mut stub = ControllerConfig::stub(name);
            stub.props = attr.bindables.clone();
            return stub;
        }
    }
    diagnostics.push(Diagnostic::error("AU1101", format!("unknown template controller '{name}'"), span));
    ControllerConfig::stub(name)
}

/// Checks every expression this template's `exprTable` recorded for
/// value-converter/binding-behavior usages against the catalog
/// (`AU0101`/`AU0103`). Nested controller/branch templates are checked
/// separately as `link_template` recurses into them.
fn check_expr_table(catalog: &dyn Catalog, ir: &TemplateIR, diagnostics: &mut DiagnosticsRuntime) {
    for entry in &ir.expr_table {
        for name in &entry.value_converters {
            if !catalog.has_value_converter(name) {
                diagnostics.push(Diagnostic::error("AU0103", format!("value converter '{name}' not found"), entry.loc));
            }
        }
        for name in &entry.binding_behaviors {
            if !catalog.has_binding_behavior(name) {
                diagnostics.push(Diagnostic::error("AU0101", format!("binding behavior '{name}' not found"), entry.loc));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;

    #[test]
    fn normalize_attr_to_prop_applies_preserved_prefixes() {
        let cat = InMemoryCatalog::with_defaults();
        let (name, preserved) = normalize_attr_to_prop(&cat, "data-foo", "div", None);
        assert_eq!(name, "data-foo");
        assert!(preserved);
    }

    #[test]
    fn normalize_attr_to_prop_falls_back_to_camel_case() {
        let cat = InMemoryCatalog::with_defaults();
        let (name, preserved) = normalize_attr_to_prop(&cat, "classname", "div", None);
        assert_eq!(name, "classname".replace("classname", "classname"));
        assert!(!preserved);
        // falls through naming-rule/dom/global/bindable lookups to kebab->camel
        assert_eq!(crate::util::dash_case_to_camel_case("classname"), "classname");
    }

    #[test]
    fn two_way_default_applies_to_input_value() {
        let cat = InMemoryCatalog::with_defaults();
        let target = TargetSem::ElementNativeProp;
        let mode = effective_mode(&cat, BindingMode::Default, &target, Some("input"), "value");
        assert_eq!(mode, BindingMode::TwoWay);
    }
}
