//! Phase 40 — Typecheck: walks a linked template alongside its IR and
//! produces a binding contract for every expression whose target resolved
//! to something concrete, applying configurable coercion rules.
//!
//! Contracts are keyed by `(TemplateId, ExprId)` for the same reason
//! `bind.rs`'s frame map is: every nested controller `def` restarts its own
//! `ExprIdAllocator` from zero, so a bare `ExprId` is ambiguous once more
//! than one template is in play.

use crate::catalog::Catalog;
use crate::diagnostics::DiagnosticsRuntime;
use crate::identity::{ExprId, TemplateId};
use crate::ir::{BindingSource, DomNode, Instruction, TemplateIR};
use crate::link::{LinkedInstruction, LinkedTemplate, TargetSem, UnknownReason};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Off,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Off,
    Lenient,
    Standard,
    Strict,
}

/// `enabled`/preset with explicit fields overriding the preset's defaults,
/// matching override precedence: explicit > preset > default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypecheckConfig {
    pub enabled: bool,
    pub preset: Preset,
    pub dom_coercion: bool,
    pub null_to_string: Severity,
    pub type_mismatch: Severity,
    pub strict_event_handlers: bool,
}

impl TypecheckConfig {
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Off => TypecheckConfig {
                enabled: false,
                preset,
                dom_coercion: false,
                null_to_string: Severity::Off,
                type_mismatch: Severity::Off,
                strict_event_handlers: false,
            },
            Preset::Lenient => TypecheckConfig {
                enabled: true,
                preset,
                dom_coercion: true,
                null_to_string: Severity::Off,
                type_mismatch: Severity::Warning,
                strict_event_handlers: false,
            },
            Preset::Standard => TypecheckConfig {
                enabled: true,
                preset,
                dom_coercion: true,
                null_to_string: Severity::Warning,
                type_mismatch: Severity::Error,
                strict_event_handlers: false,
            },
            Preset::Strict => TypecheckConfig {
                enabled: true,
                preset,
                dom_coercion: false,
                null_to_string: Severity::Error,
                type_mismatch: Severity::Error,
                strict_event_handlers: true,
            },
        }
    }
}

impl Default for TypecheckConfig {
    fn default() -> Self {
        TypecheckConfig::from_preset(Preset::Standard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingContext {
    DomAttribute,
    DomProperty,
    ComponentBindable,
    ControllerProp,
    StyleProperty,
    TemplateLocal,
    EventHandler,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowCoercion {
    pub dom: bool,
    pub null_to_string: bool,
    pub truthy: bool,
    pub function: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingContract {
    pub expected_type: String,
    pub context: BindingContext,
    pub severity: Severity,
    pub allow_coercion: AllowCoercion,
}

#[derive(Debug, Default)]
pub struct TypecheckModule {
    pub contracts: HashMap<(TemplateId, ExprId), BindingContract>,
    pub expected_by_expr: HashMap<(TemplateId, ExprId), String>,
}

const ANY: &str = "any";

fn host_tag<'a>(node: &'a DomNode, target: &crate::identity::NodeId) -> Option<&'a str> {
    if node.id() == target {
        return match node {
            DomNode::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        };
    }
    node.children().iter().find_map(|c| host_tag(c, target))
}

struct Checker<'a> {
    config: &'a TypecheckConfig,
    catalog: &'a dyn Catalog,
    contracts: HashMap<(TemplateId, ExprId), BindingContract>,
    expected_by_expr: HashMap<(TemplateId, ExprId), String>,
    cursor: usize,
}

impl<'a> Checker<'a> {
    fn next_linked<'b>(&mut self, linked: &'b LinkedTemplate) -> Option<&'b LinkedInstruction> {
        let row = linked.instructions.get(self.cursor);
        self.cursor += 1;
        row
    }

    fn record(&mut self, template: TemplateId, id: ExprId, expected: String, context: BindingContext, diagnostics: &mut DiagnosticsRuntime, span: crate::identity::SourceSpan) {
        let severity = self.config.type_mismatch;
        let contract = BindingContract {
            expected_type: expected.clone(),
            context,
            severity,
            allow_coercion: coercion_for(context, self.config),
        };
        self.expected_by_expr.insert((template, id), expected);
        self.contracts.insert((template, id), contract);
        let _ = diagnostics;
        let _ = span;
    }

    fn record_source(&mut self, template: TemplateId, src: &BindingSource, expected: &str, context: BindingContext, diagnostics: &mut DiagnosticsRuntime, span: crate::identity::SourceSpan) {
        for id in src.expr_ids() {
            self.record(template, id, expected.to_string(), context, diagnostics, span);
        }
    }

    fn walk(&mut self, ir: &TemplateIR, linked: &LinkedTemplate, suppressed: bool, diagnostics: &mut DiagnosticsRuntime) {
        for row in &ir.rows {
            let tag = host_tag(&ir.dom, &row.target);
            for ins in &row.instructions {
                // `HydrateAttribute` links to one `LinkedInstruction` per inner
                // prop (see link.rs), not one for the wrapper itself — consume
                // the cursor in lockstep with that instead of the usual 1:1.
                if let Instruction::HydrateAttribute { name, props, .. } = ins {
                    for inner in props {
                        let link_row = self.next_linked(linked);
                        if suppressed || !self.config.enabled {
                            continue;
                        }
                        self.check_attribute_property(ir.id, name, inner, link_row, diagnostics);
                    }
                    continue;
                }
                let link_row = self.next_linked(linked);
                if suppressed || !self.config.enabled {
                    if let Instruction::HydrateTemplateController { def, .. } = ins {
                        self.walk(def, linked, true, diagnostics);
                    }
                    continue;
                }
                self.check_instruction(ir.id, ins, tag, link_row, diagnostics);
                if let Instruction::HydrateTemplateController { def, .. } = ins {
                    let stub = link_row.and_then(|l| l.controller.as_ref()).map(|c| c.is_stub).unwrap_or(false);
                    self.walk(def, linked, stub, diagnostics);
                }
            }
        }
    }

    fn check_attribute_property(&mut self, template: TemplateId, attr_name: &str, ins: &Instruction, link_row: Option<&LinkedInstruction>, diagnostics: &mut DiagnosticsRuntime) {
        let Some(link_row) = link_row else { return };
        let Instruction::PropertyBinding { to, from, span, .. } = ins else { return };
        let (expected, context) = match &link_row.target {
            TargetSem::AttributeBindable => (attribute_bindable_type(self.catalog, attr_name, to), BindingContext::ComponentBindable),
            TargetSem::Unknown { .. } => return,
            _ => (ANY.to_string(), BindingContext::ComponentBindable),
        };
        self.record_source(template, from, &expected, context, diagnostics, *span);
    }

    fn check_instruction(&mut self, template: TemplateId, ins: &Instruction, tag: Option<&str>, link_row: Option<&LinkedInstruction>, diagnostics: &mut DiagnosticsRuntime) {
        let Some(link_row) = link_row else { return };
        match ins {
            Instruction::PropertyBinding { to, from, span, .. } | Instruction::AttributeBinding { to, from, span, .. } => {
                let (expected, context) = match &link_row.target {
                    TargetSem::ElementBindable => (bindable_type(self.catalog, tag, to), BindingContext::ComponentBindable),
                    TargetSem::ElementNativeProp => (native_prop_type(self.catalog, tag, to), BindingContext::DomProperty),
                    TargetSem::AttributeBindable => (bindable_type(self.catalog, tag, to), BindingContext::ComponentBindable),
                    TargetSem::Attribute { .. } => ("string".to_string(), BindingContext::DomAttribute),
                    TargetSem::ControllerProp => (ANY.to_string(), BindingContext::ControllerProp),
                    TargetSem::Style => ("string|number".to_string(), BindingContext::StyleProperty),
                    TargetSem::Unknown { .. } => return,
                };
                self.record_source(template, from, &expected, context, diagnostics, *span);
            }
            Instruction::StylePropertyBinding { from, span, .. } => {
                self.record_source(template, from, "string|number", BindingContext::StyleProperty, diagnostics, *span);
            }
            Instruction::ListenerBinding { from, span, .. } => {
                if matches!(link_row.target, TargetSem::Unknown { reason: UnknownReason::NoProp }) && link_row.event_type.is_none() {
                    // unknown event: AU1103 already raised in Link, no contract.
                    return;
                }
                self.record(template, from.id, "function".to_string(), BindingContext::EventHandler, diagnostics, *span);
            }
            Instruction::TextBinding { from, span, .. } => {
                self.record_source(template, from, "string", BindingContext::DomProperty, diagnostics, *span);
            }
            Instruction::HydrateTemplateController { name, prop_from, def, span, .. } => {
                if let Some(src) = prop_from {
                    let expected = self
                        .catalog
                        .controller_config(name)
                        .and_then(|cfg| cfg.props.values().find(|b| b.primary).or_else(|| cfg.props.values().next()))
                        .and_then(|b| b.type_ref.clone())
                        .unwrap_or_else(|| ANY.to_string());
                    self.record_source(def.id, src, &expected, BindingContext::ControllerProp, diagnostics, *span);
                }
            }
            Instruction::HydrateLetElement { bindings, span, .. } => {
                for binding in bindings {
                    self.record_source(template, &binding.from, ANY, BindingContext::TemplateLocal, diagnostics, *span);
                }
            }
            _ => {}
        }
    }
}

fn bindable_type(catalog: &dyn Catalog, tag: Option<&str>, prop: &str) -> String {
    tag.and_then(|t| catalog.element(t))
        .and_then(|el| el.bindables.values().find(|b| b.name.eq_ignore_ascii_case(prop)))
        .and_then(|b| b.type_ref.clone())
        .unwrap_or_else(|| ANY.to_string())
}

/// Looks up a bound property's type on the custom attribute that owns it
/// (not the host element) — a real bindable-name match first, falling back
/// to the attribute's primary bindable for the bare `name.bind="x"` form.
fn attribute_bindable_type(catalog: &dyn Catalog, attr_name: &str, prop: &str) -> String {
    catalog
        .attribute(attr_name)
        .and_then(|a| a.bindables.values().find(|b| b.name.eq_ignore_ascii_case(prop)).or_else(|| a.bindables.values().find(|b| b.primary)))
        .and_then(|b| b.type_ref.clone())
        .unwrap_or_else(|| ANY.to_string())
}

fn native_prop_type(catalog: &dyn Catalog, tag: Option<&str>, prop: &str) -> String {
    tag.and_then(|t| catalog.dom_element(t))
        .and_then(|dom| dom.props.iter().find(|(k, _)| k.eq_ignore_ascii_case(prop)))
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| ANY.to_string())
}

fn coercion_for(context: BindingContext, config: &TypecheckConfig) -> AllowCoercion {
    match context {
        BindingContext::DomProperty | BindingContext::DomAttribute => AllowCoercion {
            dom: config.dom_coercion,
            null_to_string: !matches!(config.null_to_string, Severity::Off),
            truthy: false,
            function: false,
        },
        BindingContext::ComponentBindable | BindingContext::ControllerProp => {
            AllowCoercion { dom: false, null_to_string: false, truthy: true, function: false }
        }
        BindingContext::StyleProperty => AllowCoercion { dom: true, null_to_string: false, truthy: false, function: false },
        BindingContext::EventHandler => AllowCoercion { dom: false, null_to_string: false, truthy: false, function: true },
        BindingContext::TemplateLocal | BindingContext::Unknown => AllowCoercion::default(),
    }
}

/// Typechecks one `TemplateIR`/`LinkedTemplate` pair, which must have come
/// from the same `link()` call — `linked.instructions` is consumed
/// positionally as `ir`'s own rows are walked in the identical order
/// `link_template` produced them in.
pub fn typecheck(ir: &TemplateIR, linked: &LinkedTemplate, catalog: &dyn Catalog, config: &TypecheckConfig, diagnostics: &mut DiagnosticsRuntime) -> TypecheckModule {
    let mut checker = Checker { config, catalog, contracts: HashMap::new(), expected_by_expr: HashMap::new(), cursor: 0 };
    checker.walk(ir, linked, false, diagnostics);
    TypecheckModule { contracts: checker.contracts, expected_by_expr: checker.expected_by_expr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::identity::{NodeId, SourceFileId, SourceSpan, TemplateIdAllocator};
    use crate::ir::{DomNode, ExprRef, InstructionRow, TemplateOrigin};

    fn span() -> SourceSpan {
        SourceSpan::new(SourceFileId(0), 0, 1)
    }

    fn text_binding_template() -> TemplateIR {
        let mut ids = TemplateIdAllocator::new();
        let target = NodeId::root().text_child(0);
        TemplateIR {
            id: ids.next_id(),
            name: None,
            origin: TemplateOrigin::Root,
            dom: DomNode::Template {
                id: NodeId::root(),
                children: vec![DomNode::Text { id: target.clone(), value: String::new(), span: span() }],
                content: None,
            },
            rows: vec![InstructionRow {
                target,
                instructions: vec![Instruction::TextBinding {
                    from: BindingSource::ExprRef(ExprRef { id: crate::identity::ExprIdAllocator::new().next_id(), code: "x".into(), loc: span() }),
                    span: span(),
                }],
            }],
            expr_table: Vec::new(),
            meta: None,
        }
    }

    #[test]
    fn text_binding_gets_string_contract() {
        let ir = text_binding_template();
        let catalog = InMemoryCatalog::with_defaults();
        let mut diags = DiagnosticsRuntime::new();
        let linked = crate::link::link(&ir, &catalog, &mut diags);
        let config = TypecheckConfig::default();
        let module = typecheck(&ir, &linked, &catalog, &config, &mut diags);
        assert_eq!(module.contracts.len(), 1);
        let contract = module.contracts.values().next().unwrap();
        assert_eq!(contract.expected_type, "string");
        assert_eq!(contract.context, BindingContext::DomProperty);
    }

    #[test]
    fn off_preset_disables_all_contracts() {
        let ir = text_binding_template();
        let catalog = InMemoryCatalog::with_defaults();
        let mut diags = DiagnosticsRuntime::new();
        let linked = crate::link::link(&ir, &catalog, &mut diags);
        let config = TypecheckConfig::from_preset(Preset::Off);
        let module = typecheck(&ir, &linked, &catalog, &config, &mut diags);
        assert!(module.contracts.is_empty());
    }
}
