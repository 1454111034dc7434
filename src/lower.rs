//! Phase 10 — Lower: turns parsed HTML plus the external parser
//! collaborators into a `TemplateIR`.

use crate::catalog::{Catalog, ControllerConfig, Trigger};
use crate::diagnostics::{Diagnostic, DiagnosticsRuntime};
use crate::external::{
    AttributeParser, BindingPattern, ExpressionAst, ExpressionParser, HtmlAttr, HtmlElement, HtmlNode, ParseContext,
};
use crate::identity::{ExprIdAllocator, NodeId, NodeIdAllocator, SourceFileId, SourceSpan, TemplateIdAllocator};
use crate::ir::{
    Branch, BindingMode, BindingSource, DomAttr, DomNode, ExprRef, ExprTableEntry, ExpressionKind, Instruction,
    InstructionRow, LetBinding, PromiseBranches, SwitchCase, TemplateIR, TemplateOrigin,
};
use std::collections::HashMap;

/// Immutable collaborators and the mutable diagnostics sink threaded
/// through every recursive lowering call, grouped so passing them around
/// recursive calls doesn't require a dozen parameters.
pub struct LowerShared<'a> {
    pub catalog: &'a dyn Catalog,
    pub expr_parser: &'a dyn ExpressionParser,
    pub attr_parser: &'a dyn AttributeParser,
    pub diagnostics: &'a mut DiagnosticsRuntime,
    pub template_ids: &'a mut TemplateIdAllocator,
    pub file: SourceFileId,
}

/// Lowers a root template's already-meta-stripped HTML forest into a
/// `TemplateIR`.
pub fn lower_root(shared: &mut LowerShared, name: Option<String>, nodes: &[HtmlNode]) -> TemplateIR {
    let id = shared.template_ids.next_id();
    let mut builder = TemplateBuilder::new();
    let root_id = NodeId::root();
    let children = builder.lower_children(shared, nodes, &root_id);
    let dom = DomNode::Template { id: root_id, children, content: None };
    TemplateIR {
        id,
        name,
        origin: TemplateOrigin::Root,
        dom,
        rows: builder.rows,
        expr_table: builder.expr_table,
        meta: None,
    }
}

struct TemplateBuilder {
    node_ids: NodeIdAllocator,
    expr_ids: ExprIdAllocator,
    rows: Vec<InstructionRow>,
    expr_table: Vec<ExprTableEntry>,
}

/// One attribute recognized as a template-controller trigger, carried
/// alongside its resolved config and raw parsed form.
struct ControllerAttr<'a> {
    attr: &'a HtmlAttr,
    config: ControllerConfig,
    command: Option<String>,
}

fn is_meta_tag(tag: &str) -> bool {
    matches!(
        tag,
        "import" | "require" | "bindable" | "use-shadow-dom" | "containerless" | "capture" | "alias"
    )
}

/// Attribute names whose content folds into an owning sibling/parent
/// controller's own `def` rather than becoming an independent controller
/// instruction. `else` is deliberately excluded: it wraps its own element as
/// a sibling `HydrateTemplateController` just like `if`, later paired with
/// its preceding `if` by `merge_if_else`.
fn is_branch_marker(name: &str) -> bool {
    matches!(name, "then" | "catch" | "pending" | "case" | "default-case")
}

impl TemplateBuilder {
    fn new() -> Self {
        TemplateBuilder { node_ids: NodeIdAllocator::new(), expr_ids: ExprIdAllocator::new(), rows: Vec::new(), expr_table: Vec::new() }
    }

    fn push_expr(&mut self, shared: &mut LowerShared, code: &str, span: SourceSpan, ctx: ParseContext) -> ExprRef {
        let ast = shared.expr_parser.parse(code, ctx);
        let id = self.expr_ids.next_id();
        let kind = match ctx {
            ParseContext::IsAssign => ExpressionKind::IsAssign,
            ParseContext::IsIterator => ExpressionKind::IsIterator,
            ParseContext::Interpolation => ExpressionKind::Interpolation,
            _ => ExpressionKind::IsAssign,
        };
        let value_converters = ast.value_converter_names();
        let binding_behaviors = ast.binding_behavior_names();
        let (kind, bad_message, for_of) = if ast.is_bad_expression() {
            (ExpressionKind::BadExpression, ast.bad_message(), None)
        } else {
            let for_of = ast.as_for_of().map(clone_for_of);
            (kind, None, for_of)
        };
        self.expr_table.push(ExprTableEntry {
            id,
            kind,
            code: code.to_string(),
            loc: span,
            for_of,
            bad_message,
            value_converters,
            binding_behaviors,
        });
        ExprRef { id, code: code.to_string(), loc: span }
    }

    fn row_for(&mut self, target: NodeId) -> &mut InstructionRow {
        if let Some(idx) = self.rows.iter().position(|r| r.target == target) {
            return &mut self.rows[idx];
        }
        self.rows.push(InstructionRow { target, instructions: Vec::new() });
        self.rows.last_mut().unwrap()
    }

    fn lower_children(&mut self, shared: &mut LowerShared, nodes: &[HtmlNode], parent_id: &NodeId) -> Vec<DomNode> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < nodes.len() {
            self.lower_node_into(shared, &nodes[i], parent_id, &mut out);
            i += 1;
        }
        self.merge_if_else(shared, &mut out);
        out
    }

    /// Pairs an `if` synthetic wrapper with an immediately preceding `else`
    /// sibling, recording that pairing on the `else` instruction's own
    /// branch. An `else` with no immediately preceding `if` is reported as
    /// `AU0810`.
    fn merge_if_else(&mut self, shared: &mut LowerShared, out: &mut [DomNode]) {
        for i in 0..out.len() {
            let is_else = self.controller_name_at(&out[i]).as_deref() == Some("else");
            if !is_else {
                continue;
            }
            let has_if_before = i > 0 && self.controller_name_at(&out[i - 1]).as_deref() == Some("if");
            if has_if_before {
                if let Some(row) = self.rows.iter_mut().find(|r| &r.target == out[i].id()) {
                    for ins in &mut row.instructions {
                        if let Instruction::HydrateTemplateController { branch, .. } = ins {
                            *branch = Some(Branch::Else);
                        }
                    }
                }
            } else if let Some(span) = self.controller_span_at(&out[i]) {
                shared.diagnostics.push(Diagnostic::error("AU0810", "'else' has no matching preceding 'if'".to_string(), span));
            }
        }
    }

    fn controller_name_at(&self, node: &DomNode) -> Option<String> {
        self.rows.iter().find(|r| &r.target == node.id()).and_then(|row| {
            row.instructions.iter().find_map(|ins| match ins {
                Instruction::HydrateTemplateController { name, .. } => Some(name.clone()),
                _ => None,
            })
        })
    }

    fn controller_span_at(&self, node: &DomNode) -> Option<SourceSpan> {
        self.rows.iter().find(|r| &r.target == node.id()).and_then(|row| {
            row.instructions.iter().find_map(|ins| match ins {
                Instruction::HydrateTemplateController { span, .. } => Some(*span),
                _ => None,
            })
        })
    }

    /// Reports `then`/`catch`/`pending` (`AU0813`) and `case`/`default-case`
    /// (`AU0815`) attributes reaching ordinary element lowering, meaning
    /// they were not folded by an enclosing `promise`/`switch` controller's
    /// `lower_branch_children` — i.e. authored without (or outside) the
    /// controller they name.
    fn check_orphan_branch_markers(&self, shared: &mut LowerShared, element: &HtmlElement) {
        for attr in &element.attrs {
            let parsed = shared.attr_parser.parse(&attr.name, &attr.value);
            let span = attr.name_span.unwrap_or(element.source_span);
            match parsed.target.as_str() {
                "then" | "catch" | "pending" => {
                    let name = parsed.target;
                    shared.diagnostics.push(Diagnostic::error("AU0813", format!("'{name}' has no enclosing 'promise' controller"), span));
                }
                "case" | "default-case" => {
                    let name = parsed.target;
                    shared.diagnostics.push(Diagnostic::error("AU0815", format!("'{name}' has no enclosing 'switch' controller"), span));
                }
                _ => {}
            }
        }
    }

    fn lower_node_into(&mut self, shared: &mut LowerShared, node: &HtmlNode, parent_id: &NodeId, out: &mut Vec<DomNode>) {
        match node {
            HtmlNode::Text(t) => {
                let id = self.node_ids.next_text(parent_id);
                let source_text = t.value.clone();
                if let Some(parts) = split_interpolation(&source_text) {
                    let from = self.lower_interpolation_parts(shared, &parts, t.span);
                    self.row_for(id.clone()).instructions.push(Instruction::TextBinding { from, span: t.span });
                }
                out.push(DomNode::Text { id, value: t.value.clone(), span: t.span });
            }
            HtmlNode::Comment(c) => {
                let id = self.node_ids.next_comment(parent_id);
                out.push(DomNode::Comment { id, value: c.value.clone(), span: c.span });
            }
            HtmlNode::Element(el) => {
                let tag = el.tag_name.to_ascii_lowercase();
                if is_meta_tag(&tag) && el.attr("as-custom-element").is_none() {
                    for child in &el.children {
                        self.lower_node_into(shared, child, parent_id, out);
                    }
                    return;
                }
                out.push(self.lower_element(shared, el, parent_id));
            }
        }
    }

    fn lower_element(&mut self, shared: &mut LowerShared, element: &HtmlElement, parent_id: &NodeId) -> DomNode {
        let id = self.node_ids.next_element(parent_id);
        let tag = element.tag_name.to_ascii_lowercase();

        if tag == "let" {
            return self.lower_let(shared, element, id);
        }

        self.check_orphan_branch_markers(shared, element);

        let controller_attrs = self.collect_controller_attrs(shared, element);
        if !controller_attrs.is_empty() {
            return self.lower_controller_chain(shared, element, &controller_attrs, id, parent_id);
        }

        self.lower_plain_element(shared, element, id, parent_id, &[])
    }

    fn collect_controller_attrs<'a>(&self, shared: &LowerShared, element: &'a HtmlElement) -> Vec<ControllerAttr<'a>> {
        let mut out = Vec::new();
        for attr in &element.attrs {
            let parsed = shared.attr_parser.parse(&attr.name, &attr.value);
            if is_branch_marker(&parsed.target) {
                // branch markers on a <template> attach to a sibling/parent
                // controller rather than lifting this element itself.
                continue;
            }
            if let Some(config) = shared.catalog.controller_config(&parsed.target) {
                out.push(ControllerAttr { attr, config: config.clone(), command: parsed.command });
            }
        }
        out
    }

    /// Builds the nested-wrapper chain for one or more stacked controller
    /// attributes, outermost first.
    fn lower_controller_chain(
        &mut self,
        shared: &mut LowerShared,
        element: &HtmlElement,
        controllers: &[ControllerAttr],
        wrapper_id: NodeId,
        parent_id: &NodeId,
    ) -> DomNode {
        let controller_names: Vec<&str> = controllers.iter().map(|c| c.attr.name.as_str()).collect();
        let instruction = self.build_controller_level(shared, element, controllers, 0, &controller_names);
        self.row_for(wrapper_id.clone()).instructions.push(instruction);
        let _ = parent_id;
        DomNode::Template { id: wrapper_id, children: Vec::new(), content: None }
    }

    fn build_controller_level(
        &mut self,
        shared: &mut LowerShared,
        element: &HtmlElement,
        controllers: &[ControllerAttr],
        idx: usize,
        all_names: &[&str],
    ) -> Instruction {
        let ctl = &controllers[idx];
        let span = ctl.attr.name_span.or(ctl.attr.value_span).unwrap_or(element.source_span);
        let mut nested = TemplateBuilder::new();
        let root_id = NodeId::root();
        let def_id = shared.template_ids.next_id();

        let prop_from = match &ctl.config.trigger {
            Trigger::Value { .. } if ctl.command.as_deref() != Some("for") => {
                let value_span = ctl.attr.value_span.unwrap_or(span);
                Some(BindingSource::ExprRef(nested.push_expr(shared, &ctl.attr.value, value_span, ParseContext::IsAssign)))
            }
            _ => None,
        };
        let iterator = if matches!(ctl.config.trigger, Trigger::Iterator { .. }) {
            let value_span = ctl.attr.value_span.unwrap_or(span);
            Some(nested.push_expr(shared, &ctl.attr.value, value_span, ParseContext::IsIterator))
        } else {
            None
        };

        let (dom_children, promise_branches, switch_cases) = if idx + 1 < controllers.len() {
            let inner = nested.build_controller_level(shared, element, controllers, idx + 1, all_names);
            nested.row_for(root_id.clone()).instructions.push(inner);
            (
                vec![DomNode::Template { id: root_id.clone(), children: Vec::new(), content: None }],
                PromiseBranches::default(),
                Vec::new(),
            )
        } else {
            let filtered: Vec<&HtmlAttr> = element
                .attrs
                .iter()
                .filter(|a| !all_names.iter().any(|n| *n == a.name))
                .collect();
            let (promise_branches, switch_cases, consumed) = match &ctl.config.branches {
                Some(branch_names) => nested.lower_branch_children(shared, element, &root_id, branch_names),
                None => (PromiseBranches::default(), Vec::new(), Vec::new()),
            };
            let inner_element = nested.lower_plain_element_excluding(shared, element, root_id.clone(), &filtered, &consumed);
            (vec![inner_element], promise_branches, switch_cases)
        };

        let def = TemplateIR {
            id: def_id,
            name: None,
            origin: TemplateOrigin::Controller,
            dom: DomNode::Template { id: root_id, children: dom_children, content: None },
            rows: nested.rows,
            expr_table: nested.expr_table,
            meta: None,
        };

        Instruction::HydrateTemplateController {
            name: ctl.config.name.clone(),
            prop_from,
            iterator,
            tail_props: Vec::new(),
            branch: None,
            promise_branches,
            switch_cases,
            def: Box::new(def),
            span,
        }
    }

    /// Folds `<template then>`/`<template catch>`/`<template pending>` (on a
    /// `promise` controller) or `<template case>`/`<template default-case>`
    /// (on a `switch` controller) directly into this builder's own dom/rows
    /// instead of recursing into them as independent rows. `branch_names` is
    /// the owning controller's `branches` map, which
    /// also tells us which branch vocabulary applies. Returns the indices
    /// into `parent_element.children` that were folded here, so the caller
    /// can exclude them from the generic child recursion and avoid lowering
    /// the same branch content twice.
    fn lower_branch_children(
        &mut self,
        shared: &mut LowerShared,
        parent_element: &HtmlElement,
        root_id: &NodeId,
        branch_names: &HashMap<String, String>,
    ) -> (PromiseBranches, Vec<SwitchCase>, Vec<usize>) {
        let mut promise_branches = PromiseBranches::default();
        let mut switch_cases = Vec::new();
        let mut consumed = Vec::new();
        let mut default_case_count = 0u32;
        for (idx, child) in parent_element.children.iter().enumerate() {
            let el = match child.as_element() {
                Some(e) => e,
                None => continue,
            };
            if el.tag_name.to_ascii_lowercase() != "template" {
                continue;
            }
            if let Some(a) = el.attr("then") {
                if branch_names.contains_key("then") {
                    promise_branches.then = Some(non_empty(&a.value));
                    self.fold_branch_content(shared, el, root_id);
                    consumed.push(idx);
                }
            } else if let Some(a) = el.attr("catch") {
                if branch_names.contains_key("catch") {
                    promise_branches.catch = Some(non_empty(&a.value));
                    self.fold_branch_content(shared, el, root_id);
                    consumed.push(idx);
                }
            } else if el.attr("pending").is_some() {
                if branch_names.contains_key("pending") {
                    promise_branches.pending = true;
                    self.fold_branch_content(shared, el, root_id);
                    consumed.push(idx);
                }
            } else if let Some(a) = el.attr("case") {
                if branch_names.contains_key("case") {
                    let span = a.value_span.unwrap_or(el.source_span);
                    let value = if a.value.trim().is_empty() {
                        None
                    } else {
                        Some(BindingSource::ExprRef(self.push_expr(shared, &a.value, span, ParseContext::IsAssign)))
                    };
                    switch_cases.push(SwitchCase { value, is_default: false });
                    self.fold_branch_content(shared, el, root_id);
                    consumed.push(idx);
                }
            } else if el.attr("default-case").is_some() && branch_names.contains_key("default-case") {
                default_case_count += 1;
                if default_case_count > 1 {
                    shared.diagnostics.push(Diagnostic::error(
                        "AU0816",
                        "switch has more than one default-case".to_string(),
                        el.source_span,
                    ));
                }
                switch_cases.push(SwitchCase { value: None, is_default: true });
                self.fold_branch_content(shared, el, root_id);
                consumed.push(idx);
            }
        }
        (promise_branches, switch_cases, consumed)
    }

    /// Lowers a branch `<template>`'s children for their diagnostics/
    /// expr-table side effects only; the folded content is intentionally
    /// not attached as dom children anywhere — the owning controller's
    /// branch metadata is what survives (`PromiseBranches`/`SwitchCase`).
    fn fold_branch_content(&mut self, shared: &mut LowerShared, branch_element: &HtmlElement, root_id: &NodeId) {
        let mut out = Vec::new();
        for c in &branch_element.children {
            self.lower_node_into(shared, c, root_id, &mut out);
        }
        let _ = out;
    }

    fn lower_let(&mut self, shared: &mut LowerShared, element: &HtmlElement, id: NodeId) -> DomNode {
        let to_binding_context = element.attr("to-binding-context").is_some();
        let mut bindings = Vec::new();
        for attr in &element.attrs {
            if attr.name.eq_ignore_ascii_case("to-binding-context") {
                continue;
            }
            let parsed = shared.attr_parser.parse(&attr.name, &attr.value);
            let span = attr.value_span.unwrap_or(element.source_span);
            let from = if let Some(parts) = split_interpolation(&attr.value) {
                self.lower_interpolation_parts(shared, &parts, span)
            } else {
                BindingSource::ExprRef(self.push_expr(shared, &attr.value, span, ParseContext::IsAssign))
            };
            bindings.push(LetBinding { to: parsed.target, from });
        }
        self.row_for(id.clone()).instructions.push(Instruction::HydrateLetElement {
            bindings,
            to_binding_context,
            span: element.source_span,
        });
        DomNode::Element {
            id,
            tag: "let".to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
            source_span: element.source_span,
            start_tag_span: element.start_tag_span,
            end_tag_span: element.end_tag_span,
        }
    }

    fn lower_plain_element(&mut self, shared: &mut LowerShared, element: &HtmlElement, id: NodeId, parent_id: &NodeId, exclude: &[&str]) -> DomNode {
        let _ = parent_id;
        let attrs: Vec<&HtmlAttr> = element.attrs.iter().filter(|a| !exclude.iter().any(|n| *n == a.name)).collect();
        self.lower_plain_element_from_filtered(shared, element, id, &attrs)
    }

    fn lower_plain_element_from_filtered(&mut self, shared: &mut LowerShared, element: &HtmlElement, id: NodeId, attrs: &[&HtmlAttr]) -> DomNode {
        self.lower_plain_element_excluding(shared, element, id, attrs, &[])
    }

    /// Like `lower_plain_element_from_filtered`, but skips the children at
    /// `skip_children` (indices into `element.children`) when recursing —
    /// used to avoid re-lowering branch `<template>`s already folded by
    /// `lower_branch_children`.
    fn lower_plain_element_excluding(
        &mut self,
        shared: &mut LowerShared,
        element: &HtmlElement,
        id: NodeId,
        attrs: &[&HtmlAttr],
        skip_children: &[usize],
    ) -> DomNode {
        let mut static_attrs = Vec::new();
        let mut instructions = Vec::new();

        if shared.catalog.element(&element.tag_name).is_some() {
            instructions.push(Instruction::HydrateElement { tag: element.tag_name.clone(), span: element.source_span });
        }

        for attr in attrs {
            let lower_name = attr.name.to_ascii_lowercase();
            if lower_name == "au-slot" {
                continue;
            }
            if lower_name == "ref" {
                instructions.push(Instruction::RefBinding { to: attr.value.clone(), span: attr.name_span.unwrap_or(element.source_span) });
                continue;
            }

            let parsed = shared.attr_parser.parse(&attr.name, &attr.value);
            let span = attr.value_span.unwrap_or(element.source_span);

            // Multi-binding (`name.bind: expr; name2.bind: expr2`) is custom-attribute
            // grammar, not a general rule for any colon-bearing value — a static
            // `style="color: red"` or a `.bind` expression containing its own colon
            // (`cond ? 'a' : 'b'`, `{a: 1}`) must never hit this path.
            if parsed.command.is_none() {
                if let Some(attr_name) = shared.catalog.attribute(&parsed.target).map(|a| a.name.clone()) {
                    if let Some(parts) = split_multi_binding(&attr.value) {
                        let mut props = Vec::new();
                        for (target_value, expr_text, rel_start, rel_end) in parts {
                            let sub_span = span.sub_span(rel_start, rel_end);
                            let from = BindingSource::ExprRef(self.push_expr(shared, &expr_text, sub_span, ParseContext::IsAssign));
                            props.push(property_instruction(target_value, from, span));
                        }
                        instructions.push(Instruction::HydrateAttribute { name: attr_name, props, span });
                        continue;
                    }
                }
            }

            match parsed.command.as_deref() {
                Some("bind") | Some("to-view") | Some("from-view") | Some("two-way") | Some("one-time") => {
                    let mode = mode_from_command(parsed.command.as_deref());
                    let from = BindingSource::ExprRef(self.push_expr(shared, &attr.value, span, ParseContext::IsAssign));
                    let prop = Instruction::PropertyBinding { to: parsed.target.clone(), mode, from, span };
                    if let Some(attr_res) = shared.catalog.attribute(&parsed.target) {
                        instructions.push(Instruction::HydrateAttribute { name: attr_res.name.clone(), props: vec![prop], span });
                    } else {
                        instructions.push(prop);
                    }
                }
                Some("trigger") | Some("capture") | Some("delegate") => {
                    let capture = parsed.command.as_deref() == Some("capture");
                    let from = self.push_expr(shared, &attr.value, span, ParseContext::IsAssign);
                    instructions.push(Instruction::ListenerBinding { to: parsed.target, from, capture, span });
                }
                Some("ref") => {
                    instructions.push(Instruction::RefBinding { to: parsed.target, span });
                }
                Some("style") => {
                    let from = BindingSource::ExprRef(self.push_expr(shared, &attr.value, span, ParseContext::IsAssign));
                    instructions.push(Instruction::StylePropertyBinding { to: parsed.target, from, span });
                }
                Some("class") => {
                    let from = BindingSource::ExprRef(self.push_expr(shared, &attr.value, span, ParseContext::IsAssign));
                    instructions.push(Instruction::AttributeBinding { to: "class".into(), mode: BindingMode::ToView, from, span });
                }
                Some("attr") => {
                    let from = BindingSource::ExprRef(self.push_expr(shared, &attr.value, span, ParseContext::IsAssign));
                    instructions.push(Instruction::AttributeBinding { to: parsed.target, mode: BindingMode::ToView, from, span });
                }
                Some("for") => {
                    let expr = self.push_expr(shared, &attr.value, span, ParseContext::IsIterator);
                    instructions.push(Instruction::IteratorBinding { for_of: expr, tail_props: Vec::new(), span });
                }
                None => {
                    if let Some(parts) = split_interpolation(&attr.value) {
                        let from = self.lower_interpolation_parts(shared, &parts, span);
                        instructions.push(Instruction::AttributeBinding { to: parsed.target, mode: BindingMode::ToView, from, span });
                    } else {
                        static_attrs.push(DomAttr { name: attr.name.clone(), value: attr.value.clone(), span });
                    }
                }
                Some(_) => {
                    static_attrs.push(DomAttr { name: attr.name.clone(), value: attr.value.clone(), span });
                }
            }
        }

        if !instructions.is_empty() {
            self.row_for(id.clone()).instructions.extend(instructions);
        }

        let children = if skip_children.is_empty() {
            self.lower_children(shared, &element.children, &id)
        } else {
            let filtered: Vec<HtmlNode> = element
                .children
                .iter()
                .enumerate()
                .filter(|(i, _)| !skip_children.contains(i))
                .map(|(_, n)| n.clone())
                .collect();
            self.lower_children(shared, &filtered, &id)
        };
        DomNode::Element {
            id,
            tag: element.tag_name.clone(),
            attrs: static_attrs,
            children,
            source_span: element.source_span,
            start_tag_span: element.start_tag_span,
            end_tag_span: element.end_tag_span,
        }
    }

    fn lower_interpolation_parts(&mut self, shared: &mut LowerShared, parts: &InterpolationParts, base_span: SourceSpan) -> BindingSource {
        let exprs = parts
            .exprs
            .iter()
            .map(|(code, start, end)| self.push_expr(shared, code, base_span.sub_span(*start, *end), ParseContext::Interpolation))
            .collect();
        BindingSource::Interp { parts: parts.literals.clone(), exprs }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn mode_from_command(command: Option<&str>) -> BindingMode {
    match command {
        Some("to-view") => BindingMode::ToView,
        Some("from-view") => BindingMode::FromView,
        Some("two-way") => BindingMode::TwoWay,
        Some("one-time") => BindingMode::OneTime,
        _ => BindingMode::Default,
    }
}

fn property_instruction(to: String, from: BindingSource, span: SourceSpan) -> Instruction {
    Instruction::PropertyBinding { to, mode: BindingMode::Default, from, span }
}

/// Splits a multi-binding attribute value (`name1.bind: expr1; name2.bind:
/// expr2`) on `;` outside expression delimiters, then once on `:` per part.
/// Returns `None` when the value contains no `:` (a single binding or a
/// plain value), in which case the caller falls back to the single-binding
/// path. Each returned tuple is `(target, expr_text, rel_start, rel_end)`
/// with offsets relative to the attribute value's own span start, pointing
/// only at the trimmed inner expression.
fn split_multi_binding(value: &str) -> Option<Vec<(String, String, u32, u32)>> {
    if !value.contains(':') {
        return None;
    }
    let mut out = Vec::new();
    let mut offset: u32 = 0;
    for segment in split_outside_quotes(value, ';') {
        let seg_start = offset;
        offset += segment.len() as u32 + 1;
        let colon = match segment.find(':') {
            Some(i) => i,
            None => continue,
        };
        let name_part = &segment[..colon];
        let expr_part = &segment[colon + 1..];
        let target = name_part.trim().trim_end_matches(".bind").to_string();
        if target.is_empty() {
            continue;
        }
        let leading_ws = (expr_part.len() - expr_part.trim_start().len()) as u32;
        let trimmed_expr = expr_part.trim();
        let expr_rel_start = seg_start + colon as u32 + 1 + leading_ws;
        let expr_rel_end = expr_rel_start + trimmed_expr.len() as u32;
        out.push((target, trimmed_expr.to_string(), expr_rel_start, expr_rel_end));
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn split_outside_quotes(value: &str, delim: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quote: Option<char> = None;
    for (i, c) in value.char_indices() {
        match in_quote {
            Some(q) if c == q => in_quote = None,
            None if c == '\'' || c == '"' => in_quote = Some(c),
            None if c == delim => {
                out.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out
}

struct InterpolationParts {
    literals: Vec<String>,
    exprs: Vec<(String, u32, u32)>,
}

/// Splits `text` on `${...}` boundaries; returns `None` when there is no
/// interpolation. Expression spans cover only the bytes
/// between `${` and the matching `}`.
fn split_interpolation(text: &str) -> Option<InterpolationParts> {
    if !text.contains("${") {
        return None;
    }
    let bytes = text.as_bytes();
    let mut literals = Vec::new();
    let mut exprs = Vec::new();
    let mut cursor = 0usize;
    let mut literal_start = 0usize;
    while cursor < bytes.len() {
        if bytes[cursor] == b'$' && cursor + 1 < bytes.len() && bytes[cursor + 1] == b'{' {
            let expr_start = cursor + 2;
            let mut depth = 1;
            let mut i = expr_start;
            while i < bytes.len() && depth > 0 {
                match bytes[i] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                if depth == 0 {
                    break;
                }
                i += 1;
            }
            if depth != 0 {
                break;
            }
            literals.push(text[literal_start..cursor].to_string());
            exprs.push((text[expr_start..i].to_string(), expr_start as u32, i as u32));
            cursor = i + 1;
            literal_start = cursor;
        } else {
            cursor += 1;
        }
    }
    if exprs.is_empty() {
        return None;
    }
    literals.push(text[literal_start..].to_string());
    Some(InterpolationParts { literals, exprs })
}

fn clone_for_of(f: &crate::external::ForOfStatement) -> crate::external::ForOfStatement {
    crate::external::ForOfStatement {
        declaration: f.declaration.clone(),
        iterable: Box::new(OpaqueAstCopy { bad: f.iterable.is_bad_expression(), message: f.iterable.bad_message() }),
    }
}

#[derive(Debug)]
struct OpaqueAstCopy {
    bad: bool,
    message: Option<String>,
}

impl ExpressionAst for OpaqueAstCopy {
    fn is_bad_expression(&self) -> bool {
        self.bad
    }
    fn bad_message(&self) -> Option<String> {
        self.message.clone()
    }
}

/// Extracts binding identifiers from a parsed `for-of` declaration,
/// honoring the declaration-shape grammar (identifier, array/object
/// patterns, defaults, rest, holes). Returns `None` on a bad
/// declaration, which callers turn into `AU1201`.
pub fn iterator_locals(pattern: &BindingPattern) -> Vec<String> {
    let mut names = Vec::new();
    pattern.bound_names(&mut names);
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_interpolation_extracts_expression_spans() {
        let parts = split_interpolation("hello ${name}!").unwrap();
        assert_eq!(parts.literals, vec!["hello ".to_string(), "!".to_string()]);
        assert_eq!(parts.exprs.len(), 1);
        let (code, start, end) = &parts.exprs[0];
        assert_eq!(code, "name");
        assert_eq!(*start, 8);
        assert_eq!(*end, 12);
    }

    #[test]
    fn split_interpolation_returns_none_without_markers() {
        assert!(split_interpolation("plain text").is_none());
    }

    #[test]
    fn multi_binding_splits_on_semicolon_then_colon() {
        let parts = split_multi_binding("route.bind: currentRoute; params.bind: routeParams").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, "route");
        assert_eq!(parts[0].1, "currentRoute");
        assert_eq!(parts[1].0, "params");
        assert_eq!(parts[1].1, "routeParams");
    }

    #[test]
    fn single_binding_value_is_not_treated_as_multi() {
        assert!(split_multi_binding("currentRoute").is_none());
    }
}
