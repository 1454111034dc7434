//! Phase 30 — Bind: walks a `TemplateIR` tree and produces the scope frame
//! graph every binding expression resolves against.
//!
//! A `TemplateIR` instance exists once per root template and once more for
//! every nested controller `def`, each with its own `ExprIdAllocator` reset
//! to zero (see `lower.rs`). Frames, by contrast, form one connected graph
//! for a whole compiled view: a `repeat` frame is the parent of a nested
//! `if`'s frame even though they live in two different `TemplateIR`s. That
//! means a bare `ExprId` is not a safe key into a single frame map — two
//! different expressions in two different templates can carry the same
//! id. `ScopeTemplate::expr_to_frame` is therefore keyed on `(TemplateId,
//! ExprId)`, naming which template's table the id was allocated from.

use crate::catalog::{Catalog, ControllerScope};
use crate::diagnostics::{Diagnostic, DiagnosticsRuntime};
use crate::identity::{ExprId, FrameId, FrameIdAllocator, TemplateId};
use crate::ir::{BindingSource, ExpressionKind, ExprTableEntry, Instruction, TemplateIR};
use crate::lower::iterator_locals;
use std::collections::HashMap;

/// What introduced a frame: which controller kind, and the expression that
/// drives it (the `value.bind`/`for-of`/`with` source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOriginKind {
    Repeat,
    With,
    Promise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOrigin {
    pub kind: FrameOriginKind,
    pub expr_id: (TemplateId, ExprId),
}

/// The overlay base for a `with` frame: the value expression whose result
/// becomes the binding context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayBase {
    pub value_expr: (TemplateId, ExprId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeSymbol {
    Let(String),
    IteratorLocal(String),
    IteratorContextual(String),
    PromiseAlias(String, String),
}

impl ScopeSymbol {
    fn name(&self) -> &str {
        match self {
            ScopeSymbol::Let(n) | ScopeSymbol::IteratorLocal(n) | ScopeSymbol::IteratorContextual(n) | ScopeSymbol::PromiseAlias(n, _) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Root,
    Overlay,
    Reuse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: FrameId,
    pub parent: Option<FrameId>,
    pub kind: FrameKind,
    pub overlay: Option<OverlayBase>,
    pub symbols: Vec<ScopeSymbol>,
    pub origin: Option<FrameOrigin>,
    pub let_value_exprs: Option<HashMap<String, (TemplateId, ExprId)>>,
}

/// One compiled view's whole frame graph: every frame reachable from
/// `root`, and where every evaluated `ExprId` lives.
#[derive(Debug)]
pub struct ScopeTemplate {
    pub root: FrameId,
    pub frames: Vec<Frame>,
    pub expr_to_frame: HashMap<(TemplateId, ExprId), FrameId>,
}

impl ScopeTemplate {
    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.index()]
    }
}

#[derive(Debug, Default)]
pub struct ScopeModule {
    pub templates: Vec<ScopeTemplate>,
}

struct Binder {
    frame_ids: FrameIdAllocator,
    frames: Vec<Frame>,
    expr_to_frame: HashMap<(TemplateId, ExprId), FrameId>,
    bad_reported: std::collections::HashSet<(TemplateId, ExprId)>,
}

impl Binder {
    fn new_frame(&mut self, parent: Option<FrameId>, kind: FrameKind, overlay: Option<OverlayBase>, origin: Option<FrameOrigin>) -> FrameId {
        let id = self.frame_ids.next_id();
        self.frames.push(Frame { id, parent, kind, overlay, symbols: Vec::new(), origin, let_value_exprs: None });
        id
    }

    fn record_expr(&mut self, template: TemplateId, expr_table: &[ExprTableEntry], id: ExprId, frame: FrameId, diagnostics: &mut DiagnosticsRuntime) {
        let key = (template, id);
        if let Some(entry) = expr_table.iter().find(|e| e.id == id) {
            if matches!(entry.kind, ExpressionKind::BadExpression) {
                if self.bad_reported.insert(key) {
                    let message = entry.bad_message.clone().unwrap_or_else(|| "bad expression".to_string());
                    diagnostics.push(Diagnostic::error("AU1203", message, entry.loc));
                }
                return;
            }
        }
        self.expr_to_frame.insert(key, frame);
    }

    fn record_source(&mut self, template: TemplateId, expr_table: &[ExprTableEntry], src: &BindingSource, frame: FrameId, diagnostics: &mut DiagnosticsRuntime) {
        for id in src.expr_ids() {
            self.record_expr(template, expr_table, id, frame, diagnostics);
        }
    }

    fn push_symbol(&mut self, frame: FrameId, symbol: ScopeSymbol, diagnostics: &mut DiagnosticsRuntime, span: crate::identity::SourceSpan) {
        let name = symbol.name().to_string();
        let dup = self.frames[frame.index()].symbols.iter().any(|s| s.name() == name);
        if dup {
            diagnostics.push(Diagnostic::error("AU1202", format!("duplicate local '{name}' in scope"), span));
            return;
        }
        self.frames[frame.index()].symbols.push(symbol);
    }

    fn walk_template(&mut self, ir: &TemplateIR, current: FrameId, allow_lets: bool, catalog: &dyn Catalog, diagnostics: &mut DiagnosticsRuntime) {
        for row in &ir.rows {
            for ins in &row.instructions {
                self.walk_instruction(ir, ins, current, allow_lets, catalog, diagnostics);
            }
        }
    }

    fn walk_instruction(&mut self, ir: &TemplateIR, ins: &Instruction, current: FrameId, allow_lets: bool, catalog: &dyn Catalog, diagnostics: &mut DiagnosticsRuntime) {
        match ins {
            Instruction::HydrateTemplateController { name, prop_from, iterator, def, promise_branches, span, .. } => {
                // Controller property expressions are allocated in the nested
                // def's own table (see `lower.rs::build_controller_level`),
                // but evaluate in the outer frame.
                if let Some(src) = prop_from {
                    self.record_source(def.id, &def.expr_table, src, current, diagnostics);
                }
                if let Some(it) = iterator {
                    self.record_expr(def.id, &def.expr_table, it.id, current, diagnostics);
                }

                // `then`/`catch`/`pending`/`case`/`default-case` never reach
                // this match arm as their own controller: their content is
                // folded straight into the owning `promise`/`switch`
                // instruction's `def` at lower time (see `lower.rs`), so
                // there is no separate branch-scope frame to special-case
                // here — a branch's expressions bind in whatever frame its
                // owning controller chose.
                let config = catalog.controller_config(name);
                let scope = config.map(|c| c.scope).unwrap_or(ControllerScope::Reuse);
                let next = if matches!(scope, ControllerScope::Overlay) {
                    self.new_frame(Some(current), FrameKind::Overlay, None, None)
                } else {
                    current
                };

                match name.as_str() {
                    "repeat" => self.materialize_repeat(def, iterator.as_ref(), config, next, *span, diagnostics),
                    "with" => self.materialize_with(def, prop_from.as_ref(), next),
                    "promise" => self.materialize_promise(def, prop_from.as_ref(), promise_branches, next, *span, diagnostics),
                    _ => {}
                }

                let next_allow_lets = matches!(scope, ControllerScope::Overlay);
                self.walk_template(def, next, next_allow_lets, catalog, diagnostics);
            }
            Instruction::HydrateLetElement { bindings, .. } => {
                for b in bindings {
                    self.record_source(ir.id, &ir.expr_table, &b.from, current, diagnostics);
                }
                if allow_lets {
                    for b in bindings {
                        self.push_symbol(current, ScopeSymbol::Let(b.to.clone()), diagnostics, ins.span());
                        if let Some(id) = b.from.expr_ids().first().copied() {
                            let frame = &mut self.frames[current.index()];
                            frame.let_value_exprs.get_or_insert_with(HashMap::new).insert(b.to.clone(), (ir.id, id));
                        }
                    }
                }
            }
            other => {
                for id in instruction_expr_ids(other) {
                    self.record_expr(ir.id, &ir.expr_table, id, current, diagnostics);
                }
            }
        }
    }

    fn materialize_repeat(
        &mut self,
        def: &TemplateIR,
        iterator: Option<&crate::ir::ExprRef>,
        config: Option<&crate::catalog::ControllerConfig>,
        frame: FrameId,
        span: crate::identity::SourceSpan,
        diagnostics: &mut DiagnosticsRuntime,
    ) {
        let Some(it) = iterator else { return };
        let Some(entry) = def.expr_table.iter().find(|e| e.id == it.id) else { return };
        let Some(for_of) = &entry.for_of else { return };
        match &for_of.declaration {
            Ok(pattern) => {
                for name in iterator_locals(pattern) {
                    self.push_symbol(frame, ScopeSymbol::IteratorLocal(name), diagnostics, span);
                }
                if let Some(cfg) = config {
                    for name in &cfg.injects.contextuals {
                        self.push_symbol(frame, ScopeSymbol::IteratorContextual(name.clone()), diagnostics, span);
                    }
                }
                self.frames[frame.index()].origin = Some(FrameOrigin { kind: FrameOriginKind::Repeat, expr_id: (def.id, it.id) });
            }
            Err(_) => {
                diagnostics.push(Diagnostic::error("AU1201", "invalid repeat.for declaration".to_string(), entry.loc));
            }
        }
    }

    fn materialize_with(&mut self, def: &TemplateIR, prop_from: Option<&BindingSource>, frame: FrameId) {
        if let Some(BindingSource::ExprRef(r)) = prop_from {
            self.frames[frame.index()].overlay = Some(OverlayBase { value_expr: (def.id, r.id) });
            self.frames[frame.index()].origin = Some(FrameOrigin { kind: FrameOriginKind::With, expr_id: (def.id, r.id) });
        }
    }

    fn materialize_promise(
        &mut self,
        def: &TemplateIR,
        prop_from: Option<&BindingSource>,
        branches: &crate::ir::PromiseBranches,
        frame: FrameId,
        span: crate::identity::SourceSpan,
        diagnostics: &mut DiagnosticsRuntime,
    ) {
        if let Some(BindingSource::ExprRef(r)) = prop_from {
            self.frames[frame.index()].origin = Some(FrameOrigin { kind: FrameOriginKind::Promise, expr_id: (def.id, r.id) });
        }
        if let Some(alias) = &branches.then {
            let name = alias.clone().unwrap_or_else(|| "then".to_string());
            self.push_symbol(frame, ScopeSymbol::PromiseAlias(name, "then".to_string()), diagnostics, span);
        }
        if let Some(alias) = &branches.catch {
            let name = alias.clone().unwrap_or_else(|| "catch".to_string());
            self.push_symbol(frame, ScopeSymbol::PromiseAlias(name, "catch".to_string()), diagnostics, span);
        }
    }
}

fn instruction_expr_ids(ins: &Instruction) -> Vec<ExprId> {
    match ins {
        Instruction::PropertyBinding { from, .. }
        | Instruction::AttributeBinding { from, .. }
        | Instruction::StylePropertyBinding { from, .. }
        | Instruction::TextBinding { from, .. } => from.expr_ids(),
        Instruction::ListenerBinding { from, .. } => vec![from.id],
        Instruction::IteratorBinding { for_of, tail_props, .. } => {
            let mut ids = vec![for_of.id];
            for (_, src) in tail_props {
                ids.extend(src.expr_ids());
            }
            ids
        }
        // Inner props share the host row's own expr table/allocator, so a
        // flat recursive flat-map is enough — no nested-template bookkeeping
        // like `HydrateTemplateController.def` needs.
        Instruction::HydrateAttribute { props, .. } => props.iter().flat_map(instruction_expr_ids).collect(),
        Instruction::RefBinding { .. }
        | Instruction::TranslationBinding { .. }
        | Instruction::SetAttribute { .. }
        | Instruction::SetProperty { .. }
        | Instruction::SetClassAttribute { .. }
        | Instruction::SetStyleAttribute { .. }
        | Instruction::HydrateElement { .. } => Vec::new(),
        Instruction::HydrateTemplateController { .. } | Instruction::HydrateLetElement { .. } => Vec::new(),
    }
}

/// Walks `ir` (and every nested controller `def` it owns) and produces the
/// frame graph every instruction's expressions resolve against.
pub fn bind(ir: &TemplateIR, catalog: &dyn Catalog, diagnostics: &mut DiagnosticsRuntime) -> ScopeModule {
    let mut binder = Binder {
        frame_ids: FrameIdAllocator::new(),
        frames: Vec::new(),
        expr_to_frame: HashMap::new(),
        bad_reported: std::collections::HashSet::new(),
    };
    let root = binder.new_frame(None, FrameKind::Root, None, None);
    binder.walk_template(ir, root, true, catalog, diagnostics);
    let template = ScopeTemplate { root, frames: binder.frames, expr_to_frame: binder.expr_to_frame };
    ScopeModule { templates: vec![template] }
}
