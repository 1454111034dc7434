//! The IR Lower produces: a DOM tree addressed by `NodeId`, instruction rows
//! keyed to a target node, and the expression table every `ExprRef` points
//! into.

use crate::catalog::ControllerScope;
use crate::external::ForOfStatement;
use crate::identity::{ExprId, NodeId, Provenance, SourceSpan, TemplateId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the authored value of an interpolated or multi-part
/// binding: either a literal string segment or a reference to an evaluated
/// expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExprRef {
    pub id: ExprId,
    pub code: String,
    pub loc: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressionKind {
    IsAssign,
    IsIterator,
    Interpolation,
    BadExpression,
}

/// One row of `exprTable`: every `ExprId` produced during Lower appears
/// here exactly once.
pub struct ExprTableEntry {
    pub id: ExprId,
    pub kind: ExpressionKind,
    pub code: String,
    pub loc: SourceSpan,
    pub for_of: Option<ForOfStatement>,
    pub bad_message: Option<String>,
    /// Value converter (`| name`) and binding behavior (`& name`) names the
    /// external parser reported for this expression, captured at Lower
    /// time since the opaque `dyn ExpressionAst` itself is not retained.
    pub value_converters: Vec<String>,
    pub binding_behaviors: Vec<String>,
}

impl fmt::Debug for ExprTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprTableEntry")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("code", &self.code)
            .field("loc", &self.loc)
            .field("bad_message", &self.bad_message)
            .finish()
    }
}

/// Either a single expression or an interpolated string made of literal
/// parts and embedded expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingSource {
    ExprRef(ExprRef),
    Interp { parts: Vec<String>, exprs: Vec<ExprRef> },
}

impl BindingSource {
    /// Every `ExprId` this source references, in authored order.
    pub fn expr_ids(&self) -> Vec<ExprId> {
        match self {
            BindingSource::ExprRef(r) => vec![r.id],
            BindingSource::Interp { exprs, .. } => exprs.iter().map(|e| e.id).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingMode {
    Default,
    ToView,
    FromView,
    TwoWay,
    OneTime,
}

/// Marks a `hydrateTemplateController` instruction as itself being the
/// `else` branch of a preceding `if` sibling, merged via sibling
/// post-processing. `then`/`catch`/`pending` and `case`/`default-case` are
/// not represented here — their content is folded directly into the
/// owning `promise`/`switch` instruction's own `def` instead (see
/// `PromiseBranches`/`SwitchCase`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Branch {
    Else,
}

/// Which promise branches were authored as children of a `promise`
/// controller, and the local name each binds (when any). Their actual
/// content is lowered straight into the promise's own `def` rather than a
/// separate nested template — `bind.rs` uses this only to know which
/// `promiseAlias` symbols to materialize in the promise's overlay frame.
#[derive(Debug, Clone, Default)]
pub struct PromiseBranches {
    pub then: Option<Option<String>>,
    pub catch: Option<Option<String>>,
    pub pending: bool,
}

/// One `case`/`default-case` authored as a child of a `switch` controller.
/// Like promise branches, its content is folded into the switch's own
/// `def` rather than kept as an independent nested template.
#[derive(Debug)]
pub struct SwitchCase {
    pub value: Option<BindingSource>,
    pub is_default: bool,
}

/// One author-facing intent (not a runtime op) produced by Lower. Every
/// variant carries its authored name(s), mode, source, and span.
///
/// Not `Clone`/`Serialize`: `HydrateTemplateController` owns a nested
/// `TemplateIR`, which owns an `expr_table` holding opaque `dyn
/// ExpressionAst` trait objects from the external parser — there is
/// nothing generic to clone or serialize them as. Hosts that need a wire
/// form synthesize one from the `Catalog`-resolved `LinkedModule` instead
/// (see `link.rs`).
#[derive(Debug)]
pub enum Instruction {
    PropertyBinding {
        to: String,
        mode: BindingMode,
        from: BindingSource,
        span: SourceSpan,
    },
    AttributeBinding {
        to: String,
        mode: BindingMode,
        from: BindingSource,
        span: SourceSpan,
    },
    StylePropertyBinding {
        to: String,
        from: BindingSource,
        span: SourceSpan,
    },
    ListenerBinding {
        to: String,
        from: ExprRef,
        capture: bool,
        span: SourceSpan,
    },
    RefBinding {
        to: String,
        span: SourceSpan,
    },
    TextBinding {
        from: BindingSource,
        span: SourceSpan,
    },
    TranslationBinding {
        key: String,
        span: SourceSpan,
    },
    SetAttribute {
        name: String,
        value: String,
        span: SourceSpan,
    },
    SetProperty {
        name: String,
        value: String,
        span: SourceSpan,
    },
    SetClassAttribute {
        value: String,
        span: SourceSpan,
    },
    SetStyleAttribute {
        value: String,
        span: SourceSpan,
    },
    IteratorBinding {
        for_of: ExprRef,
        tail_props: Vec<(String, BindingSource)>,
        span: SourceSpan,
    },
    HydrateElement {
        tag: String,
        span: SourceSpan,
    },
    HydrateAttribute {
        name: String,
        /// The attribute's own bound properties — one `PropertyBinding` per
        /// multi-binding part (`route.bind: x; params.bind: y`), or a single
        /// one for a bare `name.bind="x"` binding onto the primary bindable.
        props: Vec<Instruction>,
        span: SourceSpan,
    },
    HydrateTemplateController {
        name: String,
        /// The controller's own trigger value expression (`if.bind`,
        /// `with.bind`, `promise.bind`, `switch.bind`, `portal.bind`).
        /// `None` for `repeat` (see `iterator`) and for branch markers
        /// that carry no value of their own (`else`, `pending`).
        prop_from: Option<BindingSource>,
        /// `repeat`'s `for-of` header; `None` for every other controller.
        iterator: Option<ExprRef>,
        /// Non-standard tail options on the controller attribute/element
        /// (`repeat`'s `key`, for example).
        tail_props: Vec<(String, BindingSource)>,
        /// Set when this instruction is itself a branch of a sibling/parent
        /// controller (`else`, `case`, `default-case`).
        branch: Option<Branch>,
        /// Set only on `promise` instructions: which of `then`/`catch`/
        /// `pending` were authored as children.
        promise_branches: PromiseBranches,
        /// Set only on `switch` instructions: each `case`/`default-case`
        /// authored as a child, folded into this instruction's own `def`.
        switch_cases: Vec<SwitchCase>,
        def: Box<TemplateIR>,
        span: SourceSpan,
    },
    HydrateLetElement {
        bindings: Vec<LetBinding>,
        to_binding_context: bool,
        span: SourceSpan,
    },
}

impl Instruction {
    pub fn span(&self) -> SourceSpan {
        match self {
            Instruction::PropertyBinding { span, .. }
            | Instruction::AttributeBinding { span, .. }
            | Instruction::StylePropertyBinding { span, .. }
            | Instruction::ListenerBinding { span, .. }
            | Instruction::RefBinding { span, .. }
            | Instruction::TextBinding { span, .. }
            | Instruction::TranslationBinding { span, .. }
            | Instruction::SetAttribute { span, .. }
            | Instruction::SetProperty { span, .. }
            | Instruction::SetClassAttribute { span, .. }
            | Instruction::SetStyleAttribute { span, .. }
            | Instruction::IteratorBinding { span, .. }
            | Instruction::HydrateElement { span, .. }
            | Instruction::HydrateAttribute { span, .. }
            | Instruction::HydrateTemplateController { span, .. }
            | Instruction::HydrateLetElement { span, .. } => *span,
        }
    }
}

#[derive(Debug)]
pub struct LetBinding {
    pub to: String,
    pub from: BindingSource,
}

/// Instructions targeting one DOM node, in authored order.
#[derive(Debug)]
pub struct InstructionRow {
    pub target: NodeId,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomAttr {
    pub name: String,
    pub value: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomNode {
    Element {
        id: NodeId,
        tag: String,
        attrs: Vec<DomAttr>,
        children: Vec<DomNode>,
        source_span: SourceSpan,
        start_tag_span: Option<SourceSpan>,
        end_tag_span: Option<SourceSpan>,
    },
    Template {
        id: NodeId,
        children: Vec<DomNode>,
        content: Option<Box<DomNode>>,
    },
    Text {
        id: NodeId,
        value: String,
        span: SourceSpan,
    },
    Comment {
        id: NodeId,
        value: String,
        span: SourceSpan,
    },
}

impl DomNode {
    pub fn id(&self) -> &NodeId {
        match self {
            DomNode::Element { id, .. }
            | DomNode::Template { id, .. }
            | DomNode::Text { id, .. }
            | DomNode::Comment { id, .. } => id,
        }
    }

    pub fn children(&self) -> &[DomNode] {
        match self {
            DomNode::Element { children, .. } | DomNode::Template { children, .. } => children,
            DomNode::Text { .. } | DomNode::Comment { .. } => &[],
        }
    }

    /// True when `id` exists somewhere in this subtree, used to uphold the
    /// invariant that every instruction row's target refers to a node in
    /// `dom`.
    pub fn contains(&self, id: &NodeId) -> bool {
        if self.id() == id {
            return true;
        }
        self.children().iter().any(|c| c.contains(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateOrigin {
    Root,
    Controller,
    Branch,
    Projection,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMeta {
    pub projections: Vec<(String, TemplateId)>,
}

/// One lowered template: its own `dom`, `rows`, and `exprTable`. Nested
/// controller/branch/projection templates are owned by the instruction
/// that introduces them, never shared.
pub struct TemplateIR {
    pub id: TemplateId,
    pub name: Option<String>,
    pub origin: TemplateOrigin,
    pub dom: DomNode,
    pub rows: Vec<InstructionRow>,
    pub expr_table: Vec<ExprTableEntry>,
    pub meta: Option<TemplateMeta>,
}

impl fmt::Debug for TemplateIR {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateIR")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("rows", &self.rows.len())
            .field("expr_table", &self.expr_table.len())
            .finish()
    }
}

impl TemplateIR {
    pub fn row_for(&self, target: &NodeId) -> Option<&InstructionRow> {
        self.rows.iter().find(|r| &r.target == target)
    }
}

/// `ControllerScope` drives whether `bind.rs` allocates a new overlay frame
/// or stays in the current one; re-exported here so `lower.rs`/`link.rs`
/// can reason about it without importing `catalog` directly in every file.
pub type Scope = ControllerScope;

/// Provenance-carrying wrapper for values that must never claim a
/// fabricated span — a synthetic wrapper template's own identity carries
/// its derivation instead.
#[derive(Debug, Clone)]
pub struct Provenanced<T> {
    pub value: T,
    pub provenance: Provenance,
}
