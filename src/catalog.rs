//! Project-wide semantics catalog: the single source of truth Link and
//! Typecheck consult for what a tag, attribute, controller, or event means.
//!
//! This crate never builds a catalog itself — discovery (scanning a
//! project's custom elements, value converters, behaviors) is an external
//! collaborator's job. `Catalog` is the trait this core consumes, and
//! `InMemoryCatalog` is a small builder-backed implementation useful for
//! embedding hosts and for this crate's own tests.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A type reference surfaced to Typecheck; kept as an opaque string since
/// this core never parses or type-checks view-model source.
pub type TypeRef = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bindable {
    pub name: String,
    pub type_ref: Option<TypeRef>,
    pub primary: bool,
}

impl Bindable {
    pub fn new(name: impl Into<String>) -> Self {
        Bindable { name: name.into(), type_ref: None, primary: false }
    }
}

/// A resolved custom element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRes {
    pub name: String,
    pub bindables: HashMap<String, Bindable>,
}

/// A resolved custom attribute (including value converters/binding
/// behaviors surfaced through the same lookup path where relevant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrRes {
    pub name: String,
    pub bindables: HashMap<String, Bindable>,
    pub is_template_controller: bool,
}

/// A native DOM element's known properties/events, used as the fallback
/// when no custom element/attribute claims a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DomElement {
    pub tag: String,
    pub props: HashMap<String, TypeRef>,
    pub attr_to_prop: HashMap<String, String>,
    pub events: HashMap<String, TypeRef>,
}

/// What causes a controller's def to re-run / materialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    Value { prop: String },
    Iterator { prop: String },
    Branch { parent: String },
    Marker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerScope {
    Overlay,
    Reuse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Injects {
    pub contextuals: Vec<String>,
    pub alias: Option<String>,
}

/// A tail property accepted on a controller (e.g. repeat's `key`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailProp {
    pub accepts_command: Option<String>,
    pub type_ref: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub name: String,
    pub trigger: Trigger,
    pub scope: ControllerScope,
    pub props: HashMap<String, Bindable>,
    pub injects: Injects,
    pub branches: Option<HashMap<String, String>>,
    pub tail_props: Option<HashMap<String, TailProp>>,
    pub links_to: Option<String>,
    /// Set when this config was synthesized from a plain custom attribute
    /// rather than found as a real template controller.
    pub is_stub: bool,
}

impl ControllerConfig {
    pub fn stub(name: impl Into<String>) -> Self {
        ControllerConfig {
            name: name.into(),
            trigger: Trigger::Marker,
            scope: ControllerScope::Reuse,
            props: HashMap::new(),
            injects: Injects::default(),
            branches: None,
            tail_props: None,
            links_to: None,
            is_stub: true,
        }
    }
}

/// Project-wide semantics lookup; immutable for the duration of a compile.
pub trait Catalog {
    fn element(&self, name: &str) -> Option<&ElementRes>;
    fn attribute(&self, name: &str) -> Option<&AttrRes>;
    fn controller_config(&self, name: &str) -> Option<&ControllerConfig>;
    fn dom_element(&self, tag: &str) -> Option<&DomElement>;
    fn event(&self, name: &str, tag: Option<&str>) -> Option<&TypeRef>;
    fn binding_command(&self, name: &str) -> Option<&str>;
    /// Link uses this to validate `| name` usages inside expressions
    /// (`AU0103`).
    fn has_value_converter(&self, name: &str) -> bool;
    /// Same as `has_value_converter` for `& name` binding behaviors
    /// (`AU0101`).
    fn has_binding_behavior(&self, name: &str) -> bool;
    fn naming_rule(&self, attr: &str, tag: Option<&str>) -> Option<&str>;
    fn two_way_defaults(&self, tag: &str) -> &[String];
    fn preserved_attr_prefixes(&self) -> &[String];
    fn global_naming_map(&self) -> &HashMap<String, String>;
}

fn lower(s: &str) -> String {
    s.to_ascii_lowercase()
}

/// Small built-in fixture of native element props, narrowed to a handful
/// of common cases (`input.value`, `div.className`, …) rather than a full
/// browser DOM schema.
static DEFAULT_DOM_ELEMENTS: Lazy<HashMap<String, DomElement>> = Lazy::new(|| {
    let mut map = HashMap::new();

    let mut global = DomElement { tag: "*".into(), ..Default::default() };
    global.props.insert("className".into(), "string".into());
    global.props.insert("id".into(), "string".into());
    global.props.insert("title".into(), "string".into());
    global.props.insert("textContent".into(), "string".into());
    global.attr_to_prop.insert("class".into(), "className".into());
    map.insert("*".to_string(), global);

    let mut input = DomElement { tag: "input".into(), ..Default::default() };
    input.props.insert("value".into(), "string".into());
    input.props.insert("valueAsNumber".into(), "number".into());
    input.props.insert("checked".into(), "boolean".into());
    input.props.insert("disabled".into(), "boolean".into());
    map.insert("input".to_string(), input);

    let mut textarea = DomElement { tag: "textarea".into(), ..Default::default() };
    textarea.props.insert("value".into(), "string".into());
    map.insert("textarea".to_string(), textarea);

    let mut select = DomElement { tag: "select".into(), ..Default::default() };
    select.props.insert("value".into(), "string".into());
    map.insert("select".to_string(), select);

    map
});

/// Default two-way-bound native props per tag: `<input value.bind>`
/// defaults to `twoWay`.
static DEFAULT_TWO_WAY: Lazy<HashMap<String, Vec<String>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("input".to_string(), vec!["value".to_string(), "valueAsNumber".to_string(), "checked".to_string()]);
    map.insert("textarea".to_string(), vec!["value".to_string()]);
    map.insert("select".to_string(), vec!["value".to_string()]);
    map
});

/// A plain, builder-backed catalog for hosts that don't want to implement
/// `Catalog` themselves, and for this crate's own tests.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    elements: HashMap<String, ElementRes>,
    attributes: HashMap<String, AttrRes>,
    controllers: HashMap<String, ControllerConfig>,
    dom_elements: HashMap<String, DomElement>,
    events: HashMap<String, TypeRef>,
    tag_events: HashMap<(String, String), TypeRef>,
    binding_commands: HashMap<String, String>,
    naming_rules: HashMap<String, String>,
    tag_naming_rules: HashMap<(String, String), String>,
    two_way_defaults: HashMap<String, Vec<String>>,
    preserved_prefixes: Vec<String>,
    global_naming_map: HashMap<String, String>,
    value_converters: std::collections::HashSet<String>,
    binding_behaviors: std::collections::HashSet<String>,
}

impl InMemoryCatalog {
    /// Seeds with the built-in template controllers (`if`/`else`/`repeat`/
    /// `with`/`promise`/`then`/`catch`/`pending`/`switch`/`case`/
    /// `default-case`/`portal`) and the default DOM/two-way fixtures.
    pub fn with_defaults() -> Self {
        let mut cat = InMemoryCatalog {
            dom_elements: DEFAULT_DOM_ELEMENTS.clone(),
            two_way_defaults: DEFAULT_TWO_WAY.clone(),
            preserved_prefixes: vec!["data-".to_string(), "aria-".to_string()],
            ..Default::default()
        };
        cat.register_builtin_controllers();
        cat
    }

    fn register_builtin_controllers(&mut self) {
        let reuse = |name: &str, trigger: Trigger| ControllerConfig {
            name: name.to_string(),
            trigger,
            scope: ControllerScope::Reuse,
            props: HashMap::new(),
            injects: Injects::default(),
            branches: None,
            tail_props: None,
            links_to: None,
            is_stub: false,
        };
        let overlay = |name: &str, trigger: Trigger| ControllerConfig {
            name: name.to_string(),
            trigger,
            scope: ControllerScope::Overlay,
            props: HashMap::new(),
            injects: Injects::default(),
            branches: None,
            tail_props: None,
            links_to: None,
            is_stub: false,
        };

        self.controllers.insert("if".into(), reuse("if", Trigger::Value { prop: "value".into() }));
        self.controllers.insert("else".into(), reuse("else", Trigger::Branch { parent: "if".into() }));

        let mut repeat = overlay("repeat", Trigger::Iterator { prop: "items".into() });
        repeat.injects.contextuals = vec![
            "$index".into(), "$first".into(), "$last".into(),
            "$even".into(), "$odd".into(), "$length".into(),
            "$this".into(), "$parent".into(),
        ];
        let mut tail = HashMap::new();
        tail.insert("key".into(), TailProp { accepts_command: Some("bind".into()), type_ref: None });
        repeat.tail_props = Some(tail);
        self.controllers.insert("repeat".into(), repeat);

        self.controllers.insert("with".into(), overlay("with", Trigger::Value { prop: "value".into() }));

        let mut promise = overlay("promise", Trigger::Value { prop: "value".into() });
        let mut branches = HashMap::new();
        branches.insert("then".into(), "promise".into());
        branches.insert("catch".into(), "promise".into());
        branches.insert("pending".into(), "promise".into());
        promise.branches = Some(branches);
        self.controllers.insert("promise".into(), promise);
        self.controllers.insert("then".into(), reuse("then", Trigger::Branch { parent: "promise".into() }));
        self.controllers.insert("catch".into(), reuse("catch", Trigger::Branch { parent: "promise".into() }));
        self.controllers.insert("pending".into(), reuse("pending", Trigger::Branch { parent: "promise".into() }));

        self.controllers.insert("switch".into(), reuse("switch", Trigger::Value { prop: "value".into() }));
        let mut case_branches = HashMap::new();
        case_branches.insert("case".into(), "switch".into());
        case_branches.insert("default-case".into(), "switch".into());
        self.controllers.get_mut("switch").unwrap().branches = Some(case_branches);
        self.controllers.insert("case".into(), reuse("case", Trigger::Branch { parent: "switch".into() }));
        self.controllers.insert("default-case".into(), reuse("default-case", Trigger::Branch { parent: "switch".into() }));

        self.controllers.insert("portal".into(), reuse("portal", Trigger::Value { prop: "target".into() }));
    }

    pub fn register_element(&mut self, element: ElementRes) {
        self.elements.insert(lower(&element.name), element);
    }

    pub fn register_attribute(&mut self, attr: AttrRes) {
        self.attributes.insert(lower(&attr.name), attr);
    }

    pub fn register_controller(&mut self, config: ControllerConfig) {
        self.controllers.insert(lower(&config.name), config);
    }

    pub fn register_event(&mut self, name: impl Into<String>, type_ref: impl Into<TypeRef>) {
        self.events.insert(lower(&name.into()), type_ref.into());
    }

    pub fn register_value_converter(&mut self, name: impl Into<String>) {
        self.value_converters.insert(lower(&name.into()));
    }

    pub fn register_binding_behavior(&mut self, name: impl Into<String>) {
        self.binding_behaviors.insert(lower(&name.into()));
    }
}

impl Catalog for InMemoryCatalog {
    fn element(&self, name: &str) -> Option<&ElementRes> {
        self.elements.get(&lower(name))
    }

    fn attribute(&self, name: &str) -> Option<&AttrRes> {
        self.attributes.get(&lower(name))
    }

    fn controller_config(&self, name: &str) -> Option<&ControllerConfig> {
        self.controllers.get(&lower(name))
    }

    fn dom_element(&self, tag: &str) -> Option<&DomElement> {
        self.dom_elements.get(&lower(tag))
    }

    fn event(&self, name: &str, tag: Option<&str>) -> Option<&TypeRef> {
        if let Some(tag) = tag {
            if let Some(t) = self.tag_events.get(&(lower(tag), lower(name))) {
                return Some(t);
            }
        }
        self.events.get(&lower(name))
    }

    fn binding_command(&self, name: &str) -> Option<&str> {
        self.binding_commands.get(&lower(name)).map(String::as_str)
    }

    fn has_value_converter(&self, name: &str) -> bool {
        self.value_converters.contains(&lower(name))
    }

    fn has_binding_behavior(&self, name: &str) -> bool {
        self.binding_behaviors.contains(&lower(name))
    }

    fn naming_rule(&self, attr: &str, tag: Option<&str>) -> Option<&str> {
        if let Some(tag) = tag {
            if let Some(rule) = self.tag_naming_rules.get(&(lower(tag), lower(attr))) {
                return Some(rule);
            }
        }
        self.naming_rules.get(&lower(attr)).map(String::as_str)
    }

    fn two_way_defaults(&self, tag: &str) -> &[String] {
        self.two_way_defaults.get(&lower(tag)).map(Vec::as_slice).unwrap_or(&[])
    }

    fn preserved_attr_prefixes(&self) -> &[String] {
        &self.preserved_prefixes
    }

    fn global_naming_map(&self) -> &HashMap<String, String> {
        &self.global_naming_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_controllers_are_registered() {
        let cat = InMemoryCatalog::with_defaults();
        assert!(cat.controller_config("repeat").is_some());
        assert!(cat.controller_config("if").is_some());
        let repeat = cat.controller_config("repeat").unwrap();
        assert_eq!(repeat.injects.contextuals.len(), 8);
    }

    #[test]
    fn two_way_defaults_are_looked_up_case_insensitively() {
        let cat = InMemoryCatalog::with_defaults();
        assert!(cat.two_way_defaults("INPUT").contains(&"value".to_string()));
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let mut cat = InMemoryCatalog::with_defaults();
        cat.register_element(ElementRes { name: "MyWidget".into(), bindables: HashMap::new() });
        assert!(cat.element("mywidget").is_some());
    }
}
