//! End-to-end coverage of the full Lower -> Link -> Bind -> Typecheck
//! pipeline, built from hand-authored HTML fixtures rather than a real
//! HTML parser (none is wired into this crate; it only consumes the
//! `HtmlNode` shape a host's own parser produces).

use aurelia_template_analyzer::bind::FrameKind;
use aurelia_template_analyzer::catalog::{AttrRes, Bindable, ControllerConfig, InMemoryCatalog, Trigger};
use aurelia_template_analyzer::catalog::ControllerScope;
use aurelia_template_analyzer::external::{
    BindingPattern, DefaultAttributeParser, ExpressionAst, ExpressionParser, ForOfStatement, HtmlAttr, HtmlElement,
    HtmlNode, HtmlText, ParseContext,
};
use aurelia_template_analyzer::facade::compile_template;
use aurelia_template_analyzer::identity::{SourceFileRegistry, SourceSpan, TemplateIdAllocator};
use aurelia_template_analyzer::ir::{BindingSource, Instruction};
use aurelia_template_analyzer::link::TargetSem;
use aurelia_template_analyzer::typecheck::{BindingContext, TypecheckConfig};

/// Parses any code as a plain, never-bad expression; on `IsIterator`
/// requests it splits `"x of y"` into a declaration/iterable pair the way a
/// real expression parser's iterator-statement production would.
#[derive(Debug)]
struct PlainExpr {
    for_of: Option<ForOfStatement>,
}

impl ExpressionAst for PlainExpr {
    fn is_bad_expression(&self) -> bool {
        false
    }
    fn as_for_of(&self) -> Option<&ForOfStatement> {
        self.for_of.as_ref()
    }
}

struct FixtureExpressionParser;

impl ExpressionParser for FixtureExpressionParser {
    fn parse(&self, code: &str, ctx: ParseContext) -> Box<dyn ExpressionAst> {
        if ctx == ParseContext::IsIterator {
            if let Some((local, iterable)) = code.split_once(" of ") {
                let iterable_ast: Box<dyn ExpressionAst> = Box::new(PlainExpr { for_of: None });
                let _ = iterable;
                return Box::new(PlainExpr {
                    for_of: Some(ForOfStatement {
                        declaration: Ok(BindingPattern::Identifier(local.trim().to_string())),
                        iterable: iterable_ast,
                    }),
                });
            }
        }
        Box::new(PlainExpr { for_of: None })
    }
}

/// Finds `needle`'s byte range inside `source`, used to give hand-built
/// fixtures spans that line up with the literal HTML text under test
/// instead of hardcoded offsets.
fn find_span(file: aurelia_template_analyzer::identity::SourceFileId, source: &str, needle: &str) -> SourceSpan {
    let start = source.find(needle).unwrap_or_else(|| panic!("'{needle}' not found in fixture source")) as u32;
    SourceSpan::new(file, start, start + needle.len() as u32)
}

fn attr_with_spans(
    file: aurelia_template_analyzer::identity::SourceFileId,
    source: &str,
    name: &str,
    value: &str,
) -> HtmlAttr {
    let name_needle = format!("{name}=\"{value}\"");
    let tag_span = find_span(file, source, &name_needle);
    HtmlAttr {
        name: name.to_string(),
        value: value.to_string(),
        name_span: Some(SourceSpan::new(file, tag_span.start, tag_span.start + name.len() as u32)),
        value_span: Some(find_span(file, source, value)),
    }
}

fn element(tag: &str, attrs: Vec<HtmlAttr>, children: Vec<HtmlNode>, span: SourceSpan) -> HtmlElement {
    HtmlElement { tag_name: tag.to_string(), attrs, children, source_span: span, start_tag_span: None, end_tag_span: None, is_self_closing: false }
}

fn register_load_attribute(catalog: &mut InMemoryCatalog) {
    let mut bindables = std::collections::HashMap::new();
    bindables.insert("route".to_string(), Bindable::new("route"));
    bindables.insert("params".to_string(), Bindable::new("params"));
    catalog.register_attribute(AttrRes {
        name: "load".to_string(),
        bindables,
        is_template_controller: false,
    });
}

#[test]
fn scenario1_multi_binding_attribute_splits_into_two_property_bindings() {
    let source = r#"<a load="route.bind: currentRoute; params.bind: routeParams"></a>"#;
    let mut reg = SourceFileRegistry::new();
    let file = reg.intern("/scenario1.html");
    let whole = find_span(file, source, source);

    let load = attr_with_spans(file, source, "load", "route.bind: currentRoute; params.bind: routeParams");
    let a = HtmlNode::Element(element("a", vec![load], vec![], whole));

    let mut catalog = InMemoryCatalog::with_defaults();
    register_load_attribute(&mut catalog);
    let expr_parser = FixtureExpressionParser;
    let attr_parser = DefaultAttributeParser;
    let mut template_ids = TemplateIdAllocator::new();
    let config = TypecheckConfig::default();

    let outcome = compile_template(None, &[a], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

    let row = outcome.template.rows.first().expect("one row for the <a> element");
    assert_eq!(row.instructions.len(), 1, "the whole multi-binding attribute is one HydrateAttribute wrapper");

    let Instruction::HydrateAttribute { name, props, .. } = &row.instructions[0] else {
        panic!("expected HydrateAttribute, got {:?}", row.instructions[0]);
    };
    assert_eq!(name, "load");
    assert_eq!(props.len(), 2);

    let targets: Vec<&str> = props
        .iter()
        .map(|ins| match ins {
            Instruction::PropertyBinding { to, .. } => to.as_str(),
            other => panic!("expected PropertyBinding, got {other:?}"),
        })
        .collect();
    assert_eq!(targets, vec!["route", "params"]);

    for (ins, expected_code) in props.iter().zip(["currentRoute", "routeParams"]) {
        let Instruction::PropertyBinding { from: BindingSource::ExprRef(expr), .. } = ins else {
            panic!("expected a single-expression binding");
        };
        assert_eq!(expr.loc.slice(source), expected_code);
    }

    // Both split properties resolve against `load`'s own bindables, not the
    // unknown `<a>` property of the same name — this is the bug the
    // `AttributeBindable` target exists to catch.
    assert_eq!(outcome.linked.instructions.len(), 2);
    for linked in &outcome.linked.instructions {
        assert_eq!(linked.target, TargetSem::AttributeBindable);
    }
    assert!(outcome.diagnostics.iter().all(|d| d.code != "AU1104"));

    // Both expressions evaluate in the template's root frame: no controller
    // or repeat overlay stands between `<a>` and the root.
    let scope = &outcome.scope.templates[0];
    for ins in props {
        let Instruction::PropertyBinding { from: BindingSource::ExprRef(expr), .. } = ins else { unreachable!() };
        let frame_id = scope.expr_to_frame[&(outcome.template.id, expr.id)];
        assert_eq!(frame_id, scope.root);
    }
}

#[test]
fn static_colon_bearing_attribute_is_not_mistaken_for_multi_binding() {
    let source = r#"<div title="Note: important"></div>"#;
    let mut reg = SourceFileRegistry::new();
    let file = reg.intern("/static-colon.html");
    let whole = find_span(file, source, source);

    let title = attr_with_spans(file, source, "title", "Note: important");
    let div = HtmlNode::Element(element("div", vec![title], vec![], whole));

    let catalog = InMemoryCatalog::with_defaults();
    let expr_parser = FixtureExpressionParser;
    let attr_parser = DefaultAttributeParser;
    let mut template_ids = TemplateIdAllocator::new();
    let config = TypecheckConfig::default();

    let outcome = compile_template(None, &[div], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

    // "title" is not a registered custom attribute, so the colon in its
    // value is just text — it must survive as a static DOM attribute, not
    // get split into a bogus PropertyBinding.
    assert!(outcome.template.rows.is_empty(), "no instruction row for a purely static attribute");
    let aurelia_template_analyzer::ir::DomNode::Template { children, .. } = &outcome.template.dom else {
        panic!("expected the synthetic root Template node");
    };
    let aurelia_template_analyzer::ir::DomNode::Element { attrs, .. } = &children[0] else {
        panic!("expected the <div> element node");
    };
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs[0].name, "title");
    assert_eq!(attrs[0].value, "Note: important");
}

#[test]
fn bind_expression_with_its_own_colon_is_not_split_on_it() {
    let source = r#"<div value.bind="isActive ? 'Yes' : 'No'"></div>"#;
    let mut reg = SourceFileRegistry::new();
    let file = reg.intern("/colon-in-bind.html");
    let whole = find_span(file, source, source);

    let value_bind = attr_with_spans(file, source, "value.bind", "isActive ? 'Yes' : 'No'");
    let div = HtmlNode::Element(element("div", vec![value_bind], vec![], whole));

    let catalog = InMemoryCatalog::with_defaults();
    let expr_parser = FixtureExpressionParser;
    let attr_parser = DefaultAttributeParser;
    let mut template_ids = TemplateIdAllocator::new();
    let config = TypecheckConfig::default();

    let outcome = compile_template(None, &[div], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

    let row = outcome.template.rows.first().expect("one row for the <div> element");
    assert_eq!(row.instructions.len(), 1, "`value` is not a custom attribute, so no HydrateAttribute wrapping");
    let Instruction::PropertyBinding { to, from: BindingSource::ExprRef(expr), .. } = &row.instructions[0] else {
        panic!("expected a single unsplit PropertyBinding, got {:?}", row.instructions[0]);
    };
    assert_eq!(to, "value");
    assert_eq!(expr.loc.slice(source), "isActive ? 'Yes' : 'No'");
}

#[test]
fn scenario3_native_two_way_default_applies_to_input_value() {
    let source = r#"<input value.bind="name">"#;
    let mut reg = SourceFileRegistry::new();
    let file = reg.intern("/scenario3.html");
    let whole = find_span(file, source, source);

    let value_bind = attr_with_spans(file, source, "value.bind", "name");
    let input = HtmlNode::Element(element("input", vec![value_bind], vec![], whole));

    let catalog = InMemoryCatalog::with_defaults();
    let expr_parser = FixtureExpressionParser;
    let attr_parser = DefaultAttributeParser;
    let mut template_ids = TemplateIdAllocator::new();
    let config = TypecheckConfig::default();

    let outcome = compile_template(None, &[input], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

    assert_eq!(outcome.linked.instructions.len(), 1);
    let linked = &outcome.linked.instructions[0];
    assert_eq!(linked.target, TargetSem::ElementNativeProp);
    assert_eq!(linked.effective_mode, Some(aurelia_template_analyzer::ir::BindingMode::TwoWay));
}

#[test]
fn scenario4_unknown_element_and_unknown_prop_get_no_binding_contract() {
    let source = r#"<unknown-tag prop.bind="x"></unknown-tag>"#;
    let mut reg = SourceFileRegistry::new();
    let file = reg.intern("/scenario4.html");
    let whole = find_span(file, source, source);

    let prop_bind = attr_with_spans(file, source, "prop.bind", "x");
    let el = HtmlNode::Element(element("unknown-tag", vec![prop_bind], vec![], whole));

    let catalog = InMemoryCatalog::with_defaults();
    let expr_parser = FixtureExpressionParser;
    let attr_parser = DefaultAttributeParser;
    let mut template_ids = TemplateIdAllocator::new();
    let config = TypecheckConfig::default();

    let outcome = compile_template(None, &[el], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

    assert!(outcome.diagnostics.iter().any(|d| d.code == "AU1102"));
    assert!(outcome.diagnostics.iter().any(|d| d.code == "AU1104"));
    assert_eq!(outcome.linked.instructions[0].target, TargetSem::Unknown { reason: aurelia_template_analyzer::link::UnknownReason::NoProp });
    assert!(outcome.typecheck.contracts.is_empty(), "no binding contract for a target that resolved to unknown");
}

#[test]
fn scenario5_import_preserves_export_name_casing_and_span() {
    let source = r#"<import from="./converters" DateFormat.as="df"></import>"#;
    let mut reg = SourceFileRegistry::new();
    let file = reg.intern("/scenario5.html");
    let whole = find_span(file, source, source);

    let from = attr_with_spans(file, source, "from", "./converters");
    let alias = attr_with_spans(file, source, "DateFormat.as", "df");
    let import_el = HtmlNode::Element(element("import", vec![from, alias], vec![], whole));

    let catalog = InMemoryCatalog::with_defaults();
    let expr_parser = FixtureExpressionParser;
    let attr_parser = DefaultAttributeParser;
    let mut template_ids = TemplateIdAllocator::new();
    let config = TypecheckConfig::default();

    let outcome = compile_template(None, &[import_el], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

    assert_eq!(outcome.meta.imports.len(), 1);
    let entry = &outcome.meta.imports[0];
    assert_eq!(entry.meta.from.value, "./converters");
    assert_eq!(entry.meta.named_aliases.len(), 1);
    let named = &entry.meta.named_aliases[0];
    assert_eq!(named.export_name.value, "DateFormat");
    assert_eq!(named.export_name.span.slice(source), "DateFormat");
    assert_eq!(named.alias.value, "df");

    // The whole <import> tag is meta: Lower must not have produced any
    // instruction rows or DOM nodes for it, and the element itself never
    // reaches `classify_dom` (no AU1102 for a meta-only tag).
    assert!(outcome.template.rows.is_empty());
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn repeat_locals_and_contextuals_materialize_in_an_overlay_frame() {
    let source = r#"<div repeat.for="item of items">${item}</div>"#;
    let mut reg = SourceFileRegistry::new();
    let file = reg.intern("/repeat.html");
    let whole = find_span(file, source, source);

    let repeat_for = attr_with_spans(file, source, "repeat.for", "item of items");
    let text_span = find_span(file, source, "${item}");
    let text = HtmlNode::Text(HtmlText { value: "${item}".to_string(), span: text_span });
    let div = HtmlNode::Element(element("div", vec![repeat_for], vec![text], whole));

    let catalog = InMemoryCatalog::with_defaults();
    let expr_parser = FixtureExpressionParser;
    let attr_parser = DefaultAttributeParser;
    let mut template_ids = TemplateIdAllocator::new();
    let config = TypecheckConfig::default();

    let outcome = compile_template(None, &[div], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

    let scope = &outcome.scope.templates[0];
    let overlay = scope.frames.iter().find(|f| f.kind == FrameKind::Overlay).expect("repeat materializes an overlay frame");
    let names: Vec<&str> = overlay.symbols.iter().map(|s| match s {
        aurelia_template_analyzer::bind::ScopeSymbol::IteratorLocal(n) => n.as_str(),
        aurelia_template_analyzer::bind::ScopeSymbol::IteratorContextual(n) => n.as_str(),
        _ => "",
    }).collect();
    assert!(names.contains(&"item"));
    for contextual in ["$index", "$first", "$last", "$even", "$odd", "$length", "$this", "$parent"] {
        assert!(names.contains(&contextual), "missing contextual {contextual}");
    }
}

#[test]
fn stub_controller_suppresses_typecheck_contracts_for_its_whole_subtree() {
    let source = r#"<div mystery.bind="x">${y}</div>"#;
    let mut reg = SourceFileRegistry::new();
    let file = reg.intern("/stub.html");
    let whole = find_span(file, source, source);

    let mystery = attr_with_spans(file, source, "mystery.bind", "x");
    let text_span = find_span(file, source, "${y}");
    let text = HtmlNode::Text(HtmlText { value: "${y}".to_string(), span: text_span });
    let div = HtmlNode::Element(element("div", vec![mystery], vec![text], whole));

    let mut catalog = InMemoryCatalog::with_defaults();
    catalog.register_controller(ControllerConfig {
        name: "mystery".to_string(),
        trigger: Trigger::Value { prop: "value".to_string() },
        scope: ControllerScope::Reuse,
        props: {
            let mut m = std::collections::HashMap::new();
            m.insert("value".to_string(), Bindable::new("value"));
            m
        },
        injects: Default::default(),
        branches: None,
        tail_props: None,
        links_to: None,
        is_stub: true,
    });

    let expr_parser = FixtureExpressionParser;
    let attr_parser = DefaultAttributeParser;
    let mut template_ids = TemplateIdAllocator::new();
    let config = TypecheckConfig::default();

    let outcome = compile_template(None, &[div], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

    // The controller's own trigger expression ("x") still gets a contract —
    // it is the controller instruction's own binding, not part of its def.
    // What must not get a contract is "${y}", which lives inside the stub's
    // def and is therefore cascade-suppressed.
    assert_eq!(outcome.typecheck.contracts.len(), 1);
    let contract = outcome.typecheck.contracts.values().next().unwrap();
    assert_eq!(contract.context, BindingContext::ControllerProp);
}
