//! Top-level orchestration: wires Lower → Link → Bind → Typecheck together
//! for external callers, the way `compiler.rs` wires its own parser/codegen
//! modules together. Nothing in this module does analysis work itself — it
//! only sequences the four phase entry points and collects their outputs
//! into one result.

use crate::bind::{bind, ScopeModule};
use crate::catalog::Catalog;
use crate::diagnostics::{Diagnostic, DiagnosticsRuntime};
use crate::external::{AttributeParser, ExpressionParser, HtmlNode};
use crate::identity::{SourceFileId, TemplateIdAllocator};
use crate::ir::TemplateIR;
use crate::link::{link, LinkedTemplate};
use crate::lower::{lower_root, LowerShared};
use crate::meta::{extract_meta, MetaResult};
use crate::typecheck::{typecheck, TypecheckConfig, TypecheckModule};

/// Everything one call to [`compile_template`] produces for a single root
/// template (its own tree plus every nested controller `def`).
#[derive(Debug)]
pub struct CompilationOutcome {
    pub template: TemplateIR,
    pub meta: MetaResult,
    pub linked: LinkedTemplate,
    pub scope: ScopeModule,
    pub typecheck: TypecheckModule,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the full analysis pipeline over an already-parsed HTML forest.
///
/// Parsing the raw markup into `nodes` is the caller's job; this core
/// never reads source bytes itself except through spans it was handed.
#[allow(clippy::too_many_arguments)]
pub fn compile_template(
    name: Option<String>,
    nodes: &[HtmlNode],
    file: SourceFileId,
    catalog: &dyn Catalog,
    expr_parser: &dyn ExpressionParser,
    attr_parser: &dyn AttributeParser,
    template_ids: &mut TemplateIdAllocator,
    typecheck_config: &TypecheckConfig,
) -> CompilationOutcome {
    let (meta, _remove_ranges) = extract_meta(nodes);

    let mut diagnostics = DiagnosticsRuntime::new();
    let mut shared = LowerShared { catalog, expr_parser, attr_parser, diagnostics: &mut diagnostics, template_ids, file };
    let template = lower_root(&mut shared, name, nodes);

    let linked = link(&template, catalog, &mut diagnostics);
    let scope = bind(&template, catalog, &mut diagnostics);
    let typecheck_result = typecheck(&template, &linked, catalog, typecheck_config, &mut diagnostics);

    CompilationOutcome {
        template,
        meta,
        linked,
        scope,
        typecheck: typecheck_result,
        diagnostics: diagnostics.all(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::external::{BadExpression, DefaultAttributeParser, ExpressionAst, ParseContext};
    use crate::identity::SourceFileRegistry;

    struct NullExpressionParser;

    impl ExpressionParser for NullExpressionParser {
        fn parse(&self, code: &str, _ctx: ParseContext) -> Box<dyn ExpressionAst> {
            Box::new(BadExpression { message: format!("no parser configured for '{code}'") })
        }
    }

    #[test]
    fn compiles_an_empty_template_with_no_diagnostics() {
        let catalog = InMemoryCatalog::with_defaults();
        let expr_parser = NullExpressionParser;
        let attr_parser = DefaultAttributeParser;
        let mut reg = SourceFileRegistry::new();
        let file = reg.intern("/empty.html");
        let mut template_ids = TemplateIdAllocator::new();
        let config = TypecheckConfig::default();

        let outcome = compile_template(None, &[], file, &catalog, &expr_parser, &attr_parser, &mut template_ids, &config);

        assert!(outcome.diagnostics.is_empty());
        assert!(outcome.template.rows.is_empty());
        assert!(outcome.linked.instructions.is_empty());
        assert!(outcome.typecheck.contracts.is_empty());
    }
}
