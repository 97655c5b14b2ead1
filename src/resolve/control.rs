//! `diagnostic(...)` directives and `@diagnostic(...)` attributes.
//!
//! Every list of controls (the module's directives, or the attributes of one
//! function, block or statement) is collected into its own [`FilterMap`], so
//! that conflicts are only reported between controls of the same list. The
//! recognized rules of each list become a [`SeverityTable`]; lookups walk
//! those tables from the innermost construct outwards.

use crate::{
    ast::{self, NodeId},
    diagnostic::{
        filter::{self, FilterMap, Lookup, ScopeChain, SeverityTable},
        suggest, List,
    },
    FastHashMap, Span,
};

/// The rule severities of a module and of each construct that carries
/// `@diagnostic` attributes.
#[derive(Clone, Debug, Default)]
pub struct Severities {
    module: SeverityTable,
    scoped: FastHashMap<NodeId, SeverityTable>,
}

impl Severities {
    /// Severities set by the module's directives.
    pub const fn module(&self) -> &SeverityTable {
        &self.module
    }

    /// Severities set by the attributes of the node `id`, if it has any.
    pub fn scope(&self, id: NodeId) -> Option<&SeverityTable> {
        self.scoped.get(&id)
    }

    pub const fn root(&self) -> ScopeChain<'_> {
        ScopeChain::root(&self.module)
    }

    /// The chain for the construct `id`, nested in `parent`.
    pub fn enter<'b>(&'b self, parent: &'b ScopeChain<'b>, id: NodeId) -> ScopeChain<'b> {
        match self.scoped.get(&id) {
            Some(table) => parent.push(table),
            None => *parent,
        }
    }
}

/// Which kind of control list conflicts are reported for.
#[derive(Clone, Copy)]
enum ListKind {
    Directive,
    Attribute,
}

impl ListKind {
    const fn conflict_message(self) -> &'static str {
        match self {
            Self::Directive => "conflicting diagnostic directive",
            Self::Attribute => "conflicting diagnostic attribute",
        }
    }
}

/// Collects the severity tables of `module`, reporting unrecognized rules
/// and conflicting controls.
pub fn collect(module: &ast::Module, diagnostics: &mut List) -> Severities {
    let mut collector = Collector {
        diagnostics,
        severities: Severities::default(),
    };

    let mut directives = FilterMap::new();
    for (handle, decl) in module.declarations().iter() {
        if let ast::GlobalDeclKind::DiagnosticDirective(ref control) = decl.kind {
            let span = module.declaration_span(handle);
            collector.add(&mut directives, control, span, ListKind::Directive);
        }
    }
    collector.severities.module = directives.known();

    for (_, decl) in module.declarations().iter() {
        if let ast::GlobalDeclKind::Function(ref function) = decl.kind {
            collector.attributes(decl.id, &function.attributes);
            collector.block(&function.body);
        }
    }

    collector.severities
}

struct Collector<'d> {
    diagnostics: &'d mut List,
    severities: Severities,
}

impl Collector<'_> {
    fn add(
        &mut self,
        map: &mut FilterMap,
        control: &ast::DiagnosticControl,
        span: Span,
        kind: ListKind,
    ) {
        let rule = &control.rule;
        let category = rule.category.as_ref().map(|ident| ident.name.as_str());
        if let Lookup::Unrecognized { candidates } = filter::lookup(category, &rule.name.name) {
            let names: Vec<String> = candidates.iter().map(|rule| rule.full_name()).collect();
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut message = format!("unrecognized diagnostic rule '{rule}'\n");
            suggest::write_alternatives(&mut message, &rule.to_string(), &names);
            self.diagnostics.add_warning(message, rule.span());
        }

        if let Err(conflict) = map.add(rule.key(), control.severity, span) {
            let [first, second] = conflict.spans;
            self.diagnostics.add_error(kind.conflict_message(), second);
            self.diagnostics.add_note(
                format!(
                    "severity of '{}' set to '{}' here",
                    conflict.rule,
                    control.severity.to_ident()
                ),
                first,
            );
        }
    }

    /// Collects one attribute list as the table of node `id`.
    fn attributes(&mut self, id: NodeId, attributes: &[ast::Attribute]) {
        let table = self.attribute_table(attributes);
        if !table.is_empty() {
            self.severities.scoped.insert(id, table);
        }
    }

    fn attribute_table(&mut self, attributes: &[ast::Attribute]) -> SeverityTable {
        let mut map = FilterMap::new();
        for attr in attributes {
            if let ast::AttributeKind::Diagnostic(ref control) = attr.kind {
                self.add(&mut map, control, attr.span, ListKind::Attribute);
            }
        }
        map.known()
    }

    fn block(&mut self, block: &ast::Block) {
        self.attributes(block.id, &block.attributes);
        for stmt in block.statements.iter() {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &ast::Statement) {
        use ast::StatementKind as Sk;

        match stmt.kind {
            Sk::Block(ref block) => self.block(block),
            Sk::If(ref if_) => {
                self.attributes(stmt.id, &if_.attributes);
                self.block(&if_.accept);
                if let Some(ref reject) = if_.reject {
                    self.statement(reject);
                }
            }
            Sk::Switch(ref switch) => {
                // The body's attributes refine the statement's.
                let mut table = self.attribute_table(&switch.attributes);
                let body = self.attribute_table(&switch.body_attributes);
                for &rule in filter::Rule::ALL {
                    if let Some(severity) = body.get(rule) {
                        table.set(rule, severity);
                    }
                }
                if !table.is_empty() {
                    self.severities.scoped.insert(stmt.id, table);
                }
                for case in switch.cases.iter() {
                    self.block(&case.body);
                }
            }
            Sk::Loop(ref loop_) => {
                self.attributes(stmt.id, &loop_.attributes);
                self.block(&loop_.body);
                if let Some(ref continuing) = loop_.continuing {
                    self.block(continuing);
                }
            }
            Sk::For(ref for_) => {
                self.attributes(stmt.id, &for_.attributes);
                if let Some(ref init) = for_.init {
                    self.statement(init);
                }
                if let Some(ref update) = for_.update {
                    self.statement(update);
                }
                self.block(&for_.body);
            }
            Sk::While(ref while_) => {
                self.attributes(stmt.id, &while_.attributes);
                self.block(&while_.body);
            }
            Sk::Break
            | Sk::BreakIf(_)
            | Sk::Continue
            | Sk::Return(_)
            | Sk::Discard
            | Sk::Declaration(_)
            | Sk::Assignment { .. }
            | Sk::Increment(_)
            | Sk::Decrement(_)
            | Sk::Call(_)
            | Sk::ConstAssert(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::wgsl::parse_str;

    fn run(source: &str) -> (Severities, String) {
        let module = parse_str(source).unwrap();
        let mut diagnostics = List::new();
        let severities = collect(&module, &mut diagnostics);
        (severities, diagnostics.to_plain_string(source))
    }

    #[test]
    fn directive_sets_module_severity() {
        let (severities, messages) = run("diagnostic(off, derivative_uniformity);");
        assert_eq!(messages, "");
        assert_eq!(
            severities.root().severity(filter::Rule::DerivativeUniformity),
            filter::Severity::Off
        );
        assert_eq!(
            severities.root().severity(filter::Rule::UnreachableCode),
            filter::Severity::Warning
        );
    }

    #[test]
    fn unrecognized_rule_suggests() {
        let (_, messages) = run("diagnostic(off, chromium.unreachable_cod);");
        assert_eq!(
            messages,
            "1:17 warning: unrecognized diagnostic rule 'chromium.unreachable_cod'\n\
             Did you mean 'chromium.unreachable_code'?\n\
             Possible values: 'chromium.unreachable_code'"
        );
        let (_, messages) = run("diagnostic(off, some_tool.anything);");
        assert_eq!(messages, "");
    }

    #[test]
    fn conflicting_directives() {
        let (_, messages) = run(
            "diagnostic(warning, chromium.unreachable_code);\n\
             diagnostic(off, chromium.unreachable_code);",
        );
        assert_eq!(
            messages,
            "2:1 error: conflicting diagnostic directive\n\
             1:1 note: severity of 'chromium.unreachable_code' set to 'off' here"
        );
    }

    #[test]
    fn attribute_scopes_nest() {
        let source = "@diagnostic(info, chromium.unreachable_code)\n\
                      fn f() { @diagnostic(error, chromium.unreachable_code) { return; } }";
        let module = parse_str(source).unwrap();
        let mut diagnostics = List::new();
        let severities = collect(&module, &mut diagnostics);
        assert!(diagnostics.is_empty());

        let (_, decl) = module.declarations().iter().next().unwrap();
        let ast::GlobalDeclKind::Function(ref function) = decl.kind else {
            panic!("expected a function");
        };
        let root = severities.root();
        let in_function = severities.enter(&root, decl.id);
        assert_eq!(
            in_function.severity(filter::Rule::UnreachableCode),
            filter::Severity::Info
        );
        let ast::StatementKind::Block(ref block) = function.body.statements[0].kind else {
            panic!("expected a block");
        };
        let in_block = severities.enter(&in_function, block.id);
        assert_eq!(
            in_block.severity(filter::Rule::UnreachableCode),
            filter::Severity::Error
        );
    }
}
