//! Module-scope declaration ordering.

use crate::{
    ast::{self, GlobalDeclKind},
    diagnostic::List,
    FastHashMap, FastHashSet, Handle, Span,
};

/// A `GlobalDecl` list in which each definition occurs before all its uses.
pub struct Index<'a> {
    /// Module-scope names and the declarations that introduce them.
    pub globals: FastHashMap<&'a str, Handle<ast::GlobalDecl>>,
    dependency_order: Vec<Handle<ast::GlobalDecl>>,
}

impl<'a> Index<'a> {
    /// Generate an `Index` for the given module.
    ///
    /// Perform a topological sort on `module`'s global declarations, placing
    /// referents before the declarations that refer to them. Directives come
    /// first.
    ///
    /// Reports redeclarations and reference cycles to `diagnostics` and
    /// returns `None` if there were any.
    pub fn generate(module: &'a ast::Module, diagnostics: &mut List) -> Option<Self> {
        let decls = module.declarations();

        // Produce a map from global definitions' names to their handles.
        // While doing so, reject conflicting definitions.
        let mut globals = FastHashMap::with_capacity_and_hasher(decls.len(), Default::default());
        let mut redeclared = false;
        for (handle, decl) in decls.iter() {
            let Some(ident) = decl.kind.name() else {
                continue;
            };
            if let Some(&old) = globals.get(ident.name.as_str()) {
                diagnostics.add_error(format!("redeclaration of '{}'", ident.name), ident.span);
                if let Some(previous) = decls[old].kind.name() {
                    diagnostics.add_note(
                        format!("'{}' previously declared here", ident.name),
                        previous.span,
                    );
                }
                redeclared = true;
                continue;
            }
            globals.insert(ident.name.as_str(), handle);
        }
        if redeclared {
            return None;
        }

        let dependencies = decls
            .iter()
            .map(|(_, decl)| {
                let mut collector = UseCollector::new(module, &globals);
                collector.declaration(&decl.kind);
                collector.uses
            })
            .collect();

        let len = decls.len();
        let solver = DependencySolver {
            module,
            dependencies,
            visited: vec![false; len],
            temp_visited: vec![false; len],
            path: Vec::new(),
            out: Vec::with_capacity(len),
        };
        let dependency_order = solver.solve(diagnostics)?;
        log::debug!("ordered {} declarations", dependency_order.len());

        Some(Self {
            globals,
            dependency_order,
        })
    }

    /// Iterate over `GlobalDecl`s, visiting each definition before all its uses.
    pub fn visit_ordered(&self) -> impl Iterator<Item = Handle<ast::GlobalDecl>> + '_ {
        self.dependency_order.iter().copied()
    }
}

/// A use of a module-scope name inside some declaration.
#[derive(Clone, Copy)]
struct Dependency {
    decl: Handle<ast::GlobalDecl>,
    usage: Span,
}

/// Finds the module-scope names a declaration uses, skipping names that a
/// parameter or local declaration shadows at the point of use.
struct UseCollector<'a, 'temp> {
    module: &'a ast::Module,
    globals: &'temp FastHashMap<&'a str, Handle<ast::GlobalDecl>>,
    scopes: Vec<FastHashSet<&'a str>>,
    /// First use of each referent, in source order.
    uses: Vec<Dependency>,
}

impl<'a, 'temp> UseCollector<'a, 'temp> {
    fn new(
        module: &'a ast::Module,
        globals: &'temp FastHashMap<&'a str, Handle<ast::GlobalDecl>>,
    ) -> Self {
        UseCollector {
            module,
            globals,
            scopes: Vec::new(),
            uses: Vec::new(),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn declare(&mut self, name: &'a str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name);
        }
    }

    fn ident(&mut self, ident: &'a ast::Ident) {
        if self.is_local(&ident.name) {
            return;
        }
        // Unresolved identifiers are ignored here; they may be predeclared.
        if let Some(&decl) = self.globals.get(ident.name.as_str()) {
            if !self.uses.iter().any(|dep| dep.decl == decl) {
                self.uses.push(Dependency {
                    decl,
                    usage: ident.span,
                });
            }
        }
    }

    fn declaration(&mut self, kind: &'a GlobalDeclKind) {
        match *kind {
            GlobalDeclKind::DiagnosticDirective(_)
            | GlobalDeclKind::Enable { .. }
            | GlobalDeclKind::Requires { .. } => {}
            GlobalDeclKind::Function(ref function) => self.function(function),
            GlobalDeclKind::Variable(ref var) => self.variable(var),
            GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(ref s)) => {
                self.attributes(&s.attributes);
                for member in s.members.iter() {
                    self.attributes(&member.attributes);
                    self.expression(member.ty);
                }
            }
            GlobalDeclKind::TypeDecl(ast::TypeDecl::Alias(ref alias)) => {
                self.expression(alias.ty)
            }
            GlobalDeclKind::ConstAssert(expr) => self.expression(expr),
        }
    }

    fn function(&mut self, function: &'a ast::Function) {
        self.attributes(&function.attributes);
        self.attributes(&function.return_attributes);
        if let Some(ty) = function.return_type {
            self.expression(ty);
        }
        self.scopes.push(FastHashSet::default());
        for param in function.params.iter() {
            self.attributes(&param.attributes);
            self.expression(param.ty);
            self.declare(&param.name.name);
        }
        self.block(&function.body);
        self.scopes.pop();
    }

    fn attributes(&mut self, attributes: &'a [ast::Attribute]) {
        use ast::AttributeKind as Ak;

        for attr in attributes {
            match attr.kind {
                Ak::Align(expr)
                | Ak::Binding(expr)
                | Ak::Group(expr)
                | Ak::Id(expr)
                | Ak::Location(expr)
                | Ak::Size(expr) => self.expression(expr),
                Ak::WorkgroupSize { x, y, z } => {
                    for expr in [Some(x), y, z].into_iter().flatten() {
                        self.expression(expr);
                    }
                }
                // Enumerants, not references.
                Ak::Builtin(_) | Ak::Interpolate { .. } | Ak::Diagnostic(_) => {}
                Ak::Compute | Ak::Fragment | Ak::Invariant | Ak::MustUse | Ak::Vertex => {}
            }
        }
    }

    fn variable(&mut self, var: &'a ast::Variable) {
        self.attributes(&var.attributes);
        if let Some(ty) = var.ty {
            self.expression(ty);
        }
        if let Some(init) = var.initializer {
            self.expression(init);
        }
    }

    fn expression(&mut self, expr: Handle<ast::Expression>) {
        use ast::ExpressionKind as Ek;

        match *self.module.expression(expr) {
            Ek::Literal(_) | Ek::Phony => {}
            Ek::Ident {
                ref ident,
                ref template_args,
            } => {
                self.ident(ident);
                for &arg in template_args {
                    self.expression(arg);
                }
            }
            Ek::Call {
                callee,
                ref arguments,
            } => {
                self.expression(callee);
                for &arg in arguments {
                    self.expression(arg);
                }
            }
            Ek::Bitcast { ty, expr } => {
                self.expression(ty);
                self.expression(expr);
            }
            Ek::Unary { expr, .. } => self.expression(expr),
            Ek::Binary { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            Ek::Index { base, index } => {
                self.expression(base);
                self.expression(index);
            }
            Ek::Member { base, .. } => self.expression(base),
        }
    }

    fn block(&mut self, block: &'a ast::Block) {
        self.scopes.push(FastHashSet::default());
        self.statements(&block.statements);
        self.scopes.pop();
    }

    fn statements(&mut self, statements: &'a [ast::Statement]) {
        for stmt in statements {
            self.statement(stmt);
        }
    }

    fn statement(&mut self, stmt: &'a ast::Statement) {
        use ast::StatementKind as Sk;

        match stmt.kind {
            Sk::Block(ref block) => self.block(block),
            Sk::If(ref if_) => {
                self.attributes(&if_.attributes);
                self.expression(if_.condition);
                self.block(&if_.accept);
                if let Some(ref reject) = if_.reject {
                    self.statement(reject);
                }
            }
            Sk::Switch(ref switch) => {
                self.expression(switch.selector);
                for case in switch.cases.iter() {
                    for selector in case.selectors.iter() {
                        if let ast::CaseSelector::Expr(expr) = *selector {
                            self.expression(expr);
                        }
                    }
                    self.block(&case.body);
                }
            }
            Sk::Loop(ref loop_) => {
                // `continuing` sees the declarations of the loop body.
                self.scopes.push(FastHashSet::default());
                self.statements(&loop_.body.statements);
                if let Some(ref continuing) = loop_.continuing {
                    self.block(continuing);
                }
                self.scopes.pop();
            }
            Sk::For(ref for_) => {
                self.scopes.push(FastHashSet::default());
                if let Some(ref init) = for_.init {
                    self.statement(init);
                }
                if let Some(condition) = for_.condition {
                    self.expression(condition);
                }
                if let Some(ref update) = for_.update {
                    self.statement(update);
                }
                self.block(&for_.body);
                self.scopes.pop();
            }
            Sk::While(ref while_) => {
                self.expression(while_.condition);
                self.block(&while_.body);
            }
            Sk::Break | Sk::Continue | Sk::Discard => {}
            Sk::BreakIf(expr)
            | Sk::Increment(expr)
            | Sk::Decrement(expr)
            | Sk::Call(expr)
            | Sk::ConstAssert(expr) => self.expression(expr),
            Sk::Return(value) => {
                if let Some(value) = value {
                    self.expression(value);
                }
            }
            Sk::Declaration(ref var) => {
                self.variable(var);
                self.declare(&var.name.name);
            }
            Sk::Assignment { lhs, rhs, .. } => {
                self.expression(lhs);
                self.expression(rhs);
            }
        }
    }
}

/// Local state for ordering a module's declarations.
///
/// A depth-first sort rather than a general topological sort, so that the
/// current path is at hand for reporting cycles.
struct DependencySolver<'temp> {
    module: &'temp ast::Module,

    /// For each declaration, the declarations it uses.
    dependencies: Vec<Vec<Dependency>>,

    /// For each handle, whether we have pushed it onto `out` yet.
    visited: Vec<bool>,

    /// For each handle, whether it is a predecessor in the current depth-first
    /// traversal. This is used to detect cycles in the reference graph.
    temp_visited: Vec<bool>,

    /// The current path in our depth-first traversal.
    path: Vec<Handle<ast::GlobalDecl>>,

    /// The list of declaration handles, with declarations before uses.
    out: Vec<Handle<ast::GlobalDecl>>,
}

impl DependencySolver<'_> {
    /// Produce the sorted list of declaration handles, and check for cycles.
    fn solve(mut self, diagnostics: &mut List) -> Option<Vec<Handle<ast::GlobalDecl>>> {
        let decls = self.module.declarations();
        for (id, decl) in decls.iter() {
            if is_directive(&decl.kind) {
                self.visited[id.index()] = true;
                self.out.push(id);
            }
        }

        for id in decls.handles() {
            if self.visited[id.index()] {
                continue;
            }
            if let Err(cycle) = self.dfs(id) {
                self.report_cycle(&cycle, diagnostics);
                return None;
            }
        }

        Some(self.out)
    }

    /// Ensure that all declarations used by `id` have been added to the
    /// ordering, and then append `id` itself.
    ///
    /// On finding a cycle, returns the declarations on it, starting and
    /// ending with the same one.
    fn dfs(&mut self, id: Handle<ast::GlobalDecl>) -> Result<(), Vec<Handle<ast::GlobalDecl>>> {
        let id_usize = id.index();

        self.temp_visited[id_usize] = true;
        self.path.push(id);
        for i in 0..self.dependencies[id_usize].len() {
            let dep_id = self.dependencies[id_usize][i].decl;
            let dep_id_usize = dep_id.index();

            if self.temp_visited[dep_id_usize] {
                // Found a cycle. Report the path from the earlier visit of
                // `dep_id` back round to itself.
                let start_at = self
                    .path
                    .iter()
                    .rposition(|&decl| decl == dep_id)
                    .unwrap_or(0);
                let mut cycle = self.path[start_at..].to_vec();
                cycle.push(dep_id);
                return Err(cycle);
            } else if !self.visited[dep_id_usize] {
                self.dfs(dep_id)?;
            }
        }

        // Remove this node from the current path.
        self.path.pop();
        self.temp_visited[id_usize] = false;

        self.out.push(id);
        self.visited[id_usize] = true;

        Ok(())
    }

    fn report_cycle(&self, cycle: &[Handle<ast::GlobalDecl>], diagnostics: &mut List) {
        let decls = self.module.declarations();
        let name = |id: Handle<ast::GlobalDecl>| {
            decls[id]
                .kind
                .name()
                .map_or("<unnamed>", |ident| ident.name.as_str())
        };

        let path = cycle
            .iter()
            .map(|&id| format!("'{}'", name(id)))
            .collect::<Vec<_>>()
            .join(" -> ");
        let root = cycle[0];
        diagnostics.add_error(
            format!("cyclic dependency found: {path}"),
            self.module.declaration_span(root),
        );

        for pair in cycle.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let usage = self.dependencies[from.index()]
                .iter()
                .find(|dep| dep.decl == to)
                .map_or(Span::UNDEFINED, |dep| dep.usage);
            diagnostics.add_note(
                format!(
                    "{} '{}' references {} '{}' here",
                    kind_of(&decls[from].kind),
                    name(from),
                    kind_of(&decls[to].kind),
                    name(to)
                ),
                usage,
            );
        }
    }
}

const fn is_directive(kind: &GlobalDeclKind) -> bool {
    matches!(
        *kind,
        GlobalDeclKind::DiagnosticDirective(_)
            | GlobalDeclKind::Enable { .. }
            | GlobalDeclKind::Requires { .. }
    )
}

/// The word used for a declaration in messages.
pub const fn kind_of(kind: &GlobalDeclKind) -> &'static str {
    match *kind {
        GlobalDeclKind::Function(_) => "function",
        GlobalDeclKind::Variable(ref var) => var.kind.keyword(),
        GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(_)) => "struct",
        GlobalDeclKind::TypeDecl(ast::TypeDecl::Alias(_)) => "alias",
        GlobalDeclKind::ConstAssert(_) => "const_assert",
        GlobalDeclKind::DiagnosticDirective(_) => "diagnostic",
        GlobalDeclKind::Enable { .. } => "enable",
        GlobalDeclKind::Requires { .. } => "requires",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::wgsl::parse_str;

    fn order(source: &str) -> Vec<String> {
        let module = parse_str(source).unwrap();
        let mut diagnostics = List::new();
        let index = Index::generate(&module, &mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        index
            .visit_ordered()
            .filter_map(|h| module.declaration(h).kind.name().map(|i| i.name.clone()))
            .collect()
    }

    fn errors(source: &str) -> String {
        let module = parse_str(source).unwrap();
        let mut diagnostics = List::new();
        assert!(Index::generate(&module, &mut diagnostics).is_none());
        diagnostics.to_plain_string(source)
    }

    #[test]
    fn uses_come_first() {
        assert_eq!(
            order("fn main() { let x = helper(); } fn helper() -> S { return S(); } struct S { a: i32 }"),
            ["S", "helper", "main"]
        );
    }

    #[test]
    fn locals_shadow_globals() {
        // The parameter `b` shadows the function `b`, so there is no cycle.
        assert_eq!(order("fn a(b: i32) -> i32 { return b; } fn b() { a(1); }"), ["a", "b"]);
    }

    #[test]
    fn redeclaration() {
        assert_eq!(
            errors("var<private> x: i32; fn x() {}"),
            "1:25 error: redeclaration of 'x'\n1:14 note: 'x' previously declared here"
        );
    }

    #[test]
    fn cycles() {
        assert_eq!(
            errors("fn a() { b(); }\nfn b() { a(); }"),
            "1:1 error: cyclic dependency found: 'a' -> 'b' -> 'a'\n\
             1:10 note: function 'a' references function 'b' here\n\
             2:10 note: function 'b' references function 'a' here"
        );
        assert_eq!(
            errors("alias A = array<A, 4>;"),
            "1:1 error: cyclic dependency found: 'A' -> 'A'\n\
             1:17 note: alias 'A' references alias 'A' here"
        );
    }
}
