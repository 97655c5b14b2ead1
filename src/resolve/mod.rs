/*!
Semantic analysis of a parsed [`ast::Module`].

[`resolve`] runs these passes in order:

1. `@diagnostic` attributes and `diagnostic(...)` directives are collected
   into per-scope severity tables.
2. Module-scope declarations are sorted so that every declaration comes
   after the declarations it uses. Redeclarations and cycles stop analysis.
3. Each declaration is resolved: types are computed for every expression,
   builtin calls are matched against their overloads, constant expressions
   are folded and statements are checked.
4. If nothing so far was an error, derivative and barrier calls are checked
   for uniform control flow.

The output is an [`Info`] side table keyed by expression and declaration
handles. The module itself is never modified.
*/

pub mod builtins;
mod control;
pub mod eval;
mod expression;
mod index;
mod statement;
pub mod types;
mod uniformity;

pub use builtins::BuiltinFunction;
pub use control::Severities;

use crate::{
    ast::{self, NodeId},
    diagnostic::{
        filter::{self, SeverityTable},
        Diagnostic, List,
    },
    FastHashMap, Handle, Span,
};
use eval::Value;
use types::{Access, AddressSpace, Type};

/// Options for [`resolve`].
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Options {
    /// Don't require derivatives and implicit-derivative texture sampling to
    /// be called from uniform control flow.
    pub allow_non_uniform_derivatives: bool,
}

/// The earliest point at which an expression's value is known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum EvaluationStage {
    /// Shader creation.
    Constant,
    /// Pipeline creation.
    Override,
    /// Shader execution.
    #[default]
    Runtime,
}

impl EvaluationStage {
    const fn expression_kind(self) -> &'static str {
        match self {
            Self::Constant => "const-expression",
            Self::Override => "override-expression",
            Self::Runtime => "runtime-expression",
        }
    }
}

/// The ways a name can be declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum ValueKind {
    Var,
    Let,
    Const,
    Override,
    Parameter,
}

impl ValueKind {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Let => "let",
            Self::Const => "const",
            Self::Override => "override",
            Self::Parameter => "parameter",
        }
    }

    const fn from_ast(kind: &ast::VariableKind) -> Self {
        match *kind {
            ast::VariableKind::Var { .. } => Self::Var,
            ast::VariableKind::Let => Self::Let,
            ast::VariableKind::Const => Self::Const,
            ast::VariableKind::Override => Self::Override,
        }
    }
}

/// What an identifier expression refers to.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Definition {
    /// A module-scope declaration.
    Global(Handle<ast::GlobalDecl>),
    /// A function-scope declaration, by the id of its statement.
    Local(NodeId),
    /// A parameter of the enclosing function, by position.
    Parameter(usize),
    /// A predeclared or user-declared type.
    Type(Type),
    Builtin(BuiltinFunction),
}

/// What a call expression calls.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum CallTarget {
    Builtin {
        function: BuiltinFunction,
        overload: builtins::Match,
    },
    Function(Handle<ast::GlobalDecl>),
    /// A value constructor, `vec3<f32>(1, 2, 3)` or `S(a, b)`.
    Constructor(Type),
    /// A single-argument conversion to a type of the same shape, `u32(x)`.
    Conversion(Type),
}

/// Everything the resolver learned about one expression.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ExpressionInfo {
    /// The expression's type. Naming a `var` gives a reference type; loads
    /// are implicit. `None` for calls to functions that return nothing, and
    /// for expressions that failed to resolve.
    pub ty: Option<Type>,
    /// Whether evaluating the expression may write memory.
    pub has_side_effects: bool,
    pub stage: EvaluationStage,
    /// The folded value of a scalar constant expression.
    pub value: Option<Value>,
    /// For identifiers, the declaration named.
    pub definition: Option<Definition>,
    /// For calls, the callee.
    pub call: Option<CallTarget>,
}

/// A resolved `var`, `const` or `override`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct VariableInfo {
    pub kind: ValueKind,
    /// The store type of a `var`, the value type otherwise.
    pub ty: Type,
    /// Address space and access mode of a `var`.
    pub memory: Option<(AddressSpace, Access)>,
    pub value: Option<Value>,
}

/// A resolved function signature.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct FunctionInfo {
    pub stage: Option<ast::ShaderStage>,
    pub parameters: Vec<Type>,
    pub return_type: Option<Type>,
    /// Annotated `@must_use`.
    pub must_use: bool,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum GlobalInfo {
    Variable(VariableInfo),
    Function(FunctionInfo),
    /// A type alias, resolved to the aliased type.
    Alias(Type),
    /// A structure, with the type of each member in declaration order.
    Struct { members: Vec<Type> },
    /// Directives and `const_assert`s.
    Other,
}

/// The result of resolving a module.
#[derive(Clone, Debug, Default)]
pub struct Info {
    pub diagnostics: List,
    expressions: Vec<ExpressionInfo>,
    globals: Vec<Option<GlobalInfo>>,
    order: Vec<Handle<ast::GlobalDecl>>,
    severities: Severities,
}

impl Info {
    fn new(module: &ast::Module, diagnostics: List) -> Self {
        Info {
            diagnostics,
            expressions: vec![ExpressionInfo::default(); module.expressions().len()],
            globals: vec![None; module.declarations().len()],
            order: Vec::new(),
            severities: Severities::default(),
        }
    }

    /// What was learned about `handle`, if it was reached.
    pub fn expression(&self, handle: Handle<ast::Expression>) -> Option<&ExpressionInfo> {
        self.expressions.get(handle.index())
    }

    pub fn has_side_effects(&self, handle: Handle<ast::Expression>) -> bool {
        self.expression(handle)
            .map_or(false, |info| info.has_side_effects)
    }

    pub fn type_of(&self, handle: Handle<ast::Expression>) -> Option<&Type> {
        self.expression(handle).and_then(|info| info.ty.as_ref())
    }

    pub fn call_target(&self, handle: Handle<ast::Expression>) -> Option<&CallTarget> {
        self.expression(handle).and_then(|info| info.call.as_ref())
    }

    pub fn value_of(&self, handle: Handle<ast::Expression>) -> Option<Value> {
        self.expression(handle).and_then(|info| info.value)
    }

    /// Module-scope declarations, each after everything it uses.
    ///
    /// Empty when ordering failed.
    pub fn declaration_order(&self) -> &[Handle<ast::GlobalDecl>] {
        &self.order
    }

    pub fn global(&self, handle: Handle<ast::GlobalDecl>) -> Option<&GlobalInfo> {
        self.globals.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn function(&self, handle: Handle<ast::GlobalDecl>) -> Option<&FunctionInfo> {
        match self.global(handle) {
            Some(&GlobalInfo::Function(ref function)) => Some(function),
            _ => None,
        }
    }

    pub fn variable(&self, handle: Handle<ast::GlobalDecl>) -> Option<&VariableInfo> {
        match self.global(handle) {
            Some(&GlobalInfo::Variable(ref variable)) => Some(variable),
            _ => None,
        }
    }

    /// The rule severity tables of the module and its scopes.
    pub const fn severities(&self) -> &Severities {
        &self.severities
    }
}

/// Resolution failed with at least one error.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{}", first_error(.diagnostics))]
pub struct ResolveError {
    diagnostics: List,
}

fn first_error(diagnostics: &List) -> &str {
    diagnostics
        .iter()
        .find(|d| d.severity.is_error())
        .map_or("", |d| d.message.as_str())
}

impl ResolveError {
    pub const fn diagnostics(&self) -> &List {
        &self.diagnostics
    }

    /// The first error message.
    pub fn message(&self) -> &str {
        first_error(&self.diagnostics)
    }

    /// Render every diagnostic against `source` in the compact
    /// `line:col severity: message` form.
    pub fn emit_to_string(&self, source: &str) -> String {
        self.diagnostics.to_plain_string(source)
    }
}

/// Resolve `module`, failing if any error was reported.
pub fn resolve(module: &ast::Module, options: &Options) -> Result<Info, ResolveError> {
    let info = resolve_with_diagnostics(module, options);
    if info.diagnostics.contains_errors() {
        return Err(ResolveError {
            diagnostics: info.diagnostics,
        });
    }
    Ok(info)
}

/// Resolve `module` as far as possible. The diagnostics are in
/// [`Info::diagnostics`].
pub fn resolve_with_diagnostics(module: &ast::Module, options: &Options) -> Info {
    let mut diagnostics = List::new();
    let severities = control::collect(module, &mut diagnostics);

    let mut info = Info::new(module, diagnostics);
    let Some(index) = index::Index::generate(module, &mut info.diagnostics) else {
        info.severities = severities;
        return info;
    };
    let order: Vec<_> = index.visit_ordered().collect();

    let mut resolver = Resolver::new(module, &severities, index.globals, info);
    for &handle in order.iter() {
        resolver.declaration(handle);
    }
    let mut info = resolver.info;
    info.order = order;

    if info.diagnostics.contains_errors() {
        log::debug!("skipping uniformity analysis after errors");
    } else {
        uniformity::analyze(module, &severities, options, &mut info);
    }

    log::debug!(
        "resolved {} declarations with {} diagnostics",
        info.order.len(),
        info.diagnostics.len()
    );
    info.severities = severities;
    info
}

/// The error was already reported.
#[derive(Clone, Copy, Debug)]
struct Errored;

/// A parameter or function-scope declaration in scope.
#[derive(Clone, Debug)]
struct Local {
    kind: ValueKind,
    definition: Definition,
    /// Where the name was declared.
    span: Span,
    /// The type an identifier naming the local has: a reference for `var`s.
    ty: Type,
    stage: EvaluationStage,
    value: Option<Value>,
}

/// A construct that `break` and `continue` are checked against.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Construct {
    Loop,
    Switch,
    Continuing,
}

struct FunctionContext {
    return_type: Option<Type>,
    constructs: Vec<Construct>,
}

struct Resolver<'a> {
    module: &'a ast::Module,
    severities: &'a Severities,
    globals: FastHashMap<&'a str, Handle<ast::GlobalDecl>>,
    info: Info,
    /// Function-scope names, innermost scope last.
    scopes: Vec<FastHashMap<&'a str, Local>>,
    /// Severity tables of the enclosing constructs, innermost last.
    severity_stack: Vec<&'a SeverityTable>,
    function: Option<FunctionContext>,
}

impl<'a> Resolver<'a> {
    fn new(
        module: &'a ast::Module,
        severities: &'a Severities,
        globals: FastHashMap<&'a str, Handle<ast::GlobalDecl>>,
        info: Info,
    ) -> Self {
        Resolver {
            module,
            severities,
            globals,
            info,
            scopes: Vec::new(),
            severity_stack: Vec::new(),
            function: None,
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) -> Errored {
        self.info.diagnostics.add_error(message, span);
        Errored
    }

    /// Report a triggered `rule` at its severity in the current scope.
    fn report_rule(&mut self, rule: filter::Rule, message: impl Into<String>, span: Span) {
        if let Some(severity) = self.rule_severity(rule).to_diagnostic_severity() {
            self.info.diagnostics.add(Diagnostic {
                rule: Some(rule),
                ..Diagnostic::new(severity, message, span)
            });
        }
    }

    fn rule_severity(&self, rule: filter::Rule) -> filter::Severity {
        self.severity_stack
            .iter()
            .rev()
            .chain(std::iter::once(&self.severities.module()))
            .find_map(|table| table.get(rule))
            .unwrap_or_else(|| rule.default_severity())
    }

    /// Push the severity table of `id`, if it has one. Returns the depth to
    /// restore with [`Self::pop_severities`].
    fn push_severities(&mut self, id: NodeId) -> usize {
        let depth = self.severity_stack.len();
        if let Some(table) = self.severities.scope(id) {
            self.severity_stack.push(table);
        }
        depth
    }

    fn pop_severities(&mut self, depth: usize) {
        self.severity_stack.truncate(depth);
    }

    fn push_scope(&mut self) {
        self.scopes.push(FastHashMap::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup_local(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Declare `name` in the innermost scope, reporting a redeclaration in
    /// that same scope.
    fn declare_local(&mut self, name: &'a ast::Ident, local: Local) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if let Some(previous) = scope.get(name.name.as_str()) {
            let previous = previous.span;
            self.info
                .diagnostics
                .add_error(format!("redeclaration of '{}'", name.name), name.span);
            self.info.diagnostics.add_note(
                format!("'{}' previously declared here", name.name),
                previous,
            );
            return;
        }
        scope.insert(name.name.as_str(), local);
    }

    fn record(&mut self, handle: Handle<ast::Expression>, info: ExpressionInfo) {
        if let Some(slot) = self.info.expressions.get_mut(handle.index()) {
            *slot = info;
        }
    }

    fn expression_info(&self, handle: Handle<ast::Expression>) -> &ExpressionInfo {
        &self.info.expressions[handle.index()]
    }

    fn global_info(&self, handle: Handle<ast::GlobalDecl>) -> Option<&GlobalInfo> {
        self.info.global(handle)
    }

    fn set_global(&mut self, handle: Handle<ast::GlobalDecl>, info: GlobalInfo) {
        if let Some(slot) = self.info.globals.get_mut(handle.index()) {
            *slot = Some(info);
        }
    }

    fn f16_enabled(&self) -> bool {
        self.module.has_extension(ast::ExtensionKind::F16)
    }

    /// Resolve one module-scope declaration.
    fn declaration(&mut self, handle: Handle<ast::GlobalDecl>) {
        let module = self.module;
        let decl = module.declaration(handle);
        let span = module.declaration_span(handle);
        log::trace!("resolving {:?}", decl.kind.name().map(|i| &i.name));

        let info = match decl.kind {
            ast::GlobalDeclKind::DiagnosticDirective(_)
            | ast::GlobalDeclKind::Enable { .. }
            | ast::GlobalDeclKind::Requires { .. } => Some(GlobalInfo::Other),
            ast::GlobalDeclKind::Function(ref function) => {
                self.function(handle, function, span);
                None
            }
            ast::GlobalDeclKind::Variable(ref var) => self
                .global_variable(var, span)
                .ok()
                .map(GlobalInfo::Variable),
            ast::GlobalDeclKind::TypeDecl(ast::TypeDecl::Alias(ref alias)) => {
                self.resolve_type(alias.ty).ok().map(GlobalInfo::Alias)
            }
            ast::GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(ref s)) => {
                self.structure(s).ok()
            }
            ast::GlobalDeclKind::ConstAssert(condition) => {
                let _ = self.const_assert(condition);
                Some(GlobalInfo::Other)
            }
        };
        if let Some(info) = info {
            self.set_global(handle, info);
        }
    }

    fn structure(&mut self, s: &'a ast::Struct) -> Result<GlobalInfo, Errored> {
        let mut members = Vec::with_capacity(s.members.len());
        let mut names: FastHashMap<&str, Span> = FastHashMap::default();
        let mut failed = false;
        for (i, member) in s.members.iter().enumerate() {
            if let Some(&previous) = names.get(member.name.name.as_str()) {
                self.error(
                    format!("redefinition of '{}'", member.name.name),
                    member.name.span,
                );
                self.info.diagnostics.add_note(
                    format!("previous definition of '{}' is here", member.name.name),
                    previous,
                );
                failed = true;
            }
            names.insert(member.name.name.as_str(), member.name.span);

            for attr in member.attributes.iter() {
                match attr.kind {
                    ast::AttributeKind::Align(value) | ast::AttributeKind::Size(value) => {
                        let _ = self.attribute_integer(value, attr.kind.name());
                    }
                    ast::AttributeKind::Location(value) => {
                        let _ = self.attribute_integer(value, "location");
                    }
                    _ => {}
                }
            }

            let Ok(ty) = self.resolve_type(member.ty) else {
                failed = true;
                continue;
            };
            let runtime_sized = matches!(
                ty,
                Type::Array {
                    size: types::ArraySize::Runtime,
                    ..
                }
            );
            if runtime_sized && i + 1 != s.members.len() {
                self.error(
                    "runtime arrays may only appear as the last member of a struct",
                    member.span,
                );
                failed = true;
            } else if !ty.is_storable() || ty.is_handle() {
                self.error(
                    format!("type '{ty}' cannot be used as a struct member"),
                    member.span,
                );
                failed = true;
            }
            members.push(ty);
        }
        if failed {
            return Err(Errored);
        }
        Ok(GlobalInfo::Struct { members })
    }

    /// The type of member `name` of the struct declared by `decl`.
    fn struct_member(&self, decl: Handle<ast::GlobalDecl>, name: &str) -> Option<Type> {
        let ast::GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(ref s)) =
            self.module.declaration(decl).kind
        else {
            return None;
        };
        let Some(&GlobalInfo::Struct { ref members }) = self.global_info(decl) else {
            return None;
        };
        let position = s.members.iter().position(|m| m.name.name == name)?;
        members.get(position).cloned()
    }

    fn global_variable(
        &mut self,
        var: &'a ast::Variable,
        span: Span,
    ) -> Result<VariableInfo, Errored> {
        let kind = ValueKind::from_ast(&var.kind);
        self.variable_attributes(var);

        match var.kind {
            ast::VariableKind::Var {
                address_space,
                access,
            } => {
                let store = match var.ty {
                    Some(ty) => Some(self.resolve_type(ty)?),
                    None => None,
                };
                let init = match var.initializer {
                    Some(init) => Some(self.value(init)?),
                    None => None,
                };
                let space = match address_space {
                    Some(h) => self.enumerant(h, "address space", AddressSpace::from_name)?,
                    None => match store {
                        Some(ref ty) if ty.is_handle() => AddressSpace::Handle,
                        _ => {
                            return Err(self.error(
                                "module-scope 'var' declarations that are not of texture or \
                                 sampler types must provide an address space",
                                var.name.span,
                            ))
                        }
                    },
                };
                if space == AddressSpace::Function {
                    return Err(self.error(
                        "module-scope 'var' must not use address space 'function'",
                        var.name.span,
                    ));
                }
                let access = match access {
                    Some(h) => {
                        let access = self.enumerant(h, "access", types::Access::from_name)?;
                        if space != AddressSpace::Storage {
                            return Err(self.error(
                                "only variables in <storage> address space may specify an \
                                 access mode",
                                self.module.expression_span(h),
                            ));
                        }
                        access
                    }
                    None => space.default_access(),
                };
                if init.is_some() && space != AddressSpace::Private {
                    return Err(self.error(
                        format!(
                            "var of address space '{}' cannot have an initializer. var \
                             initializers are only supported for the address spaces 'private' \
                             and 'function'",
                            space.name()
                        ),
                        var.name.span,
                    ));
                }
                let ty = self.variable_type(var, store, init)?;
                if !ty.is_storable() {
                    return Err(self.error(
                        format!("type '{ty}' cannot be used in address space '{}'", space.name()),
                        var.name.span,
                    ));
                }
                let has_binding = var.attributes.iter().any(|attr| {
                    matches!(
                        attr.kind,
                        ast::AttributeKind::Binding(_) | ast::AttributeKind::Group(_)
                    )
                });
                let is_resource = matches!(
                    space,
                    AddressSpace::Uniform | AddressSpace::Storage | AddressSpace::Handle
                );
                if is_resource && !has_binding {
                    return Err(self.error(
                        "resource variables require @group and @binding attributes",
                        span,
                    ));
                }
                Ok(VariableInfo {
                    kind,
                    ty,
                    memory: Some((space, access)),
                    value: None,
                })
            }
            ast::VariableKind::Const | ast::VariableKind::Let | ast::VariableKind::Override => {
                let declared = match var.ty {
                    Some(ty) => Some(self.resolve_type(ty)?),
                    None => None,
                };
                let (init, stage, value) = match var.initializer {
                    Some(init) => {
                        let ty = self.value(init)?;
                        let info = self.expression_info(init);
                        (Some(ty), info.stage, info.value)
                    }
                    None => (None, EvaluationStage::Constant, None),
                };
                let required = match kind {
                    ValueKind::Override => EvaluationStage::Override,
                    _ => EvaluationStage::Constant,
                };
                if stage > required {
                    let span = var
                        .initializer
                        .map_or(var.name.span, |h| self.module.expression_span(h));
                    return Err(self.error(
                        format!(
                            "{} initializer requires a {}, but expression is a {}",
                            kind.keyword(),
                            required.expression_kind(),
                            stage.expression_kind()
                        ),
                        span,
                    ));
                }
                if kind != ValueKind::Override && init.is_none() {
                    return Err(self.error(
                        format!("'{}' declaration must have an initializer", kind.keyword()),
                        var.name.span,
                    ));
                }
                let concretize = kind == ValueKind::Override;
                let ty = self.value_type(var, kind, declared, init, concretize)?;
                if kind == ValueKind::Override && !matches!(ty, Type::Scalar(_)) {
                    return Err(self.error(
                        "override declaration must be of a scalar type",
                        var.name.span,
                    ));
                }
                let value = self.convert_value(value, &ty, var.name.span)?;
                Ok(VariableInfo {
                    kind,
                    ty,
                    memory: None,
                    value,
                })
            }
        }
    }

    /// The store type of a `var`: declared, or the concretized type of the
    /// initializer.
    fn variable_type(
        &mut self,
        var: &ast::Variable,
        store: Option<Type>,
        init: Option<Type>,
    ) -> Result<Type, Errored> {
        match (store, init) {
            (Some(store), Some(init)) => {
                if !init.can_convert_to(&store) {
                    return Err(self.error(
                        format!("cannot initialize var of type '{store}' with value of type '{init}'"),
                        var.name.span,
                    ));
                }
                Ok(store)
            }
            (Some(store), None) => Ok(store),
            (None, Some(init)) => Ok(init.concretize()),
            (None, None) => Err(self.error(
                "var declaration requires a type or initializer",
                var.name.span,
            )),
        }
    }

    /// The type of a `let`, `const` or `override`. Abstract initializers
    /// keep their type for `const` unless `concretize` is set.
    fn value_type(
        &mut self,
        var: &ast::Variable,
        kind: ValueKind,
        declared: Option<Type>,
        init: Option<Type>,
        concretize: bool,
    ) -> Result<Type, Errored> {
        match (declared, init) {
            (Some(declared), Some(init)) => {
                if !init.can_convert_to(&declared) {
                    return Err(self.error(
                        format!(
                            "cannot initialize {} of type '{declared}' with value of type '{init}'",
                            kind.keyword()
                        ),
                        var.name.span,
                    ));
                }
                Ok(declared)
            }
            (Some(declared), None) => Ok(declared),
            (None, Some(init)) if concretize => Ok(init.concretize()),
            (None, Some(init)) => Ok(init),
            (None, None) => Err(self.error(
                format!(
                    "'{}' declaration requires a type or initializer",
                    kind.keyword()
                ),
                var.name.span,
            )),
        }
    }

    /// Convert a folded initializer to the declared scalar type.
    fn convert_value(
        &mut self,
        value: Option<Value>,
        ty: &Type,
        span: Span,
    ) -> Result<Option<Value>, Errored> {
        match (value, ty.scalar()) {
            (Some(value), Some(scalar)) if matches!(*ty, Type::Scalar(_)) => value
                .convert(scalar)
                .map(Some)
                .map_err(|err| self.error(err.to_string(), span)),
            _ => Ok(None),
        }
    }

    fn variable_attributes(&mut self, var: &ast::Variable) {
        for attr in var.attributes.iter() {
            match attr.kind {
                ast::AttributeKind::Binding(value)
                | ast::AttributeKind::Group(value)
                | ast::AttributeKind::Id(value) => {
                    let _ = self.attribute_integer(value, attr.kind.name());
                }
                _ => {}
            }
        }
    }

    /// Resolve an attribute argument that must be a non-negative integer
    /// constant.
    fn attribute_integer(
        &mut self,
        handle: Handle<ast::Expression>,
        attribute: &str,
    ) -> Result<u32, Errored> {
        let span = self.module.expression_span(handle);
        let ty = self.value(handle)?;
        let info = self.expression_info(handle);
        let is_integer = matches!(ty, Type::Scalar(scalar) if scalar.is_integer());
        match (is_integer, info.stage, info.value.and_then(Value::as_int)) {
            (true, EvaluationStage::Constant, Some(value)) => u32::try_from(value)
                .map_err(|_| self.error(format!("@{attribute} value must be non-negative"), span)),
            (true, EvaluationStage::Constant, None) => Err(Errored),
            _ => Err(self.error(format!("@{attribute} must be an i32 or u32 value"), span)),
        }
    }

    /// Resolve a template or attribute argument naming an enumerant, like
    /// the `storage` in `var<storage>`.
    fn enumerant<T>(
        &mut self,
        handle: Handle<ast::Expression>,
        what: &str,
        from_name: fn(&str) -> Option<T>,
    ) -> Result<T, Errored> {
        let span = self.module.expression_span(handle);
        match *self.module.expression(handle) {
            ast::ExpressionKind::Ident {
                ref ident,
                ref template_args,
            } if template_args.is_empty() => {
                from_name(&ident.name).ok_or_else(|| {
                    self.error(format!("unresolved {what} '{}'", ident.name), span)
                })
            }
            _ => Err(self.error(format!("expected {what}"), span)),
        }
    }

    /// Check `const_assert condition` at any scope.
    fn const_assert(&mut self, condition: Handle<ast::Expression>) -> Result<(), Errored> {
        let span = self.module.expression_span(condition);
        let ty = self.value(condition)?;
        if ty != Type::BOOL {
            return Err(self.error(
                format!("const assertion condition must be a bool, got '{ty}'"),
                span,
            ));
        }
        let info = self.expression_info(condition);
        if info.stage != EvaluationStage::Constant {
            let stage = info.stage;
            return Err(self.error(
                format!(
                    "const assertion requires a const-expression, but expression is a {}",
                    stage.expression_kind()
                ),
                span,
            ));
        }
        if info.value == Some(Value::Bool(false)) {
            return Err(self.error("const assertion failed", span));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::wgsl::parse_str;

    /// Resolve `source` and render every diagnostic.
    pub(super) fn diagnostics(source: &str) -> String {
        let module = parse_str(source).unwrap();
        let info = resolve_with_diagnostics(&module, &Options::default());
        info.diagnostics.to_plain_string(source)
    }

    #[test]
    fn valid_module() {
        let source = "
            struct Light { position: vec3<f32>, color: vec3f }
            @group(0) @binding(0) var<uniform> light: Light;
            const scale = 2.0;
            override bias: f32 = 0.5;
            var<private> counter: i32;

            fn shade(normal: vec3<f32>) -> f32 {
                return max(dot(normal, light.position), 0.0) * scale + bias;
            }

            @fragment
            fn main(@location(0) normal: vec3<f32>) -> @location(0) vec4<f32> {
                counter += 1;
                let c = light.color * shade(normalize(normal));
                return vec4(c, 1.0);
            }
        ";
        let module = parse_str(source).unwrap();
        let info = resolve(&module, &Options::default()).unwrap();
        assert!(info.diagnostics.is_empty(), "{:?}", info.diagnostics);
        assert_eq!(info.declaration_order().len(), 7);
    }

    #[test]
    fn module_scope_values() {
        let source = "const a = 4; const b: u32 = a * 2; override o: i32;";
        let module = parse_str(source).unwrap();
        let info = resolve(&module, &Options::default()).unwrap();
        let values: Vec<_> = info
            .declaration_order()
            .iter()
            .filter_map(|&h| info.variable(h))
            .map(|v| (v.ty.to_string(), v.value))
            .collect();
        assert_eq!(
            values,
            [
                ("abstract-int".to_string(), Some(Value::AbstractInt(4))),
                ("u32".to_string(), Some(Value::U32(8))),
                ("i32".to_string(), None),
            ]
        );
    }

    #[test]
    fn global_variable_errors() {
        assert_eq!(
            diagnostics("var x: i32;"),
            "1:5 error: module-scope 'var' declarations that are not of texture or sampler \
             types must provide an address space"
        );
        assert_eq!(
            diagnostics("var<uniform> u: f32;"),
            "1:1 error: resource variables require @group and @binding attributes"
        );
        assert_eq!(
            diagnostics("var<privat> p: f32;"),
            "1:5 error: unresolved address space 'privat'"
        );
        assert_eq!(
            diagnostics("const c: u32 = 1.5;"),
            "1:7 error: cannot initialize const of type 'u32' with value of type 'abstract-float'"
        );
    }

    #[test]
    fn const_asserts() {
        assert_eq!(diagnostics("const_assert 1 < 2;"), "");
        assert_eq!(
            diagnostics("const two = 2; const_assert two == 3;"),
            "1:29 error: const assertion failed"
        );
        assert_eq!(
            diagnostics("const_assert 1;"),
            "1:14 error: const assertion condition must be a bool, got 'abstract-int'"
        );
    }

    #[test]
    fn struct_members() {
        assert_eq!(
            diagnostics("struct S { a: array<f32>, b: i32 }"),
            "1:12 error: runtime arrays may only appear as the last member of a struct"
        );
        assert_eq!(
            diagnostics("struct S { a: i32, a: f32 }"),
            "1:20 error: redefinition of 'a'\n1:12 note: previous definition of 'a' is here"
        );
    }

    #[test]
    fn ordering_errors_stop_resolution() {
        let source = "fn a() { b(); } fn b() { a(); }";
        let module = parse_str(source).unwrap();
        let err = resolve(&module, &Options::default()).unwrap_err();
        assert_eq!(err.message(), "cyclic dependency found: 'a' -> 'b' -> 'a'");
    }
}
