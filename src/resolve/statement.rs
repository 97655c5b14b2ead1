//! Function signatures and bodies.

use super::{
    expression::binary_result,
    types::{Access, AddressSpace, Scalar, Type, VectorSize},
    CallTarget, Construct, Definition, Errored, EvaluationStage, FunctionContext, FunctionInfo,
    GlobalInfo, Local, Resolver, ValueKind,
};
use crate::{
    ast::{self, NodeId},
    diagnostic::{filter::Rule, suggest},
    Handle, Span,
};

bitflags::bitflags! {
    /// The ways control can leave a statement.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub(super) struct Behaviors: u8 {
        /// Execution continues with the next statement.
        const NEXT = 1 << 0;
        const RETURN = 1 << 1;
        const BREAK = 1 << 2;
        const CONTINUE = 1 << 3;
    }
}

const VEC3_U32: Type = Type::Vector {
    size: VectorSize::Tri,
    scalar: Scalar::U32,
};

/// Builtin values and the store type each must be declared with.
pub(super) const BUILTIN_VALUES: &[(&str, Type)] = &[
    (
        "position",
        Type::Vector {
            size: VectorSize::Quad,
            scalar: Scalar::F32,
        },
    ),
    ("vertex_index", Type::U32),
    ("instance_index", Type::U32),
    ("front_facing", Type::BOOL),
    ("frag_depth", Type::F32),
    ("sample_index", Type::U32),
    ("sample_mask", Type::U32),
    ("local_invocation_id", VEC3_U32),
    ("local_invocation_index", Type::U32),
    ("global_invocation_id", VEC3_U32),
    ("workgroup_id", VEC3_U32),
    ("num_workgroups", VEC3_U32),
];

/// The builtin value named by the argument of a `@builtin` attribute.
pub(super) fn builtin_value_name(module: &ast::Module, handle: Handle<ast::Expression>) -> Option<&str> {
    match *module.expression(handle) {
        ast::ExpressionKind::Ident { ref ident, .. } => Some(ident.name.as_str()),
        _ => None,
    }
}

impl<'a> Resolver<'a> {
    /// Resolve a function declaration: its signature, then its body.
    pub(super) fn function(
        &mut self,
        handle: Handle<ast::GlobalDecl>,
        function: &'a ast::Function,
        span: Span,
    ) {
        let id = self.module.declaration(handle).id;
        let depth = self.push_severities(id);
        // Parameters share a scope with the body's top-level declarations.
        self.push_scope();

        if let Ok(info) = self.signature(function, span) {
            let return_type = info.return_type.clone();
            let returns_value = return_type.is_some();
            self.set_global(handle, GlobalInfo::Function(info));
            self.function = Some(FunctionContext {
                return_type,
                constructs: Vec::new(),
            });

            let body_depth = self.push_severities(function.body.id);
            let behaviors = self.statements(&function.body.statements);
            self.pop_severities(body_depth);
            if returns_value && behaviors.contains(Behaviors::NEXT) {
                let _ = self.error("missing return at end of function", span);
            }
            self.function = None;
        }

        self.pop_scope();
        self.pop_severities(depth);
    }

    fn signature(&mut self, function: &'a ast::Function, span: Span) -> Result<FunctionInfo, Errored> {
        let stage = function.stage();
        let mut failed = false;

        let mut parameters = Vec::with_capacity(function.params.len());
        for (i, param) in function.params.iter().enumerate() {
            let Ok(ty) = self.resolve_type(param.ty) else {
                failed = true;
                continue;
            };
            if stage.is_some() {
                failed |= self
                    .io_attributes(&param.attributes, &ty, param.span, "parameter")
                    .is_err();
            }
            self.declare_local(
                &param.name,
                Local {
                    kind: ValueKind::Parameter,
                    definition: Definition::Parameter(i),
                    span: param.name.span,
                    ty: ty.clone(),
                    stage: EvaluationStage::Runtime,
                    value: None,
                },
            );
            parameters.push(ty);
        }

        let return_type = match function.return_type {
            Some(handle) => match self.resolve_type(handle) {
                Ok(ty) => {
                    if stage.is_some() {
                        let span = self.module.expression_span(handle);
                        failed |= self
                            .io_attributes(&function.return_attributes, &ty, span, "return type")
                            .is_err();
                    }
                    Some(ty)
                }
                Err(Errored) => {
                    failed = true;
                    None
                }
            },
            None => None,
        };

        let mut must_use = false;
        let mut workgroup_size = false;
        for attr in function.attributes.iter() {
            match attr.kind {
                ast::AttributeKind::MustUse => {
                    must_use = true;
                    if return_type.is_none() && function.return_type.is_none() {
                        failed = true;
                        let _ = self.error(
                            "@must_use can only be applied to functions that return a value",
                            attr.span,
                        );
                    }
                }
                ast::AttributeKind::WorkgroupSize { x, y, z } => {
                    workgroup_size = true;
                    if stage != Some(ast::ShaderStage::Compute) {
                        failed = true;
                        let _ = self.error(
                            "the workgroup_size attribute is only valid for compute stages",
                            attr.span,
                        );
                    }
                    for handle in [Some(x), y, z].into_iter().flatten() {
                        failed |= self.workgroup_size_argument(handle).is_err();
                    }
                }
                _ => {}
            }
        }
        if stage == Some(ast::ShaderStage::Compute) && !workgroup_size {
            failed = true;
            let _ = self.error(
                "a compute shader must include 'workgroup_size' in its attributes",
                span,
            );
        }

        if failed {
            return Err(Errored);
        }
        Ok(FunctionInfo {
            stage,
            parameters,
            return_type,
            must_use,
        })
    }

    fn workgroup_size_argument(&mut self, handle: Handle<ast::Expression>) -> Result<(), Errored> {
        let span = self.module.expression_span(handle);
        let ty = self.value(handle)?;
        let info = self.expression_info(handle);
        let (stage, value) = (info.stage, info.value);
        let is_integer = matches!(ty, Type::Scalar(scalar) if scalar.is_integer());
        if !is_integer || stage > EvaluationStage::Override {
            return Err(self.error(
                "workgroup_size argument must be either a literal, constant, or overridable of \
                 type abstract-integer, i32 or u32",
                span,
            ));
        }
        match value.and_then(super::eval::Value::as_int) {
            Some(size) if size < 1 => {
                Err(self.error("workgroup_size argument must be at least 1", span))
            }
            _ => Ok(()),
        }
    }

    /// Check the `@builtin` and `@location` attributes of an entry point
    /// input or output of type `ty`.
    fn io_attributes(
        &mut self,
        attributes: &[ast::Attribute],
        ty: &Type,
        span: Span,
        what: &str,
    ) -> Result<(), Errored> {
        let mut has_io = false;
        for attr in attributes {
            match attr.kind {
                ast::AttributeKind::Builtin(handle) => {
                    has_io = true;
                    let expected = self.builtin_value(handle)?;
                    if *ty != expected {
                        let name = builtin_value_name(self.module, handle).unwrap_or_default();
                        return Err(self.error(
                            format!("store type of @builtin({name}) must be '{expected}'"),
                            attr.span,
                        ));
                    }
                }
                ast::AttributeKind::Location(handle) => {
                    has_io = true;
                    self.attribute_integer(handle, "location")?;
                    let numeric = ty.shape().is_some()
                        && ty.scalar().map_or(false, |s| s.is_numeric() && !s.is_abstract());
                    if !numeric {
                        return Err(self.error(
                            format!("cannot apply @location to declaration of type '{ty}'"),
                            attr.span,
                        ));
                    }
                }
                _ => {}
            }
        }
        if !has_io && !matches!(*ty, Type::Struct { .. }) {
            return Err(self.error(
                format!("missing entry point IO attribute on {what}"),
                span,
            ));
        }
        Ok(())
    }

    /// The store type required by the builtin value `handle` names.
    fn builtin_value(&mut self, handle: Handle<ast::Expression>) -> Result<Type, Errored> {
        let span = self.module.expression_span(handle);
        let Some(name) = builtin_value_name(self.module, handle) else {
            return Err(self.error("expected builtin value name", span));
        };
        if let Some(&(_, ref ty)) = BUILTIN_VALUES.iter().find(|&&(value, _)| value == name) {
            return Ok(ty.clone());
        }
        let candidates: Vec<&str> = BUILTIN_VALUES.iter().map(|&(value, _)| value).collect();
        let mut message = format!("unresolved builtin value '{name}'\n");
        suggest::write_alternatives(&mut message, name, &candidates);
        Err(self.error(message, span))
    }

    fn constructs(&self) -> &[Construct] {
        self.function
            .as_ref()
            .map_or(&[], |function| function.constructs.as_slice())
    }

    fn push_construct(&mut self, construct: Construct) {
        if let Some(ref mut function) = self.function {
            function.constructs.push(construct);
        }
    }

    fn pop_construct(&mut self) {
        if let Some(ref mut function) = self.function {
            function.constructs.pop();
        }
    }

    fn block(&mut self, block: &'a ast::Block) -> Behaviors {
        let depth = self.push_severities(block.id);
        self.push_scope();
        let behaviors = self.statements(&block.statements);
        self.pop_scope();
        self.pop_severities(depth);
        behaviors
    }

    /// Resolve a statement list in the current scope.
    ///
    /// The first statement that cannot be reached is reported; the behaviors
    /// of unreachable statements don't contribute to the list's.
    fn statements(&mut self, statements: &'a [ast::Statement]) -> Behaviors {
        let mut behaviors = Behaviors::NEXT;
        let mut reported = false;
        for stmt in statements {
            let reachable = behaviors.contains(Behaviors::NEXT);
            if !reachable && !reported {
                reported = true;
                let depth = self.push_severities(severity_id(stmt));
                self.report_rule(Rule::UnreachableCode, "code is unreachable", stmt.span);
                self.pop_severities(depth);
            }
            let stmt_behaviors = self.statement(stmt);
            if reachable {
                behaviors.remove(Behaviors::NEXT);
                behaviors |= stmt_behaviors;
            }
        }
        behaviors
    }

    fn statement(&mut self, stmt: &'a ast::Statement) -> Behaviors {
        let depth = self.push_severities(stmt.id);
        // A statement that failed to resolve is treated as falling through.
        let behaviors = self.statement_kind(stmt).unwrap_or(Behaviors::NEXT);
        self.pop_severities(depth);
        behaviors
    }

    fn statement_kind(&mut self, stmt: &'a ast::Statement) -> Result<Behaviors, Errored> {
        use ast::StatementKind as Sk;

        match stmt.kind {
            Sk::Block(ref block) => Ok(self.block(block)),
            Sk::If(ref if_) => {
                let _ = self.condition(if_.condition, "if statement condition");
                let accept = self.block(&if_.accept);
                let reject = match if_.reject {
                    Some(ref reject) => self.statement(reject),
                    None => Behaviors::NEXT,
                };
                Ok(accept | reject)
            }
            Sk::Switch(ref switch) => Ok(self.switch(stmt, switch)),
            Sk::Loop(ref loop_) => Ok(self.loop_statement(loop_)),
            Sk::For(ref for_) => {
                self.push_scope();
                if let Some(ref init) = for_.init {
                    self.statement(init);
                }
                if let Some(condition) = for_.condition {
                    let _ = self.condition(condition, "for-loop condition");
                }
                self.push_construct(Construct::Loop);
                let mut behaviors = self.block(&for_.body);
                if let Some(ref update) = for_.update {
                    self.statement(update);
                }
                self.pop_construct();
                self.pop_scope();

                let exits = for_.condition.is_some() || behaviors.contains(Behaviors::BREAK);
                behaviors.remove(Behaviors::NEXT | Behaviors::BREAK | Behaviors::CONTINUE);
                if exits {
                    behaviors |= Behaviors::NEXT;
                }
                Ok(behaviors)
            }
            Sk::While(ref while_) => {
                let _ = self.condition(while_.condition, "while condition");
                self.push_construct(Construct::Loop);
                let mut behaviors = self.block(&while_.body);
                self.pop_construct();
                behaviors.remove(Behaviors::BREAK | Behaviors::CONTINUE);
                Ok(behaviors | Behaviors::NEXT)
            }
            Sk::Break => match self.constructs().last() {
                Some(&Construct::Loop | &Construct::Switch) => Ok(Behaviors::BREAK),
                Some(&Construct::Continuing) => Err(self.error(
                    "`break` must not be used to exit from a continuing block. Use `break-if` \
                     instead.",
                    stmt.span,
                )),
                None => Err(self.error(
                    "break statement must be in a loop or switch case",
                    stmt.span,
                )),
            },
            Sk::BreakIf(condition) => {
                self.condition(condition, "break-if statement condition")?;
                Ok(Behaviors::BREAK | Behaviors::NEXT)
            }
            Sk::Continue => {
                let innermost = self
                    .constructs()
                    .iter()
                    .rev()
                    .find(|&&construct| construct != Construct::Switch)
                    .copied();
                match innermost {
                    Some(Construct::Loop) => Ok(Behaviors::CONTINUE),
                    Some(Construct::Continuing) => Err(self.error(
                        "continuing blocks must not contain a continue statement",
                        stmt.span,
                    )),
                    _ => Err(self.error("continue statement must be in a loop", stmt.span)),
                }
            }
            Sk::Return(value) => {
                // A bad return value is reported once; the function still
                // returns here.
                let _ = self.return_statement(value, stmt.span);
                Ok(Behaviors::RETURN)
            }
            Sk::Discard => Ok(Behaviors::NEXT),
            Sk::Declaration(ref var) => {
                self.local_declaration(stmt.id, var)?;
                Ok(Behaviors::NEXT)
            }
            Sk::Assignment { lhs, op, rhs } => {
                self.assignment(lhs, op, rhs)?;
                Ok(Behaviors::NEXT)
            }
            Sk::Increment(target) | Sk::Decrement(target) => {
                self.increment(target)?;
                Ok(Behaviors::NEXT)
            }
            Sk::Call(call) => {
                self.call_statement(call)?;
                Ok(Behaviors::NEXT)
            }
            Sk::ConstAssert(condition) => {
                self.const_assert(condition)?;
                Ok(Behaviors::NEXT)
            }
        }
    }

    /// Check that `condition` is a `bool`.
    fn condition(&mut self, condition: Handle<ast::Expression>, what: &str) -> Result<(), Errored> {
        let ty = self.value(condition)?;
        if ty != Type::BOOL {
            let span = self.module.expression_span(condition);
            return Err(self.error(format!("{what} must be bool, got {ty}"), span));
        }
        Ok(())
    }

    fn switch(&mut self, stmt: &'a ast::Statement, switch: &'a ast::Switch) -> Behaviors {
        let selector_span = self.module.expression_span(switch.selector);
        let mut common = match self.value(switch.selector) {
            Ok(Type::Scalar(scalar)) if scalar.is_integer() => Some(scalar),
            Ok(_) => {
                let _ = self.error(
                    "switch statement selector expression must be of a scalar integer type",
                    selector_span,
                );
                None
            }
            Err(Errored) => None,
        };

        let mut selectors = Vec::new();
        let mut default: Option<Span> = None;
        for case in switch.cases.iter() {
            for selector in case.selectors.iter() {
                match *selector {
                    ast::CaseSelector::Default => match default {
                        Some(previous) => {
                            let _ = self.error(
                                "switch statement must have exactly one default clause",
                                case.span,
                            );
                            self.info.diagnostics.add_note("previous default case", previous);
                        }
                        None => default = Some(case.span),
                    },
                    ast::CaseSelector::Expr(expr) => {
                        if let Ok(value) = self.case_selector(expr, &mut common) {
                            selectors.push((expr, value));
                        }
                    }
                }
            }
        }
        if default.is_none() {
            let _ = self.error("switch statement must have a default clause", stmt.span);
        }

        // Duplicates are compared once every selector agrees on a type.
        let mut seen: Vec<(i64, Span)> = Vec::with_capacity(selectors.len());
        for (expr, value) in selectors {
            let value = match common {
                Some(scalar) => value.convert(scalar).ok().and_then(super::eval::Value::as_int),
                None => value.as_int(),
            };
            let Some(value) = value else {
                continue;
            };
            let span = self.module.expression_span(expr);
            match seen.iter().find(|&&(previous, _)| previous == value) {
                Some(&(_, previous)) => {
                    let _ = self.error(format!("duplicate switch case '{value}'"), span);
                    self.info
                        .diagnostics
                        .add_note("previous case declared here", previous);
                }
                None => seen.push((value, span)),
            }
        }

        self.push_construct(Construct::Switch);
        let mut behaviors = Behaviors::empty();
        for case in switch.cases.iter() {
            behaviors |= self.block(&case.body);
        }
        self.pop_construct();

        if behaviors.contains(Behaviors::BREAK) {
            behaviors.remove(Behaviors::BREAK);
            behaviors |= Behaviors::NEXT;
        }
        behaviors
    }

    /// Resolve one case selector, unifying its type into `common`.
    fn case_selector(
        &mut self,
        expr: Handle<ast::Expression>,
        common: &mut Option<Scalar>,
    ) -> Result<super::eval::Value, Errored> {
        let span = self.module.expression_span(expr);
        let ty = self.value(expr)?;
        let info = self.expression_info(expr);
        let (stage, value) = (info.stage, info.value);
        if stage != EvaluationStage::Constant {
            return Err(self.error("case selector must be a const-expression", span));
        }
        let unified = match (ty, *common) {
            (Type::Scalar(scalar), Some(current)) => current.unify(scalar),
            (Type::Scalar(scalar), None) if scalar.is_integer() => Some(scalar),
            _ => None,
        };
        match (unified, value) {
            (Some(scalar), Some(value)) => {
                *common = Some(scalar);
                Ok(value)
            }
            (Some(_), None) => Err(Errored),
            (None, _) => Err(self.error(
                "the case selector values must have the same type as the selector expression.",
                span,
            )),
        }
    }

    fn loop_statement(&mut self, loop_: &'a ast::Loop) -> Behaviors {
        self.push_construct(Construct::Loop);
        let depth = self.push_severities(loop_.body.id);
        self.push_scope();
        let mut behaviors = self.statements(&loop_.body.statements);
        if let Some(ref continuing) = loop_.continuing {
            // `continuing` sees the declarations of the body.
            self.push_construct(Construct::Continuing);
            behaviors |= self.block(continuing);
            self.pop_construct();
        }
        self.pop_scope();
        self.pop_severities(depth);
        self.pop_construct();

        let exits = behaviors.contains(Behaviors::BREAK);
        behaviors.remove(Behaviors::NEXT | Behaviors::BREAK | Behaviors::CONTINUE);
        if exits {
            behaviors |= Behaviors::NEXT;
        }
        behaviors
    }

    fn return_statement(
        &mut self,
        value: Option<Handle<ast::Expression>>,
        span: Span,
    ) -> Result<(), Errored> {
        if self.constructs().contains(&Construct::Continuing) {
            return Err(self.error(
                "continuing blocks must not contain a return statement",
                span,
            ));
        }
        let returned = match value {
            Some(value) => Some(self.value(value)?),
            None => None,
        };
        let expected = self
            .function
            .as_ref()
            .and_then(|function| function.return_type.clone());
        match (returned, expected) {
            (None, None) => Ok(()),
            (Some(ref returned), Some(ref expected)) if returned.can_convert_to(expected) => Ok(()),
            (returned, expected) => {
                let show = |ty: Option<Type>| ty.map_or_else(|| "void".to_string(), |ty| ty.to_string());
                Err(self.error(
                    format!(
                        "return statement type must match its function return type, returned \
                         '{}', expected '{}'",
                        show(returned),
                        show(expected)
                    ),
                    span,
                ))
            }
        }
    }

    fn local_declaration(&mut self, id: NodeId, var: &'a ast::Variable) -> Result<(), Errored> {
        let kind = ValueKind::from_ast(&var.kind);
        let local = match var.kind {
            ast::VariableKind::Var {
                address_space,
                access,
            } => {
                if let Some(handle) = address_space {
                    let space = self.enumerant(handle, "address space", AddressSpace::from_name)?;
                    if space != AddressSpace::Function {
                        return Err(self.error(
                            "function-scope 'var' declaration must use 'function' address space",
                            self.module.expression_span(handle),
                        ));
                    }
                }
                if let Some(handle) = access {
                    return Err(self.error(
                        "only variables in <storage> address space may specify an access mode",
                        self.module.expression_span(handle),
                    ));
                }
                let store = match var.ty {
                    Some(ty) => Some(self.resolve_type(ty)?),
                    None => None,
                };
                let init = match var.initializer {
                    Some(init) => Some(self.value(init)?),
                    None => None,
                };
                let ty = self.variable_type(var, store, init)?;
                if !ty.is_constructible() {
                    return Err(self.error(
                        format!("type '{ty}' cannot be used in address space 'function'"),
                        var.name.span,
                    ));
                }
                Local {
                    kind,
                    definition: Definition::Local(id),
                    span: var.name.span,
                    ty: Type::Reference {
                        base: Box::new(ty),
                        space: AddressSpace::Function,
                        access: Access::ReadWrite,
                    },
                    stage: EvaluationStage::Runtime,
                    value: None,
                }
            }
            ast::VariableKind::Let | ast::VariableKind::Const => {
                let declared = match var.ty {
                    Some(ty) => Some(self.resolve_type(ty)?),
                    None => None,
                };
                let Some(init) = var.initializer else {
                    return Err(self.error(
                        format!("'{}' declaration must have an initializer", kind.keyword()),
                        var.name.span,
                    ));
                };
                let init_span = self.module.expression_span(init);
                let init_ty = self.value(init)?;
                let (stage, value) = {
                    let info = self.expression_info(init);
                    (info.stage, info.value)
                };
                let is_const = kind == ValueKind::Const;
                if is_const && stage != EvaluationStage::Constant {
                    return Err(self.error(
                        format!(
                            "const initializer requires a const-expression, but expression is a {}",
                            stage.expression_kind()
                        ),
                        init_span,
                    ));
                }
                let ty = self.value_type(var, kind, declared, Some(init_ty), !is_const)?;
                if !is_const && !(ty.is_constructible() || matches!(ty, Type::Pointer { .. })) {
                    return Err(self.error(
                        format!("type '{ty}' cannot be used as the type of a 'let'"),
                        var.name.span,
                    ));
                }
                let (stage, value) = if is_const {
                    (stage, self.convert_value(value, &ty, var.name.span)?)
                } else {
                    (EvaluationStage::Runtime, None)
                };
                Local {
                    kind,
                    definition: Definition::Local(id),
                    span: var.name.span,
                    ty,
                    stage,
                    value,
                }
            }
            ast::VariableKind::Override => {
                return Err(self.error(
                    "override declarations are only valid at module scope",
                    var.name.span,
                ))
            }
        };
        self.declare_local(&var.name, local);
        Ok(())
    }

    /// The keyword of the value declaration `handle` names, if it is an
    /// identifier.
    fn declaration_keyword(&self, handle: Handle<ast::Expression>) -> Option<(&'static str, &'a str)> {
        let module = self.module;
        let ast::ExpressionKind::Ident { ref ident, .. } = *module.expression(handle) else {
            return None;
        };
        let kind = match self.expression_info(handle).definition {
            Some(Definition::Global(decl)) => self.info.variable(decl)?.kind,
            Some(Definition::Local(_) | Definition::Parameter(_)) => {
                self.lookup_local(&ident.name)?.kind
            }
            _ => return None,
        };
        Some((kind.keyword(), ident.name.as_str()))
    }

    fn assignment(
        &mut self,
        lhs: Handle<ast::Expression>,
        op: Option<ast::BinaryOperator>,
        rhs: Handle<ast::Expression>,
    ) -> Result<(), Errored> {
        if let ast::ExpressionKind::Phony = *self.module.expression(lhs) {
            // `_ = e` evaluates `e` for its effects and accepts any type.
            self.expression(rhs)?;
            return Ok(());
        }

        let target = self.expression(lhs);
        let value = self.value(rhs);
        let (target, value) = (target?, value?);
        let lhs_span = self.module.expression_span(lhs);
        let rhs_span = self.module.expression_span(rhs);

        let store = match target {
            Type::Reference { access, .. } if !access.can_write() => {
                return Err(self.error(
                    format!("cannot store into a read-only type '{target}'"),
                    lhs_span,
                ))
            }
            Type::Reference { base, .. } => *base,
            other => {
                let message = match self.declaration_keyword(lhs) {
                    Some((kind, name)) => format!("cannot assign to {kind} '{name}'"),
                    None => format!("cannot assign to value of type '{other}'"),
                };
                return Err(self.error(message, lhs_span));
            }
        };

        let value = match op {
            Some(op) => binary_result(op, &store, &value).ok_or_else(|| {
                self.error(
                    format!(
                        "no matching overload for operator {}= ({store}, {value})",
                        op.as_str()
                    ),
                    lhs_span,
                )
            })?,
            None => value,
        };
        if !value.can_convert_to(&store) {
            return Err(self.error(format!("cannot assign '{value}' to '{store}'"), rhs_span));
        }
        Ok(())
    }

    fn increment(&mut self, target: Handle<ast::Expression>) -> Result<(), Errored> {
        let span = self.module.expression_span(target);
        match self.expression(target)? {
            Type::Reference {
                ref base, access, ..
            } if matches!(**base, Type::Scalar(scalar) if scalar.is_integer()) => {
                if !access.can_write() {
                    return Err(self.error(
                        format!("cannot modify read-only type '{}'", base),
                        span,
                    ));
                }
                Ok(())
            }
            Type::Reference { .. } => Err(self.error(
                "increment/decrement statement can only be applied to an integer scalar",
                span,
            )),
            other => {
                let message = match self.declaration_keyword(target) {
                    Some((kind, name)) => format!("cannot modify {kind} '{name}'"),
                    None => format!("cannot modify value of type '{other}'"),
                };
                Err(self.error(message, span))
            }
        }
    }

    fn call_statement(&mut self, call: Handle<ast::Expression>) -> Result<(), Errored> {
        let span = self.module.expression_span(call);
        self.expression_or_void(call)?;
        let message = match self.expression_info(call).call {
            Some(CallTarget::Builtin { function, .. }) if function.must_use() => {
                format!("ignoring return value of builtin '{function}'")
            }
            Some(CallTarget::Function(decl)) => match self.info.function(decl) {
                Some(function) if function.must_use => {
                    let name = self
                        .module
                        .declaration(decl)
                        .kind
                        .name()
                        .map_or("", |ident| ident.name.as_str());
                    format!("ignoring return value of function '{name}' annotated with @must_use")
                }
                _ => return Ok(()),
            },
            Some(CallTarget::Constructor(_)) => "value constructor evaluated but not used".to_string(),
            Some(CallTarget::Conversion(_)) => "value conversion evaluated but not used".to_string(),
            _ => return Ok(()),
        };
        Err(self.error(message, span))
    }
}

/// The node whose severity table applies to `stmt` itself.
const fn severity_id(stmt: &ast::Statement) -> NodeId {
    match stmt.kind {
        ast::StatementKind::Block(ref block) => block.id,
        _ => stmt.id,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::diagnostics;

    #[test]
    fn break_and_continue() {
        assert_eq!(
            diagnostics("fn f() { break; }"),
            "1:10 error: break statement must be in a loop or switch case"
        );
        assert_eq!(
            diagnostics("fn f() { continue; }"),
            "1:10 error: continue statement must be in a loop"
        );
        assert_eq!(
            diagnostics("fn f() { loop { continuing { continue; } } }"),
            "1:30 error: continuing blocks must not contain a continue statement"
        );
        assert_eq!(
            diagnostics("fn f() { loop { continuing { return; } } }"),
            "1:30 error: continuing blocks must not contain a return statement"
        );
        assert_eq!(
            diagnostics("fn f() { loop { continuing { break; } } }"),
            "1:30 error: `break` must not be used to exit from a continuing block. Use \
             `break-if` instead."
        );
        assert_eq!(
            diagnostics("fn f() { loop { switch 1 { default: { continue; } } } }"),
            ""
        );
    }

    #[test]
    fn switch_cases() {
        assert_eq!(
            diagnostics("fn f(x: i32) { switch x { case 1: {} case 1: {} default: {} } }"),
            "1:43 error: duplicate switch case '1'\n1:32 note: previous case declared here"
        );
        assert_eq!(
            diagnostics("fn f(x: i32) { switch x { case 1: {} } }"),
            "1:16 error: switch statement must have a default clause"
        );
        assert_eq!(
            diagnostics("fn f(x: f32) { switch x { default: {} } }"),
            "1:23 error: switch statement selector expression must be of a scalar integer type"
        );
        assert_eq!(
            diagnostics("fn f(x: u32) { switch x { case 1i: {} default: {} } }"),
            "1:32 error: the case selector values must have the same type as the selector \
             expression."
        );
    }

    #[test]
    fn unreachable_code() {
        assert_eq!(
            diagnostics("fn f() { return; let x = 1; }"),
            "1:18 warning: code is unreachable"
        );
        assert_eq!(
            diagnostics("diagnostic(off, chromium.unreachable_code);\nfn f() { return; let x = 1; }"),
            ""
        );
        assert_eq!(
            diagnostics(
                "@diagnostic(error, chromium.unreachable_code) fn f() { return; let x = 1; }"
            ),
            "1:64 error: code is unreachable"
        );
        assert_eq!(
            diagnostics(
                "fn f() { return; @diagnostic(off, chromium.unreachable_code) { let x = 1; } }"
            ),
            ""
        );
        // Only the first unreachable statement of a block is reported.
        assert_eq!(
            diagnostics("fn f() { loop { break; let a = 1; let b = 2; } }"),
            "1:24 warning: code is unreachable"
        );
    }

    #[test]
    fn function_bodies() {
        assert_eq!(
            diagnostics("fn f() -> i32 { if true { return 1; } }"),
            "1:1 error: missing return at end of function"
        );
        assert_eq!(diagnostics("fn f() -> i32 { loop {} }"), "");
        assert_eq!(
            diagnostics("fn f() -> i32 { return 1.5; }"),
            "1:17 error: return statement type must match its function return type, returned \
             'abstract-float', expected 'i32'"
        );
        assert_eq!(
            diagnostics("fn f() -> i32 { if true { return y; } else { return 2; } }"),
            "1:34 error: unresolved identifier 'y'"
        );
        assert_eq!(
            diagnostics("@compute fn main() {}"),
            "1:10 error: a compute shader must include 'workgroup_size' in its attributes"
        );
        assert!(diagnostics("@fragment fn f(@builtin(postion) p: vec4f) {}")
            .starts_with("1:25 error: unresolved builtin value 'postion'\nDid you mean 'position'?"));
    }

    #[test]
    fn assignments() {
        assert_eq!(
            diagnostics("fn f() { let x = 1; x = 2; }"),
            "1:21 error: cannot assign to let 'x'"
        );
        assert_eq!(
            diagnostics("fn f(p: i32) { p = 1; }"),
            "1:16 error: cannot assign to parameter 'p'"
        );
        assert_eq!(
            diagnostics("fn f() { var x: i32; x = 1.5; }"),
            "1:26 error: cannot assign 'abstract-float' to 'i32'"
        );
        assert_eq!(
            diagnostics("fn f() { var x = 1.0; x++; }"),
            "1:23 error: increment/decrement statement can only be applied to an integer scalar"
        );
        assert_eq!(diagnostics("fn f() { var x = 1; x += 2; x++; _ = x; }"), "");
    }

    #[test]
    fn unused_results() {
        assert_eq!(
            diagnostics("fn f() { abs(1); }"),
            "1:10 error: ignoring return value of builtin 'abs'"
        );
        assert_eq!(
            diagnostics("fn f() { vec2f(); }"),
            "1:10 error: value constructor evaluated but not used"
        );
        assert_eq!(
            diagnostics("@must_use fn g() -> i32 { return 1; } fn f() { g(); }"),
            "1:48 error: ignoring return value of function 'g' annotated with @must_use"
        );
        assert_eq!(
            diagnostics("@must_use fn g() {}"),
            "1:2 error: @must_use can only be applied to functions that return a value"
        );
    }
}
