//! Uniformity analysis.
//!
//! Derivatives, implicit-derivative texture sampling and workgroup barriers
//! must be reached by every invocation of a quad or workgroup at once, so
//! they may only execute in uniform control flow. Each function is walked
//! once its callees are summarized; a summary records what the function
//! requires of its call sites and how uniform its return value is.
//!
//! Values carry a [`Taint`]: either a known non-uniform origin, or the set of
//! parameters of the current function they depend on. `var`s are tracked
//! flow-insensitively, so a function is walked until their taints settle
//! before the final, reporting walk.

use smallvec::SmallVec;

use super::{
    statement::{builtin_value_name, Behaviors},
    types::{Access, AddressSpace},
    BuiltinFunction, CallTarget, Definition, Info, Options, Severities,
};
use crate::{
    ast::{self, NodeId},
    diagnostic::{
        self,
        filter::{self, Rule, SeverityTable},
        Diagnostic, List,
    },
    FastHashMap, Handle, Span,
};

/// Upper bound on the walks spent settling `var` taints.
const MAX_PASSES: usize = 16;

/// Where a possibly non-uniform value comes from.
#[derive(Clone, Debug, PartialEq)]
struct Origin {
    message: String,
    span: Span,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Taint {
    origin: Option<Origin>,
    /// Parameters of the function being walked the value depends on.
    params: SmallVec<[usize; 2]>,
}

impl Taint {
    fn origin(message: String, span: Span) -> Self {
        Taint {
            origin: Some(Origin { message, span }),
            params: SmallVec::new(),
        }
    }

    fn param(index: usize) -> Self {
        Taint {
            origin: None,
            params: SmallVec::from_slice(&[index]),
        }
    }

    fn is_uniform(&self) -> bool {
        self.origin.is_none() && self.params.is_empty()
    }

    /// The first origin wins, so repeated joins are stable.
    fn join(&mut self, other: &Taint) {
        if self.origin.is_none() {
            self.origin = other.origin.clone();
        }
        for &param in other.params.iter() {
            if !self.params.contains(&param) {
                self.params.push(param);
            }
        }
    }

    fn joined(mut self, other: &Taint) -> Self {
        self.join(other);
        self
    }
}

/// The uniformity of the current point of execution.
#[derive(Clone, Debug, Default)]
struct Control {
    taint: Taint,
    /// The condition control first diverged on.
    span: Option<Span>,
}

impl Control {
    /// Control inside a construct that branches on a value tainted by
    /// `condition`.
    fn branch(&self, condition: &Taint, span: Span) -> Self {
        let mut control = self.clone();
        if !condition.is_uniform() && control.span.is_none() {
            control.span = Some(span);
        }
        control.taint.join(condition);
        control
    }

    fn join(&mut self, other: &Control) {
        self.taint.join(&other.taint);
        if self.span.is_none() {
            self.span = other.span;
        }
    }
}

/// An operation that must execute in uniform control flow.
#[derive(Clone, Debug)]
struct Requirement {
    builtin: BuiltinFunction,
    /// The call of the builtin itself.
    span: Span,
    severity: diagnostic::Severity,
    rule: Option<Rule>,
    /// Parameters whose arguments must be uniform.
    params: SmallVec<[usize; 2]>,
    /// How many calls separate the function from the builtin.
    depth: usize,
}

#[derive(Clone, Debug, Default)]
struct Summary {
    /// The first requirement the function places on its call sites.
    requirement: Option<Requirement>,
    return_taint: Taint,
}

/// Analyze every function of `module`, adding violations to
/// `info.diagnostics`.
pub(super) fn analyze(
    module: &ast::Module,
    severities: &Severities,
    options: &Options,
    info: &mut Info,
) {
    if module.has_extension(ast::ExtensionKind::ChromiumDisableUniformityAnalysis) {
        log::debug!("uniformity analysis disabled by extension");
        return;
    }

    let mut summaries: FastHashMap<Handle<ast::GlobalDecl>, Summary> = FastHashMap::default();
    let mut diagnostics = List::new();
    for &handle in info.declaration_order() {
        let decl = module.declaration(handle);
        let ast::GlobalDeclKind::Function(ref function) = decl.kind else {
            continue;
        };
        let mut walker = Walker {
            module,
            info,
            severities,
            options,
            summaries: &summaries,
            name: &function.name.name,
            params: Vec::new(),
            locals: FastHashMap::default(),
            control: Control::default(),
            severity_stack: Vec::new(),
            quiet: true,
            reported: false,
            summary: Summary::default(),
            diagnostics: List::new(),
        };
        walker.entry_parameters(function);
        let summary = walker.function(decl.id, function);
        log::trace!(
            "summarized '{}': requirement {:?}",
            function.name.name,
            summary.requirement.as_ref().map(|r| r.builtin)
        );
        diagnostics.extend(walker.diagnostics);
        summaries.insert(handle, summary);
    }
    info.diagnostics.extend(diagnostics);
}

struct Walker<'a, 'i> {
    module: &'a ast::Module,
    info: &'i Info,
    severities: &'a Severities,
    options: &'a Options,
    summaries: &'i FastHashMap<Handle<ast::GlobalDecl>, Summary>,
    name: &'a str,
    params: Vec<Taint>,
    /// Taints of `let` and `var` declarations, by declaring statement.
    locals: FastHashMap<NodeId, Taint>,
    control: Control,
    severity_stack: Vec<&'a SeverityTable>,
    /// Suppress reports while `var` taints are still settling.
    quiet: bool,
    /// Violations are reported once per function.
    reported: bool,
    summary: Summary,
    diagnostics: List,
}

impl<'a, 'i> Walker<'a, 'i> {
    /// Seed parameter taints. Inputs of entry points are non-uniform unless
    /// they are the same for a whole workgroup.
    fn entry_parameters(&mut self, function: &ast::Function) {
        let entry = function.stage().is_some();
        self.params = function
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| {
                if !entry {
                    return Taint::param(index);
                }
                let builtin = param.attributes.iter().find_map(|attr| match attr.kind {
                    ast::AttributeKind::Builtin(value) => builtin_value_name(self.module, value),
                    _ => None,
                });
                match builtin {
                    Some("workgroup_id" | "num_workgroups") => Taint::default(),
                    Some(_) => Taint::origin(
                        format!(
                            "builtin '{}' of '{}' may be non-uniform",
                            param.name.name, function.name.name
                        ),
                        param.name.span,
                    ),
                    None => Taint::origin(
                        format!(
                            "user-defined input '{}' of '{}' may be non-uniform",
                            param.name.name, function.name.name
                        ),
                        param.name.span,
                    ),
                }
            })
            .collect();
    }

    fn function(&mut self, id: NodeId, function: &'a ast::Function) -> Summary {
        for pass in 0..MAX_PASSES {
            let before = self.locals.clone();
            self.walk(id, function);
            if self.locals == before {
                log::trace!("'{}' settled after {} passes", self.name, pass + 1);
                break;
            }
        }
        self.quiet = false;
        self.walk(id, function);
        std::mem::take(&mut self.summary)
    }

    fn walk(&mut self, id: NodeId, function: &'a ast::Function) {
        self.control = Control::default();
        self.summary = Summary::default();
        self.reported = false;
        self.severity_stack.clear();
        self.push_severities(id);
        self.push_severities(function.body.id);
        self.statements(&function.body.statements);
    }

    fn push_severities(&mut self, id: NodeId) -> usize {
        let depth = self.severity_stack.len();
        if let Some(table) = self.severities.scope(id) {
            self.severity_stack.push(table);
        }
        depth
    }

    fn rule_severity(&self, rule: Rule) -> filter::Severity {
        self.severity_stack
            .iter()
            .rev()
            .chain(std::iter::once(&self.severities.module()))
            .find_map(|table| table.get(rule))
            .unwrap_or_else(|| rule.default_severity())
    }

    fn report(&mut self, requirement: &Requirement, notes: [(String, Span); 3]) {
        if self.quiet || self.reported {
            return;
        }
        self.reported = true;
        self.diagnostics.add(Diagnostic {
            rule: requirement.rule,
            ..Diagnostic::new(
                requirement.severity,
                format!(
                    "'{}' must only be called from uniform control flow",
                    requirement.builtin
                ),
                requirement.span,
            )
        });
        for (message, span) in notes {
            if !message.is_empty() {
                self.diagnostics.add_note(message, span);
            }
        }
    }

    /// Record `requirement` for the callers of this function.
    fn require(&mut self, requirement: Requirement) {
        if !self.reported && self.summary.requirement.is_none() {
            self.summary.requirement = Some(requirement);
        }
    }

    fn statements(&mut self, statements: &'a [ast::Statement]) -> Behaviors {
        let mut exits = Behaviors::empty();
        for stmt in statements {
            let depth = self.push_severities(stmt.id);
            exits |= self.statement(stmt);
            self.severity_stack.truncate(depth);
        }
        exits
    }

    fn block(&mut self, block: &'a ast::Block) -> Behaviors {
        let depth = self.push_severities(block.id);
        let exits = self.statements(&block.statements);
        self.severity_stack.truncate(depth);
        exits
    }

    fn statement(&mut self, stmt: &'a ast::Statement) -> Behaviors {
        use ast::StatementKind as Sk;

        let exits = Behaviors::RETURN | Behaviors::BREAK | Behaviors::CONTINUE;
        match stmt.kind {
            Sk::Block(ref block) => self.block(block),
            Sk::If(ref if_) => {
                let condition = self.expression(if_.condition);
                let saved = self.control.clone();
                let branch = saved.branch(&condition, self.module.expression_span(if_.condition));

                self.control = branch.clone();
                let mut behaviors = self.block(&if_.accept);
                let mut end = self.control.clone();
                self.control = branch;
                if let Some(ref reject) = if_.reject {
                    behaviors |= self.statement(reject);
                }
                end.join(&self.control);

                // Invocations that left early make the rest non-uniform.
                self.control = if behaviors.intersects(exits) { end } else { saved };
                behaviors
            }
            Sk::Switch(ref switch) => {
                let selector = self.expression(switch.selector);
                for case in switch.cases.iter() {
                    for selector in case.selectors.iter() {
                        if let ast::CaseSelector::Expr(expr) = *selector {
                            self.expression(expr);
                        }
                    }
                }
                let saved = self.control.clone();
                let branch = saved.branch(&selector, self.module.expression_span(switch.selector));
                let mut end = saved.clone();
                let mut behaviors = Behaviors::empty();
                for case in switch.cases.iter() {
                    self.control = branch.clone();
                    behaviors |= self.block(&case.body);
                    end.join(&self.control);
                }
                behaviors.remove(Behaviors::BREAK);
                self.control = if behaviors.intersects(exits) { end } else { saved };
                behaviors
            }
            Sk::Loop(ref loop_) => {
                let mut entry = self.control.clone();
                let mut behaviors = Behaviors::empty();
                // Twice, so that the second iteration sees what the first
                // carried around the back edge.
                for _ in 0..2 {
                    self.control = entry.clone();
                    let depth = self.push_severities(loop_.body.id);
                    behaviors = self.statements(&loop_.body.statements);
                    if let Some(ref continuing) = loop_.continuing {
                        behaviors |= self.block(continuing);
                    }
                    self.severity_stack.truncate(depth);
                    entry.join(&self.control);
                }
                self.control = entry;
                behaviors.remove(Behaviors::BREAK | Behaviors::CONTINUE);
                behaviors
            }
            Sk::For(ref for_) => {
                if let Some(ref init) = for_.init {
                    self.statement(init);
                }
                let mut entry = self.control.clone();
                let mut behaviors = Behaviors::empty();
                for _ in 0..2 {
                    self.control = entry.clone();
                    if let Some(condition) = for_.condition {
                        let taint = self.expression(condition);
                        self.control = self
                            .control
                            .branch(&taint, self.module.expression_span(condition));
                    }
                    behaviors = self.block(&for_.body);
                    if let Some(ref update) = for_.update {
                        self.statement(update);
                    }
                    entry.join(&self.control);
                }
                self.control = entry;
                behaviors.remove(Behaviors::BREAK | Behaviors::CONTINUE);
                behaviors
            }
            Sk::While(ref while_) => {
                let mut entry = self.control.clone();
                let mut behaviors = Behaviors::empty();
                for _ in 0..2 {
                    let taint = self.expression(while_.condition);
                    self.control = entry.branch(&taint, self.module.expression_span(while_.condition));
                    behaviors = self.block(&while_.body);
                    entry.join(&self.control);
                }
                self.control = entry;
                behaviors.remove(Behaviors::BREAK | Behaviors::CONTINUE);
                behaviors
            }
            Sk::Break => Behaviors::BREAK,
            Sk::Continue => Behaviors::CONTINUE,
            Sk::BreakIf(condition) => {
                let taint = self.expression(condition);
                self.control = self
                    .control
                    .branch(&taint, self.module.expression_span(condition));
                Behaviors::BREAK
            }
            Sk::Return(value) => {
                if let Some(value) = value {
                    let taint = self.expression(value).joined(&self.control.taint);
                    self.summary.return_taint.join(&taint);
                }
                Behaviors::RETURN
            }
            // `discard` demotes the invocation to a helper, which keeps
            // executing for the sake of derivatives.
            Sk::Discard => Behaviors::empty(),
            Sk::Declaration(ref var) => {
                let taint = match var.initializer {
                    Some(init) => self.expression(init),
                    None => Taint::default(),
                };
                let taint = match var.kind {
                    ast::VariableKind::Var { .. } => taint.joined(&self.control.taint),
                    ast::VariableKind::Const => Taint::default(),
                    _ => taint,
                };
                self.locals.entry(stmt.id).or_default().join(&taint);
                Behaviors::empty()
            }
            Sk::Assignment { lhs, rhs, .. } => {
                let value = self.expression(rhs);
                if !matches!(*self.module.expression(lhs), ast::ExpressionKind::Phony) {
                    self.store(lhs, &value);
                }
                Behaviors::empty()
            }
            Sk::Increment(target) | Sk::Decrement(target) => {
                self.store(target, &Taint::default());
                Behaviors::empty()
            }
            Sk::Call(call) => {
                self.expression(call);
                Behaviors::empty()
            }
            Sk::ConstAssert(_) => Behaviors::empty(),
        }
    }

    /// Join `value` and the control taint into the `var` stored to by
    /// `target`.
    fn store(&mut self, target: Handle<ast::Expression>, value: &Taint) {
        let mut taint = value.clone().joined(&self.control.taint);
        let mut place = target;
        loop {
            match *self.module.expression(place) {
                ast::ExpressionKind::Index { base, index } => {
                    let index = self.expression(index);
                    taint.join(&index);
                    place = base;
                }
                ast::ExpressionKind::Member { base, .. } => place = base,
                ast::ExpressionKind::Unary {
                    op: ast::UnaryOperator::Deref | ast::UnaryOperator::AddressOf,
                    expr,
                } => place = expr,
                ast::ExpressionKind::Ident { .. } => break,
                _ => return,
            }
        }
        if let Some(&Definition::Local(id)) = self.definition(place) {
            self.locals.entry(id).or_default().join(&taint);
        }
    }

    fn definition(&self, handle: Handle<ast::Expression>) -> Option<&'i Definition> {
        self.info
            .expression(handle)
            .and_then(|info| info.definition.as_ref())
    }

    fn expression(&mut self, handle: Handle<ast::Expression>) -> Taint {
        use ast::ExpressionKind as Ek;

        match *self.module.expression(handle) {
            Ek::Literal(_) | Ek::Phony => Taint::default(),
            Ek::Ident { .. } => self.identifier(handle),
            Ek::Call { ref arguments, .. } => self.call(handle, arguments),
            Ek::Bitcast { expr, .. } | Ek::Unary { expr, .. } | Ek::Member { base: expr, .. } => {
                self.expression(expr)
            }
            Ek::Binary {
                op: ast::BinaryOperator::LogicalAnd | ast::BinaryOperator::LogicalOr,
                left,
                right,
            } => {
                // The right operand is only evaluated depending on the left.
                let lhs = self.expression(left);
                let saved = self.control.clone();
                self.control = saved.branch(&lhs, self.module.expression_span(left));
                let rhs = self.expression(right);
                self.control = saved;
                lhs.joined(&rhs)
            }
            Ek::Binary { left, right, .. } | Ek::Index { base: left, index: right } => {
                let lhs = self.expression(left);
                let rhs = self.expression(right);
                lhs.joined(&rhs)
            }
        }
    }

    fn identifier(&mut self, handle: Handle<ast::Expression>) -> Taint {
        match self.definition(handle) {
            Some(&Definition::Parameter(index)) => {
                self.params.get(index).cloned().unwrap_or_default()
            }
            Some(&Definition::Local(id)) => self.locals.get(&id).cloned().unwrap_or_default(),
            Some(&Definition::Global(decl)) => self.global(decl, self.module.expression_span(handle)),
            _ => Taint::default(),
        }
    }

    /// Reading module-scope memory that other invocations may write is
    /// non-uniform.
    fn global(&self, decl: Handle<ast::GlobalDecl>, span: Span) -> Taint {
        let Some(variable) = self.info.variable(decl) else {
            return Taint::default();
        };
        let name = self
            .module
            .declaration(decl)
            .kind
            .name()
            .map_or("", |ident| ident.name.as_str());
        let message = match variable.memory {
            Some((AddressSpace::Storage, Access::ReadWrite | Access::Write)) => format!(
                "reading from read_write storage buffer '{name}' may result in a non-uniform value"
            ),
            Some((AddressSpace::Workgroup, _)) => format!(
                "reading from workgroup storage variable '{name}' may result in a non-uniform \
                 value"
            ),
            Some((AddressSpace::Private, _)) => format!(
                "reading from module-scope private variable '{name}' may result in a \
                 non-uniform value"
            ),
            _ => return Taint::default(),
        };
        Taint::origin(message, span)
    }

    fn call(&mut self, handle: Handle<ast::Expression>, arguments: &'a [Handle<ast::Expression>]) -> Taint {
        let args: Vec<Taint> = arguments.iter().map(|&arg| self.expression(arg)).collect();
        let span = self.module.expression_span(handle);
        let joined = args.iter().fold(Taint::default(), |acc, arg| acc.joined(arg));

        match self.info.call_target(handle) {
            Some(&CallTarget::Builtin { function, .. }) => {
                self.builtin(function, span);
                if function == BuiltinFunction::WorkgroupUniformLoad {
                    Taint::default()
                } else {
                    joined
                }
            }
            Some(&CallTarget::Function(decl)) => self.user_call(decl, span, arguments, &args),
            _ => joined,
        }
    }

    fn builtin(&mut self, function: BuiltinFunction, span: Span) {
        let (severity, rule) = if function.is_barrier() {
            (diagnostic::Severity::Error, None)
        } else if function.requires_derivative_uniformity() {
            if self.options.allow_non_uniform_derivatives {
                return;
            }
            let rule = Rule::DerivativeUniformity;
            match self.rule_severity(rule).to_diagnostic_severity() {
                Some(severity) => (severity, Some(rule)),
                None => return,
            }
        } else {
            return;
        };

        let requirement = Requirement {
            builtin: function,
            span,
            severity,
            rule,
            params: self.control.taint.params.clone(),
            depth: 0,
        };
        match self.control.taint.origin.clone() {
            Some(origin) => {
                let diverged = self.control.span.unwrap_or(origin.span);
                self.report(
                    &requirement,
                    [
                        (
                            "control flow depends on possibly non-uniform value".to_string(),
                            diverged,
                        ),
                        (origin.message, origin.span),
                        (String::new(), span),
                    ],
                );
            }
            None => self.require(requirement),
        }
    }

    fn user_call(
        &mut self,
        decl: Handle<ast::GlobalDecl>,
        span: Span,
        arguments: &[Handle<ast::Expression>],
        args: &[Taint],
    ) -> Taint {
        let callee = self
            .module
            .declaration(decl)
            .kind
            .name()
            .map_or("", |ident| ident.name.as_str());
        let Some(summary) = self.summaries.get(&decl) else {
            return Taint::default();
        };
        let (requirement, return_taint) = (summary.requirement.clone(), summary.return_taint.clone());

        // The callee may store through pointers to our `var`s.
        for &arg in arguments {
            if let ast::ExpressionKind::Unary {
                op: ast::UnaryOperator::AddressOf,
                ..
            } = *self.module.expression(arg)
            {
                self.store(arg, &Taint::default());
            }
        }

        if let Some(requirement) = requirement {
            self.callee_requirement(callee, requirement, span, arguments, args);
        }

        let mut result = Taint::default();
        if return_taint.origin.is_some() {
            result.origin = Some(Origin {
                message: format!("return value of '{callee}' may be non-uniform"),
                span,
            });
        }
        for &param in return_taint.params.iter() {
            if let Some(arg) = args.get(param) {
                result.join(arg);
            }
        }
        result
    }

    fn callee_requirement(
        &mut self,
        callee: &str,
        requirement: Requirement,
        span: Span,
        arguments: &[Handle<ast::Expression>],
        args: &[Taint],
    ) {
        let called = if requirement.depth == 0 {
            format!("called by '{callee}' from '{}'", self.name)
        } else {
            format!("called indirectly by '{callee}' from '{}'", self.name)
        };

        if let Some(origin) = self.control.taint.origin.clone() {
            let diverged = self.control.span.unwrap_or(origin.span);
            self.report(
                &requirement,
                [
                    (called, span),
                    (
                        "control flow depends on possibly non-uniform value".to_string(),
                        diverged,
                    ),
                    (origin.message, origin.span),
                ],
            );
            return;
        }

        let mut params = self.control.taint.params.clone();
        for &param in requirement.params.iter() {
            let (Some(arg), Some(&handle)) = (args.get(param), arguments.get(param)) else {
                continue;
            };
            if let Some(ref origin) = arg.origin {
                self.report(
                    &requirement,
                    [
                        (called, span),
                        (
                            "possibly non-uniform value passed here".to_string(),
                            self.module.expression_span(handle),
                        ),
                        (origin.message.clone(), origin.span),
                    ],
                );
                return;
            }
            for &p in arg.params.iter() {
                if !params.contains(&p) {
                    params.push(p);
                }
            }
        }

        self.require(Requirement {
            params,
            depth: requirement.depth + 1,
            ..requirement
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::{resolve_with_diagnostics, tests::diagnostics, Options};
    use crate::front::wgsl::parse_str;

    #[test]
    fn derivative_in_non_uniform_control() {
        let source = "@fragment fn main(@location(0) x: f32) -> @location(0) f32 {
    if x > 0.0 {
        return dpdx(x);
    }
    return 0.0;
}";
        assert_eq!(
            diagnostics(source),
            "3:16 error: 'dpdx' must only be called from uniform control flow\n\
             2:8 note: control flow depends on possibly non-uniform value\n\
             1:32 note: user-defined input 'x' of 'main' may be non-uniform"
        );

        let module = parse_str(source).unwrap();
        let options = Options {
            allow_non_uniform_derivatives: true,
        };
        let info = resolve_with_diagnostics(&module, &options);
        assert!(info.diagnostics.is_empty());

        let relaxed = format!("diagnostic(warning, derivative_uniformity);\n{source}");
        assert!(diagnostics(&relaxed).starts_with("4:16 warning: 'dpdx' must only be called"));
        let off = format!("diagnostic(off, derivative_uniformity);\n{source}");
        assert_eq!(diagnostics(&off), "");
    }

    #[test]
    fn uniform_builtins_are_allowed() {
        assert_eq!(
            diagnostics(
                "@compute @workgroup_size(64) fn main(@builtin(workgroup_id) id: vec3u) {
    if id.x == 0u {
        workgroupBarrier();
    }
}"
            ),
            ""
        );
        assert_eq!(
            diagnostics(
                "@group(0) @binding(0) var<uniform> u: f32;
@fragment fn main() -> @location(0) f32 {
    if u > 0.0 { return dpdx(u); }
    return 0.0;
}"
            ),
            ""
        );
    }

    #[test]
    fn requirement_through_calls() {
        let source = "fn helper() { workgroupBarrier(); }
fn outer() { helper(); }
@compute @workgroup_size(1) fn main(@builtin(local_invocation_index) i: u32) {
    if i == 0u {
        outer();
    }
}";
        assert_eq!(
            diagnostics(source),
            "1:15 error: 'workgroupBarrier' must only be called from uniform control flow\n\
             5:9 note: called indirectly by 'outer' from 'main'\n\
             4:8 note: control flow depends on possibly non-uniform value\n\
             3:70 note: builtin 'i' of 'main' may be non-uniform"
        );
    }

    #[test]
    fn non_uniform_arguments() {
        let source = "fn f(c: bool) { if c { workgroupBarrier(); } }
@group(0) @binding(0) var<storage, read_write> flag: u32;
@compute @workgroup_size(1) fn main() {
    f(flag == 0u);
}";
        assert_eq!(
            diagnostics(source),
            "1:24 error: 'workgroupBarrier' must only be called from uniform control flow\n\
             4:5 note: called by 'f' from 'main'\n\
             4:7 note: possibly non-uniform value passed here\n\
             4:7 note: reading from read_write storage buffer 'flag' may result in a \
             non-uniform value"
        );
    }

    #[test]
    fn early_exit_taints_the_rest() {
        let source = "@group(0) @binding(0) var<storage, read_write> flag: u32;
@compute @workgroup_size(1) fn main() {
    var v = 0u;
    loop {
        if v > 3u { break; }
        v = flag;
    }
    workgroupBarrier();
}";
        let messages = diagnostics(source);
        assert!(
            messages.starts_with("8:5 error: 'workgroupBarrier' must only be called"),
            "{messages}"
        );
    }

    #[test]
    fn disabled_by_extension() {
        assert_eq!(
            diagnostics(
                "enable chromium_disable_uniformity_analysis;
@fragment fn main(@location(0) x: f32) -> @location(0) f32 {
    if x > 0.0 { return dpdx(x); }
    return 0.0;
}"
            ),
            ""
        );
    }
}
