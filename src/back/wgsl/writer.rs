use super::Error;
use crate::{
    ast::{
        self, Attribute, AttributeKind, Block, ExpressionKind, GlobalDeclKind, Literal, Statement,
        StatementKind,
    },
    back::Level,
    Handle,
};
use std::fmt::Write;

/// Shorthand result used internally by the backend
type BackendResult = Result<(), Error>;

type Expr = Handle<ast::Expression>;

/// Where an expression is being written, which decides whether it needs
/// parentheses.
#[derive(Clone, Copy, PartialEq)]
enum Context {
    /// A whole expression: initializers, conditions, right hand sides.
    Root,
    /// A call or template argument, or an attribute argument. A bare `a < b`
    /// here would be mistaken for the start of a template list.
    ListItem,
    /// Operand of a binary operator.
    BinaryOperand,
    /// Operand of a unary operator, or the base of `.member` and `[index]`.
    Postfix,
}

pub struct Writer<W> {
    out: W,
}

impl<W: Write> Writer<W> {
    pub const fn new(out: W) -> Self {
        Writer { out }
    }

    pub fn write(&mut self, module: &ast::Module) -> BackendResult {
        let mut previous_was_directive = false;
        for (i, (_, decl)) in module.declarations().iter().enumerate() {
            let is_directive = matches!(
                decl.kind,
                GlobalDeclKind::DiagnosticDirective(_)
                    | GlobalDeclKind::Enable { .. }
                    | GlobalDeclKind::Requires { .. }
            );
            // Group directives; separate everything else by a blank line.
            if i != 0 && !(is_directive && previous_was_directive) {
                writeln!(self.out)?;
            }
            previous_was_directive = is_directive;
            self.write_global_decl(module, &decl.kind)?;
        }
        Ok(())
    }

    /// Ends in a newline.
    fn write_global_decl(&mut self, module: &ast::Module, kind: &GlobalDeclKind) -> BackendResult {
        match *kind {
            GlobalDeclKind::DiagnosticDirective(ref control) => {
                writeln!(
                    self.out,
                    "diagnostic({}, {});",
                    control.severity.to_ident(),
                    control.rule
                )?;
            }
            GlobalDeclKind::Enable { ref extensions } => {
                write!(self.out, "enable ")?;
                for (i, extension) in extensions.iter().enumerate() {
                    if i != 0 {
                        write!(self.out, ", ")?;
                    }
                    write!(self.out, "{}", extension.kind.to_ident())?;
                }
                writeln!(self.out, ";")?;
            }
            GlobalDeclKind::Requires { ref features } => {
                write!(self.out, "requires ")?;
                for (i, &(feature, _)) in features.iter().enumerate() {
                    if i != 0 {
                        write!(self.out, ", ")?;
                    }
                    write!(self.out, "{}", feature.to_ident())?;
                }
                writeln!(self.out, ";")?;
            }
            GlobalDeclKind::Function(ref function) => self.write_function(module, function)?,
            GlobalDeclKind::Variable(ref var) => {
                self.write_attributes(module, &var.attributes, true)?;
                self.write_variable(module, var)?;
                writeln!(self.out, ";")?;
            }
            GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(ref decl)) => {
                self.write_struct(module, decl)?;
            }
            GlobalDeclKind::TypeDecl(ast::TypeDecl::Alias(ref alias)) => {
                write!(self.out, "alias {} = ", alias.name.name)?;
                self.write_expr(module, alias.ty)?;
                writeln!(self.out, ";")?;
            }
            GlobalDeclKind::ConstAssert(condition) => {
                write!(self.out, "const_assert ")?;
                self.write_expr(module, condition)?;
                writeln!(self.out, ";")?;
            }
        }
        Ok(())
    }

    /// Helper method used to write structs
    ///
    /// # Notes
    /// Ends in a newline
    fn write_struct(&mut self, module: &ast::Module, decl: &ast::Struct) -> BackendResult {
        write!(self.out, "struct {} {{", decl.name.name)?;
        writeln!(self.out)?;
        for member in decl.members.iter() {
            write!(self.out, "{}", Level(1))?;
            self.write_attributes(module, &member.attributes, false)?;
            write!(self.out, "{}: ", member.name.name)?;
            self.write_expr(module, member.ty)?;
            writeln!(self.out, ",")?;
        }
        writeln!(self.out, "}}")?;
        Ok(())
    }

    /// Helper method used to write functions
    ///
    /// # Notes
    /// Ends in a newline
    fn write_function(&mut self, module: &ast::Module, function: &ast::Function) -> BackendResult {
        self.write_attributes(module, &function.attributes, true)?;
        write!(self.out, "fn {}(", function.name.name)?;
        for (i, param) in function.params.iter().enumerate() {
            if i != 0 {
                write!(self.out, ", ")?;
            }
            self.write_attributes(module, &param.attributes, false)?;
            write!(self.out, "{}: ", param.name.name)?;
            self.write_expr(module, param.ty)?;
        }
        write!(self.out, ")")?;
        if let Some(ty) = function.return_type {
            write!(self.out, " -> ")?;
            self.write_attributes(module, &function.return_attributes, false)?;
            self.write_expr(module, ty)?;
        }
        write!(self.out, " ")?;
        self.write_block(module, &function.body, Level(0))?;
        writeln!(self.out)?;
        Ok(())
    }

    /// Writes `@name(args)` for each attribute, each followed by a newline
    /// when `own_line` is set and by a space otherwise.
    fn write_attributes(
        &mut self,
        module: &ast::Module,
        attributes: &[Attribute],
        own_line: bool,
    ) -> BackendResult {
        for attribute in attributes {
            self.write_attribute(module, attribute)?;
            if own_line {
                writeln!(self.out)?;
            } else {
                write!(self.out, " ")?;
            }
        }
        Ok(())
    }

    fn write_attribute(&mut self, module: &ast::Module, attribute: &Attribute) -> BackendResult {
        write!(self.out, "@{}", attribute.kind.name())?;
        let args: Vec<Expr> = match attribute.kind {
            AttributeKind::Compute
            | AttributeKind::Fragment
            | AttributeKind::Invariant
            | AttributeKind::MustUse
            | AttributeKind::Vertex => return Ok(()),
            AttributeKind::Diagnostic(ref control) => {
                write!(
                    self.out,
                    "({}, {})",
                    control.severity.to_ident(),
                    control.rule
                )?;
                return Ok(());
            }
            AttributeKind::Align(e)
            | AttributeKind::Binding(e)
            | AttributeKind::Builtin(e)
            | AttributeKind::Group(e)
            | AttributeKind::Id(e)
            | AttributeKind::Location(e)
            | AttributeKind::Size(e) => vec![e],
            AttributeKind::Interpolate { ty, sampling } => {
                std::iter::once(ty).chain(sampling).collect()
            }
            AttributeKind::WorkgroupSize { x, y, z } => std::iter::once(x).chain(y).chain(z).collect(),
        };
        self.write_argument_list(module, &args)
    }

    /// `name<: type>< = initializer>`, with the keyword and template
    /// arguments. No trailing semicolon.
    fn write_variable(&mut self, module: &ast::Module, var: &ast::Variable) -> BackendResult {
        write!(self.out, "{}", var.kind.keyword())?;
        if let ast::VariableKind::Var {
            address_space: Some(address_space),
            access,
        } = var.kind
        {
            write!(self.out, "<")?;
            self.write_expr_in(module, address_space, Context::ListItem)?;
            if let Some(access) = access {
                write!(self.out, ", ")?;
                self.write_expr_in(module, access, Context::ListItem)?;
            }
            write!(self.out, ">")?;
        }
        write!(self.out, " {}", var.name.name)?;
        if let Some(ty) = var.ty {
            write!(self.out, ": ")?;
            self.write_expr(module, ty)?;
        }
        if let Some(init) = var.initializer {
            write!(self.out, " = ")?;
            self.write_expr(module, init)?;
        }
        Ok(())
    }

    /// Writes `@attrs { ... }` with the closing brace at `level`. No trailing
    /// newline.
    fn write_block(&mut self, module: &ast::Module, block: &Block, level: Level) -> BackendResult {
        self.write_attributes(module, &block.attributes, false)?;
        writeln!(self.out, "{{")?;
        for statement in block.statements.iter() {
            self.write_statement(module, statement, level.next())?;
        }
        write!(self.out, "{level}}}")?;
        Ok(())
    }

    /// Ends in a newline.
    fn write_statement(
        &mut self,
        module: &ast::Module,
        statement: &Statement,
        level: Level,
    ) -> BackendResult {
        write!(self.out, "{level}")?;
        match statement.kind {
            StatementKind::Block(ref block) => {
                self.write_block(module, block, level)?;
                writeln!(self.out)?;
            }
            StatementKind::If(ref stmt) => {
                self.write_if(module, stmt, level)?;
                writeln!(self.out)?;
            }
            StatementKind::Switch(ref switch) => {
                self.write_attributes(module, &switch.attributes, false)?;
                write!(self.out, "switch ")?;
                self.write_expr(module, switch.selector)?;
                write!(self.out, " ")?;
                self.write_attributes(module, &switch.body_attributes, false)?;
                writeln!(self.out, "{{")?;
                let case_level = level.next();
                for case in switch.cases.iter() {
                    write!(self.out, "{case_level}")?;
                    match case.selectors.as_slice() {
                        [ast::CaseSelector::Default] => write!(self.out, "default ")?,
                        selectors => {
                            write!(self.out, "case ")?;
                            for (i, selector) in selectors.iter().enumerate() {
                                if i != 0 {
                                    write!(self.out, ", ")?;
                                }
                                match *selector {
                                    ast::CaseSelector::Default => write!(self.out, "default")?,
                                    ast::CaseSelector::Expr(e) => {
                                        self.write_expr_in(module, e, Context::ListItem)?
                                    }
                                }
                            }
                            write!(self.out, ": ")?;
                        }
                    }
                    self.write_block(module, &case.body, case_level)?;
                    writeln!(self.out)?;
                }
                writeln!(self.out, "{level}}}")?;
            }
            StatementKind::Loop(ref stmt) => {
                self.write_attributes(module, &stmt.attributes, false)?;
                write!(self.out, "loop ")?;
                self.write_attributes(module, &stmt.body.attributes, false)?;
                writeln!(self.out, "{{")?;
                for statement in stmt.body.statements.iter() {
                    self.write_statement(module, statement, level.next())?;
                }
                if let Some(ref continuing) = stmt.continuing {
                    write!(self.out, "{}continuing ", level.next())?;
                    self.write_block(module, continuing, level.next())?;
                    writeln!(self.out)?;
                }
                writeln!(self.out, "{level}}}")?;
            }
            StatementKind::For(ref stmt) => {
                self.write_attributes(module, &stmt.attributes, false)?;
                write!(self.out, "for (")?;
                if let Some(ref init) = stmt.init {
                    self.write_simple_statement(module, init)?;
                }
                write!(self.out, ";")?;
                if let Some(condition) = stmt.condition {
                    write!(self.out, " ")?;
                    self.write_expr(module, condition)?;
                }
                write!(self.out, ";")?;
                if let Some(ref update) = stmt.update {
                    write!(self.out, " ")?;
                    self.write_simple_statement(module, update)?;
                }
                write!(self.out, ") ")?;
                self.write_block(module, &stmt.body, level)?;
                writeln!(self.out)?;
            }
            StatementKind::While(ref stmt) => {
                self.write_attributes(module, &stmt.attributes, false)?;
                write!(self.out, "while ")?;
                self.write_expr(module, stmt.condition)?;
                write!(self.out, " ")?;
                self.write_block(module, &stmt.body, level)?;
                writeln!(self.out)?;
            }
            StatementKind::BreakIf(condition) => {
                write!(self.out, "break if ")?;
                self.write_expr(module, condition)?;
                writeln!(self.out, ";")?;
            }
            StatementKind::Break => writeln!(self.out, "break;")?,
            StatementKind::Continue => writeln!(self.out, "continue;")?,
            StatementKind::Discard => writeln!(self.out, "discard;")?,
            StatementKind::Return(value) => {
                write!(self.out, "return")?;
                if let Some(value) = value {
                    write!(self.out, " ")?;
                    self.write_expr(module, value)?;
                }
                writeln!(self.out, ";")?;
            }
            StatementKind::ConstAssert(condition) => {
                write!(self.out, "const_assert ")?;
                self.write_expr(module, condition)?;
                writeln!(self.out, ";")?;
            }
            StatementKind::Declaration(_)
            | StatementKind::Assignment { .. }
            | StatementKind::Increment(_)
            | StatementKind::Decrement(_)
            | StatementKind::Call(_) => {
                self.write_simple_statement(module, statement)?;
                writeln!(self.out, ";")?;
            }
        }
        Ok(())
    }

    /// The statements allowed in a `for` header, without the semicolon.
    fn write_simple_statement(&mut self, module: &ast::Module, statement: &Statement) -> BackendResult {
        match statement.kind {
            StatementKind::Declaration(ref var) => self.write_variable(module, var)?,
            StatementKind::Assignment { lhs, op, rhs } => {
                self.write_expr(module, lhs)?;
                match op {
                    Some(op) => write!(self.out, " {}= ", op.as_str())?,
                    None => write!(self.out, " = ")?,
                }
                self.write_expr(module, rhs)?;
            }
            StatementKind::Increment(e) => {
                self.write_expr_in(module, e, Context::Postfix)?;
                write!(self.out, "++")?;
            }
            StatementKind::Decrement(e) => {
                self.write_expr_in(module, e, Context::Postfix)?;
                write!(self.out, "--")?;
            }
            StatementKind::Call(call) => self.write_expr(module, call)?,
            _ => {
                log::warn!("unexpected statement in for loop header");
            }
        }
        Ok(())
    }

    /// Writes `if ... { } else if ... { } else { }` without a trailing newline.
    fn write_if(&mut self, module: &ast::Module, stmt: &ast::If, level: Level) -> BackendResult {
        self.write_attributes(module, &stmt.attributes, false)?;
        write!(self.out, "if ")?;
        self.write_expr(module, stmt.condition)?;
        write!(self.out, " ")?;
        self.write_block(module, &stmt.accept, level)?;
        if let Some(ref reject) = stmt.reject {
            write!(self.out, " else ")?;
            match reject.kind {
                StatementKind::If(ref nested) if nested.attributes.is_empty() => {
                    self.write_if(module, nested, level)?;
                }
                StatementKind::Block(ref block) => self.write_block(module, block, level)?,
                _ => {
                    // Anything else gets wrapped in a block of its own.
                    writeln!(self.out, "{{")?;
                    self.write_statement(module, reject, level.next())?;
                    write!(self.out, "{level}}}")?;
                }
            }
        }
        Ok(())
    }

    fn write_expr(&mut self, module: &ast::Module, expr: Expr) -> BackendResult {
        self.write_expr_in(module, expr, Context::Root)
    }

    fn write_expr_in(&mut self, module: &ast::Module, expr: Expr, context: Context) -> BackendResult {
        let kind = module.expression(expr);
        let parenthesize = match *kind {
            ExpressionKind::Binary { op, .. } => match context {
                Context::Root => false,
                Context::ListItem => op == ast::BinaryOperator::Less,
                Context::BinaryOperand | Context::Postfix => true,
            },
            ExpressionKind::Unary { .. } => context == Context::Postfix,
            ExpressionKind::Literal(literal) => {
                context == Context::Postfix && is_negative(literal)
            }
            _ => false,
        };

        if parenthesize {
            write!(self.out, "(")?;
        }
        match *kind {
            ExpressionKind::Literal(literal) => self.write_literal(literal)?,
            ExpressionKind::Ident {
                ref ident,
                ref template_args,
            } => {
                write!(self.out, "{}", ident.name)?;
                if !template_args.is_empty() {
                    write!(self.out, "<")?;
                    for (i, &arg) in template_args.iter().enumerate() {
                        if i != 0 {
                            write!(self.out, ", ")?;
                        }
                        self.write_expr_in(module, arg, Context::ListItem)?;
                    }
                    write!(self.out, ">")?;
                }
            }
            ExpressionKind::Call {
                callee,
                ref arguments,
            } => {
                self.write_expr_in(module, callee, Context::Postfix)?;
                self.write_argument_list(module, arguments)?;
            }
            ExpressionKind::Bitcast { ty, expr } => {
                write!(self.out, "bitcast<")?;
                self.write_expr_in(module, ty, Context::ListItem)?;
                write!(self.out, ">(")?;
                self.write_expr(module, expr)?;
                write!(self.out, ")")?;
            }
            ExpressionKind::Unary { op, expr } => {
                write!(self.out, "{}", op.as_str())?;
                // A literal operand keeps its suffix visibly apart: `-(30i)`.
                if let ExpressionKind::Literal(literal) = *module.expression(expr) {
                    write!(self.out, "(")?;
                    self.write_literal(literal)?;
                    write!(self.out, ")")?;
                } else {
                    self.write_expr_in(module, expr, Context::Postfix)?;
                }
            }
            ExpressionKind::Binary { op, left, right } => {
                self.write_expr_in(module, left, Context::BinaryOperand)?;
                write!(self.out, " {} ", op.as_str())?;
                self.write_expr_in(module, right, Context::BinaryOperand)?;
            }
            ExpressionKind::Index { base, index } => {
                self.write_expr_in(module, base, Context::Postfix)?;
                write!(self.out, "[")?;
                self.write_expr(module, index)?;
                write!(self.out, "]")?;
            }
            ExpressionKind::Member { base, ref member } => {
                self.write_expr_in(module, base, Context::Postfix)?;
                write!(self.out, ".{}", member.name)?;
            }
            ExpressionKind::Phony => write!(self.out, "_")?,
        }
        if parenthesize {
            write!(self.out, ")")?;
        }
        Ok(())
    }

    fn write_argument_list(&mut self, module: &ast::Module, arguments: &[Expr]) -> BackendResult {
        write!(self.out, "(")?;
        for (i, &argument) in arguments.iter().enumerate() {
            if i != 0 {
                write!(self.out, ", ")?;
            }
            self.write_expr_in(module, argument, Context::ListItem)?;
        }
        write!(self.out, ")")?;
        Ok(())
    }

    fn write_literal(&mut self, literal: Literal) -> BackendResult {
        match literal {
            Literal::Bool(value) => write!(self.out, "{value}")?,
            Literal::AbstractInt(value) => write!(self.out, "{value}")?,
            Literal::AbstractFloat(value) => write!(self.out, "{value:?}")?,
            // The most negative value has no positive counterpart to negate.
            Literal::I32(i32::MIN) => write!(self.out, "i32({})", i32::MIN)?,
            Literal::I32(value) => write!(self.out, "{value}i")?,
            Literal::U32(value) => write!(self.out, "{value}u")?,
            Literal::F32(value) => write!(self.out, "{value:?}f")?,
            Literal::F16(value) => write!(self.out, "{value:?}h")?,
        }
        Ok(())
    }

    pub fn finish(self) -> W {
        self.out
    }
}

fn is_negative(literal: Literal) -> bool {
    match literal {
        Literal::AbstractInt(value) => value < 0,
        Literal::AbstractFloat(value) => value.is_sign_negative(),
        Literal::I32(value) => value < 0,
        Literal::F32(value) | Literal::F16(value) => value.is_sign_negative(),
        Literal::Bool(_) | Literal::U32(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::front::wgsl::parse_str;

    fn rewrite(source: &str) -> String {
        let module = parse_str(source).unwrap();
        super::super::write_string(&module).unwrap()
    }

    #[test]
    fn declarations() {
        let source = "enable f16;
diagnostic(off, derivative_uniformity);
struct S { @align(16) a: vec3<f32>, b: array<u32, 4> }
@group(0) @binding(1) var<storage, read_write> buf: S;
const c = 1.5;
override o: f32 = 2f;
alias T = vec2<f16>;
const_assert c > 1.0;";
        assert_eq!(
            rewrite(source),
            "enable f16;
diagnostic(off, derivative_uniformity);

struct S {
    @align(16) a: vec3<f32>,
    b: array<u32, 4>,
}

@group(0)
@binding(1)
var<storage, read_write> buf: S;

const c = 1.5;

override o: f32 = 2.0f;

alias T = vec2<f16>;

const_assert c > 1.0;
"
        );
    }

    #[test]
    fn functions() {
        let source = "@compute @workgroup_size(8, 1) fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    var<function> x: i32 = -(1i);
    for (var i = 0; i < 4; i++) { x += i; }
    if x == 0 { return; } else if x < 3 { x--; } else { discard; }
    loop { continuing { break if x > 10; } }
    switch x { case 1, default: { } case 2 { x = (x + 1) * 2; } }
    _ = f((a < b), c > d);
}";
        assert_eq!(
            rewrite(source),
            "@compute
@workgroup_size(8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    var<function> x: i32 = -(1i);
    for (var i = 0; i < 4; i++) {
        x += i;
    }
    if x == 0 {
        return;
    } else if x < 3 {
        x--;
    } else {
        discard;
    }
    loop {
        continuing {
            break if x > 10;
        }
    }
    switch x {
        case 1, default: {
        }
        case 2: {
            x = (x + 1) * 2;
        }
    }
    _ = f((a < b), c > d);
}
"
        );
    }

    #[test]
    fn unary_operands_keep_their_grouping() {
        let text = rewrite("fn f() { let a = -(-x); let b = !(y && z); let c = (*p).m; }");
        assert!(text.contains("let a = -(-x);"), "{text}");
        assert!(text.contains("let b = !(y && z);"), "{text}");
        assert!(text.contains("let c = (*p).m;"), "{text}");
    }
}
