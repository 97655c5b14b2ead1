/*!
Deep copies of syntax trees between [`Module`]s.

Each function copies one node and everything it owns from `src` into `dst`,
giving every copy a fresh [`NodeId`] owned by `dst` and remapping expression
handles into `dst`'s arena. Spans are kept, so diagnostics about a copied
node still point at the text it was parsed from.
*/

use super::*;

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum CloneError {
    #[error("node {found:?} does not belong to program {expected}")]
    ForeignNode { expected: ProgramId, found: NodeId },
}

/// Copies nodes from one module into another.
pub struct Cloner<'a> {
    src: &'a Module,
    dst: &'a mut Module,
}

impl<'a> Cloner<'a> {
    pub fn new(src: &'a Module, dst: &'a mut Module) -> Self {
        Cloner { src, dst }
    }

    fn check(&self, id: NodeId) -> Result<(), CloneError> {
        if id.program == self.src.program() {
            Ok(())
        } else {
            Err(CloneError::ForeignNode {
                expected: self.src.program(),
                found: id,
            })
        }
    }

    fn fresh(&mut self, id: NodeId) -> Result<NodeId, CloneError> {
        self.check(id)?;
        Ok(self.dst.next_id())
    }

    pub fn expression(
        &mut self,
        handle: Handle<Expression>,
    ) -> Result<Handle<Expression>, CloneError> {
        let src = self.src;
        let expr = &src.expressions()[handle];
        self.check(expr.id)?;
        let span = src.expression_span(handle);
        let kind = match expr.kind {
            ExpressionKind::Literal(literal) => ExpressionKind::Literal(literal),
            ExpressionKind::Ident {
                ref ident,
                ref template_args,
            } => ExpressionKind::Ident {
                ident: ident.clone(),
                template_args: self.expressions(template_args)?,
            },
            ExpressionKind::Call {
                callee,
                ref arguments,
            } => ExpressionKind::Call {
                callee: self.expression(callee)?,
                arguments: self.expressions(arguments)?,
            },
            ExpressionKind::Bitcast { ty, expr } => ExpressionKind::Bitcast {
                ty: self.expression(ty)?,
                expr: self.expression(expr)?,
            },
            ExpressionKind::Unary { op, expr } => ExpressionKind::Unary {
                op,
                expr: self.expression(expr)?,
            },
            ExpressionKind::Binary { op, left, right } => ExpressionKind::Binary {
                op,
                left: self.expression(left)?,
                right: self.expression(right)?,
            },
            ExpressionKind::Index { base, index } => ExpressionKind::Index {
                base: self.expression(base)?,
                index: self.expression(index)?,
            },
            ExpressionKind::Member { base, ref member } => ExpressionKind::Member {
                base: self.expression(base)?,
                member: member.clone(),
            },
            ExpressionKind::Phony => ExpressionKind::Phony,
        };
        Ok(self.dst.add_expression(kind, span))
    }

    fn expressions(
        &mut self,
        handles: &[Handle<Expression>],
    ) -> Result<Vec<Handle<Expression>>, CloneError> {
        handles.iter().map(|&h| self.expression(h)).collect()
    }

    fn optional(
        &mut self,
        handle: Option<Handle<Expression>>,
    ) -> Result<Option<Handle<Expression>>, CloneError> {
        handle.map(|h| self.expression(h)).transpose()
    }

    pub fn attribute(&mut self, attr: &Attribute) -> Result<Attribute, CloneError> {
        let kind = match attr.kind {
            AttributeKind::Align(e) => AttributeKind::Align(self.expression(e)?),
            AttributeKind::Binding(e) => AttributeKind::Binding(self.expression(e)?),
            AttributeKind::Builtin(e) => AttributeKind::Builtin(self.expression(e)?),
            AttributeKind::Compute => AttributeKind::Compute,
            AttributeKind::Diagnostic(ref control) => AttributeKind::Diagnostic(control.clone()),
            AttributeKind::Fragment => AttributeKind::Fragment,
            AttributeKind::Group(e) => AttributeKind::Group(self.expression(e)?),
            AttributeKind::Id(e) => AttributeKind::Id(self.expression(e)?),
            AttributeKind::Interpolate { ty, sampling } => AttributeKind::Interpolate {
                ty: self.expression(ty)?,
                sampling: self.optional(sampling)?,
            },
            AttributeKind::Invariant => AttributeKind::Invariant,
            AttributeKind::Location(e) => AttributeKind::Location(self.expression(e)?),
            AttributeKind::MustUse => AttributeKind::MustUse,
            AttributeKind::Size(e) => AttributeKind::Size(self.expression(e)?),
            AttributeKind::Vertex => AttributeKind::Vertex,
            AttributeKind::WorkgroupSize { x, y, z } => AttributeKind::WorkgroupSize {
                x: self.expression(x)?,
                y: self.optional(y)?,
                z: self.optional(z)?,
            },
        };
        Ok(Attribute {
            id: self.fresh(attr.id)?,
            span: attr.span,
            kind,
        })
    }

    fn attributes(&mut self, attrs: &[Attribute]) -> Result<Vec<Attribute>, CloneError> {
        attrs.iter().map(|a| self.attribute(a)).collect()
    }

    pub fn variable(&mut self, var: &Variable) -> Result<Variable, CloneError> {
        let kind = match var.kind {
            VariableKind::Var {
                address_space,
                access,
            } => VariableKind::Var {
                address_space: self.optional(address_space)?,
                access: self.optional(access)?,
            },
            VariableKind::Let => VariableKind::Let,
            VariableKind::Const => VariableKind::Const,
            VariableKind::Override => VariableKind::Override,
        };
        Ok(Variable {
            name: var.name.clone(),
            kind,
            ty: self.optional(var.ty)?,
            initializer: self.optional(var.initializer)?,
            attributes: self.attributes(&var.attributes)?,
        })
    }

    pub fn block(&mut self, block: &Block) -> Result<Block, CloneError> {
        Ok(Block {
            id: self.fresh(block.id)?,
            span: block.span,
            statements: block
                .statements
                .iter()
                .map(|s| self.statement(s))
                .collect::<Result<_, _>>()?,
            attributes: self.attributes(&block.attributes)?,
        })
    }

    fn boxed(&mut self, stmt: &Option<Box<Statement>>) -> Result<Option<Box<Statement>>, CloneError> {
        match *stmt {
            Some(ref s) => Ok(Some(Box::new(self.statement(s)?))),
            None => Ok(None),
        }
    }

    pub fn statement(&mut self, stmt: &Statement) -> Result<Statement, CloneError> {
        let id = self.fresh(stmt.id)?;
        let kind = match stmt.kind {
            StatementKind::Block(ref b) => StatementKind::Block(self.block(b)?),
            StatementKind::If(ref s) => StatementKind::If(If {
                condition: self.expression(s.condition)?,
                accept: self.block(&s.accept)?,
                reject: self.boxed(&s.reject)?,
                attributes: self.attributes(&s.attributes)?,
            }),
            StatementKind::Switch(ref s) => {
                let mut cases = Vec::with_capacity(s.cases.len());
                for case in s.cases.iter() {
                    let selectors = case
                        .selectors
                        .iter()
                        .map(|sel| match *sel {
                            CaseSelector::Default => Ok(CaseSelector::Default),
                            CaseSelector::Expr(e) => self.expression(e).map(CaseSelector::Expr),
                        })
                        .collect::<Result<_, _>>()?;
                    cases.push(SwitchCase {
                        id: self.fresh(case.id)?,
                        span: case.span,
                        selectors,
                        body: self.block(&case.body)?,
                    });
                }
                StatementKind::Switch(Switch {
                    selector: self.expression(s.selector)?,
                    cases,
                    attributes: self.attributes(&s.attributes)?,
                    body_attributes: self.attributes(&s.body_attributes)?,
                })
            }
            StatementKind::Loop(ref s) => StatementKind::Loop(Loop {
                body: self.block(&s.body)?,
                continuing: s.continuing.as_ref().map(|b| self.block(b)).transpose()?,
                attributes: self.attributes(&s.attributes)?,
            }),
            StatementKind::For(ref s) => StatementKind::For(For {
                init: self.boxed(&s.init)?,
                condition: self.optional(s.condition)?,
                update: self.boxed(&s.update)?,
                body: self.block(&s.body)?,
                attributes: self.attributes(&s.attributes)?,
            }),
            StatementKind::While(ref s) => StatementKind::While(While {
                condition: self.expression(s.condition)?,
                body: self.block(&s.body)?,
                attributes: self.attributes(&s.attributes)?,
            }),
            StatementKind::Break => StatementKind::Break,
            StatementKind::BreakIf(e) => StatementKind::BreakIf(self.expression(e)?),
            StatementKind::Continue => StatementKind::Continue,
            StatementKind::Return(e) => StatementKind::Return(self.optional(e)?),
            StatementKind::Discard => StatementKind::Discard,
            StatementKind::Declaration(ref v) => StatementKind::Declaration(self.variable(v)?),
            StatementKind::Assignment { lhs, op, rhs } => StatementKind::Assignment {
                lhs: self.expression(lhs)?,
                op,
                rhs: self.expression(rhs)?,
            },
            StatementKind::Increment(e) => StatementKind::Increment(self.expression(e)?),
            StatementKind::Decrement(e) => StatementKind::Decrement(self.expression(e)?),
            StatementKind::Call(e) => StatementKind::Call(self.expression(e)?),
            StatementKind::ConstAssert(e) => StatementKind::ConstAssert(self.expression(e)?),
        };
        Ok(Statement {
            id,
            span: stmt.span,
            kind,
        })
    }

    pub fn function(&mut self, function: &Function) -> Result<Function, CloneError> {
        let mut params = Vec::with_capacity(function.params.len());
        for param in function.params.iter() {
            params.push(Parameter {
                id: self.fresh(param.id)?,
                span: param.span,
                name: param.name.clone(),
                ty: self.expression(param.ty)?,
                attributes: self.attributes(&param.attributes)?,
            });
        }
        Ok(Function {
            name: function.name.clone(),
            params,
            return_type: self.optional(function.return_type)?,
            return_attributes: self.attributes(&function.return_attributes)?,
            attributes: self.attributes(&function.attributes)?,
            body: self.block(&function.body)?,
        })
    }

    fn type_decl(&mut self, decl: &TypeDecl) -> Result<TypeDecl, CloneError> {
        Ok(match *decl {
            TypeDecl::Alias(ref alias) => TypeDecl::Alias(Alias {
                name: alias.name.clone(),
                ty: self.expression(alias.ty)?,
            }),
            TypeDecl::Struct(ref s) => {
                let mut members = Vec::with_capacity(s.members.len());
                for member in s.members.iter() {
                    members.push(StructMember {
                        id: self.fresh(member.id)?,
                        span: member.span,
                        name: member.name.clone(),
                        ty: self.expression(member.ty)?,
                        attributes: self.attributes(&member.attributes)?,
                    });
                }
                TypeDecl::Struct(Struct {
                    name: s.name.clone(),
                    members,
                    attributes: self.attributes(&s.attributes)?,
                })
            }
        })
    }

    /// Copy a module-scope declaration, appending it to `dst`.
    pub fn declaration(
        &mut self,
        handle: Handle<GlobalDecl>,
    ) -> Result<Handle<GlobalDecl>, CloneError> {
        let src = self.src;
        let decl = src.declaration(handle);
        self.check(decl.id)?;
        let span = src.declaration_span(handle);
        let kind = match decl.kind {
            GlobalDeclKind::DiagnosticDirective(ref control) => {
                GlobalDeclKind::DiagnosticDirective(control.clone())
            }
            GlobalDeclKind::Enable { ref extensions } => GlobalDeclKind::Enable {
                extensions: extensions
                    .iter()
                    .map(|ext| {
                        Ok(Extension {
                            id: self.fresh(ext.id)?,
                            span: ext.span,
                            kind: ext.kind,
                        })
                    })
                    .collect::<Result<_, CloneError>>()?,
            },
            GlobalDeclKind::Requires { ref features } => GlobalDeclKind::Requires {
                features: features.clone(),
            },
            GlobalDeclKind::Function(ref f) => GlobalDeclKind::Function(self.function(f)?),
            GlobalDeclKind::Variable(ref v) => GlobalDeclKind::Variable(self.variable(v)?),
            GlobalDeclKind::TypeDecl(ref t) => GlobalDeclKind::TypeDecl(self.type_decl(t)?),
            GlobalDeclKind::ConstAssert(e) => GlobalDeclKind::ConstAssert(self.expression(e)?),
        };
        Ok(self.dst.add_global_declaration(kind, span))
    }
}

/// Copy every declaration of `src` into a new module with its own program id.
pub fn clone_module(src: &Module) -> Result<Module, CloneError> {
    let mut dst = Module::new();
    let mut cloner = Cloner::new(src, &mut dst);
    for handle in src.declarations().handles() {
        cloner.declaration(handle)?;
    }
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Module {
        let mut module = Module::new();
        let one = module.literal_expr(Literal::AbstractInt(1), Span::new(13, 14));
        let x = module.ident_expr("x", Span::new(17, 18));
        let sum = module.add_expression(
            ExpressionKind::Binary {
                op: BinaryOperator::Add,
                left: one,
                right: x,
            },
            Span::new(13, 18),
        );
        let ret = module.statement(StatementKind::Return(Some(sum)), Span::new(6, 19));
        let body = module.block(vec![ret], Span::new(4, 21));
        let function = Function {
            name: Ident::new("f", Span::new(3, 4)),
            params: Vec::new(),
            return_type: None,
            return_attributes: Vec::new(),
            attributes: Vec::new(),
            body,
        };
        module.add_global_declaration(GlobalDeclKind::Function(function), Span::new(0, 21));
        module
    }

    #[test]
    fn clone_gets_fresh_ids_and_keeps_spans() {
        let src = sample();
        let dst = clone_module(&src).unwrap();
        assert_ne!(src.program(), dst.program());
        let f = dst.functions().next().unwrap();
        assert_eq!(f.body.id.program, dst.program());
        let ret = &f.body.statements[0];
        assert_eq!(ret.id.program, dst.program());
        let StatementKind::Return(Some(sum)) = ret.kind else {
            panic!("expected return");
        };
        assert_eq!(dst.expression_span(sum), Span::new(13, 18));
        assert!(matches!(
            *dst.expression(sum),
            ExpressionKind::Binary {
                op: BinaryOperator::Add,
                ..
            }
        ));
        assert_eq!(dst.expressions()[sum].id.program, dst.program());
    }

    #[test]
    fn foreign_nodes_are_rejected() {
        let src = sample();
        let other = sample();
        let mut dst = Module::new();
        let mut cloner = Cloner::new(&src, &mut dst);
        let foreign = other.functions().next().unwrap().body.clone();
        let err = cloner.block(&foreign).unwrap_err();
        assert_eq!(
            err,
            CloneError::ForeignNode {
                expected: src.program(),
                found: foreign.id,
            }
        );
    }
}
