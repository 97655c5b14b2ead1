/*!
Function bodies.

[`FunctionEmitter`] turns one SPIR-V function into a WGSL function in three
steps:

1. [`flow::structurize`] recovers the statement nesting.
2. `analyze` finds, for every value the function defines, the blocks that
   use it. A value used only once, in the block that computes it, by a pure
   instruction, is folded into its use. Any other value gets a `let`, or, if
   some use is in a scope the definition's scope does not enclose, a `var`
   declared early enough for every use to see it. `OpPhi` results get such a
   `var` too, assigned at the end of each predecessor.
3. The node tree is walked, emitting each block's instructions in order.

SPIR-V is explicit about integer signedness where WGSL is not: `OpIAdd` may
add an `i32` to a `u32`. Operands are bitcast to the signedness the WGSL
operator needs, and results are bitcast back to the declared result type.
*/

use super::{
    flow::{self, Body, BlockShape, Node, ScopeId, Structure, Terminator},
    types::{Scalar, Type},
    BasicBlock, Error, FunctionInfo, Instruction, ModuleState, Parser,
};
use crate::{
    ast::{self, BinaryOperator, ExpressionKind, Literal, StatementKind, UnaryOperator},
    resolve::BuiltinFunction as Bf,
    FastHashMap, Handle, Span,
};
use spirv::{Op, Word};

pub(super) type Expr = Handle<ast::Expression>;

#[derive(Clone, Debug)]
pub(super) enum ValueKind {
    /// A `let`, `var`, parameter or hoisted variable; each use is the name.
    Named(String),
    /// A pure expression with a single use, folded into that use.
    Inline { expr: Expr, used: bool },
    /// Memory or a handle: a variable, an access chain into one, a loaded
    /// texture. Copied afresh at every use.
    Reference(Expr),
    SampledImage { image: Word, sampler: Word },
}

#[derive(Clone, Debug)]
pub(super) struct Value {
    /// The SPIR-V type; a pointer type for memory references.
    pub ty: Word,
    pub kind: ValueKind,
}

/// A step of an access chain or composite extraction.
#[derive(Clone, Copy, Debug)]
pub(super) enum Index {
    Literal(u32),
    Id(Word),
}

/// How a binary operator's integer operands must be signed.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Operands {
    /// Not integers.
    Keep,
    /// The second operand takes the first's signedness.
    FollowFirst,
    Signed,
    Unsigned,
    /// The shifted value is forced to the given signedness, if any; the
    /// shift amount is always unsigned.
    Shift(Option<bool>),
}

fn binary_operator(op: Op) -> Option<(BinaryOperator, Operands)> {
    use BinaryOperator as Bo;
    use Operands as O;
    Some(match op {
        Op::IAdd => (Bo::Add, O::FollowFirst),
        Op::ISub => (Bo::Subtract, O::FollowFirst),
        Op::IMul => (Bo::Multiply, O::FollowFirst),
        Op::SDiv => (Bo::Divide, O::Signed),
        Op::UDiv => (Bo::Divide, O::Unsigned),
        Op::SRem | Op::SMod => (Bo::Modulo, O::Signed),
        Op::UMod => (Bo::Modulo, O::Unsigned),
        Op::FAdd => (Bo::Add, O::Keep),
        Op::FSub => (Bo::Subtract, O::Keep),
        Op::FMul => (Bo::Multiply, O::Keep),
        Op::FDiv => (Bo::Divide, O::Keep),
        Op::FRem => (Bo::Modulo, O::Keep),
        Op::VectorTimesScalar
        | Op::MatrixTimesScalar
        | Op::MatrixTimesVector
        | Op::VectorTimesMatrix
        | Op::MatrixTimesMatrix => (Bo::Multiply, O::Keep),
        Op::BitwiseAnd => (Bo::And, O::FollowFirst),
        Op::BitwiseOr => (Bo::Or, O::FollowFirst),
        Op::BitwiseXor => (Bo::Xor, O::FollowFirst),
        Op::IEqual => (Bo::Equal, O::FollowFirst),
        Op::INotEqual => (Bo::NotEqual, O::FollowFirst),
        Op::SGreaterThan => (Bo::Greater, O::Signed),
        Op::SGreaterThanEqual => (Bo::GreaterEqual, O::Signed),
        Op::SLessThan => (Bo::Less, O::Signed),
        Op::SLessThanEqual => (Bo::LessEqual, O::Signed),
        Op::UGreaterThan => (Bo::Greater, O::Unsigned),
        Op::UGreaterThanEqual => (Bo::GreaterEqual, O::Unsigned),
        Op::ULessThan => (Bo::Less, O::Unsigned),
        Op::ULessThanEqual => (Bo::LessEqual, O::Unsigned),
        Op::FOrdEqual => (Bo::Equal, O::Keep),
        Op::FOrdNotEqual | Op::FUnordNotEqual => (Bo::NotEqual, O::Keep),
        Op::FOrdLessThan => (Bo::Less, O::Keep),
        Op::FOrdLessThanEqual => (Bo::LessEqual, O::Keep),
        Op::FOrdGreaterThan => (Bo::Greater, O::Keep),
        Op::FOrdGreaterThanEqual => (Bo::GreaterEqual, O::Keep),
        Op::LogicalEqual => (Bo::Equal, O::Keep),
        Op::LogicalNotEqual => (Bo::NotEqual, O::Keep),
        Op::LogicalAnd => (Bo::And, O::Keep),
        Op::LogicalOr => (Bo::Or, O::Keep),
        Op::ShiftLeftLogical => (Bo::ShiftLeft, O::Shift(None)),
        Op::ShiftRightLogical => (Bo::ShiftRight, O::Shift(Some(false))),
        Op::ShiftRightArithmetic => (Bo::ShiftRight, O::Shift(Some(true))),
        _ => return None,
    })
}

/// Unordered float comparisons are true when either side is NaN, so they
/// are written as the negation of the opposite ordered comparison.
const fn unordered_inverse(op: Op) -> Option<BinaryOperator> {
    Some(match op {
        Op::FUnordEqual => BinaryOperator::NotEqual,
        Op::FUnordLessThan => BinaryOperator::GreaterEqual,
        Op::FUnordLessThanEqual => BinaryOperator::Greater,
        Op::FUnordGreaterThan => BinaryOperator::LessEqual,
        Op::FUnordGreaterThanEqual => BinaryOperator::Less,
        _ => return None,
    })
}

/// Instructions that map to a builtin call on their operands, unchanged.
const fn direct_builtin(op: Op) -> Option<Bf> {
    Some(match op {
        Op::DPdx => Bf::Dpdx,
        Op::DPdy => Bf::Dpdy,
        Op::Fwidth => Bf::Fwidth,
        Op::DPdxFine => Bf::DpdxFine,
        Op::DPdyFine => Bf::DpdyFine,
        Op::FwidthFine => Bf::FwidthFine,
        Op::DPdxCoarse => Bf::DpdxCoarse,
        Op::DPdyCoarse => Bf::DpdyCoarse,
        Op::FwidthCoarse => Bf::FwidthCoarse,
        Op::Any => Bf::Any,
        Op::All => Bf::All,
        Op::Dot => Bf::Dot,
        Op::Transpose => Bf::Transpose,
        Op::QuantizeToF16 => Bf::QuantizeToF16,
        _ => return None,
    })
}

/// Instructions whose results live in memory or are handles: nothing is
/// emitted where they are defined, their expression is rebuilt at each use.
fn is_reference(parser: &Parser, inst: &Instruction) -> bool {
    match inst.op {
        Op::Variable
        | Op::AccessChain
        | Op::InBoundsAccessChain
        | Op::SampledImage
        | Op::Image => true,
        Op::Load | Op::CopyObject => inst.operands.first().map_or(false, |&ty| {
            matches!(
                parser.types.get(&ty),
                Some(Type::Pointer { .. } | Type::Image(_) | Type::Sampler | Type::SampledImage { .. })
            )
        }),
        _ => false,
    }
}

/// Instructions without a result type and id.
const fn has_result(op: Op) -> bool {
    !matches!(
        op,
        Op::Store
            | Op::CopyMemory
            | Op::ControlBarrier
            | Op::MemoryBarrier
            | Op::ImageWrite
            | Op::Nop
            | Op::Line
            | Op::NoLine
            | Op::SelectionMerge
            | Op::LoopMerge
    )
}

/// The ids an instruction reads, plus how many times each is read by the
/// WGSL it becomes.
fn operand_uses(inst: &Instruction) -> Vec<(Word, u32)> {
    let ops = &inst.operands;
    let skip = if has_result(inst.op) { 2 } else { 0 };
    let once = |range: &[Word]| range.iter().map(|&id| (id, 1)).collect::<Vec<_>>();
    let twice = |range: &[Word]| range.iter().map(|&id| (id, 2)).collect::<Vec<_>>();
    match inst.op {
        Op::CompositeExtract => once(ops.get(2..3).unwrap_or_default()),
        Op::CompositeInsert => once(ops.get(2..4).unwrap_or_default()),
        Op::VectorShuffle | Op::OuterProduct | Op::FMod => twice(ops.get(2..4).unwrap_or_default()),
        Op::ExtInst => once(ops.get(4..).unwrap_or_default()),
        Op::ImageSampleImplicitLod
        | Op::ImageSampleExplicitLod
        | Op::ImageSampleDrefImplicitLod
        | Op::ImageSampleDrefExplicitLod
        | Op::ImageFetch
        | Op::ImageRead
        | Op::ImageGather
        | Op::ImageDrefGather => {
            let mut uses = once(ops.get(2..).unwrap_or_default());
            if let Some(coordinate) = uses.get_mut(1) {
                coordinate.1 = 2;
            }
            uses
        }
        Op::ImageWrite => {
            let mut uses = once(ops);
            if let Some(coordinate) = uses.get_mut(1) {
                coordinate.1 = 2;
            }
            uses
        }
        Op::Phi => Vec::new(),
        _ => once(ops.get(skip..).unwrap_or_default()),
    }
}

struct Phi {
    var: String,
    ty: Word,
}

/// Where each value the function defines is used, and what follows from it.
#[derive(Default)]
struct Analysis {
    def_block: FastHashMap<Word, usize>,
    uses: FastHashMap<Word, (u32, Vec<usize>)>,
    /// For references, the ids their expression reads; a use of the
    /// reference is a use of each of these.
    reference_operands: FastHashMap<Word, Vec<Word>>,
    /// Values assigned to a `var` declared at the start of some enclosing
    /// scope, rather than bound with `let`.
    hoisted: FastHashMap<Word, String>,
    phis: FastHashMap<Word, Phi>,
    /// Per predecessor block: (phi, incoming value) pairs to assign before
    /// leaving the block.
    phi_assignments: FastHashMap<usize, Vec<(Word, Word)>>,
    /// `var` declarations to put at the start of each scope.
    declarations: FastHashMap<ScopeId, Vec<(String, Word)>>,
}

impl Analysis {
    fn record_use(&mut self, id: Word, block: usize, count: u32) {
        if let Some(operands) = self.reference_operands.get(&id).cloned() {
            for operand in operands {
                self.record_use(operand, block, count);
            }
            return;
        }
        if !self.def_block.contains_key(&id) {
            return;
        }
        let entry = self.uses.entry(id).or_default();
        entry.0 += count;
        entry.1.push(block);
    }
}

pub(super) struct FunctionEmitter<'a> {
    pub(super) parser: &'a mut Parser,
    function: &'a FunctionInfo,
    pub(super) values: FastHashMap<Word, Value>,
    analysis: Analysis,
    /// The module variable each loaded handle came from.
    pub(super) handle_origins: FastHashMap<Word, Word>,
    statements: Vec<ast::Statement>,
    return_type: Word,
}

impl<'a> FunctionEmitter<'a> {
    pub fn new(parser: &'a mut Parser, function: &'a FunctionInfo) -> Self {
        FunctionEmitter {
            parser,
            function,
            values: FastHashMap::default(),
            analysis: Analysis::default(),
            handle_origins: FastHashMap::default(),
            statements: Vec::new(),
            return_type: function.result_type,
        }
    }

    /// Build the WGSL function named `name`.
    pub fn emit(mut self, name: String) -> Result<ast::Function, Error> {
        let function = self.function;
        log::debug!("emitting function %{} as {}", function.id, name);
        if function.blocks.is_empty() {
            return Err(Error::EmptyFunction(function.id));
        }
        let params = self.parameters()?;
        let return_type = match *self.parser.lookup_type(function.result_type)? {
            Type::Void => None,
            _ => Some(self.parser.type_expr(function.result_type)?),
        };

        let shapes = function
            .blocks
            .iter()
            .map(|block| BlockShape {
                id: block.id,
                merge: block.merge,
                terminator: &block.terminator,
            })
            .collect::<Vec<_>>();
        let structure = flow::structurize(&shapes)?;
        self.analyze(&structure)?;
        let statements = self.body(&structure.body)?;
        let body = self.parser.module.block(statements, Span::UNDEFINED);

        Ok(ast::Function {
            name: ast::Ident::new(name, Span::UNDEFINED),
            params,
            return_type,
            return_attributes: Vec::new(),
            attributes: Vec::new(),
            body,
        })
    }

    fn parameters(&mut self) -> Result<Vec<ast::Parameter>, Error> {
        let function = self.function;
        let mut params = Vec::with_capacity(function.params.len());
        for &(id, ty) in function.params.iter() {
            let name = self.parser.value_name(id);
            let ty_expr = self.parser.type_expr(ty)?;
            let kind = match *self.parser.lookup_type(ty)? {
                Type::Pointer { .. } => {
                    let ident = self.parser.module.ident_expr(name.clone(), Span::UNDEFINED);
                    ValueKind::Reference(self.parser.module.add_expression(
                        ExpressionKind::Unary {
                            op: UnaryOperator::Deref,
                            expr: ident,
                        },
                        Span::UNDEFINED,
                    ))
                }
                Type::Image(_) | Type::Sampler => ValueKind::Reference(
                    self.parser.module.ident_expr(name.clone(), Span::UNDEFINED),
                ),
                _ => ValueKind::Named(name.clone()),
            };
            self.values.insert(id, Value { ty, kind });
            params.push(ast::Parameter {
                id: self.parser.module.next_id(),
                span: Span::UNDEFINED,
                name: ast::Ident::new(name, Span::UNDEFINED),
                ty: ty_expr,
                attributes: Vec::new(),
            });
        }
        Ok(params)
    }

    fn block_index(&self, id: Word) -> Option<usize> {
        self.function.blocks.iter().position(|block| block.id == id)
    }

    fn analyze(&mut self, structure: &Structure) -> Result<(), Error> {
        let function = self.function;
        let scopes = &structure.scopes;
        let reached = |index: usize| structure.block_scopes[index].is_some();

        // Definitions first: uses may precede definitions in block order.
        for (index, block) in function.blocks.iter().enumerate() {
            if !reached(index) {
                continue;
            }
            for inst in block.body.iter() {
                if !has_result(inst.op) || inst.operands.len() < 2 {
                    continue;
                }
                let id = inst.operands[1];
                if is_reference(self.parser, inst) {
                    let reads = match inst.op {
                        Op::Variable => Vec::new(),
                        _ => inst.operands[2..].to_vec(),
                    };
                    self.analysis.reference_operands.insert(id, reads);
                } else {
                    self.analysis.def_block.insert(id, index);
                }
            }
        }

        for (index, block) in function.blocks.iter().enumerate() {
            if !reached(index) {
                continue;
            }
            for inst in block.body.iter() {
                if is_reference(self.parser, inst) {
                    if inst.op == Op::Variable {
                        if let Some(&init) = inst.operands.get(3) {
                            self.analysis.record_use(init, index, 1);
                        }
                    }
                    continue;
                }
                if inst.op == Op::Phi {
                    for pair in inst.operands[2..].chunks(2) {
                        if let [value, parent] = *pair {
                            if let Some(parent) = self.block_index(parent).filter(|&p| reached(p)) {
                                self.analysis.record_use(value, parent, 1);
                            }
                        }
                    }
                    continue;
                }
                for (id, count) in operand_uses(inst) {
                    self.analysis.record_use(id, index, count);
                }
            }
            match block.terminator {
                Terminator::BranchConditional { condition, .. } => {
                    self.analysis.record_use(condition, index, 1)
                }
                Terminator::Switch { selector, .. } => self.analysis.record_use(selector, index, 1),
                Terminator::ReturnValue(value) => self.analysis.record_use(value, index, 1),
                _ => {}
            }
        }

        // Decide which values must be declared ahead of their definition.
        let mut hoist = Vec::new();
        for (&id, &def) in self.analysis.def_block.iter() {
            let def_scope = structure.block_scopes[def].unwrap_or(0);
            let Some(&(_, ref blocks)) = self.analysis.uses.get(&id) else {
                continue;
            };
            let use_scopes = blocks
                .iter()
                .map(|&b| structure.block_scopes[b].unwrap_or(0))
                .collect::<Vec<_>>();
            let target = use_scopes
                .iter()
                .fold(def_scope, |acc, &scope| scopes.common_ancestor(acc, scope));
            let crosses = use_scopes
                .iter()
                .any(|&scope| scopes.crosses_continuing(scope, target));
            if target != def_scope || crosses {
                hoist.push((id, target));
            }
        }
        // Declaration order follows ids so output is deterministic.
        hoist.sort_unstable();
        for (id, scope) in hoist {
            let ty = self.result_type_of(id)?;
            let name = self.parser.value_name(id);
            self.analysis
                .declarations
                .entry(scope)
                .or_default()
                .push((name.clone(), ty));
            self.analysis.hoisted.insert(id, name);
        }

        for (index, block) in function.blocks.iter().enumerate() {
            let Some(phi_scope) = structure.block_scopes[index] else {
                continue;
            };
            for inst in block.body.iter().filter(|inst| inst.op == Op::Phi) {
                inst.expect_at_least(3)?;
                let (ty, id) = (inst.operands[0], inst.operands[1]);
                let mut scope = phi_scope;
                let mut incoming = Vec::new();
                for pair in inst.operands[2..].chunks(2) {
                    if let [value, parent] = *pair {
                        let Some(parent) = self.block_index(parent) else {
                            return Err(Error::InvalidId(parent));
                        };
                        if let Some(parent_scope) = structure.block_scopes[parent] {
                            scope = scopes.common_ancestor(scope, parent_scope);
                            incoming.push((parent, value));
                        }
                    }
                }
                let base = match self.parser.debug_names.get(&id) {
                    Some(name) => name.clone(),
                    None => format!("x_{id}"),
                };
                let var = self.parser.namer.call(&format!("{base}_phi"));
                self.analysis
                    .declarations
                    .entry(scope)
                    .or_default()
                    .push((var.clone(), ty));
                for (parent, value) in incoming {
                    self.analysis
                        .phi_assignments
                        .entry(parent)
                        .or_default()
                        .push((id, value));
                }
                self.analysis.phis.insert(id, Phi { var, ty });
            }
        }
        Ok(())
    }

    fn result_type_of(&self, id: Word) -> Result<Word, Error> {
        self.function
            .blocks
            .iter()
            .flat_map(|block| block.body.iter())
            .find(|inst| has_result(inst.op) && inst.operands.get(1) == Some(&id))
            .map(|inst| inst.operands[0])
            .ok_or(Error::InvalidId(id))
    }

    // Statement building.

    pub(super) fn push(&mut self, kind: StatementKind) {
        let statement = self.parser.module.statement(kind, Span::UNDEFINED);
        self.statements.push(statement);
    }

    fn body(&mut self, body: &Body) -> Result<Vec<ast::Statement>, Error> {
        let outer = std::mem::take(&mut self.statements);
        for (name, ty) in self
            .analysis
            .declarations
            .remove(&body.scope)
            .unwrap_or_default()
        {
            let ty = self.parser.type_expr(ty)?;
            self.push(StatementKind::Declaration(ast::Variable {
                name: ast::Ident::new(name, Span::UNDEFINED),
                kind: ast::VariableKind::Var {
                    address_space: None,
                    access: None,
                },
                ty: Some(ty),
                initializer: None,
                attributes: Vec::new(),
            }));
        }
        for node in body.nodes.iter() {
            self.node(node)?;
        }
        Ok(std::mem::replace(&mut self.statements, outer))
    }

    fn wrap_block(&mut self, statements: Vec<ast::Statement>) -> ast::Block {
        self.parser.module.block(statements, Span::UNDEFINED)
    }

    fn node(&mut self, node: &Node) -> Result<(), Error> {
        let function = self.function;
        let blocks = &function.blocks;
        match *node {
            Node::Block(index) => self.block(index)?,
            Node::If {
                block,
                ref accept,
                ref reject,
            } => {
                self.block(block)?;
                let Terminator::BranchConditional { condition, .. } = blocks[block].terminator
                else {
                    return Err(Error::InvalidTerminator(blocks[block].id));
                };
                let (condition, _) = self.value(condition)?;
                let accept = self.body(accept)?;
                let reject = self.body(reject)?;
                let accept = self.wrap_block(accept);
                let reject = if reject.is_empty() {
                    None
                } else {
                    let block = self.wrap_block(reject);
                    let statement = self
                        .parser
                        .module
                        .statement(StatementKind::Block(block), Span::UNDEFINED);
                    Some(Box::new(statement))
                };
                self.push(StatementKind::If(ast::If {
                    condition,
                    accept,
                    reject,
                    attributes: Vec::new(),
                }));
            }
            Node::Switch { block, ref cases } => {
                self.block(block)?;
                let Terminator::Switch { selector, .. } = blocks[block].terminator else {
                    return Err(Error::InvalidTerminator(blocks[block].id));
                };
                let (selector, selector_ty) = self.value(selector)?;
                let signed = matches!(self.parser.scalar_info(selector_ty), Some((Scalar::I32, _)));
                let mut ast_cases = Vec::with_capacity(cases.len());
                for case in cases {
                    let mut selectors = case
                        .literals
                        .iter()
                        .map(|&literal| {
                            let literal = if signed {
                                Literal::I32(literal as i32)
                            } else {
                                Literal::U32(literal)
                            };
                            ast::CaseSelector::Expr(
                                self.parser.module.literal_expr(literal, Span::UNDEFINED),
                            )
                        })
                        .collect::<Vec<_>>();
                    if case.default {
                        selectors.push(ast::CaseSelector::Default);
                    }
                    let body = self.body(&case.body)?;
                    let body = self.wrap_block(body);
                    ast_cases.push(ast::SwitchCase {
                        id: self.parser.module.next_id(),
                        span: Span::UNDEFINED,
                        selectors,
                        body,
                    });
                }
                self.push(StatementKind::Switch(ast::Switch {
                    selector,
                    cases: ast_cases,
                    attributes: Vec::new(),
                    body_attributes: Vec::new(),
                }));
            }
            Node::Loop {
                ref body,
                ref continuing,
            } => {
                let body = self.body(body)?;
                let continuing = self.body(continuing)?;
                let body = self.wrap_block(body);
                let continuing = if continuing.is_empty() {
                    None
                } else {
                    Some(self.wrap_block(continuing))
                };
                self.push(StatementKind::Loop(ast::Loop {
                    body,
                    continuing,
                    attributes: Vec::new(),
                }));
            }
            Node::Break => self.push(StatementKind::Break),
            Node::Continue => self.push(StatementKind::Continue),
            Node::BreakIf { block, negate } => {
                self.block(block)?;
                let Terminator::BranchConditional { condition, .. } = blocks[block].terminator
                else {
                    return Err(Error::InvalidTerminator(blocks[block].id));
                };
                let (mut condition, _) = self.value(condition)?;
                if negate {
                    condition = self.parser.module.add_expression(
                        ExpressionKind::Unary {
                            op: UnaryOperator::LogicalNot,
                            expr: condition,
                        },
                        Span::UNDEFINED,
                    );
                }
                self.push(StatementKind::BreakIf(condition));
            }
            Node::Return(index) => {
                self.block(index)?;
                let value = match blocks[index].terminator {
                    Terminator::ReturnValue(value) => {
                        let (expr, ty) = self.value(value)?;
                        Some(self.reconcile(expr, ty, self.return_type)?)
                    }
                    _ => None,
                };
                self.push(StatementKind::Return(value));
            }
            Node::Kill => self.push(StatementKind::Discard),
            Node::Unreachable => {
                if !matches!(*self.parser.lookup_type(self.return_type)?, Type::Void) {
                    let zero = self.parser.zero_value(self.return_type)?;
                    self.push(StatementKind::Return(Some(zero)));
                }
            }
        }
        Ok(())
    }

    /// Emit a block's instructions, then assign the phis it feeds.
    fn block(&mut self, index: usize) -> Result<(), Error> {
        let function = self.function;
        let block: &BasicBlock = &function.blocks[index];
        for inst in block.body.iter() {
            self.instruction(inst).map_err(|error| inst.wrap(error))?;
        }
        let assignments = self
            .analysis
            .phi_assignments
            .remove(&index)
            .unwrap_or_default();
        for (phi, value) in assignments {
            let (var, ty) = match self.analysis.phis.get(&phi) {
                Some(phi) => (phi.var.clone(), phi.ty),
                None => return Err(Error::InvalidId(phi)),
            };
            let (expr, value_ty) = self.value(value)?;
            let rhs = self.reconcile(expr, value_ty, ty)?;
            let lhs = self.parser.module.ident_expr(var, Span::UNDEFINED);
            self.push(StatementKind::Assignment { lhs, op: None, rhs });
        }
        Ok(())
    }

    // Values.

    /// The value of `id`, as an expression and its SPIR-V type.
    pub(super) fn value(&mut self, id: Word) -> Result<(Expr, Word), Error> {
        let module = &mut self.parser.module;
        if let Some(value) = self.values.get_mut(&id) {
            let expr = match value.kind {
                ValueKind::Named(ref name) => module.ident_expr(name.clone(), Span::UNDEFINED),
                ValueKind::Inline { expr, ref mut used } => {
                    if *used {
                        module.duplicate_expression(expr)
                    } else {
                        *used = true;
                        expr
                    }
                }
                ValueKind::Reference(expr) => module.duplicate_expression(expr),
                ValueKind::SampledImage { .. } => return Err(Error::UnhandledExpression(id)),
            };
            return Ok((expr, value.ty));
        }
        self.parser.module_value(id)
    }

    fn record_handle_origin(&mut self, id: Word, source: Word) {
        let origin = match self.handle_origins.get(&source) {
            Some(&origin) => origin,
            None if self.parser.globals.contains_key(&source) => source,
            None => return,
        };
        self.handle_origins.insert(id, origin);
    }

    /// The SPIR-V type of `id`, without using it.
    pub(super) fn value_type(&self, id: Word) -> Option<Word> {
        match self.values.get(&id) {
            Some(value) => Some(value.ty),
            None => self.parser.module_value_type(id),
        }
    }

    /// The memory or handle `id` refers to, and its SPIR-V type.
    pub(super) fn reference(&mut self, id: Word) -> Result<(Expr, Word), Error> {
        match self.values.get(&id) {
            Some(&Value {
                ty,
                kind: ValueKind::Reference(expr),
            }) => Ok((self.parser.module.duplicate_expression(expr), ty)),
            Some(_) => Err(Error::UnhandledExpression(id)),
            None => self.parser.module_value(id),
        }
    }

    /// Bind the result of an instruction: fold it into its single use, or
    /// give it a name.
    pub(super) fn define(&mut self, id: Word, ty: Word, expr: Expr, pure: bool) -> Result<(), Error> {
        let folded = pure
            && !self.analysis.hoisted.contains_key(&id)
            && match (self.analysis.uses.get(&id), self.analysis.def_block.get(&id)) {
                (Some(&(1, ref blocks)), Some(def)) => blocks.as_slice() == [*def],
                _ => false,
            };
        let kind = if folded {
            ValueKind::Inline { expr, used: false }
        } else if let Some(name) = self.analysis.hoisted.get(&id).cloned() {
            let lhs = self.parser.module.ident_expr(name.clone(), Span::UNDEFINED);
            self.push(StatementKind::Assignment {
                lhs,
                op: None,
                rhs: expr,
            });
            ValueKind::Named(name)
        } else {
            let name = self.parser.value_name(id);
            let ty_expr = self.parser.type_expr(ty)?;
            self.push(StatementKind::Declaration(ast::Variable {
                name: ast::Ident::new(name.clone(), Span::UNDEFINED),
                kind: ast::VariableKind::Let,
                ty: Some(ty_expr),
                initializer: Some(expr),
                attributes: Vec::new(),
            }));
            ValueKind::Named(name)
        };
        self.values.insert(id, Value { ty, kind });
        Ok(())
    }

    // Expression helpers.

    pub(super) fn builtin(&mut self, function: Bf, arguments: Vec<Expr>) -> Expr {
        let callee = self
            .parser
            .module
            .ident_expr(function.name(), Span::UNDEFINED);
        self.parser.module.call_expr(callee, arguments, Span::UNDEFINED)
    }

    /// `T(arguments)` for the type with id `ty`.
    pub(super) fn construct(&mut self, ty: Word, arguments: Vec<Expr>) -> Result<Expr, Error> {
        let callee = self.parser.type_expr(ty)?;
        Ok(self.parser.module.call_expr(callee, arguments, Span::UNDEFINED))
    }

    pub(super) fn literal(&mut self, literal: Literal) -> Expr {
        self.parser.module.literal_expr(literal, Span::UNDEFINED)
    }

    pub(super) fn member(&mut self, base: Expr, name: &str) -> Expr {
        self.parser.module.add_expression(
            ExpressionKind::Member {
                base,
                member: ast::Ident::new(name, Span::UNDEFINED),
            },
            Span::UNDEFINED,
        )
    }

    pub(super) fn binary(&mut self, op: BinaryOperator, left: Expr, right: Expr) -> Expr {
        self.parser
            .module
            .add_expression(ExpressionKind::Binary { op, left, right }, Span::UNDEFINED)
    }

    fn unary(&mut self, op: UnaryOperator, expr: Expr) -> Expr {
        self.parser
            .module
            .add_expression(ExpressionKind::Unary { op, expr }, Span::UNDEFINED)
    }

    pub(super) fn bitcast(&mut self, expr: Expr, ty: Word) -> Result<Expr, Error> {
        let ty = self.parser.type_expr(ty)?;
        Ok(self
            .parser
            .module
            .add_expression(ExpressionKind::Bitcast { ty, expr }, Span::UNDEFINED))
    }

    /// Bitcast `expr` of type `natural` to `result` if their integer
    /// signedness differs.
    pub(super) fn reconcile(&mut self, expr: Expr, natural: Word, result: Word) -> Result<Expr, Error> {
        match (self.parser.scalar_info(natural), self.parser.scalar_info(result)) {
            (Some((a, size_a)), Some((b, size_b)))
                if a != b && size_a == size_b && a.is_integer() && b.is_integer() =>
            {
                self.bitcast(expr, result)
            }
            _ => Ok(expr),
        }
    }

    /// Make an integer operand signed or unsigned, bitcasting if needed.
    pub(super) fn force_signedness(
        &mut self,
        (expr, ty): (Expr, Word),
        signed: bool,
    ) -> Result<(Expr, Word), Error> {
        let target = self.parser.with_signedness(ty, signed);
        if target == ty || self.parser.same_type(target, ty) {
            return Ok((expr, ty));
        }
        Ok((self.bitcast(expr, target)?, target))
    }

    /// The value of `id` converted to a `u32`, as bit-manipulation builtins
    /// want their offsets and counts.
    fn unsigned_count(&mut self, id: Word) -> Result<Expr, Error> {
        let (expr, ty) = self.value(id)?;
        match self.parser.scalar_info(ty) {
            Some((Scalar::I32, 1)) => {
                let u32_ty = self.parser.shaped_type(Scalar::U32, 1);
                self.construct(u32_ty, vec![expr])
            }
            _ => Ok(expr),
        }
    }

    /// Follow `indices` into a composite of type `ty`.
    pub(super) fn access(
        &mut self,
        mut expr: Expr,
        mut ty: Word,
        indices: &[Index],
    ) -> Result<(Expr, Word), Error> {
        for &index in indices {
            let constant = match index {
                Index::Literal(value) => Some(value),
                Index::Id(id) => self.parser.constant_u32(id),
            };
            let composite = self.parser.lookup_type(ty)?.clone();
            match composite {
                Type::Struct { ref members } => {
                    let member = constant.ok_or(Error::InvalidAccessIndex(ty))?;
                    let member_ty = *members
                        .get(member as usize)
                        .ok_or(Error::InvalidAccessType(ty))?;
                    let name = self.parser.member_name(ty, member);
                    expr = self.member(expr, &name);
                    ty = member_ty;
                    continue;
                }
                Type::Vector { size, scalar } => {
                    if let Some(component) = constant {
                        if component > 3 {
                            return Err(Error::InvalidComponentIndex(component));
                        }
                        if component >= size {
                            return Err(Error::InvalidAccessType(ty));
                        }
                        expr = self.member(expr, &"xyzw"[component as usize..=component as usize]);
                        ty = self.parser.shaped_type(scalar, 1);
                        continue;
                    }
                    ty = self.parser.shaped_type(scalar, 1);
                }
                Type::Matrix { rows, scalar, .. } => {
                    ty = self.parser.shaped_type(scalar, rows);
                }
                Type::Array { base, .. } => ty = base,
                _ => return Err(Error::InvalidAccessType(ty)),
            }
            let index = match index {
                Index::Literal(value) => self.literal(Literal::U32(value)),
                Index::Id(id) => self.value(id)?.0,
            };
            expr = self
                .parser
                .module
                .add_expression(ExpressionKind::Index { base: expr, index }, Span::UNDEFINED);
        }
        Ok((expr, ty))
    }

    /// The type a pointer type points to.
    pub(super) fn pointee(&self, ty: Word) -> Result<Word, Error> {
        match *self.parser.lookup_type(ty)? {
            Type::Pointer { base, .. } => Ok(base),
            _ => Err(Error::InvalidAccessType(ty)),
        }
    }

    /// Declare `var name: T = init;` for a copy that is about to be
    /// modified, returning the name.
    fn modified_copy(&mut self, id: Word, ty: Word, init: Expr) -> Result<String, Error> {
        let base = match self.parser.debug_names.get(&id) {
            Some(name) => name.clone(),
            None => format!("x_{id}"),
        };
        let name = self.parser.namer.call(&format!("{base}_1"));
        let ty = self.parser.type_expr(ty)?;
        self.push(StatementKind::Declaration(ast::Variable {
            name: ast::Ident::new(name.clone(), Span::UNDEFINED),
            kind: ast::VariableKind::Var {
                address_space: None,
                access: None,
            },
            ty: Some(ty),
            initializer: Some(init),
            attributes: Vec::new(),
        }));
        Ok(name)
    }

    // Instructions.

    fn instruction(&mut self, inst: &Instruction) -> Result<(), Error> {
        use crate::front::spv::image;

        log::trace!("\t\t{:?} [{}]", inst.op, inst.wc);
        let ops = &inst.operands;
        if let Some((op, operands)) = binary_operator(inst.op) {
            inst.expect(5)?;
            return self.binary_instruction(ops[0], ops[1], ops[2], ops[3], op, operands);
        }
        if let Some(inverse) = unordered_inverse(inst.op) {
            inst.expect(5)?;
            let (left, _) = self.value(ops[2])?;
            let (right, _) = self.value(ops[3])?;
            let compare = self.binary(inverse, left, right);
            let expr = self.unary(UnaryOperator::LogicalNot, compare);
            return self.define(ops[1], ops[0], expr, true);
        }
        if let Some(function) = direct_builtin(inst.op) {
            inst.expect_at_least(4)?;
            let arguments = ops[2..]
                .iter()
                .map(|&id| self.value(id).map(|(expr, _)| expr))
                .collect::<Result<Vec<_>, _>>()?;
            let expr = self.builtin(function, arguments);
            return self.define(ops[1], ops[0], expr, true);
        }
        if image::is_image_instruction(inst.op) {
            return self.image_instruction(inst);
        }

        match inst.op {
            Op::Nop | Op::Line | Op::NoLine | Op::SelectionMerge | Op::LoopMerge => {}
            Op::Variable => {
                inst.expect_at_least(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let name = self.parser.value_name(id);
                let pointee = self.pointee(ty)?;
                let ty_expr = self.parser.type_expr(pointee)?;
                let initializer = match ops.get(3) {
                    Some(&init) => Some(self.value(init)?.0),
                    None => None,
                };
                self.push(StatementKind::Declaration(ast::Variable {
                    name: ast::Ident::new(name.clone(), Span::UNDEFINED),
                    kind: ast::VariableKind::Var {
                        address_space: None,
                        access: None,
                    },
                    ty: Some(ty_expr),
                    initializer,
                    attributes: Vec::new(),
                }));
                let reference = self.parser.module.ident_expr(name, Span::UNDEFINED);
                self.values.insert(
                    id,
                    Value {
                        ty,
                        kind: ValueKind::Reference(reference),
                    },
                );
            }
            Op::Load => {
                inst.expect_at_least(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let (reference, pointer_ty) = self.reference(ops[2])?;
                if self.parser.lookup_type(ty)?.is_handle() {
                    self.record_handle_origin(id, ops[2]);
                    self.values.insert(
                        id,
                        Value {
                            ty,
                            kind: ValueKind::Reference(reference),
                        },
                    );
                } else {
                    let natural = match *self.parser.lookup_type(pointer_ty)? {
                        Type::Pointer { base, .. } => base,
                        _ => ty,
                    };
                    let expr = self.reconcile(reference, natural, ty)?;
                    self.define(id, ty, expr, false)?;
                }
            }
            Op::Store => {
                inst.expect_at_least(3)?;
                let (lhs, pointer_ty) = self.reference(ops[0])?;
                let (rhs, value_ty) = self.value(ops[1])?;
                let pointee = self.pointee(pointer_ty)?;
                let rhs = self.reconcile(rhs, value_ty, pointee)?;
                self.push(StatementKind::Assignment { lhs, op: None, rhs });
            }
            Op::CopyMemory => {
                inst.expect_at_least(3)?;
                let (lhs, _) = self.reference(ops[0])?;
                let (rhs, _) = self.reference(ops[1])?;
                self.push(StatementKind::Assignment { lhs, op: None, rhs });
            }
            Op::CopyObject => {
                inst.expect(4)?;
                let (ty, id) = (ops[0], ops[1]);
                if is_reference(self.parser, inst) {
                    let mut value = match self.values.get(&ops[2]) {
                        Some(value) => value.clone(),
                        None => {
                            let (expr, _) = self.parser.module_value(ops[2])?;
                            Value {
                                ty,
                                kind: ValueKind::Reference(expr),
                            }
                        }
                    };
                    value.ty = ty;
                    self.values.insert(id, value);
                    self.record_handle_origin(id, ops[2]);
                } else {
                    let (expr, _) = self.value(ops[2])?;
                    self.define(id, ty, expr, true)?;
                }
            }
            Op::AccessChain | Op::InBoundsAccessChain => {
                inst.expect_at_least(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let (base, base_ty) = self.reference(ops[2])?;
                let pointee = self.pointee(base_ty)?;
                let indices = ops[3..].iter().map(|&id| Index::Id(id)).collect::<Vec<_>>();
                let (expr, _) = self.access(base, pointee, &indices)?;
                self.values.insert(
                    id,
                    Value {
                        ty,
                        kind: ValueKind::Reference(expr),
                    },
                );
            }
            Op::CompositeExtract => {
                inst.expect_at_least(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let (base, base_ty) = self.value(ops[2])?;
                let indices = ops[3..].iter().map(|&i| Index::Literal(i)).collect::<Vec<_>>();
                let (expr, natural) = self.access(base, base_ty, &indices)?;
                let expr = self.reconcile(expr, natural, ty)?;
                self.define(id, ty, expr, true)?;
            }
            Op::CompositeInsert => {
                inst.expect_at_least(5)?;
                let (ty, id) = (ops[0], ops[1]);
                let (composite, composite_ty) = self.value(ops[3])?;
                let copy = self.modified_copy(id, ty, composite)?;
                let base = self.parser.module.ident_expr(copy.clone(), Span::UNDEFINED);
                let indices = ops[4..].iter().map(|&i| Index::Literal(i)).collect::<Vec<_>>();
                let (lhs, _) = self.access(base, composite_ty, &indices)?;
                let (rhs, _) = self.value(ops[2])?;
                self.push(StatementKind::Assignment { lhs, op: None, rhs });
                let result = self.parser.module.ident_expr(copy, Span::UNDEFINED);
                self.define(id, ty, result, false)?;
            }
            Op::VectorInsertDynamic => {
                inst.expect(6)?;
                let (ty, id) = (ops[0], ops[1]);
                let (vector, vector_ty) = self.value(ops[2])?;
                let copy = self.modified_copy(id, ty, vector)?;
                let base = self.parser.module.ident_expr(copy.clone(), Span::UNDEFINED);
                let (lhs, _) = self.access(base, vector_ty, &[Index::Id(ops[4])])?;
                let (rhs, _) = self.value(ops[3])?;
                self.push(StatementKind::Assignment { lhs, op: None, rhs });
                let result = self.parser.module.ident_expr(copy, Span::UNDEFINED);
                self.define(id, ty, result, false)?;
            }
            Op::VectorExtractDynamic => {
                inst.expect(5)?;
                let (ty, id) = (ops[0], ops[1]);
                let (vector, vector_ty) = self.value(ops[2])?;
                let (expr, natural) = self.access(vector, vector_ty, &[Index::Id(ops[3])])?;
                let expr = self.reconcile(expr, natural, ty)?;
                self.define(id, ty, expr, true)?;
            }
            Op::CompositeConstruct => {
                inst.expect_at_least(3)?;
                let (ty, id) = (ops[0], ops[1]);
                let arguments = ops[2..]
                    .iter()
                    .map(|&part| self.value(part).map(|(expr, _)| expr))
                    .collect::<Result<Vec<_>, _>>()?;
                let expr = self.construct(ty, arguments)?;
                self.define(id, ty, expr, true)?;
            }
            Op::VectorShuffle => self.vector_shuffle(inst)?,
            Op::Undef => {
                inst.expect(3)?;
                let zero = self.parser.zero_value(ops[0])?;
                self.define(ops[1], ops[0], zero, true)?;
            }
            Op::Phi => {
                let (ty, id) = (ops[0], ops[1]);
                let var = match self.analysis.phis.get(&id) {
                    Some(phi) => phi.var.clone(),
                    None => return Err(Error::InvalidId(id)),
                };
                let expr = self.parser.module.ident_expr(var, Span::UNDEFINED);
                self.define(id, ty, expr, false)?;
            }
            Op::SNegate | Op::Not | Op::FNegate | Op::LogicalNot => {
                inst.expect(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let operand = self.value(ops[2])?;
                let (operand, natural) = match inst.op {
                    Op::SNegate => self.force_signedness(operand, true)?,
                    _ => operand,
                };
                let op = match inst.op {
                    Op::SNegate | Op::FNegate => UnaryOperator::Negate,
                    Op::Not => UnaryOperator::Complement,
                    _ => UnaryOperator::LogicalNot,
                };
                let expr = self.unary(op, operand);
                let expr = self.reconcile(expr, natural, ty)?;
                self.define(id, ty, expr, true)?;
            }
            Op::BitCount | Op::BitReverse => {
                inst.expect(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let (operand, natural) = self.value(ops[2])?;
                let function = if inst.op == Op::BitCount {
                    Bf::CountOneBits
                } else {
                    if !self.parser.same_type(natural, ty) {
                        return Err(Error::BitReverseTypeMismatch);
                    }
                    Bf::ReverseBits
                };
                let expr = self.builtin(function, vec![operand]);
                let expr = self.reconcile(expr, natural, ty)?;
                self.define(id, ty, expr, true)?;
            }
            Op::BitFieldInsert => {
                inst.expect(7)?;
                let (ty, id) = (ops[0], ops[1]);
                let (base, natural) = self.value(ops[2])?;
                let signed = matches!(self.parser.scalar_info(natural), Some((Scalar::I32, _)));
                let insert = self.value(ops[3])?;
                let (insert, _) = self.force_signedness(insert, signed)?;
                let offset = self.unsigned_count(ops[4])?;
                let count = self.unsigned_count(ops[5])?;
                let expr = self.builtin(Bf::InsertBits, vec![base, insert, offset, count]);
                let expr = self.reconcile(expr, natural, ty)?;
                self.define(id, ty, expr, true)?;
            }
            Op::BitFieldSExtract | Op::BitFieldUExtract => {
                inst.expect(6)?;
                let (ty, id) = (ops[0], ops[1]);
                let base = self.value(ops[2])?;
                let (base, natural) =
                    self.force_signedness(base, inst.op == Op::BitFieldSExtract)?;
                let offset = self.unsigned_count(ops[3])?;
                let count = self.unsigned_count(ops[4])?;
                let expr = self.builtin(Bf::ExtractBits, vec![base, offset, count]);
                let expr = self.reconcile(expr, natural, ty)?;
                self.define(id, ty, expr, true)?;
            }
            Op::ConvertSToF | Op::ConvertUToF => {
                inst.expect(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let operand = self.value(ops[2])?;
                match self.parser.scalar_info(operand.1) {
                    Some((scalar, _)) if scalar.is_integer() => {}
                    _ => return Err(Error::ConvertToFloatOperand),
                }
                let (operand, _) = self.force_signedness(operand, inst.op == Op::ConvertSToF)?;
                let expr = self.construct(ty, vec![operand])?;
                self.define(id, ty, expr, true)?;
            }
            Op::ConvertFToS | Op::ConvertFToU => {
                inst.expect(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let signed = inst.op == Op::ConvertFToS;
                let (operand, operand_ty) = self.value(ops[2])?;
                match self.parser.scalar_info(operand_ty) {
                    Some((scalar, _)) if scalar.is_float() => {}
                    _ if signed => return Err(Error::ConvertToSignedOperand),
                    _ => return Err(Error::ConvertToUnsignedOperand),
                }
                if !signed && !matches!(self.parser.scalar_info(ty), Some((Scalar::U32, _))) {
                    return Err(Error::ConvertToUnsignedResult);
                }
                let natural = self.parser.with_signedness(ty, signed);
                let expr = self.construct(natural, vec![operand])?;
                let expr = self.reconcile(expr, natural, ty)?;
                self.define(id, ty, expr, true)?;
            }
            Op::FConvert => {
                inst.expect(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let (operand, _) = self.value(ops[2])?;
                let expr = self.construct(ty, vec![operand])?;
                self.define(id, ty, expr, true)?;
            }
            Op::Bitcast => {
                inst.expect(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let (operand, _) = self.value(ops[2])?;
                let expr = self.bitcast(operand, ty)?;
                self.define(id, ty, expr, true)?;
            }
            Op::Select => {
                inst.expect(6)?;
                let (ty, id) = (ops[0], ops[1]);
                let (condition, _) = self.value(ops[2])?;
                let (accept, _) = self.value(ops[3])?;
                let (reject, _) = self.value(ops[4])?;
                let expr = self.builtin(Bf::Select, vec![reject, accept, condition]);
                self.define(id, ty, expr, true)?;
            }
            Op::FMod => {
                // x - y * floor(x / y), which takes the sign of y.
                inst.expect(5)?;
                let (ty, id) = (ops[0], ops[1]);
                let (x, _) = self.value(ops[2])?;
                let (y, _) = self.value(ops[3])?;
                let (x2, _) = self.value(ops[2])?;
                let (y2, _) = self.value(ops[3])?;
                let quotient = self.binary(BinaryOperator::Divide, x2, y2);
                let floor = self.builtin(Bf::Floor, vec![quotient]);
                let product = self.binary(BinaryOperator::Multiply, y, floor);
                let expr = self.binary(BinaryOperator::Subtract, x, product);
                self.define(id, ty, expr, true)?;
            }
            Op::OuterProduct => self.outer_product(inst)?,
            Op::ArrayLength => {
                inst.expect(5)?;
                let (ty, id) = (ops[0], ops[1]);
                let (structure, pointer_ty) = self.reference(ops[2])?;
                let struct_ty = self.pointee(pointer_ty)?;
                let name = self.parser.member_name(struct_ty, ops[3]);
                let member = self.member(structure, &name);
                let address = self.unary(UnaryOperator::AddressOf, member);
                let expr = self.builtin(Bf::ArrayLength, vec![address]);
                let u32_ty = self.parser.shaped_type(Scalar::U32, 1);
                let expr = self.reconcile(expr, u32_ty, ty)?;
                self.define(id, ty, expr, false)?;
            }
            Op::FunctionCall => self.call(inst)?,
            Op::ExtInst => self.ext_inst(inst)?,
            Op::ControlBarrier => self.control_barrier(inst)?,
            op => return Err(Error::UnsupportedInstruction(ModuleState::Function, op)),
        }
        Ok(())
    }

    fn binary_instruction(
        &mut self,
        ty: Word,
        id: Word,
        a: Word,
        b: Word,
        op: BinaryOperator,
        operands: Operands,
    ) -> Result<(), Error> {
        let left = self.value(a)?;
        let right = self.value(b)?;
        let ((left, left_ty), (right, _)) = match operands {
            Operands::Keep => (left, right),
            Operands::FollowFirst => {
                let signed = matches!(self.parser.scalar_info(left.1), Some((Scalar::I32, _)));
                let right = self.force_signedness(right, signed)?;
                (left, right)
            }
            Operands::Signed | Operands::Unsigned => {
                let signed = operands == Operands::Signed;
                (
                    self.force_signedness(left, signed)?,
                    self.force_signedness(right, signed)?,
                )
            }
            Operands::Shift(signed) => {
                let left = match signed {
                    Some(signed) => self.force_signedness(left, signed)?,
                    None => left,
                };
                (left, self.force_signedness(right, false)?)
            }
        };
        let mut expr = self.binary(op, left, right);
        if !op.is_comparison() {
            expr = self.reconcile(expr, left_ty, ty)?;
        }
        self.define(id, ty, expr, true)
    }

    fn vector_shuffle(&mut self, inst: &Instruction) -> Result<(), Error> {
        inst.expect_at_least(5)?;
        let ops = &inst.operands;
        let (ty, id) = (ops[0], ops[1]);
        let components = &ops[4..];
        let first_size = self
            .value_type(ops[2])
            .and_then(|ty| self.parser.scalar_info(ty))
            .map_or(0, |(_, size)| size);

        // A swizzle when every component comes from the same vector.
        let swizzle_of = if components.iter().all(|&c| c < first_size) {
            Some((ops[2], 0))
        } else if components.iter().all(|&c| c >= first_size && c != Word::MAX) {
            Some((ops[3], first_size))
        } else {
            None
        };
        if let Some((source, offset)) = swizzle_of {
            if components.len() <= 4 && components.iter().all(|&c| c - offset < 4) {
                let swizzle = components
                    .iter()
                    .map(|&c| ['x', 'y', 'z', 'w'][(c - offset) as usize])
                    .collect::<String>();
                let (vector, _) = self.value(source)?;
                let expr = self.member(vector, &swizzle);
                return self.define(id, ty, expr, true);
            }
        }

        let scalar = match self.parser.scalar_info(ty) {
            Some((scalar, _)) => scalar,
            None => return Err(Error::InvalidAccessType(ty)),
        };
        let mut arguments = Vec::with_capacity(components.len());
        for &component in components {
            let expr = if component == Word::MAX {
                self.literal(scalar.zero())
            } else {
                let (source, index) = if component < first_size {
                    (ops[2], component)
                } else {
                    (ops[3], component - first_size)
                };
                if index > 3 {
                    return Err(Error::InvalidComponentIndex(index));
                }
                let (vector, _) = self.value(source)?;
                self.member(vector, &"xyzw"[index as usize..=index as usize])
            };
            arguments.push(expr);
        }
        let expr = self.construct(ty, arguments)?;
        self.define(id, ty, expr, true)
    }

    fn outer_product(&mut self, inst: &Instruction) -> Result<(), Error> {
        inst.expect(5)?;
        let ops = &inst.operands;
        let (ty, id) = (ops[0], ops[1]);
        let (columns, rows, scalar) = match *self.parser.lookup_type(ty)? {
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => (columns, rows, scalar),
            _ => return Err(Error::InvalidAccessType(ty)),
        };
        let column_ty = self.parser.shaped_type(scalar, rows);
        let mut column_exprs = Vec::with_capacity(columns as usize);
        for column in 0..columns as usize {
            let mut products = Vec::with_capacity(rows as usize);
            for row in 0..rows as usize {
                let (a, _) = self.value(ops[2])?;
                let a = self.member(a, &"xyzw"[row..=row]);
                let (b, _) = self.value(ops[3])?;
                let b = self.member(b, &"xyzw"[column..=column]);
                products.push(self.binary(BinaryOperator::Multiply, a, b));
            }
            column_exprs.push(self.construct(column_ty, products)?);
        }
        let expr = self.construct(ty, column_exprs)?;
        self.define(id, ty, expr, true)
    }

    fn call(&mut self, inst: &Instruction) -> Result<(), Error> {
        inst.expect_at_least(4)?;
        let ops = &inst.operands;
        let (ty, id, callee) = (ops[0], ops[1], ops[2]);
        let name = self
            .parser
            .function_names
            .get(&callee)
            .cloned()
            .ok_or(Error::InvalidId(callee))?;
        let param_types = self.parser.function_parameter_types(callee)?;
        if param_types.len() != ops.len() - 3 {
            return Err(Error::WrongFunctionArgumentType(callee));
        }
        let mut arguments = Vec::with_capacity(param_types.len());
        for (&arg, &param_ty) in ops[3..].iter().zip(param_types.iter()) {
            let expr = if let Type::Pointer { .. } = *self.parser.lookup_type(param_ty)? {
                let (reference, _) = self.reference(arg)?;
                let pointer = match *self.parser.module.expression(reference) {
                    ExpressionKind::Unary {
                        op: UnaryOperator::Deref,
                        expr,
                    } => Some(expr),
                    _ => None,
                };
                match pointer {
                    Some(pointer) => pointer,
                    None => self.unary(UnaryOperator::AddressOf, reference),
                }
            } else {
                let (expr, arg_ty) = self.value(arg)?;
                self.reconcile(expr, arg_ty, param_ty)?
            };
            arguments.push(expr);
        }
        let callee_expr = self.parser.module.ident_expr(name, Span::UNDEFINED);
        let call = self
            .parser
            .module
            .call_expr(callee_expr, arguments, Span::UNDEFINED);
        if let Type::Void = *self.parser.lookup_type(ty)? {
            self.push(StatementKind::Call(call));
            Ok(())
        } else {
            self.define(id, ty, call, false)
        }
    }

    fn control_barrier(&mut self, inst: &Instruction) -> Result<(), Error> {
        use spirv::MemorySemantics as Ms;

        inst.expect(4)?;
        let ops = &inst.operands;
        let parser: &Parser = self.parser;
        let constant = |id: Word| parser.constant_u32(id).ok_or(Error::InvalidId(id));
        let execution = constant(ops[0])?;
        let memory = constant(ops[1])?;
        let semantics_word = constant(ops[2])?;
        let workgroup = spirv::Scope::Workgroup as u32;

        if execution != workgroup {
            return Err(Error::BarrierExecutionScope);
        }
        let mut semantics =
            Ms::from_bits(semantics_word).ok_or(Error::BarrierSemantics(semantics_word))?;
        if !semantics.contains(Ms::ACQUIRE_RELEASE) {
            return Err(Error::BarrierAcquireRelease);
        }
        semantics.remove(Ms::ACQUIRE_RELEASE);
        if semantics.contains(Ms::WORKGROUP_MEMORY) {
            if memory != workgroup {
                return Err(Error::WorkgroupBarrierScope);
            }
            let call = self.builtin(Bf::WorkgroupBarrier, Vec::new());
            self.push(StatementKind::Call(call));
            semantics.remove(Ms::WORKGROUP_MEMORY);
        }
        if semantics.contains(Ms::UNIFORM_MEMORY) {
            if memory != workgroup {
                return Err(Error::StorageBarrierScope);
            }
            let call = self.builtin(Bf::StorageBarrier, Vec::new());
            self.push(StatementKind::Call(call));
            semantics.remove(Ms::UNIFORM_MEMORY);
        }
        if !semantics.is_empty() {
            return Err(Error::BarrierSemantics(semantics.bits()));
        }
        Ok(())
    }
}
