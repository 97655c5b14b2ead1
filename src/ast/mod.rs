/*!
The abstract syntax tree shared by the WGSL and SPIR-V front ends.

A [`Module`] owns every node of one program. Expressions live in a single
[`Arena`] and refer to their operands by [`Handle`]; statements are owned
directly by the [`Block`] that contains them, and declarations by the module's
declaration arena. Nothing in the tree points back up to its parent.

Types are not a separate node kind. A type is written as an identifier with
optional template arguments, so `array<vec4<f32>, 4>` is an
[`ExpressionKind::Ident`] named `array` whose template arguments are another
`Ident` expression and an integer literal. The resolver decides which
identifiers name types.

Every node carries a [`NodeId`]: the [`ProgramId`] of the module that created
it plus an index unique within that module. [`clone`] copies nodes between
modules and hands out fresh ids owned by the destination.
*/

pub mod clone;

use crate::{diagnostic::filter, Arena, FastHashMap, Handle, Span};

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

/// Identifies one program (one [`Module`]) for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ProgramId(u32);

impl ProgramId {
    /// Allocate an id no other program in this process has.
    pub fn new() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        ProgramId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// The identity of a single node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct NodeId {
    pub program: ProgramId,
    pub index: u32,
}

/// A name as written in source.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Ident {
            name: name.into(),
            span,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Literal {
    Bool(bool),
    /// An integer literal without a suffix.
    AbstractInt(i64),
    /// A float literal without a suffix.
    AbstractFloat(f64),
    I32(i32),
    U32(u32),
    F32(f32),
    /// A `h`-suffixed literal. Stored widened, always within the f16 range.
    F16(f32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum UnaryOperator {
    Negate,
    LogicalNot,
    Complement,
    /// `*p`
    Deref,
    /// `&v`
    AddressOf,
}

impl UnaryOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Negate => "-",
            Self::LogicalNot => "!",
            Self::Complement => "~",
            Self::Deref => "*",
            Self::AddressOf => "&",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
    LogicalAnd,
    LogicalOr,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        }
    }

    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
        )
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, Self::LogicalAnd | Self::LogicalOr)
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Expression {
    pub id: NodeId,
    pub kind: ExpressionKind,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum ExpressionKind {
    Literal(Literal),
    /// A use of a name, possibly templated: `x`, `vec3<f32>`, `array<u32, 4>`.
    Ident {
        ident: Ident,
        template_args: Vec<Handle<Expression>>,
    },
    /// A function call, builtin call, type constructor or conversion. The
    /// callee is always an [`ExpressionKind::Ident`].
    Call {
        callee: Handle<Expression>,
        arguments: Vec<Handle<Expression>>,
    },
    Bitcast {
        ty: Handle<Expression>,
        expr: Handle<Expression>,
    },
    Unary {
        op: UnaryOperator,
        expr: Handle<Expression>,
    },
    Binary {
        op: BinaryOperator,
        left: Handle<Expression>,
        right: Handle<Expression>,
    },
    Index {
        base: Handle<Expression>,
        index: Handle<Expression>,
    },
    Member {
        base: Handle<Expression>,
        member: Ident,
    },
    /// The `_` on the left of a phony assignment.
    Phony,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Attribute {
    pub id: NodeId,
    pub span: Span,
    pub kind: AttributeKind,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum AttributeKind {
    Align(Handle<Expression>),
    Binding(Handle<Expression>),
    Builtin(Handle<Expression>),
    Compute,
    Diagnostic(DiagnosticControl),
    Fragment,
    Group(Handle<Expression>),
    Id(Handle<Expression>),
    Interpolate {
        ty: Handle<Expression>,
        sampling: Option<Handle<Expression>>,
    },
    Invariant,
    Location(Handle<Expression>),
    MustUse,
    Size(Handle<Expression>),
    Vertex,
    WorkgroupSize {
        x: Handle<Expression>,
        y: Option<Handle<Expression>>,
        z: Option<Handle<Expression>>,
    },
}

impl AttributeKind {
    /// The attribute's name as written after `@`.
    pub const fn name(&self) -> &'static str {
        match *self {
            Self::Align(_) => "align",
            Self::Binding(_) => "binding",
            Self::Builtin(_) => "builtin",
            Self::Compute => "compute",
            Self::Diagnostic(_) => "diagnostic",
            Self::Fragment => "fragment",
            Self::Group(_) => "group",
            Self::Id(_) => "id",
            Self::Interpolate { .. } => "interpolate",
            Self::Invariant => "invariant",
            Self::Location(_) => "location",
            Self::MustUse => "must_use",
            Self::Size(_) => "size",
            Self::Vertex => "vertex",
            Self::WorkgroupSize { .. } => "workgroup_size",
        }
    }
}

/// The rule name of a `diagnostic(severity, rule)` control.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct DiagnosticRuleName {
    pub category: Option<Ident>,
    pub name: Ident,
}

impl DiagnosticRuleName {
    pub fn key(&self) -> filter::RuleKey {
        filter::RuleKey::new(
            self.category.as_ref().map(|c| c.name.as_str()),
            &self.name.name,
        )
    }

    pub fn span(&self) -> Span {
        match self.category {
            Some(ref category) => category.span.until(&self.name.span),
            None => self.name.span,
        }
    }
}

impl fmt::Display for DiagnosticRuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            Some(ref category) => write!(f, "{}.{}", category.name, self.name.name),
            None => f.write_str(&self.name.name),
        }
    }
}

/// The `(severity, rule)` pair shared by directives and attributes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct DiagnosticControl {
    pub severity: filter::Severity,
    pub rule: DiagnosticRuleName,
}

/// An extension named by an `enable` directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum ExtensionKind {
    ChromiumDisableUniformityAnalysis,
    ChromiumExperimentalDp4a,
    ChromiumExperimentalFullPtrParameters,
    ChromiumExperimentalPushConstant,
    ChromiumInternalRelaxedUniformLayout,
    F16,
}

impl ExtensionKind {
    /// Every extension, sorted by name.
    pub const ALL: &'static [Self] = &[
        Self::ChromiumDisableUniformityAnalysis,
        Self::ChromiumExperimentalDp4a,
        Self::ChromiumExperimentalFullPtrParameters,
        Self::ChromiumExperimentalPushConstant,
        Self::ChromiumInternalRelaxedUniformLayout,
        Self::F16,
    ];

    /// The spelling of each of [`Self::ALL`], in the same order.
    pub const NAMES: &'static [&'static str] = &[
        "chromium_disable_uniformity_analysis",
        "chromium_experimental_dp4a",
        "chromium_experimental_full_ptr_parameters",
        "chromium_experimental_push_constant",
        "chromium_internal_relaxed_uniform_layout",
        "f16",
    ];

    pub const fn to_ident(self) -> &'static str {
        match self {
            Self::ChromiumDisableUniformityAnalysis => "chromium_disable_uniformity_analysis",
            Self::ChromiumExperimentalDp4a => "chromium_experimental_dp4a",
            Self::ChromiumExperimentalFullPtrParameters => {
                "chromium_experimental_full_ptr_parameters"
            }
            Self::ChromiumExperimentalPushConstant => "chromium_experimental_push_constant",
            Self::ChromiumInternalRelaxedUniformLayout => {
                "chromium_internal_relaxed_uniform_layout"
            }
            Self::F16 => "f16",
        }
    }

    pub fn from_ident(word: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|ext| ext.to_ident() == word)
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Extension {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExtensionKind,
}

/// A language feature named by a `requires` directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum LanguageFeature {
    PointerCompositeAccess,
    ReadonlyAndReadwriteStorageTextures,
    UnrestrictedPointerParameters,
}

impl LanguageFeature {
    pub const ALL: &'static [Self] = &[
        Self::PointerCompositeAccess,
        Self::ReadonlyAndReadwriteStorageTextures,
        Self::UnrestrictedPointerParameters,
    ];

    pub const fn to_ident(self) -> &'static str {
        match self {
            Self::PointerCompositeAccess => "pointer_composite_access",
            Self::ReadonlyAndReadwriteStorageTextures => "readonly_and_readwrite_storage_textures",
            Self::UnrestrictedPointerParameters => "unrestricted_pointer_parameters",
        }
    }

    pub fn from_ident(word: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.to_ident() == word)
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum VariableKind {
    /// `var<address_space, access>`; either template argument may be absent.
    Var {
        address_space: Option<Handle<Expression>>,
        access: Option<Handle<Expression>>,
    },
    Let,
    Const,
    Override,
}

impl VariableKind {
    pub const fn keyword(&self) -> &'static str {
        match *self {
            Self::Var { .. } => "var",
            Self::Let => "let",
            Self::Const => "const",
            Self::Override => "override",
        }
    }
}

/// A `var`, `let`, `const` or `override` declaration, at any scope.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Variable {
    pub name: Ident,
    pub kind: VariableKind,
    pub ty: Option<Handle<Expression>>,
    pub initializer: Option<Handle<Expression>>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Parameter {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub ty: Handle<Expression>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Function {
    pub name: Ident,
    pub params: Vec<Parameter>,
    pub return_type: Option<Handle<Expression>>,
    pub return_attributes: Vec<Attribute>,
    pub attributes: Vec<Attribute>,
    pub body: Block,
}

impl Function {
    /// The pipeline stage, if this is an entry point.
    pub fn stage(&self) -> Option<ShaderStage> {
        self.attributes.iter().find_map(|attr| match attr.kind {
            AttributeKind::Vertex => Some(ShaderStage::Vertex),
            AttributeKind::Fragment => Some(ShaderStage::Fragment),
            AttributeKind::Compute => Some(ShaderStage::Compute),
            _ => None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct StructMember {
    pub id: NodeId,
    pub span: Span,
    pub name: Ident,
    pub ty: Handle<Expression>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Struct {
    pub name: Ident,
    pub members: Vec<StructMember>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Alias {
    pub name: Ident,
    pub ty: Handle<Expression>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum TypeDecl {
    Struct(Struct),
    Alias(Alias),
}

impl TypeDecl {
    pub const fn name(&self) -> &Ident {
        match *self {
            Self::Struct(ref s) => &s.name,
            Self::Alias(ref a) => &a.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct GlobalDecl {
    pub id: NodeId,
    pub kind: GlobalDeclKind,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum GlobalDeclKind {
    DiagnosticDirective(DiagnosticControl),
    Enable { extensions: Vec<Extension> },
    Requires { features: Vec<(LanguageFeature, Span)> },
    Function(Function),
    Variable(Variable),
    TypeDecl(TypeDecl),
    ConstAssert(Handle<Expression>),
}

impl GlobalDeclKind {
    /// The name this declaration introduces at module scope, if any.
    pub const fn name(&self) -> Option<&Ident> {
        match *self {
            Self::Function(ref f) => Some(&f.name),
            Self::Variable(ref v) => Some(&v.name),
            Self::TypeDecl(ref t) => Some(t.name()),
            Self::DiagnosticDirective(_)
            | Self::Enable { .. }
            | Self::Requires { .. }
            | Self::ConstAssert(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Block {
    pub id: NodeId,
    pub span: Span,
    pub statements: Vec<Statement>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Statement {
    pub id: NodeId,
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct If {
    pub condition: Handle<Expression>,
    pub accept: Block,
    /// Either another [`StatementKind::If`] (for `else if`) or a
    /// [`StatementKind::Block`].
    pub reject: Option<Box<Statement>>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum CaseSelector {
    Default,
    Expr(Handle<Expression>),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct SwitchCase {
    pub id: NodeId,
    pub span: Span,
    pub selectors: Vec<CaseSelector>,
    pub body: Block,
}

impl SwitchCase {
    pub fn is_default(&self) -> bool {
        self.selectors
            .iter()
            .any(|sel| matches!(*sel, CaseSelector::Default))
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Switch {
    pub selector: Handle<Expression>,
    pub cases: Vec<SwitchCase>,
    pub attributes: Vec<Attribute>,
    pub body_attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Loop {
    pub body: Block,
    /// The `continuing` block. A trailing `break if` is a
    /// [`StatementKind::BreakIf`] at its end.
    pub continuing: Option<Block>,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct For {
    pub init: Option<Box<Statement>>,
    pub condition: Option<Handle<Expression>>,
    pub update: Option<Box<Statement>>,
    pub body: Block,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct While {
    pub condition: Handle<Expression>,
    pub body: Block,
    pub attributes: Vec<Attribute>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum StatementKind {
    Block(Block),
    If(If),
    Switch(Switch),
    Loop(Loop),
    For(For),
    While(While),
    Break,
    BreakIf(Handle<Expression>),
    Continue,
    Return(Option<Handle<Expression>>),
    Discard,
    Declaration(Variable),
    /// `lhs = rhs`, or `lhs op= rhs` when `op` is set.
    Assignment {
        lhs: Handle<Expression>,
        op: Option<BinaryOperator>,
        rhs: Handle<Expression>,
    },
    Increment(Handle<Expression>),
    Decrement(Handle<Expression>),
    Call(Handle<Expression>),
    ConstAssert(Handle<Expression>),
}

/// The root of one program's syntax tree.
///
/// Declarations are stored once, in source order, and additionally indexed
/// by kind. The per-kind lists and the type name index are only updated
/// through [`Module::add_global_declaration`], so they always agree with the
/// declaration arena.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Module {
    program: ProgramId,
    next_node: u32,
    expressions: Arena<Expression>,
    declarations: Arena<GlobalDecl>,
    type_decls: Vec<Handle<GlobalDecl>>,
    functions: Vec<Handle<GlobalDecl>>,
    global_variables: Vec<Handle<GlobalDecl>>,
    diagnostic_directives: Vec<Handle<GlobalDecl>>,
    enables: Vec<Handle<GlobalDecl>>,
    requires: Vec<Handle<GlobalDecl>>,
    const_asserts: Vec<Handle<GlobalDecl>>,
    #[cfg_attr(feature = "serialize", serde(skip))]
    type_index: FastHashMap<String, Handle<GlobalDecl>>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        Module {
            program: ProgramId::new(),
            next_node: 0,
            expressions: Arena::new(),
            declarations: Arena::new(),
            type_decls: Vec::new(),
            functions: Vec::new(),
            global_variables: Vec::new(),
            diagnostic_directives: Vec::new(),
            enables: Vec::new(),
            requires: Vec::new(),
            const_asserts: Vec::new(),
            type_index: FastHashMap::default(),
        }
    }

    pub const fn program(&self) -> ProgramId {
        self.program
    }

    /// Allocate a fresh node id owned by this module.
    pub fn next_id(&mut self) -> NodeId {
        let index = self.next_node;
        self.next_node += 1;
        NodeId {
            program: self.program,
            index,
        }
    }

    pub fn add_expression(&mut self, kind: ExpressionKind, span: Span) -> Handle<Expression> {
        let id = self.next_id();
        self.expressions.append(Expression { id, kind }, span)
    }

    /// Append a declaration, keeping the per-kind views in step.
    pub fn add_global_declaration(
        &mut self,
        kind: GlobalDeclKind,
        span: Span,
    ) -> Handle<GlobalDecl> {
        let id = self.next_id();
        let type_name = match kind {
            GlobalDeclKind::TypeDecl(ref decl) => Some(decl.name().name.clone()),
            _ => None,
        };
        let list = match kind {
            GlobalDeclKind::DiagnosticDirective(_) => &mut self.diagnostic_directives,
            GlobalDeclKind::Enable { .. } => &mut self.enables,
            GlobalDeclKind::Requires { .. } => &mut self.requires,
            GlobalDeclKind::Function(_) => &mut self.functions,
            GlobalDeclKind::Variable(_) => &mut self.global_variables,
            GlobalDeclKind::TypeDecl(_) => &mut self.type_decls,
            GlobalDeclKind::ConstAssert(_) => &mut self.const_asserts,
        };
        let handle = self.declarations.append(GlobalDecl { id, kind }, span);
        list.push(handle);
        if let Some(name) = type_name {
            self.type_index.entry(name).or_insert(handle);
        }
        handle
    }

    pub const fn expressions(&self) -> &Arena<Expression> {
        &self.expressions
    }

    pub fn expression(&self, handle: Handle<Expression>) -> &ExpressionKind {
        &self.expressions[handle].kind
    }

    pub fn expression_span(&self, handle: Handle<Expression>) -> Span {
        self.expressions.get_span(handle)
    }

    pub const fn declarations(&self) -> &Arena<GlobalDecl> {
        &self.declarations
    }

    pub fn declaration(&self, handle: Handle<GlobalDecl>) -> &GlobalDecl {
        &self.declarations[handle]
    }

    pub fn declaration_span(&self, handle: Handle<GlobalDecl>) -> Span {
        self.declarations.get_span(handle)
    }

    /// The first type declaration named `name`.
    pub fn find_type(&self, name: &str) -> Option<&TypeDecl> {
        let handle = *self.type_index.get(name)?;
        match self.declarations[handle].kind {
            GlobalDeclKind::TypeDecl(ref decl) => Some(decl),
            _ => None,
        }
    }

    pub fn type_decls(&self) -> impl Iterator<Item = &TypeDecl> + '_ {
        self.type_decls
            .iter()
            .filter_map(move |&h| match self.declarations[h].kind {
                GlobalDeclKind::TypeDecl(ref decl) => Some(decl),
                _ => None,
            })
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> + '_ {
        self.functions
            .iter()
            .filter_map(move |&h| match self.declarations[h].kind {
                GlobalDeclKind::Function(ref f) => Some(f),
                _ => None,
            })
    }

    pub fn global_variables(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.global_variables
            .iter()
            .filter_map(move |&h| match self.declarations[h].kind {
                GlobalDeclKind::Variable(ref v) => Some(v),
                _ => None,
            })
    }

    pub fn diagnostic_directives(&self) -> impl Iterator<Item = &DiagnosticControl> + '_ {
        self.diagnostic_directives
            .iter()
            .filter_map(move |&h| match self.declarations[h].kind {
                GlobalDeclKind::DiagnosticDirective(ref d) => Some(d),
                _ => None,
            })
    }

    pub fn enables(&self) -> impl Iterator<Item = &[Extension]> + '_ {
        self.enables
            .iter()
            .filter_map(move |&h| match self.declarations[h].kind {
                GlobalDeclKind::Enable { ref extensions } => Some(extensions.as_slice()),
                _ => None,
            })
    }

    pub fn requires(&self) -> impl Iterator<Item = &[(LanguageFeature, Span)]> + '_ {
        self.requires
            .iter()
            .filter_map(move |&h| match self.declarations[h].kind {
                GlobalDeclKind::Requires { ref features } => Some(features.as_slice()),
                _ => None,
            })
    }

    pub fn const_asserts(&self) -> impl Iterator<Item = Handle<Expression>> + '_ {
        self.const_asserts
            .iter()
            .filter_map(move |&h| match self.declarations[h].kind {
                GlobalDeclKind::ConstAssert(expr) => Some(expr),
                _ => None,
            })
    }

    /// Whether any `enable` directive names `extension`.
    pub fn has_extension(&self, extension: ExtensionKind) -> bool {
        self.enables()
            .flatten()
            .any(|ext| ext.kind == extension)
    }

    // Builders for the common leaf expressions.

    pub fn ident_expr(&mut self, name: impl Into<String>, span: Span) -> Handle<Expression> {
        self.add_expression(
            ExpressionKind::Ident {
                ident: Ident::new(name, span),
                template_args: Vec::new(),
            },
            span,
        )
    }

    pub fn templated_ident_expr(
        &mut self,
        name: impl Into<String>,
        template_args: Vec<Handle<Expression>>,
        span: Span,
    ) -> Handle<Expression> {
        self.add_expression(
            ExpressionKind::Ident {
                ident: Ident::new(name, span),
                template_args,
            },
            span,
        )
    }

    pub fn literal_expr(&mut self, literal: Literal, span: Span) -> Handle<Expression> {
        self.add_expression(ExpressionKind::Literal(literal), span)
    }

    pub fn call_expr(
        &mut self,
        callee: Handle<Expression>,
        arguments: Vec<Handle<Expression>>,
        span: Span,
    ) -> Handle<Expression> {
        self.add_expression(ExpressionKind::Call { callee, arguments }, span)
    }

    pub fn block(&mut self, statements: Vec<Statement>, span: Span) -> Block {
        Block {
            id: self.next_id(),
            span,
            statements,
            attributes: Vec::new(),
        }
    }

    pub fn statement(&mut self, kind: StatementKind, span: Span) -> Statement {
        Statement {
            id: self.next_id(),
            span,
            kind,
        }
    }

    /// Deep-copy the expression tree rooted at `handle` within this module.
    ///
    /// Every node of a tree has exactly one parent, so an expression that is
    /// needed in two places must be duplicated rather than shared.
    pub fn duplicate_expression(&mut self, handle: Handle<Expression>) -> Handle<Expression> {
        let span = self.expression_span(handle);
        let kind = match self.expression(handle).clone() {
            ExpressionKind::Ident {
                ident,
                template_args,
            } => ExpressionKind::Ident {
                ident,
                template_args: template_args
                    .into_iter()
                    .map(|arg| self.duplicate_expression(arg))
                    .collect(),
            },
            ExpressionKind::Call { callee, arguments } => ExpressionKind::Call {
                callee: self.duplicate_expression(callee),
                arguments: arguments
                    .into_iter()
                    .map(|arg| self.duplicate_expression(arg))
                    .collect(),
            },
            ExpressionKind::Bitcast { ty, expr } => ExpressionKind::Bitcast {
                ty: self.duplicate_expression(ty),
                expr: self.duplicate_expression(expr),
            },
            ExpressionKind::Unary { op, expr } => ExpressionKind::Unary {
                op,
                expr: self.duplicate_expression(expr),
            },
            ExpressionKind::Binary { op, left, right } => ExpressionKind::Binary {
                op,
                left: self.duplicate_expression(left),
                right: self.duplicate_expression(right),
            },
            ExpressionKind::Index { base, index } => ExpressionKind::Index {
                base: self.duplicate_expression(base),
                index: self.duplicate_expression(index),
            },
            ExpressionKind::Member { base, member } => ExpressionKind::Member {
                base: self.duplicate_expression(base),
                member,
            },
            kind @ (ExpressionKind::Literal(_) | ExpressionKind::Phony) => kind,
        };
        self.add_expression(kind, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias(module: &mut Module, name: &str) -> GlobalDeclKind {
        let ty = module.ident_expr("f32", Span::UNDEFINED);
        GlobalDeclKind::TypeDecl(TypeDecl::Alias(Alias {
            name: Ident::new(name, Span::UNDEFINED),
            ty,
        }))
    }

    #[test]
    fn node_ids_are_unique_and_owned() {
        let mut a = Module::new();
        let b = Module::new();
        assert_ne!(a.program(), b.program());
        let first = a.next_id();
        let second = a.next_id();
        assert_ne!(first, second);
        assert_eq!(first.program, a.program());
    }

    #[test]
    fn per_kind_views_follow_insertion() {
        let mut module = Module::new();
        let kind = alias(&mut module, "A");
        let a = module.add_global_declaration(kind, Span::new(0, 10));
        let cond = module.literal_expr(Literal::Bool(true), Span::UNDEFINED);
        module.add_global_declaration(GlobalDeclKind::ConstAssert(cond), Span::new(11, 20));
        let kind = alias(&mut module, "B");
        module.add_global_declaration(kind, Span::new(21, 30));

        assert_eq!(module.declarations().len(), 3);
        assert_eq!(module.type_decls().count(), 2);
        assert_eq!(module.const_asserts().count(), 1);
        assert_eq!(module.find_type("A").map(|t| t.name().name.as_str()), Some("A"));
        assert!(module.find_type("C").is_none());
        assert_eq!(module.declaration_span(a), Span::new(0, 10));
    }

    #[test]
    fn duplicated_expressions_are_fresh_nodes() {
        let mut module = Module::new();
        let base = module.ident_expr("v", Span::UNDEFINED);
        let index = module.literal_expr(Literal::I32(1), Span::UNDEFINED);
        let access = module.add_expression(ExpressionKind::Index { base, index }, Span::new(3, 7));
        let copy = module.duplicate_expression(access);
        assert_ne!(copy, access);
        assert_eq!(module.expression_span(copy), Span::new(3, 7));
        match *module.expression(copy) {
            ExpressionKind::Index {
                base: copy_base,
                index: copy_index,
            } => {
                assert_ne!(copy_base, base);
                assert_ne!(copy_index, index);
                assert_eq!(module.expression(copy_base), module.expression(base));
            }
            ref other => panic!("unexpected copy {other:?}"),
        }
        assert_ne!(
            module.expressions()[copy].id,
            module.expressions()[access].id
        );
    }

    #[test]
    fn duplicate_enables_are_kept() {
        let mut module = Module::new();
        for _ in 0..2 {
            let id = module.next_id();
            let extensions = vec![Extension {
                id,
                span: Span::UNDEFINED,
                kind: ExtensionKind::F16,
            }];
            module.add_global_declaration(GlobalDeclKind::Enable { extensions }, Span::UNDEFINED);
        }
        assert_eq!(module.enables().count(), 2);
        assert!(module.has_extension(ExtensionKind::F16));
    }
}
