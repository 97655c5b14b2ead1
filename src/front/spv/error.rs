use super::ModuleState;

#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error("Invalid SPIR-V magic number")]
    InvalidMagicNumber,
    #[error("SPIR-V header is incomplete")]
    InvalidHeader,
    #[error("invalid word count")]
    InvalidWordCount,
    #[error("incomplete data")]
    IncompleteData,
    #[error("unknown instruction {0}")]
    UnknownInstruction(u16),
    #[error("unknown capability %{0}")]
    UnknownCapability(spirv::Word),
    #[error("unsupported instruction {1:?} at {0:?}")]
    UnsupportedInstruction(ModuleState, spirv::Op),
    #[error("unsupported capability {0:?}")]
    UnsupportedCapability(spirv::Capability),
    #[error("unsupported extension {0}")]
    UnsupportedExtension(String),
    #[error("unsupported extended instruction set {0}")]
    UnsupportedExtSet(String),
    #[error("unsupported extended instruction {0} of GLSL.std.450")]
    UnsupportedExtInst(spirv::Word),
    #[error("unsupported type %{0}")]
    UnsupportedType(spirv::Word),
    #[error("unsupported execution model {0}")]
    UnsupportedExecutionModel(spirv::Word),
    #[error("unsupported storage class {0}")]
    UnsupportedStorageClass(spirv::Word),
    #[error("unsupported image dimension {0}")]
    UnsupportedImageDim(spirv::Word),
    #[error("unsupported image format {0}")]
    UnsupportedImageFormat(spirv::Word),
    #[error("unsupported image operands {0:#x}")]
    UnsupportedImageOperands(spirv::Word),
    #[error("unsupported builtin {0}")]
    UnsupportedBuiltIn(spirv::Word),
    #[error("unsupported control flow at block %{0}: {1}")]
    UnsupportedControlFlow(spirv::Word, &'static str),
    #[error("invalid operand count {1} for {0:?}")]
    InvalidOperandCount(spirv::Op, u16),
    #[error("invalid id %{0}")]
    InvalidId(spirv::Word),
    #[error("unhandled expression for ID {0}")]
    UnhandledExpression(spirv::Word),
    #[error("invalid decoration {0}")]
    InvalidDecoration(spirv::Word),
    #[error("invalid type width {0}")]
    InvalidTypeWidth(spirv::Word),
    #[error("invalid vector size {0}")]
    InvalidVectorSize(spirv::Word),
    #[error("invalid access into type %{0}")]
    InvalidAccessType(spirv::Word),
    #[error("access index into struct %{0} must be a constant")]
    InvalidAccessIndex(spirv::Word),
    #[error("vector component index is larger than 3: {0}")]
    InvalidComponentIndex(u32),
    #[error("array length %{0} must be a constant")]
    InvalidArraySize(spirv::Word),
    #[error("bad string")]
    BadString,
    #[error("function %{0} has no blocks")]
    EmptyFunction(spirv::Word),
    #[error("block %{0} is missing a terminator")]
    InvalidTerminator(spirv::Word),
    #[error("recursive function call %{0}")]
    FunctionCallCycle(spirv::Word),
    #[error("wrong function argument type %{0}")]
    WrongFunctionArgumentType(spirv::Word),
    #[error("incomplete handle usage for %{id}: {usage}")]
    IncompleteUsage { id: spirv::Word, usage: String },
    #[error("inconsistent handle usage for %{id}: {usage}")]
    InvalidUsage { id: spirv::Word, usage: String },
    #[error("operand for conversion to floating point must be integral scalar or vector")]
    ConvertToFloatOperand,
    #[error("operand for conversion to signed integer must be floating point scalar or vector")]
    ConvertToSignedOperand,
    #[error("operand for conversion to unsigned integer must be floating point scalar or vector")]
    ConvertToUnsignedOperand,
    #[error("Expected unsigned int scalar or vector type as Result Type: ConvertFToU")]
    ConvertToUnsignedResult,
    #[error("Expected Base Type to be equal to Result Type: BitReverse")]
    BitReverseTypeMismatch,
    #[error("unsupported control barrier execution scope")]
    BarrierExecutionScope,
    #[error("control barrier semantics requires acquire and release")]
    BarrierAcquireRelease,
    #[error("workgroupBarrier requires workgroup memory scope")]
    WorkgroupBarrierScope,
    #[error("storageBarrier requires workgroup memory scope")]
    StorageBarrierScope,
    #[error("unsupported control barrier semantics: {0:#x}")]
    BarrierSemantics(spirv::Word),
    #[error("{inner}\nat word {offset}: {disassembly}")]
    Instruction {
        /// Word offset of the instruction in the binary.
        offset: usize,
        disassembly: String,
        inner: Box<Error>,
    },
}

impl Error {
    /// The error without the instruction it was reported at.
    pub fn root(&self) -> &Error {
        match *self {
            Error::Instruction { ref inner, .. } => inner.root(),
            ref other => other,
        }
    }
}
