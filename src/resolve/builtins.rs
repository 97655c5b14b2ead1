/*!
Builtin functions and their overloads.

Most builtins are described by a table of [`Overload`]s whose parameters are
type patterns over one element type `T`. Texture builtins take arguments
whose meaning depends on the texture's dimension and class, and are matched
by hand in [`match_texture`].
*/

use super::types::{
    Access, AddressSpace, ArraySize, ImageClass, ImageDimension, PredeclaredType, Scalar, Type,
    VectorSize,
};

use std::fmt::{self, Write as _};

macro_rules! builtin_functions {
    ($($variant:ident = $name:literal,)*) => {
        /// A function the language predeclares.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serialize", derive(serde::Serialize))]
        #[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
        pub enum BuiltinFunction {
            $($variant,)*
        }

        impl BuiltinFunction {
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                Some(match name {
                    $($name => Self::$variant,)*
                    _ => return None,
                })
            }
        }
    };
}

builtin_functions! {
    Abs = "abs",
    Acos = "acos",
    Acosh = "acosh",
    All = "all",
    Any = "any",
    ArrayLength = "arrayLength",
    Asin = "asin",
    Asinh = "asinh",
    Atan = "atan",
    Atan2 = "atan2",
    Atanh = "atanh",
    AtomicAdd = "atomicAdd",
    AtomicAnd = "atomicAnd",
    AtomicCompareExchangeWeak = "atomicCompareExchangeWeak",
    AtomicExchange = "atomicExchange",
    AtomicLoad = "atomicLoad",
    AtomicMax = "atomicMax",
    AtomicMin = "atomicMin",
    AtomicOr = "atomicOr",
    AtomicStore = "atomicStore",
    AtomicSub = "atomicSub",
    AtomicXor = "atomicXor",
    Ceil = "ceil",
    Clamp = "clamp",
    Cos = "cos",
    Cosh = "cosh",
    CountLeadingZeros = "countLeadingZeros",
    CountOneBits = "countOneBits",
    CountTrailingZeros = "countTrailingZeros",
    Cross = "cross",
    Degrees = "degrees",
    Determinant = "determinant",
    Distance = "distance",
    Dot = "dot",
    Dot4I8Packed = "dot4I8Packed",
    Dot4U8Packed = "dot4U8Packed",
    Dpdx = "dpdx",
    DpdxCoarse = "dpdxCoarse",
    DpdxFine = "dpdxFine",
    Dpdy = "dpdy",
    DpdyCoarse = "dpdyCoarse",
    DpdyFine = "dpdyFine",
    Exp = "exp",
    Exp2 = "exp2",
    ExtractBits = "extractBits",
    FaceForward = "faceForward",
    FirstLeadingBit = "firstLeadingBit",
    FirstTrailingBit = "firstTrailingBit",
    Floor = "floor",
    Fma = "fma",
    Fract = "fract",
    Frexp = "frexp",
    Fwidth = "fwidth",
    FwidthCoarse = "fwidthCoarse",
    FwidthFine = "fwidthFine",
    InsertBits = "insertBits",
    InverseSqrt = "inverseSqrt",
    Ldexp = "ldexp",
    Length = "length",
    Log = "log",
    Log2 = "log2",
    Max = "max",
    Min = "min",
    Mix = "mix",
    Modf = "modf",
    Normalize = "normalize",
    Pack2x16Float = "pack2x16float",
    Pack2x16Snorm = "pack2x16snorm",
    Pack2x16Unorm = "pack2x16unorm",
    Pack4x8Snorm = "pack4x8snorm",
    Pack4x8Unorm = "pack4x8unorm",
    Pow = "pow",
    QuantizeToF16 = "quantizeToF16",
    Radians = "radians",
    Reflect = "reflect",
    Refract = "refract",
    ReverseBits = "reverseBits",
    Round = "round",
    Saturate = "saturate",
    Select = "select",
    Sign = "sign",
    Sin = "sin",
    Sinh = "sinh",
    Smoothstep = "smoothstep",
    Sqrt = "sqrt",
    Step = "step",
    StorageBarrier = "storageBarrier",
    Tan = "tan",
    Tanh = "tanh",
    TextureDimensions = "textureDimensions",
    TextureGather = "textureGather",
    TextureGatherCompare = "textureGatherCompare",
    TextureLoad = "textureLoad",
    TextureNumLayers = "textureNumLayers",
    TextureNumLevels = "textureNumLevels",
    TextureNumSamples = "textureNumSamples",
    TextureSample = "textureSample",
    TextureSampleBias = "textureSampleBias",
    TextureSampleCompare = "textureSampleCompare",
    TextureSampleCompareLevel = "textureSampleCompareLevel",
    TextureSampleGrad = "textureSampleGrad",
    TextureSampleLevel = "textureSampleLevel",
    TextureStore = "textureStore",
    Transpose = "transpose",
    Trunc = "trunc",
    Unpack2x16Float = "unpack2x16float",
    Unpack2x16Snorm = "unpack2x16snorm",
    Unpack2x16Unorm = "unpack2x16unorm",
    Unpack4x8Snorm = "unpack4x8snorm",
    Unpack4x8Unorm = "unpack4x8unorm",
    WorkgroupBarrier = "workgroupBarrier",
    WorkgroupUniformLoad = "workgroupUniformLoad",
}

impl BuiltinFunction {
    /// Whether a call may write memory. Every other builtin is a pure
    /// function of its arguments.
    pub const fn has_side_effects(self) -> bool {
        matches!(
            self,
            Self::AtomicAdd
                | Self::AtomicAnd
                | Self::AtomicCompareExchangeWeak
                | Self::AtomicExchange
                | Self::AtomicMax
                | Self::AtomicMin
                | Self::AtomicOr
                | Self::AtomicStore
                | Self::AtomicSub
                | Self::AtomicXor
                | Self::TextureStore
                | Self::WorkgroupUniformLoad
        )
    }

    pub const fn is_derivative(self) -> bool {
        matches!(
            self,
            Self::Dpdx
                | Self::DpdxCoarse
                | Self::DpdxFine
                | Self::Dpdy
                | Self::DpdyCoarse
                | Self::DpdyFine
                | Self::Fwidth
                | Self::FwidthCoarse
                | Self::FwidthFine
        )
    }

    /// Builtins that compute derivatives, explicitly or to pick a mip level.
    pub const fn requires_derivative_uniformity(self) -> bool {
        self.is_derivative()
            || matches!(
                self,
                Self::TextureSample | Self::TextureSampleBias | Self::TextureSampleCompare
            )
    }

    /// Builtins that synchronize the workgroup and must be reached by every
    /// invocation.
    pub const fn is_barrier(self) -> bool {
        matches!(
            self,
            Self::StorageBarrier | Self::WorkgroupBarrier | Self::WorkgroupUniformLoad
        )
    }

    /// Whether the result of a call to this builtin may not be discarded.
    pub const fn must_use(self) -> bool {
        !matches!(
            self,
            Self::AtomicAdd
                | Self::AtomicAnd
                | Self::AtomicCompareExchangeWeak
                | Self::AtomicExchange
                | Self::AtomicMax
                | Self::AtomicMin
                | Self::AtomicOr
                | Self::AtomicStore
                | Self::AtomicSub
                | Self::AtomicXor
                | Self::StorageBarrier
                | Self::TextureStore
                | Self::WorkgroupBarrier
        )
    }

    pub const fn is_texture(self) -> bool {
        matches!(
            self,
            Self::TextureDimensions
                | Self::TextureGather
                | Self::TextureGatherCompare
                | Self::TextureLoad
                | Self::TextureNumLayers
                | Self::TextureNumLevels
                | Self::TextureNumSamples
                | Self::TextureSample
                | Self::TextureSampleBias
                | Self::TextureSampleCompare
                | Self::TextureSampleCompareLevel
                | Self::TextureSampleGrad
                | Self::TextureSampleLevel
                | Self::TextureStore
        )
    }

    fn overloads(self) -> &'static [Overload] {
        use BuiltinFunction as Bf;
        match self {
            Bf::Abs | Bf::Max | Bf::Min | Bf::Clamp => match self {
                Bf::Abs => UNARY_NUMERIC,
                Bf::Clamp => TERNARY_NUMERIC,
                _ => BINARY_NUMERIC,
            },
            Bf::Sign => SIGN,
            Bf::Acos
            | Bf::Acosh
            | Bf::Asin
            | Bf::Asinh
            | Bf::Atan
            | Bf::Atanh
            | Bf::Ceil
            | Bf::Cos
            | Bf::Cosh
            | Bf::Degrees
            | Bf::Exp
            | Bf::Exp2
            | Bf::Floor
            | Bf::Fract
            | Bf::InverseSqrt
            | Bf::Log
            | Bf::Log2
            | Bf::Radians
            | Bf::Round
            | Bf::Saturate
            | Bf::Sin
            | Bf::Sinh
            | Bf::Sqrt
            | Bf::Tan
            | Bf::Tanh
            | Bf::Trunc => UNARY_FLOAT,
            Bf::Atan2 | Bf::Pow | Bf::Step => BINARY_FLOAT,
            Bf::Fma | Bf::Smoothstep => TERNARY_FLOAT,
            Bf::Mix => MIX,
            Bf::QuantizeToF16 => QUANTIZE_TO_F16,
            Bf::Dpdx
            | Bf::DpdxCoarse
            | Bf::DpdxFine
            | Bf::Dpdy
            | Bf::DpdyCoarse
            | Bf::DpdyFine
            | Bf::Fwidth
            | Bf::FwidthCoarse
            | Bf::FwidthFine => DERIVATIVE,
            Bf::All | Bf::Any => ALL_ANY,
            Bf::Select => SELECT,
            Bf::CountLeadingZeros
            | Bf::CountOneBits
            | Bf::CountTrailingZeros
            | Bf::FirstLeadingBit
            | Bf::FirstTrailingBit
            | Bf::ReverseBits => BIT_SCAN,
            Bf::ExtractBits => EXTRACT_BITS,
            Bf::InsertBits => INSERT_BITS,
            Bf::Cross => CROSS,
            Bf::Dot => DOT,
            Bf::Length => LENGTH,
            Bf::Distance => DISTANCE,
            Bf::Normalize => NORMALIZE,
            Bf::FaceForward => FACE_FORWARD,
            Bf::Reflect => REFLECT,
            Bf::Refract => REFRACT,
            Bf::Determinant => DETERMINANT,
            Bf::Transpose => TRANSPOSE,
            Bf::Ldexp => LDEXP,
            Bf::Frexp => FREXP,
            Bf::Modf => MODF,
            Bf::Pack4x8Snorm | Bf::Pack4x8Unorm => PACK_4X8,
            Bf::Pack2x16Float | Bf::Pack2x16Snorm | Bf::Pack2x16Unorm => PACK_2X16,
            Bf::Unpack4x8Snorm | Bf::Unpack4x8Unorm => UNPACK_4X8,
            Bf::Unpack2x16Float | Bf::Unpack2x16Snorm | Bf::Unpack2x16Unorm => UNPACK_2X16,
            Bf::Dot4I8Packed => DOT4_I8_PACKED,
            Bf::Dot4U8Packed => DOT4_U8_PACKED,
            Bf::ArrayLength => ARRAY_LENGTH,
            Bf::AtomicLoad => ATOMIC_LOAD,
            Bf::AtomicStore => ATOMIC_STORE,
            Bf::AtomicAdd
            | Bf::AtomicAnd
            | Bf::AtomicExchange
            | Bf::AtomicMax
            | Bf::AtomicMin
            | Bf::AtomicOr
            | Bf::AtomicSub
            | Bf::AtomicXor => ATOMIC_READ_MODIFY_WRITE,
            Bf::AtomicCompareExchangeWeak => ATOMIC_COMPARE_EXCHANGE_WEAK,
            Bf::StorageBarrier | Bf::WorkgroupBarrier => BARRIER,
            Bf::WorkgroupUniformLoad => WORKGROUP_UNIFORM_LOAD,
            Bf::TextureDimensions
            | Bf::TextureGather
            | Bf::TextureGatherCompare
            | Bf::TextureLoad
            | Bf::TextureNumLayers
            | Bf::TextureNumLevels
            | Bf::TextureNumSamples
            | Bf::TextureSample
            | Bf::TextureSampleBias
            | Bf::TextureSampleCompare
            | Bf::TextureSampleCompareLevel
            | Bf::TextureSampleGrad
            | Bf::TextureSampleLevel
            | Bf::TextureStore => &[],
        }
    }
}

impl fmt::Display for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// The scalar types `T` may stand for in an overload.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ScalarSet: u8 {
        const ABSTRACT_INT = 1 << 0;
        const ABSTRACT_FLOAT = 1 << 1;
        const F32 = 1 << 2;
        const F16 = 1 << 3;
        const I32 = 1 << 4;
        const U32 = 1 << 5;
        const BOOL = 1 << 6;

        const FLOAT = Self::ABSTRACT_FLOAT.bits() | Self::F32.bits() | Self::F16.bits();
        const CONCRETE_INTEGER = Self::I32.bits() | Self::U32.bits();
        const INTEGER = Self::ABSTRACT_INT.bits() | Self::CONCRETE_INTEGER.bits();
        const NUMERIC = Self::FLOAT.bits() | Self::INTEGER.bits();
        const SIGNED = Self::NUMERIC.bits() & !Self::U32.bits();
        const SCALAR = Self::NUMERIC.bits() | Self::BOOL.bits();
        const ATOMIC = Self::CONCRETE_INTEGER.bits();
    }
}

impl ScalarSet {
    /// Members in the order they are listed in messages.
    const ORDER: [(Self, Scalar); 7] = [
        (Self::ABSTRACT_INT, Scalar::AbstractInt),
        (Self::ABSTRACT_FLOAT, Scalar::AbstractFloat),
        (Self::F32, Scalar::F32),
        (Self::F16, Scalar::F16),
        (Self::I32, Scalar::I32),
        (Self::U32, Scalar::U32),
        (Self::BOOL, Scalar::Bool),
    ];

    fn scalars(self) -> impl Iterator<Item = Scalar> {
        Self::ORDER
            .into_iter()
            .filter(move |&(flag, _)| self.contains(flag))
            .map(|(_, scalar)| scalar)
    }

    fn has(self, scalar: Scalar) -> bool {
        self.scalars().any(|s| s == scalar)
    }

    /// The member `scalar` converts to most cheaply.
    fn best_conversion(self, scalar: Scalar) -> Option<Scalar> {
        self.scalars()
            .filter_map(|candidate| Some((scalar.conversion_rank(candidate)?, candidate)))
            .min_by_key(|&(rank, _)| rank)
            .map(|(_, candidate)| candidate)
    }
}

impl fmt::Display for ScalarSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.scalars().map(Scalar::name).collect();
        match names.split_last() {
            Some((last, [])) => f.write_str(last),
            Some((last, rest)) => write!(f, "{} or {last}", rest.join(", ")),
            None => Ok(()),
        }
    }
}

/// The element type of a pattern.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Elem {
    T,
    Bool,
    I32,
    U32,
    F32,
}

impl Elem {
    const fn fixed(self) -> Option<Scalar> {
        match self {
            Self::T => None,
            Self::Bool => Some(Scalar::Bool),
            Self::I32 => Some(Scalar::I32),
            Self::U32 => Some(Scalar::U32),
            Self::F32 => Some(Scalar::F32),
        }
    }

    const fn name(self) -> &'static str {
        match self.fixed() {
            Some(scalar) => scalar.name(),
            None => "T",
        }
    }
}

/// A parameter or result type pattern.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Ty {
    Scalar(Elem),
    /// A scalar or a vector. Every `Gen` and `VecN` of one overload shares
    /// its shape.
    Gen(Elem),
    VecN(Elem),
    Vec(VectorSize, Elem),
    Matrix,
    SquareMatrix,
    /// The transpose of the bound matrix. Result only.
    TransposedMatrix,
    /// `ptr<workgroup or storage, atomic<T>, read_write>`
    AtomicPointer,
    /// `ptr<workgroup, P>` for any `P`.
    WorkgroupPointer,
    /// `ptr<storage, array<E>, A>`
    RuntimeArrayPointer,
    /// The `P` of a bound [`Ty::WorkgroupPointer`]. Result only.
    Pointee,
    FrexpResult,
    ModfResult,
    AtomicCompareExchangeResult,
}

const T: Ty = Ty::Scalar(Elem::T);
const GEN_T: Ty = Ty::Gen(Elem::T);
const VEC_T: Ty = Ty::VecN(Elem::T);

impl Ty {
    const fn elem(self) -> Option<Elem> {
        match self {
            Self::Scalar(elem) | Self::Gen(elem) | Self::VecN(elem) | Self::Vec(_, elem) => {
                Some(elem)
            }
            Self::Matrix | Self::SquareMatrix | Self::TransposedMatrix => Some(Elem::T),
            _ => None,
        }
    }

    /// Check the shape of `arg` against this pattern, recording what it
    /// binds, and return the argument's element scalar.
    fn bind(self, arg: &Type, bindings: &mut Bindings) -> Option<Option<Scalar>> {
        match (self, arg) {
            (Self::Scalar(_), &Type::Scalar(scalar)) => Some(Some(scalar)),
            (Self::Gen(_), &Type::Scalar(scalar)) => {
                bindings.bind_shape(None)?;
                Some(Some(scalar))
            }
            (Self::Gen(_) | Self::VecN(_), &Type::Vector { size, scalar }) => {
                bindings.bind_shape(Some(size))?;
                Some(Some(scalar))
            }
            (Self::Vec(expected, _), &Type::Vector { size, scalar }) if size == expected => {
                Some(Some(scalar))
            }
            (
                Self::Matrix,
                &Type::Matrix {
                    columns,
                    rows,
                    scalar,
                },
            ) => {
                bindings.matrix = Some((columns, rows));
                Some(Some(scalar))
            }
            (
                Self::SquareMatrix,
                &Type::Matrix {
                    columns,
                    rows,
                    scalar,
                },
            ) if columns == rows => {
                bindings.matrix = Some((columns, rows));
                Some(Some(scalar))
            }
            (
                Self::AtomicPointer,
                &Type::Pointer {
                    ref base,
                    space: space @ (AddressSpace::Workgroup | AddressSpace::Storage),
                    access: Access::ReadWrite,
                },
            ) => match **base {
                Type::Atomic(scalar) => {
                    bindings.exact = Some(scalar);
                    bindings.pointer_space = Some(space);
                    Some(None)
                }
                _ => None,
            },
            (
                Self::WorkgroupPointer,
                &Type::Pointer {
                    ref base,
                    space: AddressSpace::Workgroup,
                    ..
                },
            ) => {
                bindings.pointee = Some((**base).clone());
                Some(None)
            }
            (
                Self::RuntimeArrayPointer,
                &Type::Pointer {
                    ref base,
                    space: AddressSpace::Storage,
                    ..
                },
            ) => match **base {
                Type::Array {
                    size: ArraySize::Runtime,
                    ..
                } => Some(None),
                _ => None,
            },
            _ => None,
        }
    }

    /// The concrete type this pattern stands for under `bindings`.
    fn instantiate(self, bindings: &Bindings, t: Option<Scalar>, arg: Option<&Type>) -> Option<Type> {
        let scalar = |elem: Elem| elem.fixed().or(t);
        Some(match self {
            Self::Scalar(elem) => Type::Scalar(scalar(elem)?),
            Self::Gen(elem) => Type::scalar_or_vector(bindings.shape?, scalar(elem)?),
            Self::VecN(elem) => Type::Vector {
                size: bindings.shape??,
                scalar: scalar(elem)?,
            },
            Self::Vec(size, elem) => Type::Vector {
                size,
                scalar: scalar(elem)?,
            },
            Self::Matrix | Self::SquareMatrix => {
                let (columns, rows) = bindings.matrix?;
                Type::Matrix {
                    columns,
                    rows,
                    scalar: t?,
                }
            }
            Self::TransposedMatrix => {
                let (columns, rows) = bindings.matrix?;
                Type::Matrix {
                    columns: rows,
                    rows: columns,
                    scalar: t?,
                }
            }
            Self::AtomicPointer | Self::WorkgroupPointer | Self::RuntimeArrayPointer => {
                arg?.clone()
            }
            Self::Pointee => bindings.pointee.clone()?,
            Self::FrexpResult => Type::Predeclared(PredeclaredType::FrexpResult {
                size: bindings.shape?,
                scalar: t?,
            }),
            Self::ModfResult => Type::Predeclared(PredeclaredType::ModfResult {
                size: bindings.shape?,
                scalar: t?,
            }),
            Self::AtomicCompareExchangeResult => {
                Type::Predeclared(PredeclaredType::AtomicCompareExchangeWeakResult(t?))
            }
        })
    }

    /// Write the pattern, choosing the vector form of `Gen` when `vector`.
    fn write(self, out: &mut String, vector: bool) {
        let _ = match self {
            Self::Scalar(elem) => write!(out, "{}", elem.name()),
            Self::Gen(elem) if vector => write!(out, "vecN<{}>", elem.name()),
            Self::Gen(elem) => write!(out, "{}", elem.name()),
            Self::VecN(elem) => write!(out, "vecN<{}>", elem.name()),
            Self::Vec(size, elem) => write!(out, "vec{}<{}>", size.count(), elem.name()),
            Self::Matrix => write!(out, "matNxM<T>"),
            Self::SquareMatrix => write!(out, "matNxN<T>"),
            Self::TransposedMatrix => write!(out, "matMxN<T>"),
            Self::AtomicPointer => write!(out, "ptr<S, atomic<T>, read_write>"),
            Self::WorkgroupPointer => write!(out, "ptr<workgroup, T>"),
            Self::RuntimeArrayPointer => write!(out, "ptr<storage, array<T>, A>"),
            Self::Pointee => write!(out, "T"),
            Self::FrexpResult if vector => write!(out, "__frexp_result_vecN_T"),
            Self::FrexpResult => write!(out, "__frexp_result_T"),
            Self::ModfResult if vector => write!(out, "__modf_result_vecN_T"),
            Self::ModfResult => write!(out, "__modf_result_T"),
            Self::AtomicCompareExchangeResult => write!(out, "__atomic_compare_exchange_result_T"),
        };
    }
}

#[derive(Default)]
struct Bindings {
    /// `Some(None)` binds the scalar shape.
    shape: Option<Option<VectorSize>>,
    matrix: Option<(VectorSize, VectorSize)>,
    /// `T` fixed exactly, by an atomic.
    exact: Option<Scalar>,
    pointer_space: Option<AddressSpace>,
    pointee: Option<Type>,
}

impl Bindings {
    fn bind_shape(&mut self, shape: Option<VectorSize>) -> Option<()> {
        match self.shape {
            Some(bound) if bound != shape => None,
            _ => {
                self.shape = Some(shape);
                Some(())
            }
        }
    }
}

struct Overload {
    params: &'static [Ty],
    result: Option<Ty>,
    set: ScalarSet,
}

impl Overload {
    const fn new(params: &'static [Ty], result: Option<Ty>, set: ScalarSet) -> Self {
        Overload {
            params,
            result,
            set,
        }
    }

    fn uses_gen(&self) -> bool {
        self.params
            .iter()
            .chain(self.result.iter())
            .any(|ty| matches!(*ty, Ty::Gen(_) | Ty::FrexpResult | Ty::ModfResult))
    }

    fn try_match(&self, args: &[Type]) -> Option<Match> {
        if self.params.len() != args.len() {
            return None;
        }

        let mut bindings = Bindings::default();
        let mut t = None::<Scalar>;
        for (&param, arg) in self.params.iter().zip(args) {
            let arg_scalar = param.bind(arg, &mut bindings)?;
            match (param.elem(), arg_scalar) {
                (Some(Elem::T), Some(scalar)) => {
                    t = Some(match t {
                        Some(previous) => previous.unify(scalar)?,
                        None => scalar,
                    });
                }
                (Some(elem), Some(scalar)) => {
                    let fixed = elem.fixed()?;
                    if !scalar.can_convert_to(fixed) {
                        return None;
                    }
                }
                _ => {}
            }
        }

        let t = match (bindings.exact, t) {
            (Some(exact), Some(t)) if !t.can_convert_to(exact) => return None,
            (Some(exact), _) => Some(exact),
            (None, Some(t)) if self.set.has(t) => Some(t),
            (None, Some(t)) => Some(self.set.best_conversion(t)?),
            (None, None) => None,
        };

        let mut parameters = Vec::with_capacity(args.len());
        for (&param, arg) in self.params.iter().zip(args) {
            let ty = param.instantiate(&bindings, t, Some(arg))?;
            if !arg.can_convert_to(&ty) {
                return None;
            }
            parameters.push(ty);
        }
        let result = match self.result {
            Some(ty) => Some(ty.instantiate(&bindings, t, None)?),
            None => None,
        };
        Some(Match { result, parameters })
    }

    fn write_signature(&self, out: &mut String, name: &str, vector: bool) {
        out.push_str(name);
        out.push('(');
        for (i, param) in self.params.iter().enumerate() {
            if i != 0 {
                out.push_str(", ");
            }
            param.write(out, vector);
        }
        out.push(')');
        if let Some(result) = self.result {
            out.push_str(" -> ");
            result.write(out, vector);
        }
        let uses_t = self
            .params
            .iter()
            .chain(self.result.iter())
            .any(|ty| ty.elem() == Some(Elem::T) || *ty == Ty::AtomicPointer);
        if uses_t && !self.set.is_empty() {
            let _ = write!(out, "  where: T is {}", self.set);
        }
    }
}

const UNARY_NUMERIC: &[Overload] = &[Overload::new(&[GEN_T], Some(GEN_T), ScalarSet::NUMERIC)];
const BINARY_NUMERIC: &[Overload] = &[Overload::new(
    &[GEN_T, GEN_T],
    Some(GEN_T),
    ScalarSet::NUMERIC,
)];
const TERNARY_NUMERIC: &[Overload] = &[Overload::new(
    &[GEN_T, GEN_T, GEN_T],
    Some(GEN_T),
    ScalarSet::NUMERIC,
)];
const UNARY_FLOAT: &[Overload] = &[Overload::new(&[GEN_T], Some(GEN_T), ScalarSet::FLOAT)];
const BINARY_FLOAT: &[Overload] =
    &[Overload::new(&[GEN_T, GEN_T], Some(GEN_T), ScalarSet::FLOAT)];
const TERNARY_FLOAT: &[Overload] = &[Overload::new(
    &[GEN_T, GEN_T, GEN_T],
    Some(GEN_T),
    ScalarSet::FLOAT,
)];
const SIGN: &[Overload] = &[Overload::new(&[GEN_T], Some(GEN_T), ScalarSet::SIGNED)];
const MIX: &[Overload] = &[
    Overload::new(&[GEN_T, GEN_T, GEN_T], Some(GEN_T), ScalarSet::FLOAT),
    Overload::new(&[VEC_T, VEC_T, T], Some(VEC_T), ScalarSet::FLOAT),
];
const QUANTIZE_TO_F16: &[Overload] = &[Overload::new(&[GEN_T], Some(GEN_T), ScalarSet::F32)];
const DERIVATIVE: &[Overload] = &[Overload::new(&[GEN_T], Some(GEN_T), ScalarSet::F32)];
const ALL_ANY: &[Overload] = &[Overload::new(
    &[Ty::Gen(Elem::Bool)],
    Some(Ty::Scalar(Elem::Bool)),
    ScalarSet::empty(),
)];
const SELECT: &[Overload] = &[
    Overload::new(
        &[GEN_T, GEN_T, Ty::Scalar(Elem::Bool)],
        Some(GEN_T),
        ScalarSet::SCALAR,
    ),
    Overload::new(
        &[VEC_T, VEC_T, Ty::VecN(Elem::Bool)],
        Some(VEC_T),
        ScalarSet::SCALAR,
    ),
];
const BIT_SCAN: &[Overload] = &[Overload::new(
    &[GEN_T],
    Some(GEN_T),
    ScalarSet::CONCRETE_INTEGER,
)];
const EXTRACT_BITS: &[Overload] = &[Overload::new(
    &[GEN_T, Ty::Scalar(Elem::U32), Ty::Scalar(Elem::U32)],
    Some(GEN_T),
    ScalarSet::CONCRETE_INTEGER,
)];
const INSERT_BITS: &[Overload] = &[Overload::new(
    &[GEN_T, GEN_T, Ty::Scalar(Elem::U32), Ty::Scalar(Elem::U32)],
    Some(GEN_T),
    ScalarSet::CONCRETE_INTEGER,
)];
const CROSS: &[Overload] = &[Overload::new(
    &[Ty::Vec(VectorSize::Tri, Elem::T), Ty::Vec(VectorSize::Tri, Elem::T)],
    Some(Ty::Vec(VectorSize::Tri, Elem::T)),
    ScalarSet::FLOAT,
)];
const DOT: &[Overload] = &[Overload::new(&[VEC_T, VEC_T], Some(T), ScalarSet::NUMERIC)];
const LENGTH: &[Overload] = &[Overload::new(&[GEN_T], Some(T), ScalarSet::FLOAT)];
const DISTANCE: &[Overload] = &[Overload::new(&[GEN_T, GEN_T], Some(T), ScalarSet::FLOAT)];
const NORMALIZE: &[Overload] = &[Overload::new(&[VEC_T], Some(VEC_T), ScalarSet::FLOAT)];
const FACE_FORWARD: &[Overload] = &[Overload::new(
    &[VEC_T, VEC_T, VEC_T],
    Some(VEC_T),
    ScalarSet::FLOAT,
)];
const REFLECT: &[Overload] = &[Overload::new(&[VEC_T, VEC_T], Some(VEC_T), ScalarSet::FLOAT)];
const REFRACT: &[Overload] = &[Overload::new(
    &[VEC_T, VEC_T, T],
    Some(VEC_T),
    ScalarSet::FLOAT,
)];
const DETERMINANT: &[Overload] = &[Overload::new(&[Ty::SquareMatrix], Some(T), ScalarSet::FLOAT)];
const TRANSPOSE: &[Overload] = &[Overload::new(
    &[Ty::Matrix],
    Some(Ty::TransposedMatrix),
    ScalarSet::FLOAT,
)];
const LDEXP: &[Overload] = &[Overload::new(
    &[GEN_T, Ty::Gen(Elem::I32)],
    Some(GEN_T),
    ScalarSet::FLOAT,
)];
const FREXP: &[Overload] = &[Overload::new(&[GEN_T], Some(Ty::FrexpResult), ScalarSet::FLOAT)];
const MODF: &[Overload] = &[Overload::new(&[GEN_T], Some(Ty::ModfResult), ScalarSet::FLOAT)];
const PACK_4X8: &[Overload] = &[Overload::new(
    &[Ty::Vec(VectorSize::Quad, Elem::F32)],
    Some(Ty::Scalar(Elem::U32)),
    ScalarSet::empty(),
)];
const PACK_2X16: &[Overload] = &[Overload::new(
    &[Ty::Vec(VectorSize::Bi, Elem::F32)],
    Some(Ty::Scalar(Elem::U32)),
    ScalarSet::empty(),
)];
const UNPACK_4X8: &[Overload] = &[Overload::new(
    &[Ty::Scalar(Elem::U32)],
    Some(Ty::Vec(VectorSize::Quad, Elem::F32)),
    ScalarSet::empty(),
)];
const UNPACK_2X16: &[Overload] = &[Overload::new(
    &[Ty::Scalar(Elem::U32)],
    Some(Ty::Vec(VectorSize::Bi, Elem::F32)),
    ScalarSet::empty(),
)];
const DOT4_I8_PACKED: &[Overload] = &[Overload::new(
    &[Ty::Scalar(Elem::U32), Ty::Scalar(Elem::U32)],
    Some(Ty::Scalar(Elem::I32)),
    ScalarSet::empty(),
)];
const DOT4_U8_PACKED: &[Overload] = &[Overload::new(
    &[Ty::Scalar(Elem::U32), Ty::Scalar(Elem::U32)],
    Some(Ty::Scalar(Elem::U32)),
    ScalarSet::empty(),
)];
const ARRAY_LENGTH: &[Overload] = &[Overload::new(
    &[Ty::RuntimeArrayPointer],
    Some(Ty::Scalar(Elem::U32)),
    ScalarSet::empty(),
)];
const ATOMIC_LOAD: &[Overload] = &[Overload::new(&[Ty::AtomicPointer], Some(T), ScalarSet::ATOMIC)];
const ATOMIC_STORE: &[Overload] = &[Overload::new(&[Ty::AtomicPointer, T], None, ScalarSet::ATOMIC)];
const ATOMIC_READ_MODIFY_WRITE: &[Overload] = &[Overload::new(
    &[Ty::AtomicPointer, T],
    Some(T),
    ScalarSet::ATOMIC,
)];
const ATOMIC_COMPARE_EXCHANGE_WEAK: &[Overload] = &[Overload::new(
    &[Ty::AtomicPointer, T, T],
    Some(Ty::AtomicCompareExchangeResult),
    ScalarSet::ATOMIC,
)];
const BARRIER: &[Overload] = &[Overload::new(&[], None, ScalarSet::empty())];
const WORKGROUP_UNIFORM_LOAD: &[Overload] = &[Overload::new(
    &[Ty::WorkgroupPointer],
    Some(Ty::Pointee),
    ScalarSet::empty(),
)];

/// A successful overload resolution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Match {
    /// `None` for builtins that return nothing.
    pub result: Option<Type>,
    /// The parameter types of the chosen overload. Arguments are converted
    /// to these.
    pub parameters: Vec<Type>,
}

/// Choose the overload of `function` that accepts `args`, which are the
/// loaded types of the call's arguments.
///
/// On failure returns the message to report.
pub fn resolve(function: BuiltinFunction, args: &[Type]) -> Result<Match, String> {
    let found = if function.is_texture() {
        match_texture(function, args)
    } else {
        function
            .overloads()
            .iter()
            .find_map(|overload| overload.try_match(args))
    };
    found.ok_or_else(|| no_match_message(function, args))
}

/// `name(arg, ...)` followed by the candidate list.
fn no_match_message(function: BuiltinFunction, args: &[Type]) -> String {
    let mut message = format!("no matching call to {}", call_signature(function.name(), args));

    let mut candidates = Vec::new();
    for overload in function.overloads() {
        let mut line = String::new();
        overload.write_signature(&mut line, function.name(), false);
        candidates.push(line);
        if overload.uses_gen() {
            let mut line = String::new();
            overload.write_signature(&mut line, function.name(), true);
            candidates.push(line);
        }
    }
    if !candidates.is_empty() {
        let plural = if candidates.len() > 1 { "s" } else { "" };
        let _ = write!(
            message,
            "\n\n{} candidate function{plural}:",
            candidates.len()
        );
        for line in candidates {
            let _ = write!(message, "\n  {line}");
        }
    }
    message
}

/// `name(T1, T2)` with the argument types written out.
pub fn call_signature(name: &str, args: &[Type]) -> String {
    let mut out = format!("{name}(");
    for (i, arg) in args.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", arg.load());
    }
    out.push(')');
    out
}

/// Walks the arguments of a texture builtin.
struct TextureArgs<'a> {
    args: &'a [Type],
    parameters: Vec<Type>,
}

impl<'a> TextureArgs<'a> {
    const fn new(args: &'a [Type]) -> Self {
        TextureArgs {
            args,
            parameters: Vec::new(),
        }
    }

    fn remaining(&self) -> usize {
        self.args.len() - self.parameters.len()
    }

    fn peek(&self) -> Option<&'a Type> {
        self.args.get(self.parameters.len())
    }

    fn texture(&mut self) -> Option<(ImageDimension, bool, ImageClass)> {
        let arg = self.peek()?;
        match *arg {
            Type::Image {
                dim,
                arrayed,
                class,
            } => {
                self.parameters.push(arg.clone());
                Some((dim, arrayed, class))
            }
            _ => None,
        }
    }

    fn sampler(&mut self, comparison: bool) -> Option<()> {
        let ty = Type::Sampler { comparison };
        if *self.peek()? != ty {
            return None;
        }
        self.parameters.push(ty);
        Some(())
    }

    /// An argument convertible to one of `targets`, in order of preference.
    fn one_of(&mut self, targets: &[Type]) -> Option<()> {
        let arg = self.peek()?;
        let target = targets.iter().find(|target| arg.can_convert_to(target))?;
        self.parameters.push(target.clone());
        Some(())
    }

    fn scalar_or_vector(&mut self, count: usize, scalars: &[Scalar]) -> Option<()> {
        let size = VectorSize::from_count(count);
        let targets: Vec<_> = scalars
            .iter()
            .map(|&scalar| Type::scalar_or_vector(size, scalar))
            .collect();
        self.one_of(&targets)
    }

    fn float_coords(&mut self, dim: ImageDimension) -> Option<()> {
        self.scalar_or_vector(dim.coordinates(), &[Scalar::F32])
    }

    fn integer_coords(&mut self, dim: ImageDimension) -> Option<()> {
        self.scalar_or_vector(dim.coordinates(), &[Scalar::I32, Scalar::U32])
    }

    fn integer(&mut self) -> Option<()> {
        self.one_of(&[Type::I32, Type::U32])
    }

    fn float(&mut self) -> Option<()> {
        self.one_of(&[Type::F32])
    }

    fn array_index(&mut self, arrayed: bool) -> Option<()> {
        if arrayed {
            self.integer()
        } else {
            Some(())
        }
    }

    /// A trailing constant offset, allowed for 2D and 3D textures.
    fn optional_offset(&mut self, dim: ImageDimension) -> Option<()> {
        if self.remaining() == 0 {
            return Some(());
        }
        match dim {
            ImageDimension::D2 | ImageDimension::D3 => {
                self.scalar_or_vector(dim.coordinates(), &[Scalar::I32])
            }
            ImageDimension::D1 | ImageDimension::Cube => None,
        }
    }

    fn finish(self, result: Option<Type>) -> Option<Match> {
        if self.remaining() != 0 {
            return None;
        }
        Some(Match {
            result,
            parameters: self.parameters,
        })
    }
}

const fn vec4(scalar: Scalar) -> Type {
    Type::Vector {
        size: VectorSize::Quad,
        scalar,
    }
}

fn match_texture(function: BuiltinFunction, args: &[Type]) -> Option<Match> {
    use BuiltinFunction as Bf;

    let mut a = TextureArgs::new(args);

    if function == Bf::TextureGather && matches!(args.first(), Some(&Type::Scalar(_))) {
        a.integer()?;
        let (dim, arrayed, class) = a.texture()?;
        let kind = match class {
            ImageClass::Sampled { kind, multi: false } => kind,
            _ => return None,
        };
        if !matches!(dim, ImageDimension::D2 | ImageDimension::Cube) {
            return None;
        }
        a.sampler(false)?;
        a.float_coords(dim)?;
        a.array_index(arrayed)?;
        a.optional_offset(dim)?;
        return a.finish(Some(vec4(kind)));
    }

    let (dim, arrayed, class) = a.texture()?;
    let multi = matches!(
        class,
        ImageClass::Sampled { multi: true, .. } | ImageClass::Depth { multi: true }
    );
    let is_storage = matches!(class, ImageClass::Storage { .. });
    let sampled_f32 = matches!(
        class,
        ImageClass::Sampled {
            kind: Scalar::F32,
            multi: false
        }
    );
    let is_depth = matches!(class, ImageClass::Depth { multi: false });
    let texel = match class {
        ImageClass::Sampled { kind, .. } => vec4(kind),
        ImageClass::Depth { .. } => Type::F32,
        ImageClass::Storage { format, .. } => vec4(format.channel_type()),
    };

    match function {
        Bf::TextureDimensions => {
            if a.remaining() == 1 {
                if multi || is_storage {
                    return None;
                }
                a.integer()?;
            }
            let size = VectorSize::from_count(match dim {
                ImageDimension::D1 => 1,
                ImageDimension::D2 | ImageDimension::Cube => 2,
                ImageDimension::D3 => 3,
            });
            a.finish(Some(Type::scalar_or_vector(size, Scalar::U32)))
        }
        Bf::TextureNumLayers if arrayed => a.finish(Some(Type::U32)),
        Bf::TextureNumLevels if !multi && !is_storage => a.finish(Some(Type::U32)),
        Bf::TextureNumSamples if multi => a.finish(Some(Type::U32)),
        Bf::TextureLoad => {
            if dim == ImageDimension::Cube {
                return None;
            }
            if let ImageClass::Storage { access, .. } = class {
                if !access.can_read() {
                    return None;
                }
            }
            a.integer_coords(dim)?;
            a.array_index(arrayed)?;
            if !is_storage {
                // Mip level, or sample index for multisampled textures.
                a.integer()?;
            }
            a.finish(Some(texel))
        }
        Bf::TextureStore => {
            match class {
                ImageClass::Storage { access, .. } if access.can_write() => {}
                _ => return None,
            }
            a.integer_coords(dim)?;
            a.array_index(arrayed)?;
            a.one_of(&[texel])?;
            a.finish(None)
        }
        Bf::TextureSample | Bf::TextureSampleBias | Bf::TextureSampleGrad => {
            let allowed = sampled_f32 || (is_depth && function == Bf::TextureSample);
            if !allowed || (dim == ImageDimension::D3 && arrayed) {
                return None;
            }
            a.sampler(false)?;
            a.float_coords(dim)?;
            a.array_index(arrayed)?;
            match function {
                Bf::TextureSampleBias => a.float()?,
                Bf::TextureSampleGrad => {
                    a.float_coords(dim)?;
                    a.float_coords(dim)?;
                }
                _ => {}
            }
            a.optional_offset(dim)?;
            a.finish(Some(texel))
        }
        Bf::TextureSampleLevel => {
            if !(sampled_f32 || is_depth) {
                return None;
            }
            a.sampler(false)?;
            a.float_coords(dim)?;
            a.array_index(arrayed)?;
            if is_depth {
                a.integer()?;
            } else {
                a.float()?;
            }
            a.optional_offset(dim)?;
            a.finish(Some(texel))
        }
        Bf::TextureSampleCompare | Bf::TextureSampleCompareLevel | Bf::TextureGatherCompare => {
            if !is_depth {
                return None;
            }
            a.sampler(true)?;
            a.float_coords(dim)?;
            a.array_index(arrayed)?;
            a.float()?;
            a.optional_offset(dim)?;
            let result = if function == Bf::TextureGatherCompare {
                vec4(Scalar::F32)
            } else {
                Type::F32
            };
            a.finish(Some(result))
        }
        Bf::TextureGather => {
            if !is_depth || !matches!(dim, ImageDimension::D2 | ImageDimension::Cube) {
                return None;
            }
            a.sampler(false)?;
            a.float_coords(dim)?;
            a.array_index(arrayed)?;
            a.optional_offset(dim)?;
            a.finish(Some(vec4(Scalar::F32)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec(size: VectorSize, scalar: Scalar) -> Type {
        Type::Vector { size, scalar }
    }

    #[test]
    fn names_round_trip() {
        for &function in BuiltinFunction::ALL {
            assert_eq!(BuiltinFunction::from_name(function.name()), Some(function));
        }
        assert_eq!(BuiltinFunction::from_name("bogus"), None);
    }

    #[test]
    fn side_effect_set() {
        assert!(BuiltinFunction::AtomicAdd.has_side_effects());
        assert!(BuiltinFunction::AtomicStore.has_side_effects());
        assert!(BuiltinFunction::TextureStore.has_side_effects());
        assert!(BuiltinFunction::WorkgroupUniformLoad.has_side_effects());
        assert!(!BuiltinFunction::AtomicLoad.has_side_effects());
        assert!(!BuiltinFunction::Dpdx.has_side_effects());
        assert!(!BuiltinFunction::WorkgroupBarrier.has_side_effects());
    }

    #[test]
    fn abstract_arguments_materialize() {
        let m = resolve(
            BuiltinFunction::Max,
            &[Type::Scalar(Scalar::AbstractInt), Type::F32],
        )
        .unwrap();
        assert_eq!(m.result, Some(Type::F32));
        assert_eq!(m.parameters, vec![Type::F32, Type::F32]);

        let m = resolve(BuiltinFunction::Sqrt, &[Type::Scalar(Scalar::AbstractInt)]).unwrap();
        assert_eq!(m.result, Some(Type::Scalar(Scalar::AbstractFloat)));
    }

    #[test]
    fn vector_overloads() {
        let v3 = vec(VectorSize::Tri, Scalar::F32);
        let m = resolve(BuiltinFunction::Dot, &[v3.clone(), v3.clone()]).unwrap();
        assert_eq!(m.result, Some(Type::F32));
        let m = resolve(BuiltinFunction::Mix, &[v3.clone(), v3.clone(), Type::F32]).unwrap();
        assert_eq!(m.result, Some(v3.clone()));
        let m = resolve(
            BuiltinFunction::Select,
            &[v3.clone(), v3.clone(), vec(VectorSize::Tri, Scalar::Bool)],
        )
        .unwrap();
        assert_eq!(m.result, Some(v3));
    }

    #[test]
    fn no_match_lists_candidates() {
        let message = resolve(
            BuiltinFunction::Select,
            &[Type::F32, vec(VectorSize::Bi, Scalar::F32), Type::BOOL],
        )
        .unwrap_err();
        assert_eq!(
            message,
            "no matching call to select(f32, vec2<f32>, bool)\n\n\
             3 candidate functions:\n  \
             select(T, T, bool) -> T  where: T is abstract-int, abstract-float, f32, f16, i32, u32 or bool\n  \
             select(vecN<T>, vecN<T>, bool) -> vecN<T>  where: T is abstract-int, abstract-float, f32, f16, i32, u32 or bool\n  \
             select(vecN<T>, vecN<T>, vecN<bool>) -> vecN<T>  where: T is abstract-int, abstract-float, f32, f16, i32, u32 or bool"
        );
    }

    #[test]
    fn derivatives_are_f32_only() {
        assert!(resolve(BuiltinFunction::Dpdx, &[Type::F32]).is_ok());
        assert!(resolve(BuiltinFunction::Dpdx, &[Type::I32]).is_err());
    }

    #[test]
    fn atomics() {
        let ptr = Type::Pointer {
            base: Box::new(Type::Atomic(Scalar::U32)),
            space: AddressSpace::Workgroup,
            access: Access::ReadWrite,
        };
        let m = resolve(
            BuiltinFunction::AtomicAdd,
            &[ptr.clone(), Type::Scalar(Scalar::AbstractInt)],
        )
        .unwrap();
        assert_eq!(m.result, Some(Type::U32));
        assert!(resolve(BuiltinFunction::AtomicAdd, &[ptr.clone(), Type::I32]).is_err());
        let m = resolve(BuiltinFunction::AtomicStore, &[ptr, Type::U32]).unwrap();
        assert_eq!(m.result, None);
    }

    #[test]
    fn texture_sampling() {
        let texture = Type::Image {
            dim: ImageDimension::D2,
            arrayed: false,
            class: ImageClass::Sampled {
                kind: Scalar::F32,
                multi: false,
            },
        };
        let sampler = Type::Sampler { comparison: false };
        let coords = vec(VectorSize::Bi, Scalar::AbstractFloat);
        let m = resolve(
            BuiltinFunction::TextureSample,
            &[texture.clone(), sampler.clone(), coords.clone()],
        )
        .unwrap();
        assert_eq!(m.result, Some(vec(VectorSize::Quad, Scalar::F32)));
        assert_eq!(m.parameters[2], vec(VectorSize::Bi, Scalar::F32));

        let err = resolve(BuiltinFunction::TextureSample, &[texture.clone(), Type::F32])
            .unwrap_err();
        assert_eq!(err, "no matching call to textureSample(texture_2d<f32>, f32)");

        let m = resolve(BuiltinFunction::TextureDimensions, &[texture]).unwrap();
        assert_eq!(m.result, Some(vec(VectorSize::Bi, Scalar::U32)));
    }
}
