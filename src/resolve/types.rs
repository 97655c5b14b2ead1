/*!
Types as the resolver sees them.

Unlike [`ast`](crate::ast), where a type is just an identifier expression, a
[`Type`] here is a structured value. Struct types refer back to their
declaration by handle.
*/

use crate::{ast, Handle};

use std::fmt;

/// Primitive type for a scalar, including the two abstract numeric types
/// given to unsuffixed literals.
#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Scalar {
    Bool,
    AbstractInt,
    AbstractFloat,
    I32,
    U32,
    F32,
    F16,
}

impl Scalar {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::AbstractInt => "abstract-int",
            Self::AbstractFloat => "abstract-float",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F16 => "f16",
        }
    }

    /// The scalars that can be named in source.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "i32" => Self::I32,
            "u32" => Self::U32,
            "f32" => Self::F32,
            "f16" => Self::F16,
            _ => return None,
        })
    }

    pub const fn is_abstract(self) -> bool {
        matches!(self, Self::AbstractInt | Self::AbstractFloat)
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, Self::AbstractInt | Self::I32 | Self::U32)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::AbstractFloat | Self::F32 | Self::F16)
    }

    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::Bool)
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::AbstractInt | Self::AbstractFloat | Self::I32 | Self::F32 | Self::F16
        )
    }

    /// The type an abstract value takes when nothing else decides it.
    pub const fn concretize(self) -> Self {
        match self {
            Self::AbstractInt => Self::I32,
            Self::AbstractFloat => Self::F32,
            other => other,
        }
    }

    /// Cost of the automatic conversion from `self` to `target`, or `None`
    /// when no automatic conversion exists. Lower is preferred.
    pub const fn conversion_rank(self, target: Self) -> Option<u32> {
        use Scalar as S;
        Some(match (self, target) {
            _ if self as u8 == target as u8 => 0,
            (S::AbstractFloat, S::F32) => 1,
            (S::AbstractFloat, S::F16) => 2,
            (S::AbstractInt, S::I32) => 3,
            (S::AbstractInt, S::U32) => 4,
            (S::AbstractInt, S::AbstractFloat) => 5,
            (S::AbstractInt, S::F32) => 6,
            (S::AbstractInt, S::F16) => 7,
            _ => return None,
        })
    }

    pub const fn can_convert_to(self, target: Self) -> bool {
        self.conversion_rank(target).is_some()
    }

    /// The common type two operands convert to, if any.
    pub const fn unify(self, other: Self) -> Option<Self> {
        if self.can_convert_to(other) {
            Some(other)
        } else if other.can_convert_to(self) {
            Some(self)
        } else {
            None
        }
    }
}

/// Number of components in a vector.
#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum VectorSize {
    /// 2D vector
    Bi = 2,
    /// 3D vector
    Tri = 3,
    /// 4D vector
    Quad = 4,
}

impl VectorSize {
    pub const fn from_count(count: usize) -> Option<Self> {
        match count {
            2 => Some(Self::Bi),
            3 => Some(Self::Tri),
            4 => Some(Self::Quad),
            _ => None,
        }
    }

    pub const fn count(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum AddressSpace {
    Function,
    Private,
    Workgroup,
    Uniform,
    Storage,
    /// Textures and samplers, which are declared without an address space.
    Handle,
}

impl AddressSpace {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "function" => Self::Function,
            "private" => Self::Private,
            "workgroup" => Self::Workgroup,
            "uniform" => Self::Uniform,
            "storage" => Self::Storage,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Private => "private",
            Self::Workgroup => "workgroup",
            Self::Uniform => "uniform",
            Self::Storage => "storage",
            Self::Handle => "handle",
        }
    }

    /// The access mode used when a declaration doesn't spell one out.
    pub const fn default_access(self) -> Access {
        match self {
            Self::Storage | Self::Uniform | Self::Handle => Access::Read,
            Self::Function | Self::Private | Self::Workgroup => Access::ReadWrite,
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "read" => Self::Read,
            "write" => Self::Write,
            "read_write" => Self::ReadWrite,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "read_write",
        }
    }

    pub const fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub const fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum ImageDimension {
    /// 1D image
    D1,
    /// 2D image
    D2,
    /// 3D image
    D3,
    /// Cube map
    Cube,
}

impl ImageDimension {
    /// Number of coordinates needed to address a texel.
    pub const fn coordinates(self) -> usize {
        match self {
            Self::D1 => 1,
            Self::D2 => 2,
            Self::D3 | Self::Cube => 3,
        }
    }
}

/// Texel formats usable with storage textures.
#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum TexelFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Rgba16Uint,
    Rgba16Sint,
    Rgba16Float,
    R32Uint,
    R32Sint,
    R32Float,
    Rg32Uint,
    Rg32Sint,
    Rg32Float,
    Rgba32Uint,
    Rgba32Sint,
    Rgba32Float,
    Bgra8Unorm,
}

impl TexelFormat {
    pub const ALL: &'static [Self] = &[
        Self::Bgra8Unorm,
        Self::R32Float,
        Self::R32Sint,
        Self::R32Uint,
        Self::Rg32Float,
        Self::Rg32Sint,
        Self::Rg32Uint,
        Self::Rgba16Float,
        Self::Rgba16Sint,
        Self::Rgba16Uint,
        Self::Rgba32Float,
        Self::Rgba32Sint,
        Self::Rgba32Uint,
        Self::Rgba8Sint,
        Self::Rgba8Snorm,
        Self::Rgba8Uint,
        Self::Rgba8Unorm,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgba8Unorm => "rgba8unorm",
            Self::Rgba8Snorm => "rgba8snorm",
            Self::Rgba8Uint => "rgba8uint",
            Self::Rgba8Sint => "rgba8sint",
            Self::Rgba16Uint => "rgba16uint",
            Self::Rgba16Sint => "rgba16sint",
            Self::Rgba16Float => "rgba16float",
            Self::R32Uint => "r32uint",
            Self::R32Sint => "r32sint",
            Self::R32Float => "r32float",
            Self::Rg32Uint => "rg32uint",
            Self::Rg32Sint => "rg32sint",
            Self::Rg32Float => "rg32float",
            Self::Rgba32Uint => "rgba32uint",
            Self::Rgba32Sint => "rgba32sint",
            Self::Rgba32Float => "rgba32float",
            Self::Bgra8Unorm => "bgra8unorm",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|format| format.name() == name)
    }

    /// The scalar type of texels read from or written to this format.
    pub const fn channel_type(self) -> Scalar {
        match self {
            Self::Rgba8Uint | Self::Rgba16Uint | Self::R32Uint | Self::Rg32Uint | Self::Rgba32Uint => {
                Scalar::U32
            }
            Self::Rgba8Sint | Self::Rgba16Sint | Self::R32Sint | Self::Rg32Sint | Self::Rgba32Sint => {
                Scalar::I32
            }
            Self::Rgba8Unorm
            | Self::Rgba8Snorm
            | Self::Rgba16Float
            | Self::R32Float
            | Self::Rg32Float
            | Self::Rgba32Float
            | Self::Bgra8Unorm => Scalar::F32,
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum ImageClass {
    /// Regular sampled image.
    Sampled {
        /// Kind of values to sample.
        kind: Scalar,
        /// Multi-sampled.
        multi: bool,
    },
    /// Depth comparison image.
    Depth { multi: bool },
    /// Storage image.
    Storage { format: TexelFormat, access: Access },
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum ArraySize {
    Constant(u32),
    /// The array is sized by the buffer it lives in.
    Runtime,
}

/// Structures the language declares implicitly as builtin results.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum PredeclaredType {
    FrexpResult {
        size: Option<VectorSize>,
        scalar: Scalar,
    },
    ModfResult {
        size: Option<VectorSize>,
        scalar: Scalar,
    },
    AtomicCompareExchangeWeakResult(Scalar),
}

impl PredeclaredType {
    /// Members of the structure, by name and type.
    pub fn members(self) -> [(&'static str, Type); 2] {
        let value = |size: Option<VectorSize>, scalar| match size {
            Some(size) => Type::Vector { size, scalar },
            None => Type::Scalar(scalar),
        };
        match self {
            Self::FrexpResult { size, scalar } => {
                let exp = if scalar.is_abstract() {
                    Scalar::AbstractInt
                } else {
                    Scalar::I32
                };
                [("fract", value(size, scalar)), ("exp", value(size, exp))]
            }
            Self::ModfResult { size, scalar } => {
                [("fract", value(size, scalar)), ("whole", value(size, scalar))]
            }
            Self::AtomicCompareExchangeWeakResult(scalar) => [
                ("old_value", Type::Scalar(scalar)),
                ("exchanged", Type::Scalar(Scalar::Bool)),
            ],
        }
    }
}

impl fmt::Display for PredeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (prefix, size, scalar) = match *self {
            Self::FrexpResult { size, scalar } => ("__frexp_result", size, scalar),
            Self::ModfResult { size, scalar } => ("__modf_result", size, scalar),
            Self::AtomicCompareExchangeWeakResult(scalar) => {
                ("__atomic_compare_exchange_result", None, scalar)
            }
        };
        f.write_str(prefix)?;
        if let Some(size) = size {
            write!(f, "_vec{}", size.count())?;
        }
        write!(f, "_{}", scalar.name())
    }
}

/// A resolved type.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Type {
    /// Number of integral or floating-point kind, or a boolean.
    Scalar(Scalar),
    /// Vector of numbers.
    Vector { size: VectorSize, scalar: Scalar },
    /// Matrix of floats.
    Matrix {
        columns: VectorSize,
        rows: VectorSize,
        scalar: Scalar,
    },
    /// Homogenous list of elements.
    Array { base: Box<Type>, size: ArraySize },
    Atomic(Scalar),
    /// Pointer to another type.
    Pointer {
        base: Box<Type>,
        space: AddressSpace,
        access: Access,
    },
    /// The memory view produced by naming a variable. Loads happen
    /// implicitly when a value is needed.
    Reference {
        base: Box<Type>,
        space: AddressSpace,
        access: Access,
    },
    /// User-defined structure.
    Struct {
        decl: Handle<ast::GlobalDecl>,
        name: String,
    },
    Predeclared(PredeclaredType),
    /// Can be used to sample values from images.
    Sampler { comparison: bool },
    /// Possibly multidimensional array of texels.
    Image {
        dim: ImageDimension,
        arrayed: bool,
        class: ImageClass,
    },
}

impl Type {
    pub const BOOL: Self = Self::Scalar(Scalar::Bool);
    pub const I32: Self = Self::Scalar(Scalar::I32);
    pub const U32: Self = Self::Scalar(Scalar::U32);
    pub const F32: Self = Self::Scalar(Scalar::F32);

    /// `T` or `vecN<T>`, depending on `size`.
    pub const fn scalar_or_vector(size: Option<VectorSize>, scalar: Scalar) -> Self {
        match size {
            Some(size) => Self::Vector { size, scalar },
            None => Self::Scalar(scalar),
        }
    }

    /// The type of the value read through a reference, or `self`.
    pub fn load(&self) -> &Type {
        match *self {
            Self::Reference { ref base, .. } => base,
            ref other => other,
        }
    }

    pub fn into_loaded(self) -> Type {
        match self {
            Self::Reference { base, .. } => *base,
            other => other,
        }
    }

    /// The scalar of a scalar, vector or matrix.
    pub const fn scalar(&self) -> Option<Scalar> {
        match *self {
            Self::Scalar(scalar) | Self::Vector { scalar, .. } | Self::Matrix { scalar, .. } => {
                Some(scalar)
            }
            _ => None,
        }
    }

    /// The vector size of a vector, `None` for scalars. Anything else is
    /// not "scalar or vector" at all.
    pub const fn shape(&self) -> Option<Option<VectorSize>> {
        match *self {
            Self::Scalar(_) => Some(None),
            Self::Vector { size, .. } => Some(Some(size)),
            _ => None,
        }
    }

    pub fn is_abstract(&self) -> bool {
        match *self {
            Self::Scalar(scalar) | Self::Vector { scalar, .. } | Self::Matrix { scalar, .. } => {
                scalar.is_abstract()
            }
            Self::Array { ref base, .. } => base.is_abstract(),
            _ => false,
        }
    }

    /// Replace abstract numeric types with their default concrete types.
    pub fn concretize(&self) -> Type {
        self.with_scalar(|scalar| scalar.concretize())
    }

    /// Rebuild a scalar, vector, matrix or array with a new element scalar.
    pub fn with_scalar(&self, f: impl Fn(Scalar) -> Scalar + Copy) -> Type {
        match *self {
            Self::Scalar(scalar) => Self::Scalar(f(scalar)),
            Self::Vector { size, scalar } => Self::Vector {
                size,
                scalar: f(scalar),
            },
            Self::Matrix {
                columns,
                rows,
                scalar,
            } => Self::Matrix {
                columns,
                rows,
                scalar: f(scalar),
            },
            Self::Array { ref base, size } => Self::Array {
                base: Box::new(base.with_scalar(f)),
                size,
            },
            Self::Predeclared(PredeclaredType::FrexpResult { size, scalar }) => {
                Self::Predeclared(PredeclaredType::FrexpResult {
                    size,
                    scalar: f(scalar),
                })
            }
            Self::Predeclared(PredeclaredType::ModfResult { size, scalar }) => {
                Self::Predeclared(PredeclaredType::ModfResult {
                    size,
                    scalar: f(scalar),
                })
            }
            ref other => other.clone(),
        }
    }

    /// Cost of automatically converting a value of this type to `target`.
    pub fn conversion_rank(&self, target: &Type) -> Option<u32> {
        match (self, target) {
            (&Self::Scalar(from), &Self::Scalar(to)) => from.conversion_rank(to),
            (
                &Self::Vector { size, scalar: from },
                &Self::Vector {
                    size: target_size,
                    scalar: to,
                },
            ) if size == target_size => from.conversion_rank(to),
            (
                &Self::Matrix {
                    columns,
                    rows,
                    scalar: from,
                },
                &Self::Matrix {
                    columns: target_columns,
                    rows: target_rows,
                    scalar: to,
                },
            ) if columns == target_columns && rows == target_rows => from.conversion_rank(to),
            (
                &Self::Array {
                    base: ref from,
                    size,
                },
                &Self::Array {
                    base: ref to,
                    size: target_size,
                },
            ) if size == target_size => from.conversion_rank(to),
            _ if self == target => Some(0),
            _ => None,
        }
    }

    pub fn can_convert_to(&self, target: &Type) -> bool {
        self.conversion_rank(target).is_some()
    }

    /// Types with a zero value and a value constructor.
    pub fn is_constructible(&self) -> bool {
        match *self {
            Self::Scalar(_) | Self::Vector { .. } | Self::Matrix { .. } | Self::Struct { .. } => {
                true
            }
            Self::Array { ref base, size } => {
                matches!(size, ArraySize::Constant(_)) && base.is_constructible()
            }
            _ => false,
        }
    }

    /// Types that may be stored in memory (in a `var`).
    pub fn is_storable(&self) -> bool {
        match *self {
            Self::Reference { .. } | Self::Pointer { .. } | Self::Predeclared(_) => false,
            Self::Array { ref base, .. } => base.is_storable(),
            _ => true,
        }
    }

    pub const fn is_handle(&self) -> bool {
        matches!(*self, Self::Sampler { .. } | Self::Image { .. })
    }
}

impl From<Scalar> for Type {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Scalar(scalar) => f.write_str(scalar.name()),
            Self::Vector { size, scalar } => write!(f, "vec{}<{}>", size.count(), scalar.name()),
            Self::Matrix {
                columns,
                rows,
                scalar,
            } => write!(
                f,
                "mat{}x{}<{}>",
                columns.count(),
                rows.count(),
                scalar.name()
            ),
            Self::Array { ref base, size } => match size {
                ArraySize::Constant(count) => write!(f, "array<{base}, {count}>"),
                ArraySize::Runtime => write!(f, "array<{base}>"),
            },
            Self::Atomic(scalar) => write!(f, "atomic<{}>", scalar.name()),
            Self::Pointer {
                ref base,
                space,
                access,
            } => write!(f, "ptr<{}, {base}, {}>", space.name(), access.name()),
            Self::Reference {
                ref base,
                space,
                access,
            } => write!(f, "ref<{}, {base}, {}>", space.name(), access.name()),
            Self::Struct { ref name, .. } => f.write_str(name),
            Self::Predeclared(ty) => write!(f, "{ty}"),
            Self::Sampler { comparison: false } => f.write_str("sampler"),
            Self::Sampler { comparison: true } => f.write_str("sampler_comparison"),
            Self::Image {
                dim,
                arrayed,
                class,
            } => {
                let dim = match dim {
                    ImageDimension::D1 => "1d",
                    ImageDimension::D2 => "2d",
                    ImageDimension::D3 => "3d",
                    ImageDimension::Cube => "cube",
                };
                let array = if arrayed { "_array" } else { "" };
                match class {
                    ImageClass::Sampled { kind, multi: true } => {
                        write!(f, "texture_multisampled_{dim}<{}>", kind.name())
                    }
                    ImageClass::Sampled { kind, multi: false } => {
                        write!(f, "texture_{dim}{array}<{}>", kind.name())
                    }
                    ImageClass::Depth { multi: true } => {
                        write!(f, "texture_depth_multisampled_{dim}")
                    }
                    ImageClass::Depth { multi: false } => write!(f, "texture_depth_{dim}{array}"),
                    ImageClass::Storage { format, access } => write!(
                        f,
                        "texture_storage_{dim}{array}<{}, {}>",
                        format.name(),
                        access.name()
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstract_conversions() {
        assert_eq!(Scalar::AbstractInt.conversion_rank(Scalar::I32), Some(3));
        assert!(Scalar::AbstractInt.can_convert_to(Scalar::F16));
        assert!(!Scalar::AbstractFloat.can_convert_to(Scalar::I32));
        assert!(!Scalar::I32.can_convert_to(Scalar::U32));
        assert_eq!(Scalar::AbstractInt.unify(Scalar::F32), Some(Scalar::F32));
        assert_eq!(Scalar::I32.unify(Scalar::F32), None);

        let abstract_vec = Type::Vector {
            size: VectorSize::Tri,
            scalar: Scalar::AbstractFloat,
        };
        assert_eq!(abstract_vec.concretize().to_string(), "vec3<f32>");
        assert!(abstract_vec.can_convert_to(&Type::Vector {
            size: VectorSize::Tri,
            scalar: Scalar::F16,
        }));
        assert!(!abstract_vec.can_convert_to(&Type::Vector {
            size: VectorSize::Bi,
            scalar: Scalar::F32,
        }));
    }

    #[test]
    fn display() {
        let array = Type::Array {
            base: Box::new(Type::I32),
            size: ArraySize::Constant(4),
        };
        let ptr = Type::Pointer {
            base: Box::new(array),
            space: AddressSpace::Private,
            access: Access::ReadWrite,
        };
        assert_eq!(ptr.to_string(), "ptr<private, array<i32, 4>, read_write>");

        let storage = Type::Image {
            dim: ImageDimension::D2,
            arrayed: true,
            class: ImageClass::Storage {
                format: TexelFormat::Rgba8Unorm,
                access: Access::Write,
            },
        };
        assert_eq!(
            storage.to_string(),
            "texture_storage_2d_array<rgba8unorm, write>"
        );
        let depth = Type::Image {
            dim: ImageDimension::Cube,
            arrayed: false,
            class: ImageClass::Depth { multi: false },
        };
        assert_eq!(depth.to_string(), "texture_depth_cube");
        assert_eq!(
            Type::Predeclared(PredeclaredType::ModfResult {
                size: Some(VectorSize::Bi),
                scalar: Scalar::F32
            })
            .to_string(),
            "__modf_result_vec2_f32"
        );
    }
}
