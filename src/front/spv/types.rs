//! SPIR-V types and their WGSL spellings.

use super::{convert, Error, Parser};
use crate::{
    ast::{self, Literal},
    Handle, Span,
};
use spirv::Word;

type Expr = Handle<ast::Expression>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(super) enum Scalar {
    Bool,
    I32,
    U32,
    F32,
    F16,
}

impl Scalar {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F16 => "f16",
        }
    }

    /// The letter of the predeclared vector and matrix aliases, such as
    /// `vec3f`. Booleans have none.
    const fn alias_suffix(self) -> Option<char> {
        match self {
            Self::Bool => None,
            Self::I32 => Some('i'),
            Self::U32 => Some('u'),
            Self::F32 => Some('f'),
            Self::F16 => Some('h'),
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, Self::I32 | Self::U32)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16)
    }

    /// This scalar with the given signedness, if it is an integer.
    pub const fn with_signedness(self, signed: bool) -> Self {
        match self {
            Self::I32 | Self::U32 if signed => Self::I32,
            Self::I32 | Self::U32 => Self::U32,
            other => other,
        }
    }

    pub const fn zero(self) -> Literal {
        match self {
            Self::Bool => Literal::Bool(false),
            Self::I32 => Literal::I32(0),
            Self::U32 => Literal::U32(0),
            Self::F32 => Literal::F32(0.0),
            Self::F16 => Literal::F16(0.0),
        }
    }

    /// The literal a 32-bit (or narrower, for `f16`) constant word holds.
    pub fn literal(self, word: Word) -> Literal {
        match self {
            Self::Bool => Literal::Bool(word != 0),
            Self::I32 => Literal::I32(word as i32),
            Self::U32 => Literal::U32(word),
            Self::F32 => Literal::F32(f32::from_bits(word)),
            Self::F16 => Literal::F16(f16_to_f32(word as u16)),
        }
    }
}

fn f16_to_f32(bits: u16) -> f32 {
    let exponent = i32::from((bits >> 10) & 0x1f);
    let mantissa = f32::from(bits & 0x3ff);
    let magnitude = match exponent {
        0 => mantissa * 2f32.powi(-24),
        0x1f if mantissa == 0.0 => f32::INFINITY,
        0x1f => f32::NAN,
        _ => (1.0 + mantissa / 1024.0) * 2f32.powi(exponent - 15),
    };
    if bits & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(super) struct ImageType {
    /// The type of a texel component.
    pub sampled_type: Word,
    pub dim: spirv::Dim,
    /// 0 is not depth, 1 is depth, 2 is unknown.
    pub depth: Word,
    pub arrayed: bool,
    pub multisampled: bool,
    /// 1 is known to be used with a sampler, 2 is a storage image, 0 is
    /// unknown until the image is used.
    pub sampled: Word,
    pub format: Option<&'static str>,
}

#[derive(Clone, Debug, PartialEq)]
pub(super) enum Type {
    Void,
    Scalar(Scalar),
    Vector {
        size: u32,
        scalar: Scalar,
    },
    Matrix {
        columns: u32,
        rows: u32,
        scalar: Scalar,
    },
    Array {
        base: Word,
        /// The constant holding the length; `None` for a runtime-sized array.
        length: Option<Word>,
    },
    Struct {
        members: Vec<Word>,
    },
    Pointer {
        class: spirv::StorageClass,
        base: Word,
    },
    Function {
        result: Word,
        params: Vec<Word>,
    },
    Image(ImageType),
    Sampler,
    SampledImage {
        image: Word,
    },
}

impl Type {
    pub const fn is_handle(&self) -> bool {
        matches!(
            *self,
            Self::Image(_) | Self::Sampler | Self::SampledImage { .. }
        )
    }
}

impl Parser {
    pub(super) fn lookup_type(&self, id: Word) -> Result<&Type, Error> {
        self.types.get(&id).ok_or(Error::InvalidId(id))
    }

    /// The scalar and component count of a scalar or vector type.
    pub(super) fn scalar_info(&self, id: Word) -> Option<(Scalar, u32)> {
        match self.types.get(&id)? {
            Type::Scalar(scalar) => Some((*scalar, 1)),
            Type::Vector { size, scalar } => Some((*scalar, *size)),
            _ => None,
        }
    }

    /// Record a scalar or vector type, reusing an existing id if the module
    /// already declares an equal type.
    pub(super) fn register_type(&mut self, id: Word, ty: Type) {
        let key = match ty {
            Type::Scalar(scalar) => Some((scalar, 1)),
            Type::Vector { size, scalar } => Some((scalar, size)),
            _ => None,
        };
        if let Some(key) = key {
            self.interned.entry(key).or_insert(id);
        }
        self.types.insert(id, ty);
    }

    /// The id of the scalar (`size == 1`) or vector type of `scalar`,
    /// synthesizing one the module lacks.
    pub(super) fn shaped_type(&mut self, scalar: Scalar, size: u32) -> Word {
        if let Some(&id) = self.interned.get(&(scalar, size)) {
            return id;
        }
        let id = self.next_synthetic_id;
        self.next_synthetic_id += 1;
        let ty = if size == 1 {
            Type::Scalar(scalar)
        } else {
            Type::Vector { size, scalar }
        };
        self.register_type(id, ty);
        id
    }

    /// `ty` with its integer components switched to `signed`.
    pub(super) fn with_signedness(&mut self, ty: Word, signed: bool) -> Word {
        match self.scalar_info(ty) {
            Some((scalar, size)) if scalar.is_integer() => {
                self.shaped_type(scalar.with_signedness(signed), size)
            }
            _ => ty,
        }
    }

    /// Whether two ids name the same scalar or vector type, or are the same id.
    pub(super) fn same_type(&self, a: Word, b: Word) -> bool {
        a == b || matches!((self.scalar_info(a), self.scalar_info(b)), (Some(x), Some(y)) if x == y)
    }

    fn spelled(&mut self, name: impl Into<String>) -> Expr {
        self.module.ident_expr(name, Span::UNDEFINED)
    }

    /// The WGSL expression naming type `id`.
    pub(super) fn type_expr(&mut self, id: Word) -> Result<Expr, Error> {
        let ty = self.lookup_type(id)?.clone();
        Ok(match ty {
            Type::Void | Type::Function { .. } | Type::SampledImage { .. } => {
                return Err(Error::UnsupportedType(id))
            }
            Type::Scalar(scalar) => self.spelled(scalar.name()),
            Type::Vector { size, scalar } => match scalar.alias_suffix() {
                Some(suffix) => self.spelled(format!("vec{size}{suffix}")),
                None => {
                    let arg = self.spelled(scalar.name());
                    self.module
                        .templated_ident_expr(format!("vec{size}"), vec![arg], Span::UNDEFINED)
                }
            },
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => match scalar.alias_suffix() {
                Some(suffix) if scalar.is_float() => {
                    self.spelled(format!("mat{columns}x{rows}{suffix}"))
                }
                _ => return Err(Error::UnsupportedType(id)),
            },
            Type::Array { base, length } => {
                let mut args = vec![self.type_expr(base)?];
                if let Some(length) = length {
                    let count = self
                        .constant_u32(length)
                        .ok_or(Error::InvalidArraySize(length))?;
                    args.push(
                        self.module
                            .literal_expr(Literal::U32(count), Span::UNDEFINED),
                    );
                }
                self.module
                    .templated_ident_expr("array", args, Span::UNDEFINED)
            }
            Type::Struct { .. } => {
                let name = self.declare_struct(id)?;
                self.spelled(name)
            }
            Type::Pointer { class, base } => {
                let space = convert::address_space(class).ok_or(Error::UnsupportedType(id))?;
                let mut args = vec![self.spelled(space), self.type_expr(base)?];
                if class == spirv::StorageClass::StorageBuffer {
                    args.push(self.spelled("read_write"));
                }
                self.module
                    .templated_ident_expr("ptr", args, Span::UNDEFINED)
            }
            Type::Image(ref image) => {
                let name = super::usage::image_type_name(image, None)?;
                return self.handle_type_expr(name, image);
            }
            Type::Sampler => self.spelled("sampler"),
        })
    }

    /// Spell a texture type whose name was chosen by its usage.
    pub(super) fn handle_type_expr(
        &mut self,
        name: super::usage::HandleTypeName,
        image: &ImageType,
    ) -> Result<Expr, Error> {
        use super::usage::HandleTypeName as Htn;
        Ok(match name {
            Htn::Plain(name) => self.spelled(name),
            Htn::Sampled(name) => {
                let component = match self.scalar_info(image.sampled_type) {
                    Some((scalar, 1)) => scalar,
                    _ => return Err(Error::UnsupportedType(image.sampled_type)),
                };
                let arg = self.spelled(component.name());
                self.module
                    .templated_ident_expr(name, vec![arg], Span::UNDEFINED)
            }
            Htn::Storage { name, format, access } => {
                let args = vec![self.spelled(format), self.spelled(access)];
                self.module
                    .templated_ident_expr(name, args, Span::UNDEFINED)
            }
        })
    }

    /// Declare the WGSL struct for type `id` on first use, returning its name.
    fn declare_struct(&mut self, id: Word) -> Result<String, Error> {
        if let Some(name) = self.struct_names.get(&id) {
            return Ok(name.clone());
        }
        let members = match *self.lookup_type(id)? {
            Type::Struct { ref members } => members.clone(),
            _ => return Err(Error::InvalidId(id)),
        };
        let label = self
            .debug_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("S_{id}"));
        let name = self.namer.call(&label);
        // Recursive references are impossible; record the name before
        // building members so nested declarations come first.
        self.struct_names.insert(id, name.clone());

        let mut ast_members = Vec::with_capacity(members.len());
        for (index, &member_ty) in members.iter().enumerate() {
            let ty = self.type_expr(member_ty)?;
            let member_name = self.member_name(id, index as u32);
            ast_members.push(ast::StructMember {
                id: self.module.next_id(),
                span: Span::UNDEFINED,
                name: ast::Ident::new(member_name, Span::UNDEFINED),
                ty,
                attributes: Vec::new(),
            });
        }
        log::trace!("\tdeclaring struct {} for %{}", name, id);
        self.module.add_global_declaration(
            ast::GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(ast::Struct {
                name: ast::Ident::new(name.clone(), Span::UNDEFINED),
                members: ast_members,
                attributes: Vec::new(),
            })),
            Span::UNDEFINED,
        );
        Ok(name)
    }

    /// The WGSL name of member `index` of struct type `id`.
    pub(super) fn member_name(&self, id: Word, index: u32) -> String {
        match self.member_debug_names.get(&(id, index)) {
            Some(name) => super::namer::Namer::sanitize(name),
            None => format!("field{index}"),
        }
    }

    /// The zero value of type `id`: `0i`, `vec2f()`, `S(false, 0u)`.
    pub(super) fn zero_value(&mut self, id: Word) -> Result<Expr, Error> {
        let ty = self.lookup_type(id)?.clone();
        Ok(match ty {
            Type::Scalar(scalar) => self.module.literal_expr(scalar.zero(), Span::UNDEFINED),
            Type::Vector { .. } | Type::Matrix { .. } => {
                let callee = self.type_expr(id)?;
                self.module.call_expr(callee, Vec::new(), Span::UNDEFINED)
            }
            Type::Array { length: Some(_), .. } => {
                let callee = self.type_expr(id)?;
                self.module.call_expr(callee, Vec::new(), Span::UNDEFINED)
            }
            Type::Struct { members } => {
                let callee = self.type_expr(id)?;
                let arguments = members
                    .iter()
                    .map(|&member| self.zero_value(member))
                    .collect::<Result<Vec<_>, _>>()?;
                self.module.call_expr(callee, arguments, Span::UNDEFINED)
            }
            _ => return Err(Error::UnsupportedType(id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_floats() {
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xc000), -2.0);
        assert_eq!(f16_to_f32(0x3555), 0.333_251_95);
        assert_eq!(f16_to_f32(0x0001), 2f32.powi(-24));
        assert_eq!(f16_to_f32(0x7c00), f32::INFINITY);
        assert!(f16_to_f32(0x7e00).is_nan());
    }

    #[test]
    fn signedness() {
        assert_eq!(Scalar::U32.with_signedness(true), Scalar::I32);
        assert_eq!(Scalar::I32.with_signedness(false), Scalar::U32);
        assert_eq!(Scalar::F32.with_signedness(true), Scalar::F32);
        assert_eq!(Scalar::I32.literal(u32::MAX), Literal::I32(-1));
    }
}
