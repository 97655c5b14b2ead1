//! Typing of expressions.
//!
//! Every expression is visited once, bottom-up. Its [`ExpressionInfo`] is
//! composed from the infos of its operands: side effects and evaluation
//! stages only ever flow upwards, so a composite of pure operands with a pure
//! operator is pure.

use super::{
    builtins::{self, BuiltinFunction},
    eval::{EvalError, Value},
    index,
    types::{
        Access, AddressSpace, ArraySize, ImageClass, ImageDimension, Scalar, TexelFormat, Type,
        VectorSize,
    },
    CallTarget, Definition, Errored, EvaluationStage, ExpressionInfo, GlobalInfo, Resolver,
    ValueKind,
};
use crate::{
    ast::{self, BinaryOperator, UnaryOperator},
    Handle, Span,
};

/// What a call expression names.
enum Callee {
    Function(Handle<ast::GlobalDecl>),
    Builtin(BuiltinFunction),
    Type(Type),
    /// A constructor whose template arguments are inferred from the
    /// arguments: `vec3(...)`, `mat2x2(...)` or `array(...)`.
    Inferred(Inferred),
}

#[derive(Clone, Copy)]
enum Inferred {
    Vector(VectorSize),
    Matrix {
        columns: VectorSize,
        rows: VectorSize,
    },
    Array,
}

#[derive(Clone, Copy, PartialEq)]
enum TextureKind {
    Sampled,
    Multisampled,
    Depth,
    DepthMultisampled,
    Storage,
}

const TEXTURES: &[(&str, ImageDimension, bool, TextureKind)] = &[
    ("texture_1d", ImageDimension::D1, false, TextureKind::Sampled),
    ("texture_2d", ImageDimension::D2, false, TextureKind::Sampled),
    ("texture_2d_array", ImageDimension::D2, true, TextureKind::Sampled),
    ("texture_3d", ImageDimension::D3, false, TextureKind::Sampled),
    ("texture_cube", ImageDimension::Cube, false, TextureKind::Sampled),
    ("texture_cube_array", ImageDimension::Cube, true, TextureKind::Sampled),
    ("texture_multisampled_2d", ImageDimension::D2, false, TextureKind::Multisampled),
    ("texture_depth_2d", ImageDimension::D2, false, TextureKind::Depth),
    ("texture_depth_2d_array", ImageDimension::D2, true, TextureKind::Depth),
    ("texture_depth_cube", ImageDimension::Cube, false, TextureKind::Depth),
    ("texture_depth_cube_array", ImageDimension::Cube, true, TextureKind::Depth),
    ("texture_depth_multisampled_2d", ImageDimension::D2, false, TextureKind::DepthMultisampled),
    ("texture_storage_1d", ImageDimension::D1, false, TextureKind::Storage),
    ("texture_storage_2d", ImageDimension::D2, false, TextureKind::Storage),
    ("texture_storage_2d_array", ImageDimension::D2, true, TextureKind::Storage),
    ("texture_storage_3d", ImageDimension::D3, false, TextureKind::Storage),
];

/// `vec2`, `vec3` or `vec4`.
fn vector_size(name: &str) -> Option<VectorSize> {
    match name {
        "vec2" => Some(VectorSize::Bi),
        "vec3" => Some(VectorSize::Tri),
        "vec4" => Some(VectorSize::Quad),
        _ => None,
    }
}

/// `matCxR`, as columns and rows.
fn matrix_size(name: &str) -> Option<(VectorSize, VectorSize)> {
    let bytes = name.strip_prefix("mat")?.as_bytes();
    match *bytes {
        [c, b'x', r] if c.is_ascii_digit() && r.is_ascii_digit() => Some((
            VectorSize::from_count(usize::from(c - b'0'))?,
            VectorSize::from_count(usize::from(r - b'0'))?,
        )),
        _ => None,
    }
}

/// The predeclared aliases `vec3f`, `vec2i`, `mat4x4h` and so on.
fn type_shorthand(name: &str) -> Option<Type> {
    let (body, scalar) = match name.as_bytes().last()? {
        b'f' => (&name[..name.len() - 1], Scalar::F32),
        b'h' => (&name[..name.len() - 1], Scalar::F16),
        b'i' => (&name[..name.len() - 1], Scalar::I32),
        b'u' => (&name[..name.len() - 1], Scalar::U32),
        _ => return None,
    };
    if let Some(size) = vector_size(body) {
        return Some(Type::Vector { size, scalar });
    }
    let (columns, rows) = matrix_size(body)?;
    scalar.is_float().then_some(Type::Matrix {
        columns,
        rows,
        scalar,
    })
}

/// The type both `a` and `b` convert to, if any.
pub(super) fn unify_types(a: &Type, b: &Type) -> Option<Type> {
    if a.can_convert_to(b) {
        Some(b.clone())
    } else if b.can_convert_to(a) {
        Some(a.clone())
    } else {
        None
    }
}

/// Common shape and element scalar of two scalars or two vectors of the
/// same size.
fn unify_elementwise(lhs: &Type, rhs: &Type) -> Option<(Option<VectorSize>, Scalar)> {
    let size = lhs.shape()?;
    if rhs.shape()? != size {
        return None;
    }
    Some((size, lhs.scalar()?.unify(rhs.scalar()?)?))
}

fn arithmetic_result(op: BinaryOperator, lhs: &Type, rhs: &Type) -> Option<Type> {
    use BinaryOperator as Bo;

    match (lhs, rhs) {
        (
            &Type::Matrix {
                columns,
                rows,
                scalar,
            },
            &Type::Matrix {
                columns: rhs_columns,
                rows: rhs_rows,
                scalar: rhs_scalar,
            },
        ) => {
            let scalar = scalar.unify(rhs_scalar)?;
            match op {
                Bo::Add | Bo::Subtract if columns == rhs_columns && rows == rhs_rows => {
                    Some(Type::Matrix {
                        columns,
                        rows,
                        scalar,
                    })
                }
                Bo::Multiply if columns == rhs_rows => Some(Type::Matrix {
                    columns: rhs_columns,
                    rows,
                    scalar,
                }),
                _ => None,
            }
        }
        (
            &Type::Matrix {
                columns,
                rows,
                scalar,
            },
            &Type::Vector {
                size,
                scalar: vector_scalar,
            },
        ) if op == Bo::Multiply && size == columns => Some(Type::Vector {
            size: rows,
            scalar: scalar.unify(vector_scalar)?,
        }),
        (
            &Type::Vector {
                size,
                scalar: vector_scalar,
            },
            &Type::Matrix {
                columns,
                rows,
                scalar,
            },
        ) if op == Bo::Multiply && size == rows => Some(Type::Vector {
            size: columns,
            scalar: scalar.unify(vector_scalar)?,
        }),
        (
            &Type::Matrix {
                columns,
                rows,
                scalar,
            },
            &Type::Scalar(other),
        )
        | (
            &Type::Scalar(other),
            &Type::Matrix {
                columns,
                rows,
                scalar,
            },
        ) if op == Bo::Multiply => {
            let scalar = scalar.unify(other)?;
            scalar.is_float().then_some(Type::Matrix {
                columns,
                rows,
                scalar,
            })
        }
        _ => {
            let size = match (lhs.shape()?, rhs.shape()?) {
                (a, b) if a == b => a,
                (Some(size), None) | (None, Some(size)) => Some(size),
                _ => return None,
            };
            let scalar = lhs.scalar()?.unify(rhs.scalar()?)?;
            scalar
                .is_numeric()
                .then_some(Type::scalar_or_vector(size, scalar))
        }
    }
}

/// The result type of `lhs op rhs`, for operands already loaded.
pub(super) fn binary_result(op: BinaryOperator, lhs: &Type, rhs: &Type) -> Option<Type> {
    use BinaryOperator as Bo;

    match op {
        Bo::LogicalAnd | Bo::LogicalOr => {
            (*lhs == Type::BOOL && *rhs == Type::BOOL).then_some(Type::BOOL)
        }
        Bo::ShiftLeft | Bo::ShiftRight => {
            if lhs.shape()? != rhs.shape()? {
                return None;
            }
            let integer = lhs.scalar()?.is_integer();
            let amount = rhs.scalar()?.can_convert_to(Scalar::U32);
            (integer && amount).then(|| lhs.clone())
        }
        Bo::Equal | Bo::NotEqual => {
            let (size, _) = unify_elementwise(lhs, rhs)?;
            Some(Type::scalar_or_vector(size, Scalar::Bool))
        }
        Bo::Less | Bo::LessEqual | Bo::Greater | Bo::GreaterEqual => {
            let (size, scalar) = unify_elementwise(lhs, rhs)?;
            scalar
                .is_numeric()
                .then_some(Type::scalar_or_vector(size, Scalar::Bool))
        }
        Bo::And | Bo::Or | Bo::Xor => {
            let (size, scalar) = unify_elementwise(lhs, rhs)?;
            let valid = scalar.is_integer() || (scalar == Scalar::Bool && op != Bo::Xor);
            valid.then_some(Type::scalar_or_vector(size, scalar))
        }
        Bo::Add | Bo::Subtract | Bo::Multiply | Bo::Divide | Bo::Modulo => {
            arithmetic_result(op, lhs, rhs)
        }
    }
}

fn fold_binary(op: BinaryOperator, lhs: Value, rhs: Value) -> Result<Option<Value>, EvalError> {
    if matches!(op, BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight) {
        return lhs.binary(op, rhs);
    }
    let Some(scalar) = lhs.scalar().unify(rhs.scalar()) else {
        return Ok(None);
    };
    lhs.convert(scalar)?.binary(op, rhs.convert(scalar)?)
}

/// Reinterpret the bits of a 32-bit scalar.
fn fold_bitcast(value: Value, target: Scalar) -> Option<Value> {
    let bits = match value {
        Value::AbstractInt(i) => i32::try_from(i).ok()? as u32,
        Value::I32(i) => i as u32,
        Value::U32(u) => u,
        Value::F32(f) => f.to_bits(),
        _ => return None,
    };
    match target {
        Scalar::I32 => Some(Value::I32(bits as i32)),
        Scalar::U32 => Some(Value::U32(bits)),
        Scalar::F32 => {
            let f = f32::from_bits(bits);
            f.is_finite().then_some(Value::F32(f))
        }
        _ => None,
    }
}

fn bitcast_compatible(from: &Type, to: &Type) -> bool {
    let is_32_bit = |scalar: Scalar| matches!(scalar, Scalar::I32 | Scalar::U32 | Scalar::F32);
    match (from, to) {
        (&Type::Scalar(a), &Type::Scalar(b)) => is_32_bit(a) && is_32_bit(b),
        (
            &Type::Vector { size, scalar: a },
            &Type::Vector {
                size: to_size,
                scalar: b,
            },
        ) if size == to_size => {
            (is_32_bit(a) && is_32_bit(b)) || (a == Scalar::F16 && b == Scalar::F16)
        }
        (
            &Type::Vector {
                size: VectorSize::Bi,
                scalar: Scalar::F16,
            },
            &Type::Scalar(other),
        )
        | (
            &Type::Scalar(other),
            &Type::Vector {
                size: VectorSize::Bi,
                scalar: Scalar::F16,
            },
        )
        | (
            &Type::Vector {
                size: VectorSize::Quad,
                scalar: Scalar::F16,
            },
            &Type::Vector {
                size: VectorSize::Bi,
                scalar: other,
            },
        )
        | (
            &Type::Vector {
                size: VectorSize::Bi,
                scalar: other,
            },
            &Type::Vector {
                size: VectorSize::Quad,
                scalar: Scalar::F16,
            },
        ) => is_32_bit(other),
        _ => false,
    }
}

/// Builtins whose calls can appear in constant expressions.
fn is_const_evaluable(function: BuiltinFunction) -> bool {
    !(function.has_side_effects()
        || function.is_derivative()
        || function.is_barrier()
        || function.is_texture()
        || matches!(
            function,
            BuiltinFunction::AtomicLoad | BuiltinFunction::ArrayLength
        ))
}

/// Split a reference or pointer into the type it refers to and its memory.
fn split_memory(ty: Type) -> (Type, Option<(AddressSpace, Access)>) {
    match ty {
        Type::Reference {
            base,
            space,
            access,
        }
        | Type::Pointer {
            base,
            space,
            access,
        } => (*base, Some((space, access))),
        other => (other, None),
    }
}

fn in_memory(ty: Type, memory: Option<(AddressSpace, Access)>) -> Type {
    match memory {
        Some((space, access)) => Type::Reference {
            base: Box::new(ty),
            space,
            access,
        },
        None => ty,
    }
}

impl<'a> Resolver<'a> {
    /// Resolve `handle` and load it if it is a reference.
    pub(super) fn value(&mut self, handle: Handle<ast::Expression>) -> Result<Type, Errored> {
        self.expression(handle).map(Type::into_loaded)
    }

    /// Resolve `handle`, which must produce a value.
    pub(super) fn expression(&mut self, handle: Handle<ast::Expression>) -> Result<Type, Errored> {
        if let Some(ty) = self.expression_or_void(handle)? {
            return Ok(ty);
        }
        let module = self.module;
        let message = match self.info.expressions[handle.index()].call {
            Some(CallTarget::Function(decl)) => {
                let name = module
                    .declaration(decl)
                    .kind
                    .name()
                    .map_or("", |ident| ident.name.as_str());
                format!("function '{name}' does not return a value")
            }
            Some(CallTarget::Builtin { function, .. }) => {
                format!("builtin '{function}' does not return a value")
            }
            _ => "expression does not produce a value".to_string(),
        };
        Err(self.error(message, module.expression_span(handle)))
    }

    /// Resolve `handle`. `None` is a call to a function that returns nothing.
    pub(super) fn expression_or_void(
        &mut self,
        handle: Handle<ast::Expression>,
    ) -> Result<Option<Type>, Errored> {
        let module = self.module;
        let span = module.expression_span(handle);
        let info = match *module.expression(handle) {
            ast::ExpressionKind::Literal(literal) => self.literal(literal, span)?,
            ast::ExpressionKind::Ident {
                ref ident,
                ref template_args,
            } => self.identifier(ident, template_args, span)?,
            ast::ExpressionKind::Call {
                callee,
                ref arguments,
            } => self.call(callee, arguments, span)?,
            ast::ExpressionKind::Bitcast { ty, expr } => self.bitcast(ty, expr, span)?,
            ast::ExpressionKind::Unary { op, expr } => self.unary(op, expr, span)?,
            ast::ExpressionKind::Binary { op, left, right } => {
                self.binary(op, left, right, span)?
            }
            ast::ExpressionKind::Index { base, index } => self.index(base, index)?,
            ast::ExpressionKind::Member { base, ref member } => self.member(base, member)?,
            ast::ExpressionKind::Phony => {
                return Err(self.error(
                    "'_' may only appear on the left-hand side of an assignment",
                    span,
                ))
            }
        };
        let ty = info.ty.clone();
        self.record(handle, info);
        Ok(ty)
    }

    fn literal(&mut self, literal: ast::Literal, span: Span) -> Result<ExpressionInfo, Errored> {
        let value = Value::from_literal(literal);
        if value.scalar() == Scalar::F16 && !self.f16_enabled() {
            return Err(self.error("f16 literal used without 'f16' extension enabled", span));
        }
        Ok(ExpressionInfo {
            ty: Some(Type::Scalar(value.scalar())),
            stage: EvaluationStage::Constant,
            value: Some(value),
            ..Default::default()
        })
    }

    fn identifier(
        &mut self,
        ident: &'a ast::Ident,
        template_args: &'a [Handle<ast::Expression>],
        span: Span,
    ) -> Result<ExpressionInfo, Errored> {
        if template_args.is_empty() {
            if let Some(local) = self.lookup_local(&ident.name) {
                return Ok(ExpressionInfo {
                    ty: Some(local.ty.clone()),
                    stage: local.stage,
                    value: local.value,
                    definition: Some(local.definition.clone()),
                    ..Default::default()
                });
            }
        }

        if let Some(&decl) = self.globals.get(ident.name.as_str()) {
            return self.global_identifier(decl, ident, template_args, span);
        }
        if BuiltinFunction::from_name(&ident.name).is_some() {
            return Err(self.error("missing '(' for builtin function call", span));
        }
        if let Some(ty) = self.predeclared_type(ident, template_args, span)? {
            return Err(self.error(format!("cannot use type '{ty}' as value"), span));
        }
        Err(self.error(
            format!("unresolved identifier '{}'", ident.name),
            ident.span,
        ))
    }

    fn global_identifier(
        &mut self,
        decl: Handle<ast::GlobalDecl>,
        ident: &ast::Ident,
        template_args: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<ExpressionInfo, Errored> {
        let module = self.module;
        match module.declaration(decl).kind {
            ast::GlobalDeclKind::Variable(ref var) => {
                if !template_args.is_empty() {
                    return Err(self.error(
                        format!(
                            "{} '{}' does not take template arguments",
                            var.kind.keyword(),
                            ident.name
                        ),
                        span,
                    ));
                }
                // A declaration that failed to resolve was already reported.
                let variable = self.info.variable(decl).cloned().ok_or(Errored)?;
                let (ty, stage) = match variable.memory {
                    Some((space, access)) => (
                        Type::Reference {
                            base: Box::new(variable.ty),
                            space,
                            access,
                        },
                        EvaluationStage::Runtime,
                    ),
                    None if variable.kind == ValueKind::Override => {
                        (variable.ty, EvaluationStage::Override)
                    }
                    None => (variable.ty, EvaluationStage::Constant),
                };
                Ok(ExpressionInfo {
                    ty: Some(ty),
                    stage,
                    value: variable.value,
                    definition: Some(Definition::Global(decl)),
                    ..Default::default()
                })
            }
            ast::GlobalDeclKind::Function(_) => Err(self.error(
                format!("cannot use function '{}' as value", ident.name),
                span,
            )),
            ast::GlobalDeclKind::TypeDecl(_) => Err(self.error(
                format!("cannot use type '{}' as value", ident.name),
                span,
            )),
            _ => Err(self.error(
                format!("unresolved identifier '{}'", ident.name),
                ident.span,
            )),
        }
    }

    /// Resolve `handle` as a type.
    pub(super) fn resolve_type(&mut self, handle: Handle<ast::Expression>) -> Result<Type, Errored> {
        let module = self.module;
        let span = module.expression_span(handle);
        let ast::ExpressionKind::Ident {
            ref ident,
            ref template_args,
        } = *module.expression(handle)
        else {
            return Err(self.error("expected type", span));
        };
        let ty = self.type_from_name(ident, template_args, span)?;
        self.record(
            handle,
            ExpressionInfo {
                stage: EvaluationStage::Constant,
                definition: Some(Definition::Type(ty.clone())),
                ..Default::default()
            },
        );
        Ok(ty)
    }

    fn type_from_name(
        &mut self,
        ident: &'a ast::Ident,
        template_args: &'a [Handle<ast::Expression>],
        span: Span,
    ) -> Result<Type, Errored> {
        if let Some(local) = self.lookup_local(&ident.name) {
            let kind = local.kind.keyword();
            return Err(self.error(
                format!("cannot use {kind} '{}' as type", ident.name),
                ident.span,
            ));
        }

        if let Some(&decl) = self.globals.get(ident.name.as_str()) {
            let module = self.module;
            let kind = &module.declaration(decl).kind;
            let is_type = matches!(*kind, ast::GlobalDeclKind::TypeDecl(_));
            if is_type && !template_args.is_empty() {
                return Err(self.error(
                    format!("type '{}' does not take template arguments", ident.name),
                    span,
                ));
            }
            return match (kind, self.global_info(decl).cloned()) {
                (
                    &ast::GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(ref s)),
                    Some(GlobalInfo::Struct { .. }),
                ) => Ok(Type::Struct {
                    decl,
                    name: s.name.name.clone(),
                }),
                (&ast::GlobalDeclKind::TypeDecl(_), Some(GlobalInfo::Alias(ty))) => Ok(ty),
                (&ast::GlobalDeclKind::TypeDecl(_), _) => Err(Errored),
                (other, _) => Err(self.error(
                    format!(
                        "cannot use {} '{}' as type",
                        index::kind_of(other),
                        ident.name
                    ),
                    ident.span,
                )),
            };
        }

        match self.predeclared_type(ident, template_args, span)? {
            Some(ty) => Ok(ty),
            None => Err(self.error(format!("unresolved type '{}'", ident.name), ident.span)),
        }
    }

    fn check_f16(&mut self, scalar: Scalar, span: Span) -> Result<(), Errored> {
        if scalar == Scalar::F16 && !self.f16_enabled() {
            return Err(self.error("f16 type used without 'f16' extension enabled", span));
        }
        Ok(())
    }

    fn template_args<const N: usize>(
        &mut self,
        name: &str,
        args: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<[Handle<ast::Expression>; N], Errored> {
        <[Handle<ast::Expression>; N]>::try_from(args).map_err(|_| {
            let plural = if N == 1 { "" } else { "s" };
            self.error(
                format!("'{name}' requires {N} template argument{plural}"),
                span,
            )
        })
    }

    /// The element scalar `T` of `vecN<T>` or `matCxR<T>`.
    fn element_scalar(
        &mut self,
        name: &str,
        args: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<Scalar, Errored> {
        let [arg] = self.template_args::<1>(name, args, span)?;
        match self.resolve_type(arg)? {
            Type::Scalar(scalar) => Ok(scalar),
            other => Err(self.error(
                format!("'{name}' element type must be a scalar, got '{other}'"),
                self.module.expression_span(arg),
            )),
        }
    }

    /// Resolve a predeclared type name, or `None` if `ident` doesn't name
    /// one.
    fn predeclared_type(
        &mut self,
        ident: &ast::Ident,
        args: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<Option<Type>, Errored> {
        let name = ident.name.as_str();
        let templated = matches!(name, "array" | "atomic" | "ptr")
            || vector_size(name).is_some()
            || matrix_size(name).is_some()
            || TEXTURES
                .iter()
                .any(|&(texture, _, _, kind)| texture == name && !is_depth(kind));
        let simple = Scalar::from_name(name).is_some()
            || type_shorthand(name).is_some()
            || matches!(name, "sampler" | "sampler_comparison")
            || TEXTURES.iter().any(|&(texture, _, _, _)| texture == name);
        if !templated && !args.is_empty() && simple {
            return Err(self.error(
                format!("type '{name}' does not take template arguments"),
                span,
            ));
        }

        let ty = if let Some(scalar) = Scalar::from_name(name) {
            self.check_f16(scalar, span)?;
            Type::Scalar(scalar)
        } else if let Some(ty) = type_shorthand(name) {
            if let Some(scalar) = ty.scalar() {
                self.check_f16(scalar, span)?;
            }
            ty
        } else if let Some(size) = vector_size(name) {
            let scalar = self.element_scalar(name, args, span)?;
            self.check_f16(scalar, span)?;
            Type::Vector { size, scalar }
        } else if let Some((columns, rows)) = matrix_size(name) {
            let scalar = self.element_scalar(name, args, span)?;
            if !scalar.is_float() || scalar.is_abstract() {
                return Err(self.error(
                    "matrix element type must be a floating point type",
                    span,
                ));
            }
            self.check_f16(scalar, span)?;
            Type::Matrix {
                columns,
                rows,
                scalar,
            }
        } else {
            match name {
                "array" => self.array_type(args, span)?,
                "atomic" => {
                    let [arg] = self.template_args::<1>(name, args, span)?;
                    match self.resolve_type(arg)? {
                        Type::Scalar(scalar @ (Scalar::I32 | Scalar::U32)) => Type::Atomic(scalar),
                        _ => return Err(self.error("atomic only supports i32 or u32 types", span)),
                    }
                }
                "ptr" => self.pointer_type(args, span)?,
                "sampler" => Type::Sampler { comparison: false },
                "sampler_comparison" => Type::Sampler { comparison: true },
                _ => match TEXTURES.iter().find(|&&(texture, ..)| texture == name) {
                    Some(&(_, dim, arrayed, kind)) => {
                        let class = self.texture_class(name, kind, args, span)?;
                        Type::Image {
                            dim,
                            arrayed,
                            class,
                        }
                    }
                    None => return Ok(None),
                },
            }
        };
        Ok(Some(ty))
    }

    fn array_type(
        &mut self,
        args: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<Type, Errored> {
        let (base, count) = match *args {
            [base] => (base, None),
            [base, count] => (base, Some(count)),
            _ => {
                return Err(self.error(
                    "'array' requires 1 or 2 template arguments",
                    span,
                ))
            }
        };
        let base_span = self.module.expression_span(base);
        let base = self.resolve_type(base)?;
        if matches!(
            base,
            Type::Array {
                size: ArraySize::Runtime,
                ..
            }
        ) || !base.is_storable()
            || base.is_handle()
        {
            return Err(self.error(
                format!("'{base}' cannot be used as an element type"),
                base_span,
            ));
        }

        let Some(count) = count else {
            return Ok(Type::Array {
                base: Box::new(base),
                size: ArraySize::Runtime,
            });
        };
        let count_span = self.module.expression_span(count);
        let count_ty = self.value(count)?;
        let info = self.expression_info(count);
        let (stage, value) = (info.stage, info.value.and_then(Value::as_int));
        let is_integer = matches!(count_ty, Type::Scalar(scalar) if scalar.is_integer());
        let (true, EvaluationStage::Constant, Some(value)) = (is_integer, stage, value) else {
            return Err(self.error(
                "array count must evaluate to a constant integer expression",
                count_span,
            ));
        };
        if value <= 0 {
            return Err(self.error(
                format!("array count ({value}) must be greater than 0"),
                count_span,
            ));
        }
        let size = u32::try_from(value).map_err(|_| {
            self.error(
                format!("array count ({value}) must be less than 2^32"),
                count_span,
            )
        })?;
        Ok(Type::Array {
            base: Box::new(base),
            size: ArraySize::Constant(size),
        })
    }

    fn pointer_type(
        &mut self,
        args: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<Type, Errored> {
        let (space, base, access) = match *args {
            [space, base] => (space, base, None),
            [space, base, access] => (space, base, Some(access)),
            _ => return Err(self.error("'ptr' requires 2 or 3 template arguments", span)),
        };
        let space = self.enumerant(space, "address space", AddressSpace::from_name)?;
        let base = self.resolve_type(base)?;
        let access = match access {
            Some(access) => self.enumerant(access, "access", Access::from_name)?,
            None => space.default_access(),
        };
        Ok(Type::Pointer {
            base: Box::new(base),
            space,
            access,
        })
    }

    fn texture_class(
        &mut self,
        name: &str,
        kind: TextureKind,
        args: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<ImageClass, Errored> {
        match kind {
            TextureKind::Sampled | TextureKind::Multisampled => {
                let [arg] = self.template_args::<1>(name, args, span)?;
                let sampled = self.resolve_type(arg)?;
                match sampled {
                    Type::Scalar(kind @ (Scalar::F32 | Scalar::I32 | Scalar::U32)) => {
                        Ok(ImageClass::Sampled {
                            kind,
                            multi: kind_is_multi(name),
                        })
                    }
                    other => Err(self.error(
                        format!("{name}<{other}>: sampled texture type must be f32, i32 or u32"),
                        self.module.expression_span(arg),
                    )),
                }
            }
            TextureKind::Depth => Ok(ImageClass::Depth { multi: false }),
            TextureKind::DepthMultisampled => Ok(ImageClass::Depth { multi: true }),
            TextureKind::Storage => {
                let [format, access] = self.template_args::<2>(name, args, span)?;
                let format = self.enumerant(format, "texel format", TexelFormat::from_name)?;
                let access = self.enumerant(access, "access", Access::from_name)?;
                Ok(ImageClass::Storage { format, access })
            }
        }
    }

    fn call(
        &mut self,
        callee: Handle<ast::Expression>,
        arguments: &'a [Handle<ast::Expression>],
        span: Span,
    ) -> Result<ExpressionInfo, Errored> {
        let module = self.module;
        let callee_span = module.expression_span(callee);
        let ast::ExpressionKind::Ident {
            ref ident,
            ref template_args,
        } = *module.expression(callee)
        else {
            return Err(self.error("expected function name", callee_span));
        };

        let target = self.callee(ident, template_args, callee_span)?;
        let definition = match target {
            Callee::Function(decl) => Some(Definition::Global(decl)),
            Callee::Builtin(function) => Some(Definition::Builtin(function)),
            Callee::Type(ref ty) => Some(Definition::Type(ty.clone())),
            Callee::Inferred(_) => None,
        };
        self.record(
            callee,
            ExpressionInfo {
                definition,
                ..Default::default()
            },
        );

        // Resolve every argument before giving up, to report all of them.
        let mut arg_types = Vec::with_capacity(arguments.len());
        let mut failed = false;
        for &arg in arguments {
            match self.value(arg) {
                Ok(ty) => arg_types.push(ty),
                Err(Errored) => failed = true,
            }
        }
        if failed {
            return Err(Errored);
        }

        let has_side_effects = arguments
            .iter()
            .any(|&arg| self.expression_info(arg).has_side_effects);
        let stage = arguments
            .iter()
            .map(|&arg| self.expression_info(arg).stage)
            .max()
            .unwrap_or(EvaluationStage::Constant);

        match target {
            Callee::Function(decl) => self.user_call(decl, ident, &arg_types, arguments, span),
            Callee::Builtin(function) => {
                let overload = builtins::resolve(function, &arg_types)
                    .map_err(|message| self.error(message, span))?;
                let stage = if is_const_evaluable(function) {
                    stage
                } else {
                    EvaluationStage::Runtime
                };
                Ok(ExpressionInfo {
                    ty: overload.result.clone(),
                    has_side_effects: has_side_effects || function.has_side_effects(),
                    stage,
                    call: Some(CallTarget::Builtin { function, overload }),
                    ..Default::default()
                })
            }
            Callee::Type(ty) => {
                self.construct(ty, &arg_types, arguments, has_side_effects, stage, span)
            }
            Callee::Inferred(inferred) => {
                let ty = self.infer_constructor(inferred, &ident.name, &arg_types, span)?;
                self.construct(ty, &arg_types, arguments, has_side_effects, stage, span)
            }
        }
    }

    fn callee(
        &mut self,
        ident: &'a ast::Ident,
        template_args: &'a [Handle<ast::Expression>],
        span: Span,
    ) -> Result<Callee, Errored> {
        let name = ident.name.as_str();
        if template_args.is_empty() {
            if let Some(local) = self.lookup_local(name) {
                let kind = local.kind.keyword();
                return Err(self.error(format!("cannot call {kind} '{name}'"), span));
            }
        }

        if let Some(&decl) = self.globals.get(name) {
            let module = self.module;
            return match module.declaration(decl).kind {
                ast::GlobalDeclKind::Function(_) if template_args.is_empty() => {
                    Ok(Callee::Function(decl))
                }
                ast::GlobalDeclKind::Function(_) => Err(self.error(
                    format!("function '{name}' does not take template arguments"),
                    span,
                )),
                ast::GlobalDeclKind::TypeDecl(_) => self
                    .type_from_name(ident, template_args, span)
                    .map(Callee::Type),
                ref other => Err(self.error(
                    format!("cannot call {} '{name}'", index::kind_of(other)),
                    span,
                )),
            };
        }

        if let Some(function) = BuiltinFunction::from_name(name) {
            if !template_args.is_empty() {
                return Err(self.error(
                    format!("builtin '{name}' does not take template arguments"),
                    span,
                ));
            }
            return Ok(Callee::Builtin(function));
        }

        if template_args.is_empty() {
            if let Some(size) = vector_size(name) {
                return Ok(Callee::Inferred(Inferred::Vector(size)));
            }
            if let Some((columns, rows)) = matrix_size(name) {
                return Ok(Callee::Inferred(Inferred::Matrix { columns, rows }));
            }
            if name == "array" {
                return Ok(Callee::Inferred(Inferred::Array));
            }
        }

        match self.predeclared_type(ident, template_args, span)? {
            Some(ty) => Ok(Callee::Type(ty)),
            None => Err(self.error(format!("unresolved call target '{name}'"), span)),
        }
    }

    fn user_call(
        &mut self,
        decl: Handle<ast::GlobalDecl>,
        ident: &ast::Ident,
        arg_types: &[Type],
        arguments: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<ExpressionInfo, Errored> {
        // The signature failed to resolve and was already reported.
        let function = self.info.function(decl).cloned().ok_or(Errored)?;
        let name = &ident.name;
        if function.stage.is_some() {
            return Err(self.error(
                "entry point functions cannot be the target of a function call",
                span,
            ));
        }
        let expected = function.parameters.len();
        if arg_types.len() != expected {
            let which = if arg_types.len() < expected {
                "few"
            } else {
                "many"
            };
            return Err(self.error(
                format!(
                    "too {which} arguments in call to '{name}', expected {expected}, got {}",
                    arg_types.len()
                ),
                span,
            ));
        }
        for (i, (arg, param)) in arg_types.iter().zip(function.parameters.iter()).enumerate() {
            if !arg.can_convert_to(param) {
                return Err(self.error(
                    format!(
                        "type mismatch for argument {} in call to '{name}', expected '{param}', \
                         got '{arg}'",
                        i + 1
                    ),
                    self.module.expression_span(arguments[i]),
                ));
            }
        }
        Ok(ExpressionInfo {
            ty: function.return_type,
            has_side_effects: true,
            stage: EvaluationStage::Runtime,
            call: Some(CallTarget::Function(decl)),
            ..Default::default()
        })
    }

    /// The type of `vec3(...)`, `mat2x2(...)` or `array(...)`.
    fn infer_constructor(
        &mut self,
        inferred: Inferred,
        name: &str,
        arg_types: &[Type],
        span: Span,
    ) -> Result<Type, Errored> {
        let no_match = |this: &mut Self| {
            this.error(
                format!(
                    "no matching constructor for {}",
                    builtins::call_signature(name, arg_types)
                ),
                span,
            )
        };
        match inferred {
            Inferred::Vector(size) => {
                let mut scalar = None::<Scalar>;
                for arg in arg_types {
                    let Some(element) = arg.shape().and(arg.scalar()) else {
                        return Err(no_match(self));
                    };
                    scalar = match scalar {
                        None => Some(element),
                        Some(current) => match current.unify(element) {
                            Some(unified) => Some(unified),
                            None => return Err(no_match(self)),
                        },
                    };
                }
                Ok(Type::Vector {
                    size,
                    scalar: scalar.unwrap_or(Scalar::AbstractInt),
                })
            }
            Inferred::Matrix { columns, rows } => {
                let mut scalar = None::<Scalar>;
                for arg in arg_types {
                    let element = match *arg {
                        Type::Scalar(s)
                        | Type::Vector { scalar: s, .. }
                        | Type::Matrix { scalar: s, .. } => s,
                        _ => return Err(no_match(self)),
                    };
                    scalar = match scalar {
                        None => Some(element),
                        Some(current) => match current.unify(element) {
                            Some(unified) => Some(unified),
                            None => return Err(no_match(self)),
                        },
                    };
                }
                let scalar = match scalar {
                    Some(Scalar::AbstractInt) => Scalar::AbstractFloat,
                    Some(scalar) if scalar.is_float() => scalar,
                    _ => return Err(no_match(self)),
                };
                Ok(Type::Matrix {
                    columns,
                    rows,
                    scalar,
                })
            }
            Inferred::Array => {
                let Some((first, rest)) = arg_types.split_first() else {
                    return Err(self.error(
                        "cannot infer the element type of an array constructor with no arguments",
                        span,
                    ));
                };
                let mut element = first.clone();
                for arg in rest {
                    match unify_types(&element, arg) {
                        Some(unified) => element = unified,
                        None => {
                            return Err(self.error(
                                "cannot infer common array element type from constructor \
                                 arguments",
                                span,
                            ))
                        }
                    }
                }
                let count = u32::try_from(arg_types.len()).map_err(|_| no_match(self))?;
                Ok(Type::Array {
                    base: Box::new(element),
                    size: ArraySize::Constant(count),
                })
            }
        }
    }

    /// A call to the constructor or conversion of `target`.
    fn construct(
        &mut self,
        target: Type,
        arg_types: &[Type],
        arguments: &[Handle<ast::Expression>],
        has_side_effects: bool,
        stage: EvaluationStage,
        span: Span,
    ) -> Result<ExpressionInfo, Errored> {
        let mut conversion = false;
        let mut value = None;

        let matched = if arg_types.is_empty() {
            if let Type::Scalar(scalar) = target {
                value = Value::AbstractInt(0).convert(scalar).ok();
            }
            target.is_constructible()
        } else {
            match target {
                Type::Scalar(scalar) => match *arg_types {
                    [Type::Scalar(from)] => {
                        conversion = from != scalar;
                        let arg_value = self.expression_info(arguments[0]).value;
                        if let Some(arg_value) = arg_value {
                            value = Some(
                                arg_value
                                    .convert(scalar)
                                    .map_err(|err| self.error(err.to_string(), span))?,
                            );
                        }
                        true
                    }
                    _ => false,
                },
                Type::Vector { size, scalar } => match *arg_types {
                    [Type::Vector { size: from, .. }] if from == size => {
                        conversion = arg_types[0] != target;
                        true
                    }
                    [Type::Scalar(from)] => from.can_convert_to(scalar),
                    _ => {
                        let mut components = 0;
                        let mut valid = true;
                        for arg in arg_types {
                            match *arg {
                                Type::Scalar(s) => {
                                    components += 1;
                                    valid &= s.can_convert_to(scalar);
                                }
                                Type::Vector { size: n, scalar: s } => {
                                    components += n.count();
                                    valid &= s.can_convert_to(scalar);
                                }
                                _ => valid = false,
                            }
                        }
                        valid && components == size.count()
                    }
                },
                Type::Matrix {
                    columns,
                    rows,
                    scalar,
                } => match *arg_types {
                    [Type::Matrix {
                        columns: c, rows: r, ..
                    }] if c == columns && r == rows => {
                        conversion = arg_types[0] != target;
                        true
                    }
                    _ => {
                        let scalars = arg_types.iter().all(|arg| {
                            matches!(*arg, Type::Scalar(s) if s.can_convert_to(scalar))
                        });
                        let column_vectors = arg_types.iter().all(|arg| {
                            matches!(
                                *arg,
                                Type::Vector { size, scalar: s }
                                    if size == rows && s.can_convert_to(scalar)
                            )
                        });
                        (scalars && arg_types.len() == columns.count() * rows.count())
                            || (column_vectors && arg_types.len() == columns.count())
                    }
                },
                Type::Array {
                    ref base,
                    size: ArraySize::Constant(count),
                } => {
                    self.check_elements("array", "array type", base, count, arg_types, arguments, span)?;
                    true
                }
                Type::Struct { decl, .. } => {
                    let members = match self.global_info(decl) {
                        Some(&GlobalInfo::Struct { ref members }) => members.clone(),
                        _ => return Err(Errored),
                    };
                    self.check_struct_members(&members, arg_types, arguments, span)?;
                    true
                }
                _ => false,
            }
        };

        if !matched {
            let message = if target.is_constructible() {
                format!(
                    "no matching constructor for {}",
                    builtins::call_signature(&target.to_string(), arg_types)
                )
            } else {
                format!("type '{target}' is not constructible")
            };
            return Err(self.error(message, span));
        }

        let call = if conversion {
            CallTarget::Conversion(target.clone())
        } else {
            CallTarget::Constructor(target.clone())
        };
        Ok(ExpressionInfo {
            ty: Some(target),
            has_side_effects,
            stage,
            value,
            call: Some(call),
            ..Default::default()
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn check_elements(
        &mut self,
        what: &str,
        expected_what: &str,
        base: &Type,
        count: u32,
        arg_types: &[Type],
        arguments: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<(), Errored> {
        let count = count as usize;
        if arg_types.len() != count {
            let which = if arg_types.len() < count {
                "few"
            } else {
                "many"
            };
            return Err(self.error(
                format!(
                    "{what} constructor has too {which} elements: expected {count}, found {}",
                    arg_types.len()
                ),
                span,
            ));
        }
        for (arg, &handle) in arg_types.iter().zip(arguments) {
            if !arg.can_convert_to(base) {
                return Err(self.error(
                    format!(
                        "type in {what} constructor does not match {expected_what}: expected \
                         '{base}', found '{arg}'"
                    ),
                    self.module.expression_span(handle),
                ));
            }
        }
        Ok(())
    }

    fn check_struct_members(
        &mut self,
        members: &[Type],
        arg_types: &[Type],
        arguments: &[Handle<ast::Expression>],
        span: Span,
    ) -> Result<(), Errored> {
        if arg_types.len() != members.len() {
            let which = if arg_types.len() < members.len() {
                "few"
            } else {
                "many"
            };
            return Err(self.error(
                format!(
                    "structure constructor has too {which} inputs: expected {}, found {}",
                    members.len(),
                    arg_types.len()
                ),
                span,
            ));
        }
        for ((arg, member), &handle) in arg_types.iter().zip(members).zip(arguments) {
            if !arg.can_convert_to(member) {
                return Err(self.error(
                    format!(
                        "type in structure constructor does not match struct member type: \
                         expected '{member}', found '{arg}'"
                    ),
                    self.module.expression_span(handle),
                ));
            }
        }
        Ok(())
    }

    fn bitcast(
        &mut self,
        ty: Handle<ast::Expression>,
        expr: Handle<ast::Expression>,
        span: Span,
    ) -> Result<ExpressionInfo, Errored> {
        let target = self.resolve_type(ty)?;
        let source = self.value(expr)?;
        if !bitcast_compatible(&source.concretize(), &target) {
            return Err(self.error(
                format!("cannot bitcast from '{source}' to '{target}'"),
                span,
            ));
        }
        let operand = self.expression_info(expr);
        let value = match (operand.value, &target) {
            (Some(value), &Type::Scalar(scalar)) => fold_bitcast(value, scalar),
            _ => None,
        };
        Ok(ExpressionInfo {
            ty: Some(target),
            has_side_effects: operand.has_side_effects,
            stage: operand.stage,
            value,
            ..Default::default()
        })
    }

    fn unary(
        &mut self,
        op: UnaryOperator,
        expr: Handle<ast::Expression>,
        span: Span,
    ) -> Result<ExpressionInfo, Errored> {
        let operand = self.expression(expr)?;
        let (has_side_effects, stage, operand_value) = {
            let info = self.expression_info(expr);
            (info.has_side_effects, info.stage, info.value)
        };
        let base = ExpressionInfo {
            has_side_effects,
            stage,
            ..Default::default()
        };

        match op {
            UnaryOperator::AddressOf => match operand {
                Type::Reference {
                    space: AddressSpace::Handle,
                    ..
                } => Err(self.error(
                    "cannot take the address of expression in handle address space",
                    span,
                )),
                Type::Reference {
                    base: ty,
                    space,
                    access,
                } => Ok(ExpressionInfo {
                    ty: Some(Type::Pointer {
                        base: ty,
                        space,
                        access,
                    }),
                    stage: EvaluationStage::Runtime,
                    ..base
                }),
                _ => Err(self.error("cannot take the address of expression", span)),
            },
            UnaryOperator::Deref => match operand.into_loaded() {
                Type::Pointer {
                    base: ty,
                    space,
                    access,
                } => Ok(ExpressionInfo {
                    ty: Some(Type::Reference {
                        base: ty,
                        space,
                        access,
                    }),
                    stage: EvaluationStage::Runtime,
                    ..base
                }),
                other => Err(self.error(
                    format!("cannot dereference expression of type '{other}'"),
                    span,
                )),
            },
            UnaryOperator::Negate | UnaryOperator::LogicalNot | UnaryOperator::Complement => {
                let ty = operand.into_loaded();
                let valid = ty.shape().is_some()
                    && ty.scalar().map_or(false, |scalar| match op {
                        UnaryOperator::Negate => scalar.is_numeric() && scalar.is_signed(),
                        UnaryOperator::LogicalNot => scalar == Scalar::Bool,
                        _ => scalar.is_integer(),
                    });
                if !valid {
                    return Err(self.error(
                        format!("no matching overload for operator {} ({ty})", op.as_str()),
                        span,
                    ));
                }
                let value = match operand_value {
                    Some(value) => value
                        .unary(op)
                        .map_err(|err| self.error(err.to_string(), span))?,
                    None => None,
                };
                Ok(ExpressionInfo {
                    ty: Some(ty),
                    value,
                    ..base
                })
            }
        }
    }

    fn binary(
        &mut self,
        op: BinaryOperator,
        left: Handle<ast::Expression>,
        right: Handle<ast::Expression>,
        span: Span,
    ) -> Result<ExpressionInfo, Errored> {
        let lhs = self.value(left);
        let rhs = self.value(right);
        let (lhs, rhs) = (lhs?, rhs?);
        let Some(ty) = binary_result(op, &lhs, &rhs) else {
            return Err(self.error(
                format!("no matching overload for operator {} ({lhs}, {rhs})", op.as_str()),
                span,
            ));
        };

        let (left, right) = (self.expression_info(left), self.expression_info(right));
        let has_side_effects = left.has_side_effects || right.has_side_effects;
        let stage = left.stage.max(right.stage);
        let value = match (left.value, right.value) {
            (Some(a), Some(b)) => {
                fold_binary(op, a, b).map_err(|err| self.error(err.to_string(), span))?
            }
            _ => None,
        };
        Ok(ExpressionInfo {
            ty: Some(ty),
            has_side_effects,
            stage,
            value,
            ..Default::default()
        })
    }

    fn index(
        &mut self,
        base: Handle<ast::Expression>,
        index: Handle<ast::Expression>,
    ) -> Result<ExpressionInfo, Errored> {
        let base_ty = self.expression(base);
        let index_ty = self.value(index);
        let (base_ty, index_ty) = (base_ty?, index_ty?);
        let index_span = self.module.expression_span(index);
        if !matches!(index_ty, Type::Scalar(scalar) if scalar.is_integer()) {
            return Err(self.error(
                format!("index must be of type 'i32' or 'u32', found: '{index_ty}'"),
                index_span,
            ));
        }

        let shown = base_ty.clone();
        let (inner, memory) = split_memory(base_ty);
        let (element, len) = match inner {
            Type::Array { base, size } => {
                let len = match size {
                    ArraySize::Constant(count) => Some(count as usize),
                    ArraySize::Runtime => None,
                };
                (*base, len)
            }
            Type::Vector { size, scalar } => (Type::Scalar(scalar), Some(size.count())),
            Type::Matrix {
                columns,
                rows,
                scalar,
            } => (
                Type::Vector {
                    size: rows,
                    scalar,
                },
                Some(columns.count()),
            ),
            _ => {
                return Err(self.error(
                    format!("cannot index type '{shown}'"),
                    self.module.expression_span(base),
                ))
            }
        };

        let (base_info, index_info) = (self.expression_info(base), self.expression_info(index));
        let has_side_effects = base_info.has_side_effects || index_info.has_side_effects;
        let stage = base_info.stage.max(index_info.stage);
        let constant_index = index_info.value.and_then(Value::as_int);
        if let (Some(len), Some(i)) = (len, constant_index) {
            if i < 0 || i as usize >= len {
                return Err(self.error(
                    format!("index {i} out of bounds [0..{}]", len - 1),
                    index_span,
                ));
            }
        }

        Ok(ExpressionInfo {
            ty: Some(in_memory(element, memory)),
            has_side_effects,
            stage,
            ..Default::default()
        })
    }

    fn member(
        &mut self,
        base: Handle<ast::Expression>,
        member: &ast::Ident,
    ) -> Result<ExpressionInfo, Errored> {
        let base_ty = self.expression(base)?;
        let (has_side_effects, stage) = {
            let info = self.expression_info(base);
            (info.has_side_effects, info.stage)
        };
        let (inner, memory) = split_memory(base_ty);

        let ty = match inner {
            Type::Struct { decl, .. } => match self.struct_member(decl, &member.name) {
                Some(ty) => in_memory(ty, memory),
                None => {
                    return Err(self.error(
                        format!("struct member {} not found", member.name),
                        member.span,
                    ))
                }
            },
            Type::Predeclared(predeclared) => {
                match predeclared
                    .members()
                    .into_iter()
                    .find(|&(name, _)| name == member.name)
                {
                    Some((_, ty)) => in_memory(ty, memory),
                    None => {
                        return Err(self.error(
                            format!("struct member {} not found", member.name),
                            member.span,
                        ))
                    }
                }
            }
            Type::Vector { size, scalar } => {
                let indices = self.swizzle(member, size)?;
                match VectorSize::from_count(indices.len()) {
                    Some(size) => Type::Vector { size, scalar },
                    None => in_memory(Type::Scalar(scalar), memory),
                }
            }
            other => {
                return Err(self.error(
                    format!(
                        "invalid member accessor expression. Expected vector or struct, got \
                         '{other}'"
                    ),
                    member.span,
                ))
            }
        };

        Ok(ExpressionInfo {
            ty: Some(ty),
            has_side_effects,
            stage,
            ..Default::default()
        })
    }

    /// Component indices selected by a swizzle like `.xy` or `.rgba`.
    fn swizzle(&mut self, member: &ast::Ident, size: VectorSize) -> Result<Vec<usize>, Errored> {
        let mut components = Vec::with_capacity(member.name.len());
        for c in member.name.chars() {
            let component = match c {
                'x' => (0, true),
                'y' => (1, true),
                'z' => (2, true),
                'w' => (3, true),
                'r' => (0, false),
                'g' => (1, false),
                'b' => (2, false),
                'a' => (3, false),
                _ => return Err(self.error("invalid vector swizzle character", member.span)),
            };
            components.push(component);
        }

        let xyzw = components.iter().any(|&(_, xyzw)| xyzw);
        let rgba = components.iter().any(|&(_, xyzw)| !xyzw);
        if xyzw && rgba {
            return Err(self.error(
                "invalid mixing of vector swizzle characters rgba with xyzw",
                member.span,
            ));
        }
        if components.len() > 4 {
            return Err(self.error("invalid vector swizzle size", member.span));
        }
        if components.iter().any(|&(i, _)| i >= size.count()) {
            return Err(self.error("invalid vector swizzle member", member.span));
        }
        Ok(components.into_iter().map(|(i, _)| i).collect())
    }
}

const fn is_depth(kind: TextureKind) -> bool {
    matches!(kind, TextureKind::Depth | TextureKind::DepthMultisampled)
}

fn kind_is_multi(name: &str) -> bool {
    name.contains("multisampled")
}

#[cfg(test)]
mod tests {
    use super::super::{resolve_with_diagnostics, tests::diagnostics, Options};
    use super::*;
    use crate::front::wgsl::parse_str;

    /// The type of the initializer of the first `let` in `main`.
    fn let_type(body: &str) -> String {
        let source = format!("fn main() {{ {body} }}");
        let module = parse_str(&source).unwrap();
        let info = resolve_with_diagnostics(&module, &Options::default());
        assert!(
            !info.diagnostics.contains_errors(),
            "{}",
            info.diagnostics.to_plain_string(&source)
        );
        let function = module.functions().next().unwrap();
        let init = function
            .body
            .statements
            .iter()
            .find_map(|stmt| match stmt.kind {
                ast::StatementKind::Declaration(ref var)
                    if matches!(var.kind, ast::VariableKind::Let) =>
                {
                    var.initializer
                }
                _ => None,
            })
            .unwrap();
        info.type_of(init).unwrap().to_string()
    }

    #[test]
    fn operator_types() {
        assert_eq!(let_type("let x = 1 + 2 * 3;"), "abstract-int");
        assert_eq!(let_type("let x = 1 + 2.5;"), "abstract-float");
        assert_eq!(let_type("let x = vec3(1.0, 2.0, 3.0) * 2.0;"), "vec3<abstract-float>");
        assert_eq!(let_type("let x = vec3<f32>(1.0) * 2;"), "vec3<f32>");
        assert_eq!(let_type("let x = mat2x3<f32>() * vec2f();"), "vec3<f32>");
        assert_eq!(let_type("let x = vec4(1u) < vec4(2u);"), "vec4<bool>");
        assert_eq!(let_type("let x = 1i << 3u;"), "i32");
        assert_eq!(let_type("let x = array(1, 2u, 3);"), "array<u32, 3>");
        assert_eq!(let_type("let x = vec2(1, 2).yx;"), "vec2<abstract-int>");
        assert_eq!(let_type("let x = bitcast<u32>(1.0f);"), "u32");
        assert_eq!(let_type("let x = frexp(1.5f).exp;"), "i32");
    }

    #[test]
    fn references_and_pointers() {
        assert_eq!(let_type("var v: vec4<f32>; let x = v.x;"), "ref<function, f32, read_write>");
        assert_eq!(let_type("var v: vec4<f32>; let x = &v;"), "ptr<function, vec4<f32>, read_write>");
        assert_eq!(let_type("var a: array<i32, 2>; let x = (&a)[1];"), "ref<function, i32, read_write>");
    }

    #[test]
    fn constants_fold() {
        let source = "const a = -(3 << 2u) / 4;";
        let module = parse_str(source).unwrap();
        let info = resolve_with_diagnostics(&module, &Options::default());
        let &decl = info.declaration_order().first().unwrap();
        assert_eq!(info.variable(decl).unwrap().value, Some(Value::AbstractInt(-3)));
    }

    #[test]
    fn side_effects_compose() {
        let source = "
            @group(0) @binding(0) var<storage, read_write> counter: atomic<u32>;
            fn se() -> i32 { return 1; }
            fn main() {
                let a = se();
                let b = 1 + abs(-2);
                let c = atomicAdd(&counter, 1u) + 1u;
                let d = f32(se()) * 2.0;
                let e = dpdx(1.0);
                let f = vec2(1, se()).x;
            }
        ";
        let module = parse_str(source).unwrap();
        let info = resolve_with_diagnostics(&module, &Options::default());
        assert!(!info.diagnostics.contains_errors(), "{:?}", info.diagnostics);
        let main = module.functions().find(|f| f.name.name == "main").unwrap();
        let effects: Vec<bool> = main
            .body
            .statements
            .iter()
            .filter_map(|stmt| match stmt.kind {
                ast::StatementKind::Declaration(ref var) => var.initializer,
                _ => None,
            })
            .map(|init| info.has_side_effects(init))
            .collect();
        assert_eq!(effects, [true, false, true, true, false, true]);
    }

    #[test]
    fn identifier_errors() {
        assert_eq!(
            diagnostics("fn main() { let x = y; }"),
            "1:21 error: unresolved identifier 'y'"
        );
        assert_eq!(
            diagnostics("fn main() { let x = max; }"),
            "1:21 error: missing '(' for builtin function call"
        );
        assert_eq!(
            diagnostics("fn f() {} fn main() { let x = f; }"),
            "1:31 error: cannot use function 'f' as value"
        );
        assert_eq!(
            diagnostics("fn main() { let x: flaot = 1.0; }"),
            "1:20 error: unresolved type 'flaot'"
        );
        assert_eq!(
            diagnostics("fn main() { let x = vec3<f32>; }"),
            "1:21 error: cannot use type 'vec3<f32>' as value"
        );
    }

    #[test]
    fn call_errors() {
        assert_eq!(
            diagnostics("fn f(a: i32) {} fn main() { f(); }"),
            "1:29 error: too few arguments in call to 'f', expected 1, got 0"
        );
        assert_eq!(
            diagnostics("fn f(a: i32) {} fn main() { f(1.5); }"),
            "1:31 error: type mismatch for argument 1 in call to 'f', expected 'i32', got \
             'abstract-float'"
        );
        assert_eq!(
            diagnostics("fn f() {} fn main() { let x = f(); }"),
            "1:31 error: function 'f' does not return a value"
        );
        assert_eq!(
            diagnostics("fn main() { let x = vec3<f32>(1.0, 2.0); }"),
            "1:21 error: no matching constructor for vec3<f32>(abstract-float, abstract-float)"
        );
        assert_eq!(
            diagnostics("struct S { a: i32, b: f32 } fn main() { let s = S(1); }"),
            "1:49 error: structure constructor has too few inputs: expected 2, found 1"
        );
    }

    #[test]
    fn operator_errors() {
        assert_eq!(
            diagnostics("fn main() { let x = 1.0f + 1i; }"),
            "1:21 error: no matching overload for operator + (f32, i32)"
        );
        assert_eq!(
            diagnostics("fn main() { let x = -1u; }"),
            "1:21 error: no matching overload for operator - (u32)"
        );
        assert_eq!(
            diagnostics("const x = 1 / 0;"),
            "1:11 error: integer division by zero is invalid"
        );
        assert_eq!(
            diagnostics("fn main() { let x = 1.0; let y = x[0]; }"),
            "1:34 error: cannot index type 'f32'"
        );
        assert_eq!(
            diagnostics("fn main() { let v = vec3(1.0); let y = v.xr; }"),
            "1:42 error: invalid mixing of vector swizzle characters rgba with xyzw"
        );
        assert_eq!(
            diagnostics("fn main() { let v = vec2(1.0); let y = v.z; }"),
            "1:42 error: invalid vector swizzle member"
        );
    }

    #[test]
    fn type_errors() {
        assert_eq!(
            diagnostics("var<private> a: array<f32, 0>;"),
            "1:28 error: array count (0) must be greater than 0"
        );
        assert_eq!(
            diagnostics("var<private> h: f16;"),
            "1:17 error: f16 type used without 'f16' extension enabled"
        );
        assert_eq!(diagnostics("enable f16; var<private> h: vec2h;"), "");
        assert_eq!(
            diagnostics("var<private> a: atomic<f32>;"),
            "1:17 error: atomic only supports i32 or u32 types"
        );
    }
}
