//! The `GLSL.std.450` extended instruction set.

use super::{function::FunctionEmitter, Error, Instruction};
use crate::{ast::BinaryOperator, resolve::BuiltinFunction as Bf};
use spirv::{GLOp, Word};

/// How an extended instruction's integer operands must be signed.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Signedness {
    /// Operands are used as they are.
    Keep,
    Signed,
    Unsigned,
    /// Only the second operand, `ldexp`'s exponent, is forced signed.
    SignedExponent,
}

fn map_glsl_op(op: GLOp) -> Option<(Bf, Signedness)> {
    use Signedness as S;
    Some(match op {
        GLOp::Round | GLOp::RoundEven => (Bf::Round, S::Keep),
        GLOp::Trunc => (Bf::Trunc, S::Keep),
        GLOp::FAbs => (Bf::Abs, S::Keep),
        GLOp::SAbs => (Bf::Abs, S::Signed),
        GLOp::FSign => (Bf::Sign, S::Keep),
        GLOp::SSign => (Bf::Sign, S::Signed),
        GLOp::Floor => (Bf::Floor, S::Keep),
        GLOp::Ceil => (Bf::Ceil, S::Keep),
        GLOp::Fract => (Bf::Fract, S::Keep),
        GLOp::Radians => (Bf::Radians, S::Keep),
        GLOp::Degrees => (Bf::Degrees, S::Keep),
        GLOp::Sin => (Bf::Sin, S::Keep),
        GLOp::Cos => (Bf::Cos, S::Keep),
        GLOp::Tan => (Bf::Tan, S::Keep),
        GLOp::Asin => (Bf::Asin, S::Keep),
        GLOp::Acos => (Bf::Acos, S::Keep),
        GLOp::Atan => (Bf::Atan, S::Keep),
        GLOp::Sinh => (Bf::Sinh, S::Keep),
        GLOp::Cosh => (Bf::Cosh, S::Keep),
        GLOp::Tanh => (Bf::Tanh, S::Keep),
        GLOp::Asinh => (Bf::Asinh, S::Keep),
        GLOp::Acosh => (Bf::Acosh, S::Keep),
        GLOp::Atanh => (Bf::Atanh, S::Keep),
        GLOp::Atan2 => (Bf::Atan2, S::Keep),
        GLOp::Pow => (Bf::Pow, S::Keep),
        GLOp::Exp => (Bf::Exp, S::Keep),
        GLOp::Log => (Bf::Log, S::Keep),
        GLOp::Exp2 => (Bf::Exp2, S::Keep),
        GLOp::Log2 => (Bf::Log2, S::Keep),
        GLOp::Sqrt => (Bf::Sqrt, S::Keep),
        GLOp::InverseSqrt => (Bf::InverseSqrt, S::Keep),
        GLOp::Determinant => (Bf::Determinant, S::Keep),
        GLOp::FMin | GLOp::NMin => (Bf::Min, S::Keep),
        GLOp::UMin => (Bf::Min, S::Unsigned),
        GLOp::SMin => (Bf::Min, S::Signed),
        GLOp::FMax | GLOp::NMax => (Bf::Max, S::Keep),
        GLOp::UMax => (Bf::Max, S::Unsigned),
        GLOp::SMax => (Bf::Max, S::Signed),
        GLOp::FClamp | GLOp::NClamp => (Bf::Clamp, S::Keep),
        GLOp::UClamp => (Bf::Clamp, S::Unsigned),
        GLOp::SClamp => (Bf::Clamp, S::Signed),
        GLOp::FMix => (Bf::Mix, S::Keep),
        GLOp::Step => (Bf::Step, S::Keep),
        GLOp::SmoothStep => (Bf::Smoothstep, S::Keep),
        GLOp::Fma => (Bf::Fma, S::Keep),
        GLOp::Ldexp => (Bf::Ldexp, S::SignedExponent),
        GLOp::PackSnorm4x8 => (Bf::Pack4x8Snorm, S::Keep),
        GLOp::PackUnorm4x8 => (Bf::Pack4x8Unorm, S::Keep),
        GLOp::PackSnorm2x16 => (Bf::Pack2x16Snorm, S::Keep),
        GLOp::PackUnorm2x16 => (Bf::Pack2x16Unorm, S::Keep),
        GLOp::PackHalf2x16 => (Bf::Pack2x16Float, S::Keep),
        GLOp::UnpackSnorm4x8 => (Bf::Unpack4x8Snorm, S::Keep),
        GLOp::UnpackUnorm4x8 => (Bf::Unpack4x8Unorm, S::Keep),
        GLOp::UnpackSnorm2x16 => (Bf::Unpack2x16Snorm, S::Keep),
        GLOp::UnpackUnorm2x16 => (Bf::Unpack2x16Unorm, S::Keep),
        GLOp::UnpackHalf2x16 => (Bf::Unpack2x16Float, S::Keep),
        GLOp::Length => (Bf::Length, S::Keep),
        GLOp::Distance => (Bf::Distance, S::Keep),
        GLOp::Cross => (Bf::Cross, S::Keep),
        GLOp::Normalize => (Bf::Normalize, S::Keep),
        GLOp::FaceForward => (Bf::FaceForward, S::Keep),
        GLOp::Reflect => (Bf::Reflect, S::Keep),
        GLOp::Refract => (Bf::Refract, S::Keep),
        GLOp::FindILsb => (Bf::FirstTrailingBit, S::Keep),
        GLOp::FindSMsb => (Bf::FirstLeadingBit, S::Signed),
        GLOp::FindUMsb => (Bf::FirstLeadingBit, S::Unsigned),
        _ => return None,
    })
}

impl FunctionEmitter<'_> {
    /// `OpExtInst`: ty, id, set, instruction, operands.
    pub(super) fn ext_inst(&mut self, inst: &Instruction) -> Result<(), Error> {
        inst.expect_at_least(5)?;
        let ops = &inst.operands;
        let (ty, id, set, number) = (ops[0], ops[1], ops[2], ops[3]);
        if Some(set) != self.parser.ext_glsl_id {
            return Err(Error::UnsupportedExtInst(number));
        }
        let (function, signedness) = GLOp::from_u32(number)
            .and_then(map_glsl_op)
            .ok_or(Error::UnsupportedExtInst(number))?;
        let args = &ops[4..];

        // WGSL's geometric builtins take vectors only.
        if let Some(scalar) = self.scalar_geometry(function, args)? {
            return self.define(id, ty, scalar, true);
        }

        let mut natural = ty;
        let mut arguments = Vec::with_capacity(args.len());
        for (position, &arg) in args.iter().enumerate() {
            let value = self.value(arg)?;
            let forced = match signedness {
                Signedness::Keep => None,
                Signedness::Signed => Some(true),
                Signedness::Unsigned => Some(false),
                Signedness::SignedExponent if position == 1 => Some(true),
                Signedness::SignedExponent => None,
            };
            let (expr, arg_ty) = match forced {
                Some(signed) => self.force_signedness(value, signed)?,
                None => value,
            };
            if position == 0 {
                natural = arg_ty;
            }
            arguments.push(expr);
        }
        let expr = self.builtin(function, arguments);
        let expr = match function {
            // These keep their operand's type, which may not be the
            // declared result's signedness.
            Bf::Abs
            | Bf::Sign
            | Bf::Min
            | Bf::Max
            | Bf::Clamp
            | Bf::FirstLeadingBit
            | Bf::FirstTrailingBit => self.reconcile(expr, natural, ty)?,
            _ => expr,
        };
        self.define(id, ty, expr, true)
    }

    /// `length`, `distance` and `normalize` on scalars, which WGSL only
    /// accepts for vectors.
    fn scalar_geometry(
        &mut self,
        function: Bf,
        args: &[Word],
    ) -> Result<Option<super::function::Expr>, Error> {
        let is_scalar = match args.first().and_then(|&arg| self.value_type(arg)) {
            Some(ty) => matches!(self.parser.scalar_info(ty), Some((_, 1))),
            None => false,
        };
        if !is_scalar {
            return Ok(None);
        }
        Ok(Some(match (function, args) {
            (Bf::Length, &[x]) => {
                let (x, _) = self.value(x)?;
                self.builtin(Bf::Abs, vec![x])
            }
            (Bf::Distance, &[a, b]) => {
                let (a, _) = self.value(a)?;
                let (b, _) = self.value(b)?;
                let difference = self.binary(BinaryOperator::Subtract, a, b);
                self.builtin(Bf::Abs, vec![difference])
            }
            (Bf::Normalize, &[x]) => {
                let (x, _) = self.value(x)?;
                self.builtin(Bf::Sign, vec![x])
            }
            _ => return Ok(None),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::{map_glsl_op, Signedness};
    use crate::resolve::BuiltinFunction as Bf;
    use spirv::GLOp;

    #[test]
    fn integer_variants_force_signedness() {
        assert_eq!(map_glsl_op(GLOp::SMax), Some((Bf::Max, Signedness::Signed)));
        assert_eq!(map_glsl_op(GLOp::UClamp), Some((Bf::Clamp, Signedness::Unsigned)));
        assert_eq!(map_glsl_op(GLOp::FMax), Some((Bf::Max, Signedness::Keep)));
        assert_eq!(
            map_glsl_op(GLOp::Ldexp),
            Some((Bf::Ldexp, Signedness::SignedExponent))
        );
    }

    #[test]
    fn unsupported_instructions() {
        assert_eq!(map_glsl_op(GLOp::MatrixInverse), None);
        assert_eq!(map_glsl_op(GLOp::Modf), None);
        assert_eq!(map_glsl_op(GLOp::InterpolateAtCentroid), None);
    }
}
