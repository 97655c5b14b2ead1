//! Constant folding of scalar expressions.
//!
//! Only scalar values are folded. This is enough for array sizes, attribute
//! arguments, switch selectors and `const_assert`.

use super::types::Scalar;
use crate::ast::{BinaryOperator, Literal, UnaryOperator};

use std::fmt;

/// A constant scalar value.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Value {
    Bool(bool),
    AbstractInt(i64),
    AbstractFloat(f64),
    I32(i32),
    U32(u32),
    F32(f32),
    F16(f32),
}

/// Why a fold failed. The `Display` form is the diagnostic message.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("'{expression}' cannot be represented as '{ty}'")]
    Overflow {
        expression: String,
        ty: &'static str,
    },
    #[error("integer division by zero is invalid")]
    DivisionByZero,
    #[error("shift left value must be less than the bit width of the lhs, which is {bits}")]
    ShiftTooLarge { bits: u32 },
    #[error("value {value} cannot be represented as '{ty}'")]
    NotRepresentable { value: String, ty: &'static str },
}

const F16_MAX: f64 = 65504.0;

impl Value {
    pub fn from_literal(literal: Literal) -> Self {
        match literal {
            Literal::Bool(b) => Self::Bool(b),
            Literal::AbstractInt(i) => Self::AbstractInt(i),
            Literal::AbstractFloat(f) => Self::AbstractFloat(f),
            Literal::I32(i) => Self::I32(i),
            Literal::U32(u) => Self::U32(u),
            Literal::F32(f) => Self::F32(f),
            Literal::F16(f) => Self::F16(f),
        }
    }

    pub const fn scalar(self) -> Scalar {
        match self {
            Self::Bool(_) => Scalar::Bool,
            Self::AbstractInt(_) => Scalar::AbstractInt,
            Self::AbstractFloat(_) => Scalar::AbstractFloat,
            Self::I32(_) => Scalar::I32,
            Self::U32(_) => Scalar::U32,
            Self::F32(_) => Scalar::F32,
            Self::F16(_) => Scalar::F16,
        }
    }

    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The value as an integer, for integer scalars.
    pub const fn as_int(self) -> Option<i64> {
        match self {
            Self::AbstractInt(i) => Some(i),
            Self::I32(i) => Some(i as i64),
            Self::U32(u) => Some(u as i64),
            _ => None,
        }
    }

    fn as_float(self) -> f64 {
        match self {
            Self::Bool(b) => f64::from(u8::from(b)),
            Self::AbstractInt(i) => i as f64,
            Self::AbstractFloat(f) => f,
            Self::I32(i) => f64::from(i),
            Self::U32(u) => f64::from(u),
            Self::F32(f) | Self::F16(f) => f64::from(f),
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Bool(b) => !b,
            Self::AbstractInt(i) => i == 0,
            Self::I32(i) => i == 0,
            Self::U32(u) => u == 0,
            Self::AbstractFloat(_) | Self::F32(_) | Self::F16(_) => self.as_float() == 0.0,
        }
    }

    fn from_int(value: i64, scalar: Scalar) -> Option<Self> {
        Some(match scalar {
            Scalar::AbstractInt => Self::AbstractInt(value),
            Scalar::I32 => Self::I32(i32::try_from(value).ok()?),
            Scalar::U32 => Self::U32(u32::try_from(value).ok()?),
            _ => return None,
        })
    }

    fn from_float(value: f64, scalar: Scalar) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Some(match scalar {
            Scalar::AbstractFloat => Self::AbstractFloat(value),
            Scalar::F32 if value.abs() <= f64::from(f32::MAX) => Self::F32(value as f32),
            Scalar::F16 if value.abs() <= F16_MAX => Self::F16(value as f32),
            _ => return None,
        })
    }

    /// Convert to `target` the way a value conversion (`f32(x)`, `u32(x)`,
    /// or an implicit abstract conversion) does.
    pub fn convert(self, target: Scalar) -> Result<Self, EvalError> {
        if self.scalar() == target {
            return Ok(self);
        }
        let not_representable = || EvalError::NotRepresentable {
            value: self.to_string(),
            ty: target.name(),
        };
        match target {
            Scalar::Bool => Ok(Self::Bool(!self.is_zero())),
            Scalar::AbstractInt | Scalar::I32 | Scalar::U32 => match self {
                Self::Bool(b) => Self::from_int(i64::from(b), target).ok_or_else(not_representable),
                Self::AbstractInt(i) => Self::from_int(i, target).ok_or_else(not_representable),
                // Bit-preserving between the two 32-bit integer types.
                Self::I32(i) if target == Scalar::U32 => Ok(Self::U32(i as u32)),
                Self::U32(u) if target == Scalar::I32 => Ok(Self::I32(u as i32)),
                Self::I32(_) | Self::U32(_) => Err(not_representable()),
                Self::AbstractFloat(_) | Self::F32(_) | Self::F16(_) => {
                    // Float to integer conversion clamps.
                    let f = self.as_float().trunc();
                    let (min, max) = match target {
                        Scalar::I32 => (f64::from(i32::MIN), f64::from(i32::MAX)),
                        Scalar::U32 => (0.0, f64::from(u32::MAX)),
                        _ => (i64::MIN as f64, i64::MAX as f64),
                    };
                    Self::from_int(f.clamp(min, max) as i64, target).ok_or_else(not_representable)
                }
            },
            Scalar::AbstractFloat | Scalar::F32 | Scalar::F16 => {
                Self::from_float(self.as_float(), target).ok_or_else(not_representable)
            }
        }
    }

    pub fn unary(self, op: UnaryOperator) -> Result<Option<Self>, EvalError> {
        Ok(Some(match (op, self) {
            (UnaryOperator::LogicalNot, Self::Bool(b)) => Self::Bool(!b),
            (UnaryOperator::Complement, Self::AbstractInt(i)) => Self::AbstractInt(!i),
            (UnaryOperator::Complement, Self::I32(i)) => Self::I32(!i),
            (UnaryOperator::Complement, Self::U32(u)) => Self::U32(!u),
            (UnaryOperator::Negate, Self::AbstractInt(i)) => {
                Self::AbstractInt(i.checked_neg().ok_or_else(|| self.overflow("-", None))?)
            }
            (UnaryOperator::Negate, Self::I32(i)) => {
                Self::I32(i.checked_neg().ok_or_else(|| self.overflow("-", None))?)
            }
            (UnaryOperator::Negate, Self::AbstractFloat(f)) => Self::AbstractFloat(-f),
            (UnaryOperator::Negate, Self::F32(f)) => Self::F32(-f),
            (UnaryOperator::Negate, Self::F16(f)) => Self::F16(-f),
            _ => return Ok(None),
        }))
    }

    /// Fold a binary operation on two values already converted to a common
    /// scalar type. The shift amount is the exception: it is always unsigned.
    pub fn binary(self, op: BinaryOperator, rhs: Self) -> Result<Option<Self>, EvalError> {
        use BinaryOperator as Bo;

        if op.is_comparison() {
            let ordering = match (self, rhs) {
                (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(&b),
                _ => match (self.as_int(), rhs.as_int()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => self.as_float().partial_cmp(&rhs.as_float()),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(None);
            };
            let result = match op {
                Bo::Equal => ordering.is_eq(),
                Bo::NotEqual => ordering.is_ne(),
                Bo::Less => ordering.is_lt(),
                Bo::LessEqual => ordering.is_le(),
                Bo::Greater => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            return Ok(Some(Self::Bool(result)));
        }

        let scalar = self.scalar();
        match (self, rhs) {
            (Self::Bool(a), Self::Bool(b)) => Ok(match op {
                Bo::LogicalAnd | Bo::And => Some(Self::Bool(a && b)),
                Bo::LogicalOr | Bo::Or => Some(Self::Bool(a || b)),
                _ => None,
            }),
            _ if scalar.is_integer() => {
                let (Some(a), Some(b)) = (self.as_int(), rhs.as_int()) else {
                    return Ok(None);
                };
                let overflow = || self.overflow(op.as_str(), Some(rhs));
                let result = match op {
                    Bo::Add => self.wrap_check(a.checked_add(b), scalar),
                    Bo::Subtract => self.wrap_check(a.checked_sub(b), scalar),
                    Bo::Multiply => self.wrap_check(a.checked_mul(b), scalar),
                    Bo::Divide | Bo::Modulo if b == 0 => return Err(EvalError::DivisionByZero),
                    Bo::Divide => self.wrap_check(a.checked_div(b), scalar),
                    Bo::Modulo => self.wrap_check(a.checked_rem(b), scalar),
                    Bo::And => Self::from_int(a & b, scalar),
                    Bo::Or => Self::from_int(a | b, scalar),
                    Bo::Xor => Self::from_int(a ^ b, scalar),
                    Bo::ShiftLeft | Bo::ShiftRight => {
                        let bits = if scalar == Scalar::AbstractInt { 64 } else { 32 };
                        if b < 0 || b >= i64::from(bits) {
                            return Err(EvalError::ShiftTooLarge { bits });
                        }
                        let shifted = match (op, self) {
                            (Bo::ShiftRight, _) => a >> b,
                            (_, Self::I32(i)) => i64::from(i.wrapping_shl(b as u32)),
                            (_, Self::U32(u)) => i64::from(u.wrapping_shl(b as u32)),
                            _ => a.checked_shl(b as u32).ok_or_else(overflow)?,
                        };
                        Self::from_int(shifted, scalar)
                    }
                    _ => return Ok(None),
                };
                result.map(Some).ok_or_else(overflow)
            }
            _ if scalar.is_float() => {
                let (a, b) = (self.as_float(), rhs.as_float());
                let value = match op {
                    Bo::Add => a + b,
                    Bo::Subtract => a - b,
                    Bo::Multiply => a * b,
                    Bo::Divide => a / b,
                    Bo::Modulo => a % b,
                    _ => return Ok(None),
                };
                Self::from_float(value, scalar)
                    .map(Some)
                    .ok_or_else(|| self.overflow(op.as_str(), Some(rhs)))
            }
            _ => Ok(None),
        }
    }

    fn wrap_check(self, result: Option<i64>, scalar: Scalar) -> Option<Self> {
        result.and_then(|value| Self::from_int(value, scalar))
    }

    fn overflow(self, op: &str, rhs: Option<Self>) -> EvalError {
        let expression = match rhs {
            Some(rhs) => format!("{self} {op} {rhs}"),
            None => format!("{op}{self}"),
        };
        EvalError::Overflow {
            expression,
            ty: self.scalar().name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::AbstractInt(i) => write!(f, "{i}"),
            Self::I32(i) => write!(f, "{i}"),
            Self::U32(u) => write!(f, "{u}"),
            Self::AbstractFloat(v) => write!(f, "{v:?}"),
            Self::F32(v) | Self::F16(v) => write!(f, "{v:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic() {
        let a = Value::I32(7);
        assert_eq!(
            a.binary(BinaryOperator::Multiply, Value::I32(6)),
            Ok(Some(Value::I32(42)))
        );
        assert_eq!(
            a.binary(BinaryOperator::Divide, Value::I32(0)),
            Err(EvalError::DivisionByZero)
        );
        let err = Value::I32(i32::MAX)
            .binary(BinaryOperator::Add, Value::I32(1))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'2147483647 + 1' cannot be represented as 'i32'"
        );
        assert_eq!(
            Value::U32(1).binary(BinaryOperator::ShiftLeft, Value::U32(31)),
            Ok(Some(Value::U32(1 << 31)))
        );
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(
            Value::AbstractInt(3).binary(BinaryOperator::Less, Value::AbstractInt(4)),
            Ok(Some(Value::Bool(true)))
        );
        assert_eq!(
            Value::Bool(true).binary(BinaryOperator::LogicalAnd, Value::Bool(false)),
            Ok(Some(Value::Bool(false)))
        );
        assert_eq!(
            Value::Bool(true).unary(UnaryOperator::LogicalNot),
            Ok(Some(Value::Bool(false)))
        );
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::AbstractInt(5).convert(Scalar::F32), Ok(Value::F32(5.0)));
        assert_eq!(Value::I32(-1).convert(Scalar::U32), Ok(Value::U32(u32::MAX)));
        assert_eq!(Value::F32(1e10).convert(Scalar::I32), Ok(Value::I32(i32::MAX)));
        assert!(Value::AbstractInt(1 << 40).convert(Scalar::I32).is_err());
        assert!(Value::AbstractFloat(1e6).convert(Scalar::F16).is_err());
    }
}
