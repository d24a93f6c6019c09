//! Runtime values.
//!
//! Types are settled by the resolver, so a value only converts when the
//! resolved tree asks it to: arithmetic runs on operands already converted to
//! the chain's effective type.

use std::fmt;

use crate::def::{PrimaryOp, PrimitiveType, StepDirection};

use super::Exception;

/// A script runtime value.  Also the FFI argument/output representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Real(x) => write!(f, "{x:.6}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl Value {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Value::Bool(_) => PrimitiveType::Bool,
            Value::Int(_) => PrimitiveType::Int,
            Value::Real(_) => PrimitiveType::Real,
            Value::Str(_) => PrimitiveType::String,
        }
    }

    /// Zero value of a concrete type; what an unassigned variable reads as.
    pub fn default_for(ty: PrimitiveType) -> Option<Value> {
        match ty {
            PrimitiveType::Bool => Some(Value::Bool(false)),
            PrimitiveType::Int => Some(Value::Int(0)),
            PrimitiveType::Real => Some(Value::Real(0.0)),
            PrimitiveType::String => Some(Value::Str(String::new())),
            PrimitiveType::Void | PrimitiveType::Delayed => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Real(x) => *x != 0.0,
            Value::Str(s) => s == "true",
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Bool(b) => i64::from(*b),
            Value::Int(n) => *n,
            Value::Real(x) => *x as i64,
            Value::Str(s) => leading_int(s),
        }
    }

    pub fn as_real(&self) -> f64 {
        match self {
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Int(n) => *n as f64,
            Value::Real(x) => *x,
            Value::Str(s) => leading_real(s),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Value::Str(s) => s,
            other => other.to_string(),
        }
    }

    /// Convert to `ty`.  `Void`/`Delayed` leave the value unchanged.
    pub fn convert(self, ty: PrimitiveType) -> Value {
        match ty {
            PrimitiveType::Bool => Value::Bool(self.as_bool()),
            PrimitiveType::Int => Value::Int(self.as_int()),
            PrimitiveType::Real => Value::Real(self.as_real()),
            PrimitiveType::String => Value::Str(self.into_string()),
            PrimitiveType::Void | PrimitiveType::Delayed => self,
        }
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    /// Apply `op` to two operands already converted to the same type.
    pub fn arith(&self, op: PrimaryOp, rhs: &Value) -> Result<Value, Exception> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => int_arith(*a, op, *b).map(Value::Int),
            (Value::Real(a), Value::Real(b)) => Ok(Value::Real(real_arith(*a, op, *b))),
            (Value::Str(a), Value::Str(b)) if op == PrimaryOp::Add => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(Value::Str(s))
            }
            // mixed operands: promote the pair and retry
            (a, b) if a.primitive_type() != b.primitive_type() => {
                let ty = crate::def::select_primitive_promotion(a.primitive_type(), b.primitive_type());
                a.clone().convert(ty).arith(op, &b.clone().convert(ty))
            }
            _ => Ok(self.clone()),
        }
    }

    /// Advance a `for` variable by `step`, which has the same type.  `None`
    /// when the value cannot move any further: integer overflow, or a real
    /// too large to change.
    pub fn checked_step(&self, step: &Value, direction: StepDirection) -> Option<Value> {
        match (self, step, direction) {
            (Value::Int(a), Value::Int(b), StepDirection::Up) => a.checked_add(*b).map(Value::Int),
            (Value::Int(a), Value::Int(b), StepDirection::Down) => a.checked_sub(*b).map(Value::Int),
            (Value::Real(a), Value::Real(b), direction) => {
                let next = match direction {
                    StepDirection::Up => a + b,
                    StepDirection::Down => a - b,
                };
                (next != *a).then_some(Value::Real(next))
            }
            _ => None,
        }
    }

    pub fn negate(self) -> Value {
        match self {
            Value::Int(n) => Value::Int(n.wrapping_neg()),
            Value::Real(x) => Value::Real(-x),
            other => other,
        }
    }

    /// Ordering for comparison chains; both sides share a type.
    pub fn cmp_value(&self, rhs: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, rhs) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (a, b) => a.as_real().partial_cmp(&b.as_real()).unwrap_or(Ordering::Equal),
        }
    }
}

fn int_arith(a: i64, op: PrimaryOp, b: i64) -> Result<i64, Exception> {
    Ok(match op {
        PrimaryOp::Add => a.wrapping_add(b),
        PrimaryOp::Sub => a.wrapping_sub(b),
        PrimaryOp::Mul => a.wrapping_mul(b),
        PrimaryOp::Div => {
            if b == 0 {
                return Err(Exception::DivideByZero);
            }
            a.wrapping_div(b)
        }
        PrimaryOp::Mod => {
            if b == 0 {
                return Err(Exception::DivideByZero);
            }
            a.wrapping_rem(b)
        }
        PrimaryOp::Pow => int_pow(a, b),
        PrimaryOp::Value => a,
    })
}

fn int_pow(base: i64, exp: i64) -> i64 {
    if exp < 0 {
        // integer result of a fractional power
        return match base {
            1 => 1,
            -1 if exp % 2 == 0 => 1,
            -1 => -1,
            _ => 0,
        };
    }
    let exp = u32::try_from(exp).unwrap_or(u32::MAX);
    base.saturating_pow(exp)
}

fn real_arith(a: f64, op: PrimaryOp, b: f64) -> f64 {
    match op {
        PrimaryOp::Add => a + b,
        PrimaryOp::Sub => a - b,
        PrimaryOp::Mul => a * b,
        PrimaryOp::Div => a / b,
        PrimaryOp::Mod => a - (a / b).trunc() * b,
        PrimaryOp::Pow => a.powf(b),
        PrimaryOp::Value => a,
    }
}

/// Longest leading integer, `0` if there is none.
fn leading_int(s: &str) -> i64 {
    let t = s.trim_start();
    let end = t
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    t[..end].parse().unwrap_or(0)
}

/// Longest leading real, `0.0` if there is none.
fn leading_real(s: &str) -> f64 {
    let t = s.trim_start();
    let mut best = 0.0;
    for (i, c) in t.char_indices() {
        if let Ok(x) = t[..i + c.len_utf8()].parse::<f64>() {
            best = x;
        } else if !matches!(c, '-' | '+' | '.' | 'e' | 'E') {
            break;
        }
    }
    best
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
