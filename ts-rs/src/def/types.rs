//! Primitive types and the static tables that govern conversion, promotion
//! and operator use.
//!
//! Ranks (lowest → highest):
//!   void  →  delayed  →  bool  →  int  →  real  →  string
//!
//! A conversion is allowed "upwards" only: `bool → int → real` widen, and
//! every concrete type stringifies.  A string never converts back.

use std::fmt;

use super::ast::PrimaryOp;

// ── PrimitiveType ─────────────────────────────────────────────────────────────

/// The type of a variable, expression, input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PrimitiveType {
    /// No value (a unit without output, an FFI function returning nothing).
    Void,
    /// Not yet known; must be decided before the value can be used.
    #[default]
    Delayed,
    Bool,
    Int,
    Real,
    String,
}

/// Every primitive type, in rank order.
pub const ALL_PRIMITIVE_TYPES: [PrimitiveType; 6] = [
    PrimitiveType::Void,
    PrimitiveType::Delayed,
    PrimitiveType::Bool,
    PrimitiveType::Int,
    PrimitiveType::Real,
    PrimitiveType::String,
];

impl PrimitiveType {
    /// Position in the promotion order.
    pub fn rank(self) -> u32 {
        match self {
            PrimitiveType::Void => 0,
            PrimitiveType::Delayed => 1,
            PrimitiveType::Bool => 2,
            PrimitiveType::Int => 3,
            PrimitiveType::Real => 4,
            PrimitiveType::String => 5,
        }
    }

    /// `true` for the four types a runtime value can actually have.
    pub fn is_concrete(self) -> bool {
        !matches!(self, PrimitiveType::Void | PrimitiveType::Delayed)
    }

    /// Parse a type name as written after `name:` in an `input` list.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(PrimitiveType::Bool),
            "int" | "integer" => Some(PrimitiveType::Int),
            "real" => Some(PrimitiveType::Real),
            "string" => Some(PrimitiveType::String),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Void => "void",
            PrimitiveType::Delayed => "delayed",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int => "integer",
            PrimitiveType::Real => "real",
            PrimitiveType::String => "string",
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Conversion and promotion ──────────────────────────────────────────────────

/// Whether a value of type `from` may be implicitly converted to `to`.
pub fn allow_primitive_conversion(from: PrimitiveType, to: PrimitiveType) -> bool {
    if !from.is_concrete() || !to.is_concrete() {
        return false;
    }
    if from == PrimitiveType::String {
        return to == PrimitiveType::String;
    }
    to.rank() >= from.rank()
}

/// The type two operands are promoted to when combined: the higher rank.
pub fn select_primitive_promotion(a: PrimitiveType, b: PrimitiveType) -> PrimitiveType {
    if a.rank() >= b.rank() {
        a
    } else {
        b
    }
}

/// Whether arithmetic operator `op` may be applied.
///
/// `left == None` asks about unary use (`-x`, or a bare value).  A missing
/// right operand for a binary operator is never allowed.
pub fn op_allowed(left: Option<PrimitiveType>, op: PrimaryOp, right: Option<PrimitiveType>) -> bool {
    let Some(left) = left else {
        // unary
        return match op {
            PrimaryOp::Value => true,
            PrimaryOp::Sub => matches!(
                right,
                Some(PrimitiveType::Int | PrimitiveType::Real)
            ),
            _ => false,
        };
    };
    if op == PrimaryOp::Value {
        return left.is_concrete();
    }
    let Some(right) = right else { return false };
    if !left.is_concrete() || !right.is_concrete() {
        return false;
    }
    if left == PrimitiveType::String || right == PrimitiveType::String {
        return op == PrimaryOp::Add;
    }
    if left == PrimitiveType::Bool || right == PrimitiveType::Bool {
        return false;
    }
    true
}

/// Whether a `for` loop may step a variable of this type.
pub fn steppable_primitive(ty: PrimitiveType) -> bool {
    matches!(ty, PrimitiveType::Int | PrimitiveType::Real)
}

/// Absolute rank distance between two types; the per-argument cost used to
/// rank FFI overloads.
pub fn conversion_delta(from: PrimitiveType, to: PrimitiveType) -> u32 {
    from.rank().abs_diff(to.rank())
}

#[cfg(test)]
mod tests {
    use super::*;
    use PrimitiveType::*;

    #[test]
    fn widening_is_allowed() {
        assert!(allow_primitive_conversion(Bool, Int));
        assert!(allow_primitive_conversion(Int, Real));
        assert!(allow_primitive_conversion(Int, String));
        assert!(allow_primitive_conversion(Real, Real));
    }

    #[test]
    fn narrowing_is_rejected() {
        assert!(!allow_primitive_conversion(Real, Int));
        assert!(!allow_primitive_conversion(Int, Bool));
        assert!(!allow_primitive_conversion(String, Int));
        assert!(!allow_primitive_conversion(String, Bool));
    }

    #[test]
    fn void_and_delayed_never_convert() {
        for ty in ALL_PRIMITIVE_TYPES {
            assert!(!allow_primitive_conversion(Void, ty));
            assert!(!allow_primitive_conversion(ty, Delayed));
        }
    }

    #[test]
    fn promotion_picks_higher_rank() {
        assert_eq!(select_primitive_promotion(Int, Real), Real);
        assert_eq!(select_primitive_promotion(String, Bool), String);
        assert_eq!(select_primitive_promotion(Int, Int), Int);
    }

    #[test]
    fn string_only_concatenates() {
        assert!(op_allowed(Some(String), PrimaryOp::Add, Some(Int)));
        assert!(!op_allowed(Some(String), PrimaryOp::Mul, Some(String)));
    }

    #[test]
    fn bool_has_no_arithmetic() {
        assert!(!op_allowed(Some(Bool), PrimaryOp::Add, Some(Bool)));
        assert!(op_allowed(Some(Bool), PrimaryOp::Value, None));
    }

    #[test]
    fn unary_minus_only_on_numbers() {
        assert!(op_allowed(None, PrimaryOp::Sub, Some(Int)));
        assert!(op_allowed(None, PrimaryOp::Sub, Some(Real)));
        assert!(!op_allowed(None, PrimaryOp::Sub, Some(String)));
        assert!(!op_allowed(Some(Int), PrimaryOp::Add, None));
    }

    #[test]
    fn only_numbers_step() {
        assert!(steppable_primitive(Int));
        assert!(steppable_primitive(Real));
        assert!(!steppable_primitive(Bool));
        assert!(!steppable_primitive(String));
    }

    #[test]
    fn type_names_round_trip() {
        assert_eq!(PrimitiveType::from_name("integer"), Some(Int));
        assert_eq!(PrimitiveType::from_name("int"), Some(Int));
        assert_eq!(PrimitiveType::from_name("void"), None);
    }
}
