//! Argument-list matching against unit inputs and FFI signatures.

use super::ast::Input;
use super::types::{allow_primitive_conversion, conversion_delta, PrimitiveType};

/// The first argument whose type does not fit its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatch {
    pub index: usize,
    pub from: PrimitiveType,
    pub to: PrimitiveType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentMatch {
    Match,
    CountMismatch,
    TypeMismatch(TypeMismatch),
}

/// Closeness of an argument list to an FFI signature of the same arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfiArgumentMatch {
    /// Summed rank distance over all arguments.
    pub delta: u32,
    /// Last disallowed conversion, if any.
    pub mismatch: Option<TypeMismatch>,
}

/// Declared input types, or `None` while any input is still untyped.
pub fn argument_types_from_input(input: &[Input]) -> Option<Vec<PrimitiveType>> {
    input.iter().map(|i| i.declared.filter(|t| t.is_concrete())).collect()
}

pub fn argument_count_match(input: &[PrimitiveType], arguments: &[PrimitiveType]) -> ArgumentMatch {
    if input.len() == arguments.len() {
        ArgumentMatch::Match
    } else {
        ArgumentMatch::CountMismatch
    }
}

/// Unit signatures: no implicit conversion, every position must be identical.
pub fn argument_types_match_input(
    input: &[PrimitiveType],
    arguments: &[PrimitiveType],
) -> ArgumentMatch {
    if argument_count_match(input, arguments) != ArgumentMatch::Match {
        return ArgumentMatch::CountMismatch;
    }
    for (index, (&to, &from)) in input.iter().zip(arguments).enumerate() {
        if to != from {
            return ArgumentMatch::TypeMismatch(TypeMismatch { index, from, to });
        }
    }
    ArgumentMatch::Match
}

/// FFI signatures: each argument may convert, and the deltas are summed so
/// overloads can be ranked.  `None` on a count mismatch.
pub fn argument_types_match_ffi(
    parameters: &[PrimitiveType],
    arguments: &[PrimitiveType],
) -> Option<FfiArgumentMatch> {
    if parameters.len() != arguments.len() {
        return None;
    }
    let mut result = FfiArgumentMatch { delta: 0, mismatch: None };
    for (index, (&to, &from)) in parameters.iter().zip(arguments).enumerate() {
        if !allow_primitive_conversion(from, to) {
            result.mismatch = Some(TypeMismatch { index, from, to });
        }
        result.delta += conversion_delta(from, to);
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use PrimitiveType::*;

    #[test]
    fn unit_match_is_exact() {
        assert_eq!(argument_types_match_input(&[Int, Real], &[Int, Real]), ArgumentMatch::Match);
        assert_eq!(
            argument_types_match_input(&[Real], &[Int]),
            ArgumentMatch::TypeMismatch(TypeMismatch { index: 0, from: Int, to: Real })
        );
        assert_eq!(argument_types_match_input(&[Int], &[]), ArgumentMatch::CountMismatch);
    }

    #[test]
    fn ffi_delta_sums_rank_distance() {
        let m = argument_types_match_ffi(&[Real, String], &[Int, Bool]).unwrap();
        assert_eq!(m.delta, 1 + 3);
        assert_eq!(m.mismatch, None);
    }

    #[test]
    fn ffi_records_disallowed_conversion() {
        let m = argument_types_match_ffi(&[Bool, Bool], &[Int, Int]).unwrap();
        assert_eq!(m.mismatch, Some(TypeMismatch { index: 1, from: Int, to: Bool }));
        assert_eq!(m.delta, 2);
        assert!(argument_types_match_ffi(&[Int], &[Int, Int]).is_none());
    }

    #[test]
    fn untyped_input_is_incomplete() {
        let typed = [Input { name: "a".into(), declared: Some(Int) }];
        assert_eq!(argument_types_from_input(&typed), Some(vec![Int]));
        let untyped = [Input { name: "a".into(), declared: None }];
        assert_eq!(argument_types_from_input(&untyped), None);
    }
}
