use proptest::prelude::*;
use ts::def::args::{argument_types_match_input, ArgumentMatch};
use ts::def::types::conversion_delta;
use ts::def::{
    construct_unit_from_string, select_primitive_promotion, DefErrorList, LookupError, Module,
    PrimitiveType, ALL_PRIMITIVE_TYPES,
};
use ts::ffi::{FfiGroup, FunctionDefinition};

fn any_type() -> impl Strategy<Value = PrimitiveType> {
    prop::sample::select(ALL_PRIMITIVE_TYPES.to_vec())
}

fn concrete_type() -> impl Strategy<Value = PrimitiveType> {
    prop::sample::select(vec![
        PrimitiveType::Bool,
        PrimitiveType::Int,
        PrimitiveType::Real,
        PrimitiveType::String,
    ])
}

fn stub(name: &str, arguments: &[PrimitiveType]) -> FunctionDefinition {
    FunctionDefinition::function(name, arguments, PrimitiveType::Int, |_, _| Ok(None))
}

proptest! {
    #[test]
    fn promotion_is_symmetric(a in any_type(), b in any_type()) {
        prop_assert_eq!(select_primitive_promotion(a, b), select_primitive_promotion(b, a));
    }

    #[test]
    fn promotion_is_associative(a in any_type(), b in any_type(), c in any_type()) {
        prop_assert_eq!(
            select_primitive_promotion(select_primitive_promotion(a, b), c),
            select_primitive_promotion(a, select_primitive_promotion(b, c))
        );
    }

    #[test]
    fn identical_lists_match(types in prop::collection::vec(any_type(), 0..8)) {
        prop_assert_eq!(argument_types_match_input(&types, &types), ArgumentMatch::Match);
    }

    #[test]
    fn length_mismatch_is_count_mismatch(
        a in prop::collection::vec(any_type(), 0..8),
        b in prop::collection::vec(any_type(), 0..8),
    ) {
        prop_assume!(a.len() != b.len());
        prop_assert_eq!(argument_types_match_input(&a, &b), ArgumentMatch::CountMismatch);
    }

    /// The overload with the smaller summed delta wins; on a tie the first
    /// registered one does.
    #[test]
    fn ffi_overload_choice_is_deterministic(
        args in prop::collection::vec(concrete_type(), 1..5),
        seed in prop::collection::vec((concrete_type(), concrete_type()), 5),
    ) {
        let first: Vec<PrimitiveType> = seed.iter().take(args.len()).map(|p| p.0).collect();
        let second: Vec<PrimitiveType> = seed.iter().take(args.len()).map(|p| p.1).collect();
        prop_assume!(first != second);

        let mut module = Module::new();
        module
            .add_ffi_group(FfiGroup::new("g", vec![stub("f", &first), stub("f", &second)]))
            .unwrap();
        let ids = module.groups()[0].objects.clone();

        let delta = |sig: &[PrimitiveType]| -> u32 {
            sig.iter().zip(&args).map(|(&to, &from)| conversion_delta(from, to)).sum()
        };
        let expected = if delta(&second) < delta(&first) { ids[1] } else { ids[0] };

        let chosen = match module.lookup_module_object("f", &args) {
            Ok(id) => id,
            Err(LookupError::TypeMismatch { object, .. }) => object,
            Err(e) => panic!("unexpected lookup error {e:?}"),
        };
        prop_assert_eq!(chosen, expected);
    }

    /// Construction never panics, whatever the input.
    #[test]
    fn construction_does_not_panic(s in "\\PC*") {
        let mut errors = DefErrorList::new();
        let _ = construct_unit_from_string(&s, "fuzz", &mut errors);
    }
}

#[test]
fn delta_two_beats_delta_five() {
    use PrimitiveType::*;
    let mut module = Module::new();
    // From (bool, bool): (string, real) is 3 + 2 = 5, (int, int) is 1 + 1 = 2.
    module
        .add_ffi_group(FfiGroup::new("g", vec![stub("f", &[String, Real]), stub("f", &[Int, Int])]))
        .unwrap();
    let ids = module.groups()[0].objects.clone();
    for _ in 0..10 {
        assert_eq!(module.lookup_module_object("f", &[Bool, Bool]), Ok(ids[1]));
    }
}
