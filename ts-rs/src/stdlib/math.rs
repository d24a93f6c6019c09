//! `math` group: `min`, `max`, `abs` and real-to-int rounding.

use crate::def::PrimitiveType::{self, Bool, Int, Real};
use crate::ffi::{FfiGroup, FunctionDefinition};
use crate::interp::Value;

use super::{get_bool, get_int, get_real};

pub fn group() -> FfiGroup {
    let mut functions = Vec::new();
    for (name, pick_max) in [("min", false), ("max", true)] {
        functions.push(binary(name, Bool, move |args| {
            let (a, b) = (get_bool(args, 0, name)?, get_bool(args, 1, name)?);
            Ok(Value::Bool(if pick_max { a || b } else { a && b }))
        }));
        functions.push(binary(name, Int, move |args| {
            let (a, b) = (get_int(args, 0, name)?, get_int(args, 1, name)?);
            Ok(Value::Int(if pick_max { a.max(b) } else { a.min(b) }))
        }));
        functions.push(binary(name, Real, move |args| {
            let (a, b) = (get_real(args, 0, name)?, get_real(args, 1, name)?);
            Ok(Value::Real(if pick_max { a.max(b) } else { a.min(b) }))
        }));
    }

    for (name, round) in [("ceil", f64::ceil as fn(f64) -> f64), ("floor", f64::floor), ("round", f64::round)] {
        functions.push(
            FunctionDefinition::function(name, &[Real], Int, move |_, args| {
                Ok(Some(Value::Int(round(get_real(args, 0, name)?) as i64)))
            })
            .with_doc("Round a real to an integer."),
        );
    }

    functions.push(FunctionDefinition::function("abs", &[Int], Int, |_, args| {
        Ok(Some(Value::Int(get_int(args, 0, "abs")?.wrapping_abs())))
    }));
    functions.push(FunctionDefinition::function("abs", &[Real], Real, |_, args| {
        Ok(Some(Value::Real(get_real(args, 0, "abs")?.abs())))
    }));

    FfiGroup::new("math", functions)
}

fn binary<F>(name: &'static str, ty: PrimitiveType, f: F) -> FunctionDefinition
where
    F: Fn(&[Value]) -> Result<Value, crate::ffi::FfiError> + Send + Sync + 'static,
{
    FunctionDefinition::function(name, &[ty, ty], ty, move |_, args| f(args).map(Some))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::testing::call;

    fn eval(name: &str, types: &[PrimitiveType], args: &[Value]) -> Value {
        call(&group(), name, types, args, &mut ()).unwrap().unwrap()
    }

    #[test]
    fn min_max_overloads() {
        assert_eq!(eval("min", &[Int, Int], &[Value::Int(3), Value::Int(-2)]), Value::Int(-2));
        assert_eq!(eval("max", &[Real, Real], &[Value::Real(1.5), Value::Real(0.5)]), Value::Real(1.5));
        assert_eq!(eval("max", &[Bool, Bool], &[Value::Bool(false), Value::Bool(true)]), Value::Bool(true));
        assert_eq!(eval("min", &[Bool, Bool], &[Value::Bool(false), Value::Bool(true)]), Value::Bool(false));
    }

    #[test]
    fn rounding() {
        assert_eq!(eval("ceil", &[Real], &[Value::Real(1.2)]), Value::Int(2));
        assert_eq!(eval("floor", &[Real], &[Value::Real(-1.2)]), Value::Int(-2));
        assert_eq!(eval("round", &[Real], &[Value::Real(2.5)]), Value::Int(3));
    }

    #[test]
    fn abs_int_and_real() {
        assert_eq!(eval("abs", &[Int], &[Value::Int(-4)]), Value::Int(4));
        assert_eq!(eval("abs", &[Real], &[Value::Real(-0.25)]), Value::Real(0.25));
    }

    #[test]
    fn all_definitions_register() {
        assert!(group().functions.iter().all(|d| d.validate().is_ok()));
    }
}
