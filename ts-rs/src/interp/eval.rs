//! Expression evaluation and call dispatch.

use std::cmp::Ordering;

use crate::def::{
    ComparisonExp, ComparisonOp, Exp, ExpValue, FunctionCall, LogicalExp, LogicalOp, ObjectKind,
    PrimaryExp, PrimaryOp, PrimitiveType,
};
use crate::ffi::{FunctionKind, Invocation};

use super::module::Interpreter;
use super::unit::UnitState;
use super::{Exception, Fault, Value};

impl<'m> Interpreter<'m> {
    pub(crate) fn eval_exp(&mut self, st: &mut UnitState<'m>, exp: &'m Exp) -> Result<Value, Fault> {
        match exp {
            Exp::Primary(primary) => self.eval_primary(st, primary),
            Exp::Comparison(comparison) => self.eval_comparison(st, comparison).map(Value::Bool),
            Exp::Logical(logical) => self.eval_logical(st, logical).map(Value::Bool),
        }
    }

    fn eval_value(&mut self, st: &mut UnitState<'m>, value: &'m ExpValue) -> Result<Value, Fault> {
        Ok(match value {
            ExpValue::Bool(b) => Value::Bool(*b),
            ExpValue::Int(n) => Value::Int(*n),
            ExpValue::Real(x) => Value::Real(*x),
            ExpValue::Str(s) => Value::Str(s.clone()),
            ExpValue::Variable(reference) => match reference.slot() {
                Some(slot) => st.read(slot, PrimitiveType::Delayed),
                None => return Err(self.raise(st, Exception::Ffi)),
            },
            ExpValue::Call(call) => match self.eval_call(st, call)? {
                Some(value) => value,
                None => return Err(self.raise(st, Exception::Ffi)),
            },
            ExpValue::Exp(exp) => self.eval_exp(st, exp)?,
        })
    }

    /// Evaluate a primary chain.  Operands are converted to the chain's
    /// effective type and combined by precedence climbing; `^` groups to the
    /// right.
    fn eval_primary(&mut self, st: &mut UnitState<'m>, primary: &'m PrimaryExp) -> Result<Value, Fault> {
        let ty = primary.effective_type;
        let mut values: Vec<Value> = Vec::with_capacity(primary.nodes.len());
        let mut ops: Vec<PrimaryOp> = Vec::new();

        for node in &primary.nodes {
            values.push(self.eval_value(st, &node.value)?.convert(ty));
            if node.op == PrimaryOp::Value {
                break;
            }
            while let Some(&top) = ops.last() {
                let binds_tighter = top.precedence() > node.op.precedence()
                    || (top.precedence() == node.op.precedence() && node.op != PrimaryOp::Pow);
                if !binds_tighter {
                    break;
                }
                ops.pop();
                self.reduce(st, &mut values, top)?;
            }
            ops.push(node.op);
        }
        while let Some(op) = ops.pop() {
            self.reduce(st, &mut values, op)?;
        }

        let Some(result) = values.pop() else {
            return Err(self.raise(st, Exception::Ffi));
        };
        Ok(if primary.negate { result.negate() } else { result })
    }

    fn reduce(&mut self, st: &UnitState<'m>, values: &mut Vec<Value>, op: PrimaryOp) -> Result<(), Fault> {
        let (Some(rhs), Some(lhs)) = (values.pop(), values.pop()) else {
            return Err(self.raise(st, Exception::Ffi));
        };
        match lhs.arith(op, &rhs) {
            Ok(value) => {
                values.push(value);
                Ok(())
            }
            Err(exception) => Err(self.raise(st, exception)),
        }
    }

    /// `a < b < c` holds when every link holds; stops at the first that fails.
    fn eval_comparison(&mut self, st: &mut UnitState<'m>, comparison: &'m ComparisonExp) -> Result<bool, Fault> {
        let mut operands = comparison.operands.iter();
        let Some(first) = operands.next() else {
            return Ok(false);
        };
        let mut left = self.eval_primary(st, first)?;
        for ((operand, op), &link) in operands.zip(&comparison.ops).zip(&comparison.link_types) {
            let right = self.eval_primary(st, operand)?;
            let ordering = left.clone().convert(link).cmp_value(&right.clone().convert(link));
            let holds = match op {
                ComparisonOp::Equal => ordering == Ordering::Equal,
                ComparisonOp::NotEqual => ordering != Ordering::Equal,
                ComparisonOp::Greater => ordering == Ordering::Greater,
                ComparisonOp::GreaterEqual => ordering != Ordering::Less,
                ComparisonOp::Less => ordering == Ordering::Less,
                ComparisonOp::LessEqual => ordering != Ordering::Greater,
            };
            if !holds {
                return Ok(false);
            }
            left = right;
        }
        Ok(true)
    }

    /// `and` binds tighter than `or`; operands are evaluated left to right
    /// and only as far as needed.
    fn eval_logical(&mut self, st: &mut UnitState<'m>, logical: &'m LogicalExp) -> Result<bool, Fault> {
        let mut group = true;
        for (index, operand) in logical.operands.iter().enumerate() {
            if index > 0 && logical.ops.get(index - 1) == Some(&LogicalOp::Or) {
                if group {
                    return Ok(true);
                }
                group = true;
            }
            if group {
                group = self.eval_exp(st, &operand.exp)?.as_bool() != operand.negate;
            }
        }
        Ok(group)
    }

    // ── Calls ─────────────────────────────────────────────────────────────────

    /// Evaluate a call's arguments, converted to the bound parameter types.
    pub(crate) fn eval_arguments(&mut self, st: &mut UnitState<'m>, call: &'m FunctionCall) -> Result<Vec<Value>, Fault> {
        let Some(binding) = call.binding() else {
            return Err(self.raise(st, Exception::Ffi));
        };
        let mut arguments = Vec::with_capacity(call.arguments.len());
        for (argument, &ty) in call.arguments.iter().zip(&binding.parameter_types) {
            arguments.push(self.eval_exp(st, argument)?.convert(ty));
        }
        Ok(arguments)
    }

    /// Call a unit or FFI function; `None` for void calls.
    pub(crate) fn eval_call(&mut self, st: &mut UnitState<'m>, call: &'m FunctionCall) -> Result<Option<Value>, Fault> {
        let arguments = self.eval_arguments(st, call)?;
        let Some(binding) = call.binding() else {
            return Err(self.raise(st, Exception::Ffi));
        };
        let module = self.module;
        let Some(object) = module.object(binding.object) else {
            return Err(self.raise(st, Exception::Ffi));
        };

        let ffi = match &object.kind {
            ObjectKind::Unit(_) => {
                let mode = st.mode.for_callee();
                return self.invoke_unit(binding.object, arguments, mode);
            }
            ObjectKind::Ffi(ffi) => ffi,
        };
        let FunctionKind::Function(function) = &ffi.definition.kind else {
            return Err(self.raise(st, Exception::Ffi));
        };
        tracing::trace!(function = %call.name, "ffi call");

        let result = match self.groups.data(module, ffi.group) {
            Ok(group_data) => {
                let mut invocation = Invocation {
                    execif: &*self.execif,
                    signal: None,
                    unit_invocation_id: st.invocation_id,
                    unit_name: &st.unit.name,
                    unit_location: st.location,
                    group_data: &mut **group_data,
                };
                function(&mut invocation, &arguments)
            }
            Err(e) => Err(e),
        };
        let output = ffi.definition.output;
        match result {
            Ok(_) if output == PrimitiveType::Void => Ok(None),
            Ok(Some(value)) => Ok(Some(value.convert(output))),
            Ok(None) => Ok(Value::default_for(output)),
            Err(e) => {
                self.execif.set_exception_text(&e.message);
                Err(self.raise(st, Exception::Ffi))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::def::{construct_unit_from_string, resolve_unit, DefErrorList, Module, NoLookup};
    use crate::ffi::TracingExecIf;
    use crate::interp::{Exception, Interpreter, Value};

    fn run(src: &str) -> Result<Option<Value>, Exception> {
        let mut module = Module::new();
        let mut errors = DefErrorList::new();
        let unit = construct_unit_from_string(src, "t", &mut errors).unwrap();
        let id = module.add_unit(unit);
        resolve_unit(&mut module, id, &mut NoLookup, &mut errors).unwrap();
        let mut interp = Interpreter::new(&module, Arc::new(TracingExecIf));
        interp.invoke(id, &[]).map_err(|e| e.exception().unwrap())
    }

    fn out(src: &str) -> Value {
        run(src).unwrap().unwrap()
    }

    #[test]
    fn precedence() {
        assert_eq!(out("output r = 2 + 3 * 4\n"), Value::Int(14));
        assert_eq!(out("output r = (2 + 3) * 4\n"), Value::Int(20));
        assert_eq!(out("output r = 10 - 4 - 3\n"), Value::Int(3));
        assert_eq!(out("output r = 2 ^ 3 ^ 2\n"), Value::Int(512));
        assert_eq!(out("output r = 2 * 3 ^ 2\n"), Value::Int(18));
    }

    #[test]
    fn chain_promotes_to_effective_type() {
        assert_eq!(out("output r = 7 / 2 + 0.5\n"), Value::Real(4.0));
        assert_eq!(out("output r = \"n=\" + 3\n"), Value::Str("n=3".into()));
    }

    #[test]
    fn negation() {
        assert_eq!(out("x = 4\noutput r = -x + 1\n"), Value::Int(-3));
        assert_eq!(out("output r = -(2 + 3)\n"), Value::Int(-5));
    }

    #[test]
    fn comparisons_chain() {
        assert_eq!(out("output r = 1 < 2 < 3\n"), Value::Bool(true));
        assert_eq!(out("output r = 1 < 3 < 2\n"), Value::Bool(false));
        assert_eq!(out("output r = 2 == 2.0\n"), Value::Bool(true));
        assert_eq!(out("output r = \"a\" ~= \"b\"\n"), Value::Bool(true));
    }

    #[test]
    fn logical_precedence_and_negation() {
        assert_eq!(out("output r = true or false and false\n"), Value::Bool(true));
        assert_eq!(out("output r = not true or not false\n"), Value::Bool(true));
        assert_eq!(out("output r = false and 1 / 0 == 0\n"), Value::Bool(false));
    }

    #[test]
    fn divide_by_zero_raises() {
        assert_eq!(run("x = 0\ny = 1 / x\n"), Err(Exception::DivideByZero));
        assert_eq!(run("x = 0\ny = 1 % x\n"), Err(Exception::DivideByZero));
    }

    #[test]
    fn real_division_by_zero_is_infinite() {
        assert_eq!(out("output r = 1.0 / 0.0 > 1000000.0\n"), Value::Bool(true));
    }
}
