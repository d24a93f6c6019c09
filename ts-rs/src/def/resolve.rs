//! Static resolution of units against a [`Module`].
//!
//! Resolution binds every variable reference to its declaration and every
//! call to a module object, and decides the type of every expression.  A
//! variable is declared by its first assignment, in the innermost block.
//!
//! Calls into units that are not yet resolved resolve them first, so a whole
//! program is pulled in transitively from its entry unit.  Names the module
//! does not know are handed to a [`UnitLookup`], which typically constructs
//! them from files on a search path.
//!
//! The first error aborts the unit being resolved, and every unit waiting on
//! it.

use super::args::TypeMismatch;
use super::ast::*;
use super::deferror::{DefErrorKind, DefErrorList};
use super::module::{LookupError, Module, ObjectId, ObjectKind, ObjectList};
use super::types::{allow_primitive_conversion, op_allowed, select_primitive_promotion, steppable_primitive, PrimitiveType};
use crate::error::Error;

// ── Lookup callback ───────────────────────────────────────────────────────────

/// Supplies units the module does not know yet.
pub trait UnitLookup {
    /// Construct the unit called `name`, reporting construction diagnostics
    /// to `errors`.  `None` when no such unit exists or it failed to build.
    fn lookup_unit(&mut self, name: &str, errors: &mut DefErrorList) -> Option<Unit>;
}

impl<F> UnitLookup for F
where
    F: FnMut(&str, &mut DefErrorList) -> Option<Unit>,
{
    fn lookup_unit(&mut self, name: &str, errors: &mut DefErrorList) -> Option<Unit> {
        self(name, errors)
    }
}

/// A lookup that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLookup;

impl UnitLookup for NoLookup {
    fn lookup_unit(&mut self, _name: &str, _errors: &mut DefErrorList) -> Option<Unit> {
        None
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Warnings recorded while resolving, including those of units pulled in.
    pub warnings: usize,
}

/// Resolve the unit `id` and everything it references.
pub fn resolve_unit(
    module: &mut Module,
    id: ObjectId,
    lookup: &mut dyn UnitLookup,
    errors: &mut DefErrorList,
) -> Result<Resolved, Error> {
    let name = module.object(id).map(|o| o.name.clone()).ok_or_else(|| {
        Error::ObjectNotFound(format!("#{}", id.0))
    })?;
    match module.object(id).map(|o| o.list) {
        Some(ObjectList::TemplateUnits) => return Err(Error::IncompleteDef(name)),
        Some(ObjectList::UnresolvedUnits | ObjectList::ReferencedUnits) => {}
        _ => return Err(Error::ObjectNotFound(name)),
    }

    let warnings_before = errors.warning_count();
    let mut resolver = Resolver { module, lookup, errors };
    match resolver.resolve_object(id) {
        Ok(()) => Ok(Resolved { warnings: resolver.errors.warning_count() - warnings_before }),
        Err(Abort::Input) => Err(Error::ResolveInitialize(name)),
        Err(Abort::Body) => Err(Error::Resolve(name)),
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Resolution stopped; the diagnostic is already recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    /// Input declarations were invalid.
    Input,
    Body,
}

type RResult<T> = Result<T, Abort>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallUse {
    Invoke,
    Trigger,
}

struct Scope {
    depth: u32,
    is_loop: bool,
    variables: Vec<Variable>,
}

/// Per-unit state: where we are and which blocks enclose it.
struct UnitContext {
    unit_name: String,
    location: Location,
    scopes: Vec<Scope>,
}

impl UnitContext {
    fn lookup(&self, name: &str) -> Option<(VarSlot, PrimitiveType)> {
        self.scopes.iter().rev().find_map(|scope| {
            scope.variables.iter().position(|v| v.name == name).map(|index| {
                let slot = VarSlot { depth: scope.depth, index: index as u32 };
                (slot, scope.variables[index].ty)
            })
        })
    }

    fn declare(&mut self, name: &str, ty: PrimitiveType) -> Option<VarSlot> {
        let scope = self.scopes.last_mut()?;
        scope.variables.push(Variable { name: name.to_owned(), ty });
        Some(VarSlot { depth: scope.depth, index: (scope.variables.len() - 1) as u32 })
    }

    fn in_loop(&self) -> bool {
        self.scopes.iter().any(|s| s.is_loop)
    }
}

struct Resolver<'a> {
    module: &'a mut Module,
    lookup: &'a mut dyn UnitLookup,
    errors: &'a mut DefErrorList,
}

impl Resolver<'_> {
    fn fail<T>(&mut self, ctx: &UnitContext, kind: DefErrorKind) -> RResult<T> {
        self.errors.error(&ctx.unit_name, ctx.location, kind);
        Err(Abort::Body)
    }

    /// Resolve a registered unit unless it already is.
    fn resolve_object(&mut self, id: ObjectId) -> RResult<()> {
        if self.module.object(id).is_some_and(|o| o.list == ObjectList::ReferencedUnits) {
            return Ok(());
        }
        let Some(mut unit) = self.module.check_out_unit(id) else {
            return Err(Abort::Body);
        };
        tracing::debug!(unit = %unit.name, "resolving unit");
        let result = self.resolve_checked_out(id, &mut unit);
        self.module.check_in_unit(id, unit);
        if result.is_ok() {
            self.module.mark_unit_resolved(id);
        }
        result
    }

    fn resolve_checked_out(&mut self, id: ObjectId, unit: &mut Unit) -> RResult<()> {
        let mut ctx = UnitContext {
            unit_name: unit.name.clone(),
            location: 1,
            scopes: vec![Scope {
                depth: 0,
                is_loop: false,
                variables: std::mem::take(&mut unit.global_block.variables),
            }],
        };
        let result = self.resolve_unit_parts(id, unit, &mut ctx);
        if let Some(scope) = ctx.scopes.pop() {
            unit.global_block.variables = scope.variables;
        }
        result
    }

    fn resolve_unit_parts(&mut self, id: ObjectId, unit: &mut Unit, ctx: &mut UnitContext) -> RResult<()> {
        for input in &unit.input {
            let Some(ty) = input.declared else {
                self.errors.error(&ctx.unit_name, ctx.location, DefErrorKind::UsingDelayedType);
                return Err(Abort::Input);
            };
            if ctx.lookup(&input.name).is_some() {
                self.errors.error(
                    &ctx.unit_name,
                    ctx.location,
                    DefErrorKind::VariableRedefinition(input.name.clone()),
                );
                return Err(Abort::Input);
            }
            ctx.declare(&input.name, ty);
        }

        match &mut unit.output {
            None => self.module.set_unit_output(id, PrimitiveType::Void),
            Some(output) => {
                if let Some(initializer) = output.initializer.as_mut() {
                    ctx.location = output.location;
                    output.ty = self.perform_assignment(ctx, &mut output.variable, initializer)?;
                    self.module.set_unit_output(id, output.ty);
                }
            }
        }

        self.resolve_statements(ctx, &mut unit.global_block.statements)?;

        if let Some(output) = unit.output.as_mut().filter(|o| o.initializer.is_none()) {
            ctx.location = output.location;
            let found = ctx.scopes.first().and_then(|global| {
                global.variables.iter().position(|v| v.name == output.variable.name).map(|index| {
                    (VarSlot { depth: 0, index: index as u32 }, global.variables[index].ty)
                })
            });
            let Some((slot, ty)) = found else {
                return self.fail(ctx, DefErrorKind::UndefinedVariable(output.variable.name.clone()));
            };
            output.variable.bind(slot);
            output.ty = ty;
            self.module.set_unit_output(id, ty);
        }

        for action in &mut unit.actions {
            ctx.location = action.location;
            for trigger in &mut action.triggers {
                self.resolve_call(ctx, trigger, CallUse::Trigger)?;
            }
            self.resolve_block(ctx, &mut action.block, false)?;
        }
        Ok(())
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn resolve_block(&mut self, ctx: &mut UnitContext, block: &mut Block, is_loop: bool) -> RResult<()> {
        ctx.scopes.push(Scope {
            depth: block.depth,
            is_loop,
            variables: std::mem::take(&mut block.variables),
        });
        let result = self.resolve_statements(ctx, &mut block.statements);
        if let Some(scope) = ctx.scopes.pop() {
            block.variables = scope.variables;
        }
        result
    }

    fn resolve_statements(&mut self, ctx: &mut UnitContext, statements: &mut [Statement]) -> RResult<()> {
        for statement in statements {
            ctx.location = statement.location;
            tracing::trace!(unit = %ctx.unit_name, line = statement.location, "resolve statement");
            match &mut statement.kind {
                StatementKind::FunctionCall(call) => {
                    self.resolve_call(ctx, call, CallUse::Invoke)?;
                }
                StatementKind::Assignment(assignment) => {
                    assignment.ty = self.perform_assignment(ctx, &mut assignment.variable, &mut assignment.exp)?;
                }
                StatementKind::If(if_statement) => {
                    if let Some(condition) = if_statement.condition.as_mut() {
                        self.resolve_condition(ctx, condition)?;
                    }
                    self.resolve_block(ctx, &mut if_statement.block, false)?;
                }
                StatementKind::Loop(loop_statement) => self.resolve_loop(ctx, loop_statement)?,
                StatementKind::Break | StatementKind::Continue => {
                    if !ctx.in_loop() {
                        let word = if matches!(statement.kind, StatementKind::Break) { "break" } else { "continue" };
                        return self.fail(ctx, DefErrorKind::FlowControlOutsideLoop(word.into()));
                    }
                }
                StatementKind::Finish => {}
            }
        }
        Ok(())
    }

    fn resolve_condition(&mut self, ctx: &mut UnitContext, condition: &mut Exp) -> RResult<()> {
        self.resolve_exp(ctx, condition)?;
        let ty = condition.primitive_type();
        if ty != PrimitiveType::Bool {
            return self.fail(ctx, DefErrorKind::IncompatibleTypes { from: ty, to: PrimitiveType::Bool });
        }
        Ok(())
    }

    fn resolve_loop(&mut self, ctx: &mut UnitContext, loop_statement: &mut LoopStatement) -> RResult<()> {
        let for_loop = match &mut loop_statement.kind {
            LoopKind::While(condition) => {
                if let Some(condition) = condition.as_mut() {
                    self.resolve_condition(ctx, condition)?;
                }
                return self.resolve_block(ctx, &mut loop_statement.block, true);
            }
            LoopKind::For(for_loop) => for_loop,
        };

        let block = &mut loop_statement.block;
        ctx.scopes.push(Scope {
            depth: block.depth,
            is_loop: true,
            variables: std::mem::take(&mut block.variables),
        });
        let result = self.resolve_for(ctx, for_loop, &mut block.statements);
        if let Some(scope) = ctx.scopes.pop() {
            block.variables = scope.variables;
        }
        result
    }

    /// Resolve a `for` header and body; the loop block's scope is current.
    fn resolve_for(&mut self, ctx: &mut UnitContext, for_loop: &mut ForLoop, body: &mut [Statement]) -> RResult<()> {
        let ty = match for_loop.initial.as_mut() {
            Some(initial) => self.perform_assignment(ctx, &mut for_loop.variable, initial)?,
            None => {
                let Some((slot, ty)) = ctx.lookup(&for_loop.variable.name) else {
                    return self.fail(ctx, DefErrorKind::UndefinedVariable(for_loop.variable.name.clone()));
                };
                for_loop.variable.bind(slot);
                ty
            }
        };
        for_loop.ty = ty;

        self.resolve_exp(ctx, &mut for_loop.to)?;
        let to_type = for_loop.to.primitive_type();
        if !allow_primitive_conversion(to_type, ty) {
            return self.fail(ctx, DefErrorKind::IncompatibleTypes { from: to_type, to: ty });
        }
        if !steppable_primitive(ty) {
            return self.fail(ctx, DefErrorKind::TypeNotSteppable(ty));
        }
        self.resolve_statements(ctx, body)
    }

    /// Resolve `variable = exp`, declaring the variable in the innermost scope
    /// if it is new.  Returns the variable's type.
    fn perform_assignment(&mut self, ctx: &mut UnitContext, variable: &mut VarRef, exp: &mut Exp) -> RResult<PrimitiveType> {
        self.resolve_exp(ctx, exp)?;
        let exp_type = exp.primitive_type();
        match ctx.lookup(&variable.name) {
            Some((slot, ty)) => {
                // A variable keeps the type of its first assignment.
                if exp_type != ty {
                    return self.fail(ctx, DefErrorKind::IncompatibleTypes { from: exp_type, to: ty });
                }
                variable.bind(slot);
                Ok(ty)
            }
            None => {
                let Some(slot) = ctx.declare(&variable.name, exp_type) else {
                    return self.fail(ctx, DefErrorKind::Internal("no open scope".into()));
                };
                variable.bind(slot);
                Ok(exp_type)
            }
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    fn resolve_exp(&mut self, ctx: &mut UnitContext, exp: &mut Exp) -> RResult<()> {
        match exp {
            Exp::Primary(primary) => self.resolve_primary(ctx, primary),
            Exp::Comparison(comparison) => {
                for operand in &mut comparison.operands {
                    self.resolve_primary(ctx, operand)?;
                }
                let types: Vec<PrimitiveType> =
                    comparison.operands.iter().map(|o| o.effective_type).collect();
                comparison.link_types = types
                    .windows(2)
                    .map(|pair| select_primitive_promotion(pair[0], pair[1]))
                    .collect();
                for (pair, &link) in types.windows(2).zip(&comparison.link_types) {
                    for &side in pair {
                        if !allow_primitive_conversion(side, link) {
                            return self.fail(ctx, DefErrorKind::IncompatibleTypes { from: side, to: link });
                        }
                    }
                }
                Ok(())
            }
            Exp::Logical(logical) => {
                for operand in &mut logical.operands {
                    self.resolve_exp(ctx, &mut operand.exp)?;
                    let ty = operand.exp.primitive_type();
                    if ty != PrimitiveType::Bool {
                        return self.fail(ctx, DefErrorKind::IncompatibleTypes { from: ty, to: PrimitiveType::Bool });
                    }
                }
                Ok(())
            }
        }
    }

    fn resolve_primary(&mut self, ctx: &mut UnitContext, primary: &mut PrimaryExp) -> RResult<()> {
        let mut promoted: Option<PrimitiveType> = None;
        for node in &mut primary.nodes {
            let ty = self.resolve_value(ctx, &mut node.value)?;
            match ty {
                PrimitiveType::Delayed => return self.fail(ctx, DefErrorKind::UsingDelayedType),
                PrimitiveType::Void => return self.fail(ctx, DefErrorKind::UsingVoidType),
                _ => {}
            }
            node.ty = ty;
            promoted = Some(promoted.map_or(ty, |p| select_primitive_promotion(p, ty)));
        }
        let Some(promoted) = promoted else {
            return self.fail(ctx, DefErrorKind::Internal("empty expression".into()));
        };

        for node in &primary.nodes {
            if node.op != PrimaryOp::Value && !op_allowed(Some(promoted), node.op, Some(promoted)) {
                return self.fail(
                    ctx,
                    DefErrorKind::InvalidUseOfOperator { op: node.op.symbol().into(), ty: promoted },
                );
            }
        }
        if primary.negate && !op_allowed(None, PrimaryOp::Sub, Some(promoted)) {
            return self.fail(ctx, DefErrorKind::InvalidUseOfOperator { op: "-".into(), ty: promoted });
        }
        primary.effective_type = promoted;
        Ok(())
    }

    fn resolve_value(&mut self, ctx: &mut UnitContext, value: &mut ExpValue) -> RResult<PrimitiveType> {
        match value {
            ExpValue::Bool(_) => Ok(PrimitiveType::Bool),
            ExpValue::Int(_) => Ok(PrimitiveType::Int),
            ExpValue::Real(_) => Ok(PrimitiveType::Real),
            ExpValue::Str(_) => Ok(PrimitiveType::String),
            ExpValue::Variable(reference) => match ctx.lookup(&reference.name) {
                Some((slot, ty)) => {
                    reference.bind(slot);
                    Ok(ty)
                }
                None => self.fail(ctx, DefErrorKind::UndefinedVariable(reference.name.clone())),
            },
            ExpValue::Call(call) => self.resolve_call(ctx, call, CallUse::Invoke),
            ExpValue::Exp(exp) => {
                self.resolve_exp(ctx, exp)?;
                Ok(exp.primitive_type())
            }
        }
    }

    // ── Calls ─────────────────────────────────────────────────────────────────

    /// Bind a call and return its output type.
    fn resolve_call(&mut self, ctx: &mut UnitContext, call: &mut FunctionCall, usage: CallUse) -> RResult<PrimitiveType> {
        for argument in &mut call.arguments {
            self.resolve_exp(ctx, argument)?;
        }
        let argument_types: Vec<PrimitiveType> = call.arguments.iter().map(Exp::primitive_type).collect();

        let mut loaded = false;
        let id = loop {
            match self.module.lookup_module_object(&call.name, &argument_types) {
                Ok(id) => break id,
                Err(LookupError::NotFound) if !loaded => {
                    loaded = true;
                    if self.load_unit(ctx, &call.name, &argument_types)? {
                        continue;
                    }
                    return self.fail(ctx, DefErrorKind::UndefinedFunction(call.name.clone()));
                }
                Err(LookupError::NotFound) => {
                    return self.fail(ctx, DefErrorKind::UndefinedFunction(call.name.clone()));
                }
                Err(LookupError::ArgumentCount { object }) => {
                    let expected = self.module.object(object).map_or(0, |o| o.parameter_types().len());
                    return self.fail(
                        ctx,
                        DefErrorKind::WrongArgumentCount {
                            name: call.name.clone(),
                            given: argument_types.len(),
                            expected,
                        },
                    );
                }
                Err(LookupError::TypeMismatch { mismatch: TypeMismatch { index, from, to }, .. }) => {
                    return self.fail(
                        ctx,
                        DefErrorKind::ArgumentTypeMismatch { name: call.name.clone(), index, from, to },
                    );
                }
                Err(LookupError::IncompleteDef) => return self.fail(ctx, DefErrorKind::UsingDelayedType),
            }
        };

        let is_unit = matches!(self.module.object(id).map(|o| &o.kind), Some(ObjectKind::Unit(_)));
        if is_unit {
            if usage == CallUse::Trigger {
                return self.fail(ctx, DefErrorKind::FunctionNotActionable(call.name.clone()));
            }
            self.ensure_unit_resolved(ctx, id, &call.name)?;
        } else {
            let is_action = self
                .module
                .object(id)
                .and_then(|o| o.as_ffi())
                .is_some_and(|f| f.definition.is_action_controller());
            match (usage, is_action) {
                (CallUse::Invoke, true) => {
                    return self.fail(ctx, DefErrorKind::FunctionNotInvocable(call.name.clone()));
                }
                (CallUse::Trigger, false) => {
                    return self.fail(ctx, DefErrorKind::FunctionNotActionable(call.name.clone()));
                }
                _ => {}
            }
            self.module.reference_ffi(id);
        }

        let Some(object) = self.module.object(id) else {
            return self.fail(ctx, DefErrorKind::Internal(format!("lost module object for '{}'", call.name)));
        };
        let output = object.output_type();
        let parameter_types = object.parameter_types().to_vec();
        tracing::trace!(name = %call.name, object = id.0, %output, "bound call");
        call.bind(CallBinding { object: id, parameter_types, output });
        Ok(output)
    }

    fn ensure_unit_resolved(&mut self, ctx: &UnitContext, id: ObjectId, name: &str) -> RResult<()> {
        if self.module.is_checked_out(id) {
            let output = self.module.object(id).map_or(PrimitiveType::Delayed, |o| o.output_type());
            if output == PrimitiveType::Delayed {
                return self.fail(ctx, DefErrorKind::CyclicReference(name.to_owned()));
            }
            return Ok(());
        }
        self.resolve_object(id).map_err(|_| Abort::Body)
    }

    /// Make a unit called `name` available for `argument_types`, from a
    /// registered template or through the lookup callback.
    fn load_unit(&mut self, ctx: &UnitContext, name: &str, argument_types: &[PrimitiveType]) -> RResult<bool> {
        let template = match self.module.lookup_template(name) {
            Some(template) => template,
            None => {
                tracing::debug!(name, "looking up unit");
                let Some(mut unit) = self.lookup.lookup_unit(name, self.errors) else {
                    return Ok(false);
                };
                unit.name = name.to_owned();
                let typed = unit.is_typed();
                let id = self.module.add_unit(unit);
                if typed {
                    return Ok(true);
                }
                id
            }
        };
        self.instantiate(ctx, template, name, argument_types)?;
        Ok(true)
    }

    fn instantiate(
        &mut self,
        ctx: &UnitContext,
        template: ObjectId,
        name: &str,
        argument_types: &[PrimitiveType],
    ) -> RResult<ObjectId> {
        let Some(mut instance) = self.module.unit(template).map(Unit::clone_unit) else {
            return self.fail(ctx, DefErrorKind::Internal(format!("template '{name}' is unavailable")));
        };
        if instance.input.len() != argument_types.len() {
            return self.fail(
                ctx,
                DefErrorKind::WrongArgumentCount {
                    name: name.to_owned(),
                    given: argument_types.len(),
                    expected: instance.input.len(),
                },
            );
        }
        for (input, &ty) in instance.input.iter_mut().zip(argument_types) {
            input.declared = Some(ty);
        }
        tracing::debug!(name, ?argument_types, "instantiating template");
        Ok(self.module.add_instance(instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::construct::construct_unit_from_string;

    fn unit(src: &str, name: &str) -> Unit {
        let mut errors = DefErrorList::new();
        construct_unit_from_string(src, name, &mut errors).unwrap()
    }

    fn resolve_src(src: &str) -> (Module, ObjectId, DefErrorList, Result<Resolved, Error>) {
        let mut module = Module::new();
        let id = module.add_unit(unit(src, "main"));
        let mut errors = DefErrorList::new();
        let result = resolve_unit(&mut module, id, &mut NoLookup, &mut errors);
        (module, id, errors, result)
    }

    fn first_error(errors: &DefErrorList) -> &DefErrorKind {
        &errors.errors().next().unwrap().kind
    }

    #[test]
    fn assignment_declares_and_types() {
        let (module, id, errors, result) = resolve_src("x = 1\ny = x + 2.5\n");
        assert!(result.is_ok(), "{errors:?}");
        let unit = module.unit(id).unwrap();
        let names: Vec<(&str, PrimitiveType)> =
            unit.global_block.variables.iter().map(|v| (v.name.as_str(), v.ty)).collect();
        assert_eq!(names, vec![("x", PrimitiveType::Int), ("y", PrimitiveType::Real)]);
        assert_eq!(unit.unit_id, 1);
    }

    #[test]
    fn undefined_variable_aborts() {
        let (_, _, errors, result) = resolve_src("x = y\n");
        assert!(matches!(result, Err(Error::Resolve(_))));
        assert_eq!(first_error(&errors), &DefErrorKind::UndefinedVariable("y".into()));
    }

    #[test]
    fn narrowing_assignment_is_incompatible() {
        let (_, _, errors, _) = resolve_src("x = 1\nx = 2.5\n");
        assert_eq!(
            first_error(&errors),
            &DefErrorKind::IncompatibleTypes { from: PrimitiveType::Real, to: PrimitiveType::Int }
        );
    }

    #[test]
    fn widening_assignment_is_incompatible() {
        let (_, _, errors, result) = resolve_src("x = 1.5\nx = 2\n");
        assert!(result.is_err());
        assert_eq!(
            first_error(&errors),
            &DefErrorKind::IncompatibleTypes { from: PrimitiveType::Int, to: PrimitiveType::Real }
        );

        let (_, _, errors, result) = resolve_src("s = \"a\"\ns = 3\n");
        assert!(result.is_err());
        assert_eq!(
            first_error(&errors),
            &DefErrorKind::IncompatibleTypes { from: PrimitiveType::Int, to: PrimitiveType::String }
        );
    }

    #[test]
    fn string_arithmetic_is_invalid() {
        let (_, _, errors, _) = resolve_src("x = \"a\" * 2\n");
        assert_eq!(
            first_error(&errors),
            &DefErrorKind::InvalidUseOfOperator { op: "*".into(), ty: PrimitiveType::String }
        );
    }

    #[test]
    fn condition_must_be_bool() {
        let (_, _, errors, _) = resolve_src("if 1\nend\n");
        assert_eq!(
            first_error(&errors),
            &DefErrorKind::IncompatibleTypes { from: PrimitiveType::Int, to: PrimitiveType::Bool }
        );
    }

    #[test]
    fn continue_outside_loop() {
        let (_, _, errors, _) = resolve_src("x = 1\nif true\ncontinue\nend\n");
        let e = errors.errors().next().unwrap();
        assert_eq!(e.kind, DefErrorKind::FlowControlOutsideLoop("continue".into()));
        assert_eq!(e.location, 3);
    }

    #[test]
    fn for_loop_requires_steppable() {
        let (_, _, errors, _) = resolve_src("for s = \"a\" to \"b\"\nend\n");
        assert_eq!(first_error(&errors), &DefErrorKind::TypeNotSteppable(PrimitiveType::String));
    }

    #[test]
    fn duplicate_input_is_initialize_error() {
        let (_, _, errors, result) = resolve_src("input a:int, a:int\n");
        assert!(matches!(result, Err(Error::ResolveInitialize(_))));
        assert_eq!(first_error(&errors), &DefErrorKind::VariableRedefinition("a".into()));
    }

    #[test]
    fn inner_block_variables_live_in_inner_block() {
        let (module, id, errors, result) = resolve_src("if true\nx = 1\nend\n");
        assert!(result.is_ok(), "{errors:?}");
        let unit = module.unit(id).unwrap();
        assert!(unit.global_block.variables.is_empty());
        let StatementKind::If(i) = &unit.global_block.statements[0].kind else { panic!() };
        assert_eq!(i.block.variables.len(), 1);
        assert_eq!(i.block.depth, 1);
    }

    #[test]
    fn lazily_loads_and_resolves_callee() {
        let mut module = Module::new();
        let id = module.add_unit(unit("y = twice(4)\n", "main"));
        let mut errors = DefErrorList::new();
        let mut lookup = |name: &str, errors: &mut DefErrorList| -> Option<Unit> {
            if name != "twice" {
                return None;
            }
            construct_unit_from_string("input n:int\noutput r = n * 2\n", name, errors).ok()
        };
        resolve_unit(&mut module, id, &mut lookup, &mut errors).unwrap();
        let callee = module.find_unit("twice", &[PrimitiveType::Int]).unwrap();
        assert!(module.object(callee).unwrap().is_referenced());
        // the callee is numbered before the caller finishes
        assert_eq!(module.unit(callee).unwrap().unit_id, 1);
        assert_eq!(module.unit(id).unwrap().unit_id, 2);
    }

    #[test]
    fn template_is_instantiated_per_type_list() {
        let mut module = Module::new();
        module.add_unit(unit("input v\noutput r = v + v\n", "dup"));
        let id = module.add_unit(unit("a = dup(1)\nb = dup(\"s\")\nc = dup(2)\n", "main"));
        let mut errors = DefErrorList::new();
        resolve_unit(&mut module, id, &mut NoLookup, &mut errors).unwrap();
        assert!(module.find_unit("dup", &[PrimitiveType::Int]).is_some());
        assert!(module.find_unit("dup", &[PrimitiveType::String]).is_some());
        assert_eq!(module.objects_in(ObjectList::ReferencedUnits).count(), 3);
        let unit = module.unit(id).unwrap();
        let types: Vec<PrimitiveType> = unit.global_block.variables.iter().map(|v| v.ty).collect();
        assert_eq!(types, vec![PrimitiveType::Int, PrimitiveType::String, PrimitiveType::Int]);
    }

    #[test]
    fn cycle_without_known_output_is_reported() {
        let mut module = Module::new();
        module.add_unit(unit("x = a()\noutput x\n", "b"));
        let id = module.add_unit(unit("y = b()\noutput y\n", "a"));
        let mut errors = DefErrorList::new();
        let result = resolve_unit(&mut module, id, &mut NoLookup, &mut errors);
        assert!(result.is_err());
        assert_eq!(first_error(&errors), &DefErrorKind::CyclicReference("a".into()));
    }

    #[test]
    fn recursion_with_initialised_output_resolves() {
        let src = "input n:int\noutput r = 1\nif n > 1\nr = n * fact(n - 1)\nend\n";
        let mut module = Module::new();
        let id = module.add_unit(unit(src, "fact"));
        let mut errors = DefErrorList::new();
        resolve_unit(&mut module, id, &mut NoLookup, &mut errors).unwrap();
        assert_eq!(module.object(id).unwrap().output_type(), PrimitiveType::Int);
    }

    #[test]
    fn void_unit_in_expression() {
        let mut module = Module::new();
        module.add_unit(unit("x = 1\n", "nothing"));
        let id = module.add_unit(unit("y = nothing()\n", "main"));
        let mut errors = DefErrorList::new();
        assert!(resolve_unit(&mut module, id, &mut NoLookup, &mut errors).is_err());
        assert_eq!(first_error(&errors), &DefErrorKind::UsingVoidType);
    }

    #[test]
    fn unit_cannot_trigger_action() {
        let mut module = Module::new();
        module.add_unit(unit("x = 1\n", "plain"));
        let id = module.add_unit(unit("action plain()\nend\n", "main"));
        let mut errors = DefErrorList::new();
        assert!(resolve_unit(&mut module, id, &mut NoLookup, &mut errors).is_err());
        assert_eq!(first_error(&errors), &DefErrorKind::FunctionNotActionable("plain".into()));
    }

    #[test]
    fn second_resolution_changes_nothing() {
        let (mut module, id, _, result) = resolve_src("x = 1\nloop\nx = x + 1\nif x > 3\nbreak\nend\nend\n");
        assert!(result.is_ok());
        let before = module.unit(id).unwrap().clone();
        let mut errors = DefErrorList::new();
        resolve_unit(&mut module, id, &mut NoLookup, &mut errors).unwrap();
        assert_eq!(module.unit(id).unwrap(), &before);
        assert!(errors.is_empty());
    }
}
