//! Unit invocation and statement execution.

use crate::def::{
    Block, LoopKind, LoopStatement, ObjectId, PrimitiveType, Statement, StatementKind,
    StepDirection, Unit, VarSlot,
};

use super::action::ActionInstance;
use super::module::Interpreter;
use super::{Exception, ExecutionMode, Fault, Value};

// ── Frames ────────────────────────────────────────────────────────────────────

/// Loop control computed once when a `for` loop is entered.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoopCache {
    pub to: Value,
    pub step: Value,
    pub direction: StepDirection,
}

/// Variable storage of one active block.  Frame `n` of a unit belongs to the
/// block at depth `n`.
#[derive(Debug, Clone)]
pub struct Frame<'m> {
    pub block: &'m Block,
    /// `None` until first assigned.
    pub variables: Vec<Option<Value>>,
    pub(crate) loop_cache: Option<LoopCache>,
}

impl<'m> Frame<'m> {
    pub fn new(block: &'m Block) -> Self {
        Frame { block, variables: vec![None; block.variables.len()], loop_cache: None }
    }
}

/// One live invocation of a unit.
pub struct UnitState<'m> {
    pub unit: &'m Unit,
    pub object: ObjectId,
    pub invocation_id: u64,
    pub frames: Vec<Frame<'m>>,
    pub mode: ExecutionMode,
    pub location: u32,
    /// Set once the unit executed `finish`.
    pub finished: bool,
    pub(crate) actions: Vec<ActionInstance>,
}

impl<'m> UnitState<'m> {
    fn new(unit: &'m Unit, object: ObjectId, invocation_id: u64, mode: ExecutionMode) -> Self {
        UnitState {
            unit,
            object,
            invocation_id,
            frames: vec![Frame::new(&unit.global_block)],
            mode,
            location: 1,
            finished: false,
            actions: Vec::new(),
        }
    }

    pub(crate) fn read(&self, slot: VarSlot, ty: PrimitiveType) -> Value {
        self.frames
            .get(slot.depth as usize)
            .and_then(|f| f.variables.get(slot.index as usize))
            .and_then(Option::clone)
            .or_else(|| Value::default_for(ty))
            .unwrap_or(Value::Int(0))
    }

    pub(crate) fn write(&mut self, slot: VarSlot, value: Value) {
        if let Some(cell) = self
            .frames
            .get_mut(slot.depth as usize)
            .and_then(|f| f.variables.get_mut(slot.index as usize))
        {
            *cell = Some(value);
        }
    }
}

// ── Views for controllers ─────────────────────────────────────────────────────

/// A visible, initialised variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValue {
    pub name: String,
    pub ty: PrimitiveType,
    pub value: Value,
}

/// Read-only view of a unit state handed to a controller.
pub struct UnitView<'a> {
    state: &'a UnitState<'a>,
}

impl<'a> UnitView<'a> {
    pub fn new(state: &'a UnitState<'a>) -> Self {
        UnitView { state }
    }

    pub fn unit_name(&self) -> &str {
        &self.state.unit.name
    }

    pub fn unit(&self) -> &Unit {
        self.state.unit
    }

    pub fn location(&self) -> u32 {
        self.state.location
    }

    pub fn mode(&self) -> ExecutionMode {
        self.state.mode
    }

    pub fn invocation_id(&self) -> u64 {
        self.state.invocation_id
    }

    /// Source lines `location - before ..= location + after` that exist,
    /// with their line numbers.
    pub fn context(&self, before: u32, after: u32) -> Vec<(u32, &str)> {
        let first = self.state.location.saturating_sub(before).max(1);
        (first..=self.state.location + after)
            .filter_map(|line| self.state.unit.source_line(line).map(|text| (line, text)))
            .collect()
    }

    /// Every initialised variable of the enclosing blocks, outermost first.
    pub fn variables(&self) -> Vec<VariableValue> {
        self.state
            .frames
            .iter()
            .flat_map(|frame| {
                frame.block.variables.iter().zip(&frame.variables).filter_map(|(var, value)| {
                    value.as_ref().map(|value| VariableValue {
                        name: var.name.clone(),
                        ty: var.ty,
                        value: value.clone(),
                    })
                })
            })
            .collect()
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// How a statement sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Next,
    Break,
    Continue,
    Finish,
}

impl<'m> Interpreter<'m> {
    /// Run unit `id` with already converted arguments.
    pub(crate) fn invoke_unit(
        &mut self,
        id: ObjectId,
        arguments: Vec<Value>,
        mode: ExecutionMode,
    ) -> Result<Option<Value>, Fault> {
        let module = self.module;
        let Some(unit) = module.unit(id) else {
            return Err(Fault { exception: Exception::Ffi, unit: format!("#{}", id.0), location: 0 });
        };
        let invocation_id = self.next_invocation_id();
        let mut st = UnitState::new(unit, id, invocation_id, mode);
        tracing::debug!(unit = %unit.name, invocation = invocation_id, ?mode, "invoke unit");

        for (index, value) in arguments.into_iter().enumerate().take(unit.input.len()) {
            st.frames[0].variables[index] = Some(value);
        }

        if let Some(output) = &unit.output {
            if let (Some(initializer), Some(slot)) = (&output.initializer, output.variable.slot()) {
                st.location = output.location;
                let value = self.eval_exp(&mut st, initializer)?.convert(output.ty);
                st.write(slot, value);
            }
        }

        let flow = self.exec_statements(&mut st, &unit.global_block.statements)?;
        if flow == Flow::Finish {
            st.finished = true;
        }

        let output = unit.output.as_ref().and_then(|output| {
            output.variable.slot().map(|slot| st.read(slot, output.ty).convert(output.ty))
        });

        if !unit.actions.is_empty() && !st.finished {
            st.frames.truncate(1);
            if let Err(fault) = self.init_actions(&mut st) {
                self.stop_actions(&mut st);
                return Err(fault);
            }
            self.activate(st);
        }
        Ok(output)
    }

    /// Checks made before every statement: the abort signal and, outside
    /// `Run` mode, the controller.
    fn before_statement(&mut self, st: &mut UnitState<'m>, location: u32) -> Result<(), Fault> {
        st.location = location;
        tracing::trace!(unit = %st.unit.name, line = location, "statement");
        if self.abort.is_signalled() {
            return Err(self.raise(st, Exception::Halt));
        }
        if st.mode != ExecutionMode::Run {
            if let Some(controller) = self.controller.as_mut() {
                st.mode = controller.step(&UnitView::new(st));
            }
            if st.mode == ExecutionMode::Halt {
                return Err(self.raise(st, Exception::Halt));
            }
        }
        Ok(())
    }

    pub(crate) fn exec_block(&mut self, st: &mut UnitState<'m>, block: &'m Block) -> Result<Flow, Fault> {
        st.frames.push(Frame::new(block));
        let flow = self.exec_statements(st, &block.statements);
        st.frames.pop();
        flow
    }

    pub(crate) fn exec_statements(&mut self, st: &mut UnitState<'m>, statements: &'m [Statement]) -> Result<Flow, Fault> {
        // an earlier link of the current if-chain was taken
        let mut chain_taken = false;
        for statement in statements {
            if let StatementKind::If(link) = &statement.kind {
                if link.else_flag && chain_taken {
                    continue;
                }
            }
            self.before_statement(st, statement.location)?;

            let flow = match &statement.kind {
                StatementKind::FunctionCall(call) => {
                    self.eval_call(st, call)?;
                    Flow::Next
                }
                StatementKind::Assignment(assignment) => {
                    let value = self.eval_exp(st, &assignment.exp)?.convert(assignment.ty);
                    if let Some(slot) = assignment.variable.slot() {
                        st.write(slot, value);
                    }
                    Flow::Next
                }
                StatementKind::If(link) => {
                    chain_taken = match &link.condition {
                        Some(condition) => self.eval_exp(st, condition)?.as_bool(),
                        None => true,
                    };
                    if chain_taken {
                        self.exec_block(st, &link.block)?
                    } else {
                        Flow::Next
                    }
                }
                StatementKind::Loop(loop_statement) => self.exec_loop(st, loop_statement)?,
                StatementKind::Continue => Flow::Continue,
                StatementKind::Break => Flow::Break,
                StatementKind::Finish => Flow::Finish,
            };
            if flow != Flow::Next {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    fn exec_loop(&mut self, st: &mut UnitState<'m>, loop_statement: &'m LoopStatement) -> Result<Flow, Fault> {
        st.frames.push(Frame::new(&loop_statement.block));
        let flow = self.run_loop(st, loop_statement);
        st.frames.pop();
        flow
    }

    /// Iterate a loop whose frame is on top of the stack.
    fn run_loop(&mut self, st: &mut UnitState<'m>, loop_statement: &'m LoopStatement) -> Result<Flow, Fault> {
        let body = &loop_statement.block.statements;
        let location = st.location;
        match &loop_statement.kind {
            LoopKind::While(condition) => loop {
                if let Some(condition) = condition {
                    st.location = location;
                    if !self.eval_exp(st, condition)?.as_bool() {
                        return Ok(Flow::Next);
                    }
                }
                match self.exec_statements(st, body)? {
                    Flow::Break => return Ok(Flow::Next),
                    Flow::Finish => return Ok(Flow::Finish),
                    Flow::Next | Flow::Continue => {}
                }
                self.check_abort(st)?;
            },
            LoopKind::For(for_loop) => {
                let Some(slot) = for_loop.variable.slot() else {
                    return Ok(Flow::Next);
                };
                if let Some(initial) = &for_loop.initial {
                    let value = self.eval_exp(st, initial)?.convert(for_loop.ty);
                    st.write(slot, value);
                }
                let to = self.eval_exp(st, &for_loop.to)?.convert(for_loop.ty);
                let step = Value::Int(1).convert(for_loop.ty);
                if let Some(frame) = st.frames.last_mut() {
                    frame.loop_cache = Some(LoopCache { to, step, direction: for_loop.direction });
                }

                loop {
                    let Some(cache) = st.frames.last().and_then(|f| f.loop_cache.clone()) else {
                        return Ok(Flow::Next);
                    };
                    let current = st.read(slot, for_loop.ty);
                    let ordering = current.cmp_value(&cache.to);
                    let in_range = match cache.direction {
                        StepDirection::Up => ordering != std::cmp::Ordering::Greater,
                        StepDirection::Down => ordering != std::cmp::Ordering::Less,
                    };
                    if !in_range {
                        return Ok(Flow::Next);
                    }
                    match self.exec_statements(st, body)? {
                        Flow::Break => return Ok(Flow::Next),
                        Flow::Finish => return Ok(Flow::Finish),
                        Flow::Next | Flow::Continue => {}
                    }
                    let current = st.read(slot, for_loop.ty);
                    // Past the end of the type's range the loop is done.
                    let Some(next) = current.checked_step(&cache.step, cache.direction) else {
                        return Ok(Flow::Next);
                    };
                    st.write(slot, next);
                    self.check_abort(st)?;
                }
            }
        }
    }

    /// Loop back-edges are statement boundaries too.
    fn check_abort(&mut self, st: &UnitState<'m>) -> Result<(), Fault> {
        if self.abort.is_signalled() {
            return Err(self.raise(st, Exception::Halt));
        }
        Ok(())
    }
}
