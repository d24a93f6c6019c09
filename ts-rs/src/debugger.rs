//! Line-oriented stepping debugger, the `-d` controller of `tsi`.
//!
//! Before each stepped statement it shows the unit, the line and the source
//! around it, then reads a command:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `n` | next statement, stepping over calls |
//! | `s` | next statement, stepping into calls |
//! | `r` | run freely |
//! | `h` | halt the program |
//! | `v` | list visible variables |
//!
//! An empty line repeats the previous command.  End of input runs freely.

use std::io::{BufRead, Write};

use crate::interp::{Controller, Exception, ExecutionMode, UnitView};

/// Source lines shown on each side of the current one.
const CONTEXT_LINES: u32 = 2;

pub struct Debugger<R, W> {
    input: R,
    output: W,
    last: char,
}

impl<R: BufRead, W: Write> Debugger<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Debugger { input, output, last: 'n' }
    }

    fn show(&mut self, view: &UnitView<'_>) -> std::io::Result<()> {
        writeln!(self.output, "Function: {} Line: {}", view.unit_name(), view.location())?;
        for (line, text) in view.context(CONTEXT_LINES, CONTEXT_LINES) {
            let marker = if line == view.location() { '>' } else { ' ' };
            writeln!(self.output, "{marker}{line:5}  {text}")?;
        }
        Ok(())
    }

    fn show_variables(&mut self, view: &UnitView<'_>) -> std::io::Result<()> {
        for var in view.variables() {
            writeln!(self.output, "{} {} = {}", var.ty, var.name, var.value)?;
        }
        Ok(())
    }

    fn read_command(&mut self) -> std::io::Result<Option<char>> {
        write!(self.output, "> ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().chars().next().unwrap_or(self.last)))
    }

    fn prompt(&mut self, view: &UnitView<'_>) -> std::io::Result<ExecutionMode> {
        self.show(view)?;
        loop {
            let Some(command) = self.read_command()? else {
                return Ok(ExecutionMode::Run);
            };
            let mode = match command {
                'n' => ExecutionMode::Step,
                's' => ExecutionMode::StepInto,
                'r' => ExecutionMode::Run,
                'h' => ExecutionMode::Halt,
                'v' => {
                    self.show_variables(view)?;
                    continue;
                }
                _ => {
                    writeln!(self.output, "commands: n(ext) s(tep into) r(un) h(alt) v(ariables)")?;
                    continue;
                }
            };
            self.last = command;
            return Ok(mode);
        }
    }
}

impl<R: BufRead, W: Write> Controller for Debugger<R, W> {
    fn step(&mut self, view: &UnitView<'_>) -> ExecutionMode {
        self.prompt(view).unwrap_or_else(|e| {
            tracing::warn!("debugger i/o failed: {e}");
            ExecutionMode::Run
        })
    }

    fn exception(&mut self, view: &UnitView<'_>, exception: Exception) {
        // Ignore write failures; the exception itself is reported elsewhere.
        let _ = writeln!(
            self.output,
            "Exception: {exception} in {} at line {}",
            view.unit_name(),
            view.location()
        );
    }
}
