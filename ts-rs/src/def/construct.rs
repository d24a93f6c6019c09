//! Building units from source text.

use std::path::Path;

use super::ast::Unit;
use super::deferror::DefErrorList;
use super::parser::Parser;
use crate::error::{Error, Result};

/// Parse `text` into a unit named `name`.  Diagnostics go to `errors`; any
/// syntax error fails construction.
pub fn construct_unit_from_string(text: &str, name: &str, errors: &mut DefErrorList) -> Result<Unit> {
    let (unit, syntax_errors) = Parser::new(text, name, errors).parse_unit(text);
    if syntax_errors > 0 {
        tracing::debug!(unit = name, syntax_errors, "unit failed to construct");
        return Err(Error::Construct(name.to_owned()));
    }
    tracing::debug!(
        unit = name,
        statements = unit.global_block.statements.len(),
        actions = unit.actions.len(),
        "constructed unit"
    );
    Ok(unit)
}

pub fn construct_unit_from_file(path: &Path, name: &str, errors: &mut DefErrorList) -> Result<Unit> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::FileOpen {
        path: path.to_owned(),
        source,
    })?;
    construct_unit_from_string(&text, name, errors)
}
