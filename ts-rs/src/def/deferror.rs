//! Construction and resolution diagnostics.
//!
//! Each diagnostic keeps its structured payload so a host can render it
//! without re-parsing; [`DefError`]'s `Display` gives the standard message.

use std::fmt;

use super::ast::Location;
use super::types::PrimitiveType;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefErrorKind {
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("Incompatible types '{from}' and '{to}'")]
    IncompatibleTypes { from: PrimitiveType, to: PrimitiveType },
    #[error("Invalid use of operator '{op}' with type '{ty}'")]
    InvalidUseOfOperator { op: String, ty: PrimitiveType },
    #[error("Use of undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("Flow control statement '{0}' being used outside of loop")]
    FlowControlOutsideLoop(String),
    #[error("Function '{name}' was passed {given} arguments when {expected} were expected")]
    WrongArgumentCount { name: String, given: usize, expected: usize },
    #[error("Redefinition of variable '{0}'")]
    VariableRedefinition(String),
    #[error("Function with name '{0}' could not be found")]
    UndefinedFunction(String),
    #[error("Functions which have no output cannot be used in an expression")]
    UsingVoidType,
    #[error("Expression type could not be decided")]
    UsingDelayedType,
    #[error("Redefinition of function '{0}'")]
    FunctionRedefinition(String),
    #[error("Unsteppable type '{0}' used in for loop")]
    TypeNotSteppable(PrimitiveType),
    #[error("Function '{0}' cannot be used as an action trigger")]
    FunctionNotActionable(String),
    #[error("Action controller '{0}' cannot be called as a function")]
    FunctionNotInvocable(String),
    #[error("Argument {index} of '{name}' has type '{from}' which cannot be converted to '{to}'")]
    ArgumentTypeMismatch { name: String, index: usize, from: PrimitiveType, to: PrimitiveType },
    #[error("Cyclic reference to unit '{0}' whose output type is not yet known")]
    CyclicReference(String),
    #[error("Unreachable code after '{0}'")]
    UnreachableCode(String),
}

impl DefErrorKind {
    /// Numeric code, as printed in `ERROR[code]`.
    pub fn code(&self) -> i32 {
        match self {
            DefErrorKind::Internal(_) => -1,
            DefErrorKind::Syntax(_) => -2,
            DefErrorKind::IncompatibleTypes { .. } => -3,
            DefErrorKind::InvalidUseOfOperator { .. } => -4,
            DefErrorKind::UndefinedVariable(_) => -5,
            DefErrorKind::FlowControlOutsideLoop(_) => -6,
            DefErrorKind::WrongArgumentCount { .. } => -7,
            DefErrorKind::VariableRedefinition(_) => -8,
            DefErrorKind::UndefinedFunction(_) => -9,
            DefErrorKind::UsingVoidType => -10,
            DefErrorKind::UsingDelayedType => -11,
            DefErrorKind::FunctionRedefinition(_) => -12,
            DefErrorKind::TypeNotSteppable(_) => -13,
            DefErrorKind::FunctionNotActionable(_) => -14,
            DefErrorKind::FunctionNotInvocable(_) => -15,
            DefErrorKind::ArgumentTypeMismatch { .. } => -3,
            DefErrorKind::CyclicReference(_) => -16,
            DefErrorKind::UnreachableCode(_) => -17,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, DefErrorKind::Syntax(_))
    }
}

/// One diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct DefError {
    pub kind: DefErrorKind,
    pub unit_name: String,
    pub location: Location,
    pub warning: bool,
}

impl fmt::Display for DefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.warning { "WARNING" } else { "ERROR" };
        write!(
            f,
            "{label}[{}] function={} line={}: {}",
            self.kind.code(),
            self.unit_name,
            self.location,
            self.kind
        )
    }
}

impl std::error::Error for DefError {}

/// Diagnostics accumulated over one compilation.
#[derive(Debug, Clone, Default)]
pub struct DefErrorList {
    errors: Vec<DefError>,
    error_count: usize,
    warning_count: usize,
}

impl DefErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, unit_name: &str, location: Location, kind: DefErrorKind) {
        tracing::debug!(unit = unit_name, line = location, code = kind.code(), "definition error: {kind}");
        self.error_count += 1;
        self.errors.push(DefError { kind, unit_name: unit_name.to_owned(), location, warning: false });
    }

    pub fn warning(&mut self, unit_name: &str, location: Location, kind: DefErrorKind) {
        self.warning_count += 1;
        self.errors.push(DefError { kind, unit_name: unit_name.to_owned(), location, warning: true });
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DefError> {
        self.errors.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &DefError> {
        self.errors.iter().filter(|e| !e.warning)
    }

    /// Append everything from `other`.
    pub fn append(&mut self, other: DefErrorList) {
        self.error_count += other.error_count;
        self.warning_count += other.warning_count;
        self.errors.extend(other.errors);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl<'a> IntoIterator for &'a DefErrorList {
    type Item = &'a DefError;
    type IntoIter = std::slice::Iter<'a, DefError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_tool_format() {
        let mut list = DefErrorList::new();
        list.error("main", 4, DefErrorKind::UndefinedFunction("foo".into()));
        let e = list.iter().next().unwrap();
        assert_eq!(
            e.to_string(),
            "ERROR[-9] function=main line=4: Function with name 'foo' could not be found"
        );
    }

    #[test]
    fn counts_split_errors_and_warnings() {
        let mut list = DefErrorList::new();
        list.warning("u", 1, DefErrorKind::UnreachableCode("break".into()));
        list.error("u", 2, DefErrorKind::UsingVoidType);
        assert_eq!(list.error_count(), 1);
        assert_eq!(list.warning_count(), 1);
        assert_eq!(list.errors().count(), 1);
        assert!(list.iter().next().unwrap().to_string().starts_with("WARNING[-17]"));
    }

    #[test]
    fn wrong_count_message() {
        let kind = DefErrorKind::WrongArgumentCount { name: "f".into(), given: 1, expected: 2 };
        assert_eq!(kind.to_string(), "Function 'f' was passed 1 arguments when 2 were expected");
        assert_eq!(kind.code(), -7);
    }
}
