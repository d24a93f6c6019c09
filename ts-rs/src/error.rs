//! Module and runtime return codes.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unit '{0}' failed to construct")]
    Construct(String),
    #[error("unit '{0}' failed to resolve")]
    Resolve(String),
    #[error("unit '{0}' has invalid input declarations")]
    ResolveInitialize(String),
    #[error("module object '{0}' not found")]
    ObjectNotFound(String),
    #[error("'{name}' was passed {given} arguments when {expected} were expected")]
    ArgumentCount { name: String, given: usize, expected: usize },
    #[error("definition of '{0}' is incomplete")]
    IncompleteDef(String),
    #[error("cannot register FFI function '{name}': {reason}")]
    FfiRegistration { name: String, reason: String },
    #[error("module already contains a '{0}' unit")]
    ModuleMainNotUnique(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Numeric code as reported by the command-line tool.
    pub fn code(&self) -> i32 {
        match self {
            Error::FileOpen { .. } => -1,
            Error::Construct(_) => -2,
            Error::Resolve(_) => -4,
            Error::ResolveInitialize(_) => -6,
            Error::ObjectNotFound(_) => -8,
            Error::ArgumentCount { .. } => -9,
            Error::IncompleteDef(_) => -10,
            Error::FfiRegistration { .. } => -11,
            Error::ModuleMainNotUnique(_) => -12,
        }
    }
}
