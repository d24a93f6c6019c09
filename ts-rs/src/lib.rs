//! Trigger Script: units of script code that call each other and native
//! functions, and react to events through actions.
//!
//! Source text is constructed into a unit AST ([`def`]), collected in a
//! [`def::Module`], resolved lazily from the top-level invocation
//! ([`compile`]) and run by the tree-walking [`interp::Interpreter`].  Native
//! code plugs in through [`ffi`]; [`stdlib`] holds the standard groups.

pub mod cli;
pub mod compile;
pub mod config;
pub mod debugger;
pub mod def;
pub mod error;
pub mod ffi;
pub mod interp;
pub mod stdlib;

pub use error::{Error, Result};
