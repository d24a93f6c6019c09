//! Definitions: the unit AST, its construction from source text, the module
//! symbol table and the resolver.

pub mod args;
pub mod ast;
pub mod construct;
pub mod deferror;
pub mod lexer;
pub mod module;
mod parser;
pub mod resolve;
pub mod types;

pub use ast::*;
pub use construct::{construct_unit_from_file, construct_unit_from_string};
pub use deferror::{DefError, DefErrorKind, DefErrorList};
pub use module::{GroupId, LookupError, Module, ModuleObject, ObjectId, ObjectKind, ObjectList};
pub use resolve::{resolve_unit, NoLookup, Resolved, UnitLookup};
pub use types::{
    allow_primitive_conversion, op_allowed, select_primitive_promotion, steppable_primitive,
    PrimitiveType, ALL_PRIMITIVE_TYPES,
};
