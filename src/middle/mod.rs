//! Names are linked and types are checked here. Both passes only write into
//! the annotation slots of the AST, which the backend reads afterwards.
//!
//! The numeric promotion rule in [`primitive`] is shared by the type checker
//! and the code generator, so both agree on the operand type of every binary
//! operation.

pub mod primitive;
pub mod resolve;
pub mod scope;
pub mod ty;
pub mod type_check;
