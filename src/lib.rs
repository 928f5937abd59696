//! Ahead-of-time compiler backend for the Magma language.
//!
//! A [`ModuleBundle`] built by the parser goes through three stages:
//!
//! 1. [`Resolver::resolve`] binds every name and type, and classifies calls.
//! 2. [`TypeChecker::check`] infers expression types and enforces the typing
//!    rules.
//! 3. [`CodeGenerator::generate`] emits the program as textual SSA IR, one
//!    worker per module.
//!
//! [`compile`] runs all three and stops at the first error.

use std::sync::Once;

pub mod backend;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

pub use backend::{CodeGenerator, CodegenOptions, IrProgram};
pub use error::{CompileError, CompileErrorKind};
pub use frontend::ast::ModuleBundle;
pub use middle::{resolve::Resolver, type_check::TypeChecker};

#[tracing::instrument(level = "debug", skip_all, fields(modules = bundle.len()))]
pub fn compile(bundle: &ModuleBundle, options: &CodegenOptions) -> Result<IrProgram, CompileError> {
    Resolver::resolve(bundle)?;
    TypeChecker::check(bundle)?;
    CodeGenerator::generate(bundle, options)
}

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing` subscriber filtered by `RUST_LOG`. Nothing happens if
/// the variable is unset or a subscriber was installed before.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();

            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
        }
    });
}
