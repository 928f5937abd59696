//! Compile errors raised by every stage, and their rendering as diagnostics
//!
//! Each stage stops at the first error it finds and hands it back as a
//! [`CompileError`]. Nothing is printed unless the caller asks for it with
//! [`CompileError::report`].

use std::sync::Arc;

use colored::Colorize;
use thiserror::Error;

use crate::frontend::{SourceFile, Span};

/// Expands to the name of the enclosing function
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

/// Builds a [`CompileError`] for an optional location, recording the compiler
/// function which raised it when `error-backtrace` is enabled
macro_rules! report_error {
    ($location:expr, $kind:expr $(,)?) => {{
        let error = $crate::error::CompileError::new($kind, $location);

        #[cfg(feature = "error-backtrace")]
        let error = error.with_origin($crate::error::ErrorOrigin {
            function: format!("{}::{}", module_path!(), $crate::error::function!()),
            file: file!(),
            line: line!(),
        });

        error
    }};
}

pub(crate) use {function, report_error};

/// Where in the user's source an error points to
#[derive(Debug, Clone)]
pub struct Location {
    pub source_file: Arc<SourceFile>,
    pub span: Span,
}

impl Location {
    pub fn new(source_file: &Arc<SourceFile>, span: Span) -> Self {
        Self {
            source_file: source_file.clone(),
            span,
        }
    }
}

/// The compiler function that raised an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOrigin {
    pub function: String,
    pub file: &'static str,
    pub line: u32,
}

#[derive(Debug, Error)]
#[error("{kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub location: Option<Location>,
    pub origin: Option<ErrorOrigin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error(transparent)]
    Link(#[from] LinkErrorKind),
    #[error(transparent)]
    Type(#[from] TypeErrorKind),
    #[error(transparent)]
    Codegen(#[from] CodegenErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkErrorKind {
    #[error("module `{name}` is defined more than once")]
    DuplicateModule { name: String },
    #[error("entry module `{name}` is not part of the bundle")]
    UnknownEntryModule { name: String },
    #[error("conflicting definition for `{name}`")]
    DuplicateBinding { name: String },
    #[error("unresolved name `{name}`")]
    UnresolvedName { name: String },
    #[error("unresolved module alias `{alias}`")]
    UnresolvedAlias { alias: String },
    #[error("imported module `{module}` is not part of the bundle")]
    UnresolvedModule { module: String },
    #[error("unresolved type `{name}`")]
    UnresolvedType { name: String },
    #[error("`{container}` has no field or member function named `{member}`")]
    UnknownMember { member: String, container: String },
    #[error("cannot access `{member}` on non-struct type {ty}")]
    NotAStruct { member: String, ty: String },
    #[error("cannot access `{member}` after a member function")]
    FieldAfterMethod { member: String },
    #[error("member function `{method}` must be called")]
    MethodNotCalled { method: String },
    #[error("`{name}` is not callable")]
    NotCallable { name: String },
    #[error("destructor `{destructor}` of `{strukt}` is not a member function")]
    UnresolvedDestructor { strukt: String, destructor: String },
    #[error("destructor `{destructor}` of `{strukt}` must take no parameters and return void")]
    InvalidDestructor { strukt: String, destructor: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeErrorKind {
    #[error("expected {construct} to be bool but found {actual}")]
    ExpectedBool {
        construct: &'static str,
        actual: String,
    },
    #[error("expected an error value but found {actual}")]
    ExpectedError { actual: String },
    #[error("expected an integer but found {actual}")]
    ExpectedInteger { actual: String },
    #[error("expected a number but found {actual}")]
    ExpectedNumeric { actual: String },
    #[error("bitwise operators can not be applied to floats")]
    FloatBitwise,
    #[error("mismatched bitwise operands {lhs} and {rhs}")]
    MixedBitwiseOperands { lhs: String, rhs: String },
    #[error("function returns {expected} but the returned value is {actual}")]
    ReturnMismatch { expected: String, actual: String },
    #[error("value of type {from} can not be implicitly converted to {to}")]
    ImplicitNumericCast { from: String, to: String },
    #[error("`try` applied to a call which can not throw")]
    TryOnNonThrowing,
    #[error("errors can only be raised inside a throwing function")]
    ThrowOutsideThrowingFunction,
    #[error("destructured call must be able to throw")]
    DestructureNonThrowing,
    #[error("destructured call must return a value")]
    DestructureVoid,
    #[error("error binding must be of type error but is {actual}")]
    DestructureErrorType { actual: String },
    #[error("value binding is {actual} but the call returns {expected}")]
    DestructureValueType { expected: String, actual: String },
    #[error("`{name}` is not a value")]
    NotAValue { name: String },
    #[error("left hand side of an assignment must be a variable, field or subscript")]
    NotAssignable,
    #[error("only variables, fields and subscripts have an address")]
    NotAddressable,
    #[error("values of type {actual} can not be subscripted")]
    NotSubscriptable { actual: String },
    #[error("expected {expected} arguments but found {actual}")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("type {ty} has no destructor")]
    NoDestructor { ty: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenErrorKind {
    #[error("internal: {what} was never computed")]
    MissingAnnotation { what: &'static str },
    #[error("internal: {what} was computed twice with different results")]
    AnnotationConflict { what: &'static str },
    #[error("internal: {what} can not be lowered")]
    Unsupported { what: String },
    #[error("internal: call target was never classified")]
    UnclassifiedCall,
    #[error("internal: generation of module `{module}` panicked")]
    WorkerPanicked { module: String },
    #[error("entry module `{module}` has no `main` function")]
    MissingEntryPoint { module: String },
}

impl CompileErrorKind {
    /// The long form of the message, explaining how to address the error
    pub fn help(&self) -> &'static str {
        match self {
            CompileErrorKind::Link(kind) => match kind {
                LinkErrorKind::DuplicateModule { .. } => {
                    "every compiled file must declare a distinct module name"
                }
                LinkErrorKind::UnknownEntryModule { .. } => {
                    "the entry module must be one of the modules handed to the compiler"
                }
                LinkErrorKind::DuplicateBinding { .. } => {
                    "parameters and locals share one namespace per function, rename one of the bindings"
                }
                LinkErrorKind::UnresolvedName { .. } => {
                    "names must refer to a variable, function or struct visible from this scope"
                }
                LinkErrorKind::UnresolvedAlias { .. } => {
                    "qualified names must start with an alias declared by an import of this file"
                }
                LinkErrorKind::UnresolvedModule { .. } => {
                    "imports can only name modules which are compiled together with this one"
                }
                LinkErrorKind::UnresolvedType { .. } => {
                    "types must be intrinsic or name a struct of this module or an imported one"
                }
                LinkErrorKind::UnknownMember { .. } => {
                    "check the struct definition for the available fields and member functions"
                }
                LinkErrorKind::NotAStruct { .. } => {
                    "members can only be accessed on structs or pointers to structs"
                }
                LinkErrorKind::FieldAfterMethod { .. } => {
                    "a member function may only appear as the last part of a name"
                }
                LinkErrorKind::MethodNotCalled { .. } => {
                    "member functions are bound to their owner and can only be called directly"
                }
                LinkErrorKind::NotCallable { .. } => {
                    "only functions, member functions and function pointers can be called"
                }
                LinkErrorKind::UnresolvedDestructor { .. } => {
                    "a destructor must name a member function of the struct it belongs to"
                }
                LinkErrorKind::InvalidDestructor { .. } => {
                    "destructors are called implicitly, so they can not take arguments or return values"
                }
            },
            CompileErrorKind::Type(kind) => match kind {
                TypeErrorKind::ExpectedBool { .. } => {
                    "conditions and logical operands must be bool, compare the value explicitly"
                }
                TypeErrorKind::ExpectedError { .. } => "only values of type error can be thrown",
                TypeErrorKind::ExpectedInteger { .. } => {
                    "shifts and subscripts require integer operands"
                }
                TypeErrorKind::ExpectedNumeric { .. } => {
                    "arithmetic is only defined for integer and float operands"
                }
                TypeErrorKind::FloatBitwise => "bitwise operators require integer or bool operands",
                TypeErrorKind::MixedBitwiseOperands { .. } => {
                    "bitwise operands must either both be bool or both be integers"
                }
                TypeErrorKind::ReturnMismatch { .. } => {
                    "void functions can only return nothing, other functions must return a value"
                }
                TypeErrorKind::ImplicitNumericCast { .. } => {
                    "numbers are never converted implicitly on assignment, declare the value with the target type"
                }
                TypeErrorKind::TryOnNonThrowing => "remove the `try`, the call always succeeds",
                TypeErrorKind::ThrowOutsideThrowingFunction => {
                    "mark the return type of the enclosing function with `!`"
                }
                TypeErrorKind::DestructureNonThrowing => {
                    "destructuring splits a throwing call into its value and its error"
                }
                TypeErrorKind::DestructureVoid => {
                    "a throwing void call has no value to bind, use `try` instead"
                }
                TypeErrorKind::DestructureErrorType { .. } => {
                    "the second binding of a destructuring assignment receives the error"
                }
                TypeErrorKind::DestructureValueType { .. } => {
                    "the first binding of a destructuring assignment receives the returned value"
                }
                TypeErrorKind::NotAValue { .. } => "struct names can only be used as types",
                TypeErrorKind::NotAssignable => "only memory locations can be assigned to",
                TypeErrorKind::NotAddressable => "temporaries do not live in memory",
                TypeErrorKind::NotSubscriptable { .. } => {
                    "only slices, pointers and reference counted boxes can be subscripted"
                }
                TypeErrorKind::ArgumentCount { .. } => {
                    "the number of arguments must match the number of declared parameters"
                }
                TypeErrorKind::NoDestructor { .. } => {
                    "destructor calls require a struct which declares a destructor"
                }
            },
            CompileErrorKind::Codegen(kind) => match kind {
                CodegenErrorKind::MissingAnnotation { .. }
                | CodegenErrorKind::AnnotationConflict { .. }
                | CodegenErrorKind::Unsupported { .. }
                | CodegenErrorKind::UnclassifiedCall
                | CodegenErrorKind::WorkerPanicked { .. } => {
                    "this is a bug in the compiler, please report it along with the input"
                }
                CodegenErrorKind::MissingEntryPoint { .. } => {
                    "define `fn main` in the entry module or disable the entry wrapper"
                }
            },
        }
    }
}

impl CompileError {
    pub fn new(kind: impl Into<CompileErrorKind>, location: Option<Location>) -> Self {
        Self {
            kind: kind.into(),
            location,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: ErrorOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn short(&self) -> String {
        self.kind.to_string()
    }

    pub fn help(&self) -> &'static str {
        self.kind.help()
    }

    /// Renders the error with its position, the surrounding source lines and
    /// a caret under the offending span
    pub fn render(&self) -> String {
        let mut out = String::new();

        match &self.location {
            Some(location) => out.push_str(&format!(
                "{} {}: {}\n",
                location
                    .source_file
                    .format_span_position(location.span)
                    .white(),
                "error".red(),
                self.short()
            )),
            None => out.push_str(&format!("{}: {}\n", "error".red(), self.short())),
        }

        if let Some(origin) = &self.origin {
            out.push_str(&format!(
                "{}: {} {}\n",
                "backtrace".blue(),
                origin.function,
                format!("(at {}:{})", origin.file, origin.line).white()
            ));
        }

        if let Some(location) = &self.location {
            out.push_str(&render_excerpt(&location.source_file, location.span));
        }

        out.push_str(&format!("{}: {}\n", "help".cyan(), self.help()));

        out
    }

    pub fn render_plain(&self) -> String {
        strip_ansi_escapes::strip_str(self.render())
    }

    /// Writes the rendered diagnostic to stderr
    pub fn report(&self) {
        eprint!("{}", self.render());
    }
}

fn render_excerpt(source_file: &SourceFile, span: Span) -> String {
    let (line, column) = source_file.position_of(span.start);
    let Some(current) = source_file.line(line) else {
        return String::new();
    };

    let last = (line + 1).min(source_file.line_count());
    let width = last.to_string().len();
    let gutter = |n: usize| format!("{n:>width$}| ").blue().to_string();

    let mut out = String::new();

    if line > 1 {
        if let Some(previous) = source_file.line(line - 1) {
            out.push_str(&format!("{}{previous}\n", gutter(line - 1)));
        }
    }

    out.push_str(&format!("{}{current}\n", gutter(line)));

    let remaining = current.chars().count().saturating_sub(column - 1);
    let underline = (span.end.saturating_sub(span.start))
        .min(remaining)
        .max(1);
    out.push_str(&format!(
        "{}{}\n",
        " ".repeat(width + 2 + column - 1),
        "^".repeat(underline).red()
    ));

    if last > line {
        if let Some(next) = source_file.line(line + 1) {
            out.push_str(&format!("{}{next}\n", gutter(line + 1)));
        }
    }

    out
}
