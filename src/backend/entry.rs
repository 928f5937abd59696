//! The `@main` the operating system calls
//!
//! It converts `argc`/`argv` into a `str[]` when the user `main` asks for
//! `args`, calls it, and turns an uncaught error into a message and a non-zero
//! exit status.

use indoc::formatdoc;

use super::{
    builder::ScopeBuilder,
    function::resolved,
    layout::{ir_throwing_type, ir_type, string_constant},
    module::ModuleGenerator,
};
use crate::{error::CompileError, frontend::ast::FunctionId};

const UNCAUGHT_FORMAT: &str = "Uncaught Error: %d '%s'\n";

pub fn main_wrapper(generator: &mut ModuleGenerator, main: FunctionId) -> Result<String, CompileError> {
    let module = generator.module;
    let definition = &module.functions[main];
    let return_type = resolved(module, &definition.return_type)?;

    let mut scope = ScopeBuilder::new();
    let mut arguments = Vec::new();

    for (position, parameter) in definition.parameters.iter().enumerate() {
        let variable = &module.variables[*parameter];

        if position == 0 && variable.name.value() == "args" {
            scope.emit("%arr = alloca %type.str, i32 %argc");
            scope.emit("%args = call %type.slice @magma.argsToSlice(i32 %argc, ptr %argv, ptr %arr)");
            arguments.push("%type.slice %args".to_string());
        } else {
            let ty = resolved(module, &variable.ty)?;
            arguments.push(format!("{} zeroinitializer", ir_type(&ty)));
        }
    }

    let symbol = module.function_symbol(main);
    let arguments = arguments.join(", ");
    let composite = ir_throwing_type(&return_type);

    if return_type.throws {
        generator.global(string_constant("@.main.fmt.err", UNCAUGHT_FORMAT));
        generator
            .sinks
            .declarations
            .lock()
            .insert("declare i32 @printf(ptr, ...)".to_string());

        scope.emit(format!("%r = call {composite} {symbol}({arguments})"));
        scope.emit(format!("%e = extractvalue {composite} %r, 0"));
        scope.emit("%code = extractvalue %type.error %e, 0");
        scope.emit("%failed = icmp ne i32 %code, 0");
        scope.emit("br i1 %failed, label %uncaught, label %done");
        scope.label("uncaught");
        scope.emit("%message = extractvalue %type.error %e, 1");
        scope.emit("%text = extractvalue %type.str %message, 0");
        scope.emit("call i32 (ptr, ...) @printf(ptr @.main.fmt.err, i32 %code, ptr %text)");
        scope.emit("ret i32 %code");
        scope.label("done");
    } else if return_type.is_void() {
        scope.emit(format!("call void {symbol}({arguments})"));
    } else {
        scope.emit(format!("%r = call {composite} {symbol}({arguments})"));
    }

    scope.emit("ret i32 0");

    let inline = if generator.options.always_inline {
        " alwaysinline"
    } else {
        ""
    };

    Ok(formatdoc! {"
        define i32 @main(i32 %argc, ptr %argv){inline} {{
        entry:
        {body}}}
    ", body = scope.finish()})
}
