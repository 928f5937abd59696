//! The backend lowers a checked bundle to textual SSA IR.
//!
//! Every module is generated on its own worker into private buffers. The only
//! state the workers share is the struct layout sink and the set of external
//! declarations, each behind a mutex. Once all workers are joined the pieces
//! are concatenated in a fixed order: header, declarations, struct layouts,
//! then the module fragments in submission order. The output is therefore the
//! same no matter which worker finishes first.

use std::{
    collections::{BTreeMap, BTreeSet},
    panic::{self, AssertUnwindSafe},
};

use hashbrown::HashSet;
use itertools::Itertools;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::debug;

use crate::{
    error::{CodegenErrorKind, CompileError, LinkErrorKind, report_error},
    frontend::{
        ast::{ModuleBundle, ModuleId},
        intern::InternedSymbol,
    },
};

mod builder;
mod entry;
mod expression;
mod function;
pub mod layout;
mod module;

use module::ModuleGenerator;

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Module whose `main` is wrapped by the OS entry point. Defaults to the
    /// entry module of the bundle.
    pub entry_module: Option<String>,
    pub always_inline: bool,
    pub emit_main_wrapper: bool,
    pub header_comment: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            entry_module: None,
            always_inline: true,
            emit_main_wrapper: true,
            header_comment: "Magma".to_string(),
        }
    }
}

/// The generated program as one IR text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrProgram {
    pub text: String,
}

impl core::fmt::Display for IrProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Declarations every program carries
const FIXED_DECLARATIONS: [&str; 2] = [
    "declare void @llvm.memset.p0.i64(ptr, i8, i64, i1)",
    "declare %type.slice @magma.argsToSlice(i32, ptr, ptr)",
];

/// State shared between the module workers
pub struct Sinks {
    /// Struct layouts as `(name, line)` in declaration order, per module
    pub layouts: Mutex<BTreeMap<ModuleId, Vec<(String, String)>>>,
    pub declarations: Mutex<BTreeSet<String>>,
}

impl Sinks {
    pub fn new() -> Self {
        Self {
            layouts: Mutex::new(BTreeMap::new()),
            declarations: Mutex::new(FIXED_DECLARATIONS.iter().map(|d| d.to_string()).collect()),
        }
    }

    fn declarations(&self) -> String {
        self.declarations.lock().iter().join("\n")
    }

    /// Layouts ordered by module, then declaration. A name is only emitted
    /// once.
    fn layouts(&self) -> String {
        let layouts = self.layouts.lock();
        let mut seen = HashSet::new();

        layouts
            .values()
            .flatten()
            .filter(|(name, _)| seen.insert(name.as_str()))
            .map(|(_, line)| line)
            .join("\n")
    }
}

impl Default for Sinks {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CodeGenerator;

impl CodeGenerator {
    #[tracing::instrument(level = "debug", skip_all, fields(modules = bundle.len()))]
    pub fn generate(bundle: &ModuleBundle, options: &CodegenOptions) -> Result<IrProgram, CompileError> {
        let entry = match &options.entry_module {
            Some(name) => bundle
                .module_by_name(InternedSymbol::new(name))
                .ok_or_else(|| {
                    report_error!(
                        None,
                        LinkErrorKind::UnknownEntryModule { name: name.clone() }
                    )
                })?,
            None => bundle.entry(),
        };

        let sinks = Sinks::new();

        let results = bundle
            .modules()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(id, module)| {
                panic::catch_unwind(AssertUnwindSafe(|| {
                    ModuleGenerator::new(bundle, id, entry, options, &sinks).generate()
                }))
                .unwrap_or_else(|_| {
                    Err(report_error!(
                        None,
                        CodegenErrorKind::WorkerPanicked {
                            module: module.name.to_string(),
                        }
                    ))
                })
            })
            .collect::<Vec<_>>();

        let fragments = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        let mut text = format!(
            "; {}\n\n; Basic Types\n%type.error = type {{ i32, %type.str }}\n%type.str = type {{ ptr, i64 }}\n%type.slice = type {{ ptr, i64 }}\n\n",
            options.header_comment
        );
        text.push_str(&format!("; Declarations\n{}\n\n", sinks.declarations()));
        text.push_str(&format!("; Struct Layouts\n{}\n\n", sinks.layouts()));
        text.push_str(&fragments.join("\n"));

        debug!(bytes = text.len(), "program assembled");

        Ok(IrProgram { text })
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::CompileErrorKind,
        frontend::{
            ast::{BinaryOperator, Module},
            build::*,
        },
        middle::{resolve::Resolver, type_check::TypeChecker},
    };

    fn library() -> CodegenOptions {
        CodegenOptions {
            emit_main_wrapper: false,
            ..CodegenOptions::default()
        }
    }

    fn checked(modules: Vec<Module>, entry: &str) -> ModuleBundle {
        let bundle = ModuleBundle::new(modules, entry).unwrap();
        Resolver::resolve(&bundle).unwrap();
        TypeChecker::check(&bundle).unwrap();
        bundle
    }

    fn generate(modules: Vec<Module>, entry: &str, options: &CodegenOptions) -> String {
        CodeGenerator::generate(&checked(modules, entry), options)
            .unwrap()
            .text
    }

    /// The definition of `symbol`, from `define` to the closing brace
    fn definition<'t>(program: &'t str, symbol: &str) -> &'t str {
        let header = format!(" {symbol}(");
        let start = program
            .match_indices("define ")
            .map(|(at, _)| at)
            .find(|at| program[*at..].lines().next().unwrap().contains(&header))
            .unwrap_or_else(|| panic!("no definition of {symbol}"));
        let end = start + program[start..].find("\n}\n").unwrap() + 3;
        &program[start..end]
    }

    /// Instruction lines as they appear inside a function body
    fn instructions(lines: &[&str]) -> String {
        lines.iter().map(|line| format!("  {line}\n")).collect()
    }

    fn position(text: &str, needle: &str) -> usize {
        text.find(needle)
            .unwrap_or_else(|| panic!("`{needle}` not found in\n{text}"))
    }

    fn logger(module: &mut ModuleBuilder) {
        module.function("log", vec![("x", ty("i32"))], ty("void"), |_| {});
    }

    #[test]
    fn header_lists_sorted_declarations_and_layouts() {
        let mut app = ModuleBuilder::new("app");
        app.structure("Pair", vec![("a", ty("i32")), ("b", ty("i64"))]);
        app.raw_ir("declare i32 @puts(ptr)\n@counter = global i32 0\n");

        let program = generate(vec![app.finish()], "app", &library());

        assert_eq!(
            program,
            indoc! {r#"
                ; Magma

                ; Basic Types
                %type.error = type { i32, %type.str }
                %type.str = type { ptr, i64 }
                %type.slice = type { ptr, i64 }

                ; Declarations
                declare %type.slice @magma.argsToSlice(i32, ptr, ptr)
                declare i32 @puts(ptr)
                declare void @llvm.memset.p0.i64(ptr, i8, i64, i1)

                ; Struct Layouts
                %struct.app.Pair = type { i32, i64 }

                ; File="<memory>"
                ; Module="app"

                ; Global Defs
                @counter = global i32 0

                ; Code
            "#}
        );
    }

    #[test]
    fn deferred_expressions_run_newest_first() {
        let mut app = ModuleBuilder::new("app");
        logger(&mut app);
        app.function("work", vec![], ty("void"), |body| {
            body.defer(call("log", vec![int("1")]));
            body.defer(call("log", vec![int("2")]));
            body.defer(call("log", vec![int("3")]));
        });

        let program = generate(vec![app.finish()], "app", &library());

        assert_eq!(
            definition(&program, "@app.work"),
            indoc! {"
                define void @app.work() alwaysinline {
                .entry:
                  %.defer.ret = alloca i1
                  store i1 false, ptr %.defer.ret
                  br label %.defer.0.2
                .defer.0.2:
                  call void @app.log(i32 3)
                  br label %.defer.0.1
                .defer.0.1:
                  call void @app.log(i32 2)
                  br label %.defer.0.0
                .defer.0.0:
                  call void @app.log(i32 1)
                  br label %.defer.0.base
                .defer.0.base:
                  ret void
                }
            "}
        );
    }

    #[test]
    fn returns_unwind_nested_defer_chains() {
        let mut app = ModuleBuilder::new("app");
        logger(&mut app);
        app.function("work", vec![], ty("i32"), |body| {
            body.defer(call("log", vec![int("1")]));
            let inner = body.block(|inner| {
                inner.defer(call("log", vec![int("2")]));
                inner.ret(int("5"));
            });
            body.if_then(boolean(true), inner);
            body.ret(int("0"));
        });

        let program = generate(vec![app.finish()], "app", &library());

        assert_eq!(
            definition(&program, "@app.work"),
            indoc! {"
                define i32 @app.work() alwaysinline {
                .entry:
                  %.defer.rv = alloca i32
                  store i32 zeroinitializer, ptr %.defer.rv
                  %.defer.ret = alloca i1
                  store i1 false, ptr %.defer.ret
                  br i1 true, label %.0.1, label %.0.2
                .0.1:
                  store i32 5, ptr %.defer.rv
                  store i1 true, ptr %.defer.ret
                  br label %.defer.1.0
                .0.3:
                  br label %.defer.1.0
                .defer.1.0:
                  call void @app.log(i32 2)
                  br label %.defer.1.base
                .defer.1.base:
                  %.0.4 = load i1, ptr %.defer.ret
                  br i1 %.0.4, label %.defer.0.0, label %.0.2
                .0.2:
                  store i32 0, ptr %.defer.rv
                  store i1 true, ptr %.defer.ret
                  br label %.defer.0.0
                .0.5:
                  br label %.defer.0.0
                .defer.0.0:
                  call void @app.log(i32 1)
                  br label %.defer.0.base
                .defer.0.base:
                  %.0.6 = load i32, ptr %.defer.rv
                  ret i32 %.0.6
                }
            "}
        );
    }

    #[test]
    fn member_accesses_use_declaration_indices() {
        let mut app = ModuleBuilder::new("app");
        app.structure("Pair", vec![("a", ty("i32")), ("b", ty("i64"))]);
        app.function("second", vec![], ty("i64"), |body| {
            let pair = body.define("p", ty("Pair"));
            body.expression(pair);
            body.expression(assign(name("p.b"), int("7")));
            body.ret(name("p.b"));
        });

        let program = generate(vec![app.finish()], "app", &library());

        assert_eq!(
            definition(&program, "@app.second"),
            indoc! {"
                define i64 @app.second() alwaysinline {
                .entry:
                  %.defer.rv = alloca i64
                  store i64 zeroinitializer, ptr %.defer.rv
                  %.defer.ret = alloca i1
                  store i1 false, ptr %.defer.ret
                  %p = alloca %struct.app.Pair
                  store %struct.app.Pair zeroinitializer, ptr %p
                  %.0.1 = getelementptr %struct.app.Pair, ptr %p, i32 0, i32 1
                  store i64 7, ptr %.0.1
                  %.0.2 = load i64, ptr %.0.1
                  %.0.3 = load %struct.app.Pair, ptr %p
                  %.0.4 = extractvalue %struct.app.Pair %.0.3, 1
                  store i64 %.0.4, ptr %.defer.rv
                  store i1 true, ptr %.defer.ret
                  br label %.defer.0.base
                .0.5:
                  br label %.defer.0.base
                .defer.0.base:
                  %.0.6 = load i64, ptr %.defer.rv
                  ret i64 %.0.6
                }
            "}
        );
    }

    #[test]
    fn operands_are_widened_and_literals_emitted_verbatim() {
        let mut math = ModuleBuilder::new("math");
        math.function(
            "widen",
            vec![("a", ty("i32")), ("b", ty("i64"))],
            ty("i64"),
            |body| body.ret(binary(BinaryOperator::Add, name("a"), name("b"))),
        );
        math.function("scale", vec![("a", ty("i32"))], ty("i32"), |body| {
            body.ret(binary(BinaryOperator::Multiply, name("a"), int("2")))
        });

        let program = generate(vec![math.finish()], "math", &library());

        assert_eq!(
            definition(&program, "@math.widen"),
            indoc! {"
                define i64 @math.widen(i32 %a, i64 %b) alwaysinline {
                .entry:
                  %.defer.rv = alloca i64
                  store i64 zeroinitializer, ptr %.defer.rv
                  %.defer.ret = alloca i1
                  store i1 false, ptr %.defer.ret
                  %.0.1 = sext i32 %a to i64
                  %.0.2 = add i64 %.0.1, %b
                  store i64 %.0.2, ptr %.defer.rv
                  store i1 true, ptr %.defer.ret
                  br label %.defer.0.base
                .0.3:
                  br label %.defer.0.base
                .defer.0.base:
                  %.0.4 = load i64, ptr %.defer.rv
                  ret i64 %.0.4
                }
            "}
        );
        assert!(definition(&program, "@math.scale").contains("= mul i32 %a, 2\n"));
    }

    #[test]
    fn operators_select_instructions_by_signedness() {
        let mut ops = ModuleBuilder::new("ops");
        ops.function("less", vec![("x", ty("f32")), ("y", ty("f32"))], ty("bool"), |body| {
            body.ret(binary(BinaryOperator::LessThan, name("x"), name("y")))
        });
        ops.function("below", vec![("x", ty("u8")), ("y", ty("u8"))], ty("bool"), |body| {
            body.ret(binary(BinaryOperator::LessThan, name("x"), name("y")))
        });
        ops.function("half", vec![("x", ty("u32"))], ty("u32"), |body| {
            body.ret(binary(BinaryOperator::ShiftRight, name("x"), int("1")))
        });
        ops.function("quotient", vec![("x", ty("i16")), ("y", ty("i16"))], ty("i16"), |body| {
            body.ret(binary(BinaryOperator::Remainder, name("x"), name("y")))
        });
        ops.function("flip", vec![("x", ty("bool"))], ty("bool"), |body| {
            body.ret(bitwise_not(name("x")))
        });

        let program = generate(vec![ops.finish()], "ops", &library());

        assert!(definition(&program, "@ops.less").contains("= fcmp olt float %x, %y\n"));
        assert!(definition(&program, "@ops.below").contains("= icmp ult i8 %x, %y\n"));
        assert!(definition(&program, "@ops.half").contains("= lshr i32 %x, 1\n"));
        assert!(definition(&program, "@ops.quotient").contains("= srem i16 %x, %y\n"));
        assert!(definition(&program, "@ops.flip").contains("= xor i1 %x, 1\n"));
    }

    #[test]
    fn logical_operators_short_circuit_through_a_slot() {
        let mut app = ModuleBuilder::new("app");
        app.function("both", vec![("a", ty("bool")), ("b", ty("bool"))], ty("bool"), |body| {
            body.ret(binary(BinaryOperator::LogicalAnd, name("a"), name("b")))
        });

        let program = generate(vec![app.finish()], "app", &library());
        let both = definition(&program, "@app.both");

        assert!(both.contains(&instructions(&["%.0.1 = alloca i1"])));
        assert!(both.contains(indoc! {"
                  store i1 %a, ptr %.0.1
                  br i1 %a, label %.0.2, label %.0.3
                .0.2:
                  store i1 %b, ptr %.0.1
                  br label %.0.3
                .0.3:
                  %.0.4 = load i1, ptr %.0.1
        "}));
        assert!(!both.contains("phi"));
    }

    #[test]
    fn fixed_slices_are_backed_by_a_zeroed_array() {
        let mut app = ModuleBuilder::new("app");
        app.function("fill", vec![], ty("void"), |body| {
            let buffer = body.define("buf", array(ty("i32"), 4));
            body.expression(buffer);
            body.expression(assign(subscript("buf", int("1")), int("9")));
        });

        let program = generate(vec![app.finish()], "app", &library());
        let fill = definition(&program, "@app.fill");

        assert!(fill.contains(&instructions(&[
            "%buf = alloca %type.slice",
            "%buf.data = alloca [4 x i32]",
        ])));
        assert!(fill.contains(&instructions(&[
            "call void @llvm.memset.p0.i64(ptr %buf.data, i8 0, i64 16, i1 false)",
            "%.0.1 = insertvalue %type.slice undef, ptr %buf.data, 0",
            "%.0.2 = insertvalue %type.slice %.0.1, i64 4, 1",
            "store %type.slice %.0.2, ptr %buf",
            "%.0.3 = load %type.slice, ptr %buf",
            "%.0.4 = extractvalue %type.slice %.0.3, 0",
            "%.0.5 = getelementptr i32, ptr %.0.4, i64 1",
            "store i32 9, ptr %.0.5",
        ])));
    }

    fn util() -> Module {
        let mut util = ModuleBuilder::new("util");
        util.function(
            "div",
            vec![("a", ty("i32")), ("b", ty("i32"))],
            throwing(ty("i32")),
            |body| {
                let failure = body.block(|failure| {
                    let error = failure.define("e", ty("error"));
                    failure.expression(error);
                    failure.raw_ir(&instructions(&[
                        "%e.code = getelementptr %type.error, ptr %e, i32 0, i32 0",
                        "store i32 1, ptr %e.code",
                    ]));
                    failure.throw(name("e"));
                });
                body.if_then(binary(BinaryOperator::Equals, name("b"), int("0")), failure);
                body.ret(binary(BinaryOperator::Divide, name("a"), name("b")));
            },
        );
        util.finish()
    }

    #[test]
    fn throws_fill_the_error_field_and_unwind() {
        let program = generate(vec![util()], "util", &library());
        let div = definition(&program, "@util.div");

        assert!(div.starts_with("define { %type.error, i32 } @util.div(i32 %a, i32 %b) alwaysinline {\n"));
        assert!(div.contains(&instructions(&[
            "store i32 1, ptr %e.code",
            "%.0.4 = load %type.error, ptr %e",
            "%.0.5 = getelementptr { %type.error, i32 }, ptr %.defer.rv, i32 0, i32 0",
            "store %type.error %.0.4, ptr %.0.5",
            "store i1 true, ptr %.defer.ret",
            "br label %.defer.1.base",
        ])));
        assert!(div.contains(indoc! {"
                  %.0.7 = load i1, ptr %.defer.ret
                  br i1 %.0.7, label %.defer.0.base, label %.0.3
                .0.3:
                  %.0.8 = sdiv i32 %a, %b
                  %.0.9 = insertvalue { %type.error, i32 } zeroinitializer, i32 %.0.8, 1
                  store { %type.error, i32 } %.0.9, ptr %.defer.rv
        "}));
        assert!(div.ends_with(indoc! {"
                .defer.0.base:
                  %.0.11 = load { %type.error, i32 }, ptr %.defer.rv
                  ret { %type.error, i32 } %.0.11
                }
        "}));
    }

    #[test]
    fn destructuring_stores_error_and_value() {
        let mut app = ModuleBuilder::new("app");
        app.import("util", "util");
        app.function("run", vec![], ty("void"), |body| {
            let split = body.destructure(
                ("v", ty("i32")),
                "err",
                call_expression("util.div", vec![int("10"), int("0")]),
            );
            body.expression(split);
        });

        let program = generate(vec![util(), app.finish()], "app", &library());
        let run = definition(&program, "@app.run");

        assert!(run.contains(&instructions(&[
            "%v = alloca i32",
            "%err = alloca %type.error",
        ])));
        assert!(run.contains(&instructions(&[
            "%.1.1 = call { %type.error, i32 } @util.div(i32 10, i32 0)",
            "%.1.2 = extractvalue { %type.error, i32 } %.1.1, 0",
            "store %type.error %.1.2, ptr %err",
            "%.1.3 = extractvalue { %type.error, i32 } %.1.1, 1",
            "store i32 %.1.3, ptr %v",
        ])));
        assert!(!run.contains("store i1 true, ptr %.defer.ret"));

        // A throwing `div` leaves the zeroed payload of its return slot alone
        let div = definition(&program, "@util.div");
        assert!(div.contains(&instructions(&[
            "%.defer.rv = alloca { %type.error, i32 }",
            "store { %type.error, i32 } zeroinitializer, ptr %.defer.rv",
        ])));
        assert_eq!(div.matches("ptr %.defer.rv, i32 0, i32 1").count(), 0);
    }

    #[test]
    fn try_rethrows_through_the_defer_chain() {
        let mut app = ModuleBuilder::new("app");
        app.import("util", "util");
        app.function("safe", vec![], throwing(ty("i32")), |body| {
            let x = body.define_assign("x", ty("i32"), try_call("util.div", vec![int("1"), int("2")]));
            body.expression(x);
            body.ret(name("x"));
        });

        let program = generate(vec![util(), app.finish()], "app", &library());

        let safe = definition(&program, "@app.safe");
        assert_eq!(safe.matches("store %type.error ").count(), 1);
        assert!(safe.contains(indoc! {"
              %.1.1 = call { %type.error, i32 } @util.div(i32 1, i32 2)
              %.1.2 = extractvalue { %type.error, i32 } %.1.1, 0
              %.1.3 = extractvalue %type.error %.1.2, 0
              %.1.4 = icmp ne i32 %.1.3, 0
              br i1 %.1.4, label %.1.5, label %.1.6
            .1.5:
              %.1.7 = getelementptr { %type.error, i32 }, ptr %.defer.rv, i32 0, i32 0
              store %type.error %.1.2, ptr %.1.7
              store i1 true, ptr %.defer.ret
              br label %.defer.0.base
            .1.6:
              %.1.8 = extractvalue { %type.error, i32 } %.1.1, 1
              store i32 %.1.8, ptr %x
        "}));
    }

    #[test]
    fn returning_clears_a_pending_error() {
        let mut app = ModuleBuilder::new("app");
        app.function("recover", vec![], throwing(ty("i32")), |body| {
            let cleanup = body.block(|cleanup| cleanup.ret(int("5")));
            body.defer_block(cleanup);
            let error = body.define("e", ty("error"));
            body.expression(error);
            body.throw(name("e"));
        });
        app.function("finish", vec![], throwing(ty("void")), |body| body.ret_void());

        let program = generate(vec![app.finish()], "app", &library());
        let recover = definition(&program, "@app.recover");

        let thrown = position(
            recover,
            "= getelementptr { %type.error, i32 }, ptr %.defer.rv, i32 0, i32 0\n",
        );
        let cleared = position(
            recover,
            "= insertvalue { %type.error, i32 } zeroinitializer, i32 5, 1\n",
        );
        assert!(thrown < cleared);
        assert!(!recover.contains("ptr %.defer.rv, i32 0, i32 1"));

        assert!(definition(&program, "@app.finish").contains(&instructions(&[
            "store { %type.error } zeroinitializer, ptr %.defer.rv",
            "store i1 true, ptr %.defer.ret",
        ])));
    }

    #[test]
    fn division_is_computed_at_the_promoted_width() {
        let mut ops = ModuleBuilder::new("ops");
        ops.function("ratio", vec![("a", ty("i32")), ("b", ty("i64"))], ty("i32"), |body| {
            body.ret(binary(BinaryOperator::Divide, name("a"), name("b")))
        });
        ops.function("rest", vec![("a", ty("u64")), ("b", ty("u8"))], ty("u64"), |body| {
            body.ret(binary(BinaryOperator::Remainder, name("a"), name("b")))
        });

        let program = generate(vec![ops.finish()], "ops", &library());

        assert!(definition(&program, "@ops.ratio").contains(&instructions(&[
            "%.0.1 = sext i32 %a to i64",
            "%.0.2 = sdiv i64 %.0.1, %b",
            "%.0.3 = trunc i64 %.0.2 to i32",
            "store i32 %.0.3, ptr %.defer.rv",
        ])));
        assert!(definition(&program, "@ops.rest").contains(&instructions(&[
            "%.0.6 = zext i8 %b to i64",
            "%.0.7 = urem i64 %a, %.0.6",
            "store i64 %.0.7, ptr %.defer.rv",
        ])));
    }

    #[test]
    fn locals_named_like_the_entry_block_do_not_clash() {
        let mut app = ModuleBuilder::new("app");
        app.function("start", vec![("entry", ty("i32"))], ty("i32"), |body| {
            let local = body.define_assign("begin", ty("i32"), name("entry"));
            body.expression(local);
            body.ret(name("begin"));
        });
        app.function("other", vec![], ty("i32"), |body| {
            let entry = body.define_assign("entry", ty("i32"), int("1"));
            body.expression(entry);
            body.ret(name("entry"));
        });

        let program = generate(vec![app.finish()], "app", &library());

        let start = definition(&program, "@app.start");
        assert!(start.starts_with("define i32 @app.start(i32 %entry) alwaysinline {\n.entry:\n"));
        assert!(start.contains("  store i32 %entry, ptr %begin\n"));

        let other = definition(&program, "@app.other");
        assert!(other.contains("  %entry = alloca i32\n"));
        assert_eq!(other.matches("\nentry:").count(), 0);
    }

    #[test]
    fn members_and_destructors_take_the_receiver_address() {
        let mut app = ModuleBuilder::new("app");
        let counter = app.structure("Counter", vec![("n", ty("i32"))]);
        app.method(counter, "bump", vec![], ty("void"), |body| {
            body.expression(assign(
                name("this.n"),
                binary(BinaryOperator::Add, name("this.n"), int("1")),
            ));
        });
        app.method(counter, "drop", vec![], ty("void"), |_| {});
        app.destructor(counter, "drop");
        app.function("run", vec![], ty("void"), |body| {
            let c = body.define("c", ty("Counter"));
            body.expression(c);
            body.expression(call("c.bump", vec![]));
        });

        let program = generate(vec![app.finish()], "app", &library());

        let bump = definition(&program, "@app.Counter.bump");
        assert!(bump.starts_with("define void @app.Counter.bump(ptr %this) alwaysinline {\n"));
        assert!(bump.contains("= getelementptr %struct.app.Counter, ptr %this, i32 0, i32 0\n"));

        let run = definition(&program, "@app.run");
        let call_site = position(run, "  call void @app.Counter.bump(ptr %c)\n");
        let destroyed = position(run, "  call void @app.Counter.drop(ptr %c)\n");
        assert!(call_site < destroyed);
        assert!(destroyed > position(run, ".defer.0.0:\n"));
    }

    #[test]
    fn string_literals_become_private_constants() {
        let mut app = ModuleBuilder::new("app");
        app.function("greet", vec![], ty("str"), |body| body.ret(string("hi \"you\"\n")));

        let program = generate(vec![app.finish()], "app", &library());

        assert!(program.contains(
            "@.str.0.1 = private unnamed_addr constant [10 x i8] c\"hi \\22you\\22\\0A\\00\"\n"
        ));
        assert!(definition(&program, "@app.greet")
            .contains("  store %type.str { ptr @.str.0.1, i64 9 }, ptr %.defer.rv\n"));
    }

    #[test]
    fn throwing_main_is_wrapped_with_an_error_report() {
        let mut main = ModuleBuilder::new("main");
        main.function("main", vec![("args", slice(ty("str")))], throwing(ty("void")), |_| {});

        let program = generate(vec![main.finish()], "main", &CodegenOptions::default());

        assert_eq!(
            definition(&program, "@main"),
            indoc! {"
                define i32 @main(i32 %argc, ptr %argv) alwaysinline {
                entry:
                  %arr = alloca %type.str, i32 %argc
                  %args = call %type.slice @magma.argsToSlice(i32 %argc, ptr %argv, ptr %arr)
                  %r = call { %type.error } @main.main(%type.slice %args)
                  %e = extractvalue { %type.error } %r, 0
                  %code = extractvalue %type.error %e, 0
                  %failed = icmp ne i32 %code, 0
                  br i1 %failed, label %uncaught, label %done
                uncaught:
                  %message = extractvalue %type.error %e, 1
                  %text = extractvalue %type.str %message, 0
                  call i32 (ptr, ...) @printf(ptr @.main.fmt.err, i32 %code, ptr %text)
                  ret i32 %code
                done:
                  ret i32 0
                }
            "}
        );
        assert!(program.contains("declare i32 @printf(ptr, ...)\n"));
        assert!(program.contains(
            "@.main.fmt.err = private unnamed_addr constant [25 x i8] c\"Uncaught Error: %d '%s'\\0A\\00\"\n"
        ));
        assert!(position(&program, "define i32 @main(") < position(&program, "define { %type.error } @main.main("));
    }

    #[test]
    fn plain_main_returns_zero() {
        let mut main = ModuleBuilder::new("main");
        main.function("main", vec![], ty("void"), |_| {});

        let options = CodegenOptions {
            always_inline: false,
            ..CodegenOptions::default()
        };
        let program = generate(vec![main.finish()], "main", &options);

        assert_eq!(
            definition(&program, "@main"),
            indoc! {"
                define i32 @main(i32 %argc, ptr %argv) {
                entry:
                  call void @main.main()
                  ret i32 0
                }
            "}
        );
        assert!(!program.contains("@printf"));
    }

    #[test]
    fn entry_module_must_define_main() {
        let mut lib = ModuleBuilder::new("lib");
        lib.function("helper", vec![], ty("void"), |_| {});
        let bundle = checked(vec![lib.finish()], "lib");

        let error = CodeGenerator::generate(&bundle, &CodegenOptions::default()).unwrap_err();
        assert_eq!(
            error.kind,
            CompileErrorKind::Codegen(CodegenErrorKind::MissingEntryPoint {
                module: "lib".to_string()
            })
        );

        let options = CodegenOptions {
            entry_module: Some("nowhere".to_string()),
            ..CodegenOptions::default()
        };
        let error = CodeGenerator::generate(&bundle, &options).unwrap_err();
        assert_eq!(
            error.kind,
            CompileErrorKind::Link(LinkErrorKind::UnknownEntryModule {
                name: "nowhere".to_string()
            })
        );
    }

    fn shapes() -> Vec<Module> {
        (0..6)
            .map(|index| {
                let module_name = format!("m{index}");
                let mut module = ModuleBuilder::new(&module_name);
                module.structure("Point", vec![("x", ty("f64")), ("y", ty("f64"))]);
                module.structure("Tag", vec![("id", ty("u16"))]);
                module.raw_ir("declare void @shared()\n");
                module.function("area", vec![("p", ty("Point"))], ty("f64"), |body| {
                    body.ret(binary(BinaryOperator::Multiply, name("p.x"), name("p.y")))
                });
                module.finish()
            })
            .collect()
    }

    #[test]
    fn output_does_not_depend_on_worker_scheduling() {
        let bundle = checked(shapes(), "m0");
        let first = CodeGenerator::generate(&bundle, &library()).unwrap();

        for _ in 0..8 {
            assert_eq!(CodeGenerator::generate(&bundle, &library()).unwrap(), first);
        }

        assert_eq!(generate(shapes(), "m0", &library()), first.text);

        let layouts = (0..6)
            .flat_map(|index| {
                [
                    format!("%struct.m{index}.Point = type {{ double, double }}"),
                    format!("%struct.m{index}.Tag = type {{ i16 }}"),
                ]
            })
            .join("\n");
        assert!(first.text.contains(&format!("; Struct Layouts\n{layouts}\n\n")));
        assert_eq!(first.text.matches("declare void @shared()").count(), 1);

        let modules = (0..6)
            .map(|index| position(&first.text, &format!("; Module=\"m{index}\"")))
            .collect::<Vec<_>>();
        assert!(modules.is_sorted());
    }
}
