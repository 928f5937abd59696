use tracing::{debug, trace};

use super::{
    CodegenOptions, Sinks, entry,
    function::FunctionGenerator,
    layout::{ir_type, string_constant, struct_layout},
};
use crate::{
    error::{CodegenErrorKind, CompileError, report_error},
    frontend::{
        Span,
        ast::{FunctionId, Item, Module, ModuleBundle, ModuleId, StructRef, annotation},
    },
    index::Index,
};

/// Generates the IR fragment of one module. Runs on its own worker and only
/// touches shared state through the [`Sinks`].
pub struct ModuleGenerator<'a> {
    pub bundle: &'a ModuleBundle,
    pub module_id: ModuleId,
    pub module: &'a Module,
    pub options: &'a CodegenOptions,
    pub sinks: &'a Sinks,
    is_entry: bool,
    counter: usize,
    nested_scopes: usize,
    globals: String,
    code: String,
}

impl<'a> ModuleGenerator<'a> {
    pub fn new(
        bundle: &'a ModuleBundle,
        module_id: ModuleId,
        entry: ModuleId,
        options: &'a CodegenOptions,
        sinks: &'a Sinks,
    ) -> Self {
        Self {
            bundle,
            module_id,
            module: bundle.module(module_id),
            options,
            sinks,
            is_entry: module_id == entry,
            counter: 0,
            nested_scopes: 0,
            globals: String::new(),
            code: String::new(),
        }
    }

    /// A fresh SSA name, unique across the whole program
    pub fn fresh(&mut self) -> String {
        self.counter += 1;
        format!("%.{}.{}", self.module_id.index(), self.counter)
    }

    /// A fresh label name, used as `%name` in branches
    pub fn fresh_label(&mut self) -> String {
        self.counter += 1;
        format!(".{}.{}", self.module_id.index(), self.counter)
    }

    /// Numbers nested block scopes. The function scope itself is scope `0`.
    pub fn next_scope(&mut self) -> usize {
        self.nested_scopes += 1;
        self.nested_scopes
    }

    pub fn global(&mut self, line: impl AsRef<str>) {
        self.globals.push_str(line.as_ref());
        self.globals.push('\n');
    }

    /// Emits a string constant and returns its symbol
    pub fn string_constant(&mut self, text: &str) -> String {
        self.counter += 1;
        let symbol = format!("@.str.{}.{}", self.module_id.index(), self.counter);
        self.global(string_constant(&symbol, text));
        symbol
    }

    #[tracing::instrument(level = "debug", skip_all, fields(module = %self.module.name))]
    pub fn generate(mut self) -> Result<String, CompileError> {
        self.deposit_layouts()?;

        let module = self.module;
        let mut has_main = false;

        for item in &module.items {
            match item {
                Item::Function(id) => {
                    if self.is_entry_point(*id) {
                        has_main = true;

                        if self.options.emit_main_wrapper {
                            let wrapper = entry::main_wrapper(&mut self, *id)?;
                            self.code.push_str(&wrapper);
                            self.code.push('\n');
                        }
                    }

                    let function = FunctionGenerator::generate(&mut self, *id)?;
                    self.code.push_str(&function);
                    self.code.push('\n');
                }
                Item::Global(id) => {
                    let definition = &module.variables[*id];
                    let ty = annotation(&definition.ty.resolved, "global type")
                        .map_err(|kind| report_error!(module.location(definition.span), kind))?;

                    let line = format!(
                        "@{}.{} = global {} zeroinitializer",
                        module.name,
                        definition.name,
                        ir_type(ty)
                    );
                    self.global(line);
                }
                Item::RawIr(raw) => self.splice_global(&raw.text),
                Item::Struct(_) => {}
            }
        }

        if self.is_entry && self.options.emit_main_wrapper && !has_main {
            return Err(report_error!(
                self.module.location(Span::DUMMY),
                CodegenErrorKind::MissingEntryPoint {
                    module: self.module.name.to_string(),
                }
            ));
        }

        let fragment = format!(
            "; File=\"{}\"\n; Module=\"{}\"\n\n; Global Defs\n{}\n; Code\n{}",
            self.module.source_file.origin, self.module.name, self.globals, self.code
        );

        debug!(bytes = fragment.len(), "module fragment generated");

        Ok(fragment)
    }

    /// The user `main` of the entry module
    fn is_entry_point(&self, id: FunctionId) -> bool {
        let function = &self.module.functions[id];
        self.is_entry && function.owner.is_none() && function.name.value() == "main"
    }

    fn deposit_layouts(&mut self) -> Result<(), CompileError> {
        let layouts = self
            .module
            .structs
            .enumerate()
            .map(|(strukt, definition)| {
                let reference = StructRef {
                    module: self.module_id,
                    strukt,
                };

                struct_layout(self.bundle, reference)
                    .map_err(|kind| report_error!(self.module.location(definition.span), kind))
            })
            .collect::<Result<Vec<_>, _>>()?;

        trace!(count = layouts.len(), "depositing struct layouts");
        self.sinks.layouts.lock().insert(self.module_id, layouts);

        Ok(())
    }

    /// Routes `declare` lines of a global splice into the shared declaration
    /// set, everything else stays in this module
    fn splice_global(&mut self, text: &str) {
        for line in text.lines() {
            let trimmed = line.trim();

            if trimmed.starts_with("declare ") {
                self.sinks.declarations.lock().insert(trimmed.to_string());
            } else if !trimmed.is_empty() {
                self.global(line);
            }
        }
    }
}
