use std::sync::{Arc, Weak};

use hashbrown::{HashMap, hash_map::Entry};

use crate::{
    error::{CompileError, LinkErrorKind, report_error},
    frontend::{
        Span,
        ast::{
            Block, Deferred, Else, Expression, ExpressionKind, FunctionId, IfStatement, Item,
            Module, StatementKind, StructId, VariableId,
        },
        intern::InternedSymbol,
    },
};

/// A lexical scope. The root scope of a module holds its globals, functions
/// and structs, and owns one child scope per function.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    parent: Weak<Scope>,
    pub variables: HashMap<InternedSymbol, VariableId>,
    /// Member functions are bound as `Struct.method`
    pub functions: HashMap<InternedSymbol, FunctionId>,
    pub structs: HashMap<InternedSymbol, StructId>,
    children: HashMap<FunctionId, Arc<Scope>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function(FunctionId),
}

/// Bindings collected for a scope before it is linked into the tree
#[derive(Default)]
struct Bindings {
    variables: HashMap<InternedSymbol, VariableId>,
    functions: HashMap<InternedSymbol, FunctionId>,
    structs: HashMap<InternedSymbol, StructId>,
}

impl Scope {
    /// Collects the scope tree of a module. Parameters and locals of a
    /// function all share one scope, wherever in the body they are declared.
    pub fn build(module: &Module) -> Result<Arc<Scope>, CompileError> {
        let mut global = Bindings::default();

        for item in &module.items {
            match item {
                Item::Function(id) => {
                    let key = module.function_key(*id);
                    insert_unique(module, &mut global.functions, key, *id, module.functions[*id].span)?;
                }
                Item::Struct(id) => {
                    let definition = &module.structs[*id];
                    insert_unique(module, &mut global.structs, definition.name, *id, definition.span)?;
                }
                Item::Global(id) => {
                    let definition = &module.variables[*id];
                    insert_unique(module, &mut global.variables, definition.name, *id, definition.span)?;
                }
                Item::RawIr(_) => {}
            }
        }

        let mut locals = Vec::new();

        for (id, function) in module.functions.enumerate() {
            let mut variables = HashMap::new();

            for parameter in &function.parameters {
                let definition = &module.variables[*parameter];
                insert_unique(module, &mut variables, definition.name, *parameter, definition.span)?;
            }

            let mut collector = LocalCollector {
                module,
                variables: &mut variables,
            };
            collector.block(&function.body)?;

            locals.push((id, variables));
        }

        Ok(Arc::new_cyclic(|this: &Weak<Scope>| {
            let children = locals
                .into_iter()
                .map(|(id, variables)| {
                    let child = Scope {
                        kind: ScopeKind::Function(id),
                        parent: this.clone(),
                        variables,
                        functions: HashMap::new(),
                        structs: HashMap::new(),
                        children: HashMap::new(),
                    };

                    (id, Arc::new(child))
                })
                .collect();

            Scope {
                kind: ScopeKind::Global,
                parent: Weak::new(),
                variables: global.variables,
                functions: global.functions,
                structs: global.structs,
                children,
            }
        }))
    }

    pub fn parent(&self) -> Option<Arc<Scope>> {
        self.parent.upgrade()
    }

    /// The scope of a function, when called on a global scope
    pub fn function_scope(&self, function: FunctionId) -> Option<&Arc<Scope>> {
        self.children.get(&function)
    }

    /// Looks a variable up in this scope and then in its parents
    pub fn lookup_variable(&self, name: InternedSymbol) -> Option<VariableId> {
        if let Some(variable) = self.variables.get(&name) {
            return Some(*variable);
        }

        self.parent()?.lookup_variable(name)
    }

    pub fn lookup_function(&self, name: InternedSymbol) -> Option<FunctionId> {
        if let Some(function) = self.functions.get(&name) {
            return Some(*function);
        }

        self.parent()?.lookup_function(name)
    }

    pub fn lookup_struct(&self, name: InternedSymbol) -> Option<StructId> {
        if let Some(strukt) = self.structs.get(&name) {
            return Some(*strukt);
        }

        self.parent()?.lookup_struct(name)
    }
}

fn insert_unique<T>(
    module: &Module,
    map: &mut HashMap<InternedSymbol, T>,
    name: InternedSymbol,
    value: T,
    span: Span,
) -> Result<(), CompileError> {
    match map.entry(name) {
        Entry::Occupied(_) => Err(report_error!(
            module.location(span),
            LinkErrorKind::DuplicateBinding {
                name: name.to_string(),
            }
        )),
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
    }
}

/// Walks a function body, binding every local it declares
struct LocalCollector<'a> {
    module: &'a Module,
    variables: &'a mut HashMap<InternedSymbol, VariableId>,
}

impl LocalCollector<'_> {
    fn block(&mut self, block: &Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            match &statement.kind {
                StatementKind::Return(expression)
                | StatementKind::Throw(expression)
                | StatementKind::Expression(expression)
                | StatementKind::Defer(Deferred::Expression(expression)) => {
                    self.expression(expression)?
                }
                StatementKind::If(if_statement) => self.if_statement(if_statement)?,
                StatementKind::While { condition, body } => {
                    self.expression(condition)?;
                    self.block(body)?;
                }
                StatementKind::Defer(Deferred::Block(body)) => self.block(body)?,
                StatementKind::RawIr(_) => {}
            }
        }

        Ok(())
    }

    fn if_statement(&mut self, if_statement: &IfStatement) -> Result<(), CompileError> {
        self.expression(&if_statement.condition)?;
        self.block(&if_statement.body)?;

        match &if_statement.otherwise {
            Some(Else::Block(block)) => self.block(block),
            Some(Else::If(nested)) => self.if_statement(nested),
            None => Ok(()),
        }
    }

    fn bind(&mut self, variable: VariableId) -> Result<(), CompileError> {
        let definition = &self.module.variables[variable];
        insert_unique(self.module, self.variables, definition.name, variable, definition.span)
    }

    fn expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match &expression.kind {
            ExpressionKind::VariableDefinition(variable) => self.bind(*variable),
            ExpressionKind::VariableDefinitionAssign { variable, value } => {
                self.expression(value)?;
                self.bind(*variable)
            }
            ExpressionKind::DestructureAssign { value, error, call } => {
                for argument in &call.arguments {
                    self.expression(argument)?;
                }
                self.bind(*value)?;
                self.bind(*error)
            }
            ExpressionKind::Call(call) | ExpressionKind::Try(call) => {
                for argument in &call.arguments {
                    self.expression(argument)?;
                }
                Ok(())
            }
            ExpressionKind::Subscript { index, .. } => self.expression(index),
            ExpressionKind::Binary { lhs, rhs, .. } | ExpressionKind::Assign { lhs, rhs } => {
                self.expression(lhs)?;
                self.expression(rhs)
            }
            ExpressionKind::Unary { operand, .. } => self.expression(operand),
            ExpressionKind::Void
            | ExpressionKind::Literal(_)
            | ExpressionKind::Name(_)
            | ExpressionKind::SizeOf(_)
            | ExpressionKind::DestructorCall(_) => Ok(()),
        }
    }
}
