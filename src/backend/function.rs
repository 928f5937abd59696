//! Function bodies
//!
//! Every function gets two hidden slots at its entry: `%.defer.rv` holds the
//! value being returned and `%.defer.ret` records that a return is pending.
//! A `ret` or `throw` fills them and branches into the defer chain of the
//! scope it appears in. The chain runs the deferred actions of that scope
//! newest first and ends in the base label of the scope. For the function
//! scope the base label leaves the function. For a nested scope it tests the
//! pending flag, and either continues into the chain of its parent or falls
//! through to the code following the block.

use hashbrown::HashSet;

use super::{
    builder::ScopeBuilder,
    layout::{ir_throwing_type, ir_type},
    module::ModuleGenerator,
};
use crate::{
    error::{CodegenErrorKind, CompileError, Location, report_error},
    frontend::{
        Span,
        ast::{
            Block, CallExpression, CallTarget, Deferred, Else, Expression, ExpressionKind,
            FunctionDefinition, FunctionId, FunctionRef, IfStatement, Module, NameExpression,
            NameResolution, Statement, StatementKind, TypeNode, UnaryOperator, VariableId,
            VariableKind, annotation,
        },
    },
    middle::ty::Type,
};

pub struct FunctionGenerator<'g, 'a> {
    pub(super) module: &'g mut ModuleGenerator<'a>,
    pub(super) return_type: Type,
    /// The innermost open scope
    current: Frame<'a>,
    parents: Vec<Frame<'a>>,
    /// Parameters that live in a stack slot because their address is taken
    pub(super) spilled: HashSet<VariableId>,
}

struct Frame<'a> {
    id: usize,
    builder: ScopeBuilder,
    actions: Vec<DeferredAction<'a>>,
    /// How many of the actions a return issued at this point has to run
    defer_index: usize,
    exit: Option<ScopeExit>,
}

/// Where the base label of a nested scope continues
struct ScopeExit {
    parent_entry: String,
    continuation: String,
}

#[derive(Debug, Clone, Copy)]
pub(super) enum DeferredAction<'a> {
    Deferred(&'a Deferred),
    Destructor {
        variable: VariableId,
        destructor: FunctionRef,
    },
}

impl Frame<'_> {
    fn new(id: usize, exit: Option<ScopeExit>) -> Self {
        Self {
            id,
            builder: ScopeBuilder::new(),
            actions: Vec::new(),
            defer_index: 0,
            exit,
        }
    }
}

/// The label a return has to branch to when `count` actions of a scope are
/// registered
fn defer_label(scope: usize, count: usize) -> String {
    match count.checked_sub(1) {
        Some(index) => format!(".defer.{scope}.{index}"),
        None => format!(".defer.{scope}.base"),
    }
}

impl<'g, 'a> FunctionGenerator<'g, 'a> {
    #[tracing::instrument(level = "trace", skip(module))]
    pub fn generate(module: &'g mut ModuleGenerator<'a>, id: FunctionId) -> Result<String, CompileError> {
        let source = module.module;
        let definition = &source.functions[id];

        let return_type = resolved(source, &definition.return_type)?;

        let parameters = definition
            .parameters
            .iter()
            .map(|parameter| {
                let variable = &source.variables[*parameter];
                Ok(format!("{} %{}", ir_type(&resolved(source, &variable.ty)?), variable.name))
            })
            .collect::<Result<Vec<_>, CompileError>>()?;

        let header = format!(
            "define {} {}({}){} {{",
            ir_throwing_type(&return_type),
            source.function_symbol(id),
            parameters.join(", "),
            if module.options.always_inline {
                " alwaysinline"
            } else {
                ""
            }
        );

        let mut generator = Self {
            module,
            return_type,
            current: Frame::new(0, None),
            parents: Vec::new(),
            spilled: addressed_parameters(source, &definition.body),
        };

        generator.prologue(definition)?;
        generator.statements(&definition.body)?;
        generator.close_scope()?;

        Ok(format!(
            "{header}\n.entry:\n{}}}\n",
            generator.current.builder.finish()
        ))
    }

    pub(super) fn source(&self) -> &'a Module {
        self.module.module
    }

    pub(super) fn location(&self, span: Span) -> Option<Location> {
        self.source().location(span)
    }

    pub(super) fn unsupported(&self, span: Span, what: &str) -> CompileError {
        report_error!(
            self.location(span),
            CodegenErrorKind::Unsupported {
                what: what.to_string(),
            }
        )
    }

    pub(super) fn fresh(&mut self) -> String {
        self.module.fresh()
    }

    pub(super) fn emit(&mut self, instruction: impl AsRef<str>) {
        self.current.builder.emit(instruction);
    }

    pub(super) fn label(&mut self, name: impl AsRef<str>) {
        self.current.builder.label(name);
    }

    /// Allocations end up in the entry block of the function
    pub(super) fn hoist(&mut self, instruction: impl AsRef<str>) {
        self.current.builder.hoist(instruction);
    }

    /// Loads a value of IR type `ty` and returns its SSA name
    pub(super) fn load(&mut self, ty: &str, pointer: &str) -> String {
        let value = self.fresh();
        self.emit(format!("{value} = load {ty}, ptr {pointer}"));
        value
    }

    fn prologue(&mut self, definition: &'a FunctionDefinition) -> Result<(), CompileError> {
        if !self.return_type.is_plain_void() {
            let ty = ir_throwing_type(&self.return_type);
            self.hoist(format!("%.defer.rv = alloca {ty}"));
            self.hoist(format!("store {ty} zeroinitializer, ptr %.defer.rv"));
        }

        self.hoist("%.defer.ret = alloca i1");
        self.hoist("store i1 false, ptr %.defer.ret");

        let source = self.source();

        for parameter in &definition.parameters {
            if !self.spilled.contains(parameter) {
                continue;
            }

            let variable = &source.variables[*parameter];
            let ty = ir_type(&resolved(source, &variable.ty)?);

            self.hoist(format!("%{}.addr = alloca {ty}", variable.name));
            self.hoist(format!("store {ty} %{0}, ptr %{0}.addr", variable.name));
        }

        Ok(())
    }

    fn statements(&mut self, block: &'a Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.statement(statement)?;
        }

        Ok(())
    }

    fn statement(&mut self, statement: &'a Statement) -> Result<(), CompileError> {
        match &statement.kind {
            StatementKind::Return(value) => {
                self.store_return(value)?;
                self.enter_defer_chain();
                self.unreachable_continuation();
            }
            StatementKind::Throw(error) => {
                let error = self.expression(error)?;
                self.store_error(&error.text, statement.span)?;
                self.enter_defer_chain();
                self.unreachable_continuation();
            }
            StatementKind::If(if_statement) => self.if_statement(if_statement)?,
            StatementKind::While { condition, body } => {
                let check = self.module.fresh_label();
                let looped = self.module.fresh_label();
                let end = self.module.fresh_label();

                self.emit(format!("br label %{check}"));
                self.label(&check);

                let condition = self.expression(condition)?;
                self.emit(format!(
                    "br i1 {}, label %{looped}, label %{end}",
                    condition.text
                ));

                self.label(&looped);
                self.nested_block(body, check)?;
                self.label(&end);
            }
            StatementKind::Expression(expression) => {
                self.expression(expression)?;
            }
            StatementKind::Defer(deferred) => self.defer(DeferredAction::Deferred(deferred)),
            StatementKind::RawIr(text) => self.current.builder.verbatim(text),
        }

        Ok(())
    }

    fn if_statement(&mut self, if_statement: &'a IfStatement) -> Result<(), CompileError> {
        let condition = self.expression(&if_statement.condition)?;

        let then = self.module.fresh_label();
        let end = self.module.fresh_label();
        let otherwise = match if_statement.otherwise {
            Some(_) => self.module.fresh_label(),
            None => end.clone(),
        };

        self.emit(format!(
            "br i1 {}, label %{then}, label %{otherwise}",
            condition.text
        ));

        self.label(&then);
        self.nested_block(&if_statement.body, end.clone())?;

        match &if_statement.otherwise {
            Some(Else::Block(block)) => {
                self.label(&otherwise);
                self.nested_block(block, end.clone())?;
            }
            Some(Else::If(nested)) => {
                self.label(&otherwise);
                self.if_statement(nested)?;
                self.emit(format!("br label %{end}"));
            }
            None => {}
        }

        self.label(&end);

        Ok(())
    }

    /// Registers an action to run when the current scope is left
    pub(super) fn defer(&mut self, action: DeferredAction<'a>) {
        self.current.actions.push(action);
        self.current.defer_index = self.current.actions.len();
    }

    pub(super) fn register_destructor(&mut self, variable: VariableId, ty: &Type) {
        if let Some(destructor) = ty.destructor {
            self.defer(DeferredAction::Destructor {
                variable,
                destructor,
            });
        }
    }

    fn current_entry(&self) -> String {
        defer_label(self.current.id, self.current.defer_index)
    }

    /// Marks a return as pending and runs the defer chain of the current
    /// scope
    pub(super) fn enter_defer_chain(&mut self) {
        let entry = self.current_entry();
        self.emit("store i1 true, ptr %.defer.ret");
        self.emit(format!("br label %{entry}"));
    }

    /// Starts a fresh block for whatever follows an unconditional branch
    fn unreachable_continuation(&mut self) {
        let label = self.module.fresh_label();
        self.label(label);
    }

    fn store_return(&mut self, value: &'a Expression) -> Result<(), CompileError> {
        let composite = ir_throwing_type(&self.return_type);

        if self.return_type.is_void() {
            self.expression(value)?;

            if self.return_type.throws {
                self.emit(format!("store {composite} zeroinitializer, ptr %.defer.rv"));
            }
            return Ok(());
        }

        let ty = self.return_type.unwrapped();
        let value = self.expression_as(value, &ty)?;

        // The whole composite is written so an error thrown earlier is cleared
        if self.return_type.throws {
            let packed = self.fresh();
            self.emit(format!(
                "{packed} = insertvalue {composite} zeroinitializer, {}, 1",
                value.typed()
            ));
            self.emit(format!("store {composite} {packed}, ptr %.defer.rv"));
        } else {
            self.emit(format!("store {}, ptr %.defer.rv", value.typed()));
        }

        Ok(())
    }

    /// Writes an error into the error field of the return slot
    pub(super) fn store_error(&mut self, error: &str, span: Span) -> Result<(), CompileError> {
        if !self.return_type.throws {
            return Err(self.unsupported(span, "throw in a function that cannot throw"));
        }

        let composite = ir_throwing_type(&self.return_type);
        let field = self.fresh();
        self.emit(format!(
            "{field} = getelementptr {composite}, ptr %.defer.rv, i32 0, i32 0"
        ));
        self.emit(format!("store %type.error {error}, ptr {field}"));

        Ok(())
    }

    /// Generates a block in its own scope. Once the block and its defer chain
    /// are done, control continues at `continuation` unless a return is
    /// pending.
    fn nested_block(&mut self, block: &'a Block, continuation: String) -> Result<(), CompileError> {
        let id = self.module.next_scope();
        let exit = ScopeExit {
            parent_entry: self.current_entry(),
            continuation,
        };

        let parent = std::mem::replace(&mut self.current, Frame::new(id, Some(exit)));
        self.parents.push(parent);

        self.statements(block)?;
        self.close_scope()
    }

    /// Falls into the defer chain of the current scope and writes the chain
    /// followed by the base label. Nested scopes are folded into their parent
    /// afterwards.
    fn close_scope(&mut self) -> Result<(), CompileError> {
        let entry = self.current_entry();
        self.emit(format!("br label %{entry}"));

        self.current.builder.begin_tail();
        self.defer_chain()?;

        let id = self.current.id;
        self.label(format!(".defer.{id}.base"));

        match self.current.exit.take() {
            Some(exit) => {
                let pending = self.load("i1", "%.defer.ret");
                self.emit(format!(
                    "br i1 {pending}, label %{}, label %{}",
                    exit.parent_entry, exit.continuation
                ));
            }
            None if self.return_type.is_plain_void() => self.emit("ret void"),
            None => {
                let ty = ir_throwing_type(&self.return_type);
                let value = self.load(&ty, "%.defer.rv");
                self.emit(format!("ret {ty} {value}"));
            }
        }

        if let Some(parent) = self.parents.pop() {
            let nested = std::mem::replace(&mut self.current, parent);
            self.current.builder.absorb(nested.builder);
        }

        Ok(())
    }

    /// One labeled block per deferred action, newest first. Each block runs
    /// its action and continues with the next older one.
    fn defer_chain(&mut self) -> Result<(), CompileError> {
        let actions = std::mem::take(&mut self.current.actions);
        let id = self.current.id;

        for (index, action) in actions.into_iter().enumerate().rev() {
            self.current.defer_index = index;
            self.label(format!(".defer.{id}.{index}"));

            let next = defer_label(id, index);

            match action {
                DeferredAction::Deferred(Deferred::Expression(expression)) => {
                    self.expression(expression)?;
                    self.emit(format!("br label %{next}"));
                }
                DeferredAction::Deferred(Deferred::Block(block)) => {
                    self.nested_block(block, next)?;
                }
                DeferredAction::Destructor {
                    variable,
                    destructor,
                } => {
                    self.destructor_call(variable, destructor, Span::DUMMY)?;
                    self.emit(format!("br label %{next}"));
                }
            }
        }

        self.current.defer_index = 0;

        Ok(())
    }
}

pub(super) fn resolved(module: &Module, node: &TypeNode) -> Result<Type, CompileError> {
    annotation(&node.resolved, "resolved type")
        .cloned()
        .map_err(|kind| report_error!(module.location(node.span), kind))
}

/// Parameters whose address is needed: assigned to, passed to `&`, used as a
/// by-value receiver or destroyed explicitly
fn addressed_parameters(module: &Module, body: &Block) -> HashSet<VariableId> {
    let mut collector = AddressedParameters {
        module,
        found: HashSet::new(),
    };
    collector.block(body);
    collector.found
}

struct AddressedParameters<'m> {
    module: &'m Module,
    found: HashSet<VariableId>,
}

impl AddressedParameters<'_> {
    fn block(&mut self, block: &Block) {
        for statement in &block.statements {
            match &statement.kind {
                StatementKind::Return(expression)
                | StatementKind::Throw(expression)
                | StatementKind::Expression(expression)
                | StatementKind::Defer(Deferred::Expression(expression)) => self.expression(expression),
                StatementKind::If(if_statement) => self.if_statement(if_statement),
                StatementKind::While { condition, body } => {
                    self.expression(condition);
                    self.block(body);
                }
                StatementKind::Defer(Deferred::Block(body)) => self.block(body),
                StatementKind::RawIr(_) => {}
            }
        }
    }

    fn if_statement(&mut self, if_statement: &IfStatement) {
        self.expression(&if_statement.condition);
        self.block(&if_statement.body);

        match &if_statement.otherwise {
            Some(Else::Block(block)) => self.block(block),
            Some(Else::If(nested)) => self.if_statement(nested),
            None => {}
        }
    }

    /// The parameter a place is rooted at, unless the place is reached
    /// through the pointer the parameter holds
    fn base_parameter(name: &NameExpression) -> Option<VariableId> {
        match name.resolution.get()? {
            NameResolution::Variable {
                variable,
                is_local_slot: false,
                accesses,
                ..
            } if accesses.first().is_none_or(|access| !access.pointer_deref) => {
                Some(variable.variable)
            }
            _ => None,
        }
    }

    fn place(&mut self, expression: &Expression) {
        if let ExpressionKind::Name(name) = &expression.kind {
            self.found.extend(Self::base_parameter(name));
        }
    }

    fn call(&mut self, call: &CallExpression) {
        if let Some(CallTarget::Member {
            owner_is_pointer: false,
            ..
        }) = call.target.get()
        {
            self.found.extend(Self::base_parameter(&call.callee));
        }

        for argument in &call.arguments {
            self.expression(argument);
        }
    }

    fn expression(&mut self, expression: &Expression) {
        match &expression.kind {
            ExpressionKind::Assign { lhs, rhs } => {
                self.place(lhs);
                self.expression(lhs);
                self.expression(rhs);
            }
            ExpressionKind::Unary {
                operator: UnaryOperator::AddressOf,
                operand,
            } => {
                self.place(operand);
                self.expression(operand);
            }
            ExpressionKind::Unary { operand, .. } => self.expression(operand),
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.expression(lhs);
                self.expression(rhs);
            }
            ExpressionKind::Call(call)
            | ExpressionKind::Try(call)
            | ExpressionKind::DestructureAssign { call, .. } => self.call(call),
            ExpressionKind::Subscript { index, .. } => self.expression(index),
            ExpressionKind::VariableDefinitionAssign { value, .. } => self.expression(value),
            ExpressionKind::DestructorCall(variable) => {
                if self.module.variables[*variable].kind == VariableKind::Parameter {
                    self.found.insert(*variable);
                }
            }
            ExpressionKind::Void
            | ExpressionKind::Literal(_)
            | ExpressionKind::Name(_)
            | ExpressionKind::VariableDefinition(_)
            | ExpressionKind::SizeOf(_) => {}
        }
    }
}
