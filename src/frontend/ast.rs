//! The syntax tree handed over by the parser, plus the annotation slots the
//! later passes fill in
//!
//! Nodes are never restructured after construction. The resolver and the type
//! checker only write into [`OnceCell`] slots, which the code generator reads.

use std::{collections::BTreeMap, sync::Arc};

use hashbrown::HashMap;
use once_cell::sync::OnceCell;

use super::{SourceFile, Span, intern::InternedSymbol};
use crate::{
    error::{CodegenErrorKind, CompileError, LinkErrorKind, Location, report_error},
    index::{IndexVec, simple_index},
    middle::{scope::Scope, ty::Type},
};

simple_index! {
    /// Position of a module in its bundle, which is also its generation index
    pub struct ModuleId;
}

simple_index! {
    pub struct FunctionId;
}

simple_index! {
    pub struct StructId;
}

simple_index! {
    pub struct VariableId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionRef {
    pub module: ModuleId,
    pub function: FunctionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructRef {
    pub module: ModuleId,
    pub strukt: StructId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableRef {
    pub module: ModuleId,
    pub variable: VariableId,
}

/// All modules of one compilation, along with their scope trees. Read-only
/// once built.
#[derive(Debug)]
pub struct ModuleBundle {
    modules: IndexVec<ModuleId, Module>,
    scopes: IndexVec<ModuleId, Arc<Scope>>,
    by_name: HashMap<InternedSymbol, ModuleId>,
    entry: ModuleId,
}

impl ModuleBundle {
    /// Builds the bundle in submission order and collects the scope tree of
    /// every module
    pub fn new(modules: Vec<Module>, entry: &str) -> Result<Self, CompileError> {
        let modules = IndexVec::<ModuleId, Module>::from_raw(modules);
        let mut by_name = HashMap::new();

        for (id, module) in modules.enumerate() {
            if by_name.insert(module.name, id).is_some() {
                return Err(report_error!(
                    module.location(Span::DUMMY),
                    LinkErrorKind::DuplicateModule {
                        name: module.name.to_string(),
                    }
                ));
            }
        }

        let Some(entry) = by_name.get(&InternedSymbol::new(entry)).copied() else {
            return Err(report_error!(
                None,
                LinkErrorKind::UnknownEntryModule {
                    name: entry.to_string(),
                }
            ));
        };

        let mut scopes = IndexVec::new();
        for module in modules.iter() {
            scopes.push(Scope::build(module)?);
        }

        Ok(Self {
            modules,
            scopes,
            by_name,
            entry,
        })
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.enumerate()
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }

    pub fn module_by_name(&self, name: InternedSymbol) -> Option<ModuleId> {
        self.by_name.get(&name).copied()
    }

    pub fn scope(&self, id: ModuleId) -> &Arc<Scope> {
        &self.scopes[id]
    }

    pub fn entry(&self) -> ModuleId {
        self.entry
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn function(&self, function: FunctionRef) -> &FunctionDefinition {
        &self.modules[function.module].functions[function.function]
    }

    pub fn strukt(&self, strukt: StructRef) -> &StructDefinition {
        &self.modules[strukt.module].structs[strukt.strukt]
    }

    pub fn variable(&self, variable: VariableRef) -> &VariableDefinition {
        &self.modules[variable.module].variables[variable.variable]
    }
}

/// One source file
#[derive(Debug)]
pub struct Module {
    pub name: InternedSymbol,
    pub source_file: Arc<SourceFile>,
    /// alias -> imported module
    pub imports: BTreeMap<InternedSymbol, Import>,
    /// Top level items in declaration order
    pub items: Vec<Item>,
    pub functions: IndexVec<FunctionId, FunctionDefinition>,
    pub structs: IndexVec<StructId, StructDefinition>,
    /// Every variable of the module: globals, parameters and locals
    pub variables: IndexVec<VariableId, VariableDefinition>,
}

impl Module {
    pub fn location(&self, span: Span) -> Option<Location> {
        Some(Location::new(&self.source_file, span))
    }

    /// The name a function is bound to in the global scope, `Struct.method`
    /// for member functions
    pub fn function_key(&self, id: FunctionId) -> InternedSymbol {
        let function = &self.functions[id];

        match function.owner {
            Some(owner) => {
                InternedSymbol::new(&format!("{}.{}", self.structs[owner].name, function.name))
            }
            None => function.name,
        }
    }

    /// The IR symbol of a function, e.g. `@util.Pair.sum`
    pub fn function_symbol(&self, id: FunctionId) -> String {
        format!("@{}.{}", self.name, self.function_key(id))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Import {
    pub module: InternedSymbol,
    pub span: Span,
}

#[derive(Debug)]
pub enum Item {
    Function(FunctionId),
    Struct(StructId),
    Global(VariableId),
    /// IR text copied into the output, either a `declare` or a global
    RawIr(RawIr),
}

#[derive(Debug)]
pub struct RawIr {
    pub text: String,
    pub span: Span,
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub name: InternedSymbol,
    /// Set for member functions, whose first parameter is the implicit `this`
    pub owner: Option<StructId>,
    pub parameters: Vec<VariableId>,
    pub return_type: TypeNode,
    pub body: Block,
    pub span: Span,
}

impl FunctionDefinition {
    /// Parameters written at the call site, which excludes `this`
    pub fn explicit_parameters(&self) -> &[VariableId] {
        match self.owner {
            Some(_) => self.parameters.get(1..).unwrap_or_default(),
            None => &self.parameters,
        }
    }
}

#[derive(Debug)]
pub struct StructDefinition {
    pub name: InternedSymbol,
    /// In declaration order, which is also layout order
    pub fields: Vec<Field>,
    pub field_indices: HashMap<InternedSymbol, usize>,
    pub methods: BTreeMap<InternedSymbol, FunctionId>,
    /// Name of the member function run when a local of this type goes out of
    /// scope
    pub destructor: Option<InternedSymbol>,
    pub span: Span,
}

impl StructDefinition {
    pub fn field(&self, name: InternedSymbol) -> Option<(usize, &Field)> {
        let index = *self.field_indices.get(&name)?;
        Some((index, self.fields.get(index)?))
    }
}

#[derive(Debug)]
pub struct Field {
    pub name: InternedSymbol,
    pub ty: TypeNode,
    pub span: Span,
}

#[derive(Debug)]
pub struct VariableDefinition {
    pub name: InternedSymbol,
    pub ty: TypeNode,
    pub kind: VariableKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Parameter,
    Local,
    Global,
}

/// A type as written in the source
#[derive(Debug)]
pub struct TypeNode {
    pub kind: TypeNodeKind,
    /// `!T`
    pub throws: bool,
    pub span: Span,
    pub resolved: OnceCell<Type>,
}

#[derive(Debug)]
pub enum TypeNodeKind {
    /// `i32`, `Pair` or `util.Pair`
    Named(Vec<InternedSymbol>),
    Pointer(Box<TypeNode>),
    Rfc(Box<TypeNode>),
    Slice {
        element: Box<TypeNode>,
        size: Option<usize>,
    },
    Function {
        parameters: Vec<TypeNode>,
        return_type: Box<TypeNode>,
    },
}

#[derive(Debug)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum StatementKind {
    /// `ret` returns [`ExpressionKind::Void`]
    Return(Expression),
    Throw(Expression),
    If(IfStatement),
    While { condition: Expression, body: Block },
    Expression(Expression),
    Defer(Deferred),
    RawIr(String),
}

#[derive(Debug)]
pub struct IfStatement {
    pub condition: Expression,
    pub body: Block,
    pub otherwise: Option<Else>,
}

#[derive(Debug)]
pub enum Else {
    Block(Block),
    If(Box<IfStatement>),
}

#[derive(Debug)]
pub enum Deferred {
    Expression(Expression),
    Block(Block),
}

#[derive(Debug)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
    /// Inferred by the type checker
    pub ty: OnceCell<Type>,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: OnceCell::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Integer and float literals adopt whatever type they are used as
    pub fn is_numeric_literal(&self) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Literal(Literal::Integer(_) | Literal::Float(_))
        )
    }
}

#[derive(Debug)]
pub enum ExpressionKind {
    Void,
    Literal(Literal),
    Name(NameExpression),
    Call(CallExpression),
    Subscript {
        target: NameExpression,
        index: Box<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    VariableDefinition(VariableId),
    VariableDefinitionAssign {
        variable: VariableId,
        value: Box<Expression>,
    },
    Assign {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Try(CallExpression),
    /// `value, error = call()`
    DestructureAssign {
        value: VariableId,
        error: VariableId,
        call: CallExpression,
    },
    SizeOf(TypeNode),
    DestructorCall(VariableId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Kept as written so it can be printed verbatim
    Integer(String),
    Float(String),
    String(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equals
                | BinaryOperator::NotEquals
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqualTo
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqualTo
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOperator::BitwiseAnd | BinaryOperator::BitwiseOr | BinaryOperator::BitwiseXor
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `~x`
    BitwiseNot,
    /// `&x`
    AddressOf,
}

/// A possibly dotted name, `x`, `p.first.x`, `util.div` or `Pair.sum`
#[derive(Debug)]
pub struct NameExpression {
    pub segments: Vec<InternedSymbol>,
    pub span: Span,
    pub resolution: OnceCell<NameResolution>,
}

impl NameExpression {
    pub fn new(segments: Vec<InternedSymbol>, span: Span) -> Self {
        Self {
            segments,
            span,
            resolution: OnceCell::new(),
        }
    }

    pub fn path(&self) -> String {
        itertools::join(self.segments.iter(), ".")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameResolution {
    Variable {
        variable: VariableRef,
        /// The variable lives in memory (a local slot or a global) and has to be
        /// loaded, rather than being an SSA parameter
        is_local_slot: bool,
        accesses: Vec<MemberAccess>,
        /// A member function terminating the chain
        method: Option<MethodAccess>,
    },
    Function(FunctionRef),
    Struct(StructRef),
}

/// One field hop of a member access chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAccess {
    pub field: InternedSymbol,
    pub field_index: usize,
    /// The struct holding the field
    pub container: Type,
    /// Type of the field itself
    pub ty: Type,
    /// The value before this hop is a pointer to the container
    pub pointer_deref: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodAccess {
    pub function: FunctionRef,
    /// The owner is reached through a pointer rather than by value
    pub owner_is_pointer: bool,
}

#[derive(Debug)]
pub struct CallExpression {
    pub callee: NameExpression,
    pub arguments: Vec<Expression>,
    pub span: Span,
    pub target: OnceCell<CallTarget>,
}

impl CallExpression {
    pub fn new(callee: NameExpression, arguments: Vec<Expression>, span: Span) -> Self {
        Self {
            callee,
            arguments,
            span,
            target: OnceCell::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// A plain function, possibly from another module
    Direct(FunctionRef),
    /// A member function whose receiver is the callee's variable and member
    /// chain
    Member {
        function: FunctionRef,
        owner_is_pointer: bool,
    },
    /// A variable holding a function pointer
    FunctionPointer,
}

/// Writes an annotation. Slots are write-once with one relaxation: writing
/// the value a slot already holds succeeds, so passes can be re-run over the
/// same tree. Any other overwrite is a [`CodegenErrorKind::AnnotationConflict`].
pub fn annotate<T: PartialEq>(
    cell: &OnceCell<T>,
    value: T,
    what: &'static str,
) -> Result<(), CodegenErrorKind> {
    match cell.try_insert(value) {
        Ok(_) => Ok(()),
        Err((existing, value)) if *existing == value => Ok(()),
        Err(_) => Err(CodegenErrorKind::AnnotationConflict { what }),
    }
}

/// Reads an annotation written by an earlier pass
pub fn annotation<'a, T>(cell: &'a OnceCell<T>, what: &'static str) -> Result<&'a T, CodegenErrorKind> {
    cell.get()
        .ok_or(CodegenErrorKind::MissingAnnotation { what })
}
