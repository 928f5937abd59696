//! Construction API for modules. The parser builds its output through these
//! helpers, and so do the tests.

use std::{collections::BTreeMap, sync::Arc};

use hashbrown::HashMap;
use once_cell::sync::OnceCell;

use super::{SourceFile, Span, ast::*, intern::InternedSymbol};
use crate::index::IndexVec;

pub struct ModuleBuilder {
    module: Module,
    span: Span,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            module: Module {
                name: InternedSymbol::new(name),
                source_file: Arc::new(SourceFile::memory("")),
                imports: BTreeMap::new(),
                items: Vec::new(),
                functions: IndexVec::new(),
                structs: IndexVec::new(),
                variables: IndexVec::new(),
            },
            span: Span::DUMMY,
        }
    }

    pub fn source(mut self, source_file: SourceFile) -> Self {
        self.module.source_file = Arc::new(source_file);
        self
    }

    /// Sets the span of the declarations created next
    pub fn at(&mut self, span: Span) -> &mut Self {
        self.span = span;
        self
    }

    pub fn import(&mut self, alias: &str, module: &str) -> &mut Self {
        self.module.imports.insert(
            InternedSymbol::new(alias),
            Import {
                module: InternedSymbol::new(module),
                span: self.span,
            },
        );
        self
    }

    pub fn structure(&mut self, name: &str, fields: Vec<(&str, TypeNode)>) -> StructId {
        let fields = fields
            .into_iter()
            .map(|(name, ty)| Field {
                name: InternedSymbol::new(name),
                ty,
                span: self.span,
            })
            .collect::<Vec<_>>();

        let field_indices = fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.name, index))
            .collect::<HashMap<_, _>>();

        let id = self.module.structs.push(StructDefinition {
            name: InternedSymbol::new(name),
            fields,
            field_indices,
            methods: BTreeMap::new(),
            destructor: None,
            span: self.span,
        });

        self.module.items.push(Item::Struct(id));

        id
    }

    /// Names one of the member functions of `owner` as its destructor
    pub fn destructor(&mut self, owner: StructId, method: &str) {
        self.module.structs[owner].destructor = Some(InternedSymbol::new(method));
    }

    pub fn function(
        &mut self,
        name: &str,
        parameters: Vec<(&str, TypeNode)>,
        return_type: TypeNode,
        body: impl FnOnce(&mut BodyBuilder),
    ) -> FunctionId {
        self.define_function(name, None, parameters, return_type, body)
    }

    /// Defines a member function. The implicit `this` pointer is inserted as
    /// the first parameter.
    pub fn method(
        &mut self,
        owner: StructId,
        name: &str,
        parameters: Vec<(&str, TypeNode)>,
        return_type: TypeNode,
        body: impl FnOnce(&mut BodyBuilder),
    ) -> FunctionId {
        let owner_name = self.module.structs[owner].name;
        let this = pointer(ty(owner_name.value()));

        let parameters = std::iter::once(("this", this))
            .chain(parameters)
            .collect::<Vec<_>>();

        let id = self.define_function(name, Some(owner), parameters, return_type, body);

        self.module.structs[owner]
            .methods
            .insert(InternedSymbol::new(name), id);

        id
    }

    fn define_function(
        &mut self,
        name: &str,
        owner: Option<StructId>,
        parameters: Vec<(&str, TypeNode)>,
        return_type: TypeNode,
        body: impl FnOnce(&mut BodyBuilder),
    ) -> FunctionId {
        let span = self.span;

        let parameters = parameters
            .into_iter()
            .map(|(name, ty)| {
                self.module.variables.push(VariableDefinition {
                    name: InternedSymbol::new(name),
                    ty,
                    kind: VariableKind::Parameter,
                    span,
                })
            })
            .collect();

        let mut builder = BodyBuilder::new(&mut self.module, span);
        body(&mut builder);
        let body = builder.finish();

        let id = self.module.functions.push(FunctionDefinition {
            name: InternedSymbol::new(name),
            owner,
            parameters,
            return_type,
            body,
            span,
        });

        self.module.items.push(Item::Function(id));

        id
    }

    pub fn global(&mut self, name: &str, ty: TypeNode) -> VariableId {
        let id = self.module.variables.push(VariableDefinition {
            name: InternedSymbol::new(name),
            ty,
            kind: VariableKind::Global,
            span: self.span,
        });

        self.module.items.push(Item::Global(id));

        id
    }

    pub fn raw_ir(&mut self, text: &str) {
        self.module.items.push(Item::RawIr(RawIr {
            text: text.to_string(),
            span: self.span,
        }));
    }

    pub fn finish(self) -> Module {
        self.module
    }
}

/// Collects the statements of one block
pub struct BodyBuilder<'m> {
    module: &'m mut Module,
    statements: Vec<Statement>,
    start: Span,
    span: Span,
}

impl<'m> BodyBuilder<'m> {
    fn new(module: &'m mut Module, span: Span) -> Self {
        Self {
            module,
            statements: Vec::new(),
            start: span,
            span,
        }
    }

    /// Sets the span of the statements and locals created next
    pub fn at(&mut self, span: Span) -> &mut Self {
        self.span = span;
        self
    }

    pub fn variable(&mut self, name: &str, ty: TypeNode) -> VariableId {
        self.module.variables.push(VariableDefinition {
            name: InternedSymbol::new(name),
            ty,
            kind: VariableKind::Local,
            span: self.span,
        })
    }

    /// `name T`
    pub fn define(&mut self, name: &str, ty: TypeNode) -> Expression {
        let variable = self.variable(name, ty);
        Expression::new(ExpressionKind::VariableDefinition(variable), self.span)
    }

    /// `name T = value`
    pub fn define_assign(&mut self, name: &str, ty: TypeNode, value: Expression) -> Expression {
        let variable = self.variable(name, ty);
        Expression::new(
            ExpressionKind::VariableDefinitionAssign {
                variable,
                value: Box::new(value),
            },
            self.span,
        )
    }

    /// `value T, error error = call()`
    pub fn destructure(
        &mut self,
        value: (&str, TypeNode),
        error: &str,
        call: CallExpression,
    ) -> Expression {
        let value = self.variable(value.0, value.1);
        let error = self.variable(error, ty("error"));

        Expression::new(
            ExpressionKind::DestructureAssign { value, error, call },
            self.span,
        )
    }

    pub fn block(&mut self, build: impl FnOnce(&mut BodyBuilder)) -> Block {
        let mut builder = BodyBuilder::new(self.module, self.span);
        build(&mut builder);
        builder.finish()
    }

    fn push(&mut self, kind: StatementKind) {
        self.statements.push(Statement {
            kind,
            span: self.span,
        });
    }

    pub fn expression(&mut self, expression: Expression) {
        self.push(StatementKind::Expression(expression));
    }

    pub fn ret(&mut self, expression: Expression) {
        self.push(StatementKind::Return(expression));
    }

    pub fn ret_void(&mut self) {
        self.ret(void());
    }

    pub fn throw(&mut self, expression: Expression) {
        self.push(StatementKind::Throw(expression));
    }

    pub fn if_then(&mut self, condition: Expression, body: Block) {
        self.if_else(condition, body, None);
    }

    pub fn if_else(&mut self, condition: Expression, body: Block, otherwise: Option<Else>) {
        self.push(StatementKind::If(IfStatement {
            condition,
            body,
            otherwise,
        }));
    }

    pub fn while_loop(&mut self, condition: Expression, body: Block) {
        self.push(StatementKind::While { condition, body });
    }

    pub fn defer(&mut self, expression: Expression) {
        self.push(StatementKind::Defer(Deferred::Expression(expression)));
    }

    pub fn defer_block(&mut self, body: Block) {
        self.push(StatementKind::Defer(Deferred::Block(body)));
    }

    pub fn raw_ir(&mut self, text: &str) {
        self.push(StatementKind::RawIr(text.to_string()));
    }

    fn finish(self) -> Block {
        Block {
            statements: self.statements,
            span: self.start,
        }
    }
}

fn segments(path: &str) -> Vec<InternedSymbol> {
    path.split('.').map(InternedSymbol::new).collect()
}

fn type_node(kind: TypeNodeKind) -> TypeNode {
    TypeNode {
        kind,
        throws: false,
        span: Span::DUMMY,
        resolved: OnceCell::new(),
    }
}

/// A named type, `i32` or `util.Pair`
pub fn ty(path: &str) -> TypeNode {
    type_node(TypeNodeKind::Named(segments(path)))
}

pub fn throwing(mut ty: TypeNode) -> TypeNode {
    ty.throws = true;
    ty
}

pub fn pointer(inner: TypeNode) -> TypeNode {
    type_node(TypeNodeKind::Pointer(Box::new(inner)))
}

pub fn rfc(inner: TypeNode) -> TypeNode {
    type_node(TypeNodeKind::Rfc(Box::new(inner)))
}

/// `T[]`
pub fn slice(element: TypeNode) -> TypeNode {
    type_node(TypeNodeKind::Slice {
        element: Box::new(element),
        size: None,
    })
}

/// `[N]T`
pub fn array(element: TypeNode, size: usize) -> TypeNode {
    type_node(TypeNodeKind::Slice {
        element: Box::new(element),
        size: Some(size),
    })
}

pub fn function_type(parameters: Vec<TypeNode>, return_type: TypeNode) -> TypeNode {
    type_node(TypeNodeKind::Function {
        parameters,
        return_type: Box::new(return_type),
    })
}

fn expression(kind: ExpressionKind) -> Expression {
    Expression::new(kind, Span::DUMMY)
}

pub fn void() -> Expression {
    expression(ExpressionKind::Void)
}

pub fn int(text: &str) -> Expression {
    expression(ExpressionKind::Literal(Literal::Integer(text.to_string())))
}

pub fn float(text: &str) -> Expression {
    expression(ExpressionKind::Literal(Literal::Float(text.to_string())))
}

pub fn string(text: &str) -> Expression {
    expression(ExpressionKind::Literal(Literal::String(text.to_string())))
}

pub fn boolean(value: bool) -> Expression {
    expression(ExpressionKind::Literal(Literal::Bool(value)))
}

pub fn name_expression(path: &str) -> NameExpression {
    NameExpression::new(segments(path), Span::DUMMY)
}

pub fn name(path: &str) -> Expression {
    expression(ExpressionKind::Name(name_expression(path)))
}

pub fn call_expression(callee: &str, arguments: Vec<Expression>) -> CallExpression {
    CallExpression::new(name_expression(callee), arguments, Span::DUMMY)
}

pub fn call(callee: &str, arguments: Vec<Expression>) -> Expression {
    expression(ExpressionKind::Call(call_expression(callee, arguments)))
}

pub fn try_call(callee: &str, arguments: Vec<Expression>) -> Expression {
    expression(ExpressionKind::Try(call_expression(callee, arguments)))
}

pub fn binary(operator: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
    expression(ExpressionKind::Binary {
        operator,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn bitwise_not(operand: Expression) -> Expression {
    expression(ExpressionKind::Unary {
        operator: UnaryOperator::BitwiseNot,
        operand: Box::new(operand),
    })
}

pub fn address_of(operand: Expression) -> Expression {
    expression(ExpressionKind::Unary {
        operator: UnaryOperator::AddressOf,
        operand: Box::new(operand),
    })
}

pub fn assign(lhs: Expression, rhs: Expression) -> Expression {
    expression(ExpressionKind::Assign {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn subscript(target: &str, index: Expression) -> Expression {
    expression(ExpressionKind::Subscript {
        target: name_expression(target),
        index: Box::new(index),
    })
}

pub fn size_of(ty: TypeNode) -> Expression {
    expression(ExpressionKind::SizeOf(ty))
}

pub fn destructor_call(variable: VariableId) -> Expression {
    expression(ExpressionKind::DestructorCall(variable))
}
