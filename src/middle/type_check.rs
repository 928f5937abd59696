//! Magma Type Checker
//!
//! Runs over a link resolved bundle and computes the type of every expression
//! bottom up, storing it in the expression's type slot. Along the way it
//! validates:
//!
//!   1) operands of binary and unary operators, applying the numeric
//!      promotion rule where both sides are numbers
//!   2) control statements: conditions are bool, thrown values are errors and
//!      returns match the void-ness of their function
//!   3) assignments, which never narrow or widen a non-literal number
//!      implicitly, and destructuring assignments, which split a throwing call
//!
//! The first violation aborts checking. Once the checker succeeds, the code
//! generator can rely on every type slot being filled.

use tracing::{debug, trace};

use crate::{
    error::{CodegenErrorKind, CompileError, TypeErrorKind, report_error},
    frontend::{
        ast::{
            BinaryOperator, Block, CallExpression, CallTarget, Deferred, Else, Expression,
            ExpressionKind, FunctionRef, IfStatement, Literal, Module, ModuleBundle,
            NameExpression, NameResolution, StatementKind, TypeNode, UnaryOperator, VariableId,
            annotate, annotation,
        },
        Span,
    },
    middle::{
        primitive::{Intrinsic, PromotedSide, promote},
        ty::{Type, TypeKind},
    },
};

#[derive(Debug)]
pub struct TypeChecker<'bundle> {
    bundle: &'bundle ModuleBundle,
}

/// The function whose body is being checked
#[derive(Clone, Copy)]
struct FunctionContext<'a> {
    module: &'a Module,
    return_type: &'a Type,
}

impl<'bundle> TypeChecker<'bundle> {
    /// Checks every function body of the bundle. Running it again on the same
    /// bundle infers the same types.
    #[tracing::instrument(level = "debug", skip_all, fields(modules = bundle.len()))]
    pub fn check(bundle: &'bundle ModuleBundle) -> Result<(), CompileError> {
        let checker = Self { bundle };

        for (_, module) in bundle.modules() {
            debug!(module = %module.name, "type checking module");

            for (id, function) in module.functions.enumerate() {
                let return_type = checker.resolved(module, &function.return_type)?;
                let context = FunctionContext {
                    module,
                    return_type: &return_type,
                };

                trace!(function = %module.function_key(id), %return_type, "checking body");
                checker.block(context, &function.body)?;
            }
        }

        Ok(())
    }

    fn resolved(&self, module: &Module, node: &TypeNode) -> Result<Type, CompileError> {
        annotation(&node.resolved, "resolved type")
            .cloned()
            .map_err(|kind| report_error!(module.location(node.span), kind))
    }

    fn variable_type(&self, context: FunctionContext, variable: VariableId) -> Result<Type, CompileError> {
        self.resolved(context.module, &context.module.variables[variable].ty)
    }

    fn error(&self, context: FunctionContext, span: Span, kind: TypeErrorKind) -> CompileError {
        CompileError::new(kind, context.module.location(span))
    }

    fn block(&self, context: FunctionContext, block: &Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            match &statement.kind {
                StatementKind::Return(expression) => {
                    let ty = self.infer(context, expression)?;

                    if ty.is_void() != context.return_type.is_void() {
                        return Err(report_error!(
                            context.module.location(statement.span),
                            TypeErrorKind::ReturnMismatch {
                                expected: context.return_type.plain(),
                                actual: ty.plain(),
                            }
                        ));
                    }
                }
                StatementKind::Throw(expression) => {
                    if !context.return_type.throws {
                        return Err(report_error!(
                            context.module.location(statement.span),
                            TypeErrorKind::ThrowOutsideThrowingFunction
                        ));
                    }

                    let ty = self.infer(context, expression)?;

                    if !ty.is_error() {
                        return Err(report_error!(
                            context.module.location(expression.span),
                            TypeErrorKind::ExpectedError { actual: ty.plain() }
                        ));
                    }
                }
                StatementKind::If(if_statement) => self.if_statement(context, if_statement)?,
                StatementKind::While { condition, body } => {
                    self.condition(context, condition, "while condition")?;
                    self.block(context, body)?;
                }
                StatementKind::Expression(expression)
                | StatementKind::Defer(Deferred::Expression(expression)) => {
                    self.infer(context, expression)?;
                }
                StatementKind::Defer(Deferred::Block(body)) => self.block(context, body)?,
                StatementKind::RawIr(_) => {}
            }
        }

        Ok(())
    }

    fn if_statement(&self, context: FunctionContext, if_statement: &IfStatement) -> Result<(), CompileError> {
        self.condition(context, &if_statement.condition, "if condition")?;
        self.block(context, &if_statement.body)?;

        match &if_statement.otherwise {
            Some(Else::Block(block)) => self.block(context, block),
            Some(Else::If(nested)) => self.if_statement(context, nested),
            None => Ok(()),
        }
    }

    fn condition(
        &self,
        context: FunctionContext,
        condition: &Expression,
        construct: &'static str,
    ) -> Result<(), CompileError> {
        let ty = self.infer(context, condition)?;

        if !ty.is_bool() {
            return Err(report_error!(
                context.module.location(condition.span),
                TypeErrorKind::ExpectedBool {
                    construct,
                    actual: ty.plain(),
                }
            ));
        }

        Ok(())
    }

    /// Computes the type of an expression and records it in the tree
    fn infer(&self, context: FunctionContext, expression: &Expression) -> Result<Type, CompileError> {
        let ty = self.compute(context, expression)?;

        annotate(&expression.ty, ty.clone(), "expression type")
            .map_err(|kind| report_error!(context.module.location(expression.span), kind))?;

        Ok(ty)
    }

    fn compute(&self, context: FunctionContext, expression: &Expression) -> Result<Type, CompileError> {
        let span = expression.span;

        match &expression.kind {
            ExpressionKind::Void => Ok(Type::void()),
            ExpressionKind::Literal(literal) => Ok(Type::intrinsic(match literal {
                Literal::Integer(_) => Intrinsic::I64,
                Literal::Float(_) => Intrinsic::F64,
                Literal::String(_) => Intrinsic::Str,
                Literal::Bool(_) => Intrinsic::Bool,
            })),
            ExpressionKind::Name(name) => self.name_type(context, name),
            ExpressionKind::Call(call) => self.call_type(context, call),
            ExpressionKind::Try(call) => {
                if !context.return_type.throws {
                    return Err(report_error!(
                        context.module.location(span),
                        TypeErrorKind::ThrowOutsideThrowingFunction
                    ));
                }

                let ty = self.call_type(context, call)?;

                if !ty.throws {
                    return Err(report_error!(
                        context.module.location(span),
                        TypeErrorKind::TryOnNonThrowing
                    ));
                }

                Ok(ty.unwrapped())
            }
            ExpressionKind::Subscript { target, index } => {
                let target_type = self.name_type(context, target)?;

                let element = match target_type.kind() {
                    TypeKind::Slice { element, .. } => element.clone(),
                    TypeKind::Pointer(inner) | TypeKind::Rfc(inner) => inner.clone(),
                    _ => {
                        return Err(report_error!(
                            context.module.location(target.span),
                            TypeErrorKind::NotSubscriptable {
                                actual: target_type.plain(),
                            }
                        ));
                    }
                };

                let index_type = self.infer(context, index)?;

                if !index_type.is_integer() {
                    return Err(report_error!(
                        context.module.location(index.span),
                        TypeErrorKind::ExpectedInteger {
                            actual: index_type.plain(),
                        }
                    ));
                }

                Ok(element)
            }
            ExpressionKind::Binary { operator, lhs, rhs } => {
                self.binary_type(context, *operator, lhs, rhs)
            }
            ExpressionKind::Unary {
                operator: UnaryOperator::BitwiseNot,
                operand,
            } => {
                let ty = self.infer(context, operand)?.unwrapped();

                if !ty.is_bool() && !ty.is_integer() {
                    return Err(report_error!(
                        context.module.location(operand.span),
                        TypeErrorKind::ExpectedInteger { actual: ty.plain() }
                    ));
                }

                Ok(ty)
            }
            ExpressionKind::Unary {
                operator: UnaryOperator::AddressOf,
                operand,
            } => {
                if !is_place(operand) {
                    return Err(report_error!(
                        context.module.location(operand.span),
                        TypeErrorKind::NotAddressable
                    ));
                }

                let ty = self.infer(context, operand)?;
                Ok(Type::pointer_to(ty.unwrapped()))
            }
            ExpressionKind::VariableDefinition(variable) => self.variable_type(context, *variable),
            ExpressionKind::VariableDefinitionAssign { variable, value } => {
                let ty = self.variable_type(context, *variable)?;
                let value_type = self.infer(context, value)?;

                self.check_implicit_cast(context, &ty, &value_type, value)?;

                Ok(ty)
            }
            ExpressionKind::Assign { lhs, rhs } => {
                if !is_place(lhs) {
                    return Err(report_error!(
                        context.module.location(lhs.span),
                        TypeErrorKind::NotAssignable
                    ));
                }

                let ty = self.infer(context, lhs)?;
                let value_type = self.infer(context, rhs)?;

                self.check_implicit_cast(context, &ty, &value_type, rhs)?;

                Ok(ty)
            }
            ExpressionKind::DestructureAssign { value, error, call } => {
                let call_type = self.call_type(context, call)?;

                if !call_type.throws {
                    return Err(report_error!(
                        context.module.location(call.span),
                        TypeErrorKind::DestructureNonThrowing
                    ));
                }

                if call_type.is_void() {
                    return Err(report_error!(
                        context.module.location(call.span),
                        TypeErrorKind::DestructureVoid
                    ));
                }

                let error_type = self.variable_type(context, *error)?;

                if error_type != Type::error() {
                    return Err(report_error!(
                        context.module.location(span),
                        TypeErrorKind::DestructureErrorType {
                            actual: error_type.plain(),
                        }
                    ));
                }

                let value_type = self.variable_type(context, *value)?;

                if value_type != call_type.unwrapped() {
                    return Err(report_error!(
                        context.module.location(span),
                        TypeErrorKind::DestructureValueType {
                            expected: call_type.unwrapped().plain(),
                            actual: value_type.plain(),
                        }
                    ));
                }

                Ok(value_type)
            }
            ExpressionKind::SizeOf(_) => Ok(Type::intrinsic(Intrinsic::U64)),
            ExpressionKind::DestructorCall(variable) => {
                let ty = self.variable_type(context, *variable)?;

                if ty.destructor.is_none() {
                    return Err(report_error!(
                        context.module.location(span),
                        TypeErrorKind::NoDestructor { ty: ty.plain() }
                    ));
                }

                Ok(Type::void())
            }
        }
    }

    /// The type of a name used as a value
    fn name_type(&self, context: FunctionContext, name: &NameExpression) -> Result<Type, CompileError> {
        let resolution = annotation(&name.resolution, "name resolution")
            .map_err(|kind| report_error!(context.module.location(name.span), kind))?;

        match resolution {
            NameResolution::Variable {
                variable, accesses, ..
            } => match accesses.last() {
                Some(access) => Ok(access.ty.clone()),
                None => {
                    let module = self.bundle.module(variable.module);
                    self.resolved(module, &module.variables[variable.variable].ty)
                }
            },
            NameResolution::Function(function) => self.function_type(*function),
            NameResolution::Struct(_) => Err(self.error(
                context,
                name.span,
                TypeErrorKind::NotAValue { name: name.path() },
            )),
        }
    }

    fn function_type(&self, function: FunctionRef) -> Result<Type, CompileError> {
        let (parameters, return_type) = self.signature(function, false)?;

        Ok(Type::new(TypeKind::Function {
            parameters: parameters.into(),
            return_type,
        }))
    }

    /// Parameter and return types of a function, optionally leaving out the
    /// implicit `this`
    fn signature(&self, function: FunctionRef, explicit_only: bool) -> Result<(Vec<Type>, Type), CompileError> {
        let module = self.bundle.module(function.module);
        let definition = self.bundle.function(function);

        let parameters = if explicit_only {
            definition.explicit_parameters()
        } else {
            &definition.parameters
        };

        let parameters = parameters
            .iter()
            .map(|parameter| self.resolved(module, &module.variables[*parameter].ty))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((parameters, self.resolved(module, &definition.return_type)?))
    }

    /// The declared return type of the callee, keeping its throws flag
    fn call_type(&self, context: FunctionContext, call: &CallExpression) -> Result<Type, CompileError> {
        let target = annotation(&call.target, "call target")
            .map_err(|_| report_error!(context.module.location(call.span), CodegenErrorKind::UnclassifiedCall))?;

        let (parameters, return_type) = match target {
            CallTarget::Direct(function) => self.signature(*function, false)?,
            CallTarget::Member { function, .. } => self.signature(*function, true)?,
            CallTarget::FunctionPointer => {
                let callee = self.name_type(context, &call.callee)?;

                match callee.kind() {
                    TypeKind::Function {
                        parameters,
                        return_type,
                    } => (parameters.to_vec(), return_type.clone()),
                    _ => {
                        return Err(report_error!(
                            context.module.location(call.span),
                            CodegenErrorKind::UnclassifiedCall
                        ));
                    }
                }
            }
        };

        if parameters.len() != call.arguments.len() {
            return Err(report_error!(
                context.module.location(call.span),
                TypeErrorKind::ArgumentCount {
                    expected: parameters.len(),
                    actual: call.arguments.len(),
                }
            ));
        }

        for argument in &call.arguments {
            self.infer(context, argument)?;
        }

        Ok(return_type)
    }

    fn binary_type(
        &self,
        context: FunctionContext,
        operator: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<Type, CompileError> {
        let lhs_type = self.infer(context, lhs)?.unwrapped();
        let rhs_type = self.infer(context, rhs)?.unwrapped();

        if operator.is_comparison() {
            return Ok(Type::bool());
        }

        if operator.is_logical() {
            for (operand, ty) in [(lhs, &lhs_type), (rhs, &rhs_type)] {
                if !ty.is_bool() {
                    return Err(report_error!(
                        context.module.location(operand.span),
                        TypeErrorKind::ExpectedBool {
                            construct: "logical operand",
                            actual: ty.plain(),
                        }
                    ));
                }
            }

            return Ok(Type::bool());
        }

        if operator.is_bitwise() {
            if lhs_type.is_float() || rhs_type.is_float() {
                return Err(report_error!(
                    context.module.location(lhs.span),
                    TypeErrorKind::FloatBitwise
                ));
            }

            if lhs_type.is_bool() && rhs_type.is_bool() {
                return Ok(Type::bool());
            }

            if lhs_type.is_integer() && rhs_type.is_integer() {
                return Ok(operand_type(lhs, &lhs_type, rhs, &rhs_type));
            }

            return Err(report_error!(
                context.module.location(lhs.span),
                TypeErrorKind::MixedBitwiseOperands {
                    lhs: lhs_type.plain(),
                    rhs: rhs_type.plain(),
                }
            ));
        }

        if operator.is_shift() {
            for (operand, ty) in [(lhs, &lhs_type), (rhs, &rhs_type)] {
                if !ty.is_integer() {
                    return Err(report_error!(
                        context.module.location(operand.span),
                        TypeErrorKind::ExpectedInteger { actual: ty.plain() }
                    ));
                }
            }

            return Ok(lhs_type);
        }

        match operator {
            BinaryOperator::Add | BinaryOperator::Subtract | BinaryOperator::Multiply => {
                for (operand, ty) in [(lhs, &lhs_type), (rhs, &rhs_type)] {
                    if ty.number().is_none() {
                        return Err(report_error!(
                            context.module.location(operand.span),
                            TypeErrorKind::ExpectedNumeric { actual: ty.plain() }
                        ));
                    }
                }

                Ok(operand_type(lhs, &lhs_type, rhs, &rhs_type))
            }
            // Everything else takes the type of the left operand
            _ => Ok(lhs_type),
        }
    }

    /// Rejects assigning a non-literal number of a different numeric type
    fn check_implicit_cast(
        &self,
        context: FunctionContext,
        target: &Type,
        value_type: &Type,
        value: &Expression,
    ) -> Result<(), CompileError> {
        if value.is_numeric_literal() {
            return Ok(());
        }

        if target.number().is_some()
            && value_type.number().is_some()
            && target.unwrapped() != value_type.unwrapped()
        {
            return Err(report_error!(
                context.module.location(value.span),
                TypeErrorKind::ImplicitNumericCast {
                    from: value_type.unwrapped().plain(),
                    to: target.unwrapped().plain(),
                }
            ));
        }

        Ok(())
    }
}

/// The type both operands of a numeric binary operation are converted to. A
/// literal adopts the type of the other side, otherwise the promotion rule
/// decides.
pub fn operand_type(lhs: &Expression, lhs_type: &Type, rhs: &Expression, rhs_type: &Type) -> Type {
    match (lhs.is_numeric_literal(), rhs.is_numeric_literal()) {
        (true, false) => return rhs_type.clone(),
        (false, true) => return lhs_type.clone(),
        _ => {}
    }

    match (lhs_type.number(), rhs_type.number()) {
        (Some(l), Some(r)) if promote(l, r) == PromotedSide::Rhs => rhs_type.clone(),
        _ => lhs_type.clone(),
    }
}

/// Expressions denoting a memory location
pub fn is_place(expression: &Expression) -> bool {
    match &expression.kind {
        ExpressionKind::Name(name) => matches!(
            name.resolution.get(),
            Some(NameResolution::Variable { method: None, .. })
        ),
        ExpressionKind::Subscript { .. } => true,
        _ => false,
    }
}
