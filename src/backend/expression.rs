use super::{
    function::{FunctionGenerator, resolved},
    layout::{ir_throwing_type, ir_type, known_size},
};
use crate::{
    error::{CodegenErrorKind, CompileError, report_error},
    frontend::{
        Span,
        ast::{
            BinaryOperator, CallExpression, CallTarget, Expression, ExpressionKind, FunctionRef,
            Literal, MemberAccess, NameExpression, NameResolution, TypeNode, UnaryOperator,
            VariableId, VariableKind, VariableRef, annotation,
        },
    },
    middle::{
        primitive::{Intrinsic, conversion},
        ty::{Type, TypeKind},
        type_check::operand_type,
    },
};

/// An SSA value or constant together with the type it has in the source
#[derive(Debug, Clone)]
pub struct Value {
    pub text: String,
    pub ty: Type,
}

impl Value {
    pub fn new(text: impl Into<String>, ty: Type) -> Self {
        Self {
            text: text.into(),
            ty,
        }
    }

    fn void() -> Self {
        Self::new("", Type::void())
    }

    /// `type value` as used for operands
    pub fn typed(&self) -> String {
        format!("{} {}", ir_throwing_type(&self.ty), self.text)
    }
}

/// Where the value of a variable lives
enum Base {
    /// A stack slot or global which has to be loaded
    Slot(String),
    /// An SSA parameter
    Value(String),
}

fn float_literal(text: &str) -> String {
    if text.contains(['.', 'e', 'E']) {
        text.to_string()
    } else {
        format!("{text}.0")
    }
}

fn is_signed(ty: &Type) -> bool {
    ty.number().is_some_and(|number| number.signed)
}

fn comparison(operator: BinaryOperator, ty: &Type) -> Option<&'static str> {
    let predicate = match (operator, ty.is_float(), is_signed(ty)) {
        (BinaryOperator::Equals, true, _) => "fcmp oeq",
        (BinaryOperator::NotEquals, true, _) => "fcmp one",
        (BinaryOperator::LessThan, true, _) => "fcmp olt",
        (BinaryOperator::LessThanOrEqualTo, true, _) => "fcmp ole",
        (BinaryOperator::GreaterThan, true, _) => "fcmp ogt",
        (BinaryOperator::GreaterThanOrEqualTo, true, _) => "fcmp oge",
        (BinaryOperator::Equals, false, _) => "icmp eq",
        (BinaryOperator::NotEquals, false, _) => "icmp ne",
        (BinaryOperator::LessThan, false, true) => "icmp slt",
        (BinaryOperator::LessThan, false, false) => "icmp ult",
        (BinaryOperator::LessThanOrEqualTo, false, true) => "icmp sle",
        (BinaryOperator::LessThanOrEqualTo, false, false) => "icmp ule",
        (BinaryOperator::GreaterThan, false, true) => "icmp sgt",
        (BinaryOperator::GreaterThan, false, false) => "icmp ugt",
        (BinaryOperator::GreaterThanOrEqualTo, false, true) => "icmp sge",
        (BinaryOperator::GreaterThanOrEqualTo, false, false) => "icmp uge",
        _ => return None,
    };

    Some(predicate)
}

fn arithmetic(operator: BinaryOperator, ty: &Type) -> Option<&'static str> {
    let float = ty.is_float();
    let signed = is_signed(ty);

    let instruction = match operator {
        BinaryOperator::Add if float => "fadd",
        BinaryOperator::Add => "add",
        BinaryOperator::Subtract if float => "fsub",
        BinaryOperator::Subtract => "sub",
        BinaryOperator::Multiply if float => "fmul",
        BinaryOperator::Multiply => "mul",
        BinaryOperator::Divide if float => "fdiv",
        BinaryOperator::Divide if signed => "sdiv",
        BinaryOperator::Divide => "udiv",
        BinaryOperator::Remainder if float => "frem",
        BinaryOperator::Remainder if signed => "srem",
        BinaryOperator::Remainder => "urem",
        BinaryOperator::BitwiseAnd => "and",
        BinaryOperator::BitwiseOr => "or",
        BinaryOperator::BitwiseXor => "xor",
        BinaryOperator::ShiftLeft => "shl",
        BinaryOperator::ShiftRight if signed => "ashr",
        BinaryOperator::ShiftRight => "lshr",
        _ => return None,
    };

    Some(instruction)
}

impl<'a> FunctionGenerator<'_, 'a> {
    pub(super) fn expression(&mut self, expression: &'a Expression) -> Result<Value, CompileError> {
        match &expression.kind {
            ExpressionKind::Void => Ok(Value::void()),
            ExpressionKind::Literal(literal) => Ok(self.literal(literal)),
            ExpressionKind::Name(name) => self.name_value(name),
            ExpressionKind::Call(call) => {
                let result = self.call(call)?;
                Ok(self.discard_error(result))
            }
            ExpressionKind::Try(call) => self.try_call(call),
            ExpressionKind::Subscript { target, index } => {
                let (pointer, element) = self.subscript_pointer(target, index)?;
                let value = self.load(&ir_type(&element), &pointer);
                Ok(Value::new(value, element))
            }
            ExpressionKind::Binary { operator, lhs, rhs } => self.binary(expression, *operator, lhs, rhs),
            ExpressionKind::Unary {
                operator: UnaryOperator::BitwiseNot,
                operand,
            } => {
                let value = self.expression(operand)?;
                let mask = if value.ty.is_bool() { "1" } else { "-1" };

                let result = self.fresh();
                self.emit(format!("{result} = xor {}, {mask}", value.typed()));
                Ok(Value::new(result, value.ty))
            }
            ExpressionKind::Unary {
                operator: UnaryOperator::AddressOf,
                operand,
            } => {
                let (pointer, ty) = self.place(operand)?;
                Ok(Value::new(pointer, Type::pointer_to(ty)))
            }
            ExpressionKind::VariableDefinition(variable) => {
                let ty = self.define_variable(*variable, true)?;
                self.register_destructor(*variable, &ty);
                Ok(Value::new("zeroinitializer", ty))
            }
            ExpressionKind::VariableDefinitionAssign { variable, value } => {
                let ty = self.define_variable(*variable, false)?;
                let value = self.expression_as(value, &ty)?;
                let slot = self.local_slot(*variable);

                self.emit(format!("store {}, ptr {slot}", value.typed()));
                self.register_destructor(*variable, &ty);
                Ok(value)
            }
            ExpressionKind::Assign { lhs, rhs } => {
                let (pointer, ty) = self.place(lhs)?;
                let value = self.expression_as(rhs, &ty)?;
                self.emit(format!("store {}, ptr {pointer}", value.typed()));

                let reloaded = self.load(&ir_type(&ty), &pointer);
                Ok(Value::new(reloaded, ty))
            }
            ExpressionKind::DestructureAssign { value, error, call } => {
                self.destructure(*value, *error, call)
            }
            ExpressionKind::SizeOf(node) => self.size_of(node),
            ExpressionKind::DestructorCall(variable) => {
                let ty = self.variable_type(self.local(*variable))?;
                let Some(destructor) = ty.destructor else {
                    return Err(self.unsupported(expression.span, "a destructor call on a type without one"));
                };

                self.destructor_call(*variable, destructor, expression.span)?;
                Ok(Value::void())
            }
        }
    }

    /// Evaluates an expression and converts it to `target`. Numeric literals
    /// are emitted directly at the target type.
    pub(super) fn expression_as(&mut self, expression: &'a Expression, target: &Type) -> Result<Value, CompileError> {
        let target = target.unwrapped();

        if let (ExpressionKind::Literal(literal), Some(number)) = (&expression.kind, target.number()) {
            match literal {
                Literal::Integer(text) if number.float => {
                    return Ok(Value::new(float_literal(text), target));
                }
                Literal::Integer(text) => return Ok(Value::new(text.clone(), target)),
                Literal::Float(text) if number.float => return Ok(Value::new(text.clone(), target)),
                _ => {}
            }
        }

        let value = self.expression(expression)?;
        Ok(self.convert(value, &target))
    }

    fn convert(&mut self, value: Value, target: &Type) -> Value {
        let (Some(from), Some(to)) = (value.ty.number(), target.number()) else {
            return value;
        };

        if value.ty.unwrapped() == *target {
            return value;
        }

        match conversion(from, to) {
            Some(instruction) => {
                let result = self.fresh();
                self.emit(format!(
                    "{result} = {instruction} {} {} to {}",
                    ir_type(&value.ty),
                    value.text,
                    ir_type(target)
                ));
                Value::new(result, target.clone())
            }
            None => Value::new(value.text, target.clone()),
        }
    }

    fn literal(&mut self, literal: &Literal) -> Value {
        match literal {
            Literal::Integer(text) => Value::new(text.clone(), Type::intrinsic(Intrinsic::I64)),
            Literal::Float(text) => Value::new(text.clone(), Type::intrinsic(Intrinsic::F64)),
            Literal::Bool(value) => Value::new(value.to_string(), Type::bool()),
            Literal::String(text) => {
                let symbol = self.module.string_constant(text);
                Value::new(
                    format!("{{ ptr {symbol}, i64 {} }}", text.len()),
                    Type::intrinsic(Intrinsic::Str),
                )
            }
        }
    }

    fn resolution(&self, name: &'a NameExpression) -> Result<&'a NameResolution, CompileError> {
        annotation(&name.resolution, "name resolution")
            .map_err(|kind| report_error!(self.location(name.span), kind))
    }

    fn local(&self, variable: VariableId) -> VariableRef {
        VariableRef {
            module: self.module.module_id,
            variable,
        }
    }

    fn local_slot(&self, variable: VariableId) -> String {
        format!("%{}", self.source().variables[variable].name)
    }

    fn function_symbol(&self, function: FunctionRef) -> String {
        self.module
            .bundle
            .module(function.module)
            .function_symbol(function.function)
    }

    fn variable_type(&self, variable: VariableRef) -> Result<Type, CompileError> {
        let module = self.module.bundle.module(variable.module);
        resolved(module, &module.variables[variable.variable].ty)
    }

    fn base(&self, variable: VariableRef) -> Base {
        let module = self.module.bundle.module(variable.module);
        let definition = &module.variables[variable.variable];

        match definition.kind {
            VariableKind::Global => Base::Slot(format!("@{}.{}", module.name, definition.name)),
            VariableKind::Local => Base::Slot(format!("%{}", definition.name)),
            VariableKind::Parameter if self.spilled.contains(&variable.variable) => {
                Base::Slot(format!("%{}.addr", definition.name))
            }
            VariableKind::Parameter => Base::Value(format!("%{}", definition.name)),
        }
    }

    fn name_value(&mut self, name: &'a NameExpression) -> Result<Value, CompileError> {
        match self.resolution(name)? {
            NameResolution::Variable {
                variable,
                accesses,
                method: None,
                ..
            } => self.chain_value(*variable, accesses, name.span),
            NameResolution::Function(function) => Ok(Value::new(
                self.function_symbol(*function),
                Type::intrinsic(Intrinsic::Ptr),
            )),
            NameResolution::Variable { method: Some(_), .. } | NameResolution::Struct(_) => {
                Err(self.unsupported(name.span, "a name without a value"))
            }
        }
    }

    /// Loads a variable and walks its member chain by value
    fn chain_value(
        &mut self,
        variable: VariableRef,
        accesses: &[MemberAccess],
        span: Span,
    ) -> Result<Value, CompileError> {
        let mut ty = self.variable_type(variable)?;

        let mut current = match self.base(variable) {
            Base::Slot(slot) => self.load(&ir_type(&ty), &slot),
            Base::Value(value) => value,
        };

        for access in accesses {
            let container = ir_type(&access.container);

            if access.pointer_deref {
                current = self.load(&container, &current);
            }

            let field = self.fresh();
            self.emit(format!(
                "{field} = extractvalue {container} {current}, {}",
                access.field_index
            ));

            current = field;
            ty = access.ty.clone();
        }

        if ty.is_void() {
            return Err(self.unsupported(span, "a void variable"));
        }

        Ok(Value::new(current, ty))
    }

    /// The address of a variable's member chain
    fn chain_place(
        &mut self,
        variable: VariableRef,
        accesses: &[MemberAccess],
        span: Span,
    ) -> Result<(String, Type), CompileError> {
        let mut ty = self.variable_type(variable)?;
        let mut current = self.base(variable);

        for access in accesses {
            let container_pointer = match (current, access.pointer_deref) {
                (Base::Slot(slot), true) => self.load("ptr", &slot),
                (Base::Slot(slot), false) => slot,
                (Base::Value(value), true) => value,
                (Base::Value(_), false) => {
                    return Err(self.unsupported(span, "the address of a parameter"));
                }
            };

            let field = self.fresh();
            self.emit(format!(
                "{field} = getelementptr {}, ptr {container_pointer}, i32 0, i32 {}",
                ir_type(&access.container),
                access.field_index
            ));

            current = Base::Slot(field);
            ty = access.ty.clone();
        }

        match current {
            Base::Slot(pointer) => Ok((pointer, ty)),
            Base::Value(_) => Err(self.unsupported(span, "the address of a parameter")),
        }
    }

    fn place(&mut self, expression: &'a Expression) -> Result<(String, Type), CompileError> {
        match &expression.kind {
            ExpressionKind::Name(name) => match self.resolution(name)? {
                NameResolution::Variable {
                    variable,
                    accesses,
                    method: None,
                    ..
                } => self.chain_place(*variable, accesses, name.span),
                _ => Err(self.unsupported(expression.span, "the address of a function")),
            },
            ExpressionKind::Subscript { target, index } => self.subscript_pointer(target, index),
            _ => Err(self.unsupported(expression.span, "the address of a temporary")),
        }
    }

    /// The address of an element, as the pointer and the element type
    fn subscript_pointer(
        &mut self,
        target: &'a NameExpression,
        index: &'a Expression,
    ) -> Result<(String, Type), CompileError> {
        let collection = self.name_value(target)?;

        let (data, element) = match collection.ty.kind() {
            TypeKind::Slice { element, .. } => {
                let data = self.fresh();
                self.emit(format!(
                    "{data} = extractvalue %type.slice {}, 0",
                    collection.text
                ));
                (data, element.clone())
            }
            TypeKind::Pointer(element) | TypeKind::Rfc(element) => {
                (collection.text.clone(), element.clone())
            }
            _ => return Err(self.unsupported(target.span, "subscript of a scalar")),
        };

        let index = self.expression_as(index, &Type::intrinsic(Intrinsic::I64))?;

        let pointer = self.fresh();
        self.emit(format!(
            "{pointer} = getelementptr {}, ptr {data}, {}",
            ir_type(&element),
            index.typed()
        ));

        Ok((pointer, element))
    }

    /// Emits a call and returns its raw result. A throwing callee yields the
    /// whole error composite.
    fn call(&mut self, call: &'a CallExpression) -> Result<Value, CompileError> {
        let target = *annotation(&call.target, "call target")
            .map_err(|_| report_error!(self.location(call.span), CodegenErrorKind::UnclassifiedCall))?;

        let (callee, mut arguments, parameters, return_type) = match target {
            CallTarget::Direct(function) => {
                let (parameters, return_type) = self.signature(function, false)?;
                (self.function_symbol(function), Vec::new(), parameters, return_type)
            }
            CallTarget::Member {
                function,
                owner_is_pointer,
            } => {
                let NameResolution::Variable {
                    variable, accesses, ..
                } = self.resolution(&call.callee)?
                else {
                    return Err(report_error!(
                        self.location(call.span),
                        CodegenErrorKind::UnclassifiedCall
                    ));
                };

                let receiver = if owner_is_pointer {
                    self.chain_value(*variable, accesses, call.span)?.text
                } else {
                    self.chain_place(*variable, accesses, call.span)?.0
                };

                let (parameters, return_type) = self.signature(function, true)?;
                (
                    self.function_symbol(function),
                    vec![format!("ptr {receiver}")],
                    parameters,
                    return_type,
                )
            }
            CallTarget::FunctionPointer => {
                let pointer = self.name_value(&call.callee)?;

                let TypeKind::Function {
                    parameters,
                    return_type,
                } = pointer.ty.kind()
                else {
                    return Err(report_error!(
                        self.location(call.span),
                        CodegenErrorKind::UnclassifiedCall
                    ));
                };

                (pointer.text.clone(), Vec::new(), parameters.to_vec(), return_type.clone())
            }
        };

        for (argument, parameter) in call.arguments.iter().zip(&parameters) {
            let value = self.expression_as(argument, parameter)?;
            arguments.push(value.typed());
        }

        let arguments = arguments.join(", ");

        if return_type.is_plain_void() {
            self.emit(format!("call void {callee}({arguments})"));
            return Ok(Value::new("", return_type));
        }

        let result = self.fresh();
        self.emit(format!(
            "{result} = call {} {callee}({arguments})",
            ir_throwing_type(&return_type)
        ));

        Ok(Value::new(result, return_type))
    }

    /// Parameter types and return type of a function. Member functions take
    /// their receiver as a hidden first parameter.
    fn signature(&self, function: FunctionRef, member: bool) -> Result<(Vec<Type>, Type), CompileError> {
        let module = self.module.bundle.module(function.module);
        let definition = &module.functions[function.function];

        let parameters = if member {
            definition.explicit_parameters()
        } else {
            definition.parameters.as_slice()
        };

        let parameters = parameters
            .iter()
            .map(|parameter| resolved(module, &module.variables[*parameter].ty))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((parameters, resolved(module, &definition.return_type)?))
    }

    /// Drops the error of a throwing result and keeps the payload
    fn discard_error(&mut self, result: Value) -> Value {
        if !result.ty.throws {
            return result;
        }

        if result.ty.is_void() {
            return Value::void();
        }

        let payload = self.fresh();
        self.emit(format!(
            "{payload} = extractvalue {} {}, 1",
            ir_throwing_type(&result.ty),
            result.text
        ));

        Value::new(payload, result.ty.unwrapped())
    }

    /// Calls and rethrows a non-zero error through the defer chain
    fn try_call(&mut self, call: &'a CallExpression) -> Result<Value, CompileError> {
        let result = self.call(call)?;

        if !result.ty.throws {
            return Err(self.unsupported(call.span, "try on a call that cannot throw"));
        }

        let error = self.fresh();
        self.emit(format!(
            "{error} = extractvalue {} {}, 0",
            ir_throwing_type(&result.ty),
            result.text
        ));

        let status = self.fresh();
        self.emit(format!("{status} = extractvalue %type.error {error}, 0"));

        let failed = self.fresh();
        self.emit(format!("{failed} = icmp ne i32 {status}, 0"));

        let rethrow = self.module.fresh_label();
        let ok = self.module.fresh_label();
        self.emit(format!("br i1 {failed}, label %{rethrow}, label %{ok}"));

        self.label(&rethrow);
        self.store_error(&error, call.span)?;
        self.enter_defer_chain();

        self.label(&ok);
        Ok(self.discard_error(result))
    }

    /// `value, error = call()` stores both halves of the result
    fn destructure(
        &mut self,
        value: VariableId,
        error: VariableId,
        call: &'a CallExpression,
    ) -> Result<Value, CompileError> {
        let value_type = self.define_variable(value, false)?;
        self.define_variable(error, false)?;

        let result = self.call(call)?;
        let composite = ir_throwing_type(&result.ty);

        let error_value = self.fresh();
        self.emit(format!("{error_value} = extractvalue {composite} {}, 0", result.text));
        let error_slot = self.local_slot(error);
        self.emit(format!("store %type.error {error_value}, ptr {error_slot}"));

        let payload = self.fresh();
        self.emit(format!("{payload} = extractvalue {composite} {}, 1", result.text));
        let value_slot = self.local_slot(value);
        self.emit(format!(
            "store {} {payload}, ptr {value_slot}",
            ir_type(&value_type)
        ));

        self.register_destructor(value, &value_type);

        Ok(Value::new(payload, value_type))
    }

    /// Allocates the stack slot of a local. Sized slices get their backing
    /// array zeroed and wired up here, other types only when `zeroed`.
    pub(super) fn define_variable(&mut self, variable: VariableId, zeroed: bool) -> Result<Type, CompileError> {
        let source = self.source();
        let definition = &source.variables[variable];
        let ty = resolved(source, &definition.ty)?;

        let slot = format!("%{}", definition.name);
        let ir = ir_type(&ty);
        self.hoist(format!("{slot} = alloca {ir}"));

        if let TypeKind::Slice {
            element,
            size: Some(size),
        } = ty.kind()
        {
            let data = format!("%{}.data", definition.name);
            let array = format!("[{size} x {}]", ir_type(element));
            self.hoist(format!("{data} = alloca {array}"));

            let bytes = match known_size(element) {
                Some(bytes) => (bytes * *size as u64).to_string(),
                None => self.size_of_ir(&array),
            };
            self.emit(format!(
                "call void @llvm.memset.p0.i64(ptr {data}, i8 0, i64 {bytes}, i1 false)"
            ));

            let with_data = self.fresh();
            self.emit(format!(
                "{with_data} = insertvalue %type.slice undef, ptr {data}, 0"
            ));
            let with_length = self.fresh();
            self.emit(format!(
                "{with_length} = insertvalue %type.slice {with_data}, i64 {size}, 1"
            ));
            self.emit(format!("store %type.slice {with_length}, ptr {slot}"));
        } else if zeroed {
            self.emit(format!("store {ir} zeroinitializer, ptr {slot}"));
        }

        Ok(ty)
    }

    /// The size of an IR type computed from a pointer offset
    fn size_of_ir(&mut self, ty: &str) -> String {
        let end = self.fresh();
        self.emit(format!("{end} = getelementptr {ty}, ptr null, i64 1"));

        let size = self.fresh();
        self.emit(format!("{size} = ptrtoint ptr {end} to i64"));
        size
    }

    fn size_of(&mut self, node: &'a TypeNode) -> Result<Value, CompileError> {
        let ty = resolved(self.source(), node)?;
        let u64 = Type::intrinsic(Intrinsic::U64);

        let size = match known_size(&ty) {
            Some(size) => size.to_string(),
            None => self.size_of_ir(&ir_type(&ty)),
        };

        Ok(Value::new(size, u64))
    }

    pub(super) fn destructor_call(
        &mut self,
        variable: VariableId,
        destructor: FunctionRef,
        span: Span,
    ) -> Result<(), CompileError> {
        let Base::Slot(slot) = self.base(self.local(variable)) else {
            return Err(self.unsupported(span, "destroying a parameter held in a register"));
        };

        let symbol = self.function_symbol(destructor);
        self.emit(format!("call void {symbol}(ptr {slot})"));

        Ok(())
    }

    fn expression_type(&self, expression: &Expression) -> Result<Type, CompileError> {
        annotation(&expression.ty, "expression type")
            .map(Type::unwrapped)
            .map_err(|kind| report_error!(self.location(expression.span), kind))
    }

    fn binary(
        &mut self,
        expression: &'a Expression,
        operator: BinaryOperator,
        lhs: &'a Expression,
        rhs: &'a Expression,
    ) -> Result<Value, CompileError> {
        if operator.is_logical() {
            return self.short_circuit(operator, lhs, rhs);
        }

        let lhs_type = self.expression_type(lhs)?;
        let rhs_type = self.expression_type(rhs)?;

        let ty = match operator {
            BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight => self.expression_type(expression)?,
            _ => operand_type(lhs, &lhs_type, rhs, &rhs_type),
        };

        let left = self.expression_as(lhs, &ty)?;
        let right = self.expression_as(rhs, &ty)?;

        let result = self.fresh();

        if let Some(predicate) = comparison(operator, &ty) {
            self.emit(format!(
                "{result} = {predicate} {}, {}",
                left.typed(),
                right.text
            ));
            return Ok(Value::new(result, Type::bool()));
        }

        let Some(instruction) = arithmetic(operator, &ty) else {
            return Err(self.unsupported(expression.span, "this binary operator"));
        };

        self.emit(format!(
            "{result} = {instruction} {}, {}",
            left.typed(),
            right.text
        ));

        // `/` and `%` are typed by their left operand but computed at the
        // promoted width
        let checked = self.expression_type(expression)?;
        Ok(self.convert(Value::new(result, ty), &checked))
    }

    /// `&&` and `||` evaluate their right operand only when needed. The
    /// result goes through a stack slot.
    fn short_circuit(
        &mut self,
        operator: BinaryOperator,
        lhs: &'a Expression,
        rhs: &'a Expression,
    ) -> Result<Value, CompileError> {
        let slot = self.fresh();
        self.hoist(format!("{slot} = alloca i1"));

        let left = self.expression(lhs)?;
        self.emit(format!("store i1 {}, ptr {slot}", left.text));

        let right_label = self.module.fresh_label();
        let end = self.module.fresh_label();

        if operator == BinaryOperator::LogicalAnd {
            self.emit(format!(
                "br i1 {}, label %{right_label}, label %{end}",
                left.text
            ));
        } else {
            self.emit(format!(
                "br i1 {}, label %{end}, label %{right_label}",
                left.text
            ));
        }

        self.label(&right_label);
        let right = self.expression(rhs)?;
        self.emit(format!("store i1 {}, ptr {slot}", right.text));
        self.emit(format!("br label %{end}"));

        self.label(&end);
        let result = self.load("i1", &slot);

        Ok(Value::new(result, Type::bool()))
    }
}
