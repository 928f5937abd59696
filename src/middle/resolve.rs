use std::{str::FromStr, sync::Arc};

use tracing::{debug, trace};

use crate::{
    error::{CodegenErrorKind, CompileError, LinkErrorKind, report_error},
    frontend::{
        Span,
        ast::{
            Block, CallExpression, CallTarget, Deferred, Else, Expression, ExpressionKind,
            FunctionRef, IfStatement, MemberAccess, MethodAccess, Module, ModuleBundle, ModuleId,
            NameExpression, NameResolution, StatementKind, StructRef, TypeNode, TypeNodeKind,
            VariableId, VariableKind, VariableRef, annotate,
        },
        intern::InternedSymbol,
    },
    middle::{
        primitive::Intrinsic,
        scope::Scope,
        ty::{Type, TypeKind},
    },
};

/// Link resolver
///
/// Binds every name, call and type reference of a bundle to the definition
/// it denotes, possibly in another module, and writes the result into the
/// annotation slots of the tree.
#[derive(Debug)]
pub struct Resolver<'bundle> {
    bundle: &'bundle ModuleBundle,
}

/// Where a name inside a function body is looked up from
#[derive(Clone, Copy)]
struct Context<'a> {
    module_id: ModuleId,
    module: &'a Module,
    scope: &'a Scope,
}

impl<'bundle> Resolver<'bundle> {
    /// Resolves all names within a bundle in 2 steps.
    ///
    /// The first step checks the imports of every module and resolves the
    /// types of all struct fields, globals and function signatures, so that
    /// cross-module references never depend on the order modules are visited
    /// in.
    ///
    /// The second step traverses every function body and resolves names,
    /// member access chains and calls, classifying each call as direct,
    /// member or function pointer call.
    #[tracing::instrument(level = "debug", skip_all, fields(modules = bundle.len()))]
    pub fn resolve(bundle: &'bundle ModuleBundle) -> Result<(), CompileError> {
        let resolver = Self { bundle };

        for (id, module) in bundle.modules() {
            debug!(module = %module.name, "resolving declarations");
            resolver.resolve_imports(module)?;
            resolver.resolve_declarations(id, module)?;
        }

        for (id, module) in bundle.modules() {
            debug!(module = %module.name, "resolving bodies");
            resolver.resolve_bodies(id, module)?;
        }

        Ok(())
    }

    fn resolve_imports(&self, module: &Module) -> Result<(), CompileError> {
        for import in module.imports.values() {
            if self.bundle.module_by_name(import.module).is_none() {
                return Err(report_error!(
                    module.location(import.span),
                    LinkErrorKind::UnresolvedModule {
                        module: import.module.to_string(),
                    }
                ));
            }
        }

        Ok(())
    }

    fn resolve_declarations(&self, id: ModuleId, module: &Module) -> Result<(), CompileError> {
        for strukt in module.structs.iter() {
            for field in &strukt.fields {
                self.resolve_type(id, &field.ty)?;
            }
        }

        for variable in module.variables.iter() {
            if variable.kind == VariableKind::Global {
                self.resolve_type(id, &variable.ty)?;
            }
        }

        for function in module.functions.iter() {
            for parameter in &function.parameters {
                self.resolve_type(id, &module.variables[*parameter].ty)?;
            }

            self.resolve_type(id, &function.return_type)?;
        }

        // Destructors are checked last since they need resolved signatures
        for strukt in module.structs.iter() {
            let Some(destructor) = strukt.destructor else {
                continue;
            };

            let Some(function) = strukt.methods.get(&destructor) else {
                return Err(report_error!(
                    module.location(strukt.span),
                    LinkErrorKind::UnresolvedDestructor {
                        strukt: strukt.name.to_string(),
                        destructor: destructor.to_string(),
                    }
                ));
            };

            let function = &module.functions[*function];
            let return_type = self.resolve_type(id, &function.return_type)?;

            if !function.explicit_parameters().is_empty() || !return_type.is_plain_void() {
                return Err(report_error!(
                    module.location(function.span),
                    LinkErrorKind::InvalidDestructor {
                        strukt: strukt.name.to_string(),
                        destructor: destructor.to_string(),
                    }
                ));
            }
        }

        Ok(())
    }

    /// Resolves a type node in the context of the module it was written in.
    /// Already resolved nodes are returned as is.
    pub(crate) fn resolve_type(&self, module_id: ModuleId, node: &TypeNode) -> Result<Type, CompileError> {
        if let Some(ty) = node.resolved.get() {
            return Ok(ty.clone());
        }

        let ty = match &node.kind {
            TypeNodeKind::Named(path) => self.resolve_named_type(module_id, path, node.span)?,
            TypeNodeKind::Pointer(inner) => Type::new(TypeKind::Pointer(self.resolve_type(module_id, inner)?)),
            TypeNodeKind::Rfc(inner) => Type::new(TypeKind::Rfc(self.resolve_type(module_id, inner)?)),
            TypeNodeKind::Slice { element, size } => Type::new(TypeKind::Slice {
                element: self.resolve_type(module_id, element)?,
                size: *size,
            }),
            TypeNodeKind::Function {
                parameters,
                return_type,
            } => {
                let parameters = parameters
                    .iter()
                    .map(|parameter| self.resolve_type(module_id, parameter))
                    .collect::<Result<Arc<[_]>, _>>()?;

                Type::new(TypeKind::Function {
                    parameters,
                    return_type: self.resolve_type(module_id, return_type)?,
                })
            }
        }
        .with_throws(node.throws);

        let module = self.bundle.module(module_id);
        annotate(&node.resolved, ty.clone(), "type")
            .map_err(|kind| report_error!(module.location(node.span), kind))?;

        Ok(ty)
    }

    fn resolve_named_type(
        &self,
        module_id: ModuleId,
        path: &[InternedSymbol],
        span: Span,
    ) -> Result<Type, CompileError> {
        let module = self.bundle.module(module_id);

        let strukt = match path {
            [name] => {
                if let Ok(intrinsic) = Intrinsic::from_str(name.value()) {
                    return Ok(Type::intrinsic(intrinsic));
                }

                self.bundle
                    .scope(module_id)
                    .lookup_struct(*name)
                    .map(|strukt| StructRef {
                        module: module_id,
                        strukt,
                    })
            }
            [alias, name] => {
                let Some(target) = self.imported_module(module, *alias) else {
                    return Err(report_error!(
                        module.location(span),
                        LinkErrorKind::UnresolvedAlias {
                            alias: alias.to_string(),
                        }
                    ));
                };

                self.bundle
                    .scope(target)
                    .lookup_struct(*name)
                    .map(|strukt| StructRef {
                        module: target,
                        strukt,
                    })
            }
            _ => None,
        };

        match strukt {
            Some(strukt) => Ok(self.struct_type(strukt)),
            None => Err(report_error!(
                module.location(span),
                LinkErrorKind::UnresolvedType {
                    name: itertools::join(path.iter(), "."),
                }
            )),
        }
    }

    /// The type naming a struct, carrying its destructor if it has one
    fn struct_type(&self, reference: StructRef) -> Type {
        let definition = self.bundle.strukt(reference);
        let module = self.bundle.module(reference.module);

        let mut ty = Type::new(TypeKind::Struct {
            reference,
            module: module.name,
            name: definition.name,
        });

        ty.destructor = definition
            .destructor
            .and_then(|name| definition.methods.get(&name))
            .map(|function| FunctionRef {
                module: reference.module,
                function: *function,
            });

        ty
    }

    fn imported_module(&self, module: &Module, alias: InternedSymbol) -> Option<ModuleId> {
        let import = module.imports.get(&alias)?;
        self.bundle.module_by_name(import.module)
    }

    fn resolve_bodies(&self, module_id: ModuleId, module: &Module) -> Result<(), CompileError> {
        let global = self.bundle.scope(module_id);

        for (id, function) in module.functions.enumerate() {
            let Some(scope) = global.function_scope(id) else {
                return Err(report_error!(
                    module.location(function.span),
                    CodegenErrorKind::MissingAnnotation {
                        what: "function scope",
                    }
                ));
            };

            let context = Context {
                module_id,
                module,
                scope,
            };

            trace!(function = %module.function_key(id), "resolving function body");
            self.block(context, &function.body)?;
        }

        Ok(())
    }

    fn block(&self, context: Context, block: &Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            match &statement.kind {
                StatementKind::Return(expression)
                | StatementKind::Throw(expression)
                | StatementKind::Expression(expression)
                | StatementKind::Defer(Deferred::Expression(expression)) => {
                    self.expression(context, expression)?
                }
                StatementKind::If(if_statement) => self.if_statement(context, if_statement)?,
                StatementKind::While { condition, body } => {
                    self.expression(context, condition)?;
                    self.block(context, body)?;
                }
                StatementKind::Defer(Deferred::Block(body)) => self.block(context, body)?,
                StatementKind::RawIr(_) => {}
            }
        }

        Ok(())
    }

    fn if_statement(&self, context: Context, if_statement: &IfStatement) -> Result<(), CompileError> {
        self.expression(context, &if_statement.condition)?;
        self.block(context, &if_statement.body)?;

        match &if_statement.otherwise {
            Some(Else::Block(block)) => self.block(context, block),
            Some(Else::If(nested)) => self.if_statement(context, nested),
            None => Ok(()),
        }
    }

    fn variable_type(&self, context: Context, variable: VariableId) -> Result<Type, CompileError> {
        self.resolve_type(context.module_id, &context.module.variables[variable].ty)
    }

    fn expression(&self, context: Context, expression: &Expression) -> Result<(), CompileError> {
        match &expression.kind {
            ExpressionKind::Void | ExpressionKind::Literal(_) | ExpressionKind::DestructorCall(_) => Ok(()),
            ExpressionKind::Name(name) => self.name(context, name),
            ExpressionKind::Call(call) | ExpressionKind::Try(call) => self.call(context, call),
            ExpressionKind::Subscript { target, index } => {
                self.name(context, target)?;
                self.expression(context, index)
            }
            ExpressionKind::Binary { lhs, rhs, .. } | ExpressionKind::Assign { lhs, rhs } => {
                self.expression(context, lhs)?;
                self.expression(context, rhs)
            }
            ExpressionKind::Unary { operand, .. } => self.expression(context, operand),
            ExpressionKind::VariableDefinition(variable) => {
                self.variable_type(context, *variable).map(|_| ())
            }
            ExpressionKind::VariableDefinitionAssign { variable, value } => {
                self.variable_type(context, *variable)?;
                self.expression(context, value)
            }
            ExpressionKind::DestructureAssign { value, error, call } => {
                self.variable_type(context, *value)?;
                self.variable_type(context, *error)?;
                self.call(context, call)
            }
            ExpressionKind::SizeOf(ty) => self.resolve_type(context.module_id, ty).map(|_| ()),
        }
    }

    /// Resolves a name used as a value
    fn name(&self, context: Context, name: &NameExpression) -> Result<(), CompileError> {
        let resolution = self.lookup(context, name)?;

        if let NameResolution::Variable {
            method: Some(_), ..
        } = resolution
        {
            return Err(report_error!(
                context.module.location(name.span),
                LinkErrorKind::MethodNotCalled { method: name.path() }
            ));
        }

        self.bind(context, name, resolution)
    }

    fn bind(
        &self,
        context: Context,
        name: &NameExpression,
        resolution: NameResolution,
    ) -> Result<(), CompileError> {
        trace!(name = %name.path(), ?resolution, "resolved name");

        annotate(&name.resolution, resolution, "name resolution")
            .map_err(|kind| report_error!(context.module.location(name.span), kind))
    }

    fn call(&self, context: Context, call: &CallExpression) -> Result<(), CompileError> {
        let resolution = self.lookup(context, &call.callee)?;

        let target = match &resolution {
            NameResolution::Variable {
                method: Some(method),
                ..
            } => CallTarget::Member {
                function: method.function,
                owner_is_pointer: method.owner_is_pointer,
            },
            NameResolution::Variable {
                variable,
                accesses,
                method: None,
                ..
            } => {
                let ty = match accesses.last() {
                    Some(access) => access.ty.clone(),
                    None => self.variable_type(context, variable.variable)?,
                };

                match ty.kind() {
                    TypeKind::Function { .. } => CallTarget::FunctionPointer,
                    _ => return Err(self.not_callable(context, &call.callee)),
                }
            }
            NameResolution::Function(function) => CallTarget::Direct(*function),
            NameResolution::Struct(_) => return Err(self.not_callable(context, &call.callee)),
        };

        self.bind(context, &call.callee, resolution)?;

        trace!(callee = %call.callee.path(), ?target, "classified call");
        annotate(&call.target, target, "call target")
            .map_err(|kind| report_error!(context.module.location(call.span), kind))?;

        for argument in &call.arguments {
            self.expression(context, argument)?;
        }

        Ok(())
    }

    fn not_callable(&self, context: Context, callee: &NameExpression) -> CompileError {
        report_error!(
            context.module.location(callee.span),
            LinkErrorKind::NotCallable {
                name: callee.path(),
            }
        )
    }

    /// Finds what a possibly dotted name denotes. In order: a variable with a
    /// member chain, a function of an imported module, a member function of
    /// a struct of this module, a struct of an imported module.
    fn lookup(&self, context: Context, name: &NameExpression) -> Result<NameResolution, CompileError> {
        let unresolved = || {
            report_error!(
                context.module.location(name.span),
                LinkErrorKind::UnresolvedName { name: name.path() }
            )
        };

        let Some((first, rest)) = name.segments.split_first() else {
            return Err(unresolved());
        };

        if let Some(variable) = context.scope.lookup_variable(*first) {
            return self.member_chain(context, variable, rest, name);
        }

        let [member] = rest else {
            if !rest.is_empty() {
                return Err(unresolved());
            }

            if let Some(function) = context.scope.lookup_function(*first) {
                return Ok(NameResolution::Function(FunctionRef {
                    module: context.module_id,
                    function,
                }));
            }

            if let Some(strukt) = context.scope.lookup_struct(*first) {
                return Ok(NameResolution::Struct(StructRef {
                    module: context.module_id,
                    strukt,
                }));
            }

            return Err(unresolved());
        };

        if let Some(target) = self.imported_module(context.module, *first) {
            let scope = self.bundle.scope(target);

            if let Some(function) = scope.functions.get(member) {
                return Ok(NameResolution::Function(FunctionRef {
                    module: target,
                    function: *function,
                }));
            }

            if let Some(strukt) = scope.structs.get(member) {
                return Ok(NameResolution::Struct(StructRef {
                    module: target,
                    strukt: *strukt,
                }));
            }

            return Err(unresolved());
        }

        if context.scope.lookup_struct(*first).is_some() {
            let key = InternedSymbol::new(&format!("{first}.{member}"));

            return match context.scope.lookup_function(key) {
                Some(function) => Ok(NameResolution::Function(FunctionRef {
                    module: context.module_id,
                    function,
                })),
                None => Err(report_error!(
                    context.module.location(name.span),
                    LinkErrorKind::UnknownMember {
                        member: member.to_string(),
                        container: first.to_string(),
                    }
                )),
            };
        }

        Err(report_error!(
            context.module.location(name.span),
            LinkErrorKind::UnresolvedAlias {
                alias: first.to_string(),
            }
        ))
    }

    /// Resolves `variable.a.b` into field hops, auto-dereferencing through one
    /// pointer level per hop. A member function may only end the chain.
    fn member_chain(
        &self,
        context: Context,
        variable: VariableId,
        members: &[InternedSymbol],
        name: &NameExpression,
    ) -> Result<NameResolution, CompileError> {
        let definition = &context.module.variables[variable];
        let mut current = self.variable_type(context, variable)?;
        let mut accesses = Vec::new();
        let mut method = None;

        for member in members {
            if method.is_some() {
                return Err(report_error!(
                    context.module.location(name.span),
                    LinkErrorKind::FieldAfterMethod {
                        member: member.to_string(),
                    }
                ));
            }

            let hop = match current.as_struct() {
                Some(reference) => Some((reference, current.unwrapped(), false)),
                None => current.pointee().and_then(|pointee| {
                    pointee
                        .as_struct()
                        .map(|reference| (reference, pointee.unwrapped(), true))
                }),
            };

            let Some((reference, container, pointer_deref)) = hop else {
                return Err(report_error!(
                    context.module.location(name.span),
                    LinkErrorKind::NotAStruct {
                        member: member.to_string(),
                        ty: current.plain(),
                    }
                ));
            };

            let strukt = self.bundle.strukt(reference);

            if let Some((field_index, field)) = strukt.field(*member) {
                let ty = self.resolve_type(reference.module, &field.ty)?;

                accesses.push(MemberAccess {
                    field: *member,
                    field_index,
                    container,
                    ty: ty.clone(),
                    pointer_deref,
                });

                current = ty;
            } else if let Some(function) = strukt.methods.get(member) {
                method = Some(MethodAccess {
                    function: FunctionRef {
                        module: reference.module,
                        function: *function,
                    },
                    owner_is_pointer: pointer_deref,
                });
            } else {
                return Err(report_error!(
                    context.module.location(name.span),
                    LinkErrorKind::UnknownMember {
                        member: member.to_string(),
                        container: container.plain(),
                    }
                ));
            }
        }

        Ok(NameResolution::Variable {
            variable: VariableRef {
                module: context.module_id,
                variable,
            },
            is_local_slot: definition.kind != VariableKind::Parameter,
            accesses,
            method,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::CompileErrorKind,
        frontend::{
            ast::{ExpressionKind, Statement},
            build::*,
        },
        index::Index,
    };

    fn statement_expression(statement: &Statement) -> &Expression {
        match &statement.kind {
            StatementKind::Expression(expression) | StatementKind::Return(expression) => expression,
            other => panic!("unexpected statement {other:?}"),
        }
    }

    fn resolution(expression: &Expression) -> NameResolution {
        match &expression.kind {
            ExpressionKind::Name(name) => name.resolution.get().cloned().unwrap(),
            other => panic!("not a name {other:?}"),
        }
    }

    fn util_module() -> crate::frontend::ast::Module {
        let mut util = ModuleBuilder::new("util");
        util.structure("Pair", vec![("x", ty("i32")), ("y", ty("i32"))]);
        util.function(
            "div",
            vec![("a", ty("i32")), ("b", ty("i32"))],
            throwing(ty("i32")),
            |body| body.ret(name("a")),
        );
        util.finish()
    }

    #[test]
    fn locals_parameters_and_globals_resolve() {
        let mut main = ModuleBuilder::new("main");
        main.global("total", ty("i64"));
        main.function("main", vec![("a", ty("i32"))], ty("void"), |body| {
            let local = body.define_assign("b", ty("i32"), name("a"));
            body.expression(local);
            body.expression(name("b"));
            body.expression(name("total"));
        });
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();

        Resolver::resolve(&bundle).unwrap();

        let module = bundle.module(ModuleId::new(0));
        let statements = &module.functions.raw[0].body.statements;

        let ExpressionKind::VariableDefinitionAssign { value, .. } =
            &statement_expression(&statements[0]).kind
        else {
            panic!("expected a definition");
        };

        assert!(matches!(
            resolution(value),
            NameResolution::Variable {
                is_local_slot: false,
                ..
            }
        ));
        assert!(matches!(
            resolution(statement_expression(&statements[1])),
            NameResolution::Variable {
                is_local_slot: true,
                ..
            }
        ));

        let NameResolution::Variable { variable, .. } = resolution(statement_expression(&statements[2])) else {
            panic!("expected a variable");
        };
        assert_eq!(
            bundle.variable(variable).kind,
            VariableKind::Global
        );
    }

    #[test]
    fn cross_module_calls_and_types_resolve() {
        let mut main = ModuleBuilder::new("main");
        main.import("util", "util");
        main.function("main", vec![], ty("void"), |body| {
            let pair = body.define("p", ty("util.Pair"));
            body.expression(pair);
            let call = body.destructure(("v", ty("i32")), "e", call_expression("util.div", vec![int("10"), int("0")]));
            body.expression(call);
            body.expression(name("p.y"));
        });
        let bundle = ModuleBundle::new(vec![util_module(), main.finish()], "main").unwrap();

        Resolver::resolve(&bundle).unwrap();

        let main = bundle.module(ModuleId::new(1));
        let statements = &main.functions.raw[0].body.statements;

        let ExpressionKind::DestructureAssign { call, .. } = &statement_expression(&statements[1]).kind else {
            panic!("expected a destructuring assignment");
        };
        assert_eq!(
            call.target.get(),
            Some(&CallTarget::Direct(FunctionRef {
                module: ModuleId::new(0),
                function: crate::frontend::ast::FunctionId::new(0),
            }))
        );

        let NameResolution::Variable { accesses, .. } = resolution(statement_expression(&statements[2])) else {
            panic!("expected a variable");
        };
        assert_eq!(accesses.len(), 1);
        assert_eq!(accesses[0].field_index, 1);
        assert!(!accesses[0].pointer_deref);
        assert_eq!(accesses[0].container.plain(), "util.Pair");
        assert_eq!(accesses[0].ty.plain(), "i32");
    }

    #[test]
    fn member_calls_through_pointers_are_classified() {
        let mut main = ModuleBuilder::new("main");
        let pair = main.structure("Pair", vec![("x", ty("i32"))]);
        main.method(pair, "get", vec![], ty("i32"), |body| body.ret(name("this.x")));
        main.function("main", vec![("p", pointer(ty("Pair")))], ty("void"), |body| {
            body.expression(call("p.get", vec![]));
        });
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();

        Resolver::resolve(&bundle).unwrap();

        let module = bundle.module(ModuleId::new(0));

        let getter = &module.functions.raw[0].body.statements;
        let NameResolution::Variable { accesses, .. } = resolution(statement_expression(&getter[0])) else {
            panic!("expected a variable");
        };
        assert!(accesses[0].pointer_deref);

        let ExpressionKind::Call(call) = &statement_expression(&module.functions.raw[1].body.statements[0]).kind else {
            panic!("expected a call");
        };
        assert!(matches!(
            call.target.get(),
            Some(CallTarget::Member {
                owner_is_pointer: true,
                ..
            })
        ));
    }

    #[test]
    fn unknown_members_are_link_errors() {
        let mut main = ModuleBuilder::new("main");
        main.structure("Pair", vec![("x", ty("i32"))]);
        main.function("main", vec![("p", ty("Pair"))], ty("void"), |body| {
            body.expression(name("p.z"));
        });
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();

        let error = Resolver::resolve(&bundle).unwrap_err();

        assert_eq!(
            error.kind,
            CompileErrorKind::Link(LinkErrorKind::UnknownMember {
                member: "z".to_string(),
                container: "main.Pair".to_string(),
            })
        );
    }

    #[test]
    fn methods_must_end_the_chain_and_be_called() {
        let build = |path: &'static str, as_call: bool| {
            let mut main = ModuleBuilder::new("main");
            let pair = main.structure("Pair", vec![("x", ty("i32"))]);
            main.method(pair, "get", vec![], ty("i32"), |body| body.ret(int("0")));
            main.function("main", vec![("p", ty("Pair"))], ty("void"), |body| {
                body.expression(if as_call { call(path, vec![]) } else { name(path) });
            });
            ModuleBundle::new(vec![main.finish()], "main").unwrap()
        };

        let error = Resolver::resolve(&build("p.get.x", true)).unwrap_err();
        assert!(matches!(
            error.kind,
            CompileErrorKind::Link(LinkErrorKind::FieldAfterMethod { .. })
        ));

        let error = Resolver::resolve(&build("p.get", false)).unwrap_err();
        assert!(matches!(
            error.kind,
            CompileErrorKind::Link(LinkErrorKind::MethodNotCalled { .. })
        ));

        let error = Resolver::resolve(&build("p.x", true)).unwrap_err();
        assert!(matches!(
            error.kind,
            CompileErrorKind::Link(LinkErrorKind::NotCallable { .. })
        ));
    }

    #[test]
    fn unresolved_names_types_and_aliases() {
        let mut main = ModuleBuilder::new("main");
        main.function("main", vec![], ty("void"), |body| body.expression(name("missing")));
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();
        assert_eq!(
            Resolver::resolve(&bundle).unwrap_err().kind,
            CompileErrorKind::Link(LinkErrorKind::UnresolvedName {
                name: "missing".to_string()
            })
        );

        let mut main = ModuleBuilder::new("main");
        main.global("g", ty("Missing"));
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();
        assert_eq!(
            Resolver::resolve(&bundle).unwrap_err().kind,
            CompileErrorKind::Link(LinkErrorKind::UnresolvedType {
                name: "Missing".to_string()
            })
        );

        let mut main = ModuleBuilder::new("main");
        main.function("main", vec![], ty("void"), |body| {
            body.expression(call("io.print", vec![]))
        });
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();
        assert_eq!(
            Resolver::resolve(&bundle).unwrap_err().kind,
            CompileErrorKind::Link(LinkErrorKind::UnresolvedAlias {
                alias: "io".to_string()
            })
        );
    }

    #[test]
    fn destructors_are_validated_and_attached() {
        let mut main = ModuleBuilder::new("main");
        let file = main.structure("File", vec![("fd", ty("i32"))]);
        main.method(file, "close", vec![], ty("void"), |body| body.ret_void());
        main.destructor(file, "close");
        main.global("f", ty("File"));
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();

        Resolver::resolve(&bundle).unwrap();

        let module = bundle.module(ModuleId::new(0));
        let global = module.variables.raw.iter().find(|v| v.kind == VariableKind::Global).unwrap();
        assert!(global.ty.resolved.get().unwrap().destructor.is_some());

        let mut main = ModuleBuilder::new("main");
        let file = main.structure("File", vec![("fd", ty("i32"))]);
        main.method(file, "close", vec![("code", ty("i32"))], ty("void"), |body| body.ret_void());
        main.destructor(file, "close");
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();

        assert!(matches!(
            Resolver::resolve(&bundle).unwrap_err().kind,
            CompileErrorKind::Link(LinkErrorKind::InvalidDestructor { .. })
        ));
    }

    #[test]
    fn every_name_is_resolved_after_success() {
        let mut main = ModuleBuilder::new("main");
        main.function("helper", vec![("x", ty("i64"))], ty("i64"), |body| body.ret(name("x")));
        main.function("main", vec![], ty("void"), |body| {
            let value = body.define_assign("v", ty("i64"), call("helper", vec![int("1")]));
            body.expression(value);
            let nested = body.block(|body| {
                body.expression(assign(name("v"), call("helper", vec![name("v")])));
            });
            body.while_loop(boolean(true), nested);
        });
        let bundle = ModuleBundle::new(vec![main.finish()], "main").unwrap();

        Resolver::resolve(&bundle).unwrap();

        fn check(expression: &Expression) {
            match &expression.kind {
                ExpressionKind::Name(name) => assert!(name.resolution.get().is_some()),
                ExpressionKind::Call(call) => {
                    assert!(call.target.get().is_some());
                    call.arguments.iter().for_each(check);
                }
                ExpressionKind::Assign { lhs, rhs } => {
                    check(lhs);
                    check(rhs);
                }
                ExpressionKind::VariableDefinitionAssign { value, .. } => check(value),
                _ => {}
            }
        }

        fn walk(block: &Block) {
            for statement in &block.statements {
                match &statement.kind {
                    StatementKind::Expression(e) | StatementKind::Return(e) => check(e),
                    StatementKind::While { condition, body } => {
                        check(condition);
                        walk(body);
                    }
                    _ => {}
                }
            }
        }

        for function in bundle.module(ModuleId::new(0)).functions.iter() {
            walk(&function.body);
        }
    }
}
