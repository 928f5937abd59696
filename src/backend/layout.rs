//! Lowering of resolved types to IR type names, struct layouts and constant
//! data

use itertools::Itertools;

use crate::{
    error::CodegenErrorKind,
    frontend::ast::{ModuleBundle, StructRef, annotation},
    middle::ty::{Type, TypeKind},
};

/// The IR spelling of a value of this type, ignoring its throws flag
pub fn ir_type(ty: &Type) -> String {
    match ty.kind() {
        TypeKind::Intrinsic(intrinsic) => intrinsic.ir_name().to_string(),
        TypeKind::Struct { module, name, .. } => struct_name(&module.to_string(), &name.to_string()),
        TypeKind::Pointer(_) | TypeKind::Rfc(_) | TypeKind::Function { .. } => "ptr".to_string(),
        TypeKind::Slice { .. } => "%type.slice".to_string(),
    }
}

/// The IR spelling of a possibly throwing type. A throwing value is a
/// composite whose first field is the error.
pub fn ir_throwing_type(ty: &Type) -> String {
    match (ty.throws, ty.is_void()) {
        (false, _) => ir_type(ty),
        (true, true) => "{ %type.error }".to_string(),
        (true, false) => format!("{{ %type.error, {} }}", ir_type(ty)),
    }
}

pub fn struct_name(module: &str, name: &str) -> String {
    format!("%struct.{module}.{name}")
}

/// The size of a type when it is known without a target data layout
pub fn known_size(ty: &Type) -> Option<u64> {
    match ty.kind() {
        TypeKind::Intrinsic(intrinsic) => intrinsic.known_size(),
        TypeKind::Pointer(_) | TypeKind::Rfc(_) | TypeKind::Function { .. } => Some(8),
        TypeKind::Struct { .. } | TypeKind::Slice { .. } => None,
    }
}

/// A struct layout as `(name, definition line)`. Fields keep their
/// declaration order, which is what field indices refer to.
pub fn struct_layout(bundle: &ModuleBundle, reference: StructRef) -> Result<(String, String), CodegenErrorKind> {
    let module = bundle.module(reference.module);
    let definition = bundle.strukt(reference);

    let name = struct_name(&module.name.to_string(), &definition.name.to_string());

    let fields = definition
        .fields
        .iter()
        .map(|field| annotation(&field.ty.resolved, "field type").map(ir_type))
        .collect::<Result<Vec<_>, _>>()?;

    let line = if fields.is_empty() {
        format!("{name} = type {{}}")
    } else {
        format!("{name} = type {{ {} }}", fields.iter().join(", "))
    };

    Ok((name, line))
}

/// Escapes text for a `c"..."` array. Printable ASCII is kept, except for
/// the quote and the backslash, everything else becomes `\XX`.
pub fn escape_bytes(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for byte in text.bytes() {
        match byte {
            b'"' | b'\\' => escaped.push_str(&format!("\\{byte:02X}")),
            0x20..=0x7E => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{byte:02X}")),
        }
    }

    escaped
}

/// A private NUL terminated byte array holding `text`
pub fn string_constant(symbol: &str, text: &str) -> String {
    format!(
        "{symbol} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
        text.len() + 1,
        escape_bytes(text)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::{ast::StructId, build::*},
        index::Index,
        middle::{primitive::Intrinsic, resolve::Resolver},
    };

    #[test]
    fn types_lower_to_ir_names() {
        let i32 = Type::intrinsic(Intrinsic::I32);

        assert_eq!(ir_type(&i32), "i32");
        assert_eq!(ir_type(&Type::intrinsic(Intrinsic::U8)), "i8");
        assert_eq!(ir_type(&Type::intrinsic(Intrinsic::F16)), "half");
        assert_eq!(ir_type(&Type::error()), "%type.error");
        assert_eq!(ir_type(&Type::pointer_to(i32.clone())), "ptr");
        assert_eq!(
            ir_type(&Type::new(TypeKind::Slice {
                element: i32.clone(),
                size: Some(3)
            })),
            "%type.slice"
        );
        assert_eq!(
            ir_type(&Type::new(TypeKind::Function {
                parameters: Arc::from([]),
                return_type: Type::void()
            })),
            "ptr"
        );
    }

    #[test]
    fn throwing_types_wrap_an_error() {
        let i32 = Type::intrinsic(Intrinsic::I32);

        assert_eq!(ir_throwing_type(&i32), "i32");
        assert_eq!(ir_throwing_type(&i32.with_throws(true)), "{ %type.error, i32 }");
        assert_eq!(ir_throwing_type(&Type::void().with_throws(true)), "{ %type.error }");
    }

    #[test]
    fn struct_layouts_keep_field_order() {
        let mut util = ModuleBuilder::new("util");
        util.structure(
            "Triple",
            vec![("c", ty("i8")), ("a", ty("f64")), ("b", pointer(ty("Triple")))],
        );
        util.structure("Empty", vec![]);
        let bundle = ModuleBundle::new(vec![util.finish()], "util").unwrap();
        Resolver::resolve(&bundle).unwrap();

        let triple = StructRef {
            module: bundle.entry(),
            strukt: StructId::new(0),
        };
        let empty = StructRef {
            module: bundle.entry(),
            strukt: StructId::new(1),
        };

        assert_eq!(
            struct_layout(&bundle, triple).unwrap(),
            (
                "%struct.util.Triple".to_string(),
                "%struct.util.Triple = type { i8, double, ptr }".to_string()
            )
        );
        assert_eq!(
            struct_layout(&bundle, empty).unwrap().1,
            "%struct.util.Empty = type {}"
        );
    }

    #[test]
    fn string_constants_are_escaped_and_terminated() {
        assert_eq!(escape_bytes("a\"b\\c\n"), "a\\22b\\5Cc\\0A");
        assert_eq!(escape_bytes("tab\there"), "tab\\09here");
        assert_eq!(
            string_constant("@.str.0.1", "hi\n"),
            "@.str.0.1 = private unnamed_addr constant [4 x i8] c\"hi\\0A\\00\""
        );
    }

    #[test]
    fn sizes_are_known_for_scalars_only() {
        assert_eq!(known_size(&Type::intrinsic(Intrinsic::U16)), Some(2));
        assert_eq!(known_size(&Type::bool()), Some(1));
        assert_eq!(known_size(&Type::pointer_to(Type::void())), Some(8));
        assert_eq!(known_size(&Type::intrinsic(Intrinsic::Str)), None);
    }
}
