use std::sync::Arc;

use colored::Colorize;

use crate::{
    frontend::{
        ast::{FunctionRef, StructRef},
        intern::InternedSymbol,
    },
    middle::primitive::{Intrinsic, NumberDescriptor},
};

/// A resolved type. The kind is shared, the flags are per use site.
#[derive(Clone)]
pub struct Type {
    kind: Arc<TypeKind>,
    /// The value may carry an error instead (`!T`)
    pub throws: bool,
    /// Copied from the struct definition when this type names a struct with a
    /// destructor. Only set on the outermost type.
    pub destructor: Option<FunctionRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// i32, bool, str, error, etc.
    Intrinsic(Intrinsic),
    /// module.Name
    Struct {
        reference: StructRef,
        module: InternedSymbol,
        name: InternedSymbol,
    },
    /// *T
    Pointer(Type),
    /// rfc T
    ///
    /// An opaque boxed pointer, lowered exactly like a pointer
    Rfc(Type),
    /// T[] or [N]T
    ///
    /// A pointer and length to some amount of T's. Sized slices own a backing
    /// array of N elements.
    Slice { element: Type, size: Option<usize> },
    /// fn(i32, str) T
    Function {
        parameters: Arc<[Type]>,
        return_type: Type,
    },
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind: Arc::new(kind),
            throws: false,
            destructor: None,
        }
    }

    pub fn intrinsic(intrinsic: Intrinsic) -> Self {
        Self::new(TypeKind::Intrinsic(intrinsic))
    }

    pub fn void() -> Self {
        Self::intrinsic(Intrinsic::Void)
    }

    pub fn bool() -> Self {
        Self::intrinsic(Intrinsic::Bool)
    }

    pub fn error() -> Self {
        Self::intrinsic(Intrinsic::Error)
    }

    pub fn pointer_to(inner: Type) -> Self {
        Self::new(TypeKind::Pointer(inner))
    }

    pub fn with_throws(mut self, throws: bool) -> Self {
        self.throws = throws;
        self
    }

    /// The same type without the error payload
    pub fn unwrapped(&self) -> Self {
        self.clone().with_throws(false)
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn as_intrinsic(&self) -> Option<Intrinsic> {
        match *self.kind {
            TypeKind::Intrinsic(intrinsic) => Some(intrinsic),
            _ => None,
        }
    }

    pub fn number(&self) -> Option<NumberDescriptor> {
        self.as_intrinsic().and_then(Intrinsic::number)
    }

    pub fn is_void(&self) -> bool {
        self.as_intrinsic() == Some(Intrinsic::Void)
    }

    pub fn is_bool(&self) -> bool {
        self.as_intrinsic() == Some(Intrinsic::Bool)
    }

    pub fn is_error(&self) -> bool {
        self.as_intrinsic() == Some(Intrinsic::Error)
    }

    pub fn is_integer(&self) -> bool {
        self.number().is_some_and(|n| !n.float)
    }

    pub fn is_float(&self) -> bool {
        self.number().is_some_and(|n| n.float)
    }

    /// Void without an error payload, which needs no return slot at all
    pub fn is_plain_void(&self) -> bool {
        self.is_void() && !self.throws
    }

    pub fn as_struct(&self) -> Option<StructRef> {
        match *self.kind {
            TypeKind::Struct { reference, .. } => Some(reference),
            _ => None,
        }
    }

    /// The pointee of a pointer or rfc
    pub fn pointee(&self) -> Option<&Type> {
        match &*self.kind {
            TypeKind::Pointer(inner) | TypeKind::Rfc(inner) => Some(inner),
            _ => None,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.throws == other.throws && self.kind == other.kind
    }
}

impl Eq for Type {}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.kind.as_ref()
    }
}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Type")
            .field("kind", &self.kind)
            .field("throws", &self.throws)
            .finish()
    }
}

impl core::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intrinsic(intrinsic) => write!(f, "{intrinsic}"),
            Self::Struct { module, name, .. } => write!(f, "{module}.{name}"),
            Self::Pointer(ty) => write!(f, "*{}", ty.plain()),
            Self::Rfc(ty) => write!(f, "rfc {}", ty.plain()),
            Self::Slice {
                element,
                size: None,
            } => write!(f, "{}[]", element.plain()),
            Self::Slice {
                element,
                size: Some(size),
            } => write!(f, "[{size}]{}", element.plain()),
            Self::Function {
                parameters,
                return_type,
            } => {
                write!(f, "fn(")?;
                for (i, ty) in parameters.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ty.plain())?;
                }
                write!(f, ") {}", return_type.plain())
            }
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.colored().yellow())
    }
}

impl From<Type> for colored::ColoredString {
    fn from(s: Type) -> Self {
        s.plain().into()
    }
}

impl Type {
    /// The source spelling of the type, e.g. `!*util.Pair`
    pub fn plain(&self) -> String {
        if self.throws {
            format!("!{}", *self.kind)
        } else {
            self.kind.to_string()
        }
    }

    pub fn colored(&self) -> colored::ColoredString {
        self.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        frontend::ast::{FunctionId, ModuleId, StructId},
        index::Index,
    };

    fn i32() -> Type {
        Type::intrinsic(Intrinsic::I32)
    }

    #[test]
    fn spelling_matches_source_syntax() {
        let function = Type::new(TypeKind::Function {
            parameters: Arc::from([i32(), Type::pointer_to(Type::bool())]),
            return_type: i32().with_throws(true),
        });

        assert_eq!(function.plain(), "fn(i32, *bool) !i32");
        assert_eq!(
            Type::new(TypeKind::Slice {
                element: i32(),
                size: Some(4)
            })
            .plain(),
            "[4]i32"
        );
        assert_eq!(
            Type::new(TypeKind::Slice {
                element: i32(),
                size: None
            })
            .plain(),
            "i32[]"
        );
    }

    #[test]
    fn equality_ignores_destructors() {
        let reference = StructRef {
            module: ModuleId::new(0),
            strukt: StructId::new(0),
        };
        let kind = TypeKind::Struct {
            reference,
            module: InternedSymbol::new("util"),
            name: InternedSymbol::new("File"),
        };

        let mut with_destructor = Type::new(kind.clone());
        with_destructor.destructor = Some(FunctionRef {
            module: ModuleId::new(0),
            function: FunctionId::new(3),
        });

        assert_eq!(with_destructor, Type::new(kind));
        assert_eq!(with_destructor.plain(), "util.File");
        assert_eq!(with_destructor.as_struct(), Some(reference));
    }

    #[test]
    fn throwing_types_differ_from_their_payload() {
        let throwing = i32().with_throws(true);

        assert_ne!(throwing, i32());
        assert_eq!(throwing.unwrapped(), i32());
        assert!(throwing.is_integer());
        assert!(!Type::void().with_throws(true).is_plain_void());
    }
}
