use strum::{Display, EnumIter, EnumString};

/// Types which are built into the language and need no declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Intrinsic {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F16,
    F32,
    F64,
    F128,
    /// { i32 code, str message }
    Error,
    /// { ptr, i64 }
    Str,
    /// { ptr, i64 }, untyped
    Slice,
    /// An opaque pointer
    Ptr,
}

/// Width, signedness and float-ness of a numeric type, which is all the
/// promotion rule looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumberDescriptor {
    pub bits: u32,
    pub signed: bool,
    pub float: bool,
}

impl Intrinsic {
    pub fn ir_name(self) -> &'static str {
        match self {
            Intrinsic::Void => "void",
            Intrinsic::Bool => "i1",
            Intrinsic::I8 | Intrinsic::U8 => "i8",
            Intrinsic::I16 | Intrinsic::U16 => "i16",
            Intrinsic::I32 | Intrinsic::U32 => "i32",
            Intrinsic::I64 | Intrinsic::U64 => "i64",
            Intrinsic::I128 | Intrinsic::U128 => "i128",
            Intrinsic::F16 => "half",
            Intrinsic::F32 => "float",
            Intrinsic::F64 => "double",
            Intrinsic::F128 => "fp128",
            Intrinsic::Error => "%type.error",
            Intrinsic::Str => "%type.str",
            Intrinsic::Slice => "%type.slice",
            Intrinsic::Ptr => "ptr",
        }
    }

    pub fn number(self) -> Option<NumberDescriptor> {
        let (bits, signed, float) = match self {
            Intrinsic::I8 => (8, true, false),
            Intrinsic::I16 => (16, true, false),
            Intrinsic::I32 => (32, true, false),
            Intrinsic::I64 => (64, true, false),
            Intrinsic::I128 => (128, true, false),
            Intrinsic::U8 => (8, false, false),
            Intrinsic::U16 => (16, false, false),
            Intrinsic::U32 => (32, false, false),
            Intrinsic::U64 => (64, false, false),
            Intrinsic::U128 => (128, false, false),
            Intrinsic::F16 => (16, true, true),
            Intrinsic::F32 => (32, true, true),
            Intrinsic::F64 => (64, true, true),
            Intrinsic::F128 => (128, true, true),
            Intrinsic::Void
            | Intrinsic::Bool
            | Intrinsic::Error
            | Intrinsic::Str
            | Intrinsic::Slice
            | Intrinsic::Ptr => return None,
        };

        Some(NumberDescriptor {
            bits,
            signed,
            float,
        })
    }

    /// The allocation size in bytes, for types whose size is known without
    /// asking the target
    pub fn known_size(self) -> Option<u64> {
        match self {
            Intrinsic::Void => Some(0),
            Intrinsic::Bool => Some(1),
            Intrinsic::Ptr => Some(8),
            Intrinsic::Error | Intrinsic::Str | Intrinsic::Slice => None,
            number => number.number().map(|n| n.bits as u64 / 8),
        }
    }
}

/// Which of the two operands of a binary operation determines the result type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotedSide {
    Lhs,
    Rhs,
}

/// Picks the operand type both sides of a binary operation are converted to.
/// Floats win over integers, otherwise the wider type wins. Ties keep the left
/// operand.
pub fn promote(lhs: NumberDescriptor, rhs: NumberDescriptor) -> PromotedSide {
    match (lhs.float, rhs.float) {
        (true, false) => PromotedSide::Lhs,
        (false, true) => PromotedSide::Rhs,
        _ if rhs.bits > lhs.bits => PromotedSide::Rhs,
        _ => PromotedSide::Lhs,
    }
}

/// A single conversion instruction between two numeric types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Conversion {
    FpExt,
    FpTrunc,
    SiToFp,
    UiToFp,
    FpToSi,
    FpToUi,
    Trunc,
    SExt,
    ZExt,
}

/// Finds the instruction converting a value of type `from` to type `to`, or
/// `None` when both have the same representation
pub fn conversion(from: NumberDescriptor, to: NumberDescriptor) -> Option<Conversion> {
    match (from.float, to.float) {
        (true, true) if to.bits > from.bits => Some(Conversion::FpExt),
        (true, true) if to.bits < from.bits => Some(Conversion::FpTrunc),
        (true, true) => None,
        (false, true) if from.signed => Some(Conversion::SiToFp),
        (false, true) => Some(Conversion::UiToFp),
        (true, false) if to.signed => Some(Conversion::FpToSi),
        (true, false) => Some(Conversion::FpToUi),
        (false, false) if to.bits < from.bits => Some(Conversion::Trunc),
        (false, false) if to.bits == from.bits => None,
        // Extension follows the signedness of the value being extended
        (false, false) if from.signed => Some(Conversion::SExt),
        (false, false) => Some(Conversion::ZExt),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    fn number(intrinsic: Intrinsic) -> NumberDescriptor {
        intrinsic.number().unwrap()
    }

    #[test]
    fn intrinsics_parse_from_their_names() {
        for intrinsic in Intrinsic::iter() {
            assert_eq!(Intrinsic::from_str(&intrinsic.to_string()), Ok(intrinsic));
        }

        assert_eq!(Intrinsic::from_str("i32"), Ok(Intrinsic::I32));
        assert_eq!(Intrinsic::from_str("error"), Ok(Intrinsic::Error));
        assert!(Intrinsic::from_str("Pair").is_err());
    }

    #[test]
    fn bool_and_pointers_are_not_numbers() {
        assert_eq!(Intrinsic::Bool.number(), None);
        assert_eq!(Intrinsic::Ptr.number(), None);
        assert_eq!(Intrinsic::Str.number(), None);
    }

    #[test]
    fn wider_integer_wins_and_is_never_narrowed() {
        for (narrow, wide) in [
            (Intrinsic::I8, Intrinsic::I16),
            (Intrinsic::I16, Intrinsic::I64),
            (Intrinsic::U32, Intrinsic::U64),
            (Intrinsic::U8, Intrinsic::U128),
        ] {
            assert_eq!(promote(number(narrow), number(wide)), PromotedSide::Rhs);
            assert_eq!(promote(number(wide), number(narrow)), PromotedSide::Lhs);

            let widen = conversion(number(narrow), number(wide)).unwrap();
            assert!(matches!(widen, Conversion::SExt | Conversion::ZExt));
        }
    }

    #[test]
    fn equal_widths_keep_the_left_operand() {
        assert_eq!(
            promote(number(Intrinsic::I32), number(Intrinsic::U32)),
            PromotedSide::Lhs
        );
        assert_eq!(
            conversion(number(Intrinsic::U32), number(Intrinsic::I32)),
            None
        );
    }

    #[test]
    fn floats_win_over_integers() {
        assert_eq!(
            promote(number(Intrinsic::I64), number(Intrinsic::F32)),
            PromotedSide::Rhs
        );
        assert_eq!(
            promote(number(Intrinsic::F16), number(Intrinsic::I128)),
            PromotedSide::Lhs
        );
        assert_eq!(
            promote(number(Intrinsic::F32), number(Intrinsic::F64)),
            PromotedSide::Rhs
        );
    }

    #[test]
    fn conversions_are_named_like_instructions() {
        let cases = [
            (Intrinsic::F32, Intrinsic::F64, "fpext"),
            (Intrinsic::F64, Intrinsic::F16, "fptrunc"),
            (Intrinsic::I32, Intrinsic::F64, "sitofp"),
            (Intrinsic::U8, Intrinsic::F32, "uitofp"),
            (Intrinsic::F64, Intrinsic::I32, "fptosi"),
            (Intrinsic::F64, Intrinsic::U16, "fptoui"),
            (Intrinsic::I64, Intrinsic::I8, "trunc"),
            (Intrinsic::I8, Intrinsic::U64, "sext"),
            (Intrinsic::U8, Intrinsic::I64, "zext"),
        ];

        for (from, to, expected) in cases {
            let conversion = conversion(number(from), number(to)).unwrap();
            assert_eq!(conversion.to_string(), expected, "{from} -> {to}");
        }
    }

    #[test]
    fn known_sizes() {
        assert_eq!(Intrinsic::Void.known_size(), Some(0));
        assert_eq!(Intrinsic::Bool.known_size(), Some(1));
        assert_eq!(Intrinsic::U16.known_size(), Some(2));
        assert_eq!(Intrinsic::F128.known_size(), Some(16));
        assert_eq!(Intrinsic::Ptr.known_size(), Some(8));
        assert_eq!(Intrinsic::Str.known_size(), None);
    }
}
