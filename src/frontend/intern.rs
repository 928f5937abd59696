use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct InterningTable {
    strings: RwLock<Strings>,
}

#[derive(Debug, Default)]
struct Strings {
    values: Vec<&'static str>,
    indices: HashMap<&'static str, u32>,
}

pub static INTERNING_TABLE: Lazy<Arc<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    pub fn get(&self, index: u32) -> Option<&'static str> {
        self.strings.read().values.get(index as usize).copied()
    }

    pub fn insert_if_absent(&self, string: &str) -> u32 {
        if let Some(index) = self.index_of(string) {
            return index;
        }

        let mut strings = self.strings.write();

        // Another thread may have inserted it between the read and the write
        if let Some(index) = strings.indices.get(string) {
            return *index;
        }

        let leaked: &'static str = Box::leak(string.to_owned().into_boxed_str());
        let index = strings.values.len() as u32;

        strings.values.push(leaked);
        strings.indices.insert(leaked, index);

        index
    }

    pub fn index_of(&self, string: &str) -> Option<u32> {
        self.strings.read().indices.get(string).copied()
    }
}

/// An index into the string interning table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        let index = INTERNING_TABLE.insert_if_absent(value);

        Self(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn value(&self) -> &'static str {
        // Symbols are only handed out by `new`, and strings are never removed
        // from the table
        INTERNING_TABLE.get(self.0).unwrap_or_default()
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

impl From<&str> for InternedSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let a = InternedSymbol::new("interning_is_stable");
        let b = InternedSymbol::new("interning_is_stable");

        assert_eq!(a, b);
        assert_eq!(a.value(), "interning_is_stable");
        assert_eq!(a.to_string(), "interning_is_stable");
    }

    #[test]
    fn interning_from_many_threads() {
        let symbols = std::thread::scope(|scope| {
            let handles = (0..8)
                .map(|_| scope.spawn(|| InternedSymbol::new("shared_between_threads")))
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert!(symbols.windows(2).all(|pair| pair[0] == pair[1]));
    }
}
