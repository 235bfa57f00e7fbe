//! String interning for tag keys, values and roles.
//!
//! Aggregate maps never own tag text; they hold compact [`Symbol`] handles
//! into an arena that lives as long as the aggregator. Identical text always
//! maps to an identical handle, so symbols hash and compare with the default
//! machinery.

use rustc_hash::FxHashMap;

/// Opaque handle to an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena-backed string interner.
#[derive(Debug, Default)]
pub struct Interner {
    lookup: FxHashMap<Box<str>, Symbol>,
    strings: Vec<Box<str>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning a stable handle.
    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(&sym) = self.lookup.get(text) {
            return sym;
        }
        let sym = Symbol(self.strings.len() as u32);
        let owned: Box<str> = text.into();
        self.strings.push(owned.clone());
        self.lookup.insert(owned, sym);
        sym
    }

    /// Intern the combined `key=value` form of a tag.
    pub fn intern_tag(&mut self, key: &str, value: &str) -> Symbol {
        let mut text = String::with_capacity(key.len() + value.len() + 1);
        text.push_str(key);
        text.push('=');
        text.push_str(value);
        self.intern(&text)
    }

    /// Resolve a handle back to its text.
    ///
    /// Panics if the symbol was not produced by this interner.
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.index()]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Approximate memory held by the arena, for capacity diagnostics.
    pub fn used_memory(&self) -> usize {
        let text: usize = self.strings.iter().map(|s| s.len()).sum();
        // Each string is stored twice (arena + lookup key) plus map overhead.
        text * 2
            + self.strings.capacity() * std::mem::size_of::<Box<str>>()
            + self.lookup.capacity()
                * (std::mem::size_of::<Box<str>>() + std::mem::size_of::<Symbol>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_stable() {
        let mut interner = Interner::new();
        let a = interner.intern("highway");
        let b = interner.intern("name");
        let c = interner.intern("highway");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "highway");
        assert_eq!(interner.resolve(b), "name");
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_intern_tag() {
        let mut interner = Interner::new();
        let kv = interner.intern_tag("highway", "primary");
        assert_eq!(interner.resolve(kv), "highway=primary");
        assert_eq!(interner.intern("highway=primary"), kv);
    }

    #[test]
    fn test_empty_string_is_valid() {
        let mut interner = Interner::new();
        let empty = interner.intern("");
        assert_eq!(interner.resolve(empty), "");
        assert_eq!(interner.intern(""), empty);
    }
}
