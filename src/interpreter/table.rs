//! String interner and fixed-bucket symbol tables
//!
//! Identifiers are interned once and referred to by [`Symbol`] handles, so
//! identifier comparison is handle equality. Symbol tables are fixed-bucket
//! hash tables with separate chaining; bucket counts are chosen per use
//! site (globals 97, locals 11, struct members 11, string literals 97,
//! breakpoints 21) and never rehash. Every entry remembers its declaration
//! site so re-executed declarations can be recognized.

use std::hash::Hasher;

use rustc_hash::{FxHashMap, FxHasher};

/// Canonical handle for an interned string.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub u32);

impl Symbol {
    /// The dedicated sentinel for the empty string, registered first.
    pub const EMPTY: Symbol = Symbol(0);
}

/// Deduplicating string store. `register` returns the same [`Symbol`] for
/// equal character sequences regardless of call order.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: FxHashMap<Box<str>, Symbol>,
}

impl Interner {
    pub fn new() -> Self {
        let mut interner = Interner {
            strings: Vec::new(),
            lookup: FxHashMap::default(),
        };
        let empty = interner.register("");
        debug_assert_eq!(empty, Symbol::EMPTY);
        interner
    }

    pub fn register(&mut self, text: &str) -> Symbol {
        if let Some(&symbol) = self.lookup.get(text) {
            return symbol;
        }
        let symbol = Symbol(self.strings.len() as u32);
        self.strings.push(text.into());
        self.lookup.insert(text.into(), symbol);
        symbol
    }

    pub fn resolve(&self, symbol: Symbol) -> &str {
        &self.strings[symbol.0 as usize]
    }

    /// Look up without interning; `None` when the text was never registered.
    pub fn get(&self, text: &str) -> Option<Symbol> {
        self.lookup.get(text).copied()
    }
}

/// Where an entry was declared, for redefinition diagnostics and for the
/// same-site idempotence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclSite {
    pub file: Symbol,
    pub line: u32,
    pub column: u32,
}

impl DeclSite {
    pub const NONE: DeclSite = DeclSite {
        file: Symbol::EMPTY,
        line: 0,
        column: 0,
    };
}

#[derive(Debug, Clone)]
pub struct TableEntry<V> {
    pub key: Symbol,
    pub decl: DeclSite,
    pub value: V,
}

/// A fixed-bucket hash table with separate chaining.
#[derive(Debug, Clone)]
pub struct Table<V> {
    buckets: Vec<Vec<TableEntry<V>>>,
}

#[inline]
fn bucket_index(key: Symbol, buckets: usize) -> usize {
    let mut hasher = FxHasher::default();
    hasher.write_u32(key.0);
    (hasher.finish() as usize) % buckets
}

impl<V> Table<V> {
    pub fn new(buckets: usize) -> Self {
        Table {
            buckets: (0..buckets.max(1)).map(|_| Vec::new()).collect(),
        }
    }

    /// Insert a new entry. Fails (returning `false`) when the key is
    /// already present.
    pub fn set(&mut self, key: Symbol, value: V, decl: DeclSite) -> bool {
        let index = bucket_index(key, self.buckets.len());
        if self.buckets[index].iter().any(|entry| entry.key == key) {
            return false;
        }
        self.buckets[index].push(TableEntry { key, decl, value });
        true
    }

    pub fn get(&self, key: Symbol) -> Option<&TableEntry<V>> {
        let index = bucket_index(key, self.buckets.len());
        self.buckets[index].iter().find(|entry| entry.key == key)
    }

    pub fn get_mut(&mut self, key: Symbol) -> Option<&mut TableEntry<V>> {
        let index = bucket_index(key, self.buckets.len());
        self.buckets[index].iter_mut().find(|entry| entry.key == key)
    }

    pub fn delete(&mut self, key: Symbol) -> Option<V> {
        let index = bucket_index(key, self.buckets.len());
        let position = self.buckets[index].iter().position(|entry| entry.key == key)?;
        Some(self.buckets[index].swap_remove(position).value)
    }

    pub fn contains(&self, key: Symbol) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableEntry<V>> {
        self.buckets.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TableEntry<V>> {
        self.buckets.iter_mut().flatten()
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }
}
