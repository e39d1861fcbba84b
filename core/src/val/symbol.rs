//! Process-wide symbol interner.
//!
//! Symbols are shared by every coroutine, so the table is a concurrent map
//! from name to id plus an append-only name list for the reverse lookup.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use once_cell::sync::Lazy;

struct Interner {
    ids: DashMap<Arc<str>, u32>,
    names: RwLock<Vec<Arc<str>>>,
}

static INTERNER: Lazy<Interner> = Lazy::new(|| Interner {
    ids: DashMap::new(),
    names: RwLock::new(Vec::new()),
});

/// Interned identifier. Comparing two symbols is an integer comparison.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn intern(name: &str) -> Self {
        if let Some(id) = INTERNER.ids.get(name) {
            return Symbol(*id);
        }
        let key: Arc<str> = Arc::from(name);
        let id = *INTERNER.ids.entry(key.clone()).or_insert_with(|| {
            let mut names = INTERNER.names.write().unwrap_or_else(PoisonError::into_inner);
            names.push(key);
            (names.len() - 1) as u32
        });
        Symbol(id)
    }

    pub fn name(self) -> Arc<str> {
        let names = INTERNER.names.read().unwrap_or_else(PoisonError::into_inner);
        names
            .get(self.0 as usize)
            .cloned()
            .expect("symbol id was not produced by the interner")
    }

    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::intern(name)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
