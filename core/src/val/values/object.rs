use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::Symbol;

use super::Val;

/// User-defined class. Methods are closures or native functions; lookups
/// walk the superclass chain.
pub struct ClassDef {
    pub name: Arc<str>,
    pub superclass: Option<Arc<ClassDef>>,
    methods: RwLock<FastHashMap<Symbol, Val>>,
}

impl ClassDef {
    pub fn new(name: impl Into<Arc<str>>, superclass: Option<Arc<ClassDef>>) -> Self {
        Self {
            name: name.into(),
            superclass,
            methods: RwLock::new(fast_hash_map_new()),
        }
    }

    pub fn define_method(&self, name: Symbol, method: Val) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, method);
    }

    pub fn lookup_method(&self, name: Symbol) -> Option<Val> {
        let mut class = Some(self);
        while let Some(current) = class {
            let found = current
                .methods
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&name)
                .cloned();
            if found.is_some() {
                return found;
            }
            class = current.superclass.as_deref();
        }
        None
    }

    pub fn is_subclass_of(&self, class_name: &str) -> bool {
        let mut class = Some(self);
        while let Some(current) = class {
            if current.name.as_ref() == class_name {
                return true;
            }
            class = current.superclass.as_deref();
        }
        false
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|c| c.name.clone()))
            .finish()
    }
}

/// Instance of a user-defined class with its own instance-variable storage.
pub struct Object {
    pub class: Arc<ClassDef>,
    ivars: RwLock<FastHashMap<Symbol, Val>>,
}

impl Object {
    pub fn new(class: Arc<ClassDef>) -> Self {
        Self {
            class,
            ivars: RwLock::new(fast_hash_map_new()),
        }
    }

    pub fn ivar(&self, name: Symbol) -> Val {
        self.ivars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
            .unwrap_or(Val::Nil)
    }

    pub fn set_ivar(&self, name: Symbol, value: Val) {
        self.ivars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
    }

    /// Instance variables sorted by name, for stable `inspect` output.
    pub fn ivars_sorted(&self) -> Vec<(Arc<str>, Val)> {
        let ivars = self.ivars.read().unwrap_or_else(PoisonError::into_inner);
        let mut pairs: Vec<(Arc<str>, Val)> = ivars.iter().map(|(k, v)| (k.name(), v.clone())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

// Instance variables may point back at the object; keep Debug shallow.
impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object").field("class", &self.class.name).finish()
    }
}
