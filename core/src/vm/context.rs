use std::sync::{Arc, RwLock};

use crate::rt::{OutputSink, StderrSink, StdoutSink};
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{ClassDef, ErrorValue, NativeFunction, RustFunction, Symbol, Val, read_lock, write_lock};

/// Fallback class for native methods available on every value.
pub const ANY_CLASS: &str = "Std::Value";

/// 协程调度入口：`go` 指令通过它把新协程交给运行时。
pub trait Spawn: Send + Sync {
    fn spawn(&self, callee: Val, args: Vec<Val>) -> Result<(), ErrorValue>;
}

/// 进程级共享环境。
///
/// - 全局变量表（所有协程共享，读多写少）；
/// - 用户定义类的注册表；
/// - 内建类型的原生方法表，按类名再按方法名索引；
/// - `print`/`println` 与错误报告使用的输出端。
///
/// 多个 VM 可以共享同一个环境，测试中每个用例各自创建一个以保持隔离。
pub struct Environment {
    globals: RwLock<FastHashMap<Symbol, Val>>,
    classes: RwLock<FastHashMap<Arc<str>, Arc<ClassDef>>>,
    methods: RwLock<FastHashMap<Arc<str>, FastHashMap<Symbol, Val>>>,
    stdout: Arc<dyn OutputSink>,
    stderr: Arc<dyn OutputSink>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("globals", &read_lock(&self.globals).len())
            .field("classes", &read_lock(&self.classes).len())
            .finish()
    }
}

impl Environment {
    /// 使用进程的 stdout/stderr 创建环境，并安装内核原生函数。
    pub fn new() -> Self {
        Self::with_sinks(Arc::new(StdoutSink), Arc::new(StderrSink))
    }

    pub fn with_sinks(stdout: Arc<dyn OutputSink>, stderr: Arc<dyn OutputSink>) -> Self {
        let env = Self {
            globals: RwLock::new(fast_hash_map_new()),
            classes: RwLock::new(fast_hash_map_new()),
            methods: RwLock::new(fast_hash_map_new()),
            stdout,
            stderr,
        };
        super::natives::install(&env);
        env
    }

    #[inline]
    pub fn global(&self, name: Symbol) -> Option<Val> {
        read_lock(&self.globals).get(&name).cloned()
    }

    /// 定义或覆盖全局变量；跨协程的并发写入由调用方自行同步。
    pub fn define_global(&self, name: Symbol, value: Val) -> Option<Val> {
        write_lock(&self.globals).insert(name, value)
    }

    pub fn define_native(&self, name: &str, func: RustFunction) {
        self.define_global(Symbol::intern(name), Val::from(NativeFunction::new(name, func)));
    }

    /// 注册用户类；同名类会被替换。
    pub fn register_class(&self, class: Arc<ClassDef>) {
        write_lock(&self.classes).insert(class.name.clone(), class);
    }

    pub fn class(&self, name: &str) -> Option<Arc<ClassDef>> {
        read_lock(&self.classes).get(name).cloned()
    }

    pub fn define_native_method(&self, class_name: &str, name: &str, func: RustFunction) {
        let qualified = format!("{class_name}#{name}");
        write_lock(&self.methods)
            .entry(Arc::from(class_name))
            .or_insert_with(fast_hash_map_new)
            .insert(Symbol::intern(name), Val::from(NativeFunction::new(qualified, func)));
    }

    /// 查找内建方法：先按接收者的类名，再退回到 `Std::Value`。
    pub fn native_method(&self, class_name: &str, name: Symbol) -> Option<Val> {
        let methods = read_lock(&self.methods);
        methods
            .get(class_name)
            .and_then(|table| table.get(&name))
            .or_else(|| methods.get(ANY_CLASS).and_then(|table| table.get(&name)))
            .cloned()
    }

    pub fn stdout(&self) -> &Arc<dyn OutputSink> {
        &self.stdout
    }

    pub fn stderr(&self) -> &Arc<dyn OutputSink> {
        &self.stderr
    }
}
