mod symbol;
mod values;

pub use symbol::Symbol;
pub use values::*;
pub(crate) use values::{read_lock, write_lock};
