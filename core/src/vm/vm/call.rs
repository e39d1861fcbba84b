use std::sync::Arc;

use crate::error::Thrown;
use crate::val::{ClassDef, ErrorKind, ErrorValue, Object, Symbol, Val};

use super::{MAX_HOST_DEPTH, Vm};
use super::frame::ReturnTo;

impl Vm {
    /// Calls `callee` from Rust and runs it to completion on this
    /// coroutine's stack. Natives use this to call back into the program.
    ///
    /// Each such call nests a run loop on the Rust stack, so the nesting is
    /// capped separately from `max_call_depth`.
    pub fn call(&mut self, callee: &Val, receiver: Val, args: &[Val]) -> Result<Val, Thrown> {
        if self.host_depth >= MAX_HOST_DEPTH {
            let err = ErrorValue::new(
                ErrorKind::StackOverflowError,
                format!("stack level too deep ({} nested native calls)", self.host_depth),
            );
            return Err(self.attach_trace(err.into()));
        }
        self.host_depth += 1;
        let result = self.call_nested(callee, receiver, args);
        self.host_depth -= 1;
        result.map_err(|thrown| self.attach_trace(thrown))
    }

    fn call_nested(&mut self, callee: &Val, receiver: Val, args: &[Val]) -> Result<Val, Thrown> {
        match callee {
            Val::Closure(closure) => match self.push_frame(closure.clone(), receiver, args, ReturnTo::Host) {
                Ok(()) => self.run(),
                Err(err) => Err(err),
            },
            Val::Native(native) => (native.func)(self, &receiver, args),
            Val::Class(class) => {
                let object = new_object(class);
                match class.lookup_method(init_symbol()) {
                    Some(init) => self.call(&init, object.clone(), args).map(|_| object),
                    None if !args.is_empty() => Err(ErrorValue::argument_count(args.len(), 0).into()),
                    None => Ok(object),
                }
            }
            other => Err(ErrorValue::no_method("call", other).into()),
        }
    }

    /// Calls from inside the run loop. Closures get a new frame that returns
    /// into absolute register `slot`; everything else completes at once.
    pub(super) fn invoke(&mut self, callee: Val, receiver: Val, args: Vec<Val>, slot: usize) -> Result<(), Thrown> {
        match callee {
            Val::Closure(closure) => self.push_frame(closure, receiver, &args, ReturnTo::Register(slot)),
            Val::Native(native) => {
                let value = (native.func)(self, &receiver, &args)?;
                self.regs[slot] = value;
                Ok(())
            }
            Val::Class(class) => {
                let object = new_object(&class);
                match class.lookup_method(init_symbol()) {
                    Some(Val::Closure(init)) => {
                        self.push_frame(init, object.clone(), &args, ReturnTo::Replace(slot, object))
                    }
                    Some(init) => {
                        self.call(&init, object.clone(), &args)?;
                        self.regs[slot] = object;
                        Ok(())
                    }
                    None if !args.is_empty() => Err(ErrorValue::argument_count(args.len(), 0).into()),
                    None => {
                        self.regs[slot] = object;
                        Ok(())
                    }
                }
            }
            other => Err(ErrorValue::no_method("call", &other).into()),
        }
    }

    /// Method lookup: the object's class chain first, then the native
    /// methods of the receiver's built-in class.
    pub fn find_method(&self, receiver: &Val, name: Symbol) -> Option<Val> {
        if let Val::Object(obj) = receiver
            && let Some(method) = obj.class.lookup_method(name)
        {
            return Some(method);
        }
        self.env.native_method(receiver.class_name(), name)
    }

    /// `receiver.name(args...)` from Rust.
    pub fn call_method(&mut self, receiver: &Val, name: &str, args: &[Val]) -> Result<Val, Thrown> {
        let name = Symbol::intern(name);
        let Some(method) = self.find_method(receiver, name) else {
            return Err(self.attach_trace(ErrorValue::no_method(name.name(), receiver).into()));
        };
        self.call(&method, receiver.clone(), args)
    }
}

fn init_symbol() -> Symbol {
    Symbol::intern("init")
}

fn new_object(class: &Arc<ClassDef>) -> Val {
    Val::Object(Arc::new(Object::new(class.clone())))
}
