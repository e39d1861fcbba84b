//! Runtime pattern primitives used by `catch`, `switch` and destructuring.
//!
//! The compiler lowers source patterns into a [`Pattern`] tree stored in the
//! function's pattern table. Matching returns whether the value matched and
//! appends the registers to bind; nothing is written until the whole pattern
//! (guards aside) has matched.

use std::sync::Arc;

use regex::Regex;

use crate::error::Thrown;
use crate::op::{BinOp, lax_eq, strict_eq};
use crate::val::{Symbol, Val, read_lock};
use crate::vm::Reg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqKind {
    List,
    Tuple,
    /// Either a list or a tuple.
    Any,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    /// `_`
    Any,
    /// Binds the whole value.
    Bind(Reg),
    /// Strict `==` against a constant.
    Literal(Val),
    /// Lax `=~` against a constant, used for interpolated literals.
    LaxLiteral(Val),
    /// Strings (and chars) the regex finds a match in.
    Regex(Regex),
    /// Instances of the class or its subclasses.
    Instance(Arc<str>),
    /// `< 5`, `>= 1.5`, ...: the value on the left. Failing comparisons do
    /// not match.
    Relational(BinOp, Val),
    /// `[a, b, *rest, z]`
    Sequence {
        kind: SeqKind,
        prefix: Vec<Pattern>,
        /// `Some(None)` is an anonymous rest, `Some(Some(r))` binds it as a list.
        rest: Option<Option<Reg>>,
        suffix: Vec<Pattern>,
    },
    /// Map or record with at least these keys.
    Map(Vec<(Val, Pattern)>),
    /// Object, optionally of a class, with instance variables matching.
    Object {
        class: Option<Arc<str>>,
        fields: Vec<(Symbol, Pattern)>,
    },
    /// `pattern => name`
    Capture(Reg, Box<Pattern>),
    /// `a | b`; the first matching alternative wins.
    Alt(Vec<Pattern>),
    /// `pattern if guard`; the guard is a closure prototype of the function,
    /// evaluated after the bindings are written.
    Guard(Box<Pattern>, u16),
}

/// Guard evaluator: receives the proto index and the bindings so far.
pub type GuardFn<'a> = dyn FnMut(u16, &[(Reg, Val)]) -> Result<bool, Thrown> + 'a;

pub fn match_value(
    pattern: &Pattern,
    value: &Val,
    binds: &mut Vec<(Reg, Val)>,
    guard: &mut GuardFn<'_>,
) -> Result<bool, Thrown> {
    let mark = binds.len();
    let matched = match_inner(pattern, value, binds, guard)?;
    if !matched {
        binds.truncate(mark);
    }
    Ok(matched)
}

fn match_inner(
    pattern: &Pattern,
    value: &Val,
    binds: &mut Vec<(Reg, Val)>,
    guard: &mut GuardFn<'_>,
) -> Result<bool, Thrown> {
    Ok(match pattern {
        Pattern::Any => true,
        Pattern::Bind(reg) => {
            binds.push((*reg, value.clone()));
            true
        }
        Pattern::Literal(lit) => strict_eq(value, lit),
        Pattern::LaxLiteral(lit) => lax_eq(value, lit),
        Pattern::Regex(re) => match value {
            Val::Str(s) => re.is_match(s),
            Val::Char(c) => re.is_match(c.encode_utf8(&mut [0; 4])),
            _ => false,
        },
        Pattern::Instance(class) => value.is_instance_of(class),
        Pattern::Relational(op, lit) => matches!(op.eval_vals(value, lit), Ok(Val::Bool(true))),
        Pattern::Sequence {
            kind,
            prefix,
            rest,
            suffix,
        } => {
            let items: Vec<Val> = match (kind, value) {
                (SeqKind::List | SeqKind::Any, Val::List(list)) => read_lock(list).clone(),
                (SeqKind::Tuple | SeqKind::Any, Val::Tuple(items)) => items.to_vec(),
                _ => return Ok(false),
            };
            let fixed = prefix.len() + suffix.len();
            let len_ok = if rest.is_some() { items.len() >= fixed } else { items.len() == fixed };
            if !len_ok {
                return Ok(false);
            }
            for (p, v) in prefix.iter().zip(&items) {
                if !match_value(p, v, binds, guard)? {
                    return Ok(false);
                }
            }
            let tail_start = items.len() - suffix.len();
            for (p, v) in suffix.iter().zip(&items[tail_start..]) {
                if !match_value(p, v, binds, guard)? {
                    return Ok(false);
                }
            }
            if let Some(Some(reg)) = rest {
                binds.push((*reg, Val::list(items[prefix.len()..tail_start].to_vec())));
            }
            true
        }
        Pattern::Map(entries) => {
            for (key, p) in entries {
                let found = match value {
                    Val::Map(map) => read_lock(map).get(key).cloned(),
                    Val::Record(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
                    _ => return Ok(false),
                };
                let Some(found) = found else {
                    return Ok(false);
                };
                if !match_value(p, &found, binds, guard)? {
                    return Ok(false);
                }
            }
            // An empty map pattern still requires a map-like value.
            matches!(value, Val::Map(_) | Val::Record(_))
        }
        Pattern::Object { class, fields } => {
            let Val::Object(obj) = value else {
                return Ok(false);
            };
            if class.as_deref().is_some_and(|class| !value.is_instance_of(class)) {
                return Ok(false);
            }
            for (name, p) in fields {
                if !match_value(p, &obj.ivar(*name), binds, guard)? {
                    return Ok(false);
                }
            }
            true
        }
        Pattern::Capture(reg, inner) => {
            if !match_value(inner, value, binds, guard)? {
                return Ok(false);
            }
            binds.push((*reg, value.clone()));
            true
        }
        Pattern::Alt(alternatives) => {
            for alt in alternatives {
                if match_value(alt, value, binds, guard)? {
                    return Ok(true);
                }
            }
            false
        }
        Pattern::Guard(inner, proto) => match_value(inner, value, binds, guard)? && guard(*proto, binds)?,
    })
}
