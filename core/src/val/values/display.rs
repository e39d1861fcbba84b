//! `to_string` and `inspect` renderings.
//!
//! `Display` is what `println` writes: numeric suffixes are dropped and
//! strings print raw. `inspect` is the literal-like form used in error
//! messages and the REPL-style `inspect` native: `1i8`, `2.5bf`, `"str"`,
//! `` `c` ``, `:sym`. Containers always render their elements with
//! `inspect`. Self-referencing containers print `[...]` at the cycle.

use std::fmt::{self, Write};

use rust_decimal::Decimal;

use super::{Val, read_lock};

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        Printer::default().display(self, &mut out)?;
        f.write_str(&out)
    }
}

impl Val {
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = Printer::default().inspect(self, &mut out);
        out
    }
}

#[derive(Default)]
struct Printer {
    // Addresses of containers currently being printed.
    seen: Vec<usize>,
}

impl Printer {
    fn display(&mut self, val: &Val, out: &mut String) -> fmt::Result {
        match val {
            Val::Str(s) => out.write_str(s),
            Val::Char(c) => out.write_char(*c),
            Val::Symbol(s) => out.write_str(&s.name()),
            Val::Float64(f) => write_f64(*f, out),
            Val::Float32(f) => write_f32(*f, out),
            Val::BigFloat(d) => write_decimal(d, out),
            Val::Int8(_)
            | Val::Int16(_)
            | Val::Int32(_)
            | Val::Int64(_)
            | Val::UInt8(_)
            | Val::UInt16(_)
            | Val::UInt32(_)
            | Val::UInt64(_) => write_fixed(val, out),
            Val::Error(err) => write!(out, "{}", err.message),
            other => self.inspect(other, out),
        }
    }

    fn inspect(&mut self, val: &Val, out: &mut String) -> fmt::Result {
        match val {
            Val::Nil => out.write_str("nil"),
            Val::Bool(b) => out.write_str(if *b { "true" } else { "false" }),
            Val::SmallInt(i) => {
                let mut buf = itoa::Buffer::new();
                out.write_str(buf.format(*i))
            }
            Val::BigInt(i) => write!(out, "{i}"),
            Val::Float(f) => write_f64(*f, out),
            Val::BigFloat(d) => {
                write_decimal(d, out)?;
                out.write_str("bf")
            }
            Val::Float64(f) => {
                write_f64(*f, out)?;
                out.write_str("f64")
            }
            Val::Float32(f) => {
                write_f32(*f, out)?;
                out.write_str("f32")
            }
            Val::Int64(_) => suffixed(val, "i64", out),
            Val::Int32(_) => suffixed(val, "i32", out),
            Val::Int16(_) => suffixed(val, "i16", out),
            Val::Int8(_) => suffixed(val, "i8", out),
            Val::UInt64(_) => suffixed(val, "u64", out),
            Val::UInt32(_) => suffixed(val, "u32", out),
            Val::UInt16(_) => suffixed(val, "u16", out),
            Val::UInt8(_) => suffixed(val, "u8", out),
            Val::Char(c) => {
                out.write_char('`')?;
                out.write_char(*c)?;
                out.write_char('`')
            }
            Val::Str(s) => write_quoted(s, out),
            Val::Symbol(s) => write!(out, ":{s}"),
            Val::Tuple(items) => self.sequence("%[", items.iter(), out),
            Val::List(list) => {
                if !self.enter(val, out)? {
                    return Ok(());
                }
                let items = read_lock(list).clone();
                let res = self.sequence("[", items.iter(), out);
                self.seen.pop();
                res
            }
            Val::Set(set) => {
                if !self.enter(val, out)? {
                    return Ok(());
                }
                let mut items: Vec<(String, Val)> =
                    read_lock(set).iter().map(|v| (self.sort_key(v), v.clone())).collect();
                items.sort_by(|a, b| a.0.cmp(&b.0));
                let res = self.sequence("^[", items.iter().map(|(_, v)| v), out);
                self.seen.pop();
                res
            }
            Val::Map(map) => {
                if !self.enter(val, out)? {
                    return Ok(());
                }
                let mut keyed: Vec<(String, (Val, Val))> = read_lock(map)
                    .iter()
                    .map(|(k, v)| (self.sort_key(k), (k.clone(), v.clone())))
                    .collect();
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                let pairs: Vec<(Val, Val)> = keyed.into_iter().map(|(_, pair)| pair).collect();
                let res = self.pairs("{", &pairs, out);
                self.seen.pop();
                res
            }
            Val::Record(pairs) => self.pairs("%{", pairs, out),
            Val::Closure(c) => write!(out, "<Std::Closure {}>", c.func.name),
            Val::Native(n) => write!(out, "<Std::Function {}>", n.name),
            Val::Class(c) => out.write_str(&c.name),
            Val::Object(obj) => {
                if !self.enter(val, out)? {
                    return Ok(());
                }
                out.write_str(&obj.class.name)?;
                out.write_char('{')?;
                for (i, (name, value)) in obj.ivars_sorted().iter().enumerate() {
                    if i > 0 {
                        out.write_str(", ")?;
                    }
                    write!(out, "{name}: ")?;
                    self.inspect(value, out)?;
                }
                self.seen.pop();
                out.write_char('}')
            }
            Val::Error(err) => {
                write!(out, "{}{{message: ", err.kind.class_name())?;
                write_quoted(&err.message, out)?;
                out.write_char('}')
            }
        }
    }

    /// Pushes a container onto the cycle stack; prints `[...]` and returns
    /// false if it is already being printed.
    fn enter(&mut self, val: &Val, out: &mut String) -> Result<bool, fmt::Error> {
        let addr = val.ref_addr().unwrap_or_default();
        if self.seen.contains(&addr) {
            out.write_str("[...]")?;
            return Ok(false);
        }
        self.seen.push(addr);
        Ok(true)
    }

    // Hash containers print in a stable order.
    fn sort_key(&self, val: &Val) -> String {
        let mut nested = Printer { seen: self.seen.clone() };
        let mut key = String::new();
        let _ = nested.inspect(val, &mut key);
        key
    }

    fn sequence<'a>(&mut self, open: &str, items: impl Iterator<Item = &'a Val>, out: &mut String) -> fmt::Result {
        out.write_str(open)?;
        for (i, item) in items.enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            self.inspect(item, out)?;
        }
        out.write_char(']')
    }

    fn pairs(&mut self, open: &str, pairs: &[(Val, Val)], out: &mut String) -> fmt::Result {
        out.write_str(open)?;
        for (i, (key, value)) in pairs.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            match key {
                Val::Symbol(s) => write!(out, "{s}: ")?,
                other => {
                    self.inspect(other, out)?;
                    out.write_str(" => ")?;
                }
            }
            self.inspect(value, out)?;
        }
        out.write_char('}')
    }
}

fn suffixed(val: &Val, suffix: &str, out: &mut String) -> fmt::Result {
    write_fixed(val, out)?;
    out.write_str(suffix)
}

fn write_fixed(val: &Val, out: &mut String) -> fmt::Result {
    let mut buf = itoa::Buffer::new();
    let text = match *val {
        Val::Int64(i) => buf.format(i),
        Val::Int32(i) => buf.format(i),
        Val::Int16(i) => buf.format(i),
        Val::Int8(i) => buf.format(i),
        Val::UInt64(i) => buf.format(i),
        Val::UInt32(i) => buf.format(i),
        Val::UInt16(i) => buf.format(i),
        Val::UInt8(i) => buf.format(i),
        _ => return Err(fmt::Error),
    };
    out.write_str(text)
}

fn write_f64(f: f64, out: &mut String) -> fmt::Result {
    if f.is_nan() {
        return out.write_str("NaN");
    }
    if f.is_infinite() {
        return out.write_str(if f > 0.0 { "Inf" } else { "-Inf" });
    }
    let mut buf = ryu::Buffer::new();
    out.write_str(buf.format_finite(f))
}

fn write_f32(f: f32, out: &mut String) -> fmt::Result {
    if f.is_nan() {
        return out.write_str("NaN");
    }
    if f.is_infinite() {
        return out.write_str(if f > 0.0 { "Inf" } else { "-Inf" });
    }
    let mut buf = ryu::Buffer::new();
    out.write_str(buf.format_finite(f))
}

// Decimals always carry a fractional part when printed: `3.0bf`, not `3bf`.
fn write_decimal(d: &Decimal, out: &mut String) -> fmt::Result {
    let text = d.normalize().to_string();
    out.write_str(&text)?;
    if !text.contains('.') {
        out.write_str(".0")?;
    }
    Ok(())
}

fn write_quoted(s: &str, out: &mut String) -> fmt::Result {
    out.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\t' => out.write_str("\\t")?,
            '\r' => out.write_str("\\r")?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}
