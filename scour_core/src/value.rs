use serde::Serialize;
use starlark::values::dict::AllocDict;
use starlark::values::float::StarlarkFloat;
use starlark::values::list::{AllocList, ListRef};
use starlark::values::tuple::TupleRef;
use starlark::values::{Heap, Value, ValueLike};
use std::fmt;

/// A value crossing the boundary between the harness and a script function.
///
/// Arguments are built as `ScriptValue`s and allocated onto a fresh script heap per call;
/// results are copied back out so that nothing outlives the call's heap. Lists and tuples
/// are materialized recursively; any other script value is kept only as its `repr`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScriptValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ScriptValue>),
    /// Named columns, allocated as a dict of lists (a one-column "data frame").
    Table(Vec<(String, Vec<ScriptValue>)>),
    /// A script value with no host-side counterpart, kept as its `repr`.
    Opaque(String),
}

impl ScriptValue {
    pub fn str(value: impl Into<String>) -> Self {
        ScriptValue::Str(value.into())
    }

    pub fn floats(values: &[f64]) -> Self {
        ScriptValue::List(values.iter().copied().map(ScriptValue::Float).collect())
    }

    pub fn ints(values: &[i64]) -> Self {
        ScriptValue::List(values.iter().copied().map(ScriptValue::Int).collect())
    }

    /// Number of elements for sequences, tables (rows of the first column) and strings.
    pub fn len(&self) -> Option<usize> {
        match self {
            ScriptValue::List(items) => Some(items.len()),
            ScriptValue::Str(s) => Some(s.chars().count()),
            ScriptValue::Table(columns) => Some(columns.first().map_or(0, |(_, col)| col.len())),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn as_list(&self) -> Option<&[ScriptValue]> {
        match self {
            ScriptValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ScriptValue::Float(f) => Some(*f),
            ScriptValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Allocates this value onto `heap`.
    pub fn alloc<'v>(&self, heap: &'v Heap) -> Value<'v> {
        match self {
            ScriptValue::None => Value::new_none(),
            ScriptValue::Bool(b) => Value::new_bool(*b),
            ScriptValue::Int(i) => heap.alloc(*i),
            ScriptValue::Float(f) => heap.alloc(*f),
            ScriptValue::Str(s) => heap.alloc(s.as_str()),
            ScriptValue::List(items) => alloc_list(items, heap),
            ScriptValue::Table(columns) => heap.alloc(AllocDict(
                columns
                    .iter()
                    .map(|(name, column)| (name.as_str(), alloc_list(column, heap))),
            )),
            ScriptValue::Opaque(repr) => heap.alloc(repr.as_str()),
        }
    }

    /// Copies a script value out of its heap.
    pub fn from_value(value: Value<'_>) -> Self {
        if value.is_none() {
            ScriptValue::None
        } else if let Some(b) = value.unpack_bool() {
            ScriptValue::Bool(b)
        } else if let Some(i) = value.unpack_i32() {
            ScriptValue::Int(i64::from(i))
        } else if let Some(f) = value.downcast_ref::<StarlarkFloat>() {
            ScriptValue::Float(f.0)
        } else if let Some(s) = value.unpack_str() {
            ScriptValue::Str(s.to_owned())
        } else if let Some(list) = ListRef::from_value(value) {
            ScriptValue::List(list.content().iter().map(|v| Self::from_value(*v)).collect())
        } else if let Some(tuple) = TupleRef::from_value(value) {
            ScriptValue::List(tuple.content().iter().map(|v| Self::from_value(*v)).collect())
        } else {
            ScriptValue::Opaque(value.to_repr())
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>, nested: bool) -> fmt::Result {
        match self {
            ScriptValue::None => f.write_str("None"),
            ScriptValue::Bool(true) => f.write_str("True"),
            ScriptValue::Bool(false) => f.write_str("False"),
            ScriptValue::Int(i) => write!(f, "{i}"),
            ScriptValue::Float(x) => f.write_str(&python_float(*x)),
            ScriptValue::Str(s) if nested => f.write_str(&python_repr(s)),
            ScriptValue::Str(s) => f.write_str(s),
            ScriptValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_nested(f, true)?;
                }
                f.write_str("]")
            }
            ScriptValue::Table(columns) => {
                f.write_str("{")?;
                for (i, (name, column)) in columns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: ", python_repr(name))?;
                    ScriptValue::List(column.clone()).fmt_nested(f, true)?;
                }
                f.write_str("}")
            }
            ScriptValue::Opaque(repr) => f.write_str(repr),
        }
    }
}

fn alloc_list<'v>(items: &[ScriptValue], heap: &'v Heap) -> Value<'v> {
    let values: Vec<Value<'v>> = items.iter().map(|item| item.alloc(heap)).collect();
    heap.alloc(AllocList(values))
}

/// Formats a float the way Python's `repr(float)` does: exponent form below `1e-4` and
/// from `1e16` up, with a signed exponent of at least two digits.
fn python_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let sci = format!("{x:e}");
        let (mantissa, exponent) = sci.split_once('e').unwrap_or((&sci, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    } else if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// Quotes a string like Python's `repr(str)`.
fn python_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_nested(f, false)
    }
}
