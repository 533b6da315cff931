use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value as Json};

/// A value during template execution.
///
/// Decoded JSON numbers are always `Float`; `Int` only comes from integer
/// constants in the template source, `len`, `index` on strings and range
/// counters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    /// No value at all: an absent key or a `null` that left a pipeline.
    Missing,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub(crate) fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => n.as_f64().map_or(Value::Nil, Value::Float),
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::from_map(map),
        }
    }

    pub(crate) fn from_map(map: &Map<String, Json>) -> Self {
        Value::Map(
            map.iter()
                .map(|(key, value)| (key.clone(), Value::from_json(value)))
                .collect(),
        )
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Missing | Value::Nil => "<nil>",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float64",
            Value::Str(_) => "string",
            Value::List(_) => "[]interface {}",
            Value::Map(_) => "map[string]interface {}",
        }
    }

    /// Truth as seen by `if`, `with`, `and`, `or` and `not`: false, zero,
    /// nil and empty values are false.
    pub(crate) fn is_true(&self) -> bool {
        match self {
            Value::Missing | Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub(crate) fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }
}

/// The `%v` rendering: `<nil>`, `[a b]`, `map[k:v]`, shortest floats.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing | Value::Nil => f.write_str("<nil>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("map[")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Shortest representation; exponent form below 1e-4 and from 1e6 up.
pub(crate) fn format_float(x: f64) -> String {
    if let Some(special) = special_float(x) {
        return special;
    }
    let formatted = format!("{x:e}");
    let (mantissa, exp) = split_exponent(&formatted);
    if (-4..6).contains(&exp) {
        format!("{x}")
    } else {
        join_exponent(mantissa, exp, 'e')
    }
}

/// `%e` with `precision` digits after the point.
pub(crate) fn format_exponent(x: f64, precision: usize, upper: bool) -> String {
    if let Some(special) = special_float(x) {
        return special;
    }
    let formatted = format!("{x:.precision$e}");
    let (mantissa, exp) = split_exponent(&formatted);
    join_exponent(mantissa, exp, if upper { 'E' } else { 'e' })
}

/// `%f` with `precision` digits after the point.
pub(crate) fn format_fixed(x: f64, precision: usize) -> String {
    special_float(x).unwrap_or_else(|| format!("{x:.precision$}"))
}

/// `%g` with an explicit number of significant digits.
pub(crate) fn format_general(x: f64, digits: usize, upper: bool) -> String {
    if let Some(special) = special_float(x) {
        return special;
    }
    let digits = digits.max(1);
    let (_, exp) = split_exponent(&format!("{x:.prec$e}", prec = digits - 1));
    let digits = i32::try_from(digits).unwrap_or(i32::MAX);
    if exp < -4 || exp >= digits {
        let text = format_exponent(x, usize::try_from(digits - 1).unwrap_or(0), upper);
        let marker = if upper { 'E' } else { 'e' };
        match text.split_once(marker) {
            Some((mantissa, rest)) => format!("{}{marker}{rest}", trim_zeros(mantissa)),
            None => text,
        }
    } else {
        let decimals = usize::try_from(digits - 1 - exp).unwrap_or(0);
        trim_zeros(&format!("{x:.decimals$}")).to_string()
    }
}

fn special_float(x: f64) -> Option<String> {
    if x.is_nan() {
        Some("NaN".to_string())
    } else if x.is_infinite() {
        Some(if x > 0.0 { "+Inf" } else { "-Inf" }.to_string())
    } else {
        None
    }
}

fn split_exponent(sci: &str) -> (&str, i32) {
    match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse().unwrap_or(0)),
        None => (sci, 0),
    }
}

fn join_exponent(mantissa: &str, exp: i32, marker: char) -> String {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{marker}{sign}{:02}", exp.unsigned_abs())
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
