//! Predefined template functions.

use std::cmp::Ordering;
use std::fmt::Write as _;

use super::value::{format_exponent, format_fixed, format_float, format_general, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Func {
    And,
    Or,
    Not,
    Len,
    Index,
    Print,
    Printf,
    Println,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Html,
    Urlquery,
}

impl Func {
    pub(super) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "and" => Func::And,
            "or" => Func::Or,
            "not" => Func::Not,
            "len" => Func::Len,
            "index" => Func::Index,
            "print" => Func::Print,
            "printf" => Func::Printf,
            "println" => Func::Println,
            "eq" => Func::Eq,
            "ne" => Func::Ne,
            "lt" => Func::Lt,
            "le" => Func::Le,
            "gt" => Func::Gt,
            "ge" => Func::Ge,
            "html" => Func::Html,
            "urlquery" => Func::Urlquery,
            _ => return None,
        })
    }

    pub(super) fn name(self) -> &'static str {
        match self {
            Func::And => "and",
            Func::Or => "or",
            Func::Not => "not",
            Func::Len => "len",
            Func::Index => "index",
            Func::Print => "print",
            Func::Printf => "printf",
            Func::Println => "println",
            Func::Eq => "eq",
            Func::Ne => "ne",
            Func::Lt => "lt",
            Func::Le => "le",
            Func::Gt => "gt",
            Func::Ge => "ge",
            Func::Html => "html",
            Func::Urlquery => "urlquery",
        }
    }
}

/// Call `func` with evaluated arguments. `and` and `or` are normally
/// short-circuited by the executor; here they see every argument.
pub(super) fn call(func: Func, args: Vec<Value>) -> Result<Value, String> {
    let value = match func {
        Func::And | Func::Or => {
            let want = func == Func::Or;
            let count = args.len();
            let mut args = args.into_iter();
            let mut last = args
                .next()
                .ok_or_else(|| arity(func, 1, count))?;
            for arg in args {
                if last.is_true() == want {
                    break;
                }
                last = arg;
            }
            last
        }
        Func::Not => {
            let [value] = exactly(func, args)?;
            Value::Bool(!value.is_true())
        }
        Func::Len => {
            let [value] = exactly(func, args)?;
            Value::Int(len(&value)?)
        }
        Func::Index => index(args)?,
        Func::Print => Value::Str(sprint(&args)),
        Func::Printf => {
            let (format, rest) = args
                .split_first()
                .ok_or_else(|| arity(func, 1, 0))?;
            let Value::Str(format) = format else {
                return Err(format!(
                    "wrong type for value; expected string; got {}",
                    format.type_name()
                ));
            };
            Value::Str(sprintf(format, rest))
        }
        Func::Println => Value::Str(sprintln(&args)),
        Func::Eq => {
            let (first, rest) = args
                .split_first()
                .ok_or("missing argument for comparison")?;
            if rest.is_empty() {
                return Err("missing argument for comparison".to_string());
            }
            let mut truth = false;
            for other in rest {
                if equal(first, other)? {
                    truth = true;
                    break;
                }
            }
            Value::Bool(truth)
        }
        Func::Ne => {
            let [a, b] = exactly(func, args)?;
            Value::Bool(!equal(&a, &b)?)
        }
        Func::Lt | Func::Le | Func::Gt | Func::Ge => {
            let [a, b] = exactly(func, args)?;
            let ordering = compare(&a, &b)?;
            Value::Bool(match func {
                Func::Lt => ordering == Ordering::Less,
                Func::Le => ordering != Ordering::Greater,
                Func::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        Func::Html => Value::Str(html_escape(&sprint(&args))),
        Func::Urlquery => Value::Str(query_escape(&sprint(&args))),
    };
    Ok(value)
}

fn arity(func: Func, want: usize, got: usize) -> String {
    format!("wrong number of args for {}: want {want} got {got}", func.name())
}

fn exactly<const N: usize>(func: Func, args: Vec<Value>) -> Result<[Value; N], String> {
    <[Value; N]>::try_from(args).map_err(|args| arity(func, N, args.len()))
}

fn len(value: &Value) -> Result<i64, String> {
    let n = match value {
        Value::Str(s) => s.len(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::Missing | Value::Nil => return Err("len of nil pointer".to_string()),
        other => return Err(format!("len of type {}", other.type_name())),
    };
    Ok(i64::try_from(n).unwrap_or(i64::MAX))
}

fn index(args: Vec<Value>) -> Result<Value, String> {
    let mut args = args.into_iter();
    let mut item = args
        .next()
        .ok_or_else(|| arity(Func::Index, 1, 0))?;
    for key in args {
        item = match (item, key) {
            (Value::Missing | Value::Nil, _) => return Err("index of untyped nil".to_string()),
            (Value::List(mut items), Value::Int(i)) => {
                let at = position(i, items.len())?;
                items.swap_remove(at)
            }
            (Value::Str(s), Value::Int(i)) => {
                let at = position(i, s.len())?;
                Value::Int(i64::from(s.as_bytes()[at]))
            }
            (Value::List(_), key) => {
                return Err(format!(
                    "cannot index slice/array with type {}",
                    key.type_name()
                ));
            }
            (Value::Str(_), key) => {
                return Err(format!("cannot index string with type {}", key.type_name()));
            }
            (Value::Map(mut map), Value::Str(key)) => map.remove(&key).unwrap_or(Value::Missing),
            (Value::Map(_), key) => {
                return Err(format!(
                    "value has type {}; should be string",
                    key.type_name()
                ));
            }
            (other, _) => {
                return Err(format!("can't index item of type {}", other.type_name()));
            }
        };
    }
    Ok(item)
}

fn position(i: i64, len: usize) -> Result<usize, String> {
    usize::try_from(i)
        .ok()
        .filter(|&at| at < len)
        .ok_or_else(|| format!("index out of range: {i}"))
}

/// Equality for `eq` and `ne`: nils only equal nils, numbers only compare
/// within the same kind.
fn equal(a: &Value, b: &Value) -> Result<bool, String> {
    Ok(match (a, b) {
        (Value::Missing | Value::Nil, Value::Missing | Value::Nil) => true,
        (Value::Missing | Value::Nil, _) | (_, Value::Missing | Value::Nil) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (composite @ (Value::List(_) | Value::Map(_)), _)
        | (_, composite @ (Value::List(_) | Value::Map(_))) => {
            return Err(format!("non-comparable type {}", composite.type_name()));
        }
        _ => return Err("incompatible types for comparison".to_string()),
    })
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, String> {
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (
            Value::Int(_) | Value::Float(_) | Value::Str(_),
            Value::Int(_) | Value::Float(_) | Value::Str(_),
        ) => {
            return Err("incompatible types for comparison".to_string());
        }
        _ => return Err("invalid type for comparison".to_string()),
    };
    Ok(ordering)
}

/// Operands are separated by a space when neither side is a string.
pub(super) fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !matches!(arg, Value::Str(_)) && !matches!(args[i - 1], Value::Str(_)) {
            out.push(' ');
        }
        let _ = write!(out, "{arg}");
    }
    out
}

fn sprintln(args: &[Value]) -> String {
    let mut out = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    out
}

#[derive(Debug, Default)]
struct Spec {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut used = 0;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        spec.width = digits(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(digits(&mut chars).unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(used) else {
            let _ = write!(out, "%!{verb}(MISSING)");
            continue;
        };
        used += 1;
        out.push_str(&format_arg(verb, &spec, arg));
    }

    if let Some(extra) = args.get(used..).filter(|extra| !extra.is_empty()) {
        let described: Vec<String> = extra.iter().map(describe).collect();
        let _ = write!(out, "%!(EXTRA {})", described.join(", "));
    }
    out
}

fn digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        chars.next();
        n = Some(n.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
    }
    n
}

fn describe(value: &Value) -> String {
    match value {
        Value::Missing | Value::Nil => "<nil>".to_string(),
        other => format!("{}={other}", other.type_name()),
    }
}

fn bad_verb(verb: char, value: &Value) -> String {
    format!("%!{verb}({})", describe(value))
}

fn format_arg(verb: char, spec: &Spec, arg: &Value) -> String {
    let text = match (verb, arg) {
        ('v', value) => value.to_string(),
        ('s', Value::Str(s)) => match spec.precision {
            Some(precision) => s.chars().take(precision).collect(),
            None => s.clone(),
        },
        ('s', value @ (Value::List(_) | Value::Map(_))) => value.to_string(),
        ('q', Value::Str(s)) => format!("{s:?}"),
        ('q', Value::Int(i)) => match u32::try_from(*i).ok().and_then(char::from_u32) {
            Some(c) => format!("{c:?}"),
            None => bad_verb(verb, arg),
        },
        ('t', Value::Bool(b)) => b.to_string(),
        ('d', Value::Int(i)) => i.to_string(),
        ('c', Value::Int(i)) => u32::try_from(*i)
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string(),
        ('x', Value::Int(i)) => signed_radix(*i, |n| format!("{n:x}")),
        ('X', Value::Int(i)) => signed_radix(*i, |n| format!("{n:X}")),
        ('o', Value::Int(i)) => signed_radix(*i, |n| format!("{n:o}")),
        ('b', Value::Int(i)) => signed_radix(*i, |n| format!("{n:b}")),
        ('x', Value::Str(s)) => s.bytes().map(|b| format!("{b:02x}")).collect(),
        ('X', Value::Str(s)) => s.bytes().map(|b| format!("{b:02X}")).collect(),
        ('f' | 'F', Value::Float(x)) => format_fixed(*x, spec.precision.unwrap_or(6)),
        ('e', Value::Float(x)) => format_exponent(*x, spec.precision.unwrap_or(6), false),
        ('E', Value::Float(x)) => format_exponent(*x, spec.precision.unwrap_or(6), true),
        ('g', Value::Float(x)) => match spec.precision {
            Some(digits) => format_general(*x, digits, false),
            None => format_float(*x),
        },
        ('G', Value::Float(x)) => match spec.precision {
            Some(digits) => format_general(*x, digits, true),
            None => format_float(*x).to_uppercase(),
        },
        _ => return pad(spec, bad_verb(verb, arg), false),
    };

    let numeric = arg.is_numeric() && verb != 'c' && verb != 'q';
    let text = if numeric && !text.starts_with('-') {
        if spec.plus {
            format!("+{text}")
        } else if spec.space {
            format!(" {text}")
        } else {
            text
        }
    } else {
        text
    };
    pad(spec, text, numeric)
}

fn signed_radix(i: i64, render: impl Fn(u64) -> String) -> String {
    let digits = render(i.unsigned_abs());
    if i < 0 {
        format!("-{digits}")
    } else {
        digits
    }
}

fn pad(spec: &Spec, text: String, numeric: bool) -> String {
    let len = text.chars().count();
    let Some(fill) = spec.width.and_then(|width| width.checked_sub(len)) else {
        return text;
    };
    if fill == 0 {
        return text;
    }
    if spec.minus {
        return format!("{text}{}", " ".repeat(fill));
    }
    if spec.zero && numeric {
        let sign_len = usize::from(text.starts_with(['-', '+', ' ']));
        let (sign, digits) = text.split_at(sign_len);
        return format!("{sign}{}{digits}", "0".repeat(fill));
    }
    format!("{}{text}", " ".repeat(fill))
}

/// Escape text for safe inclusion in HTML.
pub(super) fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            '\0' => out.push(char::REPLACEMENT_CHARACTER),
            c => out.push(c),
        }
    }
    out
}

/// Escape text for use as a URL query component.
pub(super) fn query_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for b in text.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(b));
            }
            b' ' => out.push('+'),
            b => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::Str(text.to_string())
    }

    #[test]
    fn print_spaces_only_between_non_strings() {
        let args = [Value::Int(1), Value::Int(2), s("x"), Value::Int(3)];
        assert_eq!(sprint(&args), "1 2x3");
        assert_eq!(sprintln(&args), "1 2 x 3\n");
    }

    #[test]
    fn printf_verbs_and_flags() {
        assert_eq!(sprintf("%5.2f|%-4d|%04d", &[Value::Float(3.14159), Value::Int(7), Value::Int(-5)]), " 3.14|7   |-005");
        assert_eq!(sprintf("%s=%q", &[s("a"), s("b\n")]), "a=\"b\\n\"");
        assert_eq!(sprintf("%x %X %c", &[Value::Int(255), s("hi"), Value::Int(65)]), "ff 6869 A");
        assert_eq!(sprintf("%+d %v %t", &[Value::Int(3), Value::Float(2.5), Value::Bool(true)]), "+3 2.5 true");
        assert_eq!(sprintf("%e %g", &[Value::Float(1500.0), Value::Float(1e21)]), "1.500000e+03 1e+21");
        assert_eq!(sprintf("100%%", &[]), "100%");
    }

    #[test]
    fn printf_reports_mismatches_inline() {
        assert_eq!(sprintf("%d", &[Value::Float(41.0)]), "%!d(float64=41)");
        assert_eq!(sprintf("%s %s", &[s("a")]), "a %!s(MISSING)");
        assert_eq!(sprintf("%s", &[s("a"), Value::Int(1), Value::Nil]), "a%!(EXTRA int=1, <nil>)");
        assert_eq!(sprintf("%s", &[Value::Nil]), "%!s(<nil>)");
    }

    #[test]
    fn comparisons_follow_kinds() {
        assert_eq!(call(Func::Eq, vec![s("a"), s("b"), s("a")]), Ok(Value::Bool(true)));
        assert_eq!(call(Func::Eq, vec![Value::Missing, Value::Nil]), Ok(Value::Bool(true)));
        assert_eq!(call(Func::Eq, vec![Value::Nil, Value::Int(0)]), Ok(Value::Bool(false)));
        assert_eq!(
            call(Func::Eq, vec![Value::Float(1.0), Value::Int(1)]),
            Err("incompatible types for comparison".to_string())
        );
        assert!(call(Func::Eq, vec![Value::List(Vec::new()), Value::Int(1)]).is_err());
        assert!(call(Func::Eq, vec![s("a")]).is_err());
        assert_eq!(call(Func::Lt, vec![Value::Float(1.0), Value::Float(2.0)]), Ok(Value::Bool(true)));
        assert_eq!(call(Func::Ge, vec![s("b"), s("a")]), Ok(Value::Bool(true)));
        assert_eq!(
            call(Func::Lt, vec![Value::Bool(true), Value::Bool(false)]),
            Err("invalid type for comparison".to_string())
        );
    }

    #[test]
    fn index_and_len() {
        let list = Value::List(vec![s("a"), s("b")]);
        assert_eq!(call(Func::Index, vec![list.clone(), Value::Int(1)]), Ok(s("b")));
        assert_eq!(
            call(Func::Index, vec![list.clone(), Value::Int(2)]),
            Err("index out of range: 2".to_string())
        );
        assert!(call(Func::Index, vec![list.clone(), Value::Float(0.0)]).is_err());
        assert_eq!(call(Func::Index, vec![s("A"), Value::Int(0)]), Ok(Value::Int(65)));
        let map = Value::Map([("k".to_string(), list.clone())].into_iter().collect());
        assert_eq!(call(Func::Index, vec![map.clone(), s("k"), Value::Int(0)]), Ok(s("a")));
        assert_eq!(call(Func::Index, vec![map.clone(), s("x")]), Ok(Value::Missing));
        assert_eq!(call(Func::Len, vec![list]), Ok(Value::Int(2)));
        assert_eq!(call(Func::Len, vec![s("héllo")]), Ok(Value::Int(6)));
        assert!(call(Func::Len, vec![Value::Float(3.0)]).is_err());
        assert!(call(Func::Len, vec![s("a"), s("b")]).is_err());
    }

    #[test]
    fn logic_returns_deciding_operand() {
        assert_eq!(call(Func::And, vec![Value::Int(1), s(""), Value::Int(2)]), Ok(s("")));
        assert_eq!(call(Func::Or, vec![s(""), Value::Int(0), s("x")]), Ok(s("x")));
        assert_eq!(call(Func::Not, vec![Value::Missing]), Ok(Value::Bool(true)));
    }

    #[test]
    fn escapers() {
        assert_eq!(html_escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&#34;x&#34;&gt;&#39;&amp;&#39;&lt;/a&gt;");
        assert_eq!(query_escape("a b&c=d/é"), "a+b%26c%3Dd%2F%C3%A9");
    }
}
