//! Parameter values and their textual wire form.
//!
//! Values travel as whitespace-separated tokens in index order:
//! - `int`: decimal
//! - `double`: decimal with an explicit point (`5.0`, `7.25`)
//! - `bool`: `true` / `false`
//! - `string`: bare when possible, otherwise double-quoted with `\"` and `\\`
//!   escapes

use crate::binding::{Binding, Storage};
use crate::descriptor::ParamType;
use crate::error::{ParamError, Result};

/// A typed, possibly multi-element parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(Vec<i64>),
    Double(Vec<f64>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

impl ParamValue {
    pub fn empty(ty: ParamType) -> Self {
        match ty {
            ParamType::Int => ParamValue::Int(Vec::new()),
            ParamType::Double => ParamValue::Double(Vec::new()),
            ParamType::Bool => ParamValue::Bool(Vec::new()),
            ParamType::String => ParamValue::String(Vec::new()),
        }
    }

    pub fn ty(&self) -> ParamType {
        match self {
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::Double(_) => ParamType::Double,
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::String(_) => ParamType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ParamValue::Int(v) => v.len(),
            ParamValue::Double(v) => v.len(),
            ParamValue::Bool(v) => v.len(),
            ParamValue::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire token for element `index`.
    pub fn token(&self, index: usize) -> Option<String> {
        match self {
            ParamValue::Int(v) => v.get(index).map(i64::to_string),
            ParamValue::Double(v) => v.get(index).map(|x| format_double(*x)),
            ParamValue::Bool(v) => v.get(index).map(bool::to_string),
            ParamValue::String(v) => v.get(index).map(|s| quote(s)),
        }
    }

    /// Element `index` as a single-element value.
    pub fn element(&self, index: usize) -> Option<ParamValue> {
        match self {
            ParamValue::Int(v) => v.get(index).map(|x| ParamValue::Int(vec![*x])),
            ParamValue::Double(v) => v.get(index).map(|x| ParamValue::Double(vec![*x])),
            ParamValue::Bool(v) => v.get(index).map(|x| ParamValue::Bool(vec![*x])),
            ParamValue::String(v) => v.get(index).map(|x| ParamValue::String(vec![x.clone()])),
        }
    }

    /// Copy of `self` with element `index` taken from the single-element `element`.
    pub(crate) fn with_element(&self, index: usize, element: &ParamValue) -> Option<ParamValue> {
        fn replace<T: Clone>(values: &[T], index: usize, with: &[T]) -> Option<Vec<T>> {
            let mut out = values.to_vec();
            *out.get_mut(index)? = with.first()?.clone();
            Some(out)
        }
        match (self, element) {
            (ParamValue::Int(v), ParamValue::Int(e)) => replace(v, index, e).map(ParamValue::Int),
            (ParamValue::Double(v), ParamValue::Double(e)) => {
                replace(v, index, e).map(ParamValue::Double)
            }
            (ParamValue::Bool(v), ParamValue::Bool(e)) => replace(v, index, e).map(ParamValue::Bool),
            (ParamValue::String(v), ParamValue::String(e)) => {
                replace(v, index, e).map(ParamValue::String)
            }
            _ => None,
        }
    }

    /// `len` copies of the first element of `self`.
    pub(crate) fn repeated(&self, len: usize) -> Option<ParamValue> {
        Some(match self {
            ParamValue::Int(v) => ParamValue::Int(vec![*v.first()?; len]),
            ParamValue::Double(v) => ParamValue::Double(vec![*v.first()?; len]),
            ParamValue::Bool(v) => ParamValue::Bool(vec![*v.first()?; len]),
            ParamValue::String(v) => ParamValue::String(vec![v.first()?.clone(); len]),
        })
    }

    /// Space-joined wire form. An empty value is the empty string.
    pub fn to_wire(&self) -> String {
        (0..self.len())
            .filter_map(|i| self.token(i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parse a whole wire string as a value of type `ty`.
    pub fn parse(ty: ParamType, text: &str) -> Result<Self> {
        Self::parse_tokens(ty, &tokenize(text)?)
    }

    /// Parse already-split tokens as a value of type `ty`.
    pub fn parse_tokens<S: AsRef<str>>(ty: ParamType, tokens: &[S]) -> Result<Self> {
        let tokens = tokens.iter().map(|t| t.as_ref());
        Ok(match ty {
            ParamType::Int => ParamValue::Int(tokens.map(parse_int).collect::<Result<_>>()?),
            ParamType::Double => {
                ParamValue::Double(tokens.map(parse_double).collect::<Result<_>>()?)
            }
            ParamType::Bool => ParamValue::Bool(tokens.map(parse_bool).collect::<Result<_>>()?),
            ParamType::String => ParamValue::String(tokens.map(str::to_string).collect()),
        })
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

macro_rules! value_from {
    ($elem:ty, $variant:ident) => {
        impl From<$elem> for ParamValue {
            fn from(v: $elem) -> Self {
                ParamValue::$variant(vec![v.into()])
            }
        }

        impl From<Vec<$elem>> for ParamValue {
            fn from(v: Vec<$elem>) -> Self {
                ParamValue::$variant(v.into_iter().map(Into::into).collect())
            }
        }
    };
}

value_from!(i64, Int);
value_from!(i32, Int);
value_from!(f64, Double);
value_from!(bool, Bool);
value_from!(String, String);
value_from!(&str, String);

/// Element types that host storage can hold.
pub trait Element: Clone + Default + Send + 'static {
    const TYPE: ParamType;

    fn into_value(values: Vec<Self>) -> ParamValue;

    fn slice(value: &ParamValue) -> Option<&[Self]>;

    #[doc(hidden)]
    fn bind(storage: Box<dyn Storage<Self>>) -> Binding;
}

macro_rules! element {
    ($elem:ty, $variant:ident) => {
        impl Element for $elem {
            const TYPE: ParamType = ParamType::$variant;

            fn into_value(values: Vec<Self>) -> ParamValue {
                ParamValue::$variant(values)
            }

            fn slice(value: &ParamValue) -> Option<&[Self]> {
                match value {
                    ParamValue::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn bind(storage: Box<dyn Storage<Self>>) -> Binding {
                Binding::$variant(storage)
            }
        }
    };
}

element!(i64, Int);
element!(f64, Double);
element!(bool, Bool);
element!(String, String);

/// Shortest round-trip decimal, always with a decimal point when finite.
pub fn format_double(v: f64) -> String {
    let mut s = v.to_string();
    if v.is_finite() && !s.contains('.') {
        s.push_str(".0");
    }
    s
}

fn parse_int(token: &str) -> Result<i64> {
    token.parse().map_err(|_| ParamError::Parse {
        token: token.to_string(),
        expected: "int",
    })
}

fn parse_double(token: &str) -> Result<f64> {
    token.parse().map_err(|_| ParamError::Parse {
        token: token.to_string(),
        expected: "double",
    })
}

fn parse_bool(token: &str) -> Result<bool> {
    match token.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ParamError::Parse {
            token: token.to_string(),
            expected: "bool",
        }),
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\')
}

/// Render one string element as a wire token.
pub fn quote(s: &str) -> String {
    if !needs_quotes(s) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            // Stream fields are newline separated.
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Split wire text into tokens, honoring double quotes and backslash escapes.
///
/// Inside quotes `\\n` and `\\r` stand for newline and carriage return.
pub fn tokenize(text: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some('n') => token.push('\n'),
                        Some('r') => token.push('\r'),
                        Some(escaped) => token.push(escaped),
                        None => break,
                    },
                    _ => token.push(c),
                }
            }
            if !closed {
                return Err(ParamError::Parse {
                    token: format!("\"{token}"),
                    expected: "closing quote",
                });
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}
