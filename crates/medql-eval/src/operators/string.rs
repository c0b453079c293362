//! String operators
//!
//! Positions are zero-based character offsets. Any Null argument makes the
//! result Null, except for `&`, which reads Null as the empty string.

use crate::error::{EvalError, EvalResult};
use medql_types::Value;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Compiled patterns, shared across evaluations
static REGEX_CACHE: LazyLock<Mutex<HashMap<String, Regex>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

const REGEX_CACHE_LIMIT: usize = 256;

fn compile(pattern: &str) -> EvalResult<Regex> {
    if let Some(re) = REGEX_CACHE.lock().get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern).map_err(|e| EvalError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    let mut cache = REGEX_CACHE.lock();
    if cache.len() >= REGEX_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

fn text<'a>(value: &'a Value, operator: &str) -> EvalResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| EvalError::type_error(operator, format!("expected String, got {}", value.type_name())))
}

fn integer(value: &Value, operator: &str) -> EvalResult<i64> {
    value
        .as_i64()
        .ok_or_else(|| EvalError::type_error(operator, format!("expected Integer, got {}", value.type_name())))
}

fn char_offset(s: &str, byte_index: usize) -> Value {
    let chars = s[..byte_index].chars().count();
    i32::try_from(chars).map_or(Value::Null, Value::Integer)
}

macro_rules! null_guard {
    ($($arg:expr),+) => {
        if $($arg.is_null())||+ {
            return Ok(Value::Null);
        }
    };
}

/// `&`: Null operands read as empty strings
pub fn concatenate(parts: &[Value]) -> EvalResult<Value> {
    let mut out = String::new();
    for part in parts {
        match part {
            Value::Null => {}
            Value::String(s) => out.push_str(s),
            other => return Err(EvalError::unsupported("&", &[other.type_name()])),
        }
    }
    Ok(Value::String(out))
}

pub fn starts_with(s: &Value, prefix: &Value) -> EvalResult<Value> {
    null_guard!(s, prefix);
    Ok(Value::Boolean(text(s, "StartsWith")?.starts_with(text(prefix, "StartsWith")?)))
}

pub fn ends_with(s: &Value, suffix: &Value) -> EvalResult<Value> {
    null_guard!(s, suffix);
    Ok(Value::Boolean(text(s, "EndsWith")?.ends_with(text(suffix, "EndsWith")?)))
}

pub fn contains(s: &Value, fragment: &Value) -> EvalResult<Value> {
    null_guard!(s, fragment);
    Ok(Value::Boolean(text(s, "contains")?.contains(text(fragment, "contains")?)))
}

/// Position of the first occurrence of `fragment` in `s`, -1 when absent
pub fn index_of(s: &Value, fragment: &Value) -> EvalResult<Value> {
    null_guard!(s, fragment);
    let haystack = text(s, "indexOf")?;
    Ok(haystack
        .find(text(fragment, "indexOf")?)
        .map_or(Value::Integer(-1), |i| char_offset(haystack, i)))
}

/// `PositionOf(pattern, argument)`
pub fn position_of(pattern: &Value, s: &Value) -> EvalResult<Value> {
    index_of(s, pattern)
}

pub fn last_position_of(pattern: &Value, s: &Value) -> EvalResult<Value> {
    null_guard!(pattern, s);
    let haystack = text(s, "LastPositionOf")?;
    Ok(haystack
        .rfind(text(pattern, "LastPositionOf")?)
        .map_or(Value::Integer(-1), |i| char_offset(haystack, i)))
}

/// Characters from `start`, `length` of them or to the end. Null when
/// `start` is outside the string.
pub fn substring(s: &Value, start: &Value, length: Option<&Value>) -> EvalResult<Value> {
    null_guard!(s, start);
    let chars: Vec<char> = text(s, "Substring")?.chars().collect();
    let start = integer(start, "Substring")?;
    let Ok(start) = usize::try_from(start) else {
        return Ok(Value::Null);
    };
    if start >= chars.len() {
        return Ok(Value::Null);
    }
    let take = match length {
        None | Some(Value::Null) => chars.len() - start,
        Some(len) => usize::try_from(integer(len, "Substring")?).unwrap_or(0),
    };
    Ok(Value::String(chars[start..].iter().take(take).collect()))
}

pub fn upper(s: &Value) -> EvalResult<Value> {
    null_guard!(s);
    Ok(Value::String(text(s, "Upper")?.to_uppercase()))
}

pub fn lower(s: &Value) -> EvalResult<Value> {
    null_guard!(s);
    Ok(Value::String(text(s, "Lower")?.to_lowercase()))
}

pub fn trim(s: &Value) -> EvalResult<Value> {
    null_guard!(s);
    Ok(Value::String(text(s, "trim")?.trim().to_string()))
}

/// Number of characters of a string, or of items of a list
pub fn length(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(i32::try_from(s.chars().count()).map_or(Value::Null, Value::Integer)),
        Value::List(items) => Ok(i32::try_from(items.len()).map_or(Value::Null, Value::Integer)),
        other => Err(EvalError::unsupported("Length", &[other.type_name()])),
    }
}

pub fn to_chars(s: &Value) -> EvalResult<Value> {
    null_guard!(s);
    Ok(Value::List(text(s, "toChars")?.chars().map(|c| Value::String(c.to_string())).collect()))
}

/// Literal replacement of every occurrence
pub fn replace(s: &Value, pattern: &Value, substitution: &Value) -> EvalResult<Value> {
    null_guard!(s, pattern, substitution);
    Ok(Value::String(
        text(s, "replace")?.replace(text(pattern, "replace")?, text(substitution, "replace")?),
    ))
}

/// Regular expression match. `whole` requires the pattern to match the
/// entire string; otherwise any match within it counts.
pub fn matches(s: &Value, pattern: &Value, whole: bool) -> EvalResult<Value> {
    null_guard!(s, pattern);
    let pattern = text(pattern, "Matches")?;
    let re = if whole {
        compile(&format!("^(?:{pattern})$"))?
    } else {
        compile(pattern)?
    };
    Ok(Value::Boolean(re.is_match(text(s, "Matches")?)))
}

/// Replace every match; `$1` in the substitution refers to a group
pub fn replace_matches(s: &Value, pattern: &Value, substitution: &Value) -> EvalResult<Value> {
    null_guard!(s, pattern, substitution);
    let re = compile(text(pattern, "ReplaceMatches")?)?;
    let out = re.replace_all(text(s, "ReplaceMatches")?, text(substitution, "ReplaceMatches")?);
    Ok(Value::String(out.into_owned()))
}

/// Split on a literal separator; an empty separator splits into characters
pub fn split(s: &Value, separator: &Value) -> EvalResult<Value> {
    null_guard!(s);
    let s = text(s, "Split")?;
    if separator.is_null() {
        return Ok(Value::List(vec![Value::string(s)]));
    }
    let separator = text(separator, "Split")?;
    if separator.is_empty() {
        return to_chars(&Value::string(s));
    }
    Ok(Value::List(s.split(separator).map(Value::string).collect()))
}

/// Join the non-Null strings of a list
pub fn join(list: &Value, separator: Option<&Value>) -> EvalResult<Value> {
    if list.is_null() {
        return Ok(Value::Null);
    }
    let separator = match separator {
        None | Some(Value::Null) => "",
        Some(sep) => text(sep, "Combine")?,
    };
    let parts = match list {
        Value::List(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| text(v, "Combine"))
            .collect::<EvalResult<Vec<_>>>()?,
        single => vec![text(single, "Combine")?],
    };
    Ok(Value::String(parts.join(separator)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(v: &str) -> Value {
        Value::string(v)
    }

    #[test]
    fn test_concatenate_treats_null_as_empty() {
        assert_eq!(concatenate(&[s("a"), Value::Null, s("b")]).ok(), Some(s("ab")));
    }

    #[test]
    fn test_positions() {
        assert_eq!(index_of(&s("héllo"), &s("llo")).ok(), Some(Value::Integer(2)));
        assert_eq!(index_of(&s("abc"), &s("z")).ok(), Some(Value::Integer(-1)));
        assert_eq!(last_position_of(&s("a"), &s("banana")).ok(), Some(Value::Integer(5)));
    }

    #[test]
    fn test_substring() {
        assert_eq!(substring(&s("abcdef"), &Value::Integer(2), None).ok(), Some(s("cdef")));
        assert_eq!(substring(&s("abcdef"), &Value::Integer(2), Some(&Value::Integer(2))).ok(), Some(s("cd")));
        assert_eq!(substring(&s("abc"), &Value::Integer(5), None).ok(), Some(Value::Null));
    }

    #[test]
    fn test_regex() {
        assert_eq!(matches(&s("abc123"), &s("[0-9]+"), false).ok(), Some(Value::Boolean(true)));
        assert_eq!(matches(&s("abc123"), &s("[0-9]+"), true).ok(), Some(Value::Boolean(false)));
        assert_eq!(replace_matches(&s("a1b2"), &s("[0-9]"), &s("#")).ok(), Some(s("a#b#")));
        assert!(matches!(matches(&s("x"), &s("("), false), Err(EvalError::InvalidRegex { .. })));
    }

    #[test]
    fn test_split_and_join() {
        let parts = split(&s("a,b,,c"), &s(",")).ok();
        assert_eq!(parts, Some(Value::List(vec![s("a"), s("b"), s(""), s("c")])));
        let joined = join(&Value::List(vec![s("a"), Value::Null, s("b")]), Some(&s("-"))).ok();
        assert_eq!(joined, Some(s("a-b")));
    }
}
