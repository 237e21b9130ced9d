//! String built-ins, plus the chunk-expression helpers (`item`, `word`,
//! `line`) that key off the caller-supplied item delimiter.

use crate::value::Value;

pub(super) fn call(name: &str, args: &[Value], item_delimiter: &str) -> Option<Value> {
    let s = || args.first().map(Value::to_display_string).unwrap_or_default();

    match name {
        "length" => Some(Value::Int(s().chars().count() as i32)),
        "string" => Some(Value::String(s())),
        "chars" => Some(Value::list(s().chars().map(|c| Value::String(c.to_string())).collect())),
        "words" => Some(Value::list(s().split_whitespace().map(|w| Value::String(w.to_string())).collect())),
        "lines" => Some(Value::list(s().lines().map(|l| Value::String(l.to_string())).collect())),
        "items" => Some(Value::list(s().split(item_delimiter).map(|i| Value::String(i.to_string())).collect())),
        "contains" => {
            let needle = args.get(1).map(Value::to_display_string)?;
            Some(Value::from(s().contains(&needle)))
        }
        "starts" => {
            let needle = args.get(1).map(Value::to_display_string)?;
            Some(Value::from(s().starts_with(&needle)))
        }
        "offset" => {
            let needle = args.first().map(Value::to_display_string)?;
            let haystack = args.get(1).map(Value::to_display_string).unwrap_or_default();
            Some(Value::Int(haystack.find(&needle).map_or(0, |byte_pos| haystack[..byte_pos].chars().count() as i32 + 1)))
        }
        _ => None,
    }
}
