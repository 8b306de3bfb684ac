//! `${key}` substitution of enumeration item values into node params.
//!
//! Keys resolve against the item's params, plus `item.name` and `item.id`.
//! A string that is exactly one placeholder is replaced by the raw value (so
//! numbers and lists keep their type); embedded placeholders are spliced in
//! as text. Unknown placeholders are left untouched.

use serde_json::{Map, Value};
use vigil_core::EnumerationItem;

pub fn apply_item(params: &Map<String, Value>, item: &EnumerationItem) -> Map<String, Value> {
    let vars = item_vars(item);
    params
        .iter()
        .map(|(k, v)| (k.clone(), substitute(v, &vars)))
        .collect()
}

fn item_vars(item: &EnumerationItem) -> Map<String, Value> {
    let mut vars = item.params.clone();
    vars.insert("item.name".to_string(), Value::String(item.name.clone()));
    if let Some(id) = item.id {
        vars.insert("item.id".to_string(), Value::from(id));
    }
    vars
}

fn substitute(value: &Value, vars: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => substitute_str(s, vars),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(s: &str, vars: &Map<String, Value>) -> Value {
    if let Some(key) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        if !key.contains("${") {
            if let Some(v) = vars.get(key) {
                return v.clone();
            }
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match vars.get(key) {
                    Some(Value::String(v)) => out.push_str(v),
                    Some(v) => out.push_str(&v.to_string()),
                    None => {
                        out.push_str("${");
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Value::String(out)
}
