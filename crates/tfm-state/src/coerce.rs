//! Value type changes: widened numbers, empty strings, flatmap strings

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::debug;

use crate::fields::{put_key, remove_key, segments, visit_parents};

/// Target JSON type of a coerced field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// `true` / `false`
    Bool,
    /// Integer when integral, float otherwise
    Number,
    /// Integer only
    Integer,
    /// Floating point
    Float,
    /// String
    String,
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(n: f64) -> Option<Value> {
    Number::from_f64(n).map(Value::Number)
}

/// Store integral numbers of `fields` as floats
///
/// A zero in one of `zero_deletes` is removed instead. Values that are
/// already floats are untouched, as are non-numeric values.
#[allow(clippy::cast_precision_loss)]
pub fn convert_numeric_widened<S: AsRef<str>, Z: AsRef<str>>(
    attrs: &mut Value,
    fields: &[S],
    zero_deletes: &[Z],
) -> bool {
    let mut changed = false;
    for field in fields {
        let path = field.as_ref();
        let delete_zero = zero_deletes.iter().any(|z| z.as_ref() == path);
        changed |= visit_parents(attrs, &segments(path), &mut |map, leaf| {
            let Some(n) = map.get(leaf).and_then(integral) else {
                return false;
            };
            if n == 0 && delete_zero {
                remove_key(map, leaf);
                return true;
            }
            match float(n as f64) {
                Some(value) => {
                    put_key(map, leaf, value);
                    true
                }
                None => false,
            }
        });
    }
    if changed {
        debug!("widened numeric fields");
    }
    changed
}

/// Turn `""` into `null` for `fields`
///
/// Fields listed in `explicit_empty` were set to `""` on purpose in the
/// configuration and keep their value.
pub fn normalize_empty_strings<S: AsRef<str>, E: AsRef<str>>(
    attrs: &mut Value,
    fields: &[S],
    explicit_empty: &[E],
) -> bool {
    let mut changed = false;
    for field in fields {
        let path = field.as_ref();
        if explicit_empty.iter().any(|e| e.as_ref() == path) {
            continue;
        }
        changed |= visit_parents(attrs, &segments(path), &mut |map, leaf| {
            match map.get_mut(leaf) {
                Some(value) if value.as_str() == Some("") => {
                    *value = Value::Null;
                    true
                }
                _ => false,
            }
        });
    }
    changed
}

/// Convert one value to `ty`; `None` when it already has that type or
/// cannot be converted
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn convert(value: &Value, ty: FieldType) -> Option<Value> {
    match (ty, value) {
        (FieldType::Bool, Value::String(s)) => match s.as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (FieldType::Number, Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .map(Value::from)
                .or_else(|| s.parse::<f64>().ok().and_then(float))
        }
        (FieldType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (FieldType::Integer, Value::Number(n)) if n.is_f64() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| Value::from(f as i64)),
        (FieldType::Float, Value::String(_) | Value::Number(_)) => match value {
            Value::Number(n) if n.is_f64() => None,
            _ => integral(value)
                .map(|i| i as f64)
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .and_then(float),
        },
        (FieldType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (FieldType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        _ => None,
    }
}

/// Coerce fields to their target JSON type
///
/// Mostly for strings left by the flat encoding (`"true"`, `"60"`).
pub fn coerce_field_types<S: AsRef<str>>(attrs: &mut Value, fields: &[(S, FieldType)]) -> bool {
    let mut changed = false;
    for (field, ty) in fields {
        changed |= visit_parents(attrs, &segments(field.as_ref()), &mut |map, leaf| {
            let Some(converted) = map.get(leaf).and_then(|v| convert(v, *ty)) else {
                return false;
            };
            put_key(map, leaf, converted);
            true
        });
    }
    changed
}
