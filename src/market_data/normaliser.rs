// Convert loosely typed wire values into typed levels, changes and points.
// Every function here is per item: a bad item gives None, never an error.

use serde_json::Value;

use crate::engine::types::{PriceChange, PriceLevel, PricePoint, Side};

/// Number, or number written as text. Non-finite results are rejected.
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_size(value: &Value) -> Option<f64> {
    parse_number(value).filter(|s| *s >= 0.0)
}

/// `{price, size}` object.
pub fn parse_level(value: &Value) -> Option<PriceLevel> {
    let price = parse_number(value.get("price")?)?;
    let size = parse_size(value.get("size")?)?;
    Some(PriceLevel::new(price, size))
}

pub fn parse_levels(values: &[Value]) -> Vec<PriceLevel> {
    values.iter().filter_map(parse_level).collect()
}

/// `{price, side, size}` object. An unrecognised side still yields a change
/// (with `side: None`) so the book can skip it per entry.
pub fn parse_change(value: &Value) -> Option<PriceChange> {
    let price = parse_number(value.get("price")?)?;
    let size = parse_size(value.get("size")?)?;
    let side = value.get("side").and_then(Value::as_str).and_then(Side::from_tag);
    Some(PriceChange { price, side, size })
}

/// One history point in any of the shapes upstream has used:
/// `[t, p]`, `["t", "p"]`, `{"t", "p"}` or `{"timestamp"|"time", "price"}`.
pub fn parse_history_point(value: &Value) -> Option<PricePoint> {
    match value {
        Value::Array(items) if items.len() >= 2 => {
            let timestamp = parse_number(&items[0])?;
            let price = parse_number(&items[1])?;
            Some(PricePoint { timestamp, price })
        }
        Value::Object(map) => {
            let timestamp = ["t", "timestamp", "time"]
                .iter()
                .find_map(|k| map.get(*k).and_then(parse_number))?;
            let price = ["p", "price"].iter().find_map(|k| map.get(*k).and_then(parse_number))?;
            Some(PricePoint { timestamp, price })
        }
        _ => None,
    }
}

pub fn parse_history(values: &[Value]) -> Vec<PricePoint> {
    values.iter().filter_map(parse_history_point).collect()
}
