/// Conversion from serde_json::Value to host values
///
/// - JSON null / bool / string map directly
/// - JSON integers become `Int` (or `UInt` above `i64::MAX`), other numbers `Float`
/// - `{"$mapdata": [{"key": .., "value": ..}, ..]}` becomes a pair-list map
/// - any other JSON object becomes an `Object`
/// - arrays have no host counterpart and are rejected
use crate::value::{HostMap, MapData, MapKey, Value};
use serde_json::Value as JsonValue;
use smol_str::SmolStr;

pub fn from_json(json: &JsonValue) -> Result<Value, String> {
    match json {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::UInt(u))
            } else {
                n.as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("Invalid number: {}", n))
            }
        }
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Array(_) => Err("JSON arrays have no host value form".to_string()),
        JsonValue::Object(obj) => {
            if let Some(entries) = obj.get(MapData::TAG).filter(|_| obj.len() == 1) {
                return map_data(entries).map(|data| Value::Map(HostMap::Pairs(data)));
            }
            let mut fields = Vec::with_capacity(obj.len());
            for (name, value) in obj {
                fields.push((SmolStr::new(name), from_json(value)?));
            }
            Ok(Value::Object(fields))
        }
    }
}

/// Parse a JSON string into a host value
pub fn from_str(json: &str) -> Result<Value, String> {
    let json: JsonValue =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse JSON: {}", e))?;
    from_json(&json)
}

/// Read a JSON object as a native map with string keys. A `$mapdata`
/// carrier is accepted as well.
pub fn from_json_map(json: &JsonValue) -> Result<HostMap, String> {
    let JsonValue::Object(obj) = json else {
        return Err("expected a JSON object".to_string());
    };
    if let Some(entries) = obj.get(MapData::TAG).filter(|_| obj.len() == 1) {
        return map_data(entries).map(HostMap::Pairs);
    }
    let mut map = ahash::AHashMap::with_capacity(obj.len());
    for (key, value) in obj {
        map.insert(MapKey::String(key.clone()), from_json(value)?);
    }
    Ok(HostMap::Native(map))
}

fn map_data(entries: &JsonValue) -> Result<MapData, String> {
    let JsonValue::Array(entries) = entries else {
        return Err(format!("{} must be an array", MapData::TAG));
    };
    let mut pairs = Vec::with_capacity(entries.len());
    for entry in entries {
        let (Some(key), Some(value)) = (entry.get("key"), entry.get("value")) else {
            return Err(format!("{} entry needs key and value", MapData::TAG));
        };
        pairs.push((from_json(key)?, from_json(value)?));
    }
    Ok(MapData(pairs))
}
