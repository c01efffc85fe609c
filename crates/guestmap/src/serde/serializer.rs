use crate::value::{HostMap, MapData, Value};
use ::serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name.as_str(), value)?;
                }
                map.end()
            }
            Value::Map(map) => map.serialize(serializer),
        }
    }
}

impl Serialize for HostMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // JSON object keys are strings
            HostMap::Native(native) => {
                let mut map = serializer.serialize_map(Some(native.len()))?;
                for (key, value) in native {
                    map.serialize_entry(&key.to_string(), value)?;
                }
                map.end()
            }
            HostMap::Pairs(data) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(MapData::TAG, &Entries(data))?;
                map.end()
            }
        }
    }
}

struct Entries<'a>(&'a MapData);

impl Serialize for Entries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.0.len()))?;
        for (key, value) in self.0.iter() {
            seq.serialize_element(&Entry { key, value })?;
        }
        seq.end()
    }
}

struct Entry<'a> {
    key: &'a Value,
    value: &'a Value,
}

impl Serialize for Entry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("key", self.key)?;
        map.serialize_entry("value", self.value)?;
        map.end()
    }
}

/// Convert a host value to a serde_json::Value
pub fn to_json(value: &Value) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize to JSON: {}", e))
}

/// Convert a host value to a JSON string
pub fn to_json_string(value: &Value, pretty: bool) -> Result<String, String> {
    if pretty {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("Failed to serialize to JSON: {}", e))
    } else {
        serde_json::to_string(value).map_err(|e| format!("Failed to serialize to JSON: {}", e))
    }
}
