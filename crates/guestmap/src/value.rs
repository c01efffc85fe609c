// Host-side values produced and consumed by the marshalling layer
use ahash::AHashMap;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Dynamically typed host value.
///
/// The guest type that a value is read from or written to is only known at
/// run time, so every conversion goes through this closed set of shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null reference
    Null,
    Bool(bool),
    /// Signed integers of any width
    Int(i64),
    /// Unsigned integers of any width
    UInt(u64),
    Float(f64),
    String(String),
    /// Class instance as an ordered field list
    Object(Vec<(SmolStr, Value)>),
    Map(HostMap),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Map(HostMap::Native(_)) => "map",
            Value::Map(HostMap::Pairs(_)) => "map data",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&HostMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Field lookup on an object value
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u as u64)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<HostMap> for Value {
    fn from(map: HostMap) -> Self {
        Value::Map(map)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => f.write_str(itoa::Buffer::new().format(*i)),
            Value::UInt(u) => f.write_str(itoa::Buffer::new().format(*u)),
            Value::Float(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
            Value::Map(map) => write!(f, "{map}"),
        }
    }
}

/// Decoded guest map.
///
/// Keys that have a comparable host form produce a native mapping; all other
/// key types (class instances, nested maps, nullable references) produce
/// the ordered pair list carrier.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMap {
    Native(AHashMap<MapKey, Value>),
    Pairs(MapData),
}

impl HostMap {
    pub fn len(&self) -> usize {
        match self {
            HostMap::Native(map) => map.len(),
            HostMap::Pairs(data) => data.0.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_native(&self) -> Option<&AHashMap<MapKey, Value>> {
        match self {
            HostMap::Native(map) => Some(map),
            HostMap::Pairs(_) => None,
        }
    }

    pub fn as_pairs(&self) -> Option<&MapData> {
        match self {
            HostMap::Pairs(data) => Some(data),
            HostMap::Native(_) => None,
        }
    }
}

impl<K: Into<MapKey>, V: Into<Value>> FromIterator<(K, V)> for HostMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        HostMap::Native(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for HostMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Map{")?;
        match self {
            HostMap::Native(map) => {
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} => {v}")?;
                }
            }
            HostMap::Pairs(data) => {
                for (i, (k, v)) in data.0.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} => {v}")?;
                }
            }
        }
        f.write_str("}")
    }
}

/// Ordered `(key, value)` pairs of a map whose keys cannot index a native
/// host mapping. Serialized under the `$mapdata` tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapData(pub Vec<(Value, Value)>);

impl MapData {
    pub const TAG: &'static str = "$mapdata";

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.0.iter()
    }
}

/// Host key of a native mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(FloatKey),
    String(String),
}

impl MapKey {
    /// Comparable form of a decoded key, if it has one.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::UInt(u) => Some(MapKey::UInt(*u)),
            Value::Float(n) => Some(MapKey::Float(FloatKey(*n))),
            Value::String(s) => Some(MapKey::String(s.clone())),
            Value::Null | Value::Object(_) | Value::Map(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::UInt(u) => Value::UInt(*u),
            MapKey::Float(n) => Value::Float(n.0),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

impl From<i32> for MapKey {
    fn from(i: i32) -> Self {
        MapKey::Int(i as i64)
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl From<u32> for MapKey {
    fn from(u: u32) -> Self {
        MapKey::UInt(u as u64)
    }
}

impl From<u64> for MapKey {
    fn from(u: u64) -> Self {
        MapKey::UInt(u)
    }
}

impl From<f64> for MapKey {
    fn from(n: f64) -> Self {
        MapKey::Float(FloatKey(n))
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(s.to_owned())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::String(s)
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => f.write_str(itoa::Buffer::new().format(*i)),
            MapKey::UInt(u) => f.write_str(itoa::Buffer::new().format(*u)),
            MapKey::Float(n) => write!(f, "{}", n.0),
            MapKey::String(s) => f.write_str(s),
        }
    }
}

/// Float usable as a native host map key: equality and ordering by bit
/// pattern (`f64::total_cmp`).
///
/// This is a host-side choice. The guest compares keys with `==`, so there
/// a `NaN` key is never found and `-0.0` equals `0.0`; here a `NaN` key is
/// an ordinary key and the two zeros are distinct.
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatKey {}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}
