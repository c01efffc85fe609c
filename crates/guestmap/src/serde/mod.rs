/// Serde support for host values
///
/// `Value` implements `Serialize`; the functions here convert to and from
/// `serde_json::Value`. Pair-list maps use the `{"$mapdata": [...]}` carrier so
/// that maps with non-string keys survive a JSON hop.
mod deserializer;
mod serializer;

pub use deserializer::{from_json, from_json_map, from_str};
pub use serializer::{to_json, to_json_string};
