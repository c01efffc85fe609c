// Guest Map Marshalling
// Converts hash maps living in a wasm guest's linear memory to host values and back

#[cfg(test)]
mod test;

pub mod codec;
pub mod error;
pub mod guest;
pub mod hash;
pub mod map;
pub mod options;
pub mod types;
pub mod value;

#[cfg(feature = "serde")]
pub mod serde;

pub use codec::{FieldCodec, GuestCodec};
pub use error::{AllocFailure, ErrorKind, MarshalError, MarshalResult};
pub use guest::{Allocator, Guest, GuestHeap, MemoryAccessor, PinScope};
pub use hash::{HashFn, XxHash32};
pub use map::{GuestMapHeader, MapReader, MapWriter};
pub use options::MarshalOptions;
pub use types::{TypeDefinition, TypeKind, TypeName, TypeRegistry, TypeResolver};
pub use value::{FloatKey, HostMap, MapData, MapKey, Value};
