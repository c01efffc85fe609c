// Guest type vocabulary and the resolver that maps logical type names to layouts
use crate::error::{MarshalError, MarshalResult};
use ahash::AHashMap;
use smol_str::SmolStr;

pub type TypeName = SmolStr;

/// Runtime type id of the guest's raw byte buffer.
pub const ARRAY_BUFFER_ID: u32 = 1;
/// Runtime type id of the guest's UTF-16 string object.
pub const STRING_ID: u32 = 2;

pub const STRING_TYPE: &str = "~lib/string/String";
const MAP_PREFIX: &str = "~lib/map/Map<";
const NULLABLE_SUFFIX: &str = " | null";

/// Guest scalar types, all stored inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Isize,
    Usize,
    F32,
    F64,
}

impl ScalarKind {
    pub fn parse(name: &str) -> Option<ScalarKind> {
        Some(match name {
            "bool" => ScalarKind::Bool,
            "i8" => ScalarKind::I8,
            "u8" => ScalarKind::U8,
            "i16" => ScalarKind::I16,
            "u16" => ScalarKind::U16,
            "i32" => ScalarKind::I32,
            "u32" => ScalarKind::U32,
            "i64" => ScalarKind::I64,
            "u64" => ScalarKind::U64,
            "isize" => ScalarKind::Isize,
            "usize" => ScalarKind::Usize,
            "f32" => ScalarKind::F32,
            "f64" => ScalarKind::F64,
            _ => return None,
        })
    }

    /// Byte width in wasm32 linear memory
    pub fn size(self) -> u32 {
        match self {
            ScalarKind::Bool | ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32
            | ScalarKind::U32
            | ScalarKind::Isize
            | ScalarKind::Usize
            | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
        }
    }

    #[inline]
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64 | ScalarKind::Isize
        )
    }

    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }
}

/// Classification of a logical type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Scalar(ScalarKind),
    String { nullable: bool },
    Map {
        key: TypeName,
        value: TypeName,
        nullable: bool,
    },
    Class { name: TypeName, nullable: bool },
}

impl TypeKind {
    /// Whether decoded values of this type can key a native host mapping
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            TypeKind::Scalar(_) | TypeKind::String { nullable: false }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: SmolStr,
    pub ty: TypeName,
    pub offset: u32,
}

/// Layout of a managed guest type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    /// Runtime type id stored in the object header
    pub id: u32,
    pub name: TypeName,
    /// Payload size in bytes
    pub size: u32,
    pub fields: Vec<FieldDefinition>,
}

impl TypeDefinition {
    pub fn new(id: u32, name: &str, size: u32) -> Self {
        Self {
            id,
            name: SmolStr::new(name),
            size,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: &str, ty: &str, offset: u32) -> Self {
        self.fields.push(FieldDefinition {
            name: SmolStr::new(name),
            ty: SmolStr::new(ty),
            offset,
        });
        self
    }
}

/// Resolves logical type names to their guest layout.
pub trait TypeResolver {
    /// Key and value type of a map type
    fn map_subtypes(&self, ty: &str) -> MarshalResult<(TypeName, TypeName)>;

    /// Inline size of a value of `ty` (references are pointer sized)
    fn size_of_type(&self, ty: &str) -> MarshalResult<u32>;

    fn type_definition(&self, ty: &str) -> MarshalResult<&TypeDefinition>;

    fn type_kind(&self, ty: &str) -> MarshalResult<TypeKind>;
}

/// Type metadata of one guest module.
pub struct TypeRegistry {
    definitions: AHashMap<TypeName, TypeDefinition>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut definitions = AHashMap::new();
        definitions.insert(
            SmolStr::new_static("~lib/arraybuffer/ArrayBuffer"),
            TypeDefinition::new(ARRAY_BUFFER_ID, "~lib/arraybuffer/ArrayBuffer", 0),
        );
        definitions.insert(
            SmolStr::new_static(STRING_TYPE),
            TypeDefinition::new(STRING_ID, STRING_TYPE, 0),
        );
        Self { definitions }
    }

    pub fn register_class(&mut self, def: TypeDefinition) -> &mut Self {
        self.definitions.insert(def.name.clone(), def);
        self
    }

    /// Register the runtime id of a concrete map instantiation
    pub fn register_map(&mut self, name: &str, id: u32) -> &mut Self {
        self.definitions
            .insert(SmolStr::new(name), TypeDefinition::new(id, name, 24));
        self
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeResolver for TypeRegistry {
    fn map_subtypes(&self, ty: &str) -> MarshalResult<(TypeName, TypeName)> {
        match self.type_kind(ty)? {
            TypeKind::Map { key, value, .. } => Ok((key, value)),
            _ => Err(MarshalError::type_resolution(ty, "not a map type")),
        }
    }

    fn size_of_type(&self, ty: &str) -> MarshalResult<u32> {
        match self.type_kind(ty)? {
            TypeKind::Scalar(kind) => Ok(kind.size()),
            _ => Ok(4),
        }
    }

    fn type_definition(&self, ty: &str) -> MarshalResult<&TypeDefinition> {
        self.definitions
            .get(strip_nullable(ty).0)
            .ok_or_else(|| MarshalError::type_resolution(ty, "no type definition registered"))
    }

    fn type_kind(&self, ty: &str) -> MarshalResult<TypeKind> {
        if let Some(kind) = ScalarKind::parse(ty) {
            return Ok(TypeKind::Scalar(kind));
        }
        let (name, nullable) = strip_nullable(ty);
        if name == STRING_TYPE {
            return Ok(TypeKind::String { nullable });
        }
        if name.starts_with(MAP_PREFIX) {
            let (key, value) = parse_map_args(name)
                .ok_or_else(|| MarshalError::type_resolution(ty, "malformed map type arguments"))?;
            return Ok(TypeKind::Map {
                key: SmolStr::new(key),
                value: SmolStr::new(value),
                nullable,
            });
        }
        if self.definitions.contains_key(name) {
            return Ok(TypeKind::Class {
                name: SmolStr::new(name),
                nullable,
            });
        }
        Err(MarshalError::type_resolution(ty, "unknown type"))
    }
}

/// Build the logical name of a map type
pub fn map_type_name(key: &str, value: &str) -> TypeName {
    smol_str::format_smolstr!("{MAP_PREFIX}{key},{value}>")
}

fn strip_nullable(ty: &str) -> (&str, bool) {
    match ty.strip_suffix(NULLABLE_SUFFIX) {
        Some(name) => (name, true),
        None => (ty, false),
    }
}

/// Split `~lib/map/Map<K,V>` at its top-level comma.
fn parse_map_args(name: &str) -> Option<(&str, &str)> {
    let args = name.strip_prefix(MAP_PREFIX)?.strip_suffix('>')?;
    let mut depth = 0usize;
    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                let key = args[..i].trim();
                let value = args[i + 1..].trim();
                if key.is_empty() || value.is_empty() {
                    return None;
                }
                return Some((key, value));
            }
            _ => {}
        }
    }
    None
}
