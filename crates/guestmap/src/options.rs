#[derive(Debug, Clone)]
pub struct MarshalOptions {
    /// Maximum nesting of maps and objects inside one conversion
    pub max_depth: usize,
    /// Largest `entriesCount` accepted when reading a guest map.
    /// Guards against walking garbage when the header is stale.
    pub max_entries: u32,
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_entries: 1 << 24,
        }
    }
}
