use smol_str::SmolStr;
use std::fmt;

pub type MarshalResult<T> = Result<T, MarshalError>;

/// Why the guest allocator refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocFailure {
    /// Linear memory cannot grow to fit `size` more bytes
    Exhausted { size: u32, type_id: u32 },
    /// Pin requested for an object that is already pinned
    AlreadyPinned(u32),
    /// Unpin requested for an object that is not pinned
    NotPinned(u32),
    /// Pointer does not refer to an allocated object
    UnknownObject(u32),
}

impl fmt::Display for AllocFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocFailure::Exhausted { size, type_id } => {
                write!(f, "out of guest memory allocating {size} bytes (type id {type_id})")
            }
            AllocFailure::AlreadyPinned(ptr) => write!(f, "object 0x{ptr:08X} already pinned"),
            AllocFailure::NotPinned(ptr) => write!(f, "object 0x{ptr:08X} is not pinned"),
            AllocFailure::UnknownObject(ptr) => write!(f, "no guest object at 0x{ptr:08X}"),
        }
    }
}

/// Coarse classification of a [`MarshalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MemoryFault,
    TypeResolution,
    Allocation,
    UnsupportedValue,
    CorruptObject,
    LimitExceeded,
    /// Only cleanup failed; the conversion itself had succeeded
    Cleanup,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarshalError {
    /// Guest memory read or write out of bounds
    MemoryFault {
        field: &'static str,
        address: u32,
        write: bool,
    },
    /// Logical type has no usable definition
    TypeResolution { type_name: SmolStr, reason: String },
    /// Guest allocator exhausted or rejected a request
    Allocation(AllocFailure),
    /// Host value shape does not fit the requested guest type
    UnsupportedValue {
        type_name: SmolStr,
        found: &'static str,
    },
    /// Readable guest object whose contents break the layout rules
    CorruptObject { type_name: SmolStr, reason: String },
    /// A configured limit was hit
    LimitExceeded { limit: &'static str, value: u64 },
    /// Unpin failures collected while releasing pins.
    /// `primary` holds the error that triggered the cleanup, if any.
    Cleanup {
        primary: Option<Box<MarshalError>>,
        failures: Vec<MarshalError>,
    },
}

impl MarshalError {
    pub fn read_fault(field: &'static str, address: u32) -> Self {
        MarshalError::MemoryFault {
            field,
            address,
            write: false,
        }
    }

    pub fn write_fault(field: &'static str, address: u32) -> Self {
        MarshalError::MemoryFault {
            field,
            address,
            write: true,
        }
    }

    pub fn type_resolution(type_name: &str, reason: impl Into<String>) -> Self {
        MarshalError::TypeResolution {
            type_name: SmolStr::new(type_name),
            reason: reason.into(),
        }
    }

    pub fn unsupported(type_name: &str, found: &'static str) -> Self {
        MarshalError::UnsupportedValue {
            type_name: SmolStr::new(type_name),
            found,
        }
    }

    pub fn corrupt(type_name: &str, reason: impl Into<String>) -> Self {
        MarshalError::CorruptObject {
            type_name: SmolStr::new(type_name),
            reason: reason.into(),
        }
    }

    /// Kind of the error that caused the failure. Cleanup failures that
    /// followed another error report that error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarshalError::MemoryFault { .. } => ErrorKind::MemoryFault,
            MarshalError::TypeResolution { .. } => ErrorKind::TypeResolution,
            MarshalError::Allocation(_) => ErrorKind::Allocation,
            MarshalError::UnsupportedValue { .. } => ErrorKind::UnsupportedValue,
            MarshalError::CorruptObject { .. } => ErrorKind::CorruptObject,
            MarshalError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            MarshalError::Cleanup {
                primary: Some(primary),
                ..
            } => primary.kind(),
            MarshalError::Cleanup { primary: None, .. } => ErrorKind::Cleanup,
        }
    }

    /// The error that aborted the conversion, looking through cleanup wrappers.
    pub fn root(&self) -> &MarshalError {
        match self {
            MarshalError::Cleanup {
                primary: Some(primary),
                ..
            } => primary.root(),
            other => other,
        }
    }

    /// Name of the faulting field for memory faults.
    pub fn fault_field(&self) -> Option<&'static str> {
        match self.root() {
            MarshalError::MemoryFault { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Unpin failures recorded during cleanup.
    pub fn cleanup_failures(&self) -> &[MarshalError] {
        match self {
            MarshalError::Cleanup { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl From<AllocFailure> for MarshalError {
    fn from(failure: AllocFailure) -> Self {
        MarshalError::Allocation(failure)
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarshalError::MemoryFault {
                field,
                address,
                write,
            } => {
                let op = if *write { "write" } else { "read" };
                write!(f, "failed to {op} {field} at 0x{address:08X}")
            }
            MarshalError::TypeResolution { type_name, reason } => {
                write!(f, "cannot resolve type {type_name}: {reason}")
            }
            MarshalError::Allocation(failure) => write!(f, "allocation failed: {failure}"),
            MarshalError::UnsupportedValue { type_name, found } => {
                write!(f, "unsupported {found} value for type {type_name}")
            }
            MarshalError::CorruptObject { type_name, reason } => {
                write!(f, "corrupt guest {type_name}: {reason}")
            }
            MarshalError::LimitExceeded { limit, value } => {
                write!(f, "{limit} limit exceeded ({value})")
            }
            MarshalError::Cleanup { primary, failures } => {
                if let Some(primary) = primary {
                    write!(f, "{primary}; ")?;
                }
                write!(f, "{} unpin failure(s) during cleanup", failures.len())?;
                if let Some(first) = failures.first() {
                    write!(f, ", first: {first}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MarshalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MarshalError::Cleanup {
                primary: Some(primary),
                ..
            } => Some(primary.as_ref()),
            _ => None,
        }
    }
}
