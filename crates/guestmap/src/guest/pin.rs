use super::Guest;
use crate::error::{MarshalError, MarshalResult};

/// Pins taken during one multi-step construction.
///
/// `run` releases every recorded pin once the body returns, whichever way it
/// returns. Unpin failures do not stop the release; they are reported through
/// `MarshalError::Cleanup` next to the body's own error, if it had one.
#[derive(Debug, Default)]
pub struct PinScope {
    pinned: Vec<u32>,
}

impl PinScope {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pinned: Vec::with_capacity(capacity),
        }
    }

    pub fn run<T>(
        guest: &mut dyn Guest,
        capacity: usize,
        body: impl FnOnce(&mut PinScope, &mut dyn Guest) -> MarshalResult<T>,
    ) -> MarshalResult<T> {
        let mut scope = PinScope::with_capacity(capacity);
        let result = body(&mut scope, &mut *guest);
        scope.finish(guest, result)
    }

    /// Pin `ptr` and remember it for release. Null pointers are skipped.
    pub fn pin(&mut self, guest: &mut dyn Guest, ptr: u32) -> MarshalResult<()> {
        if ptr == 0 {
            return Ok(());
        }
        guest.pin(ptr)?;
        self.pinned.push(ptr);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    /// Unpin everything, in pin order, collecting failures
    pub fn release(self, guest: &mut dyn Guest) -> Vec<MarshalError> {
        let mut failures = Vec::new();
        for ptr in self.pinned {
            if let Err(err) = guest.unpin(ptr) {
                tracing::warn!(ptr, error = %err, "failed to unpin guest object");
                failures.push(err);
            }
        }
        failures
    }

    pub fn finish<T>(self, guest: &mut dyn Guest, result: MarshalResult<T>) -> MarshalResult<T> {
        let failures = self.release(guest);
        match (result, failures.is_empty()) {
            (result, true) => result,
            (Ok(_), false) => Err(MarshalError::Cleanup {
                primary: None,
                failures,
            }),
            (Err(primary), false) => Err(MarshalError::Cleanup {
                primary: Some(Box::new(primary)),
                failures,
            }),
        }
    }
}
