//! Growable read buffer for variable-length fields.

use tracing::debug;

use rfcbridge_common::{Result, RfcError};

use crate::backend::{BackendResult, ReadStatus};

/// Owned byte buffer that grows once when the backend asks for more room.
pub(crate) struct ReadBuffer {
    bytes: Vec<u8>,
}

impl ReadBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
        }
    }

    /// Reads through `read`, growing to the backend-reported size and
    /// retrying once on `BufferTooSmall`. A second refusal is fatal.
    pub(crate) fn read<F>(&mut self, field: &str, mut read: F) -> Result<&[u8]>
    where
        F: FnMut(&mut [u8]) -> BackendResult<ReadStatus>,
    {
        let required = match read(&mut self.bytes)? {
            ReadStatus::Complete(len) => return Ok(&self.bytes[..len]),
            ReadStatus::BufferTooSmall { required } => required,
        };
        debug!(
            field = %field,
            capacity = self.bytes.len(),
            required,
            "Growing read buffer"
        );
        self.bytes.resize(required, 0);
        match read(&mut self.bytes)? {
            ReadStatus::Complete(len) => Ok(&self.bytes[..len]),
            ReadStatus::BufferTooSmall { required } => {
                let capacity = self.bytes.len();
                Err(RfcError::Internal(format!(
                    "buffer for field {} still too small at {} bytes (backend requires {})",
                    field, capacity, required
                )))
            }
        }
    }
}
