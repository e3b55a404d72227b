use bitflags::bitflags;
use log::debug;

use crate::err::{EvtError, ReadError, Result, ERROR_INSUFFICIENT_BUFFER};
use crate::evt_reader::EventLogApi;

/// Default capacity of the read buffer. 64 KiB holds a typical batch of
/// records in one call and matches what the native API is tuned for.
pub const DEFAULT_BUFFER_SIZE: usize = 0x10000;

bitflags! {
    /// Read flags, combining two orthogonal axes: direction
    /// (`FORWARDS_READ` / `BACKWARDS_READ`) and access pattern
    /// (`SEQUENTIAL_READ` / `SEEK_READ`).
    ///
    /// Seek mode requires a caller-supplied starting record number;
    /// sequential mode ignores it after the first call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReadFlags: u32 {
        const SEQUENTIAL_READ = 0x0001;
        const SEEK_READ = 0x0002;
        const FORWARDS_READ = 0x0004;
        const BACKWARDS_READ = 0x0008;
    }
}

impl Default for ReadFlags {
    fn default() -> Self {
        ReadFlags::SEQUENTIAL_READ | ReadFlags::FORWARDS_READ
    }
}

/// Owns the byte buffer handed to the native read call, and the logic that
/// grows it when the OS reports it is too small.
///
/// The buffer is exclusively owned per `fill`; the returned span is only
/// valid until the next call.
pub struct RecordBuffer {
    buf: Vec<u8>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        RecordBuffer {
            buf: vec![0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Issues one native read, growing the buffer and retrying exactly once
    /// if the OS reports the buffer is too small.
    ///
    /// Returns the span of packed records the read delivered; an empty span
    /// means the log has no further records in the requested direction.
    /// Every other failure is fatal and carries the OS error code.
    pub fn fill(
        &mut self,
        api: &mut dyn EventLogApi,
        flags: ReadFlags,
        record_offset: u32,
    ) -> Result<&[u8]> {
        match api.read(flags, record_offset, &mut self.buf) {
            Ok(bytes_read) => Ok(&self.buf[..bytes_read.min(self.buf.len())]),
            Err(ReadError::EndOfLog) => Ok(&self.buf[..0]),
            Err(ReadError::InsufficientBuffer { needed }) => {
                debug!(
                    "read buffer of {} bytes is too small, growing to {} and retrying",
                    self.buf.len(),
                    needed
                );
                self.buf.resize(needed as usize, 0);

                match api.read(flags, record_offset, &mut self.buf) {
                    Ok(bytes_read) => Ok(&self.buf[..bytes_read.min(self.buf.len())]),
                    Err(ReadError::EndOfLog) => Ok(&self.buf[..0]),
                    Err(ReadError::InsufficientBuffer { .. }) => Err(EvtError::Os {
                        op: "ReadEventLog",
                        code: ERROR_INSUFFICIENT_BUFFER,
                    }),
                    Err(ReadError::Os { op, code }) => Err(EvtError::Os { op, code }),
                }
            }
            Err(ReadError::Os { op, code }) => Err(EvtError::Os { op, code }),
        }
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new()
    }
}
