//! Session configuration.

use crate::constants::{DEFAULT_MAX_STRING_LEN, DEFAULT_SCRATCH_SIZE};

/// Configuration shared by the writers and readers of a [`crate::GraphCodec`].
///
/// Kept small for efficient pass-by-copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Size in bytes of the scratch buffer used for bulk primitive arrays.
    /// Always a non-zero multiple of 8.
    pub scratch_size: usize,
    /// Largest array element count a reader accepts.
    pub max_array_len: u32,
    /// Largest string byte length a reader accepts.
    pub max_string_len: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            scratch_size: DEFAULT_SCRATCH_SIZE,
            max_array_len: i32::MAX as u32,
            max_string_len: DEFAULT_MAX_STRING_LEN,
        }
    }
}

impl CodecConfig {
    /// Sets the scratch buffer size, rounded up to a multiple of 8 (minimum 8).
    pub fn with_scratch_size(mut self, size: usize) -> Self {
        self.scratch_size = size.max(8).div_ceil(8) * 8;
        self
    }

    /// Sets the largest accepted array length.
    pub fn with_max_array_len(mut self, len: u32) -> Self {
        self.max_array_len = len;
        self
    }

    /// Sets the largest accepted string length in bytes.
    pub fn with_max_string_len(mut self, len: u32) -> Self {
        self.max_string_len = len;
        self
    }
}
