//! Byte-range layout of a file split into fixed-size parts.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::ops::Range;

/// One contiguous `[start, end)` slice of the source file, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub index: u64,
    pub range: Range<u64>,
}

impl Part {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Number of parts needed to cover `file_size` bytes.
#[must_use]
pub fn total_parts(file_size: u64, part_size: u64) -> u64 {
    if part_size == 0 {
        return 0;
    }
    file_size.div_ceil(part_size)
}

/// Computes the part layout of a file.
///
/// The returned parts are contiguous, non-overlapping and cover `[0, file_size)`
/// exactly; only the last one may be shorter than `part_size`.
///
/// # Errors
///
/// Returns an error if `part_size` is zero or `total_parts` does not match
/// `ceil(file_size / part_size)`.
pub fn segment(file_size: u64, part_size: u64, total_parts: u64) -> Result<Vec<Part>> {
    if part_size == 0 {
        return Err(Error::SessionError("Part size must be positive".to_string()));
    }

    let expected = self::total_parts(file_size, part_size);
    if total_parts != expected {
        return Err(Error::SessionError(format!(
            "{total_parts} parts of {part_size} bytes cannot cover {file_size} bytes (expected {expected} parts)"
        )));
    }

    Ok((1..=total_parts)
        .map(|index| {
            let start = (index - 1) * part_size;
            let end = (start + part_size).min(file_size);
            Part {
                index,
                range: start..end,
            }
        })
        .collect())
}

/// Segments an in-memory file and pairs each part with its bytes.
///
/// Slices share `buffer`'s allocation; nothing is copied.
///
/// # Errors
///
/// Returns an error under the same conditions as [`segment`].
pub fn segment_and_read(
    buffer: &Bytes,
    part_size: u64,
    total_parts: u64,
) -> Result<Vec<(Part, Bytes)>> {
    let parts = segment(buffer.len() as u64, part_size, total_parts)?;

    parts
        .into_iter()
        .map(|part| {
            let start = usize::try_from(part.range.start)
                .map_err(|_| Error::ConfigError("File too large for this platform".to_string()))?;
            let end = usize::try_from(part.range.end)
                .map_err(|_| Error::ConfigError("File too large for this platform".to_string()))?;
            let bytes = buffer.slice(start..end);
            Ok((part, bytes))
        })
        .collect()
}
