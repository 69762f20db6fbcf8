//! Range planning.
//!
//! Splits a file into one contiguous byte range per worker.

use crate::error::EngineError;
use crate::model::ByteRange;

/// Partition `[0, file_size_bytes)` into exactly `worker_count` ranges.
///
/// Ranges advance in steps of `ceil(file_size_bytes / worker_count)` bytes,
/// clamped to the end of the file; the last range always ends at
/// `file_size_bytes` and absorbs whatever is left. When the file is smaller
/// than the worker count the trailing ranges are empty.
///
/// Rounding the step up means the last range is the short one (10 bytes over
/// 3 workers gives 4, 4, 2), not the long one a floor step would give
/// (3, 3, 4). It also means several trailing ranges can be empty when the
/// remainder is large, e.g. 4 bytes over 3 workers gives 2, 2, 0. Callers
/// must not assume every range is non-empty or that lengths differ by at
/// most one.
///
/// # Errors
/// Returns `InvalidWorkerCount` if `worker_count` is zero.
pub fn partition(file_size_bytes: u64, worker_count: usize) -> Result<Vec<ByteRange>, EngineError> {
    if worker_count == 0 {
        return Err(EngineError::InvalidWorkerCount { count: worker_count });
    }

    let span = file_size_bytes.div_ceil(worker_count as u64);
    let ranges = (0..worker_count)
        .map(|index| {
            let start_offset = (index as u64).saturating_mul(span).min(file_size_bytes);
            let end_offset_exclusive = if index == worker_count - 1 {
                file_size_bytes
            } else {
                (start_offset + span).min(file_size_bytes)
            };
            ByteRange {
                start_offset,
                end_offset_exclusive,
                worker_index: index,
            }
        })
        .collect();

    Ok(ranges)
}
