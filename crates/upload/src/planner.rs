//! Splits a declared file size into ordered, size-bounded chunks.

use dropgate_protocol::Config;
use dropgate_protocol::constants::MAX_CHUNK_COUNT;

use crate::UploadError;

/// The negotiated chunk layout for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_size: u64,
    pub chunk_size: u64,
    pub chunk_count: u32,
}

impl ChunkPlan {
    /// Expected byte length of the chunk at `index`.
    ///
    /// Every chunk is `chunk_size` long except possibly the last.
    pub fn chunk_len(&self, index: u32) -> u64 {
        if index + 1 == self.chunk_count {
            self.total_size - u64::from(self.chunk_count - 1) * self.chunk_size
        } else {
            self.chunk_size
        }
    }
}

/// Computes the chunk plan for `total_size` bytes.
///
/// A client hint within `[min_chunk_size, max_chunk_size]` is used as-is;
/// otherwise the largest allowed chunk size is chosen, which keeps the
/// chunk count minimal and below [`MAX_CHUNK_COUNT`].
pub fn plan_chunks(
    total_size: u64,
    hint: Option<u64>,
    config: &Config,
) -> Result<ChunkPlan, UploadError> {
    if total_size == 0 || total_size > config.max_file_size {
        return Err(UploadError::InvalidSize(total_size));
    }

    let chunk_size = match hint {
        Some(h) if h >= config.min_chunk_size && h <= config.max_chunk_size => h,
        _ => config.max_chunk_size,
    };

    let chunk_count = total_size.div_ceil(chunk_size);
    if chunk_count > u64::from(MAX_CHUNK_COUNT) {
        return Err(UploadError::InvalidSize(total_size));
    }

    Ok(ChunkPlan {
        total_size,
        chunk_size,
        chunk_count: chunk_count as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1_048_576;

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn twelve_mib_with_five_mib_hint() {
        let plan = plan_chunks(12 * MIB, Some(5 * MIB), &config()).unwrap();
        assert_eq!(plan.chunk_size, 5_242_880);
        assert_eq!(plan.chunk_count, 3);
        assert_eq!(plan.chunk_len(0), 5 * MIB);
        assert_eq!(plan.chunk_len(1), 5 * MIB);
        assert_eq!(plan.chunk_len(2), 2 * MIB);
    }

    #[test]
    fn chunk_lengths_sum_to_total() {
        for total in [1, MIB - 1, MIB, 3 * MIB + 17, 12 * MIB] {
            let plan = plan_chunks(total, Some(MIB), &config()).unwrap();
            let sum: u64 = (0..plan.chunk_count).map(|i| plan.chunk_len(i)).sum();
            assert_eq!(sum, total, "total {total}");
        }
    }

    #[test]
    fn rejects_zero_size() {
        assert!(matches!(
            plan_chunks(0, None, &config()),
            Err(UploadError::InvalidSize(0))
        ));
    }

    #[test]
    fn rejects_oversized_file() {
        let config = config();
        let too_big = config.max_file_size + 1;
        assert!(matches!(
            plan_chunks(too_big, None, &config),
            Err(UploadError::InvalidSize(_))
        ));
    }

    #[test]
    fn max_file_size_is_accepted() {
        let config = config();
        let plan = plan_chunks(config.max_file_size, None, &config).unwrap();
        assert_eq!(plan.chunk_size, config.max_chunk_size);
        assert_eq!(
            u64::from(plan.chunk_count),
            config.max_file_size.div_ceil(config.max_chunk_size)
        );
    }

    #[test]
    fn out_of_bounds_hint_falls_back_to_max() {
        let config = config();
        // Too small.
        let plan = plan_chunks(10 * MIB, Some(1024), &config).unwrap();
        assert_eq!(plan.chunk_size, config.max_chunk_size);
        // Too large.
        let plan = plan_chunks(10 * MIB, Some(64 * MIB), &config).unwrap();
        assert_eq!(plan.chunk_size, config.max_chunk_size);
    }

    #[test]
    fn tiny_file_is_a_single_chunk() {
        let plan = plan_chunks(1, None, &config()).unwrap();
        assert_eq!(plan.chunk_count, 1);
        assert_eq!(plan.chunk_len(0), 1);
    }

    #[test]
    fn rejects_plans_beyond_chunk_ceiling() {
        // A permissive config that would need more than MAX_CHUNK_COUNT
        // chunks at the minimum chunk size.
        let config = Config {
            max_file_size: u64::from(MAX_CHUNK_COUNT) * 8 + 1,
            min_chunk_size: 1,
            max_chunk_size: 8,
            ..Config::default()
        };
        assert!(matches!(
            plan_chunks(config.max_file_size, Some(8), &config),
            Err(UploadError::InvalidSize(_))
        ));
    }
}
