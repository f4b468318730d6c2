//! Pre-flight memory estimation for the sampler's possible-world pool.
//!
//! Provides a conservative estimate of peak memory consumption so callers can
//! warn before a large `--target`/`--epsilon` combination grows the sample
//! pool past what the host can hold. The estimate is intentionally
//! pessimistic — it uses a safety multiplier to account for heap
//! fragmentation, Rayon thread-local buffers, and temporary allocations that
//! are difficult to predict statically.

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Safety multiplier applied to the raw estimate to cover heap fragmentation,
/// Rayon thread-local buffers, and transient allocations. 1.5x is chosen as
/// a balance between avoiding false positives and catching genuine OOM risks.
const SAFETY_MULTIPLIER_NUMERATOR: u64 = 3;
const SAFETY_MULTIPLIER_DENOMINATOR: u64 = 2;

/// Size of one vertex's component-id slot within a sampled world (`u32`).
const COMPONENT_ID_BYTES: u64 = 4;

/// Size of one vertex's slot within a cached source's `counts` vector
/// (`u64`).
const COUNTS_ENTRY_BYTES: u64 = 8;

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

/// Returns a conservative estimate of peak memory (in bytes) the sampler
/// will require to hold `total_samples` possible worlds over a graph of
/// `vertex_count` vertices, plus a counts cache with room for
/// `cache_capacity` sources.
///
/// The estimate covers:
///
/// - The sample pool itself: `total_samples * vertex_count` component ids,
///   one `u32` per vertex per world.
/// - The counts cache: `cache_capacity` entries, each a `vertex_count`-long
///   `u64` counts vector.
///
/// A 1.5x safety multiplier is applied to the raw total to account for heap
/// fragmentation, Rayon thread-local buffers, and transient allocations
/// during pool growth.
///
/// # Examples
///
/// ```
/// use probcluster_core::memory::estimate_peak_bytes;
///
/// let bytes = estimate_peak_bytes(1_000, 500, 64);
/// assert!(bytes > 0, "estimate must be positive for a non-empty pool");
///
/// let zero = estimate_peak_bytes(0, 500, 64);
/// assert_eq!(zero, 0, "an empty pool requires no memory");
/// ```
#[must_use]
pub fn estimate_peak_bytes(total_samples: usize, vertex_count: usize, cache_capacity: usize) -> u64 {
    if total_samples == 0 || vertex_count == 0 {
        return 0;
    }

    let samples = total_samples as u64;
    let n = vertex_count as u64;
    let capacity = cache_capacity as u64;

    let pool = samples.saturating_mul(n).saturating_mul(COMPONENT_ID_BYTES);
    let cache = capacity
        .saturating_mul(n)
        .saturating_mul(COUNTS_ENTRY_BYTES);

    let subtotal = pool.saturating_add(cache);

    // Apply safety multiplier (3/2 = 1.5x) using integer arithmetic.
    subtotal
        .saturating_mul(SAFETY_MULTIPLIER_NUMERATOR)
        .saturating_div(SAFETY_MULTIPLIER_DENOMINATOR)
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Formats a byte count as a human-readable string using binary units.
///
/// Returns values like `"0 B"`, `"1.0 KiB"`, `"2.4 GiB"`. The result uses
/// one decimal place for values >= 1 KiB.
///
/// # Examples
///
/// ```
/// use probcluster_core::memory::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(1_073_741_824), "1.0 GiB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::small(100, 50, 8)]
    #[case::medium(10_000, 500, 64)]
    #[case::large(1_000_000, 2_000, 256)]
    fn estimate_returns_positive_for_non_empty(
        #[case] total_samples: usize,
        #[case] vertex_count: usize,
        #[case] cache_capacity: usize,
    ) {
        let bytes = estimate_peak_bytes(total_samples, vertex_count, cache_capacity);
        assert!(bytes > 0);
    }

    #[test]
    fn estimate_grows_with_sample_count() {
        let small = estimate_peak_bytes(100, 500, 64);
        let large = estimate_peak_bytes(100_000, 500, 64);
        assert!(large > small);
    }

    #[test]
    fn estimate_grows_with_vertex_count() {
        let small = estimate_peak_bytes(1_000, 50, 64);
        let large = estimate_peak_bytes(1_000, 5_000, 64);
        assert!(large > small);
    }

    #[test]
    fn estimate_grows_with_cache_capacity() {
        let small = estimate_peak_bytes(1_000, 500, 8);
        let large = estimate_peak_bytes(1_000, 500, 1024);
        assert!(large > small);
    }

    #[test]
    fn estimate_zero_samples_returns_zero() {
        assert_eq!(estimate_peak_bytes(0, 500, 64), 0);
    }

    #[test]
    fn estimate_zero_vertices_returns_zero() {
        assert_eq!(estimate_peak_bytes(1_000, 0, 64), 0);
    }

    #[test]
    fn estimate_huge_inputs_do_not_panic() {
        let bytes = estimate_peak_bytes(usize::MAX, usize::MAX, usize::MAX);
        assert!(bytes > 0);
    }

    #[rstest]
    #[case::zero(0, "0 B")]
    #[case::small(512, "512 B")]
    #[case::just_below_kib(1023, "1023 B")]
    #[case::one_kib(1024, "1.0 KiB")]
    #[case::one_and_half_kib(1536, "1.5 KiB")]
    #[case::one_mib(1_048_576, "1.0 MiB")]
    #[case::one_gib(1_073_741_824, "1.0 GiB")]
    #[case::one_tib(1_099_511_627_776, "1.0 TiB")]
    #[case::two_point_four_gib(2_576_980_378, "2.4 GiB")]
    fn format_bytes_produces_expected_output(#[case] input: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(input), expected);
    }
}
