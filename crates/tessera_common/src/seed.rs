//! Deterministic RNG seed derivation for parallel tasks.
//!
//! The placer never uses a global RNG. Each parallel task derives its own
//! seed from the user seed, a stream label, and the task's logical index, so
//! results are reproducible regardless of how many workers execute the tasks.

/// Derives a per-task seed from a base seed, a stream label, and a task index.
///
/// The derivation is an XXH3 hash over the triple, so distinct streams and
/// indices produce statistically independent seeds while remaining stable
/// across runs and platforms.
pub fn derive_seed(base: u64, stream: &str, index: u64) -> u64 {
    let mut buf = Vec::with_capacity(16 + stream.len());
    buf.extend_from_slice(&base.to_le_bytes());
    buf.extend_from_slice(stream.as_bytes());
    buf.extend_from_slice(&index.to_le_bytes());
    xxhash_rust::xxh3::xxh3_64(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        assert_eq!(derive_seed(42, "walk", 3), derive_seed(42, "walk", 3));
    }

    #[test]
    fn sensitive_to_every_component() {
        let base = derive_seed(1, "walk", 0);
        assert_ne!(base, derive_seed(2, "walk", 0));
        assert_ne!(base, derive_seed(1, "detail", 0));
        assert_ne!(base, derive_seed(1, "walk", 1));
    }
}
