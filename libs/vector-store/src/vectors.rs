use sha2::{Digest, Sha256};
use tracing::warn;

/// Dimensionality every collection in the catalog is created with.
pub const EMBEDDING_DIM: usize = 768;

/// Resolve the vector to write for a point.
///
/// A candidate embedding is accepted only if it has exactly
/// [`EMBEDDING_DIM`] elements and every element is finite. Anything else
/// (partial responses, NaN/Infinity from a misbehaving embedding service)
/// falls back to a deterministic pseudo-vector derived from `seed`, so the
/// same entity keeps getting the same placeholder and repeated upserts do
/// not churn the index. The fallback is logged with the rejection reason
/// and `context` (collection:id) for traceability.
pub fn resolve_vector(candidate: Option<&[f32]>, seed: &str, context: &str) -> Vec<f32> {
    match candidate {
        Some(values) => match validate_candidate(values) {
            Ok(()) => values.to_vec(),
            Err(reason) => {
                warn!(
                    context,
                    reason, "Rejecting candidate embedding, using placeholder vector"
                );
                pseudo_vector(seed)
            }
        },
        None => pseudo_vector(seed),
    }
}

fn validate_candidate(values: &[f32]) -> Result<(), &'static str> {
    if values.len() != EMBEDDING_DIM {
        return Err("wrong dimensionality");
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err("non-finite element");
    }
    Ok(())
}

/// Deterministic placeholder vector in [-1, 1], seeded from a string.
pub fn pseudo_vector(seed: &str) -> Vec<f32> {
    let digest = Sha256::digest(seed.as_bytes());
    let mut state = u64::from_le_bytes(digest[0..8].try_into().expect("digest is 32 bytes"));
    // All-zero state would make xorshift degenerate
    if state == 0 {
        state = 0x9e37_79b9_7f4a_7c15;
    }

    (0..EMBEDDING_DIM)
        .map(|_| {
            // xorshift64*
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let scrambled = state.wrapping_mul(0x2545_f491_4f6c_dd1d);
            (scrambled >> 11) as f32 / (1u64 << 53) as f32 * 2.0 - 1.0
        })
        .collect()
}
