//! Dense vector arithmetic: L2 normalization, cosine similarity, and the
//! little-endian byte packing used to persist embeddings alongside memory
//! records.

/// L2-normalize a vector in place. No-op (leaves the zero vector as-is) when
/// the vector's norm is zero, since there is no well-defined unit direction.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Whether `v` is already (approximately) unit-norm.
pub fn is_normalized(v: &[f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() < 1e-4
}

/// Dot product of two equal-length vectors. Returns 0.0 on length mismatch.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity between two vectors, clamped to `[0, 1]`.
///
/// Both inputs are L2-normalized internally (copies, not in place) before
/// the dot product is taken, so callers need not pre-normalize. Negative
/// cosine similarities are clamped to 0 per the search engine's scoring
/// contract.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut a_norm = a.to_vec();
    let mut b_norm = b.to_vec();
    normalize(&mut a_norm);
    normalize(&mut b_norm);
    dot_product(&a_norm, &b_norm).max(0.0)
}

/// Pack an `f32` vector into little-endian bytes for storage.
pub fn to_bytes(v: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(v.len() * 4);
    for x in v {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

/// Unpack little-endian bytes into an `f32` vector.
///
/// Returns `None` if `bytes.len()` is not a multiple of 4.
pub fn from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
