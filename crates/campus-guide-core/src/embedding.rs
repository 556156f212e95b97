//! The embedding collaborator and the vector math retrieval needs.
//!
//! Providers that talk to a model server live in the `campus-guide` app
//! crate; here there is only the [`Embedder`] trait, the BLOB codec used by
//! stores that persist vectors, and cosine distance.

use anyhow::Result;
use async_trait::async_trait;

/// Text in, fixed-length vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded next to stored vectors.
    fn model_name(&self) -> &str;
    /// Length of every vector this embedder returns.
    fn dims(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Little-endian f32 bytes, four per component.
///
/// ```rust
/// use campus_guide_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let blob = vec_to_blob(&[0.5, -1.0]);
/// assert_eq!(blob.len(), 8);
/// assert_eq!(blob_to_vec(&blob), vec![0.5, -1.0]);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_blob`]. Trailing bytes that do not fill a component
/// are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .filter_map(|b| b.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` when either vector is empty,
/// zero, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });
    let norm = (aa * bb).sqrt();
    if norm < f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}

/// `1 - similarity`, so lower is closer. Vectors that cannot be compared
/// sit at `1.0`, the distance of orthogonal vectors.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - f64::from(cosine_similarity(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_decoding_ignores_partial_component() {
        let mut blob = vec_to_blob(&[1.0, 2.0]);
        blob.push(0xff);
        assert_eq!(blob_to_vec(&blob), vec![1.0, 2.0]);
    }

    #[test]
    fn test_distance_orders_by_direction() {
        let query = [1.0, 0.0];
        assert!(cosine_distance(&query, &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&query, &[0.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&query, &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!(cosine_distance(&query, &[1.0, 1.0]) < cosine_distance(&query, &[0.0, 1.0]));
    }

    #[test]
    fn test_distance_degenerate_inputs() {
        assert_eq!(cosine_distance(&[], &[]), 1.0);
        assert_eq!(cosine_distance(&[1.0, 2.0], &[1.0]), 1.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
