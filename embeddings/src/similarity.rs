//! Distance computation for embeddings.

use crate::error::{EmbeddingError, Result};

/// Compute the squared euclidean distance between two embeddings.
///
/// The flat index ranks on this value and only takes the square root for
/// the distances it returns.
pub fn squared_l2_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum())
}

/// Compute the euclidean (L2) distance between two embeddings.
///
/// Returns a non-negative value; `0.0` means the vectors are identical.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    Ok(squared_l2_distance(a, b)?.sqrt())
}

/// Normalize an embedding to unit length.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_distance_identical() {
        let a = vec![0.3, -1.5, 2.0];
        let dist = l2_distance(&a, &a).unwrap();
        assert_eq!(dist, 0.0);
    }

    #[test]
    fn test_l2_distance_pythagorean() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        let dist = l2_distance(&a, &b).unwrap();
        assert!((dist - 5.0).abs() < 1e-6);
        assert!((squared_l2_distance(&a, &b).unwrap() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(matches!(
            l2_distance(&a, &b),
            Err(EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_is_untouched() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
