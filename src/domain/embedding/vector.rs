//! Vector math shared by the index and the cache

use crate::domain::DomainError;

/// Fixed-dimension embedding vector
pub type Vector = Vec<f32>;

/// Calculate cosine similarity between two vectors
///
/// Symmetric and clamped to [-1, 1]. Mismatched lengths, empty vectors and
/// zero vectors all yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Inner product of two equally sized vectors
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Return an L2-normalized copy; zero vectors are returned unchanged
pub fn normalized(v: &[f32]) -> Vector {
    let norm = l2_norm(v);

    if norm == 0.0 {
        return v.to_vec();
    }

    v.iter().map(|x| x / norm).collect()
}

/// Reject vectors whose length differs from the index dimension
pub fn ensure_dimension(vector: &[f32], expected: usize) -> Result<(), DomainError> {
    if vector.len() != expected {
        return Err(DomainError::dimension_mismatch(expected, vector.len()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetric_and_bounded() {
        let a = vec![1.0, -2.0, 0.5];
        let b = vec![-0.5, 0.1, 3.0];

        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);

        assert!((ab - ba).abs() < 1e-6);
        assert!((-1.0..=1.0).contains(&ab));
        assert!((cosine_similarity(&a, &[-1.0, 2.0, -0.5]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_normalized_inner_product_equals_cosine() {
        let a = vec![3.0, 4.0];
        let b = vec![4.0, 3.0];

        let ip = dot(&normalized(&a), &normalized(&b));
        assert!((ip - cosine_similarity(&a, &b)).abs() < 1e-6);
        assert!((l2_norm(&normalized(&a)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ensure_dimension() {
        assert!(ensure_dimension(&[1.0, 2.0], 2).is_ok());

        let err = ensure_dimension(&[1.0], 2).unwrap_err();
        assert!(matches!(
            err,
            DomainError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }
}
