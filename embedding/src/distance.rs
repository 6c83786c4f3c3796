use crate::embedding::Embedding;
use crate::error::MatchError;

/// Compute the Euclidean (L2) distance between two embeddings.
///
/// Accumulates in f64 and returns the result as f32, so the distance from a
/// vector to itself is exactly `0.0`.
pub fn euclidean_distance(a: &Embedding, b: &Embedding) -> Result<f32, MatchError> {
    precise_distance(a, b).map(|d| d as f32)
}

/// Euclidean distance without the final rounding to f32.
pub(crate) fn precise_distance(a: &Embedding, b: &Embedding) -> Result<f64, MatchError> {
    if a.dimension() != b.dimension() {
        return Err(MatchError::DimensionMismatch {
            expected: a.dimension(),
            got: b.dimension(),
        });
    }
    Ok(squared_sum(a.as_slice(), b.as_slice()).sqrt())
}

fn squared_sum(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(v: &[f32]) -> Embedding {
        Embedding::new(v.to_vec()).unwrap()
    }

    #[test]
    fn test_identical() {
        let a = emb(&[0.3, -0.2, 0.9]);
        assert_eq!(euclidean_distance(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_unit_axes() {
        let d = euclidean_distance(&emb(&[1.0, 0.0]), &emb(&[0.0, 1.0])).unwrap();
        assert!((d - std::f32::consts::SQRT_2).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn test_three_four_five() {
        let d = euclidean_distance(&emb(&[0.0, 0.0]), &emb(&[3.0, 4.0])).unwrap();
        assert_eq!(d, 5.0);
    }

    #[test]
    fn test_symmetric() {
        let a = emb(&[0.1, 0.7, -0.4]);
        let b = emb(&[-0.3, 0.2, 0.5]);
        assert_eq!(
            euclidean_distance(&a, &b).unwrap(),
            euclidean_distance(&b, &a).unwrap()
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = euclidean_distance(&emb(&[1.0, 0.0]), &emb(&[1.0, 0.0, 0.0])).unwrap_err();
        assert_eq!(err, MatchError::DimensionMismatch { expected: 2, got: 3 });
    }
}
