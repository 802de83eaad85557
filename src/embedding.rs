use crate::error::{Error, Result};

/// Maps a batch of texts to one fixed-width vector per text.
///
/// Implementations block until the provider answers. The output width is a
/// property of the underlying model and must not change between calls.
pub trait Embedder: Send + Sync {
    /// Embed every text in `batch`, preserving order.
    fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Check that a provider answered with one vector per input, all of the
/// same non-zero width and made of finite values, and return that width.
pub fn check_batch(inputs: usize, vectors: &[Vec<f32>]) -> Result<usize> {
    if vectors.len() != inputs {
        return Err(Error::Embedding(format!(
            "provider returned {} vectors for {inputs} inputs",
            vectors.len()
        )));
    }

    let Some(first) = vectors.first() else {
        return Ok(0);
    };
    let width = first.len();
    if width == 0 {
        return Err(Error::Embedding("provider returned empty vectors".into()));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != width) {
        return Err(Error::DimensionMismatch {
            expected: width,
            actual: bad.len(),
        });
    }

    if let Some(row) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
        return Err(Error::Embedding(format!(
            "provider returned a non-finite value in vector {row}"
        )));
    }

    Ok(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_batch_reports_width() {
        let vectors = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        assert_eq!(check_batch(2, &vectors).unwrap(), 3);
    }

    #[test]
    fn wrong_count_is_rejected() {
        let vectors = vec![vec![1.0, 2.0]];
        assert!(matches!(check_batch(2, &vectors), Err(Error::Embedding(_))));
    }

    #[test]
    fn ragged_batch_is_rejected() {
        let vectors = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            check_batch(2, &vectors),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn zero_width_is_rejected() {
        let vectors = vec![vec![]];
        assert!(matches!(check_batch(1, &vectors), Err(Error::Embedding(_))));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let vectors = vec![vec![1.0, 0.0], vec![bad, 1.0]];
            assert!(matches!(
                check_batch(2, &vectors),
                Err(Error::Embedding(_))
            ));
        }
    }
}
