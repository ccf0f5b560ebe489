use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MatchError;

/// Distance metric between two embeddings. Lower is closer.
///
/// The metric must match the space the embedder was trained for and must
/// not change between runs: thresholds are only meaningful for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    Cosine,
    /// Plain Euclidean distance.
    Euclidean,
    /// Euclidean distance between L2-normalized vectors, in `[0, 2]`.
    #[default]
    EuclideanL2,
}

impl Metric {
    /// Computes the distance. Vectors of different length are infinitely far
    /// apart; NaN results are reported as infinity.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return f32::INFINITY;
        }
        let d = match self {
            Metric::Cosine => cosine_distance(a, b),
            Metric::Euclidean => euclidean_distance(a, b),
            Metric::EuclideanL2 => euclidean_l2_distance(a, b),
        };
        if d.is_nan() { f32::INFINITY } else { d }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::EuclideanL2 => "euclidean_l2",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" => Ok(Metric::Euclidean),
            "euclidean_l2" => Ok(Metric::EuclideanL2),
            other => Err(MatchError::UnknownMetric(other.to_string())),
        }
    }
}

fn dot_and_norms(a: &[f32], b: &[f32]) -> (f64, f64, f64) {
    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    (dot, norm_a, norm_b)
}

/// Compute the cosine distance between two vectors.
///
/// Returns a value in `[0, 2]` where 0 means identical direction and
/// 2 means opposite direction. Uses f64 intermediate precision.
/// Returns 2.0 for zero vectors or dimension mismatches.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 2.0;
    }
    let (dot, norm_a, norm_b) = dot_and_norms(a, b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    // Clamp to [-1, 1] to handle floating point errors.
    let similarity = similarity.clamp(-1.0, 1.0);
    (1.0 - similarity) as f32
}

/// Compute the Euclidean distance between two vectors.
/// Returns infinity on dimension mismatch.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    sum.sqrt() as f32
}

/// Compute the Euclidean distance after L2-normalizing both vectors.
///
/// Returns a value in `[0, 2]`. Returns 2.0 for zero vectors or
/// dimension mismatches.
pub fn euclidean_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 2.0;
    }
    let (_, norm_a, norm_b) = dot_and_norms(a, b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    let (na, nb) = (norm_a.sqrt(), norm_b.sqrt());
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 / na - y as f64 / nb;
            d * d
        })
        .sum();
    sum.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((d - 0.0).abs() < 0.001, "identical: got {d}");
    }

    #[test]
    fn test_cosine_orthogonal() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!((d - 1.0).abs() < 0.001, "orthogonal: got {d}");
    }

    #[test]
    fn test_cosine_opposite() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((d - 2.0).abs() < 0.001, "opposite: got {d}");
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_distance(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 2.0);
    }

    #[test]
    fn test_euclidean() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_euclidean_l2_is_scale_invariant() {
        let d = euclidean_l2_distance(&[1.0, 0.0], &[10.0, 0.0]);
        assert!(d.abs() < 1e-6, "same direction: got {d}");

        let d = euclidean_l2_distance(&[1.0, 0.0], &[0.0, 5.0]);
        assert!((d - 2f32.sqrt()).abs() < 1e-6, "orthogonal: got {d}");

        let d = euclidean_l2_distance(&[1.0, 0.0], &[-2.0, 0.0]);
        assert!((d - 2.0).abs() < 1e-6, "opposite: got {d}");
    }

    #[test]
    fn test_dimension_mismatch_is_infinite() {
        for m in [Metric::Cosine, Metric::Euclidean, Metric::EuclideanL2] {
            assert_eq!(m.distance(&[1.0, 0.0], &[1.0, 0.0, 0.0]), f32::INFINITY);
        }
    }

    #[test]
    fn test_nan_is_infinite() {
        let d = Metric::Euclidean.distance(&[f32::NAN], &[0.0]);
        assert_eq!(d, f32::INFINITY);
    }

    #[test]
    fn test_parse_and_display() {
        for m in [Metric::Cosine, Metric::Euclidean, Metric::EuclideanL2] {
            assert_eq!(m.as_str().parse::<Metric>().unwrap(), m);
            assert_eq!(m.to_string(), m.as_str());
        }
        assert!("manhattan".parse::<Metric>().is_err());
        assert_eq!(Metric::default(), Metric::EuclideanL2);
    }
}
