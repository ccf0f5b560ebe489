use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("matcher: unknown metric {0:?} (want cosine, euclidean or euclidean_l2)")]
    UnknownMetric(String),

    #[error("matcher: threshold must be finite and positive, got {0}")]
    InvalidThreshold(f32),
}
