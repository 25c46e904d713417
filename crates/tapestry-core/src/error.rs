use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The named record (chore, user, ...) does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The acting user is outside the chore's family.
    #[error("access denied")]
    Forbidden,

    #[error("point_value must be between {min} and {max}, got {0}", min = crate::chore::PointValue::MIN, max = crate::chore::PointValue::MAX)]
    InvalidPointValue(i64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
