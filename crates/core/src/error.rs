use crate::types::RoiId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("ROI not found: {0}")]
    RoiNotFound(RoiId),

    #[error("Validation failed: {0}")]
    Validation(String),
}
