//! Setup errors. Target-side failures (closed ports, refused connections,
//! unexpected statuses) are ordinary data for this tool; only caller mistakes
//! surface through these variants, and they fail fast.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },
    #[error("historical log not found: {0}")]
    LogNotFound(String),
    #[error("no candidate paths configured")]
    NoCandidatePaths,
}
