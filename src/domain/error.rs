//! Error taxonomy for engine operations

use thiserror::Error;

use super::campaign::ValidationError;
use super::state::{CampaignStatus, TargetStatus};

/// A status change the lifecycle rules do not allow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid campaign transition from {from} to {to}")]
    Campaign {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("Invalid target transition from {from} to {to}")]
    Target { from: TargetStatus, to: TargetStatus },
}

/// Errors returned by engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Input rejected at the boundary; nothing was written
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Operation not applicable to the campaign's current state; nothing was written
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{0} not found")]
    NotFound(String),

    /// Lost a race on a conditional update
    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EngineError {
    pub fn precondition(message: impl Into<String>) -> Self {
        EngineError::Precondition(message.into())
    }

    pub fn campaign_not_found(campaign_id: &str) -> Self {
        EngineError::NotFound(format!("Campaign {}", campaign_id))
    }

    pub fn target_not_found(target_id: &str) -> Self {
        EngineError::NotFound(format!("Target {}", target_id))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::campaign_not_found("abc");
        assert_eq!(err.to_string(), "Campaign abc not found");

        let err: EngineError = TransitionError::Campaign {
            from: CampaignStatus::Finished,
            to: CampaignStatus::Active,
        }
        .into();
        assert_eq!(err.to_string(), "Invalid campaign transition from finished to active");

        let err: EngineError = ValidationError::NoChannels.into();
        assert_eq!(err.to_string(), "Targeted campaigns must enable at least one channel");
    }
}
