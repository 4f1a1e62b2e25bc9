//! Transition definitions for campaign and target statuses

use crate::domain::{CampaignStatus, TargetStatus, Trigger};

/// Definition of a campaign status transition
#[derive(Debug, Clone)]
pub struct TransitionDef {
    pub from: CampaignStatus,
    pub to: CampaignStatus,
    pub trigger: Trigger,
}

impl TransitionDef {
    pub fn new(from: CampaignStatus, trigger: Trigger, to: CampaignStatus) -> Self {
        Self { from, to, trigger }
    }
}

/// Build all campaign transitions.
///
/// `draft -> active <-> paused -> finished`, `active -> finished`, and
/// cancel from any non-terminal status.
pub fn build_transitions() -> Vec<TransitionDef> {
    use CampaignStatus::*;
    use Trigger::*;

    vec![
        TransitionDef::new(Draft, Launch, Active),
        TransitionDef::new(Active, Pause, Paused),
        TransitionDef::new(Paused, Resume, Active),
        TransitionDef::new(Active, Finish, Finished),
        TransitionDef::new(Paused, Finish, Finished),
        TransitionDef::new(Draft, Cancel, Cancelled),
        TransitionDef::new(Active, Cancel, Cancelled),
        TransitionDef::new(Paused, Cancel, Cancelled),
    ]
}

/// Allowed target status moves. Forward only; nothing leaves `converted`.
///
/// A skipped target can still convert: an attributed order is an observed
/// fact, not an operator decision.
const TARGET_TRANSITIONS: &[(TargetStatus, TargetStatus)] = &[
    (TargetStatus::Pending, TargetStatus::Notified),
    (TargetStatus::Pending, TargetStatus::Converted),
    (TargetStatus::Pending, TargetStatus::Skipped),
    (TargetStatus::Notified, TargetStatus::Converted),
    (TargetStatus::Notified, TargetStatus::Skipped),
    (TargetStatus::Skipped, TargetStatus::Converted),
];

pub fn target_transition_allowed(from: TargetStatus, to: TargetStatus) -> bool {
    TARGET_TRANSITIONS.contains(&(from, to))
}

/// Statuses a target may be in for a move to `to` to apply
pub fn target_sources(to: TargetStatus) -> Vec<TargetStatus> {
    TARGET_TRANSITIONS
        .iter()
        .filter(|(_, t)| *t == to)
        .map(|(f, _)| *f)
        .collect()
}

/// Get valid next statuses from a given campaign status
pub fn valid_targets_for_status(status: CampaignStatus) -> Vec<CampaignStatus> {
    build_transitions()
        .into_iter()
        .filter(|t| t.from == status)
        .map(|t| t.to)
        .collect()
}
