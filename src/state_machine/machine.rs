//! Campaign state machine implementation

use std::collections::HashMap;

use crate::domain::{CampaignStatus, TargetStatus, TransitionError, Trigger};
use crate::state_machine::transitions::{build_transitions, target_transition_allowed, TransitionDef};

/// Pure transition checks for campaign status changes
pub struct CampaignStateMachine {
    transitions: HashMap<(CampaignStatus, CampaignStatus), TransitionDef>,
}

impl Default for CampaignStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CampaignStateMachine {
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        for def in build_transitions() {
            transitions.insert((def.from, def.to), def);
        }

        Self { transitions }
    }

    /// Check a requested status change.
    ///
    /// Returns `Ok(None)` when `from == to` so a retried request is a no-op,
    /// and `Ok(Some(trigger))` for a real transition.
    pub fn check(
        &self,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Option<Trigger>, TransitionError> {
        if from == to {
            return Ok(None);
        }

        self.transitions
            .get(&(from, to))
            .map(|def| Some(def.trigger))
            .ok_or(TransitionError::Campaign { from, to })
    }

    /// Check whether a target may move between two statuses
    pub fn check_target(&self, from: TargetStatus, to: TargetStatus) -> Result<(), TransitionError> {
        if target_transition_allowed(from, to) {
            Ok(())
        } else {
            Err(TransitionError::Target { from, to })
        }
    }

    /// Get all statuses reachable from `status` in one step
    pub fn valid_next(&self, status: CampaignStatus) -> Vec<CampaignStatus> {
        self.transitions
            .keys()
            .filter(|(from, _)| *from == status)
            .map(|(_, to)| *to)
            .collect()
    }
}
