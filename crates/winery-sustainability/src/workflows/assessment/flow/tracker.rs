use std::collections::HashSet;

use super::{FlowAction, FlowError};

/// Handle for one outstanding request.
#[derive(Debug)]
pub(super) struct Ticket {
    action: FlowAction,
    epoch: u64,
}

/// Tracks which actions are in flight and which view epoch issued them.
/// Leaving the view bumps the epoch so late completions are recognised as
/// stale and dropped.
#[derive(Debug, Default)]
pub(super) struct RequestTracker {
    epoch: u64,
    in_flight: HashSet<FlowAction>,
}

impl RequestTracker {
    pub(super) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(super) fn begin(&mut self, action: FlowAction) -> Result<Ticket, FlowError> {
        if !self.in_flight.insert(action) {
            return Err(FlowError::Busy(action));
        }
        Ok(Ticket {
            action,
            epoch: self.epoch,
        })
    }

    /// Refuses to start while `action` is outstanding.
    pub(super) fn ensure_idle(&self, action: FlowAction) -> Result<(), FlowError> {
        if self.in_flight.contains(&action) {
            Err(FlowError::Busy(action))
        } else {
            Ok(())
        }
    }

    /// Releases the ticket; `false` when it belongs to an abandoned epoch.
    pub(super) fn finish(&mut self, ticket: &Ticket) -> bool {
        if ticket.epoch != self.epoch {
            return false;
        }
        self.in_flight.remove(&ticket.action);
        true
    }

    pub(super) fn invalidate(&mut self) {
        self.epoch += 1;
        self.in_flight.clear();
    }

    pub(super) fn in_flight(&self) -> Vec<FlowAction> {
        let mut actions: Vec<FlowAction> = self.in_flight.iter().copied().collect();
        actions.sort();
        actions
    }
}
