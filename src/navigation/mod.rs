pub mod location;

use serde_json::{Map, Value};

use crate::core::codec::{ParamMap, ParamScope};
use crate::core::hash;
use crate::core::slots::NavigationState;

pub use location::MemoryLocation;

/// The step signal carried by the URL hash fragment.
pub trait NavigationPort {
    /// 0-based step currently in the hash, `None` when absent or unparsable.
    fn current_step(&self) -> Option<usize>;

    fn set_current_step(&mut self, step: Option<usize>);

    /// Hash changes observed since the last call, oldest first. Programmatic
    /// `set_current_step` calls show up here exactly like history navigation.
    fn take_changes(&mut self) -> Vec<Option<usize>>;
}

/// A navigation port that also owns the query string.
pub trait LocationPort: NavigationPort {
    fn query_params(&self) -> Map<String, Value>;

    /// Replaces the keys of `scope` in place, without adding a history entry.
    fn write_params(&mut self, scope: ParamScope, params: &ParamMap);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashOutcome {
    /// Echo of a navigation this controller issued itself.
    Suppressed,
    Unchanged,
    Entered(NavigationState),
}

/// Tracks `Summary` / `EditingSlot(i)` and filters the echo of its own navigations.
#[derive(Debug, Clone)]
pub struct NavigationController {
    max_slots: usize,
    state: NavigationState,
    in_flight: Option<Option<usize>>,
}

impl NavigationController {
    pub fn new(max_slots: usize) -> Self {
        Self {
            max_slots,
            state: NavigationState::Summary,
            in_flight: None,
        }
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn is_settling(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Applies a hash-change signal. The first signal after a programmatic
    /// navigation is swallowed when it matches the target; any other signal
    /// clears the guard and is processed.
    pub fn on_hash_changed(&mut self, step: Option<usize>) -> HashOutcome {
        if let Some(target) = self.in_flight.take() {
            if target == step {
                return HashOutcome::Suppressed;
            }
        }
        let next = NavigationState::from_step(step, self.max_slots);
        if next == self.state {
            HashOutcome::Unchanged
        } else {
            self.state = next;
            HashOutcome::Entered(next)
        }
    }

    /// Moves to `step` on the controller's own initiative and returns the step the
    /// port should be set to.
    pub fn navigate(&mut self, step: Option<usize>) -> Option<usize> {
        let next = NavigationState::from_step(step, self.max_slots);
        if next != self.state {
            self.state = next;
            self.in_flight = Some(next.step());
        }
        next.step()
    }

    /// Step after finishing slot `index`: the next slot, or the summary after the last.
    pub fn advance_from(&mut self, index: usize) -> Option<usize> {
        self.navigate(hash::next_step(index, self.max_slots))
    }
}
