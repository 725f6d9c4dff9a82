use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::token::{Token, TokenIdentity};

/// Hard ceiling on slots per flow, imposed by the URL parameter budget.
pub const MAX_SLOTS: usize = 10;

/// Who filled a slot. Both fields are optional; anonymous fills carry neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Attribution {
    pub fn new(user_id: Option<String>, username: Option<String>) -> Self {
        Self { user_id, username }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// The contents of a filled slot. Attribution cannot exist without a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotFill {
    pub token: Arc<Token>,
    #[serde(flatten)]
    pub attribution: Attribution,
}

impl SlotFill {
    pub fn new(token: Arc<Token>, attribution: Attribution) -> Self {
        Self { token, attribution }
    }

    pub fn identity(&self) -> &TokenIdentity {
        &self.token.identity
    }
}

/// Read-only view of one position of a [`SlotSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<'a> {
    pub index: usize,
    pub required: bool,
    pub filled_by: Option<&'a SlotFill>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBoundsError {
    pub min_slots: usize,
    pub max_slots: usize,
}

impl fmt::Display for SlotBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid slot bounds: min={} max={} (expected 1 <= max <= {MAX_SLOTS} and min <= max)",
            self.min_slots, self.max_slots
        )
    }
}

impl std::error::Error for SlotBoundsError {}

/// Fixed-length sequence of slots. Emptying a slot clears it in place; indices
/// never shift and the length never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSet {
    min_slots: usize,
    fills: Vec<Option<SlotFill>>,
}

impl SlotSet {
    pub fn new(min_slots: usize, max_slots: usize) -> Result<Self, SlotBoundsError> {
        if max_slots == 0 || max_slots > MAX_SLOTS || min_slots > max_slots {
            return Err(SlotBoundsError {
                min_slots,
                max_slots,
            });
        }
        Ok(Self {
            min_slots,
            fills: vec![None; max_slots],
        })
    }

    pub fn min_slots(&self) -> usize {
        self.min_slots
    }

    pub fn max_slots(&self) -> usize {
        self.fills.len()
    }

    pub fn is_required(&self, index: usize) -> bool {
        index < self.min_slots
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot<'_>> + '_ {
        self.fills.iter().enumerate().map(|(index, fill)| Slot {
            index,
            required: self.is_required(index),
            filled_by: fill.as_ref(),
        })
    }

    pub fn get(&self, index: usize) -> Option<&SlotFill> {
        self.fills.get(index).and_then(Option::as_ref)
    }

    pub fn is_filled(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Returns false when `index` is out of range.
    pub fn fill(&mut self, index: usize, fill: SlotFill) -> bool {
        match self.fills.get_mut(index) {
            Some(entry) => {
                *entry = Some(fill);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, index: usize) -> Option<SlotFill> {
        self.fills.get_mut(index).and_then(Option::take)
    }

    pub fn filled_count(&self) -> usize {
        self.fills.iter().filter(|fill| fill.is_some()).count()
    }

    pub fn has_empty_slots(&self) -> bool {
        self.fills.iter().any(Option::is_none)
    }

    pub fn is_ready(&self) -> bool {
        self.filled_count() >= self.min_slots
    }

    pub fn empty_required(&self) -> Vec<usize> {
        (0..self.min_slots)
            .filter(|index| !self.is_filled(*index))
            .collect()
    }

    pub fn fills(&self) -> &[Option<SlotFill>] {
        &self.fills
    }

    /// Filled identities in slot order, gaps skipped.
    pub fn submission(&self) -> Vec<TokenIdentity> {
        self.fills
            .iter()
            .flatten()
            .map(|fill| fill.identity().clone())
            .collect()
    }
}

/// Which part of a flow is on screen, derived from the URL hash fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "index", rename_all = "kebab-case")]
pub enum NavigationState {
    Summary,
    EditingSlot(usize),
}

impl NavigationState {
    /// Maps a 0-based step to a state; steps outside `0..max_slots` mean summary.
    pub fn from_step(step: Option<usize>, max_slots: usize) -> Self {
        match step {
            Some(index) if index < max_slots => NavigationState::EditingSlot(index),
            _ => NavigationState::Summary,
        }
    }

    pub fn step(&self) -> Option<usize> {
        match self {
            NavigationState::Summary => None,
            NavigationState::EditingSlot(index) => Some(*index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(id: &str) -> SlotFill {
        SlotFill::new(
            Arc::new(Token::bare(TokenIdentity::new("eth", "0xabc", id))),
            Attribution::anonymous(),
        )
    }

    #[test]
    fn bounds_are_validated() {
        assert!(SlotSet::new(1, 3).is_ok());
        assert!(SlotSet::new(0, 1).is_ok());
        assert!(SlotSet::new(2, 1).is_err());
        assert!(SlotSet::new(0, 0).is_err());
        assert!(SlotSet::new(1, MAX_SLOTS + 1).is_err());
    }

    #[test]
    fn clearing_keeps_length_and_neighbours() {
        let mut set = SlotSet::new(1, 3).unwrap();
        assert!(set.fill(0, fill("1")));
        assert!(set.fill(2, fill("3")));
        assert!(!set.fill(3, fill("4")));

        set.clear(0);
        assert_eq!(set.max_slots(), 3);
        assert!(!set.is_filled(0));
        assert_eq!(set.get(2).unwrap().identity().token_id, "3");
        assert_eq!(set.submission(), vec![TokenIdentity::new("eth", "0xabc", "3")]);
    }

    #[test]
    fn required_is_derived_from_min_slots() {
        let set = SlotSet::new(2, 4).unwrap();
        let required: Vec<bool> = set.slots().map(|slot| slot.required).collect();
        assert_eq!(required, vec![true, true, false, false]);
        assert_eq!(set.empty_required(), vec![0, 1]);
    }

    #[test]
    fn navigation_state_from_step_rejects_out_of_range() {
        assert_eq!(
            NavigationState::from_step(Some(0), 3),
            NavigationState::EditingSlot(0)
        );
        assert_eq!(NavigationState::from_step(Some(3), 3), NavigationState::Summary);
        assert_eq!(NavigationState::from_step(None, 3), NavigationState::Summary);
    }
}
