use std::sync::Arc;

use crate::core::codec::{self, ParamMap, SlotParams};
use crate::core::slots::{Attribution, NavigationState, SlotBoundsError, SlotFill, SlotSet};
use crate::core::token::{Token, TokenIdentity};
use crate::navigation::{HashOutcome, NavigationController};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Slot state decoded from the query string at mount.
    UrlLoaded { slots: Vec<Option<SlotParams>> },
    ResolutionCompleted {
        index: usize,
        token: Option<Arc<Token>>,
    },
    PreselectionCompleted { tokens: Vec<Arc<Token>> },
    /// Initial hash once URL state and preselection have been applied.
    Started { step: Option<usize> },
    UserSelected {
        index: usize,
        token: Option<Arc<Token>>,
    },
    UserSkipped { index: usize },
    UserModified { index: usize },
    UserCleared { index: usize },
    HashChanged { step: Option<usize> },
    Unmounted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Replace the slot keys of the query string with these.
    WriteParams(ParamMap),
    SetStep(Option<usize>),
    OpenPicker(usize),
    ClosePicker,
}

/// Canonical selection state. Every mutation goes through [`SelectionMachine::handle`],
/// which returns the side effects the host must carry out.
#[derive(Debug, Clone)]
pub struct SelectionMachine {
    slots: SlotSet,
    nav: NavigationController,
    user: Attribution,
    pending: Vec<Option<SlotParams>>,
    url_state: bool,
    picker: Option<usize>,
    mounted: bool,
}

impl SelectionMachine {
    pub fn new(
        min_slots: usize,
        max_slots: usize,
        user: Attribution,
    ) -> Result<Self, SlotBoundsError> {
        let slots = SlotSet::new(min_slots, max_slots)?;
        Ok(Self {
            slots,
            nav: NavigationController::new(max_slots),
            user,
            pending: vec![None; max_slots],
            url_state: false,
            picker: None,
            mounted: true,
        })
    }

    pub fn handle(&mut self, event: FlowEvent) -> Vec<Effect> {
        if !self.mounted {
            log::debug!("dropping {event:?} after unmount");
            return Vec::new();
        }
        match event {
            FlowEvent::UrlLoaded { slots } => self.on_url_loaded(slots),
            FlowEvent::ResolutionCompleted { index, token } => self.on_resolved(index, token),
            FlowEvent::PreselectionCompleted { tokens } => self.on_preselected(tokens),
            FlowEvent::Started { step } => self.on_started(step),
            FlowEvent::UserSelected { index, token } => self.on_selected(index, token),
            FlowEvent::UserSkipped { index } => self.on_skipped(index),
            FlowEvent::UserModified { index } => self.on_modified(index),
            FlowEvent::UserCleared { index } => self.on_cleared(index),
            FlowEvent::HashChanged { step } => match self.nav.on_hash_changed(step) {
                HashOutcome::Entered(state) => self.enter(state),
                HashOutcome::Suppressed | HashOutcome::Unchanged => Vec::new(),
            },
            FlowEvent::Unmounted => {
                self.mounted = false;
                self.picker = None;
                Vec::new()
            }
        }
    }

    fn on_url_loaded(&mut self, slots: Vec<Option<SlotParams>>) -> Vec<Effect> {
        for (index, entry) in slots.into_iter().enumerate() {
            if index >= self.pending.len() {
                if entry.is_some() {
                    log::debug!("ignoring url slot {index} beyond max_slots");
                }
                continue;
            }
            self.pending[index] = entry;
        }
        self.url_state = self.pending.iter().any(Option::is_some);
        Vec::new()
    }

    fn on_resolved(&mut self, index: usize, token: Option<Arc<Token>>) -> Vec<Effect> {
        let Some(params) = self.pending.get(index).and_then(Option::as_ref) else {
            return Vec::new();
        };
        let Some(token) = token else {
            return Vec::new();
        };
        let attribution = params.attribution.clone();
        self.slots.fill(index, SlotFill::new(token, attribution));
        self.pending[index] = None;
        if self.picker == Some(index) {
            self.picker = None;
            return vec![Effect::ClosePicker];
        }
        Vec::new()
    }

    fn on_preselected(&mut self, tokens: Vec<Arc<Token>>) -> Vec<Effect> {
        if self.url_state || self.slots.filled_count() > 0 {
            log::debug!("preselection ignored: selection state already present");
            return Vec::new();
        }
        let targets = self.slots.empty_required();
        let mut filled = 0;
        for (index, token) in targets.into_iter().zip(tokens) {
            self.slots
                .fill(index, SlotFill::new(token, self.user.clone()));
            filled += 1;
        }
        if filled == 0 {
            return Vec::new();
        }
        let mut effects = vec![Effect::WriteParams(self.current_params())];
        if let Some(open) = self.picker {
            if self.slots.is_filled(open) {
                self.picker = None;
                effects.push(Effect::ClosePicker);
            }
        }
        effects
    }

    fn on_started(&mut self, step: Option<usize>) -> Vec<Effect> {
        self.nav.on_hash_changed(step);
        let state = self.nav.state();
        if state == NavigationState::Summary && step.is_none() && self.slots.filled_count() == 0 {
            let target = self.nav.navigate(Some(0));
            let mut effects = vec![Effect::SetStep(target)];
            effects.extend(self.enter(self.nav.state()));
            return effects;
        }
        self.enter(state)
    }

    fn on_selected(&mut self, index: usize, token: Option<Arc<Token>>) -> Vec<Effect> {
        if index >= self.slots.max_slots() {
            log::debug!("select ignored: slot {index} out of range");
            return Vec::new();
        }
        let Some(token) = token else {
            log::debug!("select ignored: no token for slot {index}");
            return Vec::new();
        };
        self.slots
            .fill(index, SlotFill::new(token, self.user.clone()));
        self.pending[index] = None;
        let mut effects = vec![Effect::WriteParams(self.current_params())];
        effects.extend(self.advance(index));
        effects
    }

    fn on_skipped(&mut self, index: usize) -> Vec<Effect> {
        if index >= self.slots.max_slots() || self.slots.is_required(index) {
            log::debug!("skip ignored: slot {index} is required or out of range");
            return Vec::new();
        }
        self.advance(index)
    }

    fn on_modified(&mut self, index: usize) -> Vec<Effect> {
        if index >= self.slots.max_slots() {
            log::debug!("modify ignored: slot {index} out of range");
            return Vec::new();
        }
        let target = self.nav.navigate(Some(index));
        self.picker = Some(index);
        vec![Effect::SetStep(target), Effect::OpenPicker(index)]
    }

    fn on_cleared(&mut self, index: usize) -> Vec<Effect> {
        let had_pending = self
            .pending
            .get(index)
            .map(Option::is_some)
            .unwrap_or(false);
        if self.slots.clear(index).is_none() && !had_pending {
            return Vec::new();
        }
        self.pending[index] = None;
        let mut effects = vec![Effect::WriteParams(self.current_params())];
        if self.nav.state() == NavigationState::EditingSlot(index) {
            effects.extend(self.enter(NavigationState::EditingSlot(index)));
        }
        effects
    }

    fn advance(&mut self, index: usize) -> Vec<Effect> {
        let target = self.nav.advance_from(index);
        let mut effects = vec![Effect::SetStep(target)];
        effects.extend(self.enter(self.nav.state()));
        effects
    }

    /// Empty slots open the picker on entry; filled ones show in display mode.
    fn enter(&mut self, state: NavigationState) -> Vec<Effect> {
        match state {
            NavigationState::EditingSlot(index) if !self.slots.is_filled(index) => {
                if self.picker == Some(index) {
                    return Vec::new();
                }
                self.picker = Some(index);
                vec![Effect::OpenPicker(index)]
            }
            _ => match self.picker.take() {
                Some(_) => vec![Effect::ClosePicker],
                None => Vec::new(),
            },
        }
    }

    /// Query parameters for the current state. Slots that came from the URL but are
    /// still unresolved keep their original parameters.
    pub fn current_params(&self) -> ParamMap {
        let entries: Vec<Option<SlotParams>> = self
            .slots
            .fills()
            .iter()
            .zip(&self.pending)
            .map(|(fill, pending)| match fill {
                Some(fill) => Some(
                    SlotParams::new(fill.identity().clone())
                        .with_attribution(fill.attribution.clone()),
                ),
                None => pending.clone(),
            })
            .collect();
        codec::encode_slots(&entries)
    }

    pub fn slots(&self) -> &SlotSet {
        &self.slots
    }

    pub fn navigation(&self) -> NavigationState {
        self.nav.state()
    }

    pub fn picker(&self) -> Option<usize> {
        self.picker
    }

    pub fn has_url_state(&self) -> bool {
        self.url_state
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// URL-provided slots that have not resolved into a token.
    pub fn unresolved(&self) -> Vec<usize> {
        self.pending
            .iter()
            .enumerate()
            .filter(|(index, entry)| entry.is_some() && !self.slots.is_filled(*index))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn has_empty_slots(&self) -> bool {
        self.slots.has_empty_slots()
    }

    pub fn can_advance(&self) -> bool {
        match self.nav.state() {
            NavigationState::EditingSlot(index) => {
                self.slots.is_filled(index) || !self.slots.is_required(index)
            }
            NavigationState::Summary => false,
        }
    }

    pub fn is_ready_to_submit(&self) -> bool {
        self.slots.is_ready()
    }

    /// Ordered identities for content generation, once enough slots are filled.
    pub fn submission(&self) -> Option<Vec<TokenIdentity>> {
        if self.is_ready_to_submit() {
            Some(self.slots.submission())
        } else {
            None
        }
    }
}
