use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use super::machine::{Effect, FlowEvent, SelectionMachine};
use crate::core::codec::{self, ParamScope};
use crate::core::slots::{Attribution, NavigationState, SlotFill, SlotSet};
use crate::core::token::{Token, TokenIdentity};
use crate::navigation::LocationPort;
use crate::preselect::{
    Collection, CollectionSource, FavoritesSource, PreselectionGuard, PreselectionResolver,
    PreselectionSource, RandomIndex, ThreadRandom,
};
use crate::resolution::{self, TokenLookup};

#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub min_slots: usize,
    pub max_slots: usize,
    pub user: Attribution,
    pub default_collection: Option<Collection>,
}

impl FlowOptions {
    pub fn new(min_slots: usize, max_slots: usize) -> Self {
        Self {
            min_slots,
            max_slots,
            user: Attribution::anonymous(),
            default_collection: None,
        }
    }

    pub fn with_user(mut self, user: Attribution) -> Self {
        self.user = user;
        self
    }

    pub fn with_default_collection(mut self, collection: Option<Collection>) -> Self {
        self.default_collection = collection;
        self
    }
}

/// External services a flow talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub lookup: Arc<dyn TokenLookup>,
    pub favorites: Arc<dyn FavoritesSource>,
    pub collections: Arc<dyn CollectionSource>,
    pub random: Arc<dyn RandomIndex>,
}

impl Collaborators {
    pub fn new(
        lookup: Arc<dyn TokenLookup>,
        favorites: Arc<dyn FavoritesSource>,
        collections: Arc<dyn CollectionSource>,
    ) -> Self {
        Self {
            lookup,
            favorites,
            collections,
            random: Arc::new(ThreadRandom),
        }
    }

    pub fn with_random(mut self, random: Arc<dyn RandomIndex>) -> Self {
        self.random = random;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "kebab-case")]
pub enum InitSource {
    Empty,
    Url,
    Preselection(PreselectionSource),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountReport {
    pub source: InitSource,
    /// URL slots whose token could not be resolved.
    pub unresolved: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSnapshot {
    pub index: usize,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_by: Option<SlotFill>,
}

/// Serializable view of a flow at one point in time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    pub slots: Vec<SlotSnapshot>,
    pub navigation: NavigationState,
    pub picker: Option<usize>,
    pub has_empty_slots: bool,
    pub can_advance: bool,
    pub ready_to_submit: bool,
    pub submission: Option<Vec<TokenIdentity>>,
    pub mount: MountReport,
}

/// A [`SelectionMachine`] wired to a location port and the lookup services.
///
/// Mounting decodes the URL, resolves any slots it names, otherwise runs the
/// preselection chain, and finally enters the step carried by the hash.
pub struct SelectionFlow<P: LocationPort> {
    machine: SelectionMachine,
    location: P,
    collaborators: Collaborators,
    default_collection: Option<Collection>,
    guard: Arc<PreselectionGuard>,
    report: MountReport,
}

impl<P: LocationPort> SelectionFlow<P> {
    pub fn mount(location: P, options: FlowOptions, collaborators: Collaborators) -> Result<Self> {
        let machine = SelectionMachine::new(options.min_slots, options.max_slots, options.user)?;
        let mut flow = Self {
            machine,
            location,
            collaborators,
            default_collection: options.default_collection,
            guard: Arc::new(PreselectionGuard::new()),
            report: MountReport {
                source: InitSource::Empty,
                unresolved: Vec::new(),
            },
        };
        flow.initialize();
        Ok(flow)
    }

    fn initialize(&mut self) {
        let decoded = codec::decode(&self.location.query_params());
        let identities: Vec<Option<TokenIdentity>> = decoded
            .iter()
            .take(self.machine.slots().max_slots())
            .map(|entry| entry.as_ref().map(|params| params.identity.clone()))
            .collect();
        self.dispatch(FlowEvent::UrlLoaded { slots: decoded });

        if self.machine.has_url_state() {
            self.report.source = InitSource::Url;
            self.resolve_url_slots(&identities);
        } else {
            self.preselect();
        }

        let step = self.location.current_step();
        self.dispatch(FlowEvent::Started { step });
        self.sync();
    }

    fn resolve_url_slots(&mut self, identities: &[Option<TokenIdentity>]) {
        let lookup = self.collaborators.lookup.clone();
        resolution::resolve_each(lookup.as_ref(), identities, |index, outcome| {
            let token = outcome.token().cloned();
            self.dispatch(FlowEvent::ResolutionCompleted { index, token });
        });
        self.report.unresolved = self.machine.unresolved();
        if !self.report.unresolved.is_empty() {
            log::info!(
                "{} url slot(s) left for manual selection: {:?}",
                self.report.unresolved.len(),
                self.report.unresolved
            );
        }
    }

    /// Runs the preselection chain once, and only while the flow has neither URL
    /// state nor a selection.
    pub fn preselect(&mut self) -> Option<PreselectionSource> {
        let guard = self.guard.clone();
        let _ticket = guard.try_begin(
            self.machine.has_url_state(),
            self.machine.slots().filled_count() > 0,
        )?;
        let preselection = {
            let resolver = PreselectionResolver::new(
                self.collaborators.favorites.as_ref(),
                self.collaborators.collections.as_ref(),
                self.collaborators.random.as_ref(),
            )
            .with_default_collection(self.default_collection.as_ref());
            resolver.resolve(self.machine.slots().min_slots())
        }?;
        let source = preselection.source;
        log::info!(
            "preselected {} token(s) from {source:?}",
            preselection.tokens.len()
        );
        self.dispatch(FlowEvent::PreselectionCompleted {
            tokens: preselection.tokens,
        });
        self.report.source = InitSource::Preselection(source);
        Some(source)
    }

    fn dispatch(&mut self, event: FlowEvent) -> Vec<Effect> {
        let effects = self.machine.handle(event);
        for effect in &effects {
            match effect {
                Effect::WriteParams(params) => {
                    self.location.write_params(ParamScope::Slots, params)
                }
                Effect::SetStep(step) => self.location.set_current_step(*step),
                Effect::OpenPicker(index) => log::debug!("picker opened for slot {index}"),
                Effect::ClosePicker => log::debug!("picker closed"),
            }
        }
        effects
    }

    /// Feeds every pending hash change of the location into the machine.
    pub fn sync(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        loop {
            let changes = self.location.take_changes();
            if changes.is_empty() {
                return effects;
            }
            for step in changes {
                effects.extend(self.dispatch(FlowEvent::HashChanged { step }));
            }
        }
    }

    fn act(&mut self, event: FlowEvent) -> Vec<Effect> {
        let mut effects = self.dispatch(event);
        effects.extend(self.sync());
        effects
    }

    pub fn select_token(&mut self, index: usize, token: Option<Arc<Token>>) -> Vec<Effect> {
        self.act(FlowEvent::UserSelected { index, token })
    }

    pub fn skip(&mut self, index: usize) -> Vec<Effect> {
        self.act(FlowEvent::UserSkipped { index })
    }

    pub fn modify(&mut self, index: usize) -> Vec<Effect> {
        self.act(FlowEvent::UserModified { index })
    }

    pub fn clear(&mut self, index: usize) -> Vec<Effect> {
        self.act(FlowEvent::UserCleared { index })
    }

    /// After unmount the flow ignores every event, including late resolutions.
    pub fn unmount(&mut self) {
        self.dispatch(FlowEvent::Unmounted);
    }

    pub fn machine(&self) -> &SelectionMachine {
        &self.machine
    }

    pub fn slots(&self) -> &SlotSet {
        self.machine.slots()
    }

    pub fn navigation(&self) -> NavigationState {
        self.machine.navigation()
    }

    pub fn picker(&self) -> Option<usize> {
        self.machine.picker()
    }

    pub fn location(&self) -> &P {
        &self.location
    }

    /// Direct access for history navigation; call [`SelectionFlow::sync`] afterwards.
    pub fn location_mut(&mut self) -> &mut P {
        &mut self.location
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn mount_report(&self) -> &MountReport {
        &self.report
    }

    pub fn has_empty_slots(&self) -> bool {
        self.machine.has_empty_slots()
    }

    pub fn can_advance(&self) -> bool {
        self.machine.can_advance()
    }

    pub fn is_ready_to_submit(&self) -> bool {
        self.machine.is_ready_to_submit()
    }

    pub fn submission(&self) -> Option<Vec<TokenIdentity>> {
        self.machine.submission()
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            slots: self
                .slots()
                .slots()
                .map(|slot| SlotSnapshot {
                    index: slot.index,
                    required: slot.required,
                    filled_by: slot.filled_by.cloned(),
                })
                .collect(),
            navigation: self.navigation(),
            picker: self.picker(),
            has_empty_slots: self.has_empty_slots(),
            can_advance: self.can_advance(),
            ready_to_submit: self.is_ready_to_submit(),
            submission: self.submission(),
            mount: self.report.clone(),
        }
    }
}
