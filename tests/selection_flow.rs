use std::sync::{Arc, Mutex};

use anyhow::Result;
use pretty_assertions::assert_eq;

use slotfill_kernel_rs::core::slots::{Attribution, NavigationState};
use slotfill_kernel_rs::core::token::{Token, TokenIdentity};
use slotfill_kernel_rs::navigation::{LocationPort, MemoryLocation, NavigationPort};
use slotfill_kernel_rs::preselect::{
    Collection, CollectionSource, FavoritesSource, PreselectionSource, RandomIndex,
};
use slotfill_kernel_rs::resolution::{LookupResult, TokenLookup};
use slotfill_kernel_rs::selection::{
    Collaborators, FlowOptions, InitSource, SelectionFlow, StepperFlow,
};

struct Catalog;

impl TokenLookup for Catalog {
    fn lookup(&self, identity: &TokenIdentity) -> LookupResult {
        Ok(Some(Arc::new(
            Token::bare(identity.clone()).with_name(format!("Token {}", identity.token_id)),
        )))
    }
}

struct Favorites(Vec<Arc<Token>>);

impl FavoritesSource for Favorites {
    fn favorites(&self) -> Result<Vec<Arc<Token>>> {
        Ok(self.0.clone())
    }
}

/// Records every supported-list call and every token fetch.
#[derive(Default)]
struct Collections {
    listed: Mutex<usize>,
    fetched: Mutex<Vec<u64>>,
}

impl CollectionSource for Collections {
    fn supported_collections(&self) -> Result<Vec<Collection>> {
        *self.listed.lock().unwrap() += 1;
        Ok(vec![mascots(3)])
    }

    fn token_at(&self, collection: &Collection, index: u64) -> Result<Option<Arc<Token>>> {
        self.fetched.lock().unwrap().push(index);
        Ok(Some(Arc::new(Token::bare(TokenIdentity::new(
            collection.chain.clone(),
            collection.address.clone(),
            index.to_string(),
        )))))
    }
}

/// Real randomness, but every bound and pick is recorded.
#[derive(Default)]
struct RecordingRandom(Mutex<Vec<(u64, u64)>>);

impl RandomIndex for RecordingRandom {
    fn pick(&self, upper: u64) -> u64 {
        let value = slotfill_kernel_rs::preselect::ThreadRandom.pick(upper);
        self.0.lock().unwrap().push((upper, value));
        value
    }
}

fn mascots(size: u64) -> Collection {
    Collection {
        chain: "eth".into(),
        address: "0xmascot".into(),
        size,
        name: Some("Mascots".into()),
    }
}

fn collaborators(
    favorites: Vec<Arc<Token>>,
) -> (Collaborators, Arc<Collections>, Arc<RecordingRandom>) {
    let collections = Arc::new(Collections::default());
    let random = Arc::new(RecordingRandom::default());
    let collaborators = Collaborators::new(
        Arc::new(Catalog),
        Arc::new(Favorites(favorites)),
        collections.clone(),
    )
    .with_random(random.clone());
    (collaborators, collections, random)
}

fn token(id: &str) -> Arc<Token> {
    Arc::new(Token::bare(TokenIdentity::new("eth", "0xabc", id)))
}

#[test]
fn shared_link_with_only_second_slot_is_ready() {
    let location = MemoryLocation::parse(
        "https://app.test/duo?nft_1_chain=eth&nft_1_address=0xabc&nft_1_id=22&nft_1_username=friend",
    )
    .unwrap();
    let (collaborators, collections, _) = collaborators(Vec::new());
    let flow = SelectionFlow::mount(location, FlowOptions::new(1, 3), collaborators).unwrap();

    assert!(!flow.slots().is_filled(0));
    assert_eq!(flow.slots().get(1).unwrap().token.name.as_deref(), Some("Token 22"));
    assert_eq!(
        flow.slots().get(1).unwrap().attribution.username.as_deref(),
        Some("friend")
    );
    assert!(!flow.slots().is_filled(2));
    assert!(flow.has_empty_slots());
    assert!(flow.is_ready_to_submit());
    assert_eq!(flow.mount_report().source, InitSource::Url);
    assert!(collections.fetched.lock().unwrap().is_empty());
}

#[test]
fn default_collection_fills_required_slots_with_one_token() {
    let location = MemoryLocation::parse("https://app.test/trio").unwrap();
    let (collaborators, collections, random) = collaborators(Vec::new());
    let options = FlowOptions::new(2, 3).with_default_collection(Some(mascots(500)));
    let flow = SelectionFlow::mount(location, options, collaborators).unwrap();

    let picks = random.0.lock().unwrap().clone();
    assert_eq!(picks.len(), 1);
    let (upper, value) = picks[0];
    assert_eq!(upper, 500);
    assert!(value < 500);
    assert_eq!(*collections.fetched.lock().unwrap(), vec![value]);
    assert_eq!(*collections.listed.lock().unwrap(), 0);

    let first = flow.slots().get(0).unwrap();
    let second = flow.slots().get(1).unwrap();
    assert!(Arc::ptr_eq(&first.token, &second.token));
    assert_eq!(first.identity().token_id, value.to_string());
    assert!(!flow.slots().is_filled(2));
    assert_eq!(
        flow.mount_report().source,
        InitSource::Preselection(PreselectionSource::DefaultCollection)
    );

    let query = flow.location().query_params();
    assert_eq!(
        query.get("nft_1_id").and_then(|v| v.as_str()),
        Some(value.to_string().as_str())
    );
}

#[test]
fn favorites_take_priority_over_collections() {
    let location = MemoryLocation::parse("https://app.test/trio").unwrap();
    let (collaborators, collections, random) = collaborators(vec![token("f1"), token("f2")]);
    let options = FlowOptions::new(2, 2).with_default_collection(Some(mascots(500)));
    let flow = SelectionFlow::mount(location, options, collaborators).unwrap();

    assert_eq!(flow.submission().unwrap().len(), 2);
    assert_eq!(flow.slots().get(1).unwrap().identity().token_id, "f2");
    assert!(random.0.lock().unwrap().is_empty());
    assert!(collections.fetched.lock().unwrap().is_empty());
    assert_eq!(*collections.listed.lock().unwrap(), 0);
}

#[test]
fn hash_drives_navigation_and_last_selection_clears_it() {
    let location = MemoryLocation::parse("https://app.test/duo#1").unwrap();
    let (collaborators, _, _) = collaborators(Vec::new());
    let user = Attribution::new(Some("u-1".into()), None);
    let options = FlowOptions::new(0, 2).with_user(user.clone());
    let mut flow = StepperFlow::mount(location, options, collaborators).unwrap();

    assert_eq!(flow.navigation(), NavigationState::EditingSlot(0));
    assert_eq!(flow.picker(), Some(0));
    assert_eq!(flow.step_number(), Some(1));

    flow.select_token(0, Some(token("1")));
    assert_eq!(flow.location().current_step(), Some(1));
    assert_eq!(flow.slots().get(0).unwrap().attribution, user);

    flow.select_token(1, Some(token("2")));
    assert_eq!(flow.navigation(), NavigationState::Summary);
    assert_eq!(flow.location().fragment(), None);
    assert_eq!(flow.location().current_step(), None);
    assert_eq!(flow.step_number(), None);

    let submission: Vec<String> = flow
        .submission()
        .unwrap()
        .into_iter()
        .map(|identity| identity.token_id)
        .collect();
    assert_eq!(submission, vec!["1", "2"]);
}

#[test]
fn back_and_forward_replay_steps() {
    let location = MemoryLocation::parse("https://app.test/trio").unwrap();
    let (collaborators, _, _) = collaborators(Vec::new());
    let mut flow = SelectionFlow::mount(location, FlowOptions::new(0, 3), collaborators).unwrap();
    assert_eq!(flow.navigation(), NavigationState::EditingSlot(0));

    flow.select_token(0, Some(token("1")));
    flow.skip(1);
    assert_eq!(flow.navigation(), NavigationState::EditingSlot(2));

    flow.location_mut().back();
    flow.sync();
    assert_eq!(flow.navigation(), NavigationState::EditingSlot(1));
    assert_eq!(flow.picker(), Some(1));

    flow.location_mut().back();
    flow.sync();
    assert_eq!(flow.navigation(), NavigationState::EditingSlot(0));
    assert_eq!(flow.picker(), None);

    flow.location_mut().forward();
    flow.sync();
    assert_eq!(flow.navigation(), NavigationState::EditingSlot(1));

    // slot 0 stays filled through history moves
    assert!(flow.slots().is_filled(0));
    assert!(flow.location().href().contains("nft_0_id=1"));
}

#[test]
fn out_of_range_hash_shows_summary() {
    let location = MemoryLocation::parse("https://app.test/duo#9").unwrap();
    let (collaborators, _, _) = collaborators(vec![token("f1")]);
    let flow = SelectionFlow::mount(location, FlowOptions::new(1, 2), collaborators).unwrap();
    assert_eq!(flow.navigation(), NavigationState::Summary);
    assert!(!flow.can_advance());
}

#[test]
fn unmounted_flow_ignores_actions() {
    let location = MemoryLocation::parse("https://app.test/duo").unwrap();
    let (collaborators, _, _) = collaborators(Vec::new());
    let mut flow = SelectionFlow::mount(location, FlowOptions::new(0, 2), collaborators).unwrap();
    let before = flow.location().href();

    flow.unmount();
    assert!(flow.select_token(0, Some(token("1"))).is_empty());
    assert!(!flow.slots().is_filled(0));
    assert_eq!(flow.location().href(), before);
}

#[test]
fn invalid_bounds_fail_to_mount() {
    let location = MemoryLocation::parse("https://app.test/").unwrap();
    let (collaborators, _, _) = collaborators(Vec::new());
    assert!(
        SelectionFlow::mount(location.clone(), FlowOptions::new(3, 2), collaborators.clone())
            .is_err()
    );
    assert!(SelectionFlow::mount(location, FlowOptions::new(1, 11), collaborators).is_err());
}
