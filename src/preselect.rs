//! Default fills for empty required slots when a flow starts with no URL state.
//!
//! Priority: the user's favorites, then one random token from the designated
//! default collection, then one random token from a random supported collection.
//! A single fetched token is repeated across every required slot.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::token::Token;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub chain: String,
    #[serde(alias = "contractAddress")]
    pub address: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub trait FavoritesSource: Send + Sync {
    /// The current user's saved tokens, in favorite order.
    fn favorites(&self) -> Result<Vec<Arc<Token>>>;
}

pub trait CollectionSource: Send + Sync {
    fn supported_collections(&self) -> Result<Vec<Collection>>;
    fn token_at(&self, collection: &Collection, index: u64) -> Result<Option<Arc<Token>>>;
}

/// Uniform integer in `[0, upper)`; `upper` is never zero.
pub trait RandomIndex: Send + Sync {
    fn pick(&self, upper: u64) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomIndex for ThreadRandom {
    fn pick(&self, upper: u64) -> u64 {
        rand::rng().random_range(0..upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreselectionSource {
    Favorites,
    DefaultCollection,
    RandomCollection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preselection {
    pub source: PreselectionSource,
    pub tokens: Vec<Arc<Token>>,
}

pub struct PreselectionResolver<'a> {
    favorites: &'a dyn FavoritesSource,
    collections: &'a dyn CollectionSource,
    random: &'a dyn RandomIndex,
    default_collection: Option<&'a Collection>,
}

impl<'a> PreselectionResolver<'a> {
    pub fn new(
        favorites: &'a dyn FavoritesSource,
        collections: &'a dyn CollectionSource,
        random: &'a dyn RandomIndex,
    ) -> Self {
        Self {
            favorites,
            collections,
            random,
            default_collection: None,
        }
    }

    pub fn with_default_collection(mut self, collection: Option<&'a Collection>) -> Self {
        self.default_collection = collection;
        self
    }

    /// Up to `count` tokens for the required slots, or `None` when every source
    /// came up empty. Collaborator failures fall through to the next source.
    pub fn resolve(&self, count: usize) -> Option<Preselection> {
        if count == 0 {
            return None;
        }

        match self.favorites.favorites() {
            Ok(favorites) if !favorites.is_empty() => {
                let tokens: Vec<Arc<Token>> = favorites.into_iter().take(count).collect();
                log::debug!("preselecting {} favorite(s)", tokens.len());
                return Some(Preselection {
                    source: PreselectionSource::Favorites,
                    tokens,
                });
            }
            Ok(_) => {}
            Err(err) => log::warn!("favorites unavailable for preselection: {err:#}"),
        }

        if let Some(collection) = self.default_collection {
            if let Some(token) = self.random_token(collection) {
                return Some(Preselection {
                    source: PreselectionSource::DefaultCollection,
                    tokens: vec![token; count],
                });
            }
        }

        let supported = match self.collections.supported_collections() {
            Ok(list) => list,
            Err(err) => {
                log::warn!("supported collections unavailable for preselection: {err:#}");
                Vec::new()
            }
        };
        let candidates: Vec<&Collection> = supported.iter().filter(|c| c.size > 0).collect();
        if candidates.is_empty() {
            return None;
        }
        let chosen = candidates[self.random.pick(candidates.len() as u64) as usize];
        let token = self.random_token(chosen)?;
        Some(Preselection {
            source: PreselectionSource::RandomCollection,
            tokens: vec![token; count],
        })
    }

    fn random_token(&self, collection: &Collection) -> Option<Arc<Token>> {
        if collection.size == 0 {
            return None;
        }
        let index = self.random.pick(collection.size);
        match self.collections.token_at(collection, index) {
            Ok(token) => token,
            Err(err) => {
                log::warn!(
                    "random token {index} of {}:{} unavailable: {err:#}",
                    collection.chain,
                    collection.address
                );
                None
            }
        }
    }
}

const GUARD_IDLE: u8 = 0;
const GUARD_IN_FLIGHT: u8 = 1;
const GUARD_DONE: u8 = 2;

/// Single-flight latch: preselection runs at most once per flow instance, and only
/// while neither URL state nor a selection exists.
#[derive(Debug, Default)]
pub struct PreselectionGuard {
    state: AtomicU8,
}

impl PreselectionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self, has_url_params: bool, has_selection: bool) -> Option<PreselectionTicket<'_>> {
        if has_url_params || has_selection {
            return None;
        }
        self.state
            .compare_exchange(GUARD_IDLE, GUARD_IN_FLIGHT, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PreselectionTicket { guard: self })
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.load(Ordering::SeqCst) == GUARD_IN_FLIGHT
    }

    pub fn has_run(&self) -> bool {
        self.state.load(Ordering::SeqCst) == GUARD_DONE
    }
}

/// Held while a preselection fetch is running; marks the guard done on drop.
pub struct PreselectionTicket<'a> {
    guard: &'a PreselectionGuard,
}

impl Drop for PreselectionTicket<'_> {
    fn drop(&mut self) {
        self.guard.state.store(GUARD_DONE, Ordering::SeqCst);
    }
}
