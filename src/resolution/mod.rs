//! Turns raw identities decoded from the URL into resolved tokens.
//!
//! Lookups for different slots run on their own threads and report back over a
//! channel tagged with the originating index, so completion order never affects
//! placement.

pub mod cache;
pub mod http;

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::core::token::{Token, TokenIdentity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Network failure or an unexpected status. A 404 is not an error.
    Transport(String),
    /// The service answered but the body was not a token record.
    Malformed(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Transport(msg) => write!(f, "token lookup failed: {msg}"),
            LookupError::Malformed(msg) => write!(f, "malformed token record: {msg}"),
        }
    }
}

impl std::error::Error for LookupError {}

pub type LookupResult = Result<Option<Arc<Token>>, LookupError>;

/// Resolves one identity. `Ok(None)` means the token does not exist.
pub trait TokenLookup: Send + Sync {
    fn lookup(&self, identity: &TokenIdentity) -> LookupResult;
}

impl<T: TokenLookup + ?Sized> TokenLookup for Arc<T> {
    fn lookup(&self, identity: &TokenIdentity) -> LookupResult {
        (**self).lookup(identity)
    }
}

impl<T: TokenLookup + ?Sized> TokenLookup for &T {
    fn lookup(&self, identity: &TokenIdentity) -> LookupResult {
        (**self).lookup(identity)
    }
}

/// Per-slot outcome of a sparse resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotResolution {
    Resolved(Arc<Token>),
    NotFound,
    Failed(LookupError),
}

impl SlotResolution {
    pub fn token(&self) -> Option<&Arc<Token>> {
        match self {
            SlotResolution::Resolved(token) => Some(token),
            _ => None,
        }
    }
}

impl From<LookupResult> for SlotResolution {
    fn from(result: LookupResult) -> Self {
        match result {
            Ok(Some(token)) => SlotResolution::Resolved(token),
            Ok(None) => SlotResolution::NotFound,
            Err(err) => SlotResolution::Failed(err),
        }
    }
}

/// Issues one lookup per defined entry concurrently and calls `on_complete` on the
/// calling thread as each finishes, in completion order, with the original index.
pub fn resolve_each<L, F>(lookup: &L, identities: &[Option<TokenIdentity>], mut on_complete: F)
where
    L: TokenLookup + ?Sized,
    F: FnMut(usize, SlotResolution),
{
    let (tx, rx) = mpsc::channel::<(usize, SlotResolution)>();
    thread::scope(|scope| {
        for (index, identity) in identities.iter().enumerate() {
            let Some(identity) = identity else {
                continue;
            };
            let tx = tx.clone();
            scope.spawn(move || {
                let outcome = SlotResolution::from(lookup.lookup(identity));
                let _ = tx.send((index, outcome));
            });
        }
        drop(tx);
        for (index, outcome) in rx {
            if let SlotResolution::Failed(err) = &outcome {
                log::warn!("slot {index} unresolved: {err}");
            }
            on_complete(index, outcome);
        }
    });
}

/// Sparse input in, sparse output of the same length out. Undefined entries stay
/// `None`; everything else carries its per-slot outcome.
pub fn resolve_sparse<L>(
    lookup: &L,
    identities: &[Option<TokenIdentity>],
) -> Vec<Option<SlotResolution>>
where
    L: TokenLookup + ?Sized,
{
    let mut out: Vec<Option<SlotResolution>> = vec![None; identities.len()];
    resolve_each(lookup, identities, |index, outcome| {
        out[index] = Some(outcome);
    });
    out
}

/// Token-only view of [`resolve_sparse`]: failures and 404s collapse to `None`.
pub fn resolve_tokens<L>(lookup: &L, identities: &[Option<TokenIdentity>]) -> Vec<Option<Arc<Token>>>
where
    L: TokenLookup + ?Sized,
{
    resolve_sparse(lookup, identities)
        .into_iter()
        .map(|entry| entry.and_then(|outcome| outcome.token().cloned()))
        .collect()
}
