use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{LookupResult, TokenLookup};
use crate::core::token::{Token, TokenIdentity};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Resolved tokens keyed by identity with a bounded freshness window.
pub struct TokenCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<TokenIdentity, (Instant, Arc<Token>)>>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh entry for `identity`; a stale one is evicted and reported as a miss.
    pub fn get(&self, identity: &TokenIdentity) -> Option<Arc<Token>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("token cache poisoned");
        match entries.get(identity) {
            Some((stored, token)) if now.saturating_duration_since(*stored) < self.ttl => {
                Some(token.clone())
            }
            Some(_) => {
                entries.remove(identity);
                None
            }
            None => None,
        }
    }

    /// Stores `token` under the identity it was requested by, which may differ
    /// from the identity the service normalized it to.
    pub fn insert(&self, identity: TokenIdentity, token: Arc<Token>) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("token cache poisoned");
        entries.insert(identity, (now, token));
    }

    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("token cache poisoned");
        let before = entries.len();
        entries.retain(|_, (stored, _)| now.saturating_duration_since(*stored) < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("token cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serves fresh cached tokens and fills the cache from `inner` on a miss.
/// Missing tokens and failures are never cached.
pub struct CachedLookup<L> {
    inner: L,
    cache: TokenCache,
}

impl<L: TokenLookup> CachedLookup<L> {
    pub fn new(inner: L, cache: TokenCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }
}

impl<L: TokenLookup> TokenLookup for CachedLookup<L> {
    fn lookup(&self, identity: &TokenIdentity) -> LookupResult {
        if let Some(hit) = self.cache.get(identity) {
            log::debug!("token cache hit for {identity}");
            return Ok(Some(hit));
        }
        let result = self.inner.lookup(identity)?;
        if let Some(token) = &result {
            self.cache.insert(identity.clone(), token.clone());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    struct CountingLookup {
        calls: AtomicUsize,
        known: bool,
    }

    impl TokenLookup for CountingLookup {
        fn lookup(&self, identity: &TokenIdentity) -> LookupResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.known {
                Ok(Some(Arc::new(Token::bare(identity.clone()))))
            } else {
                Ok(None)
            }
        }
    }

    fn identity() -> TokenIdentity {
        TokenIdentity::new("eth", "0xabc", "1")
    }

    #[test]
    fn entries_expire_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = TokenCache::with_clock(Duration::from_secs(300), clock.clone());
        cache.insert(identity(), Arc::new(Token::bare(identity())));

        clock.advance(Duration::from_secs(299));
        assert!(cache.get(&identity()).is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&identity()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_drops_only_stale_entries() {
        let clock = Arc::new(ManualClock::new());
        let cache = TokenCache::with_clock(Duration::from_secs(10), clock.clone());
        cache.insert(identity(), Arc::new(Token::bare(identity())));
        clock.advance(Duration::from_secs(11));
        let other = TokenIdentity::new("eth", "0xabc", "2");
        cache.insert(other.clone(), Arc::new(Token::bare(other)));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cached_lookup_hits_inner_once() {
        let lookup = CachedLookup::new(
            CountingLookup {
                calls: AtomicUsize::new(0),
                known: true,
            },
            TokenCache::new(DEFAULT_TTL),
        );
        let first = lookup.lookup(&identity()).unwrap().unwrap();
        let second = lookup.lookup(&identity()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(lookup.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn not_found_is_not_cached() {
        let lookup = CachedLookup::new(
            CountingLookup {
                calls: AtomicUsize::new(0),
                known: false,
            },
            TokenCache::new(DEFAULT_TTL),
        );
        assert!(lookup.lookup(&identity()).unwrap().is_none());
        assert!(lookup.lookup(&identity()).unwrap().is_none());
        assert_eq!(lookup.inner.calls.load(Ordering::SeqCst), 2);
    }

    struct LowercasingLookup {
        calls: AtomicUsize,
    }

    impl TokenLookup for LowercasingLookup {
        fn lookup(&self, identity: &TokenIdentity) -> LookupResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let normalized = TokenIdentity::new(
                identity.chain.clone(),
                identity.contract_address.to_lowercase(),
                identity.token_id.clone(),
            );
            Ok(Some(Arc::new(Token::bare(normalized))))
        }
    }

    #[test]
    fn normalized_service_identity_still_hits_the_requested_key() {
        let lookup = CachedLookup::new(
            LowercasingLookup {
                calls: AtomicUsize::new(0),
            },
            TokenCache::new(DEFAULT_TTL),
        );
        let requested = TokenIdentity::new("eth", "0xABC", "1");
        for _ in 0..3 {
            let token = lookup.lookup(&requested).unwrap().unwrap();
            assert_eq!(token.identity.contract_address, "0xabc");
        }
        assert_eq!(lookup.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lookup.cache().len(), 1);
        assert!(lookup.cache().get(&requested).is_some());
    }
}
