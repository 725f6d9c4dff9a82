//! Collaborator traits backed by registry contracts. Hosts bind whichever
//! implementation they have (demo catalog, HTTP service, test doubles) and flows
//! only ever see the traits.

use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::core::token::{Token, TokenIdentity};
use crate::preselect::{Collection, CollectionSource, FavoritesSource};
use crate::registry::{Context, Registry};
use crate::resolution::{LookupError, LookupResult, TokenLookup};
use crate::selection::Collaborators;

pub const CONTRACT_TOKEN_LOOKUP: &str = "slotfill://contract/tokens/lookup@1";
pub const CONTRACT_FAVORITES: &str = "slotfill://contract/favorites/list@1";
pub const CONTRACT_COLLECTIONS: &str = "slotfill://contract/collections/list@1";
pub const CONTRACT_TOKEN_AT: &str = "slotfill://contract/collections/token-at@1";

#[derive(Clone)]
pub struct RegistryCollaborators {
    registry: Registry,
}

impl RegistryCollaborators {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// One shared instance behind every collaborator slot.
    pub fn into_collaborators(self) -> Collaborators {
        let shared = Arc::new(self);
        Collaborators::new(shared.clone(), shared.clone(), shared)
    }

    fn call(&self, contract: &str, input: Value) -> Result<Value> {
        let mut ctx = self.registry.context();
        ctx.call(contract, input)
    }
}

fn field<T: DeserializeOwned>(output: &Value, key: &str, contract: &str) -> Result<T> {
    let value = output.get(key).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .with_context(|| format!("{contract} returned an invalid `{key}` field"))
}

impl TokenLookup for RegistryCollaborators {
    fn lookup(&self, identity: &TokenIdentity) -> LookupResult {
        let input = serde_json::to_value(identity)
            .map_err(|err| LookupError::Malformed(err.to_string()))?;
        let output = self
            .call(CONTRACT_TOKEN_LOOKUP, input)
            .map_err(|err| match err.downcast_ref::<LookupError>() {
                Some(lookup_err) => lookup_err.clone(),
                None => LookupError::Transport(format!("{err:#}")),
            })?;
        let token: Option<Token> = field(&output, "token", CONTRACT_TOKEN_LOOKUP)
            .map_err(|err| LookupError::Malformed(format!("{err:#}")))?;
        Ok(token.map(Arc::new))
    }
}

impl FavoritesSource for RegistryCollaborators {
    fn favorites(&self) -> Result<Vec<Arc<Token>>> {
        let output = self.call(CONTRACT_FAVORITES, json!({}))?;
        let tokens: Option<Vec<Token>> = field(&output, "tokens", CONTRACT_FAVORITES)?;
        Ok(tokens.unwrap_or_default().into_iter().map(Arc::new).collect())
    }
}

impl CollectionSource for RegistryCollaborators {
    fn supported_collections(&self) -> Result<Vec<Collection>> {
        let output = self.call(CONTRACT_COLLECTIONS, json!({}))?;
        let collections: Option<Vec<Collection>> =
            field(&output, "collections", CONTRACT_COLLECTIONS)?;
        Ok(collections.unwrap_or_default())
    }

    fn token_at(&self, collection: &Collection, index: u64) -> Result<Option<Arc<Token>>> {
        let output = self.call(
            CONTRACT_TOKEN_AT,
            json!({ "collection": collection, "index": index }),
        )?;
        let token: Option<Token> = field(&output, "token", CONTRACT_TOKEN_AT)?;
        Ok(token.map(Arc::new))
    }
}

/// Registers `lookup` under `implementation` and binds the lookup contract to it.
pub fn register_lookup_impl(
    registry: &Registry,
    implementation: &str,
    lookup: Arc<dyn TokenLookup>,
) {
    registry.register(
        implementation.to_string(),
        move |_ctx: &mut Context, input: Value| {
            let identity: TokenIdentity =
                serde_json::from_value(input).context("invalid token identity")?;
            match lookup.lookup(&identity) {
                Ok(token) => Ok(json!({ "token": token })),
                Err(err) => Err(anyhow::Error::new(err)),
            }
        },
    );
    registry.set_binding(CONTRACT_TOKEN_LOOKUP, implementation);
}
