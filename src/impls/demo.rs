use std::sync::Arc;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::collaborators::{
    CONTRACT_COLLECTIONS, CONTRACT_FAVORITES, CONTRACT_TOKEN_AT, CONTRACT_TOKEN_LOOKUP,
};
use crate::core::token::{Token, TokenIdentity};
use crate::preselect::Collection;
use crate::registry::{Context, Registry};

pub const IMPL_TOKEN_LOOKUP: &str = "slotfill://impl/demo/tokens/lookup@1";
pub const IMPL_FAVORITES: &str = "slotfill://impl/demo/favorites/list@1";
pub const IMPL_COLLECTIONS: &str = "slotfill://impl/demo/collections/list@1";
pub const IMPL_TOKEN_AT: &str = "slotfill://impl/demo/collections/token-at@1";

/// Offline token data: explicit tokens plus collections whose members are
/// synthesized on demand from their index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DemoCatalog {
    pub tokens: Vec<Token>,
    pub collections: Vec<Collection>,
    pub favorites: Vec<TokenIdentity>,
}

impl DemoCatalog {
    pub fn lookup(&self, identity: &TokenIdentity) -> Option<Token> {
        if let Some(token) = self.tokens.iter().find(|t| &t.identity == identity) {
            return Some(token.clone());
        }
        let collection = self.collections.iter().find(|c| {
            c.chain == identity.chain && c.address.eq_ignore_ascii_case(&identity.contract_address)
        })?;
        let index: u64 = identity.token_id.parse().ok()?;
        synthesize(collection, index)
    }

    pub fn token_at(&self, collection: &Collection, index: u64) -> Option<Token> {
        let identity = TokenIdentity::new(
            collection.chain.clone(),
            collection.address.clone(),
            index.to_string(),
        );
        self.tokens
            .iter()
            .find(|t| t.identity == identity)
            .cloned()
            .or_else(|| synthesize(collection, index))
    }

    pub fn favorite_tokens(&self) -> Vec<Token> {
        self.favorites
            .iter()
            .filter_map(|identity| self.lookup(identity))
            .collect()
    }
}

fn synthesize(collection: &Collection, index: u64) -> Option<Token> {
    if index >= collection.size {
        return None;
    }
    let label = collection
        .name
        .clone()
        .unwrap_or_else(|| collection.address.clone());
    let mut token = Token::bare(TokenIdentity::new(
        collection.chain.clone(),
        collection.address.clone(),
        index.to_string(),
    ))
    .with_name(format!("{label} #{index}"));
    if let Some(name) = &collection.name {
        token = token.with_collection_name(name.clone());
    }
    Some(token)
}

/// Registers the catalog-backed implementations and binds every collaborator
/// contract to them.
pub fn register_demo_impls(registry: &Registry, catalog: DemoCatalog) {
    let catalog = Arc::new(catalog);

    let lookup_catalog = catalog.clone();
    registry.register(
        IMPL_TOKEN_LOOKUP,
        move |_ctx: &mut Context, input: Value| {
            let identity: TokenIdentity =
                serde_json::from_value(input).context("invalid token identity")?;
            Ok(json!({ "token": lookup_catalog.lookup(&identity) }))
        },
    );

    let favorites_catalog = catalog.clone();
    registry.register(
        IMPL_FAVORITES,
        move |_ctx: &mut Context, _input: Value| {
            Ok(json!({ "tokens": favorites_catalog.favorite_tokens() }))
        },
    );

    let collections_catalog = catalog.clone();
    registry.register(
        IMPL_COLLECTIONS,
        move |_ctx: &mut Context, _input: Value| {
            Ok(json!({ "collections": collections_catalog.collections }))
        },
    );

    registry.register(IMPL_TOKEN_AT, move |_ctx: &mut Context, input: Value| {
        let collection: Collection = input
            .get("collection")
            .cloned()
            .ok_or_else(|| anyhow!("missing collection"))
            .and_then(|value| serde_json::from_value(value).map_err(Into::into))?;
        let index = input
            .get("index")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("missing numeric index"))?;
        Ok(json!({ "token": catalog.token_at(&collection, index) }))
    });

    bind_demo_impls(registry);
}

pub fn bind_demo_impls(registry: &Registry) {
    registry.set_binding(CONTRACT_TOKEN_LOOKUP, IMPL_TOKEN_LOOKUP);
    registry.set_binding(CONTRACT_FAVORITES, IMPL_FAVORITES);
    registry.set_binding(CONTRACT_COLLECTIONS, IMPL_COLLECTIONS);
    registry.set_binding(CONTRACT_TOKEN_AT, IMPL_TOKEN_AT);
}

/// Parses a catalog document (YAML or JSON).
pub fn parse_catalog(text: &str) -> Result<DemoCatalog> {
    serde_yaml::from_str(text).context("invalid demo catalog")
}
