use std::fmt;

use serde::{Deserialize, Serialize};

/// The (chain, contract address, token id) triple that addresses a collectible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenIdentity {
    pub chain: String,
    pub contract_address: String,
    pub token_id: String,
}

impl TokenIdentity {
    pub fn new(
        chain: impl Into<String>,
        contract_address: impl Into<String>,
        token_id: impl Into<String>,
    ) -> Self {
        Self {
            chain: chain.into(),
            contract_address: contract_address.into(),
            token_id: token_id.into(),
        }
    }
}

impl AsRef<TokenIdentity> for TokenIdentity {
    fn as_ref(&self) -> &TokenIdentity {
        self
    }
}

impl fmt::Display for TokenIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}",
            self.chain, self.contract_address, self.token_id
        )
    }
}

/// A resolved token: identity plus the display metadata the lookup service returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    #[serde(flatten)]
    pub identity: TokenIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

impl Token {
    /// A token carrying nothing beyond its identity.
    pub fn bare(identity: TokenIdentity) -> Self {
        Self {
            identity,
            name: None,
            image_url: None,
            collection_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn identity(&self) -> &TokenIdentity {
        &self.identity
    }
}

impl AsRef<TokenIdentity> for Token {
    fn as_ref(&self) -> &TokenIdentity {
        &self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_equality_is_structural() {
        let a = TokenIdentity::new("eth", "0xabc", "7");
        let b = TokenIdentity::new("eth", "0xabc", "7");
        assert_eq!(a, b);
        assert_ne!(a, TokenIdentity::new("base", "0xabc", "7"));
    }

    #[test]
    fn token_serializes_flat_camel_case() {
        let token = Token::bare(TokenIdentity::new("eth", "0xabc", "0")).with_name("Zero");
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(
            value,
            json!({
                "chain": "eth",
                "contractAddress": "0xabc",
                "tokenId": "0",
                "name": "Zero"
            })
        );
        let back: Token = serde_json::from_value(value).unwrap();
        assert_eq!(back, token);
    }
}
