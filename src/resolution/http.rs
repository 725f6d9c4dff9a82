use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;
use serde_json::Value;

use super::{LookupError, LookupResult, TokenLookup};
use crate::core::token::{Token, TokenIdentity};

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRecord {
    #[serde(default)]
    chain: Option<String>,
    #[serde(default, alias = "address")]
    contract_address: Option<String>,
    #[serde(default, alias = "id")]
    token_id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "imageUrl")]
    image: Option<String>,
    #[serde(default)]
    collection_name: Option<String>,
}

impl TokenRecord {
    /// Fields the service omitted fall back to the identity that was requested.
    fn into_token(self, requested: &TokenIdentity) -> Token {
        let token_id = match self.token_id {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => requested.token_id.clone(),
        };
        let identity = TokenIdentity::new(
            self.chain
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| requested.chain.clone()),
            self.contract_address
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| requested.contract_address.clone()),
            token_id,
        );
        Token {
            identity,
            name: self.name,
            image_url: self.image,
            collection_name: self.collection_name,
        }
    }
}

/// Token lookup against `GET {base}/tokens/{chain}/{address}/{id}`.
pub struct HttpTokenLookup {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpTokenLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(anyhow!("token lookup base url is empty"));
        }
        url::Url::parse(trimmed).map_err(|err| anyhow!("invalid lookup url {trimmed}: {err}"))?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            base_url: trimmed.to_string(),
        })
    }

    pub fn endpoint(&self, identity: &TokenIdentity) -> String {
        format!(
            "{}/tokens/{}/{}/{}",
            self.base_url,
            utf8_percent_encode(&identity.chain, PATH_SEGMENT),
            utf8_percent_encode(&identity.contract_address, PATH_SEGMENT),
            utf8_percent_encode(&identity.token_id, PATH_SEGMENT)
        )
    }
}

impl TokenLookup for HttpTokenLookup {
    fn lookup(&self, identity: &TokenIdentity) -> LookupResult {
        let endpoint = self.endpoint(identity);
        log::debug!("GET {endpoint}");
        match self
            .agent
            .get(&endpoint)
            .set("accept", "application/json")
            .call()
        {
            Ok(response) => {
                let record: TokenRecord = response
                    .into_json()
                    .map_err(|err| LookupError::Malformed(err.to_string()))?;
                Ok(Some(Arc::new(record.into_token(identity))))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(code, _)) => Err(LookupError::Transport(format!(
                "unexpected status {code} from {endpoint}"
            ))),
            Err(ureq::Error::Transport(err)) => Err(LookupError::Transport(err.to_string())),
        }
    }
}
