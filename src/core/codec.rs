//! Positional query-parameter codec for slot state.
//!
//! Slot `i` is carried by `nft_{i}_chain`, `nft_{i}_address`, `nft_{i}_id` and the
//! optional attribution keys `nft_{i}_user` / `nft_{i}_username`. Gaps are encoded
//! by absence. Free-text fields use `text_{j}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::slots::{Attribution, MAX_SLOTS};
use super::token::TokenIdentity;

pub type ParamMap = BTreeMap<String, String>;

/// Number of `text_{j}` fields a meme flow may carry.
pub const MAX_TEXT_FIELDS: usize = 10;

const SLOT_PREFIX: &str = "nft_";
const TEXT_PREFIX: &str = "text_";

/// One slot's worth of URL state: identity plus optional attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotParams {
    #[serde(flatten)]
    pub identity: TokenIdentity,
    #[serde(flatten)]
    pub attribution: Attribution,
}

impl SlotParams {
    pub fn new(identity: TokenIdentity) -> Self {
        Self {
            identity,
            attribution: Attribution::anonymous(),
        }
    }

    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = attribution;
        self
    }
}

/// Which family of managed keys a write touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamScope {
    Slots,
    Texts,
}

impl ParamScope {
    pub fn owns(&self, key: &str) -> bool {
        let prefix = match self {
            ParamScope::Slots => SLOT_PREFIX,
            ParamScope::Texts => TEXT_PREFIX,
        };
        key.strip_prefix(prefix)
            .and_then(|rest| rest.split('_').next())
            .map(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    }
}

/// Strips surrounding whitespace and matching `"…"` / `'…'` pairs left behind by
/// upstream URL tooling. Applying it twice yields the same value.
pub fn normalize_value(raw: &str) -> String {
    let mut current = raw.trim();
    loop {
        let bytes = current.as_bytes();
        if bytes.len() >= 2 {
            let first = bytes[0];
            let last = bytes[bytes.len() - 1];
            if first == last && (first == b'"' || first == b'\'') {
                current = current[1..current.len() - 1].trim();
                continue;
            }
        }
        return current.to_string();
    }
}

fn slot_key(index: usize, field: &str) -> String {
    format!("{SLOT_PREFIX}{index}_{field}")
}

fn text_key(index: usize) -> String {
    format!("{TEXT_PREFIX}{index}")
}

fn insert_normalized(params: &mut ParamMap, key: String, raw: &str) {
    let value = normalize_value(raw);
    if !value.is_empty() {
        params.insert(key, value);
    }
}

/// Encodes a sparse slot sequence. Undefined entries, entries with an incomplete
/// identity, and indices at or beyond [`MAX_SLOTS`] emit nothing.
pub fn encode_slots(slots: &[Option<SlotParams>]) -> ParamMap {
    let mut params = ParamMap::new();
    for (index, slot) in slots.iter().enumerate().take(MAX_SLOTS) {
        let Some(slot) = slot else {
            continue;
        };
        let chain = normalize_value(&slot.identity.chain);
        let address = normalize_value(&slot.identity.contract_address);
        let id = normalize_value(&slot.identity.token_id);
        if chain.is_empty() || address.is_empty() || id.is_empty() {
            continue;
        }
        params.insert(slot_key(index, "chain"), chain);
        params.insert(slot_key(index, "address"), address);
        params.insert(slot_key(index, "id"), id);
        if let Some(user) = &slot.attribution.user_id {
            insert_normalized(&mut params, slot_key(index, "user"), user);
        }
        if let Some(username) = &slot.attribution.username {
            insert_normalized(&mut params, slot_key(index, "username"), username);
        }
    }
    params
}

/// Positional form: identities with parallel optional attribution columns.
pub fn encode<T: AsRef<TokenIdentity>>(
    slots: &[Option<T>],
    user_ids: Option<&[Option<String>]>,
    usernames: Option<&[Option<String>]>,
) -> ParamMap {
    let zipped: Vec<Option<SlotParams>> = slots
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.as_ref().map(|token| {
                let column = |values: Option<&[Option<String>]>| {
                    values.and_then(|values| values.get(index).cloned().flatten())
                };
                SlotParams::new(token.as_ref().clone())
                    .with_attribution(Attribution::new(column(user_ids), column(usernames)))
            })
        })
        .collect();
    encode_slots(&zipped)
}

fn coerce(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => normalize_value(s),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u.to_string()
            } else if let Some(i) = n.as_i64() {
                i.to_string()
            } else {
                return None;
            }
        }
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Decodes slot state from arbitrary parameter values. Total over any input: a slot
/// lacking any of chain/address/id is absent, along with its attribution. The result
/// length is the highest filled index plus one.
pub fn decode(params: &Map<String, Value>) -> Vec<Option<SlotParams>> {
    let mut slots: Vec<Option<SlotParams>> = Vec::new();
    for index in 0..MAX_SLOTS {
        let field = |name: &str| coerce(params.get(&slot_key(index, name)));
        let (Some(chain), Some(address), Some(id)) =
            (field("chain"), field("address"), field("id"))
        else {
            continue;
        };
        let attribution = Attribution::new(field("user"), field("username"));
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }
        slots[index] = Some(
            SlotParams::new(TokenIdentity::new(chain, address, id)).with_attribution(attribution),
        );
    }
    slots
}

/// Trimmed `text_{j}` fields, empty strings omitted.
pub fn encode_texts<S: AsRef<str>>(texts: &[S]) -> ParamMap {
    let mut params = ParamMap::new();
    for (index, text) in texts.iter().enumerate().take(MAX_TEXT_FIELDS) {
        let trimmed = text.as_ref().trim();
        if !trimmed.is_empty() {
            params.insert(text_key(index), trimmed.to_string());
        }
    }
    params
}

pub fn decode_texts(params: &Map<String, Value>) -> Vec<Option<String>> {
    let mut texts: Vec<Option<String>> = Vec::new();
    for index in 0..MAX_TEXT_FIELDS {
        let value = match params.get(&text_key(index)) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if value.is_empty() {
            continue;
        }
        if texts.len() <= index {
            texts.resize(index + 1, None);
        }
        texts[index] = Some(value);
    }
    texts
}

/// Query pairs of `url` as a parameter map; the first occurrence of a key wins.
pub fn query_params(url: &Url) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url.query_pairs() {
        map.entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    map
}

/// Replaces every key owned by `scope` in the query of `url` with `params`, keeping
/// unrelated keys in their original order.
pub fn write_params(url: &mut Url, scope: ParamScope, params: &ParamMap) {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !scope.owns(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    if pairs.is_empty() {
        url.set_query(None);
        return;
    }
    url.query_pairs_mut().clear().extend_pairs(&pairs);
}
