pub mod codec;
pub mod hash;
pub mod slots;
pub mod token;

use anyhow::{Context as AnyhowContext, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::registry::{Context, Registry};

use codec::SlotParams;
use slots::MAX_SLOTS;

pub const CONTRACT_ENCODE: &str = "slotfill://core/codec/encode@1";
pub const CONTRACT_DECODE: &str = "slotfill://core/codec/decode@1";
pub const CONTRACT_HASH_PARSE: &str = "slotfill://core/hash/parse@1";

/// Registers the pure codec and hash helpers as JSON functions, so scripted
/// hosts can use the same URL format as the flows.
pub fn register_core(registry: &Registry) {
    registry.register(CONTRACT_ENCODE, encode_contract);
    registry.register(CONTRACT_DECODE, decode_contract);
    registry.register(CONTRACT_HASH_PARSE, hash_parse_contract);
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EncodeInput {
    slots: Vec<Option<SlotParams>>,
    texts: Vec<String>,
}

fn encode_contract(_ctx: &mut Context, input: Value) -> Result<Value> {
    let input: EncodeInput = serde_json::from_value(input).context("invalid encode input")?;
    let mut params = codec::encode_slots(&input.slots);
    params.extend(codec::encode_texts(&input.texts));
    Ok(json!({ "params": params }))
}

fn decode_contract(_ctx: &mut Context, input: Value) -> Result<Value> {
    let params = match input.get("params") {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(other) => anyhow::bail!("params must be an object, got {other}"),
    };
    Ok(json!({
        "slots": codec::decode(&params),
        "texts": codec::decode_texts(&params),
    }))
}

fn hash_parse_contract(_ctx: &mut Context, input: Value) -> Result<Value> {
    let fragment = input.get("fragment").and_then(Value::as_str);
    let max_slots = input
        .get("maxSlots")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(MAX_SLOTS);
    Ok(json!({
        "step": hash::parse_step(fragment),
        "state": hash::parse_state(fragment, max_slots),
    }))
}
