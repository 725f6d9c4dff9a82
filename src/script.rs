//! Scripted user sessions: a list of UI events replayed against a mounted flow.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::slots::NavigationState;
use crate::core::token::{Token, TokenIdentity};
use crate::navigation::MemoryLocation;
use crate::selection::{MemeFlow, SelectionFlow, SingleTokenFlow, StepperFlow};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Step {
    Select { index: usize, token: TokenIdentity },
    Skip { index: usize },
    Modify { index: usize },
    Clear { index: usize },
    /// Sets the hash directly, like a user editing the address bar.
    Hash {
        #[serde(default)]
        fragment: Option<String>,
    },
    Back,
    Forward,
    Text { index: usize, value: String },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Select { .. } => "select",
            Step::Skip { .. } => "skip",
            Step::Modify { .. } => "modify",
            Step::Clear { .. } => "clear",
            Step::Hash { .. } => "hash",
            Step::Back => "back",
            Step::Forward => "forward",
            Step::Text { .. } => "text",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: usize,
    pub event: &'static str,
    pub url: String,
    pub navigation: NavigationState,
    pub picker: Option<usize>,
    pub filled: usize,
    pub ready_to_submit: bool,
}

/// Anything a script can drive. Text steps only make sense for meme flows.
pub trait ScriptTarget {
    fn flow(&self) -> &SelectionFlow<MemoryLocation>;
    fn flow_mut(&mut self) -> &mut SelectionFlow<MemoryLocation>;

    fn set_text(&mut self, index: usize, _value: &str) -> Result<()> {
        Err(anyhow!("text field {index} is not available in this flow"))
    }

    fn texts(&self) -> &[String] {
        &[]
    }
}

impl ScriptTarget for SelectionFlow<MemoryLocation> {
    fn flow(&self) -> &SelectionFlow<MemoryLocation> {
        self
    }

    fn flow_mut(&mut self) -> &mut SelectionFlow<MemoryLocation> {
        self
    }
}

impl ScriptTarget for SingleTokenFlow<MemoryLocation> {
    fn flow(&self) -> &SelectionFlow<MemoryLocation> {
        self
    }

    fn flow_mut(&mut self) -> &mut SelectionFlow<MemoryLocation> {
        self
    }
}

impl ScriptTarget for StepperFlow<MemoryLocation> {
    fn flow(&self) -> &SelectionFlow<MemoryLocation> {
        self
    }

    fn flow_mut(&mut self) -> &mut SelectionFlow<MemoryLocation> {
        self
    }
}

impl ScriptTarget for MemeFlow<MemoryLocation> {
    fn flow(&self) -> &SelectionFlow<MemoryLocation> {
        self
    }

    fn flow_mut(&mut self) -> &mut SelectionFlow<MemoryLocation> {
        self
    }

    fn set_text(&mut self, index: usize, value: &str) -> Result<()> {
        if MemeFlow::set_text(self, index, value) {
            Ok(())
        } else {
            bail!("text field {index} is out of range")
        }
    }

    fn texts(&self) -> &[String] {
        MemeFlow::texts(self)
    }
}

/// Accepts either a bare list of steps or an object with a `script` list.
pub fn parse_script(value: &Value) -> Result<Vec<Step>> {
    let list = match value {
        Value::Array(_) => value.clone(),
        Value::Object(map) => map
            .get("script")
            .cloned()
            .ok_or_else(|| anyhow!("script root missing"))?,
        _ => bail!("script must be a list of steps"),
    };
    serde_json::from_value(list).context("invalid script step")
}

pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read script file: {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let doc: Value = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON script: {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid YAML script: {}", path.display()))?
    };
    parse_script(&doc).with_context(|| format!("invalid script structure in {}", path.display()))
}

/// Looks the picked identity up so the slot carries display metadata; falls back
/// to a bare token when the lookup has nothing.
fn picked_token(flow: &SelectionFlow<MemoryLocation>, identity: &TokenIdentity) -> Arc<Token> {
    match flow.collaborators().lookup.lookup(identity) {
        Ok(Some(token)) => token,
        Ok(None) => Arc::new(Token::bare(identity.clone())),
        Err(err) => {
            log::warn!("lookup for picked token {identity} failed: {err}");
            Arc::new(Token::bare(identity.clone()))
        }
    }
}

fn apply_step<T: ScriptTarget + ?Sized>(target: &mut T, step: &Step) -> Result<()> {
    match step {
        Step::Select { index, token } => {
            let picked = picked_token(target.flow(), token);
            target.flow_mut().select_token(*index, Some(picked));
        }
        Step::Skip { index } => {
            target.flow_mut().skip(*index);
        }
        Step::Modify { index } => {
            target.flow_mut().modify(*index);
        }
        Step::Clear { index } => {
            target.flow_mut().clear(*index);
        }
        Step::Hash { fragment } => {
            let flow = target.flow_mut();
            flow.location_mut().push_fragment(fragment.as_deref());
            flow.sync();
        }
        Step::Back => {
            let flow = target.flow_mut();
            if flow.location_mut().back() {
                flow.sync();
            }
        }
        Step::Forward => {
            let flow = target.flow_mut();
            if flow.location_mut().forward() {
                flow.sync();
            }
        }
        Step::Text { index, value } => target.set_text(*index, value)?,
    }
    Ok(())
}

fn record(position: usize, step: &Step, flow: &SelectionFlow<MemoryLocation>) -> StepRecord {
    StepRecord {
        step: position,
        event: step.name(),
        url: flow.location().href(),
        navigation: flow.navigation(),
        picker: flow.picker(),
        filled: flow.slots().filled_count(),
        ready_to_submit: flow.is_ready_to_submit(),
    }
}

pub fn run_script<T: ScriptTarget + ?Sized>(
    target: &mut T,
    steps: &[Step],
) -> Result<Vec<StepRecord>> {
    let mut records = Vec::with_capacity(steps.len());
    for (position, step) in steps.iter().enumerate() {
        apply_step(target, step)
            .with_context(|| format!("script step {position} ({}) failed", step.name()))?;
        records.push(record(position, step, target.flow()));
    }
    Ok(records)
}
