use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::Value;

/// Contract ids under this prefix must be bound to an implementation before use.
pub const CONTRACT_PREFIX: &str = "slotfill://contract/";

const MAX_CALL_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    NoBinding(String),
    NotFound(String),
    TooDeep(String),
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractError::NoBinding(name) => write!(f, "No binding for contract: {name}"),
            ContractError::NotFound(name) => write!(f, "function not found: {name}"),
            ContractError::TooDeep(name) => {
                write!(f, "call depth exceeded {MAX_CALL_DEPTH} while calling {name}")
            }
        }
    }
}

impl std::error::Error for ContractError {}

pub trait Func: Send + Sync {
    fn call(&self, ctx: &mut Context, input: Value) -> Result<Value>;
}

impl<F> Func for F
where
    F: Fn(&mut Context, Value) -> Result<Value> + Send + Sync + 'static,
{
    fn call(&self, ctx: &mut Context, input: Value) -> Result<Value> {
        (self)(ctx, input)
    }
}

struct RegistryInner {
    funcs: HashMap<String, Arc<dyn Func>>,
    bindings: HashMap<String, String>,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            funcs: HashMap::new(),
            bindings: HashMap::new(),
        }
    }
}

/// Named functions plus contract-to-implementation bindings. Cloning shares state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::new())),
        }
    }

    pub fn register<F>(&self, name: impl Into<String>, func: F)
    where
        F: Func + 'static,
    {
        let func_arc: Arc<dyn Func> = Arc::new(func);
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner.funcs.insert(name.into(), func_arc);
    }

    pub fn set_binding(&self, contract: impl Into<String>, implementation: impl Into<String>) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner
            .bindings
            .insert(contract.into(), implementation.into());
    }

    pub fn context(&self) -> Context {
        Context::new(self.inner.clone())
    }
}

fn find_entry(inner: &RegistryInner, name: &str) -> Result<Arc<dyn Func>, ContractError> {
    if let Some(func) = inner.funcs.get(name) {
        return Ok(func.clone());
    }
    if let Some(binding) = inner.bindings.get(name) {
        return inner
            .funcs
            .get(binding)
            .cloned()
            .ok_or_else(|| ContractError::NotFound(binding.clone()));
    }
    if name.starts_with(CONTRACT_PREFIX) {
        return Err(ContractError::NoBinding(name.to_string()));
    }
    Err(ContractError::NotFound(name.to_string()))
}

/// Per-caller handle used to invoke registered functions.
pub struct Context {
    registry: Arc<Mutex<RegistryInner>>,
    depth: usize,
}

impl Context {
    fn new(registry: Arc<Mutex<RegistryInner>>) -> Self {
        Self { registry, depth: 0 }
    }

    pub fn call(&mut self, name: &str, input: Value) -> Result<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ContractError::TooDeep(name.to_string()).into());
        }
        let func = {
            let inner = self.registry.lock().expect("registry poisoned");
            find_entry(&inner, name)?
        };
        self.depth += 1;
        let result = func.call(self, input);
        self.depth -= 1;
        result
    }
}
