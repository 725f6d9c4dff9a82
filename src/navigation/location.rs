use std::collections::VecDeque;

use anyhow::{Context as AnyhowContext, Result};
use serde_json::{Map, Value};
use url::Url;

use super::{LocationPort, NavigationPort};
use crate::core::codec::{self, ParamMap, ParamScope};
use crate::core::hash;

/// In-memory stand-in for a browser location: one current URL whose query is
/// rewritten in place, plus a back/forward stack of hash fragments.
#[derive(Debug, Clone)]
pub struct MemoryLocation {
    url: Url,
    history: Vec<Option<String>>,
    cursor: usize,
    changes: VecDeque<Option<usize>>,
}

impl MemoryLocation {
    pub fn new(url: Url) -> Self {
        let fragment = url.fragment().map(str::to_string);
        Self {
            url,
            history: vec![fragment],
            cursor: 0,
            changes: VecDeque::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).with_context(|| format!("invalid location url {input}"))?;
        Ok(Self::new(url))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn href(&self) -> String {
        self.url.to_string()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.url.fragment()
    }

    /// New history entry with `fragment`, dropping any forward entries. Fires a
    /// change only when the fragment actually differs.
    pub fn push_fragment(&mut self, fragment: Option<&str>) {
        let fragment = fragment
            .map(|f| f.trim_start_matches('#').to_string())
            .filter(|f| !f.is_empty());
        if fragment.as_deref() == self.url.fragment() {
            return;
        }
        self.history.truncate(self.cursor + 1);
        self.history.push(fragment);
        self.cursor = self.history.len() - 1;
        self.apply_cursor();
    }

    pub fn back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.apply_cursor();
        true
    }

    pub fn forward(&mut self) -> bool {
        if self.cursor + 1 >= self.history.len() {
            return false;
        }
        self.cursor += 1;
        self.apply_cursor();
        true
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn apply_cursor(&mut self) {
        let target = self.history[self.cursor].clone();
        if target.as_deref() == self.url.fragment() {
            return;
        }
        self.url.set_fragment(target.as_deref());
        self.changes.push_back(hash::parse_step(target.as_deref()));
    }
}

impl NavigationPort for MemoryLocation {
    fn current_step(&self) -> Option<usize> {
        hash::parse_step(self.url.fragment())
    }

    fn set_current_step(&mut self, step: Option<usize>) {
        let fragment = hash::format_step(step);
        self.push_fragment(fragment.as_deref());
    }

    fn take_changes(&mut self) -> Vec<Option<usize>> {
        self.changes.drain(..).collect()
    }
}

impl LocationPort for MemoryLocation {
    fn query_params(&self) -> Map<String, Value> {
        codec::query_params(&self.url)
    }

    fn write_params(&mut self, scope: ParamScope, params: &ParamMap) {
        codec::write_params(&mut self.url, scope, params);
    }
}
