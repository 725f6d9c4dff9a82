//! Product-specific wrappers around [`SelectionFlow`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use super::flow::{Collaborators, FlowOptions, SelectionFlow};
use crate::core::codec::{self, ParamScope, MAX_TEXT_FIELDS};
use crate::core::slots::Attribution;
use crate::core::token::{Token, TokenIdentity};
use crate::navigation::LocationPort;
use crate::preselect::Collection;

/// Exactly one required slot.
pub struct SingleTokenFlow<P: LocationPort> {
    flow: SelectionFlow<P>,
}

impl<P: LocationPort> SingleTokenFlow<P> {
    pub fn mount(
        location: P,
        user: Attribution,
        default_collection: Option<Collection>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let options = FlowOptions::new(1, 1)
            .with_user(user)
            .with_default_collection(default_collection);
        Ok(Self {
            flow: SelectionFlow::mount(location, options, collaborators)?,
        })
    }

    pub fn select(&mut self, token: Arc<Token>) {
        self.flow.select_token(0, Some(token));
    }

    pub fn token(&self) -> Option<&Arc<Token>> {
        self.flow.slots().get(0).map(|fill| &fill.token)
    }

    pub fn into_inner(self) -> SelectionFlow<P> {
        self.flow
    }
}

impl<P: LocationPort> Deref for SingleTokenFlow<P> {
    type Target = SelectionFlow<P>;

    fn deref(&self) -> &Self::Target {
        &self.flow
    }
}

impl<P: LocationPort> DerefMut for SingleTokenFlow<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.flow
    }
}

/// Multi-slot flow stepping through slots one hash step at a time.
pub struct StepperFlow<P: LocationPort> {
    flow: SelectionFlow<P>,
}

impl<P: LocationPort> StepperFlow<P> {
    pub fn mount(location: P, options: FlowOptions, collaborators: Collaborators) -> Result<Self> {
        Ok(Self {
            flow: SelectionFlow::mount(location, options, collaborators)?,
        })
    }

    /// Current slot plus one, for "step n of m" displays; `None` on the summary.
    pub fn step_number(&self) -> Option<usize> {
        self.flow.navigation().step().map(|index| index + 1)
    }

    pub fn step_count(&self) -> usize {
        self.flow.slots().max_slots()
    }

    pub fn into_inner(self) -> SelectionFlow<P> {
        self.flow
    }
}

impl<P: LocationPort> Deref for StepperFlow<P> {
    type Target = SelectionFlow<P>;

    fn deref(&self) -> &Self::Target {
        &self.flow
    }
}

impl<P: LocationPort> DerefMut for StepperFlow<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.flow
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemeSubmission {
    pub tokens: Vec<TokenIdentity>,
    pub texts: Vec<String>,
}

/// Character slots plus free-text captions, both persisted in the query string.
pub struct MemeFlow<P: LocationPort> {
    flow: SelectionFlow<P>,
    texts: Vec<String>,
}

impl<P: LocationPort> MemeFlow<P> {
    pub fn mount(location: P, options: FlowOptions, collaborators: Collaborators) -> Result<Self> {
        let texts = codec::decode_texts(&location.query_params())
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        Ok(Self {
            flow: SelectionFlow::mount(location, options, collaborators)?,
            texts,
        })
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        self.texts
            .get(index)
            .map(String::as_str)
            .filter(|text| !text.is_empty())
    }

    /// Returns false for indices past the text field limit.
    pub fn set_text(&mut self, index: usize, value: &str) -> bool {
        if index >= MAX_TEXT_FIELDS {
            return false;
        }
        if self.texts.len() <= index {
            self.texts.resize(index + 1, String::new());
        }
        self.texts[index] = value.trim().to_string();
        while self.texts.last().is_some_and(String::is_empty) {
            self.texts.pop();
        }
        let params = codec::encode_texts(&self.texts);
        self.flow
            .location_mut()
            .write_params(ParamScope::Texts, &params);
        true
    }

    pub fn meme_submission(&self) -> Option<MemeSubmission> {
        let tokens = self.flow.submission()?;
        Some(MemeSubmission {
            tokens,
            texts: self.texts.clone(),
        })
    }

    pub fn into_inner(self) -> SelectionFlow<P> {
        self.flow
    }
}

impl<P: LocationPort> Deref for MemeFlow<P> {
    type Target = SelectionFlow<P>;

    fn deref(&self) -> &Self::Target {
        &self.flow
    }
}

impl<P: LocationPort> DerefMut for MemeFlow<P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.flow
    }
}
