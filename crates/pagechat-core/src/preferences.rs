//! Persisted user preferences.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::history::Store;

/// Store key holding [`Preferences`].
pub const PREFERENCES_KEY: &str = "preferences";

/// Text size of the chat panel, smallest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ZoomLevel {
    #[serde(rename = "zoom-small")]
    Small,
    #[default]
    #[serde(rename = "zoom-normal")]
    Normal,
    #[serde(rename = "zoom-large")]
    Large,
    #[serde(rename = "zoom-extra-large")]
    ExtraLarge,
}

impl ZoomLevel {
    pub const ALL: [ZoomLevel; 4] = [
        ZoomLevel::Small,
        ZoomLevel::Normal,
        ZoomLevel::Large,
        ZoomLevel::ExtraLarge,
    ];

    /// Class name applied to the panel.
    pub fn class_name(self) -> &'static str {
        match self {
            ZoomLevel::Small => "zoom-small",
            ZoomLevel::Normal => "zoom-normal",
            ZoomLevel::Large => "zoom-large",
            ZoomLevel::ExtraLarge => "zoom-extra-large",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// One level larger; stays at the largest.
    #[must_use]
    pub fn zoom_in(self) -> Self {
        Self::ALL
            .get(self.index() + 1)
            .copied()
            .unwrap_or(self)
    }

    /// One level smaller; stays at the smallest.
    #[must_use]
    pub fn zoom_out(self) -> Self {
        self.index()
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(self)
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

impl FromStr for ZoomLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| {
                let class = level.class_name();
                class == name || class.strip_prefix("zoom-") == Some(name)
            })
            .with_context(|| format!("Unknown zoom level: {name}"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub zoom: ZoomLevel,
}

impl Preferences {
    /// Loads preferences, falling back to defaults when none are stored.
    pub fn load(store: &dyn Store) -> Result<Self> {
        match store.load(PREFERENCES_KEY)? {
            Some(value) => {
                serde_json::from_value(value).context("Failed to parse stored preferences")
            }
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, store: &dyn Store) -> Result<()> {
        let value = serde_json::to_value(self).context("Failed to serialize preferences")?;
        store.save(PREFERENCES_KEY, &value)
    }
}
