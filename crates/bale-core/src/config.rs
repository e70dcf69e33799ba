//! Layered settings shared by the builder and the runtime.
//!
//! Settings are a TOML document overlaid with `BALE_*` environment variables.
//! Typed views over them (`RuntimeConfig`, `BuildConfig`) live in the crates
//! that consume them, derive `Deserialize` and document their own defaults.
//! Every view reads the same flat namespace and ignores keys it does not know:
//!
//! ```toml
//! bundle_dir = "bundles"
//! include = ["Assets/Scenes"]
//! merge_single = true
//! tag."Assets/UI/Atlas.png" = "ui"
//! ```

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use toml::{Table, Value};

use crate::error::{FormatError, FormatResult};

/// Prefix of environment variables read by [`Settings::overlay_env`].
pub const ENV_PREFIX: &str = "BALE_";

/// A settings document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    values: Table,
}

impl Settings {
    /// Create empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn parse(text: &str) -> FormatResult<Self> {
        let values = toml::from_str::<Table>(text).map_err(|e| FormatError::InvalidSettings {
            message: e.to_string(),
        })?;
        Ok(Self { values })
    }

    /// Set a top-level value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Raw value of a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize a typed view of the settings.
    pub fn view<T: DeserializeOwned>(&self) -> FormatResult<T> {
        Value::Table(self.values.clone())
            .try_into()
            .map_err(|e: toml::de::Error| FormatError::InvalidSettings {
                message: e.to_string(),
            })
    }

    /// Overlay values from `BALE_*` environment variables.
    ///
    /// `BALE_MERGE_SINGLE=true` sets `merge_single`.
    pub fn overlay_env(&mut self) -> &mut Self {
        self.overlay_vars(std::env::vars())
    }

    /// Overlay values from `(name, value)` pairs shaped like environment variables.
    ///
    /// A value that reads as a TOML value (`true`, `4`, `["a", "b"]`) keeps its
    /// type; anything else is taken as a string.
    pub fn overlay_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> &mut Self {
        for (name, raw) in vars {
            if let Some(key) = name.strip_prefix(ENV_PREFIX) {
                tracing::trace!("Setting {} from {}", key.to_ascii_lowercase(), name);
                self.values.insert(key.to_ascii_lowercase(), env_value(raw));
            }
        }
        self
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if nothing is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn env_value(raw: String) -> Value {
    toml::from_str::<Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or(Value::String(raw))
}

/// Deserialize a list given either as an array or as one comma-separated
/// string, so lists can come from environment variables.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum List {
        Many(Vec<String>),
        Joined(String),
    }

    match List::deserialize(deserializer) {
        Ok(List::Many(items)) => Ok(items),
        Ok(List::Joined(text)) => Ok(text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()),
        Err(_) => Err(de::Error::custom("expected a list of strings")),
    }
}
