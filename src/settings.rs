//! Settings for caches and the default resolution policy.
//!
//! Loaded with the `config` crate from built-in defaults overlaid by
//! `PROPBAG_*` environment variables, e.g. `PROPBAG_CACHE_MAX_ITEMS=256` or
//! `PROPBAG_COMPARER=name_or_alias_ignore_case`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comparer::ComparerKind;
use crate::error::{PropbagError, Result};
use crate::search::SearchOptions;

pub const ENV_PREFIX: &str = "PROPBAG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache_max_items: usize,
    pub comparer: ComparerKind,
    pub search_in_parent: bool,
    pub calculate_value: bool,
    pub use_default_value: bool,
    pub return_not_defined: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_max_items: 1024,
            comparer: ComparerKind::TypeAndName,
            search_in_parent: true,
            calculate_value: true,
            use_default_value: true,
            return_not_defined: true,
        }
    }
}

impl Settings {
    /// Defaults overlaid by the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Self::from_config(config)
    }
    /// Reads whatever `config` holds, defaults fill the rest.
    pub fn from_config(config: config::Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        debug!(?settings, "settings loaded");
        Ok(settings)
    }
    pub fn validate(&self) -> Result<()> {
        if self.cache_max_items == 0 {
            return Err(PropbagError::Config(String::from(
                "cache_max_items must be at least 1",
            )));
        }
        Ok(())
    }
    /// The resolution policy these settings describe.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            property_comparer: self.comparer.into(),
            search_in_parent: self.search_in_parent,
            calculate_value: self.calculate_value,
            use_default_value: self.use_default_value,
            return_not_defined: self.return_not_defined,
        }
    }
}
