#![forbid(unsafe_code)]

use log::warn;

use crate::storage::StorageError;

/// The smallest accepted [TermPoolConfig::max_load], lower values make the hash-cons table grow on nearly every insertion.
pub const MIN_MAX_LOAD: usize = 25;

/// The configuration of a [crate::TermPool].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermPoolConfig {
    /// Run the garbage collector when allocation runs out of cells.
    pub automatic_garbage_collection: bool,

    /// Select the collection parameters for small memory footprints.
    pub low_memory: bool,

    /// The maximum number of bytes of block storage.
    pub memory_limit: Option<usize>,

    /// The hash-cons table starts with `2^initial_table_class` buckets.
    pub initial_table_class: u32,

    /// The percentage of terms per bucket above which the hash-cons table grows,
    /// at least [MIN_MAX_LOAD].
    pub max_load: usize,
}

impl TermPoolConfig {
    /// Returns the default configuration, overridden by the `ATLAS_LOW_MEMORY`,
    /// `ATLAS_MEMORY_LIMIT` (in bytes) and `ATLAS_MAX_LOAD` environment variables when they are set.
    pub fn from_env() -> Result<TermPoolConfig, StorageError> {
        let mut config = TermPoolConfig::default();

        if let Ok(value) = std::env::var("ATLAS_LOW_MEMORY") {
            config.low_memory = parse_flag("ATLAS_LOW_MEMORY", &value)?;
        }

        if let Ok(value) = std::env::var("ATLAS_MEMORY_LIMIT") {
            config.memory_limit = Some(value.trim().parse().map_err(|_| StorageError::InvalidConfig {
                variable: "ATLAS_MEMORY_LIMIT",
                value: value.clone(),
            })?);
        }

        if let Ok(value) = std::env::var("ATLAS_MAX_LOAD") {
            config.max_load = value.trim().parse().map_err(|_| StorageError::InvalidConfig {
                variable: "ATLAS_MAX_LOAD",
                value: value.clone(),
            })?;
        }

        Ok(config.validated())
    }

    /// Returns the configuration with a `max_load` below [MIN_MAX_LOAD] raised to it.
    pub fn validated(self) -> TermPoolConfig {
        if self.max_load < MIN_MAX_LOAD {
            warn!(
                "The maximum load {}% of the hash-cons table is raised to {MIN_MAX_LOAD}%",
                self.max_load
            );

            return TermPoolConfig {
                max_load: MIN_MAX_LOAD,
                ..self
            };
        }

        self
    }
}

impl Default for TermPoolConfig {
    fn default() -> Self {
        TermPoolConfig {
            automatic_garbage_collection: true,
            low_memory: false,
            memory_limit: None,
            initial_table_class: 17,
            max_load: 80,
        }
    }
}

fn parse_flag(variable: &'static str, value: &str) -> Result<bool, StorageError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(StorageError::InvalidConfig {
            variable,
            value: value.to_string(),
        }),
    }
}
