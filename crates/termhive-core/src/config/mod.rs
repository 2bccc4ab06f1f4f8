//! # Configuration System
//!
//! Hierarchical TOML configuration for termhive.
//!
//! ## Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.termhive/config.toml` (global user preferences)
//! 3. **Project config** - `./.termhive/config.toml` (project-specific overrides)
//! 4. **CLI arguments** - Command-line flags (highest priority)
//!
//! ## Usage Example
//!
//! ```toml
//! # ~/.termhive/config.toml
//! [pool]
//! max_size = 8
//!
//! [buffer]
//! eviction_capacity_bytes = 2097152
//!
//! [agent]
//! command = "claude"
//! args = ["--continue"]
//! ```
//!
//! ## Loading Configuration
//!
//! ```rust,no_run
//! use termhive_core::config::TermhiveConfig;
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TermhiveConfig::load_hierarchy()?;
//!     println!("pool holds {} live terminals", config.pool.max_size);
//!     Ok(())
//! }
//! ```

pub mod defaults;
pub mod loading;
pub mod types;
pub mod validation;

// Public API exports
pub use defaults::{MAX_POOL_SIZE, MIN_POOL_SIZE};
pub use types::{AgentConfig, BufferConfig, Config, DaemonSettings, PoolConfig, TermhiveConfig};
pub use validation::validate_config;

impl TermhiveConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, crate::errors::ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    ///
    /// See [`validation::validate_config`] for details.
    pub fn validate(&self) -> Result<(), crate::errors::ConfigError> {
        validation::validate_config(self)
    }
}
