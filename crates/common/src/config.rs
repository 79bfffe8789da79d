//! Operation configuration
//!
//! [`OperationConfig`] carries the tunables shared by every operation
//! variant. It can be built in code, with a builder, or loaded from TOML:
//!
//! ```toml
//! name = "index-refresh"
//! delay = 250          # milliseconds, used by delayed operations
//! background = true    # long-running operations use the blocking pool
//! thread_name = "index-refresh-worker"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};
use crate::utils::serde::duration_millis;

/// Longest delay accepted for a delayed operation
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Name used when none is configured
pub const DEFAULT_OPERATION_NAME: &str = "synchronized-operation";

/// Configuration shared by all operation variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Name used in log fields and worker thread names
    pub name: String,
    /// Delay before each dispatch of a delayed operation
    #[serde(with = "duration_millis")]
    pub delay: Duration,
    /// Long-running variant: run on the blocking pool instead of a
    /// dedicated OS thread
    pub background: bool,
    /// Dedicated worker thread name; defaults to `name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_OPERATION_NAME.to_string(),
            delay: Duration::ZERO,
            background: false,
            thread_name: None,
        }
    }
}

impl OperationConfig {
    /// Create a configuration builder
    pub fn builder() -> OperationConfigBuilder {
        OperationConfigBuilder::new()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> SchedulerResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Thread name for dedicated workers
    pub fn worker_thread_name(&self) -> &str {
        self.thread_name.as_deref().unwrap_or(&self.name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::config_field("name", "must not be empty"));
        }

        if let Some(thread_name) = &self.thread_name {
            if thread_name.trim().is_empty() {
                return Err(SchedulerError::config_field("thread_name", "must not be empty"));
            }
            if thread_name.contains('\0') {
                return Err(SchedulerError::config_field(
                    "thread_name",
                    "must not contain NUL bytes",
                ));
            }
        }

        if self.delay > MAX_DELAY {
            return Err(SchedulerError::config_field(
                "delay",
                format!("must not exceed {}ms", MAX_DELAY.as_millis()),
            ));
        }

        Ok(())
    }
}

/// Builder for [`OperationConfig`]
#[derive(Debug, Default)]
pub struct OperationConfigBuilder {
    config: OperationConfig,
}

impl OperationConfigBuilder {
    pub fn new() -> Self {
        Self { config: OperationConfig::default() }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.config.background = background;
        self
    }

    pub fn thread_name<S: Into<String>>(mut self, thread_name: S) -> Self {
        self.config.thread_name = Some(thread_name.into());
        self
    }

    pub fn build(self) -> SchedulerResult<OperationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
