//! Analysis plugins
//!
//! Plugins are registered with a [`PluginManager`] and run over a parsed
//! [`Document`]. Each plugin runs on its own thread with a deadline; errors,
//! panics and timeouts are recorded per plugin and never abort the others.

pub mod builtin;
pub mod manager;

pub use builtin::{MetadataExtractor, SecurityScanner, StructureAnalyzer};
pub use manager::PluginManager;

use crate::ast::Document;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Descriptive information about a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub tags: Vec<String>,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Plugin failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("document not supported: {0}")]
    Unsupported(String),
}

/// Handed to a running plugin
#[derive(Debug, Clone)]
pub struct PluginContext {
    cancelled: Arc<AtomicBool>,
    deadline: Instant,
}

impl PluginContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now() + timeout,
        }
    }

    /// Set once the plugin has been given up on
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled, for use with `?` in long loops
    pub fn checkpoint(&self) -> Result<(), PluginError> {
        if self.is_cancelled() {
            Err(PluginError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// A unit of analysis over a document
pub trait AnalysisPlugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    fn run(&self, document: &Document, ctx: &PluginContext) -> Result<String, PluginError>;
}

/// How one plugin ended
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PluginOutcome {
    Success(String),
    Failed(String),
    TimedOut(Duration),
}

impl PluginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PluginOutcome::Success(_))
    }

    /// Plugin output, or a status line for failures
    pub fn summary(&self) -> String {
        match self {
            PluginOutcome::Success(output) => output.clone(),
            PluginOutcome::Failed(error) => format!("failed: {error}"),
            PluginOutcome::TimedOut(after) => format!("timed out after {after:?}"),
        }
    }
}

/// Aggregate of one `execute_plugins` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PluginExecutionResult {
    pub total_plugins: usize,
    pub successful_plugins: usize,
    pub failed_plugins: usize,
    pub elapsed: Duration,
    /// Plugin name to output or status line
    pub results: BTreeMap<String, String>,
    pub outcomes: BTreeMap<String, PluginOutcome>,
}

/// Execution limits
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub plugin_timeout: Duration,
    pub max_concurrent_plugins: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            plugin_timeout: Duration::from_secs(30),
            max_concurrent_plugins: num_cpus::get(),
        }
    }
}

impl ExecutionConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.plugin_timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_plugins = max.max(1);
        self
    }
}
