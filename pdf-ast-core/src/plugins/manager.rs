//! Plugin registry and execution

use super::{
    AnalysisPlugin, ExecutionConfig, MetadataExtractor, PluginContext, PluginExecutionResult, PluginMetadata,
    PluginOutcome, SecurityScanner, StructureAnalyzer,
};
use crate::ast::Document;
use crate::error::{PdfAstError, Result};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// A plugin currently executing
struct Running {
    index: usize,
    ctx: PluginContext,
    started: Instant,
    deadline: Instant,
}

/// Registry of plugins and the entry point for running them
pub struct PluginManager {
    plugins: Vec<Arc<dyn AnalysisPlugin>>,
    config: ExecutionConfig,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::with_config(ExecutionConfig::default())
    }

    pub fn with_config(config: ExecutionConfig) -> Self {
        Self {
            plugins: Vec::new(),
            config,
        }
    }

    /// A manager with the built-in plugins registered
    pub fn with_builtins() -> Self {
        let mut manager = Self::new();
        let builtins: [Arc<dyn AnalysisPlugin>; 3] = [
            Arc::new(StructureAnalyzer::new()),
            Arc::new(SecurityScanner::new()),
            Arc::new(MetadataExtractor::new()),
        ];
        for plugin in builtins {
            // Built-in names are distinct
            let _ = manager.register(plugin);
        }
        manager
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Add a plugin; names must be unique
    pub fn register(&mut self, plugin: Arc<dyn AnalysisPlugin>) -> Result<()> {
        let name = &plugin.metadata().name;
        if self.plugins.iter().any(|p| &p.metadata().name == name) {
            return Err(PdfAstError::DuplicatePlugin(name.clone()));
        }
        tracing::debug!(plugin = %name, "registered plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    /// Metadata of the registered plugins, in registration order
    pub fn list_plugins(&self) -> Vec<PluginMetadata> {
        self.plugins.iter().map(|p| p.metadata().clone()).collect()
    }

    /// Run every registered plugin over `document`
    #[tracing::instrument(level = "debug", skip_all, fields(plugins = self.plugins.len()))]
    pub fn execute_plugins(&self, document: &Document) -> PluginExecutionResult {
        let start = Instant::now();
        let total = self.plugins.len();
        let mut outcomes: Vec<Option<PluginOutcome>> = vec![None; total];
        let (sender, receiver) = mpsc::channel::<(usize, PluginOutcome)>();

        let mut waiting: VecDeque<usize> = (0..total).collect();
        let mut running: Vec<Running> = Vec::new();
        let limit = self.config.max_concurrent_plugins.max(1);

        while !waiting.is_empty() || !running.is_empty() {
            while running.len() < limit {
                let Some(index) = waiting.pop_front() else {
                    break;
                };
                running.push(self.spawn(index, document, sender.clone()));
            }

            let Some(next_deadline) = running.iter().map(|r| r.deadline).min() else {
                continue;
            };
            let wait = next_deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(wait) {
                Ok((index, outcome)) => {
                    // Late reports from detached plugins are ignored
                    if let Some(pos) = running.iter().position(|r| r.index == index) {
                        running.swap_remove(pos);
                        outcomes[index] = Some(outcome);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    running.retain(|r| {
                        if r.deadline > now {
                            return true;
                        }
                        let name = &self.plugins[r.index].metadata().name;
                        tracing::error!(plugin = %name, "plugin exceeded its deadline, detaching");
                        r.ctx.cancel();
                        outcomes[r.index] = Some(PluginOutcome::TimedOut(now - r.started));
                        false
                    });
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut result = PluginExecutionResult {
            total_plugins: total,
            ..PluginExecutionResult::default()
        };
        for (plugin, outcome) in self.plugins.iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| PluginOutcome::Failed("no result reported".to_string()));
            if outcome.is_success() {
                result.successful_plugins += 1;
            } else {
                result.failed_plugins += 1;
            }
            let name = plugin.metadata().name.clone();
            result.results.insert(name.clone(), outcome.summary());
            result.outcomes.insert(name, outcome);
        }
        result.elapsed = start.elapsed();

        tracing::debug!(
            successful = result.successful_plugins,
            failed = result.failed_plugins,
            elapsed = ?result.elapsed,
            "plugins finished"
        );
        result
    }

    fn spawn(&self, index: usize, document: &Document, sender: mpsc::Sender<(usize, PluginOutcome)>) -> Running {
        let plugin = Arc::clone(&self.plugins[index]);
        let document = document.clone();
        let timeout = self.config.plugin_timeout;
        let ctx = PluginContext::new(timeout);
        let thread_ctx = ctx.clone();
        let started = Instant::now();
        let name = plugin.metadata().name.clone();
        let fallback = sender.clone();

        let spawned = thread::Builder::new()
            .name(format!("plugin-{name}"))
            .spawn(move || {
                let outcome = match catch_unwind(AssertUnwindSafe(|| plugin.run(&document, &thread_ctx))) {
                    Ok(Ok(output)) => PluginOutcome::Success(output),
                    Ok(Err(e)) => {
                        tracing::error!(plugin = %plugin.metadata().name, error = %e, "plugin failed");
                        PluginOutcome::Failed(e.to_string())
                    }
                    Err(payload) => {
                        let message = payload
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        tracing::error!(plugin = %plugin.metadata().name, %message, "plugin panicked");
                        PluginOutcome::Failed(format!("panicked: {message}"))
                    }
                };
                let _ = sender.send((index, outcome));
            });

        if let Err(e) = spawned {
            tracing::error!(plugin = %name, error = %e, "could not start plugin thread");
            let _ = fallback.send((index, PluginOutcome::Failed(format!("could not start plugin thread: {e}"))));
        }

        Running {
            index,
            ctx,
            started,
            deadline: started + timeout.max(Duration::from_millis(1)),
        }
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_document;
    use crate::parser::test_helpers::PdfFixture;
    use crate::plugins::PluginError;

    struct Echo(PluginMetadata, &'static str);

    impl AnalysisPlugin for Echo {
        fn metadata(&self) -> &PluginMetadata {
            &self.0
        }

        fn run(&self, _: &Document, _: &PluginContext) -> std::result::Result<String, PluginError> {
            Ok(self.1.to_string())
        }
    }

    struct AlwaysFails(PluginMetadata);

    impl AnalysisPlugin for AlwaysFails {
        fn metadata(&self) -> &PluginMetadata {
            &self.0
        }

        fn run(&self, _: &Document, _: &PluginContext) -> std::result::Result<String, PluginError> {
            Err(PluginError::Failed("nope".to_string()))
        }
    }

    struct Sleeper(PluginMetadata);

    impl AnalysisPlugin for Sleeper {
        fn metadata(&self) -> &PluginMetadata {
            &self.0
        }

        fn run(&self, _: &Document, ctx: &PluginContext) -> std::result::Result<String, PluginError> {
            for _ in 0..200 {
                ctx.checkpoint()?;
                thread::sleep(Duration::from_millis(25));
            }
            Ok("woke up".to_string())
        }
    }

    fn meta(name: &str) -> PluginMetadata {
        PluginMetadata::new(name, "1.0")
    }

    fn document() -> Document {
        parse_document(&PdfFixture::single_page().build()).unwrap()
    }

    #[test]
    fn test_one_failing_plugin() {
        let mut manager = PluginManager::new();
        manager.register(Arc::new(Echo(meta("a"), "A"))).unwrap();
        manager.register(Arc::new(AlwaysFails(meta("b")))).unwrap();
        manager.register(Arc::new(Echo(meta("c"), "C"))).unwrap();

        let result = manager.execute_plugins(&document());
        assert_eq!(result.total_plugins, 3);
        assert_eq!(result.successful_plugins, 2);
        assert_eq!(result.failed_plugins, 1);
        assert_eq!(result.results["a"], "A");
        assert_eq!(result.results["b"], "failed: nope");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut manager = PluginManager::new();
        manager.register(Arc::new(Echo(meta("a"), "A"))).unwrap();
        assert!(matches!(
            manager.register(Arc::new(Echo(meta("a"), "B"))),
            Err(PdfAstError::DuplicatePlugin(_))
        ));
        assert_eq!(manager.list_plugins().len(), 1);
    }

    #[test]
    fn test_timeout_does_not_block() {
        let config = ExecutionConfig::default().with_timeout(Duration::from_millis(100));
        let mut manager = PluginManager::with_config(config);
        manager.register(Arc::new(Sleeper(meta("slow")))).unwrap();
        manager.register(Arc::new(Echo(meta("fast"), "ok"))).unwrap();

        let started = Instant::now();
        let result = manager.execute_plugins(&document());
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(result.outcomes["slow"], PluginOutcome::TimedOut(_)));
        assert_eq!(result.outcomes["fast"], PluginOutcome::Success("ok".to_string()));
        assert_eq!(result.failed_plugins, 1);
    }

    #[test]
    fn test_serial_execution_limit() {
        let config = ExecutionConfig::default().with_max_concurrent(1);
        let mut manager = PluginManager::with_config(config);
        for name in ["x", "y", "z"] {
            manager.register(Arc::new(Echo(meta(name), "done"))).unwrap();
        }
        let result = manager.execute_plugins(&document());
        assert_eq!(result.successful_plugins, 3);
    }

    #[test]
    fn test_no_plugins() {
        let result = PluginManager::new().execute_plugins(&document());
        assert_eq!(result.total_plugins, 0);
        assert!(result.outcomes.is_empty());
    }
}
