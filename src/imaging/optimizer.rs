//! Format-specific post-processing of produced artifacts.
//!
//! Optimizers rewrite the artifact file in place. They are looked up by the
//! output extension; an extension without a registered optimizer is left
//! as produced.

use crate::config::ImagesConfig;
use crate::errors::{TransformError, TransformResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// Placeholder replaced by the artifact path in optimizer arguments
pub const FILE_PLACEHOLDER: &str = "{file}";

#[async_trait]
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &str;

    async fn optimize(&self, path: &Path) -> TransformResult<()>;
}

/// Runs an external program over the artifact.
///
/// Arguments containing `{file}` have it replaced with the artifact path;
/// without a placeholder the path is appended as the last argument. The
/// child is killed when the future is dropped or the timeout expires.
#[derive(Debug, Clone)]
pub struct CommandOptimizer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOptimizer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from an argv list; `None` when the list is empty
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), timeout))
    }

    fn resolved_args(&self, path: &Path) -> Vec<String> {
        let file = path.to_string_lossy();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, &file))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(FILE_PLACEHOLDER)) {
            args.push(file.into_owned());
        }
        args
    }

    fn failure(&self, message: impl Into<String>) -> TransformError {
        TransformError::Optimizer {
            program: self.program.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Optimizer for CommandOptimizer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn optimize(&self, path: &Path) -> TransformResult<()> {
        let args = self.resolved_args(path);
        debug!("Running optimizer {} with args: {:?}", self.program, args);

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&args);
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output.map_err(|e| self.failure(format!("failed to spawn: {e}")))?,
            Err(_) => {
                return Err(TransformError::Timeout {
                    operation: format!("optimizer {}", self.program),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("{}: {}", output.status, stderr.trim())));
        }
        Ok(())
    }
}

/// Optimizers keyed by lower-case extension without the dot
#[derive(Clone, Default)]
pub struct OptimizerRegistry {
    optimizers: HashMap<String, Arc<dyn Optimizer>>,
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

impl OptimizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ImagesConfig) -> Self {
        let mut registry = Self::new();
        for (extension, argv) in &config.optimizers {
            if let Some(optimizer) = CommandOptimizer::from_argv(argv, config.optimizer_timeout) {
                registry.register(extension, Arc::new(optimizer));
            }
        }
        registry
    }

    pub fn register(&mut self, extension: &str, optimizer: Arc<dyn Optimizer>) {
        self.optimizers
            .insert(normalize_extension(extension), optimizer);
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn Optimizer>> {
        self.optimizers.get(&normalize_extension(extension))
    }

    /// Run the optimizer registered for the path's extension.
    ///
    /// Returns `false` without doing anything when none is registered.
    pub async fn optimize(&self, path: &Path) -> TransformResult<bool> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match self.get(extension) {
            Some(optimizer) => {
                optimizer.optimize(path).await?;
                debug!("Optimized {} with {}", path.display(), optimizer.name());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for OptimizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&String> = self.optimizers.keys().collect();
        extensions.sort();
        f.debug_struct("OptimizerRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_placeholder_substitution() {
        let optimizer =
            CommandOptimizer::from_argv(&argv(&["optipng", "-quiet", "{file}"]), Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            optimizer.resolved_args(Path::new("/tmp/a.png")),
            argv(&["-quiet", "/tmp/a.png"])
        );

        let appended =
            CommandOptimizer::from_argv(&argv(&["jpegoptim", "--strip-all"]), Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            appended.resolved_args(Path::new("/tmp/a.jpg")),
            argv(&["--strip-all", "/tmp/a.jpg"])
        );

        assert!(CommandOptimizer::from_argv(&[], Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn test_unregistered_extension_is_noop() {
        let registry = OptimizerRegistry::new();
        let ran = registry.optimize(Path::new("/nonexistent/a.webp")).await.unwrap();
        assert!(!ran);
    }

    #[test]
    fn test_from_config_normalizes_extensions() {
        let mut optimizers = BTreeMap::new();
        optimizers.insert(".PNG".to_string(), argv(&["optipng", "{file}"]));
        let config = ImagesConfig {
            optimizers,
            ..ImagesConfig::default()
        };

        let registry = OptimizerRegistry::from_config(&config);
        assert_eq!(registry.get("png").map(|o| o.name()), Some("optipng"));
        assert!(registry.get(".png").is_some());
        assert!(registry.get("jpg").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_rewrites_file_in_place() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        std::fs::write(&path, b"before").unwrap();

        let mut registry = OptimizerRegistry::new();
        registry.register(
            "png",
            Arc::new(CommandOptimizer::new(
                "sh",
                argv(&["-c", "printf after > \"$0\"", "{file}"]),
                Duration::from_secs(10),
            )),
        );

        assert!(registry.optimize(&path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"after");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_an_optimizer_error() {
        let optimizer = CommandOptimizer::new(
            "sh",
            argv(&["-c", "echo broken >&2; exit 3"]),
            Duration::from_secs(10),
        );
        let err = optimizer.optimize(Path::new("/tmp/x.png")).await.unwrap_err();
        match err {
            TransformError::Optimizer { program, message } => {
                assert_eq!(program, "sh");
                assert!(message.contains("broken"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let optimizer = CommandOptimizer::new(
            "sh",
            argv(&["-c", "sleep 5"]),
            Duration::from_millis(100),
        );
        let err = optimizer.optimize(Path::new("/tmp/x.png")).await.unwrap_err();
        assert!(matches!(err, TransformError::Timeout { .. }));
    }
}
