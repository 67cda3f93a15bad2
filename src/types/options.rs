//! Bridge options and configuration
//!
//! This module contains the configuration for the bridge server, the session
//! registry and the CLI processes it spawns, including a builder pattern.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Default listen address of the WebSocket server
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";

/// Sessions idle for longer than this are ended by the sweep (30 minutes)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Interval between idle sweeps (1 minute)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How long abort and end wait for the process to exit after the kill
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on the whole registry shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Permission Mode
// ============================================================================

/// Permission modes for tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Default mode - CLI prompts for dangerous tools
    Default,
    /// Auto-accept file edits
    AcceptEdits,
    /// Plan mode
    Plan,
    /// Allow all tools (use with caution)
    BypassPermissions,
}

impl PermissionMode {
    /// The value `--permission-mode` expects
    #[must_use]
    pub const fn as_cli_arg(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "plan" => Ok(Self::Plan),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            other => Err(BridgeError::invalid_config(format!(
                "unknown permission mode '{other}'"
            ))),
        }
    }
}

// ============================================================================
// Bridge Options
// ============================================================================

/// Main options for the bridge
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Address the WebSocket server listens on
    pub bind_addr: SocketAddr,
    /// Path to Claude Code CLI (searched on PATH if unset)
    pub cli_path: Option<PathBuf>,
    /// AI model to use
    pub model: Option<String>,
    /// Permission mode for tool execution
    pub permission_mode: Option<PermissionMode>,
    /// Tool name to use for permission prompts
    pub permission_prompt_tool_name: Option<String>,
    /// Environment variables for the CLI process
    pub env: HashMap<String, String>,
    /// Extra CLI arguments to pass (allow-listed)
    pub extra_args: HashMap<String, Option<String>>,
    /// Roots a working directory may live under, besides home and temp
    pub allowed_roots: Vec<PathBuf>,
    /// Idle threshold for the sweep
    pub idle_timeout: Duration,
    /// Sweep interval
    pub sweep_interval: Duration,
    /// Wait for process exit after a kill
    pub terminate_timeout: Duration,
    /// Bound on `shutdown_all`
    pub shutdown_timeout: Duration,
    /// Maximum length of one stdout/stderr line (default: 1MB)
    pub max_line_bytes: usize,
    /// Restart the CLI on the same conversation after an abort
    pub auto_resume_on_abort: bool,
    /// Keep sessions running when their WebSocket disconnects
    pub detach_on_disconnect: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            cli_path: None,
            model: None,
            permission_mode: None,
            permission_prompt_tool_name: None,
            env: HashMap::new(),
            extra_args: HashMap::new(),
            allowed_roots: Vec::new(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_line_bytes: crate::process::DEFAULT_MAX_LINE_BYTES,
            auto_resume_on_abort: true,
            detach_on_disconnect: false,
        }
    }
}

impl BridgeOptions {
    /// Create a new builder for `BridgeOptions`
    #[must_use]
    pub fn builder() -> BridgeOptionsBuilder {
        BridgeOptionsBuilder::default()
    }
}

// ============================================================================
// Builder for BridgeOptions
// ============================================================================

/// Builder for `BridgeOptions`
#[derive(Debug, Default)]
pub struct BridgeOptionsBuilder {
    options: BridgeOptions,
}

impl BridgeOptionsBuilder {
    /// Set the listen address
    #[must_use]
    pub const fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.options.bind_addr = addr;
        self
    }

    /// Set the CLI path
    #[must_use]
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cli_path = Some(path.into());
        self
    }

    /// Set the model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Set permission mode
    #[must_use]
    pub const fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.options.permission_mode = Some(mode);
        self
    }

    /// Set the permission prompt tool
    #[must_use]
    pub fn permission_prompt_tool_name(mut self, tool: impl Into<String>) -> Self {
        self.options.permission_prompt_tool_name = Some(tool.into());
        self
    }

    /// Add an environment variable for the CLI process
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Add an extra CLI flag
    #[must_use]
    pub fn extra_arg(mut self, flag: impl Into<String>, value: Option<String>) -> Self {
        self.options.extra_args.insert(flag.into(), value);
        self
    }

    /// Allow working directories under `root`
    #[must_use]
    pub fn allowed_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.allowed_roots.push(root.into());
        self
    }

    /// Set the idle timeout
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.options.idle_timeout = timeout;
        self
    }

    /// Set the sweep interval
    #[must_use]
    pub const fn sweep_interval(mut self, interval: Duration) -> Self {
        self.options.sweep_interval = interval;
        self
    }

    /// Set how long to wait for a killed process
    #[must_use]
    pub const fn terminate_timeout(mut self, timeout: Duration) -> Self {
        self.options.terminate_timeout = timeout;
        self
    }

    /// Set the shutdown bound
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.options.shutdown_timeout = timeout;
        self
    }

    /// Set the maximum line length
    ///
    /// # Panics
    /// Panics if `bytes` is zero
    #[must_use]
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        assert!(bytes > 0, "max_line_bytes must be positive");
        self.options.max_line_bytes = bytes;
        self
    }

    /// Enable or disable resume-after-abort
    #[must_use]
    pub const fn auto_resume_on_abort(mut self, enabled: bool) -> Self {
        self.options.auto_resume_on_abort = enabled;
        self
    }

    /// Keep sessions alive when their connection drops
    #[must_use]
    pub const fn detach_on_disconnect(mut self, enabled: bool) -> Self {
        self.options.detach_on_disconnect = enabled;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> BridgeOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_constants() {
        let options = BridgeOptions::default();
        assert_eq!(options.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(options.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(options.sweep_interval, DEFAULT_SWEEP_INTERVAL);
        assert!(options.auto_resume_on_abort);
        assert!(!options.detach_on_disconnect);
    }

    #[test]
    fn builder_overrides_defaults() {
        let options = BridgeOptions::builder()
            .idle_timeout(Duration::from_secs(120))
            .permission_mode(PermissionMode::Plan)
            .allowed_root("/srv/work")
            .detach_on_disconnect(true)
            .build();
        assert_eq!(options.idle_timeout, Duration::from_secs(120));
        assert_eq!(options.permission_mode, Some(PermissionMode::Plan));
        assert_eq!(options.allowed_roots, vec![PathBuf::from("/srv/work")]);
        assert!(options.detach_on_disconnect);
    }

    #[test]
    fn permission_mode_parses_cli_spelling() {
        for mode in [
            PermissionMode::Default,
            PermissionMode::AcceptEdits,
            PermissionMode::Plan,
            PermissionMode::BypassPermissions,
        ] {
            assert_eq!(mode.as_cli_arg().parse::<PermissionMode>().unwrap(), mode);
        }
        assert!(matches!(
            "yolo".parse::<PermissionMode>(),
            Err(BridgeError::InvalidConfig(_))
        ));
    }
}
