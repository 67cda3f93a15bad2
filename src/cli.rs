use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use kodegen_claude_bridge::{BridgeOptions, PermissionMode};
use kodegen_claude_bridge::types::options::DEFAULT_BIND_ADDR;

fn parse_positive_secs(value: &str) -> Result<Duration, String> {
    let secs = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse seconds: {error}"))?;
    if secs == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(Duration::from_secs(secs))
}

#[derive(Debug, Parser)]
#[command(
    name = "kodegen-claude-bridge",
    about = "WebSocket bridge to the Claude Code CLI",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "addr",
        env = "CLAUDE_BRIDGE_ADDR",
        default_value = DEFAULT_BIND_ADDR,
        help = "Address the WebSocket server listens on"
    )]
    pub(crate) addr: SocketAddr,

    #[arg(
        long = "cli-path",
        env = "CLAUDE_BRIDGE_CLI_PATH",
        help = "Claude Code executable; searched on PATH and common install locations when unset"
    )]
    pub(crate) cli_path: Option<PathBuf>,

    #[arg(long, env = "CLAUDE_BRIDGE_MODEL", help = "Model passed to every session")]
    pub(crate) model: Option<String>,

    #[arg(
        long = "permission-mode",
        env = "CLAUDE_BRIDGE_PERMISSION_MODE",
        help = "Permission mode: default, acceptEdits, plan or bypassPermissions"
    )]
    pub(crate) permission_mode: Option<PermissionMode>,

    #[arg(
        long = "permission-prompt-tool",
        env = "CLAUDE_BRIDGE_PERMISSION_PROMPT_TOOL",
        help = "Tool the CLI routes permission prompts through"
    )]
    pub(crate) permission_prompt_tool: Option<String>,

    #[arg(
        long = "idle-timeout-secs",
        env = "CLAUDE_BRIDGE_IDLE_TIMEOUT_SECS",
        default_value = "1800",
        value_parser = parse_positive_secs,
        help = "Sessions without user activity for this long are ended by the sweep"
    )]
    pub(crate) idle_timeout: Duration,

    #[arg(
        long = "sweep-interval-secs",
        env = "CLAUDE_BRIDGE_SWEEP_INTERVAL_SECS",
        default_value = "60",
        value_parser = parse_positive_secs,
        help = "Interval between idle sweeps"
    )]
    pub(crate) sweep_interval: Duration,

    #[arg(
        long = "allowed-root",
        env = "CLAUDE_BRIDGE_ALLOWED_ROOTS",
        value_delimiter = ',',
        help = "Extra directories a session working directory may live under, besides home and temp"
    )]
    pub(crate) allowed_roots: Vec<PathBuf>,

    #[arg(
        long = "detach-on-disconnect",
        env = "CLAUDE_BRIDGE_DETACH_ON_DISCONNECT",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Keep sessions running when their WebSocket connection drops"
    )]
    pub(crate) detach_on_disconnect: bool,

    #[arg(
        long = "auto-resume",
        env = "CLAUDE_BRIDGE_AUTO_RESUME",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Restart the CLI on the same conversation after an abort"
    )]
    pub(crate) auto_resume: bool,
}

impl Cli {
    pub(crate) fn into_options(self) -> BridgeOptions {
        let mut builder = BridgeOptions::builder()
            .bind_addr(self.addr)
            .idle_timeout(self.idle_timeout)
            .sweep_interval(self.sweep_interval)
            .detach_on_disconnect(self.detach_on_disconnect)
            .auto_resume_on_abort(self.auto_resume);
        if let Some(path) = self.cli_path {
            builder = builder.cli_path(path);
        }
        if let Some(model) = self.model {
            builder = builder.model(model);
        }
        if let Some(mode) = self.permission_mode {
            builder = builder.permission_mode(mode);
        }
        if let Some(tool) = self.permission_prompt_tool {
            builder = builder.permission_prompt_tool_name(tool);
        }
        for root in self.allowed_roots {
            builder = builder.allowed_root(root);
        }
        builder.build()
    }
}
