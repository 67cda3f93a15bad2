//! CLI command building logic

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{BridgeError, Result};
use crate::types::identifiers::UpstreamSessionId;
use crate::types::options::BridgeOptions;

use super::config::{ALLOWED_EXTRA_FLAGS, DANGEROUS_ENV_VARS};

/// Reported to the CLI as `CLAUDE_CODE_ENTRYPOINT`
pub const ENTRYPOINT: &str = "kodegen-claude-bridge";

/// Command builder for one Claude CLI session process
pub struct CommandBuilder<'a> {
    cli_path: &'a Path,
    work_dir: &'a Path,
    resume: Option<&'a UpstreamSessionId>,
    options: &'a BridgeOptions,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    pub fn new(cli_path: &'a Path, work_dir: &'a Path, options: &'a BridgeOptions) -> Self {
        Self {
            cli_path,
            work_dir,
            resume: None,
            options,
        }
    }

    /// Continue an existing upstream conversation
    #[must_use]
    pub fn resume(mut self, upstream: Option<&'a UpstreamSessionId>) -> Self {
        self.resume = upstream;
        self
    }

    /// The argument list, without the program name
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--print",
            "--output-format",
            "stream-json",
            "--input-format",
            "stream-json",
            "--verbose",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        args.push("--add-dir".to_string());
        args.push(self.work_dir.to_string_lossy().to_string());

        if let Some(upstream) = self.resume {
            args.push("--resume".to_string());
            args.push(upstream.as_str().to_string());
        }

        if let Some(ref model) = self.options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(ref tool) = self.options.permission_prompt_tool_name {
            args.push("--permission-prompt-tool".to_string());
            args.push(tool.clone());
        }

        if let Some(mode) = self.options.permission_mode {
            args.push("--permission-mode".to_string());
            args.push(mode.as_cli_arg().to_string());
        }

        let mut extra: Vec<_> = self.options.extra_args.iter().collect();
        extra.sort_by(|a, b| a.0.cmp(b.0));
        for (flag, value) in extra {
            if !ALLOWED_EXTRA_FLAGS.contains(&flag.as_str()) {
                log::warn!("Ignoring extra CLI flag --{flag}: not in the allowlist");
                continue;
            }
            args.push(format!("--{flag}"));
            if let Some(v) = value {
                args.push(v.clone());
            }
        }

        args
    }

    /// Environment for the child process
    ///
    /// Inherits the bridge's environment, then layers the configured
    /// variables on top minus anything in [`DANGEROUS_ENV_VARS`].
    #[must_use]
    pub fn env(&self) -> HashMap<String, String> {
        let mut process_env = env::vars().collect::<HashMap<_, _>>();

        for (key, value) in &self.options.env {
            if DANGEROUS_ENV_VARS.contains(&key.as_str()) {
                log::warn!("Refusing to pass {key} to Claude Code");
                continue;
            }
            process_env.insert(key.clone(), value.clone());
        }

        process_env.insert("CLAUDE_CODE_ENTRYPOINT".to_string(), ENTRYPOINT.to_string());
        process_env.insert(
            "PWD".to_string(),
            self.work_dir.to_string_lossy().to_string(),
        );
        process_env
    }

    /// Build the complete CLI command with piped stdio
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(self.cli_path);
        cmd.args(self.args())
            .envs(self.env())
            .current_dir(self.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // piped rather than inherited so the child cannot touch our terminal
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Find Claude Code CLI binary
///
/// # Errors
/// Returns error if CLI cannot be found in PATH or common locations
pub fn find_cli() -> Result<PathBuf> {
    if let Ok(path) = which::which("claude") {
        return Ok(path);
    }

    let Some(home) = dirs::home_dir() else {
        return Err(BridgeError::cli_not_found());
    };
    let locations = [
        home.join(".npm-global/bin/claude"),
        PathBuf::from("/usr/local/bin/claude"),
        home.join(".local/bin/claude"),
        home.join("node_modules/.bin/claude"),
        home.join(".yarn/bin/claude"),
        home.join(".claude/local/claude"),
    ];

    locations
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(BridgeError::cli_not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::options::PermissionMode;

    #[test]
    fn base_args_select_stream_json_both_ways() {
        let options = BridgeOptions::default();
        let builder = CommandBuilder::new(Path::new("claude"), Path::new("/tmp"), &options);
        assert_eq!(
            builder.args(),
            vec![
                "--print",
                "--output-format",
                "stream-json",
                "--input-format",
                "stream-json",
                "--verbose",
                "--add-dir",
                "/tmp"
            ]
        );
    }

    #[test]
    fn resume_and_configuration_flags() {
        let options = BridgeOptions::builder()
            .model("claude-sonnet-4-5")
            .permission_mode(PermissionMode::AcceptEdits)
            .extra_arg("max-turns", Some("3".to_string()))
            .extra_arg("dangerously-skip-permissions", None)
            .build();
        let upstream = UpstreamSessionId::new("abc-123");
        let args = CommandBuilder::new(Path::new("claude"), Path::new("/tmp"), &options)
            .resume(Some(&upstream))
            .args();

        let joined = args.join(" ");
        assert!(joined.contains("--resume abc-123"));
        assert!(joined.contains("--model claude-sonnet-4-5"));
        assert!(joined.contains("--permission-mode acceptEdits"));
        assert!(joined.contains("--max-turns 3"));
        assert!(!joined.contains("dangerously"));
    }

    #[test]
    fn dangerous_env_vars_are_filtered() {
        let options = BridgeOptions::builder()
            .env("LD_PRELOAD", "/evil.so")
            .env("BRIDGE_TEST_MARKER", "1")
            .build();
        let builder = CommandBuilder::new(Path::new("claude"), Path::new("/tmp"), &options);
        let env = builder.env();
        assert_eq!(env.get("BRIDGE_TEST_MARKER").map(String::as_str), Some("1"));
        assert_ne!(env.get("LD_PRELOAD").map(String::as_str), Some("/evil.so"));
        assert_eq!(env.get("PWD").map(String::as_str), Some("/tmp"));
    }

    #[test]
    fn entrypoint_names_the_bridge() {
        let options = BridgeOptions::builder()
            .env("CLAUDE_CODE_ENTRYPOINT", "spoofed")
            .build();
        let env = CommandBuilder::new(Path::new("claude"), Path::new("/tmp"), &options).env();
        assert_eq!(
            env.get("CLAUDE_CODE_ENTRYPOINT").map(String::as_str),
            Some("kodegen-claude-bridge")
        );
        assert!(!env.contains_key("CLAUDE_AGENT_SDK_VERSION"));
    }
}
