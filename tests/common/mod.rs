//! Shared helpers for the integration tests
//!
//! Sessions run against a fake `claude` written as a POSIX shell script into
//! a temporary directory. It logs its arguments and every stdin line next to
//! itself and answers in stream-json.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kodegen_claude_bridge::{BridgeOptions, SessionEvent};
use tokio::sync::mpsc::UnboundedReceiver;

/// Emits `system/init` on the first input line, then reacts to keywords
pub const ECHO_CLI: &str = r#"#!/bin/sh
dir=$(dirname "$0")
echo "$*" >> "$dir/args.log"
upstream=upstream-1
prev=
for arg in "$@"; do
  if [ "$prev" = "--resume" ]; then upstream="$arg"; fi
  prev="$arg"
done
initialized=
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$dir/stdin.log"
  if [ -z "$initialized" ]; then
    printf '{"type":"system","subtype":"init","session_id":"%s","tools":[]}\n' "$upstream"
    initialized=1
  fi
  case "$line" in
    *'"approval"'*) printf '{"type":"result","subtype":"success","is_error":false,"result":"answered"}\n' ;;
    *crash*) echo "fatal: boom" >&2; exit 3 ;;
    *hang*) exec sleep 30 ;;
    *permission*) printf '{"type":"permission_request","id":"perm-1","tool_name":"Bash"}\n' ;;
    *chunked*)
      printf '{"type":"assistant","mess'
      sleep 0.2
      printf 'age":{"role":"assistant","content":"split \303'
      sleep 0.2
      printf '\251"}}\n'
      ;;
    *) printf '{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"echo"}]}}\n' ;;
  esac
done
"#;

/// Exits as soon as it starts
pub const EXITING_CLI: &str = "#!/bin/sh\nexit 0\n";

/// Closes its stdin, then stays alive without reading
pub const CLOSED_STDIN_CLI: &str = "#!/bin/sh\nexec 0<&-\nexec sleep 30\n";

/// Install `script` as an executable `claude` in `dir`
pub fn install_cli(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("claude");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Options pointing at `cli`, with short timeouts
pub fn options_for(cli: &Path) -> BridgeOptions {
    BridgeOptions::builder()
        .cli_path(cli)
        .terminate_timeout(Duration::from_secs(3))
        .shutdown_timeout(Duration::from_secs(5))
        .build()
}

/// Read a log written by the fake CLI
pub fn read_log(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap_or_default()
}

/// Next event, failing the test after five seconds
pub async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

/// Skip events until one matches
pub async fn wait_for<F>(events: &mut UnboundedReceiver<SessionEvent>, matches: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

/// Poll `condition` until it holds, failing after five seconds
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Collect everything that arrives within `window`
pub async fn drain(events: &mut UnboundedReceiver<SessionEvent>, window: Duration) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(window, events.recv()).await {
        seen.push(event);
    }
    seen
}
