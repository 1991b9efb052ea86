//! Desktop notification sink
//!
//! Shows the "next event" notification through `notify-send` and removes it
//! through the freedesktop notifications D-Bus interface via `gdbus`.

use nextup_api::{NotificationContent, NotificationPriority};
use nextup_host_api::{HostError, HostResult, NotificationSink};
use std::collections::HashMap;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const APP_NAME: &str = "nextup";

/// Longest a notification helper may run before it is killed
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Notification sink backed by `notify-send`
///
/// The notification server assigns its own ids, so the sink keeps a map from
/// our fixed notification id to the server id and passes it back as
/// `--replace-id` to update in place.
///
/// Helpers are called from the scheduler's decision cycle, so each run is
/// bounded by a timeout and killed when it overstays.
pub struct NotifySendSink {
    server_ids: Mutex<HashMap<u32, u32>>,
    timeout: Duration,
}

impl NotifySendSink {
    pub fn new() -> Self {
        Self::with_timeout(HELPER_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            server_ids: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Check whether `notify-send` is on the PATH
    pub fn is_available() -> bool {
        run_bounded(Command::new("notify-send").arg("--version"), HELPER_TIMEOUT)
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn close(&self, server_id: u32) -> HostResult<()> {
        let mut command = Command::new("gdbus");
        command
            .args([
                "call",
                "--session",
                "--dest",
                "org.freedesktop.Notifications",
                "--object-path",
                "/org/freedesktop/Notifications",
                "--method",
                "org.freedesktop.Notifications.CloseNotification",
            ])
            .arg(server_id.to_string());
        let output = run_bounded(&mut command, self.timeout)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HostError::NotifyFailed(format!(
                "CloseNotification({}) failed: {}",
                server_id,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Default for NotifySendSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for NotifySendSink {
    fn issue(&self, content: &NotificationContent) -> HostResult<()> {
        let mut ids = self.server_ids.lock().unwrap();
        let replace = ids.get(&content.id).copied();

        let mut command = Command::new("notify-send");
        command.args(notify_send_args(content, replace));
        let output = run_bounded(&mut command, self.timeout)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HostError::NotifyFailed(stderr.trim().to_string()));
        }

        match parse_print_id(&String::from_utf8_lossy(&output.stdout)) {
            Some(server_id) => {
                ids.insert(content.id, server_id);
                debug!(id = content.id, server_id, "Notification shown");
            }
            None => debug!(id = content.id, "notify-send did not report an id"),
        }
        Ok(())
    }

    fn cancel(&self) -> HostResult<()> {
        let drained: Vec<(u32, u32)> = self.server_ids.lock().unwrap().drain().collect();
        for (id, server_id) in drained {
            self.close(server_id)?;
            info!(id, server_id, "Notification closed");
        }
        Ok(())
    }
}

/// Run a helper to completion, killing it once `timeout` has passed
pub fn run_bounded(command: &mut Command, timeout: Duration) -> HostResult<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let started = Instant::now();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            warn!(program = %program, timeout_ms = timeout.as_millis() as u64, "Helper killed after timeout");
            return Err(HostError::NotifyFailed(format!(
                "{} timed out after {}ms",
                program,
                timeout.as_millis()
            )));
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    if let Some(mut pipe) = child.stdout.take() {
        pipe.read_to_end(&mut stdout)?;
    }
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_end(&mut stderr)?;
    }

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Arguments for `notify-send`, without the program name
pub fn notify_send_args(content: &NotificationContent, replace_id: Option<u32>) -> Vec<String> {
    let mut args = vec![
        format!("--app-name={}", APP_NAME),
        "--print-id".to_string(),
        format!("--urgency={}", urgency(content.priority)),
    ];

    if let Some(id) = replace_id {
        args.push(format!("--replace-id={}", id));
    }

    if content.ongoing {
        args.push("--expire-time=0".to_string());
        args.push("--hint=boolean:resident:true".to_string());
    }

    args.push(content.title.clone());
    args.push(content.body.clone());
    args
}

fn urgency(priority: NotificationPriority) -> &'static str {
    match priority {
        NotificationPriority::Low => "low",
        NotificationPriority::Normal => "normal",
        NotificationPriority::High => "critical",
    }
}

/// Parse the id printed by `notify-send --print-id`
pub fn parse_print_id(stdout: &str) -> Option<u32> {
    stdout.lines().next()?.trim().parse().ok()
}
