//! Notices to the observing team: run completed, or run failed.
//!
//! Delivery is external. A [`CommandNotifier`] hands the notice to a
//! `mail(1)`-compatible program: subject via `-s`, recipients as arguments,
//! body on stdin.

use std::{
    io::{self, Write},
    process::{Command, Stdio},
};

use tracing::{info, warn};
use uuid::Uuid;

use crate::{pipeline::RunFailure, workspace::Workspace};

const RULE_WIDTH: usize = 60;

/// Errors delivering a notice.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("no recipients configured")]
    NoRecipients,

    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("failed to write notice body: {0}")]
    Io(#[from] io::Error),

    #[error("{program} failed: {stderr}")]
    Failed { program: String, stderr: String },
}

/// A rendered notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: String,
    pub body: String,
}

impl Notice {
    /// The trigger page for a real event is up.
    pub fn completed(workspace: &Workspace, site_url: Option<&str>, run_id: Uuid) -> Self {
        let id = &workspace.trigger_id;
        let dir = &workspace.trigger_dir;
        let page = format!("Triggers/{id}/{id}_{dir}_trigger.html");
        let link = match site_url {
            Some(base) => format!("{}/{page}", base.trim_end_matches('/')),
            None => page,
        };
        Self {
            subject: format!("Webpage created for REAL event {id} Map: {dir} NOREPLY"),
            body: format!(
                "Webpage created for REAL event. See\n{link}\n\n\
                 Run: {run_id}\n\n\
                 DO NOT REPLY TO THIS THREAD, NOT ALL USERS WILL SEE YOUR RESPONSE."
            ),
        }
    }

    /// A run stopped at `failure.stage`.
    pub fn processing_error(workspace: &Workspace, failure: &RunFailure) -> Self {
        let id = &workspace.trigger_id;
        let rule = "-".repeat(RULE_WIDTH);
        Self {
            subject: format!(
                "REAL Trigger {id} {} Processing FAILED!",
                workspace.trigger_dir
            ),
            body: format!(
                "Processing Failed for REAL Trigger {id}\n\n\
                 Stage: {}\n\n\
                 Location: {}\n\n\
                 Error: {}\n\n\
                 Run: {}\n\n\
                 {rule}\n{}\n{rule}\n",
                failure.stage, failure.location, failure.cause, failure.run_id, failure.trace
            ),
        }
    }
}

/// The external messaging collaborator.
pub trait Notifier {
    fn send(&mut self, notice: &Notice, recipients: &[String]) -> Result<(), NotifyError>;
}

/// Delivers notices through a `mail(1)`-style program.
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn send(&mut self, notice: &Notice, recipients: &[String]) -> Result<(), NotifyError> {
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let mut child = Command::new(&self.program)
            .arg("-s")
            .arg(&notice.subject)
            .args(recipients)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| NotifyError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(notice.body.as_bytes())?;
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NotifyError::Failed {
                program: self.program.clone(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Send a notice, logging rather than propagating delivery failures.
///
/// Returns whether the notice was delivered.
pub fn notify(notifier: &mut dyn Notifier, notice: &Notice, recipients: &[String]) -> bool {
    match notifier.send(notice, recipients) {
        Ok(()) => {
            info!(subject = %notice.subject, "notice sent");
            true
        }
        Err(e) => {
            warn!(subject = %notice.subject, "could not send notice: {e}");
            false
        }
    }
}
