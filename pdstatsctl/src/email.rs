//! HTML ranking report and its delivery through a sendmail-style command.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use chrono_tz::Tz;
use pdstats_core::{escape_html, EmailSection, Ranking};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("io error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    #[error("mail command not found: {command}")]
    CommandNotFound { command: String },
    #[error("mail command {command} failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("no email recipients configured and no email.html_path to write the report to")]
    MissingRecipients,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail")]
pub enum DispatchStatus {
    Executed { detail: Option<String> },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailOutcome {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_path: Option<PathBuf>,
    pub dispatch: DispatchStatus,
}

/// Two ranking tables, production first. Count and description sit on the
/// first row of each group; every incident gets its own row.
pub fn build_html_report(production: &Ranking<'_>, staging: &Ranking<'_>, zone: Tz) -> String {
    let mut html = String::from("<html>");
    push_table(&mut html, "Statistics for Prod Servers", production, zone);
    html.push_str("<br><br><br>");
    push_table(&mut html, "Statistics for Staging Servers", staging, zone);
    html.push_str("</html>");
    html
}

fn push_table(html: &mut String, title: &str, ranking: &Ranking<'_>, zone: Tz) {
    html.push_str(&format!(
        "<p>{title}</p><table><thead><th>Count</th><th>Alarm</th><th>Incidents</th><th></th></thead><tbody>"
    ));
    for entry in &ranking.entries {
        for (position, incident) in entry.incidents.iter().enumerate() {
            let (count, description) = if position == 0 {
                (entry.count.to_string(), escape_html(&entry.description))
            } else {
                (String::new(), String::new())
            };
            html.push_str(&format!(
                "<tr><td>{count}</td><td>{description}</td><td>{}</td><td>{}</td></tr>",
                incident.link(),
                incident.friendly_local(zone)
            ));
        }
    }
    html.push_str("</tbody></table>");
}

#[derive(Debug, Clone)]
pub struct EmailDispatcher {
    settings: EmailSection,
    dry_run: bool,
}

impl EmailDispatcher {
    pub fn new(settings: EmailSection) -> Self {
        Self {
            settings,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn subject_line(&self, subject: &str) -> String {
        match &self.settings.subject_prefix {
            Some(prefix) => format!("{prefix} {subject}"),
            None => subject.to_string(),
        }
    }

    /// Writes the report to `html_path` when configured, then mails it.
    pub fn deliver(&self, subject: &str, html: &str) -> Result<EmailOutcome, EmailError> {
        let subject = self.subject_line(subject);
        let html_path = self.settings.html_path.clone();
        if let Some(path) = &html_path {
            fs::write(path, html).map_err(|source| EmailError::Io {
                source,
                path: Some(path.clone()),
            })?;
            tracing::info!(path = %path.display(), "wrote HTML report");
        }

        let dispatch = if self.dry_run {
            DispatchStatus::Skipped {
                reason: "dry-run".to_string(),
            }
        } else if self.settings.recipients.is_empty() {
            if html_path.is_none() {
                return Err(EmailError::MissingRecipients);
            }
            tracing::warn!("no email recipients configured; report kept on disk only");
            DispatchStatus::Skipped {
                reason: "no recipients configured".to_string(),
            }
        } else {
            self.send(&subject, html)?
        };

        Ok(EmailOutcome {
            subject,
            html_path,
            dispatch,
        })
    }

    fn send(&self, subject: &str, html: &str) -> Result<DispatchStatus, EmailError> {
        let mut command = Command::new(&self.settings.command);
        for arg in &self.settings.args {
            command.arg(arg);
        }
        // `-t` makes sendmail take recipients from the To: header instead.
        if !self.settings.args.iter().any(|arg| arg == "-t") {
            for recipient in &self.settings.recipients {
                command.arg(recipient);
            }
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .map_err(|err| map_command_error(err, &self.settings.command))?;
        if let Some(mut stdin) = child.stdin.take() {
            let body = build_email_body(
                self.settings.sender.as_deref(),
                &self.settings.recipients,
                subject,
                html,
            );
            stdin
                .write_all(body.as_bytes())
                .map_err(|source| EmailError::Io { source, path: None })?;
        }
        let output = child
            .wait_with_output()
            .map_err(|source| EmailError::Io { source, path: None })?;
        if output.status.success() {
            tracing::info!(recipients = self.settings.recipients.len(), "report mailed");
            Ok(DispatchStatus::Executed {
                detail: Some(format!("{} recipient(s)", self.settings.recipients.len())),
            })
        } else {
            Err(EmailError::CommandFailed {
                command: self.settings.command.clone(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn build_email_body(sender: Option<&str>, recipients: &[String], subject: &str, html: &str) -> String {
    let from_line = sender
        .map(|sender| format!("From: {sender}\n"))
        .unwrap_or_default();
    let to_line = if recipients.is_empty() {
        String::new()
    } else {
        format!("To: {}\n", recipients.join(", "))
    };
    format!(
        "{from_line}{to_line}Subject: {subject}\nMIME-Version: 1.0\nContent-Type: text/html; charset=UTF-8\n\n{html}\n"
    )
}

fn map_command_error(err: std::io::Error, command: &str) -> EmailError {
    if err.kind() == std::io::ErrorKind::NotFound {
        EmailError::CommandNotFound {
            command: command.to_string(),
        }
    } else {
        EmailError::Io {
            source: err,
            path: None,
        }
    }
}
