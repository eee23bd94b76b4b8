//! External command execution.
//!
//! Firewall and VPN collaborators are configured as argv templates. Arguments
//! containing `{ip}` get the target address substituted. Programs are spawned
//! directly (no shell), so the substituted value is always a single argument,
//! and it is always the canonical text form of a parsed [`IpAddr`].

use crate::error::CommandError;
use serde::Deserialize;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Placeholder replaced by the target IP address.
const IP_PLACEHOLDER: &str = "{ip}";

/// Maximum number of stderr characters kept in a [`CommandError::Failed`].
const STDERR_LIMIT: usize = 512;

/// An argv template for an external command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct CommandSpec(Vec<String>);

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(argv.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.first().is_none_or(|program| program.trim().is_empty())
    }

    /// The program name, used in logs and errors.
    pub fn program(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    /// Expand the template for `ip`. Without an IP the placeholder is left as is.
    pub fn expand(&self, ip: Option<IpAddr>) -> Vec<String> {
        match ip {
            Some(ip) => {
                let ip = ip.to_string();
                self.0
                    .iter()
                    .map(|arg| arg.replace(IP_PLACEHOLDER, &ip))
                    .collect()
            }
            None => self.0.clone(),
        }
    }

    /// Run the command to completion.
    ///
    /// The child is killed if `timeout` elapses first. A non-zero exit status
    /// is an error carrying the (truncated) stderr output.
    pub async fn run(&self, ip: Option<IpAddr>, timeout: Option<Duration>) -> Result<(), CommandError> {
        if self.is_empty() {
            return Err(CommandError::Empty);
        }
        let argv = self.expand(ip);
        let Some((program, args)) = argv.split_first() else {
            return Err(CommandError::Empty);
        };

        debug!(program = %program, args = ?args, "Running external command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let pending = cmd.output();
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(CommandError::TimedOut {
                        program: program.clone(),
                        after: limit,
                    });
                }
            },
            None => pending.await,
        };

        let output = result.map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr: String = String::from_utf8_lossy(&output.stderr)
            .trim()
            .chars()
            .take(STDERR_LIMIT)
            .collect();
        Err(CommandError::Failed {
            program: program.clone(),
            status: output.status.to_string(),
            stderr,
        })
    }
}
