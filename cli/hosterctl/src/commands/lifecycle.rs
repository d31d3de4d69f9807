//! Deployment lifecycle checks.

use anyhow::Result;
use clap::Args;
use hoster_model::{lifecycle, DeploymentStatus};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_json, print_output, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct TransitionCommand {
    /// Current status (example: running).
    from: DeploymentStatus,

    /// Requested status.
    to: DeploymentStatus,
}

#[derive(Debug, Args)]
pub struct TransitionsCommand {
    /// Only list transitions out of this status.
    #[arg(long)]
    from: Option<DeploymentStatus>,
}

#[derive(Debug, Serialize, Tabled)]
struct TransitionRow {
    #[tabled(rename = "From")]
    from: DeploymentStatus,

    #[tabled(rename = "To")]
    to: DeploymentStatus,

    #[tabled(rename = "Trigger")]
    trigger: &'static str,
}

#[derive(Debug, Serialize)]
struct TransitionCheck {
    from: DeploymentStatus,
    to: DeploymentStatus,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    trigger: Option<&'static str>,
}

impl TransitionCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let result = lifecycle::validate(self.from, self.to);

        if ctx.format == OutputFormat::Json {
            print_json(&TransitionCheck {
                from: self.from,
                to: self.to,
                allowed: result.is_ok(),
                trigger: result.as_ref().ok().map(|t| t.as_str()),
            });
        }

        let trigger = result?;
        if ctx.format == OutputFormat::Table {
            print_success(&format!(
                "{} -> {} is allowed (trigger: {})",
                self.from,
                self.to,
                trigger.as_str()
            ));
        }
        Ok(())
    }
}

impl TransitionsCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        print_output(&rows(self.from), ctx.format);
        Ok(())
    }
}

fn rows(from: Option<DeploymentStatus>) -> Vec<TransitionRow> {
    lifecycle::TRANSITIONS
        .iter()
        .filter(|t| from.is_none_or(|f| t.from == f))
        .map(|t| TransitionRow {
            from: t.from,
            to: t.to,
            trigger: t.trigger.as_str(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoster_model::TransitionError;

    #[test]
    fn test_rows_filtered_by_source() {
        let all = rows(None);
        assert_eq!(all.len(), lifecycle::TRANSITIONS.len());

        let from_running = rows(Some(DeploymentStatus::Running));
        let targets: Vec<_> = from_running.iter().map(|r| r.to).collect();
        assert_eq!(targets, lifecycle::allowed_transitions(DeploymentStatus::Running));
    }

    #[test]
    fn test_illegal_transition_is_error() {
        let cmd = TransitionCommand {
            from: DeploymentStatus::Pending,
            to: DeploymentStatus::Running,
        };
        let err = cmd
            .run(CommandContext {
                format: OutputFormat::Table,
            })
            .unwrap_err();
        assert!(err.downcast_ref::<TransitionError>().is_some());
    }

    #[test]
    fn test_legal_transition() {
        let cmd = TransitionCommand {
            from: DeploymentStatus::Running,
            to: DeploymentStatus::Stopping,
        };
        assert!(cmd
            .run(CommandContext {
                format: OutputFormat::Json,
            })
            .is_ok());
    }
}
