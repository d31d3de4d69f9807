//! Placement dry-run over a node snapshot file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use hoster_control_plane::scheduler::{rank, Ranking};
use hoster_control_plane::{schedule, ScheduleRequest};
use hoster_model::{CapabilitySet, Node, Resources};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_json, print_output, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct ScheduleCommand {
    /// JSON file holding an array of nodes.
    #[arg(long)]
    nodes: PathBuf,

    /// CPU cores requested.
    #[arg(long, default_value_t = 0.0)]
    cpu: f64,

    /// Memory requested, in MB.
    #[arg(long, default_value_t = 0)]
    memory_mb: u64,

    /// Disk requested, in MB.
    #[arg(long, default_value_t = 0)]
    disk_mb: u64,

    /// Capability every candidate must have (repeatable).
    #[arg(long = "require")]
    required: Vec<String>,

    /// Capability the plan allows (repeatable; none means no restriction).
    #[arg(long = "allow")]
    allowed: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct CandidateRow {
    #[tabled(rename = "Rank")]
    rank: usize,

    #[tabled(rename = "Node")]
    node_id: String,

    #[tabled(rename = "Score", display = "display_score")]
    score: f64,
}

fn display_score(score: &f64) -> String {
    format!("{score:.2}")
}

#[derive(Debug, Serialize)]
struct ScheduleReport<'a> {
    request: &'a ScheduleRequest,
    ranking: &'a Ranking,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ScheduleCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let nodes = load_nodes(&self.nodes)?;
        let request = self.request();
        let ranking = rank(&nodes, &request);
        let decision = schedule(&nodes, &request);

        match ctx.format {
            OutputFormat::Json => print_json(&ScheduleReport {
                request: &request,
                ranking: &ranking,
                error: decision.as_ref().err().map(ToString::to_string),
            }),
            OutputFormat::Table => {
                let rows: Vec<CandidateRow> = ranking
                    .candidates
                    .iter()
                    .enumerate()
                    .map(|(i, c)| CandidateRow {
                        rank: i + 1,
                        node_id: c.node_id.to_string(),
                        score: c.score,
                    })
                    .collect();
                print_output(&rows, ctx.format);
                println!("{} {}", "Diagnostics:".bold(), ranking.diagnostics);
            }
        }

        let best = decision?;
        if ctx.format == OutputFormat::Table {
            print_success(&format!("placed on {} (score {:.2})", best.node_id, best.score));
        }
        Ok(())
    }

    fn request(&self) -> ScheduleRequest {
        ScheduleRequest::new(Resources::new(self.cpu, self.memory_mb, self.disk_mb))
            .with_required(self.required.iter().cloned().collect::<CapabilitySet>())
            .with_allowed(self.allowed.iter().cloned().collect::<CapabilitySet>())
    }
}

fn load_nodes(path: &Path) -> Result<Vec<Node>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read nodes file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid nodes file {}", path.display()))
}
