//! Control-plane synchronization.
//!
//! Polls the full routing projection and swaps it into the [`TargetTable`] when it
//! changes. Failed polls leave the last applied table in place.
//!
//! [`TargetTable`]: crate::proxy::TargetTable

use std::time::Duration;

use anyhow::{Context, Result};
use hoster_model::ProxyTarget;
use hoster_networking::normalize_hostname;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::persistence::StatePersistence;
use crate::proxy::{SharedTargetTable, TargetMap};

#[derive(Debug, Deserialize)]
struct TargetsResponse {
    targets: Vec<TargetEntry>,
}

#[derive(Debug, Deserialize)]
struct TargetEntry {
    slug: String,
    #[serde(flatten)]
    target: ProxyTarget,
}

pub struct TargetSync {
    client: reqwest::Client,
    base_url: String,
    table: SharedTargetTable,
    persistence: Option<StatePersistence>,
}

impl TargetSync {
    pub fn new(
        base_url: &str,
        table: SharedTargetTable,
        persistence: Option<StatePersistence>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hoster-ingress/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            table,
            persistence,
        })
    }

    /// Fetch the current projection from the control plane.
    pub async fn fetch(&self) -> Result<TargetMap> {
        let url = format!("{}/v1/ingress/targets", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "targets query failed (status={}): {}",
                status,
                body
            ));
        }

        let body: TargetsResponse = resp.json().await.context("invalid targets response")?;
        let mut targets = TargetMap::new();
        for entry in body.targets {
            let slug = normalize_hostname(&entry.slug);
            if slug.is_empty() {
                warn!(deployment_id = %entry.target.deployment_id, "Skipping target without slug");
                continue;
            }
            if targets.insert(slug.clone(), entry.target).is_some() {
                warn!(slug = %slug, "Duplicate slug in targets response, keeping the last");
            }
        }
        Ok(targets)
    }

    /// Run one poll. Returns whether the table changed.
    pub async fn sync_once(&self) -> Result<bool> {
        let targets = self.fetch().await?;
        if *self.table.snapshot() == targets {
            debug!(target_count = targets.len(), "Targets unchanged");
            return Ok(false);
        }

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(&targets) {
                warn!(error = %e, "Failed to persist target table");
            }
        }
        self.table.replace(targets);
        Ok(true)
    }

    /// Poll forever at `interval`.
    pub async fn run(&self, interval: Duration) {
        info!(
            control_plane_url = %self.base_url,
            interval_ms = interval.as_millis() as u64,
            "Target sync started"
        );
        loop {
            if let Err(e) = self.sync_once().await {
                warn!(
                    error = %e,
                    target_count = self.table.len(),
                    "Target sync failed, serving last known table"
                );
            }
            tokio::time::sleep(interval).await;
        }
    }
}
