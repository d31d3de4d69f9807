//! Port allocation and hostname routing checks.

use anyhow::{Context, Result};
use clap::Args;
use hoster_networking::{
    allocate_port, HostnameParser, PortRange, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START,
};
use serde::Serialize;

use crate::output::{print_json, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PortCommand {
    /// Ports already taken on the node, comma separated.
    #[arg(long, value_delimiter = ',')]
    used: Vec<u16>,

    /// First port of the range (inclusive).
    #[arg(long, default_value_t = DEFAULT_PORT_RANGE_START)]
    start: u16,

    /// Last port of the range (inclusive).
    #[arg(long, default_value_t = DEFAULT_PORT_RANGE_END)]
    end: u16,
}

#[derive(Debug, Args)]
pub struct HostCommand {
    /// Host header value (example: my-blog.apps.example.com:443).
    host: String,

    /// Base domain deployments are served under.
    #[arg(long, env = "HOSTER_BASE_DOMAIN")]
    base_domain: String,
}

#[derive(Debug, Serialize)]
struct PortResult {
    range: String,
    port: u16,
}

#[derive(Debug, Serialize)]
struct HostResult<'a> {
    host: &'a str,
    base_domain: &'a str,
    slug: Option<String>,
}

impl PortCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let range = PortRange::new(self.start, self.end)?;
        let port = allocate_port(&self.used, range)?;

        match ctx.format {
            OutputFormat::Json => print_json(&PortResult {
                range: range.to_string(),
                port,
            }),
            OutputFormat::Table => print_success(&format!("next free port in {range}: {port}")),
        }
        Ok(())
    }
}

impl HostCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let slug = resolve(&self.host, &self.base_domain)?;

        if ctx.format == OutputFormat::Json {
            print_json(&HostResult {
                host: &self.host,
                base_domain: &self.base_domain,
                slug: slug.clone(),
            });
        }

        let slug = slug.with_context(|| {
            format!(
                "{} does not name a deployment under {}",
                self.host, self.base_domain
            )
        })?;
        if ctx.format == OutputFormat::Table {
            print_success(&format!("slug: {slug}"));
        }
        Ok(())
    }
}

fn resolve(host: &str, base_domain: &str) -> Result<Option<String>> {
    let parser = HostnameParser::new(base_domain).context("Invalid base domain")?;
    Ok(parser.parse(host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("my-blog.apps.test", Some("my-blog"))]
    #[case("api.my-blog.apps.test:8443", Some("api.my-blog"))]
    #[case("apps.test", None)]
    #[case("my-blog.other.test", None)]
    fn test_resolve(#[case] host: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            resolve(host, "apps.test").unwrap().as_deref(),
            expected
        );
    }

    #[test]
    fn test_exhausted_range_is_error() {
        let cmd = PortCommand {
            used: vec![30000, 30001],
            start: 30000,
            end: 30001,
        };
        let err = cmd
            .run(CommandContext {
                format: OutputFormat::Table,
            })
            .unwrap_err();
        assert!(err.to_string().contains("30000"));
    }

    #[test]
    fn test_unknown_host_is_error() {
        let cmd = HostCommand {
            host: "nope.example.org".into(),
            base_domain: "apps.test".into(),
        };
        assert!(cmd
            .run(CommandContext {
                format: OutputFormat::Table,
            })
            .is_err());
    }
}
