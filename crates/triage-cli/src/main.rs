//! Triage CLI
//!
//! The `triage` command replays captured collaborator evidence through the
//! triage engine.
//!
//! ## Commands
//!
//! - `analyze`: run one analysis against an evidence bundle and print the report
//! - `classify`: show how a query would be classified
//! - `policy`: print the effective budget policy

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use triage_core::telemetry::init_tracing;
use triage_core::{classify_query, Collaborators, EngineConfig, ReportOutcome, TriageEngine};
use triage_sources::fakes::EvidenceBundle;

#[derive(Parser)]
#[command(name = "triage")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Failure correlation and triage for document pipelines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a query against a captured evidence bundle
    Analyze {
        /// Evidence bundle (JSON) standing in for the live services
        #[arg(short, long)]
        bundle: PathBuf,

        /// Deployment whose logs are searched
        #[arg(short, long, env = "TRIAGE_DEPLOYMENT")]
        deployment: String,

        /// Free-text query, e.g. "document: report.pdf"
        #[arg(short, long)]
        query: String,

        /// Lookback window in hours (0 = configured default)
        #[arg(long, default_value = "0")]
        hours: u32,

        /// Engine configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the report on a single line
        #[arg(long)]
        compact: bool,
    },

    /// Show how a query is classified
    Classify {
        /// Query text
        query: String,
    },

    /// Print the effective budget policy
    Policy {
        /// Engine configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Analyze {
            bundle,
            deployment,
            query,
            hours,
            config,
            compact,
        } => {
            cmd_analyze(
                &bundle,
                &deployment,
                &query,
                hours,
                config.as_deref(),
                compact,
            )
            .await
        }
        Commands::Classify { query } => {
            println!("{}", render_classification(&query));
            Ok(())
        }
        Commands::Policy { config } => {
            println!("{}", render_policy(config.as_deref())?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load engine config: {:?}", path)),
        None => Ok(EngineConfig::default()),
    }
}

fn load_bundle(path: &Path) -> Result<EvidenceBundle> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read evidence bundle: {:?}", path))?;
    EvidenceBundle::from_json(&raw)
        .with_context(|| format!("Evidence bundle is not valid JSON: {:?}", path))
}

/// Run one analysis and render the report as JSON.
async fn run_analysis(
    bundle: &Path,
    deployment: &str,
    query: &str,
    hours: u32,
    config: Option<&Path>,
    compact: bool,
) -> Result<(String, ReportOutcome)> {
    let config = load_config(config)?;
    let collaborators = Collaborators::from(load_bundle(bundle)?.into_fakes());
    let engine = TriageEngine::new(collaborators, config).context("Invalid engine config")?;

    let report = engine.analyze(deployment, query, hours).await;
    info!(
        request_id = %report.request_id,
        outcome = ?report.outcome,
        "analysis finished"
    );
    let rendered = if compact {
        report.to_json()
    } else {
        report.to_json_pretty()
    };
    let rendered = rendered.context("Failed to serialize report")?;
    Ok((rendered, report.outcome))
}

async fn cmd_analyze(
    bundle: &Path,
    deployment: &str,
    query: &str,
    hours: u32,
    config: Option<&Path>,
    compact: bool,
) -> Result<()> {
    let (rendered, outcome) =
        run_analysis(bundle, deployment, query, hours, config, compact).await?;
    println!("{rendered}");
    if outcome == ReportOutcome::Failed {
        anyhow::bail!("Analysis could not be completed; see analysis_summary");
    }
    Ok(())
}

fn render_classification(query: &str) -> String {
    let intent = classify_query(query);
    match intent.item_id() {
        Some(item_id) => format!("mode: {}\nsubject: {}", intent.mode(), item_id),
        None => format!("mode: {}", intent.mode()),
    }
}

fn render_policy(config: Option<&Path>) -> Result<String> {
    let config = load_config(config)?;
    serde_json::to_string_pretty(&config.budget).context("Failed to serialize budget policy")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BUNDLE: &str = r#"{
        "lookups": {
            "report.pdf": {
                "found": true,
                "status": "FAILED",
                "execution_ref": "arn:aws:states:us-east-1:1:execution:wf:exec42"
            }
        },
        "deployments": {
            "idp-dev": [{"key": "BucketName", "value": "input"}]
        },
        "log_groups": {}
    }"#;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "triage",
            "--json",
            "analyze",
            "--bundle",
            "b.json",
            "--deployment",
            "idp-dev",
            "--query",
            "file: a.pdf",
            "--hours",
            "6",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Analyze { hours, compact, .. } => {
                assert_eq!(hours, 6);
                assert!(!compact);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_render_classification() {
        assert_eq!(
            render_classification("document: report.pdf"),
            "mode: item_specific\nsubject: report.pdf"
        );
        assert_eq!(render_classification("any failures?"), "mode: system_wide");
    }

    #[test]
    fn test_render_policy_honours_config() {
        let config = write_temp("[budget]\nmax_total_events = 9\n");
        let rendered = render_policy(Some(config.path())).unwrap();
        let policy: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(policy["max_total_events"], 9);
        assert_eq!(policy["max_message_length"], 400);
    }

    #[test]
    fn test_render_policy_rejects_invalid_config() {
        let config = write_temp("[budget]\nmax_total_events = 0\n");
        assert!(render_policy(Some(config.path())).is_err());
    }

    #[tokio::test]
    async fn test_run_analysis_replays_bundle() {
        let bundle = write_temp(BUNDLE);
        let (rendered, outcome) = run_analysis(
            bundle.path(),
            "idp-dev",
            "document: report.pdf",
            0,
            None,
            true,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ReportOutcome::Complete);
        assert!(!rendered.contains('\n'));
        let report: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(report["subject"], "report.pdf");
        assert_eq!(report["status"], "FAILED");
        assert_eq!(report["namespace"]["prefix"], "/aws/lambda/idp-dev");
    }

    #[tokio::test]
    async fn test_run_analysis_reports_unknown_deployment_as_failed() {
        let bundle = write_temp(BUNDLE);
        let (_, outcome) = run_analysis(
            bundle.path(),
            "idp-missing",
            "document: report.pdf",
            24,
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome, ReportOutcome::Failed);
    }

    #[tokio::test]
    async fn test_run_analysis_rejects_missing_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_analysis(&dir.path().join("nope.json"), "idp-dev", "x", 0, None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read evidence bundle"));
    }
}
