//! `movenet-sync run`: one full sync pass.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use movenet_core::{SyncConfig, Variant};
use movenet_sync::{
    store::{FsObjectStore, S3ObjectStore},
    ArtifactFetcher, HttpFetcher, ObjectStore, RunSettings, SyncOrchestrator, SyncReport,
    VariantOutcome,
};

use super::{destination, load_config, path_override};

/// Conventional exit status for SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

/// Arguments for `movenet-sync run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Sync only this variant (repeatable). Defaults to every configured variant.
    #[arg(long = "variant", value_name = "NAME")]
    pub variants: Vec<String>,

    /// Version stamp for this run, overriding MODEL_VERSION.
    #[arg(long, value_name = "STAMP")]
    pub model_version: Option<String>,

    /// Variants YAML file, overriding MODEL_VARIANTS_FILE.
    #[arg(long, value_name = "PATH")]
    pub variants_file: Option<PathBuf>,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<ExitCode> {
        let config = load_config(&[
            ("MODEL_VERSION", self.model_version.clone()),
            ("MODEL_VARIANTS_FILE", path_override(&self.variants_file)),
        ])?;
        let variants = select_variants(&config.variants, &self.variants)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        runtime.block_on(self.execute(config, variants))
    }

    async fn execute(&self, config: SyncConfig, variants: Vec<Variant>) -> Result<ExitCode> {
        let store: Arc<dyn ObjectStore> = match &config.object_store_root {
            Some(root) => Arc::new(FsObjectStore::new(root.clone())),
            None => Arc::new(S3ObjectStore::connect(&config.region, &config.bucket).await),
        };
        let fetcher: Arc<dyn ArtifactFetcher> = Arc::new(
            HttpFetcher::new(config.fetch_timeout, config.kaggle.clone())
                .context("failed to build HTTP client")?,
        );
        let target = destination(&config);
        tracing::info!(
            destination = %target,
            version = %config.version,
            variants = variants.len(),
            "starting sync",
        );

        let orchestrator = SyncOrchestrator::new(RunSettings::from_config(&config), fetcher, store);
        // Losing the race drops the run future, which cancels every in-flight
        // variant and removes its staging directory.
        let report = tokio::select! {
            report = orchestrator.run(&variants) => report,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted; in-flight variants cancelled");
                eprintln!("{}", "interrupted".yellow().bold());
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
        };

        if self.json {
            print_json(&report)?;
        } else {
            print_table(&report, &target);
        }

        Ok(if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

/// Keep configuration order; unknown names are a configuration error.
fn select_variants(configured: &[Variant], wanted: &[String]) -> Result<Vec<Variant>> {
    if wanted.is_empty() {
        return Ok(configured.to_vec());
    }
    for name in wanted {
        if !configured.iter().any(|v| v.name.0 == *name) {
            let known: Vec<&str> = configured.iter().map(|v| v.name.0.as_str()).collect();
            bail!("unknown variant '{name}'; configured: {}", known.join(", "));
        }
    }
    Ok(configured
        .iter()
        .filter(|v| wanted.contains(&v.name.0))
        .cloned()
        .collect())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ReportJson {
    version: String,
    success: bool,
    variants: Vec<VariantJson>,
}

#[derive(Serialize)]
struct VariantJson {
    variant: String,
    state: String,
    hash: Option<String>,
    files: Option<usize>,
    pruned: Option<usize>,
    failed_after: Option<String>,
    error: Option<String>,
    duration_ms: u128,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "variant")]
    variant: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "hash")]
    hash: String,
    #[tabled(rename = "files")]
    files: String,
    #[tabled(rename = "detail")]
    detail: String,
    #[tabled(rename = "time")]
    time: String,
}

fn print_json(report: &SyncReport) -> Result<()> {
    let payload = ReportJson {
        version: report.version.0.clone(),
        success: report.is_success(),
        variants: report
            .variants
            .iter()
            .map(|r| {
                let (files, pruned) = match &r.outcome {
                    VariantOutcome::Published { record, .. } => {
                        (Some(record.versioned_keys.len()), Some(record.pruned_keys.len()))
                    }
                    _ => (None, None),
                };
                let (failed_after, error) = match &r.outcome {
                    VariantOutcome::Failed { reached, error } => {
                        (Some(reached.to_string()), Some(error.to_string()))
                    }
                    _ => (None, None),
                };
                VariantJson {
                    variant: r.variant.0.clone(),
                    state: r.outcome.state().to_string(),
                    hash: r.outcome.hash().map(|h| h.0.clone()),
                    files,
                    pruned,
                    failed_after,
                    error,
                    duration_ms: r.duration.as_millis(),
                }
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize run report")?
    );
    Ok(())
}

fn print_table(report: &SyncReport, target: &str) {
    println!(
        "movenet-sync v{} | version {} | {}",
        env!("CARGO_PKG_VERSION"),
        report.version,
        target,
    );
    if report.variants.is_empty() {
        println!("No variants configured.");
        return;
    }

    let rows: Vec<ReportRow> = report
        .variants
        .iter()
        .map(|r| {
            let (files, detail) = match &r.outcome {
                VariantOutcome::Published { record, .. } => (
                    record.versioned_keys.len().to_string(),
                    format!(
                        "{} objects written, {} pruned",
                        record.object_count(),
                        record.pruned_keys.len()
                    ),
                ),
                VariantOutcome::Skipped { .. } => ("-".to_string(), "unchanged".to_string()),
                VariantOutcome::Failed { reached, error } => {
                    ("-".to_string(), format!("after {reached}: {error}"))
                }
            };
            ReportRow {
                variant: r.variant.0.clone(),
                state: r.outcome.state().to_string(),
                hash: r
                    .outcome
                    .hash()
                    .map(|h| h.short().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                files,
                detail,
                time: format!("{:.1}s", r.duration.as_secs_f64()),
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let failed = report.failed().len();
    let failed_label = format!("{failed} failed");
    println!(
        "{}, {}, {}",
        format!("{} published", report.published().len()).green(),
        format!("{} skipped", report.skipped().len()).cyan(),
        if failed > 0 {
            failed_label.red().bold()
        } else {
            failed_label.normal()
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use movenet_core::{Locator, VariantName};

    fn variant(name: &str) -> Variant {
        Variant {
            name: VariantName::from(name),
            source: Locator::Url {
                url: format!("https://x/{name}.tflite"),
                file_name: None,
            },
            destination_prefix: "models".to_string(),
            convert: None,
        }
    }

    #[test]
    fn empty_selection_keeps_everything() {
        let all = vec![variant("a"), variant("b")];
        assert_eq!(select_variants(&all, &[]).unwrap(), all);
    }

    #[test]
    fn selection_keeps_configuration_order() {
        let all = vec![variant("a"), variant("b"), variant("c")];
        let picked = select_variants(&all, &["c".to_string(), "a".to_string()]).unwrap();
        let names: Vec<&str> = picked.iter().map(|v| v.name.0.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let all = vec![variant("a")];
        let err = select_variants(&all, &["zzz".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unknown variant 'zzz'"));
    }
}
