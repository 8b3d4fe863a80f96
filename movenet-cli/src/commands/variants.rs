//! `movenet-sync variants`: the resolved variant list, without touching the
//! network or the object store.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use movenet_core::SyncConfig;

use super::{destination, load_config, path_override};

/// Arguments for `movenet-sync variants`.
#[derive(Args, Debug)]
pub struct VariantsArgs {
    /// Variants YAML file, overriding MODEL_VARIANTS_FILE.
    #[arg(long, value_name = "PATH")]
    pub variants_file: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl VariantsArgs {
    pub fn run(self) -> Result<ExitCode> {
        let config = load_config(&[(
            "MODEL_VARIANTS_FILE",
            path_override(&self.variants_file),
        )])?;
        if self.json {
            print_json(&config)?;
        } else {
            print_table(&config);
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Serialize)]
struct VariantJson {
    name: String,
    source: String,
    versioned_prefix: String,
    stable_prefix: String,
    manifest_key: String,
    convert: Option<Vec<String>>,
}

#[derive(Tabled)]
struct VariantRow {
    #[tabled(rename = "variant")]
    name: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "versioned")]
    versioned: String,
    #[tabled(rename = "stable")]
    stable: String,
    #[tabled(rename = "convert")]
    convert: String,
}

fn print_json(config: &SyncConfig) -> Result<()> {
    let payload: Vec<VariantJson> = config
        .variants
        .iter()
        .map(|v| VariantJson {
            name: v.name.0.clone(),
            source: v.source.to_string(),
            versioned_prefix: v.versioned_prefix(&config.version),
            stable_prefix: v.stable_prefix(),
            manifest_key: v.manifest_key(),
            convert: v.convert.clone(),
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize variants")?
    );
    Ok(())
}

fn print_table(config: &SyncConfig) {
    println!(
        "{} | version {} | {} variants",
        destination(config).bold(),
        config.version,
        config.variants.len(),
    );
    let rows: Vec<VariantRow> = config
        .variants
        .iter()
        .map(|v| VariantRow {
            name: v.name.0.clone(),
            source: v.source.to_string(),
            versioned: format!("{}/", v.versioned_prefix(&config.version)),
            stable: format!("{}/", v.stable_prefix()),
            convert: v
                .convert
                .as_ref()
                .map(|argv| argv.join(" "))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
