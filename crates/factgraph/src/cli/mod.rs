pub mod collection;
pub mod config;
pub mod extract;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use factgraph_core::{
    DocumentInput, HttpValidator, ModelPool, Pipeline, PipelineConfig, Validator,
};

#[derive(Parser)]
#[command(
    name = "fgraph",
    about = "Extract knowledge graphs from transcripts",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Pipeline configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Validator endpoint; overrides configuration and environment
    #[arg(long = "validator-url", global = true)]
    pub validator_url: Option<String>,
    /// Custom entity vocabulary as LABEL=term1,term2 (repeatable)
    #[arg(long = "labels", global = true)]
    pub labels: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build one graph per document
    Extract {
        /// Document files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Process documents concurrently, optionally unifying them
    Collection {
        /// Document files (JSON)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Also resolve entities across documents
        #[arg(long)]
        resolve: bool,
    },
    /// Print the effective configuration
    Config,
}

/// Configuration file, then `FACTGRAPH_*` variables, then flags.
pub fn load_config(global: &GlobalArgs) -> Result<PipelineConfig> {
    let config = match &global.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(url) = &global.validator_url {
        config.validator.endpoint = Some(url.clone());
    }
    for (label, terms) in parse_labels(&global.labels)? {
        config
            .extraction
            .custom_labels
            .entry(label)
            .or_default()
            .extend(terms);
    }

    config.validate()?;
    Ok(config)
}

/// Parses `LABEL=term1,term2` pairs. Labels are upper-cased.
pub fn parse_labels(raw: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut labels: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for arg in raw {
        let Some((label, terms)) = arg.split_once('=') else {
            bail!("invalid --labels value {arg:?}: expected LABEL=term1,term2");
        };
        let label = label.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        if label.is_empty() {
            bail!("invalid --labels value {arg:?}: empty label");
        }
        let terms: Vec<String> = terms
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        if terms.is_empty() {
            bail!("invalid --labels value {arg:?}: no terms");
        }
        labels.entry(label).or_default().extend(terms);
    }
    Ok(labels)
}

pub fn build_pipeline(config: PipelineConfig) -> Result<Pipeline> {
    let validator: Option<Arc<dyn Validator>> = HttpValidator::from_config(&config.validator)?
        .map(|v| {
            tracing::info!(endpoint = %v.endpoint(), "Validator enabled");
            Arc::new(v) as Arc<dyn Validator>
        });
    let pool = ModelPool::new();
    Ok(Pipeline::new(config, &pool, validator)?)
}

pub fn read_document(path: &Path) -> Result<DocumentInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid document {}", path.display()))
}

pub fn read_documents(paths: &[PathBuf]) -> Result<Vec<DocumentInput>> {
    paths.iter().map(|p| read_document(p)).collect()
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
