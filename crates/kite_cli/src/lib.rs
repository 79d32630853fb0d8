//! Command-line interface for Kite.
//!
//! Works offline on provider descriptions saved as JSON, one description or
//! an array of them per file.
//!
//! # Usage
//!
//! ```bash
//! # Merge descriptions and report conflicts
//! kite check sales.json shipping.json
//!
//! # Print the merged schema as SDL
//! kite print sales.json shipping.json
//!
//! # Show the sub-requests each provider would receive
//! kite plan sales.json shipping.json --query orders.json
//! ```

use clap::{Parser, Subcommand};
use colored::Colorize;
use kite_gateway::{GatewayConfig, GraphSchema, MergeError, MergedSchema, PlanError, Planner, Query};
use kite_schema::{AccessTicket, ApiDescription, RequestContext, TracingSecurityLogger, UserDescription};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "kite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge provider descriptions and report diagnostics
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Print the merged schema as SDL
    Print {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Name of the global-id lookup field
        #[arg(long, default_value = "node")]
        node_field: String,
    },

    /// Print the per-provider sub-requests of a query
    Plan {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Query file (JSON selection tree)
        #[arg(long)]
        query: PathBuf,

        /// Plan as a user holding this privilege (repeatable)
        #[arg(long = "scope")]
        scopes: Vec<String>,

        /// Name of the global-id lookup field
        #[arg(long, default_value = "node")]
        node_field: String,
    },

    /// Print version information
    Version,
}

/// A CLI command could not run.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

pub fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Commands::Check { files, strict } => check(&files, strict, cli.verbose, cli.quiet),
        Commands::Print { files, node_field } => {
            let descriptions = load_descriptions(&files)?;
            let Some(schema) = merge_or_report(&descriptions) else {
                return Ok(1);
            };
            let config = GatewayConfig::new().with_node_field(node_field);
            print!("{}", GraphSchema::from_merged(&schema, &config).to_sdl());
            Ok(0)
        }
        Commands::Plan {
            files,
            query,
            scopes,
            node_field,
        } => {
            let descriptions = load_descriptions(&files)?;
            let query: Query = read_json(&query)?;
            let Some(schema) = merge_or_report(&descriptions) else {
                return Ok(1);
            };
            let context = planning_context(scopes);
            let plan = render_plan(&schema, &query, &context, &node_field)?;
            println!("{}", serde_json::to_string_pretty(&plan).unwrap_or_default());
            Ok(0)
        }
        Commands::Version => {
            println!("kite {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

fn check(files: &[PathBuf], strict: bool, verbose: bool, quiet: bool) -> Result<i32, CliError> {
    let descriptions = load_descriptions(files)?;
    if verbose {
        for description in &descriptions {
            println!(
                "{} {} {}",
                "Loaded".blue(),
                description.api_name,
                description.version.dimmed()
            );
        }
    }

    let Some(schema) = merge_or_report(&descriptions) else {
        return Ok(1);
    };
    let warnings = schema.diagnostics().warnings().count();
    if !quiet {
        for warning in schema.diagnostics().warnings() {
            eprintln!("{} {warning}", "Warning".yellow().bold());
        }
    }

    if strict && warnings > 0 {
        eprintln!("{} {warnings} warning(s) in strict mode", "Error:".red().bold());
        return Ok(1);
    }
    if !quiet {
        println!(
            "{} merged {} provider(s) into {} type(s)",
            "Success:".green().bold(),
            schema.providers().len(),
            schema.types().count()
        );
    }
    Ok(0)
}

/// Merges descriptions, printing every diagnostic on failure.
fn merge_or_report(descriptions: &[ApiDescription]) -> Option<MergedSchema> {
    match MergedSchema::merge(descriptions) {
        Ok(schema) => Some(schema),
        Err(MergeError { diagnostics }) => {
            for error in diagnostics.errors() {
                eprintln!("{} {error}", "Error".red().bold());
            }
            eprintln!(
                "{} {} error(s) while merging",
                "Failed:".red().bold(),
                diagnostics.error_count()
            );
            None
        }
    }
}

/// Loads provider descriptions; a file holds one description or an array of them.
pub fn load_descriptions(files: &[PathBuf]) -> Result<Vec<ApiDescription>, CliError> {
    let mut descriptions = Vec::new();
    for file in files {
        let value: Value = read_json(file)?;
        let loaded = if value.is_array() {
            serde_json::from_value::<Vec<ApiDescription>>(value)
        } else {
            serde_json::from_value::<ApiDescription>(value).map(|d| vec![d])
        };
        let loaded = loaded.map_err(|source| CliError::Json {
            path: file.clone(),
            source,
        })?;
        tracing::debug!(file = %file.display(), count = loaded.len(), "descriptions loaded");
        descriptions.extend(loaded);
    }
    Ok(descriptions)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let source = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn planning_context(scopes: Vec<String>) -> RequestContext {
    if scopes.is_empty() {
        return RequestContext::anonymous();
    }
    RequestContext::with_ticket(
        AccessTicket::for_client("kite-cli")
            .with_user(UserDescription::new("kite-cli", "0"))
            .with_user_scope(scopes),
    )
}

/// Plans `query` and renders `{rootKey: {provider: [requests]}}`.
pub fn render_plan(
    schema: &MergedSchema,
    query: &Query,
    context: &RequestContext,
    node_field: &str,
) -> Result<Value, PlanError> {
    let planner = Planner::new(schema, context, &TracingSecurityLogger, node_field);
    let plan = planner.plan_query(query)?;

    let mut roots = Map::new();
    for (key, providers) in plan.dispatches() {
        let requests: Map<String, Value> = providers
            .into_iter()
            .map(|(api, requests)| (api, serde_json::to_value(requests).unwrap_or(Value::Null)))
            .collect();
        roots.insert(key.to_string(), Value::Object(requests));
    }
    Ok(Value::Object(roots))
}
