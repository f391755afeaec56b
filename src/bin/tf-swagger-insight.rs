//! tf-swagger-insight CLI
//!
//! Scaffold link declarations from a Terraform provider schema, and replay
//! them against Swagger documents to report property coverage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tf_swagger_insight::{
    build_coverage, BuildOptions, TerraformProvider, TerraformProviderSchemas, TerraformSchema,
    TfSchema, DATA_SOURCE_PREFIX,
};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "TF_SWAGGER_INSIGHT_LOG";

#[derive(Parser)]
#[command(name = "tf-swagger-insight")]
#[command(about = "Measure Swagger property coverage of Terraform provider schemas")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one link declaration per resource from `terraform providers schema -json` output
    Scaffold {
        /// Provider schema JSON file
        #[arg(long)]
        schema: PathBuf,

        /// Provider source address (required when the file holds more than one provider)
        #[arg(long)]
        provider: Option<String>,

        /// Only scaffold this resource (or data source)
        #[arg(long)]
        resource: Option<String>,

        /// Scaffold data sources instead of resources
        #[arg(long)]
        data_source: bool,

        /// Output directory
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },

    /// Replay link declarations and report Swagger property coverage
    Link {
        /// Swagger base: directory or URL (http:// or https://)
        #[arg(long)]
        swagger: String,

        /// Directory of link declarations
        #[arg(long)]
        tf_schema: PathBuf,

        /// Directory of grant files
        #[arg(long)]
        grant: Option<PathBuf>,

        /// Report output file (stdout if not specified)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Number of worker threads
        #[arg(long, short, default_value_t = 1)]
        jobs: usize,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env(LOG_ENV))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scaffold {
            schema,
            provider,
            resource,
            data_source,
            output,
        } => run_scaffold(
            &schema,
            provider.as_deref(),
            resource.as_deref(),
            data_source,
            &output,
        ),

        Commands::Link {
            swagger,
            tf_schema,
            grant,
            output,
            pretty,
            jobs,
        } => {
            let mut options = BuildOptions::new(swagger, tf_schema).jobs(jobs);
            if let Some(grant) = grant {
                options = options.grant_dir(grant);
            }
            run_link(&options, output, pretty)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_scaffold(
    schema_path: &Path,
    provider: Option<&str>,
    resource: Option<&str>,
    data_source: bool,
    output: &Path,
) -> Result<(), u8> {
    let content = std::fs::read_to_string(schema_path).map_err(|e| {
        eprintln!("Error reading {}: {}", schema_path.display(), e);
        3u8
    })?;
    let schemas: TerraformProviderSchemas = serde_json::from_str(&content).map_err(|e| {
        eprintln!("Error: invalid provider schema {}: {}", schema_path.display(), e);
        2u8
    })?;
    let provider = select_provider(&schemas, provider)?;

    let (resources, prefix) = if data_source {
        (&provider.data_source_schemas, DATA_SOURCE_PREFIX)
    } else {
        (&provider.resource_schemas, "")
    };
    let selected: BTreeMap<&String, &TerraformSchema> = match resource {
        Some(name) => match resources.get_key_value(name) {
            Some(entry) => BTreeMap::from([entry]),
            None => {
                eprintln!("Error: no such {}: {}", kind(data_source), name);
                return Err(2);
            }
        },
        None => resources.iter().collect(),
    };

    std::fs::create_dir_all(output).map_err(|e| {
        eprintln!("Error creating {}: {}", output.display(), e);
        3u8
    })?;

    for (name, schema) in selected {
        let name = format!("{prefix}{name}");
        write_scaffold(&name, schema, output)?;
    }
    Ok(())
}

fn kind(data_source: bool) -> &'static str {
    if data_source {
        "data source"
    } else {
        "resource"
    }
}

fn select_provider<'a>(
    schemas: &'a TerraformProviderSchemas,
    name: Option<&str>,
) -> Result<&'a TerraformProvider, u8> {
    match name {
        Some(name) => schemas.provider_schemas.get(name).ok_or_else(|| {
            eprintln!("Error: no such provider: {}", name);
            2u8
        }),
        None => {
            let mut providers = schemas.provider_schemas.values();
            match (providers.next(), providers.next()) {
                (Some(provider), None) => Ok(provider),
                (None, _) => {
                    eprintln!("Error: provider schema file holds no provider");
                    Err(2)
                }
                (Some(_), Some(_)) => {
                    eprintln!("Error: provider schema file holds several providers, use --provider");
                    Err(2)
                }
            }
        }
    }
}

/// Write `<output>/<name>.json`, merging links of an existing declaration
/// after backing it up to `<name>.json.bkp`.
fn write_scaffold(name: &str, schema: &TerraformSchema, output: &Path) -> Result<(), u8> {
    let path = output.join(format!("{name}.json"));
    let declaration = if path.is_file() {
        let existing = TfSchema::load(&path).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
        let backup = output.join(format!("{name}.json.bkp"));
        std::fs::copy(&path, &backup).map_err(|e| {
            eprintln!("Error backing up {} to {}: {}", path.display(), backup.display(), e);
            3u8
        })?;
        TfSchema::update_scaffold(name, &schema.block, &existing).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?
    } else {
        TfSchema::scaffold(name, &schema.block)
    };

    let json = serde_json::to_string_pretty(&declaration).map_err(|e| {
        eprintln!("Error serializing {}: {}", name, e);
        2u8
    })?;
    std::fs::write(&path, json).map_err(|e| {
        eprintln!("Error writing to {}: {}", path.display(), e);
        3u8
    })?;
    tracing::info!(path = %path.display(), "wrote declaration");
    Ok(())
}

fn run_link(options: &BuildOptions, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let outcome = build_coverage(options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    for failure in &outcome.failures {
        eprintln!("Error: {}: {}", failure.path.display(), failure.error);
    }

    let report = outcome.cache.report();
    let json_output = if pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
            for (addr, schema) in &report {
                let coverage = schema.coverage;
                let granted = if schema.is_granted { " (granted)" } else { "" };
                println!(
                    "{}: {}/{} ({:.1}%){}",
                    addr,
                    coverage.covered,
                    coverage.total,
                    coverage.ratio() * 100.0,
                    granted
                );
            }
            println!(
                "{} declarations, {} failed, {} schemas",
                outcome.files,
                outcome.failures.len(),
                report.len()
            );
        }
        None => {
            println!("{}", json_output);
        }
    }

    if outcome.failures.is_empty() {
        Ok(())
    } else {
        Err(1)
    }
}
