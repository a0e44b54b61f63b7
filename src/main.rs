//! forge CLI: intent → verified compliance verdict.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use intent_forge::config::ForgeConfig;
use intent_forge::domain::schema;
use intent_forge::error::DomainError;
use intent_forge::pipeline::{Pipeline, PipelineResponse};

#[derive(Parser)]
#[command(name = "forge", version, about = "Intent to verified compliance verdict")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/intent-forge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extra domain definition file, loaded after the configured ones.
    #[arg(long, global = true)]
    dna: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a request and evaluate its constraints.
    Exec {
        /// The free-text request.
        prompt: String,

        /// Print the transport envelope as JSON instead of the text report.
        #[arg(long)]
        json: bool,
    },

    /// Evaluate one request per line of a file, printing JSON envelopes.
    Batch {
        /// File with one request per line; blank lines are skipped.
        file: PathBuf,
    },

    /// Inspect registered domains.
    Domains {
        #[command(subcommand)]
        action: DomainAction,
    },

    /// Validate a domain definition file without registering it.
    Validate {
        /// Path to a TOML definition file.
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum DomainAction {
    /// List registered domains.
    List,
    /// Show a domain's concepts, relations, rules and vocabulary.
    Show {
        /// Domain name.
        name: String,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ForgeConfig::load(path)?,
        None => ForgeConfig::discover()?,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    if let Some(dna) = &cli.dna {
        config.domain_files.push(dna.clone());
    }

    match cli.command {
        Commands::Exec { prompt, json } => {
            let pipeline = Pipeline::from_config(&config)?;
            if json {
                let response = pipeline.respond(&prompt);
                let failed = matches!(response, PipelineResponse::Error { .. });
                println!("{}", serde_json::to_string_pretty(&response).into_diagnostic()?);
                if failed {
                    std::process::exit(1);
                }
            } else {
                let verdict = pipeline.run(&prompt)?;
                print!("{verdict}");
            }
        }

        Commands::Batch { file } => {
            let pipeline = Pipeline::from_config(&config)?;
            let content = std::fs::read_to_string(&file).map_err(|source| DomainError::Read {
                path: file.display().to_string(),
                source,
            })?;
            let inputs: Vec<&str> = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            for result in pipeline.run_batch(&inputs) {
                let response = PipelineResponse::from(result);
                println!("{}", serde_json::to_string(&response).into_diagnostic()?);
            }
        }

        Commands::Domains { action } => {
            let pipeline = Pipeline::from_config(&config)?;
            let registry = pipeline.registry();
            match action {
                DomainAction::List => {
                    let snapshot = registry.snapshot();
                    if snapshot.is_empty() {
                        println!("No domains registered.");
                    }
                    for domain in snapshot.domains() {
                        println!(
                            "{:<32} {}",
                            domain.name(),
                            domain.description().unwrap_or("")
                        );
                    }
                }
                DomainAction::Show { name } => {
                    let domain = registry.lookup(&name)?;
                    print!("{domain}");
                }
            }
        }

        Commands::Validate { file } => {
            let defs = schema::read_definitions(&file)?;
            let domains = schema::validate_set(&file.display().to_string(), &defs)?;
            println!("{}: {} valid domain(s)", file.display(), domains.len());
            for domain in &domains {
                println!(
                    "  {} ({} concepts, {} rules)",
                    domain.name(),
                    domain.concepts().len(),
                    domain.rules().len()
                );
            }
        }
    }

    Ok(())
}
