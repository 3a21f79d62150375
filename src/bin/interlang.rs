//! Interlang CLI: resolve titles and run adaptation passes.
//!
//! Usage:
//!   interlang resolve --from en --to fr <title>... [--config path]
//!   interlang adapt <document.json> [--output path] [--no-probe] [--publish]
//!   interlang config

use clap::{Parser, Subcommand};
use interlang::{strip_unadapted, Coordinator, Document, EngineConfig, MediaWikiService, Session};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "interlang",
    version,
    about = "Cross-language link and reference adaptation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve titles from one language into another
    Resolve {
        /// Source language (defaults to the configured one)
        #[arg(long)]
        from: Option<String>,
        /// Target language (defaults to the configured one)
        #[arg(long)]
        to: Option<String>,
        /// Titles to resolve
        #[arg(required = true)]
        titles: Vec<String>,
    },
    /// Run an adaptation pass over a JSON document pair
    Adapt {
        /// Document with `source` and `target` trees
        document: PathBuf,
        /// Write the adapted document here instead of printing the report
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Skip page existence probes
        #[arg(long)]
        no_probe: bool,
        /// Convert unadapted links to text after the pass
        #[arg(long)]
        publish: bool,
    },
    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::load(path)
            .map_err(|e| format!("Failed to load {}: {}", path.display(), e)),
        None => EngineConfig::load_default().map_err(|e| format!("Failed to load config: {}", e)),
    }
}

fn init_logging(config: &EngineConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_session(config: EngineConfig) -> Result<Arc<Session>, String> {
    let service = MediaWikiService::new(config.site.clone(), config.thumbnail_size);
    Session::new(config, Arc::new(service))
        .map(Arc::new)
        .map_err(|e| format!("Invalid configuration: {}", e))
}

async fn cmd_resolve(
    mut config: EngineConfig,
    from: Option<String>,
    to: Option<String>,
    titles: &[String],
) -> i32 {
    if let Some(from) = from {
        config.source_language = from;
    }
    if let Some(to) = to {
        config.target_language = to;
    }
    let session = match open_session(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let pair = session.language_pair();
    let resolved = session.resolver().resolve_titles(titles, &pair).await;
    let mut unknown = 0;
    for title in titles {
        let answer = interlang::normalize(title).and_then(|key| resolved.get(&key).cloned());
        match answer {
            Some(Some(target)) => println!("{}\t{}", title, target),
            Some(None) => println!("{}\t-", title),
            None => {
                println!("{}\t?", title);
                unknown += 1;
            }
        }
    }
    if unknown > 0 {
        eprintln!("Warning: {} title(s) could not be resolved ({})", unknown, pair);
        return 1;
    }
    0
}

async fn cmd_adapt(
    mut config: EngineConfig,
    path: &Path,
    output: Option<&Path>,
    no_probe: bool,
    publish: bool,
) -> i32 {
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", path.display(), e);
            return 1;
        }
    };
    let mut document = match Document::from_json(&json) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error: {} is not a document: {}", path.display(), e);
            return 1;
        }
    };

    config.source_language = document.source.language().to_string();
    config.target_language = document.target.language().to_string();
    if no_probe {
        config.probe_pages = false;
    }
    let session = match open_session(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let coordinator = Coordinator::new(session);
    let report = match coordinator.adapt_document(&mut document).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: adaptation failed: {}", e);
            return 1;
        }
    };
    if publish {
        match strip_unadapted(&mut document.target) {
            Ok(stripped) => eprintln!("Converted {} unadapted link(s) to text", stripped),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }

    let Some(output) = output else {
        return match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        };
    };
    let written = document
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| std::fs::write(output, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => {
            eprintln!(
                "Adapted {} section(s): {} adapted, {} unadapted, {} reference(s); wrote {}",
                report.sections,
                report.target_links.adapted,
                report.target_links.unadapted,
                report.references,
                output.display()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: cannot write {}: {}", output.display(), e);
            1
        }
    }
}

fn cmd_config(config: &EngineConfig) -> i32 {
    if let Some(path) = EngineConfig::default_path() {
        println!("# default location: {}", path.display());
    }
    match serde_yaml::to_string(config) {
        Ok(yaml) => {
            print!("{}", yaml);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config, cli.verbose);

    let code = match cli.command {
        Commands::Resolve { from, to, titles } => cmd_resolve(config, from, to, &titles).await,
        Commands::Adapt {
            document,
            output,
            no_probe,
            publish,
        } => cmd_adapt(config, &document, output.as_deref(), no_probe, publish).await,
        Commands::Config => cmd_config(&config),
    };
    std::process::exit(code);
}
