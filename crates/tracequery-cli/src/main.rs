//! Tracequery CLI
//!
//! Command-line front end for natural-language trace search:
//! - Translate a query into validated search parameters (`parse`)
//! - Show the exact prompt sent to the model (`prompt`)
//! - Check the resolved configuration (`config`)
//! - Serve the parse endpoint over HTTP (`serve`)

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tracequery_nlq::{build_prompt, ErrorProjection, MockProvider, NlqConfig, QueryParser};

mod serve;

#[derive(Parser)]
#[command(name = "tracequery")]
#[command(
    author,
    version,
    about = "Tracequery: natural-language trace search backed by a local LLM"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the parser's backend comes from.
#[derive(Args, Clone)]
struct BackendArgs {
    /// JSON config file (environment variables override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the model and answer every query with this text (offline runs)
    #[arg(long)]
    mock_response: Option<String>,

    /// Carry `error: true` into the projection as the tag `error=true`
    #[arg(long)]
    error_as_tag: bool,
}

impl BackendArgs {
    fn projection(&self) -> ErrorProjection {
        if self.error_as_tag {
            ErrorProjection::Tag
        } else {
            ErrorProjection::Omit
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a natural-language query into search parameters.
    Parse {
        /// The query (words are joined with spaces)
        #[arg(required = true)]
        query: Vec<String>,

        #[command(flatten)]
        backend: BackendArgs,

        /// Print search form fields (logfmt tags) instead of the query map
        #[arg(long)]
        form: bool,
    },

    /// Print the prompt that would be sent for a query.
    Prompt {
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// Validate and print the resolved configuration.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Serve `POST /api/ai/parse-query` over HTTP.
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:16687")]
        listen: SocketAddr,

        #[command(flatten)]
        backend: BackendArgs,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            query,
            backend,
            form,
        } => cmd_parse(&query.join(" "), &backend, form),
        Commands::Prompt { query } => {
            println!("{}", build_prompt(query.join(" ").trim()));
            Ok(())
        }
        Commands::Config { config } => cmd_config(config.as_deref()),
        Commands::Serve { listen, backend } => {
            let parser = build_parser(&backend)?;
            if parser.is_none() {
                eprintln!(
                    "{} natural language query is disabled; {} will answer 503",
                    "warning:".yellow().bold(),
                    serve::PARSE_QUERY_PATH
                );
            }
            serve::serve(
                serve::ServeConfig {
                    listen,
                    projection: backend.projection(),
                },
                parser,
            )
        }
    }
}

/// Logs go to stderr so stdout stays machine readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<NlqConfig> {
    let config = NlqConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

/// A mock response wins over configuration; otherwise `None` means disabled.
fn build_parser(backend: &BackendArgs) -> Result<Option<QueryParser>> {
    if let Some(text) = backend.mock_response.as_deref() {
        return Ok(Some(QueryParser::new(Arc::new(MockProvider::always(text)))));
    }
    let config = load_config(backend.config.as_deref())?;
    Ok(tracequery_nlq::provider_from_config(&config)?.map(QueryParser::new))
}

fn cmd_parse(query: &str, backend: &BackendArgs, form: bool) -> Result<()> {
    let parser = build_parser(backend)?.ok_or_else(|| {
        anyhow!(
            "natural language query is disabled (set TRACEQUERY_NLQ_ENABLED=true, use --config, or pass --mock-response)"
        )
    })?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    let params = rt
        .block_on(parser.parse(query))
        .map_err(|e| anyhow!("[{}] {e}", e.code()))?;

    let projection = backend.projection();
    let out = if form {
        serde_json::json!({ "params": params, "form": params.to_search_form(projection) })
    } else {
        serde_json::json!({ "params": params, "query": params.to_query_map_with(projection) })
    };
    println!("{}", serde_json::to_string_pretty(&out)?);

    if params.is_empty() {
        eprintln!(
            "{} nothing was extracted from the query",
            "info:".yellow().bold()
        );
    }
    Ok(())
}

fn cmd_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    let state = if config.enabled { "enabled" } else { "disabled" };
    eprintln!("{} config is valid ({state})", "ok".green().bold());
    Ok(())
}
