use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use reconcile::config::ReconcileConfig;
use reconcile::identifier_csv::Identifier;
use reconcile::pipeline::PipelineOptions;
use reconcile::reconciliation_client::ReconciliationClient;
use reconcile::response_cache::{CachingEndpoint, ResponseCache};
use reconcile::sparql_endpoint::{HttpEndpoint, SparqlEndpoint};
use reconcile::wikidata::{parse_qid, WikidataApi};
use reconcile_csv::{execute_reconcile_csv, ReconcileCsvArgs};
use tracing_subscriber::EnvFilter;

mod reconcile_csv;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON file with endpoint, language, property, timeout settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SPARQL endpoint to query (overrides config)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Label language (overrides config)
    #[arg(long, global = true)]
    language: Option<String>,

    /// Per-request timeout in seconds (overrides config)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Directory to cache successful query responses in
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile a column of identifiers in a CSV file against Wikidata
    Reconcile {
        /// CSV file with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Name of the column holding the identifiers
        #[arg(long)]
        column: String,

        /// Where to write the result table, `-` for stdout
        #[arg(short, long, default_value = "reconciled.csv")]
        output: PathBuf,

        /// Where to write identifiers whose lookup failed
        #[arg(long)]
        failures: Option<PathBuf>,

        /// Number of queries to run at once
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Max identifiers to look up
        #[arg(short, long)]
        max: Option<usize>,

        /// Split cells holding several identifiers on this character
        #[arg(long)]
        split_on: Option<char>,

        /// Field delimiter of the input and output files
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Look up individual identifiers
    Lookup {
        identifiers: Vec<String>,

        /// Print the SPARQL query sent for each identifier
        #[arg(long, default_value_t = false)]
        show_query: bool,

        /// Print matches as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the external identifiers stated on Wikidata entities
    Claims {
        qids: Vec<String>,

        /// External-identifier property to show (defaults to the configured one)
        #[arg(long)]
        property: Option<String>,
    },
}

fn load_config(args: &Args) -> Result<ReconcileConfig> {
    let mut config = match &args.config {
        Some(path) => ReconcileConfig::load(path)?,
        None => ReconcileConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(language) = &args.language {
        config = config.with_language(language);
    }
    if let Some(timeout) = args.timeout {
        config = config.with_timeout_secs(timeout);
    }
    config.validated()
}

fn open_endpoint(
    config: &ReconcileConfig,
    cache_dir: Option<PathBuf>,
) -> Box<dyn SparqlEndpoint + Sync> {
    let endpoint = HttpEndpoint::new(config);
    match cache_dir {
        Some(cache_dir) => Box::new(CachingEndpoint::new(endpoint, ResponseCache::new(cache_dir))),
        None => Box::new(endpoint),
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn lookup(
    client: &ReconciliationClient<Box<dyn SparqlEndpoint + Sync>>,
    identifiers: Vec<String>,
    show_query: bool,
    json: bool,
) -> Result<()> {
    let mut failed = 0;
    for value in identifiers {
        let Some(id) = Identifier::from_cell(&value) else {
            println!("{value:?}: not an identifier, skipping.");
            continue;
        };
        if show_query {
            println!("{}", client.query_for(&id));
        }
        match client.lookup(&id) {
            Ok(results) if json => println!("{}", serde_json::to_string_pretty(&results)?),
            Ok(results) if results.is_empty() => println!("{id}: no match"),
            Ok(results) => {
                for result in results {
                    println!(
                        "{id}: {} {} ({})",
                        result.entity_uri,
                        result.label.as_deref().unwrap_or("<no label>"),
                        result.secondary_link.as_deref().unwrap_or("no article")
                    );
                }
            }
            Err(err) => {
                failed += 1;
                println!("{err}");
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!("{failed} lookup(s) failed"));
    }
    Ok(())
}

fn claims(config: &ReconcileConfig, qids: Vec<String>, property: &str) -> Result<()> {
    let api = WikidataApi::new(config);
    for value in qids {
        let Some(qid) = parse_qid(&value) else {
            println!("{value:?}: not a QID, skipping.");
            continue;
        };
        let ids = api.external_ids(qid, property)?;
        if ids.is_empty() {
            println!("Q{qid}: no {property} claims");
        } else {
            println!("Q{qid}: {property} = {}", ids.join(", "));
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let config = load_config(&args)?;
    match args.command {
        Commands::Reconcile {
            input,
            column,
            output,
            failures,
            jobs,
            max,
            split_on,
            delimiter,
        } => {
            if !delimiter.is_ascii() {
                return Err(anyhow!("delimiter must be a single ASCII character"));
            }
            let endpoint = open_endpoint(&config, args.cache_dir);
            let client = ReconciliationClient::new(&config, endpoint);
            execute_reconcile_csv(
                &client,
                ReconcileCsvArgs {
                    input,
                    column,
                    output,
                    failures,
                    split_on,
                    delimiter: delimiter as u8,
                    options: PipelineOptions {
                        jobs: jobs.max(1),
                        max,
                    },
                    verbose: args.verbose,
                },
            )?;
        }
        Commands::Lookup {
            identifiers,
            show_query,
            json,
        } => {
            let endpoint = open_endpoint(&config, args.cache_dir);
            let client = ReconciliationClient::new(&config, endpoint);
            lookup(&client, identifiers, show_query, json)?;
        }
        Commands::Claims { qids, property } => {
            let property = property.unwrap_or_else(|| config.property.clone());
            claims(&config, qids, &property)?;
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        println!("error: {}", err);
        process::exit(1);
    }
}
