use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use wikicite_core::config::{DEFAULT_CONFIG_PATH, load_config, write_sample_config};
use wikicite_core::confluence::{ConfluenceApi, ConfluenceClient};
use wikicite_core::convert::{ConvertOptions, ConvertReport, convert_pages};

#[derive(Debug, Parser)]
#[command(
    name = "wikicite",
    version,
    about = "Convert Confluence page properties to RIS citations"
)]
struct Cli {
    #[arg(
        short = 'c',
        long,
        global = true,
        value_name = "PATH",
        help = "Path to the YAML configuration file"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Search pages by CQL and convert them to RIS citations")]
    Convert(ConvertArgs),
    #[command(about = "List pages matching a CQL query without converting")]
    Search(SearchArgs),
    #[command(name = "init-config", about = "Write a sample configuration file")]
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
struct ConvertArgs {
    #[arg(long, value_name = "CQL", help = "CQL query for selecting pages")]
    cql: String,
    #[arg(
        long,
        value_name = "LIST",
        help = "Comma-separated additional tags to add as keywords"
    )]
    tags: Option<String>,
    #[arg(
        short = 'o',
        long,
        value_name = "DIR",
        help = "Write individual .ris files plus a combined file"
    )]
    output_dir: Option<PathBuf>,
    #[arg(
        long,
        value_name = "SECONDS",
        help = "Override the delay between requests"
    )]
    delay: Option<f64>,
    #[arg(long, value_name = "N", help = "Override the maximum retry count")]
    max_retries: Option<usize>,
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long, value_name = "CQL", help = "CQL query for selecting pages")]
    cql: String,
}

#[derive(Debug, Args)]
struct InitConfigArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    match cli.command {
        Commands::Convert(args) => run_convert(&config_path, args),
        Commands::Search(args) => run_search(&config_path, args),
        Commands::InitConfig(args) => run_init_config(&config_path, args),
    }
}

fn run_convert(config_path: &Path, args: ConvertArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(delay) = args.delay {
        config.rate_limit_delay = delay;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }

    println!("Searching with CQL: {}", args.cql);
    let options = ConvertOptions {
        cql: args.cql,
        extra_tags: split_tags(args.tags.as_deref()),
    };
    let report = convert_pages(&config, &options, args.output_dir.as_deref())?;

    println!("Found {} pages", report.requested_pages);
    for page in &report.pages {
        match &page.detail {
            Some(detail) => println!("  {} ({}): {} ({detail})", page.title, page.id, page.action),
            None => println!("  {} ({}): {}", page.title, page.id, page.action),
        }
    }

    print_summary(&report, args.output_dir.as_deref());
    Ok(())
}

fn print_summary(report: &ConvertReport, output_dir: Option<&Path>) {
    println!();
    println!(
        "Generated {} RIS citations ({} requests)",
        report.converted, report.request_count
    );
    for error in &report.errors {
        eprintln!("error: {error}");
    }

    match output_dir {
        Some(dir) => {
            println!("Files saved to: {}", dir.display());
            if let Some(combined) = &report.combined_filename {
                println!("Combined file: {}", dir.join(combined).display());
            }
        }
        None => {
            for citation in &report.citations {
                println!();
                println!("--- {} ---", citation.title);
                println!("{}", citation.ris);
            }
        }
    }
}

fn run_search(config_path: &Path, args: SearchArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let mut client = ConfluenceClient::from_converter_config(&config)?;

    println!("Searching with CQL: {}", args.cql);
    let handles = client.search(&args.cql)?;
    if handles.is_empty() {
        println!("No search results found");
        return Ok(());
    }
    for handle in &handles {
        println!("  {} (ID: {})", handle.title, handle.id);
    }
    println!();
    println!("{} pages ({} requests)", handles.len(), client.request_count());
    Ok(())
}

fn run_init_config(config_path: &Path, args: InitConfigArgs) -> Result<()> {
    if write_sample_config(config_path, args.force)? {
        println!("Sample config created at: {}", config_path.display());
        println!("Please edit the file and add your bearer token.");
    } else {
        println!(
            "Config already exists: {} (use --force to overwrite)",
            config_path.display()
        );
    }
    Ok(())
}

fn split_tags(tags: Option<&str>) -> Vec<String> {
    tags.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(ToString::to_string)
            .collect()
    })
    .unwrap_or_default()
}
