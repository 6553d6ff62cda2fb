//! wikimir main entry point
//!
//! This is the command-line interface for the wikimir offline mirror
//! builder.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wikimir::config::load_config;
use wikimir::crawler::run_mirror;

/// Exit code for anything that escapes the run's own error handling.
const PANIC_EXIT_CODE: i32 = 42;

/// wikimir: an offline mirror builder for MediaWiki-family wikis
///
/// wikimir enumerates a wiki's articles, fetches their rendered content,
/// rewrites it for offline reading, downloads and optimizes the referenced
/// media, and packs everything into a single archive with zimwriterfs.
#[derive(Parser, Debug)]
#[command(name = "wikimir")]
#[command(version)]
#[command(about = "Offline mirror builder for MediaWiki-family wikis", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Skip dump variants whose archive already exists
    #[arg(long)]
    resume: bool,

    /// Validate the configuration and show the run plan without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);
    install_panic_hook();

    let mut config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if cli.resume {
        config.crawl.resume = true;
    }

    if cli.dry_run {
        print_plan(&config);
        return;
    }

    if let Err(e) = run_mirror(config).await {
        tracing::error!("run failed: {}", e);
        std::process::exit(1);
    }
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("wikimir=info,warn"),
            1 => EnvFilter::new("wikimir=debug,info"),
            2 => EnvFilter::new("wikimir=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Anything that reaches the panic handler is a bug; exit distinctly so
/// wrappers can tell it apart from ordinary failures
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::exit(PANIC_EXIT_CODE);
    }));
}

/// Prints what a run with this configuration would do
fn print_plan(config: &wikimir::Config) {
    println!("=== wikimir dry run ===\n");
    println!("Wiki: {}", config.wiki.url);
    println!("  API:  {}", config.api_url());
    println!("  REST: {}", config.rest_url());

    match &config.crawl.article_list {
        Some(list) => println!("Selection: titles from {}", list.display()),
        None => println!("Selection: all content namespaces"),
    }

    println!("Queue widths (speed multiplier {}):", config.crawl.speed);
    println!("  articles:  {}", config.speed());
    println!("  redirects: {}", config.speed() * 3);
    println!("  media:     {}", config.speed() * 5);

    println!("Variants:");
    for variant in config.variants() {
        println!("  - {}", variant);
    }

    println!("Output: {}", config.output.directory.display());
    println!("Cache:  {}", config.output.cache_directory.display());
    println!("\n✓ Configuration is valid");
}
