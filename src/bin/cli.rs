//! Taxonomist CLI - builds a theme/category taxonomy from conversation labels
//!
//! Usage: taxonomist-cli [OPTIONS] <COMMAND>
//!
//! Exit status: 0 on success, 2 when the input holds no valid label, 1 otherwise.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::{Path, PathBuf};
use taxonomist_lib::clustering::Linkage;
use taxonomist_lib::similarity::MetricKind;
use taxonomist_lib::{run, Settings, Taxonomy, TaxonomyResult};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "taxonomist-cli")]
#[command(version, about = "Conversation label taxonomy builder", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a label collection into a taxonomy file
    Build {
        /// Label file (JSON Lines or JSON array) or a directory of label files
        input: PathBuf,
        /// Where to write the taxonomy
        #[arg(default_value = "taxonomy.json")]
        output: PathBuf,
        /// Comma-separated file-name globs for directory input
        #[arg(long)]
        pattern: Option<String>,
        /// Similarity threshold in [0, 1]; 1.0 groups exact matches only
        #[arg(long, short)]
        threshold: Option<f64>,
        /// Similarity metric
        #[arg(long, value_enum)]
        metric: Option<MetricKind>,
        /// Cluster linkage
        #[arg(long, value_enum)]
        linkage: Option<Linkage>,
        /// Maximum examples kept per cluster
        #[arg(long)]
        max_examples: Option<usize>,
        /// JSON settings file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Cluster themes and categories on one thread
        #[arg(long)]
        sequential: bool,
    },
    /// Show the most frequent theme > category pairs of a taxonomy file
    Top {
        /// Taxonomy file written by `build`
        taxonomy: PathBuf,
        #[arg(long, short, default_value = "15")]
        limit: usize,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Log to stderr; RUST_LOG overrides the verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run_cli(cli: Cli) -> TaxonomyResult<()> {
    match cli.command {
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "taxonomist-cli", &mut std::io::stdout());
            Ok(())
        }
        Commands::Build {
            input,
            output,
            pattern,
            threshold,
            metric,
            linkage,
            max_examples,
            config,
            sequential,
        } => {
            let mut settings = match &config {
                Some(path) => Settings::load(path)?,
                None => Settings::default(),
            };
            if let Some(pattern) = pattern {
                settings.pattern = pattern;
            }
            if let Some(threshold) = threshold {
                settings.similarity_threshold = threshold;
            }
            if let Some(metric) = metric {
                settings.metric = metric;
            }
            if let Some(linkage) = linkage {
                settings.linkage = linkage;
            }
            if let Some(n) = max_examples {
                settings.max_examples = n;
            }
            if sequential {
                settings.parallel = false;
            }

            let summary = run(&input, &output, &settings)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if !cli.quiet {
                println!(
                    "Taxonomy written to {}: {} themes, {} categories from {} labels ({} dropped, {} duplicates)",
                    summary.output.display(),
                    summary.theme_clusters,
                    summary.category_clusters,
                    summary.valid_labels,
                    summary.dropped_labels,
                    summary.duplicate_labels,
                );
            }
            Ok(())
        }
        Commands::Top { taxonomy, limit } => print_top(&taxonomy, limit, cli.json),
    }
}

fn print_top(path: &Path, limit: usize, json: bool) -> TaxonomyResult<()> {
    let taxonomy = Taxonomy::read(path)?;
    let pairs = taxonomy.top_pairs(limit);

    if json {
        let rows: Vec<serde_json::Value> = pairs
            .iter()
            .map(|(theme, category, frequency)| {
                serde_json::json!({ "theme": theme, "category": category, "frequency": frequency })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if pairs.is_empty() {
        println!("No theme/category pairs in {}", path.display());
        return Ok(());
    }
    let width = pairs.iter().map(|(_, _, f)| f.to_string().len()).max().unwrap_or(1);
    for (theme, category, frequency) in pairs {
        println!("{:>width$}  {} > {}", frequency, theme, category, width = width);
    }
    Ok(())
}
