use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "cloudfit",
    about = "CloudFit: multi-cloud resource placement and state tracking",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to cloudfit.toml (default: ./cloudfit.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a cloudfit.toml scaffold
    Init {
        /// Directory holding the state database
        #[arg(short, long, default_value = ".cloudfit")]
        data_dir: PathBuf,
        /// Overwrite an existing cloudfit.toml
        #[arg(long)]
        force: bool,
    },
    /// Choose the best candidate for a requirement and record it.
    ///
    /// The requirement is a JSON document; the candidate catalog is a JSON
    /// array of offerings. Malformed catalog entries are skipped.
    Place {
        /// Requirement JSON file
        #[arg(short, long)]
        requirement: PathBuf,
        /// Candidate catalog JSON file
        #[arg(long)]
        candidates: PathBuf,
        /// Id of a resource this one depends on (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
        /// Print the placement without recording it
        #[arg(long)]
        dry_run: bool,
    },
    /// Show one recorded resource
    Get { id: String },
    /// List recorded resources
    List,
    /// Re-optimize an existing resource under the same id
    Replace {
        id: String,
        #[arg(short, long)]
        requirement: PathBuf,
        #[arg(long)]
        candidates: PathBuf,
        /// Version the caller last read; stale versions are rejected
        #[arg(long)]
        expected_version: u64,
    },
    /// Delete a resource record
    Delete {
        id: String,
        /// Delete even when other resources depend on it
        #[arg(long)]
        force: bool,
        /// Refuse unless the record is still at this version
        #[arg(long)]
        expected_version: Option<u64>,
    },
    /// Export a resource record as a portable JSON envelope
    Export {
        id: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Import a previously exported record
    Import {
        file: PathBuf,
        /// Store under a newly generated id instead of the exported one
        #[arg(long)]
        fresh_id: bool,
    },
    /// Check recorded resources for dangling dependencies or invalid shape
    Refresh {
        /// Check a single resource (default: all)
        id: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // `init` creates the config file, so it runs before any config is read.
    let config = match &cli.command {
        Commands::Init { .. } => cloudfit_core::CloudfitConfig::default(),
        _ => commands::load_config(cli.config.as_deref())?,
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(config.log_filter()))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_json() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Init { data_dir, force } => {
            commands::init::init(cli.config.as_deref(), &data_dir, force)
        }
        Commands::Place {
            requirement,
            candidates,
            depends_on,
            dry_run,
        } => commands::place::place(&config, &requirement, &candidates, depends_on, dry_run),
        Commands::Get { id } => commands::resource::get(&config, &id),
        Commands::List => commands::resource::list(&config),
        Commands::Replace {
            id,
            requirement,
            candidates,
            expected_version,
        } => commands::place::replace(&config, &id, &requirement, &candidates, expected_version),
        Commands::Delete {
            id,
            force,
            expected_version,
        } => commands::resource::delete(&config, &id, expected_version, force),
        Commands::Export { id, out } => commands::resource::export(&config, &id, out.as_deref()),
        Commands::Import { file, fresh_id } => commands::resource::import(&config, &file, fresh_id),
        Commands::Refresh { id } => commands::resource::refresh(&config, id.as_deref()),
    }
}
