use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

mod commands;
mod config;
mod transport;
mod utils;

use commands::*;
use transport::PcscTransport;
use utils::{KeyArgs, reader};

#[derive(Parser)]
#[command(version, about = "Bolt Card CLI for provisioning NTAG 424 DNA cards and verifying taps")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long)]
    reader: Option<String>,

    /// Config file (defaults to ~/.boltcard/boltcard.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trace level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Generate a random key set for a new card
    Keygen,

    /// Show the NDEF template a card would be written with
    Template {
        /// Base URL, or base text with --text
        #[arg(required = true)]
        base: String,

        /// Use a text record instead of a URI record
        #[arg(long)]
        text: bool,
    },

    /// Verify a tap URL
    Verify {
        /// Full URL read from the card
        #[arg(long, required = true)]
        url: String,

        /// Last accepted counter of the card
        #[arg(long)]
        last_counter: Option<u32>,

        /// Keys to verify with (all cards in the config otherwise)
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Emulate a Type 4 tag serving a URL and read it back like a phone would
    Emulate {
        /// URL served as the NDEF record
        #[arg(long, required = true)]
        url: String,
    },

    /// Provision a blank card
    Write {
        /// Base URL, or base text with --text
        #[arg(long, required = true)]
        base_url: String,

        /// Use a text record instead of a URI record
        #[arg(long)]
        text: bool,

        /// Keys to install (random keys otherwise)
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Return a provisioned card to factory state
    Reset {
        /// Keys currently on the card
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Show UID, file settings and file contents of a card
    Inspect {
        /// Key 0 to authenticate with (the configured default key otherwise)
        #[command(flatten)]
        keys: KeyArgs,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Keygen => return keygen_command(),
        Commands::Template { base, text } => return template_command(base, *text),
        Commands::Verify {
            url,
            last_counter,
            keys,
        } => return verify_command(&config, url, keys, *last_counter),
        Commands::Emulate { url } => return emulate_command(url),
        _ => {}
    }

    let context = reader::establish_context()?;
    if let Commands::List = cli.command {
        return reader::print_readers(&context);
    }

    // For all other commands, find appropriate reader
    let reader = match &cli.reader {
        Some(reader_name) => reader::find_reader_by_name(&context, reader_name)?,
        None => reader::find_reader_with_card(&context)?,
    };
    info!("Using reader: {}", reader.name());
    let transport = PcscTransport::new(context, reader.name());

    match &cli.command {
        Commands::Write {
            base_url,
            text,
            keys,
        } => write_command(transport, &config, base_url, *text, keys)?,
        Commands::Reset { keys } => reset_command(transport, &config, keys)?,
        Commands::Inspect { keys } => inspect_command(transport, &config, keys)?,
        _ => unreachable!("handled above"),
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(true)
        .init();
}
