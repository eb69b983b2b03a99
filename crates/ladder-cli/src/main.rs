use clap::{Parser, Subcommand};
use ladder_cli::cmd;
use ladder_cli::cmd::run::RunOptions;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ladder",
    about = "Scan-cycle runtime for ladder logic programs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a program and run scan cycles until interrupted
    Run {
        /// Program description (.json, .yaml or .yml)
        program: PathBuf,

        /// I/O point configuration; inputs and outputs are simulated
        #[arg(long)]
        io_config: Option<PathBuf>,

        /// Ignore --io-config and run logic only
        #[arg(long)]
        no_io: bool,

        /// Scan period in milliseconds (overrides the program and config)
        #[arg(long)]
        scan_time: Option<u64>,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,

        /// Restore tags from this snapshot at start and save them on exit
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Runtime configuration file
        #[arg(long, env = "LADDER_CONFIG")]
        config: Option<PathBuf>,

        /// Read operator commands from stdin while running
        #[arg(long)]
        console: bool,
    },

    /// Validate a program and print its rungs
    Check {
        /// Program description (.json, .yaml or .yml)
        program: PathBuf,
    },

    /// Print the tags in a saved snapshot
    Tags {
        /// Snapshot written by `ladder run --state-file`
        snapshot: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            program,
            io_config,
            no_io,
            scan_time,
            cycles,
            state_file,
            config,
            console,
        } => cmd::run::run(
            RunOptions {
                program,
                io_config,
                no_io,
                scan_time,
                cycles,
                state_file,
                config,
                console,
            },
            cli.json,
        ),
        Commands::Check { program } => cmd::check::run(&program, cli.json),
        Commands::Tags { snapshot } => cmd::tags::run(&snapshot, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
