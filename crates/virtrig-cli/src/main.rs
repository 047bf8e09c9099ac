mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use std::path::PathBuf;
use std::process::ExitCode;
use virtrig_core::install_signal_handler;

#[derive(Debug, Parser)]
#[command(
    name = "virtrig",
    version,
    about = "CI harness for libvirt test suites: snapshot, diff, and recover host state"
)]
struct Cli {
    /// Path to the harness configuration file.
    #[arg(long, default_value = "virtrig.toml", global = true)]
    config: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full batch: select tests, back up host state, run each test
    /// with a post-test check and recovery, and write the reports.
    Run {
        /// Run only tests containing one of these substrings.
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        /// Exclude tests containing one of these substrings.
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,
        /// Run only the first test of each module.
        #[arg(long, default_value_t = false)]
        smoke: bool,
        /// File with the exact tests to run, one per line.
        #[arg(long)]
        whitelist: Option<PathBuf>,
        /// File with tests to exclude, one per line.
        #[arg(long)]
        blacklist: Option<PathBuf>,
        /// Override the XML report path from the config.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Skip the post-test host state check.
        #[arg(long, default_value_t = false)]
        no_check: bool,
        /// Check but never recover drifted state.
        #[arg(long, default_value_t = false)]
        no_recover: bool,
    },
    /// One-shot check: snapshot the host, run a command (or wait for
    /// Enter), then diff and optionally recover.
    Check {
        /// Command to run between snapshot and check.
        #[arg(long)]
        command: Option<String>,
        /// Check but never recover drifted state.
        #[arg(long, default_value_t = false)]
        no_recover: bool,
    },
    /// Take and print a snapshot of every tracked resource kind.
    Snapshot,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VIRTRIG_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Run {
            only,
            skip,
            smoke,
            whitelist,
            blacklist,
            report,
            no_check,
            no_recover,
        } => commands::run::run(
            &cli.config,
            commands::run::RunArgs {
                only,
                skip,
                smoke,
                whitelist,
                blacklist,
                report,
                no_check,
                no_recover,
            },
            json_output,
        ),
        Commands::Check {
            command,
            no_recover,
        } => commands::check::run(&cli.config, command.as_deref(), no_recover, json_output),
        Commands::Snapshot => commands::snapshot::run(&cli.config, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
