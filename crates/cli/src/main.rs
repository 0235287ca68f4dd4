//! twinsearch CLI, the main entry point.
//!
//! ```text
//! twinsearch [QUESTION]... [--config PATH] [--verbose] [--print-config]
//! ```
//!
//! Without a question the user is prompted on stdin. Logs go to stderr so
//! the answer panel on stdout stays clean.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use twinsearch_agent::TurnOrchestrator;
use twinsearch_config::{AppConfig, ConfigError};

mod panel;

#[derive(Parser)]
#[command(
    name = "twinsearch",
    about = "Answer a question from two independent web searches",
    version
)]
struct Cli {
    /// The question to ask (prompted for when omitted)
    question: Vec<String>,

    /// Config file (default: ~/.twinsearch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging and print the usage summary
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    if cli.print_config {
        print!("{}", AppConfig::default_toml());
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  ERROR: {e}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load_with_path(cli.config.as_deref())?;

    if let Err(ConfigError::MissingCredentials(missing)) = config.require_credentials() {
        print_credentials_help(&missing);
        return Err("missing credentials. See above for setup instructions.".into());
    }

    let provider = twinsearch_providers::build_from_config(&config)?;
    let orchestrator = TurnOrchestrator::from_config(&config, provider)?;

    let question = if cli.question.is_empty() {
        prompt_question(&config.default_question)?
    } else {
        cli.question.join(" ")
    };

    let outcome = orchestrator.run(&question).await?;

    println!("{}", panel::render_panel("Answer", &outcome.render(), panel::DEFAULT_WIDTH));
    if cli.verbose {
        eprintln!("{}", outcome.usage.summary());
    }
    Ok(())
}

fn prompt_question(default_question: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    writeln!(stdout, "Ask a question (press Enter for: \"{default_question}\")")?;
    write!(stdout, "> ")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_credentials_help(missing: &[String]) {
    eprintln!();
    eprintln!("  ERROR: missing credentials!");
    eprintln!();
    eprintln!("  Set these environment variables (or put them in a .env file):");
    for key in missing {
        eprintln!("    {key}");
    }
    eprintln!();
    eprintln!("  Or add them to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    eprintln!("  `twinsearch --print-config` prints a starting point.");
}
