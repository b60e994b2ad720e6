use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use ig2rss::cli::{AccountsEnvArgs, Cli, Command, GenerateArgs};
use ig2rss::config::{build_source, RunConfig};
use ig2rss::{accounts, logging, pipeline};

fn main() -> ExitCode {
    // .env is optional; real environment variables win.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    logging::init().context("init logging")?;

    match cli.command {
        Command::Generate(args) => generate(&args),
        Command::AccountsEnv(args) => accounts_env(&args),
    }
}

fn generate(args: &GenerateArgs) -> anyhow::Result<()> {
    let config = RunConfig::from_args(args).context("load configuration")?;
    let source = build_source(args).context("set up post source")?;

    let report = pipeline::run_batch(&config, source)?;
    for failed in report.outcomes.iter().filter(|o| !o.succeeded()) {
        tracing::debug!(account = %failed.account, error = failed.error.as_deref().unwrap_or(""), "no feed written");
    }
    Ok(())
}

fn accounts_env(args: &AccountsEnvArgs) -> anyhow::Result<()> {
    let list = accounts::read_file(&args.file)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", list.join(","))?;
    stdout.flush()?;
    Ok(())
}
