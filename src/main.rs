mod checks;
mod config;
mod credentials;
mod error;
mod probe;
mod report;
mod settings;

use anyhow::{anyhow, bail, Result};
use std::env;
use std::process;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use checks::fix::FixMode;
use config::{CommonArgs, Config};
use report::Reporter;

/// Main binary version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp
pub const BUILD_TIME: &str = env!("GA_MCP_DOCTOR_BUILD_TIME");

/// Git commit hash
pub const GIT_HASH: &str = env!("GA_MCP_DOCTOR_GIT_HASH");

fn print_usage() {
    eprintln!("ga-mcp-doctor - Check and repair a local Google Analytics MCP server setup\n");
    eprintln!("USAGE:");
    eprintln!("  ga-mcp-doctor setup   [options]                 Check runtime, CLI, settings, credentials and handshake");
    eprintln!("  ga-mcp-doctor project [options]                 Show which project the server uses and list available ones");
    eprintln!("  ga-mcp-doctor fix --project <name> [options]    Build <name>_adc.json and point settings at it");
    eprintln!("  ga-mcp-doctor fix --default-adc [options]       Point settings at the default ADC file\n");
    eprintln!("OPTIONS:");
    eprintln!("  --settings <path>     Gemini settings file     [env: GA_MCP_SETTINGS, default: ~/.gemini/settings.json]");
    eprintln!("  --gcloud-dir <path>   gcloud config directory  [env: CLOUDSDK_CONFIG, default: ~/.config/gcloud]");
    eprintln!("  --server <name>       mcpServers entry name    [env: GA_MCP_SERVER_NAME, default: analytics-mcp]");
    eprintln!("  --timeout <duration>  Handshake timeout        [env: GA_MCP_TIMEOUT, default: 10s]");
    eprintln!("  --strict              Exit with status 1 when any check fails\n");
    eprintln!("ENVIRONMENT:");
    eprintln!("  GA_MCP_EXPECTED_COMMAND   Exact command the settings entry must use");
    eprintln!("  GA_MCP_EXPECTED_ARGS      Expected args, whitespace separated (default: -m analytics_mcp.server)");
    eprintln!("  RUST_LOG                  Log filter for diagnostics on stderr");
}

/// Display version information
fn print_version_info() {
    println!("ga-mcp-doctor v{}", VERSION);
    println!("  Built: {}", BUILD_TIME);
    println!("  Git:   {}", GIT_HASH);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Subcommand {
    Setup,
    Project,
    Fix(FixMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    Help,
    Version,
    Run(Subcommand, CommonArgs),
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let Some(first) = args.first() else {
        bail!("missing subcommand");
    };

    match first.as_str() {
        "-h" | "--help" | "help" => return Ok(Invocation::Help),
        "-V" | "--version" => return Ok(Invocation::Version),
        _ => {}
    }

    let mut common = CommonArgs::default();
    let mut project: Option<String> = None;
    let mut default_adc = false;

    let mut i = 1;
    while i < args.len() {
        if common.take(args, &mut i)? {
            i += 1;
            continue;
        }

        match args[i].as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "--project" if first == "fix" => {
                i += 1;
                let name = args.get(i).ok_or_else(|| anyhow!("--project requires a value"))?;
                project = Some(name.clone());
            }
            "--default-adc" if first == "fix" => default_adc = true,
            other => bail!("unexpected argument '{}' for '{}'", other, first),
        }
        i += 1;
    }

    let subcommand = match first.as_str() {
        "setup" => Subcommand::Setup,
        "project" => Subcommand::Project,
        "fix" => match (project, default_adc) {
            (Some(name), false) => Subcommand::Fix(FixMode::Project(name)),
            (None, true) => Subcommand::Fix(FixMode::DefaultAdc),
            (Some(_), true) => bail!("--project and --default-adc are mutually exclusive"),
            (None, false) => bail!("fix needs --project <name> or --default-adc"),
        },
        other => bail!("unknown subcommand '{}'", other),
    };

    Ok(Invocation::Run(subcommand, common))
}

/// Log filter from `RUST_LOG`-style directives; warnings only when empty
fn log_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let directives = env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    // Log to stderr; stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&directives))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();

    let (subcommand, common) = match parse_args(&args) {
        Ok(Invocation::Help) => {
            print_usage();
            return Ok(());
        }
        Ok(Invocation::Version) => {
            print_version_info();
            return Ok(());
        }
        Ok(Invocation::Run(subcommand, common)) => (subcommand, common),
        Err(e) => {
            eprintln!("error: {}\n", e);
            print_usage();
            process::exit(2);
        }
    };

    let config = Config::resolve(common)?;
    tracing::debug!(?config, "Resolved configuration");

    let mut report = Reporter::stdout();
    let passed = match &subcommand {
        Subcommand::Setup => checks::setup::run(&config, &mut report).await,
        Subcommand::Project => checks::project::run(&config, &mut report).await,
        Subcommand::Fix(mode) => checks::fix::run(&config, mode, &mut report),
    };

    tracing::debug!(checks = report.recorded(), passed, "Report complete");

    if config.strict && !passed {
        process::exit(1);
    }

    Ok(())
}
