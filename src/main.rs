use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell as CompShell};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use pricestorm::commands::{init, plan, run, send};
use pricestorm::logging::{init_tracing, LogFormat};

#[derive(Parser)]
#[command(name = "pricestorm")]
#[command(version)]
#[command(about = "Scenario-driven HTTP load generator for the prices API")]
#[command(long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long = "log-level", global = true, default_value = "warn")]
    log_level: String,
    /// Log output format
    #[arg(long = "log-format", global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test plan (the built-in prices plan when no file is given)
    Run {
        /// Plan file (YAML)
        plan: Option<PathBuf>,
        /// Only run these scenarios
        #[arg(long = "scenario", short = 's', action = clap::ArgAction::Append)]
        scenarios: Vec<String>,
        /// Override VUs for every scenario
        #[arg(long = "vus")]
        vus: Option<u32>,
        /// Override duration for constant-vus scenarios (e.g. "30s", "1m")
        #[arg(long = "duration")]
        duration: Option<String>,
        /// Override the target host (e.g. http://localhost:8080)
        #[arg(long = "host")]
        host: Option<String>,
        /// Extra header for every request (e.g. "Accept: application/json")
        #[arg(short = 'H', long = "header", action = clap::ArgAction::Append)]
        headers: Vec<String>,
        /// Report formats (comma-separated: json, html, junit)
        #[arg(long = "report")]
        report: Option<String>,
        /// Report output directory
        #[arg(long = "out", default_value = "reports")]
        out: PathBuf,
        /// Progress report interval during the run
        #[arg(long = "report-interval", default_value = "5s")]
        report_interval: String,
        /// CI mode (no animations)
        #[arg(long = "ci")]
        ci: bool,
    },
    /// Send a single request of one exec target
    Send {
        /// Exec target name (e.g. normal, notFound, error)
        exec: String,
        /// Plan file (YAML)
        #[arg(long = "plan")]
        plan: Option<PathBuf>,
        /// Override the target host
        #[arg(long = "host")]
        host: Option<String>,
        /// Extra header (e.g. "Accept: application/json")
        #[arg(short = 'H', long = "header", action = clap::ArgAction::Append)]
        headers: Vec<String>,
    },
    /// Show the resolved plan and its scenario timeline
    Plan {
        /// Plan file (YAML)
        plan: Option<PathBuf>,
        /// Only validate the plan
        #[arg(long = "check")]
        check: bool,
        /// Print the resolved plan as YAML
        #[arg(long = "yaml", conflicts_with = "check")]
        yaml: bool,
    },
    /// Write the built-in plan to a file
    Init {
        /// Destination file
        #[arg(default_value = "pricestorm.yaml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long = "force")]
        force: bool,
    },
    /// Generate shell completions (internal)
    #[command(hide = true)]
    Completions {
        /// Shell: bash, zsh, fish
        shell: String,
    },
    /// Generate man page (internal)
    #[command(hide = true)]
    Man,
}

pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    if atty::is(atty::Stream::Stdout) {
        println!(
            "{} {}  {}",
            "⚡ pricestorm".cyan().bold(),
            format!("v{}", version).dimmed(),
            "load testing the prices API".dimmed()
        );
    } else {
        println!("pricestorm v{} - load testing the prices API", version);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    if matches!(cli.command, Commands::Run { .. } | Commands::Plan { .. }) {
        print_banner();
    }

    match cli.command {
        Commands::Run {
            plan,
            scenarios,
            vus,
            duration,
            host,
            headers,
            report,
            out,
            report_interval,
            ci,
        } => {
            run::handle_run(run::RunOptions {
                plan,
                scenarios,
                vus,
                duration,
                host,
                headers,
                report,
                out,
                report_interval,
                ci,
            })
            .await?;
        }
        Commands::Send {
            exec,
            plan,
            host,
            headers,
        } => {
            send::handle_send(exec, plan, host, headers).await?;
        }
        Commands::Plan {
            plan: plan_path,
            check,
            yaml,
        } => {
            plan::handle_plan(plan_path, check, yaml).await?;
        }
        Commands::Init { path, force } => {
            init::handle_init(&path, force).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            let sh = match shell.as_str() {
                "bash" => CompShell::Bash,
                "zsh" => CompShell::Zsh,
                "fish" => CompShell::Fish,
                "powershell" | "pwsh" => CompShell::PowerShell,
                "elvish" => CompShell::Elvish,
                other => {
                    eprintln!(
                        "Unsupported shell: {} (use bash|zsh|fish|powershell|elvish)",
                        other
                    );
                    std::process::exit(2);
                }
            };
            generate(sh, &mut cmd, name, &mut std::io::stdout());
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            man.render(&mut std::io::stdout())?;
        }
    }

    Ok(())
}
