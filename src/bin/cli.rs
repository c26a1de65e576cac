use std::future::Future;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scanwarden::config::{Config, EnvOverrides, ScanProfile};
use scanwarden::error::{Result, WardenError};
use scanwarden::output::OutputFormat;
use scanwarden::safety::{self, SafetyGate};
use scanwarden::tools::{Authorization, ToolExecutionManager, ToolInvocation};
use scanwarden::{Capabilities, DestructiveDirective, ScanOptions};

const CONFIG_FILE: &str = ".scanwarden.toml";
const LOG_ENV: &str = "SCANWARDEN_LOG";
const INTERRUPTED: i32 = 130;

/// How long blocking tasks get to finish once the command is done. A stdin
/// read abandoned by a prompt timeout or Ctrl-C never finishes.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(
    name = "scanwarden",
    about = "Phase-gated security scan orchestrator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a non-destructive scan, then optionally a destructive phase
    Scan {
        /// Hosts or URLs in scope
        #[arg(required = true)]
        targets: Vec<String>,

        /// Run identifier (default: timestamp plus random suffix)
        #[arg(long)]
        run_id: Option<String>,

        /// Directory holding run directories
        #[arg(long, default_value = "runs")]
        root: PathBuf,

        /// Run the destructive phase without asking
        #[arg(long, conflicts_with = "skip_destructive")]
        force_destructive: bool,

        /// Never run the destructive phase
        #[arg(long)]
        skip_destructive: bool,

        /// Remove earlier runs for the primary domain first
        #[arg(long)]
        clear_previous: bool,

        /// Directory with per-tool JSON profile overrides
        #[arg(long, env = "SCANWARDEN_CONFIG_DIR")]
        config_dir: Option<PathBuf>,

        /// Scan profile (quick, normal, thorough, stealth)
        #[arg(long)]
        scan_profile: Option<String>,

        /// Current system load in 0..=1
        #[arg(long)]
        system_load: Option<f64>,

        /// Seconds to wait for the destructive confirmation
        #[arg(long)]
        confirm_timeout: Option<u64>,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,
    },

    /// Run a single tool against an existing run directory
    Tool {
        /// Tool name
        name: String,

        /// Run directory (contains run_meta.json)
        #[arg(long)]
        run_dir: PathBuf,

        /// Target (default: first target in run_meta.json)
        #[arg(long)]
        target: Option<String>,

        /// Argument profile for the tool
        #[arg(long)]
        profile: Option<String>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Extra arguments passed to the tool
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Manage proof-of-control tokens
    Proof {
        #[command(subcommand)]
        action: ProofAction,
    },

    /// List known tools and whether they are destructive-capable
    ListTools {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Generate a starter .scanwarden.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ProofAction {
    /// Write a fresh proof token into the run directory
    Create { run_dir: PathBuf },
    /// Check proof of control for the run directory
    Validate { run_dir: PathBuf },
    /// Print how to enable destructive mode
    Instructions { run_dir: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Scan {
            targets,
            run_id,
            root,
            force_destructive,
            skip_destructive,
            clear_previous,
            config_dir,
            scan_profile,
            system_load,
            confirm_timeout,
            config,
            format,
        } => {
            let directive = if skip_destructive {
                DestructiveDirective::Skip
            } else if force_destructive {
                DestructiveDirective::Force
            } else {
                DestructiveDirective::Ask
            };
            let mut env = EnvOverrides::from_env();
            if config_dir.is_some() {
                env.config_dir = config_dir;
            }
            if let Some(profile) = scan_profile {
                match ScanProfile::from_str_lenient(&profile) {
                    Some(p) => env.scan_profile = Some(p),
                    None => eprintln!("Warning: unknown scan profile '{}', ignoring", profile),
                }
            }
            let options = ScanOptions {
                config_path: config,
                root,
                run_id,
                clear_previous,
                directive,
                env,
                system_load,
                confirm_timeout: confirm_timeout.map(Duration::from_secs),
                format: parse_format(&format),
            };
            cmd_scan(targets, options)
        }
        Commands::Tool {
            name,
            run_dir,
            target,
            profile,
            timeout,
            config,
            args,
        } => cmd_tool(name, run_dir, target, profile, timeout, config, args),
        Commands::Proof { action } => cmd_proof(action),
        Commands::ListTools { format, config } => cmd_list_tools(format, config),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_format(format_str: &str) -> OutputFormat {
    OutputFormat::from_str_lenient(format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    })
}

/// Drive `fut` on a fresh runtime; Ctrl-C exits with 130.
///
/// The runtime is shut down with a bounded grace period so a blocking task
/// still waiting on stdin cannot keep the process alive.
fn run_interruptible<F>(fut: F) -> Result<i32>
where
    F: Future<Output = Result<i32>>,
{
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        tokio::select! {
            result = fut => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Interrupted");
                Ok(INTERRUPTED)
            }
        }
    });
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

fn cmd_scan(targets: Vec<String>, options: ScanOptions) -> Result<i32> {
    run_interruptible(async {
        let summary = scanwarden::scan(targets, &options, Capabilities::default()).await?;
        let rendered = scanwarden::render_report(&summary, options.format)?;
        print!("{}", rendered);
        Ok(0)
    })
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    Config::load(&path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE)))
}

fn cmd_tool(
    name: String,
    run_dir: PathBuf,
    target: Option<String>,
    profile: Option<String>,
    timeout: Option<u64>,
    config: Option<PathBuf>,
    args: Vec<String>,
) -> Result<i32> {
    if !run_dir.is_dir() {
        return Err(WardenError::RunDir {
            path: run_dir.display().to_string(),
            message: "not a directory".into(),
        });
    }
    let config = load_config(config)?;
    let manager = ToolExecutionManager::from_config(&config, &EnvOverrides::from_env());

    let mut invocation = ToolInvocation::new(name.as_str(), run_dir.clone()).with_args(args);
    if let Some(target) = target {
        invocation = invocation.with_target(target);
    }
    if let Some(profile) = profile {
        invocation = invocation.with_profile(profile);
    }
    if let Some(secs) = timeout {
        invocation = invocation.with_timeout(Duration::from_secs(secs));
    }

    run_interruptible(async {
        let gate = SafetyGate::from_env();
        let envelope = manager.run(&invocation, &Authorization::Gated(&gate)).await;
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        Ok(0)
    })
}

fn cmd_proof(action: ProofAction) -> Result<i32> {
    match action {
        ProofAction::Create { run_dir } => {
            let token = safety::generate_token(&run_dir);
            let path = safety::write_proof(&run_dir, &token)?;
            println!("Wrote {}", path.display());
            println!("For CI, export {}={}", safety::PROOF_ENV, token);
            Ok(0)
        }
        ProofAction::Validate { run_dir } => {
            let gate = SafetyGate::from_env();
            let proof = gate.proof_of_control(&run_dir);
            let allowed = gate.is_destructive_allowed(&run_dir);
            println!("proof of control: {}", if proof { "valid" } else { "missing or mismatched" });
            println!("destructive flag: {}", if gate.destructive_flag() { "set" } else { "unset" });
            println!("destructive allowed: {}", allowed);
            Ok(if allowed { 0 } else { 1 })
        }
        ProofAction::Instructions { run_dir } => {
            print!("{}", safety::instructions(&run_dir));
            Ok(0)
        }
    }
}

fn cmd_list_tools(format_str: String, config: Option<PathBuf>) -> Result<i32> {
    let config = load_config(config)?;
    let manager = ToolExecutionManager::from_config(&config, &EnvOverrides::from_env());
    let tools = manager.catalog();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&tools)?;
            println!("{}", json);
        }
        _ => {
            println!("{:<20} DESTRUCTIVE", "TOOL");
            println!("{}", "-".repeat(32));
            for tool in &tools {
                println!("{:<20} {}", tool.name, if tool.destructive { "yes" } else { "no" });
            }
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32> {
    let path = PathBuf::from(CONFIG_FILE);

    if path.exists() && !force {
        eprintln!("{} already exists. Use --force to overwrite.", CONFIG_FILE);
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created {}", CONFIG_FILE);

    Ok(0)
}
