// Netkit Gateway - Main Entry Point
//
// CLI for the gateway:
// - serve: HTTP API
// - mcp: MCP server on stdio
// - tools: list the tool registry
// - exec: run one tool locally through the same checks
// - check-target: evaluate targets against the configured policy

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netkit_gateway::targets::TargetValidator;
use netkit_gateway::tools::ExecRequest;
use netkit_gateway::{mcp_server, server, Config, Dispatch, Gateway};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Netkit: authenticated gateway for network diagnostic tools
#[derive(Parser, Debug)]
#[command(name = "netkit")]
#[command(author = "Netkit Contributors")]
#[command(version)]
#[command(about = "Authenticated gateway for network diagnostic and scanning tools", long_about = None)]
struct Args {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Listen port (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen address (overrides configuration)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Serve the MCP protocol on stdin/stdout
    Mcp,
    /// List registered tools and whether they are installed
    Tools {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run one tool locally, e.g. `netkit exec dig example.com +short`
    Exec {
        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,

        /// Tool name followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Check targets against the whitelist, blacklist and private-address policy
    CheckTarget {
        /// Hostnames, IP addresses or CIDR ranges
        #[arg(required = true)]
        targets: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command-line arguments
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    init_tracing(&config)?;
    debug!(
        log_format = %config.logging.format,
        api_keys = config.auth.api_keys.len(),
        "configuration loaded"
    );

    match args.command {
        Commands::Serve { port, bind } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;
            server::serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Mcp => {
            let gateway = Gateway::from_config(&config)?;
            mcp_server::run_stdio(gateway).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Tools { json } => {
            list_tools(&Gateway::from_config(&config)?, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec {
            timeout,
            json,
            command,
        } => exec(&Gateway::from_config(&config)?, command, timeout, json).await,
        Commands::CheckTarget { targets } => check_targets(&config, &targets),
    }
}

/// Initialize tracing; logs always go to stderr so stdout stays clean for
/// command output and the MCP protocol
fn init_tracing(config: &Config) -> Result<()> {
    let level: Level = config.log_level()?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

fn list_tools(gateway: &Gateway, json: bool) -> Result<()> {
    let registry = gateway.registry();
    let descriptors = registry.descriptors();

    if json {
        let tools: Vec<serde_json::Value> = descriptors
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.name,
                    "description": d.description,
                    "available": registry.is_available(&d.name),
                    "requires_capability": d.requires_capability,
                    "max_timeout": d.timeouts.max_secs,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    println!("{:<12} {:<10} {:<10} DESCRIPTION", "TOOL", "INSTALLED", "NET_RAW");
    for d in &descriptors {
        println!(
            "{:<12} {:<10} {:<10} {}",
            d.name,
            if registry.is_available(&d.name) { "yes" } else { "no" },
            if d.requires_capability { "required" } else { "-" },
            d.description
        );
    }
    Ok(())
}

async fn exec(
    gateway: &Gateway,
    mut command: Vec<String>,
    timeout: Option<u64>,
    json: bool,
) -> Result<ExitCode> {
    let tool = command.remove(0);
    let mut request = ExecRequest::with_args(tool, command);
    request.timeout = timeout;

    let result = match gateway.run(request).await? {
        Dispatch::Completed(result) => result,
        Dispatch::Accepted(accepted) => {
            anyhow::bail!("Unexpected background job {}", accepted.job_id)
        }
    };
    info!("{}", result.summary());

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
    }
    std::io::stdout().flush().context("Failed to flush stdout")?;

    Ok(ExitCode::from(u8::try_from(result.exit_code).unwrap_or(1)))
}

fn check_targets(config: &Config, targets: &[String]) -> Result<ExitCode> {
    let validator = TargetValidator::from_rules(
        &config.targets.whitelist,
        &config.targets.blacklist,
        config.targets.allow_private,
    )
    .context("Invalid target rule")?;

    let mut all_allowed = true;
    for target in targets {
        let decision = validator.validate(target);
        if decision.allowed {
            println!("ALLOW {}", target);
        } else {
            all_allowed = false;
            println!(
                "DENY  {}: {}",
                target,
                decision.reason.unwrap_or_default()
            );
        }
    }

    Ok(if all_allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
