//! Super token CLI - deposit, mint, transfer and deploy through the app gateway
//!
//! Runs one orchestrated operation per invocation and waits until its
//! cross-chain execution completes, times out or is interrupted.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use supertoken_orchestrator::config::Settings;
use supertoken_orchestrator::contracts::ContractIdentifier;
use supertoken_orchestrator::coordination::{
    BlockReason, OperationDraft, OperationOutcome, Orchestrator, Readiness, TrackedOperation,
};
use supertoken_orchestrator::gateway::Resolution;
use supertoken_orchestrator::metrics;
use supertoken_orchestrator::tx::OperationKind;
use supertoken_orchestrator::wallet::{ConfirmationPolicy, LocalWalletCapability};
use supertoken_orchestrator::SessionContext;

#[derive(Parser)]
#[command(name = "supertoken", version, about)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "SUPERTOKEN_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    /// Ask before every network switch and transaction
    #[arg(long)]
    confirm: bool,

    /// Print Prometheus metrics before exiting
    #[arg(long)]
    metrics: bool,

    /// More crate logging; repeat for per-poll detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Show vault and super token addresses per chain
    Addresses,
    /// Show token, unminted and super token balances
    Balances,
    /// Deposit home tokens into the vault
    Deposit {
        #[arg(long)]
        amount: String,
    },
    /// Mint unminted balance as super tokens on a chain
    Mint {
        #[arg(long)]
        chain: u64,
        #[arg(long)]
        amount: String,
    },
    /// Move tokens between chains
    Transfer {
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
        #[arg(long)]
        amount: String,
    },
    /// Deploy the vault and super tokens
    Deploy {
        #[arg(long)]
        origin: u64,
        #[arg(long = "dst", required = true, num_args = 1..)]
        destinations: Vec<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format)?;

    info!("Starting supertoken v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load_from(&cli.config)?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    let key_env = settings.wallet.private_key_env.clone();
    let ctx = Arc::new(SessionContext::connect(settings)?);

    for (chain_id, healthy) in ctx.registry.health_check().await {
        if !healthy {
            warn!("Chain {} health check failed", chain_id);
        }
    }

    let confirmation = if cli.confirm {
        ConfirmationPolicy::Prompt
    } else {
        ConfirmationPolicy::AutoApprove
    };
    let wallet = LocalWalletCapability::from_env(
        &key_env,
        ctx.registry.clone(),
        ctx.home_chain_id(),
        confirmation,
    )
    .with_context(|| format!("Private key not available in ${}", key_env))?;

    let orchestrator = Orchestrator::new(ctx.clone(), Arc::new(wallet));
    info!("Acting as {:?}", orchestrator.user());

    let result = match cli.command {
        Command::Addresses => show_addresses(&ctx).await,
        Command::Balances => show_balances(&orchestrator).await,
        Command::Deposit { amount } => {
            let mut draft = OperationDraft::new(OperationKind::Deposit);
            draft.set_amount(amount);
            run_draft(&orchestrator, draft).await
        }
        Command::Mint { chain, amount } => {
            let mut draft = OperationDraft::new(OperationKind::Mint);
            draft.set_amount(amount);
            draft.set_destination_chain(chain);
            run_draft(&orchestrator, draft).await
        }
        Command::Transfer { from, to, amount } => {
            let mut draft = OperationDraft::new(OperationKind::Transfer);
            draft.set_amount(amount);
            draft.set_source_chain(from);
            draft.set_destination_chain(to);
            run_draft(&orchestrator, draft).await
        }
        Command::Deploy {
            origin,
            destinations,
        } => {
            let tracked = orchestrator.deploy(origin, destinations).await?;
            wait_for(&orchestrator, tracked).await
        }
    };

    orchestrator.shutdown();

    if cli.metrics {
        println!("{}", metrics::render());
    }

    result
}

async fn show_addresses(ctx: &SessionContext) -> Result<()> {
    let scope = ctx.resolver.scope();
    for chain_id in ctx.spoke_chain_ids() {
        let name = ctx.registry.descriptor(chain_id)?.name.clone();
        for contract in [ContractIdentifier::vault(), ContractIdentifier::super_token()] {
            let line = match scope.resolve(contract, chain_id).await? {
                Resolution::Deployed(address) => format!("{:?}", address),
                Resolution::NotDeployed => "not deployed".to_string(),
            };
            println!("{:<20} {:<12} {}", name, contract.label(), line);
        }
    }
    Ok(())
}

async fn show_balances(orchestrator: &Orchestrator) -> Result<()> {
    let balances = orchestrator.refresh_balances().await?;
    let ctx = orchestrator.context();
    for line in balances.describe(ctx.decimals(), &ctx.registry) {
        println!("{}", line);
    }
    Ok(())
}

async fn run_draft(orchestrator: &Orchestrator, mut draft: OperationDraft) -> Result<()> {
    let kind = draft.kind();
    match orchestrator.readiness(&draft).await? {
        Readiness::Ready | Readiness::Blocked(BlockReason::PermitRequired) => {}
        Readiness::Blocked(reason) => bail!("Cannot {}: {}", kind, reason),
    }

    if kind.needs_permit() {
        if let Some(warning) = orchestrator.sign_permit(&mut draft).await? {
            warn!("{}; submitting anyway", warning);
        }
    }

    let tracked = orchestrator.submit(&draft).await?;
    wait_for(orchestrator, tracked).await
}

async fn wait_for(orchestrator: &Orchestrator, tracked: TrackedOperation) -> Result<()> {
    let kind = tracked.handle.kind;
    println!(
        "Submitted {} {}\n  {}",
        kind,
        tracked.handle.tx_hash_hex(),
        tracked.handle.explorer_url
    );

    let tracked_hash = tracked.handle.tx_hash_hex();
    let mut progress = tracked.progress.clone();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            if let Some(snapshot) = progress.borrow_and_update().clone() {
                info!(
                    "{}/{} payloads executed",
                    snapshot.executed_count(),
                    snapshot.payloads.len()
                );
            }
        }
    });

    let outcome = tokio::select! {
        outcome = tracked.outcome() => outcome,
        signal_name = interrupted() => {
            info!("{} received, cancelling {} {}", signal_name, kind, tracked_hash);
            orchestrator.cancel(kind);
            OperationOutcome::Cancelled
        }
    };
    reporter.abort();

    match outcome {
        OperationOutcome::Completed { snapshot, deployed } => {
            println!("{}", orchestrator.state(kind).message(kind));
            for payload in &snapshot.payloads {
                if let Some(hash) = &payload.execution_tx_hash {
                    println!(
                        "  {}",
                        orchestrator.context().registry.tx_url(payload.chain_id, hash)
                    );
                }
            }
            if let Some(deployed) = deployed {
                println!("  vault on {}: {:?}", deployed.origin_chain_id, deployed.vault);
                for (chain_id, token) in deployed.super_tokens {
                    println!("  super token on {}: {:?}", chain_id, token);
                }
            }
            Ok(())
        }
        OperationOutcome::Failed(e) => Err(e.into()),
        OperationOutcome::Cancelled => {
            println!("{} cancelled", kind);
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout carries only operation results.
/// `RUST_LOG` overrides the verbosity flags.
fn init_logging(verbose: u8, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let crate_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,supertoken={lvl},supertoken_orchestrator={lvl}",
            lvl = crate_level
        ))
    });

    let layer = fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(layer.with_target(verbose > 0)).try_init(),
        LogFormat::Json => registry.with(layer.json().with_current_span(false)).try_init(),
    }
    .context("Failed to install log subscriber")
}

/// Resolves with the name of the first interrupt received. A signal that
/// cannot be watched is logged and ignored.
async fn interrupted() -> &'static str {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err(e) => {
                warn!("Cannot watch for Ctrl-C: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                warn!("Cannot watch for SIGTERM: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}
