use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keeper_account::create_account;
use keeper_chain::{AlloyLedger, RetryRunner};
use keeper_config::{Config, ConfigLoader};
use keeper_core::KeeperBuilder;
use keeper_order::UniswapExHandler;
use keeper_types::KeeperEvent;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "uniswap-ex-keeper")]
#[command(about = "Keeper bot for UniswapEx limit orders", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/keeper.toml")]
	config: PathBuf,

	#[arg(long, env = "KEEPER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the keeper
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_keeper(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn load_config(cli: &Cli) -> Result<Config> {
	info!("Loading configuration from: {:?}", cli.config);
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")
}

async fn start_keeper(cli: Cli) -> Result<()> {
	info!("Starting UniswapEx keeper");
	let config = load_config(&cli).await?;

	let account = create_account(&config.account.private_key, config.network.chain_id)
		.context("Failed to load keeper account")?;
	let executor = account
		.address()
		.await
		.context("Failed to derive keeper address")?;

	let ledger = AlloyLedger::connect(&config.network.rpc_url, config.contracts.factory)
		.context("Failed to connect to node")?;
	let handler = UniswapExHandler::connect(
		&config.network.rpc_url,
		account.wallet(),
		config.contracts.order_book,
		RetryRunner::new(config.retry_policy()),
		config.network.fill_timeout(),
	)
	.context("Failed to create order handler")?;

	let mut keeper = KeeperBuilder::new(config)
		.with_ledger(Arc::new(ledger))
		.with_handler(Arc::new(handler))
		.with_executor(executor)
		.build()
		.await
		.context("Failed to build keeper")?;

	info!(
		name = %keeper.config().keeper.name,
		%executor,
		order_book = %keeper.config().contracts.order_book,
		"Keeper configured"
	);

	let mut events = keeper.event_bus().subscribe();
	let event_log = tokio::spawn(async move {
		while let Ok(event) = events.recv().await {
			match event {
				KeeperEvent::ScanFailed {
					consecutive_failures,
					..
				} if consecutive_failures >= 10 => {
					warn!(consecutive_failures, "Discovery keeps failing");
				}
				KeeperEvent::OrderFailed { order_id, reason } => {
					warn!(%order_id, %reason, "Order failed");
				}
				_ => {}
			}
		}
	});

	keeper
		.run(setup_shutdown_signal())
		.await
		.context("Keeper stopped with an error")?;

	event_log.abort();
	info!("UniswapEx keeper stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	let config = load_config(&cli).await?;

	info!("Configuration is valid");
	info!("Keeper name: {}", config.keeper.name);
	info!("Order book: {}", config.contracts.order_book);
	info!("Factory: {}", config.contracts.factory);
	info!("Log level: {}", config.keeper.log_level);
	info!("Starting watermark: {}", config.discovery.watermark);
	for token in &config.contracts.excluded_tokens {
		info!("  Excluded token: {}", token);
	}

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!(error = %e, "Failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
