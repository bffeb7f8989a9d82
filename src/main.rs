use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use shadeswap::core::{Amount, Metadata, SwapRequest, WalletAddress};
use shadeswap::ledger::SimulatedLedger;
use shadeswap::wallet::StaticWallet;
use shadeswap::{Config, Error, WalletEngines};

const DEMO_WALLET: &str = "0x5afe00000000000000000000000000000000c0de";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration (shadeswap.toml + .env overrides)
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("shadeswap.toml"));
    let config = Config::load_or_default(&config_path)?;

    // 2. Logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},shadeswap=debug", config.app.log_level)));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();

    info!("🦀 ShadeSwap persona engine starting on chain {}...", config.chain_id());

    // 3. Wallet + ledger
    let owner: WalletAddress = std::env::var("SHADESWAP_WALLET")
        .unwrap_or_else(|_| DEMO_WALLET.to_string())
        .parse()?;
    let wallet = StaticWallet::new(owner, config.chain_id());

    if let Some(addr) = &config.network.contract_address {
        warn!("Contract {} configured, but this build only ships the simulated ledger", addr);
    }
    // Ledger credits at the same rate the engine quotes
    let ledger = Arc::new(SimulatedLedger::new(owner).with_slippage_rate(config.slippage_rate()?));

    let registry = WalletEngines::new(config.clone());
    let engine = registry.engine_for(&wallet, ledger).await?;

    // 4. Event printer, standing in for the UI
    let events = engine.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!("📣 {}", json),
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        }
    });

    // 5. Scripted session
    let tokens = config.tokens();
    anyhow::ensure!(tokens.len() >= 2, "at least two tokens must be configured");
    let (first, second, third) = (&tokens[0], &tokens[1], &tokens[2 % tokens.len()]);

    let alice = engine.create_identity("Alice", Metadata::new(b"opaque".to_vec())).await?;
    let bob = engine.create_identity("Bob", Metadata::new(b"opaque".to_vec())).await?;

    let amount = Amount::from(100);
    let floor = engine.quote(amount);
    engine
        .execute_swap(SwapRequest::new(first.clone(), second.clone(), amount, floor))
        .await?;
    engine
        .execute_swap(SwapRequest::new(second.clone(), third.clone(), amount, floor).switching_to(bob.id))
        .await?;

    match engine
        .execute_swap(SwapRequest::new(first.clone(), second.clone(), amount, Amount::from(99)))
        .await
    {
        Err(e @ Error::Slippage { .. }) => warn!("Rejected as expected: {}", e),
        other => anyhow::bail!("expected a slippage rejection, got {:?}", other),
    }

    engine.switch_identity(alice.id).await?;

    for persona in engine.personas().await {
        let history = engine.get_history(&persona.id).await?;
        info!("📒 {} ({}): {} trades", persona.name, persona.id, history.len());
        for trade in &history {
            info!(
                "   {} {} -> {} {} at {}",
                trade.amount_in, trade.input_token, trade.amount_out, trade.output_token, trade.timestamp
            );
        }
    }

    // 6. Shutdown: dropping the last engine handle closes the event stream
    drop(engine);
    registry.remove(&owner);
    printer.await?;

    info!("🛑 Done");
    Ok(())
}
