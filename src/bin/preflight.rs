use anyhow::Context;
use serde_json::json;

use authentichain::infra::evm::provider::parse_quantity;
use authentichain::infra::evm::{HttpProvider, SignerProvider};
use authentichain::Config;

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight\n\
         \n\
         Requires env vars:\n\
           RPC_URL, CHAIN_ID\n\
         Optional:\n\
           REGISTRY_ADDRESS, LIGHTHOUSE_API_KEY, AIRSTACK_API_KEY, SUBGRAPH_URL\n"
    );
    std::process::exit(2);
}

fn configured(value: bool) -> &'static str {
    if value {
        "configured"
    } else {
        "not configured"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }

    // Force-read config (nice error messages if missing)
    let config = Config::from_env().context("invalid configuration")?;

    println!("> Preflight:");
    println!("  RPC_URL={}", config.rpc_url);
    println!("  CHAIN_ID={}", config.chain_id);
    println!("  REGISTRY_ADDRESS={}", config.registry_address.to_checksum());

    let provider = HttpProvider::new(&config.rpc_url, config.http_timeout)?;

    // Basic RPC connectivity
    let chain_id = provider
        .request("eth_chainId", json!([]))
        .await
        .and_then(|v| parse_quantity("eth_chainId", &v))
        .map_err(|e| anyhow::anyhow!("RPC is not reachable at {}: {}", config.rpc_url, e))?;
    println!("  RPC chain id: {}", chain_id);
    if chain_id != config.chain_id {
        return Err(anyhow::anyhow!(
            "RPC is on chain {} but CHAIN_ID is {}",
            chain_id,
            config.chain_id
        ));
    }

    let block = provider
        .request("eth_blockNumber", json!([]))
        .await
        .and_then(|v| parse_quantity("eth_blockNumber", &v))?;
    println!("  Latest block: {}", block);

    // Registry contract existence
    let code = provider
        .request("eth_getCode", json!([config.registry_address.to_string(), "latest"]))
        .await?;
    let code = code.as_str().unwrap_or("0x");
    if code.trim_start_matches("0x").is_empty() {
        return Err(anyhow::anyhow!(
            "No contract deployed at REGISTRY_ADDRESS {} on chain {}",
            config.registry_address.to_checksum(),
            chain_id
        ));
    }
    println!("  Registry contract is deployed ({} bytes of code).", code.trim_start_matches("0x").len() / 2);

    // Wallet accounts (a node without unlocked accounts cannot register)
    let accounts = provider.request("eth_accounts", json!([])).await?;
    let count = accounts.as_array().map(Vec::len).unwrap_or(0);
    if count == 0 {
        eprintln!("  Warning: RPC exposes no accounts; registration will fail until one is unlocked.");
    } else {
        println!("  Accounts available: {}", count);
    }

    println!("  Storage uploads: {}", configured(config.lighthouse_api_key.is_some()));
    println!("  Identity enrichment: {}", configured(config.airstack_api_key.is_some()));
    println!("  Registration feed: {}", configured(config.subgraph_url.is_some()));

    println!("> Preflight OK.");
    Ok(())
}
