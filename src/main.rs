//! `authentichain` command line: hash, register and verify images.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use authentichain::domain::state::{Notice, RegistrationPhase};
use authentichain::infra::evm::{HttpProvider, RegistryClient, SignatureService, SignerProvider, WalletConnector};
use authentichain::infra::identity::{AirstackResolver, IdentityResolver};
use authentichain::infra::indexer::FeedClient;
use authentichain::storage::{ContentStore, LighthouseUploader};
use authentichain::{hash_asset, Config, ContentHash, ImageAsset, RegistrationWorkflow, VerificationWorkflow};

#[derive(Parser, Debug)]
#[command(name = "authentichain", version, about = "Register and verify image provenance on-chain")]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the content hash of an image.
    Hash { file: String },

    /// Upload, sign and register an image.
    Register { file: String },

    /// Check whether an image has been registered, and by whom.
    Verify { file: String },

    /// Look up a content hash directly.
    Lookup { hash: String },

    /// List recent registrations from the indexer.
    Feed {
        #[arg(long, default_value_t = 20)]
        first: u32,
    },
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn print_notice(notice: Option<Notice>) {
    match notice {
        Some(Notice::Success(message)) => println!("{}", message),
        Some(Notice::Error(message)) => eprintln!("{}", message),
        None => {}
    }
}

fn describe(phase: &RegistrationPhase) -> &'static str {
    match phase {
        RegistrationPhase::Idle => "idle",
        RegistrationPhase::Ingesting => "reading file",
        RegistrationPhase::Hashing => "hashing",
        RegistrationPhase::Uploading => "uploading and waiting for signature",
        RegistrationPhase::AwaitingSignature => "upload done, waiting for signature",
        RegistrationPhase::AwaitingUpload => "signed, waiting for upload",
        RegistrationPhase::ReadyToSubmit => "ready to submit",
        RegistrationPhase::Submitting => "submitting transaction",
        RegistrationPhase::Committed => "committed",
        RegistrationPhase::Failed { .. } => "failed",
    }
}

fn resolver(config: &Config) -> anyhow::Result<Option<Arc<dyn IdentityResolver>>> {
    Ok(match &config.airstack_api_key {
        Some(key) => Some(Arc::new(AirstackResolver::new(
            &config.airstack_url,
            key.clone(),
            config.http_timeout,
        )?)),
        None => None,
    })
}

fn registry(config: &Config, provider: Arc<dyn SignerProvider>) -> Arc<RegistryClient> {
    Arc::new(RegistryClient::new(
        provider,
        config.registry_address,
        config.receipt_poll_interval,
    ))
}

async fn run_hash(file: &str) -> anyhow::Result<()> {
    let asset = ImageAsset::from_path(expand(file)).await?;
    println!("{}", hash_asset(&asset));
    Ok(())
}

async fn run_register(file: &str) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let api_key = config
        .lighthouse_api_key
        .clone()
        .context("LIGHTHOUSE_API_KEY must be set to upload images")?;

    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(&config.rpc_url, config.http_timeout)?);
    let store = Arc::new(LighthouseUploader::new(
        &config.lighthouse_upload_url,
        api_key,
        &config.ipfs_gateway,
        config.http_timeout,
    )?);
    let workflow = RegistrationWorkflow::new(
        store.clone(),
        Arc::new(WalletConnector::new(provider.clone(), config.chain_id)),
        Arc::new(SignatureService::new(provider.clone())),
        registry(&config, provider),
    );

    let mut updates = workflow.subscribe();
    let printer = tokio::spawn(async move {
        let mut last_phase = None;
        let mut last_percent = None;
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            let phase = describe(&snapshot.phase);
            if last_phase != Some(phase) {
                println!("> {}", phase);
                last_phase = Some(phase);
            }
            if let Some(progress) = snapshot.upload_progress.filter(|p| p.total > 0) {
                let percent = progress.transferred * 100 / progress.total;
                if last_percent != Some(percent) && percent % 10 == 0 {
                    println!("  upload {}%", percent);
                    last_percent = Some(percent);
                }
            }
        }
    });

    let result = workflow.run(ImageAsset::from_path(expand(file)).await?).await;
    printer.abort();

    let snapshot = workflow.snapshot();
    print_notice(snapshot.notice());
    let record = result?;
    println!("hash:        {}", record.hash);
    println!("cid:         {}", record.cid);
    println!("gateway:     {}", store.gateway_url(&record.cid));
    println!("registrant:  {}", record.registrant.to_checksum());
    println!("transaction: {}", record.transaction_hash);
    Ok(())
}

fn verifier(config: &Config) -> anyhow::Result<VerificationWorkflow> {
    let provider: Arc<dyn SignerProvider> = Arc::new(HttpProvider::new(&config.rpc_url, config.http_timeout)?);
    let mut workflow = VerificationWorkflow::new(registry(config, provider));
    if let Some(resolver) = resolver(config)? {
        workflow = workflow.with_identity(resolver, config.identity_timeout);
    }
    Ok(workflow)
}

/// Gives background enrichment its time budget before printing.
async fn report(workflow: &VerificationWorkflow, config: &Config) {
    let mut updates = workflow.subscribe();
    let snapshot = workflow.snapshot();
    let registered = snapshot.outcome().and_then(|o| o.registrant()).is_some();
    if registered && snapshot.profile.is_none() && config.airstack_api_key.is_some() {
        let _ = tokio::time::timeout(config.identity_timeout, updates.changed()).await;
    }
    print_notice(workflow.snapshot().notice());
}

async fn run_verify(file: &str) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let workflow = verifier(&config)?;
    let result = workflow.verify_file(expand(file)).await;
    report(&workflow, &config).await;
    result?;
    Ok(())
}

async fn run_lookup(hash: &str) -> anyhow::Result<()> {
    let hash: ContentHash = hash.parse().map_err(|e| anyhow::anyhow!("invalid hash: {}", e))?;
    let config = Config::from_env()?;
    let workflow = verifier(&config)?;
    let result = workflow.lookup_hash(hash).await;
    report(&workflow, &config).await;
    result?;
    Ok(())
}

async fn run_feed(first: u32) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let url = config.subgraph_url.clone().context("SUBGRAPH_URL must be set to read the feed")?;
    let feed = FeedClient::new(url, config.http_timeout)?;
    for entry in feed.recent(first).await? {
        println!(
            "{}  {}  {}",
            entry.image_hash,
            entry.registrar,
            entry.gateway_url(&config.ipfs_gateway)
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let result = match &cli.command {
        Commands::Hash { file } => run_hash(file).await,
        Commands::Register { file } => run_register(file).await,
        Commands::Verify { file } => run_verify(file).await,
        Commands::Lookup { hash } => run_lookup(hash).await,
        Commands::Feed { first } => run_feed(*first).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parse_register() {
        let cli = Cli::try_parse_from(["authentichain", "register", "photo.png"]).unwrap();
        match cli.command {
            Commands::Register { file } => assert_eq!(file, "photo.png"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cli_parse_feed_default_and_explicit() {
        let cli = Cli::try_parse_from(["authentichain", "feed"]).unwrap();
        assert!(matches!(cli.command, Commands::Feed { first: 20 }));
        let cli = Cli::try_parse_from(["authentichain", "-v", "feed", "--first", "5"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Commands::Feed { first: 5 }));
    }

    #[test]
    fn tilde_is_expanded() {
        assert!(!expand("~/a.png").starts_with("~"));
        assert_eq!(expand("b.png"), PathBuf::from("b.png"));
    }
}
