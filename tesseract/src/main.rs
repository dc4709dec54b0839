mod args;

use std::sync::Arc;

use args::Args;
use clap::Parser;
use tesseract_core::{
    store::MemoryStore,
    tiling::Checkpoint,
    tree::{NodeKey, Tree},
};
use tesseract_issuer::IssuerStore;
use tesseract_sequencer::{Appender, CheckpointPublisher, PublicationAwaiter, TilePublisher, reset_dedupe_in_flight_ticker};
use tesseract_server::Orchestrator;
use tesseract_signer::Signer;
use tesseract_store::FilesystemTileStore;
use tesseract_validate::{TrustStore, Validator};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let roots_pem = std::fs::read_to_string(&args.roots_pem_file)?;
    let trust_store = TrustStore::from_pem_bundle(&roots_pem)?;
    let validator = Validator::new(args.validator_config()?, trust_store);

    let signing_key_pem = std::fs::read_to_string(&args.signing_key_file)?;
    let signer = Arc::new(Signer::from_pkcs8_pem(&signing_key_pem)?);

    let nodes = MemoryStore::<NodeKey, tesseract_core::tree::HashOutput>::default();
    let leafs = MemoryStore::<u64, tesseract_core::LeafData>::default();

    let tree = Tree::new(nodes, leafs.clone());
    let appender = Arc::new(Appender::new(tree, args.dedupe_cache_size()?, args.appender_config()));

    let (publisher, head_rx) = CheckpointPublisher::new(appender.tree_head(), args.checkpoint_interval());

    let awaiter = Arc::new(PublicationAwaiter::new(
        head_rx.clone(),
        leafs.clone(),
        args.pushback_max_dedupe_in_flight,
    ));

    let tile_publisher = TilePublisher::new(
        appender.clone(),
        FilesystemTileStore::new(args.checkpoint_dir.clone()),
        head_rx.clone(),
    );

    let issuers = Arc::new(IssuerStore::in_memory());

    let orchestrator = Arc::new(Orchestrator::new(
        validator,
        appender.clone(),
        awaiter.clone(),
        args.enable_publication_awaiter,
        issuers,
        signer.clone(),
        args.http_deadline(),
    ));

    let cancel = CancellationToken::new();

    let integrator = tokio::spawn({
        let appender = appender.clone();
        let cancel = cancel.clone();
        async move { appender.run_integrator(cancel).await }
    });

    let publisher_task = tokio::spawn({
        let appender = appender.clone();
        let cancel = cancel.clone();
        async move { publisher.run(move || appender.tree_head(), cancel).await }
    });

    let checkpoint_task = tokio::spawn(publish_checkpoints(
        head_rx,
        args.origin.clone(),
        signer,
        args.checkpoint_dir.clone(),
        cancel.clone(),
    ));

    let tile_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { tile_publisher.run(cancel).await }
    });

    let dedupe_reset_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { reset_dedupe_in_flight_ticker(&awaiter, cancel).await }
    });

    let router = tesseract_server::router(orchestrator, &args.path_prefix);
    let listener = tokio::net::TcpListener::bind(args.http_endpoint).await?;
    info!(endpoint = %args.http_endpoint, "tesseract listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    integrator.await?;
    publisher_task.await?;
    checkpoint_task.await?;
    tile_task.await?;
    dedupe_reset_task.await?;

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    cancel.cancel();
}

/// Tails the tree head channel and publishes a freshly signed checkpoint
/// to `checkpoint_dir` on every change, stopping once `cancel` fires.
async fn publish_checkpoints(
    mut head_rx: tokio::sync::watch::Receiver<tesseract_core::tree::TreeHead>,
    origin: String,
    signer: Arc<Signer>,
    checkpoint_dir: std::path::PathBuf,
    cancel: CancellationToken,
) {
    loop {
        let head = *head_rx.borrow_and_update();
        let mut checkpoint = Checkpoint::new(origin.clone(), head);
        signer.sign_checkpoint(&mut checkpoint, &origin);

        if let Err(err) = tokio::fs::create_dir_all(&checkpoint_dir).await {
            warn!(?err, "failed to create checkpoint directory");
        } else if let Err(err) =
            tokio::fs::write(checkpoint_dir.join("checkpoint"), checkpoint.as_string()).await
        {
            warn!(?err, "failed to publish checkpoint");
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = head_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
