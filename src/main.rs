use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use chain::{Rounder, SyncConfig};
use clap::{Parser, ValueEnum};
use fork_detector::{BlackList, ForkDetectorHandler, MetaForkDetector, ShardForkDetector};
use metrics::server::{run_metrics_server, MetricsServerConfig};
use metrics::Metrics;
use networking::memory::{BlockBuilder, MemoryNode};
use networking::{Bootstrapper, ChainRole, NodeState};
use tokio::task;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Role {
    Shard,
    Meta,
}

/// Sync a node against an in-memory network that already holds a chain.
#[derive(Parser, Debug)]
struct Args {
    /// Blocks published on top of genesis.
    #[arg(short, long, default_value_t = 20)]
    blocks: u64,

    #[arg(short, long, value_enum, default_value_t = Role::Shard)]
    role: Role,

    #[arg(long, default_value_t = 0)]
    shard_id: u32,

    /// YAML file overriding the default sync configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    /// Serve Prometheus metrics on this port.
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Seconds to wait for the node to synchronize.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SyncConfig::load_from_file(path)?,
        None => SyncConfig::default(),
    };

    let role = match args.role {
        Role::Shard => ChainRole::Shard(args.shard_id),
        Role::Meta => ChainRole::Meta,
    };

    // whole seconds, header timestamps have no finer resolution
    let round_duration = Duration::from_secs(config.wait_time().as_secs().max(1));

    // place genesis so that the current round is the one of the last published block
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    config.genesis_time = now.saturating_sub(args.blocks * round_duration.as_secs());

    let builder = BlockBuilder::new(role, config.genesis_time, round_duration);
    let genesis = builder.genesis()?;
    let blocks = builder.chain(&genesis, args.blocks, "main")?;
    let Some(last) = blocks.last().cloned() else {
        bail!("nothing to sync, --blocks must be positive");
    };

    let node = MemoryNode::new(&genesis, role)?;
    node.network.insert_blocks(blocks);

    let rounder = Arc::new(Rounder::new(config.genesis_time, round_duration));
    let black_list = Arc::new(BlackList::new(config.black_list_ttl()));
    let fork_detector: Arc<dyn ForkDetectorHandler> = match role {
        ChainRole::Meta => Arc::new(MetaForkDetector::new(
            rounder.clone(),
            black_list.clone(),
            config.clone(),
        )),
        ChainRole::Shard(_) => Arc::new(ShardForkDetector::new(
            rounder.clone(),
            black_list.clone(),
            config.clone(),
        )),
    };

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    if let Some(metrics_port) = args.metrics_port {
        let server_config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port,
        };
        let metrics = metrics.clone();
        task::spawn(async move {
            if let Err(err) = run_metrics_server(server_config, metrics).await {
                warn!(error = %err, "Metrics server exited");
            }
        });
    }

    let bootstrapper = Arc::new(Bootstrapper::new(node.bootstrapper_args(
        config,
        fork_detector,
        rounder,
        black_list,
        metrics,
    )));
    let mut sync_state = bootstrapper.subscribe_sync_state();

    bootstrapper.start_sync().await?;
    node.network.broadcast_header(&last);

    let target = last.nonce();
    let synced = tokio::time::timeout(Duration::from_secs(args.timeout), async {
        while node.chain.nonce() < target {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sync_state.wait_for(NodeState::is_synchronized).await.map(|_| ())
    })
    .await;

    bootstrapper.stop_sync().await;

    match synced {
        Ok(Ok(())) => {
            info!(
                chain = ?role,
                nonce = node.chain.nonce(),
                hash = ?node.chain.tip_hash(),
                "Node is synchronized"
            );
            Ok(())
        }
        Ok(Err(err)) => Err(err).context("Sync state channel closed"),
        Err(_) => bail!(
            "node reached nonce {} of {target} before timing out",
            node.chain.nonce()
        ),
    }
}
