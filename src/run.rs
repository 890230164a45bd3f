use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::chain::{ChainAPI, ChainClient, MarketAPI, MarketClient};
use crate::config::{self, StoreConfig};
use crate::logging::{info, warn};
use crate::metadb::{rocks::RocksMeta, SharedMetaDB};
use crate::objstore::{FileStore, ObjectStore, StoreManager};
use crate::piecestore::{self, PieceStoreProxy};
use crate::prover::{ExtProver, Prover, UnavailableProver};
use crate::rpc::{self, SealerService};
use crate::sealer::{Sealer, SealerModules};
use crate::sector::{
    RebuildInfoManager, SectorIndexer, SnapUpManager, StateManager, WorkerManager,
};
use crate::signal;
use crate::version::VERSION;

/// path prefix of the piece store endpoints
pub const PIECE_STORE_PATH: &str = "/piecestore";

fn open_stores(cfgs: &[StoreConfig], kind: &str) -> Result<Vec<Arc<dyn ObjectStore>>> {
    let mut stores: Vec<Arc<dyn ObjectStore>> = Vec::with_capacity(cfgs.len());
    for (idx, scfg) in cfgs.iter().enumerate() {
        let store = FileStore::from_config(scfg)
            .with_context(|| format!("open {} store #{}", kind, idx))?;
        info!(
            instance = store.instance().as_str(),
            readonly = store.readonly(),
            "{} store opened",
            kind
        );
        stores.push(Arc::new(store));
    }

    Ok(stores)
}

/// start a damocles-manager daemon, relative paths in the config are based on `home`
pub fn start_daemon(home: impl AsRef<Path>, cfg_path: impl AsRef<Path>) -> Result<()> {
    let cfg = config::Config::load(&cfg_path).with_context(|| {
        format!("load from config file {}", cfg_path.as_ref().display())
    })?;
    match cfg.render() {
        Ok(s) => info!("config loaded\n {}", s),
        Err(e) => warn!(err=?e, "unable to render config"),
    }

    let miners = Arc::new(cfg.miner_configs()?);
    if miners.is_empty() {
        warn!("no miner actor configured");
    }

    // blocking http clients have to be built outside of the runtime
    let api = &cfg.common.api;
    let chain: Arc<dyn ChainAPI> = Arc::new(
        ChainClient::new(&api.chain, api.token.clone(), cfg.chain_timeout())
            .context("build chain client")?,
    );
    let market_addr = api.market.as_deref().unwrap_or(api.chain.as_str());
    let market: Arc<dyn MarketAPI> =
        Arc::new(MarketClient::new(market_addr).context("build market client")?);

    let metadb_path = cfg.metadb_path(home.as_ref());
    let db: SharedMetaDB = Arc::new(RocksMeta::open(&metadb_path)?);
    info!(path = %metadb_path.display(), "metadb opened");

    let persist_stores = open_stores(&cfg.common.persist_stores, "persist")?;
    if persist_stores.is_empty() {
        return Err(anyhow!("no persist store available"));
    }
    let store_mgr = Arc::new(StoreManager::init(persist_stores).context("init store manager")?);

    let piece_stores = open_stores(&cfg.common.piece_stores, "piece")?;
    let proxy = Arc::new(PieceStoreProxy::new(piece_stores, market));

    let prover: Arc<dyn Prover> = match ExtProver::from_config(&cfg.prover)? {
        Some(p) => Arc::new(p),
        None => {
            warn!("no window post prover configured");
            Arc::new(UnavailableProver)
        }
    };

    let sealer = Arc::new(Sealer::new(SealerModules {
        state: Arc::new(StateManager::new(db.clone())),
        indexer: Arc::new(SectorIndexer::new(db.clone(), store_mgr)),
        rebuild: Arc::new(RebuildInfoManager::new(db.clone())),
        snapup: Arc::new(SnapUpManager::new(db.clone(), chain.clone(), miners.clone())),
        workers: Arc::new(WorkerManager::new(db)),
        chain,
        prover,
        miners,
    }));

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("construct runtime")?;
    let rt_guard = runtime.enter();

    if cfg.metrics.enable {
        let mut builder = PrometheusBuilder::new().add_global_label("version", VERSION.as_str());
        if let Some(listen) = cfg.metrics.http_listen {
            builder = builder.with_http_listener(listen);
        }

        builder.install().context("install prometheus recorder")?;
        info!("prometheus exporter inited");
    }

    let io = Arc::new(SealerService::new(sealer).into_handler());
    let app = Router::new()
        .merge(rpc::router(io))
        .nest(PIECE_STORE_PATH, piecestore::http::router(proxy))
        .layer(TraceLayer::new_for_http());

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    thread::Builder::new()
        .name("signal".to_owned())
        .spawn(move || {
            if let Err(e) = signal::wait_for_term() {
                warn!("wait for signals: {:?}", e);
            }
            on_signal.cancel();
        })
        .context("spawn signal thread")?;

    let addr = cfg.rpc_listen_addr()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {}", addr))?;
        info!(version = VERSION.as_str(), "listen on {:?}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled_owned().await;
                info!("shutdown received");
            })
            .await
            .context("serve")
    })?;

    drop(rt_guard);
    runtime.shutdown_timeout(Duration::from_secs(5));
    Ok(())
}
