//! the sealer, entry point for all sector, store & worker operations

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use fil_types::ActorID;

use crate::chain::ChainAPI;
use crate::config::MinerConfig;
use crate::errors::{is_not_found, Precondition};
use crate::logging::{debug, info};
use crate::prover::Prover;
use crate::sector::state::StateCallback;
use crate::sector::{
    RebuildInfoManager, SectorIndexer, SnapUpManager, StateManager, WorkerManager,
};
use crate::types::{
    DealID, SectorID, SectorIndexLocation, SectorIndexType, SectorState, SectorWorkerJob,
    SectorWorkerState, WorkerInfo, WorkerPingInfo,
};
use crate::util::unix_now;

mod proving;
mod rebuild;
mod snapup;
mod storage;


pub use proving::ProvingSectorInfo;

/// all the services a sealer is built upon
pub struct SealerModules {
    pub state: Arc<StateManager>,
    pub indexer: Arc<SectorIndexer>,
    pub rebuild: Arc<RebuildInfoManager>,
    pub snapup: Arc<SnapUpManager>,
    pub workers: Arc<WorkerManager>,
    pub chain: Arc<dyn ChainAPI>,
    pub prover: Arc<dyn Prover>,
    pub miners: Arc<HashMap<ActorID, MinerConfig>>,
}

pub struct Sealer {
    state: Arc<StateManager>,
    indexer: Arc<SectorIndexer>,
    rebuild: Arc<RebuildInfoManager>,
    snapup: Arc<SnapUpManager>,
    workers: Arc<WorkerManager>,
    chain: Arc<dyn ChainAPI>,
    prover: Arc<dyn Prover>,
    miners: Arc<HashMap<ActorID, MinerConfig>>,
}

impl Sealer {
    pub fn new(modules: SealerModules) -> Self {
        Sealer {
            state: modules.state,
            indexer: modules.indexer,
            rebuild: modules.rebuild,
            snapup: modules.snapup,
            workers: modules.workers,
            chain: modules.chain,
            prover: modules.prover,
            miners: modules.miners,
        }
    }

    fn miner_config(&self, miner: ActorID) -> Result<&MinerConfig> {
        self.miners
            .get(&miner)
            .ok_or_else(|| Precondition(format!("miner config unavailable for {}", miner)).into())
    }

    pub fn list_sectors(
        &self,
        ws: SectorWorkerState,
        job: SectorWorkerJob,
    ) -> Result<Vec<SectorState>> {
        self.state.all(ws, job).context("list sectors")
    }

    pub fn find_sector(&self, ws: SectorWorkerState, sid: SectorID) -> Result<SectorState> {
        self.state.load(sid, ws)
    }

    /// all sectors with a piece of the given deal
    pub fn find_sectors_with_deal(
        &self,
        ws: SectorWorkerState,
        deal_id: DealID,
    ) -> Result<Vec<SectorState>> {
        if deal_id == 0 {
            return Err(Precondition("empty deal id".to_owned()).into());
        }

        let mut sectors = Vec::new();
        self.state
            .for_each(ws, SectorWorkerJob::All, |state| {
                if state.deal_ids().contains(&deal_id) {
                    sectors.push(state);
                }
                Ok(())
            })
            .context("iterate sectors")?;

        Ok(sectors)
    }

    pub fn import_sector(
        &self,
        ws: SectorWorkerState,
        state: Option<SectorState>,
        override_existing: bool,
    ) -> Result<bool> {
        let state = match state {
            Some(s) => s,
            None => return Ok(false),
        };

        let sid = state.id;
        let imported = self.state.import(ws, state, override_existing)?;
        info!(sector = %sid, scope = ws.as_str(), imported, "sector imported");
        Ok(imported)
    }

    /// brings an aborted sector back online, sectors with deals only if forced
    pub fn restore_sector(&self, sid: SectorID, forced: bool) -> Result<()> {
        let mut check = |st: &mut SectorState| -> Result<bool> {
            if !st.pieces.is_empty() {
                return Err(Precondition(
                    "sector with deals can not be normally restored".to_owned(),
                )
                .into());
            }

            if st.abort_reason.is_empty() {
                return Err(Precondition(
                    "sector is not aborted, can not be normally restored".to_owned(),
                )
                .into());
            }

            st.abort_reason.clear();
            Ok(true)
        };

        let on_restore: Option<StateCallback<'_>> = if forced { None } else { Some(&mut check) };
        self.state
            .restore(sid, on_restore)
            .with_context(|| format!("restore sector {}", sid))
    }

    pub fn report_finalized(&self, sid: SectorID) -> Result<()> {
        self.state
            .finalize(sid, None)
            .with_context(|| format!("finalize sector {}", sid))
    }

    pub fn report_aborted(&self, sid: SectorID, reason: String) -> Result<()> {
        let mut record = |st: &mut SectorState| -> Result<bool> {
            st.abort_reason = reason.clone();
            Ok(true)
        };

        self.state
            .finalize(sid, Some(&mut record))
            .with_context(|| format!("abort sector {}", sid))
    }

    pub fn sector_indexer_find(
        &self,
        typ: SectorIndexType,
        sid: SectorID,
    ) -> Result<SectorIndexLocation> {
        let instance = self
            .indexer
            .typed(typ)
            .find(sid)
            .with_context(|| format!("find in indexer of type {:?}", typ))?;

        Ok(SectorIndexLocation {
            found: instance.is_some(),
            instance,
        })
    }

    pub fn worker_ping(&self, info: WorkerInfo) -> Result<()> {
        let ping = WorkerPingInfo {
            info,
            last_ping: unix_now()?,
        };

        debug!(worker = ping.info.name.as_str(), "worker ping");
        self.workers.update(&ping)
    }

    /// None if the worker has never pinged
    pub fn worker_get_ping_info(&self, name: &str) -> Result<Option<WorkerPingInfo>> {
        match self.workers.load(name) {
            Ok(ping) => Ok(Some(ping)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.context("load worker info")),
        }
    }

    pub fn worker_ping_info_list(&self) -> Result<Vec<WorkerPingInfo>> {
        self.workers.all(|_| true).context("load all worker infos")
    }
}
