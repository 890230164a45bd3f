use std::collections::HashMap;
use std::sync::Arc;

use fil_types::{ActorID, SectorNumber};
use jsonrpc_core::{Error, ErrorCode, IoHandler, Result};

use super::sealer::SealerAPI;
use crate::b64serde::B64Vec;
use crate::chain::BitFieldRuns;
use crate::errors::{kind, ErrorKind};
use crate::logging::{error, warn};
use crate::sealer::{ProvingSectorInfo, Sealer};
use crate::types::{
    AllocateSectorSpec, DealID, ExtendedSectorInfo, PoStProof, RebuildOptions, SectorID,
    SectorIndexLocation, SectorIndexType, SectorRebuildInfo, SectorState, SectorWorkerJob,
    SectorWorkerState, SnapUpFetchResult, StoreBasicInfo, StoreDetailedInfo, WorkerInfo,
    WorkerPingInfo,
};

/// target is absent
pub const ERR_CODE_NOT_FOUND: i64 = 1;
/// call again later
pub const ERR_CODE_WAIT_RETRY: i64 = 2;

/// turns a failure into a json-rpc error, carrying the whole context chain
pub fn rpc_error(err: anyhow::Error) -> Error {
    let code = match kind(&err) {
        ErrorKind::Precondition => ErrorCode::InvalidParams,
        ErrorKind::NotFound => ErrorCode::ServerError(ERR_CODE_NOT_FOUND),
        ErrorKind::Retryable => ErrorCode::ServerError(ERR_CODE_WAIT_RETRY),
        ErrorKind::Invariant => {
            error!("invariant violated: {:?}", err);
            ErrorCode::InternalError
        }
        ErrorKind::FatalIO | ErrorKind::Other => {
            warn!("rpc call failed: {:?}", err);
            ErrorCode::InternalError
        }
    };

    Error {
        code,
        message: format!("{:#}", err),
        data: None,
    }
}

fn wrap<T>(res: anyhow::Result<T>) -> Result<T> {
    res.map_err(rpc_error)
}

pub struct SealerService {
    sealer: Arc<Sealer>,
}

impl SealerService {
    pub fn new(sealer: Arc<Sealer>) -> Self {
        SealerService { sealer }
    }

    /// handler with all `Venus.*` methods registered
    pub fn into_handler(self) -> IoHandler {
        let mut io = IoHandler::new();
        io.extend_with(self.to_delegate());
        io
    }
}

impl SealerAPI for SealerService {
    fn list_sectors(&self, ws: SectorWorkerState, job: SectorWorkerJob) -> Result<Vec<SectorState>> {
        wrap(self.sealer.list_sectors(ws, job))
    }

    fn find_sector(&self, ws: SectorWorkerState, id: SectorID) -> Result<Option<SectorState>> {
        match self.sealer.find_sector(ws, id) {
            Ok(st) => Ok(Some(st)),
            Err(e) if kind(&e) == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(rpc_error(e)),
        }
    }

    fn find_sectors_with_deal(&self, ws: SectorWorkerState, deal_id: DealID) -> Result<Vec<SectorState>> {
        wrap(self.sealer.find_sectors_with_deal(ws, deal_id))
    }

    fn import_sector(
        &self,
        ws: SectorWorkerState,
        state: Option<SectorState>,
        override_existing: bool,
    ) -> Result<bool> {
        wrap(self.sealer.import_sector(ws, state, override_existing))
    }

    fn restore_sector(&self, id: SectorID, forced: bool) -> Result<()> {
        wrap(self.sealer.restore_sector(id, forced))
    }

    fn remove_sector(&self, id: SectorID) -> Result<()> {
        wrap(self.sealer.remove_sector(id))
    }

    fn report_finalized(&self, id: SectorID) -> Result<()> {
        wrap(self.sealer.report_finalized(id))
    }

    fn report_aborted(&self, id: SectorID, reason: String) -> Result<()> {
        wrap(self.sealer.report_aborted(id, reason))
    }

    fn sector_set_for_rebuild(&self, id: SectorID, opt: RebuildOptions) -> Result<bool> {
        wrap(self.sealer.sector_set_for_rebuild(id, opt))
    }

    fn allocate_rebuild_sector(&self, spec: AllocateSectorSpec) -> Result<Option<SectorRebuildInfo>> {
        wrap(self.sealer.allocate_rebuild_sector(spec))
    }

    fn sector_indexer_find(&self, typ: SectorIndexType, id: SectorID) -> Result<SectorIndexLocation> {
        wrap(self.sealer.sector_indexer_find(typ, id))
    }

    fn submit_persisted_ex(&self, id: SectorID, instance: String, is_upgrade: bool) -> Result<bool> {
        wrap(self.sealer.submit_persisted_ex(id, instance, is_upgrade))
    }

    fn store_reserve_space(
        &self,
        id: SectorID,
        size: u64,
        candidates: Vec<String>,
    ) -> Result<Option<StoreBasicInfo>> {
        wrap(self.sealer.store_reserve_space(id, size, candidates))
    }

    fn store_release_reserved(&self, id: SectorID) -> Result<bool> {
        wrap(self.sealer.store_release_reserved(id))
    }

    fn store_list(&self) -> Result<Vec<StoreDetailedInfo>> {
        wrap(self.sealer.store_list())
    }

    fn store_basic_info(&self, instance_name: String) -> Result<Option<StoreBasicInfo>> {
        wrap(self.sealer.store_basic_info(&instance_name))
    }

    fn worker_ping(&self, winfo: WorkerInfo) -> Result<()> {
        wrap(self.sealer.worker_ping(winfo))
    }

    fn worker_get_ping_info(&self, name: String) -> Result<Option<WorkerPingInfo>> {
        wrap(self.sealer.worker_get_ping_info(&name))
    }

    fn worker_ping_info_list(&self) -> Result<Vec<WorkerPingInfo>> {
        wrap(self.sealer.worker_ping_info_list())
    }

    fn snapup_pre_fetch(&self, miner: ActorID, deadline: Option<u64>) -> Result<SnapUpFetchResult> {
        wrap(self.sealer.snapup_pre_fetch(miner, deadline))
    }

    fn snapup_candidates(&self, miner: ActorID) -> Result<Vec<BitFieldRuns>> {
        let candidates = wrap(self.sealer.snapup_candidates(miner))?;
        Ok(candidates.into_iter().map(BitFieldRuns).collect())
    }

    fn snapup_allocate(&self, miner: ActorID) -> Result<Option<SectorID>> {
        wrap(self.sealer.snapup_allocate(miner))
    }

    fn snapup_cancel_commitment(&self, id: SectorID) -> Result<()> {
        self.sealer.snapup_cancel_commitment(id);
        Ok(())
    }

    fn proving_sector_info(&self, id: SectorID) -> Result<ProvingSectorInfo> {
        wrap(self.sealer.proving_sector_info(id))
    }

    fn check_provable(
        &self,
        miner: ActorID,
        post_proof: PoStProof,
        sectors: Vec<ExtendedSectorInfo>,
        strict: bool,
    ) -> Result<HashMap<SectorNumber, String>> {
        wrap(self.sealer.check_provable(miner, post_proof, sectors, strict))
    }

    fn simulate_wdpost(
        &self,
        miner: ActorID,
        post_proof: PoStProof,
        sectors: Vec<ExtendedSectorInfo>,
        randomness: B64Vec,
    ) -> Result<()> {
        wrap(self.sealer.simulate_wdpost(miner, post_proof, sectors, randomness.0))
    }

    fn version(&self) -> Result<String> {
        Ok((*crate::version::VERSION).clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use anyhow::anyhow;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::chain::mock::MockChain;
    use crate::errors::{NotFound, Precondition, WaitRetry};
    use crate::metadb::mem::MemMeta;
    use crate::metadb::SharedMetaDB;
    use crate::objstore::StoreManager;
    use crate::prover::UnavailableProver;
    use crate::sealer::SealerModules;
    use crate::sector::{
        RebuildInfoManager, SectorIndexer, SnapUpManager, StateManager, WorkerManager,
    };

    fn handler() -> IoHandler {
        let db: SharedMetaDB = Arc::new(MemMeta::default());
        let chain = Arc::new(MockChain::new(1000, 21));
        let miners = Arc::new(HashMap::new());
        let store_mgr = Arc::new(StoreManager::init(Vec::new()).unwrap());

        let sealer = Sealer::new(SealerModules {
            state: Arc::new(StateManager::new(db.clone())),
            indexer: Arc::new(SectorIndexer::new(db.clone(), store_mgr)),
            rebuild: Arc::new(RebuildInfoManager::new(db.clone())),
            snapup: Arc::new(SnapUpManager::new(db.clone(), chain.clone(), miners.clone())),
            workers: Arc::new(WorkerManager::new(db)),
            chain,
            prover: Arc::new(UnavailableProver),
            miners,
        });

        SealerService::new(Arc::new(sealer)).into_handler()
    }

    fn call(io: &IoHandler, method: &str, params: Value) -> Value {
        let req = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = io.handle_request_sync(&req.to_string()).unwrap();
        serde_json::from_str(&resp).unwrap()
    }

    #[test]
    fn test_error_codes() {
        let cases = vec![
            (anyhow::Error::new(Precondition("bad".to_owned())), ErrorCode::InvalidParams),
            (
                anyhow::Error::new(NotFound("x".to_owned())).context("load"),
                ErrorCode::ServerError(ERR_CODE_NOT_FOUND),
            ),
            (
                anyhow::Error::new(WaitRetry {
                    until: 10,
                    reason: "lookback".to_owned(),
                }),
                ErrorCode::ServerError(ERR_CODE_WAIT_RETRY),
            ),
            (anyhow!("boom"), ErrorCode::InternalError),
        ];

        for (err, code) in cases {
            assert_eq!(rpc_error(err).code, code);
        }

        let err = rpc_error(anyhow::Error::new(NotFound("sector".to_owned())).context("load state"));
        assert_eq!(err.message, "load state: not found: sector");
    }

    #[test]
    fn test_calls() {
        let io = handler();
        let sid = json!({"Miner": 1000, "Number": 1});

        let resp = call(&io, "Venus.FindSector", json!(["online", sid]));
        assert_eq!(resp["result"], Value::Null);
        assert!(resp.get("error").is_none());

        let state = json!({"ID": sid, "SectorType": 8, "AbortReason": "aborted"});
        let resp = call(&io, "Venus.ImportSector", json!(["offline", state, false]));
        assert_eq!(resp["result"], json!(true));

        let resp = call(&io, "Venus.FindSector", json!(["offline", sid]));
        assert_eq!(resp["result"]["AbortReason"], json!("aborted"));

        let resp = call(&io, "Venus.FindSectorsWithDeal", json!(["offline", 0]));
        assert_eq!(resp["error"]["code"], json!(-32602));

        let resp = call(&io, "Venus.RemoveSector", json!([sid]));
        assert_eq!(resp["error"]["code"], json!(ERR_CODE_NOT_FOUND));

        let resp = call(&io, "Venus.WorkerGetPingInfo", json!(["w1"]));
        assert_eq!(resp["result"], Value::Null);

        let resp = call(&io, "Venus.StoreList", json!([]));
        assert_eq!(resp["result"], json!([]));

        let resp = call(&io, "Venus.SnapUpPreFetch", json!([1000]));
        assert_eq!(resp["error"]["code"], json!(-32602));

        let resp = call(&io, "Venus.Version", json!([]));
        assert!(resp["result"].as_str().unwrap().starts_with('v'));
    }
}
