use std::collections::HashMap;

use fil_types::{ActorID, SectorNumber};
use jsonrpc_core::Result;
use jsonrpc_derive::rpc;

use crate::b64serde::B64Vec;
use crate::chain::BitFieldRuns;
use crate::sealer::ProvingSectorInfo;
use crate::types::{
    AllocateSectorSpec, DealID, ExtendedSectorInfo, PoStProof, RebuildOptions, SectorID,
    SectorIndexLocation, SectorIndexType, SectorRebuildInfo, SectorState, SectorWorkerJob,
    SectorWorkerState, SnapUpFetchResult, StoreBasicInfo, StoreDetailedInfo, WorkerInfo,
    WorkerPingInfo,
};

#[rpc(server)]
/// api defs
pub trait SealerAPI {
    /// sectors of the scope matching the job filter
    #[rpc(name = "Venus.ListSectors")]
    fn list_sectors(&self, ws: SectorWorkerState, job: SectorWorkerJob) -> Result<Vec<SectorState>>;

    /// None if absent in the scope
    #[rpc(name = "Venus.FindSector")]
    fn find_sector(&self, ws: SectorWorkerState, id: SectorID) -> Result<Option<SectorState>>;

    #[rpc(name = "Venus.FindSectorsWithDeal")]
    fn find_sectors_with_deal(&self, ws: SectorWorkerState, deal_id: DealID) -> Result<Vec<SectorState>>;

    #[rpc(name = "Venus.ImportSector")]
    fn import_sector(
        &self,
        ws: SectorWorkerState,
        state: Option<SectorState>,
        override_existing: bool,
    ) -> Result<bool>;

    #[rpc(name = "Venus.RestoreSector")]
    fn restore_sector(&self, id: SectorID, forced: bool) -> Result<()>;

    #[rpc(name = "Venus.RemoveSector")]
    fn remove_sector(&self, id: SectorID) -> Result<()>;

    #[rpc(name = "Venus.ReportFinalized")]
    fn report_finalized(&self, id: SectorID) -> Result<()>;

    #[rpc(name = "Venus.ReportAborted")]
    fn report_aborted(&self, id: SectorID, reason: String) -> Result<()>;

    #[rpc(name = "Venus.SectorSetForRebuild")]
    fn sector_set_for_rebuild(&self, id: SectorID, opt: RebuildOptions) -> Result<bool>;

    #[rpc(name = "Venus.AllocateRebuildSector")]
    fn allocate_rebuild_sector(&self, spec: AllocateSectorSpec) -> Result<Option<SectorRebuildInfo>>;

    #[rpc(name = "Venus.SectorIndexerFind")]
    fn sector_indexer_find(&self, typ: SectorIndexType, id: SectorID) -> Result<SectorIndexLocation>;

    #[rpc(name = "Venus.SubmitPersistedEx")]
    fn submit_persisted_ex(&self, id: SectorID, instance: String, is_upgrade: bool) -> Result<bool>;

    #[rpc(name = "Venus.StoreReserveSpace")]
    fn store_reserve_space(
        &self,
        id: SectorID,
        size: u64,
        candidates: Vec<String>,
    ) -> Result<Option<StoreBasicInfo>>;

    #[rpc(name = "Venus.StoreReleaseReserved")]
    fn store_release_reserved(&self, id: SectorID) -> Result<bool>;

    #[rpc(name = "Venus.StoreList")]
    fn store_list(&self) -> Result<Vec<StoreDetailedInfo>>;

    #[rpc(name = "Venus.StoreBasicInfo")]
    fn store_basic_info(&self, instance_name: String) -> Result<Option<StoreBasicInfo>>;

    #[rpc(name = "Venus.WorkerPing")]
    fn worker_ping(&self, winfo: WorkerInfo) -> Result<()>;

    #[rpc(name = "Venus.WorkerGetPingInfo")]
    fn worker_get_ping_info(&self, name: String) -> Result<Option<WorkerPingInfo>>;

    #[rpc(name = "Venus.WorkerPingInfoList")]
    fn worker_ping_info_list(&self) -> Result<Vec<WorkerPingInfo>>;

    /// refresh snap-up candidates of one or all deadlines
    #[rpc(name = "Venus.SnapUpPreFetch")]
    fn snapup_pre_fetch(&self, miner: ActorID, deadline: Option<u64>) -> Result<SnapUpFetchResult>;

    /// RLE+ runs of the candidate set of each deadline
    #[rpc(name = "Venus.SnapUpCandidates")]
    fn snapup_candidates(&self, miner: ActorID) -> Result<Vec<BitFieldRuns>>;

    #[rpc(name = "Venus.SnapUpAllocate")]
    fn snapup_allocate(&self, miner: ActorID) -> Result<Option<SectorID>>;

    #[rpc(name = "Venus.SnapUpCancelCommitment")]
    fn snapup_cancel_commitment(&self, id: SectorID) -> Result<()>;

    #[rpc(name = "Venus.ProvingSectorInfo")]
    fn proving_sector_info(&self, id: SectorID) -> Result<ProvingSectorInfo>;

    #[rpc(name = "Venus.CheckProvable")]
    fn check_provable(
        &self,
        miner: ActorID,
        post_proof: PoStProof,
        sectors: Vec<ExtendedSectorInfo>,
        strict: bool,
    ) -> Result<HashMap<SectorNumber, String>>;

    /// returns once the job is started, the proving outcome only goes to the log
    #[rpc(name = "Venus.SimulateWdPoSt")]
    fn simulate_wdpost(
        &self,
        miner: ActorID,
        post_proof: PoStProof,
        sectors: Vec<ExtendedSectorInfo>,
        randomness: B64Vec,
    ) -> Result<()>;

    /// get version of the manager
    #[rpc(name = "Venus.Version")]
    fn version(&self) -> Result<String>;
}
