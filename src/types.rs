//! shared data types

use std::collections::HashMap;
use std::fmt::Display;

use fil_clock::ChainEpoch;
use fil_types::{ActorID, PaddedPieceSize, SectorNumber};
use forest_cid::json::CidJson;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::b64serde::B64Vec;

pub const SIZE_2K: u64 = 2 << 10;
pub const SIZE_8M: u64 = 8 << 20;
pub const SIZE_512M: u64 = 512 << 20;
pub const SIZE_32G: u64 = 32 << 30;
pub const SIZE_64G: u64 = 64 << 30;

/// type alias for u64
pub type DealID = u64;

/// seal proof types with repr i64
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize_repr, Serialize_repr,
)]
#[repr(i64)]
#[allow(non_camel_case_types)]
pub enum SealProof {
    StackedDrg2KiBV1,
    StackedDrg8MiBV1,
    StackedDrg512MiBV1,
    StackedDrg32GiBV1,
    StackedDrg64GiBV1,

    StackedDrg2KiBV1_1,
    StackedDrg8MiBV1_1,
    StackedDrg512MiBV1_1,
    StackedDrg32GiBV1_1,
    StackedDrg64GiBV1_1,

    StackedDrg2KiBV1_1_Feat_SyntheticPoRep,
    StackedDrg8MiBV1_1_Feat_SyntheticPoRep,
    StackedDrg512MiBV1_1_Feat_SyntheticPoRep,
    StackedDrg32GiBV1_1_Feat_SyntheticPoRep,
    StackedDrg64GiBV1_1_Feat_SyntheticPoRep,

    StackedDrg2KiBV1_2_Feat_NonInteractivePoRep,
    StackedDrg8MiBV1_2_Feat_NonInteractivePoRep,
    StackedDrg512MiBV1_2_Feat_NonInteractivePoRep,
    StackedDrg32GiBV1_2_Feat_NonInteractivePoRep,
    StackedDrg64GiBV1_2_Feat_NonInteractivePoRep,
}

impl SealProof {
    /// returns sector size for the seal proof type
    pub fn sector_size(&self) -> u64 {
        use SealProof::*;
        match self {
            StackedDrg2KiBV1
            | StackedDrg2KiBV1_1
            | StackedDrg2KiBV1_1_Feat_SyntheticPoRep
            | StackedDrg2KiBV1_2_Feat_NonInteractivePoRep => SIZE_2K,

            StackedDrg8MiBV1
            | StackedDrg8MiBV1_1
            | StackedDrg8MiBV1_1_Feat_SyntheticPoRep
            | StackedDrg8MiBV1_2_Feat_NonInteractivePoRep => SIZE_8M,

            StackedDrg512MiBV1
            | StackedDrg512MiBV1_1
            | StackedDrg512MiBV1_1_Feat_SyntheticPoRep
            | StackedDrg512MiBV1_2_Feat_NonInteractivePoRep => SIZE_512M,

            StackedDrg32GiBV1
            | StackedDrg32GiBV1_1
            | StackedDrg32GiBV1_1_Feat_SyntheticPoRep
            | StackedDrg32GiBV1_2_Feat_NonInteractivePoRep => SIZE_32G,

            StackedDrg64GiBV1
            | StackedDrg64GiBV1_1
            | StackedDrg64GiBV1_1_Feat_SyntheticPoRep
            | StackedDrg64GiBV1_2_Feat_NonInteractivePoRep => SIZE_64G,
        }
    }

    /// returns the window post proof type used for sectors of this kind
    pub fn window_post_proof(&self) -> PoStProof {
        match self.sector_size() {
            SIZE_2K => PoStProof::StackedDrgWindow2KiBV1_1,
            SIZE_8M => PoStProof::StackedDrgWindow8MiBV1_1,
            SIZE_512M => PoStProof::StackedDrgWindow512MiBV1_1,
            SIZE_32G => PoStProof::StackedDrgWindow32GiBV1_1,
            _ => PoStProof::StackedDrgWindow64GiBV1_1,
        }
    }
}

/// post proof types with repr i64
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize_repr, Serialize_repr,
)]
#[repr(i64)]
#[allow(non_camel_case_types)]
pub enum PoStProof {
    StackedDrgWinning2KiBV1,
    StackedDrgWinning8MiBV1,
    StackedDrgWinning512MiBV1,
    StackedDrgWinning32GiBV1,
    StackedDrgWinning64GiBV1,

    StackedDrgWindow2KiBV1,
    StackedDrgWindow8MiBV1,
    StackedDrgWindow512MiBV1,
    StackedDrgWindow32GiBV1,
    StackedDrgWindow64GiBV1,

    StackedDrgWindow2KiBV1_1,
    StackedDrgWindow8MiBV1_1,
    StackedDrgWindow512MiBV1_1,
    StackedDrgWindow32GiBV1_1,
    StackedDrgWindow64GiBV1_1,
}

/// contains miner actor id & sector number
#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Hash,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "PascalCase")]
pub struct SectorID {
    /// miner actor id
    pub miner: ActorID,

    /// sector number
    pub number: SectorNumber,
}

impl Display for SectorID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s-t0{}-{}", self.miner, self.number)
    }
}

impl std::fmt::Debug for SectorID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// rules for allocating sector bases
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocateSectorSpec {
    /// specified miner actor ids
    pub allowed_miners: Option<Vec<ActorID>>,

    /// specified seal proof types
    pub allowed_proof_types: Option<Vec<SealProof>>,
}

impl AllocateSectorSpec {
    /// if the given sector matches the rules
    pub fn matches(&self, id: &SectorID, proof_type: SealProof) -> bool {
        if let Some(miners) = self.allowed_miners.as_ref() {
            if !miners.is_empty() && !miners.contains(&id.miner) {
                return false;
            }
        }

        if let Some(types) = self.allowed_proof_types.as_ref() {
            if !types.is_empty() && !types.contains(&proof_type) {
                return false;
            }
        }

        true
    }
}

/// basic infos for a allocated sector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocatedSector {
    /// allocated sector id
    #[serde(rename = "ID")]
    pub id: SectorID,

    /// allocated seal proof type
    pub proof_type: SealProof,
}

/// Piece information for part or a whole file.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct PieceInfo {
    pub size: PaddedPieceSize,
    #[serde(rename = "PieceCID")]
    pub piece_cid: CidJson,
}

/// deal attached to a piece
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DealInfo {
    #[serde(rename = "DealID")]
    pub deal_id: DealID,
    #[serde(rename = "AllocationID")]
    pub allocation_id: u64,
    pub payload_size: u64,
    pub is_builtin_market: bool,
}

/// sector piece info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorPiece {
    pub piece: PieceInfo,
    #[serde(default)]
    pub deal_info: Option<DealInfo>,
}

impl SectorPiece {
    /// the on-chain deal id, if the piece is a deal piece
    pub fn deal_id(&self) -> Option<DealID> {
        self.deal_info
            .as_ref()
            .map(|d| d.deal_id)
            .filter(|id| *id != 0)
    }
}

/// assigned ticket
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Ticket {
    /// raw ticket data
    pub ticket: B64Vec,

    /// chain epoch from which ticket is fetched
    pub epoch: ChainEpoch,
}

/// assigned seed
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Seed {
    /// raw seed data
    pub seed: B64Vec,

    /// chain epoch from which seed is fetched
    pub epoch: ChainEpoch,
}

/// public info of a sector being upgraded
#[derive(Clone, Default, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorPublicInfo {
    pub comm_r: [u8; 32],
    #[serde(rename = "SealedCID")]
    pub sealed_cid: Option<CidJson>,
}

/// results of a finished snap-up upgrade
#[derive(Clone, Default, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorUpgradedInfo {
    pub comm_r: [u8; 32],
    pub comm_d: [u8; 32],
    #[serde(rename = "UnsealedCID")]
    pub unsealed_cid: Option<CidJson>,
    #[serde(rename = "SealedCID")]
    pub sealed_cid: Option<CidJson>,
    pub proof: B64Vec,
}

/// termination progress of a sector, zero heights mean not yet
#[derive(Clone, Default, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorTerminateInfo {
    pub terminate_cid: Option<CidJson>,
    pub terminated_at: ChainEpoch,
    pub added_height: ChainEpoch,
}

/// persisted lifecycle record of a sector
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SectorState {
    #[serde(rename = "ID")]
    pub id: SectorID,
    pub sector_type: SealProof,

    #[serde(default)]
    pub ticket: Option<Ticket>,
    #[serde(default)]
    pub seed: Option<Seed>,
    #[serde(default)]
    pub pieces: Vec<SectorPiece>,

    #[serde(default)]
    pub abort_reason: String,

    #[serde(default)]
    pub imported: bool,
    #[serde(default)]
    pub upgraded: bool,
    #[serde(default)]
    pub need_rebuild: bool,
    #[serde(default)]
    pub removed: bool,

    #[serde(default)]
    pub upgrade_public: Option<SectorPublicInfo>,
    #[serde(default)]
    pub upgraded_info: Option<SectorUpgradedInfo>,

    #[serde(default)]
    pub terminate_info: SectorTerminateInfo,
}

impl SectorState {
    /// an empty record for the given sector
    pub fn new(id: SectorID, sector_type: SealProof) -> Self {
        SectorState {
            id,
            sector_type,
            ticket: None,
            seed: None,
            pieces: Vec::new(),
            abort_reason: String::new(),
            imported: false,
            upgraded: false,
            need_rebuild: false,
            removed: false,
            upgrade_public: None,
            upgraded_info: None,
            terminate_info: SectorTerminateInfo::default(),
        }
    }

    /// deal ids of all deal pieces inside
    pub fn deal_ids(&self) -> Vec<DealID> {
        self.pieces.iter().filter_map(SectorPiece::deal_id).collect()
    }
}

/// visibility of sector states to the sealing workers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorWorkerState {
    Online,
    Offline,
}

impl SectorWorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectorWorkerState::Online => "online",
            SectorWorkerState::Offline => "offline",
        }
    }
}

/// job filters for sector listing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorWorkerJob {
    All,
    Sealing,
    SnapUp,
    Rebuild,
}

impl SectorWorkerJob {
    /// if the state belongs to the job
    pub fn matches(&self, state: &SectorState) -> bool {
        match self {
            SectorWorkerJob::All => true,
            SectorWorkerJob::Sealing => {
                !state.upgraded && !state.need_rebuild
            }
            SectorWorkerJob::SnapUp => state.upgraded,
            SectorWorkerJob::Rebuild => state.need_rebuild,
        }
    }
}

/// which location index a sector lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorIndexType {
    Normal,
    Upgrade,
}

impl SectorIndexType {
    pub fn from_upgrade(upgrade: bool) -> Self {
        if upgrade {
            SectorIndexType::Upgrade
        } else {
            SectorIndexType::Normal
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SectorAccessStores {
    pub sealed_file: String, // name for storage instance
    pub cache_dir: String,
}

impl SectorAccessStores {
    /// both files kept in the same instance
    pub fn single(instance: impl Into<String>) -> Self {
        let instance = instance.into();
        SectorAccessStores {
            sealed_file: instance.clone(),
            cache_dir: instance,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SectorIndexLocation {
    pub found: bool,
    pub instance: Option<SectorAccessStores>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct SectorRebuildInfo {
    pub sector: AllocatedSector,
    pub ticket: Ticket,
    #[serde(default)]
    pub pieces: Vec<SectorPiece>,

    #[serde(rename = "IsSnapUp")]
    pub is_snapup: bool,
    pub upgrade_public: Option<SectorPublicInfo>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RebuildOptions {
    pub pieces_available: bool,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerInfoSummary {
    pub threads: usize,
    pub empty: usize,
    pub paused: usize,
    pub running: usize,
    pub waiting: usize,
    pub errors: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerInfo {
    pub name: String,
    pub dest: String,
    pub version: String,
    pub summary: WorkerInfoSummary,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerPingInfo {
    pub info: WorkerInfo,
    /// unix seconds
    pub last_ping: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StoreBasicInfo {
    pub name: String,
    pub path: String,
    pub meta: HashMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ReservedItem {
    pub by: String,
    /// unix seconds
    pub at: i64,
    pub size: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct StoreDetailedInfo {
    #[serde(flatten)]
    pub basic: StoreBasicInfo,
    #[serde(rename = "Type")]
    pub typ: String,
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub used_percent: f64,
    pub reserved: u64,
    pub reserved_by: Vec<ReservedItem>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SnapUpFetchResult {
    pub total: u64,
    pub diff: u64,
}

/// sector identity as submitted to the proving checks
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ExtendedSectorInfo {
    pub seal_proof: SealProof,
    pub sector_number: SectorNumber,
    pub sector_key: Option<CidJson>,
    #[serde(rename = "SealedCID")]
    pub sealed_cid: CidJson,
}

/// resolved local access info of a sector for proving
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct PrivateSectorInfo {
    #[serde(rename = "SectorID")]
    pub sector_id: SectorID,
    #[serde(rename = "CommR")]
    pub comm_r: CidJson,
    pub post_proof_type: PoStProof,
    pub cache_dir_path: String,
    pub sealed_sector_path: String,
    pub upgrade: bool,
    pub accesses: SectorAccessStores,
}
