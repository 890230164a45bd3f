use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use fil_clock::ChainEpoch;
use fil_types::{ActorID, SectorNumber};
use forest_cid::json::CidJson;
use forest_cid::Cid;

use super::{ChainAPI, ChainHead, MarketAPI, NetworkVersion, SectorOnChainInfo, TipSetKey};
use crate::types::SealProof;

pub const SEALED_CID: &str = "baga6ea4seaqdb5jftgpyv2rsxatevpzfb5i5747roq57jb2n3mnkjmz3etcreda";
pub const SECTOR_KEY_CID: &str = "baga6ea4seaqhw7mv6ezdt3plvh254sqbagyzabkemlbhwvqsl4o4xksceeb4uoa";

pub fn cid(raw: &str) -> CidJson {
    CidJson(Cid::from_str(raw).unwrap())
}

pub fn on_chain(number: SectorNumber, expiration: ChainEpoch, sector_key: bool) -> SectorOnChainInfo {
    SectorOnChainInfo {
        sector_number: number,
        seal_proof: SealProof::StackedDrg32GiBV1_1,
        sealed_cid: cid(SEALED_CID),
        deal_ids: None,
        activation: 10,
        expiration,
        deal_weight: "0".to_owned(),
        verified_deal_weight: "0".to_owned(),
        sector_key_cid: if sector_key { Some(cid(SECTOR_KEY_CID)) } else { None },
    }
}

/// chain state held in memory
#[derive(Default)]
pub struct MockChain {
    pub height: RwLock<ChainEpoch>,
    pub network_version: RwLock<NetworkVersion>,
    // miner -> sector records, duplicates allowed
    pub sectors: RwLock<HashMap<ActorID, Vec<SectorOnChainInfo>>>,
    // (miner, deadline) -> sector numbers
    pub deadlines: RwLock<HashMap<(ActorID, u64), Vec<SectorNumber>>>,
}

impl MockChain {
    pub fn new(height: ChainEpoch, network_version: NetworkVersion) -> Self {
        MockChain {
            height: RwLock::new(height),
            network_version: RwLock::new(network_version),
            ..Default::default()
        }
    }

    pub fn add_sector(&self, miner: ActorID, info: SectorOnChainInfo) {
        self.sectors.write().unwrap().entry(miner).or_default().push(info);
    }

    pub fn set_deadline(&self, miner: ActorID, deadline: u64, numbers: Vec<SectorNumber>) {
        self.deadlines.write().unwrap().insert((miner, deadline), numbers);
    }
}

impl ChainAPI for MockChain {
    fn chain_head(&self) -> Result<ChainHead> {
        Ok(ChainHead {
            key: TipSetKey(vec![cid(SEALED_CID)]),
            height: *self.height.read().unwrap(),
        })
    }

    fn state_network_version(&self, _tsk: &TipSetKey) -> Result<NetworkVersion> {
        Ok(*self.network_version.read().unwrap())
    }

    fn state_miner_sectors(
        &self,
        miner: ActorID,
        numbers: &[SectorNumber],
        _tsk: &TipSetKey,
    ) -> Result<Vec<SectorOnChainInfo>> {
        let sectors = self.sectors.read().unwrap();
        let all = sectors.get(&miner).cloned().unwrap_or_default();
        Ok(all
            .into_iter()
            .filter(|s| numbers.is_empty() || numbers.contains(&s.sector_number))
            .collect())
    }

    fn state_sector_get_info(
        &self,
        miner: ActorID,
        number: SectorNumber,
        tsk: &TipSetKey,
    ) -> Result<Option<SectorOnChainInfo>> {
        Ok(self.state_miner_sectors(miner, &[number], tsk)?.into_iter().next())
    }

    fn state_miner_deadline_sectors(
        &self,
        miner: ActorID,
        deadline: u64,
        tsk: &TipSetKey,
    ) -> Result<Vec<SectorOnChainInfo>> {
        let numbers = self
            .deadlines
            .read()
            .unwrap()
            .get(&(miner, deadline))
            .cloned()
            .unwrap_or_default();
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        self.state_miner_sectors(miner, &numbers, tsk)
    }
}

pub struct MockMarket;

impl MarketAPI for MockMarket {
    fn piece_resource_url(&self, piece: &Cid) -> String {
        format!("http://market.local/resource?resource-id={}", piece)
    }
}

/// a chain that fails every query
pub struct BrokenChain;

impl ChainAPI for BrokenChain {
    fn chain_head(&self) -> Result<ChainHead> {
        Err(anyhow!("chain unavailable"))
    }

    fn state_network_version(&self, _tsk: &TipSetKey) -> Result<NetworkVersion> {
        Err(anyhow!("chain unavailable"))
    }

    fn state_miner_sectors(
        &self,
        _miner: ActorID,
        _numbers: &[SectorNumber],
        _tsk: &TipSetKey,
    ) -> Result<Vec<SectorOnChainInfo>> {
        Err(anyhow!("chain unavailable"))
    }

    fn state_sector_get_info(
        &self,
        _miner: ActorID,
        _number: SectorNumber,
        _tsk: &TipSetKey,
    ) -> Result<Option<SectorOnChainInfo>> {
        Err(anyhow!("chain unavailable"))
    }

    fn state_miner_deadline_sectors(
        &self,
        _miner: ActorID,
        _deadline: u64,
        _tsk: &TipSetKey,
    ) -> Result<Vec<SectorOnChainInfo>> {
        Err(anyhow!("chain unavailable"))
    }
}
