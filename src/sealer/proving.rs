use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use fil_types::{ActorID, SectorNumber};
use serde::{Deserialize, Serialize};

use super::Sealer;
use crate::chain::{SectorOnChainInfo, TipSetKey};
use crate::errors::NotFound;
use crate::logging::{info, warn};
use crate::objstore::Resource;
use crate::types::{
    ExtendedSectorInfo, PoStProof, PrivateSectorInfo, SectorID, SectorIndexType,
};

/// files inside a cache dir required by window post
const CACHE_AUX_FILES: [&str; 2] = ["p_aux", "t_aux"];

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ProvingSectorInfo {
    pub on_chain: SectorOnChainInfo,
    pub private: PrivateSectorInfo,
}

fn check_file(p: &Path) -> Result<()> {
    let meta = fs::metadata(p).with_context(|| format!("stat {}", p.display()))?;
    if !meta.is_file() {
        return Err(anyhow!("{} is not a file", p.display()));
    }
    Ok(())
}

fn check_dir(p: &Path) -> Result<()> {
    let meta = fs::metadata(p).with_context(|| format!("stat {}", p.display()))?;
    if !meta.is_dir() {
        return Err(anyhow!("{} is not a dir", p.display()));
    }
    Ok(())
}

impl Sealer {
    fn single_pub_to_private(
        &self,
        miner: ActorID,
        post_proof: PoStProof,
        sector: &ExtendedSectorInfo,
    ) -> Result<PrivateSectorInfo> {
        let sid = SectorID {
            miner,
            number: sector.sector_number,
        };
        let upgrade = sector.sector_key.is_some();

        let accesses = self
            .indexer
            .typed(SectorIndexType::from_upgrade(upgrade))
            .find(sid)?
            .ok_or_else(|| NotFound(format!("location of sector {}", sid)))?;

        let store_mgr = self.indexer.store_mgr();
        let sealed_path = store_mgr
            .get_instance(&accesses.sealed_file)?
            .full_path(&Resource::sealed(sid, upgrade))
            .with_context(|| format!("sealed file path of {}", sid))?;
        let cache_path = store_mgr
            .get_instance(&accesses.cache_dir)?
            .full_path(&Resource::cache(sid, upgrade))
            .with_context(|| format!("cache dir path of {}", sid))?;

        Ok(PrivateSectorInfo {
            sector_id: sid,
            comm_r: sector.sealed_cid.clone(),
            post_proof_type: post_proof,
            cache_dir_path: cache_path.display().to_string(),
            sealed_sector_path: sealed_path.display().to_string(),
            upgrade,
            accesses,
        })
    }

    fn pub_to_private(
        &self,
        miner: ActorID,
        post_proof: PoStProof,
        sectors: &[ExtendedSectorInfo],
    ) -> Result<Vec<PrivateSectorInfo>> {
        sectors
            .iter()
            .map(|s| {
                self.single_pub_to_private(miner, post_proof, s)
                    .with_context(|| format!("construct private info for {}", s.sector_number))
            })
            .collect()
    }

    /// on-chain info & local locations of the sector
    pub fn proving_sector_info(&self, sid: SectorID) -> Result<ProvingSectorInfo> {
        let on_chain = self
            .chain
            .state_sector_get_info(sid.miner, sid.number, &TipSetKey::default())
            .context("get sector info")?
            .ok_or_else(|| NotFound(format!("on-chain info of sector {}", sid)))?;

        let extended = ExtendedSectorInfo {
            seal_proof: on_chain.seal_proof,
            sector_number: on_chain.sector_number,
            sector_key: on_chain.sector_key_cid.clone(),
            sealed_cid: on_chain.sealed_cid.clone(),
        };

        let private = self
            .single_pub_to_private(sid.miner, on_chain.seal_proof.window_post_proof(), &extended)
            .context("get private sector info")?;

        Ok(ProvingSectorInfo { on_chain, private })
    }

    /// reasons of the sectors failing the check, keyed by sector number
    pub fn check_provable(
        &self,
        miner: ActorID,
        post_proof: PoStProof,
        sectors: Vec<ExtendedSectorInfo>,
        strict: bool,
    ) -> Result<HashMap<SectorNumber, String>> {
        let mut bad = HashMap::new();
        for sector in sectors.iter() {
            let checked = self
                .single_pub_to_private(miner, post_proof, sector)
                .and_then(|private| {
                    check_file(Path::new(&private.sealed_sector_path))?;
                    let cache = Path::new(&private.cache_dir_path);
                    check_dir(cache)?;
                    if strict {
                        for name in CACHE_AUX_FILES {
                            check_file(&cache.join(name))?;
                        }
                    }
                    Ok(())
                });

            if let Err(e) = checked {
                bad.insert(sector.sector_number, format!("{:#}", e));
            }
        }

        Ok(bad)
    }

    /// proves in the background, the outcome is only logged
    pub fn simulate_wdpost(
        &self,
        miner: ActorID,
        post_proof: PoStProof,
        sectors: Vec<ExtendedSectorInfo>,
        randomness: Vec<u8>,
    ) -> Result<()> {
        let privates = self
            .pub_to_private(miner, post_proof, &sectors)
            .context("turn public sector infos into private")?;

        let prover = self.prover.clone();
        thread::Builder::new()
            .name(format!("simulate-wdpost-{}", miner))
            .spawn(move || {
                let count = privates.len();
                let start = Instant::now();
                info!(miner, sectors = count, "mock generate window post start");

                match prover.generate_window_post(miner, post_proof, &privates, &randomness) {
                    Ok(out) => info!(
                        miner,
                        sectors = count,
                        elapsed = ?start.elapsed(),
                        proofs = out.proofs.len(),
                        skipped = out.faults.len(),
                        "mock generate window post"
                    ),
                    Err(e) => warn!(miner, sectors = count, "generate window post failed: {:?}", e),
                }
            })
            .context("spawn window post simulation")?;

        Ok(())
    }
}
