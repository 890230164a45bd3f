use anyhow::{Context, Result};

use super::Sealer;
use crate::chain::TipSetKey;
use crate::errors::{Invariant, Precondition};
use crate::logging::{error, info};
use crate::types::{
    AllocateSectorSpec, AllocatedSector, RebuildOptions, SectorID, SectorRebuildInfo, SectorState,
};

fn reject(msg: &str) -> anyhow::Error {
    Precondition(msg.to_owned()).into()
}

impl Sealer {
    /// flags a finalized sector for rebuilding & records what the rebuild needs
    pub fn sector_set_for_rebuild(&self, sid: SectorID, opt: RebuildOptions) -> Result<bool> {
        self.miner_config(sid.miner)?;

        let sset = self
            .chain
            .state_miner_sectors(sid.miner, &[sid.number], &TipSetKey::default())
            .context("get miner sector info")?;

        // more than one match is not expected either, only the first is used
        let on_chain = sset
            .first()
            .ok_or_else(|| reject("no available sector info"))?;
        let is_snapup = on_chain.sector_key_cid.is_some();

        let mut built = None;
        let mut check = |st: &mut SectorState| -> Result<bool> {
            if st.imported && !st.deal_ids().is_empty() && !opt.pieces_available {
                let upgraded_proof = st
                    .upgraded_info
                    .as_ref()
                    .map(|u| !u.proof.is_empty())
                    .unwrap_or(false);

                if !is_snapup || !upgraded_proof {
                    return Err(reject("sector with unavailable deal pieces"));
                }
            }

            let ticket = match st.ticket.as_ref() {
                Some(t) if !t.ticket.is_empty() => t.clone(),
                _ => return Err(reject("invalid ticket info")),
            };

            if (is_snapup || st.upgraded) && st.upgrade_public.is_none() {
                return Err(reject("unavailable upgrade public info"));
            }

            built = Some(SectorRebuildInfo {
                sector: AllocatedSector {
                    id: st.id,
                    proof_type: st.sector_type,
                },
                ticket,
                pieces: st.pieces.clone(),
                is_snapup,
                upgrade_public: st.upgrade_public.clone(),
            });

            st.need_rebuild = true;
            Ok(true)
        };

        self.state
            .restore(sid, Some(&mut check))
            .context("restore sector state")?;

        let info = built
            .ok_or_else(|| Invariant(format!("rebuild info of {} not built", sid)))?;

        if let Err(e) = self.rebuild.set(sid, &info) {
            if let Err(ferr) = self.state.finalize(sid, None) {
                error!(sector = %sid, "finalize sector on failure of rebuild setup: {:?}", ferr);
            }

            return Err(e.context("set rebuild info"));
        }

        info!(sector = %sid, is_snapup, "sector set for rebuild");
        Ok(true)
    }

    /// hands out the first pending rebuild matching `spec`
    pub fn allocate_rebuild_sector(
        &self,
        spec: AllocateSectorSpec,
    ) -> Result<Option<SectorRebuildInfo>> {
        self.rebuild
            .allocate(&spec)
            .context("allocate rebuild sector")
    }
}
