use anyhow::{Context, Result};
use fil_types::ActorID;
use fvm_ipld_bitfield::BitField;

use super::Sealer;
use crate::types::{SectorID, SnapUpFetchResult};

impl Sealer {
    /// refreshes the candidates of one deadline, or all of them if `deadline` is None
    pub fn snapup_pre_fetch(
        &self,
        miner: ActorID,
        deadline: Option<u64>,
    ) -> Result<SnapUpFetchResult> {
        let (total, diff) = self
            .snapup
            .pre_fetch(miner, deadline)
            .context("prefetch")?;

        Ok(SnapUpFetchResult { total, diff })
    }

    pub fn snapup_candidates(&self, miner: ActorID) -> Result<Vec<BitField>> {
        self.snapup.candidates(miner)
    }

    pub fn snapup_allocate(&self, miner: ActorID) -> Result<Option<SectorID>> {
        self.snapup
            .allocate(miner)
            .with_context(|| format!("allocate snapup sector for {}", miner))
    }

    pub fn snapup_cancel_commitment(&self, sid: SectorID) {
        self.snapup.cancel_commitment(sid)
    }
}
