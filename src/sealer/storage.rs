use anyhow::{Context, Result};

use super::Sealer;
use crate::errors::{is_not_found, Invariant, NotFound, WaitRetry};
use crate::logging::{debug, info};
use crate::metrics::VIEW;
use crate::objstore::Resource;
use crate::types::{
    SectorAccessStores, SectorID, SectorIndexType, SectorWorkerState, StoreBasicInfo,
    StoreDetailedInfo,
};

/// requester tag of reservations made by sealing jobs
pub const RESERVED_BY_SEALING: &str = "sealing";

impl Sealer {
    /// deletes the cache dir & sealed file of a finalized sector, then marks it removed
    pub fn remove_sector(&self, sid: SectorID) -> Result<()> {
        let state = self
            .state
            .load(sid, SectorWorkerState::Offline)
            .context("load sector state")?;

        if state.removed {
            return Ok(());
        }

        let terminated_at = state.terminate_info.terminated_at;
        if terminated_at > 0 {
            let head = self.chain.chain_head().context("get chain head")?;
            let nv = self
                .chain
                .state_network_version(&head.key)
                .context("get network version")?;

            let lookback = self.chain.winning_post_sector_set_lookback(nv);
            let until = terminated_at.checked_add(lookback).ok_or_else(|| {
                Invariant(format!(
                    "lookback overflows, terminated at {}, lookback {}",
                    terminated_at, lookback
                ))
            })?;

            if head.height < until {
                return Err(WaitRetry {
                    until,
                    reason: "wait for expiration(+winning lookback)".to_owned(),
                }
                .into());
            }
        }

        let upgraded = state.upgraded;
        let access = self
            .indexer
            .typed(SectorIndexType::from_upgrade(upgraded))
            .find(sid)
            .context("find objstore instance")?
            .ok_or_else(|| NotFound(format!("object of sector {}", sid)))?;

        let store_mgr = self.indexer.store_mgr();
        let sealed_store = store_mgr.get_instance(&access.sealed_file).with_context(|| {
            format!("get objstore instance {} for sealed file", access.sealed_file)
        })?;
        let cache_store = store_mgr.get_instance(&access.cache_dir).with_context(|| {
            format!("get objstore instance {} for cache dir", access.cache_dir)
        })?;

        cache_store
            .del(&Resource::cache(sid, upgraded))
            .context("remove cache")?;
        sealed_store
            .del(&Resource::sealed(sid, upgraded))
            .context("remove sealed file")?;

        self.state
            .update(sid, SectorWorkerState::Offline, |st| st.removed = true)
            .context("update sector removed")?;

        VIEW.sector.removed();
        info!(sector = %sid, upgraded, "sector removed");
        Ok(())
    }

    /// all instances with their reservations, ordered by (at, by)
    pub fn store_list(&self) -> Result<Vec<StoreDetailedInfo>> {
        let summaries = self
            .indexer
            .store_mgr()
            .list_instances()
            .context("list instances")?;

        let details = summaries
            .into_iter()
            .map(|summary| {
                let mut reserved_by: Vec<_> =
                    summary.reserved.items.into_iter().map(|(_, item)| item).collect();
                reserved_by.sort_by(|a, b| a.at.cmp(&b.at).then_with(|| a.by.cmp(&b.by)));

                StoreDetailedInfo {
                    basic: summary.basic,
                    typ: summary.info.typ,
                    total: summary.info.total,
                    free: summary.info.free,
                    used: summary.info.used,
                    used_percent: summary.info.used_percent,
                    reserved: summary.reserved.reserved_size,
                    reserved_by,
                }
            })
            .collect();

        Ok(details)
    }

    pub fn store_reserve_space(
        &self,
        sid: SectorID,
        size: u64,
        candidates: Vec<String>,
    ) -> Result<Option<StoreBasicInfo>> {
        self.indexer
            .store_mgr()
            .reserve_space(sid, size, &candidates, RESERVED_BY_SEALING)
            .with_context(|| format!("reserve space for {}", sid))
    }

    pub fn store_release_reserved(&self, sid: SectorID) -> Result<bool> {
        self.indexer
            .store_mgr()
            .release_reserved(sid)
            .context("release reserved")
    }

    /// None for unknown instance
    pub fn store_basic_info(&self, name: &str) -> Result<Option<StoreBasicInfo>> {
        match self.indexer.store_mgr().get_instance(name) {
            Ok(store) => Ok(Some(store.basic_info())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// records where the sealed file & cache dir are persisted
    pub fn submit_persisted_ex(
        &self,
        sid: SectorID,
        instance: String,
        is_upgrade: bool,
    ) -> Result<bool> {
        let store_mgr = self.indexer.store_mgr();
        store_mgr
            .get_instance(&instance)
            .with_context(|| format!("get objstore instance {}", instance))?;

        self.indexer
            .typed(SectorIndexType::from_upgrade(is_upgrade))
            .update(sid, &SectorAccessStores::single(instance.as_str()))?;

        let released = store_mgr.release_reserved(sid)?;
        debug!(sector = %sid, instance = instance.as_str(), is_upgrade, released, "sector persisted");
        Ok(true)
    }
}
