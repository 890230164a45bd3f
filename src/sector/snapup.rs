//! snap-up candidates & in-flight upgrade commitments

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use fil_types::ActorID;
use fvm_ipld_bitfield::BitField;
use serde::{Deserialize, Serialize};

use crate::chain::policy::WPOST_PERIOD_DEADLINES;
use crate::chain::{ChainAPI, SectorOnChainInfo};
use crate::config::MinerConfig;
use crate::errors::Precondition;
use crate::logging::{debug, info, warn};
use crate::metadb::{MetaDocumentDB, PrefixedMetaDB, SharedMetaDB};
use crate::types::SectorID;
use crate::util::unix_now;

pub const SNAPUP_CANDIDATES_PREFIX: &str = "snapup/candidates";
pub const SNAPUP_COMMITMENTS_PREFIX: &str = "snapup/commitments";

/// an upgrade handed out to a worker and not yet landed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapUpCommitment {
    pub sector: SectorID,
    /// unix seconds
    pub allocated_at: i64,
}

pub struct SnapUpManager {
    chain: Arc<dyn ChainAPI>,
    miners: Arc<HashMap<ActorID, MinerConfig>>,
    candidates: MetaDocumentDB<PrefixedMetaDB<SharedMetaDB>>,
    commitments: MetaDocumentDB<PrefixedMetaDB<SharedMetaDB>>,
    // guards read-modify-write of the candidate sets
    lock: Mutex<()>,
}

fn candidates_key(miner: ActorID, deadline: u64) -> String {
    format!("{}/{}", miner, deadline)
}

impl SnapUpManager {
    pub fn new(
        db: SharedMetaDB,
        chain: Arc<dyn ChainAPI>,
        miners: Arc<HashMap<ActorID, MinerConfig>>,
    ) -> Self {
        SnapUpManager {
            chain,
            miners,
            candidates: MetaDocumentDB::wrap(PrefixedMetaDB::wrap(
                SNAPUP_CANDIDATES_PREFIX,
                db.clone(),
            )),
            commitments: MetaDocumentDB::wrap(PrefixedMetaDB::wrap(
                SNAPUP_COMMITMENTS_PREFIX,
                db,
            )),
            lock: Mutex::new(()),
        }
    }

    fn locked(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow!("snapup lock poisoned"))
    }

    fn miner_config(&self, miner: ActorID) -> Result<&MinerConfig> {
        let mcfg = self
            .miners
            .get(&miner)
            .ok_or_else(|| Precondition(format!("miner {} not configured", miner)))?;

        if !mcfg.snapup.enabled {
            return Err(Precondition(format!("snapup disabled for miner {}", miner)).into());
        }

        Ok(mcfg)
    }

    fn load_candidates(&self, miner: ActorID, deadline: u64) -> Result<BitField> {
        self.candidates
            .get_opt(candidates_key(miner, deadline))
            .with_context(|| format!("load candidates of {} in deadline {}", miner, deadline))
            .map(|bf| bf.unwrap_or_default())
    }

    fn save_candidates(&self, miner: ActorID, deadline: u64, bf: &BitField) -> Result<()> {
        let key = candidates_key(miner, deadline);
        if bf.is_empty() {
            return self.candidates.remove(key);
        }

        self.candidates
            .set(key, bf)
            .with_context(|| format!("save candidates of {} in deadline {}", miner, deadline))
    }

    fn committed(&self, sid: &SectorID) -> Result<bool> {
        self.commitments.has(sid.to_string())
    }

    /// refreshes candidates from the chain, returns (total, diff)
    pub fn pre_fetch(&self, miner: ActorID, deadline: Option<u64>) -> Result<(u64, u64)> {
        let min_lifetime = self.miner_config(miner)?.snapup.min_lifetime.unwrap_or(0);

        let deadlines: Vec<u64> = match deadline {
            Some(dl) if dl >= WPOST_PERIOD_DEADLINES => {
                return Err(Precondition(format!("invalid deadline index {}", dl)).into())
            }
            Some(dl) => vec![dl],
            None => (0..WPOST_PERIOD_DEADLINES).collect(),
        };

        let head = self.chain.chain_head().context("get chain head")?;
        let eligible = |s: &SectorOnChainInfo| {
            s.sector_key_cid.is_none()
                && !s.has_deal_weight()
                && s.expiration > head.height.saturating_add(min_lifetime)
        };

        let mut diff = 0u64;
        for dl in deadlines {
            let sectors = self
                .chain
                .state_miner_deadline_sectors(miner, dl, &head.key)
                .with_context(|| format!("get sectors of {} in deadline {}", miner, dl))?;

            let eligible_numbers: Vec<u64> = sectors
                .iter()
                .filter(|s| eligible(s))
                .map(|s| s.sector_number)
                .collect();

            // commitments must be checked under the same lock allocate takes
            let _guard = self.locked()?;
            let mut numbers = Vec::with_capacity(eligible_numbers.len());
            for number in eligible_numbers {
                if !self.committed(&SectorID { miner, number })? {
                    numbers.push(number);
                }
            }

            let fetched = BitField::try_from_bits(numbers)
                .map_err(|e| anyhow!("build candidates bitfield: {:?}", e))?;

            let prev = self.load_candidates(miner, dl)?;
            diff += fetched.iter().filter(|n| !prev.get(*n)).count() as u64;
            self.save_candidates(miner, dl, &fetched)?;
        }

        let total = self
            .candidates(miner)?
            .iter()
            .map(|bf| bf.len())
            .sum();

        info!(miner, total, diff, "snapup candidates fetched");
        Ok((total, diff))
    }

    /// candidate sets of all deadlines, indexed by deadline
    pub fn candidates(&self, miner: ActorID) -> Result<Vec<BitField>> {
        let mut all = Vec::with_capacity(WPOST_PERIOD_DEADLINES as usize);
        for dl in 0..WPOST_PERIOD_DEADLINES {
            all.push(self.load_candidates(miner, dl)?);
        }

        Ok(all)
    }

    /// takes one candidate & records a commitment for it
    pub fn allocate(&self, miner: ActorID) -> Result<Option<SectorID>> {
        self.miner_config(miner)?;

        let _guard = self.locked()?;
        for dl in 0..WPOST_PERIOD_DEADLINES {
            let mut bf = self.load_candidates(miner, dl)?;
            let number = match bf.first() {
                Some(n) => n,
                None => continue,
            };

            bf.unset(number);
            self.save_candidates(miner, dl, &bf)?;

            let sid = SectorID { miner, number };
            let commitment = SnapUpCommitment {
                sector: sid,
                allocated_at: unix_now()?,
            };
            self.commitments
                .set(sid.to_string(), &commitment)
                .with_context(|| format!("record commitment of {}", sid))?;

            debug!(sector = %sid, deadline = dl, "snapup candidate allocated");
            return Ok(Some(sid));
        }

        Ok(None)
    }

    /// best-effort, failures are only logged
    pub fn cancel_commitment(&self, sid: SectorID) {
        if let Err(e) = self.commitments.remove(sid.to_string()) {
            warn!(sector = %sid, "cancel snapup commitment: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Weak};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::chain::mock::{on_chain, MockChain};
    use crate::config::SnapUpConfig;
    use crate::errors::{kind, ErrorKind};
    use crate::metadb::mem::MemMeta;
    use crate::metadb::{BatchOp, MetaDB, MetaError};

    const MINER: ActorID = 1000;

    /// once armed, the first commitment lookup races an allocation against the caller
    #[derive(Default)]
    struct RacingMeta {
        inner: MemMeta,
        armed: AtomicBool,
        mgr: Mutex<Weak<SnapUpManager>>,
        racer: Mutex<Option<JoinHandle<Option<SectorID>>>>,
    }

    impl RacingMeta {
        fn race(&self) {
            let mgr = match self.mgr.lock().unwrap().upgrade() {
                Some(m) => m,
                None => return,
            };

            let handle = thread::spawn(move || mgr.allocate(MINER).unwrap());
            // long enough for the allocation to finish if nothing holds it back
            thread::sleep(Duration::from_millis(200));
            *self.racer.lock().unwrap() = Some(handle);
        }

        fn join_racer(&self) -> Option<SectorID> {
            self.racer.lock().unwrap().take().unwrap().join().unwrap()
        }
    }

    impl MetaDB for RacingMeta {
        fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            self.inner.set(key, value)
        }

        fn has(&self, key: &str) -> Result<bool> {
            let found = self.inner.has(key)?;
            if key.starts_with(SNAPUP_COMMITMENTS_PREFIX) && self.armed.swap(false, Ordering::SeqCst) {
                self.race();
            }
            Ok(found)
        }

        fn get(&self, key: &str) -> Result<Vec<u8>, MetaError> {
            self.inner.get(key)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }

        fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
            self.inner.write_batch(ops)
        }

        fn scan(
            &self,
            prefix: &str,
            visit: &mut dyn FnMut(&str, &[u8]) -> Result<bool>,
        ) -> Result<()> {
            self.inner.scan(prefix, visit)
        }
    }

    fn miners() -> Arc<HashMap<ActorID, MinerConfig>> {
        let mut miners = HashMap::new();
        miners.insert(
            MINER,
            MinerConfig {
                actor: MINER,
                snapup: SnapUpConfig {
                    enabled: true,
                    min_lifetime: Some(1000),
                },
            },
        );

        Arc::new(miners)
    }

    fn setup(chain: Arc<MockChain>) -> SnapUpManager {
        SnapUpManager::new(Arc::new(MemMeta::default()), chain, miners())
    }

    #[test]
    fn test_pre_fetch_and_allocate() {
        let chain = Arc::new(MockChain::new(5000, 21));
        chain.add_sector(MINER, on_chain(1, 100_000, false));
        chain.add_sector(MINER, on_chain(2, 100_000, true)); // already upgraded
        chain.add_sector(MINER, on_chain(3, 5500, false)); // expires too soon
        let mut dealt = on_chain(4, 100_000, false);
        dealt.deal_weight = "34359738368".to_owned();
        chain.add_sector(MINER, dealt);
        chain.add_sector(MINER, on_chain(5, 100_000, false));
        chain.set_deadline(MINER, 0, vec![1, 2, 3, 4]);
        chain.set_deadline(MINER, 7, vec![5]);

        let mgr = setup(chain.clone());

        assert_eq!(mgr.pre_fetch(MINER, Some(0)).unwrap(), (1, 1));
        assert_eq!(mgr.pre_fetch(MINER, None).unwrap(), (2, 1));
        assert_eq!(mgr.pre_fetch(MINER, None).unwrap(), (2, 0));

        let candidates = mgr.candidates(MINER).unwrap();
        assert_eq!(candidates.len(), 48);
        assert!(candidates[0].get(1));
        assert!(candidates[7].get(5));

        let sid = mgr.allocate(MINER).unwrap().unwrap();
        assert_eq!(sid.number, 1);

        // committed sectors are not handed out again
        assert_eq!(mgr.pre_fetch(MINER, Some(0)).unwrap(), (1, 0));
        assert_eq!(mgr.allocate(MINER).unwrap().map(|s| s.number), Some(5));
        assert!(mgr.allocate(MINER).unwrap().is_none());

        mgr.cancel_commitment(sid);
        // cancelling twice is harmless
        mgr.cancel_commitment(sid);
        assert_eq!(mgr.pre_fetch(MINER, Some(0)).unwrap(), (1, 1));
    }

    #[test]
    fn test_unconfigured_miner() {
        let mgr = setup(Arc::new(MockChain::new(0, 21)));
        let err = mgr.pre_fetch(1001, None).unwrap_err();
        assert_eq!(kind(&err), ErrorKind::Precondition);

        let err = mgr.pre_fetch(MINER, Some(48)).unwrap_err();
        assert_eq!(kind(&err), ErrorKind::Precondition);
    }

    #[test]
    fn test_allocation_during_pre_fetch() {
        let chain = Arc::new(MockChain::new(5000, 21));
        chain.add_sector(MINER, on_chain(1, 100_000, false));
        chain.set_deadline(MINER, 0, vec![1]);

        let db = Arc::new(RacingMeta::default());
        let mgr = Arc::new(SnapUpManager::new(db.clone(), chain, miners()));
        *db.mgr.lock().unwrap() = Arc::downgrade(&mgr);

        assert_eq!(mgr.pre_fetch(MINER, Some(0)).unwrap(), (1, 1));

        db.armed.store(true, Ordering::SeqCst);
        mgr.pre_fetch(MINER, Some(0)).unwrap();

        let raced = db.join_racer();
        assert_eq!(raced.map(|s| s.number), Some(1));

        // the sector handed out by the racing allocation is not a candidate anymore
        assert!(mgr.allocate(MINER).unwrap().is_none());
        assert!(mgr.candidates(MINER).unwrap()[0].is_empty());
    }
}
