//! manages all persist store instances & their space reservations

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rand::{rngs::OsRng, seq::SliceRandom};

use super::{InstanceInfo, ObjectStore};
use crate::errors::{self, ErrorKind, Invariant, NotFound, Precondition};
use crate::logging::{debug, warn};
use crate::types::{ReservedItem, SectorID, StoreBasicInfo};
use crate::util::unix_now;

/// pending space claims of one instance
#[derive(Debug, Clone, Default)]
pub struct StoreReserved {
    /// sum of all reserved sizes
    pub reserved_size: u64,
    pub items: Vec<(SectorID, ReservedItem)>,
}

impl StoreReserved {
    fn position(&self, sid: &SectorID, by: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|(s, item)| s == sid && item.by == by)
    }
}

/// point-in-time view of an instance
#[derive(Debug, Clone)]
pub struct StoreInstanceSummary {
    pub basic: StoreBasicInfo,
    pub info: InstanceInfo,
    pub reserved: StoreReserved,
}

struct Instance {
    store: Arc<dyn ObjectStore>,
    reserved: Mutex<StoreReserved>,
}

impl Instance {
    fn reserved(&self) -> Result<MutexGuard<'_, StoreReserved>> {
        self.reserved
            .lock()
            .map_err(|_| anyhow!("reservation lock of {} poisoned", self.store.instance()))
    }
}

/// manages all persist store instances
pub struct StoreManager {
    instances: Vec<Instance>,
    by_name: HashMap<String, usize>,
}

impl StoreManager {
    /// init StoreManager with given stores
    pub fn init(stores: Vec<Arc<dyn ObjectStore>>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(stores.len());
        let mut instances = Vec::with_capacity(stores.len());
        for (idx, store) in stores.into_iter().enumerate() {
            if by_name.insert(store.instance(), idx).is_some() {
                return Err(anyhow!(
                    "duplicate instance name {}",
                    store.instance()
                ));
            }

            instances.push(Instance {
                store,
                reserved: Mutex::new(StoreReserved::default()),
            });
        }

        Ok(StoreManager { instances, by_name })
    }

    fn instance(&self, name: &str) -> Result<&Instance> {
        self.by_name
            .get(name)
            .and_then(|idx| self.instances.get(*idx))
            .ok_or_else(|| NotFound(format!("store instance {}", name)).into())
    }

    /// get a named store instance
    pub fn get_instance(&self, name: &str) -> Result<Arc<dyn ObjectStore>> {
        self.instance(name).map(|ins| ins.store.clone())
    }

    /// snapshots of all instances, with reservations copied out
    pub fn list_instances(&self) -> Result<Vec<StoreInstanceSummary>> {
        let mut summaries = Vec::with_capacity(self.instances.len());
        for ins in self.instances.iter() {
            let info = ins.store.instance_info().with_context(|| {
                format!("get instance info of {}", ins.store.instance())
            })?;
            let reserved = ins.reserved()?.clone();
            summaries.push(StoreInstanceSummary {
                basic: ins.store.basic_info(),
                info,
                reserved,
            });
        }

        Ok(summaries)
    }

    /// claims `size` bytes on the named instance for the sector.
    /// an existing claim with the same requester is superseded.
    pub fn reserve(
        &self,
        name: &str,
        sid: SectorID,
        by: &str,
        size: u64,
    ) -> Result<()> {
        let ins = self.instance(name)?;
        if ins.store.readonly() {
            return Err(Precondition(format!("store {} is read-only", name)).into());
        }

        let info = ins
            .store
            .instance_info()
            .with_context(|| format!("get instance info of {}", name))?;

        let at = unix_now()?;
        let mut reserved = ins.reserved()?;
        let prev = reserved.position(&sid, by).map(|idx| reserved.items.remove(idx));
        let base = match prev.as_ref() {
            Some((_, item)) => reserved.reserved_size.checked_sub(item.size).ok_or_else(|| {
                Invariant(format!("reserved size of {} underflow", name))
            })?,
            None => reserved.reserved_size,
        };

        // zero free means the capacity is unknown
        if info.free != 0 && info.free.saturating_sub(base) < size {
            if let Some(item) = prev {
                reserved.items.push(item);
            }

            return Err(Precondition(format!(
                "insufficient space in {}: free {}, reserved {}, required {}",
                name, info.free, base, size
            ))
            .into());
        }

        reserved.reserved_size = base
            .checked_add(size)
            .ok_or_else(|| Invariant(format!("reserved size of {} overflow", name)))?;
        reserved.items.push((
            sid,
            ReservedItem {
                by: by.to_owned(),
                at,
                size,
            },
        ));

        debug!(instance = name, sector = %sid, size, "space reserved");
        Ok(())
    }

    /// picks one of the candidate instances weighted by available space
    /// and reserves on it, returns None if no candidate has enough space
    pub fn reserve_space(
        &self,
        sid: SectorID,
        size: u64,
        candidates: &[String],
        by: &str,
    ) -> Result<Option<StoreBasicInfo>> {
        let mut weighted = Vec::new();
        for ins in self.instances.iter() {
            let name = ins.store.instance();
            if !candidates.is_empty() && !candidates.contains(&name) {
                continue;
            }

            if ins.store.readonly() {
                continue;
            }

            let free = match ins.store.instance_info() {
                Ok(info) => info.free,
                Err(e) => {
                    warn!("get instance info of {}: {:?}", name, e);
                    continue;
                }
            };

            let weight = if free == 0 {
                1
            } else {
                let reserved = ins.reserved()?.reserved_size;
                match free.checked_sub(reserved) {
                    Some(avail) if avail >= size => avail.max(1),
                    _ => continue,
                }
            };

            weighted.push((ins, weight));
        }

        while !weighted.is_empty() {
            let picked = match weighted.choose_weighted(&mut OsRng, |ins| ins.1) {
                Ok(ins) => ins.0.store.instance(),
                Err(e) => {
                    warn!("failed to get one instance from candidates: {:?}", e);
                    return Ok(None);
                }
            };

            match self.reserve(&picked, sid, by, size) {
                Ok(()) => {
                    let space = byte_unit::Byte::from(size).get_appropriate_unit(true);
                    debug!(reserved = %space.to_string(), instance = %picked, "store selected");
                    return self.get_instance(&picked).map(|s| Some(s.basic_info()));
                }

                Err(e) if errors::kind(&e) == ErrorKind::Precondition => {
                    // lost a race with another reservation
                    debug!("reserve on {}: {}", picked, e);
                    weighted.retain(|ins| ins.0.store.instance() != picked);
                }

                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// drops all claims of the sector, returns if anything was released
    pub fn release_reserved(&self, sid: SectorID) -> Result<bool> {
        let mut released = false;
        for ins in self.instances.iter() {
            let mut reserved = ins.reserved()?;
            let before = reserved.items.len();
            let mut freed = 0u64;
            reserved.items.retain(|(s, item)| {
                if *s == sid {
                    freed += item.size;
                    false
                } else {
                    true
                }
            });

            if reserved.items.len() == before {
                continue;
            }

            reserved.reserved_size =
                reserved.reserved_size.checked_sub(freed).ok_or_else(|| {
                    Invariant(format!(
                        "reserved size of {} underflow",
                        ins.store.instance()
                    ))
                })?;
            released = true;
        }

        Ok(released)
    }
}
