//! last known pings of sealing workers

use anyhow::{Context, Result};

use crate::metadb::{MetaDocumentDB, PrefixedMetaDB, SharedMetaDB};
use crate::types::WorkerPingInfo;

pub const WORKER_PREFIX: &str = "worker";

pub struct WorkerManager {
    docs: MetaDocumentDB<PrefixedMetaDB<SharedMetaDB>>,
}

impl WorkerManager {
    pub fn new(db: SharedMetaDB) -> Self {
        WorkerManager {
            docs: MetaDocumentDB::wrap(PrefixedMetaDB::wrap(WORKER_PREFIX, db)),
        }
    }

    /// overwrites the previous ping of the same worker
    pub fn update(&self, ping: &WorkerPingInfo) -> Result<()> {
        self.docs
            .set(&ping.info.name, ping)
            .with_context(|| format!("update ping info of {}", ping.info.name))
    }

    pub fn load(&self, name: &str) -> Result<WorkerPingInfo> {
        self.docs
            .get(name)
            .with_context(|| format!("load ping info of {}", name))
    }

    pub fn all<F>(&self, mut filter: F) -> Result<Vec<WorkerPingInfo>>
    where
        F: FnMut(&WorkerPingInfo) -> bool,
    {
        let mut pings = Vec::new();
        self.docs.for_each("", |_, ping: WorkerPingInfo| {
            if filter(&ping) {
                pings.push(ping);
            }
            Ok(true)
        })?;
        Ok(pings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::errors::is_not_found;
    use crate::metadb::mem::MemMeta;
    use crate::types::{WorkerInfo, WorkerInfoSummary};

    fn ping(name: &str, last_ping: i64) -> WorkerPingInfo {
        WorkerPingInfo {
            info: WorkerInfo {
                name: name.to_owned(),
                dest: "127.0.0.1:17890".to_owned(),
                version: "v0.12.0".to_owned(),
                summary: WorkerInfoSummary::default(),
            },
            last_ping,
        }
    }

    #[test]
    fn test_ping_overwrites() {
        let mgr = WorkerManager::new(Arc::new(MemMeta::default()));
        assert!(is_not_found(&mgr.load("w1").unwrap_err()));

        mgr.update(&ping("w1", 10)).unwrap();
        mgr.update(&ping("w1", 20)).unwrap();
        mgr.update(&ping("w2", 15)).unwrap();

        assert_eq!(mgr.load("w1").unwrap().last_ping, 20);
        assert_eq!(mgr.all(|_| true).unwrap().len(), 2);
        assert_eq!(mgr.all(|p| p.last_ping > 16).unwrap().len(), 1);
    }
}
