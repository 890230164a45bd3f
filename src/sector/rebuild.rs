//! sectors waiting to be sealed again

use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};

use crate::logging::info;
use crate::metadb::{MetaDocumentDB, PrefixedMetaDB, SharedMetaDB};
use crate::types::{AllocateSectorSpec, SectorID, SectorRebuildInfo};

pub const REBUILD_PREFIX: &str = "rebuild";

pub struct RebuildInfoManager {
    docs: MetaDocumentDB<PrefixedMetaDB<SharedMetaDB>>,
    // allocation is a scan & delete
    alloc: Mutex<()>,
}

impl RebuildInfoManager {
    pub fn new(db: SharedMetaDB) -> Self {
        RebuildInfoManager {
            docs: MetaDocumentDB::wrap(PrefixedMetaDB::wrap(REBUILD_PREFIX, db)),
            alloc: Mutex::new(()),
        }
    }

    pub fn set(&self, sid: SectorID, info: &SectorRebuildInfo) -> Result<()> {
        self.docs
            .set(sid.to_string(), info)
            .with_context(|| format!("set rebuild info for {}", sid))
    }

    pub fn load(&self, sid: SectorID) -> Result<SectorRebuildInfo> {
        self.docs
            .get(sid.to_string())
            .with_context(|| format!("load rebuild info for {}", sid))
    }

    pub fn remove(&self, sid: SectorID) -> Result<()> {
        self.docs
            .remove(sid.to_string())
            .with_context(|| format!("remove rebuild info for {}", sid))
    }

    /// hands out & consumes the first entry matching `spec`
    pub fn allocate(&self, spec: &AllocateSectorSpec) -> Result<Option<SectorRebuildInfo>> {
        let _guard = self
            .alloc
            .lock()
            .map_err(|_| anyhow!("rebuild allocation lock poisoned"))?;

        let mut found = None;
        self.docs.for_each("", |_, info: SectorRebuildInfo| {
            if spec.matches(&info.sector.id, info.sector.proof_type) {
                found = Some(info);
                return Ok(false);
            }

            Ok(true)
        })?;

        if let Some(info) = found.as_ref() {
            self.remove(info.sector.id)?;
            info!(sector = %info.sector.id, "rebuild sector allocated");
        }

        Ok(found)
    }
}
