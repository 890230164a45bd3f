//! where the sealed file & cache dir of each sector are kept

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::metadb::{MetaDocumentDB, PrefixedMetaDB, SharedMetaDB};
use crate::objstore::StoreManager;
use crate::types::{SectorAccessStores, SectorID, SectorIndexType};

pub const INDEXER_PREFIX: &str = "indexer";

/// location index of one sector generation
pub struct TypedIndexer {
    docs: MetaDocumentDB<PrefixedMetaDB<SharedMetaDB>>,
}

impl TypedIndexer {
    fn new(db: SharedMetaDB, typ: SectorIndexType) -> Self {
        let prefix = match typ {
            SectorIndexType::Normal => format!("{}/normal", INDEXER_PREFIX),
            SectorIndexType::Upgrade => format!("{}/upgrade", INDEXER_PREFIX),
        };

        TypedIndexer {
            docs: MetaDocumentDB::wrap(PrefixedMetaDB::wrap(prefix, db)),
        }
    }

    pub fn find(&self, sid: SectorID) -> Result<Option<SectorAccessStores>> {
        self.docs
            .get_opt(sid.to_string())
            .with_context(|| format!("find location of {}", sid))
    }

    pub fn update(&self, sid: SectorID, access: &SectorAccessStores) -> Result<()> {
        self.docs
            .set(sid.to_string(), access)
            .with_context(|| format!("update location of {}", sid))
    }
}

pub struct SectorIndexer {
    normal: TypedIndexer,
    upgrade: TypedIndexer,
    store_mgr: Arc<StoreManager>,
}

impl SectorIndexer {
    pub fn new(db: SharedMetaDB, store_mgr: Arc<StoreManager>) -> Self {
        SectorIndexer {
            normal: TypedIndexer::new(db.clone(), SectorIndexType::Normal),
            upgrade: TypedIndexer::new(db, SectorIndexType::Upgrade),
            store_mgr,
        }
    }

    pub fn normal(&self) -> &TypedIndexer {
        &self.normal
    }

    pub fn upgrade(&self) -> &TypedIndexer {
        &self.upgrade
    }

    pub fn typed(&self, typ: SectorIndexType) -> &TypedIndexer {
        match typ {
            SectorIndexType::Normal => &self.normal,
            SectorIndexType::Upgrade => &self.upgrade,
        }
    }

    pub fn store_mgr(&self) -> &StoreManager {
        &self.store_mgr
    }
}
