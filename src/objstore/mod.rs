//! abstractions & implementations for object store

use std::error::Error;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::types::{SectorID, StoreBasicInfo};

pub mod filestore;
pub mod mgr;

#[cfg(test)]
pub(crate) mod mock;

pub use filestore::FileStore;
pub use mgr::StoreManager;

/// errors in object storage usage
#[derive(Debug)]
pub enum ObjectStoreError {
    /// io errors
    IO(io::Error),

    /// other errors
    Other(anyhow::Error),
}

impl fmt::Display for ObjectStoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::IO(inner) => write!(f, "obj store io err: {}", inner),
            Self::Other(inner) => write!(f, "obj store err: {}", inner),
        }
    }
}

impl Error for ObjectStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IO(inner) => Some(inner),
            Self::Other(inner) => Some(inner.root_cause()),
        }
    }
}

impl From<io::Error> for ObjectStoreError {
    fn from(val: io::Error) -> ObjectStoreError {
        ObjectStoreError::IO(val)
    }
}

impl From<anyhow::Error> for ObjectStoreError {
    fn from(val: anyhow::Error) -> ObjectStoreError {
        ObjectStoreError::Other(val)
    }
}

/// type alias for Result<T, ObjectStoreError>
pub type ObjResult<T> = Result<T, ObjectStoreError>;

/// logical objects kept in a store
#[derive(Debug, Clone)]
pub enum Resource {
    Sealed(SectorID),
    Update(SectorID),
    Cache(SectorID),
    UpdateCache(SectorID),
    Custom(String),
}

impl Resource {
    /// sealed file of a normal or upgraded sector
    pub fn sealed(sid: SectorID, upgrade: bool) -> Self {
        if upgrade {
            Resource::Update(sid)
        } else {
            Resource::Sealed(sid)
        }
    }

    /// cache dir of a normal or upgraded sector
    pub fn cache(sid: SectorID, upgrade: bool) -> Self {
        if upgrade {
            Resource::UpdateCache(sid)
        } else {
            Resource::Cache(sid)
        }
    }

    /// if the resource is a dir tree
    pub fn is_dir(&self) -> bool {
        matches!(self, Resource::Cache(_) | Resource::UpdateCache(_))
    }

    /// path relative to the root of the store
    pub fn sub_path(&self) -> ObjResult<PathBuf> {
        let p = match self {
            Resource::Sealed(sid) => Path::new("sealed").join(sid.to_string()),
            Resource::Update(sid) => Path::new("update").join(sid.to_string()),
            Resource::Cache(sid) => Path::new("cache").join(sid.to_string()),
            Resource::UpdateCache(sid) => {
                Path::new("update-cache").join(sid.to_string())
            }
            Resource::Custom(key) => {
                let p = PathBuf::from(key);
                if key.is_empty() {
                    return Err(anyhow!("empty custom key").into());
                }

                if key.starts_with('.') {
                    return Err(anyhow!("sub path starts with dot").into());
                }

                if p.is_absolute() {
                    return Err(
                        anyhow!("sub path starts with separator").into()
                    );
                }

                p
            }
        };

        Ok(p)
    }
}

/// capacity of a store instance, zero free means unknown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceInfo {
    #[serde(rename = "Type")]
    pub typ: String,
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub used_percent: f64,
}

/// definition of object store
pub trait ObjectStore: Send + Sync {
    /// instance name of the store
    fn instance(&self) -> String;

    /// if this instance is read-only
    fn readonly(&self) -> bool;

    /// name, root path & labels
    fn basic_info(&self) -> StoreBasicInfo;

    /// capacity of the backing storage
    fn instance_info(&self) -> ObjResult<InstanceInfo>;

    /// absolute location of the given resource
    fn full_path(&self, resource: &Resource) -> ObjResult<PathBuf>;

    /// reader of the given resource
    fn get(&self, resource: &Resource) -> ObjResult<Box<dyn Read + Send>>;

    /// writes the object, returns bytes written
    fn put(&self, resource: &Resource, r: &mut dyn Read) -> ObjResult<u64>;

    /// deletes the object, absent objects are not an error
    fn del(&self, resource: &Resource) -> ObjResult<()>;
}
