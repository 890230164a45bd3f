use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use anyhow::anyhow;

use super::{InstanceInfo, ObjResult, ObjectStore, Resource};
use crate::types::StoreBasicInfo;

/// in-memory store with a tunable free space
pub struct MemStore {
    name: String,
    readonly: bool,
    free: RwLock<u64>,
    objects: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemStore {
    pub fn new(name: &str, readonly: bool, free: u64) -> Self {
        MemStore {
            name: name.to_owned(),
            readonly,
            free: RwLock::new(free),
            objects: Default::default(),
        }
    }

    pub fn set_free(&self, free: u64) {
        *self.free.write().unwrap() = free;
    }

    pub fn contains(&self, resource: &Resource) -> bool {
        let p = resource.sub_path().unwrap();
        self.objects.lock().unwrap().contains_key(&p)
    }

    pub fn insert(&self, resource: &Resource, data: &[u8]) {
        let p = resource.sub_path().unwrap();
        self.objects.lock().unwrap().insert(p, data.to_vec());
    }
}

impl ObjectStore for MemStore {
    fn instance(&self) -> String {
        self.name.clone()
    }

    fn readonly(&self) -> bool {
        self.readonly
    }

    fn basic_info(&self) -> StoreBasicInfo {
        StoreBasicInfo {
            name: self.name.clone(),
            path: format!("/mem/{}", self.name),
            meta: HashMap::new(),
        }
    }

    fn instance_info(&self) -> ObjResult<InstanceInfo> {
        let free = *self.free.read().unwrap();
        Ok(InstanceInfo {
            typ: "mem".to_owned(),
            total: free,
            free,
            used: 0,
            used_percent: 0.0,
        })
    }

    fn full_path(&self, resource: &Resource) -> ObjResult<PathBuf> {
        resource
            .sub_path()
            .map(|p| PathBuf::from(format!("/mem/{}", self.name)).join(p))
    }

    fn get(&self, resource: &Resource) -> ObjResult<Box<dyn Read + Send>> {
        let p = resource.sub_path()?;
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(&p)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn put(&self, resource: &Resource, r: &mut dyn Read) -> ObjResult<u64> {
        if self.readonly {
            return Err(anyhow!("read-only").into());
        }

        let p = resource.sub_path()?;
        let mut data = Vec::new();
        let n = r.read_to_end(&mut data)?;
        self.objects.lock().unwrap().insert(p, data);
        Ok(n as u64)
    }

    fn del(&self, resource: &Resource) -> ObjResult<()> {
        let p = resource.sub_path()?;
        self.objects.lock().unwrap().remove(&p);
        Ok(())
    }
}
