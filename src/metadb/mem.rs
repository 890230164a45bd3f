use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};

use super::{BatchOp, MetaDB, MetaError};

/// in-memory metadb, nothing survives the process
#[derive(Default)]
pub struct MemMeta {
    inner: RwLock<BTreeMap<String, Vec<u8>>>,
}

macro_rules! poisoned {
    () => {
        |_| anyhow!("mem meta lock poisoned")
    };
}

impl MetaDB for MemMeta {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner
            .write()
            .map_err(poisoned!())?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.inner.read().map_err(poisoned!())?.contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, MetaError> {
        self.inner
            .read()
            .map_err(poisoned!())?
            .get(key)
            .cloned()
            .ok_or(MetaError::NotFound)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.write().map_err(poisoned!())?.remove(key);
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned!())?;
        for op in ops {
            match op {
                BatchOp::Put(k, v) => {
                    inner.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    inner.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn scan(
        &self,
        prefix: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<bool>,
    ) -> Result<()> {
        // copy out first so visitors may write back
        let items: Vec<(String, Vec<u8>)> = self
            .inner
            .read()
            .map_err(poisoned!())?
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (k, v) in items {
            if !visit(&k, &v)? {
                break;
            }
        }

        Ok(())
    }
}
