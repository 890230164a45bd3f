use std::path::Path;

use anyhow::{Context, Error, Result};
use rocksdb::{Direction, IteratorMode, WriteBatch, DB};

use super::{BatchOp, MetaDB, MetaError};

pub struct RocksMeta {
    inner: DB,
}

impl RocksMeta {
    pub fn open<P: AsRef<Path>>(p: P) -> Result<Self> {
        let inner = DB::open_default(p.as_ref())
            .with_context(|| format!("open rocksdb at {:?}", p.as_ref()))?;
        Ok(RocksMeta { inner })
    }
}

impl MetaDB for RocksMeta {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.put(key.as_bytes(), value)?;
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool> {
        self.inner
            .get_pinned(key.as_bytes())
            .map(|r| r.is_some())
            .map_err(From::from)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, MetaError> {
        let bytes = self
            .inner
            .get_pinned(key.as_bytes())
            .map_err(|e| MetaError::from(Error::new(e)))?;
        match bytes {
            Some(b) => Ok(b.as_ref().to_owned()),
            None => Err(MetaError::NotFound),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.delete(key.as_bytes())?;
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put(k, v) => batch.put(k.as_bytes(), v),
                BatchOp::Delete(k) => batch.delete(k.as_bytes()),
            }
        }

        self.inner.write(batch)?;
        Ok(())
    }

    fn scan(
        &self,
        prefix: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<bool>,
    ) -> Result<()> {
        let iter = self
            .inner
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }

            let key = std::str::from_utf8(&key).context("non-utf8 meta key")?;
            if !visit(key, &value)? {
                break;
            }
        }

        Ok(())
    }
}
