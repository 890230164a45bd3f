//! key-value metadata persistence

use std::fmt;
use std::sync::Arc;

use anyhow::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{from_slice, to_vec};

pub mod mem;
pub mod rocks;

#[derive(Debug)]
pub enum MetaError {
    NotFound,
    Failure(Error),
}

impl From<Error> for MetaError {
    fn from(val: Error) -> Self {
        MetaError::Failure(val)
    }
}

impl fmt::Display for MetaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaError::NotFound => f.write_str("meta key not found"),
            MetaError::Failure(e) => write!(f, "meta failure: {}", e),
        }
    }
}

impl std::error::Error for MetaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetaError::NotFound => None,
            MetaError::Failure(e) => Some(e.as_ref()),
        }
    }
}

/// a single mutation inside a write batch
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(String, Vec<u8>),
    Delete(String),
}

/// a raw key-value store, all implementations must be safe to share
pub trait MetaDB: Send + Sync {
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    fn has(&self, key: &str) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Vec<u8>, MetaError>;

    fn remove(&self, key: &str) -> Result<()>;

    /// applies all the ops atomically
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// visits keys starting with `prefix` in order, stops when `visit` returns false
    fn scan(
        &self,
        prefix: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<bool>,
    ) -> Result<()>;
}

impl<DB: MetaDB + ?Sized> MetaDB for Arc<DB> {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn has(&self, key: &str) -> Result<bool> {
        (**self).has(key)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, MetaError> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        (**self).write_batch(ops)
    }

    fn scan(
        &self,
        prefix: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<bool>,
    ) -> Result<()> {
        (**self).scan(prefix, visit)
    }
}

/// shared handle of a metadb
pub type SharedMetaDB = Arc<dyn MetaDB>;

/// json documents on top of a MetaDB
pub struct MetaDocumentDB<M>(M);

impl<M: MetaDB> MetaDocumentDB<M> {
    pub fn wrap(inner: M) -> Self {
        MetaDocumentDB(inner)
    }

    pub fn inner(&self) -> &M {
        &self.0
    }

    pub fn set<K, T>(&self, key: K, val: &T) -> Result<()>
    where
        K: AsRef<str>,
        T: Serialize,
    {
        let data = to_vec(val)?;
        self.0.set(key.as_ref(), &data)
    }

    pub fn get<K, T>(&self, key: K) -> Result<T, MetaError>
    where
        K: AsRef<str>,
        T: DeserializeOwned,
    {
        let data = self.0.get(key.as_ref())?;
        from_slice(&data).map_err(|e| MetaError::Failure(Error::new(e)))
    }

    /// like `get`, but absence is not an error
    pub fn get_opt<K, T>(&self, key: K) -> Result<Option<T>>
    where
        K: AsRef<str>,
        T: DeserializeOwned,
    {
        match self.get(key) {
            Ok(v) => Ok(Some(v)),
            Err(MetaError::NotFound) => Ok(None),
            Err(MetaError::Failure(e)) => Err(e),
        }
    }

    pub fn has<K: AsRef<str>>(&self, key: K) -> Result<bool> {
        self.0.has(key.as_ref())
    }

    pub fn remove<K: AsRef<str>>(&self, key: K) -> Result<()> {
        self.0.remove(key.as_ref())
    }

    /// decodes and visits every document under `prefix`
    pub fn for_each<T, F>(&self, prefix: &str, mut visit: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(&str, T) -> Result<bool>,
    {
        self.0.scan(prefix, &mut |key, data| {
            let doc: T = from_slice(data)
                .map_err(|e| Error::new(e).context(format!("decode doc {}", key)))?;
            visit(key, doc)
        })
    }
}

/// keys are joined with the prefix by "/"
pub struct PrefixedMetaDB<DB: MetaDB> {
    prefix: String,
    inner: DB,
}

impl<DB: MetaDB> PrefixedMetaDB<DB> {
    pub fn wrap<P: Into<String>>(prefix: P, inner: DB) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    fn key(&self, k: &str) -> String {
        [&self.prefix, k].join("/")
    }
}

impl<DB: MetaDB> MetaDB for PrefixedMetaDB<DB> {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.set(&self.key(key), value)
    }

    fn has(&self, key: &str) -> Result<bool> {
        self.inner.has(&self.key(key))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, MetaError> {
        self.inner.get(&self.key(key))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(&self.key(key))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        let ops = ops
            .into_iter()
            .map(|op| match op {
                BatchOp::Put(k, v) => BatchOp::Put(self.key(&k), v),
                BatchOp::Delete(k) => BatchOp::Delete(self.key(&k)),
            })
            .collect();
        self.inner.write_batch(ops)
    }

    fn scan(
        &self,
        prefix: &str,
        visit: &mut dyn FnMut(&str, &[u8]) -> Result<bool>,
    ) -> Result<()> {
        let own = self.prefix.len() + 1;
        self.inner.scan(&self.key(prefix), &mut |key, data| {
            visit(key.get(own..).unwrap_or_default(), data)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    use super::mem::MemMeta;
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        size: u64,
    }

    #[test]
    fn test_prefixed_documents() {
        let db: SharedMetaDB = Arc::new(MemMeta::default());
        let docs = MetaDocumentDB::wrap(PrefixedMetaDB::wrap("docs", db.clone()));

        assert!(matches!(docs.get::<_, Doc>("a"), Err(MetaError::NotFound)));
        assert!(docs.get_opt::<_, Doc>("a").unwrap().is_none());

        docs.set("a", &Doc { name: "a".to_owned(), size: 1 }).unwrap();
        docs.set("b", &Doc { name: "b".to_owned(), size: 2 }).unwrap();
        db.set("other/c", b"{}").unwrap();

        assert!(db.has("docs/a").unwrap());
        assert_eq!(docs.get::<_, Doc>("b").unwrap().size, 2);

        let mut seen = Vec::new();
        docs.for_each("", |key, doc: Doc| {
            seen.push((key.to_owned(), doc.size));
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen, vec![("a".to_owned(), 1), ("b".to_owned(), 2)]);

        docs.inner()
            .write_batch(vec![BatchOp::Delete("a".to_owned()), BatchOp::Put("d".to_owned(), b"{\"name\":\"d\",\"size\":4}".to_vec())])
            .unwrap();
        assert!(!db.has("docs/a").unwrap());
        assert_eq!(docs.get::<_, Doc>("d").unwrap().name, "d");
    }
}
