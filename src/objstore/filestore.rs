//! ObjectStore implemented based on fs

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, copy, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use nix::sys::statvfs::statvfs;

use super::{InstanceInfo, ObjResult, ObjectStore, Resource};
use crate::config::StoreConfig;
use crate::types::StoreBasicInfo;

pub const FILESTORE_TYPE: &str = "filestore";

/// FileStore
pub struct FileStore {
    instance: String,
    path: PathBuf,
    readonly: bool,
    meta: HashMap<String, String>,
}

impl FileStore {
    /// open the file store at given path
    pub fn open<P: AsRef<Path>>(
        p: P,
        ins: Option<String>,
        readonly: bool,
        meta: HashMap<String, String>,
    ) -> Result<Self> {
        let dir_path =
            p.as_ref().canonicalize().context("canonicalize dir path")?;
        if !dir_path
            .metadata()
            .context("read dir metadata")
            .map(|meta| meta.is_dir())?
        {
            return Err(anyhow!("base path of the file store should a dir"));
        };

        let instance =
            match ins.or_else(|| dir_path.to_str().map(|s| s.to_owned())) {
                Some(i) => i,
                None => {
                    return Err(anyhow!(
                        "dir path {:?} may contain invalid utf8 chars",
                        dir_path
                    ))
                }
            };

        Ok(FileStore {
            instance,
            path: dir_path,
            readonly,
            meta,
        })
    }

    /// open with the given store config
    pub fn from_config(cfg: &StoreConfig) -> Result<Self> {
        Self::open(
            &cfg.path,
            cfg.name.clone(),
            cfg.readonly,
            cfg.meta.clone(),
        )
        .with_context(|| format!("open file store {}", cfg.path.display()))
    }

    fn writable(&self) -> ObjResult<()> {
        if self.readonly {
            return Err(anyhow!("store {} is read-only", self.instance).into());
        }

        Ok(())
    }
}

impl ObjectStore for FileStore {
    fn instance(&self) -> String {
        self.instance.clone()
    }

    fn readonly(&self) -> bool {
        self.readonly
    }

    fn basic_info(&self) -> StoreBasicInfo {
        StoreBasicInfo {
            name: self.instance.clone(),
            path: self.path.display().to_string(),
            meta: self.meta.clone(),
        }
    }

    fn instance_info(&self) -> ObjResult<InstanceInfo> {
        let stat = statvfs(&self.path).map_err(io::Error::from)?;
        let frsize = stat.fragment_size() as u64;
        let total = stat.blocks() as u64 * frsize;
        let free = stat.blocks_available() as u64 * frsize;
        let used = total.saturating_sub(stat.blocks_free() as u64 * frsize);
        let used_percent = if total == 0 {
            0.0
        } else {
            used as f64 * 100.0 / total as f64
        };

        Ok(InstanceInfo {
            typ: FILESTORE_TYPE.to_owned(),
            total,
            free,
            used,
            used_percent,
        })
    }

    fn full_path(&self, resource: &Resource) -> ObjResult<PathBuf> {
        resource.sub_path().map(|sub| self.path.join(sub))
    }

    fn get(&self, resource: &Resource) -> ObjResult<Box<dyn Read + Send>> {
        let f = OpenOptions::new().read(true).open(self.full_path(resource)?)?;
        let r: Box<dyn Read + Send> = Box::new(f);
        Ok(r)
    }

    fn put(&self, resource: &Resource, r: &mut dyn Read) -> ObjResult<u64> {
        self.writable()?;

        let dest = self.full_path(resource)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = dest.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;

        let written = match copy(r, &mut f).and_then(|n| f.sync_all().map(|_| n)) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e.into());
            }
        };

        fs::rename(&tmp, &dest)?;
        Ok(written)
    }

    fn del(&self, resource: &Resource) -> ObjResult<()> {
        self.writable()?;

        let p = self.full_path(resource)?;
        let res = if resource.is_dir() {
            fs::remove_dir_all(&p)
        } else {
            fs::remove_file(&p)
        };

        match res {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::io::Read;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::SectorID;

    #[test]
    fn test_put_get_del() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FileStore::open(dir.path(), Some("s1".to_owned()), false, HashMap::new()).unwrap();

        let res = Resource::Custom("pieces/abc".to_owned());
        let n = store.put(&res, &mut &b"hello"[..]).unwrap();
        assert_eq!(n, 5);

        let mut buf = String::new();
        store.get(&res).unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");

        store.del(&res).unwrap();
        assert!(store.get(&res).is_err());
        // absent objects are fine
        store.del(&res).unwrap();

        let sid = SectorID {
            miner: 1000,
            number: 1,
        };
        let cache = store.full_path(&Resource::Cache(sid)).unwrap();
        fs::create_dir_all(cache.join("sub")).unwrap();
        fs::write(cache.join("sub").join("p_aux"), b"x").unwrap();
        store.del(&Resource::Cache(sid)).unwrap();
        assert!(!cache.exists());

        let info = store.instance_info().unwrap();
        assert_eq!(info.typ, FILESTORE_TYPE);
        assert!(info.total >= info.free);
        assert_eq!(store.basic_info().name, "s1");
    }

    #[test]
    fn test_readonly() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), None, true, HashMap::new()).unwrap();
        assert!(store.readonly());
        assert_eq!(store.instance(), dir.path().canonicalize().unwrap().display().to_string());

        let res = Resource::Custom("x".to_owned());
        assert!(store.put(&res, &mut &b"x"[..]).is_err());
        assert!(store.del(&res).is_err());
    }
}
