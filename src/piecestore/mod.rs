//! piece data served from local stores, with the market service as fallback

use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{Context, Result};
use forest_cid::Cid;

use crate::chain::MarketAPI;
use crate::errors::{NotFound, Precondition};
use crate::logging::{debug, warn};
use crate::metrics::{RESULT_ERR, RESULT_MISS, RESULT_OK, VIEW};
use crate::objstore::{ObjectStore, ObjectStoreError, Resource};

pub mod http;

pub const NO_STORE_AVAILABLE: &str = "no piece store available";

/// logical names a piece may be kept under, in lookup order
fn piece_keys(c: &Cid) -> [String; 2] {
    let name = c.to_string();
    let car = format!("{}.car", name);
    [name, car]
}

fn is_io_not_found(e: &ObjectStoreError) -> bool {
    matches!(e, ObjectStoreError::IO(inner) if inner.kind() == io::ErrorKind::NotFound)
}

pub struct PieceStoreProxy {
    locals: Vec<Arc<dyn ObjectStore>>,
    market: Arc<dyn MarketAPI>,
}

impl PieceStoreProxy {
    /// `locals` are scanned in the given order for both reads & writes
    pub fn new(locals: Vec<Arc<dyn ObjectStore>>, market: Arc<dyn MarketAPI>) -> Self {
        PieceStoreProxy { locals, market }
    }

    /// first local copy of the piece, with the name of the store holding it
    pub fn find_local(&self, c: &Cid) -> Option<(String, Box<dyn Read + Send>)> {
        for store in self.locals.iter() {
            for key in piece_keys(c) {
                match store.get(&Resource::Custom(key)) {
                    Ok(r) => {
                        debug!(instance = store.instance().as_str(), piece = %c, "local piece found");
                        return Some((store.instance(), r));
                    }

                    Err(e) if is_io_not_found(&e) => {}

                    Err(e) => {
                        warn!(instance = store.instance().as_str(), piece = %c, "read local piece: {}", e);
                    }
                }
            }
        }

        None
    }

    /// reader of a local copy, `NotFound` if none of the stores has it
    pub fn get(&self, c: &Cid) -> Result<Box<dyn Read + Send>> {
        match self.find_local(c) {
            Some((_, r)) => {
                VIEW.piece_store.get(RESULT_OK);
                Ok(r)
            }

            None => {
                VIEW.piece_store.get(RESULT_MISS);
                Err(NotFound(format!("piece {}", c)).into())
            }
        }
    }

    /// remote location of the piece on the market service
    pub fn resource_url(&self, c: &Cid) -> String {
        self.market.piece_resource_url(c)
    }

    /// first writable store with enough space, or unknown space
    fn select(&self, size: u64) -> Option<&Arc<dyn ObjectStore>> {
        for store in self.locals.iter() {
            if store.readonly() {
                continue;
            }

            let info = match store.instance_info() {
                Ok(info) => info,
                Err(e) => {
                    warn!(instance = store.instance().as_str(), "get instance info: {}", e);
                    continue;
                }
            };

            // zero free space is reported by stores which could not tell
            if info.free > size || info.free == 0 {
                return Some(store);
            }
        }

        None
    }

    /// writes the piece into the first eligible store,
    /// returns the instance name & bytes written.
    /// unknown `size` is only accepted by stores with unknown free space
    pub fn put(&self, c: &Cid, r: &mut dyn Read, size: Option<u64>) -> Result<(String, u64)> {
        let store = match self.select(size.unwrap_or(u64::MAX)) {
            Some(s) => s,
            None => {
                VIEW.piece_store.put(RESULT_ERR);
                return Err(Precondition(NO_STORE_AVAILABLE.to_owned()).into());
            }
        };

        let instance = store.instance();
        let written = store
            .put(&Resource::Custom(c.to_string()), r)
            .with_context(|| format!("write piece {} into {}", c, instance));

        match written {
            Ok(n) => {
                VIEW.piece_store.put(RESULT_OK);
                debug!(instance = instance.as_str(), piece = %c, size = n, "piece stored");
                Ok((instance, n))
            }

            Err(e) => {
                VIEW.piece_store.put(RESULT_ERR);
                Err(e)
            }
        }
    }
}
