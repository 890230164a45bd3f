//! persisted sector states, split into online & offline scopes

use anyhow::{Context, Result};

use super::locks::KeyedLocks;
use crate::errors::Precondition;
use crate::logging::debug;
use crate::metadb::{BatchOp, MetaDB, MetaDocumentDB, PrefixedMetaDB, SharedMetaDB};
use crate::types::{SectorID, SectorState, SectorWorkerJob, SectorWorkerState};

pub const STATE_PREFIX: &str = "sectors";

/// decides whether the mutated state should be committed
pub type StateCallback<'a> = &'a mut dyn FnMut(&mut SectorState) -> Result<bool>;

pub struct StateManager {
    docs: MetaDocumentDB<PrefixedMetaDB<SharedMetaDB>>,
    locks: KeyedLocks,
}

fn state_key(sid: &SectorID, ws: SectorWorkerState) -> String {
    format!("{}/{}", ws.as_str(), sid)
}

fn other_scope(ws: SectorWorkerState) -> SectorWorkerState {
    match ws {
        SectorWorkerState::Online => SectorWorkerState::Offline,
        SectorWorkerState::Offline => SectorWorkerState::Online,
    }
}

fn removed_err(sid: &SectorID) -> anyhow::Error {
    Precondition(format!("sector {} has been removed", sid)).into()
}

impl StateManager {
    pub fn new(db: SharedMetaDB) -> Self {
        StateManager {
            docs: MetaDocumentDB::wrap(PrefixedMetaDB::wrap(STATE_PREFIX, db)),
            locks: KeyedLocks::default(),
        }
    }

    fn get(&self, sid: &SectorID, ws: SectorWorkerState) -> Result<SectorState> {
        self.docs
            .get(state_key(sid, ws))
            .with_context(|| format!("load sector {} from {} scope", sid, ws.as_str()))
    }

    fn move_to(
        &self,
        state: &SectorState,
        from: SectorWorkerState,
        to: SectorWorkerState,
    ) -> Result<()> {
        let data = serde_json::to_vec(state).context("encode sector state")?;
        self.docs.inner().write_batch(vec![
            BatchOp::Put(state_key(&state.id, to), data),
            BatchOp::Delete(state_key(&state.id, from)),
        ])
    }

    /// load the sector from the given scope
    pub fn load(&self, sid: SectorID, ws: SectorWorkerState) -> Result<SectorState> {
        self.get(&sid, ws)
    }

    /// visits every sector of the scope matching the job, stops on the first error
    pub fn for_each<F>(
        &self,
        ws: SectorWorkerState,
        job: SectorWorkerJob,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(SectorState) -> Result<()>,
    {
        let prefix = format!("{}/", ws.as_str());
        self.docs.for_each(&prefix, |_, state: SectorState| {
            if job.matches(&state) {
                visit(state)?;
            }

            Ok(true)
        })
    }

    pub fn all(
        &self,
        ws: SectorWorkerState,
        job: SectorWorkerJob,
    ) -> Result<Vec<SectorState>> {
        let mut states = Vec::new();
        self.for_each(ws, job, |state| {
            states.push(state);
            Ok(())
        })?;

        Ok(states)
    }

    /// brings an offline sector back online.
    /// without a callback the restore is forced; with one, the mutated state
    /// is committed only if the callback returns `Ok(true)`.
    pub fn restore(
        &self,
        sid: SectorID,
        on_restore: Option<StateCallback<'_>>,
    ) -> Result<()> {
        let _guard = self.locks.lock(sid.to_string())?;

        let mut state = self.get(&sid, SectorWorkerState::Offline)?;
        if state.removed {
            return Err(removed_err(&sid));
        }

        if let Some(cb) = on_restore {
            if !cb(&mut state)? {
                debug!(sector = %sid, "restore skipped");
                return Ok(());
            }
        }

        // keep the flag monotonic even if the callback touched it
        state.removed = false;
        self.move_to(&state, SectorWorkerState::Offline, SectorWorkerState::Online)
            .with_context(|| format!("restore sector {}", sid))
    }

    /// mutates the sector in place, removed sectors are frozen
    pub fn update<F>(&self, sid: SectorID, ws: SectorWorkerState, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SectorState),
    {
        let _guard = self.locks.lock(sid.to_string())?;

        let mut state = self.get(&sid, ws)?;
        if state.removed {
            return Err(removed_err(&sid));
        }

        mutate(&mut state);
        self.docs
            .set(state_key(&sid, ws), &state)
            .with_context(|| format!("update sector {}", sid))
    }

    /// writes the state into the given scope.
    /// returns false if an identical record already exists.
    pub fn import(
        &self,
        ws: SectorWorkerState,
        state: SectorState,
        override_existing: bool,
    ) -> Result<bool> {
        let sid = state.id;
        let _guard = self.locks.lock(sid.to_string())?;

        let mut ops = Vec::with_capacity(2);
        for scope in [ws, other_scope(ws)] {
            let existing: Option<SectorState> = self
                .docs
                .get_opt(state_key(&sid, scope))
                .with_context(|| format!("check existing sector {}", sid))?;

            let existing = match existing {
                Some(e) => e,
                None => continue,
            };

            if existing.removed {
                return Err(removed_err(&sid));
            }

            if override_existing {
                if scope != ws {
                    ops.push(BatchOp::Delete(state_key(&sid, scope)));
                }
                continue;
            }

            let same = scope == ws
                && serde_json::to_value(&existing)? == serde_json::to_value(&state)?;
            if same {
                return Ok(false);
            }

            return Err(Precondition(format!(
                "sector {} already exists in {} scope",
                sid,
                scope.as_str()
            ))
            .into());
        }

        let data = serde_json::to_vec(&state).context("encode sector state")?;
        ops.push(BatchOp::Put(state_key(&sid, ws), data));
        self.docs
            .inner()
            .write_batch(ops)
            .with_context(|| format!("import sector {}", sid))?;

        Ok(true)
    }

    /// takes an online sector out of worker visibility
    pub fn finalize(
        &self,
        sid: SectorID,
        on_finalize: Option<StateCallback<'_>>,
    ) -> Result<()> {
        let _guard = self.locks.lock(sid.to_string())?;

        let mut state = self.get(&sid, SectorWorkerState::Online)?;
        if let Some(cb) = on_finalize {
            if !cb(&mut state)? {
                debug!(sector = %sid, "finalize skipped");
                return Ok(());
            }
        }

        self.move_to(&state, SectorWorkerState::Online, SectorWorkerState::Offline)
            .with_context(|| format!("finalize sector {}", sid))
    }
}
