// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::conversion::{Data, DataType};
use crate::error::{DataError, HookError};
use crate::invalidation::CacheProcessingState;
use crate::tiles::{CacheRecord, TileRef};
use crate::viewer::Viewer;
use futures::future::BoxFuture;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/**
External code that rewrites tile data.

Called once per tile per invalidation run.  The hook works on a private copy of the data through
the [TileInvalidatedEvent] accessors; nothing it does is visible until the run completes and
the copy is swapped in.

Hooks should check [TileInvalidatedEvent::outdated] after every suspension point and give up
early when it returns `true`.  Work done by an outdated run is thrown away regardless.
*/
pub trait MutationHook: Send + Sync {
    fn on_tile_invalidated<'a>(&'a self, event: &'a TileInvalidatedEvent) -> BoxFuture<'a, Result<(), HookError>>;
}

/**
What a [MutationHook] gets to see of one run on one tile.

Holds the run's working cache: a scratch record created lazily on the first
[TileInvalidatedEvent::get_data] or [TileInvalidatedEvent::set_data].  The working cache
belongs to this event alone.
*/
pub struct TileInvalidatedEvent {
    tile: TileRef,
    run: Arc<CacheProcessingState>,
    original: Arc<CacheRecord>,
    viewer: Arc<Viewer>,
    invalidated_at: Arc<AtomicU64>,
    working: Mutex<Option<Arc<CacheRecord>>>,
    discarded: Mutex<Vec<Arc<CacheRecord>>>,
}

impl TileInvalidatedEvent {
    pub(crate) fn new(
        tile: TileRef,
        run: Arc<CacheProcessingState>,
        original: Arc<CacheRecord>,
        viewer: Arc<Viewer>,
        invalidated_at: Arc<AtomicU64>,
    ) -> Self {
        TileInvalidatedEvent {
            tile,
            run,
            original,
            viewer,
            invalidated_at,
            working: Mutex::new(None),
            discarded: Mutex::new(Vec::new()),
        }
    }

    pub fn tile(&self) -> &TileRef {
        &self.tile
    }

    /// The run this event belongs to.
    pub fn run(&self) -> &Arc<CacheProcessingState> {
        &self.run
    }

    /// Whether the run starts from the tile's original data.
    pub fn restore(&self) -> bool {
        self.run.restore()
    }

    pub(crate) fn original(&self) -> &Arc<CacheRecord> {
        &self.original
    }

    /**
    Whether the work of this run will be discarded.

    True once a newer run superseded this one, a newer invalidation was requested, the tile was
    unloaded, or the viewer was destroyed.
    */
    pub fn outdated(&self) -> bool {
        self.run.is_outdated()
            || self
                .original
                .invalidation_stamp()
                .is_some_and(|s| s < self.invalidated_at.load(Ordering::Acquire))
            || (!self.tile.is_loaded() && !self.tile.is_loading())
            || self.viewer.is_destroyed()
    }

    /**
    Reads the data being modified, as `ty` (or as stored, if `None`).

    The first access copies the tile's current data into the working cache: the original data
    if the run restores, the main data otherwise.  Later accesses read the working cache, converting
    it in place if needed.
    */
    pub async fn get_data(&self, ty: Option<&DataType>) -> Result<Data, DataError> {
        let working = self.working.lock().unwrap().clone();
        if let Some(working) = working {
            return working.get_data_as(ty, false).await;
        }

        let key = if self.restore() {
            self.tile.original_cache_key().clone()
        } else {
            self.tile.cache_key()
        };
        let Some(source) = self.viewer.tile_cache().get_cache(&key) else {
            logwise::error_sync!(
                "There is no cache available for tile {tile} with key {key}",
                tile = self.tile.to_string(),
                key = key.to_string()
            );
            return Err(DataError::MissingCache(key));
        };
        let ty = match ty.cloned().or_else(|| source.data_type()) {
            Some(ty) => ty,
            None => return Err(DataError::Destroyed),
        };
        let data = source.get_data_as(Some(&ty), true).await?;
        let record = CacheRecord::with_data(self.viewer.engine().clone(), &self.tile, data.clone(), ty.clone());
        let existing = {
            let mut working = self.working.lock().unwrap();
            match &*working {
                Some(existing) => Some(existing.clone()),
                None => {
                    *working = Some(record.clone());
                    None
                }
            }
        };
        match existing {
            None => Ok(data),
            //a concurrent access of this hook installed one first
            Some(existing) => {
                record.destroy().await;
                existing.get_data_as(Some(&ty), false).await
            }
        }
    }

    /// Replaces the data being modified.
    pub async fn set_data(&self, data: Data, ty: &DataType) -> Result<(), DataError> {
        let working = {
            let mut working = self.working.lock().unwrap();
            match &*working {
                Some(existing) => Some(existing.clone()),
                None => {
                    *working = Some(CacheRecord::with_data(
                        self.viewer.engine().clone(),
                        &self.tile,
                        data.clone(),
                        ty.clone(),
                    ));
                    None
                }
            }
        };
        match working {
            Some(working) => working.set_data_as(data, ty).await,
            None => Ok(()),
        }
    }

    /// Drops every modification made so far in this run.
    pub fn reset_data(&self) {
        let working = self.working.lock().unwrap().take();
        if let Some(working) = working {
            self.discarded.lock().unwrap().push(working);
        }
    }

    pub(crate) fn take_working(&self) -> Option<Arc<CacheRecord>> {
        self.working.lock().unwrap().take()
    }

    /// Destroys every working cache dropped so far.
    pub(crate) async fn release_discarded(&self) {
        let discarded = std::mem::take(&mut *self.discarded.lock().unwrap());
        for record in discarded {
            record.destroy().await;
        }
    }

    /// Drops the working cache and destroys it along with earlier discards.
    pub(crate) async fn discard_working(&self) {
        self.reset_data();
        self.release_discarded().await;
    }
}

impl Debug for TileInvalidatedEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileInvalidatedEvent")
            .field("tile", &self.tile)
            .field("run", &self.run)
            .finish()
    }
}
