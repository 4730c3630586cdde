// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::conversion::{ConversionEngine, Data, DataType};
use crate::tiles::{CacheKey, CacheRecord, Tile, TileRef};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

/// Arguments to [TileCache::inject_cache].
#[derive(Debug, Clone)]
pub struct InjectCache {
    pub tile: TileRef,
    pub cache: Arc<CacheRecord>,
    pub target_key: CacheKey,
    /// Make `target_key` the tile's main key.
    pub set_as_main_cache: bool,
    /// Accept a tile that has not finished loading.
    pub tile_allow_not_loaded: bool,
}

#[derive(Default)]
struct CacheState {
    records: HashMap<CacheKey, Arc<CacheRecord>>,
    loaded: Vec<TileRef>,
}

impl CacheState {
    //detach `tile` from the record at `key`, returning the record if nothing references it anymore
    fn detach(&mut self, tile: &TileRef, key: &CacheKey) -> Option<Arc<CacheRecord>> {
        let record = self.records.get(key)?;
        if record.remove_tile(tile) == 0 {
            self.records.remove(key)
        } else {
            None
        }
    }

    fn unload(&mut self, tile: &TileRef, index: Option<usize>) -> Vec<Arc<CacheRecord>> {
        let index = index
            .filter(|i| self.loaded.get(*i).is_some_and(|t| Arc::ptr_eq(t, tile)))
            .or_else(|| self.loaded.iter().position(|t| Arc::ptr_eq(t, tile)));
        if let Some(index) = index {
            self.loaded.remove(index);
        }
        let mut orphans = Vec::new();
        let main = tile.cache_key();
        if &main != tile.original_cache_key() {
            orphans.extend(self.detach(tile, &main));
        }
        orphans.extend(self.detach(tile, tile.original_cache_key()));
        tile.mark_unloaded();
        orphans
    }
}

/**
Stores cache records by key and keeps the list of loaded tiles.

A tile references its original record (the data it was loaded with) and, once modified, a
separate main record.  Records with no referencing tile are destroyed.
*/
pub struct TileCache {
    engine: ConversionEngine,
    max_count: usize,
    state: Mutex<CacheState>,
}

impl TileCache {
    pub fn new(engine: ConversionEngine, max_count: usize) -> Self {
        TileCache {
            engine,
            max_count,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn num_tiles_loaded(&self) -> usize {
        self.state.lock().unwrap().loaded.len()
    }

    pub fn num_caches(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn get_cache(&self, key: &CacheKey) -> Option<Arc<CacheRecord>> {
        self.state.lock().unwrap().records.get(key).cloned()
    }

    /// The record the tile currently draws.
    pub fn main_cache(&self, tile: &Tile) -> Option<Arc<CacheRecord>> {
        self.get_cache(&tile.cache_key())
    }

    /// The record the tile was loaded with.
    pub fn original_cache(&self, tile: &Tile) -> Option<Arc<CacheRecord>> {
        self.get_cache(tile.original_cache_key())
    }

    /**
    Stores freshly loaded data for `tile` and marks it loaded.

    Tiles with the same original key share one record; the first data wins and later copies
    are released.  When the cache is full, the least recently touched tile deeper than `cutoff`
    that is not being drawn is unloaded to make room (ties go to the deeper level).
    */
    pub async fn cache_tile(&self, tile: &TileRef, data: Data, ty: DataType, cutoff: u32) {
        let (unused, orphans) = {
            let mut state = self.state.lock().unwrap();
            let record = state
                .records
                .entry(tile.original_cache_key().clone())
                .or_insert_with(|| CacheRecord::new(self.engine.clone()))
                .clone();
            let adopted = record.add_tile(tile, Some((data.clone(), ty.clone())));

            let mut orphans = Vec::new();
            if !state.loaded.iter().any(|t| Arc::ptr_eq(t, tile)) {
                let mut insertion = state.loaded.len();
                if state.loaded.len() >= self.max_count {
                    if let Some(worst) = worst_tile(&state.loaded, cutoff) {
                        let evicted = state.loaded[worst].clone();
                        logwise::trace_sync!("Evicting tile {tile}", tile = evicted.to_string());
                        orphans = state.unload(&evicted, Some(worst));
                        insertion = worst;
                    }
                }
                state.loaded.insert(insertion, tile.clone());
            }
            tile.mark_loaded();
            (if adopted { None } else { Some(data) }, orphans)
        };
        if let Some(unused) = unused {
            if let Some(release) = self.engine.destroy(unused, &ty) {
                release.await;
            }
        }
        for orphan in orphans {
            orphan.destroy().await;
        }
    }

    /**
    Stores `cache` under `target_key` for `tile`, optionally switching the tile's main key.

    The record is in the store before the tile points at it, so readers see either the old
    main record or the new one.  A previous main record left without tiles is destroyed; the
    original record never is.
    */
    pub async fn inject_cache(&self, inject: InjectCache) -> bool {
        let InjectCache {
            tile,
            cache,
            target_key,
            set_as_main_cache,
            tile_allow_not_loaded,
        } = inject;
        if !tile.is_loaded() && !tile_allow_not_loaded {
            logwise::warn_sync!(
                "Refusing to inject cache {key} into tile {tile}, it is not loaded",
                key = target_key.to_string(),
                tile = tile.to_string()
            );
            return false;
        }
        let orphans = {
            let mut state = self.state.lock().unwrap();
            let mut orphans = Vec::new();
            if let Some(previous) = state.records.insert(target_key.clone(), cache.clone()) {
                if !Arc::ptr_eq(&previous, &cache) {
                    orphans.push(previous);
                }
            }
            cache.add_tile(&tile, None);
            if set_as_main_cache {
                let previous_main = tile.cache_key();
                tile.set_cache_key(target_key.clone());
                if previous_main != target_key && &previous_main != tile.original_cache_key() {
                    orphans.extend(state.detach(&tile, &previous_main));
                }
            }
            orphans
        };
        for orphan in orphans {
            orphan.destroy().await;
        }
        true
    }

    /**
    Points every tile that shares `original` back at it.

    Tiles still loading are only restored with `force`.
    */
    pub async fn restore_tiles_that_share_original_cache(&self, tile: &TileRef, original: &Arc<CacheRecord>, force: bool) {
        let orphans = {
            let mut state = self.state.lock().unwrap();
            let mut orphans = Vec::new();
            let mut sharing = original.tiles();
            if !sharing.iter().any(|t| Arc::ptr_eq(t, tile)) {
                sharing.push(tile.clone());
            }
            for t in sharing {
                if !t.is_loaded() && !force {
                    continue;
                }
                let main = t.cache_key();
                if &main == t.original_cache_key() {
                    continue;
                }
                t.set_cache_key(t.original_cache_key().clone());
                orphans.extend(state.detach(&t, &main));
            }
            orphans
        };
        for orphan in orphans {
            orphan.destroy().await;
        }
    }

    /// Loaded tiles matching `predicate`, or all of them.
    pub fn get_loaded_tiles_for(&self, predicate: Option<&dyn Fn(&Tile) -> bool>) -> Vec<TileRef> {
        let state = self.state.lock().unwrap();
        match predicate {
            Some(predicate) => state
                .loaded
                .iter()
                .filter(|t| {
                    let tile: &Tile = t;
                    predicate(tile)
                })
                .cloned()
                .collect(),
            None => state.loaded.clone(),
        }
    }

    /**
    Unloads `tile`, destroying records nothing else references.

    `index` is a hint for the tile's position in the loaded list; a wrong hint falls back to a
    search.
    */
    pub async fn unload_tile(&self, tile: &TileRef, index: Option<usize>) {
        let orphans = self.state.lock().unwrap().unload(tile, index);
        for orphan in orphans {
            orphan.destroy().await;
        }
    }

    /// Unloads every tile and destroys every record.
    pub async fn clear(&self) {
        let records: Vec<_> = {
            let mut state = self.state.lock().unwrap();
            for tile in std::mem::take(&mut state.loaded) {
                tile.mark_unloaded();
            }
            state.records.drain().map(|(_, r)| r).collect()
        };
        for record in records {
            record.destroy().await;
        }
    }
}

fn worst_tile(loaded: &[TileRef], cutoff: u32) -> Option<usize> {
    let mut worst: Option<usize> = None;
    for (i, tile) in loaded.iter().enumerate().rev() {
        if tile.level() <= cutoff || tile.is_being_drawn() {
            continue;
        }
        match worst {
            None => worst = Some(i),
            Some(w) => {
                let current = &loaded[w];
                let (time, worst_time) = (tile.last_touch_time(), current.last_touch_time());
                if time < worst_time || (time == worst_time && tile.level() > current.level()) {
                    worst = Some(i);
                }
            }
        }
    }
    worst
}

impl Debug for TileCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("TileCache")
            .field("max_count", &self.max_count)
            .field("loaded", &state.loaded.len())
            .field("records", &state.records.len())
            .finish()
    }
}
