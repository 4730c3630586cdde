// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::conversion::{Data, DataType};
use crate::invalidation::{MutationHook, TileInvalidatedEvent};
use crate::tiles::{CacheRecord, InjectCache, TileRef};
use crate::viewer::Viewer;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// How a batch of tiles is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Start from the original data instead of the current main data.
    pub restore: bool,
    /// Process tiles that are not loaded.  Suppresses the redraw request.
    pub allow_unloaded: bool,
    /// The tiles just finished loading; prepare their data for drawing even if no hook changes it.
    pub from_tile_load: bool,
}

impl ProcessOptions {
    pub fn new(restore: bool) -> Self {
        ProcessOptions {
            restore,
            allow_unloaded: false,
            from_tile_load: false,
        }
    }

    pub fn with_allow_unloaded(mut self, allow_unloaded: bool) -> Self {
        self.allow_unloaded = allow_unloaded;
        self
    }

    pub fn with_from_tile_load(mut self, from_tile_load: bool) -> Self {
        self.from_tile_load = from_tile_load;
        self
    }
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self::new(true)
    }
}

/**
Drives invalidation runs for the tiles of one [Viewer].

The pipeline keeps a global stamp.  Every run is stamped when it is admitted; a run whose
cache stamp falls behind the global stamp is stale and its work is not applied.

A run goes through these steps:

1.  Admission on the tile's original record, outdating the run already there.
2.  Every hook, in registration order, until one fails or the run becomes outdated.
3.  Completion: the working cache is prepared for the drawer and swapped in as the tile's main
    record, or the original data is restored, or nothing happens because the run went stale.

Completion always finishes the run, so [crate::tiles::Tile::wait_processed] never hangs on a
failed hook.
*/
pub struct InvalidationPipeline {
    viewer: Arc<Viewer>,
    hooks: Mutex<Vec<Arc<dyn MutationHook>>>,
    invalidated_at: Arc<AtomicU64>,
    stamps: AtomicU64,
}

impl InvalidationPipeline {
    pub fn new(viewer: Arc<Viewer>) -> Self {
        InvalidationPipeline {
            viewer,
            hooks: Mutex::new(Vec::new()),
            invalidated_at: Arc::new(AtomicU64::new(1)),
            stamps: AtomicU64::new(1),
        }
    }

    pub fn viewer(&self) -> &Arc<Viewer> {
        &self.viewer
    }

    /// Registers a hook.  Hooks run in registration order.
    pub fn add_hook(&self, hook: Arc<dyn MutationHook>) {
        self.hooks.lock().unwrap().push(hook);
    }

    /// The global stamp.
    pub fn invalidated_at(&self) -> u64 {
        self.invalidated_at.load(Ordering::Acquire)
    }

    fn next_stamp(&self) -> u64 {
        self.stamps.fetch_add(1, Ordering::AcqRel) + 1
    }

    /**
    Runs the hooks on one tile and applies the result.

    Tiles whose run turns out stale on completion are pushed to `reprocess`.
    */
    pub async fn process_tile(&self, tile: &TileRef, stamp: u64, options: ProcessOptions, reprocess: &Mutex<Vec<TileRef>>) {
        if !options.allow_unloaded && !tile.is_loaded() && !tile.is_processing() {
            return;
        }
        let Some(original) = self.viewer.tile_cache().original_cache(tile) else {
            logwise::trace_sync!("Tile {tile} has no data to process", tile = tile.to_string());
            return;
        };
        let slot = original.processing().clone();
        if slot.stamp().is_some_and(|s| s >= stamp) {
            return;
        }
        let mut tiles = original.tiles();
        if !tiles.iter().any(|t| Arc::ptr_eq(t, tile)) {
            tiles.push(tile.clone());
        }
        let run = slot.admit(stamp, options.restore, tiles);
        let event = TileInvalidatedEvent::new(
            tile.clone(),
            run.clone(),
            original,
            self.viewer.clone(),
            self.invalidated_at.clone(),
        );

        let hooks = self.hooks.lock().unwrap().clone();
        let mut result = Ok(());
        for hook in hooks {
            if event.outdated() {
                break;
            }
            result = hook.on_tile_invalidated(&event).await;
            if result.is_err() {
                break;
            }
        }
        event.release_discarded().await;

        match result {
            Ok(()) => self.complete(&event, stamp, options, reprocess).await,
            Err(e) => {
                logwise::error_sync!(
                    "Mutation hook failed on tile {tile}: {error}",
                    tile = tile.to_string(),
                    error = e.to_string()
                );
                event.discard_working().await;
                run.finish(false);
            }
        }
    }

    async fn complete(&self, event: &TileInvalidatedEvent, stamp: u64, options: ProcessOptions, reprocess: &Mutex<Vec<TileRef>>) {
        let tile = event.tile();
        let run = event.run();
        let original = event.original();
        let cache = self.viewer.tile_cache();
        let drawer = self.viewer.drawer();

        //no run can replace these two, so waiters are released here
        if self.viewer.is_destroyed() {
            run.finish(true);
            run.completion().resolve();
            event.discard_working().await;
            return;
        }
        if run.is_finished() {
            //superseded while the hooks ran
            event.discard_working().await;
            if options.from_tile_load {
                if let Some(main) = cache.main_cache(tile) {
                    main.prepare_for_rendering(drawer.as_ref()).await;
                }
            }
            return;
        }
        if !tile.is_loaded() && !tile.is_loading() {
            run.finish(true);
            run.completion().resolve();
            event.discard_working().await;
            return;
        }

        let cache_stamp = original.invalidation_stamp().unwrap_or(0);
        if cache_stamp < self.invalidated_at() {
            reprocess.lock().unwrap().push(tile.clone());
            event.discard_working().await;
        } else if cache_stamp != stamp {
            logwise::error_sync!(
                "Invalid processing state on tile {tile}: cache stamp {cache_stamp}, run stamp {stamp}, global stamp {global}",
                tile = tile.to_string(),
                cache_stamp = cache_stamp,
                stamp = stamp,
                global = self.invalidated_at()
            );
        } else if let Some(working) = event.take_working() {
            let prepared = working.prepare_for_rendering(drawer.as_ref()).await;
            if run.is_finished() {
                working.destroy().await;
                return;
            }
            if !event.outdated() && prepared {
                self.swap_in(tile, original, working).await;
            } else {
                working.destroy().await;
            }
            run.finish(false);
            return;
        } else if run.restore() {
            let restored = cache.main_cache(tile).is_none_or(|main| Arc::ptr_eq(&main, original));
            if !restored {
                let prepared = original.prepare_for_rendering(drawer.as_ref()).await;
                if run.is_finished() {
                    return;
                }
                if !event.outdated() && prepared {
                    cache.restore_tiles_that_share_original_cache(tile, original, true).await;
                }
                run.finish(false);
                return;
            }
        }

        if options.from_tile_load {
            if let Some(main) = cache.main_cache(tile) {
                main.prepare_for_rendering(drawer.as_ref()).await;
            }
        }
        run.finish(false);
    }

    //make `working` the main record of every tile sharing `original`
    async fn swap_in(&self, tile: &TileRef, original: &Arc<CacheRecord>, working: Arc<CacheRecord>) {
        let cache = self.viewer.tile_cache();
        let key = tile.build_distinct_main_cache_key();
        let mut targets = vec![tile.clone()];
        targets.extend(original.tiles().into_iter().filter(|t| !Arc::ptr_eq(t, tile)));
        let mut injected = false;
        for target in targets {
            if !target.is_loaded() && !target.is_loading() {
                continue;
            }
            let tile_allow_not_loaded = target.is_loading();
            injected |= cache
                .inject_cache(InjectCache {
                    tile: target,
                    cache: working.clone(),
                    target_key: key.clone(),
                    set_as_main_cache: true,
                    tile_allow_not_loaded,
                })
                .await;
        }
        if !injected {
            working.destroy().await;
        }
    }

    /**
    Processes `tiles` stamped `stamp` (the global stamp if `None`).

    Does nothing while the viewer is closed.  Tiles that went stale along the way are processed
    again with the global stamp until none are left.  Requests a redraw unless
    `allow_unloaded` is set.
    */
    pub async fn process_tiles(&self, tiles: Vec<TileRef>, stamp: Option<u64>, options: ProcessOptions) {
        if !self.viewer.is_open() {
            return;
        }
        let mut tiles = tiles;
        let mut stamp = stamp.unwrap_or_else(|| self.invalidated_at());
        let mut options = options;
        let mut first_pass = true;
        while !tiles.is_empty() {
            let reprocess = Mutex::new(Vec::new());
            futures::future::join_all(tiles.iter().map(|tile| self.process_tile(tile, stamp, options, &reprocess))).await;
            if first_pass && !options.allow_unloaded && !self.viewer.is_destroyed() {
                self.viewer.request_redraw();
            }
            first_pass = false;
            tiles = reprocess.into_inner().unwrap();
            if !tiles.is_empty() {
                let count = tiles.len() as u64;
                logwise::trace_sync!("Reprocessing {count} stale tiles", count = count);
            }
            stamp = self.invalidated_at();
            options = ProcessOptions::new(options.restore).with_allow_unloaded(true);
        }
    }

    /**
    Brings drawn tiles up to date with the global stamp.

    Loaded, idle tiles whose original record was stamped before the latest invalidation are
    processed again, with the restore flag their last run used.
    */
    pub async fn ensure_tiles_up_to_date(&self, tiles: &[TileRef]) {
        let global = self.invalidated_at();
        let mut outdated = Vec::new();
        let mut restore = self.viewer.config().restore_on_invalidate();
        for tile in tiles {
            if !tile.is_loaded() || tile.is_processing() {
                continue;
            }
            let Some(original) = self.viewer.tile_cache().original_cache(tile) else {
                continue;
            };
            let slot = original.processing();
            restore = slot.was_restored();
            if slot.stamp().is_some_and(|s| s < global) {
                outdated.push(tile.clone());
            }
        }
        if !outdated.is_empty() {
            let stamp = self.next_stamp();
            self.process_tiles(outdated, Some(stamp), ProcessOptions::new(restore)).await;
        }
    }

    /**
    Invalidates every loaded tile and returns the new global stamp.

    Tiles that were not touched since the oldest tile on screen, and that are deeper than the
    viewer's closest level, are unloaded instead of processed.
    */
    pub async fn request_invalidate(&self, restore: bool) -> u64 {
        let stamp = self.next_stamp();
        self.invalidated_at.store(stamp, Ordering::Release);
        logwise::info_sync!("Invalidating tiles with stamp {stamp}", stamp = stamp);

        let drawn_touch = self.viewer.min_drawn_touch_time().unwrap_or(u64::MAX);
        let cache = self.viewer.tile_cache();
        let all = cache.get_loaded_tiles_for(None);
        let mut keep = Vec::with_capacity(all.len());
        let mut deleted = 0;
        for (i, tile) in all.into_iter().enumerate() {
            let recently_touched = tile.last_touch_time() >= drawn_touch;
            let above_cutoff = tile.level() <= self.viewer.closest_level();
            if recently_touched || above_cutoff {
                keep.push(tile);
            } else {
                cache.unload_tile(&tile, Some(i - deleted)).await;
                deleted += 1;
            }
        }
        self.process_tiles(keep, Some(stamp), ProcessOptions::new(restore)).await;
        stamp
    }

    /// [Self::request_invalidate] with the viewer's configured restore flag.
    pub async fn invalidate(&self) -> u64 {
        self.request_invalidate(self.viewer.config().restore_on_invalidate()).await
    }

    /// Records `tiles` as drawn and brings them up to date.  Returns the frame number.
    pub async fn draw(&self, tiles: &[TileRef]) -> u64 {
        let frame = self.viewer.draw(tiles);
        self.ensure_tiles_up_to_date(tiles).await;
        frame
    }

    /**
    Stores freshly loaded data for `tile` and runs the hooks on it.

    The data is prepared for drawing even if no hook touches it.
    */
    pub async fn load_tile(&self, tile: &TileRef, data: Data, ty: DataType) {
        self.viewer
            .tile_cache()
            .cache_tile(tile, data, ty, self.viewer.closest_level())
            .await;
        let options = ProcessOptions::new(false)
            .with_allow_unloaded(true)
            .with_from_tile_load(true);
        self.process_tiles(vec![tile.clone()], None, options).await;
        if !self.viewer.is_destroyed() {
            self.viewer.request_redraw();
        }
    }
}

impl Debug for InvalidationPipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationPipeline")
            .field("invalidated_at", &self.invalidated_at())
            .field("hooks", &self.hooks.lock().unwrap().len())
            .finish()
    }
}
