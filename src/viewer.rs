// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The composition root.

use crate::config::ViewerConfig;
use crate::conversion::builtin::learn_builtins;
use crate::conversion::{ConversionEngine, ConversionRegistry};
use crate::tiles::{Drawer, TileCache, TileRef};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/**
Owns the conversion registry and the tile cache, and tracks what is on screen.

There is one registry per viewer.  Everything that converts data gets it through
[Viewer::engine].

A viewer starts closed.  Invalidation does nothing until [Viewer::open] is called, and
stops applying results once [Viewer::destroy] is called.
*/
pub struct Viewer {
    config: ViewerConfig,
    engine: ConversionEngine,
    tile_cache: TileCache,
    open: AtomicBool,
    destroyed: AtomicBool,
    //frame counter, used as touch time
    clock: AtomicU64,
    drawn: Mutex<Vec<TileRef>>,
    redraws: AtomicU64,
}

impl Viewer {
    /// A viewer with the built-in conversions learned.
    pub fn new(config: ViewerConfig) -> Arc<Viewer> {
        let registry = ConversionRegistry::new();
        learn_builtins(&registry, config.url_priority());
        Self::with_registry(config, Arc::new(registry))
    }

    /// A viewer using `registry` as is.
    pub fn with_registry(config: ViewerConfig, registry: Arc<ConversionRegistry>) -> Arc<Viewer> {
        let engine = ConversionEngine::new(registry);
        let tile_cache = TileCache::new(engine.clone(), config.max_image_cache_count());
        Arc::new(Viewer {
            config,
            engine,
            tile_cache,
            open: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            clock: AtomicU64::new(0),
            drawn: Mutex::new(Vec::new()),
            redraws: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn engine(&self) -> &ConversionEngine {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ConversionRegistry> {
        self.engine.registry()
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.tile_cache
    }

    pub fn drawer(&self) -> &Arc<dyn Drawer> {
        self.config.drawer()
    }

    pub fn closest_level(&self) -> u32 {
        self.config.closest_level()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn open(&self) {
        if self.is_destroyed() {
            logwise::warn_sync!("Can't open a destroyed viewer");
            return;
        }
        self.open.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Closes the viewer for good and drops all tile data.
    pub async fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.close();
        let previous = std::mem::take(&mut *self.drawn.lock().unwrap());
        for tile in previous {
            tile.set_being_drawn(false);
        }
        self.tile_cache.clear().await;
        logwise::info_sync!("Viewer destroyed");
    }

    /// Current frame number.
    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Asks the render loop for another frame.
    pub fn request_redraw(&self) {
        self.redraws.fetch_add(1, Ordering::Relaxed);
    }

    /// How many redraws were requested so far.
    pub fn redraw_count(&self) -> u64 {
        self.redraws.load(Ordering::Relaxed)
    }

    /**
    Records `tiles` as the current frame.

    Advances the frame clock and touches every drawn tile with it.  Tiles from the previous
    frame that are not drawn again lose their drawn flag.
    */
    pub fn draw(&self, tiles: &[TileRef]) -> u64 {
        let now = self.clock.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = std::mem::replace(&mut *self.drawn.lock().unwrap(), tiles.to_vec());
        for tile in previous {
            tile.set_being_drawn(false);
        }
        for tile in tiles {
            tile.touch(now);
            tile.set_being_drawn(true);
        }
        now
    }

    pub fn drawn_tiles(&self) -> Vec<TileRef> {
        self.drawn.lock().unwrap().clone()
    }

    /// Oldest touch time among the tiles on screen.
    pub fn min_drawn_touch_time(&self) -> Option<u64> {
        self.drawn.lock().unwrap().iter().map(|t| t.last_touch_time()).min()
    }
}

impl Debug for Viewer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("open", &self.is_open())
            .field("destroyed", &self.is_destroyed())
            .field("now", &self.now())
            .field("tile_cache", &self.tile_cache)
            .finish()
    }
}
