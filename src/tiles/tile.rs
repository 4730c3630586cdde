// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::invalidation::Completion;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type TileRef = Arc<Tile>;

/// Key of a [super::CacheRecord] inside a [super::TileCache].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    pub fn new(key: &str) -> Self {
        CacheKey(Arc::from(key))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey::new(value)
    }
}

#[derive(Debug)]
struct TileState {
    cache_key: CacheKey,
    loaded: bool,
    loading: bool,
    being_drawn: bool,
    last_touch_time: u64,
    //stamp of the invalidation run currently working on this tile
    processing: Option<u64>,
    processing_completion: Option<Arc<Completion>>,
}

/**
One tile of the pyramid.

Loading and drawing are driven from outside; the tile only records where it stands.
*/
pub struct Tile {
    level: u32,
    x: u32,
    y: u32,
    original_cache_key: CacheKey,
    state: Mutex<TileState>,
    distinct_keys: AtomicU64,
}

impl Tile {
    /// A tile that has not started loading yet.
    pub fn new(level: u32, x: u32, y: u32, cache_key: CacheKey) -> TileRef {
        Arc::new(Tile {
            level,
            x,
            y,
            original_cache_key: cache_key.clone(),
            state: Mutex::new(TileState {
                cache_key,
                loaded: false,
                loading: false,
                being_drawn: false,
                last_touch_time: 0,
                processing: None,
                processing_completion: None,
            }),
            distinct_keys: AtomicU64::new(0),
        })
    }

    pub fn level(&self) -> u32 {
        self.level
    }
    pub fn x(&self) -> u32 {
        self.x
    }
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Key of the data the tile was loaded with.
    pub fn original_cache_key(&self) -> &CacheKey {
        &self.original_cache_key
    }

    /// Key of the data currently drawn for this tile.
    pub fn cache_key(&self) -> CacheKey {
        self.state.lock().unwrap().cache_key.clone()
    }

    pub(crate) fn set_cache_key(&self, key: CacheKey) {
        self.state.lock().unwrap().cache_key = key;
    }

    /// A main-cache key no other record of this tile has used.
    pub fn build_distinct_main_cache_key(&self) -> CacheKey {
        let n = self.distinct_keys.fetch_add(1, Ordering::Relaxed) + 1;
        CacheKey::new(&format!("mod://{}#{n}", self.original_cache_key))
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().unwrap().loaded
    }
    pub fn is_loading(&self) -> bool {
        self.state.lock().unwrap().loading
    }

    /// Marks the tile as fetching its data.
    pub fn set_loading(&self, loading: bool) {
        self.state.lock().unwrap().loading = loading;
    }

    pub(crate) fn mark_loaded(&self) {
        let mut state = self.state.lock().unwrap();
        state.loaded = true;
        state.loading = false;
    }

    pub(crate) fn mark_unloaded(&self) {
        let mut state = self.state.lock().unwrap();
        state.loaded = false;
        state.loading = false;
        state.being_drawn = false;
        state.cache_key = self.original_cache_key.clone();
    }

    pub fn is_being_drawn(&self) -> bool {
        self.state.lock().unwrap().being_drawn
    }

    pub(crate) fn set_being_drawn(&self, being_drawn: bool) {
        self.state.lock().unwrap().being_drawn = being_drawn;
    }

    pub fn last_touch_time(&self) -> u64 {
        self.state.lock().unwrap().last_touch_time
    }

    pub(crate) fn touch(&self, time: u64) {
        self.state.lock().unwrap().last_touch_time = time;
    }

    pub fn is_processing(&self) -> bool {
        self.state.lock().unwrap().processing.is_some()
    }

    /// Stamp of the invalidation run working on this tile, if any.
    pub fn processing_stamp(&self) -> Option<u64> {
        self.state.lock().unwrap().processing
    }

    pub(crate) fn mark_processing(&self, stamp: u64, completion: Arc<Completion>) {
        let mut state = self.state.lock().unwrap();
        state.processing = Some(stamp);
        state.processing_completion = Some(completion);
    }

    pub(crate) fn clear_processing(&self, stamp: u64) {
        let mut state = self.state.lock().unwrap();
        if state.processing == Some(stamp) {
            state.processing = None;
        }
    }

    /**
    Waits until the invalidation that last touched this tile's data has been applied.

    Returns immediately if no invalidation ever touched this tile.  Superseded runs do not
    count: waiting continues until a run actually completes, or until the tile is unloaded or
    the viewer destroyed while its run was in flight.
    */
    pub async fn wait_processed(&self) {
        let completion = self.state.lock().unwrap().processing_completion.clone();
        if let Some(completion) = completion {
            completion.wait().await;
        }
    }
}

impl Debug for Tile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("level", &self.level)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("state", &self.state)
            .finish()
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}_{}", self.level, self.x, self.y)
    }
}
