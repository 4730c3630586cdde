// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Viewer configuration.

use crate::Priority;
use crate::tiles::{Drawer, SurfaceDrawer};
use std::sync::Arc;

/// Builder for a [crate::Viewer].
///
/// Every setting has a default, so `ViewerConfig::new()` is a working configuration.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    max_image_cache_count: usize,
    closest_level: u32,
    restore_on_invalidate: bool,
    drawer: Arc<dyn Drawer>,
    url_priority: Priority,
}

impl ViewerConfig {
    pub fn new() -> Self {
        Self {
            max_image_cache_count: 200,
            closest_level: 0,
            restore_on_invalidate: true,
            drawer: Arc::new(SurfaceDrawer),
            url_priority: Priority::UserInitiated,
        }
    }

    /// Set how many tiles stay loaded before the least recently used are evicted.
    pub fn with_max_image_cache_count(mut self, count: usize) -> Self {
        self.max_image_cache_count = count;
        self
    }

    /// Set the deepest level that is always kept loaded.
    pub fn with_closest_level(mut self, level: u32) -> Self {
        self.closest_level = level;
        self
    }

    /// Set whether a full invalidation starts from the original tile data.
    pub fn with_restore_on_invalidate(mut self, restore: bool) -> Self {
        self.restore_on_invalidate = restore;
        self
    }

    /// Set the render backend.
    pub fn with_drawer(mut self, drawer: Arc<dyn Drawer>) -> Self {
        self.drawer = drawer;
        self
    }

    /// Set the priority of file reads done by the built-in url loader.
    pub fn with_url_priority(mut self, priority: Priority) -> Self {
        self.url_priority = priority;
        self
    }

    pub fn max_image_cache_count(&self) -> usize {
        self.max_image_cache_count
    }

    pub fn closest_level(&self) -> u32 {
        self.closest_level
    }

    pub fn restore_on_invalidate(&self) -> bool {
        self.restore_on_invalidate
    }

    pub fn drawer(&self) -> &Arc<dyn Drawer> {
        &self.drawer
    }

    pub fn url_priority(&self) -> Priority {
        self.url_priority
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::new()
    }
}
