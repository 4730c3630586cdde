// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Tiles and the records that hold their data.

A [Tile] never owns its data directly.  It names two [CacheKey]s:

* the *original* key, under which the data it was loaded with lives, and
* the *main* key, under which the data currently drawn for it lives.

Both usually point at the same [CacheRecord].  After an invalidation rewrites the tile, the
main key points at a new record while the original stays available for restoring.
Several tiles may share one record.
*/

mod cache_record;
mod drawer;
mod tile;
mod tile_cache;

pub use cache_record::CacheRecord;
pub use drawer::{Drawer, SurfaceDrawer};
pub use tile::{CacheKey, Tile, TileRef};
pub use tile_cache::{InjectCache, TileCache};
