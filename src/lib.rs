/*! tile_pipeline is the data layer of a deep-zoom tile viewer.

A deep-zoom viewer draws a pyramid of image tiles.  Most of what happens to a tile after
it is fetched is plumbing, but two parts have real structure, and this crate implements
both of them:

| Layer        | Types                                                      | Job                                                        |
|--------------|------------------------------------------------------------|------------------------------------------------------------|
| Conversion   | [conversion::ConversionGraph], [conversion::ConversionRegistry], [conversion::ConversionEngine] | Move a value between representations along the cheapest known path |
| Invalidation | [invalidation::InvalidationPipeline], [invalidation::CacheProcessingState] | Let external code rewrite pixel data of tiles that are already on screen |

# Conversion

Every piece of tile data travels with a [conversion::DataType], an opaque identifier such as
`"imageUrl"`, `"image"` or `"context2d"`.  Conversions are learned as weighted edges between
identifiers.  Asking for data in another representation finds the cheapest path, walks it
one (possibly asynchronous) step at a time, and releases every intermediate value before
the next step begins.

# Invalidation

Invalidating a tile stamps its original cache record with a new generation, then hands the
tile to every registered [invalidation::MutationHook].  Hooks read and write a private
working copy of the data.  When they settle, the working copy is either promoted into the
tile's main cache slot in one step, or thrown away if a newer generation arrived in the
meantime.  At most one run is ever in flight per cache record.

# Runtime

There is no executor in here.  Every operation is a future; drive it with whatever
executor your application already has.  Everything is `Send`, so a multithreaded executor
is fine, but the ordering guarantees are written in terms of a single logical thread.
*/

pub mod config;
pub mod conversion;
pub mod error;
pub mod invalidation;
pub mod tiles;
pub mod viewer;

pub use config::ViewerConfig;
pub use invalidation::InvalidationPipeline;
pub use viewer::Viewer;

pub type Priority = async_file::Priority;
