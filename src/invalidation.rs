// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Rewriting the data of tiles that are already loaded.

[InvalidationPipeline] hands tiles to [MutationHook]s and swaps their results in.
[ProcessingSlot] makes sure only one run per cache record is ever in flight.
*/

mod hook;
mod pipeline;
mod processing_state;

pub use hook::{MutationHook, TileInvalidatedEvent};
pub use pipeline::{InvalidationPipeline, ProcessOptions};
pub use processing_state::{CacheProcessingState, Completion, ProcessingSlot, RunStatus};
