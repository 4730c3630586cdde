// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The render backend, as far as tile data is concerned.

use crate::conversion::DataType;
use crate::conversion::builtin::{CONTEXT_2D, IMAGE};
use std::fmt::Debug;

/**
A render backend.

The data layer only needs to know which representations a backend can draw.  Before a record
is swapped into a tile's main slot it is converted to one of these.
*/
pub trait Drawer: Send + Sync + Debug {
    fn name(&self) -> &str;
    /// Representations this backend draws, most preferred first.
    fn supported_types(&self) -> Vec<DataType>;
}

/// Draws [crate::conversion::builtin::DrawingSurface]s, or decoded images directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct SurfaceDrawer;

impl Drawer for SurfaceDrawer {
    fn name(&self) -> &str {
        "surface"
    }
    fn supported_types(&self) -> Vec<DataType> {
        vec![DataType::new(CONTEXT_2D), DataType::new(IMAGE)]
    }
}
