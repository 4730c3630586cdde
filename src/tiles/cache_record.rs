// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! One unit of tile data.

use crate::conversion::{ConversionEngine, Data, DataType};
use crate::error::DataError;
use crate::invalidation::ProcessingSlot;
use crate::tiles::{Drawer, TileRef};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordState {
    data: Option<Data>,
    ty: Option<DataType>,
    tiles: Vec<TileRef>,
    destroyed: bool,
}

/**
Holds one value, its [DataType], and the tiles that draw it.

Data can be read as any type the conversion graph reaches.  Reading without a copy converts
the record in place; reading with a copy leaves the record untouched.
*/
pub struct CacheRecord {
    engine: ConversionEngine,
    state: Mutex<RecordState>,
    processing: Arc<ProcessingSlot>,
}

impl Debug for CacheRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("CacheRecord")
            .field("ty", &state.ty)
            .field("tiles", &state.tiles.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl CacheRecord {
    /// An empty record.
    pub fn new(engine: ConversionEngine) -> Arc<Self> {
        Arc::new(CacheRecord {
            engine,
            state: Mutex::new(RecordState::default()),
            processing: Arc::new(ProcessingSlot::default()),
        })
    }

    /// A record holding `data` for `tile`.
    pub fn with_data(engine: ConversionEngine, tile: &TileRef, data: Data, ty: DataType) -> Arc<Self> {
        let record = Self::new(engine);
        record.add_tile(tile, Some((data, ty)));
        record
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.state.lock().unwrap().ty.clone()
    }

    /// The current value, without conversion.
    pub fn data(&self) -> Option<Data> {
        self.state.lock().unwrap().data.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().unwrap().data.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    pub fn tiles(&self) -> Vec<TileRef> {
        self.state.lock().unwrap().tiles.clone()
    }

    pub fn tile_count(&self) -> usize {
        self.state.lock().unwrap().tiles.len()
    }

    pub(crate) fn processing(&self) -> &Arc<ProcessingSlot> {
        &self.processing
    }

    /// Stamp of the latest invalidation run admitted on this record.
    pub fn invalidation_stamp(&self) -> Option<u64> {
        self.processing.stamp()
    }

    /**
    References this record from `tile`.

    `data` is only used when the record has no data yet; a record that is already populated
    keeps what it has.  Returns whether `data` was adopted.
    */
    pub fn add_tile(&self, tile: &TileRef, data: Option<(Data, DataType)>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.destroyed {
            logwise::warn_sync!("Adding tile {tile} to a destroyed cache record", tile = tile.to_string());
            return false;
        }
        if !state.tiles.iter().any(|t| Arc::ptr_eq(t, tile)) {
            state.tiles.push(tile.clone());
        }
        if state.data.is_none() {
            if let Some((data, ty)) = data {
                state.data = Some(data);
                state.ty = Some(ty);
                return true;
            }
        }
        false
    }

    /// Drops the reference from `tile`.  Returns how many tiles still reference the record.
    pub fn remove_tile(&self, tile: &TileRef) -> usize {
        let mut state = self.state.lock().unwrap();
        state.tiles.retain(|t| !Arc::ptr_eq(t, tile));
        state.tiles.len()
    }

    fn snapshot(&self) -> Result<(Data, DataType, Option<TileRef>), DataError> {
        let state = self.state.lock().unwrap();
        match (&state.data, &state.ty) {
            (Some(data), Some(ty)) if !state.destroyed => Ok((data.clone(), ty.clone(), state.tiles.first().cloned())),
            _ => Err(DataError::Destroyed),
        }
    }

    /**
    Reads the data as `ty` (or as stored, if `None`).

    With `copy`, the returned value is independent of the record: same-type reads go through
    the type's copy operator, and conversions already produce a fresh value.  A type without
    a copy operator is treated as immutable and shared, unless it has a destructor: such a
    value can't be shared safely, so the read fails with [DataError::CopyFailed].

    Without `copy`, a conversion replaces the record's value and releases the old one.
    */
    pub async fn get_data_as(&self, ty: Option<&DataType>, copy: bool) -> Result<Data, DataError> {
        let (data, current, owner) = self.snapshot()?;
        let ty = ty.cloned().unwrap_or_else(|| current.clone());
        if ty == current {
            if !copy {
                return Ok(data);
            }
            if self.engine.registry().copy_operator(&ty).is_none() {
                //a shared value would be released twice
                if self.engine.registry().destructor(&ty).is_some() {
                    logwise::warn_sync!("Can't copy {ty}, it has a destructor but no copy operator", ty = ty.to_string());
                    return Err(DataError::CopyFailed(ty));
                }
                return Ok(data);
            }
            return self
                .engine
                .copy(owner.as_ref(), data, &ty)
                .await
                .ok_or(DataError::CopyFailed(ty));
        }
        let converted = self
            .engine
            .convert(owner.as_ref(), data.clone(), &current, std::slice::from_ref(&ty))
            .await
            .ok_or_else(|| DataError::ConversionImpossible {
                from: current.clone(),
                to: ty.clone(),
            })?;
        if !copy {
            self.replace(&data, converted.clone(), ty).await;
        }
        Ok(converted)
    }

    /// Replaces the data, releasing the previous value.
    pub async fn set_data_as(&self, data: Data, ty: &DataType) -> Result<(), DataError> {
        let previous = {
            let mut state = self.state.lock().unwrap();
            if state.destroyed {
                return Err(DataError::Destroyed);
            }
            let previous_data = state.data.replace(data.clone());
            let previous_ty = state.ty.replace(ty.clone());
            previous_data.zip(previous_ty)
        };
        if let Some((previous, previous_ty)) = previous {
            if !Arc::ptr_eq(&previous, &data) {
                self.release(previous, &previous_ty).await;
            }
        }
        Ok(())
    }

    //swap `expected` for `data` unless someone replaced it in the meantime
    async fn replace(&self, expected: &Data, data: Data, ty: DataType) {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            let still_current = state.data.as_ref().is_some_and(|d| Arc::ptr_eq(d, expected));
            if still_current && !state.destroyed {
                let previous_ty = state.ty.replace(ty.clone());
                Ok(state.data.replace(data).zip(previous_ty))
            } else {
                Err(data)
            }
        };
        match outcome {
            Ok(Some((previous, previous_ty))) => self.release(previous, &previous_ty).await,
            Ok(None) => {}
            //lost the race, the conversion result is unused
            Err(unused) => self.release(unused, &ty).await,
        }
    }

    async fn release(&self, data: Data, ty: &DataType) {
        if let Some(release) = self.engine.destroy(data, ty) {
            release.await;
        }
    }

    /**
    Converts the record in place to a type `drawer` can draw.

    Returns `false` if the record is empty, destroyed, or cannot be converted.
    */
    pub async fn prepare_for_rendering(&self, drawer: &dyn Drawer) -> bool {
        let Ok((data, current, owner)) = self.snapshot() else {
            return false;
        };
        let supported = drawer.supported_types();
        if supported.is_empty() || supported.contains(&current) {
            return true;
        }
        let Some(path) = self.engine.registry().get_conversion_path(&current, &supported) else {
            logwise::warn_sync!(
                "Drawer {drawer} can't draw {ty}",
                drawer = drawer.name().to_string(),
                ty = current.to_string()
            );
            return false;
        };
        let Some(target) = path.edges().last().map(|e| e.to().clone()) else {
            return true;
        };
        match self
            .engine
            .convert(owner.as_ref(), data.clone(), &current, std::slice::from_ref(&target))
            .await
        {
            Some(converted) => {
                self.replace(&data, converted, target).await;
                true
            }
            None => false,
        }
    }

    /// Releases the data and detaches all tiles.  Idempotent.
    pub async fn destroy(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.tiles.clear();
            let ty = state.ty.take();
            state.data.take().zip(ty)
        };
        if let Some((data, ty)) = previous {
            self.release(data, &ty).await;
        }
    }
}
