// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tile_pipeline::conversion::{ConversionRegistry, Data, DataType, Destructor, Transform};
use tile_pipeline::error::HookError;
use tile_pipeline::invalidation::{
    CacheProcessingState, Completion, InvalidationPipeline, MutationHook, TileInvalidatedEvent,
};
use tile_pipeline::tiles::{CacheKey, Drawer, Tile, TileRef};
use tile_pipeline::{Viewer, ViewerConfig};

pub const TEXT: &str = "text";

pub fn text_type() -> DataType {
    DataType::new(TEXT)
}

pub fn text(s: &str) -> Data {
    Arc::new(s.to_string())
}

pub fn read(data: &Data) -> String {
    data.downcast_ref::<String>().unwrap().clone()
}

/// Draws plain strings.
#[derive(Debug)]
pub struct TextDrawer;

impl Drawer for TextDrawer {
    fn name(&self) -> &str {
        "text"
    }
    fn supported_types(&self) -> Vec<DataType> {
        vec![text_type()]
    }
}

pub struct Fixture {
    pub viewer: Arc<Viewer>,
    pub pipeline: InvalidationPipeline,
    /// Every string released by the text destructor.
    pub released: Arc<Mutex<Vec<String>>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ViewerConfig::new())
    }

    pub fn with_config(config: ViewerConfig) -> Self {
        Self::with_drawer(config, Arc::new(TextDrawer))
    }

    pub fn with_drawer(config: ViewerConfig, drawer: Arc<dyn Drawer>) -> Self {
        let registry = Arc::new(ConversionRegistry::new());
        registry.learn(
            &text_type(),
            &text_type(),
            Transform::new(|_, data| Some(Arc::new(data.downcast_ref::<String>()?.clone()) as Data)),
            0,
            1,
        );
        let released = Arc::new(Mutex::new(Vec::new()));
        let log = released.clone();
        registry.learn_destroy(
            &text_type(),
            Destructor::new(move |data| {
                log.lock().unwrap().push(read(&data));
            }),
        );
        let viewer = Viewer::with_registry(config.with_drawer(drawer), registry);
        viewer.open();
        let pipeline = InvalidationPipeline::new(viewer.clone());
        Fixture {
            viewer,
            pipeline,
            released,
        }
    }

    pub async fn load(&self, level: u32, x: u32, content: &str) -> TileRef {
        let tile = Tile::new(level, x, 0, CacheKey::new(&format!("{level}/{x}_0")));
        self.pipeline.load_tile(&tile, text(content), text_type()).await;
        tile
    }

    pub fn main_text(&self, tile: &TileRef) -> String {
        read(&self.viewer.tile_cache().main_cache(tile).unwrap().data().unwrap())
    }

    pub fn original_text(&self, tile: &TileRef) -> String {
        read(&self.viewer.tile_cache().original_cache(tile).unwrap().data().unwrap())
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

/// Appends a suffix to the tile's text.
pub struct Append {
    pub suffix: &'static str,
    pub calls: AtomicUsize,
}

impl Append {
    pub fn new(suffix: &'static str) -> Arc<Self> {
        Arc::new(Append {
            suffix,
            calls: AtomicUsize::new(0),
        })
    }
}

impl MutationHook for Append {
    fn on_tile_invalidated<'a>(&'a self, event: &'a TileInvalidatedEvent) -> BoxFuture<'a, Result<(), HookError>> {
        async move {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let data = event.get_data(Some(&text_type())).await?;
            let next = format!("{}{}", read(&data), self.suffix);
            event.set_data(text(&next), &text_type()).await?;
            Ok(())
        }
        .boxed()
    }
}

/**
Tags the text with the call number.

The first call parks on `gate` after reading, so a test can issue more requests while it is
in flight.
*/
pub struct Gated {
    pub gate: Completion,
    pub calls: AtomicUsize,
    pub first_run: Mutex<Option<Arc<CacheProcessingState>>>,
}

impl Gated {
    pub fn new() -> Arc<Self> {
        Arc::new(Gated {
            gate: Completion::new(),
            calls: AtomicUsize::new(0),
            first_run: Mutex::new(None),
        })
    }
}

impl MutationHook for Gated {
    fn on_tile_invalidated<'a>(&'a self, event: &'a TileInvalidatedEvent) -> BoxFuture<'a, Result<(), HookError>> {
        async move {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            let data = event.get_data(Some(&text_type())).await?;
            if call == 0 {
                *self.first_run.lock().unwrap() = Some(event.run().clone());
                self.gate.wait().await;
            }
            event
                .set_data(text(&format!("{}#{call}", read(&data))), &text_type())
                .await?;
            Ok(())
        }
        .boxed()
    }
}

/// Writes `x`, then takes it back.
pub struct SetThenReset;

impl MutationHook for SetThenReset {
    fn on_tile_invalidated<'a>(&'a self, event: &'a TileInvalidatedEvent) -> BoxFuture<'a, Result<(), HookError>> {
        async move {
            event.set_data(text("x"), &text_type()).await?;
            event.reset_data();
            Ok(())
        }
        .boxed()
    }
}

/// Always fails after touching the data.
pub struct Failing;

impl MutationHook for Failing {
    fn on_tile_invalidated<'a>(&'a self, event: &'a TileInvalidatedEvent) -> BoxFuture<'a, Result<(), HookError>> {
        async move {
            event.set_data(text("broken"), &text_type()).await?;
            Err(HookError::Failed("boom".to_string()))
        }
        .boxed()
    }
}

/// Runs `inner` only while enabled.
pub struct Toggle {
    pub inner: Arc<dyn MutationHook>,
    pub enabled: AtomicBool,
}

impl Toggle {
    pub fn new(inner: Arc<dyn MutationHook>, enabled: bool) -> Arc<Self> {
        Arc::new(Toggle {
            inner,
            enabled: AtomicBool::new(enabled),
        })
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl MutationHook for Toggle {
    fn on_tile_invalidated<'a>(&'a self, event: &'a TileInvalidatedEvent) -> BoxFuture<'a, Result<(), HookError>> {
        if self.enabled.load(Ordering::Relaxed) {
            self.inner.on_tile_invalidated(event)
        } else {
            futures::future::ready(Ok(())).boxed()
        }
    }
}

/// Reads the data as stored and changes nothing.
pub struct ReadOnly;

impl MutationHook for ReadOnly {
    fn on_tile_invalidated<'a>(&'a self, event: &'a TileInvalidatedEvent) -> BoxFuture<'a, Result<(), HookError>> {
        async move {
            event.get_data(None).await?;
            Ok(())
        }
        .boxed()
    }
}

/// Tags the text with the call number.
pub struct Tag {
    pub calls: AtomicUsize,
}

impl Tag {
    pub fn new() -> Arc<Self> {
        Arc::new(Tag {
            calls: AtomicUsize::new(0),
        })
    }
}

impl MutationHook for Tag {
    fn on_tile_invalidated<'a>(&'a self, event: &'a TileInvalidatedEvent) -> BoxFuture<'a, Result<(), HookError>> {
        async move {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            let data = event.get_data(Some(&text_type())).await?;
            event
                .set_data(text(&format!("{}#{call}", read(&data))), &text_type())
                .await?;
            Ok(())
        }
        .boxed()
    }
}

pub const FRAMED: &str = "framed";

/// Draws only `framed` strings, `[like this]`.
#[derive(Debug)]
pub struct FramedDrawer;

impl Drawer for FramedDrawer {
    fn name(&self) -> &str {
        "framed"
    }
    fn supported_types(&self) -> Vec<DataType> {
        vec![DataType::new(FRAMED)]
    }
}

/**
A fixture drawing [FramedDrawer].

Framing a text containing `#0` parks on the returned gate, which holds the first run of a
[Tag] hook inside preparation.
*/
pub fn framed_fixture() -> (Fixture, Arc<Completion>) {
    let fixture = Fixture::with_drawer(ViewerConfig::new(), Arc::new(FramedDrawer));
    let gate = Arc::new(Completion::new());
    let registry = fixture.viewer.registry();
    let parked = gate.clone();
    registry.learn(
        &text_type(),
        &DataType::new(FRAMED),
        Transform::new_async(move |_, data| {
            let gate = parked.clone();
            async move {
                let s = data.downcast_ref::<String>()?.clone();
                if s.contains("#0") {
                    gate.wait().await;
                }
                Some(Arc::new(format!("[{s}]")) as Data)
            }
            .boxed()
        }),
        0,
        1,
    );
    registry.learn(
        &DataType::new(FRAMED),
        &text_type(),
        Transform::new(|_, data| {
            let s = data.downcast_ref::<String>()?;
            Some(Arc::new(s.trim_start_matches('[').trim_end_matches(']').to_string()) as Data)
        }),
        0,
        1,
    );
    let log = fixture.released.clone();
    registry.learn_destroy(
        &DataType::new(FRAMED),
        Destructor::new(move |data| {
            log.lock().unwrap().push(read(&data));
        }),
    );
    (fixture, gate)
}
