// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! End-to-end invalidation runs against a viewer with a plain-text data type.

mod common;

use common::{Append, Failing, Fixture, Gated, ReadOnly, SetThenReset, Tag, Toggle, framed_fixture, read, text};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tile_pipeline::ViewerConfig;
use tile_pipeline::conversion::{DataType, Destructor};
use tile_pipeline::invalidation::RunStatus;
use tile_pipeline::tiles::{CacheKey, Tile};

#[test_executors::async_test]
async fn hooks_run_on_first_load() {
    let fixture = Fixture::new();
    let hook = Append::new("!");
    fixture.pipeline.add_hook(hook.clone());
    let tile = fixture.load(0, 0, "a").await;

    assert_eq!(fixture.main_text(&tile), "a!");
    assert_eq!(fixture.original_text(&tile), "a");
    assert_eq!(hook.calls.load(Ordering::Relaxed), 1);
    assert!(!tile.is_processing());
    tile.wait_processed().await;
    assert!(fixture.viewer.redraw_count() >= 1);
}

#[test_executors::async_test]
async fn restore_starts_from_original() {
    let fixture = Fixture::new();
    let tile = fixture.load(0, 0, "a").await;
    fixture.pipeline.add_hook(Append::new("!"));

    fixture.pipeline.request_invalidate(true).await;
    assert_eq!(fixture.main_text(&tile), "a!");
    fixture.pipeline.request_invalidate(true).await;
    assert_eq!(fixture.main_text(&tile), "a!");
    //the replaced modification was released, the original was not
    assert!(fixture.released().contains(&"a!".to_string()));
    assert_eq!(fixture.viewer.tile_cache().num_caches(), 2);

    fixture.pipeline.request_invalidate(false).await;
    assert_eq!(fixture.main_text(&tile), "a!!");
    assert_eq!(fixture.original_text(&tile), "a");
}

#[test_executors::async_test]
async fn superseded_run_never_swaps() {
    let fixture = Fixture::new();
    let tile = fixture.load(0, 0, "a").await;
    let original = fixture.viewer.tile_cache().original_cache(&tile).unwrap();
    let hook = Gated::new();
    fixture.pipeline.add_hook(hook.clone());

    futures::join!(fixture.pipeline.request_invalidate(true), async {
        //the first run is parked inside its hook; nothing is visible yet
        let main = fixture.viewer.tile_cache().main_cache(&tile).unwrap();
        assert!(Arc::ptr_eq(&main, &original));
        fixture.pipeline.request_invalidate(true).await;
        hook.gate.resolve();
    });

    let first = hook.first_run.lock().unwrap().clone().unwrap();
    assert_eq!(first.status(), RunStatus::FinishedOutdated);
    assert_eq!(hook.calls.load(Ordering::Relaxed), 2);
    assert_eq!(fixture.main_text(&tile), "a#1");
    //the parked run's result was thrown away
    assert!(fixture.released().contains(&"a#0".to_string()));
    assert!(!tile.is_processing());
}

#[test_executors::async_test]
async fn reset_restores_original_data() {
    let fixture = Fixture::new();
    let append = Toggle::new(Append::new("!"), true);
    let reset = Toggle::new(Arc::new(SetThenReset), false);
    fixture.pipeline.add_hook(append.clone());
    fixture.pipeline.add_hook(reset.clone());
    let tile = fixture.load(0, 0, "a").await;
    assert_eq!(fixture.main_text(&tile), "a!");

    append.set(false);
    reset.set(true);
    fixture.pipeline.request_invalidate(true).await;

    assert_eq!(fixture.main_text(&tile), "a");
    let cache = fixture.viewer.tile_cache();
    assert!(Arc::ptr_eq(
        &cache.main_cache(&tile).unwrap(),
        &cache.original_cache(&tile).unwrap()
    ));
    let released = fixture.released();
    assert!(released.contains(&"x".to_string()));
    assert!(released.contains(&"a!".to_string()));
}

#[test_executors::async_test]
async fn failing_hook_still_finishes() {
    let fixture = Fixture::new();
    let tile = fixture.load(0, 0, "a").await;
    fixture.pipeline.add_hook(Arc::new(Failing));

    fixture.pipeline.request_invalidate(true).await;

    assert_eq!(fixture.main_text(&tile), "a");
    assert!(!tile.is_processing());
    tile.wait_processed().await;
    assert!(fixture.released().contains(&"broken".to_string()));
}

#[test_executors::async_test]
async fn unloading_outdates_the_run() {
    let fixture = Fixture::new();
    let tile = fixture.load(0, 0, "a").await;
    let hook = Gated::new();
    fixture.pipeline.add_hook(hook.clone());

    futures::join!(fixture.pipeline.request_invalidate(true), async {
        fixture.viewer.tile_cache().unload_tile(&tile, None).await;
        hook.gate.resolve();
    });

    let first = hook.first_run.lock().unwrap().clone().unwrap();
    assert_eq!(first.status(), RunStatus::FinishedOutdated);
    assert!(!tile.is_loaded());
    assert_eq!(fixture.viewer.tile_cache().num_caches(), 0);
    assert!(fixture.released().contains(&"a#0".to_string()));
    assert!(first.completion().is_resolved());
    tile.wait_processed().await;
}

#[test_executors::async_test]
async fn destroying_the_viewer_outdates_the_run() {
    let fixture = Fixture::new();
    let tile = fixture.load(0, 0, "a").await;
    let hook = Gated::new();
    fixture.pipeline.add_hook(hook.clone());

    futures::join!(fixture.pipeline.request_invalidate(true), async {
        fixture.viewer.destroy().await;
        hook.gate.resolve();
    });

    let first = hook.first_run.lock().unwrap().clone().unwrap();
    assert_eq!(first.status(), RunStatus::FinishedOutdated);
    assert!(fixture.viewer.is_destroyed());
    assert!(!tile.is_loaded());
    assert!(first.completion().is_resolved());
    tile.wait_processed().await;
}

#[test_executors::async_test]
async fn invalidation_unloads_tiles_off_screen() {
    let fixture = Fixture::with_config(ViewerConfig::new().with_closest_level(0));
    let a = fixture.load(2, 0, "a").await;
    let b = fixture.load(2, 1, "b").await;
    let c = fixture.load(2, 2, "c").await;
    let shallow = fixture.load(0, 0, "s").await;
    fixture.pipeline.draw(&[b.clone()]).await;

    fixture.pipeline.request_invalidate(true).await;

    assert!(!a.is_loaded());
    assert!(b.is_loaded());
    assert!(!c.is_loaded());
    assert!(shallow.is_loaded());
    assert_eq!(fixture.viewer.tile_cache().num_tiles_loaded(), 2);
}

#[test_executors::async_test]
async fn drawing_catches_up_on_missed_invalidations() {
    let fixture = Fixture::new();
    let tile = fixture.load(0, 0, "a").await;
    let hook = Append::new("!");
    fixture.pipeline.add_hook(hook.clone());

    fixture.viewer.close();
    let stamp = fixture.pipeline.request_invalidate(true).await;
    assert_eq!(hook.calls.load(Ordering::Relaxed), 0);
    assert_eq!(fixture.pipeline.invalidated_at(), stamp);

    fixture.viewer.open();
    let redraws = fixture.viewer.redraw_count();
    fixture.pipeline.draw(&[tile.clone()]).await;

    assert_eq!(hook.calls.load(Ordering::Relaxed), 1);
    assert_eq!(fixture.main_text(&tile), "a!");
    let original = fixture.viewer.tile_cache().original_cache(&tile).unwrap();
    assert!(original.invalidation_stamp().unwrap() > stamp);
    assert!(fixture.viewer.redraw_count() > redraws);

    //up to date now, drawing again does nothing
    fixture.pipeline.draw(&[tile.clone()]).await;
    assert_eq!(hook.calls.load(Ordering::Relaxed), 1);
}

#[test_executors::async_test]
async fn tiles_sharing_data_are_swapped_together() {
    let fixture = Fixture::new();
    let key = CacheKey::new("shared");
    let first = Tile::new(0, 0, 0, key.clone());
    let second = Tile::new(0, 1, 0, key);
    fixture.pipeline.load_tile(&first, common::text("a"), common::text_type()).await;
    fixture.pipeline.load_tile(&second, common::text("b"), common::text_type()).await;
    //the second tile reuses the first tile's data
    assert_eq!(fixture.main_text(&second), "a");
    assert!(fixture.released().contains(&"b".to_string()));

    let hook = Append::new("!");
    fixture.pipeline.add_hook(hook.clone());
    fixture.pipeline.request_invalidate(true).await;

    assert_eq!(hook.calls.load(Ordering::Relaxed), 1);
    let cache = fixture.viewer.tile_cache();
    assert!(Arc::ptr_eq(
        &cache.main_cache(&first).unwrap(),
        &cache.main_cache(&second).unwrap()
    ));
    assert_eq!(fixture.main_text(&second), "a!");
}

#[test_executors::async_test]
async fn reading_a_type_without_copy_leaves_the_original_alone() {
    let fixture = Fixture::new();
    let log = fixture.released.clone();
    fixture.viewer.registry().learn_destroy(
        &DataType::new("blob"),
        Destructor::new(move |data| {
            log.lock().unwrap().push(read(&data));
        }),
    );
    let tile = Tile::new(0, 0, 0, CacheKey::new("0/0_0"));
    fixture
        .pipeline
        .load_tile(&tile, text("orig"), DataType::new("blob"))
        .await;
    fixture.pipeline.add_hook(Arc::new(ReadOnly));

    fixture.pipeline.request_invalidate(true).await;
    fixture.pipeline.request_invalidate(false).await;

    assert!(fixture.released().is_empty());
    assert_eq!(fixture.original_text(&tile), "orig");
    assert_eq!(fixture.main_text(&tile), "orig");
}

#[test_executors::async_test]
async fn working_cache_gone_stale_during_preparation_is_dropped() {
    let (fixture, gate) = framed_fixture();
    let tile = fixture.load(0, 0, "a").await;
    assert_eq!(fixture.main_text(&tile), "[a]");
    fixture.pipeline.add_hook(Tag::new());

    futures::join!(fixture.pipeline.request_invalidate(true), async {
        //a missed invalidation bumps the global stamp only
        fixture.viewer.close();
        fixture.pipeline.request_invalidate(true).await;
        fixture.viewer.open();
        gate.resolve();
    });

    assert!(fixture.released().contains(&"[a#0]".to_string()));
    let cache = fixture.viewer.tile_cache();
    assert!(Arc::ptr_eq(
        &cache.main_cache(&tile).unwrap(),
        &cache.original_cache(&tile).unwrap()
    ));
    assert_eq!(fixture.main_text(&tile), "[a]");
}

#[test_executors::async_test]
async fn working_cache_superseded_during_preparation_is_dropped() {
    let (fixture, gate) = framed_fixture();
    let tile = fixture.load(0, 0, "a").await;
    fixture.pipeline.add_hook(Tag::new());

    futures::join!(fixture.pipeline.request_invalidate(true), async {
        fixture.pipeline.request_invalidate(true).await;
        gate.resolve();
    });

    assert_eq!(fixture.main_text(&tile), "[a#1]");
    assert_eq!(fixture.original_text(&tile), "[a]");
    assert!(fixture.released().contains(&"[a#0]".to_string()));
    assert!(!fixture.released().contains(&"[a#1]".to_string()));
    tile.wait_processed().await;
}
