// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Run admission for one cache record.

use crate::tiles::TileRef;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, Weak};

#[derive(Default)]
struct CompletionState {
    resolved: bool,
    wake_list: Vec<r#continue::Sender<()>>,
}

/**
A one-shot signal shared by every tile stamped by the same run.

Resolving it once wakes every waiter; later resolutions do nothing.
*/
#[derive(Default)]
pub struct Completion {
    state: Mutex<CompletionState>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().unwrap().resolved
    }

    pub fn resolve(&self) {
        let wake_list = {
            let mut state = self.state.lock().unwrap();
            if state.resolved {
                return;
            }
            state.resolved = true;
            std::mem::take(&mut state.wake_list)
        };
        for sender in wake_list {
            sender.send(());
        }
    }

    pub async fn wait(&self) {
        let (s, f) = r#continue::continuation();
        {
            let mut state = self.state.lock().unwrap();
            if state.resolved {
                drop(state);
                s.send(());
            } else {
                state.wake_list.push(s);
            }
        }
        f.await
    }
}

impl Debug for Completion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").field("resolved", &self.is_resolved()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Finished,
    FinishedOutdated,
}

/**
One invalidation attempt on one cache record.

A run starts [RunStatus::Running] and ends exactly once, either finished or finished outdated.
*/
pub struct CacheProcessingState {
    stamp: u64,
    restore: bool,
    status: Mutex<RunStatus>,
    completion: Arc<Completion>,
    tiles: Vec<TileRef>,
    slot: Weak<ProcessingSlot>,
}

impl CacheProcessingState {
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn restore(&self) -> bool {
        self.restore
    }

    pub fn status(&self) -> RunStatus {
        *self.status.lock().unwrap()
    }

    pub fn is_finished(&self) -> bool {
        self.status() != RunStatus::Running
    }

    /// Whether the run ended as superseded.
    pub fn is_outdated(&self) -> bool {
        self.status() == RunStatus::FinishedOutdated
    }

    pub fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }

    /**
    Ends the run.

    A non-outdated finish resolves the shared completion.  An outdated finish leaves it pending
    for whichever run replaces this one.  Only the first call has any effect; returns whether
    this call was it.
    */
    pub fn finish(&self, outdated: bool) -> bool {
        {
            let mut status = self.status.lock().unwrap();
            if *status != RunStatus::Running {
                return false;
            }
            *status = if outdated {
                RunStatus::FinishedOutdated
            } else {
                RunStatus::Finished
            };
        }
        for tile in &self.tiles {
            tile.clear_processing(self.stamp);
        }
        if let Some(slot) = self.slot.upgrade() {
            slot.release(self, outdated);
        }
        if !outdated {
            self.completion.resolve();
        }
        logwise::trace_sync!(
            "Invalidation run {stamp} finished, outdated: {outdated}",
            stamp = self.stamp,
            outdated = outdated
        );
        true
    }
}

impl Debug for CacheProcessingState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheProcessingState")
            .field("stamp", &self.stamp)
            .field("restore", &self.restore)
            .field("status", &self.status())
            .finish()
    }
}

#[derive(Default)]
struct SlotState {
    current: Option<Arc<CacheProcessingState>>,
    //shared by consecutive runs until one of them finishes normally
    completion: Option<Arc<Completion>>,
    stamp: Option<u64>,
    was_restored: bool,
}

/**
Admission control for runs on one cache record.

At most one run is [RunStatus::Running] at a time.  Admitting a new run first finishes the
current one as outdated.
*/
#[derive(Default)]
pub struct ProcessingSlot {
    state: Mutex<SlotState>,
}

impl ProcessingSlot {
    /// Stamp of the most recently admitted run.
    pub fn stamp(&self) -> Option<u64> {
        self.state.lock().unwrap().stamp
    }

    /// The restore flag of the most recently admitted run.
    pub fn was_restored(&self) -> bool {
        self.state.lock().unwrap().was_restored
    }

    pub fn current(&self) -> Option<Arc<CacheProcessingState>> {
        self.state.lock().unwrap().current.clone()
    }

    /**
    Installs a new running state stamped `stamp`, outdating the one already running.

    The superseded run's finish side effects complete before this returns, and `tiles` are all
    stamped with the new run.
    */
    pub fn admit(self: &Arc<Self>, stamp: u64, restore: bool, tiles: Vec<TileRef>) -> Arc<CacheProcessingState> {
        loop {
            let previous = self.state.lock().unwrap().current.take();
            match previous {
                Some(previous) => {
                    logwise::trace_sync!(
                        "Run {old} superseded by {new}",
                        old = previous.stamp(),
                        new = stamp
                    );
                    previous.finish(true);
                }
                None => {
                    let mut state = self.state.lock().unwrap();
                    //someone may have slipped in between the take and this lock
                    if state.current.is_some() {
                        continue;
                    }
                    let completion = match &state.completion {
                        Some(c) if !c.is_resolved() => c.clone(),
                        _ => Arc::new(Completion::new()),
                    };
                    let run = Arc::new(CacheProcessingState {
                        stamp,
                        restore,
                        status: Mutex::new(RunStatus::Running),
                        completion: completion.clone(),
                        tiles,
                        slot: Arc::downgrade(self),
                    });
                    state.current = Some(run.clone());
                    state.completion = Some(completion.clone());
                    state.stamp = Some(stamp);
                    state.was_restored = restore;
                    drop(state);
                    for tile in &run.tiles {
                        tile.mark_processing(stamp, completion.clone());
                    }
                    logwise::trace_sync!("Run {stamp} admitted", stamp = stamp);
                    return run;
                }
            }
        }
    }

    fn release(&self, run: &CacheProcessingState, outdated: bool) {
        let mut state = self.state.lock().unwrap();
        if state.current.as_deref().is_some_and(|c| std::ptr::eq(c, run)) {
            state.current = None;
        }
        if !outdated {
            state.completion = None;
        }
    }
}

impl Debug for ProcessingSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("ProcessingSlot")
            .field("stamp", &state.stamp)
            .field("running", &state.current.is_some())
            .finish()
    }
}
