// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Coordinates preset changes: builds banks in the background, one at a time,
//! and publishes them to the engine when they complete.

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error, info, span, warn, Level};

use crate::cancel::CancelHandle;
use crate::samples::{self, BankError, PresetLibrary, SampleBank, SampleEngine};
use crate::status::{PresetStatus, StatusSink};

/// Number of selectable presets.
const PRESET_COUNT: i32 = 128;

/// A running bank build.
struct BuildTask {
    cancel: CancelHandle,
    join: thread::JoinHandle<()>,
}

/// Everything a build thread needs.
#[derive(Clone)]
struct BuildContext {
    engine: Arc<SampleEngine>,
    library: PresetLibrary,
    sink: Arc<dyn StatusSink>,
    label: Arc<Mutex<Option<String>>>,
    status: Arc<Mutex<Option<PresetStatus>>>,
}

impl BuildContext {
    fn report(&self, status: PresetStatus) {
        *self.status.lock() = Some(status);
        let label = self.label.lock().clone();
        self.sink.publish(status, label.as_deref());
    }

    fn publish_empty(&self, index: u8) {
        self.engine.publish_bank(SampleBank::empty());
        self.report(PresetStatus::Empty(index));
    }

    /// Builds and publishes the given preset unless cancelled first.
    fn build(&self, index: u8, cancel: &CancelHandle) {
        let span = span!(Level::INFO, "preset build", preset = index);
        let _enter = span.enter();

        let entry = match self.library.find(index) {
            Ok(entry) => entry,
            Err(e) => {
                if cancel.is_cancelled() {
                    return;
                }
                match e {
                    BankError::NoMatchingPreset(_) => info!("Preset empty"),
                    e => warn!(err = %e, "Unable to read samples directory"),
                }
                *self.label.lock() = None;
                self.publish_empty(index);
                return;
            }
        };

        *self.label.lock() = Some(entry.label().to_string());
        info!(dir = ?entry.path(), "Preset loading");
        self.report(PresetStatus::Loading(index));

        match samples::build_bank(entry.path(), cancel) {
            Ok(Some(bank)) if !cancel.is_cancelled() => {
                let empty = bank.is_empty();
                self.engine.publish_bank(bank);
                if empty {
                    info!("Preset empty");
                    self.report(PresetStatus::Empty(index));
                } else {
                    info!("Preset loaded");
                    self.report(PresetStatus::Ready(index));
                }
            }
            Ok(_) => debug!("Preset build cancelled"),
            Err(e) => {
                error!(err = %e, "Unable to build preset");
                self.publish_empty(index);
            }
        }
    }
}

/// Loads presets on request. At most one bank build runs at a time, and a new
/// request cancels the one in flight.
pub struct PresetLoader {
    context: BuildContext,
    current: Mutex<u8>,
    task: Mutex<Option<BuildTask>>,
}

impl PresetLoader {
    /// Creates a new preset loader. Nothing is loaded until the first request.
    pub fn new(
        engine: Arc<SampleEngine>,
        library: PresetLibrary,
        sink: Arc<dyn StatusSink>,
    ) -> PresetLoader {
        PresetLoader {
            context: BuildContext {
                engine,
                library,
                sink,
                label: Arc::new(Mutex::new(None)),
                status: Arc::new(Mutex::new(None)),
            },
            current: Mutex::new(0),
            task: Mutex::new(None),
        }
    }

    /// Starts loading the given preset in the background and returns immediately.
    ///
    /// Any build in flight is cancelled. The new build waits for it to finish,
    /// so the last request always determines the published bank.
    pub fn request_reload(&self, index: u8) {
        info!(preset = index, "Preset requested");
        *self.current.lock() = index;

        let mut task = self.task.lock();
        let previous = task.take();
        if let Some(previous) = &previous {
            previous.cancel.cancel();
        }

        let cancel = CancelHandle::new();
        let join = {
            let cancel = cancel.clone();
            let context = self.context.clone();
            thread::spawn(move || {
                if let Some(previous) = previous {
                    if previous.join.join().is_err() {
                        error!("Previous preset build panicked");
                    }
                }
                if !cancel.is_cancelled() {
                    context.build(index, &cancel);
                }
            })
        };
        *task = Some(BuildTask { cancel, join });
    }

    /// Moves the current preset by the given amount, wrapping around, and loads it.
    pub fn step(&self, delta: i32) -> u8 {
        let current = *self.current.lock() as i32;
        let index = (current + delta).rem_euclid(PRESET_COUNT) as u8;
        self.request_reload(index);
        index
    }

    /// Returns the most recently requested preset.
    pub fn current_preset(&self) -> u8 {
        *self.current.lock()
    }

    /// Returns the label of the most recently loaded preset directory.
    pub fn current_label(&self) -> Option<String> {
        self.context.label.lock().clone()
    }

    /// Returns the most recently reported status.
    pub fn status(&self) -> Option<PresetStatus> {
        *self.context.status.lock()
    }

    /// Blocks until no build is running. New requests wait until this returns.
    pub fn wait_idle(&self) {
        let mut task = self.task.lock();
        Self::join_task(&mut task);
    }

    /// Cancels any build in flight and waits for it to stop.
    pub fn shutdown(&self) {
        let mut task = self.task.lock();
        if let Some(running) = task.as_ref() {
            running.cancel.cancel();
        }
        Self::join_task(&mut task);
    }

    /// Joins the running build. The task lock stays held by the caller so a
    /// concurrent request can't start a second build alongside this one.
    fn join_task(task: &mut Option<BuildTask>) {
        if let Some(task) = task.take() {
            if task.join.join().is_err() {
                error!("Preset build panicked");
            }
        }
    }
}

impl std::fmt::Debug for PresetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresetLoader")
            .field("current", &self.current_preset())
            .field("label", &self.current_label())
            .field("status", &self.status())
            .finish()
    }
}
