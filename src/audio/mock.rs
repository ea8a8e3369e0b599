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
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{info, span, Level};

use super::{AudioError, Render, CHANNELS};
use crate::cancel::CancelHandle;

/// A mock device. Pulls audio at the configured rate and discards it,
/// keeping the most recent block around for inspection.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    block_size: usize,
    rendered_frames: Arc<AtomicU64>,
    last_block: Arc<Mutex<Vec<i16>>>,
    running: Arc<Mutex<Option<(CancelHandle, thread::JoinHandle<()>)>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str, sample_rate: u32, block_size: usize) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            block_size,
            rendered_frames: Arc::new(AtomicU64::new(0)),
            last_block: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns true if the device is currently pulling audio.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Returns the total number of frames rendered so far.
    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames.load(Ordering::Relaxed)
    }

    /// Returns a copy of the most recently rendered block.
    pub fn last_block(&self) -> Vec<i16> {
        self.last_block.lock().clone()
    }
}

impl super::Device for Device {
    /// Renders a block every block period on a background thread.
    fn start(&self, render: Arc<dyn Render>) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "audio output (mock)");
        let _enter = span.enter();

        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }
        info!(
            device = self.name,
            sample_rate = self.sample_rate,
            block_size = self.block_size,
            "Starting mock audio output"
        );

        let stop = CancelHandle::new();
        let period = Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64);
        let join = {
            let stop = stop.clone();
            let block_size = self.block_size;
            let rendered_frames = self.rendered_frames.clone();
            let last_block = self.last_block.clone();
            thread::spawn(move || {
                let mut block = vec![0i16; block_size * CHANNELS as usize];
                let mut deadline = Instant::now();
                while !stop.is_cancelled() {
                    render.render(&mut block);
                    rendered_frames.fetch_add(block_size as u64, Ordering::Relaxed);
                    {
                        let mut last = last_block.lock();
                        last.clear();
                        last.extend_from_slice(&block);
                    }

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        spin_sleep::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                }
            })
        };

        *running = Some((stop, join));
        Ok(())
    }

    fn stop(&self) {
        if let Some((stop, join)) = self.running.lock().take() {
            stop.cancel();
            let _ = join.join();
            info!(device = self.name, "Stopped mock audio output");
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, Box<dyn std::error::Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
