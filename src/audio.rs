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
use std::{error::Error, fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod mock;
pub mod thread_priority;
pub mod wav;

/// Number of interleaved output channels.
pub const CHANNELS: u16 = 2;

/// Produces audio on demand. Called from the audio output thread, so
/// implementations must not block for long.
pub trait Render: Send + Sync {
    /// Fills `out` with interleaved stereo frames. Every sample is written.
    fn render(&self, out: &mut [i16]);
}

/// Error types for audio output.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio stream error: {0}")]
    Stream(String),
}

pub trait Device: fmt::Display + Send + Sync {
    /// Starts pulling audio from the renderer. Returns once the output is
    /// running; audio continues until stop is called.
    fn start(&self, render: Arc<dyn Render>) -> Result<(), AudioError>;

    /// Stops the output. Does nothing if the output isn't running.
    fn stop(&self);

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device for the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, AudioError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(
            device,
            config.sample_rate(),
            config.block_size(),
        )));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::SampleEngine;
    use crate::test::eventually;

    #[test]
    fn test_mock_device_from_config() {
        let device = get_device(&config::Audio::new("mock-output")).unwrap();
        assert_eq!(device.to_string(), "mock-output (Mock)");

        let mock = device.to_mock().unwrap();
        device.start(Arc::new(SampleEngine::new(4, 512))).unwrap();
        eventually(|| mock.rendered_frames() >= 512, "Mock never rendered");
        assert!(mock.last_block().iter().all(|s| *s == 0));

        device.stop();
        assert!(!mock.is_running());
    }
}
