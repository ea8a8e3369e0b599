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
use std::path::PathBuf;
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_EXCLUDE: &str = "Midi Through";

/// MIDI input ports discovered through the host MIDI system.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Midi {
    /// Whether to connect to MIDI input ports at all (default: true)
    enabled: Option<bool>,
    /// How often to look for newly connected ports (default: 2s)
    poll_interval: Option<String>,
    /// Ports whose names contain any of these are ignored (default: "Midi Through")
    exclude: Option<Vec<String>>,
}

impl Midi {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Returns the port polling interval.
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        match &self.poll_interval {
            Some(interval) => DurationString::from_string(interval.clone())
                .map(Duration::from)
                .map_err(|e| ConfigError::InvalidDuration {
                    field: "midi.poll_interval",
                    value: interval.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(DEFAULT_POLL_INTERVAL),
        }
    }

    pub fn exclude(&self) -> Vec<String> {
        self.exclude
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_EXCLUDE.to_string()])
    }
}

/// A raw serial MIDI input, such as a UART wired to a DIN socket.
#[derive(Deserialize, Clone, Debug)]
pub struct SerialMidi {
    /// The serial device path. The line speed is configured outside of this program.
    device: PathBuf,
}

impl SerialMidi {
    pub fn new(device: PathBuf) -> SerialMidi {
        SerialMidi { device }
    }

    pub fn device(&self) -> &PathBuf {
        &self.device
    }
}
