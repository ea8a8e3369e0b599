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

//! Preset status reporting for displays.

use std::fmt;

use parking_lot::Mutex;
use tracing::info;

/// Width of a character display line.
const LCD_COLUMNS: usize = 16;

/// Shown when there is no preset label.
const NO_LABEL: &str = "----";

/// The state of the current preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetStatus {
    /// The preset's samples are being loaded.
    Loading(u8),
    /// The preset is loaded and playable.
    Ready(u8),
    /// The preset has no directory or no samples.
    Empty(u8),
}

impl PresetStatus {
    pub fn index(&self) -> u8 {
        match self {
            PresetStatus::Loading(index) | PresetStatus::Ready(index) | PresetStatus::Empty(index) => {
                *index
            }
        }
    }

    /// The four character code shown on a seven segment display.
    pub fn display_code(&self) -> String {
        match self {
            PresetStatus::Loading(index) => format!("L{:03}", index),
            PresetStatus::Ready(index) => format!("{:04}", index),
            PresetStatus::Empty(index) => format!("E{:03}", index),
        }
    }

    /// The two lines shown on a 16x2 character display.
    pub fn lcd_lines(&self, label: Option<&str>) -> [String; 2] {
        let first: String = label.unwrap_or(NO_LABEL).chars().take(LCD_COLUMNS).collect();
        let second = match self {
            PresetStatus::Loading(_) => "Loading",
            PresetStatus::Ready(_) => "Ready",
            PresetStatus::Empty(_) => "Error loading",
        };
        [first, second.to_string()]
    }
}

impl fmt::Display for PresetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetStatus::Loading(index) => write!(f, "loading preset {}", index),
            PresetStatus::Ready(index) => write!(f, "preset {} ready", index),
            PresetStatus::Empty(index) => write!(f, "preset {} empty", index),
        }
    }
}

/// Receives preset status changes, e.g. to drive a display.
pub trait StatusSink: Send + Sync {
    /// Reports a status along with the preset's label, if it has one.
    fn publish(&self, status: PresetStatus, label: Option<&str>);
}

/// Reports status changes to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, status: PresetStatus, label: Option<&str>) {
        let [first, second] = status.lcd_lines(label);
        info!(
            code = status.display_code(),
            label = label.unwrap_or(NO_LABEL),
            lcd = format!("{} / {}", first, second),
            "{}",
            status
        );
    }
}

/// Keeps every status it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<(PresetStatus, Option<String>)>>,
}

impl RecordingSink {
    pub fn new() -> RecordingSink {
        RecordingSink::default()
    }

    /// Returns every status received so far, oldest first.
    pub fn updates(&self) -> Vec<(PresetStatus, Option<String>)> {
        self.updates.lock().clone()
    }

    /// Returns the most recent status.
    pub fn last(&self) -> Option<PresetStatus> {
        self.updates.lock().last().map(|(status, _)| *status)
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, status: PresetStatus, label: Option<&str>) {
        self.updates
            .lock()
            .push((status, label.map(str::to_string)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_codes() {
        assert_eq!(PresetStatus::Loading(5).display_code(), "L005");
        assert_eq!(PresetStatus::Ready(12).display_code(), "0012");
        assert_eq!(PresetStatus::Empty(127).display_code(), "E127");
    }

    #[test]
    fn test_lcd_lines() {
        assert_eq!(
            PresetStatus::Ready(0).lcd_lines(Some("0 Saw")),
            ["0 Saw".to_string(), "Ready".to_string()]
        );
        assert_eq!(
            PresetStatus::Empty(3).lcd_lines(None),
            ["----".to_string(), "Error loading".to_string()]
        );
        let [first, second] = PresetStatus::Loading(1).lcd_lines(Some("1 A Very Long Preset Name"));
        assert_eq!(first, "1 A Very Long Pr");
        assert_eq!(second, "Loading");
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        assert_eq!(sink.last(), None);
        sink.publish(PresetStatus::Loading(1), Some("1 Piano"));
        sink.publish(PresetStatus::Ready(1), Some("1 Piano"));
        assert_eq!(sink.last(), Some(PresetStatus::Ready(1)));
        assert_eq!(sink.updates().len(), 2);
        assert_eq!(sink.updates()[0].1.as_deref(), Some("1 Piano"));
    }
}
