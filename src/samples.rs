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

//! MIDI-triggered sample playback system.
//!
//! This module provides:
//! - Preset discovery and bank building from definition files
//! - The note x velocity sample bank with its fallback fill
//! - Voice management with a polyphony ceiling and sustain
//! - Mixing voices into 16-bit stereo output

mod bank;
mod definition;
mod engine;
mod loader;
mod mixer;
mod pattern;
mod voice;

pub use bank::{db_to_gain, SampleAsset, SampleBank, DEFAULT_GAIN_DB, MIDI_RANGE};
pub use definition::{parse_line, DefinitionLine, DefinitionSyntaxError, SampleLine, DEFINITION_FILE};
pub use engine::SampleEngine;
pub use loader::{build_bank, BankError, PresetEntry, PresetLibrary};
pub use mixer::FADE_LENGTH;
pub use pattern::{Captures, Pattern};
pub use voice::{Voice, VoiceId, VoiceManager, VoiceState};
