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

//! Voice management for polyphonic sample playback.
//!
//! Handles voice allocation, the polyphony ceiling, note-off and sustain behavior.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::bank::SampleAsset;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a voice for as long as it plays.
pub type VoiceId = u64;

/// Where a voice is in its lifecycle. Voices only ever move forward through
/// these states and are removed after fading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Playing while its key is down.
    Sustaining,
    /// Released while the sustain pedal was down.
    Held,
    /// Fading out. The position is the index into the fade curve.
    Fading { pos: usize },
}

/// Represents an active voice playing a sample.
pub struct Voice {
    /// Unique ID for this voice.
    id: VoiceId,
    /// The note that triggered this voice, after transposition.
    note: u8,
    /// The sample being played.
    pub(super) asset: Arc<SampleAsset>,
    /// Fractional read position in frames.
    pub(super) pos: f64,
    pub(super) state: VoiceState,
}

impl Voice {
    /// Creates a new voice at the start of the given sample.
    pub fn new(note: u8, asset: Arc<SampleAsset>) -> Self {
        Self {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::SeqCst),
            note,
            asset,
            pos: 0.0,
            state: VoiceState::Sustaining,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn asset(&self) -> &Arc<SampleAsset> {
        &self.asset
    }

    /// Starts the fade out unless the voice is already fading.
    fn fade(&mut self) {
        if !matches!(self.state, VoiceState::Fading { .. }) {
            self.state = VoiceState::Fading { pos: 0 };
        }
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("id", &self.id)
            .field("note", &self.note)
            .field("sample", &self.asset.path())
            .field("pos", &self.pos)
            .field("state", &self.state)
            .finish()
    }
}

/// Manages active voices for sample playback. Voices are kept in trigger order,
/// oldest first.
pub struct VoiceManager {
    /// Active voices.
    voices: Vec<Voice>,
    /// Maximum number of voices rendered at once.
    max_polyphony: usize,
    /// Whether the sustain pedal is down.
    sustain: bool,
}

impl VoiceManager {
    /// Creates a new voice manager.
    pub fn new(max_polyphony: usize) -> Self {
        Self {
            // Room for a full chord past the ceiling before the next render trims it.
            voices: Vec::with_capacity(max_polyphony * 2),
            max_polyphony,
            sustain: false,
        }
    }

    /// Adds a new voice for the given note.
    pub fn trigger(&mut self, note: u8, asset: Arc<SampleAsset>) -> VoiceId {
        let voice = Voice::new(note, asset);
        let id = voice.id;
        self.voices.push(voice);
        id
    }

    /// Handles a note off. Every sustaining voice for the note is either held,
    /// if the sustain pedal is down, or starts fading. Returns the number of
    /// voices affected.
    pub fn release(&mut self, note: u8) -> usize {
        let sustain = self.sustain;
        let mut released = 0;
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.note == note && v.state == VoiceState::Sustaining)
        {
            if sustain {
                voice.state = VoiceState::Held;
            } else {
                voice.fade();
            }
            released += 1;
        }
        released
    }

    /// Sets the sustain pedal. Releasing the pedal starts fading every held voice.
    pub fn set_sustain(&mut self, held: bool) {
        if self.sustain && !held {
            for voice in self
                .voices
                .iter_mut()
                .filter(|v| v.state == VoiceState::Held)
            {
                voice.fade();
            }
        }
        self.sustain = held;
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    /// Drops the oldest voices beyond the polyphony ceiling, without fading.
    pub fn enforce_polyphony(&mut self) {
        if self.voices.len() > self.max_polyphony {
            let excess = self.voices.len() - self.max_polyphony;
            self.voices.drain(..excess);
        }
    }

    /// Runs the given closure for each voice and drops the voices it returns false for.
    pub fn retain_mut<F>(&mut self, f: F)
    where
        F: FnMut(&mut Voice) -> bool,
    {
        self.voices.retain_mut(f);
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Returns the current number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Clears all voices, including held ones. The pedal position is kept.
    pub fn clear(&mut self) {
        if !self.voices.is_empty() {
            debug!(voices = self.voices.len(), "Clearing voices");
        }
        self.voices.clear();
    }
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.voices.len())
            .field("max_polyphony", &self.max_polyphony)
            .field("sustain", &self.sustain)
            .finish()
    }
}
