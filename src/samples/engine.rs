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

//! The voice engine: turns note events into voices and voices into audio.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::bank::SampleBank;
use super::mixer::{self, Mixer};
use super::voice::{VoiceId, VoiceManager, VoiceState};
use crate::audio::Render;

/// State touched by the render path. The lock is held for one block at most.
struct RenderState {
    voices: VoiceManager,
    /// Interleaved stereo mix buffer, reused between renders.
    scratch: Vec<f32>,
}

/// The sample engine owns the published sample bank and all playing voices.
///
/// The bank is swapped atomically, so building a new bank never blocks audio.
/// Voices are behind a short critical section shared by the MIDI and render paths.
pub struct SampleEngine {
    bank: ArcSwap<SampleBank>,
    state: Mutex<RenderState>,
    mixer: Mixer,
}

impl SampleEngine {
    /// Creates a new engine with an empty bank. `block_size` is the expected
    /// number of frames per render and is used to size the mix buffer.
    pub fn new(max_polyphony: usize, block_size: usize) -> SampleEngine {
        SampleEngine {
            bank: ArcSwap::from_pointee(SampleBank::empty()),
            state: Mutex::new(RenderState {
                voices: VoiceManager::new(max_polyphony),
                scratch: Vec::with_capacity(block_size * 2),
            }),
            mixer: Mixer::new(),
        }
    }

    /// Shifts a received note by the bank's transpose. Returns None if the
    /// result is not a valid note.
    pub fn transpose(&self, note: u8) -> Option<u8> {
        let transposed = note as i32 + self.bank.load().transpose();
        u8::try_from(transposed).ok().filter(|n| *n < 128)
    }

    /// Starts a voice for the given note and velocity. Returns None if the bank
    /// has no sample there.
    pub fn trigger(&self, note: u8, velocity: u8) -> Option<VoiceId> {
        let mut state = self.state.lock();
        let asset = self.bank.load().lookup(note, velocity)?.clone();
        Some(state.voices.trigger(note, asset))
    }

    /// Releases every sustaining voice for the given note.
    pub fn release(&self, note: u8) {
        self.state.lock().voices.release(note);
    }

    /// Sets the sustain pedal.
    pub fn set_sustain(&self, held: bool) {
        self.state.lock().voices.set_sustain(held);
    }

    /// Publishes a new bank and drops every playing voice.
    pub fn publish_bank(&self, bank: SampleBank) {
        let layers = bank.explicit_layers();
        {
            // The bank and the voices playing from it change together.
            let mut state = self.state.lock();
            self.bank.store(Arc::new(bank));
            state.voices.clear();
        }
        info!(layers, "Published sample bank");
    }

    /// Returns the currently published bank.
    pub fn bank(&self) -> Arc<SampleBank> {
        self.bank.load_full()
    }

    /// Stops all voices immediately.
    pub fn stop_all(&self) {
        debug!("Stopping all voices");
        self.state.lock().voices.clear();
    }

    /// Returns the number of voices currently playing.
    pub fn active_voice_count(&self) -> usize {
        self.state.lock().voices.active_count()
    }

    pub fn sustain(&self) -> bool {
        self.state.lock().voices.sustain()
    }

    /// Returns the note and state of every playing voice, oldest first.
    pub fn voice_states(&self) -> Vec<(u8, VoiceState)> {
        self.state
            .lock()
            .voices
            .voices()
            .iter()
            .map(|voice| (voice.note(), voice.state()))
            .collect()
    }
}

impl Render for SampleEngine {
    fn render(&self, out: &mut [i16]) {
        let mut guard = self.state.lock();
        let gain = self.bank.load().gain();
        let RenderState { voices, scratch } = &mut *guard;

        scratch.clear();
        scratch.resize(out.len(), 0.0);

        voices.enforce_polyphony();
        voices.retain_mut(|voice| self.mixer.mix_voice(voice, scratch));

        mixer::write_output(scratch, gain, out);
    }
}

impl std::fmt::Debug for SampleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleEngine")
            .field("bank", &self.bank.load_full())
            .field("voices", &self.state.lock().voices)
            .finish()
    }
}
