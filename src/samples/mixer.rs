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

//! Mixes voices into an interleaved stereo buffer.

use super::voice::{Voice, VoiceState};

/// Length of the release fade, in frames.
pub const FADE_LENGTH: usize = 30000;

/// Exponent of the release fade curve.
const FADE_EXPONENT: i32 = 6;

/// Number of semitone steps in the playback rate table.
pub const RATE_STEPS: usize = 84;

/// Precomputed fade curve and playback rate tables.
pub struct Mixer {
    fade: Vec<f32>,
    rates: [f64; RATE_STEPS],
}

impl Mixer {
    pub fn new() -> Mixer {
        let fade = (0..FADE_LENGTH)
            .map(|i| {
                let linear = 1.0 - i as f32 / (FADE_LENGTH - 1) as f32;
                linear.powi(FADE_EXPONENT)
            })
            .collect();
        let rates = std::array::from_fn(|i| 2f64.powf(i as f64 / 12.0));
        Mixer { fade, rates }
    }

    /// Returns the fade gain at the given position, or None once the fade is over.
    pub fn fade_gain(&self, pos: usize) -> Option<f32> {
        self.fade.get(pos).copied()
    }

    /// Returns the playback rate for a sample recorded at `native` played at `note`.
    /// The semitone distance is clamped to the table.
    pub fn rate(&self, note: u8, native: u8) -> f64 {
        let steps = (note as i32 - native as i32).clamp(0, RATE_STEPS as i32 - 1);
        self.rates[steps as usize]
    }

    /// Adds one voice into `out`, an interleaved stereo buffer. Returns false
    /// once the voice has finished, either by fading out or by running off the
    /// end of an unlooped sample.
    pub fn mix_voice(&self, voice: &mut Voice, out: &mut [f32]) -> bool {
        let asset = voice.asset.clone();
        let samples = asset.frames();
        let frame_count = asset.frame_count();
        let loop_start = asset.loop_start().filter(|start| start + 1 < frame_count);
        let rate = self.rate(voice.note(), asset.note());

        for frame in out.chunks_exact_mut(2) {
            let gain = match voice.state {
                VoiceState::Fading { pos } => match self.fade_gain(pos) {
                    Some(gain) => {
                        voice.state = VoiceState::Fading { pos: pos + 1 };
                        gain
                    }
                    None => return false,
                },
                VoiceState::Sustaining | VoiceState::Held => 1.0,
            };

            // Interpolation reads one frame ahead.
            if voice.pos as usize + 1 >= frame_count {
                match loop_start {
                    Some(start) => {
                        // Carry the overshoot past the end into the loop.
                        let end = (frame_count - 1) as f64;
                        let length = end - start as f64;
                        voice.pos = start as f64 + (voice.pos - end) % length;
                    }
                    None => return false,
                }
            }

            let index = voice.pos as usize;
            let frac = voice.pos.fract() as f32;
            let current = &samples[index * 2..index * 2 + 4];
            let left = current[0] as f32 * (1.0 - frac) + current[2] as f32 * frac;
            let right = current[1] as f32 * (1.0 - frac) + current[3] as f32 * frac;
            frame[0] += left * gain;
            frame[1] += right * gain;

            voice.pos += rate;
        }

        true
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Mixer::new()
    }
}

/// Scales a mixed buffer and converts it to 16-bit output. Values outside the
/// output range saturate.
pub fn write_output(mixed: &[f32], gain: f32, out: &mut [i16]) {
    for (out, sample) in out.iter_mut().zip(mixed) {
        *out = (sample * gain) as i16;
    }
}
