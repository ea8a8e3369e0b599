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

//! The note x velocity sample table for a preset.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::wav::{self, DecodeError};

/// Number of MIDI note numbers and velocities.
pub const MIDI_RANGE: usize = 128;

/// Global gain every preset starts from before its own volume lines, -12dB.
pub const DEFAULT_GAIN_DB: f32 = -12.0;

/// Converts a decibel value into a linear gain.
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Decoded audio for one note/velocity layer. Immutable once created and
/// shared between the bank and every voice that plays it.
pub struct SampleAsset {
    /// Interleaved stereo 16-bit frames.
    frames: Vec<i16>,
    /// The note this sample was recorded at.
    note: u8,
    /// The velocity layer this sample was defined for.
    velocity: u8,
    /// The frame playback returns to when it reaches the end of the buffer.
    loop_start: Option<usize>,
    /// Where the sample came from.
    path: PathBuf,
}

impl SampleAsset {
    /// Creates an asset from already decoded frames.
    pub fn new(
        frames: Vec<i16>,
        note: u8,
        velocity: u8,
        loop_start: Option<usize>,
        path: PathBuf,
    ) -> SampleAsset {
        SampleAsset {
            frames,
            note,
            velocity,
            loop_start,
            path,
        }
    }

    /// Decodes the file at the given path into an asset.
    pub fn load(path: &Path, note: u8, velocity: u8) -> Result<SampleAsset, DecodeError> {
        let decoded = wav::decode_file(path)?;
        Ok(SampleAsset::new(
            decoded.frames,
            note,
            velocity,
            decoded.loop_start,
            path.to_path_buf(),
        ))
    }

    pub fn frames(&self) -> &[i16] {
        &self.frames
    }

    /// Returns the number of stereo frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len() / 2
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn loop_start(&self) -> Option<usize> {
        self.loop_start
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.frames.len() * std::mem::size_of::<i16>()
    }
}

impl fmt::Debug for SampleAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleAsset")
            .field("path", &self.path)
            .field("note", &self.note)
            .field("velocity", &self.velocity)
            .field("frames", &self.frame_count())
            .field("loop_start", &self.loop_start)
            .finish()
    }
}

type Column = [Option<Arc<SampleAsset>>; MIDI_RANGE];

/// A total mapping from (note, velocity) to a sample or silence, plus the
/// preset-wide gain and transpose.
#[derive(Clone)]
pub struct SampleBank {
    table: Box<[Column; MIDI_RANGE]>,
    /// Which cells were set explicitly by the preset (before filling).
    explicit: Box<[[bool; MIDI_RANGE]; MIDI_RANGE]>,
    gain: f32,
    transpose: i32,
}

impl SampleBank {
    /// Creates a bank in which every note is silent.
    pub fn empty() -> SampleBank {
        SampleBank {
            table: Box::new(std::array::from_fn(|_| std::array::from_fn(|_| None))),
            explicit: Box::new([[false; MIDI_RANGE]; MIDI_RANGE]),
            gain: db_to_gain(DEFAULT_GAIN_DB),
            transpose: 0,
        }
    }

    /// Returns the sample for the given note and velocity, or None for silence.
    /// Values above 127 are silent.
    pub fn lookup(&self, note: u8, velocity: u8) -> Option<&Arc<SampleAsset>> {
        self.table
            .get(note as usize)
            .and_then(|column| column.get(velocity as usize))
            .and_then(|cell| cell.as_ref())
    }

    /// Defines the sample at (note, velocity). A later insert at the same
    /// position replaces the earlier one.
    pub fn insert(&mut self, note: u8, velocity: u8, asset: Arc<SampleAsset>) {
        let (n, v) = (note as usize, velocity as usize);
        if n >= MIDI_RANGE || v >= MIDI_RANGE {
            return;
        }
        self.table[n][v] = Some(asset);
        self.explicit[n][v] = true;
    }

    /// Linear gain applied to the mixed output.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Multiplies the gain by the given decibel amount.
    pub fn apply_volume_db(&mut self, db: f32) {
        self.gain *= db_to_gain(db);
    }

    /// Semitone offset applied to incoming notes.
    pub fn transpose(&self) -> i32 {
        self.transpose
    }

    pub fn set_transpose(&mut self, transpose: i32) {
        self.transpose = transpose;
    }

    /// Returns true if the preset defined no samples at all.
    pub fn is_empty(&self) -> bool {
        self.explicit_layers() == 0
    }

    /// Returns the number of explicitly defined (note, velocity) cells.
    pub fn explicit_layers(&self) -> usize {
        self.explicit.iter().flatten().filter(|set| **set).count()
    }

    /// Returns the notes that produce sound at some velocity.
    pub fn covered_notes(&self) -> Vec<u8> {
        (0..MIDI_RANGE)
            .filter(|&n| self.table[n].iter().any(Option::is_some))
            .map(|n| n as u8)
            .collect()
    }

    /// Returns the memory used by the distinct samples in this bank.
    pub fn memory_size(&self) -> usize {
        let mut seen: Vec<*const SampleAsset> = Vec::new();
        self.table
            .iter()
            .flatten()
            .flatten()
            .filter(|asset| {
                let ptr = Arc::as_ptr(asset);
                if seen.contains(&ptr) {
                    false
                } else {
                    seen.push(ptr);
                    true
                }
            })
            .map(|asset| asset.memory_size())
            .sum()
    }

    /// Fills every undefined cell from its defined neighbours.
    ///
    /// Velocities are filled first, per note. Then notes with no samples at all
    /// copy the column of the note below, in ascending order, so a run of
    /// empty notes repeats the nearest defined note beneath it.
    pub fn fill(&mut self) {
        self.fill_velocities();
        self.fill_notes();
    }

    fn fill_velocities(&mut self) {
        for n in 0..MIDI_RANGE {
            let mut last: Option<Arc<SampleAsset>> = None;
            for v in 0..MIDI_RANGE {
                if self.explicit[n][v] {
                    if last.is_none() {
                        let first = self.table[n][v].clone();
                        for cell in self.table[n][..v].iter_mut() {
                            *cell = first.clone();
                        }
                    }
                    last = self.table[n][v].clone();
                } else {
                    self.table[n][v] = last.clone();
                }
            }
        }
    }

    fn fill_notes(&mut self) {
        for n in 1..MIDI_RANGE {
            if !self.explicit[n].iter().any(|set| *set) {
                self.table[n] = self.table[n - 1].clone();
            }
        }
    }
}

impl Default for SampleBank {
    fn default() -> Self {
        SampleBank::empty()
    }
}

impl fmt::Debug for SampleBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBank")
            .field("explicit_layers", &self.explicit_layers())
            .field("gain", &self.gain)
            .field("transpose", &self.transpose)
            .finish()
    }
}
