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

//! Preset discovery and sample bank building.
//!
//! Samples are loaded entirely into memory so that triggering never touches the disk.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::bank::{SampleAsset, SampleBank, MIDI_RANGE};
use super::definition::{self, DefinitionLine, SampleLine, DEFINITION_FILE};
use crate::cancel::CancelHandle;

/// Notes checked for `<note>.wav` files when a preset has no definition file.
const BARE_NOTE_RANGE: std::ops::Range<u8> = 0..127;

/// Velocity assigned to bare `<note>.wav` files.
const BARE_NOTE_VELOCITY: u8 = 127;

/// Error types for preset lookup and bank building.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("no preset directory for preset {0}")]
    NoMatchingPreset(u8),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A numbered preset directory, named `"<index> <label>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetEntry {
    index: u8,
    label: String,
    path: PathBuf,
}

impl PresetEntry {
    pub fn index(&self) -> u8 {
        self.index
    }

    /// The full directory name, used as the human readable preset name.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for PresetEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}: {} ({})", self.index, self.label, self.path.display())
    }
}

/// The directories presets are discovered in.
#[derive(Debug, Clone)]
pub struct PresetLibrary {
    main_dir: PathBuf,
    backup_dir: PathBuf,
}

impl PresetLibrary {
    /// Creates a new library. The backup directory is only used while the main
    /// directory is missing or empty.
    pub fn new(main_dir: PathBuf, backup_dir: PathBuf) -> PresetLibrary {
        PresetLibrary {
            main_dir,
            backup_dir,
        }
    }

    /// A library with a single root directory.
    pub fn single(root: PathBuf) -> PresetLibrary {
        PresetLibrary::new(root.clone(), root)
    }

    /// Returns the directory presets are currently read from.
    pub fn root(&self) -> &Path {
        let main_has_entries = fs::read_dir(&self.main_dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if main_has_entries {
            &self.main_dir
        } else {
            &self.backup_dir
        }
    }

    /// Lists every numbered preset directory, ordered by index then name.
    pub fn list(&self) -> Result<Vec<PresetEntry>, BankError> {
        let root = self.root();
        let mut presets: Vec<PresetEntry> = sorted_names(root)?
            .into_iter()
            .filter_map(|name| {
                let index = name.split_once(' ')?.0.parse::<u8>().ok()?;
                let path = root.join(&name);
                ((index as usize) < MIDI_RANGE && path.is_dir()).then(|| PresetEntry {
                    index,
                    path,
                    label: name,
                })
            })
            .collect();
        presets.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.label.cmp(&b.label)));
        Ok(presets)
    }

    /// Finds the preset directory for the given index. The first entry in name
    /// order starting with `"<index> "` wins.
    pub fn find(&self, index: u8) -> Result<PresetEntry, BankError> {
        let root = self.root();
        let prefix = format!("{} ", index);
        sorted_names(root)?
            .into_iter()
            .find(|name| name.starts_with(&prefix))
            .map(|name| PresetEntry {
                index,
                path: root.join(&name),
                label: name,
            })
            .ok_or(BankError::NoMatchingPreset(index))
    }
}

/// Builds the sample bank for a preset directory.
///
/// The cancel handle is checked before every file. Returns None if the build
/// was cancelled, in which case the partial bank is dropped.
pub fn build_bank(dir: &Path, cancel: &CancelHandle) -> Result<Option<SampleBank>, BankError> {
    let mut bank = SampleBank::empty();
    let definition_path = dir.join(DEFINITION_FILE);

    let completed = if definition_path.is_file() {
        load_definition(dir, &definition_path, &mut bank, cancel)?
    } else {
        load_bare_notes(dir, &mut bank, cancel)
    };
    if !completed {
        return Ok(None);
    }

    bank.fill();
    info!(
        dir = ?dir,
        layers = bank.explicit_layers(),
        memory_kb = bank.memory_size() / 1024,
        "Sample bank built"
    );
    Ok(Some(bank))
}

/// Loads every line of a definition file into the bank. Returns false if cancelled.
fn load_definition(
    dir: &Path,
    definition_path: &Path,
    bank: &mut SampleBank,
    cancel: &CancelHandle,
) -> Result<bool, BankError> {
    let contents = fs::read_to_string(definition_path)?;
    let files = sorted_file_names(dir)?;

    for (i, line) in contents.lines().enumerate() {
        let parsed = match definition::parse_line(line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = i + 1, err = %e, "Error in definition file, skipping line");
                continue;
            }
        };

        match parsed {
            DefinitionLine::Volume(db) => bank.apply_volume_db(db),
            DefinitionLine::Transpose(semitones) => bank.set_transpose(semitones),
            DefinitionLine::Samples(sample_line) => {
                if !load_matching(dir, &files, &sample_line, i + 1, bank, cancel) {
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}

/// Loads every file matching one definition line. Returns false if cancelled.
fn load_matching(
    dir: &Path,
    files: &[String],
    sample_line: &SampleLine,
    line: usize,
    bank: &mut SampleBank,
    cancel: &CancelHandle,
) -> bool {
    for name in files {
        if cancel.is_cancelled() {
            return false;
        }

        let Some((note, velocity)) = sample_line.resolve(name) else {
            continue;
        };
        if note as usize >= MIDI_RANGE || velocity as usize >= MIDI_RANGE {
            warn!(line, file = %name, note, velocity, "Note or velocity out of range, skipping file");
            continue;
        }

        load_into(bank, &dir.join(name), note as u8, velocity as u8);
    }
    true
}

/// Loads `<note>.wav` files at full velocity. Returns false if cancelled.
fn load_bare_notes(dir: &Path, bank: &mut SampleBank, cancel: &CancelHandle) -> bool {
    for note in BARE_NOTE_RANGE {
        if cancel.is_cancelled() {
            return false;
        }

        let path = dir.join(format!("{}.wav", note));
        if path.is_file() {
            load_into(bank, &path, note, BARE_NOTE_VELOCITY);
        }
    }
    true
}

fn load_into(bank: &mut SampleBank, path: &Path, note: u8, velocity: u8) {
    match SampleAsset::load(path, note, velocity) {
        Ok(asset) => {
            debug!(path = ?path, note, velocity, frames = asset.frame_count(), "Sample loaded");
            bank.insert(note, velocity, Arc::new(asset));
        }
        Err(e) => warn!(path = ?path, err = %e, "Unable to decode sample, skipping file"),
    }
}

/// Returns the names of all entries in a directory in ascending order.
fn sorted_names(dir: &Path) -> Result<Vec<String>, BankError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => debug!(name = ?name, "Skipping entry with a non UTF-8 name"),
        }
    }
    names.sort();
    Ok(names)
}

/// Returns the names of the regular files in a directory in ascending order.
fn sorted_file_names(dir: &Path) -> Result<Vec<String>, BankError> {
    Ok(sorted_names(dir)?
        .into_iter()
        .filter(|name| dir.join(name).is_file())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::audio::wav::tests::{fmt_chunk, pcm16, riff, smpl_chunk};

    fn write_sample(dir: &Path, name: &str, value: i16) {
        let file = riff(&[(b"fmt ", fmt_chunk(2, 16)), (b"data", pcm16(&[value; 16]))]);
        fs::write(dir.join(name), file).unwrap();
    }

    fn preset_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn first_value(bank: &SampleBank, note: u8, velocity: u8) -> Option<i16> {
        bank.lookup(note, velocity).map(|asset| asset.frames()[0])
    }

    #[test]
    fn test_find_and_list_presets() {
        let root = tempfile::tempdir().unwrap();
        preset_dir(root.path(), "0 Saw");
        preset_dir(root.path(), "12 Grand Piano");
        preset_dir(root.path(), "1 Strings");
        preset_dir(root.path(), "notes");
        fs::write(root.path().join("3 not a dir"), b"").unwrap();

        let library = PresetLibrary::single(root.path().to_path_buf());
        let preset = library.find(12).unwrap();
        assert_eq!(preset.label(), "12 Grand Piano");
        assert_eq!(preset.index(), 12);
        assert!(matches!(
            library.find(2),
            Err(BankError::NoMatchingPreset(2))
        ));

        let indexes: Vec<u8> = library.list().unwrap().iter().map(|p| p.index()).collect();
        assert_eq!(indexes, vec![0, 1, 12]);
    }

    #[test]
    fn test_backup_dir_used_when_main_is_empty() {
        let main = tempfile::tempdir().unwrap();
        let backup = tempfile::tempdir().unwrap();
        preset_dir(backup.path(), "0 Saw");

        let library = PresetLibrary::new(main.path().to_path_buf(), backup.path().to_path_buf());
        assert_eq!(library.root(), backup.path());
        assert!(library.find(0).is_ok());

        preset_dir(main.path(), "5 Organ");
        assert_eq!(library.root(), main.path());
        assert!(library.find(0).is_err());
    }

    #[test]
    fn test_bare_note_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = preset_dir(root.path(), "0 Saw");
        write_sample(&dir, "48.wav", 48);
        write_sample(&dir, "60.wav", 60);
        write_sample(&dir, "127.wav", 127);

        let bank = build_bank(&dir, &CancelHandle::new()).unwrap().unwrap();
        assert_eq!(bank.explicit_layers(), 2);
        assert_eq!(first_value(&bank, 48, 0), Some(48));
        assert_eq!(first_value(&bank, 59, 64), Some(48));
        assert_eq!(first_value(&bank, 60, 127), Some(60));
        // 127.wav is outside the scanned range and 127 is filled from below.
        assert_eq!(first_value(&bank, 127, 127), Some(60));
        assert_eq!(first_value(&bank, 47, 127), None);
    }

    #[test]
    fn test_definition_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = preset_dir(root.path(), "1 Piano");
        write_sample(&dir, "piano_c4_40.wav", 1);
        write_sample(&dir, "piano_c4_100.wav", 2);
        write_sample(&dir, "piano_d4_100.wav", 3);
        write_sample(&dir, "kick.wav", 4);
        fs::write(
            dir.join(DEFINITION_FILE),
            "%%volume=+12\n%%transpose=2\n\npiano_%notename_%velocity.wav\nkick.wav, %midinote=36\n",
        )
        .unwrap();

        let bank = build_bank(&dir, &CancelHandle::new()).unwrap().unwrap();
        assert_eq!(bank.explicit_layers(), 4);
        assert!((bank.gain() - 1.0).abs() < 1e-5);
        assert_eq!(bank.transpose(), 2);
        assert_eq!(first_value(&bank, 72, 10), Some(1));
        assert_eq!(first_value(&bank, 72, 99), Some(1));
        assert_eq!(first_value(&bank, 72, 100), Some(2));
        assert_eq!(first_value(&bank, 73, 127), Some(2));
        assert_eq!(first_value(&bank, 74, 0), Some(3));
        assert_eq!(first_value(&bank, 36, 127), Some(4));
        assert_eq!(first_value(&bank, 40, 127), Some(4));
    }

    #[test]
    fn test_bad_lines_and_files_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        let dir = preset_dir(root.path(), "2 Broken");
        write_sample(&dir, "60.wav", 60);
        fs::write(dir.join("61.wav"), b"not a wave file").unwrap();
        write_sample(&dir, "300.wav", 1);
        fs::write(
            dir.join(DEFINITION_FILE),
            "%%volume=loud\nx.wav, midinote\n%midinote.wav\n",
        )
        .unwrap();

        let bank = build_bank(&dir, &CancelHandle::new()).unwrap().unwrap();
        assert_eq!(bank.explicit_layers(), 1);
        assert_eq!(first_value(&bank, 61, 127), Some(60));
    }

    #[test]
    fn test_loop_metadata_is_kept() {
        let root = tempfile::tempdir().unwrap();
        let dir = preset_dir(root.path(), "3 Pad");
        let file = riff(&[
            (b"fmt ", fmt_chunk(2, 16)),
            (b"data", pcm16(&[0; 400])),
            (b"smpl", smpl_chunk(&[(50, 100)])),
        ]);
        fs::write(dir.join("60.wav"), file).unwrap();

        let bank = build_bank(&dir, &CancelHandle::new()).unwrap().unwrap();
        let asset = bank.lookup(60, 127).unwrap();
        assert_eq!(asset.loop_start(), Some(50));
        assert_eq!(asset.frame_count(), 102);
    }

    #[test]
    fn test_empty_preset_builds_empty_bank() {
        let root = tempfile::tempdir().unwrap();
        let dir = preset_dir(root.path(), "4 Nothing");
        let bank = build_bank(&dir, &CancelHandle::new()).unwrap().unwrap();
        assert!(bank.is_empty());
    }

    #[test]
    fn test_cancelled_build_returns_none() {
        let root = tempfile::tempdir().unwrap();
        let dir = preset_dir(root.path(), "5 Cancelled");
        write_sample(&dir, "60.wav", 60);

        let cancel = CancelHandle::new();
        cancel.cancel();
        assert!(build_bank(&dir, &cancel).unwrap().is_none());
    }

    #[test]
    fn test_same_preset_builds_identically() {
        let root = tempfile::tempdir().unwrap();
        let dir = preset_dir(root.path(), "6 Layers");
        for (name, value) in [("a_60_1.wav", 1), ("b_60_1.wav", 2), ("a_62_90.wav", 3)] {
            write_sample(&dir, name, value);
        }
        fs::write(dir.join(DEFINITION_FILE), "*_%midinote_%velocity.wav\n").unwrap();

        let first = build_bank(&dir, &CancelHandle::new()).unwrap().unwrap();
        let second = build_bank(&dir, &CancelHandle::new()).unwrap().unwrap();
        for note in 0..=127 {
            for velocity in 0..=127 {
                assert_eq!(
                    first_value(&first, note, velocity),
                    first_value(&second, note, velocity)
                );
            }
        }
        // Later names win at the same position.
        assert_eq!(first_value(&first, 60, 1), Some(2));
    }
}
