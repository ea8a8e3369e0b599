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

//! Configuration for where presets are read from.

use std::path::PathBuf;

use serde::Deserialize;

use crate::samples::PresetLibrary;

const DEFAULT_MAIN_DIR: &str = "/media/usb";
const DEFAULT_BACKUP_DIR: &str = "/samples";

#[derive(Deserialize, Clone, Debug, Default)]
pub struct Samples {
    /// The primary samples directory, usually removable media.
    main_dir: Option<PathBuf>,
    /// Used while the primary directory is missing or empty.
    backup_dir: Option<PathBuf>,
    /// The preset loaded at startup.
    initial_preset: Option<u8>,
}

impl Samples {
    pub fn new(main_dir: PathBuf, backup_dir: PathBuf) -> Samples {
        Samples {
            main_dir: Some(main_dir),
            backup_dir: Some(backup_dir),
            initial_preset: None,
        }
    }

    pub fn main_dir(&self) -> PathBuf {
        self.main_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MAIN_DIR))
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR))
    }

    pub fn initial_preset(&self) -> u8 {
        self.initial_preset.unwrap_or(0)
    }

    /// Builds the preset library for these directories.
    pub fn library(&self) -> PresetLibrary {
        PresetLibrary::new(self.main_dir(), self.backup_dir())
    }
}
