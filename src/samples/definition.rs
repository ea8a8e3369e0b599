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

//! Parsing of preset `definition.txt` files.
//!
//! Each non-empty line is either a global parameter:
//!
//! ```text
//! %%volume=+6
//! %%transpose=-12
//! ```
//!
//! or a filename pattern, optionally followed by defaults for placeholders the
//! pattern does not contain:
//!
//! ```text
//! Piano_%notename_%velocity.wav
//! kick*.wav, %midinote=36
//! ```

use super::pattern::{Captures, Pattern};

/// The name of the definition file inside a preset directory.
pub const DEFINITION_FILE: &str = "definition.txt";

const VOLUME: &str = "%volume";
const TRANSPOSE: &str = "%transpose";

/// Note names in chromatic order, starting from C.
const NOTE_NAMES: [&str; 12] = [
    "c", "c#", "d", "d#", "e", "f", "f#", "g", "g#", "a", "a#", "b",
];

/// Octave offset applied when converting note names.
const NOTE_NAME_OCTAVE_OFFSET: u32 = 2;

/// Error types for definition lines. A line that fails to parse is skipped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionSyntaxError {
    #[error("missing value for {key}")]
    MissingValue { key: String },

    #[error("invalid number for {key}: {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("invalid default {0:?}, expected key=value")]
    InvalidDefault(String),

    #[error("invalid note name {0:?}")]
    InvalidNoteName(String),

    #[error("pattern is empty")]
    EmptyPattern,
}

/// One parsed definition line.
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionLine {
    /// Multiply the global gain by this many decibels.
    Volume(f32),
    /// Set the transpose to this many semitones.
    Transpose(i32),
    /// Load every file that matches.
    Samples(SampleLine),
}

/// A filename pattern with its placeholder defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleLine {
    pattern: Pattern,
    default_note: u32,
    default_velocity: u32,
    default_note_name: Option<String>,
}

impl SampleLine {
    /// Matches a filename and resolves its note and velocity.
    ///
    /// Returns None if the filename does not match. The resolved values are not
    /// range checked.
    pub fn resolve(&self, filename: &str) -> Option<(u32, u32)> {
        let Captures {
            midinote,
            velocity,
            notename,
        } = self.pattern.matches(filename)?;

        // Captured values are digit runs, so only overflow can fail here.
        let velocity = match velocity {
            Some(velocity) => velocity.parse().unwrap_or(u32::MAX),
            None => self.default_velocity,
        };

        let note = match notename.or_else(|| self.default_note_name.clone()) {
            Some(name) => note_from_name(&name).ok()?,
            None => match midinote {
                Some(note) => note.parse().unwrap_or(u32::MAX),
                None => self.default_note,
            },
        };

        Some((note, velocity))
    }
}

/// Parses a single definition line. Returns None for blank lines.
pub fn parse_line(line: &str) -> Result<Option<DefinitionLine>, DefinitionSyntaxError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if line.contains(VOLUME) {
        let value = parameter_value(line, VOLUME)?;
        return value
            .parse::<f32>()
            .map(|db| Some(DefinitionLine::Volume(db)))
            .map_err(|_| invalid_number(VOLUME, value));
    }
    if line.contains(TRANSPOSE) {
        let value = parameter_value(line, TRANSPOSE)?;
        return value
            .parse::<i32>()
            .map(|semitones| Some(DefinitionLine::Transpose(semitones)))
            .map_err(|_| invalid_number(TRANSPOSE, value));
    }

    let (pattern_text, defaults_text) = match line.split_once(',') {
        Some((pattern, defaults)) => (pattern, Some(defaults)),
        None => (line, None),
    };

    let mut sample_line = SampleLine {
        pattern: Pattern::compile(pattern_text.trim())?,
        default_note: 0,
        default_velocity: 127,
        default_note_name: None,
    };

    if let Some(defaults) = defaults_text {
        let defaults: String = defaults
            .chars()
            .filter(|c| *c != ' ' && *c != '%')
            .collect();
        for item in defaults.split(',') {
            let (key, value) = item
                .split_once('=')
                .ok_or_else(|| DefinitionSyntaxError::InvalidDefault(item.to_string()))?;
            match key {
                "midinote" => {
                    sample_line.default_note =
                        value.parse().map_err(|_| invalid_number(key, value))?
                }
                "velocity" => {
                    sample_line.default_velocity =
                        value.parse().map_err(|_| invalid_number(key, value))?
                }
                "notename" if value.is_empty() => sample_line.default_note_name = None,
                "notename" => {
                    note_from_name(value)?;
                    sample_line.default_note_name = Some(value.to_string());
                }
                // Unknown keys carry no meaning and are ignored.
                _ => {}
            }
        }
    }

    Ok(Some(DefinitionLine::Samples(sample_line)))
}

/// Converts a note name such as `c#4` to a MIDI note number.
pub fn note_from_name(name: &str) -> Result<u32, DefinitionSyntaxError> {
    let invalid = || DefinitionSyntaxError::InvalidNoteName(name.to_string());

    let mut chars = name.chars();
    let octave = chars
        .next_back()
        .and_then(|c| c.to_digit(10))
        .ok_or_else(invalid)?;
    let pitch = chars.as_str().to_lowercase();
    let index = NOTE_NAMES
        .iter()
        .position(|n| *n == pitch)
        .ok_or_else(invalid)?;

    Ok(index as u32 + (octave + NOTE_NAME_OCTAVE_OFFSET) * 12)
}

fn parameter_value<'a>(line: &'a str, key: &str) -> Result<&'a str, DefinitionSyntaxError> {
    line.split('=')
        .nth(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DefinitionSyntaxError::MissingValue {
            key: key.trim_start_matches('%').to_string(),
        })
}

fn invalid_number(key: &str, value: &str) -> DefinitionSyntaxError {
    DefinitionSyntaxError::InvalidNumber {
        key: key.trim_start_matches('%').to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(line: &str) -> SampleLine {
        match parse_line(line) {
            Ok(Some(DefinitionLine::Samples(sample_line))) => sample_line,
            other => panic!("expected a sample line, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_lines() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   \r"), Ok(None));
    }

    #[test]
    fn test_global_parameters() {
        assert_eq!(
            parse_line("%%volume=+6"),
            Ok(Some(DefinitionLine::Volume(6.0)))
        );
        assert_eq!(
            parse_line("%volume = -3.5"),
            Ok(Some(DefinitionLine::Volume(-3.5)))
        );
        assert_eq!(
            parse_line("%%transpose=-12"),
            Ok(Some(DefinitionLine::Transpose(-12)))
        );
        assert!(matches!(
            parse_line("%%volume"),
            Err(DefinitionSyntaxError::MissingValue { .. })
        ));
        assert!(matches!(
            parse_line("%%transpose=up"),
            Err(DefinitionSyntaxError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_builtin_defaults() {
        let line = samples("%midinote.wav");
        assert_eq!(line.resolve("60.wav"), Some((60, 127)));
        assert_eq!(line.resolve("piano.wav"), None);

        let line = samples("kick.wav");
        assert_eq!(line.resolve("kick.wav"), Some((0, 127)));
    }

    #[test]
    fn test_default_clause() {
        let line = samples("kick*.wav, %midinote=36, %velocity=90");
        assert_eq!(line.resolve("kick_hard.wav"), Some((36, 90)));

        let line = samples("%midinote_*.wav,velocity = 64");
        assert_eq!(line.resolve("48_soft.wav"), Some((48, 64)));

        let line = samples("pad.wav, %notename=a2");
        assert_eq!(line.resolve("pad.wav"), Some((57, 127)));
    }

    #[test]
    fn test_invalid_default_clause() {
        assert!(matches!(
            parse_line("a.wav, midinote"),
            Err(DefinitionSyntaxError::InvalidDefault(_))
        ));
        assert!(matches!(
            parse_line("a.wav, midinote=x"),
            Err(DefinitionSyntaxError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_line("a.wav, notename=h4"),
            Err(DefinitionSyntaxError::InvalidNoteName(_))
        ));
    }

    #[test]
    fn test_note_name_resolution() {
        let line = samples("Piano_%notename_%velocity.wav");
        assert_eq!(line.resolve("Piano_c4_100.wav"), Some((72, 100)));
        assert_eq!(line.resolve("Piano_C#4_20.wav"), Some((73, 20)));
        assert_eq!(line.resolve("Piano_b0_1.wav"), Some((35, 1)));
    }

    #[test]
    fn test_note_from_name() {
        assert_eq!(note_from_name("c0"), Ok(24));
        assert_eq!(note_from_name("A4"), Ok(81));
        assert_eq!(note_from_name("g#9"), Ok(140));
        assert!(note_from_name("x4").is_err());
        assert!(note_from_name("c").is_err());
    }
}
