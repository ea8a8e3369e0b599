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
use std::sync::Arc;

use midly::{live::LiveEvent, MidiMessage};
use tracing::debug;

use crate::preset::PresetLoader;
use crate::samples::SampleEngine;

pub mod midir;
pub mod serial;

/// The controller number of the sustain pedal.
const SUSTAIN_CONTROLLER: u8 = 64;

/// Controller values at or above this engage the sustain pedal.
const SUSTAIN_THRESHOLD: u8 = 64;

/// A MIDI message the sampler responds to. Channels are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ProgramChange(u8),
    Sustain(bool),
}

impl MidiEvent {
    /// Decodes a raw message. Returns None for anything malformed or that the
    /// sampler doesn't act on.
    pub fn parse(raw: &[u8]) -> Option<MidiEvent> {
        let message = match LiveEvent::parse(raw) {
            Ok(LiveEvent::Midi { message, .. }) => message,
            _ => return None,
        };

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => Some(MidiEvent::NoteOff {
                note: key.as_int(),
            }),
            MidiMessage::NoteOn { key, vel } => Some(MidiEvent::NoteOn {
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::NoteOff { key, .. } => Some(MidiEvent::NoteOff {
                note: key.as_int(),
            }),
            MidiMessage::ProgramChange { program } => {
                Some(MidiEvent::ProgramChange(program.as_int()))
            }
            MidiMessage::Controller { controller, value }
                if controller.as_int() == SUSTAIN_CONTROLLER =>
            {
                Some(MidiEvent::Sustain(value.as_int() >= SUSTAIN_THRESHOLD))
            }
            _ => None,
        }
    }
}

/// Routes MIDI messages to the sample engine and the preset loader. Shared by
/// every input source.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<SampleEngine>,
    presets: Arc<PresetLoader>,
}

impl Dispatcher {
    pub fn new(engine: Arc<SampleEngine>, presets: Arc<PresetLoader>) -> Dispatcher {
        Dispatcher { engine, presets }
    }

    /// Decodes and handles a raw message. Unrecognized messages are dropped.
    pub fn dispatch(&self, raw: &[u8]) {
        match MidiEvent::parse(raw) {
            Some(event) => self.handle(event),
            None => debug!(raw = ?raw, "Ignoring MIDI message"),
        }
    }

    /// Handles a decoded event. Note events are shifted by the bank's transpose
    /// first; notes shifted out of range are ignored.
    pub fn handle(&self, event: MidiEvent) {
        debug!(event = ?event, "Received MIDI event");
        match event {
            MidiEvent::NoteOn { note, velocity } => {
                if let Some(note) = self.engine.transpose(note) {
                    self.engine.trigger(note, velocity);
                }
            }
            MidiEvent::NoteOff { note } => {
                if let Some(note) = self.engine.transpose(note) {
                    self.engine.release(note);
                }
            }
            MidiEvent::ProgramChange(program) => self.presets.request_reload(program),
            MidiEvent::Sustain(held) => self.engine.set_sustain(held),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::{PresetLibrary, VoiceState};
    use crate::status::{PresetStatus, RecordingSink};
    use crate::test::write_preset;

    #[test]
    fn test_parse() {
        assert_eq!(
            MidiEvent::parse(&[0x90, 60, 100]),
            Some(MidiEvent::NoteOn {
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiEvent::parse(&[0x9F, 61, 1]),
            Some(MidiEvent::NoteOn {
                note: 61,
                velocity: 1
            })
        );
        assert_eq!(
            MidiEvent::parse(&[0x90, 60, 0]),
            Some(MidiEvent::NoteOff { note: 60 })
        );
        assert_eq!(
            MidiEvent::parse(&[0x83, 60, 64]),
            Some(MidiEvent::NoteOff { note: 60 })
        );
        assert_eq!(
            MidiEvent::parse(&[0xC0, 5]),
            Some(MidiEvent::ProgramChange(5))
        );
        assert_eq!(
            MidiEvent::parse(&[0xB0, 64, 127]),
            Some(MidiEvent::Sustain(true))
        );
        assert_eq!(
            MidiEvent::parse(&[0xB2, 64, 64]),
            Some(MidiEvent::Sustain(true))
        );
        assert_eq!(
            MidiEvent::parse(&[0xB0, 64, 63]),
            Some(MidiEvent::Sustain(false))
        );
    }

    #[test]
    fn test_parse_ignored() {
        assert_eq!(MidiEvent::parse(&[]), None);
        assert_eq!(MidiEvent::parse(&[0x90, 60]), None);
        assert_eq!(MidiEvent::parse(&[0x3C, 0x40]), None);
        assert_eq!(MidiEvent::parse(&[0xB0, 7, 100]), None);
        assert_eq!(MidiEvent::parse(&[0xE0, 0, 64]), None);
        assert_eq!(MidiEvent::parse(&[0xF8]), None);
    }

    fn dispatcher(root: &std::path::Path) -> (Dispatcher, Arc<SampleEngine>, Arc<PresetLoader>) {
        let engine = Arc::new(SampleEngine::new(8, 64));
        let presets = Arc::new(PresetLoader::new(
            engine.clone(),
            PresetLibrary::single(root.to_path_buf()),
            Arc::new(RecordingSink::new()),
        ));
        (
            Dispatcher::new(engine.clone(), presets.clone()),
            engine,
            presets,
        )
    }

    #[test]
    fn test_dispatch_notes_and_sustain() {
        let root = tempfile::tempdir().unwrap();
        write_preset(root.path(), "0 Piano", &[(60, 100)], 64);
        let (dispatcher, engine, presets) = dispatcher(root.path());
        presets.request_reload(0);
        presets.wait_idle();

        dispatcher.dispatch(&[0x90, 60, 100]);
        assert_eq!(engine.active_voice_count(), 1);

        // Garbage doesn't disturb anything.
        dispatcher.dispatch(&[0x12, 0x34]);
        assert_eq!(engine.active_voice_count(), 1);

        dispatcher.dispatch(&[0xB0, 64, 127]);
        assert!(engine.sustain());
        dispatcher.dispatch(&[0x90, 60, 0]);
        assert_eq!(engine.voice_states(), vec![(60, VoiceState::Held)]);

        dispatcher.dispatch(&[0xB0, 64, 0]);
        assert!(!engine.sustain());
        assert!(matches!(
            engine.voice_states()[..],
            [(60, VoiceState::Fading { .. })]
        ));
    }

    #[test]
    fn test_dispatch_program_change() {
        let root = tempfile::tempdir().unwrap();
        write_preset(root.path(), "0 Piano", &[(60, 100)], 64);
        write_preset(root.path(), "3 Organ", &[(48, 200)], 64);
        let (dispatcher, engine, presets) = dispatcher(root.path());

        dispatcher.dispatch(&[0xC0, 3]);
        presets.wait_idle();
        assert_eq!(presets.current_preset(), 3);
        assert_eq!(presets.status(), Some(PresetStatus::Ready(3)));
        assert_eq!(engine.bank().lookup(48, 127).unwrap().frames()[0], 200);
    }
}
