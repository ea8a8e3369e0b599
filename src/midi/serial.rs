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

//! MIDI over a raw serial line. The line speed is set up outside of this
//! program (e.g. with stty or a device tree overlay), so the device is read
//! as a plain file.

use std::{
    error::Error,
    fs::File,
    io::{self, BufReader, Read},
    path::PathBuf,
    thread,
};

use tracing::{error, info, span, Level};

use super::Dispatcher;
use crate::config;

/// Splits a raw MIDI byte stream into messages. Any byte with its high bit set
/// starts a new message, so a reader that joins mid-message resynchronizes on
/// the next status byte.
#[derive(Debug, Default)]
pub struct Framer {
    message: Vec<u8>,
    expected: usize,
}

/// The full length of a message beginning with the given status byte, or None
/// for system messages, which are skipped.
fn message_length(status: u8) -> Option<usize> {
    match status & 0xF0 {
        0xC0 | 0xD0 => Some(2),
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => Some(3),
        _ => None,
    }
}

impl Framer {
    pub fn new() -> Framer {
        Framer::default()
    }

    /// Feeds one byte. Returns the message this byte completes, if any.
    pub fn push(&mut self, byte: u8) -> Option<&[u8]> {
        if byte >= 0xF8 {
            // Real time messages may appear anywhere and don't interrupt a message.
            return None;
        }

        if byte & 0x80 != 0 {
            self.message.clear();
            match message_length(byte) {
                Some(expected) => {
                    self.expected = expected;
                    self.message.push(byte);
                }
                None => self.expected = 0,
            }
            return None;
        }

        if self.message.is_empty() || self.message.len() >= self.expected {
            // A data byte with no status to belong to.
            return None;
        }

        self.message.push(byte);
        if self.message.len() == self.expected {
            Some(&self.message)
        } else {
            None
        }
    }

    /// Reads the stream until it ends, calling `on_message` for every complete message.
    pub fn run<R, F>(&mut self, reader: R, mut on_message: F) -> io::Result<()>
    where
        R: Read,
        F: FnMut(&[u8]),
    {
        for byte in reader.bytes() {
            if let Some(message) = self.push(byte?) {
                on_message(message);
            }
        }
        Ok(())
    }
}

/// Starts reading MIDI from the configured serial device in the background.
pub fn start(
    config: &config::SerialMidi,
    dispatcher: Dispatcher,
) -> Result<thread::JoinHandle<()>, Box<dyn Error>> {
    let path: PathBuf = config.device().clone();
    let file = File::open(&path)?;

    Ok(thread::spawn(move || {
        let span = span!(Level::INFO, "serial midi");
        let _enter = span.enter();
        info!(device = ?path, "Reading serial MIDI");

        let result = Framer::new().run(BufReader::new(file), |message| {
            dispatcher.dispatch(message)
        });
        match result {
            Ok(()) => info!(device = ?path, "Serial MIDI closed"),
            Err(e) => error!(device = ?path, err = %e, "Error reading serial MIDI"),
        }
    }))
}
