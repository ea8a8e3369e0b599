// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::{
    collections::{HashMap, HashSet},
    error::Error,
    thread,
    time::Duration,
};

use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level};

use super::Dispatcher;
use crate::cancel::CancelHandle;
use crate::config;

const CLIENT_NAME: &str = "samplerbox";

/// Ports to open and close after comparing what's connected against what's available.
#[derive(Debug, Default, PartialEq)]
struct PortChanges {
    opened: Vec<String>,
    closed: Vec<String>,
}

/// Returns true if the port name contains any of the excluded substrings.
pub fn is_excluded(name: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|pattern| name.contains(pattern.as_str()))
}

fn port_changes(connected: &HashSet<String>, available: &[String], exclude: &[String]) -> PortChanges {
    let mut opened: Vec<String> = available
        .iter()
        .filter(|name| !connected.contains(*name) && !is_excluded(name, exclude))
        .cloned()
        .collect();
    let mut closed: Vec<String> = connected
        .iter()
        .filter(|name| !available.contains(name))
        .cloned()
        .collect();
    opened.sort();
    opened.dedup();
    closed.sort();
    PortChanges { opened, closed }
}

/// Lists the names of all MIDI input ports.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let input = MidiInput::new(&format!("{} input listing", CLIENT_NAME))?;
    let mut names = input
        .ports()
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<String>, _>>()?;
    names.sort();
    Ok(names)
}

/// Watches for MIDI input ports and connects every one that isn't excluded.
/// Ports plugged in later are picked up on the next poll, and ports that
/// disappear are closed. Each port delivers its events on its own callback
/// thread, in arrival order.
pub struct Watcher {
    stop: CancelHandle,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Watcher {
    /// Starts watching in the background.
    pub fn start(config: &config::Midi, dispatcher: Dispatcher) -> Result<Watcher, Box<dyn Error>> {
        let poll_interval = config.poll_interval()?;
        let exclude = config.exclude();
        let stop = CancelHandle::new();

        let join = {
            let stop = stop.clone();
            thread::spawn(move || watch(poll_interval, exclude, dispatcher, stop))
        };

        Ok(Watcher {
            stop,
            join: Mutex::new(Some(join)),
        })
    }

    /// Closes every port and stops watching.
    pub fn stop(&self) {
        self.stop.cancel();
        if let Some(join) = self.join.lock().take() {
            if join.join().is_err() {
                error!("MIDI watcher panicked");
            }
        }
    }
}

fn watch(
    poll_interval: Duration,
    exclude: Vec<String>,
    dispatcher: Dispatcher,
    stop: CancelHandle,
) {
    let span = span!(Level::INFO, "midi watcher (midir)");
    let _enter = span.enter();
    info!(poll_interval = ?poll_interval, exclude = ?exclude, "Watching for MIDI inputs");

    let mut connections: HashMap<String, MidiInputConnection<()>> = HashMap::new();
    loop {
        if let Err(e) = scan(&mut connections, &exclude, &dispatcher) {
            warn!(err = %e, "Unable to scan MIDI inputs");
        }
        if stop.wait_timeout(poll_interval) {
            break;
        }
    }

    for (name, connection) in connections.drain() {
        connection.close();
        info!(port = name, "Closed MIDI input");
    }
}

fn scan(
    connections: &mut HashMap<String, MidiInputConnection<()>>,
    exclude: &[String],
    dispatcher: &Dispatcher,
) -> Result<(), Box<dyn Error>> {
    let scanner = MidiInput::new(&format!("{} port scan", CLIENT_NAME))?;
    let mut available: HashMap<String, MidiInputPort> = HashMap::new();
    for port in scanner.ports() {
        let name = scanner.port_name(&port)?;
        available.entry(name).or_insert(port);
    }

    let names: Vec<String> = available.keys().cloned().collect();
    let current: HashSet<String> = connections.keys().cloned().collect();
    let changes = port_changes(&current, &names, exclude);

    for name in changes.closed {
        if let Some(connection) = connections.remove(&name) {
            connection.close();
            info!(port = name, "MIDI input disconnected");
        }
    }

    for name in changes.opened {
        let Some(port) = available.get(&name) else {
            continue;
        };
        let mut input = MidiInput::new(&format!("{} input", CLIENT_NAME))?;
        input.ignore(Ignore::All);
        let dispatcher = dispatcher.clone();
        match input.connect(
            port,
            &format!("{} input watcher", CLIENT_NAME),
            move |_, raw_event, _| dispatcher.dispatch(raw_event),
            (),
        ) {
            Ok(connection) => {
                info!(port = name, "Opened MIDI input");
                connections.insert(name, connection);
            }
            Err(e) => warn!(port = name, err = %e, "Unable to open MIDI input"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_is_excluded() {
        let exclude = names(&["Midi Through"]);
        assert!(is_excluded("Midi Through:Midi Through Port-0 14:0", &exclude));
        assert!(!is_excluded("Keystation 49:Keystation 49 MIDI 1 20:0", &exclude));
        assert!(!is_excluded("anything", &[]));
    }

    #[test]
    fn test_port_changes() {
        let exclude = names(&["Through"]);
        let connected: HashSet<String> = names(&["Keys", "Pads"]).into_iter().collect();
        let available = names(&["Keys", "Midi Through", "Drums", "Bass"]);

        assert_eq!(
            port_changes(&connected, &available, &exclude),
            PortChanges {
                opened: names(&["Bass", "Drums"]),
                closed: names(&["Pads"]),
            }
        );
    }

    #[test]
    fn test_port_changes_steady_state() {
        let connected: HashSet<String> = names(&["Keys"]).into_iter().collect();
        assert_eq!(
            port_changes(&connected, &names(&["Keys"]), &[]),
            PortChanges::default()
        );
        assert_eq!(
            port_changes(&HashSet::new(), &[], &[]),
            PortChanges::default()
        );
    }
}
