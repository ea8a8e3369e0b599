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
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::preset::PresetLoader;

pub mod keyboard;

/// Control surface events that change the current preset.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Loads the next preset, wrapping from 127 to 0.
    PresetUp,

    /// Loads the previous preset, wrapping from 0 to 127.
    PresetDown,

    /// Loads the given preset.
    SelectPreset(u8),
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Steps through presets in response to a control surface.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(presets: Arc<PresetLoader>, driver: Arc<dyn Driver>) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(presets, driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Requests preset changes by watching the driver and getting events from it.
    async fn trigger_events(presets: Arc<PresetLoader>, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(preset = presets.current_preset(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            info!(event = ?event, "Received event.");
            match event {
                Event::PresetUp => {
                    presets.step(1);
                }
                Event::PresetDown => {
                    presets.step(-1);
                }
                Event::SelectPreset(index) => presets.request_reload(index),
            }
        }

        info!("Controller closing.");
        match join_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(err = %e, "Event monitor failed"),
            Err(e) => error!(err = %e, "Error waiting for event monitor to stop"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::{
        preset::PresetLoader,
        samples::{PresetLibrary, SampleEngine},
        status::{PresetStatus, RecordingSink},
        test::write_preset,
    };

    use super::{Driver, Event};

    /// Sends a fixed series of events, then closes.
    struct ScriptedDriver {
        script: Vec<Event>,
    }

    impl Driver for ScriptedDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let script = self.script.clone();
            tokio::task::spawn_blocking(move || {
                for event in script {
                    assert!(events_tx.blocking_send(event).is_ok());
                }
                Ok(())
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller() {
        let root = tempfile::tempdir().unwrap();
        write_preset(root.path(), "1 Strings", &[(60, 5)], 64);
        write_preset(root.path(), "9 Choir", &[(60, 9)], 64);

        let engine = Arc::new(SampleEngine::new(8, 64));
        let sink = Arc::new(RecordingSink::new());
        let presets = Arc::new(PresetLoader::new(
            engine.clone(),
            PresetLibrary::single(root.path().to_path_buf()),
            sink.clone(),
        ));

        let driver = Arc::new(ScriptedDriver {
            script: vec![
                Event::PresetDown,
                Event::PresetUp,
                Event::PresetUp,
                Event::SelectPreset(9),
            ],
        });
        let mut controller = super::Controller::new(presets.clone(), driver);
        assert!(controller.join().await.is_ok(), "Error waiting for controller");

        presets.wait_idle();
        assert_eq!(presets.current_preset(), 9);
        assert_eq!(sink.last(), Some(PresetStatus::Ready(9)));
        assert_eq!(engine.bank().lookup(60, 127).unwrap().frames()[0], 9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_controller_wraps() {
        let root = tempfile::tempdir().unwrap();
        let engine = Arc::new(SampleEngine::new(8, 64));
        let presets = Arc::new(PresetLoader::new(
            engine,
            PresetLibrary::single(root.path().to_path_buf()),
            Arc::new(RecordingSink::new()),
        ));

        let driver = Arc::new(ScriptedDriver {
            script: vec![Event::PresetDown, Event::PresetDown],
        });
        let mut controller = super::Controller::new(presets.clone(), driver);
        assert!(controller.join().await.is_ok());

        presets.wait_idle();
        assert_eq!(presets.current_preset(), 126);
    }
}
