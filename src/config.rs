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
use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

mod audio;
mod controller;
mod error;
mod midi;
mod samples;

pub use self::audio::Audio;
pub use self::controller::Controller;
pub use self::error::ConfigError;
pub use self::midi::{Midi, SerialMidi};
pub use self::samples::Samples;

/// Prefix for environment overrides, e.g. SAMPLERBOX_MAX_POLYPHONY=40 or
/// SAMPLERBOX_AUDIO__DEVICE=hw:0.
const ENV_PREFIX: &str = "SAMPLERBOX";

const DEFAULT_MAX_POLYPHONY: usize = 80;

/// The top level sampler configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Sampler {
    /// The audio output.
    audio: Option<Audio>,
    /// Where presets are read from.
    samples: Option<Samples>,
    /// The maximum number of voices rendered at once (default: 80).
    max_polyphony: Option<usize>,
    /// MIDI input ports.
    midi: Option<Midi>,
    /// An optional serial MIDI input.
    serial_midi: Option<SerialMidi>,
    /// An optional control surface.
    controller: Option<Controller>,
}

impl Sampler {
    /// Loads the configuration from an optional YAML file, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Sampler, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let sampler: Sampler = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        sampler.validate()?;
        Ok(sampler)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_polyphony == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_polyphony",
                reason: "must be at least 1".to_string(),
            });
        }
        self.midi().poll_interval()?;
        Ok(())
    }

    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    pub fn samples(&self) -> Samples {
        self.samples.clone().unwrap_or_default()
    }

    pub fn max_polyphony(&self) -> usize {
        self.max_polyphony.unwrap_or(DEFAULT_MAX_POLYPHONY)
    }

    pub fn midi(&self) -> Midi {
        self.midi.clone().unwrap_or_default()
    }

    pub fn serial_midi(&self) -> Option<&SerialMidi> {
        self.serial_midi.as_ref()
    }

    pub fn controller(&self) -> Controller {
        self.controller.clone().unwrap_or(Controller::None)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use config::FileFormat;

    use super::*;

    fn parse(yaml: &str) -> Sampler {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let sampler = parse("{}");
        assert_eq!(sampler.audio().device(), "default");
        assert_eq!(sampler.audio().sample_rate(), 44100);
        assert_eq!(sampler.audio().block_size(), 512);
        assert_eq!(sampler.samples().main_dir(), PathBuf::from("/media/usb"));
        assert_eq!(sampler.samples().backup_dir(), PathBuf::from("/samples"));
        assert_eq!(sampler.samples().initial_preset(), 0);
        assert_eq!(sampler.max_polyphony(), 80);
        assert!(sampler.midi().enabled());
        assert_eq!(sampler.midi().poll_interval().unwrap(), Duration::from_secs(2));
        assert_eq!(sampler.midi().exclude(), vec!["Midi Through".to_string()]);
        assert!(sampler.serial_midi().is_none());
        assert_eq!(sampler.controller(), Controller::None);
    }

    #[test]
    fn test_full_config() {
        let sampler = parse(
            r#"
            audio:
              device: mock-device
              sample_rate: 48000
              block_size: 256
            samples:
              main_dir: /mnt/usb
              backup_dir: /opt/samples
              initial_preset: 3
            max_polyphony: 40
            midi:
              enabled: false
              poll_interval: 500ms
              exclude:
                - Through
                - Virtual
            serial_midi:
              device: /dev/ttyAMA0
            controller:
              kind: keyboard
            "#,
        );
        assert_eq!(sampler.audio().device(), "mock-device");
        assert_eq!(sampler.audio().sample_rate(), 48000);
        assert_eq!(sampler.audio().block_size(), 256);
        assert_eq!(sampler.samples().main_dir(), PathBuf::from("/mnt/usb"));
        assert_eq!(sampler.samples().backup_dir(), PathBuf::from("/opt/samples"));
        assert_eq!(sampler.samples().initial_preset(), 3);
        assert_eq!(sampler.max_polyphony(), 40);
        assert!(!sampler.midi().enabled());
        assert_eq!(
            sampler.midi().poll_interval().unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(sampler.midi().exclude().len(), 2);
        assert_eq!(
            sampler.serial_midi().unwrap().device(),
            &PathBuf::from("/dev/ttyAMA0")
        );
        assert_eq!(sampler.controller(), Controller::Keyboard);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samplerbox.yaml");
        std::fs::write(&path, "max_polyphony: 12\naudio:\n  device: mock\n").unwrap();

        let sampler = Sampler::load(Some(&path)).unwrap();
        assert_eq!(sampler.max_polyphony(), 12);
        assert_eq!(sampler.audio().device(), "mock");
    }

    #[test]
    fn test_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");

        std::fs::write(&path, "max_polyphony: 0\n").unwrap();
        assert!(matches!(
            Sampler::load(Some(&path)),
            Err(ConfigError::InvalidValue { .. })
        ));

        std::fs::write(&path, "midi:\n  poll_interval: soon\n").unwrap();
        assert!(matches!(
            Sampler::load(Some(&path)),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }
}
