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
use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use samplerbox::audio;
use samplerbox::cancel::CancelHandle;
use samplerbox::config::{self, Controller as ControllerKind};
use samplerbox::controller::{keyboard, Controller};
use samplerbox::midi::{self, Dispatcher};
use samplerbox::preset::PresetLoader;
use samplerbox::samples::{self, PresetLibrary, SampleEngine};
use samplerbox::status::LogSink;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=samplerbox sampler

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/samplerbox
ExecStart=/usr/local/bin/samplerbox start "$SAMPLERBOX_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=samplerbox.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic MIDI sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input ports.
    MidiDevices {},
    /// Lists the presets in the given samples directory.
    Presets {
        /// The samples directory.
        path: String,
    },
    /// Builds a preset and reports what it contains.
    Verify {
        /// The samples directory.
        path: String,
        /// The preset number.
        preset: u8,
    },
    /// Start will start the sampler.
    Start {
        /// The path to the sampler config.
        config_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let ports = midi::midir::list()?;

            if ports.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            let exclude = config::Midi::default().exclude();
            println!("Devices:");
            for port in ports {
                if midi::midir::is_excluded(&port, &exclude) {
                    println!("- {} (ignored)", port);
                } else {
                    println!("- {}", port);
                }
            }
        }
        Commands::Presets { path } => {
            let presets = PresetLibrary::single(PathBuf::from(&path)).list()?;

            if presets.is_empty() {
                println!("No presets found in {}.", path);
                return Ok(());
            }

            println!("Presets (count: {}):", presets.len());
            for preset in presets {
                println!("- {}", preset);
            }
        }
        Commands::Verify { path, preset } => {
            let entry = PresetLibrary::single(PathBuf::from(&path)).find(preset)?;
            let bank = match samples::build_bank(entry.path(), &CancelHandle::new())? {
                Some(bank) => bank,
                None => return Err("preset build was cancelled".into()),
            };

            println!("{}", entry);
            if bank.is_empty() {
                println!("No samples found.");
                return Ok(());
            }
            let notes = bank.covered_notes();
            println!("Explicit layers: {}", bank.explicit_layers());
            println!(
                "Notes: {} ({}-{})",
                notes.len(),
                notes.first().copied().unwrap_or_default(),
                notes.last().copied().unwrap_or_default()
            );
            println!("Gain: {:.1} dB", 20.0 * bank.gain().log10());
            println!("Transpose: {}", bank.transpose());
            println!("Memory: {} KiB", bank.memory_size() / 1024);
        }
        Commands::Start { config_path } => {
            start(PathBuf::from(config_path)).await?;
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}

/// Runs the sampler until interrupted.
async fn start(config_path: PathBuf) -> Result<(), Box<dyn Error>> {
    let config = config::Sampler::load(Some(&config_path))?;
    let audio_config = config.audio();
    let samples_config = config.samples();

    let engine = Arc::new(SampleEngine::new(
        config.max_polyphony(),
        audio_config.block_size(),
    ));
    let device = audio::get_device(&audio_config)?;
    let presets = Arc::new(PresetLoader::new(
        engine.clone(),
        samples_config.library(),
        Arc::new(LogSink),
    ));

    device.start(engine.clone())?;
    info!(device = %device, "Audio output started");
    presets.request_reload(samples_config.initial_preset());

    let dispatcher = Dispatcher::new(engine.clone(), presets.clone());
    let watcher = if config.midi().enabled() {
        Some(midi::midir::Watcher::start(&config.midi(), dispatcher.clone())?)
    } else {
        info!("MIDI inputs disabled");
        None
    };
    if let Some(serial_midi) = config.serial_midi() {
        // The reader runs for the life of the process.
        midi::serial::start(serial_midi, dispatcher.clone())?;
    }
    let _controller = match config.controller() {
        ControllerKind::Keyboard => Some(Controller::new(
            presets.clone(),
            Arc::new(keyboard::Driver::new()),
        )),
        ControllerKind::None => None,
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    presets.shutdown();
    device.stop();
    Ok(())
}
