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
use std::{
    error::Error,
    fmt,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::thread_priority::RenderPriority;
use super::{AudioError, Device as AudioDevice, Render, CHANNELS};
use crate::cancel::CancelHandle;
use crate::config;

/// How often the stream thread checks whether it should stop.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A cpal output device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Output sample rate in Hz.
    sample_rate: u32,
    /// Frames per callback.
    block_size: usize,
    /// Stops the stream thread.
    running: Mutex<Option<(CancelHandle, thread::JoinHandle<()>)>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Sample formats the stream can be opened with.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StreamFormat {
    I16,
    F32,
}

/// Builds a callback that renders straight into the device buffer.
fn create_i16_callback(
    render: Arc<dyn Render>,
    priority: RenderPriority,
) -> impl FnMut(&mut [i16], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut priority_set = false;
    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
        priority.apply_once(&mut priority_set);
        render.render(data);
    }
}

/// Builds a callback that renders into a scratch buffer and converts to f32.
fn create_f32_callback(
    render: Arc<dyn Render>,
    priority: RenderPriority,
    block_size: usize,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut priority_set = false;
    let mut scratch = vec![0i16; block_size * CHANNELS as usize];
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        priority.apply_once(&mut priority_set);
        if scratch.len() < data.len() {
            scratch.resize(data.len(), 0);
        }
        let scratch = &mut scratch[..data.len()];
        render.render(scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = src as f32 / 32768.0;
        }
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels >= CHANNELS {
                    devices.push(Device::new(device.name()?, max_channels, host_id, device));
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    fn new(name: String, max_channels: u16, host_id: cpal::HostId, device: cpal::Device) -> Device {
        Device {
            name,
            max_channels,
            host_id,
            device,
            sample_rate: 44100,
            block_size: 512,
            running: Mutex::new(None),
        }
    }

    /// Gets the given cpal device. "default" selects the default output of the default host.
    pub fn get(config: &config::Audio) -> Result<Device, AudioError> {
        let name = config.device();
        let mut device = if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".into()))?;
            let device_name = device
                .name()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
            Device::new(device_name, CHANNELS, host.id(), device)
        } else {
            Device::list_cpal_devices()
                .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
                .into_iter()
                .find(|device| device.name.trim() == name)
                .ok_or_else(|| {
                    AudioError::DeviceUnavailable(format!("no device found with name {}", name))
                })?
        };

        device.sample_rate = config.sample_rate();
        device.block_size = config.block_size();
        Ok(device)
    }

    /// Picks the stream format from the device's default output config.
    fn stream_format(&self) -> StreamFormat {
        match self.device.default_output_config() {
            Ok(default) if default.sample_format() == cpal::SampleFormat::F32 => StreamFormat::F32,
            _ => StreamFormat::I16,
        }
    }

    fn build_stream(
        &self,
        render: Arc<dyn Render>,
        format: StreamFormat,
    ) -> Result<cpal::Stream, AudioError> {
        let config = cpal::StreamConfig {
            channels: CHANNELS,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(self.block_size as u32),
        };
        let priority = RenderPriority::from_env();

        let stream = match format {
            StreamFormat::I16 => self.device.build_output_stream(
                &config,
                create_i16_callback(render, priority),
                |err| error!("CPAL output stream error: {}", err),
                None,
            ),
            StreamFormat::F32 => self.device.build_output_stream(
                &config,
                create_f32_callback(render, priority, self.block_size),
                |err| error!("CPAL output stream error: {}", err),
                None,
            ),
        };
        stream.map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
    }
}

impl AudioDevice for Device {
    fn start(&self, render: Arc<dyn Render>) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "audio output (cpal)");
        let _enter = span.enter();

        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let format = self.stream_format();
        info!(
            device = self.name,
            sample_rate = self.sample_rate,
            block_size = self.block_size,
            format = ?format,
            "Starting audio output"
        );

        // cpal streams can't move between threads, so the stream lives on its own thread.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let stop = CancelHandle::new();
        let join = {
            let stop = stop.clone();
            let device = Device {
                name: self.name.clone(),
                max_channels: self.max_channels,
                host_id: self.host_id,
                device: self.device.clone(),
                sample_rate: self.sample_rate,
                block_size: self.block_size,
                running: Mutex::new(None),
            };
            thread::spawn(move || {
                let stream = match device.build_stream(render, format) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::Stream(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while !stop.wait_timeout(STOP_POLL_INTERVAL) {}
                drop(stream);
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("CPAL output stream started successfully");
                *running = Some((stop, join));
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(AudioError::Stream("output thread exited unexpectedly".into()))
            }
        }
    }

    fn stop(&self) {
        if let Some((stop, join)) = self.running.lock().take() {
            stop.cancel();
            if join.join().is_err() {
                error!("Audio output thread panicked");
            }
            info!(device = self.name, "Stopped audio output");
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}
