//! cpal glue: device selection and the i16 output stream wrapping the
//! renderer.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use crossbeam::channel::Sender;

use crate::audio::error::{AudioError, AudioResult};
use crate::audio::renderer::AudioRenderer;
use crate::audio::AudioFormat;
use crate::event::ReceiverEvent;

/// Picks the named output device, or the host default when `name` is
/// `None`.
pub fn find_output_device(name: Option<&str>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        None => host.default_output_device().ok_or(AudioError::NoDefaultDevice),
        Some(wanted) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| AudioError::StreamBuild(e.to_string()))?
                .peekable();
            if devices.peek().is_none() {
                return Err(AudioError::NoDevices);
            }
            devices
                .find(|d| matches!(d.name(), Ok(n) if n == wanted))
                .ok_or_else(|| AudioError::DeviceNotFound(wanted.to_string()))
        }
    }
}

/// Builds (but does not start) an i16 output stream feeding from
/// `renderer`. The callback is sized to one fade period so mute ramps
/// always fit a single callback.
pub fn build_output_stream(
    device: &cpal::Device,
    renderer: AudioRenderer,
    format: AudioFormat,
    events: Sender<ReceiverEvent>,
) -> AudioResult<Stream> {
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: BufferSize::Fixed(renderer.frames_per_callback() as u32),
    };
    log::info!(
        "opening audio output: {} Hz, {} ch, {} frames per callback",
        format.sample_rate,
        format.channels,
        renderer.frames_per_callback()
    );

    let state = Arc::new(Mutex::new(renderer));
    let cb_state = Arc::clone(&state);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                match cb_state.lock() {
                    Ok(mut renderer) => {
                        let _ = renderer.render(data);
                    }
                    Err(_) => data.fill(0),
                }
            },
            move |err| {
                log::error!("audio stream error: {err}");
                let _ = events.try_send(ReceiverEvent::AudioOutputError);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuild(e.to_string()))?;
    Ok(stream)
}
