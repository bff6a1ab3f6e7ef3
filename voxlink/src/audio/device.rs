use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use serde::{Deserialize, Serialize};

use crate::audio::error::{AudioError, AudioResult};

/// Information about an audio device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    /// Device identifier (unique name)
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Whether this is the platform default for its direction
    pub is_default: bool,
}

/// List all available input devices.
pub fn list_input_devices() -> AudioResult<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    collect_devices(host.input_devices()?, default_name)
}

/// List all available output devices.
pub fn list_output_devices() -> AudioResult<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    collect_devices(host.output_devices()?, default_name)
}

fn collect_devices(
    devices: impl Iterator<Item = Device>,
    default_name: Option<String>,
) -> AudioResult<Vec<AudioDeviceInfo>> {
    let mut infos = Vec::new();
    for device in devices {
        let name = device.name().map_err(|_| AudioError::InvalidDeviceName)?;
        let is_default = default_name.as_deref() == Some(name.as_str());
        infos.push(AudioDeviceInfo {
            id: name.clone(),
            name,
            is_default,
        });
    }
    Ok(infos)
}

/// Resolve an input device by id, falling back to the platform default.
pub(crate) fn find_input_device(host: &Host, device_id: Option<&str>) -> AudioResult<Device> {
    match device_id {
        Some(id) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == id).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceUnavailable(format!("input device '{}'", id))),
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string())),
    }
}

/// Resolve an output device by id, falling back to the platform default.
pub(crate) fn find_output_device(host: &Host, device_id: Option<&str>) -> AudioResult<Device> {
    match device_id {
        Some(id) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n == id).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceUnavailable(format!("output device '{}'", id))),
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".to_string())),
    }
}
