use super::{AudioError, AudioSettings};

/// Called by the device on its own real-time thread with a buffer to fill
/// completely. Must not block, allocate, or log.
pub type DeviceCallback = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Connection to an OS audio system.
pub trait AudioBackend: Send {
    type Device: AudioDevice;

    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>, AudioError>;

    fn open_device(&mut self, info: &DeviceInfo, settings: &AudioSettings) -> Result<Self::Device, AudioError>;
}

/// An opened playback device.
pub trait AudioDevice: Send {
    fn info(&self) -> &DeviceInfo;

    /// Frames per period the device would like to be asked for.
    fn preferred_buffer_frames(&self) -> u32;

    /// Begins invoking `callback` from the device thread.
    fn start(&mut self, callback: DeviceCallback) -> Result<(), AudioError>;

    /// Stops the device thread. When this returns the callback will not run
    /// again. Stopping a stopped device does nothing.
    fn stop(&mut self);

    /// Releases the device. Implies `stop`.
    fn close(&mut self);

    fn is_running(&self) -> bool;
}

/// Picks `requested` by id, or the default device, or the first one.
pub(crate) fn select_device(devices: &[DeviceInfo], requested: Option<&str>) -> Result<DeviceInfo, AudioError> {
    if devices.is_empty() {
        return Err(AudioError::NoDevices);
    }
    match requested {
        Some(id) => devices
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| AudioError::DeviceNotFound(id.to_string())),
        None => Ok(devices.iter().find(|d| d.is_default).unwrap_or(&devices[0]).clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(id: &str, is_default: bool) -> DeviceInfo {
        DeviceInfo { id: id.into(), name: id.to_uppercase(), is_default }
    }

    #[test]
    fn test_select_device() {
        let devices = vec![dev("a", false), dev("b", true)];
        assert_eq!(select_device(&devices, None).unwrap().id, "b");
        assert_eq!(select_device(&devices, Some("a")).unwrap().id, "a");
        assert!(matches!(select_device(&devices, Some("z")), Err(AudioError::DeviceNotFound(_))));
        assert!(matches!(select_device(&[], None), Err(AudioError::NoDevices)));
        assert_eq!(select_device(&[dev("only", false)], None).unwrap().id, "only");
    }
}
