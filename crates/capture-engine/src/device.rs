//! Exclusive device configuration.
//!
//! Device writes (focus, exposure, zoom) follow a lock, mutate, unlock
//! cycle. [`configure`] runs that cycle with a guard so the device is
//! unlocked on every path, including a failed commit.

use camkit_common::error::CamResult;
use camkit_device_core::{DeviceCapabilities, DeviceInfo, DeviceSettings};

/// A camera opened for control.
pub trait DeviceControl: Send {
    /// Which device this controls.
    fn info(&self) -> &DeviceInfo;

    /// What the device supports.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Last committed settings.
    fn settings(&self) -> &DeviceSettings;

    /// Acquire exclusive configuration access. Fails when the device is
    /// busy or has been removed.
    fn lock_for_configuration(&mut self) -> CamResult<()>;

    /// Write settings while locked. On success the device may have adjusted
    /// values to its limits; read them back through [`settings`](Self::settings).
    fn commit_settings(&mut self, settings: DeviceSettings) -> CamResult<()>;

    /// Release exclusive configuration access.
    fn unlock_for_configuration(&mut self);
}

struct ConfigurationGuard<'a> {
    device: &'a mut dyn DeviceControl,
}

impl Drop for ConfigurationGuard<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
    }
}

/// Lock `device`, let `mutate` edit a copy of its settings, commit, unlock.
///
/// Returns the settings the device actually holds afterwards. On error the
/// device keeps its previous settings.
pub fn configure<F>(device: &mut dyn DeviceControl, mutate: F) -> CamResult<DeviceSettings>
where
    F: FnOnce(&DeviceCapabilities, &mut DeviceSettings),
{
    device.lock_for_configuration()?;
    let guard = ConfigurationGuard { device };

    let capabilities = guard.device.capabilities();
    let mut settings = guard.device.settings().clone();
    mutate(&capabilities, &mut settings);

    guard.device.commit_settings(settings)?;
    Ok(guard.device.settings().clone())
}
