//! # Platform Services
//!
//! Power, display and boot control are reached through the [`Platform`]
//! trait. The interpreter never talks to hardware directly.
//!
//! [`HostPlatform`] is the implementation used on a development machine: it
//! logs every request, remembers the last reboot target, and reads boot
//! configurations from the `bootloader/` folder under the device root.

use crate::models::PlatformVariant;
use crate::system::ini_file::IniDocument;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Device facts exposed to packages through simple placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ram_vendor: String,
    pub ram_model: String,
    pub ams_version: String,
    pub hos_version: String,
}

/// A bootloader configuration entry (a section of a boot INI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootConfig {
    pub name: String,
    /// Position of the entry in its list, as the bootloader counts it.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootTarget {
    /// A plain system reboot.
    System,
    /// Reboot into the bootloader with its default behaviour.
    Bootloader,
    BootloaderMenu,
    /// Expose the SD card over USB mass storage.
    Ums,
    /// Chain-load a payload binary.
    Payload { name: String, path: String },
    /// Boot a configuration from the main list (`from_ini == false`) or from
    /// the `ini/` folder.
    Config { config: BootConfig, from_ini: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BacklightSetting {
    On,
    Off,
    /// Brightness in the `0.0..=1.0` range.
    Brightness(f32),
}

pub trait Platform: Send + Sync + std::fmt::Debug {
    fn variant(&self) -> PlatformVariant;

    /// Whether a Mariko unit can reboot straight into a bootloader config.
    fn supports_reboot_to_config(&self) -> bool;

    fn device_info(&self) -> DeviceInfo;

    /// Lists boot configurations: the main list, or the `ini/` folder entries.
    fn boot_configs(&self, from_ini: bool) -> Vec<BootConfig>;

    fn reboot(&self, target: RebootTarget);

    fn shutdown(&self);

    fn set_backlight(&self, setting: BacklightSetting);

    /// Closes the overlay and returns to the overlay menu.
    fn exit_overlay(&self);

    fn reload_theme(&self);

    fn reload_wallpaper(&self);
}

/// The request a [`HostPlatform`] received last.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformRequest {
    Reboot(RebootTarget),
    Shutdown,
    Backlight(BacklightSetting),
    ExitOverlay,
    ReloadTheme,
    ReloadWallpaper,
}

#[derive(Debug)]
pub struct HostPlatform {
    variant: PlatformVariant,
    reboot_to_config: bool,
    bootloader_dir: PathBuf,
    device_info: DeviceInfo,
    requests: Mutex<Vec<PlatformRequest>>,
}

impl HostPlatform {
    pub fn new(variant: PlatformVariant, sdmc_root: &Path) -> Self {
        Self {
            variant,
            reboot_to_config: true,
            bootloader_dir: sdmc_root.join("bootloader"),
            device_info: DeviceInfo {
                ram_vendor: "Host".to_string(),
                ram_model: "Generic".to_string(),
                ams_version: "0.0.0".to_string(),
                hos_version: "0.0.0".to_string(),
            },
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_device_info(mut self, device_info: DeviceInfo) -> Self {
        self.device_info = device_info;
        self
    }

    pub fn with_reboot_to_config(mut self, supported: bool) -> Self {
        self.reboot_to_config = supported;
        self
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<PlatformRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, request: PlatformRequest) {
        log::info!("Platform request: {:?}", request);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    /// Sections of `hekate_ipl.ini`, except the global `config` section.
    fn launch_configs(&self) -> Vec<BootConfig> {
        let path = self.bootloader_dir.join("hekate_ipl.ini");
        let Ok(document) = IniDocument::load(&path) else {
            log::debug!("No boot list at '{}'", path.display());
            return Vec::new();
        };
        document
            .section_names()
            .filter(|name| *name != "config")
            .enumerate()
            .map(|(i, name)| BootConfig {
                name: name.to_string(),
                index: i + 1,
            })
            .collect()
    }

    /// Sections of every `*.ini` in `bootloader/ini/`, ordered by file name.
    fn ini_configs(&self) -> Vec<BootConfig> {
        let dir = self.bootloader_dir.join("ini");
        let Ok(read_dir) = fs::read_dir(&dir) else {
            log::debug!("No ini folder at '{}'", dir.display());
            return Vec::new();
        };

        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "ini"))
            .collect();
        files.sort();

        files
            .iter()
            .filter_map(|path| IniDocument::load(path).ok())
            .flat_map(|document| {
                document
                    .section_names()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .enumerate()
            .map(|(i, name)| BootConfig { name, index: i + 1 })
            .collect()
    }
}

impl Platform for HostPlatform {
    fn variant(&self) -> PlatformVariant {
        self.variant
    }

    fn supports_reboot_to_config(&self) -> bool {
        self.reboot_to_config
    }

    fn device_info(&self) -> DeviceInfo {
        self.device_info.clone()
    }

    fn boot_configs(&self, from_ini: bool) -> Vec<BootConfig> {
        if from_ini {
            self.ini_configs()
        } else {
            self.launch_configs()
        }
    }

    fn reboot(&self, target: RebootTarget) {
        self.record(PlatformRequest::Reboot(target));
    }

    fn shutdown(&self) {
        self.record(PlatformRequest::Shutdown);
    }

    fn set_backlight(&self, setting: BacklightSetting) {
        self.record(PlatformRequest::Backlight(setting));
    }

    fn exit_overlay(&self) {
        self.record(PlatformRequest::ExitOverlay);
    }

    fn reload_theme(&self) {
        self.record(PlatformRequest::ReloadTheme);
    }

    fn reload_wallpaper(&self) {
        self.record(PlatformRequest::ReloadWallpaper);
    }
}
