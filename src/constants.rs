// src/constants.rs

/// The name of the main script file inside a package directory.
pub const PACKAGE_FILENAME: &str = "package.ini";

/// The per-package configuration file (footers, option state).
pub const CONFIG_FILENAME: &str = "config.ini";

/// The secondary script file whose sections are reachable through `exec`.
pub const BOOT_PACKAGE_FILENAME: &str = "boot_package.ini";

/// The directory holding the interpreter's own configuration (inside the system config dir).
pub const APP_CONFIG_DIRNAME: &str = "packrun";

/// The name of the interpreter configuration file.
pub const APP_CONFIG_FILENAME: &str = "config.toml";

/// Substituted for any placeholder that cannot be resolved.
pub const NULL_STR: &str = "null";

/// The device root every `sdmc:/` path is anchored to.
pub const ROOT_PATH: &str = "sdmc:/";

/// The scheme prefix of device paths.
pub const DEVICE_PREFIX: &str = "sdmc:";

pub const TRY_MARKER: &str = "try:";
pub const ERISTA_MARKER: &str = "erista:";
pub const MARIKO_MARKER: &str = "mariko:";

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Key written by `set-footer`.
pub const FOOTER_KEY: &str = "footer";

/// Section of the settings INI that holds the overlay return flags.
pub const SETTINGS_SECTION: &str = "ultrahand";
pub const IN_OVERLAY_KEY: &str = "in_overlay";
pub const TO_PACKAGES_KEY: &str = "to_packages";
pub const TRUE_STR: &str = "true";

pub const ON_STR: &str = "on";
pub const OFF_STR: &str = "off";

/// Folders that may not be targeted directly, nor with traversal or top-level wildcards.
pub const PROTECTED_FOLDERS: &[&str] = &[
    "sdmc:/Nintendo/",
    "sdmc:/emuMMC/",
    "sdmc:/emuMMC/RAW1/",
    "sdmc:/atmosphere/",
    "sdmc:/bootloader/",
    "sdmc:/switch/",
    "sdmc:/config/",
    ROOT_PATH,
];

/// Folders that may never be touched by a delete or move.
pub const ULTRA_PROTECTED_FOLDERS: &[&str] = &[
    "sdmc:/Nintendo/Contents/",
    "sdmc:/Nintendo/save/",
    "sdmc:/emuMMC/RAW1/Nintendo/Contents/",
    "sdmc:/emuMMC/RAW1/Nintendo/save/",
];

/// Where `reboot <payload>` writes a one-shot boot entry on Mariko units.
pub const BOOTLOADER_INI_DIR: &str = "sdmc:/bootloader/ini/";
