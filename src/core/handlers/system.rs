// src/core/handlers/system.rs

//! Power, display and UI commands.

use crate::{
    constants::{
        BOOTLOADER_INI_DIR, IN_OVERLAY_KEY, OFF_STR, ON_STR, SETTINGS_SECTION, TO_PACKAGES_KEY,
        TRUE_STR,
    },
    core::{
        paths::{get_name_from_path, remove_quotes},
        task_executor::ExecutionContext,
    },
    models::PlatformVariant,
    system::{
        ini_file::set_ini_file_value,
        platform::{BacklightSetting, BootConfig, Platform, RebootTarget},
    },
};

/// A boot entry by position in the list, or by name.
fn find_boot_config(configs: Vec<BootConfig>, option: &str) -> Option<BootConfig> {
    if !option.is_empty() && option.bytes().all(|b| b.is_ascii_digit()) {
        let position: usize = option.parse().ok()?;
        return configs.into_iter().nth(position);
    }
    configs.into_iter().find(|config| config.name == option)
}

fn reboot_to_config(platform: &dyn Platform, option: &str, from_ini: bool) -> bool {
    match find_boot_config(platform.boot_configs(from_ini), option) {
        Some(config) => {
            platform.reboot(RebootTarget::Config { config, from_ini });
            true
        }
        None => {
            log::warn!("No boot entry '{}' found", option);
            false
        }
    }
}

/// `reboot [UMS|HEKATE|hekate|boot <n|name>|ini <n|name>|<payload>]`
///
/// Targeted reboots need an Erista unit or a Mariko that can reboot to a
/// bootloader config; anything that does not resolve to a target ends in a
/// plain system reboot.
pub fn reboot(context: &mut ExecutionContext<'_>, command: &[String]) {
    let platform = context.services.platform.as_ref();
    let is_erista = platform.variant() == PlatformVariant::Erista;

    if is_erista || platform.supports_reboot_to_config() {
        let option = command.get(1).map(|token| remove_quotes(token)).unwrap_or_default();
        let argument = command.get(2).map(|token| remove_quotes(token));

        let handled = match (option.as_str(), argument) {
            ("", _) => {
                platform.reboot(RebootTarget::Bootloader);
                true
            }
            ("boot", Some(argument)) => reboot_to_config(platform, &argument, false),
            ("ini", Some(argument)) => reboot_to_config(platform, &argument, true),
            ("UMS", _) => {
                platform.reboot(RebootTarget::Ums);
                true
            }
            ("HEKATE" | "hekate", _) => {
                platform.reboot(RebootTarget::BootloaderMenu);
                true
            }
            (payload, _) => reboot_to_payload(context, payload, is_erista),
        };
        if handled {
            return;
        }
    }

    platform.reboot(RebootTarget::System);
}

fn reboot_to_payload(context: &mut ExecutionContext<'_>, payload: &str, is_erista: bool) -> bool {
    let path = context.path(payload);
    if !context.services.fs.exists(&path) {
        log::warn!("Reboot target '{}' does not exist", path);
        return false;
    }
    let name = get_name_from_path(&path);
    let platform = context.services.platform.as_ref();

    if is_erista {
        platform.reboot(RebootTarget::Payload { name, path });
        return true;
    }

    let entry = context
        .services
        .fs
        .resolve(&format!("{}{}.ini", BOOTLOADER_INI_DIR, name));
    if context
        .record(set_ini_file_value(&entry, &name, "payload", &path))
        .is_none()
    {
        return false;
    }
    reboot_to_config(platform, &name, true)
}

pub fn shutdown(context: &mut ExecutionContext<'_>) {
    context.services.platform.shutdown();
}

/// `exit [overlays|packages]`: records where the menu should return to, then
/// leaves the overlay.
pub fn exit(context: &mut ExecutionContext<'_>, command: &[String]) {
    let keys: &[&str] = match command.get(1).map(|token| remove_quotes(token)).as_deref() {
        Some("overlays") => &[IN_OVERLAY_KEY],
        Some("packages") => &[TO_PACKAGES_KEY, IN_OVERLAY_KEY],
        _ => &[],
    };

    let settings = context.services.fs.resolve(&context.services.config.settings_ini);
    for key in keys {
        let result = set_ini_file_value(&settings, SETTINGS_SECTION, key, TRUE_STR);
        context.record(result);
    }
    context.services.platform.exit_overlay();
}

/// `backlight on|off|<0-100>`
pub fn backlight(context: &mut ExecutionContext<'_>, command: &[String]) {
    let Some(setting) = command.get(1).map(|token| remove_quotes(token)) else {
        return;
    };
    let setting = match setting.as_str() {
        ON_STR => BacklightSetting::On,
        OFF_STR => BacklightSetting::Off,
        level => match level.trim().parse::<f32>() {
            Ok(percent) if percent.is_finite() => BacklightSetting::Brightness(percent.clamp(0.0, 100.0) / 100.0),
            _ => {
                log::debug!("Ignoring backlight setting '{}'", level);
                return;
            }
        },
    };
    context.services.platform.set_backlight(setting);
}

/// `refresh [theme|package|wallpaper]`
pub fn refresh(context: &mut ExecutionContext<'_>, command: &[String]) {
    let Some(target) = command.get(1).map(|token| remove_quotes(token)) else {
        context.refresh_page = true;
        return;
    };
    match target.as_str() {
        "theme" => context.services.platform.reload_theme(),
        "package" => context.refresh_package = true,
        "wallpaper" => context.services.platform.reload_wallpaper(),
        other => log::debug!("Unknown refresh target '{}'", other),
    }
}

/// `clear log|hex_sum_cache`
pub fn clear(context: &mut ExecutionContext<'_>, command: &[String]) {
    match command.get(1).map(|token| remove_quotes(token)).as_deref() {
        Some("log") => {
            let Some(log_file) = context.services.config.log_file.clone() else {
                return;
            };
            let result = context.services.fs.delete(&log_file, None);
            context.record(result);
        }
        Some("hex_sum_cache") => context.services.hex.clear_cache(),
        _ => {}
    }
}
