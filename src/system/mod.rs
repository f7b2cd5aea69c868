//! # System Interaction Layer
//!
//! The collaborators the interpreter drives: the file system, INI and hex
//! editors, download/unzip, patch-text conversion and the platform (power,
//! display and boot control). Everything the engine touches goes through
//! [`Services`], so a host can swap any piece out.
//!
//! ## Modules
//!
//! - **`fs_ops`**: copy/move/delete/list over `sdmc:/` device paths, with
//!   abort polling and copy progress.
//! - **`ini_file`**: an order-preserving INI editor.
//! - **`hex_edit`**: in-place binary patching and the hex/decimal/ASCII
//!   conversions used by placeholders.
//! - **`transfer`**: HTTP download (`ureq`) and ZIP extraction (`zip`).
//! - **`patch_text`**: `.pchtxt` → IPS32 / cheat conversion.
//! - **`platform`**: the [`platform::Platform`] trait and its host implementation.

pub mod fs_ops;
pub mod hex_edit;
pub mod ini_file;
pub mod patch_text;
pub mod platform;
pub mod transfer;

use crate::config::InterpreterConfig;
use crate::state::{InterpreterState, SharedState};
use fs_ops::FileOps;
use hex_edit::HexEditor;
use platform::{HostPlatform, Platform};
use std::sync::Arc;
use transfer::Transfer;

/// Everything a command handler may touch, shared by the engine and the
/// background worker.
#[derive(Debug)]
pub struct Services {
    pub config: InterpreterConfig,
    pub state: SharedState,
    pub fs: FileOps,
    pub hex: HexEditor,
    pub transfer: Transfer,
    pub platform: Arc<dyn Platform>,
}

impl Services {
    pub fn new(config: InterpreterConfig, platform: Arc<dyn Platform>) -> Self {
        let state = InterpreterState::shared();
        Self {
            fs: FileOps::new(
                config.sdmc_root.clone(),
                config.copy_buffer_size,
                state.clone(),
            ),
            hex: HexEditor::new(config.hex_buffer_size),
            transfer: Transfer::new(
                config.download_buffer_size,
                config.unzip_buffer_size,
                config.user_agent.clone(),
                state.clone(),
            ),
            platform,
            state,
            config,
        }
    }

    /// Services backed by [`HostPlatform`] on the configured device root.
    pub fn host(config: InterpreterConfig) -> Self {
        let platform = HostPlatform::new(config.platform, &config.sdmc_root);
        Self::new(config, Arc::new(platform))
    }
}
