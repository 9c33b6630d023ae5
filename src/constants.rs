//! Application-wide constants
//!
//! Setting keys, bus channels and timing values shared by the controller,
//! the renderer and the screen managers.

/// Setting store keys
pub mod settings {
    /// `{ [screenId]: SlideItemDataType }`
    pub const SLIDE: &str = "screen-slide";

    /// `{ [screenId]: BibleItemDataType }`
    pub const FULL_TEXT: &str = "screen-full-text";

    /// `{ [screenId]: AlertDataType }`
    pub const ALERT: &str = "screen-alert";

    /// `{ [screenId]: BackgroundSrcType }`
    pub const BACKGROUND: &str = "screen-background";

    /// `[{ screenId, isSelected, colorNote }]`
    pub const MANAGERS: &str = "screen-managers";

    /// Global PDF slide layout toggle ("true" / "false")
    pub const PDF_FULL_WIDTH: &str = "screen-pdf-full-width";

    /// Global bible text style JSON
    pub const BIBLE_TEXT_STYLE: &str = "screen-bible-text-style";

    /// Prefix of the per-screen display assignment key
    pub const DISPLAY_PREFIX: &str = "screen-display--pid-";

    /// Prefix of the per-screen, per-target effect key
    pub const EFFECT_PREFIX: &str = "pt-effect-";

    /// Per-screen display assignment key
    pub fn display_key(screen_id: u32) -> String {
        format!("{DISPLAY_PREFIX}{screen_id}")
    }

    /// Per-screen, per-target transition effect key
    pub fn effect_key(screen_id: u32, target: &str) -> String {
        format!("{EFFECT_PREFIX}{screen_id}-{target}")
    }
}

/// Message bus channel names
pub mod channels {
    /// Sync messages replicated to renderer windows
    pub const SCREEN_SYNC: &str = "screen:sync";

    /// Display host queries and commands
    pub const GET_DISPLAYS: &str = "display:get-all";
    pub const GET_SHOWING_SCREEN_IDS: &str = "display:get-showing-ids";
    pub const SHOW_SCREEN: &str = "display:show";
    pub const HIDE_SCREEN: &str = "display:hide";
    pub const SET_DISPLAY: &str = "display:set";
}

/// Timing constants
pub mod timing {
    /// Inbound scroll mutes local scroll echo for this long
    pub const SCROLL_MUTE_MS: u64 = 3000;

    /// Renderer settle tick for transition stages
    pub const RENDER_TICK_MS: u64 = 50;

    /// Blocking bus query timeout
    pub const SYNC_QUERY_TIMEOUT_MS: u64 = 2000;
}

/// IPC transport constants
pub mod ipc {
    /// Maximum frame size (10 MB) to prevent memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

    /// Socket file name under the runtime directory
    pub const SOCKET_RELATIVE_PATH: &str = "screen-sync/bus.sock";
}

/// Config file location
pub mod config {
    /// Directory under the user config dir
    pub const APP_DIR: &str = "screen-sync";

    /// Config file name
    pub const FILENAME: &str = "config.json";

    /// Setting store directory name under APP_DIR
    pub const SETTINGS_DIR: &str = "settings";
}
