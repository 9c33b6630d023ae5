//! Controller and renderer processes
//!
//! Both run one single-threaded loop that owns the [`ScreenRegistry`].
//! Background threads (stdin reader, bus readers) only feed [`Input`]s into
//! an mpsc channel; the loop applies them in arrival order and settles
//! transitions on every tick.
//!
//! [`ScreenRegistry`]: crate::screen::ScreenRegistry

pub mod commands;
pub mod controller;
pub mod renderer;

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::constants::{channels, settings, timing};
use crate::error::ErrorReporter;
use crate::screen::{ScreenId, ScreenManagerSetting, ScreenMessage};
use crate::settings::{codec, SettingStore};

pub use controller::Controller;
pub use renderer::{LogSurface, Renderer};

/// Everything the main loop reacts to
#[derive(Debug)]
pub enum Input {
    /// Operator command line
    Command(String),
    /// Sync message that arrived over the bus
    Sync(ScreenMessage),
    /// Operator input reached end of file
    StdinClosed,
}

/// Forward every stdin line as [`Input::Command`]
pub fn spawn_stdin_reader(sender: Sender<Input>) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.send(Input::Command(line)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            let _ = sender.send(Input::StdinClosed);
        })
}

/// Decode sync traffic on the bus into [`Input::Sync`]
pub fn forward_sync_messages(bus: &dyn MessageBus, sender: Sender<Input>) {
    bus.listen_for_data(
        channels::SCREEN_SYNC,
        Arc::new(move |payload| match serde_json::from_value::<ScreenMessage>(payload) {
            Ok(message) => {
                let _ = sender.send(Input::Sync(message));
            }
            Err(e) => warn!(error = %e, "Dropping undecodable sync message"),
        }),
    )
}

/// Drive `step` until shutdown. It gets `Some(input)` for each input and
/// `None` once per tick; returning false stops the loop.
pub fn run_loop<F>(receiver: &Receiver<Input>, shutdown: &AtomicBool, mut step: F)
where
    F: FnMut(Option<Input>) -> bool,
{
    let tick_interval = Duration::from_millis(timing::RENDER_TICK_MS);
    while !shutdown.load(Ordering::Relaxed) {
        match receiver.recv_timeout(tick_interval) {
            Ok(input) => {
                if !step(Some(input)) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Input channel closed");
                break;
            }
        }
        if !step(None) {
            break;
        }
    }
    info!("Main loop stopped");
}

pub fn input_channel() -> (Sender<Input>, Receiver<Input>) {
    mpsc::channel()
}

/// One line per persisted screen, for the `list` subcommand
pub fn list_persisted(store: &dyn SettingStore, errors: &dyn ErrorReporter) -> Vec<String> {
    let screens: Vec<ScreenManagerSetting> =
        codec::load_json(store, errors, settings::MANAGERS).unwrap_or_default();
    screens
        .iter()
        .map(|screen| describe_persisted(store, screen))
        .collect()
}

fn describe_persisted(store: &dyn SettingStore, screen: &ScreenManagerSetting) -> String {
    let display = store
        .get_setting(&settings::display_key(screen.screen_id))
        .unwrap_or_else(|| "primary".to_string());
    format!(
        "screen {} display={} selected={} group={}",
        screen.screen_id,
        display,
        screen.is_selected,
        screen.color_note.as_deref().unwrap_or("-"),
    )
}

pub(crate) fn screen_label(screen_id: ScreenId) -> String {
    format!("screen-{screen_id}")
}
