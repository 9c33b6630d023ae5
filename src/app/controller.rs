//! Controller process: owns the authoritative screen state
//!
//! Persists to the file setting store, serves the bus socket, answers
//! display queries and `init` requests from renderers, and applies operator
//! commands.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use super::commands::{self, Command, Target, HELP};
use super::{forward_sync_messages, input_channel, run_loop, spawn_stdin_reader, Input};
use crate::bus::{DisplayController, HeadlessDisplayController, MessageBus, ScreenPlacement};
use crate::config::AppConfig;
use crate::constants::channels;
use crate::ipc::{BusServer, SocketMessageBus};
use crate::screen::{
    BackgroundSrc, BibleItemData, BibleItemKind, BibleRenderedData, BibleTextStyle,
    CountdownData, MarqueeData, PdfImageData, ScreenContext, ScreenId, ScreenManager,
    ScreenManagerRef, ScreenMessage, ScreenRegistry, SlideItem, SlideItemData, SlideMetadata,
};
use crate::settings::JsonFileSettingStore;

/// What the loop should do after a command
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Print(String),
    Quit,
}

pub struct Controller {
    registry: ScreenRegistry,
    next_slide_id: i64,
}

impl Controller {
    pub fn new(registry: ScreenRegistry) -> Self {
        Self {
            registry,
            next_slide_id: 1,
        }
    }

    /// Restore persisted screens; a fresh install gets `initial_screens`
    pub fn boot(&mut self, initial_screens: u32) -> usize {
        self.registry.init();
        if self.registry.is_empty() {
            for _ in 0..initial_screens {
                self.registry.gen_new_instance();
            }
        }
        self.registry.len()
    }

    pub fn registry(&self) -> &ScreenRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ScreenRegistry {
        &mut self.registry
    }

    /// Inbound sync traffic; renderers only ever send `init`
    pub fn handle_sync(&mut self, message: &ScreenMessage) {
        self.registry.receive_sync_screen(message);
    }

    pub fn handle_line(&mut self, line: &str) -> Result<Outcome> {
        if line.trim().is_empty() {
            return Ok(Outcome::Done);
        }
        let command = commands::parse(line)?;
        self.execute(command)
    }

    fn require(&self, screen_id: ScreenId) -> Result<()> {
        match self.registry.lookup(screen_id) {
            Some(ScreenManagerRef::Live(_)) => Ok(()),
            Some(ScreenManagerRef::Tombstoned(_)) => bail!("screen {screen_id} was deleted"),
            None => bail!("no screen {screen_id}"),
        }
    }

    fn targets(&self, target: Target) -> Result<Vec<ScreenId>> {
        match target {
            Target::Screen(screen_id) => {
                self.require(screen_id)?;
                Ok(vec![screen_id])
            }
            Target::Selected => {
                let selected = self.registry.get_selected();
                if selected.is_empty() {
                    bail!("no screen is selected");
                }
                Ok(selected)
            }
        }
    }

    /// Screens in a group mirror each other, so a bulk command only needs to
    /// hit one member per group.
    fn for_targets<F>(&mut self, target: Target, mut apply: F) -> Result<Outcome>
    where
        F: FnMut(&mut ScreenRegistry, ScreenId),
    {
        let mut groups_done: Vec<String> = Vec::new();
        for screen_id in self.targets(target)? {
            let group = self
                .registry
                .get_instance(screen_id)
                .and_then(|m| m.color_note().map(str::to_string));
            if let Some(group) = group {
                if groups_done.contains(&group) {
                    continue;
                }
                groups_done.push(group);
            }
            apply(&mut self.registry, screen_id);
        }
        Ok(Outcome::Done)
    }

    fn slide_item(&mut self, path: String, width: u32, height: u32) -> SlideItemData {
        let id = self.next_slide_id;
        self.next_slide_id += 1;
        let pdf_image_data = path.ends_with(".pdf").then(|| PdfImageData {
            src: path.clone(),
            width,
            height,
        });
        SlideItemData {
            slide_file_path: path,
            slide_item_json: SlideItem {
                id,
                metadata: SlideMetadata { width, height },
                pdf_image_data,
                canvas_items: Vec::new(),
            },
        }
    }

    pub fn execute(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::Add => {
                let screen_id = self.registry.gen_new_instance();
                Ok(Outcome::Print(format!("added screen {screen_id}")))
            }
            Command::Delete(screen_id) => {
                self.require(screen_id)?;
                self.registry.delete(screen_id);
                Ok(Outcome::Print(format!("deleted screen {screen_id}")))
            }
            Command::Show(screen_id) => self.set_showing(screen_id, true),
            Command::Hide(screen_id) => self.set_showing(screen_id, false),
            Command::Color(screen_id, color_note) => {
                self.require(screen_id)?;
                self.registry.set_color_note(screen_id, color_note);
                Ok(Outcome::Done)
            }
            Command::Select(screen_id, is_selected) => {
                self.require(screen_id)?;
                self.registry.set_selected(screen_id, is_selected);
                Ok(Outcome::Done)
            }
            Command::Display(screen_id, display_id) => {
                self.require(screen_id)?;
                let displays = self.registry.ctx().displays.get_all_displays()?;
                if displays.find(display_id).is_none() {
                    bail!("no display {display_id}");
                }
                self.registry.set_display_id(screen_id, display_id);
                Ok(Outcome::Done)
            }
            Command::Slide {
                target,
                path,
                width,
                height,
            } => {
                let item = self.slide_item(path, width, height);
                self.for_targets(target, |registry, screen_id| {
                    registry.apply_slide_item_with_sync_group(screen_id, Some(item.clone()));
                })
            }
            Command::Background { target, kind, src } => {
                let src = BackgroundSrc::new(kind, src);
                self.for_targets(target, |registry, screen_id| {
                    registry.apply_background_src_with_sync_group(screen_id, Some(src.clone()));
                })
            }
            Command::Bible { target, text } => {
                let data = plain_text_item(&text);
                self.for_targets(target, |registry, screen_id| {
                    registry.apply_bible_item_with_sync_group(screen_id, Some(data.clone()));
                })
            }
            Command::Marquee { target, text } => {
                let marquee = text.map(|text| MarqueeData { text });
                self.for_targets(target, |registry, screen_id| {
                    registry.apply_marquee_with_sync_group(screen_id, marquee.clone());
                })
            }
            Command::Countdown { target, date_time } => {
                let countdown = date_time.map(|date_time| CountdownData { date_time });
                self.for_targets(target, |registry, screen_id| {
                    registry.apply_countdown_with_sync_group(screen_id, countdown.clone());
                })
            }
            Command::Scroll(screen_id, scroll) => {
                self.require(screen_id)?;
                if !self.registry.handle_local_scroll(screen_id, scroll) {
                    return Ok(Outcome::Print(format!(
                        "screen {screen_id}: scroll ignored (nothing shown or sync in progress)"
                    )));
                }
                Ok(Outcome::Done)
            }
            Command::Verse(screen_id, verse_key) => {
                self.require(screen_id)?;
                self.registry
                    .apply_selected_verse_with_sync_group(screen_id, verse_key);
                Ok(Outcome::Done)
            }
            Command::Effect(screen_id, target, effect) => {
                self.require(screen_id)?;
                self.registry.set_effect(screen_id, target, effect);
                Ok(Outcome::Done)
            }
            Command::Drop(screen_id, payload) => {
                self.require(screen_id)?;
                if !self.registry.receive_screen_dropped(screen_id, &payload) {
                    bail!("drop payload not understood");
                }
                Ok(Outcome::Done)
            }
            Command::PdfFullWidth(full_width) => {
                self.registry.set_pdf_full_width(full_width);
                Ok(Outcome::Done)
            }
            Command::TextSize(font_size) => {
                let ctx = self.registry.ctx();
                let mut style = BibleTextStyle::load(ctx.store.as_ref(), ctx.errors.as_ref());
                style.font_size = font_size;
                self.registry.set_bible_text_style(&style);
                Ok(Outcome::Done)
            }
            Command::Clear(target) => self.for_targets(target, |registry, screen_id| {
                registry.clear_all(screen_id);
            }),
            Command::Sync(screen_id) => {
                self.require(screen_id)?;
                self.registry.send_sync_screen(screen_id);
                Ok(Outcome::Done)
            }
            Command::List => Ok(Outcome::Print(self.describe_all())),
            Command::Help => Ok(Outcome::Print(HELP.to_string())),
            Command::Quit => Ok(Outcome::Quit),
        }
    }

    fn set_showing(&mut self, screen_id: ScreenId, is_showing: bool) -> Result<Outcome> {
        self.require(screen_id)?;
        self.registry.set_showing(screen_id, is_showing);
        Ok(Outcome::Done)
    }

    pub fn describe_all(&self) -> String {
        let lines: Vec<String> = self
            .registry
            .screen_ids()
            .into_iter()
            .filter_map(|id| self.registry.get_instance(id))
            .map(describe)
            .collect();
        if lines.is_empty() {
            return "no screens".to_string();
        }
        lines.join("\n")
    }
}

fn describe(manager: &ScreenManager) -> String {
    let mut content = Vec::new();
    if let Some(src) = manager.background().background_src() {
        content.push(format!("bg={}", src.src));
    }
    if let Some(slide) = manager.slide().slide_item_data() {
        content.push(format!("slide={}", slide.slide_file_path));
    }
    if manager.bible().bible_item_data().is_some() {
        content.push(format!("text(scroll={:.2})", manager.bible().scroll()));
    }
    let alert = manager.alert().alert_data();
    if let Some(marquee) = &alert.marquee_data {
        content.push(format!("marquee={:?}", marquee.text));
    }
    if let Some(countdown) = &alert.countdown_data {
        content.push(format!("countdown={}", countdown.date_time.to_rfc3339()));
    }
    format!(
        "screen {} {} display={} {}x{}{}{} [{}]",
        manager.screen_id(),
        if manager.is_showing() { "showing" } else { "hidden" },
        manager.display_id(),
        manager.width(),
        manager.height(),
        if manager.is_selected() { " selected" } else { "" },
        manager
            .color_note()
            .map(|c| format!(" group={c}"))
            .unwrap_or_default(),
        content.join(" "),
    )
}

/// Full-text payload holding a single passage of operator text
fn plain_text_item(text: &str) -> BibleItemData {
    BibleItemData {
        locale: "en".to_string(),
        kind: BibleItemKind::Bible,
        bible_item_data: Some(BibleRenderedData {
            rendered_list: vec![json!({ "text": text })],
            bible_item: Value::Null,
        }),
        lyric_item_data: None,
        scroll: 0.0,
        selected_kjv_verse_key: None,
    }
}

/// Serve the local display host to renderers: queries are answered,
/// show/hide/set-display requests are applied to it
fn serve_display_host(bus: &SocketMessageBus, displays: Arc<HeadlessDisplayController>) {
    let all = displays.clone();
    bus.respond_to(channels::GET_DISPLAYS, move |_| {
        all.get_all_displays()
            .and_then(|d| serde_json::to_value(d).map_err(Into::into))
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to answer display query");
                Value::Null
            })
    });
    let showing = displays.clone();
    bus.respond_to(channels::GET_SHOWING_SCREEN_IDS, move |_| {
        showing
            .get_all_showing_screen_ids()
            .map(|ids| json!(ids))
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to answer showing-ids query");
                json!([])
            })
    });

    let show = displays.clone();
    bus.respond_to(channels::SHOW_SCREEN, move |payload| {
        let Some(placement) = decode_placement(channels::SHOW_SCREEN, payload) else {
            return json!(false);
        };
        let display_id = match placement.display_id {
            Some(display_id) => display_id,
            None => match show.get_all_displays() {
                Ok(all) => all.primary_display.id,
                Err(e) => {
                    warn!(error = %e, "No display to show screen on");
                    return json!(false);
                }
            },
        };
        match show.show_screen(placement.screen_id, display_id) {
            Ok(()) => json!(true),
            Err(e) => {
                warn!(screen_id = placement.screen_id, error = %e, "Failed to show screen");
                json!(false)
            }
        }
    });

    let hide = displays.clone();
    bus.listen_for_data(
        channels::HIDE_SCREEN,
        Arc::new(move |payload| {
            if let Some(placement) = decode_placement(channels::HIDE_SCREEN, payload) {
                hide.hide_screen(placement.screen_id);
            }
        }),
    );

    bus.listen_for_data(
        channels::SET_DISPLAY,
        Arc::new(move |payload| {
            match decode_placement(channels::SET_DISPLAY, payload) {
                Some(ScreenPlacement {
                    screen_id,
                    display_id: Some(display_id),
                }) => displays.set_display(screen_id, display_id),
                Some(placement) => {
                    warn!(screen_id = placement.screen_id, "Set-display request without a display")
                }
                None => {}
            }
        }),
    );
}

fn decode_placement(channel: &str, payload: Value) -> Option<ScreenPlacement> {
    match serde_json::from_value(payload) {
        Ok(placement) => Some(placement),
        Err(e) => {
            warn!(channel = %channel, error = %e, "Ignoring malformed display request");
            None
        }
    }
}

/// Run the controller until `quit` or a termination signal
pub fn run(
    config: &AppConfig,
    socket_path: &Path,
    settings_dir: &Path,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let store = Arc::new(
        JsonFileSettingStore::open_with_background_flush(settings_dir)
            .context("Failed to open setting store")?,
    );
    let server = BusServer::bind_to(socket_path.to_path_buf())?;
    let bus = SocketMessageBus::serve(server)?;
    let displays = Arc::new(HeadlessDisplayController::default());
    serve_display_host(&bus, displays.clone());

    let ctx = ScreenContext::new(store.clone(), Arc::new(bus.clone()), displays)
        .with_scroll_mute(config.scroll_mute());
    let mut controller = Controller::new(ScreenRegistry::new(ctx));
    let screens = controller.boot(config.initial_screens);
    info!(screens, socket = %socket_path.display(), "Controller ready");

    let (tx, rx) = input_channel();
    forward_sync_messages(&bus, tx.clone());
    spawn_stdin_reader(tx).context("Failed to spawn stdin reader")?;
    println!("{HELP}");

    run_loop(&rx, &shutdown, |input| match input {
        Some(Input::Command(line)) => match controller.handle_line(&line) {
            Ok(Outcome::Done) => true,
            Ok(Outcome::Print(text)) => {
                println!("{text}");
                true
            }
            Ok(Outcome::Quit) => false,
            Err(e) => {
                eprintln!("error: {e:#}");
                true
            }
        },
        Some(Input::Sync(message)) => {
            controller.handle_sync(&message);
            true
        }
        Some(Input::StdinClosed) => {
            info!("Operator input closed, serving renderers until signalled");
            true
        }
        None => {
            controller.registry_mut().settle_all();
            true
        }
    });

    store.flush_pending();
    info!(renderers = bus.peer_count(), "Controller shutting down");
    Ok(())
}
