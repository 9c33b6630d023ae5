//! Operator command lines read by the controller

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::screen::{BackgroundKind, EffectTarget, EffectType, ScreenId};

/// Content commands address one screen or every selected screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Screen(ScreenId),
    Selected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add,
    Delete(ScreenId),
    Show(ScreenId),
    Hide(ScreenId),
    Color(ScreenId, Option<String>),
    Select(ScreenId, bool),
    Display(ScreenId, u32),
    Slide {
        target: Target,
        path: String,
        width: u32,
        height: u32,
    },
    Background {
        target: Target,
        kind: BackgroundKind,
        src: String,
    },
    Bible {
        target: Target,
        text: String,
    },
    Marquee {
        target: Target,
        text: Option<String>,
    },
    Countdown {
        target: Target,
        date_time: Option<DateTime<Utc>>,
    },
    Scroll(ScreenId, f64),
    Verse(ScreenId, Option<String>),
    Effect(ScreenId, EffectTarget, EffectType),
    Drop(ScreenId, Value),
    PdfFullWidth(bool),
    TextSize(u32),
    Clear(Target),
    Sync(ScreenId),
    List,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  add                                 add a screen on the smallest free id
  delete <id>                         clear, hide and remove a screen
  show <id> | hide <id>               show or hide the screen window
  color <id> <name|none>              join or leave a sync group
  select <id> <on|off>                mark for bulk commands ('selected' target)
  display <id> <display-id>           move the screen to another display
  slide <target> <path> <w> <h>       project an html slide
  bg <target> <color|image|video> <src>   set background (same src again clears)
  bible <target> <text>               project a full-text passage
  marquee <target> <text|none>        scrolling alert text
  countdown <target> <rfc3339|none>   countdown alert
  scroll <id> <0..1>                  scroll the full-text view
  verse <id> <key|none>               highlight a verse
  effect <id> <background|slide|foreground> <none|fade|move|zoom>
  drop <id> <json>                    apply a drag-and-drop payload
  pdf-full-width <on|off>             global pdf slide layout
  text-size <px>                      global full-text font size
  clear <target>                      clear every overlay
  sync <id>                           re-broadcast a screen's state
  list | help | quit
<target> is a screen id or 'selected'";

fn screen_id(arg: Option<&&str>) -> Result<ScreenId> {
    let arg = arg.ok_or_else(|| anyhow!("missing screen id"))?;
    arg.parse()
        .with_context(|| format!("invalid screen id '{arg}'"))
}

fn target(arg: Option<&&str>) -> Result<Target> {
    match arg {
        Some(&"selected") => Ok(Target::Selected),
        other => screen_id(other).map(Target::Screen),
    }
}

fn number<T: std::str::FromStr>(arg: Option<&&str>, what: &str) -> Result<T> {
    let arg = arg.ok_or_else(|| anyhow!("missing {what}"))?;
    arg.parse()
        .map_err(|_| anyhow!("invalid {what} '{arg}'"))
}

fn switch(arg: Option<&&str>) -> Result<bool> {
    match arg {
        Some(&"on") | Some(&"true") => Ok(true),
        Some(&"off") | Some(&"false") => Ok(false),
        Some(other) => bail!("expected on/off, got '{other}'"),
        None => bail!("missing on/off"),
    }
}

/// Everything after the first `skip` words, `none` meaning absent
fn rest(args: &[&str], skip: usize, what: &str) -> Result<Option<String>> {
    let text = args.get(skip..).unwrap_or_default().join(" ");
    match text.as_str() {
        "" => bail!("missing {what}"),
        "none" => Ok(None),
        _ => Ok(Some(text)),
    }
}

pub fn parse(line: &str) -> Result<Command> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (cmd, args) = parts
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;

    let command = match *cmd {
        "add" => Command::Add,
        "delete" => Command::Delete(screen_id(args.first())?),
        "show" => Command::Show(screen_id(args.first())?),
        "hide" => Command::Hide(screen_id(args.first())?),
        "color" => Command::Color(screen_id(args.first())?, rest(args, 1, "color")?),
        "select" => Command::Select(screen_id(args.first())?, switch(args.get(1))?),
        "display" => Command::Display(screen_id(args.first())?, number(args.get(1), "display id")?),
        "slide" => Command::Slide {
            target: target(args.first())?,
            path: args
                .get(1)
                .map(|p| p.to_string())
                .ok_or_else(|| anyhow!("missing slide path"))?,
            width: number(args.get(2), "width")?,
            height: number(args.get(3), "height")?,
        },
        "bg" => {
            let kind_name = args.get(1).ok_or_else(|| anyhow!("missing background type"))?;
            Command::Background {
                target: target(args.first())?,
                kind: BackgroundKind::parse(kind_name)
                    .ok_or_else(|| anyhow!("unknown background type '{kind_name}'"))?,
                src: rest(args, 2, "background src")?
                    .ok_or_else(|| anyhow!("background src cannot be 'none'"))?,
            }
        }
        "bible" => Command::Bible {
            target: target(args.first())?,
            text: rest(args, 1, "text")?.ok_or_else(|| anyhow!("use 'clear' to remove text"))?,
        },
        "marquee" => Command::Marquee {
            target: target(args.first())?,
            text: rest(args, 1, "marquee text")?,
        },
        "countdown" => {
            let date_time = match rest(args, 1, "countdown time")? {
                Some(text) => Some(
                    DateTime::parse_from_rfc3339(&text)
                        .with_context(|| format!("invalid countdown time '{text}'"))?
                        .with_timezone(&Utc),
                ),
                None => None,
            };
            Command::Countdown {
                target: target(args.first())?,
                date_time,
            }
        }
        "scroll" => {
            let scroll: f64 = number(args.get(1), "scroll position")?;
            if !(0.0..=1.0).contains(&scroll) {
                bail!("scroll position must be within 0..1");
            }
            Command::Scroll(screen_id(args.first())?, scroll)
        }
        "verse" => Command::Verse(screen_id(args.first())?, rest(args, 1, "verse key")?),
        "effect" => {
            let target_name = args.get(1).ok_or_else(|| anyhow!("missing effect target"))?;
            let effect_name = args.get(2).ok_or_else(|| anyhow!("missing effect name"))?;
            Command::Effect(
                screen_id(args.first())?,
                EffectTarget::parse(target_name)
                    .ok_or_else(|| anyhow!("unknown effect target '{target_name}'"))?,
                EffectType::parse(effect_name)
                    .ok_or_else(|| anyhow!("unknown effect '{effect_name}'"))?,
            )
        }
        "drop" => {
            let json = rest(args, 1, "drop payload")?.unwrap_or_default();
            Command::Drop(
                screen_id(args.first())?,
                serde_json::from_str(&json).context("drop payload is not JSON")?,
            )
        }
        "pdf-full-width" => Command::PdfFullWidth(switch(args.first())?),
        "text-size" => Command::TextSize(number(args.first(), "font size")?),
        "clear" => Command::Clear(target(args.first())?),
        "sync" => Command::Sync(screen_id(args.first())?),
        "list" => Command::List,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}', try 'help'"),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_screen_commands() {
        assert_eq!(parse("add").unwrap(), Command::Add);
        assert_eq!(parse("  delete   3 ").unwrap(), Command::Delete(3));
        assert_eq!(parse("show 1").unwrap(), Command::Show(1));
        assert_eq!(parse("select 2 on").unwrap(), Command::Select(2, true));
        assert_eq!(parse("display 0 2").unwrap(), Command::Display(0, 2));
        assert_eq!(parse("quit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_color_none_leaves_group() {
        assert_eq!(
            parse("color 0 red").unwrap(),
            Command::Color(0, Some("red".to_string()))
        );
        assert_eq!(parse("color 0 none").unwrap(), Command::Color(0, None));
        assert!(parse("color 0").is_err());
    }

    #[test]
    fn test_selected_target() {
        assert_eq!(parse("clear selected").unwrap(), Command::Clear(Target::Selected));
        assert_eq!(
            parse("marquee 1 Service starts soon").unwrap(),
            Command::Marquee {
                target: Target::Screen(1),
                text: Some("Service starts soon".to_string()),
            }
        );
    }

    #[test]
    fn test_slide_and_background() {
        assert_eq!(
            parse("slide selected /decks/a.slides 1280 720").unwrap(),
            Command::Slide {
                target: Target::Selected,
                path: "/decks/a.slides".to_string(),
                width: 1280,
                height: 720,
            }
        );
        assert_eq!(
            parse("bg 0 color #000000").unwrap(),
            Command::Background {
                target: Target::Screen(0),
                kind: BackgroundKind::Color,
                src: "#000000".to_string(),
            }
        );
        assert!(parse("bg 0 gif a.gif").is_err());
    }

    #[test]
    fn test_countdown_parses_rfc3339() {
        let Command::Countdown { date_time, .. } =
            parse("countdown 0 2026-01-04T10:30:00+02:00").unwrap()
        else {
            panic!("expected countdown");
        };
        assert_eq!(
            date_time.unwrap().to_rfc3339(),
            "2026-01-04T08:30:00+00:00"
        );
        assert!(parse("countdown 0 tomorrow").is_err());
    }

    #[test]
    fn test_effect_and_drop() {
        assert_eq!(
            parse("effect 1 slide zoom").unwrap(),
            Command::Effect(1, EffectTarget::Slide, EffectType::Zoom)
        );
        assert!(parse("effect 1 slide spin").is_err());
        assert_eq!(
            parse(r##"drop 0 {"type": "background-color", "item": "#ff0000"}"##).unwrap(),
            Command::Drop(0, json!({"type": "background-color", "item": "#ff0000"}))
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse("").is_err());
        assert!(parse("teleport 1").is_err());
        assert!(parse("show x").is_err());
        assert!(parse("scroll 0 1.5").is_err());
    }
}
