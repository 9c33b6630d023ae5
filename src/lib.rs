//! Multi-screen presentation state synchronization
//!
//! A controller process owns one [`screen::ScreenManager`] per projector
//! output and replicates every change to renderer processes over a Unix
//! socket message bus. Screens sharing a color note form a sync group that
//! mirrors content changes.

pub mod app;
pub mod bus;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ipc;
pub mod screen;
pub mod settings;
pub mod time_source;
