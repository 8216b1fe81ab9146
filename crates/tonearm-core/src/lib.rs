//! Tonearm Core - Playback control facade
//!
//! This crate drives independent mpv engine instances ("contexts") and
//! exposes queue, seek, volume and pause control over whichever context is
//! currently selected.

pub mod context;
pub mod engine;
pub mod facade;
pub mod seek;
pub mod settings;
pub mod status;

#[cfg( unix )]
pub use engine::ipc::{ IpcEngine, IpcEngineFactory };
pub use engine::{ Engine, EngineFactory, PropertyValue };
pub use facade::{ FacadeError, PlaybackFacade, MAX_VOLUME };
pub use seek::SeekMode;
pub use settings::{ EngineSettings, Settings, SettingsError, DEFAULT_CONTEXT };
pub use status::Status;
