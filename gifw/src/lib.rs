//! GIFW is the map engine of a configurable web GIS client. It owns the map state of one client
//! version and the interaction modes the user switches between.
//!
//! # Main components
//!
//! Everything starts from a [`VersionConfig`](config::VersionConfig) served by the backend. It lists
//! the basemaps, the overlay layers grouped into categories, the start view and the endpoints of
//! the optional features. A [`MapEngine`] is created from it and from that point on
//!
//! * the [`Map`] holds the [`MapView`] and the layer groups (basemaps, overlays, user layers and
//!   the system layers for annotations, measurements, geolocation and search pins),
//! * the [`Session`] is the state shared by the engine and the controllers: the [`EventBus`],
//!   timers, the popup, queued alerts, keyboard listeners, settings and auth,
//! * the [`interaction`] controllers (annotate, measure, geolocation, feature query and the layer
//!   [`filter`]) compete for user input. At most one of them is active at a time.
//!
//! The host converts its system events into [`RawUserEvent`](control::RawUserEvent)s and passes
//! them to [`MapEngine::handle_input`], and calls [`MapEngine::tick`] every frame to advance
//! animations, timers and the debounced [`permalink`].
//!
//! Network access goes through the [`HttpService`](platform::HttpService) trait, so the engine runs
//! the same with the `reqwest` based [`NativeHttpService`](platform::native::NativeHttpService) or
//! with a scripted service in tests.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod alert;
pub(crate) mod async_runtime;
pub mod auth;
pub mod bookmark;
pub mod broadcast;
pub mod clock;
mod color;
pub mod config;
pub mod control;
mod debounce;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod export;
pub mod filter;
pub mod interaction;
pub mod layer;
pub mod map;
pub mod permalink;
pub mod platform;
pub mod popup;
pub mod scheduler;
pub mod search;
pub mod settings;
pub mod upload;
mod view;
pub mod web_layer_service;

pub use color::Color;
pub use config::VersionConfig;
pub use debounce::{Debouncer, PERMALINK_DEBOUNCE};
pub use engine::{LayerOptions, MapEngine, Session};
pub use error::GifwError;
pub use event_bus::{EventBus, MapEvent};
pub use map::Map;
pub use view::MapView;

// Reexport gifw_types
pub use gifw_types;
