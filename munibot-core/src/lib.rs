//! Core types, rendering pipeline and service wiring for munibot, the bot posting
//! aerial images of administrative regions.

/// SQLite region catalog shared by the profiles.
pub mod catalog;
/// Blending the boundary overlay and encoding the result.
pub mod compose;
/// Configuration file model.
pub mod config;
/// HTTP helpers shared by the service clients.
pub mod http;
/// Rasterizing a boundary into a pixel mask.
pub mod mask;
/// Domain models and identifiers shared by all profiles.
pub mod model;
/// Registry and helpers for plugging profiles into the service.
pub mod plugin;
/// Traits describing the profile interfaces.
pub mod ports;
/// Publishing rendered regions.
pub mod publish;
/// High-level service facade used by clients.
pub mod service;
/// OGC Web Map Service imagery client.
pub mod wms;

pub use model::*;
pub use plugin::*;
pub use ports::*;
pub use service::*;
