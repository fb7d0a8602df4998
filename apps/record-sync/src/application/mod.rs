//! Application Layer - Use cases and port definitions.
//!
//! This layer defines the contracts between the sync machinery and the
//! outside world: the record store it guards, the platform events it
//! reacts to, and the engine facade hosts embed.

/// Port interfaces for the record store and platform event sources.
pub mod ports;

/// The `SyncEngine` composition root.
pub mod services;
