//! SoundSpot - location-aware music sharing
//!
//! Listeners publish what they are playing at a geographic position and
//! discover, live, what others nearby are playing. Positions are indexed by
//! geohash so a radius search becomes one contiguous key-range scan, refined
//! by exact great-circle distance.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{distance_km, encode, haversine_distance, key_range, within_radius, GeoError};
pub use models::{Coordinate, CurrentlyPlaying, Location, NewShare, ShareRecord, Track};
pub use services::{
    LiveLocationTracker, LocationError, MemoryShareStore, ShareIndex, ShareIndexError, ShareStore,
    Subscription,
};
