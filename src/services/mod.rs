// Service exports
pub mod cache;
mod listener;
pub mod location;
pub mod memory;
pub mod postgres;
pub mod session;
pub mod share_index;
pub mod sharing;
pub mod spotify;
pub mod store;

pub use cache::{CacheError, CacheKey, CacheManager, CacheStats};
pub use location::{
    LiveLocationTracker, LocationError, LocationSource, Position, PositionOptions,
    StaticLocationSource, WatchHandle,
};
pub use memory::MemoryShareStore;
pub use postgres::PostgresShareStore;
pub use session::{AccessTokenProvider, AuthError, BearerToken, Session};
pub use share_index::{ShareIndex, ShareIndexError, Subscription};
pub use sharing::{ComposedShare, ShareComposer, SharingError};
pub use spotify::{SpotifyClient, SpotifyError};
pub use store::{ChangeKind, ShareChange, ShareStore, StoreError};
