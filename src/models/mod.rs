// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    BoundingBox, Coordinate, CurrentlyPlaying, Location, NewShare, RangeBounds, RangeQuery,
    SessionUser, ShareRecord, Track,
};
pub use requests::{CreateShareRequest, NearbyQuery, NowPlayingQuery, ShareNowPlayingRequest};
pub use responses::{
    CreateShareResponse, ErrorResponse, HealthResponse, NearbyShare, NearbySharesResponse,
    ShareNowPlayingResponse,
};
