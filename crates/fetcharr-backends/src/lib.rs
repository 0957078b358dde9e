//! Fetcharr backends
//!
//! Thin HTTP clients behind trait seams: acquisition backends (Radarr-,
//! Sonarr- and Lidarr-compatible APIs), media servers (Plex, Jellyfin) and
//! the TMDB metadata provider. The services crate only ever sees the traits,
//! so tests swap in mocks without touching the wire.

mod arr;

pub mod error;
pub mod media_server;
pub mod metadata;
pub mod movie;
pub mod music;
pub mod series;
pub mod types;

pub use error::BackendError;
pub use media_server::{JellyfinClient, MediaServer, PlexClient, ServerItem, ServerSeason};
pub use metadata::{MetadataProvider, TmdbClient, TvDetails, TvSeasonSummary};
pub use movie::{AddMovieParams, MovieBackend, RadarrClient, RemoteMovie};
pub use music::{
    AlbumLookup, AlbumStatistics, ArtistLookup, EnsureArtistParams, LidarrClient, MusicBackend,
    RemoteAlbum, RemoteArtist,
};
pub use series::{
    AddSeriesParams, RemoteSeason, RemoteSeries, SeasonStatistics, SeriesBackend, SeriesType,
    SonarrClient,
};
pub use types::Tag;
