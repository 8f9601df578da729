//! Bundle artifact repository core.
//!
//! Publishes OSGi bundles to a Maven-layout remote repository with digest
//! verification, resolves published versions and artifacts into a local cache,
//! and prefers a pre-built capability index for queries whenever that index is
//! reachable.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod coords;
pub mod digest;
pub mod error;
pub mod index;
pub mod listener;
pub mod metadata;
pub mod range;
pub mod repository;
pub mod resource;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod version;

pub use config::RepoConfig;
pub use coords::{ArtifactKey, Coordinates};
pub use error::{RepoError, Result};
pub use index::IndexedFallback;
pub use listener::DownloadListener;
pub use repository::{Lookup, PutOptions, RepositoryResolver, ResolutionPhase};
pub use resource::{Capability, Requirement, Resource};
pub use transfer::PutResult;
pub use transport::{Credentials, FetchResponse, ProbeStatus, Transport, TransportRegistry};
pub use version::{Version, VersionRange};
