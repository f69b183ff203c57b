//! Over-the-air updates for deploy-guard.
//!
//! An attempt runs through fixed stages: request signed download metadata,
//! stream the artifact under a size and time limit while hashing it, check
//! the SHA-256 and the Ed25519 signature over the hex digest, then swap it
//! into place.
//!
//! Binaries are replaced with a rename, keeping `<target>.bak`. Directory
//! bundles (tar.gz) are extracted next to the live directory and swapped
//! in, with the old tree kept as `<dir>.bak` and restored if the swap
//! fails.

mod bundle;
mod callbacks;
mod config;
mod download;
mod engine;
mod error;
mod swap;
mod versions;

pub use callbacks::{
    AvailableCallback, FailureCallback, ProgressCallback, ResultCallback, UpdateCallbacks,
    UpdateReport, UpdateStage,
};
pub use config::{ManagedComponent, OtaConfig, PostUpdateHook, UpdateStrategy};
pub use download::RequestScope;
pub use engine::UpdateEngine;
pub use error::{UpdateError, UpdateResult};
pub use swap::backup_path;
pub use versions::{ComponentVersions, UNKNOWN_VERSION};
