//! Fingerprint-addressed artifact cache
//!
//! Provides content-addressed caching keyed by request fingerprints.
//! Artifacts are immutable once written, and every fingerprint has its own
//! lock so unrelated builds never wait on each other.
//!
//! # Cache States
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Miss | nothing | No artifact, lock free |
//! | Building | `.lock` held | A builder owns the fingerprint |
//! | Complete | `<fp>.zip` | Finalized, never rewritten |

pub mod fingerprint;
pub mod lock;
pub mod store;

pub use fingerprint::{fingerprint, Fingerprint};
pub use lock::{LockGuard, LockOptions};
pub use store::ArtifactStore;
