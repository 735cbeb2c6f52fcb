//! Live state synchronization for the Vocalyx admin dashboard.
//!
//! The crate keeps a client-side view of transcription jobs, projects and
//! users consistent with the backend. A single [`ConnectionManager`] owns the
//! streaming socket and its reconnect loop; [`DashboardClient`] covers the REST
//! surface. [`FilterController`], [`RevealCache`], [`AdminCoordinator`] and
//! [`UploadCoordinator`] turn user actions into requests and hand fresh
//! snapshots to the rendering collaborators in [`view`].
//!
//! [`DashboardSession`] builds all of them from one [`ClientConfig`].

pub mod admin;
pub mod config;
pub mod connection;
pub mod error;
pub mod filter;
pub mod model;
pub mod reveal;
pub mod sequence;
pub mod session;
pub mod transport;
pub mod upload;
pub mod view;

#[cfg(test)]
mod testing;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use admin::{AdminCoordinator, ProjectForm, UserForm};
pub use config::{ClientConfig, ConfigError};
pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, LiveChannel, ReconnectPolicy,
    StreamHandlers,
};
pub use error::{ClientError, ErrorKind, NotificationLevel, Result};
pub use filter::{FilterController, FilterPatch, FilterState};
pub use model::{JobStatus, Project, ProjectRef, TranscriptionPage, User};
pub use reveal::{RevealCache, RevealState};
pub use sequence::SequenceGate;
pub use session::{Collaborators, DashboardSession};
pub use transport::{DashboardApi, DashboardClient, UploadRequest};
pub use upload::{UploadCoordinator, UploadForm};
pub use view::{AdminView, Notifier, NullView, RecordingView, TranscriptionView};

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
