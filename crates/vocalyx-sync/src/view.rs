//! Seams to the rendering and notification collaborators.
//!
//! The sync core never draws anything. Whatever hosts it (a page shell, a
//! terminal, a test) implements these traits and receives full snapshots.

use std::sync::{Arc, Mutex};

use crate::error::{ClientError, NotificationLevel};
use crate::lock_unpoisoned;
use crate::model::{Project, TranscriptionPage, User};

/// User-visible notifications (toasts on the dashboard page).
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str);

    fn notify_error(&self, error: &ClientError) {
        self.notify(error.notification_level(), &error.to_string());
    }
}

/// Receives the transcription list after a REST refresh.
pub trait TranscriptionView: Send + Sync {
    fn render_transcriptions(&self, page: &TranscriptionPage);
}

/// Receives the admin project table and user cards after a reload.
pub trait AdminView: Send + Sync {
    fn render_projects(&self, projects: &[Project]);
    fn render_users(&self, users: &[User]);
}

/// Collaborator that drops everything; handy for headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullView;

impl Notifier for NullView {
    fn notify(&self, _level: NotificationLevel, _message: &str) {}
}

impl TranscriptionView for NullView {
    fn render_transcriptions(&self, _page: &TranscriptionPage) {}
}

impl AdminView for NullView {
    fn render_projects(&self, _projects: &[Project]) {}
    fn render_users(&self, _users: &[User]) {}
}

/// Collaborator that keeps every call, for hosts that poll and for tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingView {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub notifications: Vec<(NotificationLevel, String)>,
    pub transcription_pages: Vec<TranscriptionPage>,
    pub project_renders: Vec<Vec<Project>>,
    pub user_renders: Vec<Vec<User>>,
}

impl RecordingView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Recorded {
        lock_unpoisoned(&self.inner).clone()
    }

    fn with<F: FnOnce(&mut Recorded)>(&self, apply: F) {
        apply(&mut lock_unpoisoned(&self.inner));
    }
}

impl Notifier for RecordingView {
    fn notify(&self, level: NotificationLevel, message: &str) {
        self.with(|recorded| recorded.notifications.push((level, message.to_string())));
    }
}

impl TranscriptionView for RecordingView {
    fn render_transcriptions(&self, page: &TranscriptionPage) {
        self.with(|recorded| recorded.transcription_pages.push(page.clone()));
    }
}

impl AdminView for RecordingView {
    fn render_projects(&self, projects: &[Project]) {
        self.with(|recorded| recorded.project_renders.push(projects.to_vec()));
    }

    fn render_users(&self, users: &[User]) {
        self.with(|recorded| recorded.user_renders.push(users.to_vec()));
    }
}
