//! Per-project secret reveal state for the admin project table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::error::ClientError;
use crate::lock_unpoisoned;
use crate::model::MASKED_SECRET;
use crate::transport::DashboardApi;
use crate::view::Notifier;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RevealState {
    #[default]
    Masked,
    Loading,
    Revealed {
        value: String,
        visible: bool,
    },
    Error(String),
}

impl RevealState {
    /// Text shown in the key cell for this state.
    #[must_use]
    pub fn display_value(&self) -> &str {
        match self {
            Self::Masked | Self::Revealed { visible: false, .. } => MASKED_SECRET,
            Self::Loading => "loading",
            Self::Revealed { value, .. } => value,
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    state: RevealState,
    generation: u64,
}

/// Puts a row back to `Masked` if the reveal future holding it is dropped
/// before it records a result.
struct LoadingGuard<'a> {
    entries: &'a Mutex<HashMap<String, Entry>>,
    project_name: &'a str,
    generation: u64,
    armed: bool,
}

impl LoadingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut entries = lock_unpoisoned(self.entries);
        if let Some(entry) = entries.get_mut(self.project_name)
            && entry.generation == self.generation
            && entry.state == RevealState::Loading
        {
            debug!(project = self.project_name, "reveal cancelled; row masked again");
            entry.state = RevealState::Masked;
        }
    }
}

/// Caches revealed project keys and coalesces concurrent reveal clicks.
///
/// A fetch in flight for a row that has since been dropped with
/// [`RevealCache::retain_rows`] or [`RevealCache::forget`] is discarded on
/// completion.
#[derive(Clone)]
pub struct RevealCache {
    inner: Arc<RevealInner>,
}

struct RevealInner {
    api: Arc<dyn DashboardApi>,
    admin_key: Option<String>,
    notifier: Arc<dyn Notifier>,
    entries: Mutex<HashMap<String, Entry>>,
    generations: AtomicU64,
}

impl RevealCache {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        admin_key: Option<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(RevealInner {
                api,
                admin_key,
                notifier,
                entries: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn state(&self, project_name: &str) -> RevealState {
        lock_unpoisoned(&self.inner.entries)
            .get(project_name)
            .map(|entry| entry.state.clone())
            .unwrap_or_default()
    }

    /// Handle a click on the key cell of `project_name`.
    ///
    /// Masked and errored rows fetch the key once; a row already loading is
    /// left alone; a revealed row only toggles visibility.
    pub async fn reveal(&self, project_name: &str) -> RevealState {
        let Some(admin_key) = self.inner.admin_key.clone() else {
            self.inner
                .notifier
                .notify_error(&ClientError::validation("admin key is not configured"));
            return self.state(project_name);
        };

        let generation = {
            let mut entries = lock_unpoisoned(&self.inner.entries);
            let entry = entries.entry(project_name.to_string()).or_default();
            match &mut entry.state {
                RevealState::Loading => return RevealState::Loading,
                RevealState::Revealed { visible, .. } => {
                    *visible = !*visible;
                    return entry.state.clone();
                }
                RevealState::Masked | RevealState::Error(_) => {}
            }
            let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
            entry.generation = generation;
            entry.state = RevealState::Loading;
            generation
        };
        let mut guard = LoadingGuard {
            entries: &self.inner.entries,
            project_name,
            generation,
            armed: true,
        };

        debug!(project = project_name, "fetching project key");
        let fetched = self
            .inner
            .api
            .get_project_details(project_name, &admin_key)
            .await
            .and_then(|project| {
                project
                    .secret()
                    .map(str::to_string)
                    .ok_or_else(|| ClientError::Protocol("project details carry no API key".into()))
            });

        let (state, failure) = match fetched {
            Ok(value) => (
                RevealState::Revealed {
                    value,
                    visible: true,
                },
                None,
            ),
            Err(error) => (RevealState::Error(error.to_string()), Some(error)),
        };

        guard.disarm();
        {
            let mut entries = lock_unpoisoned(&self.inner.entries);
            match entries.get_mut(project_name) {
                Some(entry) if entry.generation == generation => entry.state = state.clone(),
                _ => {
                    debug!(project = project_name, "discarding key for a row no longer shown");
                    return RevealState::Masked;
                }
            }
        }

        if let Some(error) = failure {
            error!(project = project_name, %error, "project key reveal failed");
            self.inner.notifier.notify_error(&error);
        }
        state
    }

    /// Drop state for every row not in `shown`; called after a table re-render.
    pub fn retain_rows<I, S>(&self, shown: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let shown: Vec<S> = shown.into_iter().collect();
        lock_unpoisoned(&self.inner.entries)
            .retain(|name, _| shown.iter().any(|kept| kept.as_ref() == name));
    }

    pub fn forget(&self, project_name: &str) {
        lock_unpoisoned(&self.inner.entries).remove(project_name);
    }
}
