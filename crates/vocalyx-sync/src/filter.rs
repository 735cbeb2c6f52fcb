//! Dashboard filter state and the controller that turns edits into queries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::{DEFAULT_PAGE_LIMIT, DEFAULT_SEARCH_DEBOUNCE_MS};
use crate::connection::{ConnectionState, LiveChannel};
use crate::error::{ClientError, Result};
use crate::lock_unpoisoned;
use crate::model::{JobStatus, TranscriptionPage};
use crate::sequence::SequenceGate;
use crate::transport::DashboardApi;
use crate::view::{Notifier, TranscriptionView};

/// Message type the backend answers with a fresh dashboard snapshot.
pub const DASHBOARD_STATE_REQUEST: &str = "get_dashboard_state";

/// Query parameters of the transcription list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterState {
    pub page: u32,
    pub limit: u32,
    pub status: Option<JobStatus>,
    pub project: Option<String>,
    pub search: Option<String>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT)
    }
}

#[derive(Serialize)]
struct DashboardStateRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: &'a FilterState,
}

impl FilterState {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            page: 1,
            limit: limit.max(1),
            status: None,
            project: None,
            search: None,
        }
    }

    /// Apply `patch`. Any field other than `page` sends the list back to page 1.
    pub fn merged(&self, patch: &FilterPatch) -> Result<Self> {
        if patch.page == Some(0) {
            return Err(ClientError::validation("page must be at least 1"));
        }
        if patch.limit == Some(0) {
            return Err(ClientError::validation("limit must be at least 1"));
        }

        let mut next = self.clone();
        if let Some(limit) = patch.limit {
            next.limit = limit;
        }
        if let Some(status) = &patch.status {
            next.status.clone_from(status);
        }
        if let Some(project) = &patch.project {
            next.project = non_empty(project);
        }
        if let Some(search) = &patch.search {
            next.search = non_empty(search);
        }
        next.page = match patch.page {
            Some(page) if patch.is_page_only() => page,
            _ => 1,
        };
        Ok(next)
    }

    /// Query string pairs for `GET /api/transcriptions/recent`.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
        ];
        pairs.extend(self.count_query_pairs());
        pairs
    }

    /// Query string pairs for `GET /api/transcriptions/count` (no pagination).
    #[must_use]
    pub fn count_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = &self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(project) = &self.project {
            pairs.push(("project", project.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        pairs
    }

    /// Stream request carrying the full state; unset filters are sent as `null`.
    pub fn dashboard_request(&self) -> Result<Value> {
        Ok(serde_json::to_value(DashboardStateRequest {
            kind: DASHBOARD_STATE_REQUEST,
            payload: self,
        })?)
    }
}

/// Partial update of a [`FilterState`]. Unset fields are left alone.
///
/// `project` and `search` take the raw control value; an empty string clears
/// the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<Option<JobStatus>>,
    pub project: Option<String>,
    pub search: Option<String>,
}

impl FilterPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn status(mut self, status: Option<JobStatus>) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    #[must_use]
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    #[must_use]
    pub fn is_page_only(&self) -> bool {
        self.page.is_some()
            && self.limit.is_none()
            && self.status.is_none()
            && self.project.is_none()
            && self.search.is_none()
    }

    #[must_use]
    pub fn is_search_only(&self) -> bool {
        self.search.is_some()
            && self.page.is_none()
            && self.limit.is_none()
            && self.status.is_none()
            && self.project.is_none()
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Default)]
struct PendingRefresh {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Owns the live [`FilterState`] and decides how each edit reaches the backend.
///
/// Search edits are debounced; everything else refreshes before `update`
/// returns. Refreshes go over the stream while it is connected and fall back
/// to REST otherwise.
#[derive(Clone)]
pub struct FilterController {
    inner: Arc<FilterInner>,
}

struct FilterInner {
    api: Arc<dyn DashboardApi>,
    live: Arc<dyn LiveChannel>,
    view: Arc<dyn TranscriptionView>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<FilterState>,
    debounce: Duration,
    pending: Mutex<PendingRefresh>,
    gate: SequenceGate,
}

impl FilterController {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        live: Arc<dyn LiveChannel>,
        view: Arc<dyn TranscriptionView>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_settings(
            api,
            live,
            view,
            notifier,
            FilterState::default(),
            Duration::from_millis(DEFAULT_SEARCH_DEBOUNCE_MS),
        )
    }

    pub fn with_settings(
        api: Arc<dyn DashboardApi>,
        live: Arc<dyn LiveChannel>,
        view: Arc<dyn TranscriptionView>,
        notifier: Arc<dyn Notifier>,
        initial: FilterState,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(FilterInner {
                api,
                live,
                view,
                notifier,
                state: Mutex::new(initial),
                debounce,
                pending: Mutex::new(PendingRefresh::default()),
                gate: SequenceGate::new(),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> FilterState {
        lock_unpoisoned(&self.inner.state).clone()
    }

    /// True while a debounced search refresh is waiting for its quiet window.
    #[must_use]
    pub fn has_pending_refresh(&self) -> bool {
        lock_unpoisoned(&self.inner.pending)
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Merge `patch` into the live state and request a refresh.
    ///
    /// Only a validation failure is returned; network failures are reported
    /// through the notifier.
    pub async fn update(&self, patch: FilterPatch) -> Result<()> {
        let snapshot = self.commit(std::slice::from_ref(&patch))?;
        debug!(?patch, page = snapshot.page, "filter updated");

        if patch.is_search_only() {
            self.schedule_debounced_refresh();
        } else {
            self.cancel_pending_refresh();
            self.refresh_with(snapshot).await;
        }
        Ok(())
    }

    /// Merge `patches` in order and issue a single immediate refresh.
    ///
    /// Either every patch is applied or, on a validation failure, none is.
    pub async fn apply(&self, patches: &[FilterPatch]) -> Result<()> {
        let snapshot = self.commit(patches)?;
        debug!(patches = patches.len(), page = snapshot.page, "filters applied");
        self.cancel_pending_refresh();
        self.refresh_with(snapshot).await;
        Ok(())
    }

    // The notifier runs after the state lock is released; it may read `state()`.
    fn commit(&self, patches: &[FilterPatch]) -> Result<FilterState> {
        let merged = {
            let mut state = lock_unpoisoned(&self.inner.state);
            let merged = patches
                .iter()
                .try_fold(state.clone(), |current, patch| current.merged(patch));
            if let Ok(next) = &merged {
                state.clone_from(next);
            }
            merged
        };
        merged.inspect_err(|error| self.inner.notifier.notify_error(error))
    }

    pub async fn set_page(&self, page: u32) -> Result<()> {
        self.update(FilterPatch::new().page(page)).await
    }

    pub async fn set_limit(&self, limit: u32) -> Result<()> {
        self.update(FilterPatch::new().limit(limit)).await
    }

    pub async fn set_status(&self, status: Option<JobStatus>) -> Result<()> {
        self.update(FilterPatch::new().status(status)).await
    }

    pub async fn set_project(&self, project: impl Into<String>) -> Result<()> {
        self.update(FilterPatch::new().project(project)).await
    }

    pub async fn set_search(&self, search: impl Into<String>) -> Result<()> {
        self.update(FilterPatch::new().search(search)).await
    }

    /// Re-issue the current query without changing it.
    pub async fn refresh(&self) {
        let snapshot = self.state();
        self.refresh_with(snapshot).await;
    }

    fn schedule_debounced_refresh(&self) {
        let mut pending = lock_unpoisoned(&self.inner.pending);
        pending.generation += 1;
        let generation = pending.generation;
        let controller = self.clone();
        let delay = self.inner.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if controller.claim_pending(generation) {
                controller.refresh().await;
            }
        });
        if let Some(previous) = pending.task.replace(task) {
            previous.abort();
        }
    }

    // A fired timer detaches itself so later edits cannot abort its in-flight request.
    fn claim_pending(&self, generation: u64) -> bool {
        let mut pending = lock_unpoisoned(&self.inner.pending);
        if pending.generation != generation {
            return false;
        }
        pending.task = None;
        true
    }

    fn cancel_pending_refresh(&self) {
        let mut pending = lock_unpoisoned(&self.inner.pending);
        pending.generation += 1;
        if let Some(previous) = pending.task.take() {
            previous.abort();
        }
    }

    async fn refresh_with(&self, state: FilterState) {
        if self.inner.live.state() == ConnectionState::Connected {
            match state.dashboard_request() {
                Ok(message) => match self.inner.live.send_json(&message).await {
                    Ok(()) => {
                        debug!(page = state.page, "dashboard state requested over stream");
                        return;
                    }
                    Err(error) => {
                        warn!(%error, "stream refresh failed, falling back to REST");
                    }
                },
                Err(error) => warn!(%error, "could not encode stream refresh"),
            }
        }
        self.refresh_over_rest(state).await;
    }

    async fn refresh_over_rest(&self, state: FilterState) {
        let seq = self.inner.gate.next();
        let (items, total) = tokio::join!(
            self.inner.api.get_transcriptions(&state),
            self.inner.api.count_transcriptions(&state)
        );

        match (items, total) {
            (Ok(items), Ok(total)) => {
                if self.inner.gate.try_apply(seq) {
                    self.inner
                        .view
                        .render_transcriptions(&TranscriptionPage { items, total });
                } else {
                    debug!(
                        seq,
                        latest = self.inner.gate.latest_applied(),
                        "discarding stale transcription page"
                    );
                }
            }
            (Err(error), _) | (_, Err(error)) => {
                let latest = self.inner.gate.latest_applied();
                if seq < latest {
                    debug!(seq, latest, %error, "ignoring failure of a superseded refresh");
                    return;
                }
                error!(%error, "transcription refresh failed");
                self.inner.notifier.notify_error(&error);
            }
        }
    }
}
