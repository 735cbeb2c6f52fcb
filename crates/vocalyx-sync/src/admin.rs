//! Admin page mutations and the project/user reloads that follow them.

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::error::{ClientError, NotificationLevel, Result};
use crate::lock_unpoisoned;
use crate::model::{Project, User};
use crate::reveal::RevealCache;
use crate::sequence::SequenceGate;
use crate::transport::DashboardApi;
use crate::view::{AdminView, Notifier};

/// "New project" input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectForm {
    pub name: String,
}

impl ProjectForm {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn clear(&mut self) {
        self.name.clear();
    }
}

/// "New user" inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserForm {
    pub username: String,
    pub password: String,
    pub is_admin: bool,
}

impl UserForm {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>, is_admin: bool) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            is_admin,
        }
    }

    pub fn clear(&mut self) {
        self.username.clear();
        self.password.clear();
        self.is_admin = false;
    }
}

/// Runs admin mutations one REST call at a time and reloads the affected
/// views from the server afterwards.
///
/// Every operation reports its outcome through the [`Notifier`] and also
/// returns it.
pub struct AdminCoordinator {
    api: Arc<dyn DashboardApi>,
    admin_key: Option<String>,
    view: Arc<dyn AdminView>,
    notifier: Arc<dyn Notifier>,
    reveal: Option<RevealCache>,
    projects: Mutex<Vec<Project>>,
    users: Mutex<Vec<User>>,
    project_gate: SequenceGate,
    user_gate: SequenceGate,
}

impl AdminCoordinator {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        admin_key: Option<String>,
        view: Arc<dyn AdminView>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            admin_key,
            view,
            notifier,
            reveal: None,
            projects: Mutex::new(Vec::new()),
            users: Mutex::new(Vec::new()),
            project_gate: SequenceGate::new(),
            user_gate: SequenceGate::new(),
        }
    }

    /// Prune `reveal` whenever the project table is replaced.
    #[must_use]
    pub fn with_reveal_cache(mut self, reveal: RevealCache) -> Self {
        self.reveal = Some(reveal);
        self
    }

    #[must_use]
    pub fn projects(&self) -> Vec<Project> {
        lock_unpoisoned(&self.projects).clone()
    }

    #[must_use]
    pub fn users(&self) -> Vec<User> {
        lock_unpoisoned(&self.users).clone()
    }

    /// Projects that can still be assigned to `user`. Admins see every
    /// project already, so nothing is offered to them.
    #[must_use]
    pub fn assignable_projects(&self, user: &User) -> Vec<Project> {
        if user.is_admin {
            return Vec::new();
        }
        lock_unpoisoned(&self.projects)
            .iter()
            .filter(|project| {
                project
                    .id
                    .as_deref()
                    .is_some_and(|id| !user.has_project(id))
            })
            .cloned()
            .collect()
    }

    /// Page-load sequence: the project table, then the user cards.
    pub async fn initialize(&self) -> Result<()> {
        let projects = self.load_projects().await;
        let users = self.load_users().await;
        projects.map(drop).and(users.map(drop))
    }

    pub async fn load_projects(&self) -> Result<Vec<Project>> {
        let admin_key = self.require_admin_key()?;
        let seq = self.project_gate.next();
        let projects = self
            .api
            .list_projects(&admin_key)
            .await
            .inspect_err(|error| self.report(error, "project reload failed"))?;

        if !self.project_gate.try_apply(seq) {
            debug!(seq, "discarding stale project list");
            return Ok(self.projects());
        }
        if let Some(reveal) = &self.reveal {
            reveal.retain_rows(projects.iter().map(|project| project.name.as_str()));
        }
        lock_unpoisoned(&self.projects).clone_from(&projects);
        self.view.render_projects(&projects);
        Ok(projects)
    }

    pub async fn load_users(&self) -> Result<Vec<User>> {
        let seq = self.user_gate.next();
        let users = self
            .api
            .list_users()
            .await
            .inspect_err(|error| self.report(error, "user reload failed"))?;

        if !self.user_gate.try_apply(seq) {
            debug!(seq, "discarding stale user list");
            return Ok(self.users());
        }
        lock_unpoisoned(&self.users).clone_from(&users);
        self.view.render_users(&users);
        Ok(users)
    }

    /// Create a project, then reload projects and users. The form is cleared
    /// only on success.
    pub async fn create_project(&self, form: &mut ProjectForm) -> Result<Project> {
        let name = form.name.trim().to_string();
        if name.is_empty() {
            return Err(self.reject("project name is required"));
        }
        let admin_key = self.require_admin_key()?;

        let project = self
            .api
            .create_project(&name, &admin_key)
            .await
            .inspect_err(|error| self.report(error, "project creation failed"))?;

        info!(project = %project.name, "project created");
        form.clear();
        self.notifier.notify(
            NotificationLevel::Success,
            &format!("Project '{}' created", project.name),
        );
        self.reload_projects().await;
        self.reload_users().await;
        Ok(project)
    }

    pub async fn create_user(&self, form: &mut UserForm) -> Result<User> {
        let username = form.username.trim().to_string();
        if username.is_empty() || form.password.is_empty() {
            return Err(self.reject("username and password are required"));
        }

        let user = self
            .api
            .create_user(&username, &form.password, form.is_admin)
            .await
            .inspect_err(|error| self.report(error, "user creation failed"))?;

        info!(user = %user.username, admin = user.is_admin, "user created");
        form.clear();
        self.notifier.notify(
            NotificationLevel::Success,
            &format!("User '{}' created", user.username),
        );
        self.reload_users().await;
        Ok(user)
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        if user_id.is_empty() {
            return Err(self.reject("no user selected"));
        }
        self.api
            .delete_user(user_id)
            .await
            .inspect_err(|error| self.report(error, "user deletion failed"))?;

        info!(user_id, "user deleted");
        self.notifier.notify(NotificationLevel::Success, "User deleted");
        self.reload_users().await;
        Ok(())
    }

    /// `project_id` is the dropdown selection; `None` or empty means nothing picked.
    pub async fn assign_project_to_user(&self, user_id: &str, project_id: Option<&str>) -> Result<()> {
        let Some(project_id) = project_id.filter(|id| !id.is_empty()) else {
            return Err(self.reject("select a project to assign"));
        };
        self.api
            .assign_project_to_user(user_id, project_id)
            .await
            .inspect_err(|error| self.report(error, "project assignment failed"))?;

        info!(user_id, project_id, "project assigned");
        self.notifier.notify(NotificationLevel::Success, "Project assigned");
        self.reload_users().await;
        Ok(())
    }

    pub async fn remove_project_from_user(&self, user_id: &str, project_id: &str) -> Result<()> {
        if project_id.is_empty() {
            return Err(self.reject("no project selected"));
        }
        self.api
            .remove_project_from_user(user_id, project_id)
            .await
            .inspect_err(|error| self.report(error, "project removal failed"))?;

        info!(user_id, project_id, "project removed from user");
        self.notifier.notify(NotificationLevel::Success, "Project removed");
        self.reload_users().await;
        Ok(())
    }

    pub async fn get_project_details(&self, project_name: &str) -> Result<Project> {
        let admin_key = self.require_admin_key()?;
        self.api
            .get_project_details(project_name, &admin_key)
            .await
            .inspect_err(|error| self.report(error, "project details failed"))
    }

    async fn reload_projects(&self) {
        if let Err(error) = self.load_projects().await {
            debug!(%error, "project reload after mutation failed");
        }
    }

    async fn reload_users(&self) {
        if let Err(error) = self.load_users().await {
            debug!(%error, "user reload after mutation failed");
        }
    }

    fn require_admin_key(&self) -> Result<String> {
        match self.admin_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(self.reject("admin key is not configured")),
        }
    }

    fn reject(&self, message: &str) -> ClientError {
        let error = ClientError::validation(message);
        self.notifier.notify_error(&error);
        error
    }

    fn report(&self, error: &ClientError, context: &str) {
        error!(%error, "{context}");
        self.notifier.notify_error(error);
    }
}
