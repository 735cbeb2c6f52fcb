//! Collaborators that draw dashboard snapshots on stdout.

use serde_json::Value;
use tracing::{error, info, warn};
use vocalyx_sync::{
    AdminView, NotificationLevel, Notifier, Project, TranscriptionPage, TranscriptionView, User,
};

/// Prints snapshots as they arrive; `json` switches to one JSON document per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalView {
    pub json: bool,
}

impl TerminalView {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print one inbound stream frame.
    pub fn print_frame(&self, frame: &Value) {
        if self.json {
            println!("{frame}");
            return;
        }
        let kind = frame.get("type").and_then(Value::as_str).unwrap_or("message");
        println!("[{kind}] {}", frame.get("payload").unwrap_or(frame));
    }

    pub fn print_value(&self, value: &Value) {
        if self.json {
            println!("{value}");
        } else {
            match serde_json::to_string_pretty(value) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{value}"),
            }
        }
    }
}

impl Notifier for TerminalView {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Info | NotificationLevel::Success => {
                info!(level = level.as_str(), "{message}");
            }
            NotificationLevel::Warning => warn!("{message}"),
            NotificationLevel::Error => error!("{message}"),
        }
    }
}

impl TranscriptionView for TerminalView {
    fn render_transcriptions(&self, page: &TranscriptionPage) {
        if self.json {
            println!(
                "{}",
                serde_json::json!({"total": page.total, "items": page.items})
            );
            return;
        }
        println!("{} transcription(s) match", page.total);
        for item in page.items.as_array().into_iter().flatten() {
            println!("  {}", transcription_line(item));
        }
    }
}

impl AdminView for TerminalView {
    fn render_projects(&self, projects: &[Project]) {
        if self.json {
            self.print_value(&serde_json::to_value(projects).unwrap_or_default());
            return;
        }
        println!("{:<38} {:<24} CREATED", "ID", "NAME");
        for project in projects {
            let created = project
                .created_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "{:<38} {:<24} {created}",
                project.id.as_deref().unwrap_or("-"),
                project.name
            );
        }
    }

    fn render_users(&self, users: &[User]) {
        if self.json {
            self.print_value(&serde_json::to_value(users).unwrap_or_default());
            return;
        }
        for user in users {
            let role = if user.is_admin { "admin" } else { "user" };
            let projects: Vec<&str> = user.projects.iter().map(|project| project.name.as_str()).collect();
            println!("{} ({role}, id {}): {}", user.username, user.id, projects.join(", "));
        }
    }
}

fn transcription_line(item: &Value) -> String {
    let field = |key: &str| {
        item.get(key)
            .map(|value| match value {
                Value::String(text) => text.clone(),
                Value::Null => "-".to_string(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "-".to_string())
    };
    format!(
        "{} {:<10} {:<16} {}",
        field("id"),
        field("status"),
        field("project_name"),
        field("file_name")
    )
}
