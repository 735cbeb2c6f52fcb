#![expect(
    clippy::print_stdout,
    reason = "the CLI renders dashboard snapshots on stdout"
)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use vocalyx_sync::{
    AdminCoordinator, ClientConfig, Collaborators, DashboardSession, FilterPatch, JobStatus,
    ProjectForm, RevealState, StreamHandlers, UploadForm, UserForm,
};

mod terminal;

pub use terminal::TerminalView;

#[derive(Parser)]
#[command(name = "vocalyx")]
#[command(about = "Vocalyx dashboard client: live job stream and admin operations")]
pub struct VocalyxCli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the `VOCALYX_*` environment configuration.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// Dashboard REST origin
    #[arg(long, env = "VOCALYX_DASHBOARD_URL", global = true)]
    pub dashboard_url: Option<String>,

    /// Origin of the live update stream
    #[arg(long, env = "VOCALYX_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Admin key for project endpoints
    #[arg(long, env = "VOCALYX_ADMIN_KEY", global = true, hide_env_values = true)]
    pub admin_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the live dashboard stream until interrupted
    Watch(FilterArgs),
    /// Fetch one page of transcriptions over REST
    Jobs(FilterArgs),
    /// Show one transcription
    Show { id: String },
    /// Delete one transcription
    Delete { id: String },
    /// Worker pool status
    Workers,
    /// Project administration
    #[command(subcommand)]
    Projects(ProjectCommand),
    /// User administration
    #[command(subcommand)]
    Users(UserCommand),
    /// Submit an audio file for transcription
    Upload(UploadArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    #[arg(long)]
    pub status: Option<JobStatus>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub limit: Option<u32>,
}

impl FilterArgs {
    /// Filter edits in the order the dashboard header applies them; the page
    /// goes last so it survives the reset caused by the others.
    fn patches(&self) -> Vec<FilterPatch> {
        let mut filters = FilterPatch::new();
        let mut touched = false;
        if let Some(status) = &self.status {
            filters = filters.status(Some(status.clone()));
            touched = true;
        }
        if let Some(project) = &self.project {
            filters = filters.project(project.clone());
            touched = true;
        }
        if let Some(search) = &self.search {
            filters = filters.search(search.clone());
            touched = true;
        }
        if let Some(limit) = self.limit {
            filters = filters.limit(limit);
            touched = true;
        }

        let mut patches = Vec::new();
        if touched {
            patches.push(filters);
        }
        if let Some(page) = self.page {
            patches.push(FilterPatch::new().page(page));
        }
        patches
    }
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    List,
    Create { name: String },
    /// Fetch a project's API key
    Reveal { name: String },
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    List,
    Create {
        username: String,
        #[arg(long, env = "VOCALYX_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        admin: bool,
    },
    Delete {
        user_id: String,
    },
    Assign {
        user_id: String,
        project_id: String,
    },
    Unassign {
        user_id: String,
        project_id: String,
    },
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    pub file: PathBuf,
    #[arg(long)]
    pub project: String,
    /// Defaults to the admin key when uploading to the default project
    #[arg(long)]
    pub api_key: Option<String>,
    /// Disable voice activity detection (on by default)
    #[arg(long = "no-vad")]
    pub no_vad: bool,
}

/// Resolve configuration: environment first, then explicit flags.
pub fn resolve_config(args: &ConnectionArgs) -> Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("invalid VOCALYX_* environment")?;
    if let Some(url) = &args.dashboard_url {
        config.dashboard_url.clone_from(url);
        if args.api_url.is_none() {
            config.api_url.clone_from(url);
        }
    }
    if let Some(url) = &args.api_url {
        config.api_url.clone_from(url);
    }
    if let Some(key) = &args.admin_key {
        config.admin_key = Some(key.clone());
    }
    Ok(config)
}

pub async fn run(cli: VocalyxCli) -> Result<()> {
    let config = resolve_config(&cli.connection)?;
    let view = TerminalView::new(cli.json);
    let collaborators = Collaborators {
        notifier: Arc::new(view),
        transcriptions: Arc::new(view),
        admin: Arc::new(view),
    };
    let session = DashboardSession::new(config, collaborators)?;

    match cli.command {
        Commands::Watch(filters) => watch(&session, view, &filters).await,
        Commands::Jobs(filters) => {
            session.filter().apply(&filters.patches()).await?;
            Ok(())
        }
        Commands::Show { id } => {
            view.print_value(&session.api().get_transcription(&id).await?);
            Ok(())
        }
        Commands::Delete { id } => {
            view.print_value(&session.api().delete_transcription(&id).await?);
            Ok(())
        }
        Commands::Workers => {
            view.print_value(&session.api().get_workers_status().await?);
            Ok(())
        }
        Commands::Projects(command) => projects(&session, view, command).await,
        Commands::Users(command) => users(session.admin(), command).await,
        Commands::Upload(args) => upload(&session, view, args).await,
    }
}

async fn watch(session: &DashboardSession, view: TerminalView, filters: &FilterArgs) -> Result<()> {
    let handlers = StreamHandlers::new(move |frame| view.print_frame(&frame));
    if let Err(error) = session.start(handlers).await {
        info!(%error, "continuing while the stream reconnects");
    }
    let patches = filters.patches();
    if !patches.is_empty() {
        session.filter().apply(&patches).await?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    session.shutdown().await;
    Ok(())
}

async fn projects(session: &DashboardSession, view: TerminalView, command: ProjectCommand) -> Result<()> {
    let admin = session.admin();
    match command {
        ProjectCommand::List => {
            admin.load_projects().await?;
        }
        ProjectCommand::Create { name } => {
            let project = admin.create_project(&mut ProjectForm::new(name)).await?;
            if let Some(key) = project.secret() {
                println!("api key: {key}");
            }
        }
        ProjectCommand::Reveal { name } => {
            let state = session.reveal().reveal(&name).await;
            if let RevealState::Error(message) = &state {
                bail!("could not reveal key for {name}: {message}");
            }
            if view.json {
                view.print_value(&serde_json::json!({"name": name, "api_key": state.display_value()}));
            } else {
                println!("{}", state.display_value());
            }
        }
    }
    Ok(())
}

async fn users(admin: &AdminCoordinator, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::List => {
            admin.load_users().await?;
        }
        UserCommand::Create {
            username,
            password,
            admin: is_admin,
        } => {
            admin
                .create_user(&mut UserForm::new(username, password, is_admin))
                .await?;
        }
        UserCommand::Delete { user_id } => admin.delete_user(&user_id).await?,
        UserCommand::Assign {
            user_id,
            project_id,
        } => {
            admin
                .assign_project_to_user(&user_id, Some(&project_id))
                .await?;
        }
        UserCommand::Unassign {
            user_id,
            project_id,
        } => admin.remove_project_from_user(&user_id, &project_id).await?,
    }
    Ok(())
}

async fn upload(session: &DashboardSession, view: TerminalView, args: UploadArgs) -> Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("upload path has no file name")?;

    let mut form = UploadForm::new();
    form.attach_file(file_name, bytes);
    form.select_project(args.project, session.config());
    form.use_vad = !args.no_vad;
    if let Some(key) = args.api_key
        && !form.api_key_locked
    {
        form.api_key = key;
    }

    let response = session.uploads().submit(&mut form).await?;
    view.print_value(&response);
    Ok(())
}
