use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info};

use room_admin::api::AdminClient;
use room_admin::catalog::Catalog;
use room_admin::chat::ChatView;
use room_admin::config::{self, Config};
use room_admin::notice::Notice;
use room_admin::render;
use room_admin::resource::{Action, AssumeYes, Confirm, ListController, Outcome};
use room_admin::session::{SessionContext, SessionStore};
use room_admin::upload::HttpUploader;

#[derive(Debug, Parser)]
#[command(author, version, about = "Admin console for the voice room platform")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in admin
    Whoami,
    /// List manageable resources
    Resources,
    /// Show one page of a resource
    List {
        resource: String,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Search by id on the server instead of filtering locally
        #[arg(long)]
        id: Option<String>,
    },
    /// Create a record from key=value fields (values parsed as JSON when possible)
    Create {
        resource: String,
        #[arg(long = "field", value_parser = parse_key_val)]
        fields: Vec<(String, String)>,
        /// key=path; uploaded before the record is written
        #[arg(long = "file", value_parser = parse_key_val)]
        files: Vec<(String, String)>,
    },
    /// Update a record
    Update {
        resource: String,
        id: String,
        #[arg(long = "field", value_parser = parse_key_val)]
        fields: Vec<(String, String)>,
        #[arg(long = "file", value_parser = parse_key_val)]
        files: Vec<(String, String)>,
    },
    /// Delete a record
    Delete {
        resource: String,
        id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Run a status action (approve, reject, ban, resolve, ...)
    Action {
        resource: String,
        id: String,
        action: String,
        #[arg(long)]
        yes: bool,
    },
    /// Follow a room's chat; lines typed on stdin are sent
    Chat { room_id: String },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if k.trim().is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((k.trim().to_string(), v.to_string()))
}

/// Numbers, booleans, arrays and objects are taken as JSON; anything else is text.
fn field_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Array(_) | Value::Object(_))) => v,
        _ => Value::String(raw.to_string()),
    }
}

/// Write `prompt` and read one answer line. Write or read failures count as "no".
async fn ask_yes_no<W, R>(out: &mut W, input: &mut R, prompt: &str) -> bool
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    let prompt = format!("{prompt} [y/N] ");
    if out.write_all(prompt.as_bytes()).await.is_err() || out.flush().await.is_err() {
        return false;
    }
    let mut line = String::new();
    if input.read_line(&mut line).await.is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        let mut reader = BufReader::new(tokio::io::stdin());
        ask_yes_no(&mut tokio::io::stdout(), &mut reader, prompt).await
    }
}

fn print_notices(notices: Vec<Notice>) {
    for notice in notices {
        if notice.is_error() {
            eprintln!("{notice}");
        } else {
            println!("{notice}");
        }
    }
}

fn exit_for(outcome: Outcome) -> ExitCode {
    match outcome {
        Outcome::Done | Outcome::Cancelled => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

struct App {
    cfg: Config,
    session: SessionContext,
    store: SessionStore,
    client: Arc<AdminClient>,
    uploader: Arc<HttpUploader>,
    catalog: Catalog,
}

impl App {
    async fn init(cfg: Config) -> Result<Self> {
        cfg.ensure_dirs()?;
        let store = SessionStore::open(&cfg.session_db_url()).await?;
        let session = SessionContext::load(&store).await?;
        let client = Arc::new(AdminClient::from_config(&cfg, session.clone())?);
        let uploader = Arc::new(HttpUploader::from_config(&cfg)?);
        let catalog = Catalog::with_overrides(&cfg.resources);
        Ok(Self {
            cfg,
            session,
            store,
            client,
            uploader,
            catalog,
        })
    }

    fn controller(&self, resource: &str) -> Result<ListController> {
        let spec = self.catalog.get(resource).cloned().ok_or_else(|| {
            anyhow!(
                "unknown resource '{resource}' (known: {})",
                self.catalog.names().collect::<Vec<_>>().join(", ")
            )
        })?;
        Ok(ListController::new(
            spec,
            self.client.clone(),
            self.uploader.clone(),
            self.session.clone(),
            self.cfg.app.page_size,
        ))
    }

    fn show(&self, screen: &ListController) {
        let table = render::table(screen.spec(), &screen.page_view(), &screen.pending_ids());
        println!("{table}");
    }

    async fn edit(
        &self,
        resource: &str,
        id: Option<&str>,
        fields: Vec<(String, String)>,
        files: Vec<(String, String)>,
    ) -> Result<ExitCode> {
        let screen = self.controller(resource)?;
        match id {
            Some(id) => {
                screen.load().await;
                if !screen.open_edit(id) {
                    print_notices(screen.take_notices());
                    return Err(anyhow!("no {resource} with id {id}"));
                }
            }
            None => screen.open_create(),
        }
        for (name, raw) in fields {
            screen.set_field(&name, field_value(&raw));
        }
        for (name, path) in files {
            screen.set_file(&name, PathBuf::from(path));
        }
        let outcome = screen.submit().await;
        print_notices(screen.take_notices());
        Ok(exit_for(outcome))
    }

    async fn chat(&self, room_id: String) -> Result<ExitCode> {
        let Some(admin_id) = self.session.admin_id() else {
            return Err(anyhow!("not signed in"));
        };
        let view = ChatView::new(
            self.client.clone(),
            room_id,
            self.session.clone(),
            Duration::from_millis(self.cfg.app.chat_poll_interval_ms),
        );
        view.activate();
        info!(room_id = view.room_id(), "following chat; ctrl-d to leave");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut redraw = tokio::time::interval(Duration::from_millis(250));
        let mut last_error: Option<&'static str> = None;
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("failed to read stdin")? else { break };
                    if line.trim() == "/dismiss" {
                        view.dismiss_banner();
                        continue;
                    }
                    view.send(&line).await;
                    if let Some(banner) = view.banner() {
                        eprintln!("[blocked] {banner}");
                    }
                    print_notices(view.take_notices());
                }
                _ = redraw.tick() => {
                    let error = view.load_error();
                    if error != last_error {
                        if let Some(text) = error {
                            eprintln!("{text}");
                        }
                        last_error = error;
                    }
                    if view.take_scroll_request() {
                        println!("---- room {} ----", view.room_id());
                        for (side, message) in view.attributed() {
                            println!("{}", render::chat_line(side, &message, 72));
                        }
                    }
                }
            }
        }
        view.deactivate();
        info!(admin_id = %admin_id, "left chat");
        Ok(ExitCode::SUCCESS)
    }

    async fn run(&self, command: Command) -> Result<ExitCode> {
        match command {
            Command::Login { email, password } => {
                let session = self
                    .session
                    .login(self.client.as_ref(), &self.store, &email, &password)
                    .await?;
                println!("signed in as {}", session.profile.display_name());
                Ok(ExitCode::SUCCESS)
            }
            Command::Logout => {
                self.session.logout(&self.store).await?;
                println!("signed out");
                Ok(ExitCode::SUCCESS)
            }
            Command::Whoami => match self.session.current() {
                Some(s) => {
                    println!("{} ({})", s.profile.display_name(), s.profile.id());
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    println!("not signed in");
                    Ok(ExitCode::FAILURE)
                }
            },
            Command::Resources => {
                for name in self.catalog.names() {
                    println!("{name}");
                }
                Ok(ExitCode::SUCCESS)
            }
            Command::List {
                resource,
                search,
                category,
                page,
                id,
            } => {
                let screen = self.controller(&resource)?;
                let outcome = match id {
                    Some(id) => screen.remote_search(&id).await,
                    None => screen.load().await,
                };
                if let Some(term) = search {
                    screen.set_search(&term);
                }
                if category.is_some() {
                    screen.set_category(category.as_deref());
                }
                screen.goto_page(page);
                print_notices(screen.take_notices());
                self.show(&screen);
                Ok(exit_for(outcome))
            }
            Command::Create {
                resource,
                fields,
                files,
            } => self.edit(&resource, None, fields, files).await,
            Command::Update {
                resource,
                id,
                fields,
                files,
            } => self.edit(&resource, Some(&id), fields, files).await,
            Command::Delete { resource, id, yes } => {
                self.perform(&resource, &id, Action::Delete, yes).await
            }
            Command::Action {
                resource,
                id,
                action,
                yes,
            } => {
                self.perform(&resource, &id, Action::Status(action), yes)
                    .await
            }
            Command::Chat { room_id } => self.chat(room_id).await,
        }
    }

    async fn perform(&self, resource: &str, id: &str, action: Action, yes: bool) -> Result<ExitCode> {
        let screen = self.controller(resource)?;
        let outcome = if yes {
            screen.perform(&action, id, &AssumeYes).await
        } else {
            screen.perform(&action, id, &StdinConfirm).await
        };
        print_notices(screen.take_notices());
        if outcome == Outcome::Cancelled {
            println!("cancelled");
        }
        Ok(exit_for(outcome))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let app = App::init(cfg).await?;
    match app.run(args.command).await {
        Ok(code) => Ok(code),
        Err(err) => {
            error!(?err, "command failed");
            eprintln!("error: {err:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn confirmation_reads_answer_line() {
        let mut out = Vec::new();
        let mut input: &[u8] = b"yes\n";
        assert!(ask_yes_no(&mut out, &mut input, "delete gifts g1?").await);
        assert_eq!(String::from_utf8(out).unwrap(), "delete gifts g1? [y/N] ");

        let mut input: &[u8] = b"\n";
        assert!(!ask_yes_no(&mut Vec::new(), &mut input, "delete?").await);
    }

    #[tokio::test]
    async fn unwritable_prompt_declines() {
        let mut input: &[u8] = b"y\n";
        assert!(!ask_yes_no(&mut BrokenPipe, &mut input, "delete?").await);
    }

    #[test]
    fn key_val_parsing() {
        assert_eq!(
            parse_key_val("price=9.5").unwrap(),
            ("price".to_string(), "9.5".to_string())
        );
        assert_eq!(
            parse_key_val("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn field_values_prefer_json() {
        assert_eq!(field_value("12"), json!(12));
        assert_eq!(field_value("true"), json!(true));
        assert_eq!(field_value("[\"a\"]"), json!(["a"]));
        assert_eq!(field_value("Rose"), json!("Rose"));
        assert_eq!(field_value("\"quoted\""), json!("\"quoted\""));
    }
}
