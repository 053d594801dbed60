//! relaychat-cli – terminal client for a relaychat server.
//!
//! `chat` streams each reply as it arrives and prints the live throughput
//! line once the reply settles.

use std::io::{self, Write};

use anyhow::{Context, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use relaychat_core::text::format_timestamp;
use relaychat_core::{ApiClient, ChatSession, ClientError, SendError, StreamObserver};
use relaychat_types::{Message, StreamingStats};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "relaychat-cli", version, about = "Chat with a relaychat server from the terminal")]
struct Cli {
    /// Server origin
    #[arg(long, env = "RELAYCHAT_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Bearer token printed by `login` or `signup`
    #[arg(long, env = "RELAYCHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account and print its token
    Signup {
        email: String,
        #[arg(long, env = "RELAYCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and print the token
    Login {
        email: String,
        #[arg(long, env = "RELAYCHAT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke the current token
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List conversations, latest activity first
    List,
    /// Print a conversation's messages
    History { conversation_id: String },
    /// Interactive chat. `/new` starts a new conversation, `/quit` exits.
    Chat {
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server)?;
    let client = match cli.token.clone() {
        Some(token) => client.with_token(token),
        None => client,
    };
    debug!(server = %cli.server, "client ready");

    match cli.command {
        Command::Signup { email, password } => {
            let session = client.sign_up(&email, &password).await?;
            println!("{}", session.token);
        }
        Command::Login { email, password } => {
            let session = client.sign_in(&email, &password).await?;
            println!("{}", session.token);
        }
        Command::Logout => {
            require_token(&client)?;
            client.sign_out().await?;
            println!("signed out");
        }
        Command::Whoami => {
            require_token(&client)?;
            let user = client.current_user().await.map_err(auth_hint)?;
            println!("{} ({})", user.email, user.id);
        }
        Command::List => {
            require_token(&client)?;
            list(&client).await?;
        }
        Command::History { conversation_id } => {
            require_token(&client)?;
            history(&client, &conversation_id).await?;
        }
        Command::Chat { conversation } => {
            require_token(&client)?;
            chat(client, conversation).await?;
        }
    }
    Ok(())
}

async fn list(client: &ApiClient) -> anyhow::Result<()> {
    use relaychat_core::HistoryStore;

    let now = Local::now();
    for c in client.list_conversations().await.map_err(auth_hint)? {
        println!(
            "{:>12}  {}  {}",
            format_timestamp(&c.updated_at.with_timezone(&Local), &now),
            c.id,
            c.title
        );
    }
    Ok(())
}

async fn history(client: &ApiClient, conversation_id: &str) -> anyhow::Result<()> {
    use relaychat_core::HistoryStore;

    let messages = client
        .list_messages(conversation_id)
        .await
        .map_err(auth_hint)?;
    print_messages(&messages);
    Ok(())
}

async fn chat(client: ApiClient, conversation: Option<String>) -> anyhow::Result<()> {
    let mut session = ChatSession::new(client.clone(), client);
    session.load_conversations().await;
    if let Some(id) = conversation {
        session
            .select_conversation(&id)
            .await
            .map_err(auth_hint)
            .with_context(|| format!("failed to open conversation {id}"))?;
        print_messages(session.messages());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/quit" => break,
            "/new" => {
                session.new_conversation();
                println!("(new conversation)");
                continue;
            }
            _ => {}
        }

        let mut printer = LivePrinter::new(io::stdout());
        match session.send(&line, &mut printer).await {
            Ok(_) => {
                println!();
                if let Some(stats) = session.stats() {
                    println!("[{stats}]");
                }
            }
            Err(SendError::EmptyMessage) => {}
            Err(SendError::Persistence(e) | SendError::Transport(e)) if e.status() == Some(401) => {
                return Err(auth_hint(e));
            }
            Err(e) => {
                println!();
                eprintln!("error: {e}");
            }
        }
    }
    Ok(())
}

fn print_messages(messages: &[Message]) {
    let now = Local::now();
    for m in messages {
        println!(
            "[{}] {}: {}",
            format_timestamp(&m.created_at.with_timezone(&Local), &now),
            m.role,
            m.content
        );
    }
}

fn require_token(client: &ApiClient) -> anyhow::Result<()> {
    if client.token().is_none() {
        bail!("not signed in; run `relaychat-cli login <email>` and set RELAYCHAT_TOKEN");
    }
    Ok(())
}

/// A 401 means the token is gone; point the user back to `login`.
fn auth_hint(e: ClientError) -> anyhow::Error {
    if e.status() == Some(401) {
        anyhow::anyhow!("session expired or invalid; run `relaychat-cli login <email>` again")
    } else {
        e.into()
    }
}

/// Writes only the newly arrived part of the reply on each update.
struct LivePrinter<W: Write> {
    out: W,
    printed: usize,
}

impl<W: Write> LivePrinter<W> {
    fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }
}

impl<W: Write> StreamObserver for LivePrinter<W> {
    fn on_update(&mut self, placeholder: &Message, _stats: &StreamingStats) {
        // The reply text only ever grows.
        if let Some(delta) = placeholder.content.get(self.printed..) {
            let _ = self.out.write_all(delta.as_bytes());
            let _ = self.out.flush();
        }
        self.printed = placeholder.content.len();
    }
}
