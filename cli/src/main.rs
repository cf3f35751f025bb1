mod seed;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use clap::Parser;
use sphere_chat_core::{
    AppAction, AppReconciler, AppState, AppUpdate, ChatApp, MockWallet, ThreadLoadState,
    format_chat_time, truncate_key,
};

#[derive(Debug, Parser)]
#[command(name = "sphere-chat")]
#[command(about = "Interactive direct-message client over an in-process demo wallet")]
struct Cli {
    /// Data directory (chat_config.json is read from here)
    #[arg(long, default_value = ".sphere-chat")]
    data_dir: PathBuf,

    /// Tag the demo wallet reports for this identity
    #[arg(long, default_value = "me")]
    self_tag: String,

    /// Artificial latency for history pages, in milliseconds
    #[arg(long, env = "SPHERE_CHAT_PAGE_DELAY_MS", default_value_t = 0)]
    page_delay_ms: u64,

    /// Have the wallet omit tags from every response
    #[arg(long)]
    omit_tags: bool,
}

const HELP: &str = "\
commands:
  list                 show conversations
  open <key|@tag>      open a conversation (key prefixes work)
  older                load older messages
  send <text>          send to the open conversation or new chat
  new <@tag>           start a new conversation
  close                close the open conversation
  retry                retry a failed load
  push <@tag> <text>   simulate an incoming message
  whois <key>          show the cached tag for a key
  help                 this text
  quit                 exit";

/// Prints pushed messages and newly surfaced errors as they happen.
struct PrintingReconciler {
    last_error: Mutex<Option<String>>,
}

impl AppReconciler for PrintingReconciler {
    fn reconcile(&self, update: AppUpdate) {
        match update {
            AppUpdate::MessageReceived {
                message,
                peer_display,
                ..
            } => {
                println!(
                    "\n<< {} [{}] {}",
                    peer_display,
                    format_chat_time(message.timestamp),
                    message.content
                );
            }
            AppUpdate::FullState(state) => {
                let mut last = match self.last_error.lock() {
                    Ok(g) => g,
                    Err(poison) => poison.into_inner(),
                };
                if state.error != *last {
                    if let Some(err) = &state.error {
                        println!("\n!! {err}");
                    }
                    *last = state.error.clone();
                }
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("create data dir {}", cli.data_dir.display()))?;
    let data_dir = cli
        .data_dir
        .to_str()
        .ok_or_else(|| anyhow!("data dir is not valid UTF-8"))?;

    let wallet = seed::demo_wallet(
        Some(cli.self_tag.as_str()),
        Duration::from_millis(cli.page_delay_ms),
    );
    wallet.set_omit_tags(cli.omit_tags);

    let app = ChatApp::new(data_dir, seed::SELF_KEY, wallet.clone())
        .context("start chat engine")?;
    app.listen_for_updates(Box::new(PrintingReconciler {
        last_error: Mutex::new(None),
    }));

    println!("signed in as {}", truncate_key(seed::SELF_KEY));
    println!("{HELP}");
    settle(&app);
    print_conversations(&app.state());

    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        std::io::stdout().flush().context("flush stdout")?;
        line.clear();
        if stdin.lock().read_line(&mut line).context("read stdin")? == 0 {
            break;
        }
        let (cmd, rest) = match line.trim().split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line.trim(), ""),
        };
        match cmd {
            "" => {}
            "quit" | "exit" => break,
            "help" => println!("{HELP}"),
            "list" => {
                app.dispatch(AppAction::RefreshConversations);
                settle(&app);
                print_conversations(&app.state());
            }
            "open" => match resolve_peer(&app, &wallet, rest) {
                Some(peer_key) => {
                    app.dispatch(AppAction::SelectPeer { peer_key });
                    settle(&app);
                    print_thread(&app.state());
                }
                None => println!("no conversation matches {rest:?}"),
            },
            "older" => {
                app.dispatch(AppAction::LoadOlder);
                settle(&app);
                print_thread(&app.state());
            }
            "send" => {
                app.dispatch(AppAction::Send {
                    content: rest.to_string(),
                });
                settle(&app);
                print_thread(&app.state());
            }
            "new" => {
                app.dispatch(AppAction::StartNewChat {
                    recipient: rest.to_string(),
                });
                settle(&app);
                if let Some(title) = app.state().thread_title() {
                    println!("{title}");
                }
            }
            "close" => match app.state().selected_peer() {
                Some(peer_key) => {
                    app.dispatch(AppAction::ClearSelection);
                    println!("closed {}", truncate_key(peer_key));
                }
                None => println!("no conversation is open"),
            },
            "retry" => {
                app.dispatch(AppAction::RetryLoad);
                settle(&app);
                print_thread(&app.state());
            }
            "push" => match rest.split_once(char::is_whitespace) {
                Some((who, text)) => match resolve_peer(&app, &wallet, who) {
                    Some(from) => {
                        wallet.deliver_incoming(&from, text.trim());
                    }
                    None => println!("unknown sender {who:?}"),
                },
                None => println!("usage: push <@tag> <text>"),
            },
            "whois" => match resolve_peer(&app, &wallet, rest) {
                Some(key) => match app.lookup_tag(&key) {
                    Some(tag) => println!("{key} is @{tag}"),
                    None => println!("{key} has no known tag"),
                },
                None => println!("no peer matches {rest:?}"),
            },
            other => println!("unknown command {other:?}, try help"),
        }
    }

    app.shutdown();
    Ok(())
}

/// Wait briefly for in-flight work to land so output reflects it.
fn settle(app: &ChatApp) {
    let start = Instant::now();
    let mut seen = app.state().rev;
    let mut quiet_since = Instant::now();
    while start.elapsed() < Duration::from_secs(3) {
        std::thread::sleep(Duration::from_millis(25));
        let s = app.state();
        let busy = s.busy.sending || s.busy.loading_thread || s.busy.loading_older;
        if s.rev != seen {
            seen = s.rev;
            quiet_since = Instant::now();
        } else if !busy && quiet_since.elapsed() >= Duration::from_millis(100) {
            return;
        }
    }
}

/// Accepts `@tag`, a full key or a unique key prefix.
fn resolve_peer(app: &ChatApp, wallet: &Arc<MockWallet>, input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let state = app.state();
    if let Some(tag) = input.strip_prefix('@') {
        let known = state.conversations.iter().find(|c| {
            c.display_name.eq_ignore_ascii_case(input)
                || c.peer_tag.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(tag))
        });
        return known
            .map(|c| c.peer_key.clone())
            .or_else(|| wallet.key_for_tag(tag));
    }
    let mut matches = state
        .conversations
        .iter()
        .filter(|c| c.peer_key.starts_with(input));
    match (matches.next(), matches.next()) {
        (Some(c), None) => Some(c.peer_key.clone()),
        _ => Some(input.to_string()).filter(|k| k.len() > 16),
    }
}

fn print_conversations(state: &AppState) {
    if state.conversations.is_empty() {
        println!("(no conversations)");
        return;
    }
    for c in &state.conversations {
        let unread = if c.unread_count > 0 {
            format!(" ({} unread)", c.unread_count)
        } else {
            String::new()
        };
        println!(
            "  {:<20} {:>8}  {}{}",
            c.display_name,
            format_chat_time(c.last_message.timestamp),
            preview(&c.last_message.content),
            unread
        );
    }
}

fn print_thread(state: &AppState) {
    let Some(thread) = &state.current_thread else {
        if let Some(title) = state.thread_title() {
            println!("{title}");
        }
        return;
    };
    println!("── {} ──", thread.peer_display);
    if thread.has_more {
        println!("  (older messages available, type `older`)");
    }
    if thread.load_state == ThreadLoadState::Loading {
        println!("  loading...");
    }
    for m in &thread.messages {
        let who = if m.is_from(&state.self_key) {
            "me".to_string()
        } else {
            thread.peer_display.clone()
        };
        println!("  [{}] {}: {}", format_chat_time(m.timestamp), who, m.content);
    }
    if thread.messages.is_empty() && thread.load_state != ThreadLoadState::Loading {
        println!("  (no messages)");
    }
}

fn preview(content: &str) -> String {
    const MAX: usize = 40;
    if content.chars().count() <= MAX {
        return content.to_string();
    }
    let cut: String = content.chars().take(MAX).collect();
    format!("{cut}...")
}
