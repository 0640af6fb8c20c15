use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, TimeZone};
use clap::Parser;

use kitchat_core::models::{Message, MessageBody};
use kitchat_core::tracing_setup::init_tracing;
use kitchat_core::{ConversationKey, CoreConfig, CoreEvent, CoreRuntime};

#[derive(Parser)]
#[command(name = "kitchat")]
#[command(about = "Terminal client for a kitchatty chat server")]
struct Cli {
    /// Base URL of the chat server
    #[arg(long, default_value = "https://kitchatty.loca.lt")]
    server: String,

    /// Username to chat as
    #[arg(long, short)]
    user: String,

    /// Message poll interval in milliseconds
    #[arg(long, default_value_t = 2000)]
    poll_ms: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = CoreConfig::new(cli.server, cli.user)
        .with_poll_interval(Duration::from_millis(cli.poll_ms));
    let mut runtime = CoreRuntime::new(config);
    let mut view = ConversationView::new();

    println!("kitchat: broadcast conversation is open; /help lists commands");
    let stdin_rx = spawn_stdin_reader();

    loop {
        for event in runtime.process_pending() {
            view.on_event(&runtime, event);
        }

        match stdin_rx.try_recv() {
            Ok(line) => {
                if !handle_line(&mut runtime, &mut view, line.trim())? {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        thread::sleep(Duration::from_millis(50));
    }

    runtime.shutdown();
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn handle_line(runtime: &mut CoreRuntime, view: &mut ConversationView, line: &str) -> Result<bool> {
    if line.is_empty() {
        return Ok(true);
    }
    let Some(rest) = line.strip_prefix('/') else {
        // Bare text goes to the active conversation
        send(runtime, line, None);
        return Ok(true);
    };
    let (command, args) = rest
        .split_once(' ')
        .map(|(c, a)| (c, a.trim()))
        .unwrap_or((rest, ""));

    match command {
        "open" if !args.is_empty() => {
            runtime.activate(ConversationKey::parse(args))?;
            view.show_conversation(runtime);
        }
        "all" => {
            runtime.activate(ConversationKey::Broadcast)?;
            view.show_conversation(runtime);
        }
        "close" if !args.is_empty() => {
            runtime.close_direct(args)?;
            runtime.activate(ConversationKey::Broadcast)?;
            view.show_conversation(runtime);
        }
        "send" if !args.is_empty() => send(runtime, args, None),
        "reply" => match args.split_once(' ') {
            Some((id, text)) if !text.trim().is_empty() => {
                send(runtime, text.trim(), Some(id.to_string()));
            }
            _ => println!("usage: /reply <message-id> <text>"),
        },
        "delete" if !args.is_empty() => {
            let key = runtime.store().borrow().active_key().clone();
            if runtime.delete_message(&key, args)? {
                println!("  deleted {args}");
            } else {
                println!("  no message {args} in this conversation");
            }
        }
        "unread" => print_unread(runtime),
        "stats" => print_stats(runtime),
        "sync" => runtime.trigger_sync()?,
        "help" => print_help(),
        "quit" | "exit" => return Ok(false),
        _ => println!("unknown command; /help lists commands"),
    }
    Ok(true)
}

fn send(runtime: &CoreRuntime, input: &str, reply_to: Option<String>) {
    let to = runtime.store().borrow().active_key().label();
    if let Err(err) = runtime.send_message(&to, input, reply_to) {
        println!("cannot send: {err}");
    }
}

fn print_unread(runtime: &CoreRuntime) {
    let store = runtime.store();
    let store = store.borrow();
    let mut keys = store.conversation_keys();
    keys.sort_by_key(ConversationKey::label);
    let mut any = false;
    for key in keys {
        let count = store.unread_count_of(&key);
        if count > 0 {
            println!("  {key}: {count} unread");
            any = true;
        }
    }
    if !any {
        println!("  nothing unread");
    }
}

fn print_stats(runtime: &CoreRuntime) {
    let stats = runtime.stats().snapshot();
    println!(
        "  polls: {} ok / {} failed, {} records; sends: {} ok / {} failed; deletes: {}",
        stats.polls,
        stats.poll_failures,
        stats.records_received,
        stats.sends,
        stats.send_failures,
        stats.deletes,
    );
}

fn print_help() {
    println!("  /open <user|group:name|all>  switch conversation");
    println!("  /all                         back to the broadcast channel");
    println!("  /close <user>                stop watching a direct conversation");
    println!("  /send <text>                 send to the active conversation");
    println!("  <text>                       same as /send");
    println!("  /reply <id> <text>           reply to a message");
    println!("  /delete <id>                 delete a message");
    println!("  /unread                      unread counts per conversation");
    println!("  /stats                       sync statistics");
    println!("  /sync                        poll now");
    println!("  /quit                        exit");
}

/// Incremental printer for the active conversation, keyed by message id
/// so promotions rename entries instead of duplicating them.
struct ConversationView {
    printed: HashSet<String>,
}

impl ConversationView {
    fn new() -> Self {
        Self {
            printed: HashSet::new(),
        }
    }

    fn on_event(&mut self, runtime: &CoreRuntime, event: CoreEvent) {
        match event {
            CoreEvent::Updated(key) => {
                let store = runtime.store();
                let store = store.borrow();
                if key == *store.active_key() {
                    for message in store.messages_of(&key) {
                        if self.printed.insert(message.id.clone()) {
                            print_message(message, &store.identity().username);
                        }
                    }
                } else {
                    let unread = store.unread_count_of(&key);
                    if unread > 0 {
                        println!("  ({key}: {unread} unread)");
                    }
                }
            }
            CoreEvent::Promoted { old_id, new_id, .. } => {
                if self.printed.remove(&old_id) {
                    self.printed.insert(new_id);
                }
            }
            CoreEvent::SendFailed { provisional_id, .. } => {
                self.printed.remove(&provisional_id);
                println!("  (send failed, message dropped)");
            }
            CoreEvent::IdentityChanged => {}
        }
    }

    /// Reprint the active conversation from scratch after a switch.
    fn show_conversation(&mut self, runtime: &CoreRuntime) {
        self.printed.clear();
        let store = runtime.store();
        let store = store.borrow();
        let key = store.active_key().clone();
        println!("--- {key} ---");
        for message in store.messages_of(&key) {
            self.printed.insert(message.id.clone());
            print_message(message, &store.identity().username);
        }
    }
}

fn print_message(message: &Message, me: &str) {
    let time = Local
        .timestamp_millis_opt(message.timestamp as i64)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default();
    let body = match &message.body {
        MessageBody::Text(text) => text.clone(),
        MessageBody::Attachment { url, name } => format!("[{name}] {url}"),
    };
    let reply = message
        .reply_to
        .as_deref()
        .map(|id| format!(" (reply to {id})"))
        .unwrap_or_default();
    let pending = if message.is_provisional() { " …" } else { "" };

    if message.from == me {
        println!("[{time}] you -> {}: {body}{reply}{pending}", message.to);
    } else {
        println!("[{time}] {}: {body}{reply}{pending}", message.from);
    }
}
