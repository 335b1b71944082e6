mod config;
mod models;
mod providers;
mod routing;
mod services;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use models::{BackendId, ModelId, ModelSelection, Role};
use providers::Dispatcher;
use services::{AccountService, AppSettings, ChatSession, Database, KeyringService, SettingsService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let db = Database::new().await?;
    let keyring = KeyringService::new().await?;
    let dispatcher = Arc::new(Dispatcher::new());
    let accounts = Arc::new(AccountService::new(
        db.clone(),
        keyring,
        dispatcher.clone(),
    ));
    let settings = SettingsService::load(&db).await;
    tracing::debug!(
        keyword_table = routing::keywords::TABLE_VERSION,
        "router ready"
    );

    let mut session = ChatSession::new(
        db.clone(),
        accounts.clone(),
        dispatcher,
        settings.clone(),
    );

    if !db.has_any_accounts().await? {
        println!("No backends configured yet. Add one with: /account add <backend> <api-key>");
    }
    println!(
        "Model: {} (change with /model, see /help)",
        session.selection().as_str()
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();
    let mut ctx = ReplContext {
        db,
        accounts,
        settings,
    };

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(command, &mut session, &mut ctx).await? {
                break;
            }
            continue;
        }

        match session.send(line).await {
            Ok(reply) => {
                println!("[{}] {}", reply.model.display_name(), reply.content);
            }
            Err(e) => {
                tracing::error!("send failed: {:#}", e);
                println!("Error: {:#}", e);
            }
        }
    }

    Ok(())
}

struct ReplContext {
    db: Database,
    accounts: Arc<AccountService>,
    settings: AppSettings,
}

/// Returns false when the REPL should exit.
async fn handle_command(
    command: &str,
    session: &mut ChatSession,
    ctx: &mut ReplContext,
) -> Result<bool> {
    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("quit") | Some("exit") => return Ok(false),
        Some("help") => {
            println!("Commands:");
            println!("  /model [auto|claude|deepseek|copilot|gemini|nanobanana]");
            println!("  /new                     start a fresh conversation");
            println!("  /list                    list conversations");
            println!("  /open <id>               continue a conversation");
            println!("  /history                 show the current conversation");
            println!("  /rename <title>          rename the current conversation");
            println!("  /delete <id>             delete a conversation");
            println!("  /accounts                list configured backends");
            println!("  /models <backend>        list models the backend offers");
            println!("  /account add <backend> <api-key> [base-url]");
            println!("  /account enable|disable|remove <id>");
            println!("  /quit");
        }
        Some("model") => match parts.next() {
            None => println!("Model: {}", session.selection().as_str()),
            Some(tag) => match ModelSelection::from_str(tag) {
                Some(selection) => {
                    session.set_selection(selection);
                    ctx.settings.model_selection = selection;
                    SettingsService::save(&ctx.db, &ctx.settings).await?;
                    println!("Model set to {}", selection.as_str());
                }
                None => println!("Unknown model tag: {}", tag),
            },
        },
        Some("new") => {
            session.reset();
            println!("Started a new conversation.");
        }
        Some("list") => {
            for conv in ctx.db.list_conversations().await? {
                let preview = conv.last_message_preview.as_deref().unwrap_or("");
                println!("{}  {}  {}", conv.id, conv.title, preview);
            }
        }
        Some("open") => match parts.next() {
            Some(id) => match session.open(id).await {
                Ok(messages) => {
                    for msg in messages {
                        print_message(&msg.role, msg.model, &msg.content);
                    }
                }
                Err(e) => println!("Error: {:#}", e),
            },
            None => println!("Usage: /open <id>"),
        },
        Some("history") => match session.conversation_id() {
            Some(id) => {
                for msg in ctx.db.list_messages(id).await? {
                    print_message(&msg.role, msg.model, &msg.content);
                }
            }
            None => println!("No conversation open."),
        },
        Some("rename") => {
            let title = parts.collect::<Vec<_>>().join(" ");
            match (session.conversation_id(), title.is_empty()) {
                (Some(id), false) => {
                    ctx.db.update_conversation_title(id, &title).await?;
                    println!("Renamed.");
                }
                (None, _) => println!("No conversation open."),
                (_, true) => println!("Usage: /rename <title>"),
            }
        }
        Some("delete") => match parts.next() {
            Some(id) => {
                ctx.db.delete_conversation(id).await?;
                if session.conversation_id() == Some(id) {
                    session.reset();
                }
                println!("Deleted.");
            }
            None => println!("Usage: /delete <id>"),
        },
        Some("models") => match parts.next().and_then(BackendId::from_str) {
            Some(backend) => match ctx.accounts.list_models(backend).await {
                Ok(models) => {
                    for m in models {
                        println!("{}  {}", m.id, m.name);
                    }
                }
                Err(e) => println!("Error: {:#}", e),
            },
            None => println!("Usage: /models <openai|anthropic|gemini|deepseek|groq|openrouter>"),
        },
        Some("accounts") => {
            for account in ctx.accounts.list_accounts().await? {
                println!(
                    "{}  {}  {}  model={}  enabled={}  status={}",
                    account.id,
                    account.backend.as_str(),
                    account.label,
                    account.model,
                    account.enabled,
                    account.status.as_str()
                );
            }
        }
        Some("account") => {
            handle_account_command(&mut parts, ctx).await?;
        }
        _ => println!("Unknown command: /{} (see /help)", command),
    }
    Ok(true)
}

async fn handle_account_command(
    parts: &mut std::str::SplitWhitespace<'_>,
    ctx: &ReplContext,
) -> Result<()> {
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("add"), Some(backend_str), Some(api_key), base_url) => {
            match BackendId::from_str(backend_str) {
                Some(backend) => {
                    let result = ctx
                        .accounts
                        .add_account(
                            backend,
                            backend.display_name().to_string(),
                            api_key.to_string(),
                            base_url.map(|s| s.to_string()),
                            None,
                            true,
                        )
                        .await;
                    match result {
                        Ok(account) => {
                            println!("Added {} account {}", backend.as_str(), account.id)
                        }
                        Err(e) => println!("Error: {:#}", e),
                    }
                }
                None => println!("Unknown backend: {}", backend_str),
            }
        }
        (Some("enable"), Some(id), None, None) => {
            ctx.accounts.set_enabled(id, true).await?;
            println!("Enabled.");
        }
        (Some("disable"), Some(id), None, None) => {
            ctx.accounts.set_enabled(id, false).await?;
            println!("Disabled.");
        }
        (Some("remove"), Some(id), None, None) => {
            ctx.accounts.delete_account(id).await?;
            println!("Removed.");
        }
        _ => {
            println!("Usage: /account add <backend> <api-key> [base-url]");
            println!("       /account enable|disable|remove <id>");
        }
    }
    Ok(())
}

fn print_message(role: &Role, model: Option<ModelId>, content: &str) {
    match role {
        Role::User => println!("you: {}", content),
        Role::Assistant => {
            let tag = model.map(|m| m.display_name()).unwrap_or("assistant");
            println!("[{}] {}", tag, content);
        }
    }
}
