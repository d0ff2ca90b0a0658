use clap::Parser;
use colored::*;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use mmcode::api::ApiClient;
use mmcode::cli::Args;
use mmcode::config;
use mmcode::engine::Engine;
use mmcode::error::{MmcodeError, Result};
use mmcode::events;
use mmcode::mcp::McpManager;
use mmcode::models::Mode;
use mmcode::session::SessionStore;
use mmcode::ui;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("{} {}", "Error:".red(), e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut app_config = config::load_config();
    if let Some(model) = &args.model {
        app_config.model = model.clone();
    }
    if let Some(theme) = &args.theme {
        app_config.theme = theme.clone();
    }

    if app_config.api_key.is_empty() {
        return Err(MmcodeError::ConfigError(format!(
            "no API key configured. Set MMCODE_API_KEY or add \"apiKey\" to {}",
            config::config_file().display()
        )));
    }

    let mode = if args.plan { Mode::Plan } else { Mode::Builder };
    let client = ApiClient::new(&app_config.api_key);

    let store = Arc::new(SessionStore::open()?);
    let session = store.create_session(&app_config.model)?;

    let mut engine = Engine::new(client.clone(), &app_config.model, mode);
    engine.set_session(session.id.clone(), Arc::clone(&store));

    if !app_config.mcp_servers.is_empty() {
        let mut manager = McpManager::new(app_config.verbose);
        let connected = manager.init_servers(&app_config.mcp_servers).await;
        if !connected.is_empty() {
            println!(
                "{}",
                format!("Connected external tools: {}", connected.join(", ")).cyan()
            );
        }
        engine.set_mcp_manager(Arc::new(tokio::sync::Mutex::new(manager)));
    }

    match client.fetch_quota().await {
        Ok(quota) => println!(
            "{}",
            format!(
                "{} | {} mode | quota {}/{} (resets in {} min)",
                app_config.model,
                mode.label(),
                quota.remaining,
                quota.total,
                quota.reset_minutes
            )
            .dimmed()
        ),
        Err(_) => println!(
            "{}",
            format!("{} | {} mode", app_config.model, mode.label()).dimmed()
        ),
    }

    let (event_tx, event_rx) = events::channel();
    let printer = tokio::spawn(ui::run_event_printer(event_rx));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("{} ", ">".green());
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            // Ctrl-C between turns just discards the pending input.
            _ = tokio::signal::ctrl_c() => continue,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let cancel = engine.arm_cancel();
        let turn = engine.send_message(input, None, &event_tx);
        tokio::pin!(turn);

        loop {
            tokio::select! {
                result = &mut turn => {
                    if let Err(e) = result {
                        eprintln!("{} {}", "Error:".red(), e);
                    }
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                }
            }
        }
    }

    drop(event_tx);
    let _ = printer.await;
    Ok(())
}
