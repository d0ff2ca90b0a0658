//! Minimal event renderer for the line-oriented front-end.
//!
//! State here is a pure projection of the engine's event stream; the
//! printer owns the receiving end of the bus for the whole process.

use colored::*;
use std::io::{self, Write};

use crate::events::{EngineEvent, EventReceiver, ToolStatus};

pub async fn run_event_printer(mut rx: EventReceiver) {
    let mut in_reasoning = false;

    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::StreamStart => {}
            EngineEvent::ReasoningDelta(text) => {
                in_reasoning = true;
                print!("{}", text.dimmed());
                let _ = io::stdout().flush();
            }
            EngineEvent::ContentDelta(text) => {
                if in_reasoning {
                    in_reasoning = false;
                    println!();
                }
                print!("{}", text);
                let _ = io::stdout().flush();
            }
            EngineEvent::ToolCallSnapshot(_) => {}
            EngineEvent::AssistantFinalized(_) => {
                if in_reasoning {
                    in_reasoning = false;
                }
                println!();
            }
            EngineEvent::ToolStart { name, .. } => {
                println!("{}", format!("* {} ...", name).cyan());
            }
            EngineEvent::ToolEnd {
                name,
                status,
                result,
                ..
            } => {
                let line = match status {
                    ToolStatus::Done => format!("* {} done", name).cyan(),
                    ToolStatus::Error => format!("* {} failed", name).red(),
                };
                println!("{}", line);
                let preview: String = result.lines().take(6).collect::<Vec<_>>().join("\n");
                if !preview.is_empty() {
                    println!("{}", preview.dimmed());
                }
            }
            EngineEvent::TokenUsage { .. } => {}
            EngineEvent::SystemNotice(text) => {
                println!("{}", text.yellow());
            }
            EngineEvent::Error(text) => {
                eprintln!("{} {}", "Error:".red(), text);
            }
            EngineEvent::TurnDone => {
                println!();
                let _ = io::stdout().flush();
            }
        }
    }
}
