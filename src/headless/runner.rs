//! Headless mode runner - main event loop fed by stdin commands
//!
//! Each stdin line is one command; the engine's events are written to
//! stdout as they are produced.
//!
//! | Command              | Message                 |
//! |----------------------|-------------------------|
//! | `discover`           | `Discover`              |
//! | `discover-all`       | `DiscoverAll`           |
//! | `select <id>`        | `SelectDevice`          |
//! | `open <id>`          | `OpenDevice`            |
//! | `close`              | `CloseSession`          |
//! | `back` / `refresh`   | `Back` / `Refresh`      |
//! | `pin <digits>`       | `EnterPin`              |
//! | `menu`               | `ToggleMenu`            |
//! | `info` / `fsbr`      | `OpenInfo` / `OpenFsbr` |
//! | `config` / `save`    | `OpenConfig` / `SaveConfig` |
//! | `test` / `projects`  | `OpenTest` / `OpenProjects` |
//! | `set <key> <json>`   | `SetConfig`             |
//! | `delete <id>`        | `DeleteDevice`          |
//! | `clear`              | `ClearDevices`          |
//! | `export`             | `Export`                |
//! | `import <blob>`      | `Import`                |
//! | `cli` / `cli <text>` | `ToggleCli` / `SendCli` |
//! | `q` / `quit`         | `Quit`                  |

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use hubdeck_app::{Engine, EngineEvent, EngineOptions, Message};
use hubdeck_core::prelude::*;
use serde_json::Value;

use super::HeadlessEvent;

/// Run in headless mode until `quit`, a signal, or stdin closes
pub async fn run_headless(options: EngineOptions) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("hubdeck starting in HEADLESS mode");
    info!("Data directory: {}", options.resolve_data_dir().display());
    info!("═══════════════════════════════════════════════════════");

    let mut engine = Engine::new(options);
    let mut events = engine.subscribe();

    let stdin_tx = engine.msg_sender();
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(stdin_tx);
    });

    engine.process_message(Message::Startup);
    flush_events(&mut events);

    let result = headless_event_loop(&mut engine, &mut events).await;

    engine.shutdown().await;
    flush_events(&mut events);

    info!("hubdeck headless mode exiting");
    result
}

/// Main headless event loop
async fn headless_event_loop(
    engine: &mut Engine,
    events: &mut broadcast::Receiver<EngineEvent>,
) -> Result<()> {
    loop {
        if engine.should_quit() {
            info!("Quit requested");
            break;
        }

        match engine.msg_rx.recv().await {
            Some(msg) => {
                engine.process_message(msg);
                flush_events(events);
            }
            None => {
                info!("Message channel closed");
                break;
            }
        }
    }

    Ok(())
}

/// Write every event produced so far to stdout
fn flush_events(events: &mut broadcast::Receiver<EngineEvent>) {
    loop {
        match events.try_recv() {
            Ok(event) => HeadlessEvent::from_engine(&event).emit(),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!("Headless output lagged, {} event(s) dropped", skipped);
            }
            Err(_) => break,
        }
    }
}

/// Map one stdin line to a message; `None` for unknown or incomplete commands
pub fn parse_command(line: &str) -> Option<Message> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    let msg = match (command, arg) {
        ("discover", None) => Message::Discover,
        ("discover-all", None) => Message::DiscoverAll,
        ("select", Some(id)) => Message::SelectDevice { id },
        ("open", Some(id)) => Message::OpenDevice { id },
        ("close", None) => Message::CloseSession,
        ("back", None) => Message::Back,
        ("refresh", None) => Message::Refresh,
        ("pin", Some(digits)) => Message::EnterPin { digits },
        ("menu", None) => Message::ToggleMenu,
        ("info", None) => Message::OpenInfo,
        ("fsbr", None) => Message::OpenFsbr,
        ("config", None) => Message::OpenConfig,
        ("save", None) => Message::SaveConfig,
        ("test", None) => Message::OpenTest,
        ("projects", None) => Message::OpenProjects,
        ("set", Some(args)) => parse_set(&args)?,
        ("delete", Some(id)) => Message::DeleteDevice { id },
        ("clear", None) => Message::ClearDevices,
        ("export", None) => Message::Export,
        ("import", Some(blob)) => Message::Import { blob },
        ("cli", None) => Message::ToggleCli,
        ("cli", Some(text)) => Message::SendCli { text },
        ("q" | "quit", None) => Message::Quit,
        _ => return None,
    };
    Some(msg)
}

/// `<key> <json>`; a value that is not JSON is taken as a plain string
fn parse_set(args: &str) -> Option<Message> {
    let (key, raw) = args.split_once(char::is_whitespace)?;
    let raw = raw.trim();
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Some(Message::SetConfig {
        key: key.to_string(),
        value,
    })
}

/// Read commands from stdin until EOF or `quit`, then request quit (blocking, own thread)
fn spawn_stdin_reader_blocking(msg_tx: mpsc::Sender<Message>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Some(msg) => {
                if msg == Message::Quit || msg_tx.blocking_send(msg).is_err() {
                    break;
                }
            }
            None => {
                warn!("Unknown stdin command: {}", line.trim());
                HeadlessEvent::error(format!("unknown command: {}", line.trim()), false).emit();
            }
        }
    }

    // EOF ends the session as well
    let _ = msg_tx.blocking_send(Message::Quit);
    info!("Stdin reader exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("discover"), Some(Message::Discover));
        assert_eq!(parse_command("  back  "), Some(Message::Back));
        assert_eq!(parse_command("q"), Some(Message::Quit));
        assert_eq!(parse_command("cli"), Some(Message::ToggleCli));
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(
            parse_command("open a1b2"),
            Some(Message::OpenDevice { id: "a1b2".into() })
        );
        assert_eq!(
            parse_command("cli  ls /data "),
            Some(Message::SendCli {
                text: "ls /data".into()
            })
        );
    }

    #[test]
    fn test_missing_or_extra_arguments_are_rejected() {
        assert_eq!(parse_command("open"), None);
        assert_eq!(parse_command("discover now"), None);
        assert_eq!(parse_command("set use_ws"), None);
        assert_eq!(parse_command("reload"), None);
    }

    #[test]
    fn test_set_parses_json_or_falls_back_to_string() {
        assert_eq!(
            parse_command("set use_mqtt true"),
            Some(Message::SetConfig {
                key: "use_mqtt".into(),
                value: json!(true),
            })
        );
        assert_eq!(
            parse_command("set mq_host broker.example.org"),
            Some(Message::SetConfig {
                key: "mq_host".into(),
                value: json!("broker.example.org"),
            })
        );
    }
}
