//! Command-line interface and REPL

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::parse_looper_id;
use crate::model::MonitoredItem;
use crate::session::{ConsumerFactory, Session};

/// A parsed REPL line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Test,
    Loopers,
    Tracks,
    Looper { track: i32, device: i32 },
    Clip { track: i32, scene: i32 },
    Stop(String),
    List,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match (verb.to_lowercase().as_str(), rest.as_slice()) {
            ("test", []) => Command::Test,
            ("loopers", []) => Command::Loopers,
            ("tracks", []) => Command::Tracks,
            ("looper", [id]) => {
                let (track, device) = parse_looper_id(id)
                    .ok_or_else(|| format!("Invalid looper id '{}', expected TRACK-DEVICE", id))?;
                Command::Looper { track, device }
            }
            ("clip", [track, scene]) => Command::Clip {
                track: parse_index(track)?,
                scene: parse_index(scene)?,
            },
            ("stop", [id]) => Command::Stop(id.to_string()),
            ("list", []) => Command::List,
            ("help" | "?", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            (other, _) => return Err(format!("Unknown command or arguments: '{}'. Type 'help'.", other)),
        };
        Ok(Some(command))
    }
}

fn parse_index(word: &str) -> Result<i32, String> {
    word.parse::<i32>()
        .ok()
        .filter(|i| *i >= 0)
        .ok_or_else(|| format!("'{}' is not a valid index", word))
}

fn print_help() {
    println!("\n{}", "Commands:".bold());
    for (usage, what) in [
        ("test", "ping Live"),
        ("loopers", "list every Looper device"),
        ("tracks", "list tracks and the scene count"),
        ("looper T-D", "monitor the looper on track T, device D"),
        ("clip T S", "monitor the clip slot on track T, scene S"),
        ("stop ID", "stop monitoring an item"),
        ("list", "show monitored items"),
        ("quit", "stop everything and exit"),
    ] {
        println!("  {:<12} {}", usage.yellow(), what);
    }
    println!();
}

/// One line from the editor plus the channel that lets it prompt again
type LineRequest = (String, oneshot::Sender<bool>);

/// Blocking editor loop; waits for each line to be handled before prompting
fn spawn_reader(tx: mpsc::Sender<LineRequest>) {
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to start line editor: {}", e);
                return;
            }
        };

        loop {
            let line = match rl.readline("live> ") {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    line
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => "quit".to_string(),
                Err(e) => {
                    eprintln!("Readline error: {}", e);
                    "quit".to_string()
                }
            };

            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.blocking_send((line, ack_tx)).is_err() {
                break;
            }
            match ack_rx.blocking_recv() {
                Ok(true) => continue,
                _ => break,
            }
        }
        debug!("REPL reader exited");
    });
}

pub async fn run_repl(session: &Session, factory: ConsumerFactory<'_>) -> Result<()> {
    println!("{}", "Live Monitor GW - type 'help' for commands".bold().cyan());

    let (tx, mut rx) = mpsc::channel::<LineRequest>(1);
    spawn_reader(tx);

    while let Some((line, ack)) = rx.recv().await {
        let keep_going = match Command::parse(&line) {
            Ok(Some(command)) => execute(session, factory, command).await,
            Ok(None) => true,
            Err(message) => {
                println!("{}", message.red());
                true
            }
        };
        let _ = ack.send(keep_going);
        if !keep_going {
            break;
        }
    }

    Ok(())
}

/// Returns false when the REPL should end
async fn execute(session: &Session, factory: ConsumerFactory<'_>, command: Command) -> bool {
    match command {
        Command::Test => {
            if session.test_connection().await {
                println!("{}", "✅ Live is reachable".green());
            } else {
                println!("{}", "❌ No answer from Live".red());
            }
        }
        Command::Loopers => match session.find_loopers().await {
            Ok(loopers) if loopers.is_empty() => println!("{}", "No Looper devices found".yellow()),
            Ok(loopers) => {
                for looper in loopers {
                    println!("  {:<8} {}", looper.id.yellow(), looper.display_name());
                }
            }
            Err(e) => println!("{} {}", "Discovery failed:".red(), e),
        },
        Command::Tracks => match session.track_list().await {
            Ok(tracks) => {
                for track in tracks {
                    println!("  {:>3}  {} {}", track.index, track.name, format!("#{:06x}", track.color).dimmed());
                }
                println!("  {} scenes", session.num_scenes().await);
            }
            Err(e) => println!("{} {}", "Track listing failed:".red(), e),
        },
        Command::Looper { track, device } => {
            let looper = session.looper_info(track, device).await;
            if session.monitor_loopers(&[looper], factory).await == 0 {
                println!("{}", "Looper not monitored, see log".yellow());
            }
        }
        Command::Clip { track, scene } => {
            let clip = session.clip_info(track, scene).await;
            if session.monitor_clips(&[clip], factory).await == 0 {
                println!("{}", "Clip not monitored, see log".yellow());
            }
        }
        Command::Stop(id) => {
            if !session.stop(&id) {
                println!("{} {}", "Not monitored:".yellow(), id);
            }
        }
        Command::List => {
            let items = session.monitored();
            if items.is_empty() {
                println!("{}", "Nothing monitored".dimmed());
            }
            for item in items {
                let kind = match item {
                    MonitoredItem::Looper(_) => "looper",
                    MonitoredItem::Clip(_) => "clip",
                };
                let idle = session
                    .since_last_update(item.id())
                    .map(|d| format!("changed {}s ago", d.as_secs()))
                    .unwrap_or_default();
                println!(
                    "  {:<10} {:<7} {} {} {}",
                    item.id().yellow(),
                    kind,
                    item.display_name(),
                    format!("#{:06x}", item.track_color()).dimmed(),
                    idle.dimmed()
                );
            }
        }
        Command::Help => print_help(),
        Command::Quit => return false,
    }
    true
}
