//! Line-oriented keyboard input on stdin.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tv_core::event::TvEvent;
use tv_proto::protocol::Command;

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(Command),
    Quit,
}

/// One key name (`ArrowUp`, `m`, ...) or a short alias per line.
pub fn parse_line(line: &str, volume_step: i32) -> Option<Input> {
    let line = line.trim();
    if let Some(cmd) = Command::from_key(line, volume_step) {
        return Some(Input::Command(cmd));
    }

    let alias = match line.to_ascii_lowercase().as_str() {
        "up" => "ArrowUp",
        "down" => "ArrowDown",
        "right" | "+" => "ArrowRight",
        "left" | "-" => "ArrowLeft",
        "mute" => "m",
        "hide" => return Some(Input::Command(Command::Visibility { hidden: true })),
        "show" => return Some(Input::Command(Command::Visibility { hidden: false })),
        "focus" => return Some(Input::Command(Command::Focus)),
        "quit" | "q" | "exit" => return Some(Input::Quit),
        other => {
            let level = other.strip_prefix("vol ")?.trim().parse::<u8>().ok()?;
            return Some(Input::Command(Command::SetVolume { level }));
        }
    };
    Command::from_key(alias, volume_step).map(Input::Command)
}

pub fn start_reader(
    event_tx: mpsc::Sender<TvEvent>,
    volume_step: i32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("stdin closed, keyboard input stopped");
                    break;
                }
                Err(e) => {
                    warn!("stdin read error: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let evt = match parse_line(&line, volume_step) {
                Some(Input::Command(cmd)) => TvEvent::Command(cmd),
                Some(Input::Quit) => {
                    info!("quit requested from keyboard");
                    TvEvent::Shutdown
                }
                None => {
                    warn!("unknown key {:?}", line.trim());
                    continue;
                }
            };
            let quit = evt == TvEvent::Shutdown;
            if event_tx.send(evt).await.is_err() || quit {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tv_proto::playlist::Direction;

    #[test]
    fn test_key_names_and_aliases() {
        assert_eq!(
            parse_line("ArrowDown", 5),
            Some(Input::Command(Command::ChangeChannel {
                direction: Direction::Down
            }))
        );
        assert_eq!(
            parse_line(" up ", 5),
            Some(Input::Command(Command::ChangeChannel {
                direction: Direction::Up
            }))
        );
        assert_eq!(
            parse_line("-", 5),
            Some(Input::Command(Command::AdjustVolume { delta: -5 }))
        );
        assert_eq!(parse_line("MUTE", 5), Some(Input::Command(Command::ToggleMute)));
        assert_eq!(parse_line("quit", 5), Some(Input::Quit));
    }

    #[test]
    fn test_absolute_volume() {
        assert_eq!(
            parse_line("vol 30", 5),
            Some(Input::Command(Command::SetVolume { level: 30 }))
        );
        assert_eq!(parse_line("vol loud", 5), None);
        assert_eq!(parse_line("vol 300", 5), None);
        assert_eq!(parse_line("xyzzy", 5), None);
    }

    #[test]
    fn test_page_lifecycle() {
        assert_eq!(
            parse_line("hide", 5),
            Some(Input::Command(Command::Visibility { hidden: true }))
        );
        assert_eq!(parse_line("focus", 5), Some(Input::Command(Command::Focus)));
    }
}
