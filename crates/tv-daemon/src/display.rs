//! Headless stand-in for the TV page: renders notices as text on stdout.

use tokio::sync::broadcast;
use tv_proto::protocol::Notice;

pub fn render(notice: &Notice) -> Option<String> {
    match notice {
        Notice::ChannelChanged {
            number,
            description,
            ..
        } => Some(format!("CH {number}  {description}")),
        Notice::StaticShown { .. } => Some("~~~ static ~~~".to_string()),
        Notice::VolumeIndicator { muted, level } => Some(Notice::indicator_text(*muted, *level)),
        Notice::WakeLock { status } => Some(format!("wake lock: {status:?}")),
        Notice::KeepAlive { phase } => Some(format!("keep-alive: {phase:?}")),
        Notice::Log { message } => Some(message.clone()),
        Notice::StaticHidden | Notice::PlaybackIntent { .. } => None,
    }
}

pub fn start_printer(mut notice_rx: broadcast::Receiver<Notice>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notice_rx.recv().await {
                Ok(notice) => {
                    if let Some(line) = render(&notice) {
                        println!("{line}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    println!("({n} notices skipped)");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tv_proto::protocol::WakeLockStatus;

    #[test]
    fn test_render() {
        let line = render(&Notice::ChannelChanged {
            index: 2,
            number: 3,
            description: "yodel".into(),
        });
        assert_eq!(line.as_deref(), Some("CH 3  yodel"));
        assert_eq!(
            render(&Notice::VolumeIndicator {
                muted: true,
                level: 10
            })
            .as_deref(),
            Some("MUTE")
        );
        assert_eq!(
            render(&Notice::WakeLock {
                status: WakeLockStatus::Held
            })
            .as_deref(),
            Some("wake lock: Held")
        );
        assert_eq!(render(&Notice::StaticHidden), None);
    }
}
