mod display;
mod http;
mod input;

use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tv_core::core::TvCore;
use tv_core::event::TvEvent;
use tv_core::runtime::{self, TokioScheduler};
use tv_core::sim::SimBrowser;
use tv_proto::config::Config;
use tv_proto::platform::PlatformCapabilities;
use tv_proto::protocol::Notice;
use tv_proto::state::StateManager;

/// Tracing layer that turns warnings and errors into `Notice::Log` lines
/// tagged with the module that raised them.
struct NoticeLogLayer {
    notice_tx: broadcast::Sender<Notice>,
}

impl<S> tracing_subscriber::Layer<S> for NoticeLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let meta = event.metadata();
        if *meta.level() > tracing::Level::WARN {
            return;
        }

        let mut fields = LogFields::default();
        event.record(&mut fields);
        let message = format_log_line(
            &chrono::Local::now().format("%H:%M:%S").to_string(),
            meta.level(),
            meta.target(),
            &fields,
        );
        let _ = self.notice_tx.send(Notice::Log { message });
    }
}

#[derive(Default)]
struct LogFields {
    message: String,
    extra: Vec<String>,
}

impl tracing::field::Visit for LogFields {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.extra.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.extra.push(format!("{}={:?}", field.name(), value));
        }
    }
}

/// `12:00:00 WARN keep_alive: message k=v`, with the crate prefix dropped.
fn format_log_line(time: &str, level: &tracing::Level, target: &str, fields: &LogFields) -> String {
    let component = target.rsplit("::").next().unwrap_or(target);
    let mut line = format!("{} {} {}: {}", time, level, component, fields.message);
    for kv in &fields.extra {
        line.push(' ');
        line.push_str(kv);
    }
    line
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (notice_tx, notice_rx) = broadcast::channel::<Notice>(100);

    let data_dir = tv_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("tvd.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(NoticeLogLayer {
            notice_tx: notice_tx.clone(),
        })
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tv_core=debug,tv_daemon=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let caps = PlatformCapabilities::detect(&config.platform.identity(), &config.keep_alive);
    let playlist = tv_proto::playlist::load_channels(&config.playlist)?;
    info!("{} channels loaded", playlist.len());

    // Every input funnels into the single TvCore loop
    let (event_tx, event_rx) = mpsc::channel::<TvEvent>(256);

    let browser = SimBrowser::new(&caps);
    let host = browser.host(Box::new(TokioScheduler::new(event_tx.clone())));
    let core = TvCore::from_config(&config, playlist, caps, host);
    let state_manager = StateManager::new();

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_manager.clone(),
            event_tx.clone(),
        );
    }

    let _printer = display::start_printer(notice_rx);
    let _reader = input::start_reader(event_tx.clone(), config.playback.volume_step);
    drop(event_tx);

    // The simulated browser is single-threaded, so the loop runs on this task.
    runtime::run(core, browser, event_rx, state_manager, notice_tx).await?;

    info!("tvd stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_reach_notice_channel_with_component() {
        let (tx, mut rx) = broadcast::channel(8);
        let subscriber = tracing_subscriber::registry().with(NoticeLogLayer { notice_tx: tx });

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "tv_core::channel", "loading CH 2");
            tracing::warn!(target: "tv_core::keep_alive", session = 3, "wake lock lost");
        });

        let Ok(Notice::Log { message }) = rx.try_recv() else {
            panic!("expected one log notice");
        };
        assert!(message.ends_with("WARN keep_alive: wake lock lost session=3"), "{message}");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_log_line_without_module_path() {
        let fields = LogFields {
            message: "bind failed".into(),
            extra: Vec::new(),
        };
        assert_eq!(
            format_log_line("09:30:00", &tracing::Level::ERROR, "tvd", &fields),
            "09:30:00 ERROR tvd: bind failed"
        );
    }
}
