//! rootlessd
//!
//! Runs the rootless core against the in-memory headless host: a server
//! thread owning the screen, a native event thread feeding the event queue,
//! and tokio supervising both until a termination signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rootless::config::Config;
use rootless::events::{BridgeRegistries, EventPoster, EventQueue, FakeButtons, InputDispatcher, MessageKind, NativeEventBridge};
use rootless::native::headless::{ChannelEventSource, HeadlessHost};
use rootless::protocol::{DrawableTree, FbWindowOps};
use rootless::rootless::{MonotonicClock, RootlessScreen, ScreenOptions};
use rootless::server::{Server, TraceSink};

/// Build the screen and run the server loop on the current thread
fn run_server(config: Config, queue: Arc<EventQueue>, poster: EventPoster) -> Result<()> {
    let host = Arc::new(HeadlessHost::new());
    let options = ScreenOptions::from_config(&config);
    let origin = options.origin;
    let tree = DrawableTree::new(config.screen.width, config.screen.height, config.screen.depth);
    let screen = RootlessScreen::new(
        host,
        Box::new(FbWindowOps::new()),
        tree,
        options,
        Arc::new(MonotonicClock::new()),
    );

    // The headless host never emits notifications; keep the sender alive
    // so the bridge thread idles instead of seeing a closed channel
    let (_host_events, source) = ChannelEventSource::new();
    let registries = BridgeRegistries {
        windows: screen.window_registry().clone(),
        surfaces: screen.surface_registry().clone(),
    };
    let bridge = NativeEventBridge::start(source, poster, registries)
        .context("Failed to start native event bridge")?;

    let dispatcher = InputDispatcher::new(FakeButtons::from_config(&config.input), origin);
    let mut server = Server::new(screen, queue, dispatcher, Box::new(TraceSink))
        .context("Failed to create server")?;

    if config.screen.rooted && !server.screen_mut().enable_root() {
        error!("Failed to frame the root window, continuing rootless");
    }

    let result = server.run();
    bridge.shutdown();
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "rootless=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rootless daemon");

    let config = Config::load()
        .context("Failed to load configuration")?;

    let queue = Arc::new(
        EventQueue::new(config.event_queue.capacity, config.event_queue.coalesce_motion)
            .context("Failed to create event queue")?,
    );
    let poster = EventPoster::new(queue.clone());

    // Handle SIGTERM and SIGINT by asking the server loop to quit
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let quit = poster.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            quit.post_message(MessageKind::Quit, &[]);
        });
    }

    let server = tokio::task::spawn_blocking(move || run_server(config, queue, poster));

    match server.await.context("Server task panicked")? {
        Ok(()) => info!("Server stopped"),
        Err(e) => {
            error!("Server error: {:#}", e);
            return Err(e);
        }
    }

    Ok(())
}
