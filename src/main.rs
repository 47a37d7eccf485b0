//! treeland - Wayland compositor control plane
//!
//! Entry point for the treeland server. Options:
//! - **--config PATH**: settings file, also taken from `TREELAND_CONFIG`
//! - **--state PATH**: persisted output intent
//!
//! The server runs until a client or shortcut asks it to quit, or until it
//! receives Ctrl-C.

use std::path::PathBuf;
use std::time::Duration;

use smithay::reexports::calloop::{channel, EventLoop};
use smithay::reexports::wayland_server::Display;
use treeland::config::{Config, OutputConfigState};
use treeland::Server;

#[cfg(feature = "profile-with-tracy-mem")]
#[global_allocator]
static GLOBAL: profiling::tracy_client::ProfiledAllocator<std::alloc::System> =
    profiling::tracy_client::ProfiledAllocator::new(std::alloc::System, 10);

/// Loop timeout, so idle work runs at least once per frame at 60Hz
const IDLE_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    state: Option<PathBuf>,
}

fn parse_args() -> Options {
    let mut options = Options {
        config: std::env::var_os("TREELAND_CONFIG").map(PathBuf::from),
        state: None,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => options.config = args.next().map(PathBuf::from),
            "--state" => options.state = args.next().map(PathBuf::from),
            other => tracing::warn!("Ignoring unknown argument {other}"),
        }
    }
    options
}

fn main() {
    if let Ok(env_filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().compact().init();
    }

    #[cfg(feature = "profile-with-tracy")]
    profiling::tracy_client::Client::start();

    profiling::register_thread!("Main Thread");

    #[cfg(feature = "profile-with-puffin")]
    let _server = match puffin_http::Server::new(&format!("0.0.0.0:{}", puffin_http::DEFAULT_PORT)) {
        Ok(server) => {
            profiling::puffin::set_scopes_on(true);
            Some(server)
        }
        Err(e) => {
            tracing::error!("Failed to start puffin profiling server: {e}");
            None
        }
    };

    let options = parse_args();
    let config = match options.config {
        Some(path) => match Config::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load config {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    let output_state = match options.state {
        Some(path) => OutputConfigState::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring output state {}: {e}", path.display());
            OutputConfigState::new()
        }),
        None => OutputConfigState::new(),
    };

    let mut event_loop: EventLoop<'static, Server> = match EventLoop::try_new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            tracing::error!("Failed to create event loop: {e}");
            std::process::exit(1);
        }
    };
    let display = match Display::new() {
        Ok(display) => display,
        Err(e) => {
            tracing::error!("Failed to create display: {e}");
            std::process::exit(1);
        }
    };
    let mut display_handle = display.handle();

    tracing::info!("Starting treeland");
    let mut server = match Server::init(display, &event_loop.handle(), config, output_state) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = watch_ctrl_c(&event_loop) {
        tracing::warn!("Ctrl-C will not stop the server: {e}");
    }

    while server.is_running() {
        let result = event_loop.dispatch(Some(IDLE_INTERVAL), &mut server);
        if let Err(e) = result {
            tracing::error!("Event loop failed: {e}");
            server.request_quit();
        } else {
            server.dispatch_idle();
            if let Err(e) = display_handle.flush_clients() {
                tracing::warn!("Failed to flush clients: {e}");
            }
        }
        profiling::finish_frame!();
    }
    server.shutdown();
    if let Err(e) = display_handle.flush_clients() {
        tracing::debug!("Final flush failed: {e}");
    }
}

/// Forward Ctrl-C from a signal thread into the loop
fn watch_ctrl_c(event_loop: &EventLoop<'static, Server>) -> std::io::Result<()> {
    let (sender, channel) = channel::channel::<()>();
    event_loop
        .handle()
        .insert_source(channel, |event, _, server| {
            if let channel::Event::Msg(()) = event {
                tracing::info!("Interrupted");
                server.request_quit();
            }
        })
        .map_err(|e| std::io::Error::other(e.error.to_string()))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                let _ = sender.send(());
            }
        })?;
    Ok(())
}
