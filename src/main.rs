use anyhow::{Context, bail};
use calloop::{
    EventLoop,
    signals::{Signal, Signals},
};
use calloop_wayland_source::WaylandSource;
use raven_shell::{Shell, ShellError, config, ipc};
use std::{
    backtrace::Backtrace,
    fs,
    io::{Read, Write},
    os::unix::net::UnixStream,
    path::PathBuf,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wayland_client::{Connection, globals::registry_queue_init};

const USAGE: &str = "usage: raven-shell [COMMAND...]

Without a command, runs the window list for the current Wayland session.
With a command, sends it to the running instance over ipc.

commands: windows, click N, middle-click N, minimize N, maximize N, close N, reload";

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        println!("{USAGE}");
        return Ok(());
    }
    if !args.is_empty() {
        let output = run_ipc_command(&args.join(" "))?;
        print!("{output}");
        return Ok(());
    }

    init_backtrace_defaults();
    init_logging()?;
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!("panic: {panic_info}\n{backtrace}");
        eprintln!("panic: {panic_info}\n{backtrace}");
    }));

    run()?;
    Ok(())
}

fn run() -> raven_shell::Result<()> {
    let loaded_config = config::load_or_create_default()?;

    let connection =
        Connection::connect_to_env().map_err(|e| ShellError::Connect(e.to_string()))?;
    let (globals, event_queue) =
        registry_queue_init::<Shell>(&connection).map_err(|e| ShellError::Global(e.to_string()))?;
    let queue_handle = event_queue.handle();

    let mut event_loop: EventLoop<Shell> =
        EventLoop::try_new().map_err(|e| ShellError::EventLoop(e.to_string()))?;

    let mut state = Shell::new(
        connection.clone(),
        &globals,
        &queue_handle,
        event_loop.handle(),
        event_loop.get_signal(),
        loaded_config,
    )?;

    WaylandSource::new(connection, event_queue)
        .insert(event_loop.handle())
        .map_err(|err| {
            ShellError::EventLoop(format!("failed to insert wayland source: {}", err.error))
        })?;

    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM])
        .map_err(|err| ShellError::EventLoop(format!("failed to watch signals: {err}")))?;
    event_loop
        .handle()
        .insert_source(signals, |event, _, state| {
            tracing::info!(signal = ?event.signal(), "shutting down");
            state.loop_signal.stop();
        })
        .map_err(|err| ShellError::EventLoop(format!("failed to insert signal source: {err}")))?;

    tracing::info!("window list running");
    event_loop
        .run(None, &mut state, |state| state.refresh())
        .map_err(|e| ShellError::EventLoop(e.to_string()))?;

    Ok(())
}

fn run_ipc_command(command: &str) -> anyhow::Result<String> {
    let socket_path = ipc::socket_path_from_env()?;
    let mut stream = UnixStream::connect(&socket_path).with_context(|| {
        format!(
            "failed to connect to raven-shell ipc socket {} (is raven-shell running?)",
            socket_path.display()
        )
    })?;

    stream
        .write_all(format!("{command}\n").as_bytes())
        .context("failed to send ipc command")?;
    stream
        .shutdown(std::net::Shutdown::Write)
        .context("failed to finalize ipc command write")?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .context("failed to read ipc response")?;

    if response.is_empty() {
        bail!("empty response from raven-shell ipc");
    }
    if let Some(message) = response.strip_prefix("error:") {
        bail!("{}", message.trim());
    }

    Ok(response)
}

fn init_backtrace_defaults() {
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    if std::env::var_os("RUST_LIB_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "0") };
    }
}

const DEFAULT_LOG_FILTER: &str = "raven_shell=debug";

fn log_dir() -> anyhow::Result<PathBuf> {
    if let Some(state_home) = std::env::var_os("XDG_STATE_HOME")
        && !state_home.is_empty()
    {
        return Ok(PathBuf::from(state_home).join("raven-shell"));
    }
    let home = std::env::var_os("HOME").context("neither XDG_STATE_HOME nor HOME is set")?;
    Ok(PathBuf::from(home).join(".local/state/raven-shell"))
}

fn init_logging() -> anyhow::Result<()> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "raven-shell.log");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender),
        )
        .init();

    let log_file = log_dir.join("raven-shell.log");
    tracing::info!(path = %log_file.display(), "logging initialized");

    Ok(())
}
