use std::{
    fmt::Debug,
    hash::Hash,
    io::{BufRead, BufReader, ErrorKind, Read},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    time::Duration,
};

use calloop::{Interest, LoopHandle, Mode, PostAction, generic::Generic};

use crate::{
    Result, ShellError,
    action::Action,
    state::Shell,
    toplevel::{ToplevelRegistry, ToplevelState},
};

pub const SUPPORTED_COMMANDS: &str =
    "windows, click N, middle-click N, minimize N, maximize N, close N, reload";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpcRequest {
    Windows,
    Reload,
    /// `index` is zero-based; the wire form counts from 1.
    Act { action: Action, index: usize },
}

impl IpcRequest {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let mut words = raw.split_whitespace();
        let Some(command) = words.next() else {
            return Err(format!("empty command (supported: {SUPPORTED_COMMANDS})"));
        };

        let action = match command {
            "windows" => return Self::without_argument(Self::Windows, command, words.next()),
            "reload" => return Self::without_argument(Self::Reload, command, words.next()),
            "click" => Action::Click,
            "middle-click" => Action::MiddleClick,
            "minimize" => Action::ToggleMinimize,
            "maximize" => Action::ToggleMaximize,
            "close" => Action::Close,
            other => {
                return Err(format!(
                    "unsupported command `{other}` (supported: {SUPPORTED_COMMANDS})"
                ));
            }
        };

        let Some(raw_index) = words.next() else {
            return Err(format!("`{command}` needs a window number"));
        };
        if words.next().is_some() {
            return Err(format!("`{command}` takes exactly one argument"));
        }
        let index = raw_index
            .parse::<usize>()
            .ok()
            .and_then(|number| number.checked_sub(1))
            .ok_or_else(|| format!("invalid window number `{raw_index}` (counting starts at 1)"))?;

        Ok(Self::Act { action, index })
    }

    fn without_argument(
        request: Self,
        command: &str,
        extra: Option<&str>,
    ) -> std::result::Result<Self, String> {
        match extra {
            None => Ok(request),
            Some(_) => Err(format!("`{command}` takes no arguments")),
        }
    }
}

/// How long a connected client may take to send its request line or to
/// accept the response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(250);
const MAX_REQUEST_LEN: u64 = 4096;

/// Reads one request line from an accepted connection.
///
/// Accepted streams are blocking, so both directions get a timeout; a client
/// that never finishes its line cannot stall the event loop.
pub fn read_request(stream: &UnixStream) -> Result<String> {
    stream
        .set_read_timeout(Some(REQUEST_TIMEOUT))
        .and_then(|()| stream.set_write_timeout(Some(REQUEST_TIMEOUT)))
        .map_err(|err| ShellError::Ipc(format!("failed to set socket timeouts: {err}")))?;

    let mut reader = BufReader::new(Read::take(stream, MAX_REQUEST_LEN));
    let mut request = String::new();
    match reader.read_line(&mut request) {
        Ok(_) => Ok(request),
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            Err(ShellError::Ipc("request timed out".to_owned()))
        }
        Err(err) => Err(ShellError::Ipc(format!("failed to read request: {err}"))),
    }
}

pub fn render_window_list<H, O>(registry: &ToplevelRegistry<H, O>) -> String
where
    H: Clone + Eq + Hash + Debug,
    O: Clone + Eq + Hash + Debug,
{
    let mut out = String::new();
    for (index, (_, record)) in registry.window_list().enumerate() {
        let title = if record.title().is_empty() {
            "<untitled>"
        } else {
            record.title()
        };
        let app_id = if record.app_id().is_empty() {
            "<unknown>"
        } else {
            record.app_id()
        };

        out.push_str(&format!("Window {}:\n", index + 1));
        out.push_str(&format!("  title: {title}\n"));
        out.push_str(&format!("  app_id: {app_id}\n"));
        out.push_str(&format!("  state: {}\n", describe_state(record.state())));
        out.push_str(&format!("  children: {}\n", record.children().len()));
        out.push('\n');
    }

    if out.is_empty() {
        return "No windows.\n".to_owned();
    }
    out
}

fn describe_state(state: ToplevelState) -> String {
    let names: Vec<&str> = state
        .iter_names()
        .map(|(name, _)| match name {
            "ACTIVATED" => "activated",
            "MAXIMIZED" => "maximized",
            "MINIMIZED" => "minimized",
            other => other,
        })
        .collect();

    if names.is_empty() {
        "normal".to_owned()
    } else {
        names.join(", ")
    }
}

pub fn socket_path_in(runtime_dir: &Path, wayland_display: &str) -> PathBuf {
    runtime_dir.join(format!("raven-shell-{wayland_display}.sock"))
}

pub fn socket_path_from_env() -> Result<PathBuf> {
    let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
        .ok_or_else(|| ShellError::Ipc("XDG_RUNTIME_DIR is not set".to_owned()))?;
    let wayland_display = std::env::var("WAYLAND_DISPLAY")
        .ok()
        .filter(|display| !display.trim().is_empty())
        .unwrap_or_else(|| "wayland-0".to_owned());
    Ok(socket_path_in(Path::new(&runtime_dir), wayland_display.trim()))
}

/// The bound IPC socket file; removed again when dropped.
#[derive(Debug)]
pub struct IpcSocket {
    path: PathBuf,
}

impl IpcSocket {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IpcSocket {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), "failed to remove ipc socket: {err}");
        }
    }
}

pub fn init_listener(loop_handle: &LoopHandle<'static, Shell>) -> Result<IpcSocket> {
    let path = socket_path_from_env()?;

    if path.exists()
        && let Err(err) = std::fs::remove_file(&path)
    {
        return Err(ShellError::Ipc(format!(
            "failed to remove stale ipc socket {}: {err}",
            path.display()
        )));
    }

    let listener = UnixListener::bind(&path).map_err(|err| {
        ShellError::Ipc(format!("failed to bind ipc socket {}: {err}", path.display()))
    })?;
    listener.set_nonblocking(true).map_err(|err| {
        ShellError::Ipc(format!(
            "failed to set ipc socket nonblocking {}: {err}",
            path.display()
        ))
    })?;

    loop_handle
        .insert_source(
            Generic::new(listener, Interest::READ, Mode::Level),
            move |_, listener, state| {
                loop {
                    match listener.accept() {
                        Ok((stream, _)) => state.handle_ipc_stream(stream),
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                        Err(err) => {
                            tracing::warn!("ipc accept failed: {err}");
                            break;
                        }
                    }
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|err| ShellError::EventLoop(format!("failed to init ipc listener: {err}")))?;

    Ok(IpcSocket { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toplevel::OrphanPolicy;
    use std::{io::Write, time::Instant};

    #[test]
    fn parses_commands() {
        assert_eq!(IpcRequest::parse("windows"), Ok(IpcRequest::Windows));
        assert_eq!(IpcRequest::parse(" reload \n"), Ok(IpcRequest::Reload));
        assert_eq!(
            IpcRequest::parse("click 1"),
            Ok(IpcRequest::Act {
                action: Action::Click,
                index: 0
            })
        );
        assert_eq!(
            IpcRequest::parse("middle-click 3"),
            Ok(IpcRequest::Act {
                action: Action::MiddleClick,
                index: 2
            })
        );
        assert_eq!(
            IpcRequest::parse("maximize 2"),
            Ok(IpcRequest::Act {
                action: Action::ToggleMaximize,
                index: 1
            })
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(IpcRequest::parse("").is_err());
        assert!(IpcRequest::parse("windows 1").is_err());
        assert!(IpcRequest::parse("click").is_err());
        assert!(IpcRequest::parse("click 0").is_err());
        assert!(IpcRequest::parse("click two").is_err());
        assert!(IpcRequest::parse("close 1 2").is_err());
        assert!(IpcRequest::parse("dance").unwrap_err().contains("unsupported"));
    }

    #[test]
    fn renders_attached_windows_only() {
        let mut registry = ToplevelRegistry::<u32, u32>::new(Some(1), OrphanPolicy::Detach);
        assert_eq!(render_window_list(&registry), "No windows.\n");

        registry.on_new_handle(1).unwrap();
        registry.on_title(&1, "Editor".to_owned());
        registry.on_app_id(&1, "org.example.Editor".to_owned());
        registry.on_state(&1, ToplevelState::ACTIVATED | ToplevelState::MAXIMIZED);
        registry.on_output_enter(&1, 1);

        registry.on_new_handle(2).unwrap();
        registry.on_output_enter(&2, 1);
        registry.on_parent_changed(&2, Some(1));

        registry.on_new_handle(3).unwrap();
        registry.on_output_enter(&3, 2);

        let report = render_window_list(&registry);
        assert!(report.starts_with("Window 1:\n  title: Editor\n"));
        assert!(report.contains("  app_id: org.example.Editor\n"));
        assert!(report.contains("  state: activated, maximized\n"));
        assert!(report.contains("  children: 1\n"));
        assert!(!report.contains("Window 2:"));
    }

    #[test]
    fn request_line_is_read_without_waiting_for_eof() {
        let (mut client, server) = UnixStream::pair().unwrap();
        client.write_all(b"windows\n").unwrap();

        let started = Instant::now();
        let request = read_request(&server).unwrap();
        assert_eq!(request, "windows\n");
        assert!(started.elapsed() < REQUEST_TIMEOUT);
        assert_eq!(IpcRequest::parse(&request), Ok(IpcRequest::Windows));
    }

    #[test]
    fn request_without_newline_ends_at_eof() {
        let (mut client, server) = UnixStream::pair().unwrap();
        client.write_all(b"click 2").unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();

        assert_eq!(read_request(&server).unwrap(), "click 2");
    }

    #[test]
    fn silent_client_times_out() {
        let (_client, server) = UnixStream::pair().unwrap();

        let started = Instant::now();
        let err = read_request(&server).unwrap_err();
        assert!(err.to_string().contains("request timed out"));
        assert!(started.elapsed() < REQUEST_TIMEOUT * 8);
    }

    #[test]
    fn socket_path_includes_display() {
        let path = socket_path_in(Path::new("/run/user/1000"), "wayland-1");
        assert_eq!(path, PathBuf::from("/run/user/1000/raven-shell-wayland-1.sock"));
    }
}
