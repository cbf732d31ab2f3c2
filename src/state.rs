use std::{
    io::Write,
    os::unix::net::UnixStream,
    path::PathBuf,
};

use calloop::{LoopHandle, LoopSignal};
use wayland_client::{
    Connection, Proxy, QueueHandle,
    globals::GlobalList,
    protocol::{wl_output::WlOutput, wl_registry::WlRegistry, wl_seat::WlSeat},
};
use wayland_protocols_wlr::foreign_toplevel::v1::client::zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1;

use crate::{
    Result, ShellError,
    action::Action,
    config::{self, LoadedConfig, RuntimeConfig},
    ipc::{self, IpcRequest, IpcSocket},
    protocols::foreign_toplevel::{self, ForeignToplevelRegistry},
    toplevel::{BindingChange, ToplevelCommand, ToplevelRegistry},
};

/// Highest wl_output version we bind; v4 adds the `name` event.
pub const WL_OUTPUT_VERSION: u32 = 4;

#[derive(Debug)]
pub struct OutputInfo {
    pub global_name: u32,
    pub output: WlOutput,
    pub name: Option<String>,
    /// The first `done` arrived, so `name` is as complete as it will get.
    pub ready: bool,
}

pub struct Shell {
    pub connection: Connection,
    pub queue_handle: QueueHandle<Shell>,
    pub loop_signal: LoopSignal,
    pub wl_registry: WlRegistry,

    pub config: RuntimeConfig,
    pub config_path: PathBuf,

    pub registry: ForeignToplevelRegistry,
    pub outputs: Vec<OutputInfo>,
    pub seat: Option<WlSeat>,
    pub toplevel_manager: Option<ZwlrForeignToplevelManagerV1>,

    ipc_socket: Option<IpcSocket>,
}

impl Shell {
    pub fn new(
        connection: Connection,
        globals: &GlobalList,
        queue_handle: &QueueHandle<Shell>,
        loop_handle: LoopHandle<'static, Shell>,
        loop_signal: LoopSignal,
        loaded_config: LoadedConfig,
    ) -> Result<Self> {
        let toplevel_manager = globals
            .bind::<ZwlrForeignToplevelManagerV1, _, _>(
                queue_handle,
                1..=foreign_toplevel::VERSION,
                (),
            )
            .map_err(|err| {
                ShellError::Global(format!("zwlr_foreign_toplevel_manager_v1: {err}"))
            })?;
        if toplevel_manager.version() < 3 {
            tracing::warn!(
                version = toplevel_manager.version(),
                "compositor does not report toplevel parents; dialogs show as separate entries"
            );
        }

        let seat = match globals.bind::<WlSeat, _, _>(queue_handle, 1..=1, ()) {
            Ok(seat) => Some(seat),
            Err(err) => {
                tracing::warn!("no wl_seat available; activating windows is disabled: {err}");
                None
            }
        };

        let wl_registry = globals.registry().clone();
        let mut outputs = Vec::new();
        globals.contents().with_list(|list| {
            for global in list {
                if global.interface == WlOutput::interface().name {
                    outputs.push(bind_output(
                        &wl_registry,
                        queue_handle,
                        global.name,
                        global.version,
                    ));
                }
            }
        });

        let ipc_socket = if loaded_config.config.ipc.enabled {
            match ipc::init_listener(&loop_handle) {
                Ok(socket) => {
                    tracing::info!(path = %socket.path().display(), "ipc listener initialized");
                    Some(socket)
                }
                Err(err) => {
                    tracing::warn!("failed to initialize ipc listener: {err}");
                    None
                }
            }
        } else {
            None
        };

        let registry = ToplevelRegistry::new(None, loaded_config.config.window_list.orphan_policy);

        let mut state = Self {
            connection,
            queue_handle: queue_handle.clone(),
            loop_signal,
            wl_registry,

            config: loaded_config.config,
            config_path: loaded_config.path,

            registry,
            outputs,
            seat,
            toplevel_manager: Some(toplevel_manager),

            ipc_socket,
        };
        state.select_output();

        Ok(state)
    }

    /// Runs once per event-loop iteration, after all pending events were
    /// dispatched.
    pub fn refresh(&mut self) {
        for change in self.registry.drain_changes() {
            match change {
                BindingChange::Attached { handle, position } => {
                    let title = self
                        .registry
                        .get(&handle)
                        .map(|record| record.display_name().to_owned())
                        .unwrap_or_default();
                    tracing::info!(handle = ?handle.id(), position, %title, "window list entry attached");
                }
                BindingChange::Detached(handle) => {
                    tracing::info!(handle = ?handle.id(), "window list entry detached");
                }
            }
        }

        if let Err(err) = self.connection.flush() {
            tracing::warn!("failed to flush wayland connection: {err}");
        }
    }

    pub fn add_output(&mut self, global_name: u32, version: u32) {
        let info = bind_output(&self.wl_registry, &self.queue_handle, global_name, version);
        tracing::debug!(global_name, version, "output announced");
        let ready = info.ready;
        self.outputs.push(info);
        if ready {
            self.select_output();
        }
    }

    pub fn remove_output(&mut self, global_name: u32) {
        let Some(index) = self
            .outputs
            .iter()
            .position(|info| info.global_name == global_name)
        else {
            return;
        };

        let info = self.outputs.remove(index);
        tracing::info!(name = ?info.name, "output removed");
        self.registry.forget_output(&info.output);
        if info.output.version() >= 3 {
            info.output.release();
        }
        self.select_output();
    }

    pub fn output_info_mut(&mut self, output: &WlOutput) -> Option<&mut OutputInfo> {
        self.outputs.iter_mut().find(|info| &info.output == output)
    }

    /// Binds the window list to the configured output, or the first ready
    /// one when none is configured.
    pub fn select_output(&mut self) {
        let wanted = self
            .outputs
            .iter()
            .filter(|info| info.ready)
            .find(|info| match &info.name {
                Some(name) => self.config.wants_output(name),
                None => self.config.output.is_none(),
            })
            .map(|info| info.output.clone());

        if wanted.is_none()
            && self.outputs.iter().all(|info| info.ready)
            && let Some(name) = &self.config.output
        {
            tracing::warn!(output = %name, "configured output not found");
        }

        self.registry.rebind_output(wanted);
    }

    pub fn perform_action(
        &mut self,
        action: Action,
        index: usize,
    ) -> Result<Option<ToplevelCommand>> {
        let Some(handle) = self.registry.window_list_entry(index).cloned() else {
            return Err(ShellError::Ipc(format!("no window at position {}", index + 1)));
        };

        let Some(command) = action.resolve(&self.registry, &handle, &self.config.window_list)
        else {
            return Ok(None);
        };

        foreign_toplevel::send_command(&handle, command, self.seat.as_ref())?;
        Ok(Some(command))
    }

    fn write_ipc_response(stream: &mut UnixStream, message: &str) {
        if let Err(err) = stream.write_all(message.as_bytes()) {
            tracing::warn!("failed to write ipc response: {err}");
        }
    }

    pub fn handle_ipc_stream(&mut self, mut stream: UnixStream) {
        let request = match ipc::read_request(&stream) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!("dropping ipc request: {err}");
                Self::write_ipc_response(&mut stream, &format!("error: {err}\n"));
                return;
            }
        };

        let response = match IpcRequest::parse(&request) {
            Err(err) => format!("error: {err}\n"),
            Ok(IpcRequest::Windows) => ipc::render_window_list(&self.registry),
            Ok(IpcRequest::Reload) => match self.reload_config() {
                Ok(()) => "ok\n".to_owned(),
                Err(err) => format!("error: {err}\n"),
            },
            Ok(IpcRequest::Act { action, index }) => match self.perform_action(action, index) {
                Ok(Some(command)) => format!("ok: {command:?}\n"),
                Ok(None) => "ok: nothing to do\n".to_owned(),
                Err(err) => format!("error: {err}\n"),
            },
        };

        Self::write_ipc_response(&mut stream, &response);
    }

    pub fn reload_config(&mut self) -> Result<()> {
        let config = config::load_from_path(&self.config_path)?;

        if config.ipc.enabled != self.ipc_socket.is_some() {
            tracing::info!("ipc.enabled changed; takes effect after restart");
        }

        if self.registry.orphan_policy() != config.window_list.orphan_policy {
            tracing::info!(policy = ?config.window_list.orphan_policy, "orphan policy changed");
            self.registry
                .set_orphan_policy(config.window_list.orphan_policy);
        }
        self.config = config;
        self.select_output();

        tracing::info!(path = %self.config_path.display(), "reloaded config.lua");
        Ok(())
    }
}

fn bind_output(
    wl_registry: &WlRegistry,
    queue_handle: &QueueHandle<Shell>,
    global_name: u32,
    version: u32,
) -> OutputInfo {
    let version = version.min(WL_OUTPUT_VERSION);
    let output = wl_registry.bind::<WlOutput, _, Shell>(global_name, version, queue_handle, ());
    OutputInfo {
        global_name,
        output,
        name: None,
        // wl_output v1 has no `done` event.
        ready: version < 2,
    }
}
