use wayland_client::{
    Connection, Dispatch, Proxy, QueueHandle,
    globals::GlobalListContents,
    protocol::{
        wl_output::{self, WlOutput},
        wl_registry::{self, WlRegistry},
        wl_seat::{self, WlSeat},
    },
};

use crate::{
    Shell, delegate_foreign_toplevel,
    protocols::foreign_toplevel::{ForeignToplevelHandler, ForeignToplevelRegistry},
};

impl Dispatch<WlRegistry, GlobalListContents> for Shell {
    fn event(
        state: &mut Self,
        _registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                if interface == WlOutput::interface().name {
                    state.add_output(name, version);
                } else if interface == WlSeat::interface().name && state.seat.is_none() {
                    state.seat = Some(state.wl_registry.bind::<WlSeat, _, Self>(
                        name,
                        1,
                        &state.queue_handle,
                        (),
                    ));
                    tracing::info!("wl_seat bound late; activation enabled");
                }
            }
            wl_registry::Event::GlobalRemove { name } => state.remove_output(name),
            _ => {}
        }
    }
}

impl Dispatch<WlOutput, ()> for Shell {
    fn event(
        state: &mut Self,
        output: &WlOutput,
        event: wl_output::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match event {
            wl_output::Event::Name { name } => {
                if let Some(info) = state.output_info_mut(output) {
                    info.name = Some(name);
                }
            }
            wl_output::Event::Done => {
                let Some(info) = state.output_info_mut(output) else {
                    return;
                };
                if info.ready {
                    return;
                }
                info.ready = true;
                tracing::info!(name = ?info.name, version = output.version(), "output ready");
                state.select_output();
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSeat, ()> for Shell {
    fn event(
        _state: &mut Self,
        _seat: &WlSeat,
        _event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}

impl ForeignToplevelHandler for Shell {
    fn toplevel_registry(&mut self) -> &mut ForeignToplevelRegistry {
        &mut self.registry
    }

    fn manager_finished(&mut self) {
        tracing::warn!("compositor stopped sending toplevels; window list is frozen");
        self.toplevel_manager = None;
    }
}

delegate_foreign_toplevel!(Shell);
