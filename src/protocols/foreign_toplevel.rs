use std::sync::Arc;

use wayland_client::backend::ObjectData;
use wayland_client::protocol::{wl_output::WlOutput, wl_seat::WlSeat};
use wayland_client::{Connection, Dispatch, Proxy, QueueHandle};
use wayland_protocols_wlr::foreign_toplevel::v1::client::{
    zwlr_foreign_toplevel_handle_v1, zwlr_foreign_toplevel_manager_v1,
};

use crate::toplevel::{ToplevelCommand, ToplevelEvent, ToplevelRegistry, ToplevelState};
use crate::{Result, ShellError};

use zwlr_foreign_toplevel_handle_v1::ZwlrForeignToplevelHandleV1;
use zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1;

/// Version 3 adds the `parent` event.
pub const VERSION: u32 = 3;

pub type ForeignToplevelRegistry = ToplevelRegistry<ZwlrForeignToplevelHandleV1, WlOutput>;
pub type ForeignToplevelEvent = ToplevelEvent<ZwlrForeignToplevelHandleV1, WlOutput>;

pub trait ForeignToplevelHandler {
    fn toplevel_registry(&mut self) -> &mut ForeignToplevelRegistry;
    /// The compositor will not send any more toplevels.
    fn manager_finished(&mut self);
}

/// Routes manager and handle events into the registry.
pub struct ForeignToplevelListener;

impl<D> Dispatch<ZwlrForeignToplevelManagerV1, (), D> for ForeignToplevelListener
where
    D: Dispatch<ZwlrForeignToplevelManagerV1, ()>,
    D: Dispatch<ZwlrForeignToplevelHandleV1, ()>,
    D: ForeignToplevelHandler,
    D: 'static,
{
    fn event(
        state: &mut D,
        _proxy: &ZwlrForeignToplevelManagerV1,
        event: zwlr_foreign_toplevel_manager_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<D>,
    ) {
        match event {
            zwlr_foreign_toplevel_manager_v1::Event::Toplevel { toplevel } => {
                state
                    .toplevel_registry()
                    .dispatch(ToplevelEvent::New(toplevel));
            }
            zwlr_foreign_toplevel_manager_v1::Event::Finished => state.manager_finished(),
            _ => {}
        }
    }

    fn event_created_child(opcode: u16, qhandle: &QueueHandle<D>) -> Arc<dyn ObjectData> {
        match opcode {
            zwlr_foreign_toplevel_manager_v1::EVT_TOPLEVEL_OPCODE => {
                qhandle.make_data::<ZwlrForeignToplevelHandleV1, _>(())
            }
            _ => panic!("zwlr_foreign_toplevel_manager_v1 has no child-creating opcode {opcode}"),
        }
    }
}

impl<D> Dispatch<ZwlrForeignToplevelHandleV1, (), D> for ForeignToplevelListener
where
    D: Dispatch<ZwlrForeignToplevelHandleV1, ()>,
    D: ForeignToplevelHandler,
{
    fn event(
        state: &mut D,
        proxy: &ZwlrForeignToplevelHandleV1,
        event: zwlr_foreign_toplevel_handle_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<D>,
    ) {
        let Some(event) = translate(proxy, event) else {
            return;
        };

        let closed = matches!(event, ToplevelEvent::Closed(_));
        state.toplevel_registry().dispatch(event);

        // The registry is done with the handle; the object is ours to destroy.
        if closed {
            proxy.destroy();
        }
    }
}

fn translate(
    proxy: &ZwlrForeignToplevelHandleV1,
    event: zwlr_foreign_toplevel_handle_v1::Event,
) -> Option<ForeignToplevelEvent> {
    let handle = proxy.clone();
    let event = match event {
        zwlr_foreign_toplevel_handle_v1::Event::Title { title } => {
            ToplevelEvent::Title(handle, title)
        }
        zwlr_foreign_toplevel_handle_v1::Event::AppId { app_id } => {
            ToplevelEvent::AppId(handle, app_id)
        }
        zwlr_foreign_toplevel_handle_v1::Event::OutputEnter { output } => {
            ToplevelEvent::OutputEnter(handle, output)
        }
        zwlr_foreign_toplevel_handle_v1::Event::OutputLeave { output } => {
            ToplevelEvent::OutputLeave(handle, output)
        }
        zwlr_foreign_toplevel_handle_v1::Event::State { state } => {
            ToplevelEvent::State(handle, decode_state(&state))
        }
        zwlr_foreign_toplevel_handle_v1::Event::Parent { parent } => {
            ToplevelEvent::Parent(handle, parent)
        }
        zwlr_foreign_toplevel_handle_v1::Event::Done => ToplevelEvent::Done(handle),
        zwlr_foreign_toplevel_handle_v1::Event::Closed => ToplevelEvent::Closed(handle),
        _ => return None,
    };
    Some(event)
}

/// Decodes the `state` event's array of native-endian u32 values.
pub fn decode_state(raw: &[u8]) -> ToplevelState {
    use zwlr_foreign_toplevel_handle_v1::State;

    if raw.len() % 4 != 0 {
        tracing::warn!(len = raw.len(), "toplevel state array has trailing bytes");
    }

    let mut flags = ToplevelState::empty();
    for chunk in raw.chunks_exact(4) {
        let Ok(bytes) = <[u8; 4]>::try_from(chunk) else {
            continue;
        };
        let value = u32::from_ne_bytes(bytes);
        match State::try_from(value) {
            Ok(State::Activated) => flags |= ToplevelState::ACTIVATED,
            Ok(State::Maximized) => flags |= ToplevelState::MAXIMIZED,
            Ok(State::Minimized) => flags |= ToplevelState::MINIMIZED,
            // Fullscreen and anything newer do not affect the window list.
            Ok(_) => {}
            Err(()) => tracing::trace!(value, "unknown toplevel state value"),
        }
    }
    flags
}

pub fn send_command(
    handle: &ZwlrForeignToplevelHandleV1,
    command: ToplevelCommand,
    seat: Option<&WlSeat>,
) -> Result<()> {
    match command {
        ToplevelCommand::Activate => {
            let seat = seat.ok_or(ShellError::MissingSeat)?;
            handle.activate(seat);
        }
        ToplevelCommand::Close => handle.close(),
        ToplevelCommand::SetMinimized(true) => handle.set_minimized(),
        ToplevelCommand::SetMinimized(false) => handle.unset_minimized(),
        ToplevelCommand::SetMaximized(true) => handle.set_maximized(),
        ToplevelCommand::SetMaximized(false) => handle.unset_maximized(),
    }
    tracing::debug!(handle = ?handle.id(), ?command, "sent toplevel request");
    Ok(())
}

#[macro_export]
macro_rules! delegate_foreign_toplevel {
    ($ty: ty) => {
        wayland_client::delegate_dispatch!($ty: [
            wayland_protocols_wlr::foreign_toplevel::v1::client::zwlr_foreign_toplevel_manager_v1::ZwlrForeignToplevelManagerV1: ()
        ] => $crate::protocols::foreign_toplevel::ForeignToplevelListener);
        wayland_client::delegate_dispatch!($ty: [
            wayland_protocols_wlr::foreign_toplevel::v1::client::zwlr_foreign_toplevel_handle_v1::ZwlrForeignToplevelHandleV1: ()
        ] => $crate::protocols::foreign_toplevel::ForeignToplevelListener);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use zwlr_foreign_toplevel_handle_v1::State;

    fn encode(states: &[u32]) -> Vec<u8> {
        states.iter().flat_map(|value| value.to_ne_bytes()).collect()
    }

    #[test]
    fn decodes_known_states() {
        let raw = encode(&[State::Maximized as u32, State::Activated as u32]);
        assert_eq!(
            decode_state(&raw),
            ToplevelState::MAXIMIZED | ToplevelState::ACTIVATED
        );

        let raw = encode(&[State::Minimized as u32]);
        assert_eq!(decode_state(&raw), ToplevelState::MINIMIZED);
    }

    #[test]
    fn ignores_fullscreen_and_unknown_values() {
        let raw = encode(&[State::Fullscreen as u32, 42, State::Activated as u32]);
        assert_eq!(decode_state(&raw), ToplevelState::ACTIVATED);
    }

    #[test]
    fn empty_array_clears_state() {
        assert!(decode_state(&[]).is_empty());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut raw = encode(&[State::Minimized as u32]);
        raw.push(0xff);
        assert_eq!(decode_state(&raw), ToplevelState::MINIMIZED);
    }
}
