//! Event Pump (SPEC_FULL.md §4.F): the single blocking-wait dispatcher that owns the X
//! connection's read side and performs every `get_property`/`convert_selection`/
//! `change_property*`/`send_event` call the Receiver/Provider state machines ask for.
//!
//! Grounded on 1Password-arboard's `serve_requests` loop (`platform/linux/x11.rs`) for the
//! overall blocking-wait-then-dispatch shape, and the gpui x11-clipboard reference's
//! `run()`/`process_event` for the XFixes-selection-notify routing and the
//! `change_window_attributes`-on-the-requestor INCR subscription.

use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xfixes::{self, SelectionEventMask};
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, EventMask, Property,
    SelectionNotifyEvent, SELECTION_NOTIFY_EVENT,
};
use x11rb::protocol::Event;
use x11rb::wrapper::ConnectionExt as _;

use crate::error::Result;
use crate::provider::ProviderAction;
use crate::receiver::{PropertyReply as RecvPropertyReply, Receiver, ReceiverAction, ReceiverOutcome};
use crate::shared::Shared;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Reads (and optionally deletes) a property on our own window, shaped for the Receiver's
/// synthetic-reply type.
fn fetch_property(shared: &Shared, property: u32, offset_words: u32, delete: bool) -> Result<RecvPropertyReply> {
    let reply = shared
        .x
        .conn
        .get_property(delete, shared.x.win_id, property, AtomEnum::ANY, offset_words, u32::MAX / 4)?
        .reply()?;
    Ok(RecvPropertyReply {
        property_present: reply.type_ != 0,
        property_type: reply.type_,
        bytes: reply.value,
        bytes_remaining: reply.bytes_after,
    })
}

fn delete_property(shared: &Shared, property: u32) -> Result<()> {
    shared.x.conn.delete_property(shared.x.win_id, property)?;
    shared.x.conn.flush()?;
    Ok(())
}

/// Drives a `ReceiverOutcome` to completion, looping on `FetchProperty`/`DeleteProperty`
/// actions locally (the drain rule is synchronous: read again before acknowledging).
fn drive_receiver(shared: &Shared, recv: &mut Receiver, property: u32, mut outcome: ReceiverOutcome) -> Result<()> {
    loop {
        match outcome {
            ReceiverOutcome::Action(ReceiverAction::DeleteThenConvert { target, time }) => {
                // §4.D steps 1/2: delete the transfer property defensively before asking a
                // new peer to write into it, mirroring the teacher's `read_single`.
                shared.x.conn.delete_property(shared.x.win_id, property)?;
                shared.x.conn.convert_selection(shared.x.win_id, shared.x.atoms.CLIPBOARD, target, property, time)?;
                shared.x.conn.flush()?;
                return Ok(());
            }
            ReceiverOutcome::Action(ReceiverAction::DeleteProperty) => {
                delete_property(shared, property)?;
                return Ok(());
            }
            ReceiverOutcome::Action(ReceiverAction::FetchProperty { offset_words }) => {
                let reply = fetch_property(shared, property, offset_words, true)?;
                outcome = recv.on_drain_chunk(reply)?;
            }
            ReceiverOutcome::Action(ReceiverAction::Nothing) => return Ok(()),
            ReceiverOutcome::Finalized { filename } => {
                let mut history = shared.history.lock();
                if let Err(e) = history.push_if_exists(&filename) {
                    warn!("failed to register captured item {filename}: {e}");
                }
                return Ok(());
            }
            ReceiverOutcome::Aborted => return Ok(()),
        }
    }
}

fn apply_provider_action(shared: &Shared, action: &ProviderAction) -> Result<()> {
    match action {
        ProviderAction::ReplyTargets { requestor, property, atoms } => {
            shared.x.conn.change_property32(
                x11rb::protocol::xproto::PropMode::REPLACE,
                *requestor,
                *property,
                shared.x.atoms.ATOM,
                atoms,
            )?;
        }
        ProviderAction::ReplyTimestamp { requestor, property, time } => {
            shared.x.conn.change_property32(
                x11rb::protocol::xproto::PropMode::REPLACE,
                *requestor,
                *property,
                AtomEnum::INTEGER,
                &[*time],
            )?;
        }
        ProviderAction::ReplyData { requestor, property, format, bytes } => {
            shared.x.conn.change_property8(
                x11rb::protocol::xproto::PropMode::REPLACE,
                *requestor,
                *property,
                *format,
                bytes,
            )?;
        }
        ProviderAction::BeginIncr { requestor, property, total_len, .. } => {
            shared.x.conn.change_window_attributes(
                *requestor,
                &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
            )?;
            shared.x.conn.change_property32(
                x11rb::protocol::xproto::PropMode::REPLACE,
                *requestor,
                *property,
                shared.x.atoms.INCR,
                &[*total_len],
            )?;
        }
        ProviderAction::WriteIncrChunk { requestor, property, format, bytes } => {
            shared.x.conn.change_property8(
                x11rb::protocol::xproto::PropMode::REPLACE,
                *requestor,
                *property,
                *format,
                bytes,
            )?;
        }
        ProviderAction::Reject { .. } => {}
    }
    Ok(())
}

fn notify_requestor(shared: &Shared, requestor: u32, selection: u32, target: u32, property: u32, time: u32) -> Result<()> {
    shared.x.conn.send_event(
        false,
        requestor,
        EventMask::NO_EVENT,
        SelectionNotifyEvent {
            response_type: SELECTION_NOTIFY_EVENT,
            sequence: 0,
            time,
            requestor,
            selection,
            target,
            property,
        },
    )?;
    shared.x.conn.flush()?;
    Ok(())
}

/// Subscribes to ownership-change notifications on CLIPBOARD via XFixes, and enters the
/// blocking dispatch loop. Opens the startup latch once the subscription is active, so the
/// Inject Worker knows the listener window and atoms are ready (§4.G).
pub fn run(shared: Shared) {
    if let Err(e) = run_inner(&shared) {
        error!("event pump terminated: {e}");
    }
    shared.shutdown.store(true, Ordering::Release);
}

fn run_inner(shared: &Shared) -> Result<()> {
    xfixes::query_version(&shared.x.conn, 5, 0)?.reply()?;
    xfixes::select_selection_input(
        &shared.x.conn,
        shared.x.screen_root,
        shared.x.atoms.CLIPBOARD,
        SelectionEventMask::SET_SELECTION_OWNER,
    )?;
    shared.x.conn.flush()?;
    shared.ready.open();

    let mut recv = Receiver::new(shared.history.lock().db_dir().to_path_buf());

    loop {
        if shared.is_shutting_down() {
            return Ok(());
        }

        let event = shared.x.conn.wait_for_event()?;
        match event {
            Event::XfixesSelectionNotify(ev) => {
                if ev.owner == shared.x.win_id {
                    continue;
                }
                debug!("CLIPBOARD ownership changed, owner={}", ev.owner);
                shared.receiver_busy.store(true, Ordering::Release);
                let outcome = recv.on_owner_changed(&shared.x.atoms, ev.selection_timestamp, now_ms());
                drive_receiver(shared, &mut recv, shared.x.atoms.XCLIPD_TRANSFER, outcome)?;
                shared.receiver_busy.store(!recv.is_idle(), Ordering::Release);
            }
            Event::SelectionNotify(ev) => {
                if ev.requestor != shared.x.win_id {
                    continue;
                }
                if recv.is_idle() {
                    continue;
                }
                let reply = if ev.property == 0 {
                    RecvPropertyReply { property_present: false, property_type: 0, bytes: vec![], bytes_remaining: 0 }
                } else {
                    fetch_property(shared, ev.property, 0, false)?
                };

                let outcome = if recv.awaiting_targets() {
                    recv.on_targets_reply(&shared.x.atoms, reply)
                } else {
                    recv.on_data_reply(&shared.x.atoms, reply)?
                };
                drive_receiver(shared, &mut recv, shared.x.atoms.XCLIPD_TRANSFER, outcome)?;
                shared.receiver_busy.store(!recv.is_idle(), Ordering::Release);
            }
            Event::PropertyNotify(ev) => {
                if ev.window == shared.x.win_id && ev.state == Property::NEW_VALUE {
                    let reply = fetch_property(shared, ev.atom, 0, true)?;
                    let outcome = recv.on_property_new_value(now_ms(), reply)?;
                    drive_receiver(shared, &mut recv, ev.atom, outcome)?;
                    shared.receiver_busy.store(!recv.is_idle(), Ordering::Release);
                } else if ev.state == Property::DELETE {
                    let action = {
                        let mut provider = shared.provider.lock();
                        provider.on_property_deleted(ev.window, ev.atom, now_ms())
                    };
                    if let Some(action) = action {
                        apply_provider_action(shared, &action)?;
                        shared.x.conn.flush()?;
                    }
                }
            }
            Event::SelectionRequest(ev) => {
                let action = {
                    let mut provider = shared.provider.lock();
                    provider.on_selection_request(&shared.x.atoms, ev.requestor, ev.target, ev.property, ev.time, now_ms())
                };
                apply_provider_action(shared, &action)?;
                // Property = NONE on rejection; otherwise the (already NONE-substituted)
                // property the action actually wrote to, never the raw `ev.property`.
                let reply_property = match &action {
                    ProviderAction::Reject { .. } => 0,
                    ProviderAction::ReplyTargets { property, .. }
                    | ProviderAction::ReplyTimestamp { property, .. }
                    | ProviderAction::ReplyData { property, .. }
                    | ProviderAction::BeginIncr { property, .. }
                    | ProviderAction::WriteIncrChunk { property, .. } => *property,
                };
                notify_requestor(shared, ev.requestor, ev.selection, ev.target, reply_property, ev.time)?;
            }
            Event::ClientMessage(_) => {
                // synthetic shutdown wake-up; loop condition re-checks the flag
            }
            _ => {}
        }

        if recv.tick(now_ms()) {
            shared.receiver_busy.store(false, Ordering::Release);
        }
        shared.provider.lock().tick(now_ms());
    }
}
