//! Provider state machine — the core of the inject path (SPEC_FULL.md §4.E).
//!
//! Grounded on 1Password-arboard's `handle_selection_request` (`platform/linux/x11.rs`) for
//! the TARGETS/direct-reply shape, and the gpui x11-clipboard reference's `run()` INCR-write
//! pump (`IncrState`, chunked writes keyed on `PropertyNotify(state=DELETE)`) for the
//! chunked-pump structure. Like the Receiver, this is I/O-free: the Event Pump performs the
//! actual `change_property`/`send_event` calls the emitted actions describe.

use log::warn;

use crate::atoms::Atoms;
use crate::config::{INCR_CHUNK_SIZE, TRANSACTION_DEADLINE_MS};
use crate::history::HistoryKind;

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderAction {
    /// Write `atoms` as a 32-bit `ATOM` array to `(requestor, property)`, then notify.
    ReplyTargets { requestor: u32, property: u32, atoms: Vec<u32> },
    /// Write `time` as a 32-bit value, then notify.
    ReplyTimestamp { requestor: u32, property: u32, time: u32 },
    /// Write `bytes` as 8-bit data of type `format`, then notify (single-shot reply).
    ReplyData { requestor: u32, property: u32, format: u32, bytes: Vec<u8> },
    /// Initiate an INCR transfer: write the total size as type INCR, subscribe to
    /// property-change events on `requestor`, then notify.
    BeginIncr { requestor: u32, property: u32, format: u32, total_len: u32 },
    /// Write the next chunk (or a zero-length terminator) to the recorded INCR property.
    WriteIncrChunk { requestor: u32, property: u32, format: u32, bytes: Vec<u8> },
    /// Reply with property = NONE (rejection).
    Reject { requestor: u32, property: u32 },
}

struct IncrTransfer {
    requestor: u32,
    property: u32,
    format: u32,
    payload: Vec<u8>,
    offset: usize,
    deadline_ms: u64,
}

pub struct Provider {
    active_payload: Option<Vec<u8>>,
    active_kind: Option<HistoryKind>,
    incr: Option<IncrTransfer>,
}

impl Provider {
    pub fn new() -> Self {
        Self { active_payload: None, active_kind: None, incr: None }
    }

    pub fn active_kind(&self) -> Option<HistoryKind> {
        self.active_kind
    }

    fn incr_deadline_expired(&self, now_ms: u64) -> bool {
        match &self.incr {
            Some(t) => now_ms >= t.deadline_ms,
            None => false,
        }
    }

    /// §4.E `ClaimOwnership`: discarded if a Receiver transaction is in flight and not
    /// timed out. The caller (Inject Worker / Event Pump) is responsible for checking the
    /// Receiver's lock state before calling this; `receiver_locked` mirrors that check so
    /// the decision stays testable here too.
    pub fn claim_ownership(&mut self, bytes: Vec<u8>, kind: HistoryKind, receiver_locked: bool) -> bool {
        if receiver_locked {
            return false;
        }
        self.active_payload = Some(bytes);
        self.active_kind = Some(kind);
        self.incr = None;
        true
    }

    /// §4.E `SelectionRequest` target switch. Per ICCCM, a requestor may legally omit
    /// `property` (send `NONE`); in that case the reply property is the target atom itself,
    /// not `NONE` — substituted once here so every action below carries the real property.
    pub fn on_selection_request(
        &mut self,
        atoms: &Atoms,
        requestor: u32,
        target: u32,
        property: u32,
        time: u32,
        now_ms: u64,
    ) -> ProviderAction {
        let property = if property == 0 { target } else { property };

        if target == atoms.TARGETS {
            let mut list = vec![atoms.TARGETS, atoms.TIMESTAMP];
            if let Some(format) = self.active_kind.and_then(|k| atoms.format_for(k)) {
                list.push(format);
            }
            return ProviderAction::ReplyTargets { requestor, property, atoms: list };
        }

        if target == atoms.TIMESTAMP {
            return ProviderAction::ReplyTimestamp { requestor, property, time };
        }

        let active_format = self.active_kind.and_then(|k| atoms.format_for(k));
        let payload = match (&self.active_payload, active_format) {
            (Some(bytes), Some(format)) if format == target => bytes,
            _ => return ProviderAction::Reject { requestor, property },
        };

        if payload.len() <= INCR_CHUNK_SIZE {
            return ProviderAction::ReplyData { requestor, property, format: target, bytes: payload.clone() };
        }

        if let Some(existing) = &self.incr {
            if existing.requestor != requestor && !self.incr_deadline_expired(now_ms) {
                warn!("rejecting SelectionRequest: another INCR transfer is already in flight");
                return ProviderAction::Reject { requestor, property };
            }
        }

        let payload = payload.clone();
        let total_len = payload.len() as u32;
        self.incr = Some(IncrTransfer {
            requestor,
            property,
            format: target,
            payload,
            offset: 0,
            deadline_ms: now_ms + TRANSACTION_DEADLINE_MS,
        });
        ProviderAction::BeginIncr { requestor, property, format: target, total_len }
    }

    /// §4.E INCR pump, triggered by `PropertyDeleted` matching our in-flight state.
    pub fn on_property_deleted(&mut self, requestor: u32, property: u32, now_ms: u64) -> Option<ProviderAction> {
        let transfer = self.incr.as_mut()?;
        if transfer.requestor != requestor || transfer.property != property {
            return None;
        }

        let remaining = transfer.payload.len() - transfer.offset;
        if remaining == 0 {
            let action = ProviderAction::WriteIncrChunk {
                requestor: transfer.requestor,
                property: transfer.property,
                format: transfer.format,
                bytes: Vec::new(),
            };
            self.incr = None;
            return Some(action);
        }

        let take = remaining.min(INCR_CHUNK_SIZE);
        let chunk = transfer.payload[transfer.offset..transfer.offset + take].to_vec();
        transfer.offset += take;
        transfer.deadline_ms = now_ms + TRANSACTION_DEADLINE_MS;

        Some(ProviderAction::WriteIncrChunk {
            requestor: transfer.requestor,
            property: transfer.property,
            format: transfer.format,
            bytes: chunk,
        })
    }

    pub fn tick(&mut self, now_ms: u64) -> bool {
        if self.incr_deadline_expired(now_ms) {
            warn!("provider INCR transfer timed out; abandoning");
            self.incr = None;
            return true;
        }
        false
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_atoms() -> Atoms {
        Atoms {
            CLIPBOARD: 1,
            TARGETS: 2,
            TIMESTAMP: 3,
            INCR: 4,
            ATOM: 5,
            UTF8_STRING: 6,
            PNG_MIME: 7,
            JPEG_MIME: 8,
            BMP_MIME: 9,
            XCLIPD_TRANSFER: 10,
            XCLIPD_INSTANCE_LOCK: 11,
        }
    }

    #[test]
    fn selection_request_with_none_property_substitutes_target() {
        let atoms = fake_atoms();
        let mut provider = Provider::new();
        provider.claim_ownership(b"hello".to_vec(), HistoryKind::TextUtf8, false);

        let action = provider.on_selection_request(&atoms, 42, atoms.UTF8_STRING, 0, 12345, 0);
        assert_eq!(
            action,
            ProviderAction::ReplyData { requestor: 42, property: atoms.UTF8_STRING, format: atoms.UTF8_STRING, bytes: b"hello".to_vec() }
        );
    }

    #[test]
    fn copy_then_paste_self_small_text() {
        let atoms = fake_atoms();
        let mut provider = Provider::new();
        assert!(provider.claim_ownership(b"hello".to_vec(), HistoryKind::TextUtf8, false));

        let action = provider.on_selection_request(&atoms, 42, atoms.UTF8_STRING, 99, 12345, 0);
        assert_eq!(
            action,
            ProviderAction::ReplyData { requestor: 42, property: 99, format: atoms.UTF8_STRING, bytes: b"hello".to_vec() }
        );
    }

    #[test]
    fn large_payload_uses_incr_then_chunks_then_eof() {
        let atoms = fake_atoms();
        let mut provider = Provider::new();
        let payload = vec![7u8; INCR_CHUNK_SIZE * 2 + 100];
        provider.claim_ownership(payload.clone(), HistoryKind::ImagePng, false);

        let action = provider.on_selection_request(&atoms, 1, atoms.PNG_MIME, 2, 0, 0);
        assert_eq!(
            action,
            ProviderAction::BeginIncr { requestor: 1, property: 2, format: atoms.PNG_MIME, total_len: payload.len() as u32 }
        );

        let mut received = Vec::new();
        loop {
            let action = provider.on_property_deleted(1, 2, 0).unwrap();
            match action {
                ProviderAction::WriteIncrChunk { bytes, .. } if bytes.is_empty() => break,
                ProviderAction::WriteIncrChunk { bytes, .. } => received.extend(bytes),
                other => panic!("unexpected action {other:?}"),
            }
        }
        assert_eq!(received, payload);
    }

    #[test]
    fn claim_ownership_discarded_while_receiver_locked() {
        let mut provider = Provider::new();
        assert!(!provider.claim_ownership(b"x".to_vec(), HistoryKind::TextUtf8, true));
        assert!(provider.active_kind().is_none());
    }

    #[test]
    fn stuck_incr_is_abandoned_for_a_new_requestor() {
        let atoms = fake_atoms();
        let mut provider = Provider::new();
        let payload = vec![1u8; INCR_CHUNK_SIZE + 1];
        provider.claim_ownership(payload, HistoryKind::ImagePng, false);
        provider.on_selection_request(&atoms, 1, atoms.PNG_MIME, 10, 0, 0);

        // A different requestor while the first transfer's deadline has not expired: reject.
        let action = provider.on_selection_request(&atoms, 2, atoms.PNG_MIME, 20, 0, 1000);
        assert_eq!(action, ProviderAction::Reject { requestor: 2, property: 20 });

        // Once the deadline has elapsed, a new request is served from scratch.
        let action = provider.on_selection_request(&atoms, 2, atoms.PNG_MIME, 20, 0, TRANSACTION_DEADLINE_MS + 1);
        assert!(matches!(action, ProviderAction::BeginIncr { requestor: 2, .. }));
    }
}
