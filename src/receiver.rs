//! Receiver state machine — the core of the capture path (SPEC_FULL.md §4.D).
//!
//! Structured as explicit per-phase methods on `Receiver`, each taking an already-fetched
//! property reply and returning an outcome — never touching the X11 connection itself. The
//! Event Pump (§4.F) performs the actual `get_property`/`convert_selection` calls and feeds
//! their results back in; this keeps the transaction logic testable with synthetic replies,
//! per the "pure state transition function" guidance in the design notes.
//!
//! Grounded on 1Password-arboard's `read_single`/`handle_read_selection_notify`/
//! `handle_read_property_notify` (`platform/linux/x11.rs`) for the drain-then-delete
//! sequencing, and the gpui x11-clipboard reference's `process_event` for the INCR
//! accumulation/EOF shape.

use std::fs::File;
use std::path::PathBuf;

use log::{debug, warn};

use crate::atoms::Atoms;
use crate::config::TRANSACTION_DEADLINE_MS;
use crate::error::Result;
use crate::history::{generate_filename, HistoryKind};
use crate::transfer_buffer::TransferBuffer;

/// A property reply the Event Pump already fetched via `get_property`.
#[derive(Debug, Clone)]
pub struct PropertyReply {
    pub property_present: bool,
    pub property_type: u32,
    pub bytes: Vec<u8>,
    pub bytes_remaining: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverAction {
    /// Defensively delete the transfer property, then request conversion into `target` —
    /// the two always go together per §4.D steps 1/2, mirroring the teacher's own
    /// `delete_property`-before-every-`convert_selection` sequencing in `read_single`.
    DeleteThenConvert { target: u32, time: u32 },
    DeleteProperty,
    FetchProperty { offset_words: u32 },
    Nothing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverOutcome {
    Action(ReceiverAction),
    /// Transfer finished with at least one byte; caller should `push_if_exists(filename)`.
    Finalized { filename: String },
    /// Rejected, timed out, or errored; nothing to register.
    Aborted,
}

enum State {
    Idle,
    AwaitingTargets { transaction_time: u32, deadline_ms: u64 },
    AwaitingData { transaction_time: u32, deadline_ms: u64, target: u32 },
    SingleShotDraining { deadline_ms: u64, filename: String, file: File, buffer: TransferBuffer, offset_words: u32 },
    IncrStreaming { deadline_ms: u64, filename: String, file: File, buffer: TransferBuffer },
}

pub struct Receiver {
    db_dir: PathBuf,
    state: State,
}

impl Receiver {
    pub fn new(db_dir: PathBuf) -> Self {
        Self { db_dir, state: State::Idle }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// True while waiting for the TARGETS reply specifically, so the Event Pump can tell a
    /// TARGETS `SelectionNotify` apart from a data `SelectionNotify` without re-deriving the
    /// phase from the wire atoms.
    pub fn awaiting_targets(&self) -> bool {
        matches!(self.state, State::AwaitingTargets { .. })
    }

    fn deadline(now_ms: u64) -> u64 {
        now_ms + TRANSACTION_DEADLINE_MS
    }

    fn reset_to_idle(&mut self) {
        self.state = State::Idle;
    }

    /// §4.D step 1. A new `OwnerChanged` while locked is discarded unless the deadline has
    /// elapsed, in which case we force-reset and accept the new event. Always defensively
    /// deletes the transfer property before requesting conversion into `TARGETS`.
    pub fn on_owner_changed(&mut self, atoms: &Atoms, time: u32, now_ms: u64) -> ReceiverOutcome {
        let locked_and_live = match &self.state {
            State::Idle => false,
            State::AwaitingTargets { deadline_ms, .. }
            | State::AwaitingData { deadline_ms, .. }
            | State::SingleShotDraining { deadline_ms, .. }
            | State::IncrStreaming { deadline_ms, .. } => now_ms < *deadline_ms,
        };
        if locked_and_live {
            debug!("OwnerChanged discarded: a receive transaction is already in flight");
            return ReceiverOutcome::Action(ReceiverAction::Nothing);
        }
        if !matches!(self.state, State::Idle) {
            warn!("receive transaction deadline elapsed; force-resetting for the new owner");
        }
        self.reset_to_idle();
        self.state = State::AwaitingTargets { transaction_time: time, deadline_ms: Self::deadline(now_ms) };
        ReceiverOutcome::Action(ReceiverAction::DeleteThenConvert { target: atoms.TARGETS, time })
    }

    /// §4.D step 2. Parses the TARGETS reply as an array of atoms and selects the best
    /// target by preference order (PNG > JPEG > BMP > UTF-8), skipping unknowns. Re-deletes
    /// the transfer property before requesting conversion into the chosen target.
    pub fn on_targets_reply(&mut self, atoms: &Atoms, reply: PropertyReply) -> ReceiverOutcome {
        let (transaction_time, _) = match &self.state {
            State::AwaitingTargets { transaction_time, deadline_ms } => (*transaction_time, *deadline_ms),
            _ => return ReceiverOutcome::Action(ReceiverAction::Nothing),
        };

        if !reply.property_present {
            self.reset_to_idle();
            return ReceiverOutcome::Aborted;
        }

        let advertised: Vec<u32> =
            reply.bytes.chunks_exact(4).map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]])).collect();

        let best = atoms.preference_order().into_iter().find(|candidate| advertised.contains(candidate));

        match best {
            None => {
                self.reset_to_idle();
                ReceiverOutcome::Aborted
            }
            Some(target) => {
                if let State::AwaitingTargets { deadline_ms, .. } = self.state {
                    self.state = State::AwaitingData { transaction_time, deadline_ms, target };
                }
                ReceiverOutcome::Action(ReceiverAction::DeleteThenConvert { target, time: transaction_time })
            }
        }
    }

    fn open_output(&self, kind: HistoryKind) -> std::io::Result<(String, File)> {
        let filename = generate_filename(kind);
        let file = File::create(self.db_dir.join(&filename))?;
        Ok((filename, file))
    }

    /// §4.D steps 3/4: the first reply to our media `convert_selection`. Either the
    /// property type is `INCR` (begin streaming) or it's the media type itself
    /// (single-shot, possibly requiring a drain).
    pub fn on_data_reply(&mut self, atoms: &Atoms, reply: PropertyReply) -> Result<ReceiverOutcome> {
        let (target, deadline_ms) = match &self.state {
            State::AwaitingData { target, deadline_ms, .. } => (*target, *deadline_ms),
            _ => return Ok(ReceiverOutcome::Action(ReceiverAction::Nothing)),
        };

        if !reply.property_present {
            self.reset_to_idle();
            return Ok(ReceiverOutcome::Aborted);
        }

        let kind = atoms.kind_of(target).unwrap_or(HistoryKind::Unknown);

        if reply.property_type == atoms.INCR {
            let (filename, file) = self.open_output(kind)?;
            self.state =
                State::IncrStreaming { deadline_ms, filename, file, buffer: TransferBuffer::new() };
            return Ok(ReceiverOutcome::Action(ReceiverAction::DeleteProperty));
        }

        if reply.property_type != target {
            warn!("unexpected property type in data reply; resetting transaction");
            self.reset_to_idle();
            return Ok(ReceiverOutcome::Aborted);
        }

        let (filename, mut file) = self.open_output(kind)?;
        let mut buffer = TransferBuffer::new();
        buffer.append(&mut file, &reply.bytes)?;

        if reply.bytes_remaining > 0 {
            let offset_words = (reply.bytes.len() / 4) as u32;
            self.state = State::SingleShotDraining { deadline_ms, filename, file, buffer, offset_words };
            return Ok(ReceiverOutcome::Action(ReceiverAction::FetchProperty { offset_words }));
        }

        self.finalize_single_shot(filename, &mut file, &mut buffer)
    }

    /// §4.D drain rule: keep fetching at an increasing word-offset until the server
    /// reports no bytes remaining.
    pub fn on_drain_chunk(&mut self, reply: PropertyReply) -> Result<ReceiverOutcome> {
        let mut state = std::mem::replace(&mut self.state, State::Idle);
        let outcome = match &mut state {
            State::SingleShotDraining { filename, file, buffer, offset_words, .. } => {
                if !reply.property_present {
                    return Ok(ReceiverOutcome::Aborted);
                }
                buffer.append(file, &reply.bytes)?;
                if reply.bytes_remaining > 0 {
                    *offset_words += (reply.bytes.len() / 4) as u32;
                    let next_offset = *offset_words;
                    self.state = state;
                    return Ok(ReceiverOutcome::Action(ReceiverAction::FetchProperty { offset_words: next_offset }));
                }
                let filename = filename.clone();
                self.finalize_single_shot(filename, file, buffer)?
            }
            _ => ReceiverOutcome::Action(ReceiverAction::Nothing),
        };
        if !matches!(outcome, ReceiverOutcome::Action(ReceiverAction::FetchProperty { .. })) {
            self.reset_to_idle();
        }
        Ok(outcome)
    }

    fn finalize_single_shot(
        &mut self,
        filename: String,
        file: &mut File,
        buffer: &mut TransferBuffer,
    ) -> Result<ReceiverOutcome> {
        let total = buffer.finalize(file)?;
        self.reset_to_idle();
        if total == 0 {
            let _ = std::fs::remove_file(self.db_dir.join(&filename));
            return Ok(ReceiverOutcome::Aborted);
        }
        Ok(ReceiverOutcome::Finalized { filename })
    }

    /// §4.D step 5: a chunk arrived during an INCR stream. A zero-length chunk is EOF.
    pub fn on_property_new_value(&mut self, now_ms: u64, reply: PropertyReply) -> Result<ReceiverOutcome> {
        let mut state = std::mem::replace(&mut self.state, State::Idle);
        let result = match &mut state {
            State::IncrStreaming { deadline_ms, filename, file, buffer } => {
                if reply.bytes.is_empty() {
                    let total = buffer.finalize(file)?;
                    if total == 0 {
                        let _ = std::fs::remove_file(self.db_dir.join(filename.as_str()));
                        Ok(ReceiverOutcome::Aborted)
                    } else {
                        Ok(ReceiverOutcome::Finalized { filename: filename.clone() })
                    }
                } else {
                    buffer.append(file, &reply.bytes)?;
                    *deadline_ms = Self::deadline(now_ms);
                    Ok(ReceiverOutcome::Action(ReceiverAction::DeleteProperty))
                }
            }
            _ => Ok(ReceiverOutcome::Action(ReceiverAction::Nothing)),
        };
        match &result {
            Ok(ReceiverOutcome::Action(ReceiverAction::DeleteProperty)) => self.state = state,
            _ => self.reset_to_idle(),
        }
        result
    }

    /// §4.D step 6: force-finalize a transaction whose deadline has elapsed. Returns true
    /// if a reset actually happened.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        let expired = match &self.state {
            State::Idle => false,
            State::AwaitingTargets { deadline_ms, .. }
            | State::AwaitingData { deadline_ms, .. }
            | State::SingleShotDraining { deadline_ms, .. }
            | State::IncrStreaming { deadline_ms, .. } => now_ms >= *deadline_ms,
        };
        if expired {
            warn!("receive transaction timed out; discarding partial state");
            if let State::SingleShotDraining { filename, .. } | State::IncrStreaming { filename, .. } =
                &self.state
            {
                let _ = std::fs::remove_file(self.db_dir.join(filename));
            }
            self.reset_to_idle();
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Atoms;
    use tempfile::tempdir;

    // A stand-in atom table with distinct small integers, since tests run without a
    // live X11 connection.
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

    fn atoms_bytes(atoms: &[u32]) -> Vec<u8> {
        atoms.iter().flat_map(|a| a.to_ne_bytes()).collect()
    }

    #[test]
    fn text_copy_single_shot_finalizes() {
        let dir = tempdir().unwrap();
        let atoms = fake_atoms();
        let mut recv = Receiver::new(dir.path().to_path_buf());

        recv.on_owner_changed(&atoms, 100, 0);
        let outcome = recv.on_targets_reply(
            &atoms,
            PropertyReply { property_present: true, property_type: atoms.ATOM, bytes: atoms_bytes(&[atoms.UTF8_STRING]), bytes_remaining: 0 },
        );
        assert_eq!(outcome, ReceiverOutcome::Action(ReceiverAction::DeleteThenConvert { target: atoms.UTF8_STRING, time: 100 }));

        let outcome = recv
            .on_data_reply(
                &atoms,
                PropertyReply { property_present: true, property_type: atoms.UTF8_STRING, bytes: b"hello".to_vec(), bytes_remaining: 0 },
            )
            .unwrap();
        match outcome {
            ReceiverOutcome::Finalized { filename } => {
                let contents = std::fs::read(dir.path().join(&filename)).unwrap();
                assert_eq!(contents, b"hello");
            }
            other => panic!("expected Finalized, got {other:?}"),
        }
        assert!(recv.is_idle());
    }

    #[test]
    fn targets_reply_with_only_unknown_atoms_releases_lock() {
        let dir = tempdir().unwrap();
        let atoms = fake_atoms();
        let mut recv = Receiver::new(dir.path().to_path_buf());
        recv.on_owner_changed(&atoms, 1, 0);
        let outcome = recv.on_targets_reply(
            &atoms,
            PropertyReply { property_present: true, property_type: atoms.ATOM, bytes: atoms_bytes(&[999]), bytes_remaining: 0 },
        );
        assert_eq!(outcome, ReceiverOutcome::Aborted);
        assert!(recv.is_idle());
    }

    #[test]
    fn incr_stream_accumulates_and_ends_on_zero_length_chunk() {
        let dir = tempdir().unwrap();
        let atoms = fake_atoms();
        let mut recv = Receiver::new(dir.path().to_path_buf());
        recv.on_owner_changed(&atoms, 1, 0);
        recv.on_targets_reply(
            &atoms,
            PropertyReply { property_present: true, property_type: atoms.ATOM, bytes: atoms_bytes(&[atoms.PNG_MIME]), bytes_remaining: 0 },
        );
        let outcome = recv
            .on_data_reply(
                &atoms,
                PropertyReply { property_present: true, property_type: atoms.INCR, bytes: vec![], bytes_remaining: 0 },
            )
            .unwrap();
        assert_eq!(outcome, ReceiverOutcome::Action(ReceiverAction::DeleteProperty));

        let outcome = recv.on_property_new_value(10, PropertyReply { property_present: true, property_type: atoms.PNG_MIME, bytes: vec![1, 2, 3], bytes_remaining: 0 }).unwrap();
        assert_eq!(outcome, ReceiverOutcome::Action(ReceiverAction::DeleteProperty));

        let outcome = recv.on_property_new_value(20, PropertyReply { property_present: true, property_type: atoms.PNG_MIME, bytes: vec![], bytes_remaining: 0 }).unwrap();
        match outcome {
            ReceiverOutcome::Finalized { filename } => {
                let contents = std::fs::read(dir.path().join(&filename)).unwrap();
                assert_eq!(contents, vec![1, 2, 3]);
            }
            other => panic!("expected Finalized, got {other:?}"),
        }
    }

    #[test]
    fn owner_changed_discarded_while_locked_and_accepted_after_deadline() {
        let dir = tempdir().unwrap();
        let atoms = fake_atoms();
        let mut recv = Receiver::new(dir.path().to_path_buf());
        recv.on_owner_changed(&atoms, 1, 0);
        let outcome = recv.on_owner_changed(&atoms, 2, 100);
        assert_eq!(outcome, ReceiverOutcome::Action(ReceiverAction::Nothing));

        // Past the 5000ms deadline: a fresh OwnerChanged is accepted.
        let outcome = recv.on_owner_changed(&atoms, 3, TRANSACTION_DEADLINE_MS + 1);
        assert!(matches!(outcome, ReceiverOutcome::Action(ReceiverAction::DeleteThenConvert { .. })));
    }

    #[test]
    fn tick_past_deadline_force_resets() {
        let dir = tempdir().unwrap();
        let atoms = fake_atoms();
        let mut recv = Receiver::new(dir.path().to_path_buf());
        recv.on_owner_changed(&atoms, 1, 0);
        assert!(!recv.tick(1000));
        assert!(recv.tick(TRANSACTION_DEADLINE_MS + 1));
        assert!(recv.is_idle());
    }

    #[test]
    fn single_shot_drain_loop_terminates_on_zero_remaining() {
        let dir = tempdir().unwrap();
        let atoms = fake_atoms();
        let mut recv = Receiver::new(dir.path().to_path_buf());
        recv.on_owner_changed(&atoms, 1, 0);
        recv.on_targets_reply(
            &atoms,
            PropertyReply { property_present: true, property_type: atoms.ATOM, bytes: atoms_bytes(&[atoms.UTF8_STRING]), bytes_remaining: 0 },
        );
        let outcome = recv
            .on_data_reply(
                &atoms,
                PropertyReply { property_present: true, property_type: atoms.UTF8_STRING, bytes: b"part1".to_vec(), bytes_remaining: 5 },
            )
            .unwrap();
        assert!(matches!(outcome, ReceiverOutcome::Action(ReceiverAction::FetchProperty { .. })));

        let outcome = recv
            .on_drain_chunk(PropertyReply { property_present: true, property_type: atoms.UTF8_STRING, bytes: b"part2".to_vec(), bytes_remaining: 0 })
            .unwrap();
        match outcome {
            ReceiverOutcome::Finalized { filename } => {
                let contents = std::fs::read(dir.path().join(&filename)).unwrap();
                assert_eq!(contents, b"part1part2");
            }
            other => panic!("expected Finalized, got {other:?}"),
        }
    }
}
