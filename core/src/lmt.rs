// vim: tw=80
//! LMT: the Logical Mapping Table entry model.
//!
//! A pure, passive data structure: the 4 MiB-block-to-physical-location map
//! that the underlying Volume keeps, snapshot-versioned via a singly-linked
//! `prev_snap` chain. The AoF layer shares its snapshot semantics (an AoF is
//! just a Volume whose LMT entries come and go as the writer appends and the
//! Volume's own COW machinery snapshots it) but never walks the chain
//! itself; this module exists because the chain-surgery primitive,
//! `delete_matching`, is exercised directly by the testable properties in
//! spec.md section 8.
//!
//! Concurrency: caller-serialized. Nothing here is internally locked; a
//! caller must hold exclusive access to the chain it passes in, the same
//! contract the rest of this crate gives the AoF's single writer.

use crate::types::{Slba, SnapSeq, VolId};
use divbuf::DivBufShared;

/// Identifies one 4 KiB-aligned block within one volume. Equality and
/// hashing use only `vol_id` and `slba`, matching the original's
/// `operator==`/`lmt_hash` (spec.md section 9: "an implementer should treat
/// the hash as an implementation detail").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct LmtKey {
    pub vol_id: VolId,
    pub slba:   Slba,
}

impl LmtKey {
    pub fn new(vol_id: VolId, slba: Slba) -> Self {
        LmtKey { vol_id, slba }
    }
}

/// Lifecycle state of an [`LmtEntry`]. Only the head of a chain may be
/// `Copying` or `Recoverying` (spec.md section 3, invariants).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryStatus {
    Uninit,
    Normal,
    Copying,
    DelayDeleteAfterCow,
    Recoverying,
}

/// A single pending IO blocked on this entry's copy-on-write completion.
/// At most one may be outstanding per entry (spec.md section 3).
#[derive(Debug)]
pub struct WaitingIo {
    pub slba: Slba,
}

/// Scratch state kept only while `status == Recoverying`: the bitmap of
/// which sectors have already been recovered, and the buffer recovery is
/// staged into.
#[derive(Debug)]
pub struct RecoveryState {
    pub bitmap: Vec<bool>,
    pub buf:    DivBufShared,
}

/// One node in an LMT snapshot chain.
///
/// Chains are strictly ordered by descending `snap_seq`; `prev_snap` points
/// to the next-older entry, forming an embedded singly-linked list owned by
/// the head. This is the memory-safe rewrite spec.md section 9 calls for:
/// owned nodes on an explicit list, rather than the original's raw pointer
/// chain.
#[derive(Debug)]
pub struct LmtEntry {
    pub device_offset: crate::types::DevOffset,
    pub snap_seq:      SnapSeq,
    pub status:        EntryStatus,
    pub prev_snap:     Option<Box<LmtEntry>>,
    pub waiting_io:    Option<WaitingIo>,
    pub recovery:      Option<RecoveryState>,
}

impl LmtEntry {
    pub fn new(device_offset: crate::types::DevOffset, snap_seq: SnapSeq) -> Self {
        LmtEntry {
            device_offset,
            snap_seq,
            status: EntryStatus::Uninit,
            prev_snap: None,
            waiting_io: None,
            recovery: None,
        }
    }
}

/// Walk the `prev_snap` chain starting at `head`, removing every node for
/// which `predicate` holds and invoking `release` on each removed node
/// exactly once. Survivors retain their original relative order.
///
/// `head` is taken by `&mut Option<Box<LmtEntry>>` rather than a bare
/// reference so that the head itself can be removed; the caller passes
/// `&mut chain` where `chain: Option<Box<LmtEntry>>` owns the whole list.
///
/// There is no way to express "undefined behaviour if release frees memory
/// still reachable elsewhere" in safe Rust and there is no need to: owning
/// `Box<LmtEntry>` nodes means `release` receiving ownership of a removed
/// node is the only way it becomes unreachable.
pub fn delete_matching<P, R>(
    head: &mut Option<Box<LmtEntry>>,
    mut predicate: P,
    mut release: R,
) where
    P: FnMut(&LmtEntry) -> bool,
    R: FnMut(Box<LmtEntry>),
{
    let mut cursor = head;
    loop {
        let remove = match cursor.as_deref() {
            Some(entry) => predicate(entry),
            None => return,
        };
        if remove {
            let mut node = cursor.take().unwrap();
            *cursor = node.prev_snap.take();
            release(node);
            // `cursor` still points at the same slot, now holding what used
            // to be `node.prev_snap`; re-examine it on the next iteration.
        } else {
            cursor = &mut cursor.as_mut().unwrap().prev_snap;
        }
    }
}
