#![warn(missing_docs)]
//! Otley B+Tree record index
//!
//! # Why is this called Otley?
//!
//! Tradition. Small data structure crates around here get named after small
//! Yorkshire towns.
//!
//! # Implementation Details
//!
//! Provides a disk-backed B+Tree index over fixed-size binary records. The
//! caller supplies the record type, a function that extracts the indexed key
//! from a record and, optionally, a strict greater-than ordering predicate
//! (natural ordering is used when the key type is `Ord`).
//!
//! Records live in fixed-size data pages which form a doubly linked chain in
//! ascending key order, so range scans walk sibling pages without
//! re-descending the tree. Index pages hold separator keys and child page
//! offsets. Every page reference is a plain byte offset into a single index
//! file; a small JSON metadata document alongside it records the page
//! capacities, the uniqueness flag and where (and what) the root is.
//!
//! Pages serialize to a fixed byte count regardless of how full they are,
//! using a fixed-width integer encoding, so a page can always be rewritten
//! in place. Each operation opens the index file, runs to completion and
//! drops the handle before returning; nothing is cached between calls.
//!
//! The implementation assumes a single process and a single writer. There is
//! no write-ahead logging and no crash recovery.

pub mod btree;
mod io;

use bincode::config::AllowTrailing;
use bincode::config::FixintEncoding;
use bincode::config::WithOtherIntEncoding;
use bincode::config::WithOtherTrailing;
use bincode::{DefaultOptions, Options};
use std::sync::LazyLock;

static BINCODER: LazyLock<
    WithOtherIntEncoding<WithOtherTrailing<DefaultOptions, AllowTrailing>, FixintEncoding>,
> = LazyLock::new(|| {
    bincode::DefaultOptions::new()
        .allow_trailing_bytes()
        .with_fixint_encoding()
});
