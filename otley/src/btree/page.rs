//! B+Tree Page Types
//!
//! A page is the unit of I/O. It is identified by its byte offset (its
//! "seek") in the index file and serializes to a fixed byte count regardless
//! of its current fill, so it can always be rewritten in place. A data page
//! holds a sorted run of records and its links in the leaf chain; an index
//! page holds separator keys and one more child seek than keys.

use std::fmt::Debug;

use anyhow::Error;
use anyhow::Result;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::io::file::storage_block_size;
use crate::BINCODER;

/// Seek sentinel marking an absent page reference.
pub(crate) const NULL_PAGE: i64 = -1;

/// Seek position of the first page written to a fresh index file.
pub(crate) const INITIAL_PAGE: i64 = 0;

// On-disk field widths under the fixed-width codec.
const COUNT_FIELD: usize = 4;
const SEEK_FIELD: usize = 8;
const FLAG_FIELD: usize = 1;

/// Keys which we wish to index records by.
///
/// The key encoding must have a fixed size: compose keys from fixed-width
/// integers, floats, bools and arrays rather than collection types.
pub trait OtleyKey: Clone + Default + Serialize + DeserializeOwned + Debug {}

// Blanket implementation which satisfies the compiler
impl<K> OtleyKey for K where K: Clone + Default + Serialize + DeserializeOwned + Debug {}

/// Records which we wish to store in an Otley tree.
///
/// The same fixed-size encoding requirement as [`OtleyKey`] applies; the
/// engine never looks inside a record beyond extracting its key.
pub trait OtleyRecord: Clone + Default + Serialize + DeserializeOwned + Debug {}

// Blanket implementation which satisfies the compiler
impl<R> OtleyRecord for R where R: Clone + Default + Serialize + DeserializeOwned + Debug {}

/// Page specific errors.
///
/// Page operations are always guarded by a capacity or occupancy check in
/// the engine, so observing one of these from the public API means the
/// engine has a bug.
#[derive(Error, Debug)]
pub enum PageError {
    /// An insert was attempted on a page already at capacity.
    #[error("page is already at capacity: {0}")]
    FullPage(i32),

    /// An accessor needed at least one entry on an empty page.
    #[error("page has no entries")]
    EmptyPage,
}

/// Which kind of page a seek position refers to during descent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PageKind {
    Index,
    Data,
}

/// Encoded size of `T` under the fixed-width codec.
pub(crate) fn encoded_size_of<T: Default + Serialize>() -> Result<usize> {
    BINCODER
        .serialized_size(&T::default())
        .map(|size| size as usize)
        .map_err(Error::new)
}

/// Largest key count an index page can hold within one storage block.
pub fn expected_index_page_capacity<K: OtleyKey>() -> Result<i32> {
    let key_size = encoded_size_of::<K>()?;
    let header = 2 * COUNT_FIELD + SEEK_FIELD + FLAG_FIELD;
    Ok(((storage_block_size() - header) / (key_size + SEEK_FIELD)) as i32)
}

/// Largest record count a data page can hold within one storage block.
pub fn expected_data_page_capacity<R: OtleyRecord>() -> Result<i32> {
    let record_size = encoded_size_of::<R>()?;
    let header = 2 * COUNT_FIELD + 2 * SEEK_FIELD;
    Ok(((storage_block_size() - header) / record_size) as i32)
}

/// A leaf page: a sorted run of records plus its links in the leaf chain.
#[derive(Clone, Debug)]
pub(crate) struct DataPage<R> {
    pub(crate) capacity: i32,
    pub(crate) next_leaf: i64,
    pub(crate) prev_leaf: i64,
    pub(crate) records: Vec<R>,
}

impl<R> DataPage<R>
where
    R: OtleyRecord,
{
    pub(crate) fn new(capacity: i32) -> Self {
        Self {
            capacity,
            next_leaf: NULL_PAGE,
            prev_leaf: NULL_PAGE,
            records: Vec::with_capacity(capacity as usize),
        }
    }

    pub(crate) fn num_records(&self) -> i32 {
        self.records.len() as i32
    }

    /// Fixed size of a data page image for this capacity and record size.
    pub(crate) fn size_of(capacity: i32, record_size: usize) -> usize {
        2 * COUNT_FIELD + 2 * SEEK_FIELD + capacity as usize * record_size
    }

    pub(crate) fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend(BINCODER.serialize(&self.capacity)?);
        buf.extend(BINCODER.serialize(&self.num_records())?);
        buf.extend(BINCODER.serialize(&self.next_leaf)?);
        buf.extend(BINCODER.serialize(&self.prev_leaf)?);
        for record in &self.records {
            buf.extend(BINCODER.serialize(record)?);
        }
        // Unused slots still occupy their full span on disk.
        let filler = R::default();
        for _ in self.num_records()..self.capacity {
            buf.extend(BINCODER.serialize(&filler)?);
        }
        Ok(buf)
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let capacity: i32 = BINCODER.deserialize_from(&mut reader)?;
        let num_records: i32 = BINCODER.deserialize_from(&mut reader)?;
        let next_leaf: i64 = BINCODER.deserialize_from(&mut reader)?;
        let prev_leaf: i64 = BINCODER.deserialize_from(&mut reader)?;
        let mut records = Vec::with_capacity(capacity as usize);
        for _ in 0..num_records {
            records.push(BINCODER.deserialize_from(&mut reader)?);
        }
        Ok(Self {
            capacity,
            next_leaf,
            prev_leaf,
            records,
        })
    }

    /// Insert preserving ascending key order; trailing records shift right.
    pub(crate) fn sorted_insert<K>(
        &mut self,
        record: R,
        key_of: impl Fn(&R) -> K,
        greater: impl Fn(&K, &K) -> bool,
    ) -> Result<(), PageError> {
        if self.num_records() == self.capacity {
            return Err(PageError::FullPage(self.capacity));
        }
        let key = key_of(&record);
        let pos = self.records.partition_point(|r| greater(&key, &key_of(r)));
        self.records.insert(pos, record);
        Ok(())
    }

    /// Remove the first record matching `key`; trailing records shift left.
    ///
    /// The outer `Option` is `None` when no record matches. The inner value
    /// is the page's new maximum key when the removal changed it, so the
    /// caller can patch any ancestor separator that used the old maximum.
    pub(crate) fn remove<K>(
        &mut self,
        key: &K,
        key_of: impl Fn(&R) -> K,
        greater: impl Fn(&K, &K) -> bool,
    ) -> Option<Option<K>> {
        let pos = self.records.iter().position(|r| {
            let record_key = key_of(r);
            !greater(key, &record_key) && !greater(&record_key, key)
        })?;
        let was_last = pos + 1 == self.records.len();
        self.records.remove(pos);
        if was_last {
            Some(self.records.last().map(key_of))
        } else {
            Some(None)
        }
    }

    /// Split off the right half into a new page.
    ///
    /// This page keeps `min_capacity + 1` records; the separator is the key
    /// of its new maximum, which stays in this page. The caller owns the
    /// seek positions and is responsible for relinking the leaf chain.
    pub(crate) fn split<K>(
        &mut self,
        min_capacity: i32,
        key_of: impl Fn(&R) -> K,
    ) -> Result<(DataPage<R>, K), PageError> {
        let tail = self.records.split_off(min_capacity as usize + 1);
        let mut right = DataPage::new(self.capacity);
        right.records = tail;
        let separator = key_of(self.max_record()?);
        Ok((right, separator))
    }

    /// Append the right sibling's records and take over its forward link.
    pub(crate) fn merge(&mut self, right: DataPage<R>) {
        self.records.extend(right.records);
        self.next_leaf = right.next_leaf;
    }

    pub(crate) fn max_record(&self) -> Result<&R, PageError> {
        self.records.last().ok_or(PageError::EmptyPage)
    }

    pub(crate) fn min_record(&self) -> Result<&R, PageError> {
        self.records.first().ok_or(PageError::EmptyPage)
    }
}

/// An internal page: separator keys and one more child seek than keys.
#[derive(Clone, Debug)]
pub(crate) struct IndexPage<K> {
    pub(crate) capacity: i32,
    pub(crate) points_to_leaf: bool,
    pub(crate) keys: Vec<K>,
    pub(crate) children: Vec<i64>,
}

impl<K> IndexPage<K>
where
    K: OtleyKey,
{
    pub(crate) fn new(capacity: i32, points_to_leaf: bool) -> Self {
        Self {
            capacity,
            points_to_leaf,
            keys: Vec::with_capacity(capacity as usize),
            children: Vec::with_capacity(capacity as usize + 1),
        }
    }

    pub(crate) fn num_keys(&self) -> i32 {
        self.keys.len() as i32
    }

    /// Fixed size of an index page image for this capacity and key size.
    pub(crate) fn size_of(capacity: i32, key_size: usize) -> usize {
        2 * COUNT_FIELD
            + capacity as usize * key_size
            + (capacity as usize + 1) * SEEK_FIELD
            + FLAG_FIELD
    }

    pub(crate) fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend(BINCODER.serialize(&self.capacity)?);
        buf.extend(BINCODER.serialize(&self.num_keys())?);
        for key in &self.keys {
            buf.extend(BINCODER.serialize(key)?);
        }
        let filler = K::default();
        for _ in self.num_keys()..self.capacity {
            buf.extend(BINCODER.serialize(&filler)?);
        }
        for child in &self.children {
            buf.extend(BINCODER.serialize(child)?);
        }
        for _ in self.children.len()..(self.capacity as usize + 1) {
            buf.extend(BINCODER.serialize(&NULL_PAGE)?);
        }
        buf.extend(BINCODER.serialize(&self.points_to_leaf)?);
        Ok(buf)
    }

    pub(crate) fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let capacity: i32 = BINCODER.deserialize_from(&mut reader)?;
        let num_keys: i32 = BINCODER.deserialize_from(&mut reader)?;
        let mut keys: Vec<K> = Vec::with_capacity(capacity as usize);
        for _ in 0..capacity {
            keys.push(BINCODER.deserialize_from(&mut reader)?);
        }
        keys.truncate(num_keys as usize);
        let mut children: Vec<i64> = Vec::with_capacity(capacity as usize + 1);
        for _ in 0..=capacity {
            children.push(BINCODER.deserialize_from(&mut reader)?);
        }
        children.truncate(num_keys as usize + 1);
        let points_to_leaf: bool = BINCODER.deserialize_from(&mut reader)?;
        Ok(Self {
            capacity,
            points_to_leaf,
            keys,
            children,
        })
    }

    /// Index of the child subtree which may contain `key`: the first
    /// position whose separator is not less than `key`, so equal keys route
    /// to the left. Every descent must use this same rule.
    pub(crate) fn child_index(&self, key: &K, greater: impl Fn(&K, &K) -> bool) -> usize {
        self.keys.partition_point(|separator| greater(key, separator))
    }

    /// Insert a separator/child pair at its ordered position.
    pub(crate) fn sorted_insert(
        &mut self,
        key: K,
        child_seek: i64,
        greater: impl Fn(&K, &K) -> bool,
    ) -> Result<(), PageError> {
        if self.num_keys() == self.capacity {
            return Err(PageError::FullPage(self.capacity));
        }
        let pos = self.child_index(&key, greater);
        self.keys.insert(pos, key);
        self.children.insert(pos + 1, child_seek);
        Ok(())
    }

    /// Splice in the separator and page produced by splitting the child at
    /// `child_pos`; the descent already fixed the position so no ordering
    /// scan is needed.
    pub(crate) fn reallocate_references_after_split(
        &mut self,
        child_pos: usize,
        new_key: K,
        new_page_seek: i64,
    ) -> Result<(), PageError> {
        if self.num_keys() == self.capacity {
            return Err(PageError::FullPage(self.capacity));
        }
        self.keys.insert(child_pos, new_key);
        self.children.insert(child_pos + 1, new_page_seek);
        Ok(())
    }

    /// Split off the right half into a new page, promoting the key at the
    /// split point out of both halves.
    ///
    /// Unlike a data page split the promoted key does not remain in either
    /// half: separators are routing entries, not record keys.
    pub(crate) fn split(&mut self, min_capacity: i32) -> (IndexPage<K>, K) {
        let split_pos = min_capacity as usize;
        let mut right = IndexPage::new(self.capacity, self.points_to_leaf);
        right.keys = self.keys.split_off(split_pos + 1);
        right.children = self.children.split_off(split_pos + 1);
        let promoted = self.keys.pop().expect("split point is within bounds");
        (right, promoted)
    }

    /// Absorb the right sibling through the key that separated the two.
    pub(crate) fn merge(&mut self, right: IndexPage<K>, separator: K) {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children);
    }

    /// Drop the separator and child slot made redundant by a child merge:
    /// `keys[key_pos]` and `children[key_pos + 1]`.
    pub(crate) fn reallocate_references_after_merge(&mut self, key_pos: usize) {
        self.keys.remove(key_pos);
        self.children.remove(key_pos + 1);
    }
}
