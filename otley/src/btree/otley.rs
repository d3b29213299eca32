//! B+Tree index implementation
//!
//! This is the main data structure exposed by the library.
//!

use std::io::ErrorKind;

use anyhow::Result;
use strum::EnumString;
use thiserror::Error;
use tokio::sync::Mutex;

use super::page::encoded_size_of;
use super::page::DataPage;
use super::page::IndexPage;
use super::page::OtleyKey;
use super::page::OtleyRecord;
use super::page::PageKind;
use super::page::INITIAL_PAGE;
use super::page::NULL_PAGE;
use super::property::Property;
use super::property::RootKind;
use crate::io::file::IndexFile;

/// When scanning the leaf chain serially, ascending or descending order.
#[derive(Clone, Copy, Debug, EnumString, PartialEq)]
#[strum(ascii_case_insensitive)]
pub enum Direction {
    /// Process in ascending key order.
    Ascending,
    /// Process in descending key order.
    Descending,
}

/// Key extraction strategy, captured once at construction.
type KeyOf<K, R> = Box<dyn Fn(&R) -> K + Send + Sync>;

/// Strict greater-than ordering strategy, captured once at construction.
type GreaterThan<K> = Box<dyn Fn(&K, &K) -> bool + Send + Sync>;

/// Otley specific errors.
#[derive(Error, Debug)]
pub enum OtleyError {
    /// A point lookup found no such key, or the tree is empty.
    #[error("key not found")]
    KeyNotFound,

    /// An insert would duplicate a key held by a unique index.
    #[error("repeated key")]
    RepeatedKey,

    /// The index directory could not be created.
    #[error("could not create directory: {0}")]
    CreateDirectory(String),

    /// The metadata or index file could not be created.
    #[error("could not create file: {0}")]
    CreateFile(String),
}

/// A disk-backed B+Tree index over fixed-size records.
pub struct Otley<K, R> {
    pub(crate) property: Mutex<Property>,
    key_of: KeyOf<K, R>,
    greater: GreaterThan<K>,
    key_size: usize,
    record_size: usize,
}

impl<K, R> Otley<K, R>
where
    K: OtleyKey + Send + Sync + 'static,
    R: OtleyRecord + Send + Sync + 'static,
{
    /// Open (or bootstrap) the tree described by `property`, indexing
    /// records by `key_of` under the key type's natural ordering.
    pub async fn try_new(
        property: Property,
        key_of: impl Fn(&R) -> K + Send + Sync + 'static,
    ) -> Result<Self>
    where
        K: Ord,
    {
        Self::try_new_with(property, key_of, |a: &K, b: &K| a > b).await
    }

    /// Open (or bootstrap) the tree described by `property`, ordering keys
    /// by the strict greater-than predicate `greater`.
    ///
    /// If the metadata file already exists it wins: the persisted document
    /// is loaded and the capacities and uniqueness flag in `property` are
    /// ignored. Otherwise the index directory is created (recursively)
    /// along with the metadata and index files.
    pub async fn try_new_with(
        property: Property,
        key_of: impl Fn(&R) -> K + Send + Sync + 'static,
        greater: impl Fn(&K, &K) -> bool + Send + Sync + 'static,
    ) -> Result<Self> {
        let key_size = encoded_size_of::<K>()?;
        let record_size = encoded_size_of::<R>()?;

        let property = match Property::load(&property.metadata_full_path).await {
            Ok(existing) => {
                tracing::info!("Opening B+Tree at: {}", existing.directory_path.display());
                existing
            }
            Err(err) => {
                // Only a missing metadata file means "bootstrap a new tree";
                // anything else is a real failure.
                match err.downcast_ref::<std::io::Error>() {
                    Some(io_error) if io_error.kind() == ErrorKind::NotFound => {
                        tracing::info!("Creating B+Tree at: {}", property.directory_path.display());
                        Self::create_index(property).await?
                    }
                    _ => return Err(err),
                }
            }
        };

        Ok(Self {
            property: Mutex::new(property),
            key_of: Box::new(key_of),
            greater: Box::new(greater),
            key_size,
            record_size,
        })
    }

    /// All records with `lower <= key`, ascending to the end of the chain.
    pub async fn above(&self, lower: &K) -> Result<Vec<R>> {
        let property = self.property.lock().await;
        if property.root_kind == RootKind::Empty {
            return Ok(Vec::new());
        }
        let mut file = IndexFile::open_read(&property.index_full_path).await?;
        let mut seek = self.locate_data_page(&mut file, &property, lower).await?;

        let mut located = Vec::new();
        while seek != NULL_PAGE {
            let page = self.read_data_page(&mut file, &property, seek).await?;
            for record in &page.records {
                let record_key = self.key(record);
                if self.gt(lower, &record_key) {
                    continue;
                }
                located.push(record.clone());
            }
            seek = page.next_leaf;
        }
        Ok(located)
    }

    /// All records with `key <= upper`, ascending from the first leaf.
    pub async fn below(&self, upper: &K) -> Result<Vec<R>> {
        let property = self.property.lock().await;
        if property.root_kind == RootKind::Empty {
            return Ok(Vec::new());
        }
        let mut file = IndexFile::open_read(&property.index_full_path).await?;
        let mut seek = self
            .locate_edge_data_page(&mut file, &property, Direction::Ascending)
            .await?;

        let mut located = Vec::new();
        while seek != NULL_PAGE {
            let page = self.read_data_page(&mut file, &property, seek).await?;
            for record in &page.records {
                let record_key = self.key(record);
                if self.gt(&record_key, upper) {
                    return Ok(located);
                }
                located.push(record.clone());
            }
            seek = page.next_leaf;
        }
        Ok(located)
    }

    /// All records with `lower <= key <= upper`, ascending.
    pub async fn between(&self, lower: &K, upper: &K) -> Result<Vec<R>> {
        let property = self.property.lock().await;
        if property.root_kind == RootKind::Empty {
            return Ok(Vec::new());
        }
        let mut file = IndexFile::open_read(&property.index_full_path).await?;
        let mut seek = self.locate_data_page(&mut file, &property, lower).await?;

        let mut located = Vec::new();
        while seek != NULL_PAGE {
            let page = self.read_data_page(&mut file, &property, seek).await?;
            for record in &page.records {
                let record_key = self.key(record);
                if self.gt(lower, &record_key) {
                    continue;
                }
                if self.gt(&record_key, upper) {
                    return Ok(located);
                }
                located.push(record.clone());
            }
            seek = page.next_leaf;
        }
        Ok(located)
    }

    /// Does the tree contain this key?
    pub async fn contains(&self, key: &K) -> bool {
        self.search(key).await.is_ok()
    }

    /// Return count of records.
    pub async fn count(&self) -> Result<usize> {
        let property = self.property.lock().await;
        if property.root_kind == RootKind::Empty {
            return Ok(0);
        }
        let mut file = IndexFile::open_read(&property.index_full_path).await?;
        let mut seek = self
            .locate_edge_data_page(&mut file, &property, Direction::Ascending)
            .await?;

        let mut count = 0;
        while seek != NULL_PAGE {
            let page = self.read_data_page(&mut file, &property, seek).await?;
            count += page.records.len();
            seek = page.next_leaf;
        }
        Ok(count)
    }

    /// Log basic information about our B+Tree.
    pub async fn info(&self) {
        let property = self.property.lock().await;
        tracing::info!(
            path = %property.directory_path.display(),
            index_capacity = property.max_index_capacity,
            data_capacity = property.max_data_capacity,
            unique = property.unique_key,
            root = ?property.root_kind,
            "B+Tree"
        );
    }

    /// Insert a record.
    pub async fn insert(&self, record: R) -> Result<()> {
        let mut property = self.property.lock().await;
        let key = self.key(&record);
        tracing::debug!(?record, "inserting");

        // The first record of all creates the first data page.
        if property.root_kind == RootKind::Empty {
            let mut first = DataPage::new(property.max_data_capacity);
            first.sorted_insert(record, |r| self.key(r), |a, b| self.gt(a, b))?;
            let mut file = IndexFile::open_write(&property.index_full_path).await?;
            self.write_data_page(&mut file, &property, INITIAL_PAGE, &first)
                .await?;
            property.seek_root = INITIAL_PAGE;
            property.root_kind = RootKind::Data;
            property.save().await?;
            return Ok(());
        }

        let mut file = IndexFile::open_write(&property.index_full_path).await?;

        // Descend to the target leaf, recording the path for bottom-up
        // split propagation.
        let mut path: Vec<(i64, IndexPage<K>, usize)> = Vec::new();
        let mut seek = property.seek_root;
        if property.root_kind == RootKind::Index {
            loop {
                let page = self.read_index_page(&mut file, &property, seek).await?;
                let pos = page.child_index(&key, |a, b| self.gt(a, b));
                let child = page.children[pos];
                let leaf_next = page.points_to_leaf;
                path.push((seek, page, pos));
                seek = child;
                if leaf_next {
                    break;
                }
            }
        }

        let mut leaf = self.read_data_page(&mut file, &property, seek).await?;
        if property.unique_key
            && leaf
                .records
                .iter()
                .any(|r| self.keys_equal(&self.key(r), &key))
        {
            return Err(OtleyError::RepeatedKey.into());
        }
        leaf.sorted_insert(record, |r| self.key(r), |a, b| self.gt(a, b))?;
        self.write_data_page(&mut file, &property, seek, &leaf).await?;

        // A page which has just reached capacity splits immediately; the
        // separator/new-page pair then bubbles up the recorded path.
        let mut promoted = None;
        if leaf.num_records() == property.max_data_capacity {
            promoted = Some(self.split_data_page(&mut file, &property, seek, leaf).await?);
        }

        while let Some((page_seek, mut page, pos)) = path.pop() {
            match promoted.take() {
                Some((separator, new_seek)) => {
                    page.reallocate_references_after_split(pos, separator, new_seek)?;
                    if page.num_keys() == property.max_index_capacity {
                        let (right, mid) = page.split(property.min_index_capacity);
                        let right_seek =
                            self.append_index_page(&mut file, &property, &right).await?;
                        self.write_index_page(&mut file, &property, page_seek, &page)
                            .await?;
                        tracing::debug!(left = page_seek, right = right_seek, "split index page");
                        promoted = Some((mid, right_seek));
                    } else {
                        self.write_index_page(&mut file, &property, page_seek, &page)
                            .await?;
                    }
                }
                None => break,
            }
        }

        // A promotion which survives the whole path means the root itself
        // split. Allocating the replacement is the only way height grows.
        if let Some((separator, new_seek)) = promoted {
            let mut root = IndexPage::new(
                property.max_index_capacity,
                property.root_kind == RootKind::Data,
            );
            root.keys.push(separator);
            root.children.push(property.seek_root);
            root.children.push(new_seek);
            let root_seek = self.append_index_page(&mut file, &property, &root).await?;
            tracing::debug!(seek = root_seek, "allocated new root");
            property.seek_root = root_seek;
            property.root_kind = RootKind::Index;
        }

        property.save().await?;
        Ok(())
    }

    /// Remove the first record matching `key`.
    pub async fn remove(&self, key: &K) -> Result<()> {
        let mut property = self.property.lock().await;
        tracing::debug!(?key, "removing");
        if property.root_kind == RootKind::Empty {
            return Err(OtleyError::KeyNotFound.into());
        }
        let mut file = IndexFile::open_write(&property.index_full_path).await?;

        // Descend to the target leaf, recording the path for bottom-up
        // rebalancing.
        let mut path: Vec<(i64, IndexPage<K>, usize)> = Vec::new();
        let mut seek = property.seek_root;
        if property.root_kind == RootKind::Index {
            loop {
                let page = self.read_index_page(&mut file, &property, seek).await?;
                let pos = page.child_index(key, |a, b| self.gt(a, b));
                let child = page.children[pos];
                let leaf_next = page.points_to_leaf;
                path.push((seek, page, pos));
                seek = child;
                if leaf_next {
                    break;
                }
            }
        }

        let mut leaf = self.read_data_page(&mut file, &property, seek).await?;
        let Some(new_max) = leaf.remove(key, |r| self.key(r), |a, b| self.gt(a, b)) else {
            return Err(OtleyError::KeyNotFound.into());
        };
        self.write_data_page(&mut file, &property, seek, &leaf).await?;

        // The removed key may have served as an ancestor separator; its
        // replacement bubbles up alongside the underflow state.
        let mut predecessor = new_max;
        let mut child_size = leaf.num_records();
        let mut child_kind = PageKind::Data;
        let mut root_page = None;

        while let Some((page_seek, mut page, pos)) = path.pop() {
            if let Some(pred) = &predecessor {
                if pos < page.keys.len() && self.keys_equal(&page.keys[pos], key) {
                    page.keys[pos] = pred.clone();
                }
            }
            let min_capacity = match child_kind {
                PageKind::Data => property.min_data_capacity,
                PageKind::Index => property.min_index_capacity,
            };
            if child_size < min_capacity {
                self.rebalance_child(&mut file, &property, &mut page, pos, child_kind)
                    .await?;
            }
            self.write_index_page(&mut file, &property, page_seek, &page)
                .await?;
            child_size = page.num_keys();
            child_kind = PageKind::Index;
            if path.is_empty() {
                root_page = Some(page);
            }
        }

        // Root transitions: an index root left with no keys collapses onto
        // its single child; a data root left with no records empties the
        // tree.
        match property.root_kind {
            RootKind::Data => {
                if leaf.num_records() == 0 {
                    property.seek_root = NULL_PAGE;
                    property.root_kind = RootKind::Empty;
                    tracing::debug!("tree is now empty");
                }
            }
            RootKind::Index => {
                if let Some(root) = root_page {
                    if root.num_keys() == 0 {
                        property.seek_root = root.children[0];
                        property.root_kind = if root.points_to_leaf {
                            RootKind::Data
                        } else {
                            RootKind::Index
                        };
                        tracing::debug!(
                            seek = property.seek_root,
                            "root collapsed onto its single child"
                        );
                    }
                }
            }
            RootKind::Empty => {}
        }

        property.save().await?;
        Ok(())
    }

    /// All records whose key equals `key`.
    ///
    /// Equal keys may run across sibling leaves when uniqueness is off, so
    /// the scan follows the chain until a strictly greater key appears.
    pub async fn search(&self, key: &K) -> Result<Vec<R>> {
        let property = self.property.lock().await;
        if property.root_kind == RootKind::Empty {
            return Err(OtleyError::KeyNotFound.into());
        }
        let mut file = IndexFile::open_read(&property.index_full_path).await?;
        let mut seek = self.locate_data_page(&mut file, &property, key).await?;

        let mut located = Vec::new();
        while seek != NULL_PAGE {
            let page = self.read_data_page(&mut file, &property, seek).await?;
            for record in &page.records {
                let record_key = self.key(record);
                if self.gt(key, &record_key) {
                    continue;
                }
                if self.gt(&record_key, key) {
                    if located.is_empty() {
                        return Err(OtleyError::KeyNotFound.into());
                    }
                    return Ok(located);
                }
                located.push(record.clone());
            }
            seek = page.next_leaf;
        }
        if located.is_empty() {
            return Err(OtleyError::KeyNotFound.into());
        }
        Ok(located)
    }

    /// Walk the leaf chain checking the ordering invariants.
    pub async fn verify(&self) -> Result<()> {
        let property = self.property.lock().await;
        if property.root_kind == RootKind::Empty {
            return Ok(());
        }
        let mut file = IndexFile::open_read(&property.index_full_path).await?;
        let mut seek = self
            .locate_edge_data_page(&mut file, &property, Direction::Ascending)
            .await?;

        let mut previous_seek = NULL_PAGE;
        let mut previous_key: Option<K> = None;
        while seek != NULL_PAGE {
            let page = self.read_data_page(&mut file, &property, seek).await?;
            anyhow::ensure!(
                page.prev_leaf == previous_seek,
                "leaf at {} has a broken prev link",
                seek
            );
            for record in &page.records {
                let key = self.key(record);
                if let Some(previous) = &previous_key {
                    if property.unique_key {
                        anyhow::ensure!(
                            self.gt(&key, previous),
                            "leaf chain keys out of order at {}",
                            seek
                        );
                    } else {
                        anyhow::ensure!(
                            !self.gt(previous, &key),
                            "leaf chain keys out of order at {}",
                            seek
                        );
                    }
                }
                previous_key = Some(key);
            }
            previous_seek = seek;
            seek = page.next_leaf;
        }
        Ok(())
    }

    /// Create the index directory and both files for a brand new tree.
    async fn create_index(property: Property) -> Result<Property> {
        tokio::fs::create_dir_all(&property.directory_path)
            .await
            .map_err(|e| OtleyError::CreateDirectory(e.to_string()))?;
        property
            .save()
            .await
            .map_err(|e| OtleyError::CreateFile(e.to_string()))?;
        tokio::fs::File::create(&property.index_full_path)
            .await
            .map_err(|e| OtleyError::CreateFile(e.to_string()))?;
        Ok(property)
    }

    fn gt(&self, a: &K, b: &K) -> bool {
        (self.greater)(a, b)
    }

    fn keys_equal(&self, a: &K, b: &K) -> bool {
        !self.gt(a, b) && !self.gt(b, a)
    }

    pub(crate) fn key(&self, record: &R) -> K {
        (self.key_of)(record)
    }

    fn index_page_bytes(&self, property: &Property) -> usize {
        IndexPage::<K>::size_of(property.max_index_capacity, self.key_size)
    }

    fn data_page_bytes(&self, property: &Property) -> usize {
        DataPage::<R>::size_of(property.max_data_capacity, self.record_size)
    }

    async fn read_index_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        seek: i64,
    ) -> Result<IndexPage<K>> {
        let bytes = file.read_page(seek, self.index_page_bytes(property)).await?;
        IndexPage::deserialize(&bytes)
    }

    pub(crate) async fn read_data_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        seek: i64,
    ) -> Result<DataPage<R>> {
        let bytes = file.read_page(seek, self.data_page_bytes(property)).await?;
        DataPage::deserialize(&bytes)
    }

    async fn write_index_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        seek: i64,
        page: &IndexPage<K>,
    ) -> Result<()> {
        let bytes = page.serialize()?;
        let expected = self.index_page_bytes(property);
        anyhow::ensure!(
            bytes.len() == expected,
            "index page image is {} bytes, expected {}: the key encoding must be fixed-size",
            bytes.len(),
            expected
        );
        file.write_page(seek, &bytes).await
    }

    async fn write_data_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        seek: i64,
        page: &DataPage<R>,
    ) -> Result<()> {
        let bytes = page.serialize()?;
        let expected = self.data_page_bytes(property);
        anyhow::ensure!(
            bytes.len() == expected,
            "data page image is {} bytes, expected {}: the record encoding must be fixed-size",
            bytes.len(),
            expected
        );
        file.write_page(seek, &bytes).await
    }

    async fn append_index_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        page: &IndexPage<K>,
    ) -> Result<i64> {
        let bytes = page.serialize()?;
        let expected = self.index_page_bytes(property);
        anyhow::ensure!(
            bytes.len() == expected,
            "index page image is {} bytes, expected {}: the key encoding must be fixed-size",
            bytes.len(),
            expected
        );
        file.append_page(&bytes).await
    }

    async fn append_data_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        page: &DataPage<R>,
    ) -> Result<i64> {
        let bytes = page.serialize()?;
        let expected = self.data_page_bytes(property);
        anyhow::ensure!(
            bytes.len() == expected,
            "data page image is {} bytes, expected {}: the record encoding must be fixed-size",
            bytes.len(),
            expected
        );
        file.append_page(&bytes).await
    }

    /// Seek position of the first data page which may contain `key`.
    async fn locate_data_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        key: &K,
    ) -> Result<i64> {
        match property.root_kind {
            RootKind::Empty => Err(OtleyError::KeyNotFound.into()),
            RootKind::Data => Ok(property.seek_root),
            RootKind::Index => {
                let mut seek = property.seek_root;
                loop {
                    let page = self.read_index_page(file, property, seek).await?;
                    let pos = page.child_index(key, |a, b| self.gt(a, b));
                    seek = page.children[pos];
                    if page.points_to_leaf {
                        return Ok(seek);
                    }
                }
            }
        }
    }

    /// Seek position of the leftmost (Ascending) or rightmost (Descending)
    /// data page.
    pub(crate) async fn locate_edge_data_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        direction: Direction,
    ) -> Result<i64> {
        match property.root_kind {
            RootKind::Empty => Err(OtleyError::KeyNotFound.into()),
            RootKind::Data => Ok(property.seek_root),
            RootKind::Index => {
                let mut seek = property.seek_root;
                loop {
                    let page = self.read_index_page(file, property, seek).await?;
                    seek = match direction {
                        Direction::Ascending => page.children[0],
                        Direction::Descending => {
                            *page.children.last().expect("index pages have children")
                        }
                    };
                    if page.points_to_leaf {
                        return Ok(seek);
                    }
                }
            }
        }
    }

    /// Split a just-filled leaf, append the right half and relink the
    /// chain, returning the separator and the new page's seek position.
    async fn split_data_page(
        &self,
        file: &mut IndexFile,
        property: &Property,
        seek: i64,
        mut leaf: DataPage<R>,
    ) -> Result<(K, i64)> {
        let (mut right, separator) = leaf.split(property.min_data_capacity, |r| self.key(r))?;
        right.prev_leaf = seek;
        right.next_leaf = leaf.next_leaf;
        let right_seek = self.append_data_page(file, property, &right).await?;
        leaf.next_leaf = right_seek;
        self.write_data_page(file, property, seek, &leaf).await?;
        // The old successor must point back at the new page, or the
        // descending chain diverges from the ascending one.
        if right.next_leaf != NULL_PAGE {
            let mut successor = self.read_data_page(file, property, right.next_leaf).await?;
            successor.prev_leaf = right_seek;
            self.write_data_page(file, property, right.next_leaf, &successor)
                .await?;
        }
        tracing::debug!(left = seek, right = right_seek, "split data page");
        Ok((separator, right_seek))
    }

    /// Restore the minimum-occupancy invariant for `parent.children[pos]`:
    /// borrow from a sibling with an entry to spare (left first), otherwise
    /// merge (into the left sibling when one exists).
    async fn rebalance_child(
        &self,
        file: &mut IndexFile,
        property: &Property,
        parent: &mut IndexPage<K>,
        pos: usize,
        kind: PageKind,
    ) -> Result<()> {
        match kind {
            PageKind::Data => self.rebalance_data_child(file, property, parent, pos).await,
            PageKind::Index => self.rebalance_index_child(file, property, parent, pos).await,
        }
    }

    async fn rebalance_data_child(
        &self,
        file: &mut IndexFile,
        property: &Property,
        parent: &mut IndexPage<K>,
        pos: usize,
    ) -> Result<()> {
        let child_seek = parent.children[pos];
        let mut child = self.read_data_page(file, property, child_seek).await?;

        if pos > 0 {
            let left_seek = parent.children[pos - 1];
            let mut left = self.read_data_page(file, property, left_seek).await?;
            if left.num_records() > property.min_data_capacity {
                let record = left.records.pop().expect("sibling above minimum has records");
                child.records.insert(0, record);
                parent.keys[pos - 1] = self.key(left.max_record()?);
                self.write_data_page(file, property, left_seek, &left).await?;
                self.write_data_page(file, property, child_seek, &child).await?;
                tracing::debug!(from = left_seek, to = child_seek, "borrowed record from left");
                return Ok(());
            }
        }

        if pos < parent.keys.len() {
            let right_seek = parent.children[pos + 1];
            let mut right = self.read_data_page(file, property, right_seek).await?;
            if right.num_records() > property.min_data_capacity {
                let record = right.records.remove(0);
                child.records.push(record);
                parent.keys[pos] = self.key(child.max_record()?);
                self.write_data_page(file, property, right_seek, &right).await?;
                self.write_data_page(file, property, child_seek, &child).await?;
                tracing::debug!(from = right_seek, to = child_seek, "borrowed record from right");
                return Ok(());
            }
        }

        // No spare entries anywhere: merge. The absorbed page is abandoned,
        // not reclaimed.
        if pos > 0 {
            let left_seek = parent.children[pos - 1];
            let mut left = self.read_data_page(file, property, left_seek).await?;
            left.merge(child);
            self.relink_after_merge(file, property, left_seek, &left).await?;
            self.write_data_page(file, property, left_seek, &left).await?;
            parent.reallocate_references_after_merge(pos - 1);
            tracing::debug!(left = left_seek, right = child_seek, "merged data page into left");
        } else {
            let right_seek = parent.children[pos + 1];
            let right = self.read_data_page(file, property, right_seek).await?;
            child.merge(right);
            self.relink_after_merge(file, property, child_seek, &child).await?;
            self.write_data_page(file, property, child_seek, &child).await?;
            parent.reallocate_references_after_merge(pos);
            tracing::debug!(left = child_seek, right = right_seek, "absorbed right data page");
        }
        Ok(())
    }

    async fn rebalance_index_child(
        &self,
        file: &mut IndexFile,
        property: &Property,
        parent: &mut IndexPage<K>,
        pos: usize,
    ) -> Result<()> {
        let child_seek = parent.children[pos];
        let mut child = self.read_index_page(file, property, child_seek).await?;

        if pos > 0 {
            let left_seek = parent.children[pos - 1];
            let mut left = self.read_index_page(file, property, left_seek).await?;
            if left.num_keys() > property.min_index_capacity {
                // The separator rotates: the parent key drops into the
                // child, the left sibling's last key replaces it.
                let moved_child = left.children.pop().expect("index pages have children");
                let moved_key = left.keys.pop().expect("sibling above minimum has keys");
                child.keys.insert(0, parent.keys[pos - 1].clone());
                child.children.insert(0, moved_child);
                parent.keys[pos - 1] = moved_key;
                self.write_index_page(file, property, left_seek, &left).await?;
                self.write_index_page(file, property, child_seek, &child).await?;
                tracing::debug!(from = left_seek, to = child_seek, "borrowed key from left");
                return Ok(());
            }
        }

        if pos < parent.keys.len() {
            let right_seek = parent.children[pos + 1];
            let mut right = self.read_index_page(file, property, right_seek).await?;
            if right.num_keys() > property.min_index_capacity {
                let moved_child = right.children.remove(0);
                let moved_key = right.keys.remove(0);
                child.keys.push(parent.keys[pos].clone());
                child.children.push(moved_child);
                parent.keys[pos] = moved_key;
                self.write_index_page(file, property, right_seek, &right).await?;
                self.write_index_page(file, property, child_seek, &child).await?;
                tracing::debug!(from = right_seek, to = child_seek, "borrowed key from right");
                return Ok(());
            }
        }

        if pos > 0 {
            let left_seek = parent.children[pos - 1];
            let mut left = self.read_index_page(file, property, left_seek).await?;
            left.merge(child, parent.keys[pos - 1].clone());
            self.write_index_page(file, property, left_seek, &left).await?;
            parent.reallocate_references_after_merge(pos - 1);
            tracing::debug!(left = left_seek, right = child_seek, "merged index page into left");
        } else {
            let right_seek = parent.children[pos + 1];
            let right = self.read_index_page(file, property, right_seek).await?;
            child.merge(right, parent.keys[pos].clone());
            self.write_index_page(file, property, child_seek, &child).await?;
            parent.reallocate_references_after_merge(pos);
            tracing::debug!(left = child_seek, right = right_seek, "absorbed right index page");
        }
        Ok(())
    }

    /// After a merge the surviving page's new successor must point back at
    /// it, keeping the descending chain the exact inverse of the ascending
    /// one.
    async fn relink_after_merge(
        &self,
        file: &mut IndexFile,
        property: &Property,
        survivor_seek: i64,
        survivor: &DataPage<R>,
    ) -> Result<()> {
        if survivor.next_leaf != NULL_PAGE {
            let mut successor = self.read_data_page(file, property, survivor.next_leaf).await?;
            successor.prev_leaf = survivor_seek;
            self.write_data_page(file, property, survivor.next_leaf, &successor)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
