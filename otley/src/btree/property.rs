//! Tree metadata
//!
//! A small persisted key/value document describing one tree instance: file
//! locations, page capacities and their derived minimums, the uniqueness
//! flag, and where (and what) the root currently is. It is loaded once when
//! a tree is opened and rewritten at the end of every mutating operation.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::page::NULL_PAGE;

/// Property specific errors.
#[derive(Error, Debug)]
pub enum PropertyError {
    /// A persisted root kind code outside {-1, 0, 1}.
    #[error("unknown root kind code: {0}")]
    UnknownRootCode(i64),

    /// A page capacity too small to keep split halves above their minimum.
    #[error("page capacity: {0} must be >= 3")]
    CapacityTooSmall(i32),
}

/// What the persisted root seek position points at.
///
/// Persisted as an integer code: `-1` empty, `0` index page, `1` data page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum RootKind {
    /// The tree holds no records.
    Empty,
    /// The root is an index page.
    Index,
    /// The whole tree fits in a single data page.
    Data,
}

impl From<RootKind> for i64 {
    fn from(kind: RootKind) -> i64 {
        match kind {
            RootKind::Empty => -1,
            RootKind::Index => 0,
            RootKind::Data => 1,
        }
    }
}

impl TryFrom<i64> for RootKind {
    type Error = PropertyError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(RootKind::Empty),
            0 => Ok(RootKind::Index),
            1 => Ok(RootKind::Data),
            other => Err(PropertyError::UnknownRootCode(other)),
        }
    }
}

/// Bootstrap configuration and persisted metadata for one tree instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Property {
    pub(crate) directory_path: PathBuf,
    pub(crate) index_full_path: PathBuf,
    pub(crate) metadata_full_path: PathBuf,
    pub(crate) max_index_capacity: i32,
    pub(crate) min_index_capacity: i32,
    pub(crate) max_data_capacity: i32,
    pub(crate) min_data_capacity: i32,
    pub(crate) unique_key: bool,
    pub(crate) seek_root: i64,
    pub(crate) root_kind: RootKind,
}

impl Property {
    /// Describe a tree rooted under `directory_path`.
    ///
    /// The minimum capacities are derived as `ceil(max / 2) - 1`; below a
    /// maximum of 3 a split could not leave both halves at or above that
    /// minimum.
    pub fn new(
        directory_path: impl AsRef<Path>,
        metadata_file_name: &str,
        index_file_name: &str,
        index_page_capacity: i32,
        data_page_capacity: i32,
        unique_key: bool,
    ) -> Result<Self, PropertyError> {
        if index_page_capacity < 3 {
            return Err(PropertyError::CapacityTooSmall(index_page_capacity));
        }
        if data_page_capacity < 3 {
            return Err(PropertyError::CapacityTooSmall(data_page_capacity));
        }
        let directory_path = directory_path.as_ref().to_path_buf();
        Ok(Self {
            index_full_path: directory_path.join(index_file_name),
            metadata_full_path: directory_path.join(metadata_file_name),
            directory_path,
            max_index_capacity: index_page_capacity,
            min_index_capacity: (index_page_capacity + 1) / 2 - 1,
            max_data_capacity: data_page_capacity,
            min_data_capacity: (data_page_capacity + 1) / 2 - 1,
            unique_key,
            seek_root: NULL_PAGE,
            root_kind: RootKind::Empty,
        })
    }

    /// Load the persisted metadata document.
    pub(crate) async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Rewrite the persisted metadata document.
    pub(crate) async fn save(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&self.metadata_full_path, bytes).await?;
        Ok(())
    }
}
