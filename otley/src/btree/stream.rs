//! Leaf chain streams
//!
//! The leaf chain already holds every record in key order, so streaming is
//! a matter of walking `next_leaf` (or `prev_leaf`) links; no descent is
//! repeated after the first. Each stream owns its own scoped file handle.

use futures::stream;
use futures::Stream;
use futures::StreamExt;

use super::otley::Direction;
use super::otley::Otley;
use super::page::DataPage;
use super::page::OtleyKey;
use super::page::OtleyRecord;
use super::page::NULL_PAGE;
use super::property::RootKind;
use crate::io::file::IndexFile;

/// An open file handle, the loaded page and the scan position within it.
type LeafCursor<R> = Option<(IndexFile, DataPage<R>, usize)>;

impl<K, R> Otley<K, R>
where
    K: OtleyKey + Send + Sync + 'static,
    R: OtleyRecord + Send + Sync + 'static,
{
    /// Return a stream of records in leaf-chain order.
    pub async fn records(&self, direction: Direction) -> impl Stream<Item = R> + '_ {
        let seed = self.seed_leaf(direction).await;

        // Each page holds a number of records, so we drain the current page
        // before following the chain. (i.e.: a loop within a loop)
        Box::pin(stream::unfold(seed, move |mut cursor| async move {
            loop {
                let record = {
                    let (_, page, index) = cursor.as_mut()?;
                    let found = match direction {
                        Direction::Ascending => page.records.get(*index),
                        Direction::Descending => page.records.iter().rev().nth(*index),
                    }
                    .cloned();
                    if found.is_some() {
                        *index += 1;
                    }
                    found
                };
                match record {
                    Some(record) => break Some((record, cursor)),
                    None => cursor = self.advance_leaf(cursor, direction).await,
                }
            }
        }))
    }

    /// Return a stream of keys in leaf-chain order.
    pub async fn keys(&self, direction: Direction) -> impl Stream<Item = K> + '_ {
        let records = self.records(direction).await;
        records.map(move |record| self.key(&record))
    }

    async fn seed_leaf(&self, direction: Direction) -> LeafCursor<R> {
        let property = self.property.lock().await;
        if property.root_kind == RootKind::Empty {
            return None;
        }
        let mut file = IndexFile::open_read(&property.index_full_path).await.ok()?;
        let seek = self
            .locate_edge_data_page(&mut file, &property, direction)
            .await
            .ok()?;
        let page = self.read_data_page(&mut file, &property, seek).await.ok()?;
        Some((file, page, 0))
    }

    async fn advance_leaf(&self, cursor: LeafCursor<R>, direction: Direction) -> LeafCursor<R> {
        let (mut file, page, _) = cursor?;
        let next = match direction {
            Direction::Ascending => page.next_leaf,
            Direction::Descending => page.prev_leaf,
        };
        if next == NULL_PAGE {
            return None;
        }
        let property = self.property.lock().await;
        let page = self.read_data_page(&mut file, &property, next).await.ok()?;
        Some((file, page, 0))
    }
}
