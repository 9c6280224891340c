//! Batch writer: dedup, chunking and failure aggregation

use crate::error::{BatchError, ChunkFailure};
use crate::kv::{KvStore, PrimaryKey, WriteRequest};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Collapse operations sharing a primary key.
///
/// The last operation in input order wins and keeps the position of the
/// first occurrence.
pub(crate) fn dedupe(requests: impl IntoIterator<Item = (PrimaryKey, WriteRequest)>) -> Vec<WriteRequest> {
    let mut seen: IndexMap<PrimaryKey, WriteRequest> = IndexMap::new();
    for (key, request) in requests {
        seen.insert(key, request);
    }
    seen.into_values().collect()
}

/// Submits write operations in chunks of at most `chunk_size`
pub(crate) struct BatchWriter<'a, S: KvStore + ?Sized> {
    client: &'a S,
    table: &'a str,
    chunk_size: usize,
}

impl<'a, S: KvStore + ?Sized> BatchWriter<'a, S> {
    pub(crate) fn new(client: &'a S, table: &'a str, chunk_size: usize) -> Self {
        BatchWriter {
            client,
            table,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Submit every chunk in order. A failed chunk does not stop the rest;
    /// all failures come back in one [`BatchError`].
    pub(crate) async fn submit(
        &self,
        operation: &'static str,
        requests: Vec<WriteRequest>,
    ) -> Result<(), BatchError> {
        let total_chunks = requests.len().div_ceil(self.chunk_size);
        let mut failures = Vec::new();
        let mut remaining = requests.into_iter();

        for index in 0..total_chunks {
            let chunk: Vec<WriteRequest> = remaining.by_ref().take(self.chunk_size).collect();
            let operations = chunk.len();
            match self.client.batch_write(self.table, chunk).await {
                Ok(()) => debug!(
                    "{}: chunk {}/{} ({} operations) applied to {}",
                    operation,
                    index + 1,
                    total_chunks,
                    operations,
                    self.table
                ),
                Err(source) => {
                    warn!(
                        "{}: chunk {}/{} ({} operations) failed on {}: {}",
                        operation,
                        index + 1,
                        total_chunks,
                        operations,
                        self.table,
                        source
                    );
                    failures.push(ChunkFailure {
                        index,
                        operations,
                        source,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchError {
                operation,
                total_chunks,
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delete(partition: &str, sort: &str) -> (PrimaryKey, WriteRequest) {
        let key = PrimaryKey::new(partition, sort);
        (key.clone(), WriteRequest::Delete(key))
    }

    #[test]
    fn test_dedupe_last_wins_first_position() {
        let mut a1 = crate::kv::Item::new();
        a1.insert("v".to_string(), 1i64.into());
        let mut a2 = a1.clone();
        a2.insert("v".to_string(), 2i64.into());
        let key_a = PrimaryKey::new("a", "x");

        let requests = vec![
            (key_a.clone(), WriteRequest::Put(a1)),
            delete("b", "x"),
            (key_a, WriteRequest::Put(a2.clone())),
        ];
        let deduped = dedupe(requests);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0], WriteRequest::Put(a2));
        assert_eq!(deduped[1], WriteRequest::Delete(PrimaryKey::new("b", "x")));
    }

    #[test]
    fn test_dedupe_distinct_keys_kept_in_order() {
        let deduped = dedupe(vec![delete("a", "1"), delete("a", "2"), delete("b", "1")]);
        let keys: Vec<_> = deduped
            .iter()
            .map(|r| match r {
                WriteRequest::Delete(k) => k.to_string(),
                WriteRequest::Put(_) => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec!["a|1", "a|2", "b|1"]);
    }
}
