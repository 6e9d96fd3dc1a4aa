use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    BackendKind, ChunkRecord, ListOptions, ScoredRecord, StoreStats, VectorStore,
    sanitize_identifier,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{ChronicleError, Result};
use crate::memory::types::ChunkBehavior;

const TABLE_PREFIX: &str = "chunks_";
const DISTANCE_COLUMN: &str = "_distance";

/// LanceDB-backed store, one table per collection.
///
/// Tables are created on first insert with the embedding width of that
/// batch. Behavior, scene code, section and entity key are promoted to
/// columns so list filters run as SQL predicates.
pub struct LanceStore {
    connection: Connection,
    embedder: Arc<dyn EmbeddingProvider>,
    tables: DashMap<String, Table>,
}

impl LanceStore {
    pub async fn connect(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| ChronicleError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        Ok(Self {
            connection,
            embedder,
            tables: DashMap::new(),
        })
    }

    pub fn table_name(collection_id: &str) -> String {
        format!("{TABLE_PREFIX}{}", sanitize_identifier(collection_id))
    }

    fn chunks_schema(dimension: i32) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("hash", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("idx", DataType::Int64, false),
            Field::new("behavior", DataType::Utf8, false),
            Field::new("scene_code", DataType::Utf8, true),
            Field::new("section_type", DataType::Utf8, true),
            Field::new("entity_key", DataType::Utf8, true),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ]))
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to list tables: {e}")))?;

        Ok(names.iter().any(|n| n == name))
    }

    /// Open the collection's table if it exists
    async fn open_table(&self, collection_id: &str) -> Result<Option<Table>> {
        if let Some(table) = self.tables.get(collection_id) {
            return Ok(Some(table.value().clone()));
        }

        let name = Self::table_name(collection_id);
        if !self.table_exists(&name).await? {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(&name)
            .execute()
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to open table {name}: {e}")))?;

        self.tables.insert(collection_id.to_string(), table.clone());
        Ok(Some(table))
    }

    /// Convert records and their embeddings to an Arrow RecordBatch
    fn records_to_batch(records: &[ChunkRecord], embeddings: Vec<Vec<f32>>) -> Result<RecordBatch> {
        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 || embeddings.iter().any(|e| e.len() != dimension) {
            return Err(ChronicleError::Storage(
                "Embeddings must share one non-zero dimension".to_string(),
            ));
        }
        let dimension = i32::try_from(dimension)
            .map_err(|_| ChronicleError::Storage("Embedding dimension too large".to_string()))?;

        let hashes: Vec<i64> = records.iter().map(|r| r.hash as i64).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let indices: Vec<i64> = records.iter().map(|r| r.index as i64).collect();
        let behaviors: Vec<&str> = records
            .iter()
            .map(|r| r.behavior().unwrap_or(ChunkBehavior::Legacy.as_str()))
            .collect();
        let scene_codes: Vec<Option<&str>> = records.iter().map(|r| r.scene_code()).collect();
        let section_types: Vec<Option<&str>> = records.iter().map(|r| r.section_type()).collect();
        let entity_keys: Vec<Option<&str>> = records.iter().map(|r| r.entity_key()).collect();
        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<std::result::Result<_, _>>()?;
        let metadata_refs: Vec<&str> = metadata.iter().map(String::as_str).collect();

        let vectors: Vec<Option<Vec<Option<f32>>>> = embeddings
            .into_iter()
            .map(|e| Some(e.into_iter().map(Some).collect()))
            .collect();

        RecordBatch::try_new(
            Self::chunks_schema(dimension),
            vec![
                Arc::new(Int64Array::from(hashes)),
                Arc::new(StringArray::from(texts)),
                Arc::new(Int64Array::from(indices)),
                Arc::new(StringArray::from(behaviors)),
                Arc::new(StringArray::from(scene_codes)),
                Arc::new(StringArray::from(section_types)),
                Arc::new(StringArray::from(entity_keys)),
                Arc::new(StringArray::from(metadata_refs)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(vectors, dimension)),
            ],
        )
        .map_err(|e| ChronicleError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert an Arrow RecordBatch row back to a ChunkRecord
    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<ChunkRecord> {
        let hash = int64_column(batch, "hash")?.value(row);
        let text = string_column(batch, "text")?.value(row).to_string();
        let index = int64_column(batch, "idx")?.value(row);
        let metadata: Map<String, Value> =
            serde_json::from_str(string_column(batch, "metadata")?.value(row))?;

        Ok(ChunkRecord {
            hash: hash as u64,
            text,
            index: index as u64,
            metadata,
        })
    }

    async fn collect_records(
        stream: impl futures::Stream<Item = lancedb::Result<RecordBatch>>,
    ) -> Result<Vec<RecordBatch>> {
        stream
            .try_collect()
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to collect query results: {e}")))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| ChronicleError::Storage(format!("Failed to get {name} column")))
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| ChronicleError::Storage(format!("Failed to get {name} column")))
}

fn hash_predicate(hashes: &[u64]) -> String {
    let list = hashes
        .iter()
        .map(|h| (*h as i64).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("hash IN ({list})")
}

#[async_trait]
impl VectorStore for LanceStore {
    fn backend(&self) -> BackendKind {
        BackendKind::LanceDb
    }

    async fn insert(&self, collection_id: &str, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let batch = Self::records_to_batch(records, embeddings)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table(collection_id).await? {
            Some(table) => {
                let hashes: Vec<u64> = records.iter().map(|r| r.hash).collect();
                table
                    .delete(&hash_predicate(&hashes))
                    .await
                    .map_err(|e| ChronicleError::Storage(format!("Failed to replace chunks: {e}")))?;
                table
                    .add(Box::new(batches))
                    .execute()
                    .await
                    .map_err(|e| ChronicleError::Storage(format!("Failed to insert chunks: {e}")))?;
            }
            None => {
                let name = Self::table_name(collection_id);
                let table = self
                    .connection
                    .create_table(&name, Box::new(batches))
                    .execute()
                    .await
                    .map_err(|e| {
                        ChronicleError::Storage(format!("Failed to create table {name}: {e}"))
                    })?;
                self.tables.insert(collection_id.to_string(), table);
            }
        }

        debug!("Inserted {} chunks into {}", records.len(), collection_id);
        Ok(())
    }

    async fn query(
        &self,
        collection_id: &str,
        text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredRecord>> {
        let Some(table) = self.open_table(collection_id).await? else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(text).await?;
        let stream = table
            .query()
            .nearest_to(embedding.as_slice())
            .map_err(|e| ChronicleError::Storage(format!("Failed to create vector query: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to execute search: {e}")))?;
        let batches = Self::collect_records(stream).await?;

        let mut results = Vec::new();
        for batch in &batches {
            let distances = batch
                .column_by_name(DISTANCE_COLUMN)
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| ChronicleError::Storage("Missing distance column".to_string()))?;
            for row in 0..batch.num_rows() {
                let score = 1.0 - distances.value(row);
                if score.is_nan() || score < threshold {
                    continue;
                }
                results.push(ScoredRecord {
                    record: Self::batch_to_record(batch, row)?,
                    score,
                });
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }

    async fn list(&self, collection_id: &str, options: &ListOptions) -> Result<Vec<ChunkRecord>> {
        let Some(table) = self.open_table(collection_id).await? else {
            return Ok(Vec::new());
        };
        let predicate = options.filter.as_ref().and_then(|f| f.to_sql_clause());

        let limit = match options.limit {
            Some(limit) => limit,
            None => table
                .count_rows(predicate.clone())
                .await
                .map_err(|e| ChronicleError::Storage(format!("Failed to count rows: {e}")))?,
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut query = table.query().offset(options.offset).limit(limit);
        if let Some(predicate) = predicate {
            query = query.only_if(predicate);
        }
        let stream = query
            .execute()
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to list chunks: {e}")))?;
        let batches = Self::collect_records(stream).await?;

        let mut records = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                records.push(Self::batch_to_record(batch, row)?);
            }
        }
        Ok(records)
    }

    async fn delete(&self, collection_id: &str, hashes: &[u64]) -> Result<usize> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let Some(table) = self.open_table(collection_id).await? else {
            return Ok(0);
        };

        let predicate = hash_predicate(hashes);
        let matching = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to count rows: {e}")))?;
        if matching > 0 {
            table
                .delete(&predicate)
                .await
                .map_err(|e| ChronicleError::Storage(format!("Failed to delete chunks: {e}")))?;
        }
        Ok(matching)
    }

    async fn purge(&self, collection_id: &str) -> Result<()> {
        let Some(table) = self.open_table(collection_id).await? else {
            return Ok(());
        };
        table
            .delete("true")
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to purge collection: {e}")))?;
        debug!("Purged collection {}", collection_id);
        Ok(())
    }

    async fn stats(&self, collection_id: &str) -> Result<StoreStats> {
        let mut stats = StoreStats {
            collection_id: collection_id.to_string(),
            ..Default::default()
        };
        let Some(table) = self.open_table(collection_id).await? else {
            return Ok(stats);
        };

        for behavior in [
            ChunkBehavior::Superseding,
            ChunkBehavior::Cumulative,
            ChunkBehavior::Rolling,
            ChunkBehavior::Legacy,
        ] {
            let count = table
                .count_rows(Some(format!("behavior = '{}'", behavior.as_str())))
                .await
                .map_err(|e| ChronicleError::Storage(format!("Failed to count rows: {e}")))?;
            if count > 0 {
                stats.by_behavior.insert(behavior.as_str().to_string(), count);
            }
        }
        stats.total_chunks = table
            .count_rows(None)
            .await
            .map_err(|e| ChronicleError::Storage(format!("Failed to count rows: {e}")))?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{ChunkMetadata, MemoryChunk, SectionType};
    use crate::storage::MetadataFilter;
    use crate::testing::{BAG_OF_WORDS_DIMENSION, BagOfWordsEmbedder};

    async fn store(path: &Path) -> LanceStore {
        LanceStore::connect(path, Arc::new(BagOfWordsEmbedder::new()))
            .await
            .expect("Failed to connect")
    }

    fn record(text: &str, index: u64, behavior: ChunkBehavior, scene: Option<&str>) -> ChunkRecord {
        let mut metadata = ChunkMetadata::new(behavior, 0, 10);
        metadata.scene_code = scene.map(str::to_string);
        ChunkRecord::try_from(&MemoryChunk::new(text.to_string(), index, metadata))
            .expect("to record")
    }

    #[test]
    fn test_schema_has_promoted_columns() {
        let schema = LanceStore::chunks_schema(BAG_OF_WORDS_DIMENSION as i32);
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec![
                "hash",
                "text",
                "idx",
                "behavior",
                "scene_code",
                "section_type",
                "entity_key",
                "metadata",
                "embedding"
            ]
        );
    }

    #[test]
    fn test_table_name_is_sanitized() {
        assert_eq!(LanceStore::table_name("chat 1/x"), "chunks_chat_1_x");
    }

    #[tokio::test]
    async fn test_insert_creates_table_and_queries() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let store = store(temp_dir.path()).await;
        assert!(!store.table_exists("chunks_c").await.expect("exists"));

        store
            .insert(
                "c",
                &[
                    record("the bell tower collapsed", 0, ChunkBehavior::Cumulative, None),
                    record("merchants sold apples", 1, ChunkBehavior::Cumulative, None),
                ],
            )
            .await
            .expect("insert");
        assert!(store.table_exists("chunks_c").await.expect("exists"));

        let results = store.query("c", "bell tower", 5, 0.0).await.expect("query");
        assert!(!results.is_empty());
        assert_eq!(results[0].record.text, "the bell tower collapsed");
        assert!(results[0].score > 0.5);
    }

    #[tokio::test]
    async fn test_records_roundtrip_metadata() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let store = store(temp_dir.path()).await;

        let mut metadata = ChunkMetadata::new(ChunkBehavior::Rolling, 3, 9);
        metadata.section_type = Some(SectionType::Callbacks);
        metadata.entity_key = Some("the bell".to_string());
        metadata.status = Some("OPEN".to_string());
        let chunk = MemoryChunk::new("the bell | status: OPEN".to_string(), 4, metadata);
        let rec = ChunkRecord::try_from(&chunk).expect("to record");

        store.insert("c", &[rec.clone()]).await.expect("insert");
        let listed = store.list("c", &ListOptions::default()).await.expect("list");

        assert_eq!(listed, vec![rec]);
        let back = MemoryChunk::try_from(listed[0].clone()).expect("to chunk");
        assert_eq!(back.hash, chunk.hash);
        assert_eq!(back.metadata.entity_key.as_deref(), Some("the bell"));
    }

    #[tokio::test]
    async fn test_list_filter_and_pages() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let store = store(temp_dir.path()).await;
        let records: Vec<ChunkRecord> = (0..6)
            .map(|i| {
                let scene = if i < 4 { "S1:1" } else { "S2:1" };
                record(&format!("event number {i}"), i, ChunkBehavior::Cumulative, Some(scene))
            })
            .collect();
        store.insert("c", &records).await.expect("insert");

        let first = store.list("c", &ListOptions::page(0, 4)).await.expect("list");
        let second = store.list("c", &ListOptions::page(4, 4)).await.expect("list");
        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 2);

        let scene = store
            .list(
                "c",
                &ListOptions::default().with_filter(MetadataFilter::new().with_scene_code("S2:1")),
            )
            .await
            .expect("list");
        assert_eq!(scene.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_same_hash_replaces() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let store = store(temp_dir.path()).await;
        let rec = record("the bell", 0, ChunkBehavior::Cumulative, None);

        store.insert("c", &[rec.clone()]).await.expect("insert");
        store.insert("c", &[rec]).await.expect("insert");

        assert_eq!(store.stats("c").await.expect("stats").total_chunks, 1);
    }

    #[tokio::test]
    async fn test_delete_purge_and_stats() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let store = store(temp_dir.path()).await;
        let a = record("tone is grim", 0, ChunkBehavior::Superseding, None);
        let b = record("the bell rang", 1, ChunkBehavior::Cumulative, Some("S1:1"));
        let c = record("the map was found", 2, ChunkBehavior::Cumulative, Some("S1:2"));
        store.insert("c", &[a.clone(), b, c]).await.expect("insert");

        let stats = store.stats("c").await.expect("stats");
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.by_behavior.get("cumulative"), Some(&2));
        assert_eq!(stats.by_behavior.get("superseding"), Some(&1));

        assert_eq!(store.delete("c", &[a.hash, 999]).await.expect("delete"), 1);
        assert_eq!(store.stats("c").await.expect("stats").total_chunks, 2);

        store.purge("c").await.expect("purge");
        assert_eq!(store.stats("c").await.expect("stats").total_chunks, 0);
    }

    #[tokio::test]
    async fn test_persists_across_connections() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        {
            let store = store(temp_dir.path()).await;
            store
                .insert("c", &[record("kept", 0, ChunkBehavior::Legacy, None)])
                .await
                .expect("insert");
        }

        let store = store(temp_dir.path()).await;
        let listed = store.list("c", &ListOptions::default()).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "kept");
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let store = store(temp_dir.path()).await;

        assert!(store.query("none", "x", 5, 0.0).await.expect("query").is_empty());
        assert!(store.list("none", &ListOptions::default()).await.expect("list").is_empty());
        assert_eq!(store.delete("none", &[1]).await.expect("delete"), 0);
        store.purge("none").await.expect("purge");
    }
}
