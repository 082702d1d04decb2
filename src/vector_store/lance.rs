//! Motor LanceDB: una tabla `records` por almacén, búsqueda por distancia L2.

use std::path::PathBuf;
use std::sync::Arc;

use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType};
use tracing::{info, warn};

use super::{
    backend_error, embed_records, ensure_creatable, ensure_queryable, preprocess, rerank,
    store_location, VectorStoreManager,
};
use crate::error::StoreError;
use crate::llm::Embedder;
use crate::models::{Document, IndexedRecord, ScoredDocument};

const TABLE_NAME: &str = "records";

pub struct LanceStore {
    work_directory: PathBuf,
    embedder: Arc<dyn Embedder>,
    distance_threshold: f32,
}

impl LanceStore {
    pub fn new(work_directory: PathBuf, embedder: Arc<dyn Embedder>, distance_threshold: f32) -> Self {
        Self {
            work_directory,
            embedder,
            distance_threshold,
        }
    }
}

fn records_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("page_label", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension),
            true,
        ),
    ]))
}

fn to_record_batch(
    records: &[IndexedRecord],
    vectors: Vec<Vec<f32>>,
    dimension: i32,
) -> Result<RecordBatch, StoreError> {
    let vectors: Vec<Option<Vec<Option<f32>>>> = vectors
        .into_iter()
        .map(|v| Some(v.into_iter().map(Some).collect()))
        .collect();

    RecordBatch::try_new(
        records_schema(dimension),
        vec![
            Arc::new(string_array(records, |r| r.id.as_str())),
            Arc::new(string_array(records, |r| r.content.as_str())),
            Arc::new(string_array(records, |r| r.title.as_str())),
            Arc::new(string_array(records, |r| r.page_label.as_str())),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                vectors.into_iter(),
                dimension,
            )),
        ],
    )
    .map_err(backend_error)
}

fn string_array<'a, F>(records: &'a [IndexedRecord], field: F) -> StringArray
where
    F: Fn(&'a IndexedRecord) -> &'a str,
{
    StringArray::from(records.iter().map(field).collect::<Vec<_>>())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| backend_error(anyhow::anyhow!("Columna '{name}' ausente o con tipo inesperado")))
}

#[async_trait]
impl VectorStoreManager for LanceStore {
    async fn create(&self, documents: &[Vec<Document>], store_name: &str) -> Result<usize, StoreError> {
        let location = store_location(&self.work_directory, store_name);
        ensure_creatable(&location)?;

        let records = preprocess(documents)?;
        if records.is_empty() {
            warn!("Sin fragmentos para '{}': no se crea el índice", store_name);
            return Ok(0);
        }

        let (vectors, dimension) = embed_records(self.embedder.as_ref(), &records).await?;
        let dimension = i32::try_from(dimension).map_err(backend_error)?;
        let batch = to_record_batch(&records, vectors, dimension)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));

        std::fs::create_dir_all(&location)?;
        let db = connect(&location.to_string_lossy()).execute().await.map_err(backend_error)?;
        db.create_table(TABLE_NAME, reader)
            .execute()
            .await
            .map_err(backend_error)?;

        info!(
            "Índice LanceDB '{}' creado con {} registros (dim {}) en {}",
            store_name,
            records.len(),
            dimension,
            location.display()
        );
        Ok(records.len())
    }

    async fn query(
        &self,
        store_name: &str,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let location = store_location(&self.work_directory, store_name);
        ensure_queryable(&location)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let db = connect(&location.to_string_lossy()).execute().await.map_err(backend_error)?;
        let table = db.open_table(TABLE_NAME).execute().await.map_err(backend_error)?;

        let query_embedding = self
            .embedder
            .embed_one(question)
            .await
            .map_err(StoreError::Backend)?;
        let mut stream = table
            .vector_search(query_embedding)
            .map_err(backend_error)?
            .distance_type(DistanceType::L2)
            .limit(k)
            .execute()
            .await
            .map_err(backend_error)?;

        let mut results = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(backend_error)? {
            let ids = string_column(&batch, "id")?;
            let contents = string_column(&batch, "content")?;
            let titles = string_column(&batch, "title")?;
            let pages = string_column(&batch, "page_label")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| backend_error(anyhow::anyhow!("La búsqueda no devolvió '_distance'")))?;

            for i in 0..batch.num_rows() {
                if distances.is_null(i) {
                    continue;
                }
                let record = IndexedRecord {
                    id: ids.value(i).to_string(),
                    content: contents.value(i).to_string(),
                    title: titles.value(i).to_string(),
                    page_label: pages.value(i).to_string(),
                };
                results.push(ScoredDocument {
                    document: record.to_document(),
                    distance: distances.value(i),
                });
            }
        }

        Ok(rerank(results, self.distance_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{page, VowelEmbedder};
    use super::*;
    use crate::models::META_TITLE;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> LanceStore {
        LanceStore::new(tmp.path().to_path_buf(), Arc::new(VowelEmbedder), 6.5)
    }

    #[tokio::test]
    async fn create_then_query_returns_nearest_within_threshold() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let docs = vec![
            vec![page("/c/teoria/vocales.txt", "1", "aaaa")],
            vec![page("/c/teoria/otras.txt", "1", "uuuuuuuuuu")],
        ];
        assert_eq!(store.create(&docs, "teoria").await.unwrap(), 2);

        let results = store.query("teoria", "aaa", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.content, "aaaa");
        assert_eq!(results[0].document.metadata.get(META_TITLE).unwrap(), "vocales.txt");
        assert!(results[0].distance <= 6.5);
    }

    #[tokio::test]
    async fn second_create_conflicts() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let docs = vec![vec![page("/c/info/guia.txt", "1", "examen")]];
        store.create(&docs, "info").await.unwrap();

        let snapshot = || -> Vec<(PathBuf, u64)> {
            walkdir::WalkDir::new(tmp.path().join("info"))
                .sort_by_file_name()
                .into_iter()
                .map(|e| e.unwrap())
                .map(|e| (e.path().to_path_buf(), e.metadata().unwrap().len()))
                .collect()
        };
        let before = snapshot();

        let other = vec![vec![page("/c/info/otra.txt", "1", "uuuuuuuu")]];
        let err = store.create(&other, "info").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(snapshot(), before);

        let results = store.query("info", "examen", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.content, "examen");
    }

    #[tokio::test]
    async fn query_on_missing_store_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).query("teoria", "hola", 5).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
