use crate::embeddings::Embedding;
use crate::preprocessing::Passage;
use anyhow::{ensure, Context, Result};
use log::{debug, info};
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointId, PointStruct,
    UpsertPointsBuilder, Value, VectorParams,
};
use qdrant_client::Qdrant;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use uuid::Uuid;

const DEFAULT_COLLECTION: &str = "chapter_qa";

/// A passage bound to its passage-encoder embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub passage: Passage,
    pub embedding: Embedding,
}

/// A retrieved passage and its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

/// Vector similarity used to rank passages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    DotProduct,
    Cosine,
}

impl Similarity {
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            Similarity::DotProduct => dot,
            Similarity::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }
}

/// Storage for embedded passages with nearest-neighbour lookup
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Remove every stored record
    async fn delete_documents(&mut self) -> Result<()>;

    /// Store records; a record whose passage id is already present replaces it
    async fn write_records(&mut self, records: Vec<EmbeddingRecord>) -> Result<()>;

    async fn document_count(&self) -> Result<usize>;

    /// The `top_k` most similar passages, best first
    async fn query_by_embedding(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>>;
}

/// Exact in-process index that compares the query against every record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatStore {
    similarity: Similarity,
    records: Vec<EmbeddingRecord>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl FlatStore {
    pub fn new(similarity: Similarity) -> Self {
        FlatStore {
            similarity,
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    fn embedding_dim(&self) -> Option<usize> {
        self.records.first().map(|r| r.embedding.dim())
    }

    /// Persist the index to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let raw = serde_json::to_string(self)?;
        fs::write(path, raw)
            .with_context(|| format!("Failed to save index to {}", path.display()))?;

        info!("Saved {} records to {}", self.records.len(), path.display());
        Ok(())
    }

    /// Load an index written by [`FlatStore::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read index {}", path.display()))?;
        let mut store: FlatStore = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse index {}", path.display()))?;

        store.positions = store
            .records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.passage.id.clone(), idx))
            .collect();

        info!("Loaded {} records from {}", store.records.len(), path.display());
        Ok(store)
    }
}

impl DocumentStore for FlatStore {
    async fn delete_documents(&mut self) -> Result<()> {
        debug!("Deleting {} records", self.records.len());
        self.records.clear();
        self.positions.clear();
        Ok(())
    }

    async fn write_records(&mut self, records: Vec<EmbeddingRecord>) -> Result<()> {
        for record in records {
            let expected = self.embedding_dim().unwrap_or(record.embedding.dim());
            ensure!(
                record.embedding.dim() == expected,
                "Embedding of passage {} has dimension {}, index expects {}",
                record.passage.id,
                record.embedding.dim(),
                expected
            );

            match self.positions.get(&record.passage.id) {
                Some(&idx) => self.records[idx] = record,
                None => {
                    self.positions
                        .insert(record.passage.id.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
        Ok(())
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn query_by_embedding(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        if let Some(dim) = self.embedding_dim() {
            ensure!(
                query.dim() == dim,
                "Query embedding has dimension {}, index expects {}",
                query.dim(),
                dim
            );
        }

        let mut scored: Vec<ScoredPassage> = self
            .records
            .iter()
            .map(|record| ScoredPassage {
                passage: record.passage.clone(),
                score: self.similarity.score(&query.values, &record.embedding.values),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored)
    }
}

/// Configuration for Qdrant
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let url = env::var("QDRANT_URL")?;
        let api_key = env::var("QDRANT_API_KEY").ok();
        let collection =
            env::var("QDRANT_COLLECTION").unwrap_or_else(|_| DEFAULT_COLLECTION.to_string());

        Ok(QdrantConfig {
            url,
            api_key,
            collection,
        })
    }
}

/// Document store backed by a single Qdrant collection
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    similarity: Similarity,
}

impl QdrantStore {
    pub fn new(config: QdrantConfig, similarity: Similarity) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder.build()?;

        Ok(QdrantStore {
            client,
            collection: config.collection,
            similarity,
        })
    }

    pub async fn collection_exists(&self) -> Result<bool> {
        match self.client.collection_info(&self.collection).await {
            Ok(_) => Ok(true),
            Err(qdrant_client::QdrantError::ResponseError { status })
                if status.code() == tonic::Code::NotFound =>
            {
                Ok(false)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to check collection existence: {}",
                e
            )),
        }
    }

    async fn create_collection(&self, dim: usize) -> Result<()> {
        let distance = match self.similarity {
            Similarity::DotProduct => Distance::Dot,
            Similarity::Cosine => Distance::Cosine,
        };

        let create_collection = CreateCollectionBuilder::new(self.collection.clone())
            .vectors_config(VectorParams {
                size: dim as u64,
                distance: distance.into(),
                ..Default::default()
            });

        self.client
            .create_collection(create_collection)
            .await
            .with_context(|| format!("Failed to create collection {}", self.collection))?;

        Ok(())
    }
}

impl DocumentStore for QdrantStore {
    async fn delete_documents(&mut self) -> Result<()> {
        // Drop the whole collection; the next write recreates it
        if self.collection_exists().await? {
            self.client
                .delete_collection(self.collection.clone())
                .await
                .with_context(|| format!("Failed to delete collection {}", self.collection))?;
        }
        Ok(())
    }

    async fn write_records(&mut self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };

        // Create the collection on first write
        if !self.collection_exists().await? {
            self.create_collection(first.embedding.dim()).await?;
        }

        // Convert records to points keyed by passage id
        let points = records
            .into_iter()
            .map(record_point)
            .collect::<Result<Vec<_>>>()?;

        // Upsert, replacing points that share an id
        let upsert_request = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

        self.client
            .upsert_points(upsert_request)
            .await
            .with_context(|| {
                format!("Failed to upsert points in collection {}", self.collection)
            })?;

        Ok(())
    }

    async fn document_count(&self) -> Result<usize> {
        if !self.collection_exists().await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPointsBuilder::new(self.collection.clone()).exact(true))
            .await
            .with_context(|| format!("Failed to count points in {}", self.collection))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn query_by_embedding(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        use qdrant_client::qdrant::{with_payload_selector, SearchPoints, WithPayloadSelector};

        // Create search request
        let search_request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: query.values.clone(),
            limit: top_k as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        // Execute search
        let search_response = self
            .client
            .search_points(search_request)
            .await
            .with_context(|| format!("Failed to search collection {}", self.collection))?;

        // Restore passages from payloads
        search_response
            .result
            .into_iter()
            .map(|scored_point| -> Result<ScoredPassage> {
                Ok(ScoredPassage {
                    passage: payload_passage(&scored_point.payload)?,
                    score: scored_point.score,
                })
            })
            .collect()
    }
}

/// Point id for a passage; the same passage id always maps to the same point
fn point_id(passage_id: &str) -> PointId {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, passage_id.as_bytes())
        .to_string()
        .into()
}

fn record_point(record: EmbeddingRecord) -> Result<PointStruct> {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert("passage_id".to_string(), record.passage.id.clone().into());
    payload.insert("text".to_string(), record.passage.text.clone().into());
    payload.insert(
        "passage".to_string(),
        serde_json::to_string(&record.passage)?.into(),
    );

    Ok(PointStruct::new(
        point_id(&record.passage.id),
        record.embedding.values,
        payload,
    ))
}

fn payload_passage(payload: &HashMap<String, Value>) -> Result<Passage> {
    let raw = payload
        .get("passage")
        .and_then(|v| v.as_str())
        .context("Search result without passage payload")?;
    serde_json::from_str(raw).context("Malformed passage payload")
}
