use crate::inference::InferenceClient;
use crate::preprocessing::Passage;
use anyhow::{ensure, Result};
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUERY_MODEL: &str = "facebook/dpr-question_encoder-single-nq-base";
pub const DEFAULT_PASSAGE_MODEL: &str = "facebook/dpr-ctx_encoder-single-nq-base";

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Separate encoders for questions and passages
#[allow(async_fn_in_trait)]
pub trait DualEncoder {
    /// Embed questions with the question encoder
    async fn embed_queries(&self, queries: &[String]) -> Result<Vec<Embedding>>;

    /// Embed passages with the passage encoder
    async fn embed_passages(&self, passages: &[Passage]) -> Result<Vec<Embedding>>;
}

/// Model names and batching for the dense passage retriever
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub query_model: String,
    pub passage_model: String,
    /// Passages sent per encoder request
    pub batch_size: usize,
    /// Prefix passage text with its document title
    pub embed_title: bool,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        RetrieverConfig {
            query_model: DEFAULT_QUERY_MODEL.to_string(),
            passage_model: DEFAULT_PASSAGE_MODEL.to_string(),
            batch_size: 16,
            embed_title: false,
        }
    }
}

/// Dense passage retriever backed by two encoder models on the inference endpoint
pub struct DensePassageRetriever {
    client: InferenceClient,
    config: RetrieverConfig,
}

impl DensePassageRetriever {
    pub fn new(client: InferenceClient, config: RetrieverConfig) -> Result<Self> {
        ensure!(config.batch_size > 0, "encoder batch size must be greater than 0");
        Ok(DensePassageRetriever { client, config })
    }

    async fn encode(&self, model: &str, inputs: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(self.config.batch_size) {
            debug!("Encoding {} inputs with {}", batch.len(), model);
            // One request per batch
            let vectors = self.client.feature_extraction(model, batch).await?;
            ensure!(
                vectors.len() == batch.len(),
                "{} returned {} embeddings for {} inputs",
                model,
                vectors.len(),
                batch.len()
            );
            embeddings.extend(vectors.into_iter().map(|values| Embedding { values }));
        }

        Ok(embeddings)
    }
}

impl DualEncoder for DensePassageRetriever {
    async fn embed_queries(&self, queries: &[String]) -> Result<Vec<Embedding>> {
        self.encode(&self.config.query_model, queries).await
    }

    async fn embed_passages(&self, passages: &[Passage]) -> Result<Vec<Embedding>> {
        let inputs: Vec<String> = passages
            .iter()
            .map(|passage| passage_input(passage, self.config.embed_title))
            .collect();

        self.encode(&self.config.passage_model, &inputs).await
    }
}

fn passage_input(passage: &Passage, embed_title: bool) -> String {
    match passage.title() {
        Some(title) if embed_title => format!("{} {}", title, passage.text),
        _ => passage.text.clone(),
    }
}
