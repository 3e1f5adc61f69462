use crate::inference::{GenerationParameters, InferenceClient};
use crate::preprocessing::Passage;
use anyhow::{ensure, Result};
use log::{debug, warn};
use serde::Serialize;

pub const DEFAULT_GENERATOR_MODEL: &str = "facebook/rag-token-nq";

const TITLE_SEPARATOR: &str = " / ";
const DOC_SEPARATOR: &str = " // ";

/// A generated answer and the passages it was conditioned on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub passage_ids: Vec<String>,
    pub contexts: Vec<String>,
}

/// Produces free-form answers from a question and retrieved passages
#[allow(async_fn_in_trait)]
pub trait AnswerGenerator {
    async fn generate(
        &self,
        query: &str,
        passages: &[Passage],
        top_k: usize,
    ) -> Result<Vec<Answer>>;
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub model: String,
    pub num_beams: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub embed_title: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            model: DEFAULT_GENERATOR_MODEL.to_string(),
            num_beams: 2,
            min_length: 2,
            max_length: 200,
            embed_title: false,
        }
    }
}

/// Sequence-to-sequence answer generator served by the inference endpoint
pub struct RagGenerator {
    client: InferenceClient,
    config: GeneratorConfig,
}

impl RagGenerator {
    pub fn new(client: InferenceClient, config: GeneratorConfig) -> Result<Self> {
        ensure!(config.num_beams > 0, "num_beams must be greater than 0");
        ensure!(
            config.min_length <= config.max_length,
            "min_length ({}) must not exceed max_length ({})",
            config.min_length,
            config.max_length
        );
        Ok(RagGenerator { client, config })
    }
}

impl AnswerGenerator for RagGenerator {
    async fn generate(
        &self,
        query: &str,
        passages: &[Passage],
        top_k: usize,
    ) -> Result<Vec<Answer>> {
        ensure!(
            !passages.is_empty(),
            "No passages retrieved for {:?}; the generator needs context to answer",
            query
        );

        // Beam search settings
        let top_k = clamp_top_k(top_k, self.config.num_beams);
        let parameters = GenerationParameters {
            num_beams: self.config.num_beams,
            min_length: self.config.min_length,
            max_length: self.config.max_length,
            num_return_sequences: top_k,
        };

        // One input line per retrieved passage
        let input = contextualized_input(query, passages, self.config.embed_title);
        debug!("Generating {} answers for {:?}", top_k, query);

        let sequences = self
            .client
            .text2text(&self.config.model, &input, &parameters)
            .await?;

        // Every answer is supported by all retrieved passages
        let passage_ids: Vec<String> = passages.iter().map(|p| p.id.clone()).collect();
        let contexts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();

        Ok(sequences
            .into_iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .take(top_k)
            .map(|answer| Answer {
                answer,
                passage_ids: passage_ids.clone(),
                contexts: contexts.clone(),
            })
            .collect())
    }
}

/// Beam search cannot return more sequences than it has beams
pub fn clamp_top_k(top_k: usize, num_beams: usize) -> usize {
    if top_k > num_beams {
        warn!(
            "top_k ({}) is larger than num_beams ({}); returning {} answers",
            top_k, num_beams, num_beams
        );
        return num_beams;
    }
    top_k
}

/// One `<title> / <passage> // <question>` line per passage
pub fn contextualized_input(query: &str, passages: &[Passage], embed_title: bool) -> String {
    passages
        .iter()
        .map(|passage| match passage.title() {
            Some(title) if embed_title => format!(
                "{}{}{}{}{}",
                title, TITLE_SEPARATOR, passage.text, DOC_SEPARATOR, query
            ),
            _ => format!("{}{}{}", passage.text, DOC_SEPARATOR, query),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
