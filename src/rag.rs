use crate::document::load_corpus;
use crate::embeddings::DualEncoder;
use crate::generator::{Answer, AnswerGenerator};
use crate::preprocessing::{Passage, PreProcessor};
use crate::store::{DocumentStore, EmbeddingRecord};
use anyhow::{ensure, Context, Result};
use log::{debug, info};
use std::io::Write;
use std::path::Path;

/// Retrieval and generation depth for each question
#[derive(Debug, Clone, Copy)]
pub struct QueryConfig {
    /// Passages handed to the generator
    pub retriever_top_k: usize,
    /// Answers printed per question
    pub generator_top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            retriever_top_k: 5,
            generator_top_k: 2,
        }
    }
}

/// How much of each answer to print
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Details {
    /// Answer text only
    Minimum,
    /// Answer text followed by the supporting passage ids
    All,
}

/// Answers generated for one question
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query: String,
    pub answers: Vec<Answer>,
}

/// Passage counts produced while indexing a corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    pub documents: usize,
    pub word_passages: usize,
    pub sentence_passages: usize,
    pub indexed: usize,
}

/// RAG (Retrieval-Augmented Generation) engine
///
/// Owns the document store and the model handles used by every stage.
pub struct RagEngine<S, E, G> {
    store: S,
    encoder: E,
    generator: G,
}

impl<S, E, G> RagEngine<S, E, G>
where
    S: DocumentStore,
    E: DualEncoder,
    G: AnswerGenerator,
{
    pub fn new(store: S, encoder: E, generator: G) -> Self {
        RagEngine {
            store,
            encoder,
            generator,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load a corpus, split it both ways and index the word-split passages.
    ///
    /// The corpus is read and split before the store is touched, so a bad
    /// corpus leaves the existing index as it was.
    pub async fn index_corpus(
        &mut self,
        corpus_path: &Path,
        word_preprocessor: &PreProcessor,
        sentence_preprocessor: &PreProcessor,
        write_batch_size: usize,
    ) -> Result<IndexSummary> {
        // Load documents
        let documents = load_corpus(corpus_path).context("Failed to load corpus")?;
        info!("Loaded {} documents", documents.len());

        // Split into both passage sets
        let word_passages = word_preprocessor.process(&documents);
        let sentence_passages = sentence_preprocessor.process(&documents);
        info!(
            "Word split: {} passages, sentence split: {} passages",
            word_passages.len(),
            sentence_passages.len()
        );

        // Only the word split is indexed
        let indexed = self.index_passages(&word_passages, write_batch_size).await?;

        Ok(IndexSummary {
            documents: documents.len(),
            word_passages: word_passages.len(),
            sentence_passages: sentence_passages.len(),
            indexed,
        })
    }

    /// Replace the store contents with the given passages and their embeddings
    pub async fn index_passages(
        &mut self,
        passages: &[Passage],
        write_batch_size: usize,
    ) -> Result<usize> {
        ensure!(write_batch_size > 0, "write batch size must be greater than 0");

        // Clear previous contents
        self.store.delete_documents().await?;

        let batches = passages.len().div_ceil(write_batch_size);
        for (idx, batch) in passages.chunks(write_batch_size).enumerate() {
            // Embed batch
            let embeddings = self.encoder.embed_passages(batch).await?;
            ensure!(
                embeddings.len() == batch.len(),
                "Passage encoder returned {} embeddings for {} passages",
                embeddings.len(),
                batch.len()
            );

            // Store batch
            let records = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(passage, embedding)| EmbeddingRecord { passage, embedding })
                .collect();
            self.store.write_records(records).await?;

            info!("Indexed batch {}/{} ({} passages)", idx + 1, batches, batch.len());
        }

        let count = self.store.document_count().await?;
        info!("Index holds {} passages", count);
        Ok(count)
    }

    /// Retrieve passages for one question and generate answers from them
    pub async fn answer(&self, query: &str, config: &QueryConfig) -> Result<QueryResult> {
        // Embed question
        let query_embedding = self
            .encoder
            .embed_queries(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .context("Question encoder returned no embedding")?;

        // Retrieve
        let hits = self
            .store
            .query_by_embedding(&query_embedding, config.retriever_top_k)
            .await?;
        debug!("Retrieved {} passages for {:?}", hits.len(), query);

        // Generate
        let passages: Vec<Passage> = hits.into_iter().map(|hit| hit.passage).collect();
        let answers = self
            .generator
            .generate(query, &passages, config.generator_top_k)
            .await?;

        Ok(QueryResult {
            query: query.to_string(),
            answers,
        })
    }

    /// Answer every question in order, printing one block per question.
    ///
    /// The first failing question aborts the run.
    pub async fn run_questions<W: Write>(
        &self,
        questions: &[String],
        config: &QueryConfig,
        details: Details,
        out: &mut W,
    ) -> Result<()> {
        for (idx, question) in questions.iter().enumerate() {
            info!("Question {}/{}: {}", idx + 1, questions.len(), question);

            let result = self
                .answer(question, config)
                .await
                .with_context(|| format!("Failed to answer {:?}", question))?;

            print_answers(out, &result, details)?;
        }

        Ok(())
    }
}

/// Write a human-readable answer block
pub fn print_answers<W: Write>(out: &mut W, result: &QueryResult, details: Details) -> Result<()> {
    writeln!(out, "\nQuery: {}", result.query)?;
    writeln!(out, "Answers:")?;

    if result.answers.is_empty() {
        writeln!(out, "    (no answer generated)")?;
    }

    for answer in &result.answers {
        writeln!(out, "    - {}", answer.answer)?;
        if details == Details::All {
            writeln!(out, "      passages: {}", answer.passage_ids.join(", "))?;
        }
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::embeddings::Embedding;
    use crate::questions::default_questions;
    use crate::store::{FlatStore, Similarity};
    use anyhow::bail;
    use std::cell::Cell;

    /// Letter-frequency vectors: enough to make retrieval deterministic
    struct LetterEncoder {
        passage_calls: Cell<usize>,
    }

    impl LetterEncoder {
        fn new() -> Self {
            LetterEncoder {
                passage_calls: Cell::new(0),
            }
        }

        fn encode(text: &str) -> Embedding {
            let mut values = vec![0.0; 26];
            for c in text.to_lowercase().chars().filter(char::is_ascii_lowercase) {
                values[(c as u8 - b'a') as usize] += 1.0;
            }
            Embedding { values }
        }
    }

    impl DualEncoder for LetterEncoder {
        async fn embed_queries(&self, queries: &[String]) -> Result<Vec<Embedding>> {
            Ok(queries.iter().map(|q| Self::encode(q)).collect())
        }

        async fn embed_passages(&self, passages: &[Passage]) -> Result<Vec<Embedding>> {
            self.passage_calls.set(self.passage_calls.get() + 1);
            Ok(passages.iter().map(|p| Self::encode(&p.text)).collect())
        }
    }

    /// Echoes the best passage; fails on the question it is told to
    struct EchoGenerator {
        fail_on: Option<String>,
    }

    impl AnswerGenerator for EchoGenerator {
        async fn generate(
            &self,
            query: &str,
            passages: &[Passage],
            top_k: usize,
        ) -> Result<Vec<Answer>> {
            if self.fail_on.as_deref() == Some(query) {
                bail!("model unavailable");
            }
            Ok((0..top_k)
                .map(|rank| Answer {
                    answer: format!("{} #{}", passages[0].text, rank),
                    passage_ids: passages.iter().map(|p| p.id.clone()).collect(),
                    contexts: passages.iter().map(|p| p.text.clone()).collect(),
                })
                .collect())
        }
    }

    fn engine(fail_on: Option<&str>) -> RagEngine<FlatStore, LetterEncoder, EchoGenerator> {
        RagEngine::new(
            FlatStore::new(Similarity::Cosine),
            LetterEncoder::new(),
            EchoGenerator {
                fail_on: fail_on.map(str::to_string),
            },
        )
    }

    fn corpus_passages() -> Vec<Passage> {
        let documents = vec![
            Document::new("ch1", "Avery is a young witch who lives by the mill."),
            Document::new("ch2", "Bristow is a town on the northern coast."),
            Document::new("ch3", "Snowdrop is a white pony owned by Verona."),
        ];
        PreProcessor::word_split().process(&documents)
    }

    #[tokio::test]
    async fn test_reindexing_does_not_duplicate() {
        let mut engine = engine(None);
        let passages = corpus_passages();

        assert_eq!(engine.index_passages(&passages, 2).await.unwrap(), passages.len());
        assert_eq!(engine.index_passages(&passages, 2).await.unwrap(), passages.len());
        assert_eq!(engine.store().document_count().await.unwrap(), passages.len());
        // 3 passages in batches of 2, twice
        assert_eq!(engine.encoder.passage_calls.get(), 4);
    }

    #[tokio::test]
    async fn test_index_holds_only_latest_passages() {
        let mut engine = engine(None);
        engine.index_passages(&corpus_passages(), 100).await.unwrap();

        let fresh =
            PreProcessor::word_split().process(&[Document::new("new", "Only this remains.")]);
        assert_eq!(engine.index_passages(&fresh, 100).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_one_block_per_question_in_order() {
        let mut engine = engine(None);
        engine.index_passages(&corpus_passages(), 100).await.unwrap();

        let questions = default_questions();
        let mut out = Vec::new();
        engine
            .run_questions(&questions, &QueryConfig::default(), Details::Minimum, &mut out)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        let queries: Vec<&str> = printed
            .lines()
            .filter_map(|line| line.strip_prefix("Query: "))
            .collect();
        assert_eq!(queries, questions);
        assert_eq!(printed.matches("Answers:").count(), 19);
        assert_eq!(printed.lines().filter(|l| l.starts_with("    - ")).count(), 38);
    }

    #[tokio::test]
    async fn test_answer_uses_closest_passage() {
        let mut engine = engine(None);
        engine.index_passages(&corpus_passages(), 100).await.unwrap();

        let config = QueryConfig {
            retriever_top_k: 1,
            generator_top_k: 1,
        };
        let result = engine.answer("Snowdrop the white pony of Verona", &config).await.unwrap();
        assert_eq!(result.answers.len(), 1);
        assert_eq!(result.answers[0].passage_ids, vec!["ch3-0"]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_run() {
        let mut engine = engine(Some("Where does Verona live?"));
        engine.index_passages(&corpus_passages(), 100).await.unwrap();

        let mut out = Vec::new();
        let err = engine
            .run_questions(
                &default_questions(),
                &QueryConfig::default(),
                Details::Minimum,
                &mut out,
            )
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("model unavailable"));
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("Query: ").count(), 1);
    }

    #[tokio::test]
    async fn test_missing_corpus_leaves_index_untouched() {
        let mut engine = engine(None);
        let passages = corpus_passages();
        engine.index_passages(&passages, 100).await.unwrap();

        let missing = std::env::temp_dir().join("chapter_qa_missing_corpus.json");
        let result = engine
            .index_corpus(
                &missing,
                &PreProcessor::word_split(),
                &PreProcessor::sentence_split(),
                100,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(engine.store().document_count().await.unwrap(), passages.len());
    }

    #[tokio::test]
    async fn test_index_corpus_summary() {
        let path = std::env::temp_dir()
            .join(format!("chapter_qa_{}_rag_corpus.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[
                {"content": "Gilkey is ostracized. He lives alone."},
                {"content": "The Wolf hunts."}
            ]"#,
        )
        .unwrap();

        let mut engine = engine(None);
        let summary = engine
            .index_corpus(
                &path,
                &PreProcessor::word_split(),
                &PreProcessor::sentence_split(),
                100,
            )
            .await;
        std::fs::remove_file(&path).ok();

        let summary = summary.unwrap();
        assert_eq!(summary.documents, 2);
        assert_eq!(summary.word_passages, 2);
        assert_eq!(summary.sentence_passages, 2);
        assert_eq!(summary.indexed, 2);
    }

    #[test]
    fn test_print_answers_details() {
        let result = QueryResult {
            query: "Who is Avery?".to_string(),
            answers: vec![Answer {
                answer: "a young witch".to_string(),
                passage_ids: vec!["ch1-0".to_string(), "ch1-1".to_string()],
                contexts: vec![],
            }],
        };

        let mut out = Vec::new();
        print_answers(&mut out, &result, Details::Minimum).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nQuery: Who is Avery?\nAnswers:\n    - a young witch\n"
        );

        let mut out = Vec::new();
        print_answers(&mut out, &result, Details::All).unwrap();
        assert!(String::from_utf8(out)
            .unwrap()
            .ends_with("    - a young witch\n      passages: ch1-0, ch1-1\n"));
    }
}
