use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use log::info;
use std::io;
use std::path::PathBuf;

use chapter_qa::embeddings::{
    DensePassageRetriever, RetrieverConfig, DEFAULT_PASSAGE_MODEL, DEFAULT_QUERY_MODEL,
};
use chapter_qa::generator::{GeneratorConfig, RagGenerator, DEFAULT_GENERATOR_MODEL};
use chapter_qa::inference::{InferenceClient, InferenceConfig};
use chapter_qa::preprocessing::{PreProcessor, PreProcessorConfig};
use chapter_qa::questions::{default_questions, load_questions};
use chapter_qa::rag::{Details, QueryConfig, RagEngine};
use chapter_qa::store::{DocumentStore, FlatStore, QdrantConfig, QdrantStore, Similarity};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StoreKind {
    /// Exact in-process index
    Flat,
    /// Qdrant collection (QDRANT_URL)
    Qdrant,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SimilarityArg {
    DotProduct,
    Cosine,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DetailsArg {
    Minimum,
    All,
}

/// Generative question answering over a chapter corpus
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Corpus to index: a JSON list of {content, meta} records, a text file or a PDF
    #[arg(index = 1, required_unless_present = "load_index", conflicts_with = "load_index")]
    corpus: Option<PathBuf>,

    /// File with one question per line (defaults to the built-in list)
    #[arg(long)]
    questions: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StoreKind::Flat)]
    store: StoreKind,

    #[arg(long, value_enum, default_value_t = SimilarityArg::DotProduct)]
    similarity: SimilarityArg,

    /// Save the flat index here after indexing
    #[arg(long)]
    save_index: Option<PathBuf>,

    /// Answer from a previously saved flat index instead of indexing a corpus
    #[arg(long)]
    load_index: Option<PathBuf>,

    #[arg(long, default_value_t = 200)]
    split_length: usize,

    #[arg(long, default_value_t = 20)]
    split_overlap: usize,

    #[arg(long, default_value_t = 10)]
    sentence_split_length: usize,

    #[arg(long, default_value_t = 2)]
    sentence_split_overlap: usize,

    #[arg(long, default_value = DEFAULT_QUERY_MODEL)]
    query_model: String,

    #[arg(long, default_value = DEFAULT_PASSAGE_MODEL)]
    passage_model: String,

    #[arg(long, default_value = DEFAULT_GENERATOR_MODEL)]
    generator_model: String,

    /// Prefix passages with their document title before embedding and generation
    #[arg(long)]
    embed_title: bool,

    #[arg(long, default_value_t = 5)]
    retriever_top_k: usize,

    #[arg(long, default_value_t = 2)]
    generator_top_k: usize,

    #[arg(long, default_value_t = 2)]
    num_beams: usize,

    #[arg(long, default_value_t = 2)]
    min_length: usize,

    #[arg(long, default_value_t = 200)]
    max_length: usize,

    /// Passages per passage-encoder request
    #[arg(long, default_value_t = 16)]
    embed_batch_size: usize,

    /// Passages embedded and written to the store per batch
    #[arg(long, default_value_t = 100)]
    write_batch_size: usize,

    #[arg(long, value_enum, default_value_t = DetailsArg::Minimum)]
    details: DetailsArg,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,chapter_qa=info"),
    )
    .init();

    let args = Args::parse();

    let similarity = match args.similarity {
        SimilarityArg::DotProduct => Similarity::DotProduct,
        SimilarityArg::Cosine => Similarity::Cosine,
    };

    let questions = match &args.questions {
        Some(path) => load_questions(path)?,
        None => default_questions(),
    };
    info!("{} questions to answer", questions.len());

    let inference = InferenceClient::new(InferenceConfig::from_env()?);
    info!("Using inference endpoint {}", inference.config().api_url);

    let retriever = DensePassageRetriever::new(
        inference.clone(),
        RetrieverConfig {
            query_model: args.query_model.clone(),
            passage_model: args.passage_model.clone(),
            batch_size: args.embed_batch_size,
            embed_title: args.embed_title,
        },
    )?;
    let generator = RagGenerator::new(
        inference,
        GeneratorConfig {
            model: args.generator_model.clone(),
            num_beams: args.num_beams,
            min_length: args.min_length,
            max_length: args.max_length,
            embed_title: args.embed_title,
        },
    )?;

    match args.store {
        StoreKind::Flat => {
            let store = match &args.load_index {
                Some(path) => FlatStore::load(path)?,
                None => FlatStore::new(similarity),
            };
            let mut engine = RagEngine::new(store, retriever, generator);

            index(&mut engine, &args).await?;
            if let Some(path) = &args.save_index {
                engine.store().save(path)?;
            }
            answer(&engine, &args, &questions).await
        }
        StoreKind::Qdrant => {
            ensure!(
                args.save_index.is_none() && args.load_index.is_none(),
                "--save-index and --load-index only apply to the flat store"
            );
            let qdrant_config = QdrantConfig::from_env().context("Missing QDRANT_URL")?;
            let store = QdrantStore::new(qdrant_config, similarity)
                .context("Failed to initialize Qdrant client")?;
            let mut engine = RagEngine::new(store, retriever, generator);

            index(&mut engine, &args).await?;
            answer(&engine, &args, &questions).await
        }
    }
}

/// Index the corpus when one is given
async fn index<S: DocumentStore>(
    engine: &mut RagEngine<S, DensePassageRetriever, RagGenerator>,
    args: &Args,
) -> Result<()> {
    let Some(corpus) = &args.corpus else {
        return Ok(());
    };

    let word_preprocessor = PreProcessor::new(PreProcessorConfig {
        split_length: args.split_length,
        split_overlap: args.split_overlap,
        ..PreProcessor::word_split().config().clone()
    })?;
    let sentence_preprocessor = PreProcessor::new(PreProcessorConfig {
        split_length: args.sentence_split_length,
        split_overlap: args.sentence_split_overlap,
        ..PreProcessor::sentence_split().config().clone()
    })?;

    info!("Processing corpus: {}", corpus.display());
    let summary = engine
        .index_corpus(
            corpus,
            &word_preprocessor,
            &sentence_preprocessor,
            args.write_batch_size,
        )
        .await
        .context("Failed to index corpus")?;
    info!("{:?}", summary);

    Ok(())
}

async fn answer<S: DocumentStore>(
    engine: &RagEngine<S, DensePassageRetriever, RagGenerator>,
    args: &Args,
    questions: &[String],
) -> Result<()> {
    let config = QueryConfig {
        retriever_top_k: args.retriever_top_k,
        generator_top_k: args.generator_top_k,
    };
    let details = match args.details {
        DetailsArg::Minimum => Details::Minimum,
        DetailsArg::All => Details::All,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    engine
        .run_questions(questions, &config, details, &mut out)
        .await
        .context("Error in query loop")
}
