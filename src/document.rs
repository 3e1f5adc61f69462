use crate::preprocessing::collapse_empty_lines;
use anyhow::{ensure, Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// A source document: one unit of the corpus before splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier, unique within the corpus
    pub id: String,
    /// Raw text content
    pub content: String,
    /// Arbitrary metadata (title, chapter, ...) inherited by every passage
    #[serde(default)]
    pub meta: Map<String, Value>,
}

/// One record of a serialized corpus blob
#[derive(Debug, Deserialize)]
struct DocumentRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "text")]
    content: String,
    #[serde(default)]
    meta: Map<String, Value>,
}

impl Document {
    /// Create a document with no metadata
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            content: content.into(),
            meta: Map::new(),
        }
    }

    /// Title used when passages are embedded with their title
    pub fn title(&self) -> Option<&str> {
        title_from_meta(&self.meta)
    }
}

pub(crate) fn title_from_meta(meta: &Map<String, Value>) -> Option<&str> {
    meta.get("name")
        .or_else(|| meta.get("title"))
        .and_then(Value::as_str)
}

/// Load the corpus from a file.
///
/// A JSON file holds the serialized list of document records. Text and PDF
/// files become a single-document corpus.
pub fn load_corpus<P: AsRef<Path>>(file_path: P) -> Result<Vec<Document>> {
    let path = file_path.as_ref();
    let mime_type = from_path(path).first_or_octet_stream().to_string();
    debug!("Detected MIME type: {}", mime_type);

    if mime_type == "application/json" {
        info!("Loading corpus blob: {}", path.display());
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus: {}", path.display()))?;
        return parse_corpus(&raw, &corpus_stem(path))
            .with_context(|| format!("Failed to parse corpus: {}", path.display()));
    }

    let file_name = path
        .file_name()
        .context("Invalid file name")?
        .to_str()
        .context("Invalid file name encoding")?
        .to_string();
    let content = read_document_content(path, &mime_type)?;

    let mut document = Document::new(file_name.clone(), content);
    document
        .meta
        .insert("name".to_string(), Value::String(file_name));
    Ok(vec![document])
}

/// Deserialize a JSON array of `{id?, content, meta?}` records.
///
/// Records without an id get `<stem>-<position>`.
pub fn parse_corpus(raw: &str, stem: &str) -> Result<Vec<Document>> {
    let records: Vec<DocumentRecord> = serde_json::from_str(raw)?;

    let documents: Vec<Document> = records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| Document {
            id: record.id.unwrap_or_else(|| format!("{}-{}", stem, idx)),
            content: record.content,
            meta: record.meta,
        })
        .collect();

    if documents.is_empty() {
        warn!("Corpus contains no documents");
    }

    Ok(documents)
}

fn corpus_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("doc")
        .to_string()
}

/// Text of a single-file corpus, read according to its MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();

    if mime_type.starts_with("application/pdf") {
        info!("Extracting text from PDF: {}", path.display());
        let raw = extract_text(path)
            .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

        // PDF extraction leaves runs of spaces and blank lines behind
        let content = normalize_whitespace(&raw);
        if content.is_empty() {
            warn!("No text extracted from {}", path.display());
        }
        return Ok(content);
    }

    ensure!(
        mime_type.starts_with("text/"),
        "Unsupported corpus format: {}. Expected a JSON corpus, a text file or a PDF.",
        mime_type
    );

    info!("Reading text corpus: {}", path.display());
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read text file: {}", path.display()))
}

/// Squeeze runs of spaces and blank lines; form feeds (page breaks) are kept
fn normalize_whitespace(text: &str) -> String {
    let lines = text.lines().map(squeeze_spaces).collect::<Vec<_>>().join("\n");
    collapse_empty_lines(&lines).trim().to_string()
}

fn squeeze_spaces(line: &str) -> String {
    let mut squeezed = String::with_capacity(line.len());
    for c in line.chars().filter(|&c| c != '\r') {
        if c == ' ' && squeezed.ends_with(' ') {
            continue;
        }
        squeezed.push(c);
    }
    squeezed
}
