use crate::document::{title_from_meta, Document};
use anyhow::{ensure, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

const PAGE_BREAK: char = '\u{c}';
const PAGE_BREAK_STR: &str = "\u{c}";

/// Characters inspected at the start/end of each page when looking for headers and footers
const HEADER_FOOTER_CHARS: usize = 300;
const HEADER_FOOTER_MIN_NGRAM: usize = 3;
const HEADER_FOOTER_MAX_NGRAM: usize = 30;

/// Unit used to measure passage length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitBy {
    Word,
    Sentence,
    /// Blank-line separated blocks
    Passage,
}

/// Byte range of a passage's text that is repeated in a neighbouring passage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOverlap {
    /// The neighbouring passage sharing the text
    pub passage_id: String,
    /// `[start, end)` byte range within this passage's text
    pub range: (usize, usize),
}

/// A retrieval unit cut from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// `<document id>-<split id>`
    pub id: String,
    pub document_id: String,
    pub text: String,
    /// Position of this passage within its document
    pub split_id: usize,
    /// 1-based page the passage starts on
    pub page: usize,
    pub overlaps: Vec<SplitOverlap>,
    /// Metadata inherited from the document
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Passage {
    pub fn title(&self) -> Option<&str> {
        title_from_meta(&self.meta)
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Cleaning and splitting parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PreProcessorConfig {
    pub clean_empty_lines: bool,
    pub clean_whitespace: bool,
    pub clean_header_footer: bool,
    pub split_by: SplitBy,
    pub split_length: usize,
    pub split_overlap: usize,
    pub split_respect_sentence_boundary: bool,
    pub add_page_number: bool,
    /// Passages longer than this many characters are cut
    pub max_chars_check: usize,
}

impl Default for PreProcessorConfig {
    fn default() -> Self {
        PreProcessorConfig {
            clean_empty_lines: true,
            clean_whitespace: true,
            clean_header_footer: false,
            split_by: SplitBy::Word,
            split_length: 200,
            split_overlap: 0,
            split_respect_sentence_boundary: true,
            add_page_number: false,
            max_chars_check: 10_000,
        }
    }
}

/// Cleans documents and splits them into overlapping passages
#[derive(Debug, Clone)]
pub struct PreProcessor {
    config: PreProcessorConfig,
}

impl PreProcessor {
    /// Validate a configuration and build a preprocessor from it
    pub fn new(mut config: PreProcessorConfig) -> Result<Self> {
        ensure!(config.split_length > 0, "split_length must be greater than 0");
        ensure!(
            config.split_overlap < config.split_length,
            "split_overlap ({}) must be less than split_length ({})",
            config.split_overlap,
            config.split_length
        );
        ensure!(config.max_chars_check > 0, "max_chars_check must be greater than 0");

        if config.split_respect_sentence_boundary && config.split_by != SplitBy::Word {
            warn!(
                "split_respect_sentence_boundary only applies to word splits; ignored for {:?}",
                config.split_by
            );
            config.split_respect_sentence_boundary = false;
        }

        Ok(PreProcessor { config })
    }

    /// 200-word passages with a 20-word overlap, packed by whole sentences
    pub fn word_split() -> Self {
        PreProcessor {
            config: PreProcessorConfig {
                clean_empty_lines: true,
                clean_whitespace: true,
                clean_header_footer: true,
                split_by: SplitBy::Word,
                split_length: 200,
                split_overlap: 20,
                split_respect_sentence_boundary: true,
                add_page_number: true,
                max_chars_check: 10_000,
            },
        }
    }

    /// 10-sentence passages with a 2-sentence overlap
    pub fn sentence_split() -> Self {
        PreProcessor {
            config: PreProcessorConfig {
                clean_empty_lines: true,
                clean_whitespace: true,
                clean_header_footer: true,
                split_by: SplitBy::Sentence,
                split_length: 10,
                split_overlap: 2,
                split_respect_sentence_boundary: false,
                add_page_number: true,
                max_chars_check: 10_000,
            },
        }
    }

    pub fn config(&self) -> &PreProcessorConfig {
        &self.config
    }

    /// Clean and split every document
    pub fn process(&self, documents: &[Document]) -> Vec<Passage> {
        let passages: Vec<Passage> = documents.iter().flat_map(|doc| self.split(doc)).collect();

        info!(
            "Split {} documents into {} passages (by {:?}, length {}, overlap {})",
            documents.len(),
            passages.len(),
            self.config.split_by,
            self.config.split_length,
            self.config.split_overlap
        );

        passages
    }

    /// Apply the configured cleaning steps to raw document text
    pub fn clean(&self, text: &str) -> String {
        let mut text = text.to_string();

        if self.config.clean_header_footer {
            text = remove_header_footer(&text);
        }

        if self.config.clean_whitespace {
            text = text
                .split(PAGE_BREAK)
                .map(|page| page.lines().map(str::trim).collect::<Vec<_>>().join("\n"))
                .collect::<Vec<_>>()
                .join(PAGE_BREAK_STR);
        }

        if self.config.clean_empty_lines {
            text = collapse_empty_lines(&text);
        }

        text
    }

    /// Clean one document and cut it into passages
    pub fn split(&self, document: &Document) -> Vec<Passage> {
        let text = self.clean(&document.content);
        let length = self.config.split_length;
        let overlap = self.config.split_overlap;

        let (units, groups) = if self.config.split_respect_sentence_boundary {
            let sentences = sentence_spans(&text);
            let word_counts: Vec<usize> = sentences
                .iter()
                .map(|span| text[span.clone()].split_whitespace().count())
                .collect();
            if word_counts.iter().any(|&count| count > length) {
                warn!(
                    "Document {} has sentences longer than {} words; each becomes one passage",
                    document.id, length
                );
            }
            let groups = pack_sentences(&word_counts, length, overlap);
            (sentences, groups)
        } else {
            let units = match self.config.split_by {
                SplitBy::Word => word_spans(&text),
                SplitBy::Sentence => sentence_spans(&text),
                SplitBy::Passage => paragraph_spans(&text),
            };
            let groups = window_groups(units.len(), length, overlap);
            (units, groups)
        };

        let separator = match self.config.split_by {
            SplitBy::Passage => "\n\n",
            _ => " ",
        };

        let mut drafts = Vec::new();
        for (group_idx, group) in groups.iter().enumerate() {
            let (joined, offsets) = join_units(&text, &units[group.clone()], separator);
            let page = if self.config.add_page_number {
                1 + text[..units[group.start].start].matches(PAGE_BREAK).count()
            } else {
                1
            };

            if joined.chars().count() > self.config.max_chars_check {
                warn!(
                    "Passage {} of document {} exceeds {} characters and will be cut",
                    group_idx, document.id, self.config.max_chars_check
                );
                for piece in split_chars(&joined, self.config.max_chars_check) {
                    drafts.push(Draft {
                        text: piece,
                        page,
                        group: None,
                        offsets: Vec::new(),
                    });
                }
            } else {
                drafts.push(Draft {
                    text: joined,
                    page,
                    group: Some(group_idx),
                    offsets,
                });
            }
        }

        let mut passages: Vec<Passage> = drafts
            .iter()
            .enumerate()
            .map(|(split_id, draft)| Passage {
                id: format!("{}-{}", document.id, split_id),
                document_id: document.id.clone(),
                text: draft.text.clone(),
                split_id,
                page: draft.page,
                overlaps: Vec::new(),
                meta: document.meta.clone(),
            })
            .collect();

        for idx in 1..drafts.len() {
            let (prev, next) = (&drafts[idx - 1], &drafts[idx]);
            let (Some(a), Some(b)) = (prev.group, next.group) else {
                continue;
            };
            let shared = groups[b].start..groups[a].end;
            if shared.is_empty() {
                continue;
            }

            let prev_range = (
                prev.offsets[shared.start - groups[a].start].0,
                prev.offsets[shared.end - 1 - groups[a].start].1,
            );
            let next_range = (
                next.offsets[0].0,
                next.offsets[shared.end - 1 - groups[b].start].1,
            );

            let next_id = passages[idx].id.clone();
            let prev_id = passages[idx - 1].id.clone();
            passages[idx - 1].overlaps.push(SplitOverlap {
                passage_id: next_id,
                range: prev_range,
            });
            passages[idx].overlaps.push(SplitOverlap {
                passage_id: prev_id,
                range: next_range,
            });
        }

        debug!("Document {} -> {} passages", document.id, passages.len());
        passages
    }
}

/// A passage before ids are assigned
struct Draft {
    text: String,
    page: usize,
    /// Unit group the text was built from; `None` once cut by the character limit
    group: Option<usize>,
    /// Byte span of each unit inside `text`
    offsets: Vec<(usize, usize)>,
}

fn join_units(
    text: &str,
    units: &[Range<usize>],
    separator: &str,
) -> (String, Vec<(usize, usize)>) {
    let mut joined = String::new();
    let mut offsets = Vec::with_capacity(units.len());

    for unit in units {
        if !joined.is_empty() {
            joined.push_str(separator);
        }
        let start = joined.len();
        joined.push_str(&text[unit.clone()]);
        offsets.push((start, joined.len()));
    }

    (joined, offsets)
}

/// Fixed windows of `length` units advancing by `length - overlap`
fn window_groups(unit_count: usize, length: usize, overlap: usize) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    if unit_count == 0 {
        return groups;
    }

    let step = length - overlap;
    let mut start = 0;
    loop {
        let end = (start + length).min(unit_count);
        groups.push(start..end);
        if end == unit_count {
            break;
        }
        start += step;
    }

    groups
}

/// Pack whole sentences into groups of at most `length` words.
///
/// Trailing sentences of a flushed group are carried into the next one until
/// at least `overlap` words are repeated, so any non-zero overlap carries one
/// sentence or more. Carried sentences are dropped again when the next group
/// would exceed `length`. A sentence longer than `length` forms a group of its
/// own.
fn pack_sentences(word_counts: &[usize], length: usize, overlap: usize) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut words = 0;

    for (idx, &count) in word_counts.iter().enumerate() {
        if words + count > length && idx > start {
            groups.push(start..idx);

            // carry the tail of the flushed group
            let mut new_start = idx;
            let mut carried = 0;
            while new_start > start && carried < overlap {
                carried += word_counts[new_start - 1];
                new_start -= 1;
            }
            // but never past the length limit
            while new_start < idx && carried + count > length {
                carried -= word_counts[new_start];
                new_start += 1;
            }

            start = new_start;
            words = carried;
        }
        words += count;
    }

    if start < word_counts.len() {
        groups.push(start..word_counts.len());
    }

    groups
}

fn trimmed_span(text: &str, start: usize, end: usize) -> Option<Range<usize>> {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    Some(start + lead..start + lead + trimmed.len())
}

fn word_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;

    for (idx, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..idx);
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }

    spans
}

/// Sentence spans from Unicode sentence boundaries.
///
/// Boundaries caused only by a line wrap inside a sentence are undone: a
/// segment that does not end in terminal punctuation is joined with the next
/// one unless a blank line or a page break separates them.
fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = Vec::new();

    for (offset, segment) in text.split_sentence_bound_indices() {
        let Some(span) = trimmed_span(text, offset, offset + segment.len()) else {
            continue;
        };

        if let Some(last) = spans.last_mut() {
            let gap = &text[last.end..span.start];
            if !ends_sentence(&text[last.clone()])
                && !gap.contains("\n\n")
                && !gap.contains(PAGE_BREAK)
            {
                last.end = span.end;
                continue;
            }
        }
        spans.push(span);
    }

    spans
}

fn ends_sentence(sentence: &str) -> bool {
    sentence
        .trim_end_matches(['"', '\'', '\u{201d}', '\u{2019}', ')', ']'])
        .ends_with(['.', '!', '?', '\u{2026}'])
}

fn paragraph_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;

    for (idx, _) in text.match_indices("\n\n") {
        spans.extend(trimmed_span(text, start, idx));
        start = idx + 2;
    }
    spans.extend(trimmed_span(text, start, text.len()));

    spans
}

fn split_chars(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect::<String>())
        .collect()
}

/// Replace every run of two or more newlines with exactly two
pub(crate) fn collapse_empty_lines(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut newline_count = 0;

    for c in text.chars() {
        if c == '\n' {
            newline_count += 1;
            continue;
        }
        match newline_count {
            0 => {}
            1 => collapsed.push('\n'),
            _ => collapsed.push_str("\n\n"),
        }
        newline_count = 0;
        collapsed.push(c);
    }
    match newline_count {
        0 => {}
        1 => collapsed.push('\n'),
        _ => collapsed.push_str("\n\n"),
    }

    collapsed
}

/// Remove text repeated at the top and bottom of every page.
///
/// The first and the last page are not used to detect the header/footer but
/// are cleaned like the others.
fn remove_header_footer(text: &str) -> String {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    if pages.len() < 4 {
        return text.to_string();
    }

    let inner = 1..pages.len() - 1;

    let starts: Vec<String> = pages[inner.clone()]
        .iter()
        .map(|page| page.chars().take(HEADER_FOOTER_CHARS).collect())
        .collect();
    if let Some(header) = longest_common_ngram(&starts) {
        debug!("Removing header: {:?}", header);
        pages = pages.iter().map(|page| page.replace(&header, "")).collect();
    }

    let ends: Vec<String> = pages[inner]
        .iter()
        .map(|page| {
            let skip = page.chars().count().saturating_sub(HEADER_FOOTER_CHARS);
            page.chars().skip(skip).collect()
        })
        .collect();
    if let Some(footer) = longest_common_ngram(&ends) {
        debug!("Removing footer: {:?}", footer);
        pages = pages.iter().map(|page| page.replace(&footer, "")).collect();
    }

    pages.join(PAGE_BREAK_STR)
}

/// Token spans for n-gram search: split on spaces, and before every newline
fn ngram_tokens(seq: &str) -> Vec<Range<usize>> {
    let mut tokens = Vec::new();
    let mut start = 0;

    for (idx, c) in seq.char_indices() {
        if c == ' ' || c == '\n' {
            if idx > start {
                tokens.push(start..idx);
            }
            start = if c == ' ' { idx + 1 } else { idx };
        }
    }
    if seq.len() > start {
        tokens.push(start..seq.len());
    }

    tokens
}

fn ngrams(seq: &str) -> HashSet<&str> {
    let tokens = ngram_tokens(seq);
    let mut grams = HashSet::new();

    for n in HEADER_FOOTER_MIN_NGRAM..=HEADER_FOOTER_MAX_NGRAM {
        for window in tokens.windows(n) {
            grams.insert(&seq[window[0].start..window[n - 1].end]);
        }
    }

    grams
}

/// Longest word n-gram present in every sequence
fn longest_common_ngram(sequences: &[String]) -> Option<String> {
    let (first, rest) = sequences.split_first()?;

    let mut common = ngrams(first);
    for seq in rest {
        let grams = ngrams(seq);
        common.retain(|gram| grams.contains(gram));
    }

    common
        .into_iter()
        .filter(|gram| !gram.trim().is_empty())
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_config(length: usize, overlap: usize, respect: bool) -> PreProcessorConfig {
        PreProcessorConfig {
            split_by: SplitBy::Word,
            split_length: length,
            split_overlap: overlap,
            split_respect_sentence_boundary: respect,
            ..Default::default()
        }
    }

    fn sentence_text(count: usize) -> String {
        (0..count)
            .map(|i| format!("Sentence number {} has six words.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_word_windows_overlap() {
        let pre = PreProcessor::new(words_config(4, 2, false)).unwrap();
        let passages = pre.split(&Document::new("doc", "a b c d e f g h i j"));

        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c d", "c d e f", "e f g h", "g h i j"]);
        assert_eq!(passages[1].id, "doc-1");
        assert_eq!(passages[1].split_id, 1);
    }

    #[test]
    fn test_overlap_ranges_point_at_shared_text() {
        let pre = PreProcessor::new(words_config(4, 2, false)).unwrap();
        let passages = pre.split(&Document::new("doc", "a b c d e f"));

        assert_eq!(passages.len(), 2);
        let first = &passages[0].overlaps[0];
        let second = &passages[1].overlaps[0];
        assert_eq!(first.passage_id, "doc-1");
        assert_eq!(second.passage_id, "doc-0");
        assert_eq!(
            &passages[0].text[first.range.0..first.range.1],
            &passages[1].text[second.range.0..second.range.1]
        );
        assert_eq!(&passages[0].text[first.range.0..first.range.1], "c d");
    }

    #[test]
    fn test_sentence_boundary_packing_respects_length() {
        // each sentence has 6 words
        let pre = PreProcessor::new(words_config(20, 6, true)).unwrap();
        let passages = pre.split(&Document::new("doc", sentence_text(10)));

        assert!(passages.len() > 1);
        for passage in &passages {
            assert!(passage.word_count() <= 20, "{}", passage.text);
            assert!(passage.text.ends_with('.'));
        }
        // last sentence of a passage opens the next one
        assert!(passages[1].text.starts_with("Sentence number 2 "));
        assert!(passages[0].text.ends_with("Sentence number 2 has six words."));
    }

    #[test]
    fn test_sentences_longer_than_overlap_are_still_shared() {
        // 25 words per sentence, more than the preset's 20-word overlap
        let text = (0..30)
            .map(|i| format!("Sentence {} {}.", i, vec!["word"; 23].join(" ")))
            .collect::<Vec<_>>()
            .join(" ");
        let passages = PreProcessor::word_split().split(&Document::new("doc", text));

        assert!(passages.len() > 1);
        for pair in passages.windows(2) {
            assert!(pair[0].word_count() <= 200);
            assert!(
                pair[0].overlaps.iter().any(|o| o.passage_id == pair[1].id),
                "{} shares nothing with {}",
                pair[0].id,
                pair[1].id
            );
            let last_sentence = pair[0].text.rsplit(". ").next().unwrap_or_default();
            assert!(pair[1].text.starts_with(last_sentence.trim_end_matches('.')));
        }
    }

    #[test]
    fn test_long_sentence_becomes_its_own_passage() {
        let long = "This sentence is far too long to fit inside one small passage at all.";
        let text = format!("Short one here. {} Another short one.", long);
        let pre = PreProcessor::new(words_config(5, 0, true)).unwrap();
        let passages = pre.split(&Document::new("doc", text));

        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Short one here.", long, "Another short one."]);
    }

    #[test]
    fn test_sentence_split_preset_windows() {
        let passages =
            PreProcessor::sentence_split().split(&Document::new("doc", sentence_text(25)));

        // windows 0..10, 8..18, 16..25
        assert_eq!(passages.len(), 3);
        assert!(passages[1].text.starts_with("Sentence number 8 "));
        assert!(passages[2].text.starts_with("Sentence number 16 "));
        assert!(passages[2].text.ends_with("Sentence number 24 has six words."));
    }

    #[test]
    fn test_wrapped_lines_stay_in_one_sentence() {
        let spans = sentence_spans("The river\nruns deep. It is cold.\n\nNew paragraph");
        assert_eq!(spans.len(), 3);

        let text = "The river\nruns deep. It is cold.\n\nNew paragraph";
        assert_eq!(&text[spans[0].clone()], "The river\nruns deep.");
        assert_eq!(&text[spans[2].clone()], "New paragraph");
    }

    #[test]
    fn test_page_numbers_follow_page_breaks() {
        let config = PreProcessorConfig {
            add_page_number: true,
            ..words_config(3, 0, false)
        };
        let pre = PreProcessor::new(config).unwrap();
        let text = "one two three\u{c}four five six\u{c}\u{c}seven eight nine";
        let passages = pre.split(&Document::new("doc", text));

        let pages: Vec<usize> = passages.iter().map(|p| p.page).collect();
        assert_eq!(pages, vec![1, 2, 4]);
    }

    #[test]
    fn test_pages_default_to_one_without_page_numbers() {
        let pre = PreProcessor::new(words_config(3, 0, false)).unwrap();
        let passages = pre.split(&Document::new("doc", "one two three\u{c}four five six"));
        assert!(passages.iter().all(|p| p.page == 1));
    }

    #[test]
    fn test_paragraph_split() {
        let config = PreProcessorConfig {
            split_by: SplitBy::Passage,
            split_length: 2,
            split_overlap: 0,
            split_respect_sentence_boundary: false,
            ..Default::default()
        };
        let pre = PreProcessor::new(config).unwrap();
        let passages = pre.split(&Document::new("doc", "First.\n\nSecond.\n\n\n\nThird."));

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].text, "First.\n\nSecond.");
        assert_eq!(passages[1].text, "Third.");
    }

    #[test]
    fn test_clean_whitespace_and_empty_lines() {
        let pre = PreProcessor::new(PreProcessorConfig::default()).unwrap();
        let cleaned = pre.clean("  line one  \n\n\n\n   line two\t\n");
        assert_eq!(cleaned, "line one\n\nline two");
    }

    #[test]
    fn test_header_and_footer_removed() {
        let bodies = [
            "Avery walks to the mill before dawn.",
            "Verona tends the orchard in the hills.",
            "Toadswallow sells charms at the market.",
            "Gilkey sleeps alone under the bridge.",
            "Bristow rides north with the red heron.",
        ];
        let text = bodies
            .iter()
            .map(|body| {
                format!("The Kennet Almanac of Others\n{}\nprinted by the river press", body)
            })
            .collect::<Vec<_>>()
            .join("\u{c}");

        let config = PreProcessorConfig {
            clean_header_footer: true,
            ..Default::default()
        };
        let cleaned = PreProcessor::new(config).unwrap().clean(&text);

        assert!(!cleaned.contains("Kennet Almanac"));
        assert!(!cleaned.contains("river press"));
        for body in bodies {
            assert!(cleaned.contains(body));
        }
    }

    #[test]
    fn test_header_detection_needs_enough_pages() {
        let text = "Same header here\nbody a\u{c}Same header here\nbody b";
        assert_eq!(remove_header_footer(text), text);
    }

    #[test]
    fn test_passage_count_grows_with_corpus() {
        let pre = PreProcessor::word_split();
        let mut previous = 0;
        for sentences in 0..120 {
            let count = pre.split(&Document::new("doc", sentence_text(sentences))).len();
            assert!(count >= previous, "{} sentences: {} < {}", sentences, count, previous);
            previous = count;
        }

        let windows = PreProcessor::new(words_config(7, 3, false)).unwrap();
        let mut previous = 0;
        for words in 0..200 {
            let text = vec!["word"; words].join(" ");
            let count = windows.split(&Document::new("doc", text)).len();
            assert!(count >= previous);
            previous = count;
        }
    }

    #[test]
    fn test_word_and_sentence_sets_are_independent() {
        let docs = vec![Document::new("doc", sentence_text(30))];
        let mut by_word = PreProcessor::word_split().process(&docs);
        let by_sentence = PreProcessor::sentence_split().process(&docs);
        let snapshot = by_sentence.clone();

        for passage in &mut by_word {
            passage.text.clear();
        }
        by_word.clear();

        assert_eq!(by_sentence, snapshot);
    }

    #[test]
    fn test_meta_is_inherited() {
        let mut doc = Document::new("ch1", "Alexander is not dead.");
        doc.meta.insert("name".into(), Value::String("Chapter One".into()));

        let passages = PreProcessor::word_split().split(&doc);
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].document_id, "ch1");
        assert_eq!(passages[0].title(), Some("Chapter One"));
    }

    #[test]
    fn test_max_chars_check_cuts_passages() {
        let config = PreProcessorConfig {
            max_chars_check: 10,
            ..words_config(10, 0, false)
        };
        let pre = PreProcessor::new(config).unwrap();
        let passages = pre.split(&Document::new("doc", "abcdefgh ijklmnop"));

        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefgh i", "jklmnop"]);
        assert!(passages.iter().all(|p| p.overlaps.is_empty()));
    }

    #[test]
    fn test_empty_document_yields_no_passages() {
        let passages = PreProcessor::word_split().split(&Document::new("doc", " \n\n \u{c} "));
        assert!(passages.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PreProcessor::new(words_config(0, 0, false)).is_err());
        assert!(PreProcessor::new(words_config(5, 5, false)).is_err());

        let config = PreProcessorConfig {
            split_by: SplitBy::Sentence,
            split_respect_sentence_boundary: true,
            split_length: 3,
            ..Default::default()
        };
        let pre = PreProcessor::new(config).unwrap();
        assert!(!pre.config().split_respect_sentence_boundary);
    }
}
