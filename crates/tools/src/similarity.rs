//! Answer similarity between the two search sources.
//!
//! Texts are interleaved: even-indexed answers build `text1`, odd-indexed
//! answers build `text2`. With the two search results in log order this
//! compares one provider against the other.
//!
//! Scoring is TF-IDF cosine similarity over the two documents:
//! term counts over lowercased tokens of two or more word characters,
//! smoothed idf `ln((1 + n) / (1 + df)) + 1`, then L2 normalization.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use twinsearch_core::error::ToolError;
use twinsearch_core::message::{Message, Role};
use twinsearch_core::search::SearchReport;
use twinsearch_core::tool::{Bookkeeper, ToolResult};

pub const TOOL_NAME: &str = "answer_similarity";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub text1: String,
    pub text2: String,
    /// Cosine similarity in [0, 1]; 0.0 when either side has no terms.
    pub similarity_score: f64,
    /// Score × 100, rounded to two decimals.
    pub similarity_percentage: f64,
}

/// Compare the interleaved halves of `answers`.
pub fn answer_similarity(answers: &[String]) -> SimilarityReport {
    let mut text1 = String::new();
    let mut text2 = String::new();
    for (i, answer) in answers.iter().enumerate() {
        let side = if i % 2 == 0 { &mut text1 } else { &mut text2 };
        side.push_str(answer);
        side.push(' ');
    }
    let text1 = text1.trim().to_string();
    let text2 = text2.trim().to_string();

    let similarity_score = tfidf_cosine(&text1, &text2);
    SimilarityReport {
        text1,
        text2,
        similarity_score,
        similarity_percentage: (similarity_score * 10_000.0).round() / 100.0,
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

fn term_counts(text: &str) -> BTreeMap<String, f64> {
    let mut counts = BTreeMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0.0) += 1.0;
    }
    counts
}

/// TF-IDF cosine similarity of two documents.
pub fn tfidf_cosine(a: &str, b: &str) -> f64 {
    let a = term_counts(a);
    let b = term_counts(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let n = 2.0_f64;
    let idf = |term: &str| {
        let df = f64::from(u8::from(a.contains_key(term)) + u8::from(b.contains_key(term)));
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    };

    let weigh = |counts: &BTreeMap<String, f64>| -> BTreeMap<String, f64> {
        let weighted: BTreeMap<String, f64> = counts
            .iter()
            .map(|(term, tf)| (term.clone(), tf * idf(term)))
            .collect();
        let norm = weighted.values().map(|w| w * w).sum::<f64>().sqrt();
        weighted
            .into_iter()
            .map(|(term, w)| (term, w / norm))
            .collect()
    };

    let va = weigh(&a);
    let vb = weigh(&b);
    let dot: f64 = va
        .iter()
        .filter_map(|(term, wa)| vb.get(term).map(|wb| wa * wb))
        .sum();

    dot.clamp(0.0, 1.0)
}

/// Bookkeeper comparing the answers produced by the named search tools.
pub struct AnswerSimilarity {
    search_tools: HashSet<String>,
}

impl AnswerSimilarity {
    pub fn new<'a>(search_tools: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            search_tools: search_tools.into_iter().map(String::from).collect(),
        }
    }

    /// Synthesis texts of every search result in the log, in log order.
    fn search_answers(&self, log: &[Message]) -> Result<Vec<String>, ToolError> {
        let call_names: HashMap<&str, &str> = log
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_calls.iter())
            .map(|tc| (tc.id.as_str(), tc.name.as_str()))
            .collect();

        let mut answers = Vec::new();
        for msg in log.iter().filter(|m| m.role == Role::Tool) {
            let Some(name) = msg
                .tool_call_id
                .as_deref()
                .and_then(|id| call_names.get(id))
            else {
                continue;
            };
            if !self.search_tools.contains(*name) {
                continue;
            }
            let report: SearchReport =
                serde_json::from_str(&msg.content).map_err(|e| ToolError::ExecutionFailed {
                    tool_name: TOOL_NAME.into(),
                    reason: format!("malformed {name} result: {e}"),
                })?;
            answers.push(report.text);
        }
        Ok(answers)
    }
}

impl Bookkeeper for AnswerSimilarity {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn run(&self, log: &[Message]) -> Result<ToolResult, ToolError> {
        let answers = self.search_answers(log)?;
        let report = answer_similarity(&answers);
        tracing::debug!(
            answers = answers.len(),
            score = report.similarity_score,
            "Computed answer similarity"
        );

        let data = serde_json::to_value(&report).map_err(|e| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: e.to_string(),
        })?;
        let output = serde_json::to_string_pretty(&data).map_err(|e| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: e.to_string(),
        })?;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: Some(data),
        })
    }
}
