//! Test cases and the per-cycle corpus.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One expression with the speech it must produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub expression: String,
    #[serde(rename = "expected")]
    pub expected_speech: String,
    /// Filled from the enclosing corpus key; not repeated on disk.
    #[serde(default, skip_serializing)]
    pub category: String,
    /// Optional hint forwarded to the engine (e.g. `arithmetic`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl TestCase {
    pub fn new(
        category: impl Into<String>,
        expression: impl Into<String>,
        expected_speech: impl Into<String>,
    ) -> Self {
        Self {
            expression: expression.into(),
            expected_speech: expected_speech.into(),
            category: category.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

type CorpusFile = BTreeMap<String, Vec<TestCase>>;

/// Category → ordered test cases. Persisted as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CorpusFile", into = "CorpusFile")]
pub struct Corpus {
    categories: CorpusFile,
}

impl From<CorpusFile> for Corpus {
    fn from(mut categories: CorpusFile) -> Self {
        for (name, cases) in categories.iter_mut() {
            for case in cases.iter_mut() {
                case.category = name.clone();
            }
        }
        Self { categories }
    }
}

impl From<Corpus> for CorpusFile {
    fn from(corpus: Corpus) -> Self {
        corpus.categories
    }
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a case to its category, creating the category if needed.
    pub fn push(&mut self, case: TestCase) {
        self.categories
            .entry(case.category.clone())
            .or_default()
            .push(case);
    }

    /// Total number of cases across all categories.
    pub fn total(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn cases(&self, category: &str) -> &[TestCase] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All cases, category by category, each category in list order.
    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.categories.values().flatten()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_fills_category_from_key() {
        let json = r#"{
            "arithmetic": [{"expression": "2 + 3 = 5", "expected": "two plus three is five"}],
            "algebra": [{"expression": "x^2", "expected": "x squared", "context": "power"}]
        }"#;
        let corpus = Corpus::from_json(json).expect("parse");

        assert_eq!(corpus.total(), 2);
        assert_eq!(corpus.cases("arithmetic")[0].category, "arithmetic");
        assert_eq!(corpus.cases("algebra")[0].context.as_deref(), Some("power"));
    }

    #[test]
    fn serialized_corpus_is_a_category_map() {
        let mut corpus = Corpus::new();
        corpus.push(TestCase::new("edge", "0", "zero"));

        let value = serde_json::to_value(&corpus).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"edge": [{"expression": "0", "expected": "zero"}]})
        );
    }

    #[test]
    fn iter_preserves_order_within_category() {
        let mut corpus = Corpus::new();
        corpus.push(TestCase::new("calculus", "b", "b"));
        corpus.push(TestCase::new("calculus", "a", "a"));

        let expressions: Vec<_> = corpus.iter().map(|c| c.expression.as_str()).collect();
        assert_eq!(expressions, vec!["b", "a"]);
        assert!(corpus.cases("missing").is_empty());
    }
}
