//! Failure classification and improvement-target selection.
//!
//! Classification looks at words, not characters, and the first matching
//! check wins. `exception` is never produced here: the runner assigns it
//! when the engine errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{CycleResult, ErrorType, FailureRecord};

const FRACTION_WORDS: &[&str] = &[
    "half", "halves", "third", "thirds", "quarter", "quarters", "fourth", "fourths", "fifth",
    "fifths", "sixth", "sixths", "seventh", "sevenths", "eighth", "eighths", "ninth", "ninths",
    "tenth", "tenths",
];

const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve",
];

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn has_word(words: &[String], word: &str) -> bool {
    words.iter().any(|w| w == word)
}

fn has_bigram(words: &[String], first: &str, second: &str) -> bool {
    words.windows(2).any(|w| w[0] == first && w[1] == second)
}

fn has_number_over_number(words: &[String]) -> bool {
    words.windows(3).any(|w| {
        NUMBER_WORDS.contains(&w[0].as_str())
            && w[1] == "over"
            && NUMBER_WORDS.contains(&w[2].as_str())
    })
}

/// Classify a mismatch between expected and actual speech.
pub fn classify(expected: &str, actual: &str) -> ErrorType {
    let expected = words(expected);
    let actual = words(actual);

    if has_bigram(&expected, "d", "by") && !has_word(&expected, "partial") {
        return ErrorType::DerivativeNotation;
    }

    if has_word(&expected, "partial") && (has_word(&expected, "by") || has_word(&expected, "over"))
    {
        return ErrorType::PartialDerivativeNotation;
    }

    if (has_word(&expected, "is") && has_word(&actual, "equals"))
        || (has_word(&expected, "equals") && has_word(&actual, "is"))
    {
        return ErrorType::EqualsVsIs;
    }

    if has_word(&expected, "squared")
        || has_word(&expected, "cubed")
        || has_bigram(&expected, "to", "the")
    {
        return ErrorType::PowerNotation;
    }

    if has_number_over_number(&expected)
        || FRACTION_WORDS.iter().any(|w| has_word(&expected, w))
    {
        return ErrorType::FractionNames;
    }

    ErrorType::Other
}

/// One improvement target: an error type inside an under-performing category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: String,
    pub error_type: ErrorType,
    pub count: usize,
    pub examples: Vec<FailureRecord>,
}

/// Categories scoring below `threshold`, each with its `max_issues` most
/// frequent error types. Ties break on taxonomy order.
pub fn select_issues(result: &CycleResult, threshold: f64, max_issues: usize) -> Vec<Issue> {
    let mut issues = Vec::new();

    for (category, score) in &result.category_scores {
        if *score >= threshold {
            continue;
        }

        let mut by_type: BTreeMap<ErrorType, Vec<FailureRecord>> = BTreeMap::new();
        for failure in result.failures_in(category) {
            by_type
                .entry(failure.error_type)
                .or_default()
                .push(failure.clone());
        }

        let mut ranked: Vec<(ErrorType, Vec<FailureRecord>)> = by_type.into_iter().collect();
        ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));

        for (error_type, examples) in ranked.into_iter().take(max_issues) {
            issues.push(Issue {
                category: category.clone(),
                error_type,
                count: examples.len(),
                examples,
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CaseOutcome, TestCase};
    use chrono::Utc;

    #[test]
    fn derivative_notation() {
        assert_eq!(
            classify("d by d x of f of x", "d over dx f of x"),
            ErrorType::DerivativeNotation
        );
    }

    #[test]
    fn partial_derivative_notation() {
        assert_eq!(
            classify("partial by partial x of f of x", "∂ over ∂x f of x"),
            ErrorType::PartialDerivativeNotation
        );
    }

    #[test]
    fn equals_vs_is_both_directions() {
        assert_eq!(
            classify("two plus three is five", "two plus three equals five"),
            ErrorType::EqualsVsIs
        );
        assert_eq!(
            classify("x plus one equals five", "x plus one is five"),
            ErrorType::EqualsVsIs
        );
    }

    #[test]
    fn derivative_check_runs_before_relations() {
        assert_eq!(
            classify(
                "d by d x of x cubed equals three times x squared",
                "d over dx x to the three is three times x to the two"
            ),
            ErrorType::DerivativeNotation
        );
    }

    #[test]
    fn power_notation() {
        assert_eq!(classify("x squared", "x to the two"), ErrorType::PowerNotation);
        assert_eq!(classify("x to the n", "x ^ n"), ErrorType::PowerNotation);
    }

    #[test]
    fn fraction_names() {
        assert_eq!(classify("two thirds", "two over three"), ErrorType::FractionNames);
        assert_eq!(classify("five over eight", "5/8"), ErrorType::FractionNames);
    }

    #[test]
    fn unmatched_is_other() {
        assert_eq!(classify("determinant of A", "det of A"), ErrorType::Other);
        assert_eq!(classify("", ""), ErrorType::Other);
    }

    fn failing(category: &str, expected: &str, actual: &str) -> CaseOutcome {
        let case = TestCase::new(category, "expr", expected);
        CaseOutcome::failed(FailureRecord::mismatch(
            &case,
            actual.to_string(),
            classify(expected, actual),
            1,
        ))
    }

    #[test]
    fn select_issues_skips_healthy_categories_and_ranks_by_count() {
        let outcomes = vec![
            CaseOutcome::passed("arithmetic"),
            failing("calculus", "x squared", "x to the two"),
            failing("calculus", "d by d x of f", "d over dx f"),
            failing("calculus", "d by d t of g", "d over dt g"),
            failing("calculus", "det of A", "x"),
            failing("calculus", "two thirds", "two over three"),
        ];
        let result = CycleResult::aggregate(1, Utc::now(), outcomes);

        let issues = select_issues(&result, 0.98, 3);
        assert!(issues.iter().all(|i| i.category == "calculus"));
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].error_type, ErrorType::DerivativeNotation);
        assert_eq!(issues[0].count, 2);
        // single-count ties fall back to taxonomy order
        assert_eq!(issues[1].error_type, ErrorType::PowerNotation);
        assert_eq!(issues[2].error_type, ErrorType::FractionNames);
    }

    #[test]
    fn category_at_threshold_is_not_targeted() {
        let result = CycleResult::aggregate(
            1,
            Utc::now(),
            vec![
                CaseOutcome::passed("algebra"),
                failing("algebra", "x squared", "x to the two"),
            ],
        );
        assert!(select_issues(&result, 0.5, 3).is_empty());
        assert_eq!(select_issues(&result, 0.6, 3).len(), 1);
    }
}
