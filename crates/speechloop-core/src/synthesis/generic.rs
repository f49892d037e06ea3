//! Fallback synthesis from word-level output diffs.

use speechloop_engine::{Rule, RuleArtifact};

use super::{IssueSynthesizer, PatchDraft};
use crate::classify::Issue;
use crate::domain::{Edit, ErrorType, PatchKind};

/// Table the fallback writes into; it runs on the final spoken text.
pub const OUTPUT_FIXES_TABLE: &str = "output_fixes";

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Literal pattern for `token`, word-bounded on sides that are word chars.
fn token_pattern(token: &str) -> String {
    let lead = if token.chars().next().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    let trail = if token.chars().last().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    format!("{}{}{}", lead, regex::escape(token), trail)
}

fn rule_id(token: &str) -> String {
    let slug: String = token
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("output-fix-{}", slug)
}

/// `$` is a capture reference in regex replacement templates.
fn literal_replacement(token: &str) -> String {
    token.replace('$', "$$")
}

/// One rewrite per position where the word sequences disagree.
///
/// Words are compared positionally over the shorter sequence; trailing
/// extra words on either side are not diffed.
pub fn diff_rules(expected: &str, actual: &str) -> Vec<Rule> {
    expected
        .split_whitespace()
        .zip(actual.split_whitespace())
        .filter(|(e, a)| e != a)
        .map(|(e, a)| {
            Rule::new(
                rule_id(a),
                token_pattern(a),
                literal_replacement(e),
                "output_fix",
            )
        })
        .collect()
}

/// Proposes the most frequent token rewrite across an issue's examples.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDiffSynthesizer;

impl IssueSynthesizer for GenericDiffSynthesizer {
    fn error_type(&self) -> ErrorType {
        ErrorType::Other
    }

    fn synthesize(&self, issue: &Issue, _artifact: &RuleArtifact) -> Option<PatchDraft> {
        let mut candidates: Vec<(Rule, usize)> = Vec::new();
        for example in &issue.examples {
            if example.error_type == ErrorType::Exception {
                continue;
            }
            for rule in diff_rules(&example.expected_speech, &example.actual_speech) {
                match candidates
                    .iter_mut()
                    .find(|(r, _)| r.pattern == rule.pattern && r.replacement == rule.replacement)
                {
                    Some((_, count)) => *count += 1,
                    None => candidates.push((rule, 1)),
                }
            }
        }

        let mut best: Option<(Rule, usize)> = None;
        for (rule, count) in candidates {
            if best.as_ref().map_or(true, |(_, top)| count > *top) {
                best = Some((rule, count));
            }
        }
        let (rule, count) = best?;

        Some(PatchDraft {
            kind: PatchKind::RuleTableUpdate,
            description: format!(
                "Rewrite '{}' as '{}' in {} output ({} of {} examples)",
                rule.pattern, rule.replacement, issue.category, count, issue.count
            ),
            edits: vec![Edit::InsertRule {
                table: OUTPUT_FIXES_TABLE.to_string(),
                rule,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::domain::{FailureRecord, TestCase};

    fn issue(pairs: &[(&str, &str)]) -> Issue {
        let examples: Vec<FailureRecord> = pairs
            .iter()
            .map(|(expected, actual)| {
                let case = TestCase::new("linear_algebra", "expr", *expected);
                FailureRecord::mismatch(&case, actual.to_string(), classify(expected, actual), 1)
            })
            .collect();
        Issue {
            category: "linear_algebra".to_string(),
            error_type: ErrorType::Other,
            count: examples.len(),
            examples,
        }
    }

    #[test]
    fn diff_rules_aligns_words() {
        let rules = diff_rules("determinant of A", "det of A");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, r"\bdet\b");
        assert_eq!(rules[0].replacement, "determinant");
        assert_eq!(rules[0].context, "output_fix");
    }

    #[test]
    fn diff_rules_compares_unequal_lengths_positionally() {
        let rules = diff_rules("A transpose", "A to the T");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, r"\bto\b");
        assert_eq!(rules[0].replacement, "transpose");

        let rules = diff_rules("the sum of a and b", "sum a b");
        assert_eq!(rules.len(), 3);
    }

    #[test]
    fn dollar_in_expected_speech_stays_literal() {
        let rules = diff_rules("five $ dollars", "five USD dollars");
        assert_eq!(rules[0].replacement, "$$");

        let re = regex::Regex::new(&rules[0].pattern).unwrap();
        assert_eq!(
            re.replace_all("five USD dollars", rules[0].replacement.as_str()),
            "five $ dollars"
        );
    }

    #[test]
    fn symbols_are_escaped_without_word_boundaries() {
        let rules = diff_rules("a times b", "a * b");
        assert_eq!(rules[0].pattern, r"\*");
        assert!(regex::Regex::new(&rules[0].pattern).is_ok());
    }

    #[test]
    fn most_frequent_rewrite_wins() {
        let issue = issue(&[
            ("sin of x", "sine of x"),
            ("determinant of A", "det of A"),
            ("determinant of B", "det of B"),
        ]);
        let draft = GenericDiffSynthesizer
            .synthesize(&issue, &RuleArtifact::template())
            .unwrap();

        match &draft.edits[0] {
            Edit::InsertRule { table, rule } => {
                assert_eq!(table, OUTPUT_FIXES_TABLE);
                assert_eq!(rule.replacement, "determinant");
            }
            other => panic!("unexpected edit {:?}", other),
        }
        assert!(draft.description.contains("2 of 3"));
    }

    #[test]
    fn ties_keep_first_seen() {
        let issue = issue(&[("sin of x", "sine of x"), ("determinant of A", "det of A")]);
        let draft = GenericDiffSynthesizer
            .synthesize(&issue, &RuleArtifact::template())
            .unwrap();
        assert!(matches!(
            &draft.edits[0],
            Edit::InsertRule { rule, .. } if rule.replacement == "sin"
        ));
    }

    #[test]
    fn nothing_to_learn_yields_none() {
        let issue = issue(&[("A transpose", "A")]);
        assert!(GenericDiffSynthesizer
            .synthesize(&issue, &RuleArtifact::template())
            .is_none());
    }
}
