//! Synthesizers for the notation error types.

use std::sync::OnceLock;

use regex::Regex;
use speechloop_engine::{
    number_to_words, RelationStrategy, Rule, RuleArtifact, Section, SectionBody, PRIORITY_CATCH_ALL,
    PRIORITY_SPECIFIC,
};

use super::{IssueSynthesizer, PatchDraft};
use crate::classify::Issue;
use crate::domain::{Edit, ErrorType, PatchKind};

const DERIVATIVES_TABLE: &str = "derivatives";
const POWERS_TABLE: &str = "powers";
const FRACTIONS_TABLE: &str = "fractions";

fn is_table_stage(section: &Section, needle: &str) -> bool {
    matches!(&section.body, SectionBody::RuleTable { table } if table.contains(needle))
}

fn is_derivative_stage(section: &Section) -> bool {
    is_table_stage(section, "derivative")
}

fn is_fraction_stage(section: &Section) -> bool {
    is_table_stage(section, "fraction")
}

fn any_section(root: &Section, predicate: fn(&Section) -> bool) -> bool {
    let mut found = false;
    root.walk(&mut |section| found |= predicate(section));
    found
}

fn leibniz_rule() -> Rule {
    Rule::new(
        "derivative-leibniz",
        r"\bd/d([a-z])\b\s*",
        "d by d ${1} of ",
        "derivative",
    )
    .with_priority(PRIORITY_SPECIFIC)
}

/// Innermost pipeline where a fraction stage runs before a derivative
/// sibling, rebuilt with the derivative stages moved just ahead of the
/// first fraction stage. Other stages keep their relative order.
fn reorder_derivatives_first(section: &Section) -> Option<Section> {
    let SectionBody::Pipeline { stages } = &section.body else {
        return None;
    };

    for child in stages {
        if let Some(found) = reorder_derivatives_first(child) {
            return Some(found);
        }
    }

    let first_fraction = stages.iter().position(is_fraction_stage)?;
    let last_derivative = stages.iter().rposition(is_derivative_stage)?;
    if last_derivative < first_fraction {
        return None;
    }

    let mut reordered = Vec::with_capacity(stages.len());
    for (index, stage) in stages.iter().enumerate() {
        if index == first_fraction {
            reordered.extend(stages.iter().filter(|s| is_derivative_stage(s)).cloned());
        }
        if !is_derivative_stage(stage) {
            reordered.push(stage.clone());
        }
    }
    Some(Section::pipeline(section.name.clone(), reordered))
}

/// Pipeline containing the first fraction stage, with a new derivative
/// stage inserted ahead of it.
fn insert_derivative_stage(section: &Section) -> Option<Section> {
    let SectionBody::Pipeline { stages } = &section.body else {
        return None;
    };
    if let Some(first_fraction) = stages.iter().position(is_fraction_stage) {
        let mut with_stage = stages.clone();
        with_stage.insert(
            first_fraction,
            Section::table(DERIVATIVES_TABLE, DERIVATIVES_TABLE),
        );
        return Some(Section::pipeline(section.name.clone(), with_stage));
    }
    stages.iter().find_map(insert_derivative_stage)
}

/// Derivative handling must see `d/dx` before generic fraction handling
/// turns it into "d over dx".
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivativeOrderSynthesizer;

impl IssueSynthesizer for DerivativeOrderSynthesizer {
    fn error_type(&self) -> ErrorType {
        ErrorType::DerivativeNotation
    }

    fn synthesize(&self, issue: &Issue, artifact: &RuleArtifact) -> Option<PatchDraft> {
        if issue.examples.is_empty() {
            return None;
        }

        if let Some(section) = reorder_derivatives_first(&artifact.root) {
            return Some(PatchDraft {
                kind: PatchKind::FunctionReplacement,
                description: format!(
                    "Run derivative handling before fraction handling in section '{}'",
                    section.name
                ),
                edits: vec![Edit::ReplaceSection { section }],
            });
        }

        if !any_section(&artifact.root, is_derivative_stage) {
            let mut edits = Vec::new();
            if artifact.find_section(DERIVATIVES_TABLE).is_none() {
                if let Some(section) = insert_derivative_stage(&artifact.root) {
                    edits.push(Edit::ReplaceSection { section });
                }
            }
            edits.push(Edit::InsertRule {
                table: DERIVATIVES_TABLE.to_string(),
                rule: leibniz_rule(),
            });
            return Some(PatchDraft {
                kind: PatchKind::EngineUpdate,
                description: "Add Leibniz derivative handling ahead of fraction handling"
                    .to_string(),
                edits,
            });
        }

        let has_leibniz = artifact
            .table(DERIVATIVES_TABLE)
            .is_some_and(|t| t.rules.iter().any(|r| r.context == "derivative"));
        if has_leibniz {
            return None;
        }
        Some(PatchDraft {
            kind: PatchKind::RuleTableUpdate,
            description: "Add Leibniz derivative rule".to_string(),
            edits: vec![Edit::InsertRule {
                table: DERIVATIVES_TABLE.to_string(),
                rule: leibniz_rule(),
            }],
        })
    }
}

/// Adds the `∂/∂x` reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialDerivativeSynthesizer;

impl IssueSynthesizer for PartialDerivativeSynthesizer {
    fn error_type(&self) -> ErrorType {
        ErrorType::PartialDerivativeNotation
    }

    fn synthesize(&self, issue: &Issue, _artifact: &RuleArtifact) -> Option<PatchDraft> {
        if !issue.examples.iter().any(|e| e.expression.contains('∂')) {
            return None;
        }
        let rule = Rule::new(
            "derivative-partial",
            r"∂/∂([a-z])\b\s*",
            "partial by partial ${1} of ",
            "partial_derivative",
        )
        .with_priority(PRIORITY_SPECIFIC);

        Some(PatchDraft {
            kind: PatchKind::RuleTableUpdate,
            description: format!("Read partial derivatives in {}", issue.category),
            edits: vec![Edit::InsertRule {
                table: DERIVATIVES_TABLE.to_string(),
                rule,
            }],
        })
    }
}

/// Swaps the relation section for context-aware "is"/"equals" selection.
#[derive(Debug, Clone, Copy)]
pub struct EqualsIsSynthesizer {
    pub max_operands: usize,
}

impl Default for EqualsIsSynthesizer {
    fn default() -> Self {
        Self { max_operands: 3 }
    }
}

impl IssueSynthesizer for EqualsIsSynthesizer {
    fn error_type(&self) -> ErrorType {
        ErrorType::EqualsVsIs
    }

    fn synthesize(&self, issue: &Issue, artifact: &RuleArtifact) -> Option<PatchDraft> {
        let strategy = RelationStrategy::ContextAware {
            max_operands: self.max_operands,
        };

        let mut existing: Option<(String, RelationStrategy)> = None;
        artifact.root.walk(&mut |section| {
            if existing.is_some() {
                return;
            }
            if let SectionBody::Relation { strategy } = &section.body {
                existing = Some((section.name.clone(), strategy.clone()));
            }
        });

        let name = match existing {
            Some((_, current)) if current == strategy => return None,
            Some((name, _)) => name,
            None => "relations".to_string(),
        };

        Some(PatchDraft {
            kind: PatchKind::FunctionReplacement,
            description: format!(
                "Replace '{}' with context-aware equals/is selection ({} failures in {})",
                name, issue.count, issue.category
            ),
            edits: vec![Edit::ReplaceSection {
                section: Section::relation(name, strategy),
            }],
        })
    }
}

/// Adds "squared"/"cubed" ahead of the generic "to the" reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerNotationSynthesizer;

impl IssueSynthesizer for PowerNotationSynthesizer {
    fn error_type(&self) -> ErrorType {
        ErrorType::PowerNotation
    }

    fn synthesize(&self, issue: &Issue, _artifact: &RuleArtifact) -> Option<PatchDraft> {
        let wants = |word: &str| {
            issue
                .examples
                .iter()
                .any(|e| e.expected_speech.split_whitespace().any(|w| w == word))
        };

        let mut rules = Vec::new();
        if wants("squared") {
            rules.push(
                Rule::new("power-squared", r"\^2\b", " squared", "power")
                    .with_priority(PRIORITY_SPECIFIC),
            );
        }
        if wants("cubed") {
            rules.push(
                Rule::new("power-cubed", r"\^3\b", " cubed", "power")
                    .with_priority(PRIORITY_SPECIFIC),
            );
        }
        let wants_generic = issue
            .examples
            .iter()
            .any(|e| e.expected_speech.contains(" to the "));
        if wants_generic {
            rules.push(
                Rule::new("power-generic", r"\^(\w+)", " to the ${1}", "power")
                    .with_priority(PRIORITY_CATCH_ALL),
            );
        }
        if rules.is_empty() {
            return None;
        }

        let names: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        let description = format!("Add power readings: {}", names.join(", "));
        Some(PatchDraft {
            kind: PatchKind::RuleTableUpdate,
            description,
            edits: rules
                .into_iter()
                .map(|rule| Edit::InsertRule {
                    table: POWERS_TABLE.to_string(),
                    rule,
                })
                .collect(),
        })
    }
}

fn fraction_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d+)/(\d+)\b").expect("static fraction pattern"))
}

/// Conventional English name, e.g. `(2, 3)` → "two thirds".
pub fn fraction_name(numerator: u64, denominator: u64) -> Option<String> {
    let (singular, plural) = match denominator {
        2 => ("half", "halves"),
        3 => ("third", "thirds"),
        4 => ("quarter", "quarters"),
        5 => ("fifth", "fifths"),
        6 => ("sixth", "sixths"),
        7 => ("seventh", "sevenths"),
        8 => ("eighth", "eighths"),
        9 => ("ninth", "ninths"),
        10 => ("tenth", "tenths"),
        _ => return None,
    };
    let noun = if numerator == 1 { singular } else { plural };
    Some(format!("{} {}", number_to_words(numerator), noun))
}

/// Adds a literal rule for each numeric fraction whose conventional name
/// the expected speech uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct FractionNameSynthesizer;

impl IssueSynthesizer for FractionNameSynthesizer {
    fn error_type(&self) -> ErrorType {
        ErrorType::FractionNames
    }

    fn synthesize(&self, issue: &Issue, _artifact: &RuleArtifact) -> Option<PatchDraft> {
        let mut rules: Vec<Rule> = Vec::new();
        for example in &issue.examples {
            let padded = format!(" {} ", example.expected_speech);
            for caps in fraction_token_regex().captures_iter(&example.expression) {
                let (Ok(numerator), Ok(denominator)) =
                    (caps[1].parse::<u64>(), caps[2].parse::<u64>())
                else {
                    continue;
                };
                let Some(name) = fraction_name(numerator, denominator) else {
                    continue;
                };
                if !padded.contains(&format!(" {} ", name)) {
                    continue;
                }
                let pattern = format!(r"\b{}/{}\b", numerator, denominator);
                if rules.iter().any(|r| r.pattern == pattern) {
                    continue;
                }
                rules.push(
                    Rule::new(
                        format!("fraction-{}-{}", numerator, denominator),
                        pattern,
                        name,
                        "fraction",
                    )
                    .with_priority(PRIORITY_SPECIFIC),
                );
            }
        }
        if rules.is_empty() {
            return None;
        }

        Some(PatchDraft {
            kind: PatchKind::RuleTableUpdate,
            description: format!(
                "Name {} fraction(s) in {}",
                rules.len(),
                issue.category
            ),
            edits: rules
                .into_iter()
                .map(|rule| Edit::InsertRule {
                    table: FRACTIONS_TABLE.to_string(),
                    rule,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::domain::{FailureRecord, TestCase};

    fn issue(category: &str, cases: &[(&str, &str, &str)]) -> Issue {
        let examples: Vec<FailureRecord> = cases
            .iter()
            .map(|(expression, expected, actual)| {
                let case = TestCase::new(category, *expression, *expected);
                FailureRecord::mismatch(&case, actual.to_string(), classify(expected, actual), 1)
            })
            .collect();
        Issue {
            category: category.to_string(),
            error_type: examples[0].error_type,
            count: examples.len(),
            examples,
        }
    }

    fn derivative_issue() -> Issue {
        issue(
            "calculus",
            &[("d/dx f(x)", "d by d x of f of x", "d over dx f of x")],
        )
    }

    #[test]
    fn derivative_patch_reorders_only_the_notation_pipeline() {
        let draft = DerivativeOrderSynthesizer
            .synthesize(&derivative_issue(), &RuleArtifact::reference())
            .unwrap();

        assert_eq!(draft.kind, PatchKind::FunctionReplacement);
        let Edit::ReplaceSection { section } = &draft.edits[0] else {
            panic!("expected section replacement");
        };
        assert_eq!(section.name, "notation");
        let names: Vec<_> = section.children().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["derivatives", "fractions"]);
    }

    #[test]
    fn derivative_patch_is_not_repeated_once_ordered() {
        let mut artifact = RuleArtifact::reference();
        let draft = DerivativeOrderSynthesizer
            .synthesize(&derivative_issue(), &artifact)
            .unwrap();
        let Edit::ReplaceSection { section } = &draft.edits[0] else {
            panic!("expected section replacement");
        };
        assert!(artifact.replace_section(&section.name, section));

        assert!(DerivativeOrderSynthesizer
            .synthesize(&derivative_issue(), &artifact)
            .is_none());
    }

    #[test]
    fn derivative_stage_is_added_when_missing() {
        let mut artifact = RuleArtifact::template();
        artifact.ensure_table("fractions");
        artifact.append_top_level(Section::table("fractions", "fractions"));

        let draft = DerivativeOrderSynthesizer
            .synthesize(&derivative_issue(), &artifact)
            .unwrap();
        assert_eq!(draft.kind, PatchKind::EngineUpdate);
        assert_eq!(draft.edits.len(), 2);
        let Edit::ReplaceSection { section } = &draft.edits[0] else {
            panic!("expected section replacement");
        };
        let names: Vec<_> = section.children().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["numbers", "derivatives", "fractions"]);
    }

    #[test]
    fn partial_rule_targets_derivative_table() {
        let issue = issue(
            "advanced_notation",
            &[(
                "∂/∂x f(x)",
                "partial by partial x of f of x",
                "∂/∂x f of x",
            )],
        );
        let draft = PartialDerivativeSynthesizer
            .synthesize(&issue, &RuleArtifact::reference())
            .unwrap();
        let Edit::InsertRule { table, rule } = &draft.edits[0] else {
            panic!("expected rule insertion");
        };
        assert_eq!(table, DERIVATIVES_TABLE);
        let re = Regex::new(&rule.pattern).unwrap();
        assert_eq!(
            re.replace_all("∂/∂x f(x)", rule.replacement.as_str()),
            "partial by partial x of f(x)"
        );
    }

    #[test]
    fn equals_patch_replaces_existing_relation_section() {
        let issue = issue(
            "arithmetic",
            &[("2 + 3 = 5", "two plus three is five", "two plus three equals five")],
        );
        let draft = EqualsIsSynthesizer::default()
            .synthesize(&issue, &RuleArtifact::reference())
            .unwrap();
        assert_eq!(
            draft.edits,
            vec![Edit::ReplaceSection {
                section: Section::relation(
                    "relations",
                    RelationStrategy::ContextAware { max_operands: 3 }
                )
            }]
        );
    }

    #[test]
    fn equals_patch_is_skipped_when_already_context_aware() {
        let mut artifact = RuleArtifact::reference();
        artifact.replace_section(
            "relations",
            &Section::relation("relations", RelationStrategy::ContextAware { max_operands: 3 }),
        );
        let issue = issue(
            "edge_cases",
            &[("2 = 2", "two is two", "two equals two")],
        );
        assert!(EqualsIsSynthesizer::default()
            .synthesize(&issue, &artifact)
            .is_none());
    }

    #[test]
    fn power_patch_adds_only_requested_forms() {
        let issue = issue("algebra", &[("x^2", "x squared", "x to the two")]);
        let draft = PowerNotationSynthesizer
            .synthesize(&issue, &RuleArtifact::reference())
            .unwrap();
        assert_eq!(draft.edits.len(), 1);
        assert!(matches!(
            &draft.edits[0],
            Edit::InsertRule { rule, .. } if rule.id == "power-squared"
        ));
    }

    #[test]
    fn fraction_names() {
        assert_eq!(fraction_name(1, 2).as_deref(), Some("one half"));
        assert_eq!(fraction_name(2, 3).as_deref(), Some("two thirds"));
        assert_eq!(fraction_name(3, 4).as_deref(), Some("three quarters"));
        assert_eq!(fraction_name(5, 11), None);
    }

    #[test]
    fn fraction_patch_learns_named_fractions_only() {
        let issue = issue(
            "fraction_naming",
            &[
                ("2/3", "two thirds", "two over three"),
                ("3/4 * x", "three quarters times x", "three over four times x"),
            ],
        );
        let draft = FractionNameSynthesizer
            .synthesize(&issue, &RuleArtifact::reference())
            .unwrap();

        let patterns: Vec<_> = draft
            .edits
            .iter()
            .filter_map(|e| match e {
                Edit::InsertRule { rule, .. } => Some(rule.pattern.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(patterns, vec![r"\b2/3\b", r"\b3/4\b"]);
    }

    #[test]
    fn fraction_patch_respects_over_reading() {
        let issue = issue(
            "fraction_naming",
            &[("5/8", "five over eight", "five eighths")],
        );
        assert!(FractionNameSynthesizer
            .synthesize(&issue, &RuleArtifact::reference())
            .is_none());
    }
}
