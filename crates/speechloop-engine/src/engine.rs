//! Compiled rule engine and the [`Naturalizer`] seam the loop evaluates.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::artifact::{RelationStrategy, RuleArtifact, Section, SectionBody};
use crate::error::EngineError;
use crate::numbers::spell_numerals;
use crate::Result;

/// Converts a mathematical expression into spoken English.
///
/// Implementations must be deterministic for identical inputs.
pub trait Naturalizer: Send + Sync {
    fn naturalize(&self, expression: &str, context: Option<&str>) -> Result<String>;
}

/// Produces a [`Naturalizer`] from a persisted artifact.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, artifact_path: &Path) -> Result<Arc<dyn Naturalizer>>;
}

/// Loads a [`RuleEngine`] from a JSON [`RuleArtifact`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactEngineLoader;

#[async_trait]
impl EngineLoader for ArtifactEngineLoader {
    async fn load(&self, artifact_path: &Path) -> Result<Arc<dyn Naturalizer>> {
        let json = tokio::fs::read_to_string(artifact_path).await?;
        let artifact = RuleArtifact::from_json(&json)?;
        let engine = RuleEngine::from_artifact(&artifact)?;
        debug!(
            artifact = %artifact.name,
            tables = artifact.tables.len(),
            "Loaded rule engine"
        );
        Ok(Arc::new(engine))
    }
}

struct CompiledRule {
    regex: Regex,
    replacement: String,
}

enum Stage {
    Pipeline(Vec<Stage>),
    Table(String),
    Relation(RelationStrategy),
    Numbers,
}

/// An artifact compiled for evaluation.
pub struct RuleEngine {
    root: Stage,
    tables: HashMap<String, Vec<CompiledRule>>,
}

impl RuleEngine {
    /// Compile every rule and check the section tree.
    pub fn from_artifact(artifact: &RuleArtifact) -> Result<Self> {
        artifact.check_structure()?;

        let mut tables = HashMap::new();
        for table in &artifact.tables {
            let mut compiled = Vec::with_capacity(table.rules.len());
            for rule in &table.rules {
                let regex = Regex::new(&rule.pattern).map_err(|source| EngineError::InvalidRule {
                    table: table.name.clone(),
                    rule_id: rule.id.clone(),
                    source,
                })?;
                compiled.push(CompiledRule {
                    regex,
                    replacement: rule.replacement.clone(),
                });
            }
            tables.insert(table.name.clone(), compiled);
        }

        Ok(Self {
            root: compile_section(&artifact.root),
            tables,
        })
    }

    fn run(&self, stage: &Stage, text: &mut String, expression: &str, context: Option<&str>) {
        match stage {
            Stage::Pipeline(stages) => {
                for child in stages {
                    self.run(child, text, expression, context);
                }
            }
            Stage::Table(name) => {
                if let Some(rules) = self.tables.get(name) {
                    for rule in rules {
                        let replaced = rule
                            .regex
                            .replace_all(text.as_str(), rule.replacement.as_str())
                            .into_owned();
                        *text = replaced;
                    }
                }
            }
            Stage::Relation(strategy) => {
                let word = relation_word(strategy, expression, context);
                *text = text.replace('=', &format!(" {} ", word));
            }
            Stage::Numbers => {
                *text = spell_numerals(text);
            }
        }
    }
}

impl Naturalizer for RuleEngine {
    fn naturalize(&self, expression: &str, context: Option<&str>) -> Result<String> {
        if expression.trim().is_empty() {
            return Err(EngineError::EmptyExpression);
        }
        let mut text = expression.to_string();
        self.run(&self.root, &mut text, expression, context);
        Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

fn compile_section(section: &Section) -> Stage {
    match &section.body {
        SectionBody::Pipeline { stages } => {
            Stage::Pipeline(stages.iter().map(compile_section).collect())
        }
        SectionBody::RuleTable { table } => Stage::Table(table.clone()),
        SectionBody::Relation { strategy } => Stage::Relation(strategy.clone()),
        SectionBody::Numbers => Stage::Numbers,
    }
}

fn relation_word(
    strategy: &RelationStrategy,
    expression: &str,
    context: Option<&str>,
) -> &'static str {
    match strategy {
        RelationStrategy::AlwaysEquals => "equals",
        RelationStrategy::AlwaysIs => "is",
        RelationStrategy::ContextAware { max_operands } => {
            if context == Some("arithmetic") || is_simple_arithmetic(expression, *max_operands) {
                "is"
            } else {
                "equals"
            }
        }
    }
}

/// `a op b ... = c` over plain numerals, with at most `max_operands` on the left.
fn is_simple_arithmetic(expression: &str, max_operands: usize) -> bool {
    let Some((lhs, rhs)) = expression.split_once('=') else {
        return false;
    };
    if rhs.contains('=') {
        return false;
    }
    let allowed = |c: char| {
        c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '-' | '*' | '×' | '÷' | '.')
    };
    if !lhs.chars().all(allowed) || !rhs.chars().all(allowed) {
        return false;
    }
    let operands = count_numerals(lhs);
    operands >= 1 && operands <= max_operands && count_numerals(rhs) == 1
}

fn count_numerals(text: &str) -> usize {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|chunk| !chunk.is_empty())
        .count()
}
