//! Persisted engine artifact: rule tables plus a tree of named sections.
//!
//! Sections are the unit of "function replacement". Each one is addressable
//! by name anywhere in the tree, so a patch can swap exactly one node,
//! nested or not, without touching its parent.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::rules::{Rule, RuleTable, PRIORITY_CATCH_ALL, PRIORITY_SPECIFIC};
use crate::Result;

/// Current artifact schema version.
pub const SCHEMA_VERSION: &str = "1.0";

/// How `=` is spoken.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelationStrategy {
    AlwaysEquals,
    AlwaysIs,
    /// "is" for plain numeric arithmetic with at most `max_operands` operands
    /// on the left-hand side (or when the caller tags the case `arithmetic`),
    /// "equals" otherwise.
    ContextAware { max_operands: usize },
}

/// Behavior of one named section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SectionBody {
    /// Run child sections in order.
    Pipeline { stages: Vec<Section> },
    /// Apply every rule of the named table, in table order.
    RuleTable { table: String },
    /// Speak relation symbols.
    Relation { strategy: RelationStrategy },
    /// Spell out numerals.
    Numbers,
}

/// A named processing step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub body: SectionBody,
}

impl Section {
    pub fn pipeline(name: impl Into<String>, stages: Vec<Section>) -> Self {
        Self {
            name: name.into(),
            body: SectionBody::Pipeline { stages },
        }
    }

    pub fn table(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: SectionBody::RuleTable {
                table: table.into(),
            },
        }
    }

    pub fn relation(name: impl Into<String>, strategy: RelationStrategy) -> Self {
        Self {
            name: name.into(),
            body: SectionBody::Relation { strategy },
        }
    }

    pub fn numbers(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: SectionBody::Numbers,
        }
    }

    /// Direct children (empty unless this is a pipeline).
    pub fn children(&self) -> &[Section] {
        match &self.body {
            SectionBody::Pipeline { stages } => stages,
            _ => &[],
        }
    }

    /// Depth-first, pre-order search by exact name.
    pub fn find(&self, name: &str) -> Option<&Section> {
        if self.name == name {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(name))
    }

    /// Replace the first section named `name` (pre-order) with `replacement`.
    ///
    /// Only the matching node is swapped; siblings and ancestors are kept.
    pub fn replace(&mut self, name: &str, replacement: &Section) -> bool {
        if self.name == name {
            *self = replacement.clone();
            return true;
        }
        if let SectionBody::Pipeline { stages } = &mut self.body {
            for child in stages.iter_mut() {
                if child.replace(name, replacement) {
                    return true;
                }
            }
        }
        false
    }

    /// True if this section or any descendant applies `table`.
    pub fn references_table(&self, table: &str) -> bool {
        match &self.body {
            SectionBody::RuleTable { table: t } => t == table,
            SectionBody::Pipeline { stages } => stages.iter().any(|s| s.references_table(table)),
            _ => false,
        }
    }

    /// Visit this section and all descendants, pre-order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Section)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

/// The engine's persisted source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleArtifact {
    pub schema_version: String,
    pub name: String,
    pub root: Section,
    #[serde(default)]
    pub tables: Vec<RuleTable>,
}

impl RuleArtifact {
    /// Smallest valid artifact: spells numerals and nothing else.
    pub fn template() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            name: "template".to_string(),
            root: Section::pipeline("naturalize", vec![Section::numbers("numbers")]),
            tables: Vec::new(),
        }
    }

    /// Seed artifact for a fresh workspace.
    ///
    /// Deliberately imperfect: fraction handling runs before derivative
    /// handling, `=` is always "equals", and powers only have the generic
    /// "to the" form. These are the gaps the improvement loop closes.
    pub fn reference() -> Self {
        let fractions = RuleTable::new("fractions")
            .with_rule(
                Rule::new("fraction-half", r"\b1/2\b", "one half", "fraction")
                    .with_priority(PRIORITY_SPECIFIC),
            )
            .with_rule(
                Rule::new("fraction-quarter", r"\b1/4\b", "one quarter", "fraction")
                    .with_priority(PRIORITY_SPECIFIC),
            )
            .with_rule(
                Rule::new(
                    "fraction-generic",
                    r"\b(\w+)/(\w+)\b",
                    "${1} over ${2}",
                    "fraction",
                )
                .with_priority(PRIORITY_CATCH_ALL),
            );

        let derivatives = RuleTable::new("derivatives").with_rule(
            Rule::new(
                "derivative-leibniz",
                r"\bd/d([a-z])\b\s*",
                "d by d ${1} of ",
                "derivative",
            )
            .with_priority(PRIORITY_SPECIFIC),
        );

        let powers = RuleTable::new("powers").with_rule(
            Rule::new("power-generic", r"\^(\w+)", " to the ${1}", "power")
                .with_priority(PRIORITY_CATCH_ALL),
        );

        let operators = RuleTable::new("operators")
            .with_rule(Rule::new("operator-plus", r"\+", " plus ", "operator"))
            .with_rule(Rule::new("operator-minus", "-", " minus ", "operator"))
            .with_rule(Rule::new("operator-times", r"\*|×", " times ", "operator"))
            .with_rule(Rule::new("operator-divide", "÷", " divided by ", "operator"));

        let functions = RuleTable::new("functions").with_rule(Rule::new(
            "function-application",
            r"\b([A-Za-z]+)\(([^()]+)\)",
            "${1} of ${2}",
            "function",
        ));

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            name: "reference".to_string(),
            root: Section::pipeline(
                "naturalize",
                vec![
                    Section::relation("relations", RelationStrategy::AlwaysEquals),
                    Section::pipeline(
                        "notation",
                        vec![
                            Section::table("fractions", "fractions"),
                            Section::table("derivatives", "derivatives"),
                        ],
                    ),
                    Section::table("powers", "powers"),
                    Section::table("operators", "operators"),
                    Section::table("functions", "functions"),
                    Section::numbers("numbers"),
                    Section::table("output_fixes", "output_fixes"),
                ],
            ),
            tables: vec![
                fractions,
                derivatives,
                powers,
                operators,
                functions,
                RuleTable::new("output_fixes"),
            ],
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read an artifact from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write the artifact to disk, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn find_section(&self, name: &str) -> Option<&Section> {
        self.root.find(name)
    }

    /// Replace a named section anywhere in the tree. Returns false if absent.
    pub fn replace_section(&mut self, name: &str, replacement: &Section) -> bool {
        self.root.replace(name, replacement)
    }

    /// Append a stage to the top-level pipeline. A non-pipeline root is
    /// wrapped first so the result stays a valid tree.
    pub fn append_top_level(&mut self, section: Section) {
        if !matches!(self.root.body, SectionBody::Pipeline { .. }) {
            let old_root = std::mem::replace(
                &mut self.root,
                Section::pipeline("naturalize", Vec::new()),
            );
            if let SectionBody::Pipeline { stages } = &mut self.root.body {
                stages.push(old_root);
            }
        }
        if let SectionBody::Pipeline { stages } = &mut self.root.body {
            stages.push(section);
        }
    }

    pub fn table(&self, name: &str) -> Option<&RuleTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut RuleTable> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    /// Get a table, creating an empty one if it does not exist yet.
    pub fn ensure_table(&mut self, name: &str) -> &mut RuleTable {
        if let Some(index) = self.tables.iter().position(|t| t.name == name) {
            return &mut self.tables[index];
        }
        self.tables.push(RuleTable::new(name));
        let last = self.tables.len() - 1;
        &mut self.tables[last]
    }

    /// Make sure some section applies `table`; appends a top-level stage if not.
    /// Returns true when a stage was added.
    pub fn ensure_table_referenced(&mut self, table: &str) -> bool {
        if self.root.references_table(table) {
            return false;
        }
        let mut name = table.to_string();
        let mut suffix = 1;
        while self.find_section(&name).is_some() {
            suffix += 1;
            name = format!("{}_{}", table, suffix);
        }
        self.append_top_level(Section::table(name, table));
        true
    }

    /// Check structural invariants that do not need regex compilation.
    pub fn check_structure(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicate = None;
        let mut missing = None;
        self.root.walk(&mut |section| {
            if !seen.insert(section.name.as_str()) && duplicate.is_none() {
                duplicate = Some(section.name.clone());
            }
            if let SectionBody::RuleTable { table } = &section.body {
                if missing.is_none() && self.table(table).is_none() {
                    missing = Some(table.clone());
                }
            }
        });
        if let Some(name) = duplicate {
            return Err(EngineError::DuplicateSection(name));
        }
        if let Some(table) = missing {
            return Err(EngineError::UnknownTable(table));
        }
        Ok(())
    }
}
