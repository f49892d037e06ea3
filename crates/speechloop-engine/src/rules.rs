//! Prioritized rule tables.
//!
//! A [`RuleTable`] is evaluated in list order, and list order is derived from
//! each rule's numeric `priority` (lower runs first). Insertion keeps the
//! table sorted and never places a specific rule behind a catch-all.

use serde::{Deserialize, Serialize};

/// Tier for rules that target one exact construct.
pub const PRIORITY_SPECIFIC: u32 = 100;

/// Tier for ordinary rules.
pub const PRIORITY_DEFAULT: u32 = 500;

/// Rules at or above this priority are generic catch-alls.
pub const PRIORITY_CATCH_ALL: u32 = 900;

fn default_priority() -> u32 {
    PRIORITY_DEFAULT
}

/// One pattern → replacement rewrite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    /// Stable identifier, used for deduplication.
    pub id: String,
    /// Regular expression matched against the working text.
    pub pattern: String,
    /// Replacement text; `${1}`-style capture references are allowed.
    pub replacement: String,
    /// Semantic area this rule governs (e.g. `power`, `fraction`).
    pub context: String,
    /// Evaluation precedence, lower first.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
            context: context.into(),
            priority: PRIORITY_DEFAULT,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_catch_all(&self) -> bool {
        self.priority >= PRIORITY_CATCH_ALL
    }

    /// Two rules are the same rule if they share an id, or match the same
    /// pattern for the same context.
    pub fn same_identity(&self, other: &Rule) -> bool {
        self.id == other.id || (self.pattern == other.pattern && self.context == other.context)
    }
}

/// Where [`RuleTable::insert_rule`] put a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsertOutcome {
    /// New rule inserted at `index`.
    Inserted { index: usize },
    /// An existing rule with the same identity was replaced; now at `index`.
    Replaced { index: usize },
    /// An identical rule already exists at `index`.
    Unchanged { index: usize },
}

impl InsertOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Inserted { index } | Self::Replaced { index } | Self::Unchanged { index } => {
                *index
            }
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }
}

/// Named, ordered rule collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleTable {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Builder form of [`insert_rule`](Self::insert_rule).
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.insert_rule(rule);
        self
    }

    /// Insert `rule` at its precedence position.
    ///
    /// Deduplicates by [`Rule::same_identity`]: an identical rule is left
    /// alone, a differing one is removed and re-inserted. A non-catch-all rule
    /// always lands before the first catch-all, even if the table on disk was
    /// hand-edited out of priority order.
    pub fn insert_rule(&mut self, rule: Rule) -> InsertOutcome {
        if let Some(existing) = self.rules.iter().position(|r| r.same_identity(&rule)) {
            if self.rules[existing] == rule {
                return InsertOutcome::Unchanged { index: existing };
            }
            self.rules.remove(existing);
            let index = self.position_for(&rule);
            self.rules.insert(index, rule);
            return InsertOutcome::Replaced { index };
        }

        let index = self.position_for(&rule);
        self.rules.insert(index, rule);
        InsertOutcome::Inserted { index }
    }

    fn position_for(&self, rule: &Rule) -> usize {
        let by_priority = self
            .rules
            .iter()
            .position(|r| r.priority > rule.priority)
            .unwrap_or(self.rules.len());

        if rule.is_catch_all() {
            return by_priority;
        }
        match self.first_catch_all() {
            Some(catch_all) => by_priority.min(catch_all),
            None => by_priority,
        }
    }

    /// Index of the first catch-all rule, if any.
    pub fn first_catch_all(&self) -> Option<usize> {
        self.rules.iter().position(Rule::is_catch_all)
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.id == id)
    }

    /// True when no rule is preceded by a rule of higher priority.
    pub fn is_precedence_ordered(&self) -> bool {
        self.rules.windows(2).all(|w| w[0].priority <= w[1].priority)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power_table() -> RuleTable {
        RuleTable::new("powers").with_rule(
            Rule::new("power-generic", r"\^(\w+)", " to the ${1}", "power")
                .with_priority(PRIORITY_CATCH_ALL),
        )
    }

    #[test]
    fn specific_rule_lands_before_catch_all() {
        let mut table = power_table();
        let outcome = table.insert_rule(
            Rule::new("power-squared", r"\^2\b", " squared", "power")
                .with_priority(PRIORITY_SPECIFIC),
        );

        assert_eq!(outcome, InsertOutcome::Inserted { index: 0 });
        assert_eq!(table.position_of("power-generic"), Some(1));
        assert!(table.is_precedence_ordered());
    }

    #[test]
    fn equal_priority_keeps_insertion_order() {
        let mut table = RuleTable::new("operators");
        table.insert_rule(Rule::new("plus", r"\+", " plus ", "operator"));
        table.insert_rule(Rule::new("minus", "-", " minus ", "operator"));

        assert_eq!(table.position_of("plus"), Some(0));
        assert_eq!(table.position_of("minus"), Some(1));
    }

    #[test]
    fn unsorted_table_still_places_rule_before_catch_all() {
        // Hand-edited artifact: catch-all sits ahead of a default-tier rule.
        let mut table = RuleTable {
            name: "fractions".to_string(),
            rules: vec![
                Rule::new("generic", r"\b(\w+)/(\w+)\b", "${1} over ${2}", "fraction")
                    .with_priority(PRIORITY_CATCH_ALL),
                Rule::new("legacy", r"\b1/3\b", "one third", "fraction").with_priority(200),
            ],
        };

        let outcome = table.insert_rule(
            Rule::new("half", r"\b1/2\b", "one half", "fraction").with_priority(PRIORITY_DEFAULT),
        );

        assert_eq!(outcome.index(), 0);
    }

    #[test]
    fn identical_rule_is_unchanged() {
        let mut table = power_table();
        let rule = Rule::new("power-squared", r"\^2\b", " squared", "power")
            .with_priority(PRIORITY_SPECIFIC);

        assert!(table.insert_rule(rule.clone()).changed());
        assert_eq!(table.insert_rule(rule), InsertOutcome::Unchanged { index: 0 });
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn same_pattern_and_context_replaces_in_place() {
        let mut table = RuleTable::new("fractions")
            .with_rule(
                Rule::new("fraction-half", r"\b1/2\b", "one half", "fraction")
                    .with_priority(PRIORITY_SPECIFIC),
            )
            .with_rule(
                Rule::new("fraction-generic", r"\b(\w+)/(\w+)\b", "${1} over ${2}", "fraction")
                    .with_priority(PRIORITY_CATCH_ALL),
            );

        let outcome = table.insert_rule(
            Rule::new("fraction-1-2", r"\b1/2\b", "one over two", "fraction")
                .with_priority(PRIORITY_SPECIFIC),
        );

        assert_eq!(outcome, InsertOutcome::Replaced { index: 0 });
        assert_eq!(table.len(), 2);
        assert_eq!(table.rules[0].replacement, "one over two");
    }

    #[test]
    fn catch_all_goes_after_existing_catch_alls() {
        let mut table = power_table();
        let outcome = table.insert_rule(
            Rule::new("power-paren", r"\^\((\w+)\)", " to the ${1}", "power")
                .with_priority(PRIORITY_CATCH_ALL),
        );
        assert_eq!(outcome, InsertOutcome::Inserted { index: 1 });
    }
}
