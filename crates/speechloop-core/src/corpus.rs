//! Phase selection and per-cycle corpus generation.
//!
//! Each cycle draws its corpus from one [`Phase`]. The phase comes from a
//! cycle-number schedule and is advanced early when the previous cycle
//! already saturated the scheduled phase's focus categories.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Corpus, CycleResult, Result, TestCase};
use crate::obs;
use crate::storage::{self, Layout};

/// Curriculum stage that decides which categories a corpus contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Broad,
    StructuralFixes,
    TargetedImprovements,
    EdgeCases,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broad => "broad",
            Self::StructuralFixes => "structural_fixes",
            Self::TargetedImprovements => "targeted_improvements",
            Self::EdgeCases => "edge_cases",
        }
    }

    /// Phase to move to once this one is saturated.
    pub fn next(self) -> Phase {
        match self {
            Self::Broad => Self::StructuralFixes,
            Self::StructuralFixes => Self::TargetedImprovements,
            Self::TargetedImprovements => Self::EdgeCases,
            Self::EdgeCases => Self::Broad,
        }
    }

    /// Categories this phase's corpus contains.
    pub fn focus_categories(self) -> Vec<&'static str> {
        phase_cases(self).iter().map(|(name, _)| *name).collect()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "broad" => Ok(Self::Broad),
            "structural_fixes" | "structural" => Ok(Self::StructuralFixes),
            "targeted_improvements" | "targeted" => Ok(Self::TargetedImprovements),
            "edge_cases" | "edge" => Ok(Self::EdgeCases),
            other => Err(format!("unknown phase '{}'", other)),
        }
    }
}

/// Inclusive cycle range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWindow {
    pub first: u32,
    pub last: u32,
}

impl PhaseWindow {
    pub fn contains(&self, cycle: u32) -> bool {
        self.first <= cycle && cycle <= self.last
    }
}

/// Cycle-number schedule; cycles outside every window are broad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSchedule {
    pub structural_fixes: PhaseWindow,
    pub targeted_improvements: PhaseWindow,
    pub edge_cases: PhaseWindow,
}

impl Default for PhaseSchedule {
    fn default() -> Self {
        Self {
            structural_fixes: PhaseWindow { first: 2, last: 5 },
            targeted_improvements: PhaseWindow { first: 6, last: 10 },
            edge_cases: PhaseWindow {
                first: 11,
                last: 15,
            },
        }
    }
}

impl PhaseSchedule {
    pub fn phase_for(&self, cycle: u32) -> Phase {
        if self.structural_fixes.contains(cycle) {
            Phase::StructuralFixes
        } else if self.targeted_improvements.contains(cycle) {
            Phase::TargetedImprovements
        } else if self.edge_cases.contains(cycle) {
            Phase::EdgeCases
        } else {
            Phase::Broad
        }
    }
}

/// Picks the phase for a cycle from the schedule plus saturation.
#[derive(Debug, Clone)]
pub struct PhaseSelector {
    schedule: PhaseSchedule,
    saturation_threshold: f64,
}

impl PhaseSelector {
    pub fn new(schedule: PhaseSchedule, saturation_threshold: f64) -> Self {
        Self {
            schedule,
            saturation_threshold,
        }
    }

    pub fn select(&self, cycle: u32, previous: Option<&CycleResult>) -> Phase {
        let scheduled = self.schedule.phase_for(cycle);
        match previous {
            Some(result) if self.is_saturated(scheduled, result) => {
                let next = scheduled.next();
                info!(
                    cycle,
                    scheduled = %scheduled,
                    selected = %next,
                    "Scheduled phase saturated; advancing"
                );
                next
            }
            _ => scheduled,
        }
    }

    /// Every focus category was evaluated and met the threshold.
    pub fn is_saturated(&self, phase: Phase, result: &CycleResult) -> bool {
        phase.focus_categories().iter().all(|category| {
            result
                .score(category)
                .is_some_and(|score| score >= self.saturation_threshold)
        })
    }
}

/// What [`CorpusGenerator::generate`] wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub cycle: u32,
    pub phase: Phase,
    pub total_examples: usize,
    pub categories: Vec<String>,
    pub path: PathBuf,
}

/// Builds and persists the corpus for a cycle.
#[derive(Debug, Clone)]
pub struct CorpusGenerator {
    layout: Layout,
}

impl CorpusGenerator {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Deterministic corpus for `phase`.
    pub fn build(phase: Phase) -> Corpus {
        let mut corpus = Corpus::new();
        for (category, cases) in phase_cases(phase) {
            for (expression, expected) in *cases {
                corpus.push(TestCase::new(*category, *expression, *expected));
            }
        }
        corpus
    }

    /// Build the corpus and write it to `corpus/cycle_<N>.json`.
    pub fn generate(&self, cycle: u32, phase: Phase) -> Result<CorpusSummary> {
        let corpus = Self::build(phase);
        let path = self.layout.corpus_path(cycle);
        storage::write_json(&path, &corpus)?;
        obs::emit_corpus_generated(cycle, phase.as_str(), corpus.total());

        Ok(CorpusSummary {
            cycle,
            phase,
            total_examples: corpus.total(),
            categories: corpus.category_names(),
            path,
        })
    }
}

type Cases = &'static [(&'static str, &'static str)];

fn phase_cases(phase: Phase) -> &'static [(&'static str, Cases)] {
    match phase {
        Phase::Broad => BROAD,
        Phase::StructuralFixes => STRUCTURAL,
        Phase::TargetedImprovements => TARGETED,
        Phase::EdgeCases => EDGE,
    }
}

const BROAD: &[(&str, Cases)] = &[
    (
        "arithmetic",
        &[
            ("2 + 3 = 5", "two plus three is five"),
            ("7 - 4 = 3", "seven minus four is three"),
            ("6 * 7 = 42", "six times seven is forty two"),
            ("10 ÷ 2 = 5", "ten divided by two is five"),
        ],
    ),
    (
        "algebra",
        &[
            ("x + 1 = 5", "x plus one equals five"),
            ("x^2 + y^2", "x squared plus y squared"),
            ("2 * x - 3", "two times x minus three"),
            ("x^3", "x cubed"),
        ],
    ),
    (
        "calculus",
        &[
            ("d/dx f(x)", "d by d x of f of x"),
            ("d/dt g(t)", "d by d t of g of t"),
            ("sin(x)", "sin of x"),
        ],
    ),
    (
        "fraction_naming",
        &[
            ("1/2", "one half"),
            ("1/4", "one quarter"),
            ("2/3", "two thirds"),
            ("5/8", "five over eight"),
        ],
    ),
    (
        "advanced_notation",
        &[
            ("∂/∂x f(x)", "partial by partial x of f of x"),
            ("x^n", "x to the n"),
            ("e^x", "e to the x"),
        ],
    ),
    (
        "linear_algebra",
        &[
            ("det(A)", "determinant of A"),
            ("A^T", "A transpose"),
            ("A * B", "A times B"),
        ],
    ),
    (
        "composite",
        &[
            ("f(x) = x^2 + 1", "f of x equals x squared plus one"),
            ("d/dx x^3 = 3 * x^2", "d by d x of x cubed equals three times x squared"),
        ],
    ),
];

const STRUCTURAL: &[(&str, Cases)] = &[
    (
        "derivatives",
        &[
            ("d/dx f(x)", "d by d x of f of x"),
            ("d/dy g(y)", "d by d y of g of y"),
            ("d/dt h(t)", "d by d t of h of t"),
            ("d/dx sin(x)", "d by d x of sin of x"),
        ],
    ),
    (
        "partial_derivatives",
        &[
            ("∂/∂x f(x)", "partial by partial x of f of x"),
            ("∂/∂y g(y)", "partial by partial y of g of y"),
            ("∂/∂t u(t)", "partial by partial t of u of t"),
        ],
    ),
];

const TARGETED: &[(&str, Cases)] = &[
    (
        "mixed_notation",
        &[
            ("d/dx x^2", "d by d x of x squared"),
            ("1/2 + 1/4", "one half plus one quarter"),
            ("x^2 = 4", "x squared equals four"),
            ("3/4 * x", "three quarters times x"),
        ],
    ),
    (
        "powers",
        &[
            ("y^2", "y squared"),
            ("z^3", "z cubed"),
            ("a^n", "a to the n"),
        ],
    ),
];

const EDGE: &[(&str, Cases)] = &[(
    "edge_cases",
    &[
        ("0", "zero"),
        ("x", "x"),
        ("-1", "minus one"),
        ("x^2", "x squared"),
        ("10", "ten"),
        ("f(x)", "f of x"),
        ("2 = 2", "two is two"),
    ],
)];
