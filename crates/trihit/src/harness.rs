//! Fixture-driven validation of an intersection backend.

use std::fmt;

use log::{info, warn};

use crate::backend::{intersect, IntersectionBackend};
use crate::fixtures::TestCase;
use crate::kernel::KernelOptions;

/// Comparison tolerance: 32 ulp at 1.0 (`32 × 2⁻²³`).
///
/// Scaled by the expected magnitude above 1, so long distances get the same
/// number of ulps as short ones.
pub const TEST_TOLERANCE: f32 = 32.0 * f32::EPSILON;

const RULE: &str = "----------------------------------------";

/// Whether a computed distance matches an expected one.
///
/// Infinities only match infinities of the same sign; NaN never matches.
pub fn distances_match(got: f32, expected: f32) -> bool {
    if expected.is_infinite() || got.is_infinite() {
        return got == expected;
    }
    (got - expected).abs() <= TEST_TOLERANCE * expected.abs().max(1.0)
}

/// Index of the first mismatching distance, counting a length difference as
/// a mismatch at the end of the shorter buffer.
pub fn first_mismatch(got: &[f32], expected: &[f32]) -> Option<usize> {
    got.iter()
        .zip(expected)
        .position(|(g, e)| !distances_match(*g, *e))
        .or_else(|| (got.len() != expected.len()).then(|| got.len().min(expected.len())))
}

/// Result of one case.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseStatus {
    /// Every distance matched.
    Passed,
    /// Distances differed from the expected ones.
    Mismatch {
        /// Full result buffer.
        got: Vec<f32>,
        /// First mismatching index.
        index: usize,
    },
    /// The backend had no device to run on.
    NoResponse,
    /// The backend returned an error.
    Failed(String),
}

/// One case's name, expectation, and status.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseOutcome {
    /// Case name.
    pub name: String,
    /// Expected distances.
    pub expected: Vec<f32>,
    /// What happened.
    pub status: CaseStatus,
}

impl CaseOutcome {
    /// Whether the case passed.
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CaseStatus::Passed => return write!(f, "[{}]: SUCCESS", self.name),
            CaseStatus::Mismatch { got, index } => {
                let at = |buf: &[f32]| buf.get(*index).map_or("-".to_string(), f32::to_string);
                writeln!(f, "Got {:?} expected {:?}", got, self.expected)?;
                writeln!(
                    f,
                    "(First mismatch at index {index}: {} !== {})",
                    at(got.as_slice()),
                    at(self.expected.as_slice())
                )?;
            }
            CaseStatus::NoResponse => {
                writeln!(f, "Got no response for testcase {}.", self.name)?;
            }
            CaseStatus::Failed(message) => {
                writeln!(f, "Testcase {} failed: {message}", self.name)?;
            }
        }
        write!(f, "[{}]: FAIL", self.name)
    }
}

/// Outcomes of a harness run, in case order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarnessReport {
    /// One outcome per case.
    pub outcomes: Vec<CaseOutcome>,
}

impl HarnessReport {
    /// Cases that passed.
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    /// Cases run.
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether every case passed.
    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    /// Per-case lines followed by the `passed/total` summary between rules.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            out.push_str(&outcome.to_string());
            out.push('\n');
        }
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!("{}/{} tests passed\n", self.passed(), self.total()));
        out.push_str(RULE);
        out
    }
}

/// Run every case once (`intersection_count = 1`) on `backend`.
///
/// A case with no device response or a backend error fails; the remaining
/// cases still run.
pub fn run_test_cases<B: IntersectionBackend + ?Sized>(
    backend: &mut B,
    cases: &[TestCase],
    options: &KernelOptions,
) -> HarnessReport {
    let options = options.with_intersection_count(1);
    info!("Running {} test cases on the {} backend", cases.len(), backend.name());

    let outcomes = cases
        .iter()
        .map(|case| {
            let result = intersect(&mut *backend, &case.rays, &case.triangles, &options);
            let status = match result {
                Ok(Some(got)) => match first_mismatch(&got, &case.expected) {
                    None => CaseStatus::Passed,
                    Some(index) => CaseStatus::Mismatch { got, index },
                },
                Ok(None) => CaseStatus::NoResponse,
                Err(e) => {
                    warn!("Test case {} errored: {e}", case.name);
                    CaseStatus::Failed(e.to_string())
                }
            };
            CaseOutcome {
                name: case.name.to_string(),
                expected: case.expected.clone(),
                status,
            }
        })
        .collect();

    let report = HarnessReport { outcomes };
    info!("{}/{} test cases passed", report.passed(), report.total());
    report
}
