use crate::scores::{ScoreRecord, ScoreSnapshot};

/// What a fresh scrape means relative to the stored baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// No baseline yet: store the scrape as-is, report nothing as new.
    Baseline,
    Unchanged,
    /// The table differs. `new` may be empty when rows only vanished or moved.
    Changed { new: Vec<ScoreRecord> },
}

/// Records of `current` with no exact match in `previous`, in `current` order.
///
/// Every occurrence is tested on its own, so a duplicated row missing from
/// `previous` shows up twice.
pub fn diff(current: &[ScoreRecord], previous: &[ScoreRecord]) -> Vec<ScoreRecord> {
    current
        .iter()
        .filter(|record| !previous.contains(*record))
        .cloned()
        .collect()
}

pub fn evaluate(current: &ScoreSnapshot, previous: &ScoreSnapshot) -> DiffOutcome {
    if previous.is_empty() {
        DiffOutcome::Baseline
    } else if current == previous {
        DiffOutcome::Unchanged
    } else {
        DiffOutcome::Changed {
            new: diff(current, previous),
        }
    }
}
