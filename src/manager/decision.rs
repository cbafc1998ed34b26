//! Scan evaluation shared by every scan mode.
//!
//! [`evaluate_scan`] is pure: the manager gathers candidates and exclusions,
//! this decides, and the manager applies the result. Mode-specific
//! rescheduling stays in the manager.

use crate::candidate::{stable_candidates, Candidate, ExcludeSet, NetworkSelector};
use crate::scan::ScanMode;

/// Inputs to one evaluation besides the candidates themselves.
#[derive(Debug)]
pub struct ScanContext<'a> {
    /// Mode of the scan that produced the candidates.
    pub mode: ScanMode,
    /// Whether every band was scanned.
    pub full: bool,
    /// Device is moving fast and re-validation is enabled.
    pub high_mobility: bool,
    /// Largest RSSI change for a candidate to count as stable.
    pub rssi_delta_db: u8,
    /// Candidates of the previous high-mobility cycle, empty once stale.
    pub previous: &'a [Candidate],
    /// Exclusions for the primary session.
    pub primary_exclude: &'a ExcludeSet,
    /// Exclusions for a secondary session, `None` if no secondary is wanted.
    pub secondary_exclude: Option<&'a ExcludeSet>,
}

/// Outcome of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    /// Nothing is selected; keep `snapshot` and re-validate with a partial scan.
    Revalidate { snapshot: Vec<Candidate> },
    /// Selection ran.
    Select {
        /// Candidates eligible for the primary, kept for retries.
        candidates: Vec<Candidate>,
        /// Choice for the primary session.
        primary: Option<Candidate>,
        /// Choice for the long-lived secondary session.
        secondary: Option<Candidate>,
    },
}

/// Decide what a batch of candidates leads to.
///
/// While moving fast, a full scan only refreshes the snapshot, as does any
/// scan when there is no usable snapshot; partial scans keep candidates that
/// look the same as in the snapshot. Forced scans are
/// evaluated as is. Restricted candidates are reserved for the secondary
/// session.
pub fn evaluate_scan(
    candidates: Vec<Candidate>,
    ctx: &ScanContext<'_>,
    selector: &dyn NetworkSelector,
) -> Decision {
    let mut candidates = candidates;
    if ctx.high_mobility && ctx.mode != ScanMode::Forced {
        if ctx.full || ctx.previous.is_empty() {
            return Decision::Revalidate {
                snapshot: candidates,
            };
        }
        candidates = stable_candidates(ctx.previous, candidates, ctx.rssi_delta_db);
    }

    let (restricted, open): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| c.restricted);

    let primary = selector.select_network(&open, ctx.primary_exclude);
    let secondary = ctx
        .secondary_exclude
        .and_then(|exclude| selector.select_network(&restricted, exclude));

    Decision::Select {
        candidates: open,
        primary,
        secondary,
    }
}
