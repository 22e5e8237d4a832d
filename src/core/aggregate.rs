//! Derived aggregates over a snapshot of the local collection.
//!
//! Everything here is pure: the functions read a frozen slice of resources and return
//! numbers or display strings, so they can be recomputed on every reconciliation.

use crate::core::resource::SharedResource;

/// Fraction of the goal reached, in `[0, 1]`. Zero when no goal is set.
#[must_use]
pub fn percent_funded(resource: &SharedResource) -> f64 {
    if resource.target <= 0.0 || !resource.target.is_finite() {
        return 0.0;
    }

    unit_fraction(resource.balance / resource.target)
}

/// Clamps a ratio into `[0, 1]`. Overflow to infinity counts as fully funded; NaN as zero.
fn unit_fraction(ratio: f64) -> f64 {
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

/// Amount still needed to reach the goal, never negative.
#[must_use]
pub fn remaining(resource: &SharedResource) -> f64 {
    (resource.target - resource.balance).max(0.0)
}

/// Balance as shown to users; a transiently negative balance displays as zero.
#[must_use]
pub fn display_balance(resource: &SharedResource) -> f64 {
    resource.balance.max(0.0)
}

/// Short progress description: `"no goal set"` or `"25% funded"`.
#[must_use]
pub fn progress_label(resource: &SharedResource) -> String {
    if resource.target <= 0.0 {
        return "no goal set".to_string();
    }
    format!("{:.0}% funded", percent_funded(resource) * 100.0)
}

/// Roll-up totals across a collection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rollup {
    /// Sum of every balance
    pub total_saved: f64,
    /// Sum of every target
    pub total_goal: f64,
    /// `max(0, total_goal - total_saved)`
    pub remaining: f64,
    /// `total_saved / total_goal` clamped to `[0, 1]`; zero when there is no goal
    pub overall_progress: f64,
    /// Number of resources with a goal set
    pub active_goal_count: usize,
}

/// Computes the [`Rollup`] for a collection.
#[must_use]
pub fn rollup(resources: &[SharedResource]) -> Rollup {
    let total_saved: f64 = resources.iter().map(|r| r.balance).sum();
    let total_goal: f64 = resources.iter().map(|r| r.target).sum();
    let overall_progress = if total_goal > 0.0 {
        unit_fraction(total_saved / total_goal)
    } else {
        0.0
    };

    Rollup {
        total_saved,
        total_goal,
        remaining: (total_goal - total_saved).max(0.0),
        overall_progress,
        active_goal_count: resources.iter().filter(|r| r.target > 0.0).count(),
    }
}

/// The `n` best-funded resources: by percent funded, then balance (both descending),
/// then id ascending so equal entries always come out in the same order.
#[must_use]
pub fn top_n(resources: &[SharedResource], n: usize) -> Vec<SharedResource> {
    let mut ranked: Vec<&SharedResource> = resources.iter().collect();
    ranked.sort_by(|a, b| {
        percent_funded(b)
            .total_cmp(&percent_funded(a))
            .then_with(|| b.balance.total_cmp(&a.balance))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.into_iter().take(n).cloned().collect()
}

/// Every member id referenced by the collection, sorted and deduplicated.
#[must_use]
pub fn member_ids(resources: &[SharedResource]) -> Vec<String> {
    let mut ids: Vec<String> = resources
        .iter()
        .flat_map(|r| r.member_ids.iter().cloned())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Text progress bar like `[████████░░] 80.0%` for a fraction in `[0, 1]`.
#[must_use]
pub fn format_progress_bar(fraction: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };

    // clamped ∈ [0, 1] and length is small, so the product fits in usize.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = (clamped * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    format!(
        "[{}{}] {:.1}%",
        "█".repeat(filled),
        "░".repeat(empty),
        clamped * 100.0
    )
}

/// Formats an amount as currency, e.g. `$1234.50`.
#[must_use]
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${amount:.2}")
    }
}
