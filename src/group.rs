//! Splits a group-level USD delta across the group's member tickers.

use rustc_hash::FxHashMap;

/// How a group delta is shared among the members that need correction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GroupStrategy {
    /// Proportional to each member's distance from the group equilibrium.
    #[default]
    DistanceWeighted,
    /// Equal parts to every member on the correcting side.
    EqualSplit,
}

/// Distribute `delta` USD over `members`.
///
/// The equilibrium is the per-member value after the move,
/// `(group_total + delta) / members`. Only members below it (buying) or above
/// it (selling) receive a share; everyone else gets nothing. Every returned
/// amount has the sign of `delta`.
pub fn distribute(
    members: &[String],
    totals: &FxHashMap<String, f64>,
    delta: f64,
    strategy: GroupStrategy,
) -> Vec<(String, f64)> {
    if members.is_empty() || delta == 0.0 || !delta.is_finite() {
        return Vec::new();
    }

    let value = |m: &String| totals.get(m).copied().unwrap_or(0.0);
    let group_total: f64 = members.iter().map(value).sum();
    let equilibrium = (group_total + delta) / members.len() as f64;

    let needing: Vec<(&String, f64)> = members
        .iter()
        .filter_map(|m| {
            let v = value(m);
            let needs = if delta > 0.0 {
                v < equilibrium
            } else {
                v > equilibrium
            };
            needs.then(|| (m, (equilibrium - v).abs()))
        })
        .collect();

    if needing.is_empty() {
        return Vec::new();
    }

    match strategy {
        GroupStrategy::DistanceWeighted => {
            let distance_sum: f64 = needing.iter().map(|(_, d)| d).sum();
            if distance_sum <= 0.0 {
                return Vec::new();
            }
            needing
                .into_iter()
                .map(|(m, d)| (m.clone(), delta * d / distance_sum))
                .collect()
        }
        GroupStrategy::EqualSplit => {
            let share = delta / needing.len() as f64;
            needing.into_iter().map(|(m, _)| (m.clone(), share)).collect()
        }
    }
}
