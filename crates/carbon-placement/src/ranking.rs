//! Cluster ranking and active-set selection.
//!
//! Readings without usable data never take part in the ranking: a missing
//! value is not a zero, and sorting it as one would make the dirtiest
//! unknown grid look like the cleanest.

use serde::Serialize;
use tracing::debug;

use carbon_state::{ClusterCarbonIntensity, IntensityReading};

/// One ranked cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRanking {
    pub cluster_name: String,
    pub location: String,
    pub reading: IntensityReading,
    /// 0-based position in ascending intensity order.
    pub rank: usize,
    pub active: bool,
}

/// Result of ranking one cycle's readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Selection {
    /// Valid clusters, lowest intensity first.
    pub ranked: Vec<ClusterRanking>,
    /// Clusters without usable data, in input order.
    pub excluded: Vec<ClusterCarbonIntensity>,
}

impl Selection {
    /// Names of the active clusters in rank order.
    pub fn active_names(&self) -> Vec<String> {
        self.ranked
            .iter()
            .filter(|r| r.active)
            .map(|r| r.cluster_name.clone())
            .collect()
    }

    pub fn active(&self) -> impl Iterator<Item = &ClusterRanking> {
        self.ranked.iter().filter(|r| r.active)
    }
}

fn is_rankable(reading: &IntensityReading) -> bool {
    reading.is_valid && reading.value.is_finite()
}

/// Rank clusters by ascending intensity and mark the first `desired` active.
///
/// The sort is stable, so equal values keep their input order. A
/// non-positive `desired` activates nothing; one larger than the number of
/// valid clusters activates all of them.
pub fn rank_clusters(readings: &[ClusterCarbonIntensity], desired: i32) -> Selection {
    let (mut valid, excluded): (Vec<&ClusterCarbonIntensity>, Vec<&ClusterCarbonIntensity>) =
        readings.iter().partition(|r| is_rankable(&r.reading));

    valid.sort_by(|a, b| a.reading.value.total_cmp(&b.reading.value));

    let active_count = usize::try_from(desired).unwrap_or(0).min(valid.len());
    let ranked: Vec<ClusterRanking> = valid
        .into_iter()
        .enumerate()
        .map(|(rank, r)| ClusterRanking {
            cluster_name: r.cluster_name.clone(),
            location: r.reading.location.clone(),
            reading: r.reading.clone(),
            rank,
            active: rank < active_count,
        })
        .collect();

    debug!(
        clusters = readings.len(),
        ranked = ranked.len(),
        excluded = excluded.len(),
        desired,
        active = active_count,
        "ranked clusters"
    );

    Selection {
        ranked,
        excluded: excluded.into_iter().cloned().collect(),
    }
}
