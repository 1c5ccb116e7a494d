//! # Aggregation Engine
//!
//! Turns the raw samples of a session into per-emotion statistics.
//!
//! ## Full Population
//!
//! [`compute_stats`] groups samples by label in order of first appearance and
//! reports, for each label, the sample count, the share of all samples as a
//! percentage and the mean confidence. Over a non-empty session the
//! percentages add up to 100.
//!
//! ## Top-N View
//!
//! [`select_top`] keeps the `n` labels with the highest share and then
//! renormalizes the kept subset against its own total count, so the displayed
//! view again sums to 100 even though labels were dropped. Reusing the
//! full-population percentages here would leave the view short of 100.
//!
//! ## Rounding
//!
//! Values are kept unrounded. [`round1`] is applied only when presenting them.

use crate::emotion::{DetectionSample, EmotionLabel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default size of the top-N view.
pub const DEFAULT_TOP_N: usize = 5;

/// Statistics for one emotion label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionStat {
    pub emotion: EmotionLabel,
    pub count: usize,
    /// Share of the population this stat was computed over, `0..=100`
    pub percentage: f64,
    /// Mean classifier confidence, `0..=1`
    pub avg_confidence: f64,
}

impl fmt::Display for EmotionStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<10} {:>5.1}%  ({} samples, confidence {:.1}%)",
            self.emotion.display_name(),
            round1(self.percentage),
            self.count,
            round1(self.avg_confidence * 100.0)
        )
    }
}

/// Ordered map from label to [`EmotionStat`].
///
/// Iteration order is meaningful: first-appearance order after
/// [`compute_stats`], descending share after [`select_top`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionStats {
    entries: Vec<EmotionStat>,
}

impl EmotionStats {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, emotion: &EmotionLabel) -> Option<&EmotionStat> {
        self.entries.iter().find(|stat| &stat.emotion == emotion)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EmotionStat> {
        self.entries.iter()
    }

    pub fn labels(&self) -> impl Iterator<Item = &EmotionLabel> {
        self.entries.iter().map(|stat| &stat.emotion)
    }

    /// Total number of samples covered by these stats.
    pub fn total_count(&self) -> usize {
        self.entries.iter().map(|stat| stat.count).sum()
    }

    /// Sum of all percentages. 100 for any non-empty population.
    pub fn percentage_sum(&self) -> f64 {
        self.entries.iter().map(|stat| stat.percentage).sum()
    }

    /// The leading label: first entry in iteration order, `Neutral` when empty.
    ///
    /// On a top-N view this is the dominant emotion of the session.
    pub fn main_emotion(&self) -> EmotionLabel {
        self.entries
            .first()
            .map(|stat| stat.emotion.clone())
            .unwrap_or(EmotionLabel::Neutral)
    }
}

impl<'a> IntoIterator for &'a EmotionStats {
    type Item = &'a EmotionStat;
    type IntoIter = std::slice::Iter<'a, EmotionStat>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Round to one decimal place for display.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Full-population statistics over `samples`.
///
/// Labels appear in the order they were first observed. An empty input
/// yields an empty map.
pub fn compute_stats(samples: &[DetectionSample]) -> EmotionStats {
    // (label, count, confidence sum), in first-appearance order
    let mut groups: Vec<(EmotionLabel, usize, f64)> = Vec::new();

    for sample in samples {
        match groups.iter_mut().find(|(label, _, _)| *label == sample.emotion) {
            Some((_, count, total)) => {
                *count += 1;
                *total += sample.confidence;
            }
            None => groups.push((sample.emotion.clone(), 1, sample.confidence)),
        }
    }

    let population = samples.len();
    let entries = groups
        .into_iter()
        .map(|(emotion, count, confidence_sum)| EmotionStat {
            emotion,
            count,
            percentage: share(count, population),
            avg_confidence: confidence_sum / count as f64,
        })
        .collect();

    EmotionStats { entries }
}

/// Top-`n` view of `stats`, renormalized over the retained subset.
///
/// Entries are ordered by descending percentage. The sort is stable, so
/// ties keep the order they had in `stats`. Counts and mean confidences are
/// carried over unchanged; only the percentage is recomputed as
/// `count / retained_total * 100`.
pub fn select_top(stats: &EmotionStats, n: usize) -> EmotionStats {
    let mut ranked: Vec<EmotionStat> = stats.entries.clone();
    ranked.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(n);

    let retained: usize = ranked.iter().map(|stat| stat.count).sum();
    let entries = ranked
        .into_iter()
        .map(|stat| EmotionStat {
            percentage: share(stat.count, retained),
            ..stat
        })
        .collect();

    EmotionStats { entries }
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
