//! Per-node aggregation of analysis results.
//!
//! Aggregates are recomputed from the result list on every call and only
//! emitted for nodes with at least one result.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{KpiDimension, KpiScores, Node, PolarityCategory, SentimentResult};

/// Counts of each polarity category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

impl SentimentDistribution {
    fn record(&mut self, category: PolarityCategory) {
        match category {
            PolarityCategory::Positive => self.positive += 1,
            PolarityCategory::Neutral => self.neutral += 1,
            PolarityCategory::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.neutral + self.negative
    }
}

/// Summary statistics for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAnalysis {
    pub node_id: String,
    pub node_name: String,
    pub total_texts: usize,
    pub avg_polarity: f64,
    pub avg_kpi_scores: KpiScores,
    pub sentiment_distribution: SentimentDistribution,
}

#[derive(Default)]
struct Accumulator {
    node_name: String,
    count: usize,
    polarity_sum: f64,
    kpi_sums: [f64; 6],
    distribution: SentimentDistribution,
}

impl Accumulator {
    fn add(&mut self, result: &SentimentResult) {
        self.count += 1;
        self.polarity_sum += result.polarity_score;
        for (dim, value) in result.kpi_scores.iter() {
            self.kpi_sums[dim.index()] += value;
        }
        self.distribution.record(result.polarity);
    }

    fn finish(self, node_id: String) -> NodeAnalysis {
        let n = self.count as f64;
        let mut avg_kpi_scores = KpiScores::default();
        for dim in KpiDimension::ALL {
            avg_kpi_scores.set(dim, self.kpi_sums[dim.index()] / n);
        }
        NodeAnalysis {
            node_id,
            node_name: self.node_name,
            total_texts: self.count,
            avg_polarity: self.polarity_sum / n,
            avg_kpi_scores,
            sentiment_distribution: self.distribution,
        }
    }
}

fn accumulate(results: &[SentimentResult]) -> (Vec<String>, HashMap<String, Accumulator>) {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Accumulator> = HashMap::new();
    for result in results {
        let acc = groups.entry(result.node_id.clone()).or_insert_with(|| {
            order.push(result.node_id.clone());
            Accumulator {
                node_name: result.node_name.clone(),
                ..Accumulator::default()
            }
        });
        acc.add(result);
    }
    (order, groups)
}

/// Group results by node, ordered by each node's first appearance.
pub fn aggregate(results: &[SentimentResult]) -> Vec<NodeAnalysis> {
    let (order, mut groups) = accumulate(results);
    order
        .into_iter()
        .filter_map(|id| groups.remove(&id).map(|acc| acc.finish(id)))
        .collect()
}

/// Group results by node, ordered like `nodes`.
///
/// Nodes without results are omitted, as are results whose node is not in
/// `nodes`. Names come from `nodes`.
pub fn aggregate_with_nodes(results: &[SentimentResult], nodes: &[Node]) -> Vec<NodeAnalysis> {
    let (_, mut groups) = accumulate(results);
    nodes
        .iter()
        .filter_map(|node| {
            groups.remove(&node.id).map(|mut acc| {
                acc.node_name = node.name.clone();
                acc.finish(node.id.clone())
            })
        })
        .collect()
}
