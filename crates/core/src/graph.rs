//! Cross-referencing between table rows and interactive-graph nodes.

use crate::model::{AnalysisResult, GraphNode, InteractiveGraph, NodeId};

pub const FOCUS_ZOOM: f64 = 2.0;
pub const FOCUS_DURATION_MS: u32 = 1000;

/// Request for the graph view to center and zoom on a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphFocus {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub zoom: f64,
    pub duration_ms: u32,
}

impl GraphFocus {
    pub fn on(node: &GraphNode) -> Self {
        Self {
            x: node.x,
            y: node.y,
            zoom: FOCUS_ZOOM,
            duration_ms: FOCUS_DURATION_MS,
        }
    }
}

/// First node whose (layer, token) pair matches.
pub fn find_node<'a>(graph: &'a InteractiveGraph, layer: i64, token: &str) -> Option<&'a GraphNode> {
    graph
        .nodes
        .iter()
        .find(|n| n.layer == Some(layer) && n.token.as_deref() == Some(token))
}

pub fn find_node_by_id<'a>(graph: &'a InteractiveGraph, id: &NodeId) -> Option<&'a GraphNode> {
    graph.node(id)
}

/// What the detail panel shows for the selected neuron.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronDetails {
    pub token: String,
    pub layer: String,
    pub cluster: String,
    pub activation: Option<f64>,
    pub cluster_label: String,
    pub cluster_description: String,
}

pub fn neuron_details(node: &GraphNode, analysis: Option<&AnalysisResult>) -> NeuronDetails {
    let cluster_label = node
        .cluster
        .and_then(|c| analysis.and_then(|a| a.cluster_label(c)))
        .unwrap_or("No label available")
        .to_string();
    let cluster_description = node
        .cluster
        .and_then(|c| analysis.and_then(|a| a.cluster_sentence(c)))
        .unwrap_or("No description available")
        .to_string();

    NeuronDetails {
        token: node.token.clone().unwrap_or_else(|| "N/A".to_string()),
        layer: node
            .layer
            .map(|l| l.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        cluster: node
            .cluster
            .map(|c| c.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        activation: node.activation,
        cluster_label,
        cluster_description,
    }
}

/// Numeric ids sort before anything else (`Ok` orders before `Err`).
fn cluster_key(id: &str) -> Result<i64, ()> {
    id.trim().parse().map_err(|_| ())
}

/// Cluster id, label and example sentence. Numeric ids come first in numeric
/// order, any other keys after them in text order.
pub fn cluster_summaries(analysis: &AnalysisResult) -> Vec<(String, String, String)> {
    let mut labels: Vec<_> = analysis.cluster_labels.iter().collect();
    labels.sort_by(|(a, _), (b, _)| cluster_key(a).cmp(&cluster_key(b)).then_with(|| a.cmp(b)));
    labels
        .into_iter()
        .map(|(id, label)| {
            let sentence = analysis
                .cluster_sentences
                .get(id)
                .cloned()
                .unwrap_or_else(|| "No sentence data".to_string());
            (id.clone(), label.clone(), sentence)
        })
        .collect()
}
