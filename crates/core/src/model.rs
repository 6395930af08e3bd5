//! Typed payloads returned by the analysis backend.
//!
//! The backend is loosely typed: fields go missing, arrive as `null`, or carry a
//! string where a number was expected. Every field here is therefore optional or
//! defaulted, and the default policy lives in this module rather than at each
//! render site:
//!
//! - missing / `null` strings, lists and maps decode as empty;
//! - a score that is not a JSON number decodes as `None` (rendered as "N/A");
//! - integers may arrive as numeric strings; anything else becomes the default;
//! - text fields accept numbers and booleans, and a `null` list item becomes `""`;
//! - list and map entries that do not decode are dropped, not the whole payload;
//! - recommendation items go through [`Recommendation::from_value`].

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::recommendation::{normalize_recommendations, Recommendation};

/// `null` or missing decodes as `T::default()`.
pub(crate) fn nullable<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Any non-numeric value decodes as `None`.
fn lenient_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(d)?.and_then(|v| v.as_f64()))
}

fn int_of(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Scalars as text. `null`, arrays and objects have none.
fn text_of(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_i64<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(int_of))
}

/// Like [`lenient_i64`], with out-of-range or unusable values as `T::default()`.
fn lenient_int<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64> + Default,
{
    Ok(lenient_i64(d)?
        .and_then(|i| T::try_from(i).ok())
        .unwrap_or_default())
}

fn lenient_text<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(d)?.and_then(text_of))
}

fn lenient_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_text(d)?.unwrap_or_default())
}

/// Positions matter (token lists are indexed), so bad items become `""`.
fn lenient_strings<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|v| text_of(v).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_string_map<'de, D>(d: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Object(entries)) => entries
            .into_iter()
            .filter_map(|(k, v)| text_of(v).map(|text| (k, text)))
            .collect(),
        _ => BTreeMap::new(),
    })
}

/// A value that does not fit `T` decodes as `T::default()`.
fn lenient<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(Option::<Value>::deserialize(d)?
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

fn lenient_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_map<'de, D, T>(d: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Object(entries)) => entries
            .into_iter()
            .filter_map(|(k, v)| serde_json::from_value(v).ok().map(|t| (k, t)))
            .collect(),
        _ => BTreeMap::new(),
    })
}

fn lenient_chart<'de, D>(d: D) -> Result<Option<ChartImage>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(ChartImage(s)),
        _ => None,
    })
}

fn lenient_series<'de, D>(d: D) -> Result<BTreeMap<String, Vec<Option<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let series = match v {
                Value::Array(items) => items.iter().map(Value::as_f64).collect(),
                _ => Vec::new(),
            };
            (k, series)
        })
        .collect())
}

pub(crate) fn lenient_recommendations<'de, D>(d: D) -> Result<Vec<Recommendation>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(d)?;
    Ok(match raw {
        Some(Value::Array(items)) => normalize_recommendations(&items),
        _ => Vec::new(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Analysis
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub query: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tokens: Vec<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub num_layers: u32,
    #[serde(default, deserialize_with = "lenient_int")]
    pub num_tokens: u32,
    #[serde(default)]
    pub highest_bias_layer: Option<Value>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub highest_bias_score: Option<f64>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub activation_table: Vec<ActivationRow>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub top_neurons: Vec<TopNeuron>,

    /// Cluster id (as a JSON object key) → human label.
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub cluster_labels: BTreeMap<String, String>,
    /// Cluster id → representative sentence.
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub cluster_sentences: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub cluster_cav_table: Vec<ClusterCavRow>,

    #[serde(default, deserialize_with = "lenient")]
    pub interactive_graph: InteractiveGraph,

    /// Concept → similarity per layer (index = layer).
    #[serde(default, deserialize_with = "lenient_series")]
    pub layer_similarities: BTreeMap<String, Vec<Option<f64>>>,

    #[serde(default, deserialize_with = "lenient_map")]
    pub tda_features: BTreeMap<String, TdaValue>,

    #[serde(default, deserialize_with = "lenient")]
    pub charts: AnalysisCharts,
}

impl AnalysisResult {
    pub fn cluster_label(&self, cluster: i64) -> Option<&str> {
        self.cluster_labels
            .get(&cluster.to_string())
            .map(String::as_str)
    }

    pub fn cluster_sentence(&self, cluster: i64) -> Option<&str> {
        self.cluster_sentences
            .get(&cluster.to_string())
            .map(String::as_str)
    }

    /// Number of layers covered by the similarity series (length of the first series).
    pub fn similarity_layer_count(&self) -> usize {
        self.layer_similarities
            .values()
            .next()
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// One row per layer with each concept's similarity, concepts in key order.
    pub fn similarity_rows(&self) -> Vec<(usize, Vec<Option<f64>>)> {
        (0..self.similarity_layer_count())
            .map(|layer| {
                let values = self
                    .layer_similarities
                    .values()
                    .map(|series| series.get(layer).copied().flatten())
                    .collect();
                (layer, values)
            })
            .collect()
    }
}

/// One row of the per-(layer, token) activation table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationRow {
    #[serde(default, deserialize_with = "lenient_int")]
    pub layer: i64,
    #[serde(default, deserialize_with = "lenient_int")]
    pub token_idx: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub token: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub activation_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub cluster_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopNeuron {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub rank: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub neuron_index: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub layer: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub activation_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub cluster_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterCavRow {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub cluster_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub related_concept: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub similarity_score: Option<f64>,
}

/// A topological feature: a scalar, a list (e.g. Betti numbers) or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TdaValue {
    Number(f64),
    List(Vec<Value>),
    Text(String),
    Other(Value),
}

// ═══════════════════════════════════════════════════════════════════════════
// Interactive graph
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractiveGraph {
    #[serde(default, deserialize_with = "lenient_list")]
    pub nodes: Vec<GraphNode>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub links: Vec<GraphLink>,
}

impl InteractiveGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}

/// Graph node ids are integers from some backends and strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Index(i64),
    Name(String),
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::Index(0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Index(i) => write!(f, "{i}"),
            NodeId::Name(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub layer: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub activation: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub cluster: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub val: Option<f64>,

    // Layout position, filled in by the force simulation on the rendering side.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub y: Option<f64>,
}

impl GraphNode {
    /// Text shown on the node: token, then label, then a placeholder.
    pub fn display_name(&self) -> &str {
        self.token
            .as_deref()
            .or(self.label.as_deref())
            .unwrap_or("Node")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    #[serde(default)]
    pub source: NodeId,
    #[serde(default)]
    pub target: NodeId,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub weight: Option<f64>,
}

impl GraphLink {
    pub fn weight_or_default(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Bias analysis / scoring / RAG
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasAnalysisResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub query: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub selected_biases: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub layer_bias_activations: Vec<LayerBiasActivation>,
    #[serde(default, deserialize_with = "lenient")]
    pub summary: BiasAnalysisSummary,
    #[serde(default, deserialize_with = "lenient_recommendations")]
    pub recommendations: Vec<Recommendation>,
    #[serde(default, deserialize_with = "lenient")]
    pub charts: BiasAnalysisCharts,
}

impl BiasAnalysisResult {
    /// Name of the first or second compared bias, with a positional fallback.
    pub fn bias_name(&self, index: usize) -> String {
        self.selected_biases
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Bias {}", index + 1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerBiasActivation {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub layer: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bias1_activation: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bias2_activation: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasAnalysisSummary {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bias1_avg: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bias2_avg: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ratio_avg: Option<f64>,
    #[serde(default)]
    pub max_bias_layer: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasScoringResult {
    #[serde(default, deserialize_with = "lenient_list")]
    pub bias_scores_detailed: Vec<BiasScore>,
    #[serde(default, deserialize_with = "lenient_series_flat")]
    pub normalized_scores: BTreeMap<String, Option<f64>>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub bias_metrics: BTreeMap<String, BiasMetrics>,
    #[serde(default, deserialize_with = "lenient")]
    pub summary: BiasScoringSummary,
    #[serde(default, deserialize_with = "lenient_recommendations")]
    pub recommendations: Vec<Recommendation>,
    #[serde(default, deserialize_with = "lenient")]
    pub charts: BiasScoringCharts,
}

fn lenient_series_flat<'de, D>(d: D) -> Result<BTreeMap<String, Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.as_f64()))
        .collect())
}

impl BiasScoringResult {
    pub fn normalized_score(&self, concept: &str) -> Option<f64> {
        self.normalized_scores.get(concept).copied().flatten()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasScore {
    #[serde(default, deserialize_with = "lenient_text")]
    pub concept: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub bias_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub group_0_mean: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub group_1_mean: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasMetrics {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub absolute_difference: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub relative_difference: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub log_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub statistical_parity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasScoringSummary {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_bias_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_bias_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub generated_text: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Charts
// ═══════════════════════════════════════════════════════════════════════════

/// A backend-rendered chart: base64 image bytes, opaque to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartImage(pub String);

impl ChartImage {
    const DATA_URI_PREFIX: &'static str = "data:image/png;base64,";

    fn payload(&self) -> &str {
        let s = self.0.trim();
        s.strip_prefix(Self::DATA_URI_PREFIX).unwrap_or(s)
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(self.payload())
    }

    pub fn data_uri(&self) -> String {
        format!("{}{}", Self::DATA_URI_PREFIX, self.payload())
    }
}

macro_rules! chart_set {
    ($name:ident { $($field:ident),+ $(,)? }) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $(
                #[serde(default, deserialize_with = "lenient_chart")]
                pub $field: Option<ChartImage>,
            )+
        }

        impl $name {
            /// Charts that were actually delivered, in display order.
            pub fn present(&self) -> Vec<(&'static str, &ChartImage)> {
                let mut out = Vec::new();
                $(
                    if let Some(c) = self.$field.as_ref().filter(|c| !c.is_empty()) {
                        out.push((stringify!($field), c));
                    }
                )+
                out
            }
        }
    };
}

chart_set!(AnalysisCharts {
    pca_plot,
    persistence_diagram,
    heatmap,
    concept_chart,
    layer_chart,
});

chart_set!(BiasAnalysisCharts {
    bias_comparison,
    bias_ratio,
});

chart_set!(BiasScoringCharts {
    bias_scores,
    detailed_bias,
});
