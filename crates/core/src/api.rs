//! Wire shapes for requests to the analysis backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model;
use crate::recommendation::Recommendation;

/// The backend operations the dashboard can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    FetchLibrary,
    SaveLibrary,
    Analyze,
    BiasAnalysis,
    BiasScoring,
    Rag,
    Recommendations,
    RepoUpdate,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Operation::FetchLibrary => "fetch_concept_library",
            Operation::SaveLibrary => "save_concept_library",
            Operation::Analyze => "analyze_query",
            Operation::BiasAnalysis => "bias_analysis",
            Operation::BiasScoring => "bias_scoring",
            Operation::Rag => "rag_generate",
            Operation::Recommendations => "recommendations",
            Operation::RepoUpdate => "trigger_repo_update",
        }
    }

    /// The user-facing failure notice. `None` means failures are logged only.
    pub fn failure_notice(self, reason: &str) -> Option<String> {
        let prefix = match self {
            Operation::FetchLibrary | Operation::Recommendations => return None,
            Operation::SaveLibrary => return Some("Failed to save concept library.".to_string()),
            Operation::Analyze => "Analysis failed",
            Operation::BiasAnalysis => "Bias analysis failed",
            Operation::BiasScoring => "Bias scoring failed",
            Operation::Rag => "RAG generation failed",
            Operation::RepoUpdate => "Failed to trigger update",
        };
        Some(format!("{prefix}: {reason}"))
    }

    /// Long-running operations get the longer timeout.
    pub fn is_long_running(self) -> bool {
        matches!(
            self,
            Operation::Analyze | Operation::BiasAnalysis | Operation::BiasScoring | Operation::Rag
        )
    }

    /// Run after a successful analysis; a new analysis supersedes them.
    pub const DEPENDS_ON_ANALYSIS: [Operation; 3] = [
        Operation::BiasAnalysis,
        Operation::BiasScoring,
        Operation::Recommendations,
    ];

    pub fn all() -> &'static [Operation] {
        &[
            Operation::FetchLibrary,
            Operation::SaveLibrary,
            Operation::Analyze,
            Operation::BiasAnalysis,
            Operation::BiasScoring,
            Operation::Rag,
            Operation::Recommendations,
            Operation::RepoUpdate,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptLibrary {
    #[serde(default, deserialize_with = "model::nullable")]
    pub concepts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub query: String,
    pub selected_cavs: Vec<String>,
    pub max_nodes_graph: u32,
    pub graph_strategy: String,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasAnalysisRequest {
    pub query: String,
    pub selected_cavs: Vec<String>,
    pub selected_biases: Vec<String>,
    pub num_clusters: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasScoringRequest {
    pub selected_cavs: Vec<String>,
    pub num_samples: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagRequest {
    pub query: String,
    pub rag_input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoUpdateRequest {
    pub repo_url: String,
}

/// Items are normalized on decode; `null` or a non-list yields no recommendations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    #[serde(default, deserialize_with = "model::lenient_recommendations")]
    pub recommendations: Vec<Recommendation>,
}

/// Body of a non-2xx response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorBody {
    /// The detail as text. FastAPI validation errors put a list here; it is
    /// passed through as JSON.
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
