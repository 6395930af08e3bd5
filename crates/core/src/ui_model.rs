//! Dashboard inventory: collapsible sections, preloaded models, graph sampling.
//!
//! Kept free of any rendering so front ends share one list and the inventory
//! can be unit-tested on the host.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    ModelSelection,
    ConceptVectors,
    GraphSettings,
    BiasAnalysis,
    Rag,
    Results,
    Recommendations,
    NeuronGraph,
    NeuronTable,
}

impl Section {
    pub fn label(self) -> &'static str {
        match self {
            Section::ModelSelection => "Model Selection",
            Section::ConceptVectors => "Concept Activation Vectors",
            Section::GraphSettings => "Graph Settings",
            Section::BiasAnalysis => "Bias Analysis",
            Section::Rag => "RAG Generation",
            Section::Results => "Analysis Results",
            Section::Recommendations => "Recommendations",
            Section::NeuronGraph => "Neuron Graph",
            Section::NeuronTable => "Neuron Table",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Section::ModelSelection => "modelSelection",
            Section::ConceptVectors => "conceptVectors",
            Section::GraphSettings => "graphSettings",
            Section::BiasAnalysis => "biasAnalysis",
            Section::Rag => "rag",
            Section::Results => "results",
            Section::Recommendations => "recommendations",
            Section::NeuronGraph => "neuronGraph",
            Section::NeuronTable => "neuronTable",
        }
    }

    pub fn all() -> &'static [Section] {
        &[
            Section::ModelSelection,
            Section::GraphSettings,
            Section::ConceptVectors,
            Section::BiasAnalysis,
            Section::Rag,
            Section::Results,
            Section::NeuronGraph,
            Section::NeuronTable,
            Section::Recommendations,
        ]
    }
}

/// Models the backend has preloaded: (backend name, display label).
pub const PRELOADED_MODELS: &[(&str, &str)] = &[
    ("bert-base-uncased", "BERT Base Uncased"),
    ("roberta-base", "RoBERTa Base"),
    ("distilbert-base-uncased", "DistilBERT Base Uncased"),
];

pub const DEFAULT_MODEL: &str = "bert-base-uncased";
pub const DEFAULT_QUERY: &str = "She is a doctor.";

pub fn model_label(name: &str) -> Option<&'static str> {
    PRELOADED_MODELS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingStrategy {
    #[default]
    TopByActivation,
    Random,
}

impl SamplingStrategy {
    /// Wire value expected by the backend.
    pub fn label(self) -> &'static str {
        match self {
            SamplingStrategy::TopByActivation => "Top by Activation",
            SamplingStrategy::Random => "Random",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" | "top by activation" | "top_by_activation" => Some(Self::TopByActivation),
            "random" => Some(Self::Random),
            _ => None,
        }
    }

    pub fn all() -> &'static [SamplingStrategy] {
        &[SamplingStrategy::TopByActivation, SamplingStrategy::Random]
    }
}

pub const MAX_NODES_MIN: u32 = 50;
pub const MAX_NODES_MAX: u32 = 2000;
pub const MAX_NODES_STEP: u32 = 50;
pub const MAX_NODES_DEFAULT: u32 = 200;

/// Snap a requested graph size onto the slider range.
pub fn clamp_max_nodes(n: u32) -> u32 {
    let clamped = n.clamp(MAX_NODES_MIN, MAX_NODES_MAX);
    let steps = (clamped - MAX_NODES_MIN + MAX_NODES_STEP / 2) / MAX_NODES_STEP;
    (MAX_NODES_MIN + steps * MAX_NODES_STEP).min(MAX_NODES_MAX)
}
