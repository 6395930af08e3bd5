use thiserror::Error;

/// A local precondition failed; no request is sent. The message is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select exactly two bias concepts for comparison.")]
    NeedTwoBiases { selected: usize },

    #[error("Please select concepts for bias scoring.")]
    NoConceptsSelected,

    #[error("Please analyze the model first.")]
    NoAnalysis,

    #[error("Please provide both RAG Input and a Query.")]
    MissingRagInput,

    #[error("Please provide a GitLab repo URL.")]
    MissingRepoUrl,
}
