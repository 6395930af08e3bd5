//! # cartographer
//!
//! Client-side model of the NeuroCartographer interpretability dashboard.
//!
//! The backend does the heavy lifting (activations, clustering, TDA, bias
//! scoring, RAG). This crate holds what the dashboard does with the results:
//! a lenient payload schema, the concept-selection model, the neuron table
//! view engine, table ↔ graph cross-referencing and a reducer-style state
//! store with last-started-wins request tracking.
//!
//! No I/O happens here; the `cartographer_client` crate owns HTTP and the CLI.
//!
//! ## Quick Start
//!
//! ```
//! use cartographer::prelude::*;
//!
//! let mut state = DashboardState::default();
//! state.apply(Event::LibraryTextChanged("gender\nprofession".into()));
//! state.apply(Event::ConceptToggled("gender".into()));
//!
//! let req = state.analyze_request();
//! assert_eq!(req.selected_cavs, vec!["gender"]);
//!
//! state.apply(Event::Started(Operation::Analyze));
//! assert!(state.is_busy());
//! ```
//!
//! ## Modules
//!
//! - [`model`]: response payloads with defaults for missing fields
//! - [`api`]: request bodies and the operation inventory
//! - [`concepts`]: library / extra concepts, selection and bias pairs
//! - [`table`]: filter, sort and paginate activation rows
//! - [`graph`]: node lookup and the neuron detail panel
//! - [`store`]: dashboard state, events and the reducer

pub mod api;
pub mod concepts;
pub mod error;
pub mod fmt;
pub mod graph;
pub mod model;
pub mod recommendation;
pub mod store;
pub mod table;
pub mod ui_model;

pub use error::ValidationError;

/// Prelude module for convenient imports.
///
/// ```
/// use cartographer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::api::{
        AnalyzeRequest, BiasAnalysisRequest, BiasScoringRequest, ConceptLibrary, Operation,
        RagRequest, RepoUpdateRequest,
    };
    pub use crate::concepts::ConceptSet;
    pub use crate::error::ValidationError;
    pub use crate::model::{
        ActivationRow, AnalysisResult, BiasAnalysisResult, BiasScoringResult, GraphNode,
        InteractiveGraph, NodeId, RagResult,
    };
    pub use crate::recommendation::{Priority, Recommendation};
    pub use crate::store::{reduce, DashboardState, Event, Notice, NoticeLevel, Outcome, Ticket};
    pub use crate::table::{SortDirection, SortField, TablePage, TableView};
    pub use crate::ui_model::{SamplingStrategy, Section};
}
