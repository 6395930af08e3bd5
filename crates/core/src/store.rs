//! Dashboard state and its transitions.
//!
//! [`DashboardState`] is a plain value. Every change goes through a named
//! [`Event`]; [`reduce`] is the pure `(state, event) -> state` form and
//! [`DashboardState::apply`] the in-place one used by the controller.
//!
//! Asynchronous operations are bracketed by `Started` and `Succeeded`/`Failed`.
//! Each start hands out a [`Ticket`] with a generation that increases
//! monotonically; a completion whose ticket is no longer the latest for its
//! operation is dropped, so the most recently *started* request wins. Starting
//! an analysis also supersedes every pending bias analysis, bias scoring and
//! recommendations request.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;

use crate::api::{
    AnalyzeRequest, BiasAnalysisRequest, BiasScoringRequest, ConceptLibrary, Operation,
    RagRequest, RepoUpdateRequest,
};
use crate::concepts::ConceptSet;
use crate::error::ValidationError;
use crate::graph::{self, GraphFocus};
use crate::model::{
    AnalysisResult, BiasAnalysisResult, BiasScoringResult, GraphNode, NodeId, RagResult,
};
use crate::recommendation::Recommendation;
use crate::table::{self, SortField, TablePage, TableView};
use crate::ui_model::{self, SamplingStrategy, Section};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket {
    pub op: Operation,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A blocking user notification (an alert in the browser, stderr in the CLI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Successful payload of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    LibraryLoaded(Vec<String>),
    LibrarySaved,
    Analysis(Box<AnalysisResult>),
    BiasAnalysis(Box<BiasAnalysisResult>),
    BiasScoring(Box<BiasScoringResult>),
    Rag(RagResult),
    Recommendations(Vec<Recommendation>),
    RepoUpdateTriggered,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ModelSelected(String),
    QueryChanged(String),
    LibraryTextChanged(String),
    ExtraConceptsChanged(String),
    ConceptToggled(String),
    BiasesChosen(Vec<String>),
    MaxNodesChanged(u32),
    SamplingChanged(SamplingStrategy),
    RagInputChanged(String),
    RepoUrlChanged(String),
    SectionToggled(Section),

    TableFilterChanged(String),
    TableSortToggled(SortField),
    TablePageSizeChanged(usize),
    TableNextPage,
    TablePrevPage,

    NodeClicked(NodeId),
    RowViewRequested { layer: i64, token: String },
    FocusConsumed,

    ValidationFailed(ValidationError),
    Started(Operation),
    Succeeded(Ticket, Outcome),
    /// The reason text (backend detail, status or transport error).
    Failed(Ticket, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub model: String,
    pub query: String,
    pub concepts: ConceptSet,
    pub max_nodes: u32,
    pub sampling: SamplingStrategy,
    pub rag_input: String,
    pub repo_url: String,
    pub collapsed: BTreeSet<Section>,
    pub table: TableView,

    pub analysis: Option<AnalysisResult>,
    pub bias_analysis: Option<BiasAnalysisResult>,
    pub bias_scoring: Option<BiasScoringResult>,
    pub rag: Option<RagResult>,
    pub recommendations: Vec<Recommendation>,

    pub selected_neuron: Option<GraphNode>,
    pub pending_focus: Option<GraphFocus>,
    pub notices: Vec<Notice>,

    generation: u64,
    latest: BTreeMap<Operation, u64>,
    in_flight: BTreeSet<Ticket>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            model: ui_model::DEFAULT_MODEL.to_string(),
            query: ui_model::DEFAULT_QUERY.to_string(),
            concepts: ConceptSet::default(),
            max_nodes: ui_model::MAX_NODES_DEFAULT,
            sampling: SamplingStrategy::default(),
            rag_input: String::new(),
            repo_url: String::new(),
            collapsed: BTreeSet::new(),
            table: TableView::default(),
            analysis: None,
            bias_analysis: None,
            bias_scoring: None,
            rag: None,
            recommendations: Vec::new(),
            selected_neuron: None,
            pending_focus: None,
            notices: Vec::new(),
            generation: 0,
            latest: BTreeMap::new(),
            in_flight: BTreeSet::new(),
        }
    }
}

/// Pure transition.
pub fn reduce(mut state: DashboardState, event: Event) -> DashboardState {
    state.apply(event);
    state
}

impl DashboardState {
    pub fn apply(&mut self, event: Event) {
        match event {
            Event::ModelSelected(m) => self.model = m,
            Event::QueryChanged(q) => self.query = q,
            Event::LibraryTextChanged(t) => self.concepts.set_library_text(t),
            Event::ExtraConceptsChanged(t) => self.concepts.set_extra_text(t),
            Event::ConceptToggled(c) => self.concepts.toggle(&c),
            Event::BiasesChosen(b) => self.concepts.set_biases(b),
            Event::MaxNodesChanged(n) => self.max_nodes = ui_model::clamp_max_nodes(n),
            Event::SamplingChanged(s) => self.sampling = s,
            Event::RagInputChanged(t) => self.rag_input = t,
            Event::RepoUrlChanged(u) => self.repo_url = u,
            Event::SectionToggled(s) => {
                if !self.collapsed.remove(&s) {
                    self.collapsed.insert(s);
                }
            }

            Event::TableFilterChanged(f) => self.table.set_filter(f),
            Event::TableSortToggled(field) => self.table.toggle_sort(field),
            Event::TablePageSizeChanged(n) => self.table.set_page_size(n),
            Event::TableNextPage => {
                let rows = self.matching_row_count();
                self.table.clamp_page(rows);
                self.table.next_page(rows);
            }
            Event::TablePrevPage => {
                let rows = self.matching_row_count();
                self.table.clamp_page(rows);
                self.table.prev_page();
            }

            Event::NodeClicked(id) => {
                let node = self
                    .analysis
                    .as_ref()
                    .and_then(|a| graph::find_node_by_id(&a.interactive_graph, &id))
                    .cloned();
                if node.is_some() {
                    self.selected_neuron = node;
                }
            }
            Event::RowViewRequested { layer, token } => {
                let node = self
                    .analysis
                    .as_ref()
                    .and_then(|a| graph::find_node(&a.interactive_graph, layer, &token))
                    .cloned();
                if let Some(node) = node {
                    self.pending_focus = Some(GraphFocus::on(&node));
                    self.selected_neuron = Some(node);
                }
            }
            Event::FocusConsumed => self.pending_focus = None,

            Event::ValidationFailed(e) => self.notices.push(Notice::error(e.to_string())),
            Event::Started(op) => self.start(op),
            Event::Succeeded(ticket, outcome) => {
                if self.retire(ticket) {
                    self.complete(outcome);
                }
            }
            Event::Failed(ticket, reason) => {
                if self.retire(ticket) {
                    if let Some(message) = ticket.op.failure_notice(&reason) {
                        self.notices.push(Notice::error(message));
                    }
                }
            }
        }
    }

    /// Apply `Started(op)` and hand back the ticket it allocated.
    pub fn begin(&mut self, op: Operation) -> Ticket {
        self.start(op);
        Ticket {
            op,
            generation: self.generation,
        }
    }

    /// Start `op` on behalf of `analysis`, unless a later analysis has started.
    pub fn begin_follow_up(&mut self, op: Operation, analysis: Ticket) -> Option<Ticket> {
        self.is_current(analysis).then(|| self.begin(op))
    }

    fn start(&mut self, op: Operation) {
        self.generation += 1;
        let ticket = Ticket {
            op,
            generation: self.generation,
        };
        self.latest.insert(op, ticket.generation);
        self.in_flight.insert(ticket);

        match op {
            Operation::Analyze => {
                // Results still pending for the previous analysis are stale.
                for dependent in Operation::DEPENDS_ON_ANALYSIS {
                    self.latest.remove(&dependent);
                }
                self.analysis = None;
                self.bias_analysis = None;
                self.bias_scoring = None;
                self.selected_neuron = None;
                self.pending_focus = None;
            }
            Operation::BiasAnalysis => self.bias_analysis = None,
            Operation::BiasScoring => self.bias_scoring = None,
            Operation::Rag => self.rag = None,
            Operation::Recommendations => self.recommendations.clear(),
            Operation::FetchLibrary | Operation::SaveLibrary | Operation::RepoUpdate => {}
        }
    }

    /// Drop the ticket from the in-flight set. Returns whether it is still the
    /// latest for its operation, i.e. whether its result may be applied.
    fn retire(&mut self, ticket: Ticket) -> bool {
        self.in_flight.remove(&ticket);
        self.latest.get(&ticket.op) == Some(&ticket.generation)
    }

    fn complete(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::LibraryLoaded(concepts) => self.concepts.load_library(concepts),
            Outcome::LibrarySaved => self.notices.push(Notice::info("Concept library saved!")),
            Outcome::Analysis(result) => {
                if let Some(summary) = rag_summary(&result) {
                    self.rag_input = summary;
                }
                self.table.page = 0;
                self.analysis = Some(*result);
            }
            Outcome::BiasAnalysis(r) => self.bias_analysis = Some(*r),
            Outcome::BiasScoring(r) => self.bias_scoring = Some(*r),
            Outcome::Rag(r) => self.rag = Some(r),
            Outcome::Recommendations(r) => self.recommendations = r,
            Outcome::RepoUpdateTriggered => {
                self.notices.push(Notice::info("GitLab update triggered!"))
            }
        }
    }

    // ── queries ────────────────────────────────────────────────────────────

    /// Whether any operation is in flight. Triggers should be disabled while busy.
    pub fn is_busy(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &Ticket> {
        self.in_flight.iter()
    }

    /// The ticket handed out by the most recent `Started(op)`.
    pub fn latest_ticket(&self, op: Operation) -> Option<Ticket> {
        self.latest.get(&op).map(|&generation| Ticket { op, generation })
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.get(&ticket.op) == Some(&ticket.generation)
    }

    pub fn is_expanded(&self, section: Section) -> bool {
        !self.collapsed.contains(&section)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn matching_row_count(&self) -> usize {
        self.analysis
            .as_ref()
            .map(|a| table::filter_rows(&a.activation_table, &self.table.filter).len())
            .unwrap_or(0)
    }

    /// The current page of the neuron table, if an analysis is loaded.
    pub fn table_page(&self) -> Option<TablePage<'_>> {
        self.analysis
            .as_ref()
            .map(|a| table::project(&a.activation_table, &self.table))
    }

    /// Operations a successful analysis triggers, in the order they run.
    pub fn follow_ups(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        if self.concepts.biases().len() == 2 {
            ops.push(Operation::BiasAnalysis);
        }
        if !self.concepts.selected().is_empty() {
            ops.push(Operation::BiasScoring);
        }
        ops.push(Operation::Recommendations);
        ops
    }

    // ── request builders (local validation happens here) ───────────────────

    pub fn save_library_request(&self) -> ConceptLibrary {
        ConceptLibrary {
            concepts: self.concepts.library_concepts(),
        }
    }

    pub fn analyze_request(&self) -> AnalyzeRequest {
        AnalyzeRequest {
            query: self.query.clone(),
            selected_cavs: self.concepts.selected().to_vec(),
            max_nodes_graph: self.max_nodes,
            graph_strategy: self.sampling.label().to_string(),
            model_name: self.model.clone(),
        }
    }

    pub fn bias_analysis_request(
        &self,
        num_clusters: u32,
    ) -> Result<BiasAnalysisRequest, ValidationError> {
        let biases = self.concepts.biases();
        if biases.len() != 2 {
            return Err(ValidationError::NeedTwoBiases {
                selected: biases.len(),
            });
        }
        Ok(BiasAnalysisRequest {
            query: self.query.clone(),
            selected_cavs: self.concepts.selected().to_vec(),
            selected_biases: biases.to_vec(),
            num_clusters,
        })
    }

    pub fn bias_scoring_request(
        &self,
        num_samples: u32,
    ) -> Result<BiasScoringRequest, ValidationError> {
        if self.concepts.selected().is_empty() {
            return Err(ValidationError::NoConceptsSelected);
        }
        Ok(BiasScoringRequest {
            selected_cavs: self.concepts.selected().to_vec(),
            num_samples,
        })
    }

    pub fn rag_request(&self) -> Result<RagRequest, ValidationError> {
        if self.analysis.is_none() {
            return Err(ValidationError::NoAnalysis);
        }
        if self.rag_input.trim().is_empty() || self.query.trim().is_empty() {
            return Err(ValidationError::MissingRagInput);
        }
        Ok(RagRequest {
            query: self.query.clone(),
            rag_input: self.rag_input.clone(),
        })
    }

    pub fn repo_update_request(&self) -> Result<RepoUpdateRequest, ValidationError> {
        let url = self.repo_url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingRepoUrl);
        }
        Ok(RepoUpdateRequest {
            repo_url: url.to_string(),
        })
    }
}

/// Context pre-filled into the RAG box after an analysis.
fn rag_summary(result: &AnalysisResult) -> Option<String> {
    serde_json::to_string_pretty(&json!({
        "cluster_labels": result.cluster_labels,
        "cluster_sentences": result.cluster_sentences,
        "top_neurons": result.top_neurons,
    }))
    .ok()
}
