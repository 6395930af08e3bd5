//! The dashboard controller: runs backend operations against the shared state.
//!
//! Each operation takes a ticket from the store, calls the backend with no lock
//! held, then applies the outcome under a short write lock. Independent
//! operations may interleave; the store discards any completion that was
//! superseded by a later start of the same operation.

use std::future::Future;
use std::sync::Arc;

use cartographer::api::Operation;
use cartographer::error::ValidationError;
use cartographer::store::{DashboardState, Event, Notice, Outcome, Ticket};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::client::AnalysisBackend;
use crate::config::{ClientConfig, Timeouts};
use crate::error::ApiError;

pub struct Dashboard<B> {
    backend: B,
    state: Arc<RwLock<DashboardState>>,
    timeouts: Timeouts,
    num_clusters: u32,
    num_samples: u32,
}

impl<B: AnalysisBackend> Dashboard<B> {
    pub fn new(backend: B, config: &ClientConfig) -> Self {
        let mut state = DashboardState::default();
        state.apply(Event::ModelSelected(config.default_model.clone()));
        Self {
            backend,
            state: Arc::new(RwLock::new(state)),
            timeouts: config.timeouts(),
            num_clusters: config.num_clusters,
            num_samples: config.num_samples,
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn state(&self) -> Arc<RwLock<DashboardState>> {
        Arc::clone(&self.state)
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    pub async fn dispatch(&self, event: Event) {
        self.state.write().await.apply(event);
    }

    pub async fn take_notices(&self) -> Vec<Notice> {
        self.state.write().await.take_notices()
    }

    // ── operations ─────────────────────────────────────────────────────────

    /// Load the stored library. Failures are logged and leave the library as is.
    pub async fn load_library(&self) -> Result<(), ApiError> {
        let ticket = self.begin(Operation::FetchLibrary).await;
        let result = self
            .call(Operation::FetchLibrary, self.backend.fetch_concept_library())
            .await
            .map(Outcome::LibraryLoaded);
        self.finish(ticket, result).await.map(|_| ())
    }

    pub async fn save_library(&self) -> Result<(), ApiError> {
        let library = self.state.read().await.save_library_request();
        let ticket = self.begin(Operation::SaveLibrary).await;
        let result = self
            .call(
                Operation::SaveLibrary,
                self.backend.save_concept_library(&library),
            )
            .await
            .map(|()| Outcome::LibrarySaved);
        self.finish(ticket, result).await.map(|_| ())
    }

    /// Analyze the current query, then run the dependent operations in order:
    /// bias analysis when two biases are marked, bias scoring when concepts are
    /// selected, and recommendations.
    ///
    /// The analysis error is returned as `Err`. Follow-up failures leave the
    /// analysis in place and come back as the `Ok` list, in the order they ran.
    /// A follow-up is skipped once a later analysis has started.
    pub async fn analyze(&self) -> Result<Vec<(Operation, ApiError)>, ApiError> {
        let req = self.state.read().await.analyze_request();
        let ticket = self.begin(Operation::Analyze).await;
        info!(
            generation = ticket.generation,
            model = %req.model_name,
            concepts = req.selected_cavs.len(),
            "Analyzing query"
        );
        let result = self
            .call(Operation::Analyze, self.backend.analyze_query(&req))
            .await
            .map(|r| Outcome::Analysis(Box::new(r)));
        if !self.finish(ticket, result).await? {
            return Ok(Vec::new());
        }

        let follow_ups = self.state.read().await.follow_ups();
        let mut failed = Vec::new();
        for op in follow_ups {
            if !self.state.read().await.is_current(ticket) {
                info!(generation = ticket.generation, "Analysis superseded, skipping follow-ups");
                break;
            }
            let outcome = match op {
                Operation::BiasAnalysis => self.run_bias_analysis(Some(ticket)).await,
                Operation::BiasScoring => self.run_bias_scoring(Some(ticket)).await,
                Operation::Recommendations => {
                    self.run_recommendations(&req.query, Some(ticket)).await
                }
                _ => Ok(()),
            };
            if let Err(e) = outcome {
                warn!(operation = op.label(), "Follow-up failed: {}", e);
                failed.push((op, e));
            }
        }
        Ok(failed)
    }

    pub async fn bias_analysis(&self) -> Result<(), ApiError> {
        self.run_bias_analysis(None).await
    }

    async fn run_bias_analysis(&self, parent: Option<Ticket>) -> Result<(), ApiError> {
        let req = self.validated(|s| s.bias_analysis_request(self.num_clusters)).await?;
        let Some(ticket) = self.begin_under(Operation::BiasAnalysis, parent).await else {
            return Ok(());
        };
        let result = self
            .call(Operation::BiasAnalysis, self.backend.run_bias_analysis(&req))
            .await
            .map(|r| Outcome::BiasAnalysis(Box::new(r)));
        self.finish(ticket, result).await.map(|_| ())
    }

    pub async fn bias_scoring(&self) -> Result<(), ApiError> {
        self.run_bias_scoring(None).await
    }

    async fn run_bias_scoring(&self, parent: Option<Ticket>) -> Result<(), ApiError> {
        let req = self.validated(|s| s.bias_scoring_request(self.num_samples)).await?;
        let Some(ticket) = self.begin_under(Operation::BiasScoring, parent).await else {
            return Ok(());
        };
        let result = self
            .call(Operation::BiasScoring, self.backend.run_bias_scoring(&req))
            .await
            .map(|r| Outcome::BiasScoring(Box::new(r)));
        self.finish(ticket, result).await.map(|_| ())
    }

    pub async fn rag(&self) -> Result<(), ApiError> {
        let req = self.validated(DashboardState::rag_request).await?;
        let ticket = self.begin(Operation::Rag).await;
        let result = self
            .call(Operation::Rag, self.backend.generate_rag(&req))
            .await
            .map(Outcome::Rag);
        self.finish(ticket, result).await.map(|_| ())
    }

    pub async fn recommendations(&self, query: &str) -> Result<(), ApiError> {
        self.run_recommendations(query, None).await
    }

    async fn run_recommendations(&self, query: &str, parent: Option<Ticket>) -> Result<(), ApiError> {
        let Some(ticket) = self.begin_under(Operation::Recommendations, parent).await else {
            return Ok(());
        };
        let result = self
            .call(
                Operation::Recommendations,
                self.backend.fetch_recommendations(query),
            )
            .await
            .map(Outcome::Recommendations);
        self.finish(ticket, result).await.map(|_| ())
    }

    pub async fn repo_update(&self) -> Result<(), ApiError> {
        let req = self.validated(DashboardState::repo_update_request).await?;
        let ticket = self.begin(Operation::RepoUpdate).await;
        let result = self
            .call(
                Operation::RepoUpdate,
                self.backend.trigger_external_repo_update(&req),
            )
            .await
            .map(|()| Outcome::RepoUpdateTriggered);
        self.finish(ticket, result).await.map(|_| ())
    }

    // ── plumbing ───────────────────────────────────────────────────────────

    /// Build a request from the current state; a failed precondition becomes a notice.
    async fn validated<T>(
        &self,
        build: impl FnOnce(&DashboardState) -> Result<T, ValidationError>,
    ) -> Result<T, ApiError> {
        let mut s = self.state.write().await;
        match build(&*s) {
            Ok(req) => Ok(req),
            Err(e) => {
                info!("Request not sent: {}", e);
                s.apply(Event::ValidationFailed(e.clone()));
                Err(ApiError::Validation(e))
            }
        }
    }

    async fn begin(&self, op: Operation) -> Ticket {
        self.state.write().await.begin(op)
    }

    /// Like [`begin`](Self::begin), but a follow-up of a superseded analysis
    /// gets no ticket and is not sent.
    async fn begin_under(&self, op: Operation, parent: Option<Ticket>) -> Option<Ticket> {
        let mut s = self.state.write().await;
        match parent {
            None => Some(s.begin(op)),
            Some(analysis) => {
                let ticket = s.begin_follow_up(op, analysis);
                if ticket.is_none() {
                    info!(
                        operation = op.label(),
                        generation = analysis.generation,
                        "Analysis superseded, follow-up not sent"
                    );
                }
                ticket
            }
        }
    }

    async fn call<T>(
        &self,
        op: Operation,
        fut: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let after = self.timeouts.for_op(op);
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout {
                operation: op.label(),
                after,
            }),
        }
    }

    /// Apply the outcome. `Ok(true)` means it was applied, `Ok(false)` that a
    /// later start superseded it.
    async fn finish(
        &self,
        ticket: Ticket,
        result: Result<Outcome, ApiError>,
    ) -> Result<bool, ApiError> {
        let mut s = self.state.write().await;
        let current = s.is_current(ticket);
        let op = ticket.op.label();

        match result {
            Ok(outcome) => {
                if current {
                    info!(operation = op, generation = ticket.generation, "Operation succeeded");
                } else {
                    warn!(
                        operation = op,
                        generation = ticket.generation,
                        "Discarding superseded response"
                    );
                }
                s.apply(Event::Succeeded(ticket, outcome));
                Ok(current)
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!(operation = op, generation = ticket.generation, "{}", e);
                } else if ticket.op.failure_notice("").is_none() {
                    error!(operation = op, generation = ticket.generation, "{}", e);
                } else {
                    warn!(operation = op, generation = ticket.generation, "Operation failed: {}", e);
                }
                s.apply(Event::Failed(ticket, e.reason()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use cartographer::api::{
        AnalyzeRequest, BiasAnalysisRequest, BiasScoringRequest, ConceptLibrary, RagRequest,
        RepoUpdateRequest,
    };
    use cartographer::model::{AnalysisResult, BiasAnalysisResult, BiasScoringResult, RagResult};
    use cartographer::recommendation::Recommendation;
    use serde_json::json;

    /// In-memory backend that records every call.
    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<String>>,
        library: Vec<String>,
        /// Queries whose analysis is slow, with their delay.
        slow: Vec<(&'static str, Duration)>,
        fail_analysis: bool,
        fail_scoring: bool,
        scoring_delay: Option<Duration>,
    }

    impl FakeBackend {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AnalysisBackend for FakeBackend {
        async fn fetch_concept_library(&self) -> Result<Vec<String>, ApiError> {
            self.record("fetch_library");
            Ok(self.library.clone())
        }

        async fn save_concept_library(&self, library: &ConceptLibrary) -> Result<(), ApiError> {
            self.record(format!("save_library:{}", library.concepts.join(",")));
            Ok(())
        }

        async fn analyze_query(&self, req: &AnalyzeRequest) -> Result<AnalysisResult, ApiError> {
            self.record(format!("analyze:{}", req.query));
            if let Some((_, delay)) = self.slow.iter().find(|(q, _)| *q == req.query) {
                tokio::time::sleep(*delay).await;
            }
            if self.fail_analysis {
                return Err(ApiError::http(500, None));
            }
            Ok(serde_json::from_value(json!({
                "query": req.query,
                "cluster_labels": {"0": "professions"},
                "interactive_graph": {"nodes": [{"id": 1, "layer": 3, "token": "doctor"}]}
            }))
            .unwrap())
        }

        async fn run_bias_analysis(
            &self,
            req: &BiasAnalysisRequest,
        ) -> Result<BiasAnalysisResult, ApiError> {
            self.record(format!("bias_analysis:{}", req.selected_biases.join(",")));
            Ok(BiasAnalysisResult {
                selected_biases: req.selected_biases.clone(),
                ..BiasAnalysisResult::default()
            })
        }

        async fn run_bias_scoring(
            &self,
            req: &BiasScoringRequest,
        ) -> Result<BiasScoringResult, ApiError> {
            self.record(format!("bias_scoring:{}", req.num_samples));
            if let Some(delay) = self.scoring_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_scoring {
                return Err(ApiError::http(422, Some("unknown concept".into())));
            }
            Ok(BiasScoringResult::default())
        }

        async fn generate_rag(&self, req: &RagRequest) -> Result<RagResult, ApiError> {
            self.record("rag");
            Ok(RagResult {
                generated_text: format!("answer to {}", req.query),
            })
        }

        async fn fetch_recommendations(
            &self,
            query: &str,
        ) -> Result<Vec<Recommendation>, ApiError> {
            self.record(format!("recommendations:{query}"));
            Ok(vec![Recommendation::titled("Inspect layer 3")])
        }

        async fn trigger_external_repo_update(
            &self,
            req: &RepoUpdateRequest,
        ) -> Result<(), ApiError> {
            self.record(format!("repo_update:{}", req.repo_url));
            Ok(())
        }
    }

    fn dashboard(backend: FakeBackend) -> Dashboard<FakeBackend> {
        Dashboard::new(backend, &ClientConfig::default())
    }

    async fn select(d: &Dashboard<FakeBackend>, library: &str, concepts: &[&str]) {
        d.dispatch(Event::LibraryTextChanged(library.into())).await;
        for c in concepts {
            d.dispatch(Event::ConceptToggled(c.to_string())).await;
        }
    }

    #[tokio::test]
    async fn new_dashboard_starts_on_configured_model() {
        let config = ClientConfig {
            default_model: "gpt2".into(),
            ..ClientConfig::default()
        };
        let d = Dashboard::new(FakeBackend::default(), &config);
        let s = d.snapshot().await;
        assert_eq!(s.model, "gpt2");
        assert_eq!(s.analyze_request().model_name, "gpt2");
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn analysis_runs_follow_ups_in_order() {
        let d = dashboard(FakeBackend::default());
        select(&d, "male\nfemale", &["male", "female"]).await;
        d.dispatch(Event::BiasesChosen(vec!["male".into(), "female".into()]))
            .await;

        d.analyze().await.unwrap();

        assert_eq!(
            d.backend.calls(),
            vec![
                "analyze:She is a doctor.",
                "bias_analysis:male,female",
                "bias_scoring:100",
                "recommendations:She is a doctor.",
            ]
        );
        let s = d.snapshot().await;
        assert!(s.analysis.is_some());
        assert!(s.bias_analysis.is_some());
        assert!(s.bias_scoring.is_some());
        assert_eq!(s.recommendations.len(), 1);
        assert!(!s.is_busy());
    }

    #[tokio::test]
    async fn analysis_without_concepts_only_fetches_recommendations() {
        let d = dashboard(FakeBackend::default());
        d.analyze().await.unwrap();
        assert_eq!(
            d.backend.calls(),
            vec!["analyze:She is a doctor.", "recommendations:She is a doctor."]
        );
    }

    #[tokio::test]
    async fn bias_analysis_with_one_bias_sends_nothing() {
        let d = dashboard(FakeBackend::default());
        select(&d, "male\nfemale", &["male", "female"]).await;
        d.dispatch(Event::BiasesChosen(vec!["male".into()])).await;

        let err = d.bias_analysis().await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::NeedTwoBiases { selected: 1 })
        ));
        assert!(d.backend.calls().is_empty());
        assert_eq!(
            d.take_notices().await[0].message,
            "Please select exactly two bias concepts for comparison."
        );
    }

    #[tokio::test]
    async fn failed_analysis_skips_follow_ups_and_notifies() {
        let d = dashboard(FakeBackend {
            fail_analysis: true,
            ..FakeBackend::default()
        });
        select(&d, "gender", &["gender"]).await;

        assert!(d.analyze().await.is_err());
        assert_eq!(d.backend.calls(), vec!["analyze:She is a doctor."]);

        let s = d.snapshot().await;
        assert!(s.analysis.is_none());
        assert!(!s.is_busy());
        assert_eq!(s.notices[0].message, "Analysis failed: HTTP error! status: 500");
    }

    #[tokio::test]
    async fn follow_up_failure_keeps_analysis() {
        let d = dashboard(FakeBackend {
            fail_scoring: true,
            ..FakeBackend::default()
        });
        select(&d, "gender", &["gender"]).await;

        let failed = d.analyze().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, Operation::BiasScoring);
        assert_eq!(failed[0].1.reason(), "unknown concept");
        let s = d.snapshot().await;
        assert!(s.analysis.is_some());
        assert!(s.bias_scoring.is_none());
        assert_eq!(s.recommendations.len(), 1);
        assert_eq!(s.notices[0].message, "Bias scoring failed: unknown concept");
    }

    #[tokio::test]
    async fn later_started_analysis_wins() {
        let d = dashboard(FakeBackend {
            slow: vec![("first", Duration::from_millis(150))],
            ..FakeBackend::default()
        });

        let first = async {
            d.dispatch(Event::QueryChanged("first".into())).await;
            d.analyze().await
        };
        let second = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            d.dispatch(Event::QueryChanged("second".into())).await;
            d.analyze().await
        };
        let (a, b) = tokio::join!(first, second);
        assert!(a.is_ok());
        assert!(b.is_ok());

        let s = d.snapshot().await;
        assert_eq!(s.analysis.as_ref().unwrap().query, "second");
        assert!(!s.is_busy());
        // The superseded analysis does not trigger its follow-ups.
        let calls = d.backend.calls();
        assert!(calls.contains(&"recommendations:second".to_string()));
        assert!(!calls.contains(&"recommendations:first".to_string()));
    }

    #[tokio::test]
    async fn new_analysis_discards_pending_follow_ups_of_the_old_one() {
        let d = dashboard(FakeBackend {
            scoring_delay: Some(Duration::from_millis(150)),
            ..FakeBackend::default()
        });
        select(&d, "gender", &["gender"]).await;

        let first = async {
            d.dispatch(Event::QueryChanged("first".into())).await;
            d.analyze().await
        };
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            d.dispatch(Event::ConceptToggled("gender".into())).await;
            d.dispatch(Event::QueryChanged("second".into())).await;
            d.analyze().await
        };
        let (a, b) = tokio::join!(first, second);
        assert!(a.unwrap().is_empty());
        assert!(b.unwrap().is_empty());

        let s = d.snapshot().await;
        assert_eq!(s.analysis.as_ref().unwrap().query, "second");
        assert!(s.bias_scoring.is_none());
        assert!(!s.is_busy());
        let calls = d.backend.calls();
        assert!(calls.contains(&"bias_scoring:100".to_string()));
        assert!(calls.contains(&"recommendations:second".to_string()));
        assert!(!calls.contains(&"recommendations:first".to_string()));
    }

    #[tokio::test]
    async fn timeout_is_a_failure_and_clears_busy() {
        let d = dashboard(FakeBackend {
            slow: vec![("She is a doctor.", Duration::from_millis(500))],
            ..FakeBackend::default()
        })
        .with_timeouts(Timeouts {
            long: Duration::from_millis(20),
            quick: Duration::from_millis(20),
        });

        let err = d.analyze().await.unwrap_err();
        assert!(err.is_timeout());

        let s = d.snapshot().await;
        assert!(!s.is_busy());
        assert!(s.notices[0].message.starts_with("Analysis failed: analyze_query timed out"));
    }

    #[tokio::test]
    async fn rag_requires_analysis_then_uses_prefilled_context() {
        let d = dashboard(FakeBackend::default());
        assert!(d.rag().await.is_err());
        assert_eq!(d.take_notices().await[0].message, "Please analyze the model first.");

        d.analyze().await.unwrap();
        assert!(d.snapshot().await.rag_input.contains("professions"));

        d.rag().await.unwrap();
        let s = d.snapshot().await;
        assert_eq!(s.rag.unwrap().generated_text, "answer to She is a doctor.");
    }

    #[tokio::test]
    async fn library_round_trip_and_repo_update() {
        let d = dashboard(FakeBackend {
            library: vec!["gender".into(), "age".into()],
            ..FakeBackend::default()
        });

        d.load_library().await.unwrap();
        let s = d.snapshot().await;
        assert_eq!(s.concepts.library_text(), "gender\nage");
        assert_eq!(s.concepts.selected(), ["gender", "age"]);

        d.save_library().await.unwrap();
        assert!(d.repo_update().await.is_err());
        d.dispatch(Event::RepoUrlChanged("https://gitlab.example/org/repo".into()))
            .await;
        d.repo_update().await.unwrap();

        let messages: Vec<String> = d
            .take_notices()
            .await
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "Concept library saved!",
                "Please provide a GitLab repo URL.",
                "GitLab update triggered!"
            ]
        );
        assert_eq!(
            d.backend.calls(),
            vec![
                "fetch_library",
                "save_library:gender,age",
                "repo_update:https://gitlab.example/org/repo"
            ]
        );
    }
}
