//! HTTP client for the analysis backend.
//!
//! One request per call, no retries. Non-2xx responses become
//! [`ApiError::Http`] carrying the backend's `detail` when it sends one.

use cartographer::api::{
    AnalyzeRequest, BiasAnalysisRequest, BiasScoringRequest, ConceptLibrary, ErrorBody, Operation,
    RagRequest, RecommendationsResponse, RepoUpdateRequest,
};
use cartographer::model::{AnalysisResult, BiasAnalysisResult, BiasScoringResult, RagResult};
use cartographer::recommendation::Recommendation;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;

/// The eight backend operations. Implemented over HTTP by [`AnalysisClient`];
/// tests substitute an in-memory backend.
#[allow(async_fn_in_trait)]
pub trait AnalysisBackend {
    async fn fetch_concept_library(&self) -> Result<Vec<String>, ApiError>;

    async fn save_concept_library(&self, library: &ConceptLibrary) -> Result<(), ApiError>;

    async fn analyze_query(&self, req: &AnalyzeRequest) -> Result<AnalysisResult, ApiError>;

    async fn run_bias_analysis(
        &self,
        req: &BiasAnalysisRequest,
    ) -> Result<BiasAnalysisResult, ApiError>;

    async fn run_bias_scoring(
        &self,
        req: &BiasScoringRequest,
    ) -> Result<BiasScoringResult, ApiError>;

    async fn generate_rag(&self, req: &RagRequest) -> Result<RagResult, ApiError>;

    async fn fetch_recommendations(&self, query: &str) -> Result<Vec<Recommendation>, ApiError>;

    async fn trigger_external_repo_update(&self, req: &RepoUpdateRequest)
        -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    base: Url,
}

impl AnalysisClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base = Url::parse(base_url.trim()).map_err(|e| ApiError::BaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::BaseUrl {
                url: base_url.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::BaseUrl {
                url: self.base.to_string(),
                reason: "not a hierarchical URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        op: Operation,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        debug!(operation = op.label(), status = status.as_u16(), "backend responded");
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.bytes().await.unwrap_or_default();
        let detail = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.detail_text());
        Err(ApiError::http(status.as_u16(), detail))
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        op: Operation,
        segments: &[&str],
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let resp = self.send(op, self.http.get(url)).await?;
        Self::decode(resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        op: Operation,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let resp = self.send(op, self.http.post(url).json(body)).await?;
        Self::decode(resp).await
    }

    /// POST whose response body is not needed.
    async fn post<B: Serialize + ?Sized>(
        &self,
        op: Operation,
        segments: &[&str],
        body: &B,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(segments)?;
        self.send(op, self.http.post(url).json(body)).await?;
        Ok(())
    }
}

impl AnalysisBackend for AnalysisClient {
    async fn fetch_concept_library(&self) -> Result<Vec<String>, ApiError> {
        let lib: ConceptLibrary = self
            .get_json(Operation::FetchLibrary, &["concept-library"])
            .await?;
        Ok(lib.concepts)
    }

    async fn save_concept_library(&self, library: &ConceptLibrary) -> Result<(), ApiError> {
        self.post(Operation::SaveLibrary, &["concept-library"], library)
            .await
    }

    async fn analyze_query(&self, req: &AnalyzeRequest) -> Result<AnalysisResult, ApiError> {
        self.post_json(Operation::Analyze, &["analyze-query"], req)
            .await
    }

    async fn run_bias_analysis(
        &self,
        req: &BiasAnalysisRequest,
    ) -> Result<BiasAnalysisResult, ApiError> {
        self.post_json(Operation::BiasAnalysis, &["bias-analysis"], req)
            .await
    }

    async fn run_bias_scoring(
        &self,
        req: &BiasScoringRequest,
    ) -> Result<BiasScoringResult, ApiError> {
        self.post_json(Operation::BiasScoring, &["bias-scoring"], req)
            .await
    }

    async fn generate_rag(&self, req: &RagRequest) -> Result<RagResult, ApiError> {
        self.post_json(Operation::Rag, &["rag-generate"], req).await
    }

    async fn fetch_recommendations(&self, query: &str) -> Result<Vec<Recommendation>, ApiError> {
        let resp: RecommendationsResponse = self
            .get_json(Operation::Recommendations, &["recommendations", query])
            .await?;
        Ok(resp.recommendations)
    }

    async fn trigger_external_repo_update(
        &self,
        req: &RepoUpdateRequest,
    ) -> Result<(), ApiError> {
        self.post(Operation::RepoUpdate, &["trigger-gitlab-update"], req)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        path: String,
        body: String,
    }

    type Log = Arc<Mutex<Vec<Recorded>>>;

    /// Minimal HTTP/1.1 server: one request per connection, canned responses.
    async fn stub<F>(respond: F) -> (String, Log)
    where
        F: Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let server_log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                let log = Arc::clone(&server_log);
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let req = read_request(&mut sock).await;
                    let (status, body) = respond(&req.method, &req.path);
                    log.lock().unwrap().push(req);
                    let resp = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    sock.write_all(resp.as_bytes()).await.ok();
                    sock.shutdown().await.ok();
                });
            }
        });

        (format!("http://{addr}"), log)
    }

    async fn read_request(sock: &mut TcpStream) -> Recorded {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break buf.len();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let mut request_line = head.lines().next().unwrap_or("").split_whitespace();
        Recorded {
            method: request_line.next().unwrap_or("").to_string(),
            path: request_line.next().unwrap_or("").to_string(),
            body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
        }
    }

    #[tokio::test]
    async fn analyze_posts_request_and_decodes_partial_result() {
        let (base, log) = stub(|_, _| {
            (
                200,
                r#"{"query": "She is a doctor.", "activation_table": [{"layer": 2, "token": "she"}], "charts": null}"#.to_string(),
            )
        })
        .await;
        let client = AnalysisClient::new(&base).unwrap();

        let req = AnalyzeRequest {
            query: "She is a doctor.".into(),
            selected_cavs: vec!["gender".into()],
            max_nodes_graph: 200,
            graph_strategy: "Top by Activation".into(),
            model_name: "bert-base-uncased".into(),
        };
        let result = client.analyze_query(&req).await.unwrap();
        assert_eq!(result.activation_table[0].token, "she");
        assert_eq!(result.activation_table[0].activation_score, None);

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].path, "/analyze-query");
        let sent: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(sent["selected_cavs"][0], "gender");
        assert_eq!(sent["max_nodes_graph"], 200);
    }

    #[tokio::test]
    async fn recommendation_query_is_one_encoded_segment() {
        let (base, log) = stub(|_, _| {
            (
                200,
                r#"{"recommendations": ["Check layer 7", {"title": ""}]}"#.to_string(),
            )
        })
        .await;
        let client = AnalysisClient::new(&base).unwrap();

        let recs = client.fetch_recommendations("is she a doctor?/x").await.unwrap();
        assert_eq!(recs[0].title, "Check layer 7");
        assert_eq!(recs[1].title, "Unknown Recommendation");

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].path, "/recommendations/is%20she%20a%20doctor%3F%2Fx");
    }

    #[tokio::test]
    async fn non_success_surfaces_detail_or_status() {
        let (base, _log) = stub(|_, path| match path {
            "/bias-scoring" => (404, r#"{"detail": "Concept 'age' not found"}"#.to_string()),
            _ => (500, "Internal Server Error".to_string()),
        })
        .await;
        let client = AnalysisClient::new(&base).unwrap();

        let req = BiasScoringRequest {
            selected_cavs: vec!["age".into()],
            num_samples: 100,
        };
        let err = client.run_bias_scoring(&req).await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 404, .. }));
        assert_eq!(err.reason(), "Concept 'age' not found");

        let err = client
            .trigger_external_repo_update(&RepoUpdateRequest {
                repo_url: "https://gitlab.example/x".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "HTTP error! status: 500");
    }

    #[tokio::test]
    async fn base_path_prefix_is_kept() {
        let (base, log) = stub(|_, _| (200, r#"{"concepts": ["gender", "age"]}"#.to_string())).await;
        let client = AnalysisClient::new(&format!("{base}/api/")).unwrap();

        let concepts = client.fetch_concept_library().await.unwrap();
        assert_eq!(concepts, vec!["gender", "age"]);
        assert_eq!(log.lock().unwrap()[0].path, "/api/concept-library");
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let client = AnalysisClient::new(&format!("http://{addr}")).unwrap();

        let err = client.fetch_concept_library().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[test]
    fn bad_base_url_is_rejected() {
        assert!(matches!(
            AnalysisClient::new("not a url"),
            Err(ApiError::BaseUrl { .. })
        ));
        assert!(matches!(
            AnalysisClient::new("mailto:someone@example.com"),
            Err(ApiError::BaseUrl { .. })
        ));
    }
}
