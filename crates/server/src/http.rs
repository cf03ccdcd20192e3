use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use matcher_indexer::{CorpusSource, IndexBuilder, IndexerError};
use matcher_protocol::{
    role_name, BuildResponse, ErrorBody, HealthResponse, HitDto, SearchRequest, SearchResponse,
};
use matcher_search::{QueryEngine, SearchError};
use matcher_vector_store::VectorStoreError;
use std::sync::Arc;

/// Everything a request handler needs, shared across connections.
pub struct AppState {
    pub engine: QueryEngine,
    pub builder: IndexBuilder,
    pub corpus: Box<dyn CorpusSource>,
}

/// Route a request. Handler errors become JSON error bodies; this function
/// itself never fails.
pub async fn handle(state: Arc<AppState>, req: Request<Body>) -> Response<Body> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => health(&state),
        (&Method::POST, "/index/build") => build_index(&state).await,
        (&Method::POST, "/search") => search(&state, req).await,
        (_, "/health" | "/index/build" | "/search") => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
        ),
        _ => error_response(StatusCode::NOT_FOUND, "Endpoint not found".to_string()),
    }
}

/// "ok" once an index snapshot is active, "degraded" before the first
/// successful build.
fn health(state: &AppState) -> Response<Body> {
    let status = if state.builder.snapshots().load().is_some() {
        "ok"
    } else {
        "degraded"
    };
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: status.to_string(),
        },
    )
}

async fn build_index(state: &AppState) -> Response<Body> {
    match state.builder.build(state.corpus.as_ref()).await {
        Ok(stats) => json_response(
            StatusCode::OK,
            &BuildResponse {
                status: "success".to_string(),
                count: stats.count,
                duration_ms: stats.duration_ms,
            },
        ),
        Err(err) => {
            log::error!("Index build failed: {err}");
            error_response(build_error_status(&err), err.to_string())
        }
    }
}

async fn search(state: &AppState, req: Request<Body>) -> Response<Body> {
    let bytes = match hyper::body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Failed to read request body: {err}"),
            );
        }
    };
    let request: SearchRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {err}"));
        }
    };

    match state
        .engine
        .search(&request.query, request.top_k, request.role.as_deref())
        .await
    {
        Ok(matches) => {
            let results: Vec<HitDto> = matches
                .hits
                .iter()
                .map(|hit| HitDto {
                    id: hit.id,
                    score: hit.score,
                })
                .collect();
            json_response(
                StatusCode::OK,
                &SearchResponse {
                    status: "success".to_string(),
                    role: role_name(matches.role).to_string(),
                    count: results.len(),
                    results,
                },
            )
        }
        Err(err) => {
            log::warn!("Search failed: {err}");
            error_response(search_error_status(&err), err.to_string())
        }
    }
}

fn build_error_status(err: &IndexerError) -> StatusCode {
    match err {
        IndexerError::BuildInProgress => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn search_error_status(err: &SearchError) -> StatusCode {
    match err {
        SearchError::InvalidTopK(_) | SearchError::VectorStore(VectorStoreError::EmbeddingError(_)) => {
            StatusCode::BAD_REQUEST
        }
        SearchError::IndexNotBuilt => StatusCode::PRECONDITION_FAILED,
        SearchError::VectorStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => raw_json(status, bytes),
        Err(err) => raw_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(r#"{{"status":"error","message":"Serialization failed: {err}"}}"#).into_bytes(),
        ),
    }
}

fn error_response(status: StatusCode, message: String) -> Response<Body> {
    json_response(status, &ErrorBody::new(message))
}

fn raw_json(status: StatusCode, bytes: Vec<u8>) -> Response<Body> {
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcher_indexer::MemoryCorpus;
    use matcher_protocol::JobRecord;
    use matcher_search::KeywordClassifier;
    use matcher_vector_store::{EmbeddingModel, SnapshotCell};
    use pretty_assertions::assert_eq;

    fn job(id: u64, title: &str, description: &str) -> JobRecord {
        JobRecord {
            id,
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: description.to_string(),
        }
    }

    fn state_with(records: Vec<JobRecord>) -> Arc<AppState> {
        std::env::set_var("MATCHER_EMBEDDING_MODE", "stub");
        let embedder = Arc::new(EmbeddingModel::new().unwrap());
        let classifier = Arc::new(KeywordClassifier::new());
        let snapshots = Arc::new(SnapshotCell::new());
        Arc::new(AppState {
            engine: QueryEngine::new(embedder.clone(), classifier.clone(), snapshots.clone()),
            builder: IndexBuilder::new(embedder, classifier, snapshots),
            corpus: Box::new(MemoryCorpus::new(records)),
        })
    }

    fn default_state() -> Arc<AppState> {
        state_with(vec![
            job(1, "Backend Engineer", "Rust microservices and PostgreSQL"),
            job(2, "SRE", "Kubernetes, Terraform, Helm and CI/CD pipelines"),
        ])
    }

    async fn send(state: &Arc<AppState>, method: Method, path: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = handle(state.clone(), req).await;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reflects_index_presence() {
        let state = default_state();
        let (status, body) = send(&state, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");

        send(&state, Method::POST, "/index/build", "").await;
        let (status, body) = send(&state, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn build_then_search_succeeds() {
        let state = default_state();

        let (status, body) = send(&state, Method::POST, "/index/build", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["count"], 2);

        let (status, body) = send(
            &state,
            Method::POST,
            "/search",
            r#"{"query":"rust developer","top_k":2}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["count"], 2);
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn search_before_build_is_precondition_failed() {
        let state = default_state();
        let (status, body) = send(
            &state,
            Method::POST,
            "/search",
            r#"{"query":"rust developer"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn invalid_top_k_is_bad_request() {
        let state = default_state();
        send(&state, Method::POST, "/index/build", "").await;

        let (status, body) = send(
            &state,
            Method::POST,
            "/search",
            r#"{"query":"rust developer","top_k":0}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn empty_query_is_bad_request() {
        let state = default_state();
        send(&state, Method::POST, "/index/build", "").await;

        let (status, _) = send(&state, Method::POST, "/search", r#"{"query":"   "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let state = default_state();
        let (status, body) = send(&state, Method::POST, "/search", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn empty_corpus_build_is_internal_error() {
        let state = state_with(vec![]);
        let (status, body) = send(&state, Method::POST, "/index/build", "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "corpus contains no records");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let state = default_state();
        let (status, body) = send(&state, Method::GET, "/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Endpoint not found");
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let state = default_state();
        let (status, _) = send(&state, Method::GET, "/search", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(&state, Method::POST, "/health", "").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn role_is_echoed_in_search_response() {
        let state = default_state();
        send(&state, Method::POST, "/index/build", "").await;

        let (status, body) = send(
            &state,
            Method::POST,
            "/search",
            r#"{"query":"resume text","top_k":1,"role":"devops"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "devops");

        let (_, body) = send(
            &state,
            Method::POST,
            "/search",
            r#"{"query":"resume text","top_k":1}"#,
        )
        .await;
        assert_eq!(body["role"], "general");
    }
}
