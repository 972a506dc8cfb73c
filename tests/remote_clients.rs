//! Remote service clients against `wiremock` servers.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use medicoz::completion::{Completer, GenerationParams, HuggingFaceCompleter};
use medicoz::embedding::{Embedder, HuggingFaceEmbedder};
use medicoz::error::RemoteServiceError;
use medicoz::retrieval::{ContextRetriever, RetrievalContext};
use medicoz::vector_store::{PassageMetadata, PineconeIndex, VectorIndex, VectorRecord};

fn params() -> GenerationParams {
    GenerationParams {
        max_new_tokens: 500,
        temperature: 0.1,
        top_p: 0.9,
    }
}

#[tokio::test]
async fn embedder_posts_inputs_with_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(header("authorization", "Bearer hf-key"))
        .and(body_partial_json(json!({ "inputs": "chest pain" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([0.25, -0.5, 1.0])))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = HuggingFaceEmbedder::new(
        reqwest::Client::new(),
        format!("{}/embed", server.uri()),
        Some("hf-key".into()),
    );
    assert_eq!(
        embedder.embed("chest pain").await.unwrap(),
        vec![0.25, -0.5, 1.0]
    );
}

#[tokio::test]
async fn embedder_maps_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Model is loading"))
        .mount(&server)
        .await;

    let embedder = HuggingFaceEmbedder::new(reqwest::Client::new(), server.uri(), None);
    let err = embedder.embed("x").await.unwrap_err();
    assert_eq!(
        err,
        RemoteServiceError::Http {
            service: err.service(),
            status: 503,
            body: "Model is loading".into(),
        }
    );
}

#[tokio::test]
async fn slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([0.1]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let embedder = HuggingFaceEmbedder::new(client, server.uri(), None);
    let err = embedder.embed("x").await.unwrap_err();
    assert!(matches!(err, RemoteServiceError::Timeout { .. }), "{:?}", err);
}

#[tokio::test]
async fn pinecone_query_sends_top_k_and_parses_matches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(header("api-key", "pc-key"))
        .and(body_partial_json(json!({ "topK": 3, "includeMetadata": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "a", "score": 0.9, "metadata": { "text": "Passage A", "source": "book.pdf" } },
                { "id": "b", "score": 0.7 }
            ],
            "namespace": ""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let index = PineconeIndex::new(reqwest::Client::new(), server.uri(), Some("pc-key".into()));
    let matches = index.query(&[0.1, 0.2], 3).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(
        matches[0].metadata.as_ref().and_then(|m| m.text.as_deref()),
        Some("Passage A")
    );
    assert!(matches[1].metadata.is_none());
}

#[tokio::test]
async fn pinecone_upsert_sends_vectors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({
            "vectors": [{
                "id": "book.pdf_chunk_0",
                "metadata": { "text": "Passage", "source": "book.pdf" }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let index = PineconeIndex::new(reqwest::Client::new(), server.uri(), None);
    index
        .upsert(vec![VectorRecord {
            id: "book.pdf_chunk_0".into(),
            values: vec![0.5, 0.5],
            metadata: PassageMetadata {
                text: Some("Passage".into()),
                source: Some("book.pdf".into()),
            },
        }])
        .await
        .unwrap();
}

#[tokio::test]
async fn completer_sends_parameters_and_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_partial_json(json!({
            "inputs": "PROMPT",
            "parameters": { "max_new_tokens": 500 }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "generated_text": "PROMPT RESPONSE: Rest." }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let completer = HuggingFaceCompleter::new(
        reqwest::Client::new(),
        format!("{}/generate", server.uri()),
        None,
        params(),
    );
    assert_eq!(
        completer.complete("PROMPT").await.unwrap(),
        "PROMPT RESPONSE: Rest."
    );
}

#[tokio::test]
async fn completer_rejects_unexpected_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "busy" })))
        .mount(&server)
        .await;

    let completer = HuggingFaceCompleter::new(reqwest::Client::new(), server.uri(), None, params());
    let err = completer.complete("x").await.unwrap_err();
    assert!(matches!(err, RemoteServiceError::InvalidPayload { .. }), "{:?}", err);
}

#[tokio::test]
async fn retrieval_over_http_joins_passages_and_flags_failures() {
    let embed_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.1, 0.2]])))
        .mount(&embed_server)
        .await;

    let index_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "a", "score": 0.9, "metadata": { "text": "First." } },
                { "id": "b", "score": 0.8, "metadata": { "text": "Second." } }
            ]
        })))
        .mount(&index_server)
        .await;

    let client = reqwest::Client::new();
    let embedder = HuggingFaceEmbedder::new(client.clone(), embed_server.uri(), None);
    let index = PineconeIndex::new(client.clone(), index_server.uri(), None);
    let retriever = ContextRetriever::new(&embedder, &index, 3);
    assert_eq!(
        retriever.get_context("q").await,
        RetrievalContext::Found("First.\n\nSecond.".into())
    );

    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&down)
        .await;
    let broken = PineconeIndex::new(client, down.uri(), None);
    let retriever = ContextRetriever::new(&embedder, &broken, 3);
    assert!(matches!(
        retriever.get_context("q").await,
        RetrievalContext::RetrievalFailed(_)
    ));
}
