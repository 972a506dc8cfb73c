//! Context retrieval for a user query.
//!
//! Embeds the query, asks the vector index for the top-K passages and
//! joins their text with blank lines. The outcome is a tagged
//! [`RetrievalContext`] so generation can tell "nothing relevant" apart
//! from "could not check".

use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::vector_store::VectorIndex;

/// Text shown for an empty retrieval; also what [`RetrievalContext::as_prompt_text`]
/// yields for a no-match result.
pub const NO_MATCH_TEXT: &str = "No relevant medical records found.";

const PASSAGE_SEPARATOR: &str = "\n\n";

/// Outcome of a context lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalContext {
    /// Joined passage text, never empty.
    Found(String),
    /// The index answered but returned no usable passages.
    NoMatch,
    /// Embedding or index query failed; carries the cause.
    RetrievalFailed(String),
}

impl RetrievalContext {
    /// Whether the context can ground a model answer.
    pub fn is_usable(&self) -> bool {
        matches!(self, RetrievalContext::Found(_))
    }

    pub fn as_prompt_text(&self) -> &str {
        match self {
            RetrievalContext::Found(text) => text,
            RetrievalContext::NoMatch => NO_MATCH_TEXT,
            RetrievalContext::RetrievalFailed(_) => "",
        }
    }
}

/// Retrieves grounding passages for a query.
pub struct ContextRetriever<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    top_k: usize,
}

impl<'a> ContextRetriever<'a> {
    pub fn new(embedder: &'a dyn Embedder, index: &'a dyn VectorIndex, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }

    /// Look up context for `query`. Never returns an error: failures are
    /// reported as [`RetrievalContext::RetrievalFailed`].
    pub async fn get_context(&self, query: &str) -> RetrievalContext {
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return RetrievalContext::RetrievalFailed(e.to_string());
            }
        };

        let matches = match self.index.query(&vector, self.top_k).await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "vector query failed");
                return RetrievalContext::RetrievalFailed(e.to_string());
            }
        };

        let passages: Vec<String> = matches
            .into_iter()
            .filter_map(|m| {
                debug!(id = %m.id, score = m.score, "context match");
                m.metadata.and_then(|meta| meta.text)
            })
            .filter(|text| !text.trim().is_empty())
            .collect();

        if passages.is_empty() {
            info!("no relevant passages for query");
            RetrievalContext::NoMatch
        } else {
            RetrievalContext::Found(passages.join(PASSAGE_SEPARATOR))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteServiceError;
    use crate::vector_store::{PassageMetadata, VectorMatch, VectorRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedEmbedder(Result<Vec<f32>, RemoteServiceError>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RemoteServiceError> {
            self.0.clone()
        }
    }

    struct FixedIndex {
        result: Result<Vec<VectorMatch>, RemoteServiceError>,
        seen_top_k: Mutex<Option<usize>>,
    }

    impl FixedIndex {
        fn new(result: Result<Vec<VectorMatch>, RemoteServiceError>) -> Self {
            Self {
                result,
                seen_top_k: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn query(
            &self,
            _vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<VectorMatch>, RemoteServiceError> {
            *self.seen_top_k.lock().unwrap() = Some(top_k);
            self.result.clone()
        }

        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<(), RemoteServiceError> {
            Ok(())
        }
    }

    fn passage(id: &str, text: Option<&str>) -> VectorMatch {
        VectorMatch {
            id: id.to_string(),
            score: 0.8,
            metadata: Some(PassageMetadata {
                text: text.map(str::to_string),
                source: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_joins_passages_with_blank_line() {
        let embedder = FixedEmbedder(Ok(vec![0.1, 0.2]));
        let index = FixedIndex::new(Ok(vec![
            passage("a", Some("Insulin lowers blood glucose.")),
            passage("b", Some("Metformin is first-line therapy.")),
        ]));
        let retriever = ContextRetriever::new(&embedder, &index, 3);

        let ctx = retriever.get_context("diabetes").await;
        assert_eq!(
            ctx,
            RetrievalContext::Found(
                "Insulin lowers blood glucose.\n\nMetformin is first-line therapy.".into()
            )
        );
        assert_eq!(*index.seen_top_k.lock().unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_no_matches_is_no_match() {
        let embedder = FixedEmbedder(Ok(vec![0.1]));
        let index = FixedIndex::new(Ok(vec![]));
        let ctx = ContextRetriever::new(&embedder, &index, 3)
            .get_context("q")
            .await;
        assert_eq!(ctx, RetrievalContext::NoMatch);
        assert_eq!(ctx.as_prompt_text(), NO_MATCH_TEXT);
    }

    #[tokio::test]
    async fn test_matches_without_text_are_skipped() {
        let embedder = FixedEmbedder(Ok(vec![0.1]));
        let index = FixedIndex::new(Ok(vec![passage("a", None), passage("b", Some("  "))]));
        let ctx = ContextRetriever::new(&embedder, &index, 3)
            .get_context("q")
            .await;
        assert_eq!(ctx, RetrievalContext::NoMatch);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_distinct_from_no_match() {
        let embedder = FixedEmbedder(Err(RemoteServiceError::Timeout {
            service: "huggingface-embedding",
        }));
        let index = FixedIndex::new(Ok(vec![passage("a", Some("unused"))]));
        let ctx = ContextRetriever::new(&embedder, &index, 3)
            .get_context("q")
            .await;
        assert!(matches!(ctx, RetrievalContext::RetrievalFailed(_)));
        assert!(!ctx.is_usable());
        assert_eq!(*index.seen_top_k.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_index_failure_is_retrieval_failed() {
        let embedder = FixedEmbedder(Ok(vec![0.1]));
        let index = FixedIndex::new(Err(RemoteServiceError::Http {
            service: "pinecone",
            status: 401,
            body: "bad key".into(),
        }));
        let ctx = ContextRetriever::new(&embedder, &index, 3)
            .get_context("q")
            .await;
        match ctx {
            RetrievalContext::RetrievalFailed(cause) => assert!(cause.contains("401")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
