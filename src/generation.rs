//! Grounded response generation.
//!
//! The completion model is only consulted when retrieval produced usable
//! context. Without grounding the user gets a fixed refusal, and any
//! upstream failure becomes a fixed apology so the chat never surfaces a
//! raw error.

use tracing::warn;

use crate::completion::Completer;
use crate::retrieval::RetrievalContext;

pub const REFUSAL: &str = "Information not available in verified sources.";

pub const APOLOGY: &str =
    "I'm sorry, I'm having trouble connecting to my medical database right now.";

const RESPONSE_MARKER: &str = "RESPONSE:";

/// Build the instruction prompt around the retrieved context.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You are a specialized medical AI assistant for MediCoz.\n\
         Answer the user's question STRICTLY based on the provided context from verified medical sources.\n\
         If the information is not in the context, say: \"{REFUSAL}\"\n\
         Do not hallucinate or use outside knowledge.\n\
         \n\
         ---\n\
         CONTEXT:\n\
         {context}\n\
         \n\
         ---\n\
         USER QUESTION:\n\
         {query}\n\
         \n\
         ---\n\
         {RESPONSE_MARKER}\n"
    )
}

/// Strip an echoed prompt: keep only what follows the last `RESPONSE:` marker.
pub fn clean_completion(raw: &str) -> String {
    match raw.rfind(RESPONSE_MARKER) {
        Some(pos) => raw[pos + RESPONSE_MARKER.len()..].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Produce the assistant reply for `query` given retrieval's outcome.
pub async fn generate_response(
    completer: &dyn Completer,
    query: &str,
    context: &RetrievalContext,
) -> String {
    let context_text = match context {
        RetrievalContext::Found(text) => text,
        RetrievalContext::NoMatch => return REFUSAL.to_string(),
        RetrievalContext::RetrievalFailed(cause) => {
            warn!(cause = %cause, "answering without retrieval; refusing");
            return REFUSAL.to_string();
        }
    };

    let prompt = build_prompt(query, context_text);
    match completer.complete(&prompt).await {
        Ok(raw) => {
            let answer = clean_completion(&raw);
            if answer.is_empty() {
                REFUSAL.to_string()
            } else {
                answer
            }
        }
        Err(e) => {
            warn!(error = %e, "completion failed");
            APOLOGY.to_string()
        }
    }
}
