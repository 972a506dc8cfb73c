//! Paragraph-boundary text chunker.
//!
//! Document text is split wherever two or more consecutive newlines occur.
//! Fragments at or below a minimum length (page numbers, running headers,
//! stray captions) are dropped; what remains becomes one passage each.

/// Split `text` on runs of blank lines, keeping chunks whose trimmed
/// length exceeds `min_chars`. Chunks are returned trimmed, in order.
pub fn split_paragraph_chunks(text: &str, min_chars: usize) -> Vec<String> {
    let text = text.replace("\r\n", "\n");
    let mut chunks = Vec::new();
    let mut rest = text.as_str();

    while !rest.is_empty() {
        let (para, next) = match rest.find("\n\n") {
            Some(pos) => {
                let after = &rest[pos..];
                let run = after.len() - after.trim_start_matches('\n').len();
                (&rest[..pos], &rest[pos + run..])
            }
            None => (rest, ""),
        };
        let trimmed = para.trim();
        if trimmed.chars().count() > min_chars {
            chunks.push(trimmed.to_string());
        }
        rest = next;
    }

    chunks
}
