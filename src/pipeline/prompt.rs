use crate::document::ScoredDocument;

pub const SYSTEM_PROMPT: &str = r#"You are an assistant that answers questions using ONLY the context provided with the question.

Guidelines:
- Answer in the same language as the question
- Use only information found in the context; do not invent facts or cite outside sources
- If the context is in another language than the question, translate the relevant information
- Be concise and precise (200 words at most)
- If the context does not contain the answer, say: "I could not find enough information in the knowledge base to answer this question.""#;

/// Builds the user message: sources in rank order, then the question.
/// With no sources the message is the question alone.
pub fn build_user_message(question: &str, context: &[ScoredDocument]) -> String {
    if context.is_empty() {
        return format!("Question: {}", question);
    }

    let context_text = context
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[Source {}] {}", i + 1, hit.document.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("Context:\n{}\n\nQuestion: {}", context_text, question)
}
