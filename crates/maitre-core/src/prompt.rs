use maitre_llm::provider::{Message, Role};
use maitre_memory::Turn;

use crate::retriever::ScoredPassage;

const GUIDELINES: &str = "\
Response guidelines:
- Give specific, practical steps that staff can apply immediately
- Reference professional service standards and best practices
- Keep the tone professional and accessible for restaurant staff
- Frame advice around guest experience and service quality
- Emphasize food safety, hygiene, and proper handling where relevant
- Break complex procedures into clear, sequential steps
- Where applicable, mention both what to do and what to avoid
- If the context below cannot answer the question, say so clearly and \
give general hospitality best practice instead

Answer the user's question based on the following context documents:";

/// Shown to the model when retrieval produced nothing, so the fallback
/// to general guidance is an explicit instruction rather than an
/// accident of an empty prompt.
const EMPTY_CONTEXT: &str = "\
No training documents matched this question. State that the specific \
training materials are unavailable and answer from general hospitality \
best practice.";

#[must_use]
pub fn build_system_instruction(assistant_name: &str, passages: &[ScoredPassage]) -> String {
    format!(
        "You are {assistant_name}, a restaurant service-training assistant. \
         Provide detailed, actionable advice to restaurant staff.\n\n\
         {GUIDELINES}\n\n{}",
        format_context(passages)
    )
}

#[must_use]
pub fn format_context(passages: &[ScoredPassage]) -> String {
    if passages.is_empty() {
        return EMPTY_CONTEXT.to_owned();
    }

    let mut out = String::new();
    for (i, passage) in passages.iter().enumerate() {
        use std::fmt::Write;
        let _ = writeln!(out, "[{}] (source: {})", i + 1, passage.source);
        out.push_str(&passage.text);
        out.push_str("\n\n");
    }
    out.trim_end().to_owned()
}

/// Full generation request: system instruction with context, prior turns
/// oldest-first, then the new question.
#[must_use]
pub fn assemble_messages(
    assistant_name: &str,
    passages: &[ScoredPassage],
    history: &[Turn],
    question: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(Message::new(
        Role::System,
        build_system_instruction(assistant_name, passages),
    ));
    for turn in history {
        messages.push(Message::new(Role::User, turn.question.clone()));
        messages.push(Message::new(Role::Assistant, turn.answer.clone()));
    }
    messages.push(Message::new(Role::User, question));
    messages
}
