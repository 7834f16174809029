//! Intent-to-act heuristics.
//!
//! Smaller models often "think out loud" — they announce the tool call
//! they are about to make and then stop without emitting it. When a
//! reply contains no tool calls, the loop consults this module: a
//! direct question to the user ends the run normally, a statement of
//! intent gets the model goaded into actually acting.
//!
//! Everything here is table-driven so the phrase lists can evolve
//! without touching the loop. This is a model-behavior workaround, not
//! a correctness invariant.

/// Words that, together with a `?`, mark the reply as a question for
/// the user rather than a plan.
const QUESTION_MARKERS: &[&str] = &[
    "which",
    "what",
    "where",
    "could you",
    "would you",
    "do you want",
];

/// Phrases that indicate the model intends to act *now*.
const INTENT_PHRASES: &[&str] = &[
    "let me create",
    "let me write",
    "let me read",
    "let me check",
    "let me look",
    "let me search",
    "let me fetch",
    "let me browse",
    "let me run",
    "let me execute",
    "let me try",
    "let me make",
    "let me update",
    "let me modify",
    "let me delete",
    "let me remove",
    "let me add",
    "let me open",
    "let me download",
    "let me get",
    "let me see",
    "let me find",
    "let me use",
    "let me install",
    "i'll create",
    "i'll write",
    "i'll read",
    "i'll check",
    "i'll run",
    "i'll execute",
    "i'll fetch",
    "i'll browse",
    "i'll search",
    "i'll make",
    "i'll use",
    "i will create",
    "i will write",
    "i will run",
    "i need to create",
    "i need to write",
    "i need to read",
    "i need to check",
    "i need to run",
    "i need to fetch",
    "i need to browse",
    "i need to search",
    "i need to make",
    "now i'll",
    "now let me",
    "let's do that",
    "let's do it",
    "let's create",
    "let's check",
    "let's write",
    "let's run",
    "let's look",
    "let's fetch",
    "let's search",
    "let's make",
    "i should check",
    "i should write",
    "i should run",
    "i should do",
    "i should use the",
    "i'll do that",
    "doing that now",
    "executing now",
    "running the command now",
    "let's execute it",
    "i'll emit the tool call",
    "i need to emit",
    "emitting tool call",
    "calling the tool",
];

/// The user turn injected when the model planned but did not act.
pub const GOAD_PROMPT: &str = "You said you would take action but didn't use a tool. \
Stop planning and ACT NOW. Emit the tool call immediately:\n\n\
{\"tool\": \"TOOLNAME\", \"arguments\": {\"param\": \"value\"}}\n\n\
Do NOT explain. Do NOT plan. Just emit the tool call.";

/// Classification of a reply with zero tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The model asked the user something; end the run normally.
    Question,
    /// The model announced an action without performing it; goad it.
    Act,
    /// An ordinary final answer.
    Answer,
}

/// Classify a no-tool-call reply. Question detection wins over intent
/// phrases, so "Which file should I read?" never triggers a goad.
pub fn classify(response: &str) -> Intent {
    let lower = response.to_lowercase();

    if lower.contains('?') && QUESTION_MARKERS.iter().any(|m| lower.contains(m)) {
        return Intent::Question;
    }

    if INTENT_PHRASES.iter().any(|p| lower.contains(p)) {
        return Intent::Act;
    }

    Intent::Answer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_detected() {
        assert_eq!(
            classify("Which directory do you want me to scan?"),
            Intent::Question
        );
        assert_eq!(
            classify("Could you clarify the filename?"),
            Intent::Question
        );
    }

    #[test]
    fn question_beats_intent_phrase() {
        // Contains "let me check" but is clearly asking the user
        assert_eq!(
            classify("Let me check — which server do you mean?"),
            Intent::Question
        );
    }

    #[test]
    fn intent_detected() {
        assert_eq!(classify("Let me run the tests first."), Intent::Act);
        assert_eq!(classify("I'll create the config file now."), Intent::Act);
        assert_eq!(classify("Now let me verify the output."), Intent::Act);
    }

    #[test]
    fn intent_is_case_insensitive() {
        assert_eq!(classify("LET ME CHECK the logs."), Intent::Act);
    }

    #[test]
    fn plain_answer_passes_through() {
        // Monotonicity: no intent phrase, no goad
        assert_eq!(classify("The capital of France is Paris."), Intent::Answer);
        assert_eq!(classify("Done! Everything is configured."), Intent::Answer);
    }

    #[test]
    fn question_mark_alone_is_not_a_question() {
        // A bare "?" without an interrogative marker is just prose
        assert_eq!(classify("Interesting result, no?"), Intent::Answer);
    }

    #[test]
    fn goad_prompt_shows_wire_format() {
        assert!(GOAD_PROMPT.contains("{\"tool\": \"TOOLNAME\""));
    }
}
