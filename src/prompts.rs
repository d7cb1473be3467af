//! Prompts for the relevance-ranking call.
//!
//! Kept in one place so unit tests can inspect them and so the wording can
//! change without touching retry or parsing logic in
//! [`crate::pipeline::rank`].

/// System message for the ranking call.
pub const RANK_SYSTEM_PROMPT: &str = "You are a product analyst. Reply with valid JSON only.";

/// Task description sent ahead of the candidate rows.
pub const RANK_INSTRUCTIONS: &str = r#"Task: pick the most interesting charts and tables from a market report and score each from 0 to 100.
Prefer regions showing percentages, trends over time, KPIs or a strong single insight.

Return a STRICT JSON array of objects, one per candidate:
{"id":"chart-0-1","type":"chart","score":0-100}
No extra keys, no comments, no Markdown fences."#;

/// Build the user message: instructions followed by the JSON candidate rows.
pub fn ranking_user_prompt(rows_json: &str) -> String {
    format!("{RANK_INSTRUCTIONS}\n\nCandidates:\n{rows_json}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_name_the_response_shape() {
        assert!(RANK_INSTRUCTIONS.contains("JSON array"));
        assert!(RANK_INSTRUCTIONS.contains(r#""score""#));
    }

    #[test]
    fn user_prompt_carries_rows() {
        let p = ranking_user_prompt(r#"[{"id":"table-0-0"}]"#);
        assert!(p.starts_with(RANK_INSTRUCTIONS));
        assert!(p.ends_with(r#"[{"id":"table-0-0"}]"#));
    }
}
