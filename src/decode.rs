//! Turning raw tool responses into text and structured values.
//!
//! LLM-backed tools wrap JSON in prose or code fences and sometimes stop
//! mid-token when they hit their output limit. [`parse_json_lenient`] is a
//! best-effort salvage layer, not a parser: it tries a fixed list of strategies
//! and gives up with the original parse error. Known failure modes: a document
//! cut between a key and its colon, and a number cut mid-digits (parsed as the
//! shorter number).

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{DecodeError, ResponseError};

/// Wire shape of a `tools/call` result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    #[serde(default)]
    pub content: Option<Vec<ContentPart>>,
    #[serde(default)]
    pub is_error: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(vec![ContentPart {
                kind: "text".to_string(),
                text: Some(text.into()),
            }]),
            is_error: Some(false),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: Some(true),
            ..Self::text(message)
        }
    }

    fn text_parts(&self) -> impl Iterator<Item = &str> {
        self.content
            .iter()
            .flatten()
            .filter(|part| part.kind == "text")
            .filter_map(|part| part.text.as_deref())
    }
}

/// Text payload of a response, joined across text parts.
pub fn extract_text(response: &ToolResponse) -> Result<String, ResponseError> {
    let text = response.text_parts().collect::<Vec<_>>().join("\n");

    if response.is_error == Some(true) {
        let message = text.trim();
        return Err(ResponseError::Tool(if message.is_empty() {
            "unknown tool error".to_string()
        } else {
            message.to_string()
        }));
    }

    if text.trim().is_empty() {
        return Err(ResponseError::Empty);
    }
    Ok(text)
}

/// Which strategy produced a parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// The whole text, minus one wrapping fence.
    Direct,
    /// The first fenced code block inside surrounding prose.
    FencedBlock,
    /// The outermost `{...}` or `[...]` span.
    Span,
    /// Truncated output closed off by the repair pass.
    Repaired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LenientParse {
    pub value: Value,
    pub strategy: ParseStrategy,
}

static WRAPPING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").expect("static regex")
});
static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("static regex"));
static ANY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").expect("static regex"));
static DANGLING_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\{,])\s*"(?:[^"\\]|\\.)*"\s*:\s*$"#).expect("static regex")
});
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*$").expect("static regex"));

/// Parses JSON out of LLM output. See the module docs for the strategies.
pub fn parse_json_lenient(text: &str) -> Result<Value, serde_json::Error> {
    parse_json_lenient_detailed(text).map(|parsed| parsed.value)
}

/// Like [`parse_json_lenient`], also reporting the strategy that succeeded.
pub fn parse_json_lenient_detailed(text: &str) -> Result<LenientParse, serde_json::Error> {
    let trimmed = text.trim();
    let cleaned = WRAPPING_FENCE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |m| m.as_str().trim());

    let first_error = match serde_json::from_str(cleaned) {
        Ok(value) => return Ok(parsed(value, ParseStrategy::Direct)),
        Err(err) => err,
    };

    let block = JSON_BLOCK
        .captures(text)
        .or_else(|| ANY_BLOCK.captures(text))
        .and_then(|caps| caps.get(1));
    if let Some(block) = block {
        if let Ok(value) = serde_json::from_str(block.as_str().trim()) {
            return Ok(parsed(value, ParseStrategy::FencedBlock));
        }
    }

    let Some((start, closer)) = first_opener(cleaned) else {
        return Err(first_error);
    };
    if let Some(end) = cleaned.rfind(closer) {
        if end > start {
            if let Ok(value) = serde_json::from_str(&cleaned[start..=end]) {
                return Ok(parsed(value, ParseStrategy::Span));
            }
        }
    }

    match repair_truncated(&cleaned[start..]) {
        Some(value) => Ok(parsed(value, ParseStrategy::Repaired)),
        None => Err(first_error),
    }
}

/// Lenient parse followed by typed deserialization.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, DecodeError> {
    let parsed = parse_json_lenient_detailed(text).map_err(DecodeError::Malformed)?;
    if parsed.strategy == ParseStrategy::Repaired {
        tracing::debug!("decoded JSON from truncated tool output");
    }
    serde_json::from_value(parsed.value).map_err(DecodeError::Shape)
}

fn parsed(value: Value, strategy: ParseStrategy) -> LenientParse {
    LenientParse { value, strategy }
}

/// Byte offset of the first `{` or `[`, with its matching closer.
fn first_opener(text: &str) -> Option<(usize, char)> {
    let brace = text.find('{');
    let bracket = text.find('[');
    match (brace, bracket) {
        (Some(b), Some(k)) if b < k => Some((b, '}')),
        (_, Some(k)) => Some((k, ']')),
        (Some(b), None) => Some((b, '}')),
        (None, None) => None,
    }
}

/// Closes off JSON that stopped mid-generation.
fn repair_truncated(raw: &str) -> Option<Value> {
    let mut repaired = match unterminated_string_start(raw) {
        Some(quote) => raw[..quote].to_string(),
        None => raw.to_string(),
    };

    repaired = DANGLING_KEY.replace(&repaired, "$1").into_owned();
    repaired = TRAILING_COMMA.replace(&repaired, "").into_owned();

    for closer in unclosed(&repaired).into_iter().rev() {
        repaired.push(closer);
    }

    serde_json::from_str(&repaired).ok()
}

/// Byte offset of the opening quote of a string left open at end of input.
fn unterminated_string_start(text: &str) -> Option<usize> {
    let mut open_quote = None;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if open_quote.is_some() => escaped = true,
            '"' => open_quote = if open_quote.is_some() { None } else { Some(i) },
            _ => {}
        }
    }
    open_quote
}

/// Closers for every opener still unmatched, innermost last.
fn unclosed(text: &str) -> Vec<char> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_text_joins_text_parts() {
        let response: ToolResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "image", "data": "..." },
                { "type": "text", "text": "second" }
            ]
        }))
        .unwrap();
        assert_eq!(extract_text(&response).unwrap(), "first\nsecond");
    }

    #[test]
    fn extract_text_surfaces_tool_errors() {
        let response = ToolResponse::error("Invalid GitHub URL");
        assert_eq!(
            extract_text(&response),
            Err(ResponseError::Tool("Invalid GitHub URL".to_string()))
        );
    }

    #[test]
    fn extract_text_rejects_empty_payloads() {
        assert_eq!(extract_text(&ToolResponse::default()), Err(ResponseError::Empty));
        assert_eq!(extract_text(&ToolResponse::text("  \n")), Err(ResponseError::Empty));
        let response: ToolResponse =
            serde_json::from_value(json!({ "content": null, "isError": false })).unwrap();
        assert_eq!(extract_text(&response), Err(ResponseError::Empty));
    }

    #[test]
    fn direct_parse_strips_a_wrapping_fence() {
        let parsed = parse_json_lenient_detailed("```json\n{\"score\": 91}\n```").unwrap();
        assert_eq!(parsed.value, json!({ "score": 91 }));
        assert_eq!(parsed.strategy, ParseStrategy::Direct);
    }

    #[test]
    fn fenced_block_inside_prose() {
        let text = "Here is the review:\n```json\n{\"score\": 60, \"suggestions\": [\"Add badges\"]}\n```\nHope it helps!";
        let parsed = parse_json_lenient_detailed(text).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::FencedBlock);
        assert_eq!(parsed.value["suggestions"][0], "Add badges");
    }

    #[test]
    fn outermost_span_picks_earliest_opener() {
        let parsed = parse_json_lenient_detailed("Files: [\"a.rs\", \"b.rs\"] {ignored}").unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Span);
        assert_eq!(parsed.value, json!(["a.rs", "b.rs"]));

        let parsed = parse_json_lenient("Result => {\"tags\": [1, 2]} done").unwrap();
        assert_eq!(parsed, json!({ "tags": [1, 2] }));
    }

    #[test]
    fn repairs_unterminated_string_value() {
        let truncated = "{\"score\": 72, \"suggestions\": [\"Add a usage sec";
        let parsed = parse_json_lenient_detailed(truncated).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Repaired);
        assert_eq!(parsed.value, json!({ "score": 72, "suggestions": [] }));
    }

    #[test]
    fn repairs_dangling_key_and_nested_closers() {
        let value = parse_json_lenient("[{\"path\": \"a.rs\", \"content\": \"fn main() {").unwrap();
        assert_eq!(value, json!([{ "path": "a.rs" }]));

        let value = parse_json_lenient("{\"a\": {\"b\": 1}, \"c\": [true,").unwrap();
        assert_eq!(value, json!({ "a": { "b": 1 }, "c": [true] }));
    }

    #[test]
    fn respects_escaped_quotes_while_scanning() {
        let value = parse_json_lenient(r#"{"q": "say \"hi\"", "r": "open \"quo"#).unwrap();
        assert_eq!(value, json!({ "q": "say \"hi\"" }));
    }

    #[test]
    fn returns_first_error_when_nothing_works() {
        let err = parse_json_lenient("the model refused to answer").unwrap_err();
        let direct = serde_json::from_str::<Value>("the model refused to answer").unwrap_err();
        assert_eq!(err.to_string(), direct.to_string());
    }

    #[test]
    fn truncation_inside_any_string_keeps_completed_pairs() {
        let doc = r#"{"name":"widget","description":"A tiny \"widget\"","topics":["cli","tools"],"license":"MIT"}"#;
        let complete: Value = serde_json::from_str(doc).unwrap();
        let keys = ["name", "description", "topics", "license"];

        let mut in_string = false;
        let mut escaped = false;
        for (offset, ch) in doc.char_indices() {
            if in_string {
                let truncated = &doc[..offset];
                if let Ok(value) = parse_json_lenient(truncated) {
                    let object = value.as_object().expect("object survives truncation");
                    for key in keys {
                        let pair_end = doc.find(&format!("\"{key}\":")).unwrap();
                        let value_text = complete[key].to_string();
                        let value_end = doc[pair_end..].find(&value_text).unwrap()
                            + pair_end
                            + value_text.len();
                        if value_end <= offset {
                            assert_eq!(object.get(key), Some(&complete[key]), "at {offset}");
                        }
                        if let Some(found) = object.get(key) {
                            if key != "topics" {
                                assert_eq!(found, &complete[key]);
                            }
                        }
                    }
                }
            }
            if escaped {
                escaped = false;
            } else if in_string && ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = !in_string;
            }
        }
    }
}
