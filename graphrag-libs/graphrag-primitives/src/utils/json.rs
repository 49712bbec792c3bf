use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CODE_FENCE: Option<Regex> = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").ok();
}

/// Extracts the JSON object embedded in a model response: the content of a
/// fenced code block if present, otherwise the span from the first `{` to the
/// last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let text = match CODE_FENCE.as_ref().and_then(|re| re.captures(text)) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text,
    };

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parses the JSON object embedded in a model response.
pub fn parse_json_object(text: &str) -> Result<serde_json::Value, serde_json::Error> {
    let json = extract_json_object(text).unwrap_or(text);
    serde_json::from_str(json)
}
