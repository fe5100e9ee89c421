use std::sync::OnceLock;

use regex::Regex;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)```").expect("valid fence regex")
    })
}

/// Code out of a model response.
///
/// Prefers the first fenced block tagged with `language` (or a common alias),
/// then the first fenced block, then the whole response.
pub fn extract_code(response: &str, language: &str) -> String {
    let blocks: Vec<(String, String)> = fence_re()
        .captures_iter(response)
        .map(|c| (c[1].to_ascii_lowercase(), c[2].to_string()))
        .collect();

    let wanted = aliases(language);
    let chosen = blocks
        .iter()
        .find(|(tag, _)| wanted.iter().any(|w| w == tag))
        .or_else(|| blocks.first())
        .map(|(_, body)| body.as_str())
        .unwrap_or(response);

    chosen.trim().to_string()
}

/// JSON payload out of a model response: a fenced block if present, else the
/// outermost `{...}` span.
pub fn extract_json(response: &str) -> Option<&str> {
    if let Some(c) = fence_re().captures(response) {
        let body = c.get(2)?.as_str().trim();
        if body.starts_with('{') || body.starts_with('[') {
            return Some(body);
        }
    }
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

fn aliases(language: &str) -> Vec<String> {
    let lang = language.trim().to_ascii_lowercase();
    let extra: &[&str] = match lang.as_str() {
        "javascript" => &["js", "node", "jsx"],
        "typescript" => &["ts", "tsx"],
        "python" => &["py", "python3"],
        "rust" => &["rs"],
        "go" | "golang" => &["go", "golang"],
        "shell" | "bash" => &["sh", "bash", "shell"],
        _ => &[],
    };
    std::iter::once(lang.clone())
        .chain(extra.iter().map(|s| s.to_string()))
        .collect()
}

/// File extension conventionally used for `language`.
pub(crate) fn extension_for(language: &str) -> &'static str {
    match language.trim().to_ascii_lowercase().as_str() {
        "javascript" | "js" => "js",
        "typescript" | "ts" => "ts",
        "python" | "py" => "py",
        "rust" | "rs" => "rs",
        "go" | "golang" => "go",
        "java" => "java",
        "ruby" => "rb",
        "shell" | "bash" => "sh",
        _ => "txt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_block_in_requested_language() {
        let response = "Here you go:\n```text\nnotes\n```\n```js\nconsole.log(1);\n```\n";
        assert_eq!(extract_code(response, "javascript"), "console.log(1);");
    }

    #[test]
    fn falls_back_to_first_block_then_raw_text() {
        assert_eq!(extract_code("```\nfn main() {}\n```", "rust"), "fn main() {}");
        assert_eq!(extract_code("  print('hi')  ", "python"), "print('hi')");
    }

    #[test]
    fn json_is_found_in_fences_or_prose() {
        assert_eq!(
            extract_json("```json\n{\"subtasks\": []}\n```"),
            Some("{\"subtasks\": []}")
        );
        assert_eq!(
            extract_json("Sure! {\"subtasks\": []} Hope that helps."),
            Some("{\"subtasks\": []}")
        );
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn extensions_follow_language() {
        assert_eq!(extension_for("JavaScript"), "js");
        assert_eq!(extension_for("cobol"), "txt");
    }
}
