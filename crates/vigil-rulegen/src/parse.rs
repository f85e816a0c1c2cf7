/// Remove markdown code-fence markup (```json and ```) anywhere in the
/// response and trim surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_yields_inner_content() {
        let raw = "```json\n{\n  \"a\": 1\n}\n```\n";
        assert_eq!(strip_code_fences(raw), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn bare_fences_and_surrounding_whitespace() {
        assert_eq!(strip_code_fences("  ```\n[]\n```  "), "[]");
        assert_eq!(strip_code_fences("\n {\"k\":true} \t"), "{\"k\":true}");
    }

    #[test]
    fn unfenced_text_is_untouched_apart_from_trim() {
        assert_eq!(strip_code_fences("plain answer"), "plain answer");
        assert_eq!(strip_code_fences(""), "");
    }
}
