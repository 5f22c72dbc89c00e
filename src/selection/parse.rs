/// Defensive parsing of the model's free-text selection
use regex::Regex;

/// What could be read out of a selection response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// The "Selected Paper IDs" marker was present
    pub has_marker: bool,
    /// The model explicitly answered "None"
    pub declared_none: bool,
    /// Identifier-shaped tokens in the order they appeared
    pub ids: Vec<String>,
    pub reasoning: Option<String>,
}

/// Extracts identifiers and reasoning from a response
///
/// Recognised identifier shapes: DOIs (`10.1101/2023.01.01.500000`),
/// new-style arXiv ids (`2401.01234`, optionally `v2`) and old-style arXiv ids
/// (`hep-th/9901001`). Nothing here knows which ids are real candidates.
pub struct ResponseParser {
    marker: Regex,
    reasoning: Regex,
    ids: Regex,
}

impl ResponseParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            marker: Regex::new(r"(?i)selected\s+paper\s+ids\s*\**\s*:[ \t]*\**[ \t]*([^\n]*)")?,
            reasoning: Regex::new(r"(?is)\n?[\s*#]*reasoning\s*\**\s*:\s*\**\s*(.*)")?,
            ids: Regex::new(
                r"\b\d+\.\d+/[A-Za-z0-9.\-]+|\b\d{4}\.\d{4,5}(?:v\d+)?\b|\b[a-z][a-z\-]*(?:\.[A-Z]{2})?/\d{7}(?:v\d+)?\b",
            )?,
        })
    }

    /// Read the selection from the marker line and any bare list lines under it
    ///
    /// Ids named in prose after the selection (rejected alternatives, the
    /// reasoning) are never picked up.
    pub fn parse(&self, response: &str) -> ParsedResponse {
        let reasoning = self
            .reasoning
            .captures(response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|r| !r.is_empty());

        let Some(captures) = self.marker.captures(response) else {
            return ParsedResponse {
                reasoning,
                ..ParsedResponse::default()
            };
        };
        let (Some(whole), Some(head)) = (captures.get(0), captures.get(1)) else {
            return ParsedResponse {
                reasoning,
                ..ParsedResponse::default()
            };
        };
        let head = head.as_str();

        if declares_none(head) {
            return ParsedResponse {
                has_marker: true,
                declared_none: true,
                ids: Vec::new(),
                reasoning,
            };
        }

        let mut ids = self.extract(head);

        let mut lines = response[whole.end()..].lines().skip(1).peekable();
        if head.trim_matches(is_filler).is_empty() {
            // "Selected Paper IDs:" alone on its line, the list may follow a blank line
            while lines.peek().is_some_and(|l| l.trim().is_empty()) {
                lines.next();
            }
        }
        for line in lines {
            if !self.is_bare_list_item(line) {
                break;
            }
            ids.extend(self.extract(line));
        }

        ParsedResponse {
            has_marker: true,
            declared_none: false,
            ids,
            reasoning,
        }
    }

    fn extract(&self, text: &str) -> Vec<String> {
        self.ids
            .find_iter(text)
            .map(|m| m.as_str().trim_end_matches('.').to_string())
            .filter(|id| !id.is_empty())
            .collect()
    }

    /// A line holding only identifiers plus list punctuation
    fn is_bare_list_item(&self, line: &str) -> bool {
        if !self.ids.is_match(line) {
            return false;
        }
        self.ids
            .replace_all(line, "")
            .chars()
            .all(|c| is_filler(c) || c.is_ascii_digit() || matches!(c, '+' | ',' | ';' | '(' | ')'))
    }
}

/// Whitespace and the markup models wrap list items in
fn is_filler(c: char) -> bool {
    c.is_whitespace() || matches!(c, '[' | ']' | '*' | '"' | '\'' | '`' | '.' | '-')
}

/// The first word of the marker line is "None"
fn declares_none(head: &str) -> bool {
    head.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|word| word.trim_matches(is_filler))
        .find(|word| !word.is_empty())
        .is_some_and(|word| word.eq_ignore_ascii_case("none"))
}

/// `2401.01234v3` without its version suffix
pub(crate) fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(pos)
            if pos + 1 < id.len()
                && id[pos + 1..].bytes().all(|b| b.is_ascii_digit())
                && id[..pos].bytes().last().is_some_and(|b| b.is_ascii_digit()) =>
        {
            &id[..pos]
        }
        _ => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedResponse {
        ResponseParser::new().unwrap().parse(text)
    }

    #[test]
    fn test_none_is_empty() {
        let parsed = parse("Selected Paper IDs: None\nReasoning: nothing stood out");
        assert!(parsed.has_marker);
        assert!(parsed.declared_none);
        assert!(parsed.ids.is_empty());
        assert_eq!(parsed.reasoning.as_deref(), Some("nothing stood out"));

        assert!(parse("Selected Paper IDs: ['None']").declared_none);
    }

    #[test]
    fn test_doi_extraction() {
        let parsed = parse(
            "Selected Paper IDs: [10.1101/2023.01.01.500000, 10.1101/2024.02.03.578901.]\nReasoning: both fit",
        );
        assert_eq!(
            parsed.ids,
            vec!["10.1101/2023.01.01.500000", "10.1101/2024.02.03.578901"]
        );
    }

    #[test]
    fn test_arxiv_ids_both_styles() {
        let parsed = parse("Selected Paper IDs: 2401.01234v2, hep-th/9901001");
        assert_eq!(parsed.ids, vec!["2401.01234v2", "hep-th/9901001"]);
    }

    #[test]
    fn test_markdown_formatting() {
        let parsed = parse("**Selected Paper IDs:** 2401.01234\n\n**Reasoning:** closest match");
        assert_eq!(parsed.ids, vec!["2401.01234"]);
        assert_eq!(parsed.reasoning.as_deref(), Some("closest match"));
    }

    #[test]
    fn test_ids_on_following_lines() {
        let parsed = parse("Selected Paper IDs:\n- 2401.01234\n- 2401.05678\nReasoning: two");
        assert_eq!(parsed.ids, vec!["2401.01234", "2401.05678"]);
    }

    #[test]
    fn test_none_ignores_ids_in_following_prose() {
        let parsed = parse(
            "Selected Paper IDs: None\n\nNone of these fit; 2401.00002 came closest but is off-topic.",
        );
        assert!(parsed.declared_none);
        assert!(parsed.ids.is_empty());

        assert!(parse("Selected Paper IDs: None, 2401.00002 was close").declared_none);
    }

    #[test]
    fn test_rejected_ids_in_prose_are_not_selected() {
        let parsed = parse(
            "Selected Paper IDs: 2401.00001\n\nI considered 2401.00002 and 2401.00003 but rejected them.",
        );
        assert_eq!(parsed.ids, vec!["2401.00001"]);

        let parsed = parse("Selected Paper IDs:\n- 2401.00001\nUnlike 2401.00002, it fits.");
        assert_eq!(parsed.ids, vec!["2401.00001"]);
    }

    #[test]
    fn test_list_after_blank_line_and_numbered() {
        let parsed = parse("Selected Paper IDs:\n\n1. 2401.00001\n2. hep-th/9901001v2\n\nReasoning: both");
        assert_eq!(parsed.ids, vec!["2401.00001", "hep-th/9901001v2"]);
    }

    #[test]
    fn test_missing_marker_yields_nothing() {
        let parsed = parse("I think 2401.01234 is great.");
        assert!(!parsed.has_marker);
        assert!(parsed.ids.is_empty());
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("2401.01234v3"), "2401.01234");
        assert_eq!(strip_version("2401.01234"), "2401.01234");
        assert_eq!(strip_version("hep-th/9901001v1"), "hep-th/9901001");
        assert_eq!(strip_version("10.1101/2024.01.01.v"), "10.1101/2024.01.01.v");
    }
}
