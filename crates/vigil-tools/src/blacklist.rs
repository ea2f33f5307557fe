//! Advisory command blacklist and the confirmation gate in front of it.

use std::future::Future;
use std::pin::Pin;

use regex::Regex;

/// Whole-word, case-insensitive term list.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    patterns: Vec<Regex>,
}

impl Blacklist {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = terms
            .into_iter()
            .filter_map(|t| {
                let term = t.as_ref().trim();
                if term.is_empty() {
                    return None;
                }
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term))).ok()
            })
            .collect();
        Self { patterns }
    }

    /// Parse a comma-separated list such as `"del, rm, format"`.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `text` contains any term as a whole word.
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }

    /// Check a tool name and every top-level argument value.
    ///
    /// Arguments that are not a JSON object are checked as raw text.
    pub fn flags(&self, tool: &str, raw_arguments: &str) -> bool {
        if self.matches(tool) {
            return true;
        }
        match serde_json::from_str::<serde_json::Value>(raw_arguments) {
            Ok(serde_json::Value::Object(map)) => {
                map.values().any(|v| self.matches(&crate::value_text(v)))
            }
            _ => self.matches(raw_arguments),
        }
    }
}

/// Asks the user whether a flagged tool call may run.
pub trait ConfirmHandler: Send + Sync {
    /// Resolve to `true` to allow execution.
    fn confirm<'a>(
        &'a self,
        tool: &'a str,
        raw_arguments: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_list() -> Blacklist {
        Blacklist::from_csv("del,rm,shutdown,restart,format")
    }

    #[test]
    fn whole_word_case_insensitive() {
        let list = default_list();
        assert!(list.matches("format the disk"));
        assert!(list.matches("FORMAT C:"));
        assert!(list.matches("sudo rm -rf /"));
        assert!(!list.matches("reformatted"));
        assert!(!list.matches("confirm"));
        assert!(!list.matches("delta"));
    }

    #[test]
    fn empty_terms_are_skipped() {
        let list = Blacklist::from_csv(" , ,");
        assert!(list.is_empty());
        assert!(!list.matches("anything"));
    }

    #[test]
    fn terms_with_regex_metacharacters_are_literal() {
        let list = Blacklist::new(["a.b"]);
        assert!(list.matches("run a.b now"));
        assert!(!list.matches("run axb now"));
    }

    #[test]
    fn flags_checks_name_and_values() {
        let list = default_list();
        assert!(list.flags("Shutdown", "{}"));
        assert!(!list.flags("shutdown_host", "{}"));
        assert!(list.flags("run_cmd", r#"{"command": "rm notes.txt"}"#));
        assert!(!list.flags("run_cmd", r#"{"command": "ls -la", "depth": 2}"#));
        assert!(list.flags("run_cmd", "format c:"));
    }
}
