//! Log-pattern readiness matching (spec.md §4.3).
//!
//! Plain strings match as a case-insensitive substring; regex patterns
//! match exactly as written (case-sensitive unless the expression itself
//! opts into `(?i)`).

use ph_core::LogPattern;
use regex::Regex;

pub fn matches_pattern(pattern: &LogPattern, line: &str) -> bool {
    match pattern {
        LogPattern::Substring(needle) => line.to_lowercase().contains(&needle.to_lowercase()),
        LogPattern::Regex(expr) => Regex::new(expr).map(|re| re.is_match(line)).unwrap_or(false),
    }
}

#[cfg(test)]
#[path = "log_matcher_tests.rs"]
mod tests;
