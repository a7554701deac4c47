//! Ordered text-cleaning rules for scraped names.
//!
//! Each rule is a regex and its replacement; rules run in list order and the
//! result is trimmed once at the end.

use regex::Regex;

use crate::{Error, Result};

/// Promotional tags stripped from names on the listing site, followed by
/// category and address tails that leak into the same text node. A `.*` rule
/// drops everything from its match to the end of the line.
pub const LISTING_NAME_RULES: &[(&str, &str)] = &[
    ("네이버페이", ""),
    ("예약", ""),
    ("톡톡", ""),
    ("쿠폰", ""),
    ("다이어트.*", ""),
    ("샐러드.*", ""),
    ("샌드위치.*", ""),
    ("초밥.*", ""),
    ("포케.*", ""),
    ("강남구.*", ""),
    ("서울.*", ""),
];

/// Collapse runs of whitespace.
pub const WHITESPACE_RULES: &[(&str, &str)] = &[(r"\s+", " ")];

#[derive(Debug, Clone)]
pub struct CleaningRule {
    pattern: Regex,
    replacement: String,
}

impl CleaningRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid cleaning pattern {pattern:?}: {e}")))?;
        Ok(Self { pattern, replacement: replacement.into() })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, self.replacement.as_str()).into_owned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextCleaner {
    rules: Vec<CleaningRule>,
}

impl TextCleaner {
    pub fn from_rules(rules: &[(&str, &str)]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|(pattern, replacement)| CleaningRule::new(pattern, *replacement))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn push(&mut self, rule: CleaningRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clean(&self, text: &str) -> String {
        let mut out = text.to_owned();
        for rule in &self.rules {
            out = rule.apply(&out);
        }
        out.trim().to_owned()
    }
}
