//! Multi-disc folder detection
//!
//! Which folder names count as "disc N" folders is product policy, so the
//! resolver only talks to the [`DiscMatcher`] trait. [`KeywordDiscMatcher`] is
//! the configurable default.

use crate::config::DiscConfig;
use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder};

/// A folder name split into its album prefix and disc number
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscIndicator {
    /// Name with the disc indicator and trailing separators removed (may be empty)
    pub prefix: String,
    /// Disc number
    pub number: u32,
}

/// Decides whether a folder name ends in a disc indicator
pub trait DiscMatcher: Send + Sync {
    /// Split `folder_name` into prefix and disc number, or `None` if it has no
    /// trailing disc indicator
    fn match_disc(&self, folder_name: &str) -> Option<DiscIndicator>;
}

/// Disc matcher driven by a keyword vocabulary
///
/// Recognises `<prefix><sep><keyword><sep?><number>` such as `Album CD1`,
/// `Album - Disc 2` or `Album (disk 3)`, and optionally a bare trailing number
/// (`Album 2`). A name consisting only of the indicator (`CD1`) yields an
/// empty prefix.
pub struct KeywordDiscMatcher {
    keyword: Regex,
    bare: Option<Regex>,
}

impl KeywordDiscMatcher {
    /// Build a matcher from a keyword list
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no keyword is given or the pattern cannot be compiled.
    pub fn new(keywords: &[String], bare_numbers: bool) -> Result<Self> {
        if keywords.is_empty() {
            return Err(Error::config("disc_keywords", "at least one keyword is required"));
        }

        let alternatives = keywords
            .iter()
            .map(|k| regex::escape(k.trim()))
            .collect::<Vec<_>>()
            .join("|");

        // The prefix is empty or ends in a non-alphanumeric character, so
        // "ABCD1" is not read as "AB" + "CD1".
        let keyword_pattern = format!(
            r"^(?P<prefix>(?:.*?[^\p{{L}}\p{{N}}])?)(?:{})[\s._#-]*(?P<num>\d{{1,3}})[\s)\]]*$",
            alternatives
        );
        let keyword = compile(&keyword_pattern)?;

        let bare = if bare_numbers {
            Some(compile(r"^(?P<prefix>.*?[^\p{N}\s._-])[\s._-]+(?P<num>\d{1,2})$")?)
        } else {
            None
        };

        Ok(Self { keyword, bare })
    }

    /// Build a matcher from the disc section of the configuration
    pub fn from_config(config: &DiscConfig) -> Result<Self> {
        Self::new(&config.disc_keywords, config.bare_disc_numbers)
    }
}

impl DiscMatcher for KeywordDiscMatcher {
    fn match_disc(&self, folder_name: &str) -> Option<DiscIndicator> {
        let name = folder_name.trim();
        let caps = self
            .keyword
            .captures(name)
            .or_else(|| self.bare.as_ref().and_then(|re| re.captures(name)))?;

        let number = caps.name("num")?.as_str().parse::<u32>().ok()?;
        let prefix = caps
            .name("prefix")
            .map(|m| trim_separators(m.as_str()))
            .unwrap_or_default();

        Some(DiscIndicator { prefix, number })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(1024 * 1024)
        .build()
        .map_err(|e| Error::config("disc_keywords", format!("invalid disc pattern: {}", e)))
}

fn trim_separators(prefix: &str) -> String {
    prefix
        .trim_end_matches(|c: char| c.is_whitespace() || "-_.,:([–—".contains(c))
        .trim()
        .to_string()
}
