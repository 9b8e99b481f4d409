//! Identifier classifier: ordered pattern rules over a member's names.
//!
//! Two rule families, evaluated per candidate name in this order:
//! 1. Keyword rules: the whole name is a marker or marker combination
//!    (`XboxGamer123`, `xbox live fan`, `[XBL]`).
//! 2. Format rules: label + separator + identifier layouts
//!    (`GT: Player99`, `[Xbox] CoolKid`, `Sniper99 (XBL)`).
//!
//! First hit wins. Nothing after it is evaluated.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::directory::Member;

/// Text allowed around a keyword core: anything except the separators of the
/// labelled layouts (`:`, `|`, brackets), which belong to the format rules.
const KEYWORD_CONTEXT: &str = r"[^:|\[\]()]*?";

/// Captured identifier body for format rules.
const ID: &str = r"([A-Za-z0-9_]{3,20})";

/// Built-in keyword cores, in precedence order.
const DEFAULT_KEYWORDS: &[&str] = &[
    r"gamertag[^:|\[\]()]*?xbox",
    r"xbox[^:|\[\]()]*?gamertag",
    r"xbox\s*game\s*pass",
    r"xbox\s*gamer",
    r"xbox[^:|\[\]()]*?live",
    r"live[^:|\[\]()]*?xbox",
    r"gt[^:|\[\]()]*?xbox",
    r"xbox[^:|\[\]()]*?gt",
    r"xbox",
    r"xbl",
];

/// Bracket-wrapped markers; only decoration may surround them.
const DEFAULT_BRACKET_MARKERS: &[&str] = &[r"\[xbox\]", r"\[xbl\]", r"\(xbox\)", r"\(xbl\)"];

/// Category of a classifier hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCategory {
    XboxKeyword,
    GtFormat,
    BracketFormat,
    SuffixFormat,
    PipeFormat,
}

impl MatchCategory {
    /// Short label for logging and notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::XboxKeyword => "xbox_keyword",
            Self::GtFormat => "gt_format",
            Self::BracketFormat => "bracket_format",
            Self::SuffixFormat => "suffix_format",
            Self::PipeFormat => "pipe_format",
        }
    }
}

/// A classifier hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub member_id: String,
    /// Keyword hits carry the whole name; format hits carry the captured identifier.
    pub matched_text: String,
    pub category: MatchCategory,
    /// Marker text for keyword hits.
    pub keyword: Option<String>,
    /// The candidate name that matched.
    pub source: String,
}

/// Keyword rule: anchored, with an optional `kw` group marking the keyword.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub regex: Regex,
}

/// Format rule: anchored, group 1 is the extracted identifier.
#[derive(Debug, Clone)]
pub struct FormatRule {
    pub regex: Regex,
    pub category: MatchCategory,
}

/// Ordered rule list over a member's display identifiers.
#[derive(Debug, Clone)]
pub struct IdentifierClassifier {
    keyword_rules: Vec<KeywordRule>,
    format_rules: Vec<FormatRule>,
}

impl IdentifierClassifier {
    /// Classifier with the built-in keyword and format rules.
    pub fn default_rules() -> Self {
        Self::try_default_rules().expect("built-in classifier patterns compile")
    }

    fn try_default_rules() -> Result<Self, regex::Error> {
        let mut classifier = Self::empty();

        for marker in DEFAULT_BRACKET_MARKERS {
            classifier.keyword_rules.push(KeywordRule {
                regex: Regex::new(&format!(r"(?i)^\W*(?P<kw>{marker})\W*$"))?,
            });
        }
        for core in DEFAULT_KEYWORDS {
            classifier.add_keyword_rule(core)?;
        }

        let formats = [
            (
                format!(r"(?i)^(?:gt|gamertag|xbox|xbl)[:\s]+{ID}$"),
                MatchCategory::GtFormat,
            ),
            (
                format!(r"(?i)^[\[(](?:xbox|xbl|gt)[\])]\s*{ID}$"),
                MatchCategory::BracketFormat,
            ),
            (
                format!(r"(?i)^{ID}\s*[\[(](?:xbox|xbl)[\])]$"),
                MatchCategory::SuffixFormat,
            ),
            (
                format!(r"(?i)^{ID}\s*\|\s*(?:xbox|xbl|gt|gamertag)$"),
                MatchCategory::PipeFormat,
            ),
        ];
        for (pattern, category) in formats {
            classifier.add_format_rule(&pattern, category)?;
        }

        Ok(classifier)
    }

    /// Classifier with no rules (for testing).
    pub fn empty() -> Self {
        Self {
            keyword_rules: Vec::new(),
            format_rules: Vec::new(),
        }
    }

    /// Append a keyword rule. The core is matched case-insensitively against
    /// the whole name; any text without layout separators may surround it.
    pub fn add_keyword_rule(&mut self, core: &str) -> Result<(), regex::Error> {
        let pattern = format!(r"(?i)^{KEYWORD_CONTEXT}(?P<kw>{core}){KEYWORD_CONTEXT}$");
        self.keyword_rules.push(KeywordRule {
            regex: Regex::new(&pattern)?,
        });
        Ok(())
    }

    /// Append a format rule. The pattern should be anchored and must capture
    /// the identifier in group 1.
    pub fn add_format_rule(
        &mut self,
        pattern: &str,
        category: MatchCategory,
    ) -> Result<(), regex::Error> {
        self.format_rules.push(FormatRule {
            regex: Regex::new(pattern)?,
            category,
        });
        Ok(())
    }

    /// Classify a member. Pure: same names, same answer.
    pub fn classify(&self, member: &Member) -> Option<MatchResult> {
        member
            .candidate_identifiers()
            .into_iter()
            .find_map(|name| self.classify_name(name))
            .map(|hit| MatchResult {
                member_id: member.id.clone(),
                ..hit
            })
    }

    /// Classify one candidate name. `member_id` is left empty.
    pub fn classify_name(&self, name: &str) -> Option<MatchResult> {
        for rule in &self.keyword_rules {
            if let Some(caps) = rule.regex.captures(name) {
                let keyword = caps
                    .name("kw")
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string());
                debug!(name, keyword = ?keyword, "Name matched keyword rule");
                return Some(MatchResult {
                    member_id: String::new(),
                    matched_text: name.to_string(),
                    category: MatchCategory::XboxKeyword,
                    keyword,
                    source: name.to_string(),
                });
            }
        }

        for rule in &self.format_rules {
            if let Some(id) = rule.regex.captures(name).and_then(|caps| caps.get(1)) {
                debug!(name, category = rule.category.label(), "Name matched format rule");
                return Some(MatchResult {
                    member_id: String::new(),
                    matched_text: id.as_str().to_string(),
                    category: rule.category,
                    keyword: None,
                    source: name.to_string(),
                });
            }
        }

        None
    }
}

impl Default for IdentifierClassifier {
    fn default() -> Self {
        Self::default_rules()
    }
}
