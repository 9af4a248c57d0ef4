//! Rule-based intent parser.
//!
//! Used when no language model is configured. Classifies intent with
//! keyword patterns and pulls owner, name and location filters out of
//! common phrasings.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use propchat_core::error::PropChatError;
use propchat_core::services::IntentParser;
use propchat_core::types::{Filters, Intent, ParsedQuery};

// =============================================================================
// Compiled regex sets (compiled once, reused across calls)
// =============================================================================

struct IntentPatterns {
    metadata: Vec<Regex>,
    aggregation: Vec<Regex>,
    lookup: Vec<Regex>,
}

static INTENT_PATTERNS: LazyLock<IntentPatterns> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid intent regex"))
            .collect()
    };

    IntentPatterns {
        metadata: mk(&[
            r"(?i)\bwhat\s+(?:kind\s+of\s+)?(?:information|info|data|attributes|fields|details)\b",
            r"(?i)\bwhich\s+(?:attributes|fields)\b",
            r"(?i)\bwhat\s+can\s+(?:you|i)\s+ask\b",
            r"(?i)\bwhat\s+do\s+you\s+know\b",
        ]),
        aggregation: mk(&[
            r"(?i)\bhow\s+many\b",
            r"(?i)\bcount\b",
            r"(?i)\btotal\b",
            r"(?i)\b(?:the\s+)?most\s+properties\b",
            r"(?i)\bnumber\s+of\b",
        ]),
        lookup: mk(&[
            r"(?i)\bfind\b",
            r"(?i)\bshow\b",
            r"(?i)\blist\b",
            r"(?i)\bsearch\b",
            r"(?i)\blook\s+up\b",
            r"(?i)\bproperties\b",
            r"(?i)\bproperty\b",
            r"(?i)\bowned\s+by\b",
            r"(?i)\bowner\b",
        ]),
    }
});

static OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:owned\s+by|owner\s+is|belonging\s+to)\s+([A-Z][\w.'-]*(?:\s+[A-Z][\w.'-]*)*)")
        .unwrap()
});

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:called|named)\s+"?([^"?.!,]+?)"?\s*(?:[?.!,]|$)"#).unwrap()
});

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:in|near|located\s+in|around)\s+([A-Z][\w.'-]*(?:\s+[A-Z][\w.'-]*)*)")
        .unwrap()
});

static MOST_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:which|what)\s+([a-z_ ]+?)\s+(?:has|have)\s+(?:the\s+)?most\s+properties\b")
        .unwrap()
});

static OWNERS_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhow\s+many\s+(?:different\s+|unique\s+)?owners\b").unwrap());

pub const GREETING: &str = "Hello! I can help you find properties by name, owner or location, count them, or tell you which details I know about. What would you like to know?";

// =============================================================================
// KeywordIntentParser
// =============================================================================

/// Pattern-matching intent parser with no external calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordIntentParser;

impl KeywordIntentParser {
    pub fn new() -> Self {
        Self
    }

    /// Classify and extract filters from a raw message.
    pub fn parse_message(&self, message: &str) -> ParsedQuery {
        let pats = &*INTENT_PATTERNS;
        let message = message.trim();

        // Metadata first so "what information do you have" is not a lookup.
        if pats.metadata.iter().any(|re| re.is_match(message)) {
            return ParsedQuery {
                intent: Intent::Metadata,
                filters: Filters::new(),
                response_text: String::new(),
            };
        }

        if pats.aggregation.iter().any(|re| re.is_match(message)) {
            let mut filters = Filters::new();
            filters.insert(
                "info_type".to_string(),
                vec![aggregation_kind(message)],
            );
            return ParsedQuery {
                intent: Intent::Aggregation,
                filters,
                response_text: "I couldn't compute that summary.".to_string(),
            };
        }

        let mut filters = Filters::new();
        if let Some(owner) = capture(&OWNER_RE, message) {
            filters.insert("owner".to_string(), vec![owner]);
        }
        if let Some(name) = capture(&NAME_RE, message) {
            filters.insert("name".to_string(), vec![name]);
        }

        if filters.is_empty() {
            if let Some(location) = capture(&LOCATION_RE, message) {
                let mut filters = Filters::new();
                filters.insert("location".to_string(), vec![location]);
                return ParsedQuery {
                    intent: Intent::LocationFilter,
                    filters,
                    response_text: String::new(),
                };
            }
        }

        if !filters.is_empty() || pats.lookup.iter().any(|re| re.is_match(message)) {
            return ParsedQuery {
                intent: Intent::PropertyLookup,
                filters,
                response_text: String::new(),
            };
        }

        ParsedQuery {
            intent: Intent::Other,
            filters: Filters::new(),
            response_text: GREETING.to_string(),
        }
    }
}

#[async_trait]
impl IntentParser for KeywordIntentParser {
    async fn parse(&self, message: &str, _schema_doc: &str) -> Result<ParsedQuery, PropChatError> {
        Ok(self.parse_message(message))
    }
}

fn aggregation_kind(message: &str) -> String {
    if let Some(caps) = MOST_BY_RE.captures(message) {
        let subject = caps[1].trim().to_lowercase().replace(' ', "_");
        let subject = if let Some(stem) = subject.strip_suffix("ies") {
            format!("{}y", stem)
        } else if subject.ends_with('s') && !subject.ends_with("ss") {
            subject[..subject.len() - 1].to_string()
        } else {
            subject
        };
        let subject = match subject.as_str() {
            "person" | "landlord" | "owner" | "who" => "owner".to_string(),
            "zip" | "zip_code" | "zipcode" => "zip_code".to_string(),
            other => other.to_string(),
        };
        return format!("{}_with_most_properties", subject);
    }
    if message.to_lowercase().contains("who") && message.to_lowercase().contains("most") {
        return "owner_with_most_properties".to_string();
    }
    if OWNERS_COUNT_RE.is_match(message) {
        return "total_owners".to_string();
    }
    "total_properties".to_string()
}

fn capture(re: &Regex, message: &str) -> Option<String> {
    re.captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
