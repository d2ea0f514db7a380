//! Server log classification.
//!
//! Every log line is run through an ordered list of rules. A rule fires when
//! its match pattern is found in the line and its extract pattern then finds
//! a substring of the same line. All rules are evaluated, so one line can
//! produce several events.

use fancy_regex::Regex;
use tracing::warn;

/// A declarative log rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRule {
    /// Pattern deciding whether the rule applies to a line.
    pub match_pattern: &'static str,
    /// Pattern selecting the text to relay; the first match is used.
    pub extract_pattern: &'static str,
    /// Prefix put in front of the extracted text.
    pub label: &'static str,
}

/// Rules for a vanilla server log.
///
/// Order is significant and overlapping rules are intentional: a death line
/// fires both the death report and the location rule.
pub const DEFAULT_RULES: &[LogRule] = &[
    LogRule {
        match_pattern: r"\[Server thread/WARN\]:",
        extract_pattern: r"(?<=WARN\]: ).*",
        label: "SERVER WARNING: ",
    },
    LogRule {
        match_pattern: r"\[Server thread/ERROR\]:",
        extract_pattern: r"(?<=ERROR\]: ).*",
        label: "SERVER ERROR: ",
    },
    // Bracketed speakers, except the relay's own "[@name]" avatars.
    LogRule {
        match_pattern: r"\[Server thread/INFO\]: \[[^@].*\] ",
        extract_pattern: r"(?<=INFO\]: ).*",
        label: ">> ",
    },
    // Player chat.
    LogRule {
        match_pattern: r"\[Server thread/INFO\]: <.*> ",
        extract_pattern: r"(?<=INFO\]: ).*",
        label: ">> ",
    },
    LogRule {
        match_pattern: r"\[Server thread/INFO\]: [^0-9].*died, ",
        extract_pattern: r"(?<=message: ).*",
        label: "DEATH REPORT: ",
    },
    LogRule {
        match_pattern: r"\[Server thread/INFO\]: [^0-9].*died, ",
        extract_pattern: r"x=.+y=.+z=.+[0-9]+",
        label: "LOCATION: ",
    },
    LogRule {
        match_pattern: r"\[Server thread/INFO\]: [^\[].+was .+ by ",
        extract_pattern: r"(?<=INFO\]: ).*",
        label: "PLAYER REPORT: ",
    },
    LogRule {
        match_pattern: r"\[Server thread/INFO\]: [^\[].+joined the game",
        extract_pattern: r"(?<=INFO\]: ).*",
        label: "JOINED: ",
    },
    LogRule {
        match_pattern: r"\[Server thread/INFO\]: [^\[].+left the game",
        extract_pattern: r"(?<=INFO\]: ).*",
        label: "LEFT: ",
    },
    LogRule {
        match_pattern: r"\[Server thread/INFO\]: [^\[].+has made the advancement",
        extract_pattern: r"(?<=INFO\]: ).*",
        label: "CLAP FOR: ",
    },
];

/// An event extracted from one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub label: &'static str,
    pub text: String,
}

impl ClassifiedEvent {
    /// The chat message for this event.
    pub fn render(&self) -> String {
        format!("{}{}", self.label, self.text)
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    label: &'static str,
    matcher: Regex,
    extractor: Regex,
}

/// Compiled, immutable rule set.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<CompiledRule>,
}

impl Classifier {
    /// Compile a rule list.
    ///
    /// Rules with an invalid pattern are logged and skipped.
    pub fn new(rules: &[LogRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match compile_rule(rule) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!("Invalid log rule '{}': {}", rule.label, e);
                    None
                }
            })
            .collect();

        Self { rules }
    }

    /// Classify one line. Returns every event it produces, in rule order.
    pub fn classify(&self, line: &str) -> Vec<ClassifiedEvent> {
        self.rules
            .iter()
            .filter(|rule| matches(&rule.matcher, line))
            .filter_map(|rule| {
                extract(&rule.extractor, line).map(|text| ClassifiedEvent {
                    label: rule.label,
                    text,
                })
            })
            .collect()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULES)
    }
}

fn compile_rule(rule: &LogRule) -> Result<CompiledRule, fancy_regex::Error> {
    Ok(CompiledRule {
        label: rule.label,
        matcher: Regex::new(rule.match_pattern)?,
        extractor: Regex::new(rule.extract_pattern)?,
    })
}

fn matches(regex: &Regex, line: &str) -> bool {
    regex.is_match(line).unwrap_or_else(|e| {
        warn!("Regex match error for pattern '{}': {}", regex.as_str(), e);
        false
    })
}

fn extract(regex: &Regex, line: &str) -> Option<String> {
    match regex.find(line) {
        Ok(found) => found.map(|m| m.as_str().to_string()),
        Err(e) => {
            warn!("Regex match error for pattern '{}': {}", regex.as_str(), e);
            None
        }
    }
}
