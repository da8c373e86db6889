//! Colour rules for text entities.
//!
//! Two [`ColorRuleTable`]s are consulted with a fixed priority: character
//! colour rules first, text colour rules second. Matching is exact on
//! whitespace-normalised text; the first rule in declaration order wins.
//!
//! Tables are built by a pure parse step ([`RuleSpec`], [`load_rule_file`],
//! [`parse_rule_lines`]) and evaluated by [`ColorResolver`], so rules can
//! come from literal lists, files or label sets alike.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RuleError;
use crate::text::normalize;

/// The eight named palette colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteColor {
    Black,
    Red,
    Yellow,
    Green,
    Cyan,
    Blue,
    Magenta,
    White,
}

impl PaletteColor {
    pub const ALL: [PaletteColor; 8] = [
        PaletteColor::Black,
        PaletteColor::Red,
        PaletteColor::Yellow,
        PaletteColor::Green,
        PaletteColor::Cyan,
        PaletteColor::Blue,
        PaletteColor::Magenta,
        PaletteColor::White,
    ];

    /// Palette index of the colour.
    pub fn index(self) -> i16 {
        match self {
            PaletteColor::Black => 0,
            PaletteColor::Red => 1,
            PaletteColor::Yellow => 2,
            PaletteColor::Green => 3,
            PaletteColor::Cyan => 4,
            PaletteColor::Blue => 5,
            PaletteColor::Magenta => 6,
            PaletteColor::White => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PaletteColor::Black => "black",
            PaletteColor::Red => "red",
            PaletteColor::Yellow => "yellow",
            PaletteColor::Green => "green",
            PaletteColor::Cyan => "cyan",
            PaletteColor::Blue => "blue",
            PaletteColor::Magenta => "magenta",
            PaletteColor::White => "white",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PaletteColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PaletteColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            let names: Vec<_> = Self::ALL.iter().map(|c| c.name()).collect();
            format!("unknown colour {s:?}, expected one of {}", names.join(","))
        })
    }
}

/// One colour and the strings that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRule {
    pub color: String,
    pub matches: Vec<String>,
}

/// Colour name → ordered match strings, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRuleTable {
    rules: Vec<ColorRule>,
}

impl ColorRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add match strings for `color`. Declaring a colour again extends its
    /// existing entry; declaration position is that of the first declaration.
    pub fn insert<S: Into<String>>(
        &mut self,
        color: &str,
        matches: impl IntoIterator<Item = S>,
    ) -> &mut Self {
        let matches: Vec<String> = matches.into_iter().map(Into::into).collect();
        match self
            .rules
            .iter_mut()
            .find(|r| r.color.eq_ignore_ascii_case(color))
        {
            Some(rule) => rule.matches.extend(matches),
            None => self.rules.push(ColorRule {
                color: color.to_string(),
                matches,
            }),
        }
        self
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<S: Into<String>>(mut self, color: &str, matches: impl IntoIterator<Item = S>) -> Self {
        self.insert(color, matches);
        self
    }

    /// Build a table from `color:strings` / `color:file.txt` specs.
    ///
    /// A rule file that yields no rules adds no entry.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self, RuleError> {
        let mut table = Self::new();
        for spec in specs {
            let matches = spec.source.load()?;
            if matches.is_empty() {
                warn!(color = %spec.color, "colour rule has no match strings, ignoring");
                continue;
            }
            table.insert(&spec.color, matches);
        }
        Ok(table)
    }

    pub fn rules(&self) -> &[ColorRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Where a rule's match strings come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Literal(Vec<String>),
    File(PathBuf),
}

impl RuleSource {
    fn load(&self) -> Result<Vec<String>, RuleError> {
        match self {
            RuleSource::Literal(items) => Ok(items.clone()),
            RuleSource::File(path) => load_rule_file(path),
        }
    }
}

/// A parsed `color:strings` or `color:file.txt` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub color: String,
    pub source: RuleSource,
}

impl RuleSpec {
    /// Parse `color:a,b,"c d"` or `color:path/to/rules.txt`.
    pub fn parse(spec: &str) -> Result<Self, RuleError> {
        let (color, value) = spec.split_once(':').ok_or_else(|| RuleError::MalformedSpec {
            spec: spec.to_string(),
        })?;
        let color = color.trim();
        if color.is_empty() {
            return Err(RuleError::MalformedSpec {
                spec: spec.to_string(),
            });
        }

        let value = value.trim();
        let source = if value.ends_with(".txt") {
            RuleSource::File(PathBuf::from(value))
        } else {
            RuleSource::Literal(value.split(',').map(|s| strip_quotes(s.trim()).to_string()).collect())
        };

        Ok(Self {
            color: color.to_string(),
            source,
        })
    }
}

impl FromStr for RuleSpec {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Read a line-oriented rule file.
pub fn load_rule_file(path: &Path) -> Result<Vec<String>, RuleError> {
    let content = std::fs::read_to_string(path).map_err(|source| RuleError::RuleFile {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = parse_rule_lines(&content);
    debug!(path = %path.display(), rules = rules.len(), "rule file loaded");
    Ok(rules)
}

/// One rule per line; blank lines and `#` comments are ignored and one pair
/// of surrounding quotes is stripped.
pub fn parse_rule_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| strip_quotes(line).to_string())
        .collect()
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Pre-normalised rule tables ready for repeated lookups.
#[derive(Debug, Clone)]
pub struct ColorResolver {
    char_rules: Vec<(i16, Vec<String>)>,
    text_rules: Vec<(i16, Vec<String>)>,
    default_color: i16,
}

impl ColorResolver {
    pub fn new(char_rules: &ColorRuleTable, text_rules: &ColorRuleTable, default_color: i16) -> Self {
        Self {
            char_rules: compile(char_rules, default_color),
            text_rules: compile(text_rules, default_color),
            default_color,
        }
    }

    /// Colour index for `text`: char rules, then text rules, then the default.
    pub fn resolve(&self, text: &str) -> i16 {
        self.lookup(text).unwrap_or(self.default_color)
    }

    /// The matching rule's colour index, if any rule matches.
    pub fn lookup(&self, text: &str) -> Option<i16> {
        let text = normalize(text);
        if text.is_empty() {
            return None;
        }
        find_match(&self.char_rules, &text).or_else(|| find_match(&self.text_rules, &text))
    }

    pub fn default_color(&self) -> i16 {
        self.default_color
    }
}

fn compile(table: &ColorRuleTable, default_color: i16) -> Vec<(i16, Vec<String>)> {
    table
        .rules()
        .iter()
        .map(|rule| {
            let index = match PaletteColor::from_name(&rule.color) {
                Some(color) => color.index(),
                None => {
                    warn!(color = %rule.color, default = default_color, "unknown rule colour, using default");
                    default_color
                }
            };
            (index, rule.matches.iter().map(|m| normalize(m)).collect())
        })
        .collect()
}

fn find_match(rules: &[(i16, Vec<String>)], text: &str) -> Option<i16> {
    rules
        .iter()
        .find(|(_, matches)| matches.iter().any(|m| m == text))
        .map(|(index, _)| *index)
}

/// Resolve the colour for `text` against both rule tables.
///
/// Builds a [`ColorResolver`] for a single lookup; reuse a resolver when
/// resolving many strings against the same tables.
pub fn resolve_text_color(
    text: &str,
    char_rules: &ColorRuleTable,
    text_rules: &ColorRuleTable,
    default_color: i16,
) -> i16 {
    ColorResolver::new(char_rules, text_rules, default_color).resolve(text)
}
