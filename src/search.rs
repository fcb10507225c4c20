use crate::storage::CommandEntry;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::{Regex, RegexBuilder};

/// How a search pattern is applied to recorded entries.
pub enum SearchQuery {
    /// Case-insensitive regex over the command and its output.
    Pattern(Regex),
    /// Skim-style fuzzy match over the command only, ranked by score.
    Fuzzy { pattern: String, matcher: SkimMatcherV2 },
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: CommandEntry,
    pub score: i64,
    // Output lines that matched, for context
    pub matched_lines: Vec<String>,
}

impl SearchQuery {
    /// Build a query. A pattern that is not a valid regex is matched literally.
    pub fn new(pattern: &str, fuzzy: bool) -> Result<Self, regex::Error> {
        if fuzzy {
            return Ok(SearchQuery::Fuzzy {
                pattern: pattern.to_string(),
                matcher: SkimMatcherV2::default(),
            });
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .or_else(|_| RegexBuilder::new(&regex::escape(pattern)).case_insensitive(true).build())?;
        Ok(SearchQuery::Pattern(regex))
    }

    pub fn is_fuzzy(&self) -> bool {
        matches!(self, SearchQuery::Fuzzy { .. })
    }

    fn check(&self, entry: &CommandEntry) -> Option<SearchHit> {
        match self {
            SearchQuery::Pattern(regex) => {
                let matched_lines: Vec<String> = entry
                    .output
                    .iter()
                    .filter(|line| regex.is_match(line))
                    .cloned()
                    .collect();
                let command_hit = regex.is_match(&entry.command);
                if !command_hit && matched_lines.is_empty() {
                    return None;
                }
                Some(SearchHit {
                    entry: entry.clone(),
                    score: if command_hit { 1000 } else { 0 },
                    matched_lines,
                })
            }
            SearchQuery::Fuzzy { pattern, matcher } => {
                let score = matcher.fuzzy_match(&entry.command, pattern)?;
                Some(SearchHit {
                    entry: entry.clone(),
                    score,
                    matched_lines: Vec::new(),
                })
            }
        }
    }
}

/// Entries that match `query`. Regex hits keep log order; fuzzy hits are
/// ranked best first, shorter commands winning ties.
pub fn search_entries<I>(entries: I, query: &SearchQuery) -> Vec<SearchHit>
where
    I: IntoIterator<Item = CommandEntry>,
{
    let mut hits: Vec<SearchHit> = entries.into_iter().filter_map(|e| query.check(&e)).collect();

    if query.is_fuzzy() {
        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.entry.command.len().cmp(&b.entry.command.len()))
        });
    }
    hits
}
