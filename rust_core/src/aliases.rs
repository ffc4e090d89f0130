//! Team alias table for cross-book game matching.
//!
//! This module provides:
//! - Case-insensitive alias -> canonical team name lookup
//! - Canonical `"{Away} @ {Home}"` game keys
//! - JSON persistence (`{"alias": "canonical", ...}`)
//! - The list of team names no alias resolves yet, for the reconciliation step

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::snapshot::BookData;

/// Default alias file location
pub const DEFAULT_ALIAS_PATH: &str = "team_names.json";

/// Separator between away and home team in a game key
pub const MATCHUP_SEPARATOR: &str = " @ ";

/// Capitalize the first letter of every word and lowercase the rest.
///
/// A word starts after any non-letter, so `"49ers"` becomes `"49Ers"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Split a game key into `(away, home)`.
pub fn split_matchup(game: &str) -> Option<(&str, &str)> {
    let (away, home) = game.split_once(MATCHUP_SEPARATOR)?;
    if home.contains(MATCHUP_SEPARATOR) {
        return None;
    }
    Some((away, home))
}

/// Alias table mapping book-specific team names to canonical names.
#[derive(Debug, Clone, Default)]
pub struct TeamAliases {
    /// lowercased alias -> (alias as written, canonical)
    entries: HashMap<String, (String, String)>,
}

impl TeamAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; a missing or unreadable file gives an empty table.
    pub fn load(path: Option<&str>) -> Self {
        let path = path.unwrap_or(DEFAULT_ALIAS_PATH);
        if !Path::new(path).exists() {
            return Self::new();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read team aliases from {}: {}", path, e);
                return Self::new();
            }
        };

        match serde_json::from_str::<HashMap<String, String>>(&content) {
            Ok(map) => map.into_iter().collect(),
            Err(e) => {
                warn!("Invalid team alias file {}: {}", path, e);
                Self::new()
            }
        }
    }

    /// Save to a JSON file, sorted by alias.
    pub fn save(&self, path: Option<&str>) -> Result<(), std::io::Error> {
        let path = path.unwrap_or(DEFAULT_ALIAS_PATH);
        let sorted: BTreeMap<&str, &str> = self
            .entries
            .values()
            .map(|(alias, canonical)| (alias.as_str(), canonical.as_str()))
            .collect();
        let content = serde_json::to_string_pretty(&sorted)?;
        fs::write(path, content)
    }

    pub fn insert(&mut self, alias: &str, canonical: &str) {
        self.entries.insert(
            alias.to_lowercase(),
            (alias.to_string(), canonical.to_string()),
        );
    }

    /// Canonical name for an alias, if one is known.
    pub fn get(&self, team: &str) -> Option<&str> {
        self.entries
            .get(&team.to_lowercase())
            .map(|(_, canonical)| canonical.as_str())
    }

    /// Canonical name, or the input unchanged when no alias matches.
    pub fn resolve<'a>(&'a self, team: &'a str) -> &'a str {
        self.get(team).unwrap_or(team)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical game key for a book's game name.
    ///
    /// Both teams are title-cased, resolved through the table, and the
    /// result title-cased again. `None` when the name is not a matchup.
    pub fn canonical_game(&self, game: &str) -> Option<String> {
        let titled = title_case(game);
        let (away, home) = split_matchup(&titled)?;
        Some(title_case(&format!(
            "{}{}{}",
            self.resolve(away),
            MATCHUP_SEPARATOR,
            self.resolve(home)
        )))
    }

    /// Team names that neither appear in the reference book nor resolve
    /// through an alias.
    pub fn unresolved_teams(&self, books: &[BookData], reference: &str) -> BTreeSet<String> {
        let reference_teams: BTreeSet<&str> = books
            .iter()
            .filter(|b| b.book == reference)
            .flat_map(|b| b.events.keys())
            .filter_map(|game| split_matchup(game))
            .flat_map(|(away, home)| [away, home])
            .collect();

        books
            .iter()
            .filter(|b| b.book != reference)
            .flat_map(|b| b.events.keys())
            .filter_map(|game| split_matchup(game))
            .flat_map(|(away, home)| [away, home])
            .filter(|team| !reference_teams.contains(team) && self.get(team).is_none())
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<(String, String)> for TeamAliases {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut aliases = Self::new();
        for (alias, canonical) in iter {
            aliases.insert(&alias, &canonical);
        }
        aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{BookSnapshot, EventSnapshot};

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("LA CLIPPERS @ boston celtics"), "La Clippers @ Boston Celtics");
        assert_eq!(title_case("san francisco 49ers"), "San Francisco 49Ers");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut aliases = TeamAliases::new();
        aliases.insert("LA Clippers", "Los Angeles Clippers");
        assert_eq!(aliases.get("la clippers"), Some("Los Angeles Clippers"));
        assert_eq!(aliases.get("La Clippers"), Some("Los Angeles Clippers"));
        assert_eq!(aliases.resolve("Boston Celtics"), "Boston Celtics");
    }

    #[test]
    fn test_canonical_game() {
        let aliases: TeamAliases = [("LA Clippers".to_string(), "Los Angeles Clippers".to_string())]
            .into_iter()
            .collect();
        assert_eq!(
            aliases.canonical_game("BOSTON CELTICS @ LA Clippers").as_deref(),
            Some("Boston Celtics @ Los Angeles Clippers")
        );
        assert_eq!(aliases.canonical_game("Celtics vs Clippers"), None);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("aliases_test_{}.json", std::process::id()));
        let path_str = path.to_str().unwrap();

        let mut aliases = TeamAliases::new();
        aliases.insert("NY Knicks", "New York Knicks");
        aliases.insert("GS Warriors", "Golden State Warriors");
        aliases.save(Some(path_str)).unwrap();

        let loaded = TeamAliases::load(Some(path_str));
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("ny knicks"), Some("New York Knicks"));

        std::fs::remove_file(&path).ok();
        assert!(TeamAliases::load(Some(path_str)).is_empty());
    }

    #[test]
    fn test_unresolved_teams() {
        let book = |name: &str, games: &[&str]| {
            let events: BookSnapshot = games
                .iter()
                .map(|g| (g.to_string(), EventSnapshot::default()))
                .collect();
            BookData::new(name, events)
        };
        let books = vec![
            book("pin", &["Miami Heat @ Boston Celtics"]),
            book("dk", &["MIA Heat @ Boston Celtics", "Utah Jazz @ Denver Nuggets"]),
        ];
        let mut aliases = TeamAliases::new();
        aliases.insert("Utah Jazz", "Utah Jazz");

        let unresolved = aliases.unresolved_teams(&books, "pin");
        assert_eq!(
            unresolved.into_iter().collect::<Vec<_>>(),
            vec!["Denver Nuggets".to_string(), "MIA Heat".to_string()]
        );
    }
}
