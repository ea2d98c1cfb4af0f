//! Team-name normalization, similarity scoring, and alias resolution.
//!
//! Every source spells team names differently ("Man United", "Manchester
//! United FC", "Manchester Utd"). Normalization rewrites a raw name into a
//! comparable canonical form; similarity scores two names in [0,1]; the
//! resolver maps (raw name, source) to a team row, learning aliases as it
//! goes.

use anyhow::Result;
use tracing::{debug, info};

use crate::store::models::Team;
use crate::store::Database;

/// Fuzzy matches at or above this score may auto-create an alias.
/// Anything below must be added manually.
pub const AUTO_ALIAS_THRESHOLD: f64 = 0.85;

/// Club prefixes stripped from the front of a name (closed set).
const CLUB_PREFIXES: &[&str] = &[
    "fc", "afc", "ac", "as", "sc", "sk", "fk", "nk", "bk", "ik", "if", "cd", "cf", "ca", "rc",
    "rcd", "sv", "vfb", "vfl", "tsv", "bsc", "ss", "ssc", "us", "kv", "krc", "rsc", "1.",
];

/// Club suffixes stripped from the end of a name (closed set).
const CLUB_SUFFIXES: &[&str] = &["fc", "afc", "sc", "cf", "fk", "bk", "if", "sk", "ac"];

/// Well-known short forms that normalization maps straight to the canonical
/// name. Values must themselves be normalization fixpoints.
const KNOWN_SHORT_FORMS: &[(&str, &str)] = &[
    ("man united", "Manchester United"),
    ("man utd", "Manchester United"),
    ("manchester utd", "Manchester United"),
    ("man city", "Manchester City"),
    ("spurs", "Tottenham Hotspur"),
    ("wolves", "Wolverhampton Wanderers"),
    ("psg", "Paris Saint-Germain"),
    ("barca", "Barcelona"),
    ("inter", "Inter Milan"),
    ("juve", "Juventus"),
];

/// Normalize a raw team name into its canonical comparable form.
///
/// The rewrite pipeline runs to a fixpoint, so the result is idempotent:
/// `normalize_team_name(normalize_team_name(s)) == normalize_team_name(s)`.
pub fn normalize_team_name(raw: &str) -> String {
    let mut current = collapse_whitespace(raw.trim());
    for _ in 0..8 {
        let next = normalize_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    if current.is_empty() {
        // A name made entirely of strippable tokens stays as typed.
        return collapse_whitespace(raw.trim());
    }
    current
}

fn normalize_once(name: &str) -> String {
    let mut s = name.trim().to_string();

    // Leading club prefix
    if let Some((first, rest)) = s.split_once(' ') {
        if CLUB_PREFIXES.contains(&first.to_lowercase().as_str()) {
            s = rest.trim().to_string();
        }
    }

    // Trailing club suffix
    if let Some((rest, last)) = s.rsplit_once(' ') {
        if CLUB_SUFFIXES.contains(&last.to_lowercase().as_str()) {
            s = rest.trim().to_string();
        }
    }

    // Trailing parenthetical qualifier or bracketed country code
    s = strip_trailing_group(&s, '(', ')');
    s = strip_trailing_group(&s, '[', ']');

    // Leading "The"
    let lower = s.to_lowercase();
    if lower == "the" {
        s.clear();
    } else if lower.starts_with("the ") {
        s = s[4..].trim().to_string();
    }

    // Trailing 4-digit year
    if let Some((rest, last)) = s.rsplit_once(' ') {
        if last.len() == 4 && last.chars().all(|c| c.is_ascii_digit()) {
            s = rest.trim().to_string();
        }
    }

    let s = collapse_whitespace(&s);

    // Known short forms map straight to the canonical spelling
    let key = s.to_lowercase();
    for (short, canonical) in KNOWN_SHORT_FORMS {
        if key == *short {
            return canonical.to_string();
        }
    }
    s
}

fn strip_trailing_group(s: &str, open: char, close: char) -> String {
    let trimmed = s.trim_end();
    if trimmed.ends_with(close) {
        if let Some(idx) = trimmed.rfind(open) {
            return trimmed[..idx].trim_end().to_string();
        }
    }
    trimmed.to_string()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, punctuation-stripped comparison key.
pub fn search_key(name: &str) -> String {
    let mapped: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&mapped)
}

/// Similarity of two names in [0,1].
///
/// Combines Levenshtein distance (converted to a ratio) with Jaccard token
/// overlap on tokens longer than 2 characters. Token overlap is weighted by
/// `min(0.6, 0.15 * max_word_count)`, keeping edit distance dominant for
/// single-word names while letting token overlap carry multi-word names.
/// Tokens also match on shared prefixes ("manchester" / "manchesterr"), which
/// is how abbreviated spellings earn credit.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ka = search_key(a);
    let kb = search_key(b);
    if ka.is_empty() || kb.is_empty() {
        return if ka == kb { 1.0 } else { 0.0 };
    }
    if ka == kb {
        return 1.0;
    }

    let (shorter, longer) = if ka.len() <= kb.len() {
        (ka.len(), kb.len())
    } else {
        (kb.len(), ka.len())
    };
    // Length ratio differing by more than 50% cannot be the same team.
    if shorter * 2 < longer {
        return 0.0;
    }

    let distance = strsim::levenshtein(&ka, &kb);
    let lev_ratio = 1.0 - distance as f64 / longer as f64;

    let tokens_a: Vec<&str> = ka.split_whitespace().filter(|t| t.len() > 2).collect();
    let tokens_b: Vec<&str> = kb.split_whitespace().filter(|t| t.len() > 2).collect();
    let token_sim = token_overlap(&tokens_a, &tokens_b);

    let max_words = tokens_a.len().max(tokens_b.len());
    let weight = (0.15 * max_words as f64).min(0.6);

    (lev_ratio * (1.0 - weight) + token_sim * weight).clamp(0.0, 1.0)
}

fn token_overlap(a: &[&str], b: &[&str]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let mut matches = 0usize;
    let mut used = vec![false; b.len()];
    for ta in a {
        for (i, tb) in b.iter().enumerate() {
            if used[i] {
                continue;
            }
            if tokens_match(ta, tb) {
                used[i] = true;
                matches += 1;
                break;
            }
        }
    }
    let union = a.len() + b.len() - matches;
    if union == 0 {
        0.0
    } else {
        matches as f64 / union as f64
    }
}

fn tokens_match(a: &str, b: &str) -> bool {
    a == b || (a.len() >= 4 && b.starts_with(a)) || (b.len() >= 4 && a.starts_with(b))
}

/// Resolves raw (name, source) pairs to team rows, learning aliases.
///
/// Holds a per-invocation copy of the teams table so fuzzy passes do not
/// re-read the store on every call.
pub struct TeamResolver {
    db: Database,
    teams: Option<Vec<Team>>,
}

impl TeamResolver {
    pub fn new(db: Database) -> Self {
        TeamResolver { db, teams: None }
    }

    fn teams(&mut self) -> Result<&[Team]> {
        if self.teams.is_none() {
            self.teams = Some(self.db.list_teams()?);
        }
        Ok(self.teams.as_deref().unwrap_or_default())
    }

    /// Resolve a raw name from a source to a team id, in order:
    /// exact alias hit, case-insensitive canonical match, fuzzy match at
    /// [`AUTO_ALIAS_THRESHOLD`], then insert a new team. Never fails on
    /// normal input; duplicate alias inserts are swallowed by the store.
    pub fn find_or_create_team(&mut self, raw_name: &str, source: &str) -> Result<i64> {
        if let Some(team_id) = self.db.find_team_by_alias(raw_name, source)? {
            return Ok(team_id);
        }

        let normalized = normalize_team_name(raw_name);

        if let Some(team_id) = self.db.find_team_by_name_ci(&normalized)? {
            self.db.insert_alias(team_id, raw_name, source)?;
            debug!("Alias '{}' ({}) -> team {}", raw_name, source, team_id);
            return Ok(team_id);
        }

        // Fuzzy pass over the cached teams table
        let mut best: Option<(i64, String, f64)> = None;
        for team in self.teams()? {
            let score = similarity(&normalized, &team.name);
            if score >= AUTO_ALIAS_THRESHOLD
                && best.as_ref().map(|(_, _, s)| score > *s).unwrap_or(true)
            {
                best = Some((team.id, team.name.clone(), score));
            }
        }
        if let Some((team_id, team_name, score)) = best {
            self.db.insert_alias(team_id, raw_name, source)?;
            info!(
                "Auto-learned alias '{}' ({}) -> '{}' (similarity {:.2})",
                raw_name, source, team_name, score
            );
            return Ok(team_id);
        }

        let team_id = self.db.insert_team(&normalized)?;
        self.db.insert_alias(team_id, raw_name, source)?;
        if let Some(cache) = self.teams.as_mut() {
            cache.push(Team {
                id: team_id,
                name: normalized.clone(),
                created_at: chrono::Utc::now(),
            });
        }
        debug!("New team '{}' from '{}' ({})", normalized, raw_name, source);
        Ok(team_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_strips_prefix_and_country_code() {
        assert_eq!(normalize_team_name("FC Bayern Munich (GER)"), "Bayern Munich");
    }

    #[test]
    fn test_normalize_strips_article_and_suffix() {
        assert_eq!(normalize_team_name("The Arsenal FC"), "Arsenal");
    }

    #[test]
    fn test_normalize_strips_trailing_year_and_brackets() {
        assert_eq!(normalize_team_name("Hoffenheim 1899"), "Hoffenheim");
        assert_eq!(normalize_team_name("Rangers [SCO]"), "Rangers");
        // Two-digit club numbers stay
        assert_eq!(normalize_team_name("Schalke 04"), "Schalke 04");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "FC Bayern Munich (GER)",
            "The Arsenal FC",
            "  AS   Roma ",
            "Man United",
            "SC Freiburg (GER) 1904",
            "Wolves",
        ] {
            let once = normalize_team_name(raw);
            assert_eq!(normalize_team_name(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_normalize_known_short_forms() {
        assert_eq!(normalize_team_name("Man United"), "Manchester United");
        assert_eq!(normalize_team_name("Man Utd"), "Manchester United");
        assert_eq!(normalize_team_name("Spurs"), "Tottenham Hotspur");
    }

    #[test]
    fn test_normalize_all_strippable_keeps_original() {
        assert_eq!(normalize_team_name("FC"), "FC");
    }

    #[test]
    fn test_similarity_identity_and_symmetry() {
        assert_relative_eq!(similarity("Arsenal", "Arsenal"), 1.0);
        let ab = similarity("Manchester United", "Manchester Utd");
        let ba = similarity("Manchester Utd", "Manchester United");
        assert_relative_eq!(ab, ba);
    }

    #[test]
    fn test_similarity_ignores_case_and_punctuation() {
        assert_relative_eq!(similarity("ARSENAL", "arsenal"), 1.0);
        assert_relative_eq!(similarity("St. Pauli", "St Pauli"), 1.0);
    }

    #[test]
    fn test_similarity_length_short_circuit() {
        assert_relative_eq!(similarity("Ajax", "Borussia Moenchengladbach"), 0.0);
    }

    #[test]
    fn test_similarity_unrelated_names_score_low() {
        assert!(similarity("Tottenham", "Chelsea") < 0.4);
        assert!(similarity("Barcelona", "Arsenal") < 0.5);
    }

    #[test]
    fn test_similarity_near_duplicate_scores_high() {
        assert!(similarity("Manchester United", "Manchesterr United") > 0.9);
    }

    #[test]
    fn test_resolver_alias_fast_path() {
        let db = Database::open_in_memory().unwrap();
        let mut resolver = TeamResolver::new(db.clone());

        let id1 = resolver.find_or_create_team("Arsenal FC", "sofascore").unwrap();
        // Second call hits the stored alias, not the create path
        let id2 = resolver.find_or_create_team("Arsenal FC", "sofascore").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(db.list_teams().unwrap().len(), 1);
        assert_eq!(db.list_teams().unwrap()[0].name, "Arsenal");
    }

    #[test]
    fn test_resolver_learns_alias_for_canonical_match() {
        let db = Database::open_in_memory().unwrap();
        let team_id = db.insert_team("Bayern Munich").unwrap();
        let mut resolver = TeamResolver::new(db.clone());

        let resolved = resolver
            .find_or_create_team("FC Bayern Munich (GER)", "flashscore")
            .unwrap();
        assert_eq!(resolved, team_id);
        assert_eq!(
            db.find_team_by_alias("FC Bayern Munich (GER)", "flashscore").unwrap(),
            Some(team_id)
        );
    }

    #[test]
    fn test_resolver_auto_learns_fuzzy_match() {
        let db = Database::open_in_memory().unwrap();
        let team_id = db.insert_team("Manchester United").unwrap();
        let mut resolver = TeamResolver::new(db.clone());

        let resolved = resolver
            .find_or_create_team("Manchesterr United", "365scores")
            .unwrap();
        assert_eq!(resolved, team_id);
        assert_eq!(db.list_teams().unwrap().len(), 1);
    }

    #[test]
    fn test_resolver_creates_new_team_below_threshold() {
        let db = Database::open_in_memory().unwrap();
        db.insert_team("Chelsea").unwrap();
        let mut resolver = TeamResolver::new(db.clone());

        let resolved = resolver.find_or_create_team("Charlton", "espn").unwrap();
        let teams = db.list_teams().unwrap();
        assert_eq!(teams.len(), 2);
        assert!(teams.iter().any(|t| t.id == resolved && t.name == "Charlton"));
    }

    #[test]
    fn test_resolver_different_sources_same_alias_text() {
        let db = Database::open_in_memory().unwrap();
        let mut resolver = TeamResolver::new(db.clone());

        let id1 = resolver.find_or_create_team("Arsenal", "sofascore").unwrap();
        let id2 = resolver.find_or_create_team("Arsenal", "espn").unwrap();
        assert_eq!(id1, id2);
    }
}
