pub mod dedup;
pub mod matcher;
pub mod normalizer;

pub use dedup::{find_or_create_event, DedupOutcome, ScrapedFixture};
pub use matcher::{match_events, match_team_names, EventToMatch, MatchOptions, MatchResult};
pub use normalizer::{normalize_team_name, search_key, similarity, TeamResolver};
