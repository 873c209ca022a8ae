use regex::Regex;

use crate::common::errors::{Error, Result};

/// One clause of a bracketed episode filter. `-1` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Clause {
    from_season: i64,
    from_episode: i64,
    to_season: i64,
    to_episode: i64,
}

/// Parsed form of the bracketed `[S…E…-…]` suffix of a catalog url.
///
/// An episode passes the filter iff any clause accepts it; a filter with no
/// clauses accepts everything.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    clauses: Vec<Clause>,
}

impl UrlFilter {
    /// Parses the raw bracket contents, e.g. `S1E4-S1E6,S2`.
    ///
    /// Every comma-separated clause must be consumed by the clause pattern in
    /// full; leftover characters are a syntax error, not a silent no-match.
    pub fn parse(raw: &str) -> Result<Self> {
        let clause_re = Regex::new(r"^(?:S(\d+))?(?:E(\d+))?(?:(-)(?:S(\d+))?(?:E(\d+))?)?$")
            .unwrap();

        let mut clauses = Vec::new();
        for clause_text in raw.split(',') {
            let captures = clause_re
                .captures(clause_text)
                .ok_or_else(|| Error::FilterSyntax(clause_text.to_string()))?;

            let number = |i: usize| -> Result<i64> {
                match captures.get(i) {
                    Some(m) => m
                        .as_str()
                        .parse::<i64>()
                        .map_err(|_| Error::FilterSyntax(clause_text.to_string())),
                    None => Ok(-1),
                }
            };

            let from_season = number(1)?;
            let from_episode = number(2)?;
            let (to_season, to_episode) = if captures.get(3).is_some() {
                (number(4)?, number(5)?)
            } else {
                // No dash: a point query, the upper bound collapses onto
                // the lower.
                (from_season, from_episode)
            };

            clauses.push(Clause {
                from_season,
                from_episode,
                to_season,
                to_episode,
            });
        }

        Ok(Self { clauses })
    }

    pub fn is_episode_valid(&self, season: u32, episode: u32) -> bool {
        if self.clauses.is_empty() {
            return true;
        }
        let (s, e) = (season as i64, episode as i64);
        self.clauses.iter().any(|c| {
            let lower = if c.from_season == -1 {
                // No season bound: the episode bound applies in any season.
                c.from_episode == -1 || e >= c.from_episode
            } else {
                s > c.from_season
                    || (s == c.from_season && (c.from_episode == -1 || e >= c.from_episode))
            };
            let upper = if c.to_season == -1 {
                c.to_episode == -1 || e <= c.to_episode
            } else {
                s < c.to_season || (s == c.to_season && (c.to_episode == -1 || e <= c.to_episode))
            };
            lower && upper
        })
    }

    /// True when some episode of `season` could pass the filter. Used to
    /// prune whole seasons before their episode lists are fetched.
    pub fn is_season_valid(&self, season: u32) -> bool {
        if self.clauses.is_empty() {
            return true;
        }
        let s = season as i64;
        self.clauses.iter().any(|c| {
            (c.from_season == -1 || s >= c.from_season) && (c.to_season == -1 || s <= c.to_season)
        })
    }
}
