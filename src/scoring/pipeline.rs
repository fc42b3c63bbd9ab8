use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::{ItemId, UserId};

/// Candidate slice an item was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Personalized,
    Social,
    Fresh,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub item_id: ItemId,
    pub creator_id: UserId,
    pub source: CandidateSource,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn new(item_id: ItemId, creator_id: UserId, source: CandidateSource) -> Self {
        Self {
            item_id,
            creator_id,
            source,
            score: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankingPipeline {
    limit: usize,
}

impl RankingPipeline {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Orders scored candidates and cuts one page.
    ///
    /// Ties keep slice order. A `last_seen` id that is not in the ranking
    /// starts the page from the top.
    pub fn rank(
        &self,
        candidates: Vec<ScoredCandidate>,
        last_seen: Option<ItemId>,
    ) -> Vec<ScoredCandidate> {
        let mut seen = HashSet::new();
        let mut ranked: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter(|candidate| seen.insert(candidate.item_id))
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        if let Some(last_seen) = last_seen {
            if let Some(position) = ranked.iter().position(|c| c.item_id == last_seen) {
                ranked.drain(..=position);
            }
        }

        ranked.truncate(self.limit);
        ranked
    }
}
