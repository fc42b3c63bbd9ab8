use serde::{Deserialize, Serialize};

/// Accrual levels unlocked by cumulative share points, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTier {
    #[default]
    None,
    Silver,
    Gold,
    Platinum,
    Cientium,
}

impl BadgeTier {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "" | "none" => Some(BadgeTier::None),
            "silver" => Some(BadgeTier::Silver),
            "gold" => Some(BadgeTier::Gold),
            "platinum" => Some(BadgeTier::Platinum),
            "cientium" => Some(BadgeTier::Cientium),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BadgeTier::None => "none",
            BadgeTier::Silver => "silver",
            BadgeTier::Gold => "gold",
            BadgeTier::Platinum => "platinum",
            BadgeTier::Cientium => "cientium",
        }
    }

    /// Guaranteed reach for items of a badge holder. Each tier is 10x the one below.
    pub fn min_reach(self) -> Option<u64> {
        match self {
            BadgeTier::None => None,
            BadgeTier::Silver => Some(10_000),
            BadgeTier::Gold => Some(100_000),
            BadgeTier::Platinum => Some(1_000_000),
            BadgeTier::Cientium => Some(10_000_000),
        }
    }

    pub fn is_badge(self) -> bool {
        self != BadgeTier::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BadgeThresholds {
    pub silver: u64,
    pub gold: u64,
    pub platinum: u64,
    pub cientium: u64,
}

impl Default for BadgeThresholds {
    fn default() -> Self {
        Self {
            silver: 1_000,
            gold: 5_000,
            platinum: 20_000,
            cientium: 100_000,
        }
    }
}

impl BadgeThresholds {
    pub fn is_ascending(&self) -> bool {
        self.silver < self.gold && self.gold < self.platinum && self.platinum < self.cientium
    }
}

/// Outcome of applying points to a running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Accrual {
    pub total_share_points: u64,
    pub tier: BadgeTier,
}

#[derive(Debug, Clone)]
pub struct BadgeTierTracker {
    thresholds: BadgeThresholds,
}

impl BadgeTierTracker {
    pub fn new(thresholds: BadgeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn tier_for(&self, points: u64) -> BadgeTier {
        let thresholds = &self.thresholds;
        if points >= thresholds.cientium {
            BadgeTier::Cientium
        } else if points >= thresholds.platinum {
            BadgeTier::Platinum
        } else if points >= thresholds.gold {
            BadgeTier::Gold
        } else if points >= thresholds.silver {
            BadgeTier::Silver
        } else {
            BadgeTier::None
        }
    }

    /// Tier first, then the ceiling: the running total never exceeds the
    /// top tier's threshold.
    pub fn resolve(&self, total_share_points: u64) -> Accrual {
        let tier = self.tier_for(total_share_points);
        Accrual {
            total_share_points: total_share_points.min(self.thresholds.cientium),
            tier,
        }
    }

    pub fn accrue(&self, current: u64, delta: u64) -> Accrual {
        self.resolve(current.saturating_add(delta))
    }
}
