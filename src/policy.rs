use serde::{Deserialize, Serialize};

/// Confidence scoring weights and the auto-post threshold.
///
/// These are policy, not code: they live in settings.json so the threshold
/// can be tuned without a rebuild. A match starts at 100 and deductions are
/// applied for every way it falls short of an exact, fully-attributed match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringPolicy {
    #[serde(default = "d_auto_post_threshold")]
    pub auto_post_threshold: i64,
    #[serde(default = "d_tolerance_amount_penalty")]
    pub tolerance_amount_penalty: i64,
    #[serde(default = "d_date_distance_penalty")]
    pub date_distance_penalty: i64,
    #[serde(default = "d_state_below_tag_penalty")]
    pub state_below_tag_penalty: i64,
    #[serde(default = "d_missing_category_penalty")]
    pub missing_category_penalty: i64,
    #[serde(default = "d_date_inversion_penalty")]
    pub date_inversion_penalty: i64,
    #[serde(default = "d_tip_match_confidence")]
    pub tip_match_confidence: i64,
}

fn d_auto_post_threshold() -> i64 {
    95
}
fn d_tolerance_amount_penalty() -> i64 {
    15
}
fn d_date_distance_penalty() -> i64 {
    5
}
fn d_state_below_tag_penalty() -> i64 {
    5
}
fn d_missing_category_penalty() -> i64 {
    10
}
fn d_date_inversion_penalty() -> i64 {
    10
}
fn d_tip_match_confidence() -> i64 {
    75
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            auto_post_threshold: d_auto_post_threshold(),
            tolerance_amount_penalty: d_tolerance_amount_penalty(),
            date_distance_penalty: d_date_distance_penalty(),
            state_below_tag_penalty: d_state_below_tag_penalty(),
            missing_category_penalty: d_missing_category_penalty(),
            date_inversion_penalty: d_date_inversion_penalty(),
            tip_match_confidence: d_tip_match_confidence(),
        }
    }
}

/// The facts about one candidate match that the score is computed from.
#[derive(Debug, Clone, Copy)]
pub struct MatchFacts {
    pub exact_amount: bool,
    pub date_distance_days: i64,
    pub state_from_tag: bool,
    pub has_category: bool,
    pub date_was_inverted: bool,
}

impl ScoringPolicy {
    pub fn score(&self, facts: &MatchFacts) -> i64 {
        let mut score = 100;
        if !facts.exact_amount {
            score -= self.tolerance_amount_penalty;
        }
        score -= facts.date_distance_days.abs() * self.date_distance_penalty;
        if !facts.state_from_tag {
            score -= self.state_below_tag_penalty;
        }
        if !facts.has_category {
            score -= self.missing_category_penalty;
        }
        if facts.date_was_inverted {
            score -= self.date_inversion_penalty;
        }
        score.max(0)
    }

    pub fn auto_postable(&self, score: i64) -> bool {
        score >= self.auto_post_threshold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTolerances {
    #[serde(default = "d_amount_tolerance_cents")]
    pub amount_tolerance_cents: i64,
    #[serde(default = "d_date_tolerance_days")]
    pub date_tolerance_days: i64,
}

fn d_amount_tolerance_cents() -> i64 {
    100
}
fn d_date_tolerance_days() -> i64 {
    3
}

impl Default for MatchTolerances {
    fn default() -> Self {
        Self {
            amount_tolerance_cents: d_amount_tolerance_cents(),
            date_tolerance_days: d_date_tolerance_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact_facts() -> MatchFacts {
        MatchFacts {
            exact_amount: true,
            date_distance_days: 0,
            state_from_tag: true,
            has_category: true,
            date_was_inverted: false,
        }
    }

    #[test]
    fn test_exact_same_day_tagged_scores_100() {
        let policy = ScoringPolicy::default();
        let score = policy.score(&exact_facts());
        assert_eq!(score, 100);
        assert!(policy.auto_postable(score));
    }

    #[test]
    fn test_tolerance_match_falls_below_threshold() {
        let policy = ScoringPolicy::default();
        let facts = MatchFacts {
            exact_amount: false,
            ..exact_facts()
        };
        let score = policy.score(&facts);
        assert!(score < policy.auto_post_threshold, "got {score}");
    }

    #[test]
    fn test_date_distance_deducts_per_day() {
        let policy = ScoringPolicy::default();
        let one_day = policy.score(&MatchFacts {
            date_distance_days: 1,
            ..exact_facts()
        });
        let three_days = policy.score(&MatchFacts {
            date_distance_days: 3,
            ..exact_facts()
        });
        assert_eq!(one_day, 95);
        assert_eq!(three_days, 85);
    }

    #[test]
    fn test_score_never_negative() {
        let policy = ScoringPolicy::default();
        let facts = MatchFacts {
            exact_amount: false,
            date_distance_days: 30,
            state_from_tag: false,
            has_category: false,
            date_was_inverted: true,
        };
        assert_eq!(policy.score(&facts), 0);
    }

    #[test]
    fn test_threshold_is_tunable() {
        let policy = ScoringPolicy {
            auto_post_threshold: 80,
            ..Default::default()
        };
        let facts = MatchFacts {
            exact_amount: false,
            ..exact_facts()
        };
        assert!(policy.auto_postable(policy.score(&facts)));
    }
}
