use crate::models::assignment::ScoreBreakdown;
use crate::models::shipper::Shipper;

const BASE_SCORE: i32 = 100;
const DISTANCE_RANK_PENALTY: i32 = 15;
const LOAD_PENALTY_PER_ORDER: i32 = 8;
const LOAD_PENALTY_CAP: i32 = 50;
const PRIORITY_BONUS: i32 = 10;
const UNAVAILABLE_PENALTY: i32 = 100;

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub shipper: Shipper,
    pub distance_rank: u32,
    pub open_orders: u32,
    pub score: i32,
    pub breakdown: ScoreBreakdown,
}

// `open_orders` must be a fresh count from the store, not the cached
// counter on the row. The non-negative floor applies before the
// unavailability penalty, so an unavailable shipper lands below every
// available one while keeping its relative position.
pub fn compute_score(
    shipper: &Shipper,
    distance_rank: u32,
    open_orders: u32,
) -> (i32, ScoreBreakdown) {
    let distance_penalty = distance_rank as i32 * DISTANCE_RANK_PENALTY;
    let load_penalty = (open_orders as i32 * LOAD_PENALTY_PER_ORDER).min(LOAD_PENALTY_CAP);
    let priority_bonus = shipper.priority as i32 * PRIORITY_BONUS;
    let availability_penalty = if shipper.available {
        0
    } else {
        UNAVAILABLE_PENALTY
    };

    let floored = (BASE_SCORE - distance_penalty - load_penalty + priority_bonus).max(0);
    let score = floored - availability_penalty;

    let breakdown = ScoreBreakdown {
        distance_rank,
        distance_penalty,
        load_penalty,
        priority_bonus,
        availability_penalty,
    };
    (score, breakdown)
}

// Stable sort, so equal scores keep the store's eligibility order
// (priority descending, then load).
pub fn rank_candidates(mut candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}
