use crate::store::Store;
use uuid::Uuid;

pub const POINTS_REPORT_SUBMITTED: i64 = 10;
pub const POINTS_REPORT_RESOLVED: i64 = 20;

/// Badge thresholds in ascending order.
const BADGES: [(i64, &str); 4] = [
    (10, "Starter"),
    (50, "Contributor"),
    (150, "Guardian"),
    (400, "Champion"),
];

/// Every badge whose threshold `points` has reached, lowest first.
pub fn badges_for(points: i64) -> Vec<&'static str> {
    BADGES
        .iter()
        .take_while(|(threshold, _)| points >= *threshold)
        .map(|(_, name)| *name)
        .collect()
}

pub struct PointsService {
    store: Store,
}

impl PointsService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Rewards never roll back the action that earned them; a failed
    /// increment is logged and dropped.
    pub async fn award(&self, user_id: Uuid, delta: i64, reason: &str) {
        match self.store.users.increment_points(user_id, delta).await {
            Ok(()) => tracing::debug!("Awarded {} points to {} ({})", delta, user_id, reason),
            Err(e) => tracing::error!(
                "Failed to award {} points to {} ({}): {}",
                delta,
                user_id,
                reason,
                e
            ),
        }
    }
}
