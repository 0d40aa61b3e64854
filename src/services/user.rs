use crate::{error::AppResult, store::Store, store::UserRecord};

pub const DEFAULT_LEADERBOARD_SIZE: u64 = 10;
pub const MAX_LEADERBOARD_SIZE: u64 = 100;

pub struct UserService {
    store: Store,
}

impl UserService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Highest points first; `limit` is clamped to [1, 100].
    pub async fn leaderboard(&self, limit: Option<u64>) -> AppResult<Vec<UserRecord>> {
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_SIZE)
            .clamp(1, MAX_LEADERBOARD_SIZE);
        Ok(self.store.users.top_users(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewUser;

    #[tokio::test]
    async fn leaderboard_orders_by_points() {
        let store = Store::memory();
        for (name, points) in [("low", 5), ("high", 50), ("mid", 20)] {
            let user = store
                .users
                .create_user(NewUser {
                    username: name.to_string(),
                    email: format!("{name}@example.com"),
                    password_hash: "hash".to_string(),
                })
                .await
                .unwrap();
            store.users.increment_points(user.id, points).await.unwrap();
        }

        let service = UserService::new(store);
        let names: Vec<_> = service
            .leaderboard(None)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, ["high", "mid", "low"]);

        assert_eq!(service.leaderboard(Some(0)).await.unwrap().len(), 1);
    }
}
