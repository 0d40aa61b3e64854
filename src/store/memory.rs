use super::{
    paginate_in_memory, NewReport, NewUser, ReportChanges, ReportFilter, ReportQuery,
    ReportRecord, ReportStore, StoreError, StoreHealth, StoreResult, UpvoteRecord, UpvoteStore,
    UpvoteToggle, UserLookup, UserRecord, UserStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    reports: HashMap<Uuid, ReportRecord>,
    upvotes: HashMap<(Uuid, Uuid), UpvoteRecord>,
}

/// Process-local store. Every mutation holds the write lock for its whole
/// duration, which gives the same atomicity the database adapters get from
/// transactions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user(&self, lookup: UserLookup<'_>) -> StoreResult<Option<UserRecord>> {
        let inner = self.inner.read().await;
        let found = inner.users.values().find(|u| match lookup {
            UserLookup::Email(email) => u.email == email,
            UserLookup::Username(username) => u.username == username,
        });
        Ok(found.cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::duplicate("email"));
        }
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::duplicate("username"));
        }
        let record = user.into_record(Utc::now());
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn increment_points(&self, id: Uuid, delta: i64) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.points = (user.points + delta).max(0);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn top_users(&self, limit: u64) -> StoreResult<Vec<UserRecord>> {
        let inner = self.inner.read().await;
        let mut users: Vec<UserRecord> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.username.cmp(&b.username)));
        users.truncate(limit as usize);
        Ok(users)
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn find_report_by_id(&self, id: Uuid) -> StoreResult<Option<ReportRecord>> {
        Ok(self.inner.read().await.reports.get(&id).cloned())
    }

    async fn find_reports(&self, query: &ReportQuery) -> StoreResult<(Vec<ReportRecord>, u64)> {
        let inner = self.inner.read().await;
        let matching: Vec<ReportRecord> = inner
            .reports
            .values()
            .filter(|r| query.filter.matches(r))
            .cloned()
            .collect();
        Ok(paginate_in_memory(matching, query))
    }

    async fn count_reports(&self, filter: &ReportFilter) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.reports.values().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn create_report(&self, report: NewReport) -> StoreResult<ReportRecord> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&report.author_id) {
            return Err(StoreError::NotFound);
        }
        let record = report.into_record(Utc::now());
        inner.reports.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_report(&self, id: Uuid, changes: ReportChanges) -> StoreResult<ReportRecord> {
        let mut inner = self.inner.write().await;
        let report = inner.reports.get_mut(&id).ok_or(StoreError::NotFound)?;
        changes.apply(report, Utc::now());
        Ok(report.clone())
    }

    async fn delete_report(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.reports.remove(&id).ok_or(StoreError::NotFound)?;
        inner.upvotes.retain(|(_, report_id), _| *report_id != id);
        Ok(())
    }
}

#[async_trait]
impl UpvoteStore for MemoryStore {
    async fn find_upvote(
        &self,
        user_id: Uuid,
        report_id: Uuid,
    ) -> StoreResult<Option<UpvoteRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.upvotes.get(&(user_id, report_id)).cloned())
    }

    async fn count_upvotes(&self, report_id: Uuid) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .upvotes
            .keys()
            .filter(|(_, r)| *r == report_id)
            .count() as u64)
    }

    async fn toggle_upvote(&self, user_id: Uuid, report_id: Uuid) -> StoreResult<UpvoteToggle> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let report = inner
            .reports
            .get_mut(&report_id)
            .ok_or(StoreError::NotFound)?;

        let upvoted = match inner.upvotes.remove(&(user_id, report_id)) {
            Some(_) => {
                report.upvote_count -= 1;
                false
            }
            None => {
                inner.upvotes.insert(
                    (user_id, report_id),
                    UpvoteRecord {
                        id: Uuid::new_v4(),
                        user_id,
                        report_id,
                        created_at: Utc::now(),
                    },
                );
                report.upvote_count += 1;
                true
            }
        };

        Ok(UpvoteToggle {
            upvoted,
            report: report.clone(),
        })
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GeoPoint, Priority, ReportLocation, ReportStatus};

    async fn seed(store: &MemoryStore) -> (UserRecord, ReportRecord) {
        let user = store
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let report = store
            .create_report(NewReport {
                author_id: user.id,
                title: "Pothole on Main St".to_string(),
                description: "Deep hole near the bus stop".to_string(),
                category: "Road".to_string(),
                priority: Priority::High,
                location: ReportLocation::Point(GeoPoint {
                    longitude: 77.59,
                    latitude: 12.97,
                }),
                photo_url: None,
                is_anonymous: false,
            })
            .await
            .unwrap();
        (user, report)
    }

    #[tokio::test]
    async fn duplicate_email_and_username() {
        let store = MemoryStore::default();
        seed(&store).await;

        let err = store
            .create_user(NewUser {
                username: "bob".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field } if field == "email"));

        let err = store
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "other@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field } if field == "username"));
    }

    #[tokio::test]
    async fn toggle_twice_restores_count() {
        let store = MemoryStore::default();
        let (user, report) = seed(&store).await;

        let first = store.toggle_upvote(user.id, report.id).await.unwrap();
        assert!(first.upvoted);
        assert_eq!(first.report.upvote_count, 1);

        let second = store.toggle_upvote(user.id, report.id).await.unwrap();
        assert!(!second.upvoted);
        assert_eq!(second.report.upvote_count, 0);
        assert!(store.find_upvote(user.id, report.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn toggle_missing_report() {
        let store = MemoryStore::default();
        let (user, _) = seed(&store).await;
        let err = store.toggle_upvote(user.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_keep_counter_consistent() {
        let store = MemoryStore::default();
        let (_, report) = seed(&store).await;
        let voters: Vec<Uuid> = (0..20).map(|_| Uuid::new_v4()).collect();

        // Each voter toggles three times: net effect is one upvote each.
        let mut handles = Vec::new();
        for voter in voters.iter().copied() {
            for _ in 0..3 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.toggle_upvote(voter, report.id).await.unwrap()
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.find_report_by_id(report.id).await.unwrap().unwrap();
        let records = store.count_upvotes(report.id).await.unwrap();
        assert_eq!(stored.upvote_count as u64, records);
        assert_eq!(records, 20);
    }

    #[tokio::test]
    async fn update_never_touches_counter() {
        let store = MemoryStore::default();
        let (user, report) = seed(&store).await;
        store.toggle_upvote(user.id, report.id).await.unwrap();

        let updated = store
            .update_report(
                report.id,
                ReportChanges {
                    status: Some(ReportStatus::InProgress),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ReportStatus::InProgress);
        assert_eq!(updated.upvote_count, 1);
    }

    #[tokio::test]
    async fn delete_cascades_upvotes() {
        let store = MemoryStore::default();
        let (user, report) = seed(&store).await;
        store.toggle_upvote(user.id, report.id).await.unwrap();

        store.delete_report(report.id).await.unwrap();
        assert!(store.find_report_by_id(report.id).await.unwrap().is_none());
        assert_eq!(store.count_upvotes(report.id).await.unwrap(), 0);
        assert!(matches!(
            store.delete_report(report.id).await,
            Err(StoreError::NotFound)
        ));
    }
}
