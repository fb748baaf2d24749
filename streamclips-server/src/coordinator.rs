//! Claiming of streamers across the fleet

use crate::cutoff;
use crate::error::ServiceResult;
use chrono::Utc;
use std::time::Duration;
use streamclips_storage::entities::Streamer;
use streamclips_storage::sea_orm::ConnectionTrait;
use streamclips_storage::StreamerRepository;
use tracing::debug;

/// Selects eligible streamers and locks them for the calling instance.
///
/// Claimed rows stay locked until the caller's transaction ends, so the
/// caller creates the process records inside that same transaction.
/// Claiming alone sets no cooldown: a streamer whose spawn fails is
/// immediately claimable again.
#[derive(Debug, Clone)]
pub struct ClaimCoordinator {
    cooldown: Duration,
}

impl ClaimCoordinator {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn claim<C: ConnectionTrait>(&self, db: &C, hostname: &str, max_count: i64) -> ServiceResult<Vec<Streamer>> {
        if max_count <= 0 {
            return Ok(Vec::new());
        }

        let claimed = StreamerRepository::new(db)
            .lock_claimable(max_count as u64, cutoff(Utc::now(), self.cooldown))
            .await?;
        debug!("{} claimed {} of up to {} streamers", hostname, claimed.len(), max_count);
        Ok(claimed)
    }
}

impl Default for ClaimCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamclips_storage::testing::TestDatabase;
    use streamclips_storage::NewStreamer;

    #[tokio::test]
    async fn test_non_positive_max_count_is_empty() {
        let db = TestDatabase::new().await.unwrap();
        StreamerRepository::new(db.conn())
            .create(NewStreamer::new("alpha", "u"))
            .await
            .unwrap();
        let coordinator = ClaimCoordinator::default();

        assert!(coordinator.claim(db.conn(), "a", 0).await.unwrap().is_empty());
        assert!(coordinator.claim(db.conn(), "a", -3).await.unwrap().is_empty());
        assert_eq!(coordinator.claim(db.conn(), "a", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_excludes_recent() {
        let db = TestDatabase::new().await.unwrap();
        let streamers = StreamerRepository::new(db.conn());
        let recent = streamers.create(NewStreamer::new("recent", "u")).await.unwrap();
        streamers
            .stamp_processed(&[recent.id], Utc::now() - chrono::Duration::seconds(30))
            .await
            .unwrap();

        let coordinator = ClaimCoordinator::new(Duration::from_secs(60));
        assert!(coordinator.claim(db.conn(), "a", 5).await.unwrap().is_empty());

        let relaxed = ClaimCoordinator::new(Duration::from_secs(10));
        assert_eq!(relaxed.claim(db.conn(), "a", 5).await.unwrap().len(), 1);
    }
}
