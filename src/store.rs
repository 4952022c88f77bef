//! Latest normalized points, refreshed in the background.

use crate::feeds::{FeedClient, FeedTarget, FetchReport};
use crate::models::PointSet;
use crate::normalize::StaticPoint;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub points: Arc<PointSet>,
    pub report: Option<FetchReport>,
}

pub struct PointStore {
    client: FeedClient,
    targets: Vec<FeedTarget>,
    static_points: Vec<StaticPoint>,
    snapshot: RwLock<Snapshot>,
}

impl PointStore {
    pub fn new(client: FeedClient, targets: Vec<FeedTarget>, static_points: Vec<StaticPoint>) -> Self {
        Self {
            client,
            targets,
            static_points,
            snapshot: RwLock::new(Snapshot {
                points: Arc::new(PointSet::default()),
                report: None,
            }),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// Reloads every feed. Returns whether the refresh counts as healthy,
    /// i.e. some remote feed answered (or none is configured).
    pub async fn refresh(&self) -> bool {
        let (points, report) = self.client.load_all(&self.targets, &self.static_points).await;
        let healthy = self.targets.is_empty() || report.any_ok();

        let mut snapshot = self.snapshot.write().await;
        if points.is_empty() && !snapshot.points.is_empty() {
            warn!(
                "refresh produced no points, keeping previous {} points",
                snapshot.points.len()
            );
        } else {
            snapshot.points = Arc::new(points);
        }
        snapshot.report = Some(report);
        healthy
    }

    /// Refreshes forever: `interval` after a healthy refresh, `retry` after
    /// one where every remote feed failed.
    pub fn spawn_revalidation(self: Arc<Self>, interval: Duration, retry: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let healthy = self.refresh().await;
                let wait = if healthy { interval } else { retry };
                info!("next revalidation in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
        })
    }
}
