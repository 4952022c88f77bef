use crate::config::{Config, ContentApiConfig, FetchConfig};
use crate::models::{Point, PointSet};
use crate::normalize::{self, FeedSchema, StaticPoint};
use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    BankdataCaves,
    IssCaves,
    AstacalaCaves,
    KlapanunggalCaves,
    AstacalaClimbing,
}

impl FeedKind {
    pub const ALL: [FeedKind; 5] = [
        FeedKind::BankdataCaves,
        FeedKind::IssCaves,
        FeedKind::AstacalaCaves,
        FeedKind::KlapanunggalCaves,
        FeedKind::AstacalaClimbing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeedKind::BankdataCaves => "bankdata_caves",
            FeedKind::IssCaves => "iss_caves",
            FeedKind::AstacalaCaves => "astacala_caves",
            FeedKind::KlapanunggalCaves => "klapanunggal_caves",
            FeedKind::AstacalaClimbing => "astacala_climbing",
        }
    }

    pub fn schema(self) -> &'static FeedSchema {
        match self {
            FeedKind::BankdataCaves => &normalize::BANKDATA_CAVES,
            FeedKind::IssCaves => &normalize::ISS_CAVES,
            FeedKind::AstacalaCaves => &normalize::ASTACALA_CAVES,
            FeedKind::KlapanunggalCaves => &normalize::KLAPANUNGGAL_CAVES,
            FeedKind::AstacalaClimbing => &normalize::ASTACALA_CLIMBING,
        }
    }

    pub fn default_url(self, api: &ContentApiConfig) -> String {
        let cms = api.cms_url.trim_end_matches('/');
        match self {
            FeedKind::BankdataCaves => format!("{}/caves/geojson", api.bankdata_url.trim_end_matches('/')),
            FeedKind::IssCaves => format!("{}/items/caving_data_iss?limit=-1", cms),
            FeedKind::AstacalaCaves => format!("{}/items/caving_astacala?limit=-1", cms),
            FeedKind::KlapanunggalCaves => format!("{}/items/caving_klapanunggal?limit=-1", cms),
            FeedKind::AstacalaClimbing => format!("{}/items/rc_astacala?limit=-1", cms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `backoff * 2^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(c: &FetchConfig) -> Self {
        Self {
            attempts: c.attempts.max(1),
            timeout: Duration::from_secs(c.timeout_secs),
            backoff: Duration::from_millis(c.backoff_ms),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct FeedStatus {
    pub feed: String,
    pub url: Option<String>,
    pub ok: bool,
    pub points: usize,
    pub error: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct FetchReport {
    pub fetched_at: DateTime<Utc>,
    pub feeds: Vec<FeedStatus>,
}

impl FetchReport {
    pub fn any_ok(&self) -> bool {
        self.feeds.iter().any(|f| f.ok && f.url.is_some())
    }

    pub fn total_points(&self) -> usize {
        self.feeds.iter().map(|f| f.points).sum()
    }
}

/// A feed to load: its kind and the resolved URL.
#[derive(Debug, Clone)]
pub struct FeedTarget {
    pub kind: FeedKind,
    pub url: String,
}

impl FeedTarget {
    pub fn from_config(config: &Config) -> Vec<FeedTarget> {
        config
            .feeds
            .iter()
            .filter(|f| f.enabled)
            .map(|f| FeedTarget {
                kind: f.kind,
                url: config.feed_url(f),
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct FeedClient {
    http: Client,
    retry: RetryPolicy,
}

impl FeedClient {
    pub fn new(http: Client, retry: RetryPolicy) -> Self {
        Self { http, retry }
    }

    /// GETs `url` as JSON, retrying with exponential backoff.
    pub async fn fetch_json(&self, url: &str) -> Result<Value> {
        let mut last_error = None;
        for attempt in 0..self.retry.attempts {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!("attempt {} for {} failed: {}", attempt + 1, url, e);
                    last_error = Some(e);
                    if attempt + 1 < self.retry.attempts {
                        tokio::time::sleep(self.retry.delay(attempt)).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no attempt made for {}", url)))
    }

    async fn fetch_once(&self, url: &str) -> Result<Value> {
        let resp = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .timeout(self.retry.timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP error status {}", status);
        }
        Ok(resp.json().await?)
    }

    pub async fn load_feed(&self, target: &FeedTarget) -> Result<Vec<Point>> {
        let body = self.fetch_json(&target.url).await?;
        let points = normalize::normalize_feed(&body, target.kind.schema());
        debug!("{}: {} points from {}", target.kind.name(), points.len(), target.url);
        Ok(points)
    }

    /// Loads every feed. A failing feed is reported and contributes nothing;
    /// the others still load.
    pub async fn load_all(&self, targets: &[FeedTarget], static_points: &[StaticPoint]) -> (PointSet, FetchReport) {
        let mut set = PointSet::default();
        let mut statuses = Vec::with_capacity(targets.len() + 1);

        if !static_points.is_empty() {
            let points = normalize::normalize_static(static_points);
            statuses.push(FeedStatus {
                feed: "static".to_string(),
                url: None,
                ok: true,
                points: points.len(),
                error: None,
            });
            set.extend(points);
        }

        for target in targets {
            match self.load_feed(target).await {
                Ok(points) => {
                    statuses.push(FeedStatus {
                        feed: target.kind.name().to_string(),
                        url: Some(target.url.clone()),
                        ok: true,
                        points: points.len(),
                        error: None,
                    });
                    set.extend(points);
                }
                Err(e) => {
                    warn!("feed {} unavailable: {}", target.kind.name(), e);
                    statuses.push(FeedStatus {
                        feed: target.kind.name().to_string(),
                        url: Some(target.url.clone()),
                        ok: false,
                        points: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let report = FetchReport {
            fetched_at: Utc::now(),
            feeds: statuses,
        };
        for status in &report.feeds {
            info!("feed {}: ok={} points={}", status.feed, status.ok, status.points);
        }
        info!("loaded {} points in total", set.len());
        (set, report)
    }
}
