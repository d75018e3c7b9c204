//! Upstream feed retrieval
//!
//! `FeedSource` is the seam between the engine and the network. Every request
//! is bounded by the configured timeout and surfaces `MonitorError::Timeout`
//! when the bound is hit, so a hung upstream can only cost one feed per cycle.

use super::config::FeedUrls;
use super::parser::{FeedSchema, MAGNETOMETER, NOWCAST, PLANETARY_KP, SWEPAM};
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Every upstream product the monitor consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Swepam,
    Magnetometer,
    Nowcast,
    PlanetaryKp,
    KpForecast,
    CmeEvents,
}

impl Feed {
    /// Feeds merged into the per-minute timeline, governing feed first.
    pub const TELEMETRY: [Feed; 4] = [
        Feed::Swepam,
        Feed::Magnetometer,
        Feed::Nowcast,
        Feed::PlanetaryKp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feed::Swepam => SWEPAM.name,
            Feed::Magnetometer => MAGNETOMETER.name,
            Feed::Nowcast => NOWCAST.name,
            Feed::PlanetaryKp => PLANETARY_KP.name,
            Feed::KpForecast => "3-day-forecast",
            Feed::CmeEvents => "cme-events",
        }
    }

    /// Row schema for telemetry feeds; `None` for documents with their own parser.
    pub fn schema(&self) -> Option<&'static FeedSchema> {
        match self {
            Feed::Swepam => Some(&SWEPAM),
            Feed::Magnetometer => Some(&MAGNETOMETER),
            Feed::Nowcast => Some(&NOWCAST),
            Feed::PlanetaryKp => Some(&PLANETARY_KP),
            Feed::KpForecast | Feed::CmeEvents => None,
        }
    }

    pub fn url<'a>(&self, urls: &'a FeedUrls) -> &'a str {
        match self {
            Feed::Swepam => &urls.swepam,
            Feed::Magnetometer => &urls.magnetometer,
            Feed::Nowcast => &urls.nowcast,
            Feed::PlanetaryKp => &urls.planetary_kp,
            Feed::KpForecast => &urls.kp_forecast,
            Feed::CmeEvents => &urls.cme_events,
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source of raw feed payloads
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the raw body of one feed.
    async fn fetch(&self, feed: Feed) -> Result<String>;
}

/// HTTP implementation backed by a shared `reqwest::Client`
pub struct HttpFeedSource {
    client: reqwest::Client,
    urls: FeedUrls,
    timeout_secs: u64,
}

impl HttpFeedSource {
    pub fn new(urls: FeedUrls, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("auroraflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MonitorError::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            urls,
            timeout_secs,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, feed: Feed) -> Result<String> {
        let url = feed.url(&self.urls);
        let started = std::time::Instant::now();

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                MonitorError::Timeout {
                    feed: feed.name().to_string(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                MonitorError::Fetch {
                    feed: feed.name().to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(map_err)?;

        if !response.status().is_success() {
            return Err(MonitorError::Fetch {
                feed: feed.name().to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body = response.text().await.map_err(map_err)?;
        log::debug!(
            "📥 {} fetched: {} bytes in {}ms",
            feed,
            body.len(),
            started.elapsed().as_millis()
        );
        Ok(body)
    }
}
