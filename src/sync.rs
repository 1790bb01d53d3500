use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use ::time::format_description::well_known::Rfc3339;
use ::time::OffsetDateTime;
use anyhow::{anyhow, Context, Result};
use icalendar::Calendar;
use reqwest::Client;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{Config, Feed};
use crate::split;
use crate::storage::Storage;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(300);

/// The two failure kinds a sync run distinguishes. Anything else (store or
/// parse failures mid-run) is wrapped as [`SyncError::Internal`] and, like
/// these, only aborts the current run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("could not load the feed list: {0:#}")]
    FeedList(anyhow::Error),

    #[error("could not fetch the feed `{name}`: {error:#}")]
    Fetch { name: String, error: anyhow::Error },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Drives the fetch → split → persist pipeline on a fixed interval.
///
/// Runs are strictly sequential: the loop never starts a run while a
/// previous one is in flight, so overlapping writers to the same feed's keys
/// cannot come from this process.
pub struct Syncer {
    cfg: Arc<Config>,
    storage: Arc<Storage>,
}

impl Syncer {
    pub fn new(cfg: Arc<Config>, storage: Arc<Storage>) -> Self {
        Self { cfg, storage }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        async move {
            let http_client = Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .read_timeout(READ_TIMEOUT)
                .timeout(TOTAL_TIMEOUT)
                .build()
                .context("could not create an HTTP client")?;

            let sync_interval: Duration = self.cfg.sync_interval.into();
            let mut next_sync = pin!(time::sleep(Duration::ZERO));

            loop {
                select! {
                    _ = cancel.cancelled() => {
                        debug!("Received a cancellation signal; exiting");
                        break;
                    }

                    _ = &mut next_sync => {}
                }

                if let Err(e) = self.sync_once(&http_client).await {
                    error!("Sync run failed: {:#}", anyhow::Error::from(e));
                }

                debug!("Scheduling the next sync in {}s", sync_interval.as_secs());
                next_sync.as_mut().reset(Instant::now() + sync_interval);
            }

            Ok(())
        }
        .instrument(info_span!("syncer"))
        .await
    }

    async fn sync_once(&self, http_client: &Client) -> Result<(), SyncError> {
        let feeds = crate::config::load_feeds(&self.cfg.feeds_path).map_err(SyncError::FeedList)?;
        info!("Starting a sync run over {} feeds", feeds.len());

        self.mark_update_start().await?;

        let fetched = self.fetch_all(http_client, &feeds).await?;

        for (feed, body) in fetched {
            let span = info_span!("sync_feed", feed_name = %feed.name);

            async {
                let calendar: Calendar = body.parse().map_err(|e| {
                    anyhow!(
                        "could not parse the calendar of the feed `{}`: {e}",
                        feed.name
                    )
                })?;

                let groups = split::split(&calendar);
                let group_count = groups.len();

                let mut tx = self.storage.begin().await?;
                tx.persist_feed(&feed.name, &groups).await?;
                tx.commit().await?;

                info!("Stored {group_count} sub-calendars");

                Ok::<_, SyncError>(())
            }
            .instrument(span)
            .await?;
        }

        self.mark_update_end().await?;
        info!("Sync run finished");

        Ok(())
    }

    /// Downloads every feed concurrently, one task per URL.
    ///
    /// With `fail_fast` (the default), the first failure aborts the
    /// remaining downloads and the whole run, so nothing is persisted. When
    /// it is off, failed feeds are skipped and the rest of the run proceeds.
    async fn fetch_all(
        &self,
        http_client: &Client,
        feeds: &[Feed],
    ) -> Result<Vec<(Feed, String)>, SyncError> {
        let mut tasks = JoinSet::new();

        for feed in feeds {
            let feed = feed.clone();
            let http_client = http_client.clone();

            tasks.spawn(async move {
                let body = fetch_one(&http_client, &feed).await;
                (feed, body)
            });
        }

        let mut fetched = Vec::with_capacity(feeds.len());

        while let Some(joined) = tasks.join_next().await {
            let (feed, body) = joined.context("a fetch task panicked")?;

            match body {
                Ok(body) => fetched.push((feed, body)),

                Err(error) if self.cfg.fail_fast => {
                    tasks.abort_all();

                    return Err(SyncError::Fetch {
                        name: feed.name,
                        error,
                    });
                }

                Err(e) => {
                    warn!("Skipping the feed `{}`: {e:#}", feed.name);
                }
            }
        }

        // Joining drains tasks in completion order; persist in list order.
        fetched.sort_by_key(|(feed, _)| {
            feeds
                .iter()
                .position(|f| f.name == feed.name)
                .unwrap_or(usize::MAX)
        });

        Ok(fetched)
    }

    async fn mark_update_start(&self) -> Result<()> {
        let mut tx = self.storage.begin().await?;
        tx.set_update_start(&now_timestamp()?).await?;
        tx.commit().await
    }

    async fn mark_update_end(&self) -> Result<()> {
        let mut tx = self.storage.begin().await?;
        tx.set_update_end(&now_timestamp()?).await?;
        tx.commit().await
    }
}

async fn fetch_one(http_client: &Client, feed: &Feed) -> Result<String> {
    let response = http_client
        .get(feed.url.clone())
        .send()
        .await
        .map_err(Into::into)
        .and_then(|r| r.error_for_status().context("server returned an error"))
        .with_context(|| anyhow!("could not fetch `{}`", feed.url))?;

    response
        .text()
        .await
        .with_context(|| anyhow!("could not read the response when fetching `{}`", feed.url))
}

fn now_timestamp() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("could not format the current time")
}
