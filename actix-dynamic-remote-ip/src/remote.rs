use std::{sync::Arc, time::Duration};

use actix_web::{dev::RequestHead, rt::task::JoinHandle};
use arc_swap::ArcSwap;
use awc::error::SendRequestError;
use ipnetwork::IpNetwork;
use tokio::{
    sync::Mutex,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, debug, error, info, info_span, warn};

use crate::{
    FetchError, IpRangeSource, RangeSnapshot, RefreshConfig, SourceContext, parse_prefix_list,
};

/// Largest range list body that will be read from an endpoint.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// IP ranges fetched from remote line-delimited CIDR lists and refreshed in the background.
///
/// Provisioning performs one fetch before returning and then spawns a refresh task on the current
/// Actix runtime. A refresh installs new ranges only if every endpoint was fetched and parsed
/// successfully; otherwise the previous ranges are kept.
///
/// The refresh task stops when the [`SourceContext`]'s shutdown token is cancelled or when this
/// value is dropped.
///
/// # Examples
/// ```no_run
/// use std::sync::Arc;
///
/// use actix_dynamic_remote_ip::{DynamicRemoteIp, RefreshConfig, RemoteIpRanges, SourceContext};
/// use actix_web::{web, App, HttpResponse, HttpServer};
///
/// # async fn run() -> std::io::Result<()> {
/// let ctx = SourceContext::default();
/// let cloudflare = RemoteIpRanges::cloudflare(RefreshConfig::default(), &ctx).await;
/// let guard = DynamicRemoteIp::new(Arc::new(cloudflare));
///
/// HttpServer::new(move || {
///     App::new().route(
///         "/",
///         web::get()
///             .guard(guard.clone())
///             .to(|| async { HttpResponse::Ok().finish() }),
///     )
/// })
/// .bind(("127.0.0.1", 8080))?
/// .run()
/// .await
/// # }
/// ```
#[derive(Debug)]
pub struct RemoteIpRanges {
    inner: Arc<Inner>,
    interval: Duration,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner {
    name: String,
    endpoints: Vec<String>,
    timeout: Duration,
    ranges: ArcSwap<Vec<IpNetwork>>,

    /// Held for a whole fetch cycle; only its holder stores to `ranges`.
    writer: Mutex<()>,
}

impl RemoteIpRanges {
    /// Fetches ranges from `endpoints` and starts refreshing them in the background.
    ///
    /// An initial fetch failure is logged and leaves the ranges empty; it does not fail
    /// provisioning.
    ///
    /// # Panics
    ///
    /// Panics if called outside of an Actix (or Tokio `LocalSet`) runtime.
    pub async fn provision<I, S>(
        name: impl Into<String>,
        endpoints: I,
        config: RefreshConfig,
        ctx: &SourceContext,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inner = Arc::new(Inner {
            name: name.into(),
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            timeout: config.effective_timeout(),
            ranges: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        });

        let span = info_span!("ip_range_source", source = %inner.name);
        let client = awc::Client::default();

        async {
            info!("fetching initial IP ranges");

            match inner.refresh(&client).await {
                Ok(count) => info!(count, "IP ranges loaded"),
                Err(err) => error!(%err, "failed to fetch initial IP ranges"),
            }
        }
        .instrument(span.clone())
        .await;

        let interval = config.effective_interval();
        let shutdown = ctx.shutdown().child_token();

        let task = actix_web::rt::spawn(
            refresh_loop(client, Arc::clone(&inner), interval, shutdown.clone()).instrument(span),
        );

        Self {
            inner,
            interval,
            shutdown,
            task,
        }
    }

    /// Runs one fetch cycle now, installing the result if it succeeds.
    ///
    /// Waits for an in-progress cycle, manual or background, to finish first; cycles never overlap,
    /// so installs land in the order the cycles started. Returns the number of ranges installed.
    /// On error, the current ranges are left unchanged.
    pub async fn refresh(&self) -> Result<usize, FetchError> {
        self.inner.refresh(&awc::Client::default()).await
    }

    /// Returns the most recently installed ranges.
    pub fn snapshot(&self) -> RangeSnapshot {
        RangeSnapshot::from(self.inner.ranges.load_full())
    }

    /// Returns the name this source logs under.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the endpoint URLs fetched on each cycle.
    pub fn endpoints(&self) -> &[String] {
        &self.inner.endpoints
    }

    /// Returns the effective refresh interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the effective per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Returns true while the background refresh task is running.
    pub fn is_refreshing(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the background refresh task.
    ///
    /// The task exits at its next wake-up; an in-flight fetch is not interrupted. The current
    /// ranges remain available.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl IpRangeSource for RemoteIpRanges {
    fn ip_ranges(&self, _head: &RequestHead) -> RangeSnapshot {
        self.snapshot()
    }
}

impl Drop for RemoteIpRanges {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Inner {
    async fn refresh(&self, client: &awc::Client) -> Result<usize, FetchError> {
        let _writer = self.writer.lock().await;

        let ranges = fetch_ranges(client, &self.endpoints, self.timeout).await?;
        let count = ranges.len();

        self.ranges.store(Arc::new(ranges));

        Ok(count)
    }
}

async fn refresh_loop(
    client: awc::Client,
    inner: Arc<Inner>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("stopping IP range refresh");
                return;
            }

            _ = ticker.tick() => {}
        }

        match inner.refresh(&client).await {
            Ok(count) => debug!(count, "IP ranges refreshed"),
            Err(err) => warn!(%err, "could not refresh IP ranges"),
        }
    }
}

/// Fetches every endpoint in turn, failing on the first error.
async fn fetch_ranges(
    client: &awc::Client,
    endpoints: &[String],
    timeout: Duration,
) -> Result<Vec<IpNetwork>, FetchError> {
    let mut ranges = Vec::new();

    for url in endpoints {
        ranges.extend(fetch_endpoint(client, url, timeout).await?);
    }

    Ok(ranges)
}

async fn fetch_endpoint(
    client: &awc::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<IpNetwork>, FetchError> {
    let timed_out = || FetchError::Timeout {
        url: url.to_owned(),
        timeout,
    };

    let fetch = async {
        debug!(url, "fetching IP ranges");

        let mut res = client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| match err {
                SendRequestError::Timeout => timed_out(),
                err => FetchError::Transport {
                    url: url.to_owned(),
                    reason: err.to_string(),
                },
            })?;

        if !res.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: res.status(),
            });
        }

        let body = res
            .body()
            .limit(MAX_BODY_SIZE)
            .await
            .map_err(|err| FetchError::Body {
                url: url.to_owned(),
                reason: err.to_string(),
            })?;

        let body = std::str::from_utf8(&body).map_err(|err| FetchError::Body {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;

        parse_prefix_list(body).map_err(|source| FetchError::Malformed {
            url: url.to_owned(),
            source,
        })
    };

    // awc's timeout does not cover reading the body
    time::timeout(timeout, fetch)
        .await
        .unwrap_or_else(|_| Err(timed_out()))
}
