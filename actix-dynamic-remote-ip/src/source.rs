use std::{fmt, net::IpAddr, ops::Deref, sync::Arc};

use actix_web::dev::RequestHead;
use ipnetwork::IpNetwork;
use tokio_util::sync::CancellationToken;

/// A source of trusted IP ranges.
///
/// Implementations must answer from memory: [`ip_ranges`](Self::ip_ranges) is called on the request
/// path, concurrently from every worker, and must never wait on network I/O. Any fetching belongs
/// in a background task owned by the source.
///
/// # Examples
/// ```
/// use actix_dynamic_remote_ip::{IpRangeSource, RangeSnapshot};
/// use actix_web::dev::RequestHead;
///
/// /// Trusts the local loopback ranges only.
/// #[derive(Debug)]
/// struct Loopback;
///
/// impl IpRangeSource for Loopback {
///     fn ip_ranges(&self, _head: &RequestHead) -> RangeSnapshot {
///         RangeSnapshot::from(vec!["127.0.0.0/8".parse().unwrap(), "::1/128".parse().unwrap()])
///     }
/// }
/// ```
pub trait IpRangeSource: fmt::Debug + Send + Sync {
    /// Returns the current set of ranges.
    ///
    /// The result may be stale but is always a complete set from one refresh. An empty snapshot
    /// means no ranges are known yet.
    fn ip_ranges(&self, head: &RequestHead) -> RangeSnapshot;
}

impl<S: IpRangeSource + ?Sized> IpRangeSource for Arc<S> {
    fn ip_ranges(&self, head: &RequestHead) -> RangeSnapshot {
        (**self).ip_ranges(head)
    }
}

/// An immutable, cheaply cloned set of CIDR ranges.
///
/// Derefs to a slice of [`IpNetwork`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSnapshot(Arc<Vec<IpNetwork>>);

impl RangeSnapshot {
    /// Constructs an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if any range contains `ip`.
    ///
    /// Ranges never contain addresses of the other family.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.iter().any(|range| range.contains(ip))
    }
}

impl Deref for RangeSnapshot {
    type Target = [IpNetwork];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<IpNetwork>> for RangeSnapshot {
    fn from(ranges: Vec<IpNetwork>) -> Self {
        Self(Arc::new(ranges))
    }
}

impl From<Arc<Vec<IpNetwork>>> for RangeSnapshot {
    fn from(ranges: Arc<Vec<IpNetwork>>) -> Self {
        Self(ranges)
    }
}

impl FromIterator<IpNetwork> for RangeSnapshot {
    fn from_iter<I: IntoIterator<Item = IpNetwork>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

/// Dependencies handed to a range source when it is provisioned.
#[derive(Debug, Clone, Default)]
pub struct SourceContext {
    shutdown: CancellationToken,
}

impl SourceContext {
    /// Constructs a context whose sources stop their background work when `shutdown` is cancelled.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }

    /// Returns the host's shutdown signal.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}
