use actix_web::dev::RequestHead;
use ipnetwork::IpNetwork;
use serde::Deserialize;

use crate::{IpRangeSource, RangeSnapshot};

/// A fixed set of IP ranges.
///
/// Useful for private load balancer ranges that never change, and as a stand-in for a remote
/// source in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIpRanges {
    ranges: RangeSnapshot,
}

/// Configuration for [`StaticIpRanges`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticIpRangesConfig {
    /// CIDR ranges, e.g. `"10.0.0.0/8"`.
    #[serde(default)]
    pub ranges: Vec<IpNetwork>,
}

impl StaticIpRanges {
    /// Constructs a static source from a list of ranges.
    pub fn new(ranges: impl IntoIterator<Item = IpNetwork>) -> Self {
        Self {
            ranges: ranges.into_iter().collect(),
        }
    }

    /// Adds a range.
    pub fn with_ip_range(self, range: IpNetwork) -> Self {
        Self::new(self.ranges.iter().copied().chain([range]))
    }
}

impl From<StaticIpRangesConfig> for StaticIpRanges {
    fn from(config: StaticIpRangesConfig) -> Self {
        Self::new(config.ranges)
    }
}

impl IpRangeSource for StaticIpRanges {
    fn ip_ranges(&self, _head: &RequestHead) -> RangeSnapshot {
        self.ranges.clone()
    }
}
