use crate::{RefreshConfig, RemoteIpRanges, SourceContext};

/// URL of Cloudflare's published list of IPv4 ranges.
pub const CF_URL_IPS_V4: &str = "https://www.cloudflare.com/ips-v4";

/// URL of Cloudflare's published list of IPv6 ranges.
pub const CF_URL_IPS_V6: &str = "https://www.cloudflare.com/ips-v6";

impl RemoteIpRanges {
    /// Fetches Cloudflare's edge IP ranges and starts refreshing them in the background.
    ///
    /// Both the IPv4 and IPv6 lists must be fetched for a refresh to take effect, so the source
    /// never ends up knowing only one address family.
    pub async fn cloudflare(config: RefreshConfig, ctx: &SourceContext) -> Self {
        Self::provision("cloudflare", [CF_URL_IPS_V4, CF_URL_IPS_V6], config, ctx).await
    }
}
