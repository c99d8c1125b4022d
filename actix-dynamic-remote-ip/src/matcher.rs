//! Route guard matching peer addresses against a range source.

use std::sync::Arc;

use actix_web::{
    HttpRequest,
    dev::RequestHead,
    guard::{Guard, GuardContext},
};

use crate::{
    ConfigError, DynamicRemoteIpConfig, IpRangeSource, SourceContext, SourceRegistry,
    parse_peer_address,
};

/// A guard that matches when the connection's peer address is within the ranges of an
/// [`IpRangeSource`].
///
/// Fails closed: a missing or unparsable peer address, an unconfigured source, or a source that
/// has no ranges yet all result in no match.
///
/// # Examples
/// ```
/// use std::sync::Arc;
///
/// use actix_dynamic_remote_ip::{DynamicRemoteIp, StaticIpRanges};
/// use actix_web::{web, HttpResponse};
///
/// let trusted = StaticIpRanges::new(["10.0.0.0/8".parse().unwrap()]);
/// let guard = DynamicRemoteIp::new(Arc::new(trusted));
///
/// web::resource("/internal")
///     .guard(guard)
///     .to(|| async { HttpResponse::Ok().body("only reachable from 10.0.0.0/8") });
/// ```
#[derive(Debug, Clone, Default)]
pub struct DynamicRemoteIp {
    source: Option<Arc<dyn IpRangeSource>>,
}

impl DynamicRemoteIp {
    /// Constructs a guard backed by `source`.
    pub fn new(source: Arc<dyn IpRangeSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Constructs and provisions a guard from configuration.
    ///
    /// A configuration without a source is rejected, since such a guard would never match.
    pub async fn from_config(
        config: &DynamicRemoteIpConfig,
        registry: &SourceRegistry,
        ctx: &SourceContext,
    ) -> Result<Self, ConfigError> {
        let source_config = config
            .providers
            .as_ref()
            .ok_or(ConfigError::MissingSource)?;

        let source = registry.load(source_config, ctx).await?;

        Ok(Self::new(source))
    }

    /// Returns the configured range source, if any.
    pub fn source(&self) -> Option<&Arc<dyn IpRangeSource>> {
        self.source.as_ref()
    }

    /// Returns true if the request's peer address is within the source's ranges.
    ///
    /// Uses [`ConnectionInfo::peer_addr`](actix_web::dev::ConnectionInfo::peer_addr).
    pub fn matches(&self, req: &HttpRequest) -> bool {
        let conn_info = req.connection_info();

        match conn_info.peer_addr() {
            Some(peer_addr) => self.matches_head(req.head(), peer_addr),
            None => {
                tracing::error!("getting remote IP: request has no peer address");
                false
            }
        }
    }

    /// Returns true if `peer_addr` is within the source's ranges.
    ///
    /// `peer_addr` may include a port and an IPv6 zone, e.g. `[fe80::1%eth0]:443`.
    pub fn matches_peer_addr(&self, peer_addr: &str) -> bool {
        self.matches_head(&RequestHead::default(), peer_addr)
    }

    fn matches_head(&self, head: &RequestHead, peer_addr: &str) -> bool {
        let remote_ip = match parse_peer_address(peer_addr) {
            Ok(ip) => ip,
            Err(err) => {
                tracing::error!(%err, "getting remote IP");
                return false;
            }
        };

        let Some(source) = &self.source else {
            return false;
        };

        source.ip_ranges(head).contains(remote_ip)
    }
}

impl Guard for DynamicRemoteIp {
    fn check(&self, ctx: &GuardContext<'_>) -> bool {
        let head = ctx.head();

        match head.peer_addr {
            // scoped IPv6 socket addresses display their zone, which the parser discards
            Some(peer_addr) => self.matches_head(head, &peer_addr.to_string()),
            None => {
                tracing::error!("getting remote IP: request has no peer address");
                false
            }
        }
    }
}
