use std::net::IpAddr;

use actix_utils::future::{Ready, err, ok};
use actix_web::{FromRequest, HttpRequest, dev, http::header::HeaderName};

use crate::DynamicRemoteIp;

/// Cloudflare's `cf-connecting-ip` header name.
#[allow(clippy::declare_interior_mutable_const)]
pub const CF_CONNECTING_IP: HeaderName = HeaderName::from_static("cf-connecting-ip");

/// Cloudflare's `cf-connecting-ipv6` header name.
///
/// Sent alongside a pseudo-IPv4 `cf-connecting-ip` when Cloudflare's Pseudo IPv4 setting is on.
#[allow(clippy::declare_interior_mutable_const)]
pub const CF_CONNECTING_IPV6: HeaderName = HeaderName::from_static("cf-connecting-ipv6");

fn bad_req(err: impl Into<String>) -> actix_web::error::Error {
    actix_web::error::ErrorBadRequest(format!("TrustedClientIp error: {}", err.into()))
}

fn header_ip(req: &HttpRequest, name: HeaderName) -> Option<IpAddr> {
    req.headers()
        .get(name)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.trim().parse().ok())
}

/// Extractor for a client IP forwarded by a trusted proxy, such as Cloudflare's edge.
///
/// The `CF-Connecting-IP` header, falling back to `CF-Connecting-IPv6`, is only read when the
/// connection's peer address matches the [`DynamicRemoteIp`] guard in app data. Requests from any
/// other peer are rejected with `400 Bad Request`, since their header could be spoofed.
///
/// # Examples
/// ```no_run
/// use std::sync::Arc;
///
/// use actix_dynamic_remote_ip::{
///     DynamicRemoteIp, RefreshConfig, RemoteIpRanges, SourceContext, TrustedClientIp,
/// };
/// use actix_web::{get, App, HttpServer};
///
/// #[get("/")]
/// async fn index(client_ip: TrustedClientIp) -> String {
///     format!("Hello {client_ip}")
/// }
///
/// # async fn run() -> std::io::Result<()> {
/// let ctx = SourceContext::default();
/// let cloudflare = RemoteIpRanges::cloudflare(RefreshConfig::default(), &ctx).await;
/// let trusted_peers = DynamicRemoteIp::new(Arc::new(cloudflare));
///
/// HttpServer::new(move || App::new().app_data(trusted_peers.clone()).service(index))
///     .bind(("127.0.0.1", 8080))?
///     .run()
///     .await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TrustedClientIp(pub IpAddr);

impl_more::forward_display!(TrustedClientIp);

impl TrustedClientIp {
    /// Unwraps into inner IP address.
    pub fn into_inner(self) -> IpAddr {
        self.0
    }
}

impl FromRequest for TrustedClientIp {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut dev::Payload) -> Self::Future {
        let Some(trusted_peers) = req.app_data::<DynamicRemoteIp>() else {
            tracing::debug!(
                "Failed to extract `TrustedClientIp` for `{}` handler. For this extractor to work \
                correctly, pass a `DynamicRemoteIp` to `App::app_data()`.",
                req.match_name().unwrap_or_else(|| req.path())
            );

            return err(actix_web::error::ErrorInternalServerError(
                "Requested application data is not configured correctly. \
                View/enable debug logs for more details.",
            ));
        };

        if !trusted_peers.matches(req) {
            return err(bad_req("cf-connecting-ip read from untrusted peer"));
        }

        let client_ip = header_ip(req, CF_CONNECTING_IP)
            .or_else(|| header_ip(req, CF_CONNECTING_IPV6));

        match client_ip {
            Some(ip) => ok(Self(ip)),
            None => err(bad_req("cf-connecting-ip header not present or invalid")),
        }
    }
}
