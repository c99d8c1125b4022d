//! Route guard matching connection peer addresses against dynamically refreshed IP ranges.
//!
//! Typical use is to only trust forwarded-client-IP headers on traffic that really comes from a CDN
//! such as Cloudflare, whose published edge ranges change over time.
//!
//! - [`IpRangeSource`] is anything that can hand out its current ranges without blocking.
//! - [`RemoteIpRanges`] fetches line-delimited CIDR lists, refreshing them in the background and
//!   keeping the last good set when a refresh fails. [`RemoteIpRanges::cloudflare`] is preset with
//!   Cloudflare's lists.
//! - [`StaticIpRanges`] is a fixed list.
//! - [`DynamicRemoteIp`] is a [`Guard`](actix_web::guard::Guard) over any source.
//! - [`SourceRegistry`] builds sources from JSON configuration by name.
//! - [`TrustedClientIp`] extracts `CF-Connecting-IP` (or `CF-Connecting-IPv6`) only from trusted
//!   peers.
//!
//! # Crate Features
//!
//! `rustls` (default): Fetches range lists over HTTPS using `rustls`. If you prefer OpenSSL, disable
//! default crate features and enable `openssl` instead.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, nonstandard_style)]
#![warn(future_incompatible, missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod cloudflare;
mod config;
mod error;
mod extract;
mod matcher;
mod parse;
mod registry;
mod remote;
mod source;
mod static_source;

pub use self::{
    cloudflare::{CF_URL_IPS_V4, CF_URL_IPS_V6},
    config::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT, DynamicRemoteIpConfig, RefreshConfig},
    error::{ConfigError, FetchError},
    extract::{CF_CONNECTING_IP, CF_CONNECTING_IPV6, TrustedClientIp},
    matcher::DynamicRemoteIp,
    parse::{InvalidAddress, MalformedRange, parse_peer_address, parse_prefix_list},
    registry::{SourceRegistry, SourceResult, parse_config},
    remote::RemoteIpRanges,
    source::{IpRangeSource, RangeSnapshot, SourceContext},
    static_source::{StaticIpRanges, StaticIpRangesConfig},
};
