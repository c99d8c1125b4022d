use std::{collections::HashMap, fmt, future::Future, sync::Arc, time::Duration};

use futures_util::{FutureExt as _, future::LocalBoxFuture};
use serde::Deserialize;

use crate::{
    ConfigError, IpRangeSource, RefreshConfig, RemoteIpRanges, SourceContext, StaticIpRanges,
    StaticIpRangesConfig, config::deserialize_duration,
};

/// Result of constructing a range source.
pub type SourceResult = Result<Arc<dyn IpRangeSource>, ConfigError>;

type Constructor =
    Box<dyn Fn(serde_json::Value, SourceContext) -> LocalBoxFuture<'static, SourceResult>>;

/// Maps source names to constructors.
///
/// Source configuration uses an inline `source` key to pick the constructor; the remaining keys
/// are handed to it. For example, `{ "source": "cloudflare", "interval": "30m" }`.
///
/// The registry is built explicitly at startup; [`with_builtin`](Self::with_builtin) registers:
/// - `cloudflare`: Cloudflare's published ranges, refreshed in the background;
///   accepts `interval` and `timeout`.
/// - `remote`: any line-delimited CIDR lists; accepts `urls`, `interval` and `timeout`.
/// - `static`: a fixed list; accepts `ranges`.
pub struct SourceRegistry {
    constructors: HashMap<String, Constructor>,
}

/// Configuration for the `remote` source.
///
/// Timing fields mirror [`RefreshConfig`]; `deny_unknown_fields` does not combine with `flatten`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteSourceConfig {
    urls: Vec<String>,

    #[serde(default, deserialize_with = "deserialize_duration")]
    interval: Option<Duration>,

    #[serde(default, deserialize_with = "deserialize_duration")]
    timeout: Option<Duration>,
}

impl RemoteSourceConfig {
    fn refresh(&self) -> RefreshConfig {
        let mut refresh = RefreshConfig::default();

        if let Some(interval) = self.interval {
            refresh = refresh.interval(interval);
        }

        if let Some(timeout) = self.timeout {
            refresh = refresh.timeout(timeout);
        }

        refresh
    }
}

impl SourceRegistry {
    /// Constructs an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Constructs a registry with the built-in `cloudflare`, `remote` and `static` sources.
    pub fn with_builtin() -> Self {
        Self::new()
            .register("cloudflare", |config, ctx| async move {
                let config = parse_config::<RefreshConfig>("cloudflare", config)?;
                let source = RemoteIpRanges::cloudflare(config, &ctx).await;
                Ok(Arc::new(source) as Arc<dyn IpRangeSource>)
            })
            .register("remote", |config, ctx| async move {
                let config = parse_config::<RemoteSourceConfig>("remote", config)?;
                let refresh = config.refresh();
                let source =
                    RemoteIpRanges::provision("remote", config.urls, refresh, &ctx).await;
                Ok(Arc::new(source) as Arc<dyn IpRangeSource>)
            })
            .register("static", |config, _ctx| async move {
                let config = parse_config::<StaticIpRangesConfig>("static", config)?;
                Ok(Arc::new(StaticIpRanges::from(config)) as Arc<dyn IpRangeSource>)
            })
    }

    /// Registers a source constructor under `name`, replacing any existing one.
    ///
    /// The constructor receives the source's configuration with the `source` key removed.
    pub fn register<F, Fut>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(serde_json::Value, SourceContext) -> Fut + 'static,
        Fut: Future<Output = SourceResult> + 'static,
    {
        self.constructors.insert(
            name.into(),
            Box::new(move |config, ctx| constructor(config, ctx).boxed_local()),
        );
        self
    }

    /// Returns true if a constructor is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Constructs and provisions the source described by `config`.
    pub async fn load(&self, config: &serde_json::Value, ctx: &SourceContext) -> SourceResult {
        let mut config = match config {
            serde_json::Value::Object(map) => map.clone(),
            _ => return Err(ConfigError::MissingSourceName),
        };

        let name = match config.remove("source") {
            Some(serde_json::Value::String(name)) => name,
            _ => return Err(ConfigError::MissingSourceName),
        };

        let constructor = self
            .constructors
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownSource { name: name.clone() })?;

        tracing::debug!(source = %name, "loading IP range source");

        constructor(serde_json::Value::Object(config), ctx.clone()).await
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.constructors.keys().collect::<Vec<_>>();
        names.sort_unstable();

        f.debug_struct("SourceRegistry")
            .field("sources", &names)
            .finish()
    }
}

/// Deserializes source-specific configuration, attributing failures to the source.
pub fn parse_config<T: for<'de> Deserialize<'de>>(
    name: &str,
    config: serde_json::Value,
) -> Result<T, ConfigError> {
    serde_json::from_value(config).map_err(|source| ConfigError::Invalid {
        name: name.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use actix_web::test::TestRequest;
    use serde_json::json;

    use super::*;

    #[actix_web::test]
    async fn loads_static_source() {
        let registry = SourceRegistry::with_builtin();
        let config = json!({ "source": "static", "ranges": ["192.0.2.0/24"] });

        let source = registry
            .load(&config, &SourceContext::default())
            .await
            .unwrap();

        let req = TestRequest::default().to_srv_request();
        let ranges = source.ip_ranges(req.head());
        assert!(ranges.contains("192.0.2.7".parse::<IpAddr>().unwrap()));
    }

    #[actix_web::test]
    async fn missing_or_bad_source_key() {
        let registry = SourceRegistry::with_builtin();
        let ctx = SourceContext::default();

        let err = registry.load(&json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingSourceName));

        let err = registry.load(&json!({ "source": 3 }), &ctx).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingSourceName));

        let err = registry.load(&json!("static"), &ctx).await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingSourceName));
    }

    #[actix_web::test]
    async fn unknown_source() {
        let registry = SourceRegistry::new();
        assert!(!registry.contains("cloudflare"));

        let err = registry
            .load(&json!({ "source": "cloudflare" }), &SourceContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigError::UnknownSource { ref name } if name == "cloudflare"));
    }

    #[actix_web::test]
    async fn invalid_source_config() {
        let registry = SourceRegistry::with_builtin();
        let ctx = SourceContext::default();

        let err = registry
            .load(&json!({ "source": "cloudflare", "interval": "often" }), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == "cloudflare"));

        let err = registry
            .load(&json!({ "source": "remote" }), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == "remote"));
    }

    #[actix_web::test]
    async fn misspelled_keys_are_rejected() {
        let registry = SourceRegistry::with_builtin();
        let ctx = SourceContext::default();

        let err = registry
            .load(&json!({ "source": "cloudflare", "intreval": "30m" }), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == "cloudflare"));

        let err = registry
            .load(
                &json!({ "source": "remote", "urls": [], "intreval": "30m" }),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == "remote"));

        let err = registry
            .load(&json!({ "source": "static", "range": ["10.0.0.0/8"] }), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == "static"));
    }

    #[test]
    fn remote_config_durations() {
        let config = parse_config::<RemoteSourceConfig>(
            "remote",
            json!({ "urls": ["http://127.0.0.1:9/ips"], "interval": "1d", "timeout": "-1s" }),
        )
        .unwrap();

        let refresh = config.refresh();
        assert_eq!(refresh.effective_interval(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(refresh.effective_timeout(), crate::DEFAULT_TIMEOUT);
    }

    #[actix_web::test]
    async fn custom_source() {
        #[derive(Debug)]
        struct Nothing;

        impl IpRangeSource for Nothing {
            fn ip_ranges(&self, _head: &actix_web::dev::RequestHead) -> crate::RangeSnapshot {
                crate::RangeSnapshot::empty()
            }
        }

        let registry = SourceRegistry::new()
            .register("nothing", |_config, _ctx| async {
                Ok(Arc::new(Nothing) as Arc<dyn IpRangeSource>)
            });
        assert!(registry.contains("nothing"));

        let source = registry
            .load(&json!({ "source": "nothing" }), &SourceContext::default())
            .await
            .unwrap();

        let req = TestRequest::default().to_srv_request();
        assert!(source.ip_ranges(req.head()).is_empty());
    }

    #[test]
    fn debug_lists_sources() {
        let registry = SourceRegistry::with_builtin();
        let debug = format!("{registry:?}");
        assert!(debug.contains(r#"["cloudflare", "remote", "static"]"#));
    }
}
