use axum::Json;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use ipnetwork::IpNetwork;
use opentelemetry::{KeyValue, global, metrics::Counter};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::OnceLock;
use tower_governor::{GovernorError, key_extractor::KeyExtractor};

fn throttle_counter() -> &'static Counter<u64> {
    static COUNTER: OnceLock<Counter<u64>> = OnceLock::new();
    COUNTER.get_or_init(|| {
        global::meter("umbra-server")
            .u64_counter("umbra_rate_limit_throttled_total")
            .with_description("Requests rejected by a rate limiter")
            .build()
    })
}

/// Resolves the client IP for rate limiting, honoring `X-Forwarded-For`
/// only when the peer itself is a trusted proxy.
#[derive(Clone, Debug)]
pub struct IpKeyExtractor {
    trusted_proxies: Vec<IpNetwork>,
}

impl IpKeyExtractor {
    #[must_use]
    pub const fn new(trusted_proxies: Vec<IpNetwork>) -> Self {
        Self { trusted_proxies }
    }

    #[must_use]
    pub(crate) fn identify_client_ip(&self, headers: &axum::http::HeaderMap, peer_addr: IpAddr) -> IpAddr {
        if !self.is_trusted(&peer_addr) {
            return peer_addr;
        }

        let xff = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());

        // Walk the chain from right to left, skipping our own
        // infrastructure; the first untrusted hop is the real client.
        if let Some(xff_val) = xff
            && let Some(real_ip) =
                xff_val.rsplit(',').filter_map(|s| s.trim().parse::<IpAddr>().ok()).find(|ip| !self.is_trusted(ip))
        {
            return real_ip;
        }

        peer_addr
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(*ip))
    }
}

impl KeyExtractor for IpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(self.identify_client_ip(req.headers(), peer_ip))
    }
}

/// Shapes rate-limit rejections as `429 {detail, retry_after}` with a
/// standard `Retry-After` header.
pub(crate) fn rate_limit_error_response(err: GovernorError) -> Response {
    match err {
        GovernorError::TooManyRequests { wait_time, .. } => {
            throttle_counter().add(1, &[KeyValue::new("status", "throttled")]);
            tracing::warn!(retry_after = wait_time, "Rate limit exceeded");

            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, wait_time.to_string())],
                Json(json!({
                    "detail": "Rate limit exceeded",
                    "retry_after": wait_time,
                })),
            )
                .into_response()
        }
        GovernorError::UnableToExtractKey => {
            tracing::error!("Unable to extract client IP for rate limiting");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "Internal server error"}))).into_response()
        }
        GovernorError::Other { code, msg, .. } => {
            tracing::error!(message = ?msg, "Rate limiter error");
            (code, Json(json!({"error": msg.unwrap_or_else(|| "Rate limiter error".to_string())}))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn extractor() -> IpKeyExtractor {
        IpKeyExtractor::new(vec!["10.0.0.0/8".parse().unwrap(), "127.0.0.1/32".parse().unwrap()])
    }

    #[test]
    fn untrusted_peer_ignores_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());

        let peer: IpAddr = "198.51.100.7".parse().unwrap();
        assert_eq!(extractor().identify_client_ip(&headers, peer), peer);
    }

    #[test]
    fn trusted_peer_walks_chain_to_first_untrusted_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.1.2.3".parse().unwrap());

        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        let resolved = extractor().identify_client_ip(&headers, peer);
        assert_eq!(resolved, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn trusted_peer_without_header_is_itself() {
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(extractor().identify_client_ip(&HeaderMap::new(), peer), peer);
    }
}
