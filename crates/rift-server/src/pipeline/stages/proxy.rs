//! Forwards configured path prefixes to other servers.

use async_trait::async_trait;
use axum::http::{HeaderValue, StatusCode, header};
use url::Url;

use super::PROXY;
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse, ResponseBody};

/// Headers that describe one hop and must not be forwarded.
const HOP_HEADERS: &[header::HeaderName] = &[
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

pub struct ProxyStage;

impl Stage for ProxyStage {
    fn name(&self) -> &str {
        PROXY
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        let mut routes = Vec::with_capacity(ctx.config.server.proxy.len());
        for (prefix, target) in &ctx.config.server.proxy {
            let url = Url::parse(target.target()).map_err(|e| InstallError::InvalidProxy {
                prefix: prefix.clone(),
                message: e.to_string(),
            })?;
            if url.host_str().is_none() {
                return Err(InstallError::InvalidProxy {
                    prefix: prefix.clone(),
                    message: format!("target '{}' has no host", target.target()),
                });
            }
            routes.push(ProxyRoute {
                prefix: prefix.clone(),
                target: url,
                change_origin: target.change_origin(),
            });
        }

        if routes.is_empty() {
            return Ok(());
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| InstallError::Stage {
                stage: PROXY.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(routes = routes.len(), "proxy routes configured");
        ctx.use_middleware(PROXY, Proxy { routes, client });
        Ok(())
    }
}

struct ProxyRoute {
    prefix: String,
    target: Url,
    change_origin: bool,
}

impl ProxyRoute {
    fn upstream_url(&self, req: &DevRequest) -> String {
        format!(
            "{}{}",
            self.target.as_str().trim_end_matches('/'),
            req.url()
        )
    }

    fn authority(&self) -> Option<String> {
        let host = self.target.host_str()?;
        Some(match self.target.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}

struct Proxy {
    routes: Vec<ProxyRoute>,
    client: reqwest::Client,
}

#[async_trait]
impl Middleware for Proxy {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        let Some(route) = self
            .routes
            .iter()
            .find(|route| req.path.starts_with(route.prefix.as_str()))
        else {
            return next.run(req).await;
        };

        let url = route.upstream_url(&req);
        tracing::debug!(path = %req.path, upstream = %url, "proxying");

        let mut headers = req.headers.clone();
        for name in HOP_HEADERS {
            headers.remove(name);
        }
        if route.change_origin {
            if let Some(value) = route
                .authority()
                .and_then(|authority| HeaderValue::from_str(&authority).ok())
            {
                headers.insert(header::HOST, value);
            }
        }

        let upstream = self
            .client
            .request(req.method.clone(), &url)
            .headers(headers)
            .body(req.body.clone())
            .send()
            .await;

        let upstream = match upstream {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(upstream = %url, error = %e, "proxy request failed");
                return DevResponse::error(StatusCode::BAD_GATEWAY, format!("Proxy error: {e}"));
            }
        };

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        for name in HOP_HEADERS {
            response_headers.remove(name);
        }
        match upstream.bytes().await {
            Ok(body) => {
                let mut res = DevResponse::new(status);
                res.headers = response_headers;
                res.headers.remove(header::CONTENT_LENGTH);
                res.body = ResponseBody::Binary(body);
                res
            }
            Err(e) => DevResponse::error(StatusCode::BAD_GATEWAY, format!("Proxy error: {e}")),
        }
    }
}
