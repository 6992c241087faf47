//! Serves the page's service worker.
//!
//! With the worker enabled, module responses are cached by the browser and
//! evicted when the hot-update client reports a change. Otherwise the served
//! worker unregisters itself so a worker left over from an earlier session
//! cannot serve stale modules.

use async_trait::async_trait;

use super::SERVICE_WORKER;
use crate::context::ServerContext;
use crate::error::InstallError;
use crate::pipeline::{Middleware, Next, Stage};
use crate::request::{DevRequest, DevResponse};

pub const SW_PATH: &str = "/sw.js";

const CACHING_WORKER: &str = r#"const CACHE = 'rift-modules'
self.addEventListener('install', () => self.skipWaiting())
self.addEventListener('activate', (e) => e.waitUntil(self.clients.claim()))
self.addEventListener('message', (e) => {
  if (e.data && e.data.type === 'bust-cache') {
    e.waitUntil(caches.open(CACHE).then((cache) => cache.delete(e.data.path)))
  }
})
self.addEventListener('fetch', (e) => {
  const url = new URL(e.request.url)
  if (url.origin !== self.location.origin || url.pathname.startsWith('/__rift')) return
  e.respondWith(
    caches.open(CACHE).then(async (cache) => {
      const hit = await cache.match(e.request)
      if (hit) return hit
      const res = await fetch(e.request)
      if (res.ok && e.request.destination === 'script') cache.put(e.request, res.clone())
      return res
    })
  )
})
"#;

const UNREGISTER_WORKER: &str = r#"self.addEventListener('install', () => self.skipWaiting())
self.addEventListener('activate', () => {
  self.registration.unregister().then(() => self.clients.matchAll()).then((clients) => {
    clients.forEach((client) => client.navigate(client.url))
  })
})
"#;

pub struct ServiceWorkerStage;

impl Stage for ServiceWorkerStage {
    fn name(&self) -> &str {
        SERVICE_WORKER
    }

    fn install(&self, ctx: &ServerContext) -> Result<(), InstallError> {
        let script = if ctx.config.server.service_worker {
            CACHING_WORKER
        } else {
            UNREGISTER_WORKER
        };
        ctx.use_middleware(SERVICE_WORKER, ServiceWorker { script });
        Ok(())
    }
}

struct ServiceWorker {
    script: &'static str,
}

#[async_trait]
impl Middleware for ServiceWorker {
    async fn handle(&self, req: DevRequest, next: Next<'_>) -> DevResponse {
        if req.path == SW_PATH {
            return DevResponse::js(self.script);
        }
        next.run(req).await
    }
}
