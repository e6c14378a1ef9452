//! Local HTTP front end.
//!
//! The app points at this listener instead of the origin. Every request is
//! mapped onto the origin and answered through the worker's fetch handler,
//! except a few control endpoints:
//!
//! | Route                   | Effect                                   |
//! |-------------------------|------------------------------------------|
//! | `POST /__worker/message`| JSON body delivered as a control message |
//! | `POST /__worker/push`   | body delivered as a push payload         |
//! | `POST /__worker/sync`   | fires a sync event (`?tag=`, default `sync-data`) and waits |
//! | `POST /__worker/click?tag=` | clicks the showing notification with that tag |
//!
//! Only origin-relative targets (`/path`) are forwarded; anything that would
//! resolve to another host is rejected with 400.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use reqwest::Method;
use tiny_http::Header;
use tiny_http::Request;
use tiny_http::Response;
use tiny_http::Server;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use url::Url;

use crate::SYNC_TAG;
use crate::error::CacheError;
use crate::error::Result;
use crate::fetch::FetchRequest;
use crate::fetch::FetchResponse;
use crate::fetch::is_hop_by_hop;
use crate::runtime::WorkerHandle;

const CONTROL_PREFIX: &str = "/__worker/";

/// A request read off the socket, body included.
struct Incoming {
    request: Request,
    method: Method,
    target: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

pub struct ProxyServer {
    server: Arc<Server>,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ProxyServer {
    /// Listen on `listen` and forward to `origin` through `worker`.
    pub fn bind(listen: &str, origin: Url, worker: WorkerHandle) -> Result<Self> {
        let server = Server::http(listen)
            .map_err(|e| CacheError::Settings(format!("cannot listen on {listen}: {e}")))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| CacheError::Settings(format!("{listen} is not an IP listener")))?;
        let server = Arc::new(server);

        let (tx, mut rx) = mpsc::channel::<Incoming>(64);
        let server_clone = Arc::clone(&server);
        thread::spawn(move || {
            while let Ok(request) = server_clone.recv() {
                let Some(incoming) = read_incoming(request) else {
                    continue;
                };
                if tx.blocking_send(incoming).is_err() {
                    break;
                }
            }
        });

        let task = tokio::spawn(async move {
            let mut in_flight = JoinSet::new();
            while let Some(incoming) = rx.recv().await {
                let worker = worker.clone();
                let origin = origin.clone();
                in_flight.spawn(async move {
                    let Incoming {
                        request,
                        method,
                        target,
                        headers,
                        body,
                    } = incoming;
                    let response = route(&worker, &origin, method, &target, headers, body).await;
                    let _ = tokio::task::spawn_blocking(move || {
                        let _ = request.respond(into_tiny(response));
                    })
                    .await;
                });
                while in_flight.try_join_next().is_some() {}
            }
            while in_flight.join_next().await.is_some() {}
        });

        tracing::info!("proxy listening on http://{addr}");
        Ok(Self { server, addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for in-flight requests.
    pub async fn shutdown(self) {
        self.server.unblock();
        let _ = self.task.await;
    }
}

fn read_incoming(mut request: Request) -> Option<Incoming> {
    let method = match Method::from_bytes(request.method().as_str().as_bytes()) {
        Ok(method) => method,
        Err(_) => {
            let _ = request.respond(Response::from_string("Bad Request").with_status_code(400));
            return None;
        }
    };
    let mut body = Vec::new();
    if let Err(e) = request.as_reader().read_to_end(&mut body) {
        tracing::debug!("failed to read request body: {e}");
        let _ = request.respond(Response::from_string("Bad Request").with_status_code(400));
        return None;
    }
    let headers = request
        .headers()
        .iter()
        .map(|h| (h.field.to_string(), h.value.to_string()))
        .collect();
    Some(Incoming {
        target: request.url().to_string(),
        request,
        method,
        headers,
        body,
    })
}

async fn route(
    worker: &WorkerHandle,
    origin: &Url,
    method: Method,
    target: &str,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
) -> FetchResponse {
    if let Some(control) = target.strip_prefix(CONTROL_PREFIX) {
        if method != Method::POST {
            return FetchResponse::text(405, "Method Not Allowed");
        }
        return control_route(worker, control, body).await;
    }

    let Some(url) = resolve_target(origin, target) else {
        return FetchResponse::text(400, format!("bad request target: {target}"));
    };
    let request = FetchRequest {
        method,
        url,
        headers: headers
            .into_iter()
            .filter(|(name, _)| !is_hop_by_hop(name))
            .collect(),
        body: Bytes::from(body),
    };
    match worker.fetch(request).await {
        Ok(response) => response,
        Err(e) => FetchResponse::text(503, e.to_string()),
    }
}

/// Map an origin-form request target onto `origin`.
fn resolve_target(origin: &Url, target: &str) -> Option<Url> {
    if !target.starts_with('/') || target.starts_with("//") {
        return None;
    }
    let url = origin.join(target).ok()?;
    (url.origin() == origin.origin()).then_some(url)
}

fn query_param(query: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

async fn control_route(worker: &WorkerHandle, control: &str, body: Vec<u8>) -> FetchResponse {
    let (endpoint, query) = control.split_once('?').unwrap_or((control, ""));
    let result = match endpoint {
        "message" => match serde_json::from_slice(&body) {
            Ok(data) => worker.post_message(data).await,
            Err(e) => return FetchResponse::text(400, format!("invalid JSON: {e}")),
        },
        "push" => {
            let payload = (!body.is_empty()).then(|| Bytes::from(body));
            worker.push(payload).await
        }
        "sync" => {
            let tag = query_param(query, "tag").unwrap_or_else(|| SYNC_TAG.to_string());
            return match worker.sync(tag).await {
                Ok(Some(report)) => FetchResponse::json(
                    200,
                    &serde_json::json!({
                        "attempted": report.attempted,
                        "delivered": report.delivered,
                        "failed": report.failed,
                    }),
                ),
                Ok(None) => FetchResponse::json(200, &serde_json::json!({"ignored": true})),
                Err(e) => FetchResponse::text(500, e.to_string()),
            };
        }
        "click" => match query_param(query, "tag") {
            Some(tag) => worker.notification_click(tag).await,
            None => return FetchResponse::text(400, "missing tag"),
        },
        _ => return FetchResponse::text(404, "Not Found"),
    };
    match result {
        Ok(()) => FetchResponse::new(202, Bytes::new()),
        Err(e @ CacheError::UnknownNotification(_)) => FetchResponse::text(404, e.to_string()),
        Err(e) => FetchResponse::text(503, e.to_string()),
    }
}

fn into_tiny(response: FetchResponse) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut out = Response::from_data(response.body.to_vec()).with_status_code(response.status);
    for (name, value) in &response.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            out.add_header(header);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_origin_relative_targets_resolve() {
        let origin = Url::parse("http://127.0.0.1:8000").unwrap();

        assert_eq!(
            resolve_target(&origin, "/index.html?v=2").map(String::from),
            Some("http://127.0.0.1:8000/index.html?v=2".to_string())
        );
        assert_eq!(resolve_target(&origin, "//evil.example/secret"), None);
        assert_eq!(resolve_target(&origin, "http://evil.example/secret"), None);
        assert_eq!(resolve_target(&origin, "*"), None);
    }
}
