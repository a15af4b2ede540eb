// Copyright 2022 The Blaze Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Minimal embedded realization of the otherwise out-of-scope static file
//! server: it understands exactly the two GET shapes in the wire contract
//! and nothing else. No directory listing, no compression, no range
//! requests, no authentication.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use tokio::sync::oneshot;

use crate::error::Result;

/// Spawns the embedded server as a background task bound to an ephemeral
/// port on loopback, and returns the bound address once it is actually
/// listening. The task runs until `shutdown` fires or is dropped.
pub async fn spawn_embedded_server(
    root: PathBuf,
    shutdown: oneshot::Receiver<()>,
) -> Result<SocketAddr> {
    let root = Arc::new(root);
    let make_svc = make_service_fn(move |_conn| {
        let root = root.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| serve(root.clone(), req))) }
    });

    let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_svc);
    let addr = server.local_addr();

    let graceful = server.with_graceful_shutdown(async {
        shutdown.await.ok();
    });
    tokio::spawn(async move {
        if let Err(e) = graceful.await {
            log::error!("embedded shuffle server exited with error: {e}");
        }
    });

    Ok(addr)
}

async fn serve(root: Arc<PathBuf>, req: Request<Body>) -> std::result::Result<Response<Body>, Infallible> {
    let response = match resolve(&root, req.uri().path()) {
        Some(path) => match tokio::fs::read(&path).await {
            Ok(bytes) => Response::new(Body::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(),
            Err(e) => {
                log::warn!("failed to serve {}: {e}", path.display());
                internal_error()
            }
        },
        None => not_found(),
    };
    Ok(response)
}

/// Maps a request path like `/shuffle/7/2/3-0` to `<root>/shuffle/7/2/3-0`,
/// rejecting anything that would escape `root` via `..` components.
fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    if relative.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(root.join(relative))
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::empty())
        .expect("static response is always well-formed")
}

fn internal_error() -> Response<Body> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(Body::empty())
        .expect("static response is always well-formed")
}
