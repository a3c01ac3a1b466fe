//! A registry server on localhost, and helpers for building image layers

#![allow(dead_code)]

use flate2::{write::GzEncoder, Compression};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server,
};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    convert::Infallible,
    io::Write,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

pub const MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Canned response for one path
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn ok<B: Into<Vec<u8>>>(content_type: &str, body: B) -> Self {
        Reply {
            status: 200,
            content_type: content_type.to_owned(),
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Reply {
            status,
            content_type: "text/plain".to_owned(),
            body: format!("status {}", status).into_bytes(),
        }
    }
}

/// What the server saw
#[derive(Clone, Debug)]
pub struct Recorded {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub accept: Option<String>,
}

#[derive(Default)]
struct State {
    routes: HashMap<String, Vec<Reply>>,
    requests: Vec<Recorded>,
}

/// Registry and token endpoint on one local port
///
/// Each path has a queue of replies. Requests take replies from the front,
/// and the last one repeats forever. Unknown paths are 404.
pub struct FakeRegistry {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl FakeRegistry {
    /// Start serving on the current tokio runtime
    pub fn start() -> Self {
        let state = Arc::new(Mutex::new(State::default()));
        let service_state = state.clone();
        let make_service = make_service_fn(move |_conn| {
            let state = service_state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let state = state.clone();
                    async move { Ok::<_, Infallible>(respond(&state, req)) }
                }))
            }
        });
        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_service);
        let addr = server.local_addr();
        tokio::spawn(server);
        FakeRegistry { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn auth_realm(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn route(&self, path: &str, replies: Vec<Reply>) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(path.to_owned(), replies);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn serve_token(&self, token: &str) {
        self.route(
            "/token",
            vec![Reply::ok(
                "application/json",
                serde_json::json!({ "token": token }).to_string(),
            )],
        );
    }

    /// Serve layer blobs for `repository`, returning their digests in order
    pub fn serve_layers(&self, repository: &str, layers: &[Vec<u8>]) -> Vec<String> {
        layers
            .iter()
            .map(|layer| {
                let digest = sha256(layer);
                self.route(
                    &format!("/v2/{}/blobs/{}", repository, digest),
                    vec![Reply::ok("application/octet-stream", layer.clone())],
                );
                digest
            })
            .collect()
    }

    /// Serve an image manifest listing `layer_digests`, at `reference` and at
    /// its own digest, which is returned
    pub fn serve_manifest(&self, repository: &str, reference: &str, layer_digests: &[String]) -> String {
        let body = image_manifest(layer_digests);
        let digest = sha256(body.as_bytes());
        for name in &[reference, digest.as_str()] {
            self.route(
                &format!("/v2/{}/manifests/{}", repository, name),
                vec![Reply::ok(MANIFEST, body.clone())],
            );
        }
        digest
    }

    /// Serve a manifest list at `tag` pointing to per-platform manifest
    /// digests
    pub fn serve_manifest_list(&self, repository: &str, tag: &str, entries: &[(&str, &str, String)]) {
        let manifests: Vec<serde_json::Value> = entries
            .iter()
            .map(|(os, arch, digest)| {
                serde_json::json!({
                    "mediaType": MANIFEST,
                    "digest": digest,
                    "size": 528,
                    "platform": { "os": os, "architecture": arch },
                })
            })
            .collect();
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_LIST,
            "manifests": manifests,
        })
        .to_string();
        self.route(
            &format!("/v2/{}/manifests/{}", repository, tag),
            vec![Reply::ok(MANIFEST_LIST, body)],
        );
    }
}

fn respond(state: &Mutex<State>, req: Request<Body>) -> Response<Body> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    let recorded = Recorded {
        path: req.uri().path().to_owned(),
        query: req.uri().query().map(str::to_owned),
        authorization: header("authorization"),
        accept: header("accept"),
    };

    let mut state = state.lock().unwrap();
    let reply = match state.routes.get_mut(&recorded.path) {
        Some(replies) if replies.len() > 1 => replies.remove(0),
        Some(replies) if !replies.is_empty() => replies[0].clone(),
        _ => Reply::status(404),
    };
    state.requests.push(recorded);

    Response::builder()
        .status(reply.status)
        .header("content-type", reply.content_type)
        .body(Body::from(reply.body))
        .unwrap()
}

pub fn sha256(data: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(data))
}

pub fn image_manifest(layer_digests: &[String]) -> String {
    let layers: Vec<serde_json::Value> = layer_digests
        .iter()
        .map(|digest| serde_json::json!({ "mediaType": LAYER, "size": 0, "digest": digest }))
        .collect();
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": MANIFEST,
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": 2,
            "digest": sha256(b"{}"),
        },
        "layers": layers,
    })
    .to_string()
}

/// Gzipped tar with the given entries; paths ending in `/` are directories
pub fn tar_gz(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        if path.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
        }
        header.set_size(data.len() as u64);
        builder.append_data(&mut header, path, data.as_bytes()).unwrap();
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&builder.into_inner().unwrap()).unwrap();
    encoder.finish().unwrap()
}
