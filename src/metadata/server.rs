//! In-process metadata endpoint, one listener per booting instance.
//!
//! ```text
//! GET /cloud-config   local cloud-config file, 404 when remote or absent
//! GET /ping           guest check-in; caller's address becomes the public IP
//! GET /instance       uuid and name as JSON
//! GET /ssh-key        internal authorized key
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{MetadataService, Registration};
use crate::state::{CloudConfigLocation, VmDescriptor};

pub struct LocalMetadataService {
    bind: SocketAddr,
    advertise_host: String,
}

impl LocalMetadataService {
    /// `advertise_host` is the address the guest can reach the host on.
    pub fn new(bind: SocketAddr, advertise_host: String) -> Self {
        Self {
            bind,
            advertise_host,
        }
    }
}

struct InstanceState {
    uuid: String,
    name: String,
    cloud_config: Option<PathBuf>,
    ssh_key: Option<String>,
    public_ip: Mutex<Option<oneshot::Sender<String>>>,
}

#[async_trait]
impl MetadataService for LocalMetadataService {
    async fn register(&self, vm: &VmDescriptor) -> Result<Registration> {
        let (ip_tx, ip_rx) = oneshot::channel();

        let cloud_config = vm
            .cloud_config
            .as_ref()
            .filter(|cc| cc.location == CloudConfigLocation::Local)
            .map(|cc| PathBuf::from(&cc.locator));

        let state = Arc::new(InstanceState {
            uuid: vm.uuid.clone(),
            name: vm.name.clone(),
            cloud_config,
            ssh_key: vm.internal_ssh.as_ref().map(|k| k.authorized_key.clone()),
            public_ip: Mutex::new(Some(ip_tx)),
        });

        let app = Router::new()
            .route("/cloud-config", get(cloud_config_handler))
            .route("/ping", get(ping))
            .route("/instance", get(instance))
            .route("/ssh-key", get(ssh_key))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("binding metadata service to {}", self.bind))?;
        let port = listener.local_addr().context("reading metadata port")?.port();
        let endpoint = format!("http://{}:{}", self.advertise_host, port);

        info!(target: "metadata", uuid = %vm.uuid, endpoint = %endpoint, "metadata service registered");

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let uuid = vm.uuid.clone();
        tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            let result = axum::serve(listener, service)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
            match result {
                Ok(()) => debug!(target: "metadata", uuid = %uuid, "metadata service shut down"),
                Err(e) => error!(target: "metadata", error = %e, "metadata service stopped"),
            }
        });

        Ok(Registration {
            endpoint,
            public_ip: ip_rx,
            shutdown,
        })
    }
}

async fn cloud_config_handler(State(state): State<Arc<InstanceState>>) -> Response {
    let Some(path) = &state.cloud_config else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read_to_string(path).await {
        Ok(body) => body.into_response(),
        Err(e) => {
            error!(target: "metadata", path = %path.display(), error = %e, "failed to read cloud-config");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn ping(
    State(state): State<Arc<InstanceState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> StatusCode {
    if let Some(tx) = state.public_ip.lock().await.take() {
        let ip = peer.ip().to_string();
        info!(target: "metadata", name = %state.name, ip = %ip, "guest checked in");
        let _ = tx.send(ip);
    }
    StatusCode::OK
}

async fn instance(State(state): State<Arc<InstanceState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "uuid": state.uuid,
        "name": state.name,
    }))
}

async fn ssh_key(State(state): State<Arc<InstanceState>>) -> Response {
    match &state.ssh_key {
        Some(key) => key.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
