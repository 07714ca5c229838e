//! Control socket request handling for the daemon

use anyhow::{Context, Result};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};

use super::{ControlRequest, ControlResponse, ControlServer, read_message, write_message};
use crate::overlay::{AdapterMessage, OverlayDisplayAdapter};
use crate::settings::{SettingsSource, SettingsStore};

/// Everything a request may touch
#[derive(Clone)]
pub struct ControlContext {
    pub store: Arc<SettingsStore>,
    pub adapter: OverlayDisplayAdapter,
    pub mailbox: Sender<AdapterMessage>,
}

/// Spawn IPC listener thread to serve CLI requests
pub fn spawn_ipc_listener(server: ControlServer, ctx: ControlContext) -> Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("control-ipc".to_string())
        .spawn(move || {
            if let Err(e) = run_ipc_loop(&server, &ctx) {
                error!(error = ?e, "IPC listener thread crashed");
            }
        })
        .context("Failed to spawn IPC listener thread")
}

fn run_ipc_loop(server: &ControlServer, ctx: &ControlContext) -> Result<()> {
    info!(socket = ?server.path(), "IPC listener started");

    loop {
        let stream = server.accept()?;
        debug!("Control client connected");
        if serve_client(stream, ctx) {
            info!("Shutdown requested via IPC, listener stopping");
            return Ok(());
        }
        debug!("Control client disconnected");
    }
}

/// Serve one client until it hangs up. Returns true once shutdown was requested.
fn serve_client(mut stream: UnixStream, ctx: &ControlContext) -> bool {
    loop {
        let request: ControlRequest = match read_message(&mut stream) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = ?e, "IPC connection closed or error");
                return false;
            }
        };
        let shutdown = request == ControlRequest::Shutdown;
        let response = handle_request(request, ctx);
        if let Err(e) = write_message(&mut stream, &response) {
            warn!(error = ?e, "Failed to send IPC response");
            return shutdown;
        }
        if shutdown {
            return true;
        }
    }
}

pub fn handle_request(request: ControlRequest, ctx: &ControlContext) -> ControlResponse {
    match request {
        ControlRequest::SetOverlayDisplays(value) => {
            info!(value = ?value, "Received overlay display setting via IPC");
            match ctx.store.put_overlay_display_devices(value.as_deref()) {
                Ok(()) => ControlResponse::Ready,
                Err(e) => ControlResponse::Error(format!("{e:#}")),
            }
        }

        ControlRequest::GetOverlayDisplays => match ctx.store.overlay_display_devices() {
            Ok(value) => ControlResponse::OverlayDisplays(value),
            Err(e) => ControlResponse::Error(format!("{e:#}")),
        },

        ControlRequest::RequestMode { unique_id, mode_id } => {
            if ctx.adapter.request_display_mode(&unique_id, mode_id) {
                ControlResponse::Ready
            } else {
                ControlResponse::Error(format!("No registered overlay display device '{unique_id}'"))
            }
        }

        ControlRequest::ListDevices => ControlResponse::Devices(ctx.adapter.device_infos()),

        ControlRequest::Dump => ControlResponse::Dump(ctx.adapter.dump()),

        ControlRequest::Ping => ControlResponse::Pong,

        ControlRequest::Shutdown => {
            info!("Received shutdown request via IPC");
            let _ = ctx.mailbox.send(AdapterMessage::Shutdown);
            ControlResponse::Ready
        }
    }
}
