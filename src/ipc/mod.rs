//! IPC (Inter-Process Communication) via Unix sockets
//!
//! Carries the message bus between the controller and renderer processes.
//! Uses length-prefixed JSON over Unix domain sockets.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

mod messages;
pub use messages::BusFrame;

use crate::bus::{DataHandler, MessageBus, SyncResponder};
use crate::constants::{ipc, timing};

/// Get default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(ipc::SOCKET_RELATIVE_PATH));
    }

    // Fallback to cache dir
    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(ipc::SOCKET_RELATIVE_PATH))
}

/// Server listener for the controller process
pub struct BusServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl BusServer {
    /// Create server and bind to specific socket path
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        // Remove stale socket if exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .context(format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        // Owner only
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept incoming connection (blocking)
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    /// Get socket path
    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for BusServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write length-prefixed message to stream
pub fn write_message<T: Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;
    if json.len() > ipc::MAX_MESSAGE_SIZE {
        return Err(anyhow!(
            "Message too large: {} bytes (max: {})",
            json.len(),
            ipc::MAX_MESSAGE_SIZE
        ));
    }

    // Write length prefix (u32 little-endian)
    let len = json.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;

    stream
        .write_all(&json)
        .context("Failed to write message payload")?;

    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Read length-prefixed message from stream
pub fn read_message<T: for<'de> Deserialize<'de>>(stream: &mut UnixStream) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > ipc::MAX_MESSAGE_SIZE {
        return Err(anyhow!(
            "Message too large: {} bytes (max: {})",
            len,
            ipc::MAX_MESSAGE_SIZE
        ));
    }

    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}

struct Peer {
    id: u64,
    writer: Mutex<UnixStream>,
}

#[derive(Default)]
struct BusState {
    peers: Mutex<Vec<Arc<Peer>>>,
    listeners: Mutex<HashMap<String, Vec<DataHandler>>>,
    responders: Mutex<HashMap<String, SyncResponder>>,
    pending: Mutex<HashMap<u64, mpsc::Sender<Value>>>,
    next_peer_id: AtomicU64,
    next_request_id: AtomicU64,
}

impl BusState {
    fn add_peer(self: &Arc<Self>, stream: UnixStream) -> Result<()> {
        let reader = stream
            .try_clone()
            .context("Failed to clone IPC stream for reading")?;
        let peer = Arc::new(Peer {
            id: self.next_peer_id.fetch_add(1, Ordering::Relaxed),
            writer: Mutex::new(stream),
        });
        if let Ok(mut peers) = self.peers.lock() {
            peers.push(peer.clone());
        }
        debug!(peer = peer.id, "Bus peer connected");

        let state = Arc::clone(self);
        thread::Builder::new()
            .name(format!("bus-peer-{}", peer.id))
            .spawn(move || state.read_loop(peer, reader))
            .context("Failed to spawn IPC reader thread")?;
        Ok(())
    }

    fn remove_peer(&self, peer_id: u64) {
        if let Ok(mut peers) = self.peers.lock() {
            peers.retain(|p| p.id != peer_id);
        }
        debug!(peer = peer_id, "Bus peer disconnected");
    }

    fn peers(&self) -> Vec<Arc<Peer>> {
        self.peers.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn send_to(&self, peer: &Peer, frame: &BusFrame) -> Result<()> {
        let mut writer = peer
            .writer
            .lock()
            .map_err(|_| anyhow!("IPC writer lock poisoned"))?;
        write_message(&mut writer, frame)
    }

    /// Send to every peer, dropping the ones whose socket failed
    fn fan_out(&self, frame: &BusFrame) -> usize {
        let mut delivered = 0;
        for peer in self.peers() {
            match self.send_to(&peer, frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(peer = peer.id, error = %e, "Dropping bus peer after write failure");
                    self.remove_peer(peer.id);
                }
            }
        }
        delivered
    }

    fn read_loop(self: Arc<Self>, peer: Arc<Peer>, mut reader: UnixStream) {
        loop {
            let frame = match read_message::<BusFrame>(&mut reader) {
                Ok(frame) => frame,
                Err(e) => {
                    trace!(peer = peer.id, error = %e, "Bus reader stopped");
                    break;
                }
            };
            self.dispatch(&peer, frame);
        }
        self.remove_peer(peer.id);
    }

    fn dispatch(&self, peer: &Peer, frame: BusFrame) {
        match frame {
            BusFrame::Data { channel, payload } => {
                let handlers: Vec<DataHandler> = self
                    .listeners
                    .lock()
                    .ok()
                    .and_then(|l| l.get(&channel).cloned())
                    .unwrap_or_default();
                if handlers.is_empty() {
                    trace!(channel = %channel, "No listener for bus message");
                }
                for handler in handlers {
                    handler(payload.clone());
                }
            }
            BusFrame::Request {
                id,
                channel,
                payload,
            } => {
                let responder = self
                    .responders
                    .lock()
                    .ok()
                    .and_then(|r| r.get(&channel).cloned());
                let Some(responder) = responder else {
                    debug!(channel = %channel, "No responder here, ignoring request");
                    return;
                };
                let reply = BusFrame::Reply {
                    id,
                    payload: responder(payload),
                };
                if let Err(e) = self.send_to(peer, &reply) {
                    warn!(peer = peer.id, error = %e, "Failed to send bus reply");
                }
            }
            BusFrame::Reply { id, payload } => {
                let waiter = self.pending.lock().ok().and_then(|mut p| p.remove(&id));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(payload);
                    }
                    None => trace!(id, "Late or duplicate reply dropped"),
                }
            }
        }
    }
}

/// [`MessageBus`] over Unix socket connections
///
/// The controller serves the socket and fans messages out to every connected
/// renderer; a renderer holds a single connection to the controller.
/// Handlers run on the reader thread of the connection they arrived on.
#[derive(Clone)]
pub struct SocketMessageBus {
    state: Arc<BusState>,
    request_timeout: Duration,
}

impl SocketMessageBus {
    fn with_state(state: Arc<BusState>) -> Self {
        Self {
            state,
            request_timeout: Duration::from_millis(timing::SYNC_QUERY_TIMEOUT_MS),
        }
    }

    /// Accept connections on `server` in the background
    pub fn serve(server: BusServer) -> Result<Self> {
        let state = Arc::new(BusState::default());
        let accept_state = state.clone();
        info!(path = %server.path().display(), "Message bus listening");
        thread::Builder::new()
            .name("bus-accept".to_string())
            .spawn(move || loop {
                match server.accept() {
                    Ok(stream) => {
                        if let Err(e) = accept_state.add_peer(stream) {
                            warn!(error = %e, "Failed to register bus peer");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Stopped accepting bus connections");
                        break;
                    }
                }
            })
            .context("Failed to spawn IPC accept thread")?;
        Ok(Self::with_state(state))
    }

    /// Connect to a serving bus
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .context(format!("Failed to connect to controller at {}", path.display()))?;
        let state = Arc::new(BusState::default());
        state.add_peer(stream)?;
        Ok(Self::with_state(state))
    }

    #[cfg(test)]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn peer_count(&self) -> usize {
        self.state.peers().len()
    }

    /// Block until at least `count` peers are connected
    #[cfg(test)]
    pub fn wait_for_peers(&self, count: usize, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.peer_count() < count {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// Answer `send_data_sync` requests on `channel`
    pub fn respond_to<F>(&self, channel: &str, responder: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        if let Ok(mut responders) = self.state.responders.lock() {
            responders.insert(channel.to_string(), Arc::new(responder));
        }
    }
}

impl MessageBus for SocketMessageBus {
    fn send_data(&self, channel: &str, payload: Value) {
        let frame = BusFrame::Data {
            channel: channel.to_string(),
            payload,
        };
        let delivered = self.state.fan_out(&frame);
        trace!(channel = %channel, delivered, "Sent bus message");
    }

    fn send_data_sync(&self, channel: &str, payload: Value) -> Result<Value> {
        let id = self.state.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        if let Ok(mut pending) = self.state.pending.lock() {
            pending.insert(id, tx);
        }
        let frame = BusFrame::Request {
            id,
            channel: channel.to_string(),
            payload,
        };
        if self.state.fan_out(&frame) == 0 {
            if let Ok(mut pending) = self.state.pending.lock() {
                pending.remove(&id);
            }
            return Err(anyhow!("No bus peer to ask on channel '{channel}'"));
        }
        let reply = rx.recv_timeout(self.request_timeout);
        if let Ok(mut pending) = self.state.pending.lock() {
            pending.remove(&id);
        }
        reply.with_context(|| format!("No reply on channel '{channel}' within {:?}", self.request_timeout))
    }

    fn listen_for_data(&self, channel: &str, handler: DataHandler) {
        if let Ok(mut listeners) = self.state.listeners.lock() {
            listeners.entry(channel.to_string()).or_default().push(handler);
        }
    }
}
