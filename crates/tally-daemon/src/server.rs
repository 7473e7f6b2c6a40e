//! Connection handling for tallyd

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tally_config::{
    log_count_debug, log_count_info, log_count_warn, log_daemon_debug, log_daemon_error, log_daemon_info,
    log_daemon_warn,
};
use tally_core::{RootRequest, WordCountResult, WordCounter};
use tally_ipc::frame::{read_frame, write_encoded};
use tally_ipc::{
    decode_payload, encode_frame, IpcError, TallyRequest, TallyResponse, MAX_REQUEST_SIZE, MAX_RESPONSE_SIZE,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;

pub struct DaemonState {
    counter: Arc<WordCounter>,
    requests_served: AtomicU64,
    started: Instant,
    max_response_size: usize,
}

impl DaemonState {
    pub fn new(counter: WordCounter) -> Self {
        Self {
            counter: Arc::new(counter),
            requests_served: AtomicU64::new(0),
            started: Instant::now(),
            max_response_size: MAX_RESPONSE_SIZE,
        }
    }

    /// Lower the response size limit
    pub fn with_max_response_size(mut self, max: usize) -> Self {
        self.max_response_size = max;
        self
    }

    fn status(&self) -> String {
        format!(
            "Operational (threads: {}, requests served: {}, uptime: {}s)",
            self.counter.threads(),
            self.requests_served.load(Ordering::Relaxed),
            self.started.elapsed().as_secs()
        )
    }
}

/// Accept connections until `shutdown` resolves
pub async fn serve<F>(listener: UnixListener, state: Arc<DaemonState>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _addr)) => {
                        let state = state.clone();
                        tokio::spawn(handle_connection(stream, state));
                    }
                    Err(err) => {
                        log_daemon_error!("Accept error", error = err.to_string());
                    }
                }
            }
            _ = &mut shutdown => {
                log_daemon_info!("Shutdown signal received");
                break;
            }
        }
    }
}

/// Answer framed requests on one connection until the peer hangs up
pub async fn handle_connection<S>(mut stream: S, state: Arc<DaemonState>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let payload = match read_frame(&mut stream, MAX_REQUEST_SIZE).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(IpcError::FrameTooLarge { size, .. }) => {
                log_daemon_warn!("Request frame too large, closing connection", size = size);
                return;
            }
            Err(e) => {
                log_daemon_debug!("Connection read failed", error = e.to_string());
                return;
            }
        };

        let response = match decode_payload::<TallyRequest>(&payload) {
            Ok(req) => handle_request(req, &state).await,
            Err(e) => {
                log_daemon_warn!("Rejecting malformed request", error = e.to_string());
                TallyResponse::Error(format!("Invalid request: {}", e))
            }
        };

        let frame = match encode_response(&response, state.max_response_size) {
            Ok(frame) => frame,
            Err(e) => {
                log_daemon_error!("Error reply could not be encoded, closing connection", error = e.to_string());
                return;
            }
        };
        if let Err(e) = write_encoded(&mut stream, &frame).await {
            log_daemon_debug!("Connection write failed", error = e.to_string());
            return;
        }
    }
}

/// Encode `response`, replacing it with an error reply when it cannot be sent
fn encode_response(response: &TallyResponse, max: usize) -> Result<Vec<u8>, IpcError> {
    match encode_frame(response, max) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            log_daemon_warn!("Response cannot be sent, replying with error", error = e.to_string());
            let reply = TallyResponse::Error(format!("Result too large to send: {}", e));
            encode_frame(&reply, max)
        }
    }
}

pub async fn handle_request(req: TallyRequest, state: &DaemonState) -> TallyResponse {
    match req {
        TallyRequest::Handshake { client_version } => {
            log_daemon_info!("Handshake from client", client_version = client_version);
            TallyResponse::HandshakeAck {
                server_version: env!("CARGO_PKG_VERSION").to_string(),
            }
        }
        TallyRequest::Status => TallyResponse::StatusAck {
            status: state.status(),
        },
        TallyRequest::CountWords { roots } => count_words(roots, state).await,
    }
}

async fn count_words(roots: RootRequest, state: &DaemonState) -> TallyResponse {
    let start = Instant::now();
    let root_count = roots.len();
    let counter = Arc::clone(&state.counter);

    // Traversal blocks on its pending-work counter; keep it off the reactor.
    match tokio::task::spawn_blocking(move || counter.traverse(&roots)).await {
        Ok(outcomes) => {
            state.requests_served.fetch_add(1, Ordering::Relaxed);
            for (key, outcome) in &outcomes {
                log_count_debug!(
                    "Root finished",
                    key = key.as_str(),
                    files = outcome.stats.files_counted,
                    words = outcome.frequencies.len(),
                );
                if !outcome.completed {
                    log_count_warn!("Deadline reached, result is partial", key = key.as_str());
                }
            }
            log_count_info!(
                "Request finished",
                roots = root_count,
                elapsed_ms = start.elapsed().as_millis() as u64,
            );
            let result: WordCountResult = outcomes
                .into_iter()
                .map(|(key, outcome)| (key, outcome.frequencies))
                .collect();
            TallyResponse::Words { result }
        }
        Err(e) => {
            log_daemon_error!("Word count task failed", error = e.to_string());
            TallyResponse::Error(format!("Word count failed: {}", e))
        }
    }
}
