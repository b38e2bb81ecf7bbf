//! Connection acceptance and session tasks
//!
//! # Architecture
//!
//! ```text
//! run_server
//!     ├── tokio multi-thread runtime (config.worker_threads)
//!     └── serve (accept loop)
//!         ├── JoinSet of session tasks, reaped as they finish
//!         └── serve_connection (one per client)
//!             ├── Framed<TcpStream, LengthDelimitedCodec>
//!             └── SessionDispatcher, moved into spawn_blocking per request
//! ```
//!
//! # Thread Safety
//!
//! Each session owns its dispatcher and therefore its login state. Store
//! operations may block on record locks, so they run on the blocking pool:
//! a waiting session stalls only itself, never the listener. Record locks are
//! guards owned by the blocking closure, so a dropped connection cannot
//! leave one held.

pub mod client;

pub use client::LedgerClient;

use crate::config::ServerConfig;
use crate::core::BankEngine;
use crate::io::wire::{decode_request, encode_response, frame_codec, CommandCode, Response};
use crate::session::SessionDispatcher;
use crate::types::LedgerError;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// Run the server until Ctrl-C
///
/// Builds a multi-threaded runtime with the configured worker count, opens
/// the stores and serves connections on `config.bind_addr`.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built, the stores cannot be
/// opened or the address cannot be bound.
pub fn run_server(config: ServerConfig) -> Result<(), LedgerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .map_err(|e| LedgerError::IoError {
            message: format!("Failed to create tokio runtime: {}", e),
        })?;

    runtime.block_on(async {
        let engine = BankEngine::open(&config.data_dir, config.password_cost)?;
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| LedgerError::IoError {
                message: format!("cannot bind {}: {}", config.bind_addr, e),
            })?;
        info!(
            addr = %config.bind_addr,
            workers = config.worker_threads,
            "ledger server listening"
        );

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        };
        serve(listener, engine, config.max_frame_bytes, shutdown).await
    })
}

/// Accept connections until `shutdown` completes
///
/// Each connection gets its own task; finished tasks are reaped as they
/// complete. On shutdown, open sessions are aborted and the stores are
/// flushed.
pub async fn serve(
    listener: TcpListener,
    engine: BankEngine,
    max_frame_bytes: usize,
    shutdown: impl Future<Output = ()>,
) -> Result<(), LedgerError> {
    let mut sessions = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    sessions.spawn(serve_connection(stream, peer, engine.clone(), max_frame_bytes));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "session task failed");
                }
            }
            _ = &mut shutdown => {
                info!(open_sessions = sessions.len(), "shutting down");
                break;
            }
        }
    }

    sessions.shutdown().await;
    tokio::task::spawn_blocking(move || engine.sync())
        .await
        .map_err(|e| LedgerError::IoError {
            message: format!("store flush task failed: {}", e),
        })?
}

/// Serve one client until it disconnects
///
/// Every decoded frame gets exactly one response. Frames that are not valid
/// requests are answered with a `protocol` failure; transport errors end the
/// session.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    engine: BankEngine,
    max_frame_bytes: usize,
) {
    let mut framed = Framed::new(stream, frame_codec(max_frame_bytes));
    let mut dispatcher = SessionDispatcher::new(engine);

    while let Some(frame) = framed.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%peer, error = %e, "transport error, closing session");
                break;
            }
        };

        let response = match decode_request(&frame) {
            Ok(request) => {
                debug!(%peer, command = %request.code(), "request received");
                let handled = tokio::task::spawn_blocking(move || {
                    let response = dispatcher.handle(request);
                    (dispatcher, response)
                })
                .await;
                match handled {
                    Ok((returned, response)) => {
                        dispatcher = returned;
                        response
                    }
                    Err(e) => {
                        error!(%peer, error = %e, "request handler panicked, closing session");
                        return;
                    }
                }
            }
            Err(e) => {
                debug!(%peer, error = %e, "malformed request");
                Response::failure(CommandCode::Unknown, &e)
            }
        };

        let bytes = match encode_response(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(%peer, error = %e, "cannot encode response, closing session");
                break;
            }
        };
        if let Err(e) = framed.send(bytes).await {
            warn!(%peer, error = %e, "cannot send response, closing session");
            break;
        }
    }

    debug!(%peer, user = ?dispatcher.state().user_id(), "connection closed");
}
