//! spectrumd - The spectrum club booking service
//!
//! This is the main entry point for the spectrumd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Conversation state machine and booking engine
//! - IPC server for the chat transport and the calendar surface

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use spectrum_api::{API_VERSION, ErrorCode, ErrorInfo, Response};
use spectrum_config::{ClubConfig, load_config};
use spectrum_core::Conversation;
use spectrum_ipc::{IpcServer, ServerMessage};
use spectrum_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use spectrum_util::{RateLimiter, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often idle chat sessions and rate limiter entries are dropped
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// spectrumd - Booking service for a sports club
#[derive(Parser, Debug)]
#[command(name = "spectrumd")]
#[command(about = "Booking, attendance and subscription service for a sports club", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/spectrum/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set SPECTRUM_SOCKET env var)
    #[arg(short, long, env = "SPECTRUM_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set SPECTRUM_DATA_DIR env var)
    #[arg(short, long, env = "SPECTRUM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    conversation: Arc<Conversation>,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    rate_limiter: RateLimiter,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = if args.config.exists() {
            load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?
        } else {
            warn!(
                config_path = %args.config.display(),
                "Config file not found, using defaults"
            );
            ClubConfig::default()
        };

        info!(
            config_path = %args.config.display(),
            plan_count = config.plans.len(),
            max_weeks = config.scheduling.max_weeks,
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| config.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("spectrumd.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;
        store.append_audit(AuditEvent::new(AuditEventType::ConfigLoaded {
            plan_count: config.plans.len(),
        }))?;

        let conversation = Arc::new(Conversation::new(store.clone(), config));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        // Rate limiter: 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            conversation,
            ipc: Arc::new(ipc),
            store,
            rate_limiter,
        })
    }

    async fn run(mut self) -> Result<()> {
        let ipc = self.ipc.clone();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let mut sweep_timer = tokio::time::interval(SWEEP_INTERVAL);

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                _ = sweep_timer.tick() => {
                    self.conversation.sweep_sessions();
                    self.rate_limiter.cleanup(SWEEP_INTERVAL);
                }

                Some(msg) = ipc_messages.recv() => {
                    self.handle_ipc_message(msg).await;
                }
            }
        }

        info!(
            active_flows = self.conversation.sessions().active_flows(),
            "Shutting down spectrumd"
        );

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    async fn handle_ipc_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                if !self.rate_limiter.check(&client_id) {
                    debug!(client_id = %client_id, "Request rate limited");
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                    );
                    let _ = self.ipc.send_response(&client_id, response).await;
                    return;
                }

                if request.api_version != API_VERSION {
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(
                            ErrorCode::UnsupportedVersion,
                            format!(
                                "API version {} is not supported (expected {})",
                                request.api_version, API_VERSION
                            ),
                        ),
                    );
                    let _ = self.ipc.send_response(&client_id, response).await;
                    return;
                }

                // Each request runs on its own task so a slow chat never
                // holds up the others; one chat is still serialized by its
                // session lock.
                let conversation = self.conversation.clone();
                let ipc = self.ipc.clone();
                tokio::spawn(async move {
                    let request_id = request.request_id;
                    let handled = tokio::task::spawn_blocking(move || {
                        commands::handle_command(
                            &conversation,
                            request.command,
                            spectrum_util::now(),
                        )
                    })
                    .await;

                    let response = match handled {
                        Ok(Ok(payload)) => Response::success(request_id, payload),
                        Ok(Err(e)) => Response::error(request_id, e),
                        Err(e) => {
                            error!(request_id, error = %e, "Command handler panicked");
                            Response::error(
                                request_id,
                                ErrorInfo::new(ErrorCode::InternalError, "Internal error"),
                            )
                        }
                    };

                    if let Err(e) = ipc.send_response(&client_id, response).await {
                        debug!(client_id = %client_id, error = %e, "Client gone before response");
                    }
                });
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(client_id = %client_id, uid = ?info.uid, "Client connected");

                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                        client_id: client_id.to_string(),
                        uid: info.uid,
                    }));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = self
                    .store
                    .append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                        client_id: client_id.to_string(),
                    }));

                self.rate_limiter.remove(&client_id);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "spectrumd starting");

    let service = Service::new(&args).await?;
    service.run().await
}
