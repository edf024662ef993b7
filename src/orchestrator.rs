//! Server orchestrator (§4.10, Component J): wires A-I together, registers
//! the tool catalog, installs signal handlers, and drives graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser_manager::{BrowserManager, BrowserManagerConfig};
use crate::circuit_breaker::CircuitBreakers;
use crate::config::ServerConfig;
use crate::connection::ConnectionManager;
use crate::dispatcher::{self, ExitOutcome, StdioDispatcher};
use crate::path_validator::PathPolicy;
use crate::tool::{ToolEnvelope, ToolRegistry};

/// Exit codes per §6: 0 clean, 1 startup failure, 2 consecutive-timeout
/// shutdown, 130 SIGINT, 143 SIGTERM.
pub mod exit_code {
    pub const CLEAN: i32 = 0;
    pub const STARTUP_FAILURE: i32 = 1;
    pub const CONSECUTIVE_TIMEOUTS: i32 = 2;
    pub const SIGINT: i32 = 130;
    pub const SIGTERM: i32 = 143;
}

/// Fork-detach into the background and redirect stdio to `/dev/null`
/// (§4.10/§6: "`--daemon` (HTTP only)"). Must run before the tokio runtime
/// starts -- forking a process that already has reactor/worker threads
/// running only keeps the calling thread, orphaning the rest.
#[cfg(unix)]
pub fn daemonize(config: &ServerConfig) -> Result<(), std::io::Error> {
    use daemonize::Daemonize;

    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let mut daemonize = Daemonize::new().working_directory(cwd);
    if let Some(pid_path) = &config.pid_file {
        daemonize = daemonize.pid_file(pid_path);
    }
    daemonize
        .start()
        .map_err(|e| std::io::Error::other(format!("daemonize failed: {e}")))
}

#[cfg(not(unix))]
pub fn daemonize(_config: &ServerConfig) -> Result<(), std::io::Error> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "--daemon is only supported on unix platforms",
    ))
}

pub struct Orchestrator {
    config: ServerConfig,
    browser: Arc<BrowserManager>,
    breakers: Arc<CircuitBreakers>,
    envelope: Arc<ToolEnvelope>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Build the orchestrator and register the full tool catalog. Does not
    /// start the browser subprocess yet; that happens lazily on first use
    /// (`BrowserManager::ensure_started`) so a pure file-tool session never
    /// pays the Chromium launch cost.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let breakers = Arc::new(CircuitBreakers::default());
        let browser = BrowserManager::new(
            BrowserManagerConfig {
                headless: config.headless,
                window_width: config.window_width,
                window_height: config.window_height,
                slow_motion: config.slow_motion,
            },
            breakers.clone(),
        );
        let registry = Arc::new(ToolRegistry::new());

        let working_dir = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        let mut path_policy = PathPolicy::new(working_dir);
        path_policy.allowed_paths = config.allowed_paths.clone();
        path_policy.deny_paths = config.deny_paths.clone();
        path_policy.restrict_to_working_dir = config.restrict_to_workdir;
        path_policy.allow_temp_files = config.allow_temp;
        path_policy.max_file_size_bytes = config.max_file_size;
        let path_policy = Arc::new(path_policy);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        crate::tools::register_all(&registry, &browser, &breakers, &path_policy, http_client);

        match crate::browser_profile::cleanup_stale_profiles() {
            Ok(0) => {}
            Ok(n) => info!(target: "orchestrator", cleaned = n, "removed stale Chrome profile directories from a previous unclean shutdown"),
            Err(e) => warn!(target: "orchestrator", error = %e, "stale profile cleanup failed, continuing"),
        }

        let envelope = Arc::new(ToolEnvelope::new(registry, breakers.clone()));

        Self {
            config,
            browser,
            breakers,
            envelope,
            cancel: CancellationToken::new(),
        }
    }

    /// Installs a `tracing-subscriber` with an `EnvFilter` driven by
    /// `--log-level`/`RUST_LOG`, and an optional rolling file appender when
    /// `--log-dir` is set (§10.1). Returns the appender guard, which must
    /// be kept alive for the process lifetime or buffered lines are lost.
    pub fn init_tracing(config: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
        use tracing_subscriber::prelude::*;

        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.as_filter_str()));

        match &config.log_dir {
            Some(dir) => {
                let file_appender = tracing_appender::rolling::daily(dir, "browservisor.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let file_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).json();
                let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(stderr_layer)
                    .with(file_layer)
                    .init();
                Some(guard)
            }
            None => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                    .init();
                None
            }
        }
    }

    /// Run the server to completion, returning the process exit code (§6).
    pub async fn run(self: Arc<Self>) -> i32 {
        if self.config.daemon && !self.config.http {
            error!(target: "orchestrator", "daemonizing with the stdio transport is forbidden");
            return exit_code::STARTUP_FAILURE;
        }

        if let Some(pid_path) = &self.config.pid_file
            && let Err(e) = std::fs::write(pid_path, std::process::id().to_string())
        {
            warn!(target: "orchestrator", error = %e, "failed to write pid file");
        }

        let health_task = self.clone().spawn_health_supervisor();

        let run_result = tokio::select! {
            exit = self.clone().run_transport() => exit,
            signal = wait_for_signal() => {
                self.cancel.cancel();
                signal
            }
        };

        health_task.abort();
        if let Err(e) = self.browser.shutdown().await {
            error!(target: "orchestrator", error = %e, "error during browser shutdown");
        }
        if let Some(pid_path) = &self.config.pid_file {
            let _ = std::fs::remove_file(pid_path);
        }

        info!(target: "orchestrator", exit_code = run_result, "shutting down");
        run_result
    }

    fn spawn_health_supervisor(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_secs(10)) => {
                        self.browser.health_check_tick().await;
                    }
                }
            }
        })
    }

    async fn run_transport(self: Arc<Self>) -> i32 {
        if self.config.http {
            self.run_http().await
        } else {
            self.run_stdio().await
        }
    }

    async fn run_http(self: Arc<Self>) -> i32 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(target: "orchestrator", error = %e, %addr, "failed to bind HTTP listener");
                return exit_code::STARTUP_FAILURE;
            }
        };
        info!(target: "orchestrator", %addr, "HTTP dispatcher listening");
        let router = dispatcher::http_router(self.envelope.clone());
        let cancel = self.cancel.clone();
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            cancel.cancelled().await;
        });
        if let Err(e) = serve.await {
            error!(target: "orchestrator", error = %e, "HTTP server error");
            return exit_code::STARTUP_FAILURE;
        }
        exit_code::CLEAN
    }

    async fn run_stdio(self: Arc<Self>) -> i32 {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let conn = Arc::new(ConnectionManager::new(
            stdin,
            stdout,
            Duration::from_secs(5 * 60),
            Duration::from_secs(30),
        ));
        let dispatcher = Arc::new(StdioDispatcher::new(conn, self.envelope.clone(), self.cancel.clone()));
        match dispatcher.run().await {
            ExitOutcome::Disconnected => exit_code::CLEAN,
            ExitOutcome::Cancelled => exit_code::CLEAN,
            ExitOutcome::ConsecutiveTimeouts => exit_code::CONSECUTIVE_TIMEOUTS,
        }
    }
}

async fn wait_for_signal() -> i32 {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(target: "orchestrator", error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
                unreachable!()
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => exit_code::SIGINT,
            _ = sigterm.recv() => exit_code::SIGTERM,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        exit_code::SIGINT
    }
}
