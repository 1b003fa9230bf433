//! Actix server startup + app wiring.
//!
//! Builds the queue, fetcher and advancer, then serves the API until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse};
use actix_web::{App, Error, HttpServer, web};
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use futures_util::future::{ok, LocalBoxFuture, Ready};
use song_queue::{FetchOrchestrator, PlaybackAdvancer, RequestQueue};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api;
use crate::config;
use crate::openapi;
use crate::state::AppState;
use crate::ytdlp::{cleanup_stale_downloads, YtDlpFetcher};

const DEFAULT_BIND: &str = "0.0.0.0:8090";

/// Build server state and start the Actix HTTP server.
pub(crate) async fn run(args: crate::Args) -> Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let bind = resolve_bind(args.bind, &cfg)?;
    let download_dir = args
        .download_dir
        .or_else(|| config::download_dir_from_config(&cfg))
        .unwrap_or_else(|| std::env::temp_dir().join("song-request-hub"));
    let queue_config = config::queue_config_from_config(&cfg)?;
    let fetcher_config = config::fetcher_config_from_config(&cfg, download_dir.clone());
    tracing::info!(
        bind = %bind,
        download_dir = %download_dir.display(),
        capacity = queue_config.capacity,
        play_duration_secs = queue_config.play_duration.as_secs(),
        fetcher = %fetcher_config.program,
        "starting song-request-hub"
    );

    let fetcher = YtDlpFetcher::new(fetcher_config)?;
    match cleanup_stale_downloads(&download_dir) {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "removed stale downloads"),
        Err(e) => tracing::warn!(error = %e, "stale download cleanup failed"),
    }

    let queue = RequestQueue::new(queue_config.capacity);
    let orchestrator = FetchOrchestrator::new(queue.clone(), Arc::new(fetcher), &queue_config);
    let advancer = PlaybackAdvancer::new(queue, &queue_config);
    advancer.start()?;
    let state = web::Data::new(AppState::new(orchestrator, advancer));

    let shutdown = setup_shutdown();
    let app_state = state.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(FilteredLogger)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .service(api::chat_event)
            .service(api::queue_list)
            .service(api::queue_add)
            .service(api::queue_position)
            .service(api::status)
            .service(api::skip)
            .service(api::health::health)
    });
    if shutdown.is_some() {
        server = server.disable_signals();
    }
    let server = server.bind(bind)?.run();

    if let Some((_, shutdown_rx)) = shutdown.as_ref() {
        let shutdown_rx = shutdown_rx.clone();
        let handle = server.handle();
        actix_web::rt::spawn(async move {
            let waiter = actix_web::rt::task::spawn_blocking(move || wait_for_ctrlc(&shutdown_rx));
            let signalled = waiter.await.unwrap_or(false);
            if signalled {
                tracing::info!("shutdown requested");
                handle.stop(true).await;
            }
        });
    }

    let served = server.await;
    if let Some((shutdown_tx, _)) = shutdown.as_ref() {
        // Release the ctrl-c waiter's blocking thread.
        let _ = shutdown_tx.try_send(Shutdown::ServerExited);
    }
    state.advancer.stop();
    tracing::info!(
        queued = state.queue().len(),
        fetches_in_flight = state.orchestrator.in_flight(),
        "song-request-hub stopped"
    );
    served?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    CtrlC,
    ServerExited,
}

/// Install the Ctrl-C handler. Returns `None` when it could not be installed, in which
/// case actix keeps its own signal handling.
fn setup_shutdown() -> Option<(Sender<Shutdown>, Receiver<Shutdown>)> {
    let (tx, rx) = crossbeam_channel::bounded(2);
    let signal_tx = tx.clone();
    match ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(Shutdown::CtrlC);
    }) {
        Ok(()) => Some((tx, rx)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to install ctrl-c handler");
            None
        }
    }
}

/// Block until Ctrl-C (true) or until the server has exited on its own (false).
fn wait_for_ctrlc(rx: &Receiver<Shutdown>) -> bool {
    matches!(rx.recv(), Ok(Shutdown::CtrlC))
}

/// Return true when the request path should be logged.
fn should_log_path(path: &str) -> bool {
    !matches!(path, "/health" | "/status" | "/queue/position")
        && !path.starts_with("/swagger-ui/")
}

/// Actix middleware that filters polled paths from logging.
struct FilteredLogger;

impl<S, B> actix_web::dev::Transform<S, ServiceRequest> for FilteredLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = FilteredLoggerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(FilteredLoggerMiddleware { service })
    }
}

struct FilteredLoggerMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for FilteredLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let should_log = should_log_path(req.path());
        let path = req.path().to_string();
        let method = req.method().clone();
        let peer = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("-")
            .to_string();
        let start = std::time::Instant::now();
        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            if should_log {
                tracing::info!(
                    method = %method,
                    path = %path,
                    status = res.status().as_u16(),
                    peer = %peer,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "http request"
                );
            }
            Ok(res)
        })
    }
}

/// Load server config from `--config`, else `config.toml` next to the binary, else defaults.
fn load_config(path: Option<&PathBuf>) -> Result<config::ServerConfig> {
    if let Some(path) = path {
        return config::ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")))
        .filter(|path| path.exists());
    match auto_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using config next to executable");
            config::ServerConfig::load(&path)
        }
        None => Ok(config::ServerConfig::default()),
    }
}

/// Resolve the final bind address from args + config.
fn resolve_bind(bind: Option<SocketAddr>, cfg: &config::ServerConfig) -> Result<SocketAddr> {
    if let Some(addr) = bind {
        return Ok(addr);
    }
    match config::bind_from_config(cfg)? {
        Some(addr) => Ok(addr),
        None => Ok(DEFAULT_BIND.parse()?),
    }
}
