/*
 * Responsibility
 * - Config読み込み → 依存生成 (rate limit stores, verifier, policies, cache regions, gate)
 * - Router 組み立て + HTTP middleware の適用
 * - axum::serve() で起動 (client address は ConnectInfo で渡す)
 */
use std::net::SocketAddr;
use std::{panic, process, sync::Arc};

use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::clock::{SharedClock, SystemClock};
use crate::config::{CacheBackendConfig, Config};
use crate::error::AppError;
use crate::policies::{AUTH_CLASS, PROJECT, TASK, build_policies};
use crate::repos::{ProjectRepo, TaskRepo};
use crate::services::auth::build_verifier;
use crate::services::authz::AuthzEngine;
use crate::services::cache::{
    CacheClient, CacheRegion, CacheRegistry, RegionConfig, ValkeyClient, valkey,
};
use crate::services::gate::Gate;
use crate::services::rate_limit::{TokenBucketStore, client_key};
use crate::state::AppState;
use crate::{api, middleware};

const GLOBAL_DOMAIN: &str = "global";

fn init_tracing() {
    // Prefer RUST_LOG if set, e.g.
    // RUST_LOG=info,request_gate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // stderr can be hidden depending on how the process is launched
        tracing::error!(?info, "panic");

        // development: crash the whole process so we notice immediately
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<(), AppError> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting request gate in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config, Arc::new(SystemClock)).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}

/// Build process-level services and inject them into the shared application state.
///
/// Spawns one idle-bucket reaper per rate domain on the current runtime.
pub async fn build_state(config: &Config, clock: SharedClock) -> Result<AppState, AppError> {
    let global = Arc::new(TokenBucketStore::new(
        GLOBAL_DOMAIN,
        config.global_rate_limit,
        clock.clone(),
    ));
    let auth = Arc::new(TokenBucketStore::new(
        AUTH_CLASS,
        config.auth_rate_limit,
        clock.clone(),
    ));
    for store in [&global, &auth] {
        store.clone().spawn_reaper(config.rate_limit_sweep_interval);
    }

    let verifier = build_verifier(config, clock.clone())?;

    let projects = ProjectRepo::new();
    let tasks = TaskRepo::new();
    let policies = build_policies(&projects, &tasks);

    let (project_cache, task_cache) = match &config.cache_backend {
        CacheBackendConfig::Memory => (
            CacheRegion::in_memory(PROJECT, config.projects_cache, clock.clone()),
            CacheRegion::in_memory(TASK, config.tasks_cache, clock.clone()),
        ),
        CacheBackendConfig::Valkey { url } => {
            let conn = valkey::connect(url).await?;
            let region = |name: &'static str, region_config: RegionConfig| {
                let client: Arc<dyn CacheClient> =
                    Arc::new(ValkeyClient::for_region(conn.clone(), name, region_config));
                CacheRegion::new(name, region_config, client)
            };
            (
                region(PROJECT, config.projects_cache),
                region(TASK, config.tasks_cache),
            )
        }
    };
    let project_cache = Arc::new(project_cache);
    let task_cache = Arc::new(task_cache);
    tracing::info!(?project_cache, ?task_cache, "cache regions ready");

    let caches = CacheRegistry::new()
        .with(project_cache.clone())
        .with(task_cache.clone());

    let gate = Gate::new(
        global,
        verifier,
        policies,
        AuthzEngine::new(config.ownership_timeout),
        caches,
    )
    .with_class(auth);

    Ok(AppState {
        gate: Arc::new(gate),
        client_keys: client_key::from_config(config.trust_forwarded_for),
        projects,
        tasks,
        project_cache,
        task_cache,
    })
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .nest("/api/v1", api::v1::routes())
        .with_state(state);

    middleware::http::apply(router, config.request_timeout)
}
