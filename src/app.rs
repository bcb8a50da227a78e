/*
 * Responsibility
 * - Load Config -> build services -> assemble the Router
 * - Apply HTTP middleware
 * - Start axum::serve()
 */
use std::{panic, process, sync::Arc, time::Duration};

use anyhow::Result;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, SigningKey};
use crate::repos::{
    instrumented::Instrumented, key_repo::InMemoryKeyRepo, pat_repo::InMemoryPatRepo,
    policy_repo::InMemoryPolicyRepo,
};
use crate::services::{
    cache::{CachedScopes, MemoryCacheClient, ScopeCache, ValkeyClient, client::ttl_seconds},
    callback::CallbackAuthorizer,
    keys::{KeyService, TokenCodec},
    pats::PatService,
    policies::PolicyService,
};
use crate::{api, middleware, state::AppState};

fn init_tracing() {
    // RUST_LOG=info,iot_auth=debug,tower_http=debug cargo run
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
        tracing::error!(?info, "panic");

        // Development crashes the process; production keeps serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting iot-auth in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(
        state,
        Duration::from_secs(config.request_timeout_seconds),
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn build_state(config: &Config) -> Result<AppState> {
    let codec = match &config.signing_key {
        SigningKey::EdPem {
            private_pem,
            public_pem,
        } => TokenCodec::from_ed_pem(private_pem, public_pem, config.issuer.clone())?,
        SigningKey::Secret(secret) => {
            TokenCodec::from_secret(secret.as_bytes(), config.issuer.clone())
        }
    };

    let keys = Arc::new(KeyService::new(
        codec,
        Arc::new(Instrumented::new("keys", InMemoryKeyRepo::new())),
        chrono::Duration::seconds(config.login_duration_seconds as i64),
    ));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.callback_timeout_seconds))
        .build()?;
    let callback = Arc::new(CallbackAuthorizer::new(
        http,
        &config.callback_method,
        &config.callback_urls,
    )?);
    if callback.is_enabled() {
        tracing::info!(urls = config.callback_urls.len(), "policy callbacks enabled");
    }

    let policies = Arc::new(PolicyService::new(
        keys.clone(),
        Arc::new(Instrumented::new(
            "policies",
            InMemoryPolicyRepo::with_admins(config.admin_ids.iter().cloned()),
        )),
        callback,
    ));

    let pats = Arc::new(PatService::new(
        keys.clone(),
        Arc::new(Instrumented::new("pats", InMemoryPatRepo::new())),
        build_scope_cache(config).await?,
        chrono::Duration::seconds(config.pat_default_duration_seconds as i64),
    ));

    Ok(AppState::new(keys, policies, pats))
}

async fn build_scope_cache(config: &Config) -> Result<Arc<dyn ScopeCache>> {
    let ttl = ttl_seconds(config.cache_ttl_seconds);
    let prefix = config.cache_key_prefix.clone();

    let cache: Arc<dyn ScopeCache> = match &config.cache_url {
        Some(url) => {
            let client = ValkeyClient::new(url).await?;
            tracing::info!("scope cache backed by valkey");
            Arc::new(CachedScopes::new(client, prefix, ttl))
        }
        None => {
            tracing::info!("scope cache in memory");
            Arc::new(CachedScopes::new(MemoryCacheClient::new(), prefix, ttl))
        }
    };
    Ok(cache)
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let router = Router::new()
        .nest("/api/v1", api::v1::routes())
        .with_state(state);

    middleware::http::apply(router, request_timeout)
}
