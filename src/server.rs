//! Server composition root: wires the store, cache, and every engine
//! together, exposes the liveness/readiness HTTP surface, and drives the
//! health watchdog until shutdown.
//!
//! The gateway/REST connection to the chat platform itself is outside this
//! crate's scope (§ "Out of scope" — the remote collaborator named
//! throughout as [`RemoteGuild`]); [`Server::run`] takes an implementation of
//! it as a dependency rather than constructing one, so whatever process
//! drives the real gateway connection owns wiring its events to
//! [`EventDispatcher`].

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

use crate::affinity::{AffinityEngine, InteractionWeights, Normalization};
use crate::cache::Cache;
use crate::config::{AffinityNormalization, Config};
use crate::datacache::DataCache;
use crate::db::Store;
use crate::dispatch::EventDispatcher;
use crate::ownership::OwnershipEngine;
use crate::remote::RemoteGuild;
use crate::starboard::StarboardEngine;
use crate::sync::SyncEngine;
use crate::voice::VoiceTracker;
use crate::watchdog::HealthWatchdog;

const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Everything constructed at startup and handed to event handlers for the
/// lifetime of the process, in place of the scattered singletons a more
/// naive port of this system would reach for (§9 redesign flag).
pub struct Server {
    config: Config,
}

#[derive(Clone)]
struct HealthState {
    store: Store,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connects the store and cache, runs migrations, builds every engine,
    /// and runs until SIGINT/SIGTERM, then drains within a 1-second grace
    /// period.
    ///
    /// `remote` is the caller-supplied adapter onto the live gateway/REST
    /// connection; this crate only consumes it through [`RemoteGuild`].
    pub async fn run(self, remote: Arc<dyn RemoteGuild>) -> anyhow::Result<()> {
        let store = Store::connect(&self.config.primary_store_url).await?;
        store.migrate().await?;
        let cache = Cache::connect(&self.config.cache_url).await?;

        let guild_id_str = self.config.guild_id.to_string();
        let guild_id: Id<GuildMarker> = Id::new(self.config.guild_id);

        let voice = VoiceTracker::new(
            store.clone(),
            DataCache::new(cache.clone(), store.clone()),
            guild_id_str.clone(),
        );
        let ownership = OwnershipEngine::new(store.clone(), DataCache::new(cache.clone(), store.clone()));

        let starboard = self.config.starboard_channel_id.map(|channel_id| {
            Arc::new(StarboardEngine::new(
                DataCache::new(cache.clone(), store.clone()),
                Id::new(channel_id),
                self.config.starboard_threshold,
            ))
        });

        let weights = InteractionWeights {
            same_channel: self.config.relationship_weight_same_channel,
            mention: self.config.relationship_weight_mention,
            reply: self.config.relationship_weight_reply,
        };
        let normalization = match self.config.relationship_normalization {
            AffinityNormalization::Percentage => Normalization::Percentage,
            AffinityNormalization::Logarithmic => Normalization::Logarithmic,
        };
        let affinity = AffinityEngine::new(
            store.clone(),
            chrono::Duration::seconds(self.config.relationship_window_seconds),
            weights,
            normalization,
            self.config.relationship_cache_ttl_minutes,
        );

        let sync_engine = SyncEngine::new(store.clone());
        let dispatcher = Arc::new(EventDispatcher::new(
            voice,
            ownership,
            starboard.clone(),
            affinity,
            store.clone(),
        ));

        let watchdog = HealthWatchdog::new(store.clone(), sync_engine, guild_id);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let watchdog_remote = remote.clone();
        let watchdog_rx = shutdown_rx.clone();
        let watchdog_handle = tokio::spawn(async move {
            watchdog.run(watchdog_remote.as_ref(), watchdog_rx).await;
        });

        let reconcile_handle = starboard.map(|engine| {
            let remote = remote.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            let interval = std::time::Duration::from_secs(self.config.starboard_reconcile_minutes * 60);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = engine.reconcile(guild_id, remote.as_ref()).await {
                                tracing::warn!(error = %e, "starboard reconciliation failed");
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            })
        });

        // `dispatcher` is exposed only for whatever process wires live
        // gateway events to it; this crate doesn't call it itself.
        let _ = &dispatcher;

        let health_state = HealthState { store: store.clone() };
        let app = Router::new()
            .route("/healthz", get(liveness))
            .route("/readyz", get(readiness))
            .with_state(health_state);
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        tracing::info!(port = self.config.port, "http surface listening");

        let mut http_shutdown_rx = shutdown_rx.clone();
        let http_handle = tokio::spawn(async move {
            let shutdown_signal = async move {
                let _ = http_shutdown_rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal)
                .await
            {
                tracing::error!(error = %e, "http surface exited with error");
            }
        });

        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received, draining");
        let _ = shutdown_tx.send(true);

        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, watchdog_handle).await;
        if let Some(handle) = reconcile_handle {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
        }
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, http_handle).await;

        tracing::info!("shutdown complete");
        Ok(())
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness(State(state): State<HealthState>) -> Result<&'static str, axum::http::StatusCode> {
    match sqlx::query("SELECT 1").execute(state.store.pool()).await {
        Ok(_) => Ok("ready"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            Err(axum::http::StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
