use custodial_stake_core::chain::{self, AlloyChainClient, ChainClient};
use custodial_stake_core::clock::{self, SystemClock};
use custodial_stake_core::config::{self, Config};
use custodial_stake_core::state::AppState;
use custodial_stake_core::{api, db, deposits, metrics, payout, staking};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();
    tracing::info!("Starting custodial staking backend");

    let config = Config::load()?;
    tracing::info!(chains = ?config.chains.iter().map(|c| &c.slug).collect::<Vec<_>>(), "Configuration loaded");

    let db = db::create_pool(&config.database.url).await?;
    tracing::info!("Database connected");

    db::run_migrations(&db).await?;
    tracing::info!("Database migrations complete");

    // Reconcile the `chains` table against env config, then build one RPC
    // client per chain row — the same "env config wins, DB row follows"
    // stance the teacher takes toward its own chain bootstrap.
    let mut chain_rows = Vec::with_capacity(config.chains.len());
    for chain_cfg in &config.chains {
        let row = db::catalog::upsert_chain(
            &db,
            &chain_cfg.slug,
            chain_cfg.chain_id as i64,
            &chain_cfg.rpc_url,
            chain_cfg.confirmations_required as i32,
        )
        .await?;
        chain_rows.push(row);
    }

    let mut chain_clients: HashMap<Uuid, Arc<dyn ChainClient>> = HashMap::new();
    for chain_cfg in &config.chains {
        let Some(row) = chain_rows.iter().find(|r| r.slug == chain_cfg.slug) else {
            continue;
        };
        let client = AlloyChainClient::new(chain_cfg.all_rpc_urls(), chain_cfg.chain_id)?;
        chain_clients.insert(row.id, Arc::new(client));
    }

    let clock: Arc<dyn clock::Clock> = Arc::new(SystemClock);
    let state = AppState::new(&config, db.clone(), clock.clone(), chain_clients.clone());

    metrics::UP.set(1.0);

    // One shutdown channel per independently-managed worker task, fanned out
    // from a single signal listener — the same shape the teacher's `main.rs`
    // uses for its watcher/writer/confirmation trio.
    let (http_tx, http_rx) = tokio::sync::mpsc::channel::<()>(1);
    let (accrual_tx, accrual_rx) = tokio::sync::mpsc::channel::<()>(1);
    let (payout_tx, payout_rx) = tokio::sync::mpsc::channel::<()>(1);
    let mut scanner_txs = Vec::new();
    let mut scanner_rxs = Vec::new();
    for _ in &chain_rows {
        let (tx, rx) = tokio::sync::mpsc::channel::<()>(1);
        scanner_txs.push(tx);
        scanner_rxs.push(rx);
    }

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = http_tx.send(()).await;
        let _ = accrual_tx.send(()).await;
        let _ = payout_tx.send(()).await;
        for tx in scanner_txs {
            let _ = tx.send(()).await;
        }
    });

    let bind_addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| eyre::eyre!("invalid bind_addr {:?}: {e}", config.bind_addr))?;
    let http_handle = tokio::spawn(run_http_server(state.clone(), config.cors.clone(), bind_addr, http_rx));

    let accrual_handle = tokio::spawn(run_accrual_worker(db.clone(), clock.clone(), accrual_rx));

    let payout_handle = tokio::spawn(payout::run(
        db.clone(),
        config.master_key.clone(),
        chain_clients.clone(),
        chain_rows.clone(),
        Duration::from_secs(15),
        payout_rx,
    ));

    let mut scanner_handles = Vec::new();
    for (chain_cfg, scanner_rx) in config.chains.iter().zip(scanner_rxs) {
        let Some(row) = chain_rows.iter().find(|r| r.slug == chain_cfg.slug) else {
            continue;
        };
        let Some(client) = chain_clients.get(&row.id).cloned() else {
            continue;
        };
        let scanner = deposits::DepositScanner::new(
            row.id,
            chain_cfg.slug.clone(),
            chain_cfg.confirmations_required,
            client,
            db.clone(),
            clock.clone(),
        );
        scanner_handles.push(tokio::spawn(scanner.run(scanner_rx)));
    }

    let _ = http_handle.await;
    let _ = accrual_handle.await;
    let _ = payout_handle.await;
    for handle in scanner_handles {
        let _ = handle.await;
    }

    tracing::info!("custodial staking backend stopped");
    Ok(())
}

async fn run_http_server(state: AppState, cors: config::CorsConfig, addr: SocketAddr, mut shutdown: tokio::sync::mpsc::Receiver<()>) {
    let app = api::router(state, &cors);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind HTTP listener");
            return;
        }
    };
    tracing::info!(%addr, "HTTP server listening");

    let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown.recv() => {
            tracing::info!("HTTP server shutting down");
        }
    }
}

/// Reward accrual and cooldown-sweep worker, run on the same poll loop since
/// both are cheap, idempotent passes over small due-sets.
async fn run_accrual_worker(db: sqlx::PgPool, clock: Arc<dyn clock::Clock>, mut shutdown: tokio::sync::mpsc::Receiver<()>) {
    let poll_interval = Duration::from_secs(60);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("accrual worker shutting down");
                return;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        match staking::accrue_due_rewards(&db, clock.as_ref(), 500).await {
            Ok(count) => tracing::debug!(count, "reward accrual pass complete"),
            Err(e) => tracing::error!(error = %e, "reward accrual pass failed"),
        }
        match staking::sweep_completed_cooldowns(&db, clock.as_ref()).await {
            Ok(count) => tracing::debug!(count, "cooldown sweep complete"),
            Err(e) => tracing::error!(error = %e, "cooldown sweep failed"),
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,custodial_stake_core=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }
}
