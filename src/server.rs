use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use mediagrab::api::{self, AppState};
use mediagrab::config::Config;
use mediagrab::dispatch::Dispatcher;
use mediagrab::flow::{FlowSettings, Orchestrator};
use mediagrab::media::{run_preflight, YtDlpResolver};
use mediagrab::observability::Metrics;
use mediagrab::selection::{spawn_sweeper, SelectionCache};
use mediagrab::transport::TelegramTransport;
use mediagrab::users::{FjallUserStore, UserDirectory};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let token = config.require_token()?.to_string();

    // A missing yt-dlp is the only fatal tool problem
    let tools = run_preflight(&config.resolver).await?;
    tokio::fs::create_dir_all(&config.resolver.temp_dir).await?;

    info!(path = %config.store.path.display(), "Opening user store");
    let store = Arc::new(FjallUserStore::open(&config.store.path)?);
    let users: Arc<dyn UserDirectory> = store.clone();

    let transport = Arc::new(TelegramTransport::new(
        &config.bot.api_root,
        &token,
        Duration::from_secs(config.bot.poll_timeout_secs),
    )?);
    let me = transport
        .connect(CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY)
        .await?;

    let resolver = Arc::new(
        YtDlpResolver::new(&config.resolver.ytdlp_path)
            .with_impersonation(tools.impersonation)
            .with_cookies(tools.cookies.clone()),
    );
    let dispatcher = Dispatcher::new(config.dispatcher.max_concurrent);
    let selections = Arc::new(SelectionCache::new(
        config.selection.ttl(),
        config.selection.max_entries,
    ));
    let metrics = Arc::new(Metrics::new());
    let sweeper = spawn_sweeper(selections.clone(), config.selection.sweep_interval());

    let orchestrator = Arc::new(
        Orchestrator::builder()
            .resolver(resolver)
            .transport(transport.clone())
            .users(users.clone())
            .dispatcher(dispatcher.clone())
            .selections(selections.clone())
            .metrics(metrics.clone())
            .tools(tools.clone())
            .settings(FlowSettings::from_config(&config))
            .build(),
    );

    info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        bot_id = me.id,
        impersonation = tools.impersonation,
        cookies = ?tools.cookies.keys().collect::<Vec<_>>(),
        max_concurrent = dispatcher.max_concurrent(),
        "Bot started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(
        dispatcher.clone(),
        selections.clone(),
        users,
        metrics,
        tools,
    );
    let mut http_shutdown = shutdown_rx.clone();
    let http = tokio::spawn(api::serve(
        address.unwrap_or(config.server.bind_addr),
        state,
        async move {
            let _ = http_shutdown.changed().await;
        },
    ));

    let poller = tokio::spawn(poll_loop(transport, orchestrator, shutdown_rx));

    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    dispatcher.close();
    sweeper.abort();

    if let Err(e) = poller.await {
        warn!(error = %e, "Poll loop ended abnormally");
    }
    match http.await {
        Ok(Err(e)) => warn!(error = %e, "Health endpoint failed"),
        Err(e) => warn!(error = %e, "Health endpoint task ended abnormally"),
        Ok(Ok(())) => {}
    }

    store.persist()?;
    info!(
        active = dispatcher.active_count(),
        queued = dispatcher.queue_depth(),
        "Stopped"
    );

    Ok(())
}

/// Long-poll for updates and handle each event on its own task
async fn poll_loop(
    transport: Arc<TelegramTransport>,
    orchestrator: Arc<Orchestrator>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset = 0;

    loop {
        let polled = tokio::select! {
            _ = shutdown.changed() => break,
            polled = transport.poll_updates(&mut offset) => polled,
        };

        let events = match polled {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Polling failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for event in events {
            let orchestrator = orchestrator.clone();
            debug!(chat_id = event.chat_id(), kind = event.kind(), "Update received");
            tokio::spawn(async move { orchestrator.handle(event).await });
        }
    }

    info!("Polling stopped");
}

/// Check tools and, when a token is configured, the Telegram connection
pub async fn check(config: Config) -> Result<(), AnyError> {
    let tools = run_preflight(&config.resolver).await?;
    println!("{}", serde_json::to_string_pretty(&tools)?);

    match config.require_token() {
        Ok(token) => {
            let transport = TelegramTransport::new(
                &config.bot.api_root,
                token,
                Duration::from_secs(config.bot.poll_timeout_secs),
            )?;
            let me = transport.get_me().await?;
            println!(
                "Telegram: connected as @{}",
                me.username.as_deref().unwrap_or(&me.first_name)
            );
        }
        Err(e) => println!("Telegram: skipped ({e})"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
