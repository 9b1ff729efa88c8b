use std::{net::SocketAddr, process, sync::Arc};

use quire::{
    application::{
        auth::AuthService,
        cache::ResponseCache,
        categories::CategoryService,
        error::AppError,
        kv::KvStore,
        mailer::Mailer,
        passwords::{HashCost, PasswordHasher},
        posts::PostService,
        repos::{CategoriesRepo, HealthRepo, PostsRepo, UsersRepo},
        tokens::{TokenCodec, TokenTtls},
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, RateLimiter, TierLimits},
        kv::{MemoryStore, RedisStore},
        mail::SmtpMailer,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!(target = "quire::migrate", "database migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let secret = settings
        .auth
        .secret_key()
        .map_err(|err| AppError::validation(err.to_string()))?
        .to_string();

    let repositories = init_repositories(&settings).await?;
    let store = init_store(&settings).await?;
    let state = build_api_state(&settings, repositories, store, secret.as_bytes())?;

    serve_http(&settings, state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn init_store(settings: &config::Settings) -> Result<Arc<dyn KvStore>, AppError> {
    match settings.redis.url.as_deref() {
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .map_err(|err| AppError::from(InfraError::key_value(err.to_string())))?;
            info!(target = "quire::kv", "using redis key-value store");
            Ok(Arc::new(store))
        }
        None => {
            warn!(
                target = "quire::kv",
                "redis url not configured; tokens, rate limits and cache live in process memory"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_api_state(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    store: Arc<dyn KvStore>,
    secret: &[u8],
) -> Result<ApiState, AppError> {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let categories_repo: Arc<dyn CategoriesRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;

    let ttls = TokenTtls {
        access: to_time(settings.auth.access_token_ttl)?,
        refresh: to_time(settings.auth.refresh_token_ttl)?,
        reset: to_time(settings.auth.reset_token_ttl)?,
    };
    let hasher = PasswordHasher::new(HashCost {
        memory_kib: settings.auth.argon2_memory_kib,
        iterations: settings.auth.argon2_iterations,
        parallelism: settings.auth.argon2_parallelism,
    })
    .map_err(|err| AppError::validation(err.to_string()))?;
    let mailer: Arc<dyn Mailer> =
        Arc::new(SmtpMailer::new(&settings.email).map_err(AppError::from)?);

    let cache = ResponseCache::new(
        Arc::clone(&store),
        settings.cache.ttl,
        settings.cache.enabled,
    );
    let rate_limiter = RateLimiter::new(
        Arc::clone(&store),
        settings.rate_limit.window,
        TierLimits {
            auth: settings.rate_limit.auth_requests.get(),
            strict: settings.rate_limit.strict_requests.get(),
            api: settings.rate_limit.api_requests.get(),
        },
        settings.rate_limit.enabled,
    );

    let auth = AuthService::new(
        users_repo,
        Arc::clone(&store),
        TokenCodec::new(secret, ttls),
        hasher,
        mailer,
        settings.email.password_reset_url.clone(),
    );

    Ok(ApiState {
        auth: Arc::new(auth),
        posts: Arc::new(PostService::new(posts_repo, cache.clone())),
        categories: Arc::new(CategoryService::new(categories_repo, cache)),
        rate_limiter,
        trust_forwarded_for: settings.rate_limit.trust_forwarded_for,
        database: health_repo,
        kv: store,
    })
}

fn to_time(duration: std::time::Duration) -> Result<time::Duration, AppError> {
    time::Duration::try_from(duration)
        .map_err(|err| AppError::validation(format!("token lifetime out of range: {err}")))
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state, &settings.cors);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "quire::server", addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    // The grace period starts once a signal arrives, not at startup.
    let (grace_tx, grace_rx) = tokio::sync::oneshot::channel::<()>();
    let watchdog = tokio::spawn(async move {
        shutdown_signal().await;
        let _ = grace_tx.send(());
    });

    let result = tokio::select! {
        result = server => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        () = async {
            if grace_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!(
                target = "quire::server",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    };

    watchdog.abort();
    info!(target = "quire::server", "server shutdown complete");
    result
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "quire::server", error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "quire::server", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!(target = "quire::server", "shutdown signal received");
}
