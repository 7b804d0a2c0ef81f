pub mod admission;
pub mod browser_worker;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod object_store;
pub mod rate_limit;
pub mod reconciler;
pub mod registry;
pub mod routes;
pub mod send_executor;
pub mod session_storage;
pub mod supervisor;
pub mod wallet;
pub mod webhooks;

use std::sync::Arc;

use rocket::fs::{FileServer, Options};
use rocket::http::Method;
use rocket_cors::{AllowedHeaders, AllowedOrigins, CorsOptions};

use admission::AdmissionContext;
use browser_worker::{BrowserWorker, SimulatedWorker};
use config::Config;
use db::Db;
use events::EventBus;
use object_store::{HttpObjectStore, ObjectStore};
use registry::SessionRegistry;
use session_storage::SessionStorageService;
use wallet::WalletLocks;
use webhooks::WebhookEngine;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    build_rocket(Config::from_env())
}

/// Test-only entry point: builds the same rocket as `rocket()` but against
/// an isolated SQLite file and a scratch auth directory derived from it,
/// with the static dashboard mount disabled (API-only), so integration
/// tests never share state or a port with a real deployment.
pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    let mut config = Config::from_env();
    config.database_path = db_path.to_string();
    config.session_auth_dir = format!("{db_path}-auth");
    config.static_dir = format!("{db_path}-no-such-static-dir");
    config.object_store_url = Some("http://127.0.0.1:1".to_string());
    build_rocket(config)
}

fn make_worker_factory() -> Box<dyn Fn() -> Arc<dyn BrowserWorker> + Send + Sync> {
    use rand::Rng;
    Box::new(|| {
        let mut rng = rand::thread_rng();
        let phone: String = (0..11).map(|_| rng.gen_range(0..10).to_string()).collect();
        Arc::new(SimulatedWorker::new(format!("+{phone}")))
    })
}

fn build_rocket(config: Config) -> rocket::Rocket<rocket::Build> {
    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::create_dir_all(&config.session_auth_dir).ok();

    let db = Arc::new(Db::new(&config.database_path));
    let events = Arc::new(EventBus::new());
    let registry = Arc::new(SessionRegistry::new());
    let wallet_locks = Arc::new(WalletLocks::new());

    let store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
        config.object_store_url.clone().unwrap_or_else(|| "http://localhost:9000".to_string()),
        config.object_store_bucket.clone(),
        config.object_store_key.clone(),
    ));
    let storage = Arc::new(SessionStorageService::new(store.clone(), config.session_auth_dir.clone()));

    let webhooks = Arc::new(WebhookEngine::new(
        db.clone(),
        config.webhook_timeout_secs,
        config.webhook_max_concurrency,
        config.webhook_default_max_attempts,
        config.webhook_default_retry_delay_secs,
    ));

    // Subscribe the webhook dispatcher before EventBus is handed to route
    // handlers, so no supervisor-originated event is missed between startup
    // and the liftoff fairing below.
    let webhook_receiver = events.sender.subscribe();

    let admission_ctx = Arc::new(AdmissionContext {
        db: db.clone(),
        events: events.clone(),
        registry: registry.clone(),
        storage: storage.clone(),
        wallet_locks: wallet_locks.clone(),
        auth_root: config.session_auth_dir.clone(),
        initial_wallet_balance: config.initial_wallet_balance,
        default_rate_limit: config.default_rate_limit,
        webhooks: webhooks.clone(),
        worker_factory: make_worker_factory(),
    });

    let config = Arc::new(config);

    // Reflects the request's Origin rather than a single configured origin,
    // with credentials allowed for the dashboard's cookie/session flow.
    let cors = CorsOptions {
        allowed_origins: AllowedOrigins::all(),
        allowed_methods: vec![
            Method::Get,
            Method::Post,
            Method::Put,
            Method::Delete,
            Method::Patch,
            Method::Options,
        ]
        .into_iter()
        .map(From::from)
        .collect(),
        allowed_headers: AllowedHeaders::all(),
        allow_credentials: true,
        max_age: Some(86400),
        ..Default::default()
    }
    .to_cors()
    .expect("Failed to create CORS");

    let static_dir = config.static_dir.clone();
    let port = config.port;
    let figment = rocket::Config::figment()
        .merge(("port", port))
        .merge(("limits.json", 10 * 1024 * 1024));

    let mut build = rocket::custom(figment)
        .manage(db.clone())
        .manage(events.clone())
        .manage(config.clone())
        .manage(registry.clone())
        .manage(storage.clone())
        .manage(wallet_locks.clone())
        .manage(webhooks.clone())
        .manage(admission_ctx.clone())
        .attach(cors)
        .register("/", rocket::catchers![routes::not_found, routes::too_many_requests])
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::connect,
                routes::get_session,
                routes::disconnect,
                routes::send_otp,
                routes::send_announcement,
                routes::test_message,
                routes::wallet_balance,
                routes::wallet_transactions,
                routes::topup_wallet,
                routes::create_webhook,
                routes::list_webhooks,
                routes::update_webhook,
                routes::delete_webhook,
                routes::webhook_logs,
                routes::test_webhook,
                routes::account_strength,
                routes::account_strength_logs,
                routes::strengthen_comprehensive,
                routes::subscription_tiers,
                routes::get_subscription,
                routes::upsert_subscription,
                routes::get_settings,
                routes::update_settings,
                routes::update_profile,
                routes::auth_info,
                routes::session_status,
                routes::v1_wallet_balance,
                routes::v1_wallet_transactions,
                routes::messages_send,
                routes::messages_send_bulk,
                routes::otp_send,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff("Webhook Dispatcher", {
            let db = db.clone();
            let webhooks = webhooks.clone();
            move |_rocket| {
                Box::pin(async move {
                    webhooks::spawn_dispatcher(webhook_receiver, webhooks, db);
                    println!("webhook dispatcher started");
                })
            }
        }))
        .attach(rocket::fairing::AdHoc::on_liftoff("Startup Reconciler", {
            let ctx = admission_ctx.clone();
            let store = store.clone();
            let bucket_probe_key = "auth/.startup-probe".to_string();
            move |_rocket| {
                Box::pin(async move {
                    reconciler::reconcile(ctx, store, &bucket_probe_key).await;
                })
            }
        }));

    if std::path::Path::new(&static_dir).is_dir() {
        println!("serving dashboard frontend from: {static_dir}");
        build = build.mount("/", FileServer::new(&static_dir, Options::Index));
    } else {
        println!("dashboard frontend directory not found: {static_dir} (API-only mode)");
    }

    build
}
