use std::sync::Arc;

use cmis_server::config::Settings;
use cmis_server::mail::{LogMailer, Mailer, SmtpMailer};
use cmis_server::store::{MemoryStore, PgStore, RecordStore};
use cmis_server::{app, random_signing_key, signing_key, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let settings = Settings::load()?;

    let key = match &settings.secret_key {
        Some(secret) => signing_key(secret),
        None => {
            log::warn!("No CMIS_SECRET_KEY set, sessions will not survive a restart");
            random_signing_key()
        }
    };

    let mailer: Arc<dyn Mailer> = match settings.smtp() {
        Some(smtp) => Arc::new(SmtpMailer::new(&smtp)?),
        None => {
            log::warn!("SMTP is not configured, reset emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let state = match &settings.database_url {
        Some(url) => {
            let store = Arc::new(PgStore::connect(url, settings.max_connections).await?);
            store.init_schema().await?;
            if settings.seed_sample_data {
                store.seed_sample_data().await?;
            }
            AppState::new(store, mailer, settings.clone())
        }
        None => {
            log::warn!("No CMIS_DATABASE_URL set, keeping all data in memory");
            let store = Arc::new(MemoryStore::new());
            if settings.seed_sample_data {
                store.seed_sample_data().await?;
            }
            AppState::new(store, mailer, settings.clone())
        }
    };

    let addr = settings.bind_addr;
    log::info!("Starting CMIS HTTP Server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app(state, key).into_make_service())
        .await?;
    Ok(())
}
