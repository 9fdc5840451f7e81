/// Lectern Harvester - Main Entry Point
///
/// Logs into the portal, reads every enrolled course's session table and
/// merges what it finds into the local register.
use anyhow::Context;
use tracing::{error, info};

use lectern_portal::{provider_from_config, CasAuthenticator, MyMediaHarvester};
use lectern_shared::auth::login_with_retries;
use lectern_shared::config::Config;
use lectern_shared::reconcile::{harvest_into, ReconcileOptions};
use lectern_shared::register::RegisterStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lectern_portal=info".parse()?)
                .add_directive("lectern_shared=info".parse()?),
        )
        .init();

    info!("=== Lectern Harvester Starting ===");

    let config = Config::from_env()?;
    let mut store = RegisterStore::load(&config.register_path)
        .with_context(|| format!("Failed to load register {:?}", config.register_path))?;

    let authenticator = CasAuthenticator::new(&config.login_url, &config.media_url);
    let provider = provider_from_config(&config);
    let session = login_with_retries(&authenticator, provider.as_ref(), config.max_login_attempts).await?;

    let harvester = MyMediaHarvester::new(session, &config.media_url);
    let options = ReconcileOptions {
        refresh_links: config.refresh_links,
    };
    let report = harvest_into(store.register_mut(), &harvester, options)
        .await
        .context("Failed to read the course listing")?;

    if let Err(e) = store.save() {
        error!("Failed to save register {:?}: {}", store.path(), e);
        return Err(e.into());
    }

    info!(
        "Register {:?} saved: {} courses, {} sessions ({} added, {} updated, {} awaiting download)",
        store.path(),
        store.register().courses.len(),
        store.register().session_count(),
        report.sessions_added,
        report.sessions_updated,
        store.register().pending_count()
    );
    if report.courses_skipped > 0 || report.sessions_skipped > 0 {
        info!(
            "{} course(s) and {} session row(s) could not be read and will be retried next run",
            report.courses_skipped, report.sessions_skipped
        );
    }
    Ok(())
}
