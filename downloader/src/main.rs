/// Lectern Downloader - Main Entry Point
///
/// Logs into the portal once, then downloads every lecture in the register
/// that has a link but no local file.
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use lectern_downloader::{
    install_interrupt_handler, DownloadReconciler, HaltSignal, SemesterPlacement, TransferEngine,
    TransferOptions,
};
use lectern_portal::auth::{provider_from_config, CasAuthenticator};
use lectern_shared::auth::login_with_retries;
use lectern_shared::config::Config;
use lectern_shared::register::RegisterStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lectern_downloader=info".parse()?)
                .add_directive("lectern_portal=info".parse()?)
                .add_directive("lectern_shared=info".parse()?),
        )
        .init();

    info!("=== Lectern Downloader Starting ===");

    let config = Config::from_env()?;
    let mut store = RegisterStore::load(&config.register_path)
        .with_context(|| format!("Failed to load register {:?}", config.register_path))?;

    if store.register().is_empty() {
        println!(
            "The register at {:?} is empty. Run lectern-harvest first to collect your lectures.",
            config.register_path
        );
        return Ok(());
    }

    let pending = store.register().pending_count();
    if pending == 0 {
        println!("0 lecture(s) downloaded.");
        return Ok(());
    }

    let authenticator = CasAuthenticator::new(&config.login_url, &config.media_url);
    let provider = provider_from_config(&config);
    let session = login_with_retries(&authenticator, provider.as_ref(), config.max_login_attempts).await?;

    if !config.assume_yes && !confirm(pending) {
        println!("Aborted");
        return Ok(());
    }

    let halt = HaltSignal::new();
    install_interrupt_handler(halt.clone());

    let reconciler = DownloadReconciler::new(
        Arc::new(TransferEngine::new(session, TransferOptions::from_config(&config))),
        Arc::new(SemesterPlacement::new(&config.lecture_dir)),
        halt,
        config.persist_mode,
    );

    let report = match reconciler.run(&mut store).await {
        Ok(report) => report,
        Err(e) => {
            error!("Failed to save register {:?}: {}", store.path(), e);
            return Err(e.into());
        }
    };

    for failed in &report.failed {
        warn!("Not downloaded: {} {} - {}", failed.course, failed.session, failed.message);
    }
    if report.halted {
        info!("Stopped early; {} download(s) left for the next run", report.cancelled);
    }

    println!("{} lecture(s) downloaded.", report.downloaded);
    Ok(())
}

fn confirm(pending: usize) -> bool {
    tokio::task::block_in_place(|| {
        dialoguer::Confirm::new()
            .with_prompt(format!("Download {} lecture(s)?", pending))
            .default(true)
            .interact()
            .unwrap_or(false)
    })
}
