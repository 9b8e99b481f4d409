use std::sync::Arc;
use std::sync::atomic::Ordering;

use roster_scan::config::ScanConfig;
use roster_scan::directory::{DiscordDirectory, GroupDirectoryClient};
use roster_scan::notify::{NotificationSink, Totals, WebhookSink};
use roster_scan::rate_limit::RateLimiter;
use roster_scan::scan::{PassReport, ScanCoordinator};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = ScanConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export DISCORD_TOKEN=... WEBHOOK_URL=https://...");
        std::process::exit(1);
    });

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("{}", "=".repeat(60));
    eprintln!("🎮 roster-scan v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}", config.api_base);
    eprintln!(
        "   Sufficiency: {:.0}% | supplemental rounds: {} | fallback pages: {} x {}",
        config.enumerator.sufficiency_ratio * 100.0,
        config.enumerator.supplemental_rounds,
        config.enumerator.max_pages,
        config.enumerator.page_size,
    );
    match config.repeat_interval {
        Some(interval) => eprintln!("   Passes: every {}s", interval.as_secs()),
        None => eprintln!("   Passes: single"),
    }
    if let Some(dir) = &config.log_dir {
        eprintln!("   Log dir: {dir}");
    }
    eprintln!("{}", "=".repeat(60));

    let directory: Arc<dyn GroupDirectoryClient> = Arc::new(DiscordDirectory::new(
        config.token.clone(),
        config.api_base.clone(),
        Arc::new(RateLimiter::new(config.pacing.request_spacing)),
    ));
    let sink: Arc<dyn NotificationSink> = Arc::new(WebhookSink::new(config.webhook_url.clone()));
    let coordinator = Arc::new(ScanCoordinator::from_config(&config, directory, sink)?);

    let shutdown = coordinator.shutdown_handle();
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n⏹  Interrupt received, stopping after the current member...");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    loop {
        eprintln!("\n🚀 Starting scan pass...");
        match coordinator.run_pass().await {
            Ok(report) => print_pass(&report),
            Err(e) if config.repeat_interval.is_some() => {
                tracing::error!(error = %e, "Could not list groups, retrying next pass");
            }
            Err(e) => return Err(e.into()),
        }

        let Some(interval) = config.repeat_interval else {
            break;
        };
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                shutdown.store(true, Ordering::Relaxed);
            }
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
    }

    print_final(coordinator.counters().snapshot());
    Ok(())
}

fn init_tracing(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "roster-scan.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

fn print_pass(report: &PassReport) {
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("🌐 Groups found: {}", report.groups_listed);
    for group in &report.groups {
        let note = if group.enumeration_failed {
            " (enumeration failed)"
        } else if group.interrupted {
            " (interrupted)"
        } else {
            ""
        };
        eprintln!(
            "📁 {} ({} declared) | scanned: {} | gamertags: {}{}",
            group.group_name, group.declared, group.scanned, group.found, note
        );
    }
    for name in &report.aborted {
        eprintln!("❌ {name}: scan aborted");
    }
    eprintln!(
        "🎮 Pass finished{}: {} scanned, {} found",
        if report.interrupted { " early" } else { "" },
        report.totals.scanned,
        report.totals.found
    );
    eprintln!("{}", "=".repeat(50));
}

fn print_final(totals: Totals) {
    eprintln!("\n📊 FINAL SUMMARY");
    eprintln!("{}", "=".repeat(50));
    eprintln!("👥 Total scanned: {} users", totals.scanned);
    eprintln!("✅ Gamertags found: {}", totals.found);
    eprintln!("{}", "=".repeat(50));
}
