use std::process::ExitCode;
use std::sync::Arc;

use hytrack::config::TrackerConfig;
use hytrack::cycle::TrackingCycle;
use hytrack::error::Error;
use hytrack::logging;
use hytrack::mailbox::{ImapMailbox, MailboxSynchronizer};
use hytrack::notify::{Notifier, SmtpSender};
use hytrack::tracking::{BlueDartSource, StatusResolver};

/// Exit status for config, logging, store or persist failures.
const EXIT_FATAL: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = match TrackerConfig::from_env().map_err(Error::from) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  Required: IMAP_SERVER, EMAIL_ADDRESS, EMAIL_PASSWORD, SMTP_SERVER, RECIPIENT_EMAIL");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let _log_guard = match logging::init(&config.log_file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e} ({})", config.log_file.display());
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let source = match BlueDartSource::new() {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "Could not set up the tracking client");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let cycle = TrackingCycle::new(
        MailboxSynchronizer::new(Arc::new(ImapMailbox::new(config.imap.clone()))),
        StatusResolver::new(Arc::new(source)),
        Notifier::new(Arc::new(SmtpSender::new(config.smtp.clone())), config.recipient.clone()),
    );

    let Some(interval) = config.interval else {
        return ExitCode::from(run_once(&cycle, &config).await);
    };

    tracing::info!(every_secs = interval.as_secs(), "Running tracking cycles on a timer");
    let mut tick = tokio::time::interval(interval);
    loop {
        tick.tick().await;
        let code = run_once(&cycle, &config).await;
        if code == EXIT_FATAL {
            return ExitCode::from(code);
        }
    }
}

/// Run one cycle against the configured store and map the outcome to an
/// exit status.
async fn run_once(cycle: &TrackingCycle, config: &TrackerConfig) -> u8 {
    match cycle.run_at(&config.store_path).await {
        Ok(report) => report.exit_code(),
        Err(Error::Store(e)) => {
            tracing::error!(error = %e, path = %config.store_path.display(), "Tracking cycle aborted on the shipment store");
            EXIT_FATAL
        }
        Err(e) => {
            tracing::error!(error = %e, "Tracking cycle aborted");
            EXIT_FATAL
        }
    }
}
