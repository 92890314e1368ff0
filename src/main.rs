use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use complaint_desk::config::AppConfig;
use complaint_desk::crm::{ComplaintStore, LibSqlStore};
use complaint_desk::llm::create_provider;
use complaint_desk::mail::{ImapFetcher, SmtpSender};
use complaint_desk::pipeline::{Pipeline, PipelineDeps};
use complaint_desk::transcribe::{NoTranscriber, Transcriber, WhisperTranscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env().context("invalid configuration")?;
    let _log_guard = init_tracing(&config);

    eprintln!("📬 Complaint Desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!(
        "   Mailbox: {} (IMAP {}:{}, SMTP {}:{})",
        config.email.username,
        config.email.imap_host,
        config.email.imap_port,
        config.email.smtp_host,
        config.email.smtp_port
    );
    eprintln!("   Database: {}", config.db_path.display());

    let llm = create_provider(&config.llm)?;

    let store: Arc<dyn ComplaintStore> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );

    let transcriber: Arc<dyn Transcriber> = match &config.transcribe {
        Some(t) => {
            eprintln!("   Transcription: {} ({})", t.url, t.model);
            Arc::new(WhisperTranscriber::new(&t.url, &t.model, t.api_key.clone())?)
        }
        None => {
            eprintln!("   Transcription: disabled (voice notes go to review)");
            Arc::new(NoTranscriber)
        }
    };

    let pipeline_config = config.pipeline_config()?;
    let deps = PipelineDeps {
        fetcher: Arc::new(ImapFetcher::new(config.email.clone())),
        sender: Arc::new(SmtpSender::new(config.email.clone())),
        transcriber,
        store,
        llm,
    };
    let pipeline = Pipeline::new(deps, pipeline_config);

    let Some(interval) = config.watch_interval else {
        let report = pipeline.run_cycle().await?;
        eprintln!("   Done: {report}");
        return Ok(());
    };

    eprintln!("   Watching: every {}s\n", interval.as_secs());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = pipeline.run_cycle().await {
                    tracing::error!(error = %e, "Cycle failed, retrying next interval");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

/// Stderr logging, plus a daily rolling file when a log directory is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing(config: &AppConfig) -> Option<WorkerGuard> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "complaint-desk.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stderr.and(file_writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .init();
            None
        }
    }
}
