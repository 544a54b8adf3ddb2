use chrono::Utc;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use paymatch::application::job::{CycleRun, JobSettings, PaymentJob};
use paymatch::application::links::PaymentLinkGenerator;
use paymatch::application::scheduler::Scheduler;
use paymatch::config::Settings;
use paymatch::domain::money::Amount;
use paymatch::domain::ports::MailboxBox;
use paymatch::infrastructure::json_file::JsonFileOrderStore;
use paymatch::infrastructure::notifier::{TracingNotifier, TracingWorkflow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the mailbox on the configured interval until interrupted
    Run {
        /// Settings JSON file
        #[arg(long)]
        config: PathBuf,
        /// Orders JSON file; updated in place
        #[arg(long)]
        orders: PathBuf,
    },
    /// Run a single verification cycle and print its report as JSON
    Scan {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        orders: PathBuf,
    },
    /// Print payment links for an order as JSON
    Links {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        reference: String,
        #[arg(long)]
        amount: Amount,
        #[arg(long)]
        payer: Option<String>,
        /// Include base64 PNG QR codes
        #[arg(long)]
        qr: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, orders } => {
            let settings = Settings::from_path(&config).into_diagnostic()?;
            let job = Arc::new(build_job(&settings, &orders)?);
            let mut scheduler = Scheduler::new(job, settings.schedule.interval());
            scheduler.start();
            tokio::signal::ctrl_c().await.into_diagnostic()?;
            tracing::info!("shutdown requested");
            scheduler.stop().await;
        }
        Command::Scan { config, orders } => {
            let settings = Settings::from_path(&config).into_diagnostic()?;
            let job = build_job(&settings, &orders)?;
            if let CycleRun::Completed(report) = job.run_cycle(Utc::now()).await.into_diagnostic()? {
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
            }
        }
        Command::Links {
            config,
            reference,
            amount,
            payer,
            qr,
        } => {
            let settings = match config {
                Some(path) => Settings::from_path(path).into_diagnostic()?,
                None => Settings::default(),
            };
            let generator = PaymentLinkGenerator::new(settings.links);
            let mut generated = generator
                .generate(&reference, amount, payer.as_deref())
                .into_diagnostic()?;
            if !qr {
                generated.qr_encodings.clear();
            }
            println!("{}", serde_json::to_string_pretty(&generated).into_diagnostic()?);
        }
    }

    Ok(())
}

fn build_job(settings: &Settings, orders: &Path) -> Result<PaymentJob> {
    let store = Arc::new(JsonFileOrderStore::open(orders).into_diagnostic()?);
    Ok(PaymentJob::new(
        build_mailbox(settings),
        store,
        Arc::new(TracingNotifier),
        Arc::new(TracingWorkflow),
        PaymentLinkGenerator::new(settings.links.clone()),
        JobSettings::from_settings(settings),
    ))
}

#[cfg(feature = "mailbox-imap")]
fn build_mailbox(settings: &Settings) -> MailboxBox {
    use paymatch::config::{SecretCipherKind, StaticMailboxConfig};
    use paymatch::domain::ports::SecretCipher;
    use paymatch::infrastructure::cipher::{Base64SecretCipher, PlainSecretCipher};
    use paymatch::infrastructure::imap::ImapMailbox;

    let cipher: Arc<dyn SecretCipher> = match settings.mailbox.secret_cipher {
        SecretCipherKind::Plain => Arc::new(PlainSecretCipher),
        SecretCipherKind::Base64 => Arc::new(Base64SecretCipher),
    };
    Box::new(ImapMailbox::new(
        Arc::new(StaticMailboxConfig(settings.mailbox.clone())),
        cipher,
    ))
}

#[cfg(not(feature = "mailbox-imap"))]
fn build_mailbox(settings: &Settings) -> MailboxBox {
    use paymatch::infrastructure::in_memory::InMemoryMailbox;

    tracing::warn!(
        host = %settings.mailbox.host,
        "WARNING: built without the 'mailbox-imap' feature; using an empty in-memory mailbox"
    );
    Box::new(InMemoryMailbox::new())
}
