use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use asba_autopilot::accounts::{filter_by_labels, mask};
use asba_autopilot::notify::notify_best_effort;
use asba_autopilot::workflow::DriverFactory;
use asba_autopilot::{
    init_telemetry, shutdown_telemetry, AsbaConfig, CredentialSource, EnvCredentialSource, LogSink,
    MultiAccountRunner, NotificationSink, ShutdownSignal, TelegramSink, UserCredentialSet,
    WorkflowCoordinator,
};

#[derive(Parser)]
#[command(name = "asba-autopilot")]
#[command(about = "Automated IPO (ASBA) applications for MeroShare accounts")]
#[command(long_about = "Checks the brokerage portal for open IPO applications and applies for every \
                       configured account whose eligibility criteria match, then sends one summary \
                       notification. Running without a subcommand is the same as 'asba-autopilot run'.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check for an open IPO and apply for each account
    Run {
        /// Only process the named account (repeatable)
        #[arg(long = "account", help = "Account label to process; may be given more than once")]
        accounts: Vec<String>,
        /// Stop before submitting and report for review
        #[arg(long, help = "Go through eligibility checks without submitting anything")]
        dry_run: bool,
    },
    /// List the validated accounts with secrets masked
    Accounts,
    /// Send a test message through the configured notification channel
    NotifyTest,
    /// Print the effective configuration or write it to a file
    Config {
        #[arg(long, help = "Write the configuration (with secrets) to this TOML file")]
        write: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    AsbaConfig::load_env_file()?;
    let config = AsbaConfig::load()?;
    init_telemetry(&config.observability)?;

    let result = tokio::runtime::Runtime::new()?.block_on(async {
        match cli.command {
            None => run_command(config, Vec::new(), false).await,
            Some(Commands::Run { accounts, dry_run }) => run_command(config, accounts, dry_run).await,
            Some(Commands::Accounts) => accounts_command(&config),
            Some(Commands::NotifyTest) => notify_test_command(&config).await,
            Some(Commands::Config { write }) => config_command(&config, write),
        }
    });

    shutdown_telemetry();
    result
}

fn load_accounts(config: &AsbaConfig) -> Vec<UserCredentialSet> {
    EnvCredentialSource::from_process_env()
        .with_extra_accounts(config.accounts.clone())
        .validated()
}

fn notification_sink(config: &AsbaConfig) -> Result<Arc<dyn NotificationSink>> {
    match config.notification.telegram() {
        Some((token, _)) => Ok(Arc::new(TelegramSink::new(token)?)),
        None => {
            tracing::warn!("Telegram is not configured, notifications go to the log");
            Ok(Arc::new(LogSink))
        }
    }
}

#[cfg(feature = "chromium")]
fn driver_factory(config: &AsbaConfig) -> Result<Arc<dyn DriverFactory>> {
    use asba_autopilot::remote::ChromiumSessionFactory;
    use asba_autopilot::PortalDriverFactory;

    let sessions = Arc::new(ChromiumSessionFactory::new(config.browser.clone()));
    let factory = PortalDriverFactory::new(sessions, config.portal.clone(), config.driver_policies())?;
    Ok(Arc::new(factory))
}

#[cfg(not(feature = "chromium"))]
fn driver_factory(_config: &AsbaConfig) -> Result<Arc<dyn DriverFactory>> {
    bail!("this build has no browser support; rebuild with the 'chromium' feature")
}

async fn run_command(mut config: AsbaConfig, labels: Vec<String>, dry_run: bool) -> Result<()> {
    if dry_run {
        config.run.dry_run = true;
    }

    let accounts = filter_by_labels(load_accounts(&config), &labels)?;
    println!("🚀 ASBA autopilot: {} account(s) to process", accounts.len());
    if config.run.dry_run {
        println!("🧪 Dry run: applications will not be submitted");
    }

    let shutdown = ShutdownSignal::new();
    shutdown.install_ctrl_c_handler();

    let coordinator = WorkflowCoordinator::new(config.stage_policies(), config.coordinator_options());
    let runner = MultiAccountRunner::new(
        coordinator,
        driver_factory(&config)?,
        notification_sink(&config)?,
        config.runner_options(),
    )
    .with_shutdown(shutdown);

    let report = runner.run(&accounts).await;

    println!();
    for result in &report.results {
        match &result.reason {
            Some(reason) => println!("  • {}: {} ({})", result.account, result.status, reason),
            None => println!("  • {}: {}", result.account, result.status),
        }
    }

    match report.run_error() {
        Ok(()) => {
            println!("✅ Run complete");
            Ok(())
        }
        Err(failure) => {
            println!("❌ {}", failure);
            Err(failure.into())
        }
    }
}

fn accounts_command(config: &AsbaConfig) -> Result<()> {
    let accounts = load_accounts(config);
    if accounts.is_empty() {
        println!("📋 No valid accounts configured");
        println!();
        println!("   → Set MEROSHARE_USERNAME / MEROSHARE_PASSWORD / MEROSHARE_DP_NP");
        println!("   → Or USER1_USERNAME, USER1_PASSWORD, USER1_DP ... up to USER10_*");
        return Ok(());
    }

    println!("📋 {} account(s):", accounts.len());
    for account in &accounts {
        println!("  👤 {}", account.summary());
        let missing = account.missing_application_fields();
        if missing.is_empty() {
            println!("     ✅ bank {}, account {}, kitta {}", account.bank, mask(&account.account_number), account.units);
        } else {
            println!("     ⚠️  missing: {}", missing.join(", "));
        }
    }
    Ok(())
}

async fn notify_test_command(config: &AsbaConfig) -> Result<()> {
    let Some((_, chat_id)) = config.notification.telegram() else {
        bail!("Telegram is not configured (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID)");
    };

    let sink = notification_sink(config)?;
    let message = "🔔 *ASBA Autopilot*\n\nTest notification, the channel works.";
    if notify_best_effort(sink.as_ref(), chat_id, message).await {
        println!("✅ Test notification sent");
        Ok(())
    } else {
        bail!("test notification was not delivered, see the log for details")
    }
}

fn config_command(config: &AsbaConfig, write: Option<PathBuf>) -> Result<()> {
    match write {
        Some(path) => {
            config.save_to_file(&path)?;
            println!("💾 Configuration written to {}", path.display());
        }
        None => println!("{}", toml::to_string_pretty(&config.redacted())?),
    }
    Ok(())
}
