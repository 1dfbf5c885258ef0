use std::time::Duration;

use chrono::TimeDelta;
use clap::Parser;
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::time::{MissedTickBehavior, interval};
use wnsm::{ImportOutcome, Importer, StatisticsStore, ValueType};

use crate::{
    cli::{account::AccountArgs, db::DbArgs},
    prelude::*,
};

#[derive(Parser)]
pub struct ImportArgs {
    #[clap(flatten)]
    account: AccountArgs,

    #[clap(flatten)]
    db: DbArgs,

    #[clap(long = "metering-point", env = "WNSM_METERING_POINT")]
    metering_point: String,

    #[clap(long = "granularity", env = "WNSM_GRANULARITY", default_value = "quarter-hour")]
    granularity: Granularity,

    /// Run a cycle every interval, a single cycle when not set.
    #[clap(long = "interval", env = "WNSM_INTERVAL")]
    interval: Option<humantime::Duration>,

    /// Span of a single movement data query.
    #[clap(long = "window", env = "WNSM_WINDOW", default_value = "30days")]
    window: humantime::Duration,

    /// Maximum number of windows per cycle.
    #[clap(long = "max-windows", env = "WNSM_MAX_WINDOWS", default_value = "64")]
    max_windows: usize,
}

impl ImportArgs {
    pub async fn run(self) -> Result {
        let window = TimeDelta::from_std(self.window.into()).context("the window is too long")?;
        let db = self.db.connect().await?;
        let store = db.statistics().await?;
        let importer = Importer::builder()
            .smartmeter(self.account.new_client()?)
            .store(store)
            .metering_point(self.metering_point)
            .value_type(self.granularity.into())
            .window(window)
            .max_windows(self.max_windows)
            .build();
        let result = match self.interval {
            Some(period) => run_forever(importer, period.into()).await,
            None => run_once(importer).await,
        };
        db.shutdown().await;
        result
    }
}

async fn run_once<S: StatisticsStore>(mut importer: Importer<S>) -> Result {
    let outcome = importer.run_cycle().await.context("import cycle failed")?;
    log_outcome(&outcome);
    Ok(())
}

/// Run the cycles until interrupted or terminated.
///
/// A failed cycle marks the metering point unavailable until the next successful one.
async fn run_forever<S: StatisticsStore>(mut importer: Importer<S>, period: Duration) -> Result {
    let mut shutdown = Shutdown::install()?;
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut is_available = true;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            () = shutdown.wait() => break,
        }
        match importer.run_cycle().await {
            Ok(outcome) => {
                if !is_available {
                    info!("metering point is available again");
                    is_available = true;
                }
                log_outcome(&outcome);
            }
            Err(error) => {
                error!("import cycle failed: {error:#}");
                if is_available {
                    warn!("metering point is unavailable until the next successful cycle");
                    is_available = false;
                }
            }
        }
    }
    Ok(())
}

/// Ctrl+C and, on Unix, SIGTERM.
///
/// Signals received while a cycle is running are kept until the next [`Shutdown::wait`].
struct Shutdown {
    #[cfg(unix)]
    interrupt: Signal,

    #[cfg(unix)]
    terminate: Signal,
}

impl Shutdown {
    #[cfg(unix)]
    fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())
                .context("failed to install the interrupt handler")?,
            terminate: signal(SignalKind::terminate())
                .context("failed to install the termination handler")?,
        })
    }

    #[cfg(not(unix))]
    #[expect(clippy::unnecessary_wraps)]
    fn install() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn wait(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("interrupted"),
            _ = self.terminate.recv() => info!("terminated"),
        }
    }

    #[cfg(not(unix))]
    async fn wait(&mut self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupted"),
            Err(error) => error!("failed to listen for Ctrl+C: {error:#}"),
        }
    }
}

fn log_outcome(outcome: &ImportOutcome) {
    match outcome {
        ImportOutcome::Inactive => warn!("metering point is inactive"),
        ImportOutcome::UpToDate { last } => info!(end = %last.end, sum = last.sum, "up to date"),
        ImportOutcome::Imported { windows, points, sum, stopped_early } => {
            info!(windows, points, sum, stopped_early, "import cycle completed");
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Granularity {
    /// 15-minute readings, bucketed by hour.
    QuarterHour,

    /// Daily readings.
    Day,
}

impl From<Granularity> for ValueType {
    fn from(granularity: Granularity) -> Self {
        match granularity {
            Granularity::QuarterHour => Self::QuarterHour,
            Granularity::Day => Self::Day,
        }
    }
}
