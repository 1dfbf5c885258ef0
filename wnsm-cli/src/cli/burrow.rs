use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use wnsm::{Event, Resolution, Smartmeter, ValueType};

use crate::{
    cli::{account::AccountArgs, import::Granularity},
    prelude::*,
    tables::build_metering_points_table,
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[clap(flatten)]
    account: AccountArgs,

    /// Defaults to the first metering point of the first contract.
    #[clap(long = "metering-point", env = "WNSM_METERING_POINT")]
    metering_point: Option<String>,

    #[command(subcommand)]
    command: BurrowCommand,
}

impl BurrowArgs {
    #[instrument(skip_all)]
    pub async fn run(self) -> Result {
        let mut smartmeter = self.account.new_client()?;
        smartmeter.login().await.context("failed to log in")?;
        self.command.run(&smartmeter, self.metering_point.as_deref()).await
    }
}

#[derive(Subcommand)]
enum BurrowCommand {
    /// List the contracts and their metering points.
    MeteringPoints,

    /// Profile of the logged-in user.
    Profile,

    /// Consumption of a single day.
    Consumption {
        #[clap(long)]
        date: NaiveDate,

        #[clap(long, default_value = "hour")]
        resolution: ConsumptionResolution,
    },

    /// Daily consumption over a period.
    ConsumptionRaw {
        #[clap(long)]
        from: NaiveDate,

        #[clap(long)]
        until: Option<NaiveDate>,
    },

    /// Historical values of the first register with a valid OBIS code.
    Historical {
        #[clap(long)]
        from: Option<NaiveDate>,

        #[clap(long)]
        until: Option<NaiveDate>,

        #[clap(long, default_value = "quarter-hour")]
        value_type: HistoricalValueType,
    },

    /// Movement data, the source of the import.
    Movement {
        #[clap(long)]
        from: Option<NaiveDate>,

        #[clap(long)]
        until: Option<NaiveDate>,

        #[clap(long, default_value = "quarter-hour")]
        granularity: Granularity,
    },

    /// Meter reading in kilowatt-hours at the start of the range.
    MeterReading {
        #[clap(long)]
        from: NaiveDate,

        #[clap(long)]
        until: NaiveDate,
    },

    /// Events of the metering point.
    Events {
        #[clap(long)]
        from: NaiveDate,

        #[clap(long)]
        until: Option<NaiveDate>,
    },

    /// Create an event: a point in time without `--end`, a time span otherwise.
    CreateEvent {
        #[clap(long)]
        name: String,

        #[clap(long)]
        start: DateTime<Utc>,

        #[clap(long)]
        end: Option<DateTime<Utc>>,
    },

    DeleteEvent {
        #[clap(long)]
        id: String,
    },
}

impl BurrowCommand {
    async fn run(self, smartmeter: &Smartmeter, metering_point: Option<&str>) -> Result {
        match self {
            Self::MeteringPoints => {
                let contracts = smartmeter.metering_points().await?;
                info!(n_contracts = contracts.len(), "gotcha");
                println!("{}", build_metering_points_table(&contracts));
            }
            Self::Profile => print_json(&smartmeter.profile().await?)?,
            Self::Consumption { date, resolution } => {
                let consumption = smartmeter
                    .consumption(metering_point, midnight(date), resolution.into())
                    .await?;
                print_json(&consumption)?;
            }
            Self::ConsumptionRaw { from, until } => {
                let consumption = smartmeter
                    .consumption_raw(metering_point, midnight(from), until.map(midnight))
                    .await?;
                print_json(&consumption)?;
            }
            Self::Historical { from, until, value_type } => {
                let channel = smartmeter
                    .historical_data(metering_point, from, until, value_type.into())
                    .await?;
                info!(obis_code = ?channel.obis_code, n_values = channel.values.len(), "gotcha");
                print_json(&channel)?;
            }
            Self::Movement { from, until, granularity } => {
                let data = smartmeter
                    .movement_data(metering_point, from, until, granularity.into())
                    .await?;
                info!(unit = %data.unit()?, n_values = data.values.len(), "gotcha");
                print_json(&data)?;
            }
            Self::MeterReading { from, until } => {
                match smartmeter.meter_reading(metering_point, from, until).await? {
                    Some(reading) => println!("{reading:.3} kWh"),
                    None => warn!("no meter reading available"),
                }
            }
            Self::Events { from, until } => {
                let events =
                    smartmeter.events(metering_point, midnight(from), until.map(midnight)).await?;
                print_json(&events)?;
            }
            Self::CreateEvent { name, start, end } => {
                let resolved = smartmeter.resolve(metering_point).await?;
                let event = Event::new(resolved.id(), name, start, end);
                print_json(&smartmeter.create_event(&event).await?)?;
            }
            Self::DeleteEvent { id } => smartmeter.delete_event(&id).await?,
        }
        Ok(())
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn print_json(value: &impl Serialize) -> Result {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum ConsumptionResolution {
    Hour,
    QuarterHour,
}

impl From<ConsumptionResolution> for Resolution {
    fn from(resolution: ConsumptionResolution) -> Self {
        match resolution {
            ConsumptionResolution::Hour => Self::Hour,
            ConsumptionResolution::QuarterHour => Self::QuarterHour,
        }
    }
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum HistoricalValueType {
    MeterRead,
    Day,
    QuarterHour,
}

impl From<HistoricalValueType> for ValueType {
    fn from(value_type: HistoricalValueType) -> Self {
        match value_type {
            HistoricalValueType::MeterRead => Self::MeterRead,
            HistoricalValueType::Day => Self::Day,
            HistoricalValueType::QuarterHour => Self::QuarterHour,
        }
    }
}
