//! Client for the Wiener Netze smart meter portal.
//!
//! The portal has no public API: [`Smartmeter::login`] walks the browser login flow
//! to obtain a bearer token together with the two gateway API keys, after which the
//! query methods call the B2C, B2B and legacy service APIs. [`Importer`] turns the
//! movement data of a metering point into an hourly cumulative statistic and appends
//! it to a [`StatisticsStore`].

mod auth;
mod client;
mod consumption;
mod endpoints;
mod error;
mod event;
mod historical;
mod importer;
mod metering_point;
mod movement;
mod prelude;
mod statistics;
mod timestamp;
mod unit;

#[cfg(test)]
mod testing;

pub use self::{
    auth::{ApiKeySource, Credentials},
    client::{ClientOptions, Smartmeter},
    consumption::{Consumption, ConsumptionStatistics, ConsumptionValue, Resolution},
    endpoints::Endpoints,
    error::{Error, QueryError, Result},
    event::{Event, EventKind},
    historical::{MeasurementChannel, MeasurementValue, VALID_OBIS_CODES, ValueType},
    importer::{ImportOutcome, Importer, WindowOutcome, aggregate::Aggregation},
    metering_point::{
        Address,
        Contract,
        GranularityStatus,
        IdexStatus,
        Installation,
        InstallationType,
        MeteringPoint,
        ResolvedMeteringPoint,
    },
    movement::{MovementData, MovementDescriptor, MovementValue, RoleType},
    statistics::{LastPoint, SeriesId, SeriesMetadata, StatisticPoint, StatisticsStore},
    unit::Unit,
};
