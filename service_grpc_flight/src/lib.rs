//! Arrow Flight RPC surface for the airport server: a per-catalog handler
//! (`AirportFlightService`), the multi-catalog dispatcher in front of it
//! (`MultiCatalogFlightService`), the ticket codec, and the catalog
//! serializer.
//!
//! The pinned `arrow-flight` dependency predates `PollFlightInfo`, so that
//! verb is not part of the trait surface implemented here (§4.4).

mod actions;
mod dispatch;
mod service;
mod serializer;
mod ticket;

pub use actions::{
    BEGIN_TRANSACTION, COMMIT_TRANSACTION, CREATE_TRANSACTION, GET_TABLES,
    GET_TRANSACTION_STATUS, ROLLBACK_TRANSACTION,
};
pub use dispatch::{DispatchError, MultiCatalogFlightService, MultiCatalogFlightServiceBuilder};
pub use serializer::{
    build_catalog_batch, compress, decompress, get_tables_schema, serialize_catalog,
    SerializeError,
};
pub use service::{AirportFlightService, DmlOperation, DoPutCommand};
pub use ticket::{ScanOptionsWire, Ticket, TicketError};

pub type HandshakeStream =
    futures::stream::BoxStream<'static, Result<arrow_flight::HandshakeResponse, tonic::Status>>;
pub type ListFlightsStream =
    futures::stream::BoxStream<'static, Result<arrow_flight::FlightInfo, tonic::Status>>;
pub type DoGetStream =
    futures::stream::BoxStream<'static, Result<arrow_flight::FlightData, tonic::Status>>;
pub type DoPutStream =
    futures::stream::BoxStream<'static, Result<arrow_flight::PutResult, tonic::Status>>;
pub type DoActionStream =
    futures::stream::BoxStream<'static, Result<arrow_flight::Result, tonic::Status>>;
pub type ListActionsStream =
    futures::stream::BoxStream<'static, Result<arrow_flight::ActionType, tonic::Status>>;
pub type DoExchangeStream =
    futures::stream::BoxStream<'static, Result<arrow_flight::FlightData, tonic::Status>>;
