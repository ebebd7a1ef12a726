//! The opaque payload handed out by `GetFlightInfo`/`ListFlights` and redeemed
//! by `DoGet`. Encoded with `serde_json` rather than a hand-rolled protobuf
//! message (§9 Open Question (d)): no `.proto` compilation step is part of
//! this build, and the ticket never appears in the wire-visible Flight
//! protobuf schema, only inside its opaque `ticket` byte field.

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum TicketError {
    #[snafu(display("malformed ticket: {source}"))]
    Decode { source: serde_json::Error },
}

/// `ScanOptions` flattened into a form that round-trips through JSON; see
/// `data_types::ScanOptions` for the live version handlers construct from
/// this plus any session context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOptionsWire {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Identifies a scan to perform: which table, and with what options.
/// Tickets are idempotent and carry no server-side state of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub scan: ScanOptionsWire,
}

impl Ticket {
    pub fn new(catalog: impl Into<String>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
            scan: ScanOptionsWire::default(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Ticket serialization is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TicketError> {
        serde_json::from_slice(bytes).context(DecodeSnafu)
    }

    pub fn to_flight_ticket(&self) -> arrow_flight::Ticket {
        arrow_flight::Ticket {
            ticket: self.encode().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut ticket = Ticket::new("main", "public", "users");
        ticket.scan.columns = vec!["id".into(), "name".into()];
        ticket.scan.limit = Some(10);

        let decoded = Ticket::decode(&ticket.encode()).unwrap();
        assert_eq!(decoded.catalog, "main");
        assert_eq!(decoded.table, "users");
        assert_eq!(decoded.scan.columns, vec!["id", "name"]);
        assert_eq!(decoded.scan.limit, Some(10));
    }

    #[test]
    fn malformed_bytes_are_a_decode_error() {
        assert!(Ticket::decode(b"not json").is_err());
    }
}
