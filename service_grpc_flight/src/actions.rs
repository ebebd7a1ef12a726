//! `DoAction`/`ListActions` control plane (§4.5): a string-keyed dispatch
//! over the transaction registry, scoped to whichever catalog the dispatcher
//! routed this call to.

use arrow_flight::{ActionType, Result as FlightResult};
use catalog::TransactionRegistry;
use data_types::AirportError;

pub const BEGIN_TRANSACTION: &str = "begin_transaction";
pub const COMMIT_TRANSACTION: &str = "commit_transaction";
pub const ROLLBACK_TRANSACTION: &str = "rollback_transaction";
pub const GET_TRANSACTION_STATUS: &str = "get_transaction_status";
/// Client-extension alias for `begin_transaction`.
pub const CREATE_TRANSACTION: &str = "create_transaction";
/// Returns the ZStandard-compressed `GetTables` batch (§4.2). Dispatched
/// directly by `AirportFlightService::do_action_impl`, not by [`dispatch`],
/// since it needs catalog access rather than just the transaction registry.
pub const GET_TABLES: &str = "get_tables";
/// Returns the ZStandard-compressed function-discovery batch (§4.2), the
/// same catalog-discovery story as `GET_TABLES` but for scalar and table
/// functions. Dispatched directly by `AirportFlightService::do_action_impl`.
pub const GET_FUNCTIONS: &str = "get_functions";

pub fn list() -> Vec<ActionType> {
    vec![
        ActionType {
            r#type: GET_TABLES.to_string(),
            description: "Returns the ZStandard-compressed GetTables Arrow IPC batch".to_string(),
        },
        ActionType {
            r#type: GET_FUNCTIONS.to_string(),
            description: "Returns the ZStandard-compressed function-discovery Arrow IPC batch"
                .to_string(),
        },
        ActionType {
            r#type: BEGIN_TRANSACTION.to_string(),
            description: "Starts a new transaction, returning its id".to_string(),
        },
        ActionType {
            r#type: COMMIT_TRANSACTION.to_string(),
            description: "Commits the transaction named by the request body".to_string(),
        },
        ActionType {
            r#type: ROLLBACK_TRANSACTION.to_string(),
            description: "Rolls back the transaction named by the request body".to_string(),
        },
        ActionType {
            r#type: GET_TRANSACTION_STATUS.to_string(),
            description: "Returns active/committed/aborted/unknown for a transaction id"
                .to_string(),
        },
        ActionType {
            r#type: CREATE_TRANSACTION.to_string(),
            description: "Alias for begin_transaction".to_string(),
        },
    ]
}

fn transaction_id_from_body(body: &[u8]) -> Result<String, AirportError> {
    std::str::from_utf8(body)
        .map(str::to_string)
        .map_err(|_| AirportError::InvalidArgument {
            message: "transaction id body is not valid UTF-8".to_string(),
        })
}

pub fn dispatch(
    catalog_name: &str,
    transactions: &dyn TransactionRegistry,
    action_type: &str,
    body: &[u8],
) -> Result<FlightResult, AirportError> {
    match action_type {
        BEGIN_TRANSACTION | CREATE_TRANSACTION => {
            let tx = transactions.begin(catalog_name);
            Ok(FlightResult {
                body: tx.id.into_bytes().into(),
            })
        }
        COMMIT_TRANSACTION => {
            let id = transaction_id_from_body(body)?;
            transactions.commit(&id)?;
            Ok(FlightResult {
                body: Vec::new().into(),
            })
        }
        ROLLBACK_TRANSACTION => {
            let id = transaction_id_from_body(body)?;
            transactions.rollback(&id)?;
            Ok(FlightResult {
                body: Vec::new().into(),
            })
        }
        GET_TRANSACTION_STATUS => {
            let id = transaction_id_from_body(body)?;
            let status = transactions
                .status(&id)
                .map(|tx| tx.state.as_str())
                .unwrap_or("unknown");
            Ok(FlightResult {
                body: status.as_bytes().to_vec().into(),
            })
        }
        other => Err(AirportError::Unimplemented {
            action: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use catalog::InMemoryTransactionRegistry;

    use super::*;

    #[test]
    fn begin_then_commit_then_status_round_trips() {
        let registry = InMemoryTransactionRegistry::new();

        let begin = dispatch("main", &registry, BEGIN_TRANSACTION, b"").unwrap();
        let id = String::from_utf8(begin.body.to_vec()).unwrap();

        dispatch("main", &registry, COMMIT_TRANSACTION, id.as_bytes()).unwrap();

        let status = dispatch("main", &registry, GET_TRANSACTION_STATUS, id.as_bytes()).unwrap();
        assert_eq!(status.body.as_ref(), b"committed");
    }

    #[test]
    fn unknown_action_is_unimplemented() {
        let registry = InMemoryTransactionRegistry::new();
        let err = dispatch("main", &registry, "frobnicate", b"").unwrap_err();
        assert!(matches!(err, AirportError::Unimplemented { .. }));
    }

    #[test]
    fn status_of_unknown_transaction_is_the_string_unknown() {
        let registry = InMemoryTransactionRegistry::new();
        let status = dispatch(
            "main",
            &registry,
            GET_TRANSACTION_STATUS,
            b"00000000-0000-0000-0000-000000000000",
        )
        .unwrap();
        assert_eq!(status.body.as_ref(), b"unknown");
    }
}
