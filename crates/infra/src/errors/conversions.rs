//! Conversions from external infrastructure errors into domain errors.

use pacegate_domain::PaceGateError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PaceGateError);

impl From<InfraError> for PaceGateError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PaceGateError> for InfraError {
    fn from(value: PaceGateError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoPaceGateError {
    fn into_pacegate(self) -> PaceGateError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → PaceGateError */
/* -------------------------------------------------------------------------- */

impl IntoPaceGateError for SqlError {
    fn into_pacegate(self) -> PaceGateError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => PaceGateError::Storage("database is busy".into()),
                    ErrorCode::DatabaseLocked => {
                        PaceGateError::Storage("database is locked".into())
                    }
                    ErrorCode::DiskFull => PaceGateError::Storage("disk is full".into()),
                    ErrorCode::ReadOnly => {
                        PaceGateError::Storage("database is read-only".into())
                    }
                    _ => PaceGateError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => PaceGateError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                PaceGateError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                PaceGateError::Storage(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => PaceGateError::Storage(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => PaceGateError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_pacegate())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → PaceGateError */
/* -------------------------------------------------------------------------- */

impl IntoPaceGateError for r2d2::Error {
    fn into_pacegate(self) -> PaceGateError {
        PaceGateError::Storage(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_pacegate())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PaceGateError */
/* -------------------------------------------------------------------------- */

impl IntoPaceGateError for HttpError {
    fn into_pacegate(self) -> PaceGateError {
        if self.is_timeout() {
            return PaceGateError::provider("HTTP request timed out");
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return PaceGateError::provider("HTTP connection failure");
        }

        if self.is_builder() {
            return PaceGateError::Config(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => PaceGateError::AuthExpired(message),
                429 => PaceGateError::RateLimited(message),
                _ => PaceGateError::Provider { status: Some(code), message },
            };
        }

        if self.is_decode() {
            return PaceGateError::provider(format!("invalid response body: {self}"));
        }

        PaceGateError::provider(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_pacegate())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
