pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Malformed payload: {message}")]
	MalformedPayload { message: String },
	#[error("Unauthorized: {message}")]
	Unauthorized { message: String },
	#[error("Forbidden: {message}")]
	Forbidden { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<inbox_storage::Error> for Error {
	fn from(err: inbox_storage::Error) -> Self {
		match err {
			inbox_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			inbox_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			inbox_storage::Error::NotFound(message) => Self::NotFound { message },
		}
	}
}

impl From<inbox_providers::Error> for Error {
	fn from(err: inbox_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
