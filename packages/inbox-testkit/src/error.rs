pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{env} is not a valid Postgres DSN: {source}")]
	InvalidDsn { env: &'static str, source: sqlx::Error },
	#[error("No admin database is reachable (tried {tried:?}): {last}")]
	AdminUnavailable { tried: &'static [&'static str], last: String },
	#[error("Failed to {action} test database {name:?}: {source}")]
	Lifecycle { action: &'static str, name: String, source: sqlx::Error },
}
