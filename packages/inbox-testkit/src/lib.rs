mod error;

pub use error::{Error, Result};

use std::{env, future::Future, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

pub const DSN_ENV: &str = "INBOX_PG_DSN";

const ADMIN_DATABASES: &[&str] = &["postgres", "template1"];

/// A uniquely named database on the server behind [`DSN_ENV`], dropped on cleanup or drop.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|source| Error::InvalidDsn { env: DSN_ENV, source })?;
		let (admin, mut conn) = admin_connection(&base).await?;
		let name = format!("inbox_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await.map_err(|source| {
			Error::Lifecycle { action: "create", name: name.clone(), source }
		})?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.drop_now().await
	}

	async fn drop_now(&mut self) -> Result<()> {
		if !self.dropped {
			drop_database(&self.name, &self.admin).await?;

			self.dropped = true;
		}

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let admin = self.admin.clone();

		// Drop cannot await; clean up on a dedicated runtime thread.
		let _ = thread::spawn(move || {
			let outcome = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| err.to_string())
				.and_then(|runtime| {
					runtime.block_on(drop_database(&name, &admin)).map_err(|err| err.to_string())
				});

			if let Err(err) = outcome {
				eprintln!("Leaked test database {name:?}: {err}.");
			}
		})
		.join();
	}
}

pub fn env_dsn() -> Option<String> {
	env::var(DSN_ENV).ok().filter(|dsn| !dsn.trim().is_empty())
}

/// Runs `f` against a fresh database and drops it afterwards. A cleanup failure only fails the
/// run when `f` itself succeeded.
pub async fn with_test_db<F, Fut, T>(base_dsn: &str, f: F) -> Result<T>
where
	F: FnOnce(&TestDatabase) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut db = TestDatabase::new(base_dsn).await?;
	let result = f(&db).await;

	match (db.drop_now().await, result) {
		(Err(err), Ok(_)) => Err(err),
		(Err(err), Err(run_err)) => {
			eprintln!("Test database cleanup also failed: {err}.");

			Err(run_err)
		},
		(Ok(()), result) => result,
	}
}

async fn admin_connection(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last = String::new();

	for database in ADMIN_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => last = err.to_string(),
		}
	}

	Err(Error::AdminUnavailable { tried: ADMIN_DATABASES, last })
}

async fn drop_database(name: &str, admin: &PgConnectOptions) -> Result<()> {
	let lifecycle =
		|source| Error::Lifecycle { action: "drop", name: name.to_string(), source };
	let mut conn = PgConnection::connect_with(admin).await.map_err(lifecycle)?;

	// Pools from the test may still hold sessions.
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;

	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str())
		.await
		.map_err(lifecycle)?;

	Ok(())
}
