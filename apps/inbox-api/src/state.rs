use std::sync::Arc;

use inbox_service::InboxService;
use inbox_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<InboxService>,
}
impl AppState {
	pub async fn new(config: inbox_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let service = InboxService::new(config, db);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: InboxService) -> Self {
		Self { service: Arc::new(service) }
	}
}
