pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_inbound_messages.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_inbound_messages.sql")),
				"tables/002_ad_comments.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_ad_comments.sql")),
				"tables/003_blacklist.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_blacklist.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn includes_are_expanded() {
		let sql = render_schema();

		assert!(!sql.contains("\\ir "));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS inbound_messages"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS ad_comments"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS blacklist"));
	}
}
