use serde::{Deserialize, Serialize};

use inbox_config::KeywordTable;

pub const NEGATIVE_SCORE: f32 = 0.8;
pub const QUESTION_SCORE: f32 = 0.7;
pub const POSITIVE_SCORE: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
	Low,
	Normal,
	High,
}
impl Priority {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"high" => Some(Self::High),
			"normal" => Some(Self::Normal),
			"low" => Some(Self::Low),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::High => "high",
			Self::Normal => "normal",
			Self::Low => "low",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
	Negative,
	Question,
	Positive,
}
impl Sentiment {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Negative => "negative",
			Self::Question => "question",
			Self::Positive => "positive",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTags {
	/// Matched tags in table order. Never empty.
	pub categories: Vec<String>,
	pub primary_category: String,
	pub priority: Priority,
}
impl MessageTags {
	/// The agent-editable tag string stored next to the record.
	pub fn joined(&self) -> String {
		self.categories.join(",")
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentResult {
	pub sentiment: Sentiment,
	pub score: f32,
	pub is_question: bool,
	pub contains_complaint: bool,
}
impl SentimentResult {
	/// Negative comments need attention first.
	pub fn comment_priority(&self) -> Priority {
		match self.sentiment {
			Sentiment::Negative => Priority::High,
			Sentiment::Question | Sentiment::Positive => Priority::Normal,
		}
	}
}

#[derive(Debug, Clone)]
struct TagRule {
	name: String,
	priority: Priority,
	keywords: Vec<String>,
}

/// Keyword classifier built once from a validated table and shared read-only.
#[derive(Debug, Clone)]
pub struct Classifier {
	version: String,
	fallback_tag: String,
	story_reply_tag: String,
	rules: Vec<TagRule>,
	negative: Vec<String>,
	question: Vec<String>,
}
impl Classifier {
	pub fn new(table: &KeywordTable) -> Self {
		let rules = table
			.tags
			.iter()
			.map(|tag| TagRule {
				name: tag.name.clone(),
				priority: Priority::parse(&tag.priority).unwrap_or(Priority::Normal),
				keywords: tag.keywords.iter().map(|keyword| keyword.to_lowercase()).collect(),
			})
			.collect();

		Self {
			version: table.version.clone(),
			fallback_tag: table.fallback_tag.clone(),
			story_reply_tag: table.story_reply_tag.clone(),
			rules,
			negative: table.sentiment.negative.iter().map(|kw| kw.to_lowercase()).collect(),
			question: table.sentiment.question.iter().map(|kw| kw.to_lowercase()).collect(),
		}
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	pub fn fallback_tag(&self) -> &str {
		&self.fallback_tag
	}

	/// Every tag the classifier can emit, in table order, fallback last.
	pub fn tag_names(&self) -> Vec<String> {
		let mut names = self.rules.iter().map(|rule| rule.name.clone()).collect::<Vec<_>>();

		for tag in [&self.story_reply_tag, &self.fallback_tag] {
			if !names.contains(tag) {
				names.push(tag.clone());
			}
		}

		names
	}

	pub fn tag_message(&self, text: &str, is_story_reply: bool) -> MessageTags {
		if is_story_reply {
			return MessageTags {
				categories: vec![self.story_reply_tag.clone()],
				primary_category: self.story_reply_tag.clone(),
				priority: Priority::Low,
			};
		}

		let lowered = text.to_lowercase();
		let matched = self
			.rules
			.iter()
			.filter(|rule| rule.keywords.iter().any(|keyword| lowered.contains(keyword.as_str())))
			.collect::<Vec<_>>();
		let Some(first) = matched.first() else {
			return MessageTags {
				categories: vec![self.fallback_tag.clone()],
				primary_category: self.fallback_tag.clone(),
				priority: Priority::Normal,
			};
		};
		let priority =
			matched.iter().map(|rule| rule.priority).max().unwrap_or(Priority::Normal);

		MessageTags {
			categories: matched.iter().map(|rule| rule.name.clone()).collect(),
			primary_category: first.name.clone(),
			priority,
		}
	}

	pub fn sentiment(&self, text: &str) -> SentimentResult {
		let lowered = text.to_lowercase();

		if contains_any(&lowered, &self.negative) {
			return SentimentResult {
				sentiment: Sentiment::Negative,
				score: NEGATIVE_SCORE,
				is_question: false,
				contains_complaint: true,
			};
		}
		if contains_any(&lowered, &self.question) {
			return SentimentResult {
				sentiment: Sentiment::Question,
				score: QUESTION_SCORE,
				is_question: true,
				contains_complaint: false,
			};
		}

		SentimentResult {
			sentiment: Sentiment::Positive,
			score: POSITIVE_SCORE,
			is_question: false,
			contains_complaint: false,
		}
	}
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
	keywords.iter().any(|keyword| text.contains(keyword.as_str()))
}

#[cfg(test)]
mod tests {
	use inbox_config::{SentimentKeywords, TagKeywords};

	use super::*;

	fn table() -> KeywordTable {
		KeywordTable {
			version: "t1".to_string(),
			fallback_tag: "Kundenservice".to_string(),
			story_reply_tag: "Feedback".to_string(),
			tags: vec![
				TagKeywords {
					name: "Reklamation".to_string(),
					priority: "high".to_string(),
					keywords: vec!["kaputt".to_string()],
				},
				TagKeywords {
					name: "Feedback".to_string(),
					priority: "normal".to_string(),
					keywords: vec!["danke".to_string()],
				},
			],
			sentiment: SentimentKeywords {
				negative: vec!["schlecht".to_string()],
				question: vec!["?".to_string()],
			},
		}
	}

	#[test]
	fn all_matches_are_kept_in_table_order() {
		let classifier = Classifier::new(&table());
		let tags = classifier.tag_message("Danke, aber der Reißverschluss ist KAPUTT", false);

		assert_eq!(tags.categories, vec!["Reklamation".to_string(), "Feedback".to_string()]);
		assert_eq!(tags.primary_category, "Reklamation");
		assert_eq!(tags.priority, Priority::High);
		assert_eq!(tags.joined(), "Reklamation,Feedback");
	}

	#[test]
	fn empty_text_falls_back() {
		let tags = Classifier::new(&table()).tag_message("", false);

		assert_eq!(tags.categories, vec!["Kundenservice".to_string()]);
		assert_eq!(tags.priority, Priority::Normal);
	}

	#[test]
	fn tag_names_end_with_fallback() {
		assert_eq!(
			Classifier::new(&table()).tag_names(),
			vec!["Reklamation".to_string(), "Feedback".to_string(), "Kundenservice".to_string()]
		);
	}

	#[test]
	fn priority_orders_high_above_low() {
		assert!(Priority::High > Priority::Normal);
		assert!(Priority::Normal > Priority::Low);
		assert_eq!(Priority::parse(" HIGH "), Some(Priority::High));
		assert_eq!(Priority::parse("urgent"), None);
	}
}
