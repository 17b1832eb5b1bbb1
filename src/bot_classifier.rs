//! Bot classification (C3): a fixed catalog of known LLM-related bots,
//! matched against a user-agent string by whole-word, case-insensitive
//! substring. Grounded on `cloudflare/filters.py`'s `LLM_BOT_NAMES`
//! reference and the verified-bot filter it builds from that list.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCategory {
	Training,
	UserRequest,
}

#[derive(Debug, Clone, Copy)]
pub struct BotPattern {
	pub name: &'static str,
	pub provider: &'static str,
	pub category: BotCategory,
}

/// The fixed bot catalog. Order does not matter for classification since
/// every user agent is checked against every pattern and the first match
/// wins, but duplicate substrings (e.g. none currently) would make order
/// significant.
pub static BOT_CATALOG: &[BotPattern] = &[
	BotPattern { name: "GPTBot", provider: "openai", category: BotCategory::Training },
	BotPattern { name: "ChatGPT-User", provider: "openai", category: BotCategory::UserRequest },
	BotPattern { name: "CCBot", provider: "commoncrawl", category: BotCategory::Training },
	BotPattern { name: "anthropic-ai", provider: "anthropic", category: BotCategory::Training },
	BotPattern { name: "ClaudeBot", provider: "anthropic", category: BotCategory::Training },
	BotPattern { name: "Google-Extended", provider: "google", category: BotCategory::Training },
	BotPattern { name: "PerplexityBot", provider: "perplexity", category: BotCategory::Training },
	BotPattern { name: "Bytespider", provider: "bytedance", category: BotCategory::Training },
	BotPattern { name: "Amazonbot", provider: "amazon", category: BotCategory::Training },
	BotPattern { name: "Applebot-Extended", provider: "apple", category: BotCategory::Training },
];

struct CompiledPattern {
	regex: Regex,
	pattern: BotPattern,
}

static COMPILED_CATALOG: Lazy<Vec<CompiledPattern>> = Lazy::new(|| {
	BOT_CATALOG
		.iter()
		.map(|&pattern| {
			let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(pattern.name)))
				.expect("bot pattern is a valid regex");
			CompiledPattern { regex, pattern }
		})
		.collect()
});

/// Classify a user-agent string against the fixed bot catalog. Returns the
/// first matching [`BotPattern`], or `None` if the user agent does not
/// match any known LLM-related bot.
pub fn classify(user_agent: &str) -> Option<BotPattern> {
	COMPILED_CATALOG
		.iter()
		.find(|compiled| compiled.regex.is_match(user_agent))
		.map(|compiled| compiled.pattern)
}

/// `true` if `user_agent` matches any entry in the bot catalog.
pub fn is_known_bot(user_agent: &str) -> bool {
	classify(user_agent).is_some()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matches_known_bots_case_insensitively() {
		let matched = classify("Mozilla/5.0 (compatible; gptbot/1.0; +https://openai.com/gptbot)").unwrap();
		assert_eq!(matched.name, "GPTBot");
		assert_eq!(matched.provider, "openai");
	}

	#[test]
	fn word_boundary_prevents_substring_false_positive() {
		assert!(classify("Mozilla/5.0 MyGPTBotExtension/2.0").is_none());
	}

	#[test]
	fn ordinary_browser_is_not_a_bot() {
		assert!(!is_known_bot(
			"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
		));
	}

	#[test]
	fn claudebot_and_anthropic_ai_are_distinct_entries() {
		assert_eq!(classify("ClaudeBot/1.0").unwrap().name, "ClaudeBot");
		assert_eq!(classify("anthropic-ai").unwrap().name, "anthropic-ai");
	}
}
