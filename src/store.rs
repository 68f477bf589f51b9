use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Generations allowed per user per calendar day.
pub const DAILY_LIMIT: u32 = 20;
/// Most-recent-first history entries kept per user.
pub const HISTORY_CAP: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One completed generation, for the recent-history panel.
pub struct GenerationRecord {
    pub prompt: String,
    pub created_at: String,
    pub variations: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsageRecord {
    date: String,
    count: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    usage: HashMap<String, UsageRecord>,
    history: HashMap<String, Vec<GenerationRecord>>,
}

/// Per-user usage quota and generation history, persisted as JSON in the
/// platform data directory. A malformed file is discarded and replaced
/// with fresh defaults on read; it never aborts the app.
pub struct Store {
    path: Option<PathBuf>,
    data: StoreData,
}

impl Store {
    pub fn open() -> Self {
        Self::open_at(default_path())
    }

    pub fn open_at(path: Option<PathBuf>) -> Self {
        let data = path
            .as_deref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        Self { path, data }
    }

    /// Generations the user has left today.
    pub fn remaining(&self, user: &str) -> u32 {
        self.remaining_on(user, today())
    }

    pub fn remaining_on(&self, user: &str, date: NaiveDate) -> u32 {
        let used = self
            .data
            .usage
            .get(user)
            .filter(|rec| rec.date == date_key(date))
            .map(|rec| rec.count)
            .unwrap_or(0);
        DAILY_LIMIT.saturating_sub(used)
    }

    /// Charges one use against today's quota. Called once per generate
    /// action, before the batch is issued, regardless of how many
    /// variations it requests or how many succeed.
    pub fn record_use(&mut self, user: &str) {
        self.record_use_on(user, today());
    }

    pub fn record_use_on(&mut self, user: &str, date: NaiveDate) {
        let key = date_key(date);
        let rec = self.data.usage.entry(user.to_string()).or_default();
        if rec.date != key {
            // Day rolled over since the last use.
            rec.date = key;
            rec.count = 0;
        }
        rec.count += 1;
        self.save();
    }

    /// Prepends a history entry, evicting the oldest beyond the cap.
    pub fn push_history(&mut self, user: &str, record: GenerationRecord) {
        let entries = self.data.history.entry(user.to_string()).or_default();
        entries.insert(0, record);
        entries.truncate(HISTORY_CAP);
        self.save();
    }

    /// Most-recent-first history for the user.
    pub fn recent(&self, user: &str) -> &[GenerationRecord] {
        self.data
            .history
            .get(user)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn save(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(&self.data) {
            let _ = std::fs::write(path, json);
        }
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("imagespark").join("store.json"))
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "imagespark-store-{}-{}.json",
            tag,
            std::process::id()
        ))
    }

    fn record(prompt: &str) -> GenerationRecord {
        GenerationRecord {
            prompt: prompt.to_string(),
            created_at: "2026-08-29T12:00:00+00:00".to_string(),
            variations: 2,
        }
    }

    #[test]
    fn quota_counts_down_and_resets_daily() {
        let mut store = Store::open_at(None);
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();

        assert_eq!(store.remaining_on("ada", monday), DAILY_LIMIT);
        store.record_use_on("ada", monday);
        store.record_use_on("ada", monday);
        assert_eq!(store.remaining_on("ada", monday), DAILY_LIMIT - 2);

        // A new day starts the counter over.
        assert_eq!(store.remaining_on("ada", tuesday), DAILY_LIMIT);
        store.record_use_on("ada", tuesday);
        assert_eq!(store.remaining_on("ada", tuesday), DAILY_LIMIT - 1);

        // Other users are independent.
        assert_eq!(store.remaining_on("grace", tuesday), DAILY_LIMIT);
    }

    #[test]
    fn history_is_bounded_and_most_recent_first() {
        let mut store = Store::open_at(None);
        for i in 0..25 {
            store.push_history("ada", record(&format!("prompt-{i}")));
        }
        let entries = store.recent("ada");
        assert_eq!(entries.len(), HISTORY_CAP);
        assert_eq!(entries[0].prompt, "prompt-24");
        assert_eq!(entries.last().unwrap().prompt, "prompt-5");
        assert!(store.recent("grace").is_empty());
    }

    #[test]
    fn corrupt_store_file_is_discarded() {
        let path = scratch_path("corrupt");
        std::fs::write(&path, "{ not json").unwrap();
        let store = Store::open_at(Some(path.clone()));
        assert_eq!(store.remaining("ada"), DAILY_LIMIT);
        assert!(store.recent("ada").is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn state_survives_a_round_trip_to_disk() {
        let path = scratch_path("roundtrip");
        let _ = std::fs::remove_file(&path);
        let day = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        {
            let mut store = Store::open_at(Some(path.clone()));
            store.record_use_on("ada", day);
            store.push_history("ada", record("sunset over water"));
        }
        let reopened = Store::open_at(Some(path.clone()));
        assert_eq!(reopened.remaining_on("ada", day), DAILY_LIMIT - 1);
        assert_eq!(reopened.recent("ada")[0].prompt, "sunset over water");
        let _ = std::fs::remove_file(path);
    }
}
