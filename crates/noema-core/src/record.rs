//! Memory Record — the sole domain entity.
//!
//! A `#[non_exhaustive]`, camelCase-serde domain struct with a `Default`
//! impl and small derived-property methods, paired with
//! `deny_unknown_fields` request DTOs for the create/update surface.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trigram;

/// A single persisted unit of knowledge.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub content: String,
    /// Lowercased `title + " " + summary + " " + content + " " + joined_tags`,
    /// trimmed; recomputed on every write.
    pub content_normalized: String,
    /// Ordered, case-insensitive-deduplicated, capped at 20.
    pub tags: Vec<String>,
    #[serde(skip)]
    pub trigrams: HashSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub base_strength: f64,
    pub decay_rate: f64,
    pub importance: f64,
    pub is_pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Uuid>,
    #[serde(default)]
    pub superseded_ids: Vec<Uuid>,
    pub valid_from: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub linked_node_ids: HashSet<Uuid>,
}

impl Default for MemoryRecord {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            summary: String::new(),
            content: String::new(),
            content_normalized: String::new(),
            tags: Vec::new(),
            trigrams: HashSet::new(),
            embedding: None,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            base_strength: 1.0,
            decay_rate: 0.1,
            importance: 0.5,
            is_pinned: false,
            expires_at: None,
            is_archived: false,
            superseded_by: None,
            superseded_ids: Vec::new(),
            valid_from: now,
            valid_until: None,
            linked_node_ids: HashSet::new(),
        }
    }
}

impl MemoryRecord {
    /// Build a record from a creation request, enforcing length/tag caps
    /// and computing `content_normalized`/`trigrams`.
    ///
    /// `access_count` starts at 1 rather than 0: creation is itself the
    /// first access, so a record created and then found to be a later
    /// duplicate already carries one access before the duplicate's
    /// reinforcement is applied on top.
    pub fn from_request(req: &CreateMemoryRequest, limits: &StorageLimits) -> Self {
        let mut record = Self {
            title: truncate_chars(&req.title, limits.max_title_length),
            summary: truncate_chars(&req.summary, limits.max_summary_length),
            content: truncate_bytes(&req.content, limits.max_content_bytes),
            tags: dedup_and_cap_tags(&req.tags, limits.max_tags_per_memory),
            importance: req.importance.unwrap_or(0.5).clamp(0.0, 1.0),
            decay_rate: req.decay_rate.unwrap_or(0.1),
            is_pinned: req.is_pinned.unwrap_or(false),
            expires_at: req.expires_at,
            access_count: 1,
            ..Default::default()
        };
        record.recompute_derived_text();
        record
    }

    /// Apply an update request, overwriting only present fields, then
    /// recompute `content_normalized`/`trigrams`.
    pub fn apply_update(&mut self, update: &UpdateMemoryRequest, limits: &StorageLimits) {
        if let Some(title) = &update.title {
            self.title = truncate_chars(title, limits.max_title_length);
        }
        if let Some(summary) = &update.summary {
            self.summary = truncate_chars(summary, limits.max_summary_length);
        }
        if let Some(content) = &update.content {
            self.content = truncate_bytes(content, limits.max_content_bytes);
        }
        if let Some(tags) = &update.tags {
            self.tags = dedup_and_cap_tags(tags, limits.max_tags_per_memory);
        }
        if let Some(importance) = update.importance {
            self.importance = importance.clamp(0.0, 1.0);
        }
        if let Some(decay_rate) = update.decay_rate {
            self.decay_rate = decay_rate;
        }
        if let Some(is_pinned) = update.is_pinned {
            self.is_pinned = is_pinned;
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = Some(expires_at);
        }
        self.recompute_derived_text();
    }

    /// Recompute `content_normalized` and `trigrams` from the current
    /// text fields. Must be called after any mutation of
    /// `title`, `summary`, `content`, or `tags`.
    pub fn recompute_derived_text(&mut self) {
        let joined_tags = self.tags.join(" ");
        let normalized = format!(
            "{} {} {} {}",
            self.title, self.summary, self.content, joined_tags
        )
        .to_lowercase();
        self.content_normalized = normalized.trim().to_string();
        self.trigrams = trigram::trigrams(&self.content_normalized);
    }

    /// `is_current ≡ valid_until is null AND NOT is_archived`.
    pub fn is_current(&self) -> bool {
        self.valid_until.is_none() && !self.is_archived
    }

    /// `is_expired ≡ expires_at is not null AND now > expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now > e).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Exponential decay from `base_strength`, pinned records never decay.
    pub fn current_strength_at(&self, now: DateTime<Utc>) -> f64 {
        if self.is_pinned {
            return self.base_strength;
        }
        let days = (now - self.last_accessed_at).num_milliseconds() as f64
            / (1000.0 * 60.0 * 60.0 * 24.0);
        let days = days.max(0.0);
        let rate = self.decay_rate * (1.0 - self.importance / 2.0);
        self.base_strength * (-rate * days).exp()
    }

    pub fn current_strength(&self) -> f64 {
        self.current_strength_at(Utc::now())
    }

    /// Bumps access count and strength with diminishing returns, and
    /// refreshes `last_accessed_at`.
    pub fn reinforce_at(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.base_strength += 0.1 / (self.access_count as f64).sqrt();
        self.last_accessed_at = now;
    }

    pub fn reinforce(&mut self) {
        self.reinforce_at(Utc::now());
    }

    /// Case-insensitive tag membership check.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Length/count limits applied when building or updating a record.
#[derive(Debug, Clone, Copy)]
pub struct StorageLimits {
    pub max_title_length: usize,
    pub max_summary_length: usize,
    pub max_content_bytes: usize,
    pub max_tags_per_memory: usize,
}

impl From<&crate::config::StorageConfig> for StorageLimits {
    fn from(cfg: &crate::config::StorageConfig) -> Self {
        Self {
            max_title_length: cfg.max_title_length,
            max_summary_length: cfg.max_summary_length,
            max_content_bytes: cfg.max_content_bytes,
            max_tags_per_memory: cfg.max_tags_per_memory,
        }
    }
}

/// Truncate a string to at most `max_chars` characters, dropping from the
/// end rather than rejecting the write.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Truncate a string to at most `max_bytes` bytes, respecting UTF-8
/// char boundaries.
fn truncate_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Deduplicate tags case-insensitively (keeping first occurrence and
/// insertion order) and cap at `max_tags` keeping the first N.
fn dedup_and_cap_tags(tags: &[String], max_tags: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let key = tag.to_lowercase();
        if seen.insert(key) {
            out.push(tag.clone());
        }
        if out.len() >= max_tags {
            break;
        }
    }
    out
}

/// Request to create a new memory.
///
/// Rejects unknown fields rather than silently ignoring typos.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateMemoryRequest {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub decay_rate: Option<f64>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request to update an existing memory: only present
/// fields are overwritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateMemoryRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub decay_rate: Option<f64>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn limits() -> StorageLimits {
        StorageLimits {
            max_title_length: 500,
            max_summary_length: 2000,
            max_content_bytes: 524_288,
            max_tags_per_memory: 20,
        }
    }

    #[test]
    fn pinned_records_never_decay() {
        let mut record = MemoryRecord::default();
        record.is_pinned = true;
        record.base_strength = 1.0;
        let later = Utc::now() + Duration::days(365);
        assert_eq!(record.current_strength_at(later), 1.0);
    }

    #[test]
    fn strength_decays_with_days_elapsed() {
        let mut record = MemoryRecord::default();
        record.importance = 0.0;
        record.decay_rate = 1.0;
        record.base_strength = 1.0;
        record.last_accessed_at = Utc::now() - Duration::days(10);
        let strength = record.current_strength();
        assert!((strength - (-10.0_f64).exp()).abs() < 1e-6);
    }

    #[test]
    fn reinforce_bumps_access_count_and_strength() {
        let mut record = MemoryRecord::default();
        let before_strength = record.base_strength;
        record.reinforce();
        assert_eq!(record.access_count, 1);
        assert!(record.base_strength > before_strength);
    }

    #[test]
    fn reinforce_has_diminishing_returns() {
        let mut record = MemoryRecord::default();
        record.reinforce();
        let first_bump = record.base_strength - 1.0;
        record.reinforce();
        let second_bump = record.base_strength - 1.0 - first_bump;
        assert!(second_bump < first_bump);
    }

    #[test]
    fn tags_are_deduped_case_insensitively_and_capped() {
        let tags = vec![
            "Rust".to_string(),
            "rust".to_string(),
            "systems".to_string(),
        ];
        let capped = dedup_and_cap_tags(&tags, 1);
        assert_eq!(capped, vec!["Rust".to_string()]);
    }

    #[test]
    fn from_request_recomputes_normalized_text_and_trigrams() {
        let req = CreateMemoryRequest {
            title: "I live in Paris".to_string(),
            summary: "Current residence".to_string(),
            content: String::new(),
            tags: vec!["residence".to_string()],
            importance: None,
            decay_rate: None,
            is_pinned: None,
            expires_at: None,
        };
        let record = MemoryRecord::from_request(&req, &limits());
        assert!(record.content_normalized.contains("paris"));
        assert!(!record.trigrams.is_empty());
    }

    #[test]
    fn is_current_requires_no_valid_until_and_not_archived() {
        let mut record = MemoryRecord::default();
        assert!(record.is_current());
        record.is_archived = true;
        assert!(!record.is_current());
    }
}
