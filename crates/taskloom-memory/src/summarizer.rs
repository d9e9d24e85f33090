// SPDX-FileCopyrightText: 2026 Taskloom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable summary strategies for the rolling project digest.

use taskloom_core::types::{MemoryRecord, MemoryRole};

/// Produces the rolling digest text from recent conversation turns.
///
/// The digest algorithm is deliberately a seam: the default is a cheap
/// extraction heuristic, and a model-delegating implementation can slot
/// in without touching the service.
pub trait Summarizer: Send + Sync {
    /// Digest `records` (given newest-first) into at most `max_bytes` of text.
    fn digest(&self, records: &[MemoryRecord], max_bytes: usize) -> String;
}

/// Heuristic summarizer: first sentence of each user/agent turn, oldest
/// first, bulleted, truncated to the byte budget.
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn digest(&self, records: &[MemoryRecord], max_bytes: usize) -> String {
        let mut out = String::new();

        for record in records.iter().rev() {
            if record.role == MemoryRole::System {
                continue;
            }
            let sentence = first_sentence(&record.content);
            if sentence.is_empty() {
                continue;
            }
            let line = format!("- [{}] {}\n", record.role.as_str(), sentence);
            if out.len() + line.len() > max_bytes {
                break;
            }
            out.push_str(&line);
        }

        out.truncate(floor_char_boundary(&out, max_bytes));
        out
    }
}

fn first_sentence(content: &str) -> &str {
    let trimmed = content.trim();
    let end = trimmed
        .find(['.', '\n', '!', '?'])
        .map(|i| i + 1)
        .unwrap_or(trimmed.len());
    trimmed[..floor_char_boundary(trimmed, end)].trim_end()
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut index = index;
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskloom_core::types::{new_id, EmbeddingStatus};

    fn make_record(role: MemoryRole, content: &str, timestamp: &str) -> MemoryRecord {
        MemoryRecord {
            id: new_id(),
            project_id: "p1".to_string(),
            session_id: "s1".to_string(),
            task_id: None,
            role,
            content: content.to_string(),
            embedding: None,
            embedding_status: EmbeddingStatus::Pending,
            embedding_error: None,
            metadata: None,
            created_at: timestamp.to_string(),
        }
    }

    #[test]
    fn digest_is_oldest_first_with_roles() {
        // Input arrives newest-first, as list_records returns it.
        let records = vec![
            make_record(MemoryRole::Agent, "Done. Tests pass now.", "2026-05-01T10:00:01.000Z"),
            make_record(MemoryRole::User, "Fix the login bug. It fails on safari.", "2026-05-01T10:00:00.000Z"),
        ];
        let digest = ExtractiveSummarizer.digest(&records, 4096);
        let lines: Vec<&str> = digest.lines().collect();
        assert_eq!(lines[0], "- [user] Fix the login bug.");
        assert_eq!(lines[1], "- [agent] Done.");
    }

    #[test]
    fn digest_skips_system_turns() {
        let records = vec![
            make_record(MemoryRole::System, "session started", "2026-05-01T10:00:00.000Z"),
            make_record(MemoryRole::User, "hello there", "2026-05-01T10:00:01.000Z"),
        ];
        let digest = ExtractiveSummarizer.digest(&records, 4096);
        assert!(!digest.contains("session started"));
        assert!(digest.contains("hello there"));
    }

    #[test]
    fn digest_respects_byte_budget() {
        let records: Vec<MemoryRecord> = (0..100)
            .map(|i| {
                make_record(
                    MemoryRole::User,
                    &format!("message number {i} with some padding text."),
                    &format!("2026-05-01T10:{:02}:00.000Z", i % 60),
                )
            })
            .collect();
        let digest = ExtractiveSummarizer.digest(&records, 200);
        assert!(digest.len() <= 200);
        assert!(!digest.is_empty());
    }

    #[test]
    fn first_sentence_handles_no_terminator() {
        assert_eq!(first_sentence("no punctuation here"), "no punctuation here");
        assert_eq!(first_sentence("  spaced.  tail"), "spaced.");
    }
}
