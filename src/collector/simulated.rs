//! Fabricated records for simulated runs
//!
//! The shape is fixed (`items_per_target` posts per target, 0-5 comments each
//! when secondary items are requested); names, text and timestamps are drawn
//! at random from small pools.

use crate::model::{CollectionSettings, Comment, ExtractedRecord, Target};
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;

const AUTHORS: &[&str] = &[
    "John Doe",
    "Jane Smith",
    "Robert Johnson",
    "Emily Davis",
    "Michael Wilson",
];

const COMMENTERS: &[&str] = &[
    "Alice Brown",
    "David Miller",
    "Sarah Taylor",
    "James Anderson",
    "Lisa Thomas",
];

const MAX_COMMENTS: usize = 5;
const MAX_AGE_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Synthesizes the records one target would have produced
pub fn simulate_records<R: Rng + ?Sized>(
    target: &Target,
    settings: &CollectionSettings,
    rng: &mut R,
) -> Vec<ExtractedRecord> {
    (0..settings.items_per_target as usize)
        .map(|i| {
            let author = pick(AUTHORS, rng);
            let posted_at = Utc::now() - ChronoDuration::seconds(rng.random_range(0..MAX_AGE_SECONDS));

            let comments = if settings.include_secondary {
                let count = rng.random_range(0..=MAX_COMMENTS);
                (0..count)
                    .map(|j| {
                        let commenter = pick(COMMENTERS, rng);
                        Comment {
                            commenter_id: profile_id(commenter),
                            commenter_name: commenter.to_string(),
                            text: format!(
                                "This is a mock comment by {}. Comment #{} on post #{}.",
                                commenter,
                                j + 1,
                                i + 1
                            ),
                        }
                    })
                    .collect()
            } else {
                Vec::new()
            };

            ExtractedRecord {
                target_id: target.id.clone(),
                poster_id: profile_id(author),
                poster_name: author.to_string(),
                date: posted_at.format("%B %-d").to_string(),
                time: posted_at.format("%-I:%M %p").to_string(),
                content: format!(
                    "This is a mock post #{} in group {}. It contains some sample text for testing purposes.",
                    i + 1,
                    target.name
                ),
                comments,
            }
        })
        .collect()
}

fn pick<'a, R: Rng + ?Sized>(pool: &[&'a str], rng: &mut R) -> &'a str {
    pool[rng.random_range(0..pool.len())]
}

/// "Jane Smith" -> "jane.smith"
fn profile_id(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(".")
}
