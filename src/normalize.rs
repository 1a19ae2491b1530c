use crate::classify::Classification;
use crate::descriptor::{ContentKind, MediaDescriptor};
use crate::repair;

/// Folds a classification into the outgoing descriptor: fixed field set,
/// empty-string defaults, repaired text, formatted duration.
pub struct ResponseNormalizer;

impl ResponseNormalizer {
    pub fn normalize(c: Classification) -> MediaDescriptor {
        let duration_seconds = c.duration_ms / 1000;
        let duration = if c.kind == ContentKind::Video {
            format_duration(c.duration_ms)
        } else {
            String::new()
        };
        let mut author = c.author;
        author.nickname = repair::normalize_text(&author.nickname);
        let mut music = c.music;
        music.title = repair::normalize_text(&music.title);
        music.author = repair::normalize_text(&music.author);

        MediaDescriptor {
            id: c.id,
            desc: repair::normalize_text(&c.desc),
            create_time: c.create_time,
            author,
            statistics: c.statistics,
            music,
            kind: c.kind,
            duration,
            duration_seconds,
            downloads: c.downloads,
        }
    }
}

fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        secs % 3600 / 60,
        secs % 60
    )
}
