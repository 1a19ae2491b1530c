use serde::{Deserialize, Serialize};

/// What a resolved link turned out to be. Serialized labels are part of the
/// wire contract consumed by downstream bots, including the Chinese ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    #[serde(rename = "视频")]
    Video,
    #[serde(rename = "图集")]
    ImageSet,
    #[serde(rename = "实况")]
    LivePhoto,
    #[serde(rename = "text")]
    Text,
}

impl ContentKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Video => "视频",
            ContentKind::ImageSet => "图集",
            ContentKind::LivePhoto => "实况",
            ContentKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Author {
    pub nickname: String,
    pub uid: String,
    pub sec_uid: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statistics {
    pub digg_count: i64,
    pub comment_count: i64,
    pub collect_count: i64,
    pub share_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MusicInfo {
    pub author: String,
    pub title: String,
    pub url: String,
}

/// One downloadable entry. Plain images stay bare strings; richer media
/// carries a tagged object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Download {
    Url(String),
    Item(DownloadItem),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadItem {
    Video { url: String, cover: String },
    LivePhoto { image: String, video: String },
}

/// The normalized output document for one resolved share link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub id: String,
    pub desc: String,
    pub create_time: String,
    pub author: Author,
    pub statistics: Statistics,
    pub music: MusicInfo,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub duration: String,
    pub duration_seconds: u64,
    pub downloads: Vec<Download>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_round_trip() {
        for kind in [
            ContentKind::Video,
            ContentKind::ImageSet,
            ContentKind::LivePhoto,
            ContentKind::Text,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.label()));
            let back: ContentKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn downloads_union_shapes() {
        let entries = vec![
            Download::Url("https://x/1.jpg".into()),
            Download::Item(DownloadItem::LivePhoto {
                image: "https://x/2.jpg".into(),
                video: "https://x/2.mp4".into(),
            }),
            Download::Item(DownloadItem::Video {
                url: "https://x/v.mp4".into(),
                cover: "https://x/c.jpeg".into(),
            }),
        ];
        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json[0], serde_json::json!("https://x/1.jpg"));
        assert_eq!(json[1]["type"], "live_photo");
        assert_eq!(json[2]["type"], "video");
        assert_eq!(json[2]["cover"], "https://x/c.jpeg");
    }
}
