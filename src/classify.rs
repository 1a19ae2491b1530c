//! The single decision point turning a raw payload into classified media.

use serde_json::Value;
use tracing::debug;

use crate::descriptor::{Author, ContentKind, Download, DownloadItem, MusicInfo, Statistics};
use crate::error::{LensError, Result};
use crate::extract;
use crate::fetch::{html::extract_router_item, RawPayload};

/// Classified media plus the metadata recovered alongside it. This is the
/// intermediate form the normalizer folds into the output descriptor.
#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: ContentKind,
    pub id: String,
    pub desc: String,
    pub create_time: String,
    pub author: Author,
    pub statistics: Statistics,
    pub music: MusicInfo,
    pub duration_ms: u64,
    pub cover: Option<String>,
    /// Stills: all of them for image sets, aligned previews for live photos.
    pub images: Vec<String>,
    /// Motion clips, aligned with `images` for live photos.
    pub videos: Vec<String>,
    pub downloads: Vec<Download>,
}

impl Classification {
    fn empty() -> Self {
        Self {
            kind: ContentKind::Text,
            id: String::new(),
            desc: String::new(),
            create_time: String::new(),
            author: Author::default(),
            statistics: Statistics::default(),
            music: MusicInfo::default(),
            duration_ms: 0,
            cover: None,
            images: Vec::new(),
            videos: Vec::new(),
            downloads: Vec::new(),
        }
    }
}

pub struct MediaClassifier;

impl MediaClassifier {
    pub fn classify(payload: &RawPayload) -> Result<Classification> {
        match payload {
            RawPayload::PrivateApiJson(value) => {
                let detail = value
                    .get("aweme_detail")
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| LensError::SchemaMismatch("missing aweme_detail".into()))?;
                Ok(classify_detail_item(detail))
            }
            RawPayload::ScrapedHtml { html, final_url } => {
                if is_douyin_url(final_url) {
                    let (item, _) = extract_router_item(html)?;
                    Ok(classify_detail_item(&item))
                } else {
                    classify_scraped_page(html, final_url)
                }
            }
        }
    }
}

fn is_douyin_url(url: &str) -> bool {
    url.contains("douyin.com") || url.contains("iesdouyin.com")
}

/// Classify a detail item from the private API or the embedded router
/// state; both carry the same item schema.
fn classify_detail_item(item: &Value) -> Classification {
    let mut out = Classification::empty();
    out.id = str_at(item, "/aweme_id");
    out.desc = str_at(item, "/desc");
    out.create_time = format_create_time(int_at(item, "/create_time"));
    out.author = Author {
        nickname: str_at(item, "/author/nickname"),
        uid: str_at(item, "/author/uid"),
        sec_uid: str_at(item, "/author/sec_uid"),
        avatar: str_at(item, "/author/avatar_thumb/url_list/0"),
    };
    out.statistics = Statistics {
        digg_count: int_at(item, "/statistics/digg_count"),
        comment_count: int_at(item, "/statistics/comment_count"),
        collect_count: int_at(item, "/statistics/collect_count"),
        share_count: int_at(item, "/statistics/share_count"),
    };
    out.music = MusicInfo {
        author: str_at(item, "/music/author"),
        title: str_at(item, "/music/title"),
        url: str_at(item, "/music/play_url/url_list/0"),
    };

    let images = item.get("images").and_then(Value::as_array);
    match images {
        Some(images) if !images.is_empty() => {
            let has_live = images.iter().any(|img| {
                img.get("video").map(|v| !v.is_null()).unwrap_or(false)
            });
            if has_live {
                out.kind = ContentKind::LivePhoto;
                for img in images {
                    let still = str_at(img, "/url_list/0");
                    if img.get("video").map(|v| !v.is_null()).unwrap_or(false) {
                        let clip = best_video_url(img);
                        out.images.push(still.clone());
                        out.videos.push(clip.clone());
                        out.downloads.push(Download::Item(DownloadItem::LivePhoto {
                            image: still,
                            video: clip,
                        }));
                    } else {
                        out.images.push(still.clone());
                        out.downloads.push(Download::Url(still));
                    }
                }
            } else {
                out.kind = ContentKind::ImageSet;
                for img in images {
                    let url = str_at(img, "/url_list/0");
                    out.images.push(url.clone());
                    out.downloads.push(Download::Url(url));
                }
            }
        }
        _ => {
            out.kind = ContentKind::Video;
            out.duration_ms = int_at(item, "/video/duration").max(0) as u64;
            let url = best_video_url(item);
            let cover = prefer_jpeg_url(item.pointer("/video/cover/url_list"));
            out.cover = cover.clone();
            out.videos.push(url.clone());
            out.downloads.push(Download::Item(DownloadItem::Video {
                url,
                cover: cover.unwrap_or_default(),
            }));
        }
    }
    out
}

/// Pick the highest-quality rendition: sort variants ascending by
/// (longest edge, FPS, bit rate, data size) and take the last one, then the
/// last CDN mirror in its url_list. The take-last convention is a mirror
/// stability heuristic carried over from the upstream client.
fn best_video_url(item: &Value) -> String {
    let variants = item
        .pointer("/video/bit_rate")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty());
    let Some(variants) = variants else {
        return last_url(item.pointer("/video/play_addr/url_list"));
    };
    let mut candidates: Vec<(i64, i64, i64, i64, &Value)> = variants
        .iter()
        .map(|v| {
            let height = int_at(v, "/play_addr/height");
            let width = int_at(v, "/play_addr/width");
            (
                height.max(width),
                int_at(v, "/FPS"),
                int_at(v, "/bit_rate"),
                int_at(v, "/play_addr/data_size"),
                v,
            )
        })
        .collect();
    candidates.sort_by_key(|&(edge, fps, rate, size, _)| (edge, fps, rate, size));
    match candidates.last() {
        Some((_, _, _, _, best)) => {
            let url = last_url(best.pointer("/play_addr/url_list"));
            if url.is_empty() {
                last_url(item.pointer("/video/play_addr/url_list"))
            } else {
                url
            }
        }
        None => last_url(item.pointer("/video/play_addr/url_list")),
    }
}

fn last_url(list: Option<&Value>) -> String {
    list.and_then(Value::as_array)
        .and_then(|a| a.last())
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn prefer_jpeg_url(list: Option<&Value>) -> Option<String> {
    let urls: Vec<&str> = list
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    urls.iter()
        .find(|u| u.contains(".jpeg") || u.contains(".jpg"))
        .or_else(|| urls.first())
        .map(|u| u.to_string())
}

/// Classify a scraped page without embedded router state.
fn classify_scraped_page(html: &str, final_url: &str) -> Result<Classification> {
    if html.contains("internal error") || html.contains("验证码") || html.contains("captcha") {
        return Err(LensError::SchemaMismatch(
            "page returned an error or captcha wall".into(),
        ));
    }

    let mut out = Classification::empty();
    let title = extract::extract_title(html);
    let content = extract::extract_content(html);
    out.id = extract::extract_note_id(html, final_url);
    out.desc = if content.is_empty() { title.clone() } else { content };
    out.author.nickname = extract::extract_author(html);
    out.images = extract::extract_images(html);
    out.videos = extract::extract_videos(html);

    let media = extract::scan_script_json(html);
    let groups = extract::live_photo_groups(&media);
    let group_count = groups.len();

    let type_param = extract::url_type_param(final_url);
    // URL type=video is authoritative and stops live-photo inspection.
    let (content_kind, url_says_live) = match type_param.as_deref() {
        Some("video") => ("video", false),
        _ => ("image", extract::has_live_clip_data(html)),
    };
    debug!(
        content_kind,
        url_says_live, group_count, "scraped page analyzed"
    );

    let has_any_motion = !out.videos.is_empty() || group_count > 0;
    if has_any_motion {
        if content_kind == "video" {
            out.kind = ContentKind::Video;
            out.videos.truncate(1);
            if let Some(cover) = out.images.first().cloned() {
                out.cover = Some(cover);
                out.images.clear();
            }
        } else {
            // Multiple groups, groups mixed with regular images, or the
            // page-level probe all mean a real live-photo note.
            let is_real_live = group_count > 1
                || (group_count > 0 && media.regular_image_count > 0)
                || group_count > 0
                || url_says_live;
            if is_real_live {
                out.kind = ContentKind::LivePhoto;
                out.videos = media
                    .clips
                    .iter()
                    .map(|c| extract::clean_url(&c.url))
                    .filter(|u| !u.is_empty())
                    .collect();
                out.cover = out.images.first().cloned();
            } else {
                // The page insists this is a plain image note; the stills
                // stay authoritative and video candidates are retained
                // alongside rather than promoted.
                out.kind = ContentKind::ImageSet;
                out.cover = out.images.first().cloned();
            }
        }
    } else {
        out.kind = ContentKind::ImageSet;
        out.cover = out.images.first().cloned();
    }

    // A picture note with nothing recovered degrades to text.
    if out.kind == ContentKind::ImageSet && out.images.is_empty() && out.videos.is_empty() {
        out.kind = ContentKind::Text;
    }

    out.downloads = build_scraped_downloads(&out);
    Ok(out)
}

fn build_scraped_downloads(c: &Classification) -> Vec<Download> {
    match c.kind {
        ContentKind::Video => c
            .videos
            .first()
            .map(|url| {
                vec![Download::Item(DownloadItem::Video {
                    url: url.clone(),
                    cover: c.cover.clone().unwrap_or_default(),
                })]
            })
            .unwrap_or_default(),
        ContentKind::ImageSet => c.images.iter().cloned().map(Download::Url).collect(),
        ContentKind::LivePhoto => {
            let mut downloads = Vec::new();
            let pairs = c.images.len().min(c.videos.len());
            for i in 0..pairs {
                downloads.push(Download::Item(DownloadItem::LivePhoto {
                    image: c.images[i].clone(),
                    video: c.videos[i].clone(),
                }));
            }
            for image in &c.images[pairs..] {
                downloads.push(Download::Url(image.clone()));
            }
            for video in &c.videos[pairs..] {
                downloads.push(Download::Url(video.clone()));
            }
            downloads
        }
        ContentKind::Text => Vec::new(),
    }
}

fn str_at(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

fn int_at(value: &Value, pointer: &str) -> i64 {
    value.pointer(pointer).and_then(Value::as_i64).unwrap_or(0)
}

fn format_create_time(epoch_secs: i64) -> String {
    use chrono::{Local, TimeZone};
    match Local.timestamp_opt(epoch_secs, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn video_detail() -> Value {
        json!({
            "aweme_detail": {
                "aweme_id": "7372484719365098803",
                "desc": "晚霞",
                "create_time": 1716800000,
                "author": {
                    "nickname": "小王",
                    "uid": "123",
                    "sec_uid": "MS4w",
                    "avatar_thumb": {"url_list": ["https://p3/avatar.jpeg"]}
                },
                "statistics": {
                    "digg_count": 10, "comment_count": 2,
                    "collect_count": 1, "share_count": 4
                },
                "music": {
                    "author": "小王", "title": "原声",
                    "play_url": {"url_list": ["https://music/1.mp3"]}
                },
                "video": {
                    "duration": 15500,
                    "cover": {"url_list": ["https://c/1.webp", "https://c/1.jpeg"]},
                    "play_addr": {"url_list": ["https://pa/wm.mp4", "https://pa/last.mp4"]},
                    "bit_rate": [
                        {
                            "FPS": 30, "bit_rate": 800,
                            "play_addr": {"height": 1080, "width": 608, "data_size": 100,
                                          "url_list": ["https://a/video.mp4"]}
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn plain_video_detail() {
        let payload = RawPayload::PrivateApiJson(video_detail());
        let c = MediaClassifier::classify(&payload).unwrap();
        assert_eq!(c.kind, ContentKind::Video);
        assert_eq!(c.duration_ms, 15500);
        assert_eq!(c.cover.as_deref(), Some("https://c/1.jpeg"));
        assert_eq!(
            c.downloads,
            vec![Download::Item(DownloadItem::Video {
                url: "https://a/video.mp4".into(),
                cover: "https://c/1.jpeg".into(),
            })]
        );
        assert_eq!(c.author.nickname, "小王");
        assert_eq!(c.statistics.digg_count, 10);
        assert_eq!(c.music.url, "https://music/1.mp3");
    }

    #[test]
    fn bitrate_selection_sorts_ascending_and_takes_last() {
        let mut detail = video_detail();
        detail["aweme_detail"]["video"]["bit_rate"] = json!([
            {
                "FPS": 60, "bit_rate": 2000,
                "play_addr": {"height": 720, "width": 404, "data_size": 500,
                              "url_list": ["https://a/720-a.mp4", "https://a/720-b.mp4"]}
            },
            {
                "FPS": 30, "bit_rate": 800,
                "play_addr": {"height": 1080, "width": 608, "data_size": 100,
                              "url_list": ["https://a/1080-a.mp4", "https://a/1080-b.mp4"]}
            }
        ]);
        let c = MediaClassifier::classify(&RawPayload::PrivateApiJson(detail)).unwrap();
        // 1080 sorts after 720 despite lower FPS and bitrate; last mirror wins.
        assert_eq!(c.videos, vec!["https://a/1080-b.mp4".to_string()]);
    }

    #[test]
    fn bitrate_fallback_uses_last_play_addr_mirror() {
        let mut detail = video_detail();
        detail["aweme_detail"]["video"]["bit_rate"] = json!([]);
        let c = MediaClassifier::classify(&RawPayload::PrivateApiJson(detail)).unwrap();
        assert_eq!(c.videos, vec!["https://pa/last.mp4".to_string()]);
    }

    #[test]
    fn image_set_detail() {
        let mut detail = video_detail();
        detail["aweme_detail"]["images"] = json!([
            {"url_list": ["https://x/1.jpg"]},
            {"url_list": ["https://x/2.jpg"]}
        ]);
        let c = MediaClassifier::classify(&RawPayload::PrivateApiJson(detail)).unwrap();
        assert_eq!(c.kind, ContentKind::ImageSet);
        assert_eq!(
            c.downloads,
            vec![
                Download::Url("https://x/1.jpg".into()),
                Download::Url("https://x/2.jpg".into())
            ]
        );
    }

    #[test]
    fn mixed_live_photo_detail() {
        let mut detail = video_detail();
        detail["aweme_detail"]["images"] = json!([
            {"url_list": ["https://x/1.jpg"]},
            {
                "url_list": ["https://x/2.jpg"],
                "video": {"play_addr": {"url_list": ["https://x/2.mp4"]}}
            }
        ]);
        let c = MediaClassifier::classify(&RawPayload::PrivateApiJson(detail)).unwrap();
        assert_eq!(c.kind, ContentKind::LivePhoto);
        assert_eq!(
            c.downloads,
            vec![
                Download::Url("https://x/1.jpg".into()),
                Download::Item(DownloadItem::LivePhoto {
                    image: "https://x/2.jpg".into(),
                    video: "https://x/2.mp4".into(),
                })
            ]
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let payload = RawPayload::PrivateApiJson(video_detail());
        let a = MediaClassifier::classify(&payload).unwrap();
        let b = MediaClassifier::classify(&payload).unwrap();
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.downloads, b.downloads);
        assert_eq!(a.videos, b.videos);
    }

    #[test]
    fn scraped_page_with_no_media_degrades_to_text() {
        let payload = RawPayload::ScrapedHtml {
            html: "<html><head><title>随便聊聊 - 小红书</title></head><body>文字</body></html>"
                .into(),
            final_url: "https://www.xiaohongshu.com/discovery/item/abc123".into(),
        };
        let c = MediaClassifier::classify(&payload).unwrap();
        assert_eq!(c.kind, ContentKind::Text);
        assert!(c.images.is_empty());
        assert!(c.videos.is_empty());
        assert!(c.downloads.is_empty());
        assert_eq!(c.id, "abc123");
        assert_eq!(c.desc, "随便聊聊");
    }

    #[test]
    fn url_type_video_wins_over_live_markers() {
        let pad = "x".repeat(60);
        let html = format!(
            concat!(
                "<meta property=\"og:image\" content=\"https://sns-img.xhscdn.com/cover.jpg\">",
                "<script>{{\"h264\":[{{\"masterUrl\":\"https://v.xhscdn.com/c1.mp4\"}}],",
                "\"padding\":\"{}\"}}</script>"
            ),
            pad
        );
        let payload = RawPayload::ScrapedHtml {
            html,
            final_url: "https://www.xiaohongshu.com/discovery/item/abc?type=video".into(),
        };
        let c = MediaClassifier::classify(&payload).unwrap();
        assert_eq!(c.kind, ContentKind::Video);
        assert_eq!(c.cover.as_deref(), Some("https://sns-img.xhscdn.com/cover.jpg"));
        assert!(c.images.is_empty());
    }

    #[test]
    fn scraped_live_photo_pairs_positionally() {
        let pad = "x".repeat(60);
        let html = format!(
            concat!(
                "<meta property=\"og:image\" content=\"https://sns-img.xhscdn.com/1.jpg\">",
                "<meta property=\"og:image\" content=\"https://sns-img.xhscdn.com/2.jpg\">",
                "<script>",
                "{{\"h264\":[{{\"masterUrl\":\"https://sns-video.xhscdn.com/c1.mp4\"}}],\"padding\":\"{pad}\"}}",
                "{{\"h264\":[{{\"masterUrl\":\"https://sns-video.xhscdn.com/c2.mp4\"}}],\"padding\":\"{pad}\"}}",
                "</script>"
            ),
            pad = pad
        );
        let payload = RawPayload::ScrapedHtml {
            html,
            final_url: "https://www.xiaohongshu.com/discovery/item/abc?type=normal".into(),
        };
        let c = MediaClassifier::classify(&payload).unwrap();
        assert_eq!(c.kind, ContentKind::LivePhoto);
        assert_eq!(c.cover.as_deref(), Some("https://sns-img.xhscdn.com/1.jpg"));
        assert_eq!(
            c.downloads,
            vec![
                Download::Item(DownloadItem::LivePhoto {
                    image: "https://sns-img.xhscdn.com/1.jpg".into(),
                    video: "https://sns-video.xhscdn.com/c1.mp4".into(),
                }),
                Download::Item(DownloadItem::LivePhoto {
                    image: "https://sns-img.xhscdn.com/2.jpg".into(),
                    video: "https://sns-video.xhscdn.com/c2.mp4".into(),
                }),
            ]
        );
    }

    #[test]
    fn captcha_page_is_rejected() {
        let payload = RawPayload::ScrapedHtml {
            html: "<html>请输入验证码</html>".into(),
            final_url: "https://www.xiaohongshu.com/discovery/item/abc".into(),
        };
        assert!(matches!(
            MediaClassifier::classify(&payload).unwrap_err(),
            LensError::SchemaMismatch(_)
        ));
    }
}
