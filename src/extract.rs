//! Field extraction from scraped share pages. Everything here is pure
//! string/regex work so it can be tested without a network.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static TITLE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)<meta\s+property="og:title"\s+content="([^"]+)""#,
        r"(?is)<title[^>]*>(.*?)</title>",
        r#"(?i)"title":"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static AUTHOR_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"nickname":"([^"]+)""#,
        r#"(?i)"nickName":"([^"]+)""#,
        r#"(?i)<meta\s+name="author"\s+content="([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static CONTENT_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)"desc":"([^"]+)""#,
        r#"(?i)"content":"([^"]+)""#,
        r#"(?i)"text":"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static NOTE_ID_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"/item/([a-zA-Z0-9]+)", r#""noteId":"([a-zA-Z0-9]+)""#]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

static OG_IMAGE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)<meta[^>]*property=["']og:image["'][^>]*content=["']([^"']+)["'][^>]*>"#,
        r#"(?i)<meta[^>]*content=["']([^"']+)["'][^>]*property=["']og:image["'][^>]*>"#,
        r#"(?i)<meta[^>]*og:image[^>]*content=["']([^"']+)["'][^>]*>"#,
        r#"(?i)content=["']([^"']*xhscdn[^"']*)["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static VIDEO_URL_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"https://sns-video[^"'\s]+\.mp4"#,
        r#"https://v\.xhscdn\.com[^"'\s]+"#,
        r#""masterUrl":"([^"]+)""#,
        r#""url":"(https://v\.xhscdn\.com[^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>(.*?)</script>").expect("valid regex"));

// Matches a JSON object with at most one level of nesting; deep state trees
// are picked apart object by object rather than parsed whole.
static JSON_OBJ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("valid regex"));

static HANZI_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*小红书").expect("valid regex"));

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&[a-z]+;").expect("valid regex"));

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static TYPE_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]type=([^&#]+)").expect("valid regex"));

/// Only objects this long are worth a parse attempt in the script scan.
const MIN_JSON_LEN: usize = 50;
/// Watermarked renditions carry this suffix and are skipped.
const WATERMARK_SUFFIX: &str = "_259.mp4";

pub fn clean_text(text: &str) -> String {
    let text = HANZI_SUFFIX_RE.replace_all(text, "");
    let text = text.replace("\\n", " ");
    let text = ENTITY_RE.replace_all(&text, " ");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

/// Page JSON escapes URL punctuation as `\uXXXX`; undo the handful that
/// actually occur.
pub fn clean_url(url: &str) -> String {
    url.replace("\\u002F", "/")
        .replace("\\u0026", "&")
        .replace("\\u003D", "=")
        .replace("\\u003F", "?")
        .replace("\\u003A", ":")
        .replace("\\\"", "\"")
        .trim_matches('"')
        .to_string()
}

pub fn extract_title(html: &str) -> String {
    for re in TITLE_RES.iter() {
        if let Some(caps) = re.captures(html) {
            let title = clean_text(&caps[1]);
            if !title.is_empty() && title != "小红书" {
                return title;
            }
        }
    }
    "小红书内容".to_string()
}

pub fn extract_author(html: &str) -> String {
    for re in AUTHOR_RES.iter() {
        if let Some(caps) = re.captures(html) {
            let author = clean_text(&caps[1]);
            if !author.is_empty() {
                return author;
            }
        }
    }
    "未知作者".to_string()
}

pub fn extract_content(html: &str) -> String {
    for re in CONTENT_RES.iter() {
        if let Some(caps) = re.captures(html) {
            let content = caps[1]
                .replace("\\n", "\n")
                .replace("\\t", "\t")
                .replace("\\\"", "\"");
            if !content.is_empty() {
                return content;
            }
        }
    }
    String::new()
}

/// The note id lives in the canonical URL when we have it, otherwise
/// somewhere in the page state.
pub fn extract_note_id(html: &str, url: &str) -> String {
    for haystack in [url, html] {
        for re in NOTE_ID_RES.iter() {
            if let Some(caps) = re.captures(haystack) {
                return caps[1].to_string();
            }
        }
    }
    String::new()
}

/// First og:image pattern that yields anything wins; order within a
/// pattern is preserved and deduped.
pub fn extract_images(html: &str) -> Vec<String> {
    for re in OG_IMAGE_RES.iter() {
        let mut images: Vec<String> = Vec::new();
        for caps in re.captures_iter(html) {
            let url = clean_url(&caps[1]);
            if url.contains("http") && !images.contains(&url) {
                images.push(url);
            }
        }
        if !images.is_empty() {
            return images;
        }
    }
    Vec::new()
}

/// All video patterns contribute; watermarked renditions are dropped and
/// duplicates removed keeping first-seen order.
pub fn extract_videos(html: &str) -> Vec<String> {
    let mut videos: Vec<String> = Vec::new();
    for re in VIDEO_URL_RES.iter() {
        for caps in re.captures_iter(html) {
            let raw = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str());
            let Some(raw) = raw else { continue };
            let url = clean_url(raw);
            if url.contains("http")
                && (url.contains(".mp4") || url.contains("xhscdn"))
                && !url.contains(WATERMARK_SUFFIX)
                && !videos.contains(&url)
            {
                videos.push(url);
            }
        }
    }
    videos
}

/// A motion clip candidate from the page state.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveClip {
    pub url: String,
    pub backup_urls: Vec<String>,
}

/// Everything the script-block scan recovers about the page's media.
#[derive(Debug, Clone, Default)]
pub struct PageMedia {
    pub clips: Vec<LiveClip>,
    /// Full-size stills (`WB_DFT` scene).
    pub wb_dft: Vec<String>,
    /// Preview stills (`WB_PRV` scene).
    pub wb_prv: Vec<String>,
    /// Objects explicitly marked `livePhoto: false`.
    pub regular_image_count: usize,
}

/// Walk every `<script>` block, try each brace-balanced object, and sort
/// what parses into live-photo clips, scene stills and regular images.
pub fn scan_script_json(html: &str) -> PageMedia {
    let mut media = PageMedia::default();
    for script in SCRIPT_RE.captures_iter(html) {
        let content = &script[1];
        for obj in JSON_OBJ_RE.find_iter(content) {
            if obj.as_str().len() <= MIN_JSON_LEN {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<Value>(obj.as_str()) else {
                continue;
            };
            let Some(map) = parsed.as_object() else { continue };

            if map.contains_key("imageScene")
                || map.contains_key("h264")
                || map.contains_key("h265")
            {
                if let Some(first) = parsed
                    .get("h264")
                    .and_then(Value::as_array)
                    .and_then(|a| a.first())
                {
                    if let Some(master) = first.get("masterUrl").and_then(Value::as_str) {
                        let backup_urls = first
                            .get("backupUrls")
                            .and_then(Value::as_array)
                            .map(|a| {
                                a.iter()
                                    .filter_map(Value::as_str)
                                    .map(str::to_string)
                                    .collect()
                            })
                            .unwrap_or_default();
                        media.clips.push(LiveClip {
                            url: master.to_string(),
                            backup_urls,
                        });
                    }
                } else if let (Some(scene), Some(url)) = (
                    map.get("imageScene").and_then(Value::as_str),
                    map.get("url").and_then(Value::as_str),
                ) {
                    match scene {
                        "WB_DFT" => media.wb_dft.push(url.to_string()),
                        "WB_PRV" => media.wb_prv.push(url.to_string()),
                        _ => {}
                    }
                }
            }

            let dump = parsed.to_string();
            let interesting = ["video", "image", "title", "WB_"]
                .iter()
                .any(|k| dump.contains(k));
            if interesting && map.get("livePhoto") == Some(&Value::Bool(false)) {
                media.regular_image_count += 1;
            }
        }
    }
    media
}

/// One live-photo group: preview still, default still, motion clip, all
/// matched positionally.
#[derive(Debug, Clone, Default)]
pub struct LiveGroup {
    pub preview_still: Option<String>,
    pub default_still: Option<String>,
    pub clip: Option<LiveClip>,
}

/// The page state carries no join key between stills and clips; the i-th
/// still belongs to the i-th clip by construction of the page.
pub fn live_photo_groups(media: &PageMedia) -> Vec<LiveGroup> {
    let len = media
        .clips
        .len()
        .max(media.wb_dft.len())
        .max(media.wb_prv.len());
    let mut groups = Vec::with_capacity(len);
    for i in 0..len {
        let group = LiveGroup {
            preview_still: media.wb_prv.get(i).cloned(),
            default_still: media.wb_dft.get(i).cloned(),
            clip: media.clips.get(i).cloned(),
        };
        groups.push(group);
    }
    groups
}

/// Fast page-level probe: does any embedded object carry a usable clip?
pub fn has_live_clip_data(html: &str) -> bool {
    for obj in JSON_OBJ_RE.find_iter(html) {
        if obj.as_str().len() <= MIN_JSON_LEN {
            continue;
        }
        let Ok(parsed) = serde_json::from_str::<Value>(obj.as_str()) else {
            continue;
        };
        let has_clip = parsed
            .get("h264")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .map(|first| first.get("masterUrl").is_some())
            .unwrap_or(false);
        if has_clip {
            return true;
        }
    }
    false
}

/// `type=` query parameter of the canonical URL, if any.
pub fn url_type_param(url: &str) -> Option<String> {
    TYPE_PARAM_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_url_unescapes_unicode_punctuation() {
        assert_eq!(
            clean_url("https:\\u002F\\u002Fv.xhscdn.com\\u002Fa?b\\u003D1\\u00262"),
            "https://v.xhscdn.com/a?b=1&2"
        );
        assert_eq!(clean_url("\"https://x/1.jpg\""), "https://x/1.jpg");
    }

    #[test]
    fn clean_text_strips_site_suffix_and_collapses_whitespace() {
        assert_eq!(clean_text("好看的山 - 小红书"), "好看的山");
        assert_eq!(clean_text("a\\nb   c&nbsp;d"), "a b c d");
    }

    #[test]
    fn title_fallback_chain() {
        let html = r#"<meta property="og:title" content="周末去爬山 - 小红书">"#;
        assert_eq!(extract_title(html), "周末去爬山");
        assert_eq!(extract_title("<title>小红书</title>"), "小红书内容");
        assert_eq!(extract_title("no titles here"), "小红书内容");
    }

    #[test]
    fn videos_skip_watermarked_and_dedup_in_order() {
        let html = r#"
            <script>"url":"https://v.xhscdn.com/clip_a.mp4"</script>
            <video src="https://sns-video-bd.xhscdn.com/clip_b_259.mp4"></video>
            <video src="https://sns-video-bd.xhscdn.com/clip_c.mp4"></video>
            <script>"masterUrl":"https://sns-video-bd.xhscdn.com/clip_c.mp4"</script>
        "#;
        let videos = extract_videos(html);
        assert_eq!(
            videos,
            vec![
                "https://sns-video-bd.xhscdn.com/clip_c.mp4".to_string(),
                "https://v.xhscdn.com/clip_a.mp4".to_string(),
            ]
        );
    }

    #[test]
    fn images_stop_at_first_matching_pattern() {
        let html = r#"
            <meta property="og:image" content="https://sns-img.xhscdn.com/1.jpg">
            <meta property="og:image" content="https://sns-img.xhscdn.com/2.jpg">
            <meta property="og:image" content="https://sns-img.xhscdn.com/1.jpg">
        "#;
        assert_eq!(
            extract_images(html),
            vec![
                "https://sns-img.xhscdn.com/1.jpg".to_string(),
                "https://sns-img.xhscdn.com/2.jpg".to_string()
            ]
        );
    }

    fn live_html() -> String {
        // Two clips, two stills of each scene, one regular image object.
        let pad = "\"padding\":\"0123456789012345678901234567890123456789\"";
        format!(
            concat!(
                "<script>{{\"h264\":[{{\"masterUrl\":\"https://v.xhscdn.com/c1.mp4\",",
                "\"backupUrls\":[\"https://v2.xhscdn.com/c1.mp4\"]}}],{pad}}}",
                "{{\"imageScene\":\"WB_PRV\",\"url\":\"https://img/p1.jpg\",{pad}}}",
                "{{\"imageScene\":\"WB_DFT\",\"url\":\"https://img/d1.jpg\",{pad}}}",
                "{{\"h264\":[{{\"masterUrl\":\"https://v.xhscdn.com/c2.mp4\"}}],{pad}}}",
                "{{\"imageScene\":\"WB_PRV\",\"url\":\"https://img/p2.jpg\",{pad}}}",
                "{{\"imageScene\":\"WB_DFT\",\"url\":\"https://img/d2.jpg\",{pad}}}",
                "{{\"livePhoto\":false,\"image\":\"https://img/r1.jpg\",{pad}}}",
                "</script>"
            ),
            pad = pad
        )
    }

    #[test]
    fn script_scan_collects_clips_stills_and_regular_count() {
        let media = scan_script_json(&live_html());
        assert_eq!(media.clips.len(), 2);
        assert_eq!(media.clips[0].url, "https://v.xhscdn.com/c1.mp4");
        assert_eq!(media.clips[0].backup_urls, vec!["https://v2.xhscdn.com/c1.mp4"]);
        assert_eq!(media.wb_prv, vec!["https://img/p1.jpg", "https://img/p2.jpg"]);
        assert_eq!(media.wb_dft, vec!["https://img/d1.jpg", "https://img/d2.jpg"]);
        assert_eq!(media.regular_image_count, 1);
    }

    #[test]
    fn groups_align_by_position_not_by_id() {
        let media = scan_script_json(&live_html());
        let groups = live_photo_groups(&media);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].preview_still.as_deref(), Some("https://img/p1.jpg"));
        assert_eq!(groups[0].clip.as_ref().unwrap().url, "https://v.xhscdn.com/c1.mp4");
        assert_eq!(groups[1].default_still.as_deref(), Some("https://img/d2.jpg"));
        assert_eq!(groups[1].clip.as_ref().unwrap().url, "https://v.xhscdn.com/c2.mp4");
    }

    #[test]
    fn ragged_groups_keep_partial_entries() {
        let media = PageMedia {
            clips: vec![LiveClip {
                url: "https://v/c1.mp4".into(),
                backup_urls: vec![],
            }],
            wb_dft: vec!["https://img/d1.jpg".into(), "https://img/d2.jpg".into()],
            wb_prv: vec![],
            regular_image_count: 0,
        };
        let groups = live_photo_groups(&media);
        assert_eq!(groups.len(), 2);
        assert!(groups[1].clip.is_none());
        assert_eq!(groups[1].default_still.as_deref(), Some("https://img/d2.jpg"));
    }

    #[test]
    fn live_probe_needs_master_url() {
        assert!(has_live_clip_data(&live_html()));
        let stub = format!(
            "{{\"h264\":[{{\"other\":1}}],\"padding\":\"{}\"}}",
            "x".repeat(60)
        );
        assert!(!has_live_clip_data(&stub));
        assert!(!has_live_clip_data("<html>nothing</html>"));
    }

    #[test]
    fn type_param_extraction() {
        assert_eq!(
            url_type_param("https://www.xiaohongshu.com/discovery/item/abc?type=video&x=1"),
            Some("video".to_string())
        );
        assert_eq!(
            url_type_param("https://www.xiaohongshu.com/discovery/item/abc"),
            None
        );
    }
}
