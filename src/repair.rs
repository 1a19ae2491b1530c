//! Best-effort mojibake repair for extracted text fields.
//!
//! Titles and descriptions occasionally arrive double-decoded (UTF-8 bytes
//! read as latin1 or GBK somewhere upstream). This pass re-encodes the text
//! through the usual suspects, re-decodes as UTF-8, scores each candidate
//! for legibility and keeps the original unless a candidate wins clearly.
//! Purely cosmetic: it never fails and never touches URLs.

use std::sync::LazyLock;

use encoding_rs::Encoding;

/// Accented-latin run typical of UTF-8 read as latin1/cp1252.
const LATIN_MARKERS: [char; 29] = [
    'Ã', 'Â', 'â', 'å', 'ä', 'ç', 'é', 'è', 'ê', 'ë', 'ì', 'í', 'î', 'ï', 'ð', 'ñ', 'ò', 'ó',
    'ô', 'õ', 'ö', 'ù', 'ú', 'û', 'ü', 'ý', 'þ', '€', '™',
];

/// Rare hanzi that show up when UTF-8 is read as GBK.
const GBK_MARKERS: [char; 24] = [
    '锛', '銆', '鈥', '鈻', '鎴', '鐨', '鍦', '涓', '鏄', '浣', '鍙', '瀵', '璇', '鎵', '鍒',
    '绗', '澶', '鍥', '鏂', '鏃', '鍐', '寮', '闂', '閮',
];

const COMMON_HANZI: &str = "的一是不了人我在有他这为之大来以个中上们到说国和地也子时道出而要\
于就下得可你年生会那后能对着事其里所去行过家十用发天如然作方成者多日都三小军二无同么经当起\
与好看学进种将还分此心前面又定见只主没公从知全工";

static COMMON_SET: LazyLock<std::collections::HashSet<char>> =
    LazyLock::new(|| COMMON_HANZI.chars().collect());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quality {
    score: i64,
    bad: i64,
}

fn count_cjk(text: &str) -> i64 {
    text.chars()
        .filter(|c| ('\u{4e00}'..='\u{9fff}').contains(c))
        .count() as i64
}

fn latin_marker_count(text: &str) -> i64 {
    text.chars().filter(|c| LATIN_MARKERS.contains(c)).count() as i64
}

fn gbk_marker_count(text: &str) -> i64 {
    text.chars().filter(|c| GBK_MARKERS.contains(c)).count() as i64
}

fn quality(text: &str) -> Quality {
    let cjk = count_cjk(text);
    let common = text.chars().filter(|c| COMMON_SET.contains(c)).count() as i64;
    let nbsp = text.chars().filter(|&c| c == '\u{a0}').count() as i64;
    let bad = latin_marker_count(text) * 2 + gbk_marker_count(text) * 3 + nbsp * 4;
    Quality {
        score: common * 4 + cjk - bad,
        bad,
    }
}

#[derive(Debug, Clone, Copy)]
enum Codec {
    Latin1,
    Cp1252,
    Gb18030,
    Gbk,
}

const CODECS: [Codec; 4] = [Codec::Latin1, Codec::Cp1252, Codec::Gb18030, Codec::Gbk];

/// Undo one wrong decoding step: encode back to the guessed charset, then
/// read the bytes as UTF-8. None when the text cannot have come from that
/// charset.
fn reencode(text: &str, codec: Codec) -> Option<String> {
    let bytes = match codec {
        Codec::Latin1 => text
            .chars()
            .map(|c| u8::try_from(c as u32).ok())
            .collect::<Option<Vec<u8>>>()?,
        Codec::Cp1252 => encode_strict(encoding_rs::WINDOWS_1252, text)?,
        Codec::Gb18030 => encode_strict(encoding_rs::GB18030, text)?,
        Codec::Gbk => encode_strict(encoding_rs::GBK, text)?,
    };
    String::from_utf8(bytes).ok()
}

fn encode_strict(encoding: &'static Encoding, text: &str) -> Option<Vec<u8>> {
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        None
    } else {
        Some(bytes.into_owned())
    }
}

/// Returns the most legible rendition of `text`. The input wins all ties;
/// a candidate needs a margin of two points, or a strictly better score
/// with strictly fewer artifact marks.
pub fn repair_mojibake(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut best = text.to_string();
    let mut best_quality = quality(text);
    if latin_marker_count(text) == 0 && gbk_marker_count(text) == 0 {
        return best;
    }

    for codec in CODECS {
        let Some(mut candidate) = reencode(text, codec) else {
            continue;
        };
        // Some payloads are garbled twice; try one extra pass.
        if let Some(second) = reencode(&candidate, codec) {
            if quality(&second).score > quality(&candidate).score {
                candidate = second;
            }
        }
        let cand_quality = quality(&candidate);
        if cand_quality.score >= best_quality.score + 2
            || (cand_quality.score > best_quality.score && cand_quality.bad < best_quality.bad)
        {
            best = candidate;
            best_quality = cand_quality;
        }
    }
    best
}

/// Repair plus whitespace normalization, the form text fields go out in.
pub fn normalize_text(text: &str) -> String {
    let repaired = repair_mojibake(text);
    let replaced = repaired.replace(['\r', '\n'], " ");
    let mut out = String::with_capacity(replaced.len());
    let mut last_space = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim().to_string()
}
