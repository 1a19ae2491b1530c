/// The five base64-style tables the signing scheme draws from. Only the
/// first 64 characters of each table are ever indexed; padding is always
/// a literal `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    /// RFC 4648 standard table.
    Standard,
    /// Shuffled table, `+` at the position standard puts `Q`.
    Plus,
    /// Same shuffle as `Plus` with `-` instead of `+`.
    Dash,
    /// Shuffled table used when digesting the user agent.
    Obfuscated,
    /// Shuffled table used for the final token.
    Signing,
}

impl Alphabet {
    pub fn table(&self) -> &'static str {
        match self {
            Alphabet::Standard => {
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/"
            }
            Alphabet::Plus => {
                "Dkdpgh4ZKsQB80/Mfvw36XI1R25+WUAlEi7NLboqYTOPuzmFjJnryx9HVGcaStCe"
            }
            Alphabet::Dash => {
                "Dkdpgh4ZKsQB80/Mfvw36XI1R25-WUAlEi7NLboqYTOPuzmFjJnryx9HVGcaStCe"
            }
            Alphabet::Obfuscated => {
                "ckdp1h4ZKsUB80/Mfvw36XIgR25+WQAlEi7NLboqYTOPuzmFjJnryx9HVGDaStCe"
            }
            Alphabet::Signing => {
                "Dkdpgh2ZmsQB80/MfvV36XI1R45-WUAlEixNLwoqYTOPuzKFjJnry79HbGcaStCe"
            }
        }
    }

    pub const ALL: [Alphabet; 5] = [
        Alphabet::Standard,
        Alphabet::Plus,
        Alphabet::Dash,
        Alphabet::Obfuscated,
        Alphabet::Signing,
    ];
}

/// Encode a sequence of code units with one of the custom tables.
///
/// Units are u32 rather than bytes on purpose: the high-order timestamp
/// words in the signed frame exceed 255 and their ninth bit spills into the
/// neighboring 6-bit group, exactly like a JS char code would.
pub fn encode_units(units: &[u32], alphabet: Alphabet) -> String {
    let table = alphabet.table().as_bytes();
    let mut out = String::with_capacity(units.len().div_ceil(3) * 4);
    let mut i = 0;
    while i < units.len() {
        let n = if i + 2 < units.len() {
            (units[i] << 16) | (units[i + 1] << 8) | units[i + 2]
        } else if i + 1 < units.len() {
            (units[i] << 16) | (units[i + 1] << 8)
        } else {
            units[i] << 16
        };
        for (shift, mask) in [(18u32, 0xFC0000u32), (12, 0x03F000), (6, 0x0FC0), (0, 0x3F)] {
            if shift == 6 && i + 1 >= units.len() {
                break;
            }
            if shift == 0 && i + 2 >= units.len() {
                break;
            }
            out.push(table[((n & mask) >> shift) as usize] as char);
        }
        i += 3;
    }
    let pad = (4 - out.len() % 4) % 4;
    for _ in 0..pad {
        out.push('=');
    }
    out
}

pub fn encode_bytes(bytes: &[u8], alphabet: Alphabet) -> String {
    let units: Vec<u32> = bytes.iter().map(|&b| b as u32).collect();
    encode_units(&units, alphabet)
}

/// Inverse of `encode_units` for units that fit in a byte. Spilled bits of
/// oversized units are folded into their neighbors and cannot be undone, so
/// this is a diagnostic aid, not a general inverse.
pub fn decode_units(encoded: &str, alphabet: Alphabet) -> Option<Vec<u32>> {
    let table = alphabet.table().as_bytes();
    let index_of = |ch: char| -> Option<u32> {
        table.iter().position(|&b| b as char == ch).map(|p| p as u32)
    };
    let trimmed = encoded.trim_end_matches('=');
    let mut out = Vec::with_capacity(trimmed.len() / 4 * 3);
    let chars: Vec<char> = trimmed.chars().collect();
    for group in chars.chunks(4) {
        let mut n = 0u32;
        for (pos, &ch) in group.iter().enumerate() {
            n |= index_of(ch)? << (18 - 6 * pos as u32);
        }
        match group.len() {
            4 => {
                out.push((n >> 16) & 0xFF);
                out.push((n >> 8) & 0xFF);
                out.push(n & 0xFF);
            }
            3 => {
                out.push((n >> 16) & 0xFF);
                out.push((n >> 8) & 0xFF);
            }
            2 => out.push((n >> 16) & 0xFF),
            _ => return None,
        }
    }
    Some(out)
}

/// RC4 over code units. The key schedule is plain byte RC4; the keystream
/// is XORed into each unit, so units above 255 keep their high bits.
pub fn rc4(key: &[u8], data: &[u32]) -> Vec<u32> {
    let mut s: [u8; 256] = std::array::from_fn(|i| i as u8);
    let mut j = 0usize;
    for i in 0..256 {
        j = (j + s[i] as usize + key[i % key.len()] as usize) % 256;
        s.swap(i, j);
    }
    let mut i = 0usize;
    let mut j = 0usize;
    let mut cipher = Vec::with_capacity(data.len());
    for &unit in data {
        i = (i + 1) % 256;
        j = (j + s[i] as usize) % 256;
        s.swap(i, j);
        let t = (s[i] as usize + s[j] as usize) % 256;
        cipher.push(s[t] as u32 ^ unit);
    }
    cipher
}

pub fn rc4_bytes(key: &[u8], data: &[u8]) -> Vec<u32> {
    let units: Vec<u32> = data.iter().map(|&b| b as u32).collect();
    rc4(key, &units)
}
