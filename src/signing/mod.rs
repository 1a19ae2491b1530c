//! Request-signing engine for the private web API.
//!
//! A token is built in four layers: a 12-unit masked-random preamble, a
//! fixed 44-entry frame mixing timestamps with digests of the query string,
//! HTTP method and user agent, the char codes of a static browser
//! fingerprint, and a trailing XOR checksum of the frame. Everything after
//! the preamble is RC4-encrypted and the whole thing is rendered with the
//! signing alphabet.

pub mod encoding;
pub mod hash;

use rand::Rng;

use encoding::Alphabet;

/// Entries in the fixed frame, including the leading length marker.
pub const FRAME_LEN: usize = 44;
/// Units of masked random noise prepended to the encrypted tail.
pub const PREAMBLE_LEN: usize = 12;

/// Static desktop fingerprint baked into every token.
pub const BROWSER_FINGERPRINT: &str =
    "1536|742|1536|864|0|0|0|0|1536|864|1536|864|1536|742|24|24|Win32";

const UA_RC4_KEY: [u8; 3] = [0, 1, 14];
const FRAME_RC4_KEY: &[u8] = b"y";

/// Signs query strings for one user agent. The user-agent digest is the
/// expensive part and is computed once at construction.
pub struct SignatureEngine {
    ua_digest: [u8; 32],
    fingerprint_units: Vec<u32>,
}

impl SignatureEngine {
    pub fn new(user_agent: &str) -> Self {
        let cipher = encoding::rc4_bytes(&UA_RC4_KEY, user_agent.as_bytes());
        let encoded = encoding::encode_units(&cipher, Alphabet::Obfuscated);
        let ua_digest = hash::sm3(encoded.as_bytes());
        let fingerprint_units = BROWSER_FINGERPRINT.chars().map(|c| c as u32).collect();
        Self {
            ua_digest,
            fingerprint_units,
        }
    }

    /// Produce an `a_bogus` token for a percent-encoded query string. The
    /// query must not yet contain the token parameter itself.
    pub fn sign(&self, query: &str, method: &str) -> String {
        let mut rng = rand::rng();
        let start_ms = chrono::Utc::now().timestamp_millis() as u64;
        let end_ms = start_ms + rng.random_range(4..=8);
        let seeds = [
            rng.random_range(0..10000u32),
            rng.random_range(0..10000u32),
            rng.random_range(0..10000u32),
        ];
        self.sign_at(query, method, start_ms, end_ms, seeds)
    }

    fn sign_at(
        &self,
        query: &str,
        method: &str,
        start_ms: u64,
        end_ms: u64,
        seeds: [u32; 3],
    ) -> String {
        let frame = self.frame(query, method, start_ms, end_ms);
        let checksum = frame.iter().fold(0u32, |acc, &v| acc ^ v);

        let mut tail: Vec<u32> = Vec::with_capacity(FRAME_LEN + self.fingerprint_units.len() + 1);
        tail.extend_from_slice(&frame);
        tail.extend_from_slice(&self.fingerprint_units);
        tail.push(checksum);

        let mut units = noise_preamble(seeds);
        units.extend(encoding::rc4(FRAME_RC4_KEY, &tail));
        encoding::encode_units(&units, Alphabet::Signing)
    }

    fn frame(&self, query: &str, method: &str, start_ms: u64, end_ms: u64) -> [u32; FRAME_LEN] {
        let params = hash::salted_double_sm3(query.as_bytes());
        let meth = hash::salted_double_sm3(method.as_bytes());
        let ua = &self.ua_digest;
        let eb = |shift: u32| ((end_ms >> shift) & 0xFF) as u32;
        let sb = |shift: u32| ((start_ms >> shift) & 0xFF) as u32;
        [
            44,
            eb(24),
            0,
            0,
            0,
            0,
            24,
            params[21] as u32,
            meth[21] as u32,
            0,
            ua[23] as u32,
            eb(16),
            0,
            0,
            0,
            1,
            0,
            239,
            params[22] as u32,
            meth[22] as u32,
            ua[24] as u32,
            eb(8),
            0,
            0,
            0,
            0,
            eb(0),
            0,
            0,
            14,
            sb(24),
            sb(16),
            0,
            sb(8),
            sb(0),
            3,
            // Epoch milliseconds no longer fit in 32 bits; these words run
            // past 255 and are carried as-is.
            (end_ms >> 32) as u32,
            1,
            (start_ms >> 32) as u32,
            1,
            self.fingerprint_units.len() as u32,
            0,
            0,
            0,
        ]
    }
}

/// Three masked quads of pseudo-random noise, 12 units total.
fn noise_preamble(seeds: [u32; 3]) -> Vec<u32> {
    let mut out = Vec::with_capacity(PREAMBLE_LEN);
    out.extend(masked_quad(seeds[0], 1, 2, 5, 40));
    out.extend(masked_quad(seeds[1], 1, 0, 0, 0));
    out.extend(masked_quad(seeds[2], 1, 0, 5, 0));
    out
}

fn masked_quad(seed: u32, d: u32, e: u32, f: u32, g: u32) -> [u32; 4] {
    let lo = seed & 0xFF;
    let hi = seed >> 8;
    [lo & 170 | d, lo & 85 | e, hi & 170 | f, hi & 85 | g]
}
