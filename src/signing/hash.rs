use libsm::sm3::hash::Sm3Hash;

/// Salt appended to query/method strings before hashing.
const END_SALT: &[u8] = b"cus";

pub fn sm3(data: &[u8]) -> [u8; 32] {
    Sm3Hash::new(data).get_hash()
}

/// `sm3(sm3(data || "cus"))`, the digest shape the signed frame embeds for
/// both the query string and the HTTP method.
pub fn salted_double_sm3(data: &[u8]) -> [u8; 32] {
    let mut salted = Vec::with_capacity(data.len() + END_SALT.len());
    salted.extend_from_slice(data);
    salted.extend_from_slice(END_SALT);
    sm3(&sm3(&salted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    // Published SM3 test vectors (GB/T 32905-2016).
    #[test]
    fn sm3_abc_vector() {
        assert_eq!(
            hex(&sm3(b"abc")),
            "66c7f0f462eeedd9d1f2d46bdc10e4e24167c4875cf2f7a2297da02b8f4ba8e0"
        );
    }

    #[test]
    fn sm3_512bit_vector() {
        let msg = b"abcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcdabcd";
        assert_eq!(
            hex(&sm3(msg)),
            "debe9ff92275b8a138604889c18e5a4d6fdb70e5387e5765293dcba39c0c5732"
        );
    }

    #[test]
    fn salted_double_hash_differs_from_plain() {
        let plain = sm3(b"GET");
        let salted = salted_double_sm3(b"GET");
        assert_ne!(plain, salted);
        // Deterministic for a fixed input.
        assert_eq!(salted, salted_double_sm3(b"GET"));
    }
}
