/// Key layout for the `users` partition:
/// - `user:{telegram_id}` -> UserProfile (JSON)

pub fn encode_user_key(telegram_id: i64) -> Vec<u8> {
    format!("user:{}", telegram_id).into_bytes()
}

pub fn decode_user_key(key: &[u8]) -> Option<i64> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("user:")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_encoding() {
        let key = encode_user_key(123456789);
        assert_eq!(key, b"user:123456789");
        assert_eq!(decode_user_key(&key), Some(123456789));
    }

    #[test]
    fn test_decode_rejects_foreign_keys() {
        assert_eq!(decode_user_key(b"job:1"), None);
        assert_eq!(decode_user_key(b"user:abc"), None);
    }
}
