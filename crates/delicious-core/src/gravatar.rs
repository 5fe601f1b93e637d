use md5::{Digest, Md5};

/// Avatar URL derived from the (normalized) email address.
pub fn gravatar_url(email: &str) -> String {
    let hash = Md5::digest(email.trim().to_lowercase().as_bytes());
    format!("https://gravatar.com/avatar/{}.jpg?s=200", hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_normalized_email() {
        assert_eq!(
            gravatar_url(" MyEmailAddress@example.com "),
            "https://gravatar.com/avatar/0bc83cb571cd1c50ba6f3e8a78ef1346.jpg?s=200"
        );
    }

    #[test]
    fn empty_email_still_builds_a_url() {
        assert_eq!(
            gravatar_url(""),
            "https://gravatar.com/avatar/d41d8cd98f00b204e9800998ecf8427e.jpg?s=200"
        );
    }
}
