use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use sha1::{Digest, Sha1};

const SCHEME: &str = "sha1";
const SALT_LEN: usize = 12;

/// `sha1$<base64 salt>$<base64 digest>`
pub fn hash_password(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    hash_with_salt(password, &salt)
}

fn hash_with_salt(password: &str, salt: &[u8]) -> String {
    format!(
        "{}${}${}",
        SCHEME,
        BASE64_ENGINE.encode(salt),
        BASE64_ENGINE.encode(digest(password, salt))
    )
}

fn digest(password: &str, salt: &[u8]) -> Vec<u8> {
    let mut sha1 = Sha1::new();
    sha1.update(salt);
    sha1.update(password.as_bytes());
    sha1.finalize().to_vec()
}

/// Stored values without the scheme prefix are legacy plaintext.
pub fn verify_password(stored: &str, attempt: &str) -> bool {
    let mut parts = stored.split('$');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(SCHEME), Some(salt), Some(expected), None) => {
            let (Ok(salt), Ok(expected)) = (BASE64_ENGINE.decode(salt), BASE64_ENGINE.decode(expected))
            else {
                return false;
            };
            let actual = digest(attempt, &salt);
            actual.len() == expected.len()
                && actual
                    .iter()
                    .zip(&expected)
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0
        }
        _ => stored == attempt,
    }
}
