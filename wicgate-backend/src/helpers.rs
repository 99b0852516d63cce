use sha2::{Digest, Sha256};

pub fn hash_token(token: &str) -> String {
  format!("{:x}", Sha256::digest(token.as_bytes()))
}
