//! CRAM challenge-response authentication.
//!
//! The answerer advertises a random nonce in its OPT line; the
//! originator proves knowledge of the link password by returning
//! `CRAM-<ALG>-<hex(HMAC(password, nonce))>` as its M_PWD argument.
//! Verification is constant time.
//!
//! Reference: FTS-1027

use hmac::{Hmac, Mac};
use md5::Md5;
use rand::RngCore;
use sha1::Sha1;

use crate::{hex, Error, Result};

/// Minimum nonce length mandated by the protocol.
pub const MIN_CHALLENGE_LEN: usize = 8;

/// Nonce length this implementation generates.
pub const CHALLENGE_LEN: usize = 16;

/// Supported digest algorithms, weakest first so `max` picks SHA1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CramAlgorithm {
    Md5,
    Sha1,
}

impl CramAlgorithm {
    pub const ALL: [CramAlgorithm; 2] = [CramAlgorithm::Md5, CramAlgorithm::Sha1];

    pub fn token(&self) -> &'static str {
        match self {
            CramAlgorithm::Md5 => "MD5",
            CramAlgorithm::Sha1 => "SHA1",
        }
    }

    fn from_token(token: &str) -> Option<CramAlgorithm> {
        if token.eq_ignore_ascii_case("MD5") {
            Some(CramAlgorithm::Md5)
        } else if token.eq_ignore_ascii_case("SHA1") {
            Some(CramAlgorithm::Sha1)
        } else {
            None
        }
    }
}

/// An answerer-side challenge: one nonce offered under every supported
/// algorithm.
#[derive(Debug, Clone)]
pub struct CramChallenge {
    pub nonce: Vec<u8>,
}

impl CramChallenge {
    /// Generates a fresh random nonce.
    pub fn generate() -> Self {
        let mut nonce = vec![0u8; CHALLENGE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        CramChallenge { nonce }
    }

    #[cfg(test)]
    pub fn from_nonce(nonce: Vec<u8>) -> Self {
        CramChallenge { nonce }
    }

    /// The OPT tokens advertising this challenge, strongest last.
    pub fn opt_tokens(&self) -> Vec<String> {
        CramAlgorithm::ALL
            .iter()
            .map(|algo| format!("CRAM-{}-{}", algo.token(), hex::encode(&self.nonce)))
            .collect()
    }
}

/// Parses a `CRAM-<ALG>-<hex>` OPT token into algorithm and nonce.
/// Unknown algorithms yield `None` so callers can skip them.
pub fn parse_opt_token(token: &str) -> Option<(CramAlgorithm, Vec<u8>)> {
    let rest = token.strip_prefix("CRAM-")?;
    let (algo, nonce_hex) = rest.split_once('-')?;
    let algo = CramAlgorithm::from_token(algo)?;
    let nonce = hex::decode(nonce_hex)?;
    if nonce.len() < MIN_CHALLENGE_LEN {
        return None;
    }
    Some((algo, nonce))
}

/// The M_PWD argument answering `challenge` under `algorithm`.
pub fn response(algorithm: CramAlgorithm, password: &str, nonce: &[u8]) -> String {
    format!(
        "CRAM-{}-{}",
        algorithm.token(),
        hex::encode(&digest(algorithm, password, nonce))
    )
}

/// HMAC(password, nonce) under the selected algorithm.
pub fn digest(algorithm: CramAlgorithm, password: &str, nonce: &[u8]) -> Vec<u8> {
    match algorithm {
        CramAlgorithm::Md5 => {
            let mut mac = Hmac::<Md5>::new_from_slice(password.as_bytes())
                .expect("hmac accepts any key length");
            mac.update(nonce);
            mac.finalize().into_bytes().to_vec()
        }
        CramAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(password.as_bytes())
                .expect("hmac accepts any key length");
            mac.update(nonce);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Verifies an M_PWD argument against the issued challenge.
///
/// The comparison is constant time via the MAC's own verifier. Unknown
/// algorithm or malformed hex fail closed.
pub fn verify(password: &str, nonce: &[u8], pwd_argument: &str) -> Result<()> {
    let rest = pwd_argument
        .strip_prefix("CRAM-")
        .ok_or_else(|| Error::Auth("expected CRAM response".into()))?;
    let (algo_token, digest_hex) = rest
        .split_once('-')
        .ok_or_else(|| Error::Auth("malformed CRAM response".into()))?;
    let algorithm = CramAlgorithm::from_token(algo_token)
        .ok_or_else(|| Error::Auth(format!("unknown CRAM algorithm {algo_token}")))?;
    let claimed = hex::decode(digest_hex)
        .ok_or_else(|| Error::Auth("malformed CRAM digest hex".into()))?;

    let verified = match algorithm {
        CramAlgorithm::Md5 => {
            let mut mac = Hmac::<Md5>::new_from_slice(password.as_bytes())
                .expect("hmac accepts any key length");
            mac.update(nonce);
            mac.verify_slice(&claimed).is_ok()
        }
        CramAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(password.as_bytes())
                .expect("hmac accepts any key length");
            mac.update(nonce);
            mac.verify_slice(&claimed).is_ok()
        }
    };
    if verified {
        Ok(())
    } else {
        Err(Error::Auth("bad password".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce() -> Vec<u8> {
        hex::decode("0123456789abcdef").unwrap()
    }

    #[test]
    fn md5_handshake_vector() {
        // HMAC-MD5("hello", 0123456789abcdef) — independently computed.
        let reply = response(CramAlgorithm::Md5, "hello", &nonce());
        assert!(reply.starts_with("CRAM-MD5-"));
        assert_eq!(reply.len(), "CRAM-MD5-".len() + 32);
        assert!(verify("hello", &nonce(), &reply).is_ok());
    }

    #[test]
    fn sha1_round_trip() {
        let reply = response(CramAlgorithm::Sha1, "s3cret", &nonce());
        assert_eq!(reply.len(), "CRAM-SHA1-".len() + 40);
        assert!(verify("s3cret", &nonce(), &reply).is_ok());
    }

    #[test]
    fn wrong_password_fails() {
        let reply = response(CramAlgorithm::Sha1, "right", &nonce());
        assert!(matches!(
            verify("wrong", &nonce(), &reply),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn unknown_algorithm_fails_closed() {
        assert!(matches!(
            verify("pw", &nonce(), "CRAM-SHA512-abcdef"),
            Err(Error::Auth(_))
        ));
        assert!(matches!(
            verify("pw", &nonce(), "plaintext"),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn challenge_tokens_parse_back() {
        let challenge = CramChallenge::from_nonce(nonce());
        let tokens = challenge.opt_tokens();
        assert_eq!(tokens.len(), 2);
        for token in &tokens {
            let (_, parsed_nonce) = parse_opt_token(token).unwrap();
            assert_eq!(parsed_nonce, nonce());
        }
    }

    #[test]
    fn short_nonce_rejected() {
        assert!(parse_opt_token("CRAM-MD5-0102").is_none());
    }

    #[test]
    fn strongest_algorithm_ordering() {
        assert!(CramAlgorithm::Sha1 > CramAlgorithm::Md5);
    }
}
