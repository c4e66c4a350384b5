//! The check service: one index lookup per request, plus a strength estimate when the
//! caller sent a plaintext password.

use std::sync::Arc;

use pwned_index::{CredentialDigest, DigestAlgorithm, SharedIndex, Sha1Algorithm};
use pwned_strength::{StrengthEstimator, StrengthReport};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::error;

use crate::error::CheckError;

#[derive(Debug)]
pub enum CheckRequest {
    Hash(CredentialDigest),
    Password(SecretString),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResponse {
    pub pwned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<StrengthReport>,
}

/// Answers breach checks against the injected index. Cheap to share: lookups take `&self`
/// and the index itself sits behind [`SharedIndex`].
pub struct CheckService {
    index: SharedIndex,
    algorithm: Arc<dyn DigestAlgorithm>,
    estimator: StrengthEstimator,
}

impl CheckService {
    /// Service over a SHA1 corpus with the default strength estimator.
    pub fn new(index: SharedIndex) -> Self {
        Self { index, algorithm: Arc::new(Sha1Algorithm), estimator: StrengthEstimator::new() }
    }

    pub fn with_algorithm(mut self, algorithm: Arc<dyn DigestAlgorithm>) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_estimator(mut self, estimator: StrengthEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    pub fn check(&self, request: CheckRequest) -> Result<CheckResponse, CheckError> {
        match request {
            CheckRequest::Hash(digest) => self.check_hash(&digest),
            CheckRequest::Password(password) => self.check_password(&password),
        }
    }

    pub fn check_hash(&self, digest: &CredentialDigest) -> Result<CheckResponse, CheckError> {
        Ok(CheckResponse { pwned: self.lookup(digest)?, strength: None })
    }

    /// Parses `hex` (any case) with the service's digest algorithm, then checks it. Malformed
    /// input is rejected before the index is touched.
    pub fn check_hash_hex(&self, hex: &str) -> Result<CheckResponse, CheckError> {
        let digest = self.algorithm.parse_hex(hex)?;
        self.check_hash(&digest)
    }

    pub fn check_password(&self, password: &SecretString) -> Result<CheckResponse, CheckError> {
        let plaintext = password.expose_secret();
        let strength = self.estimator.estimate(plaintext)?;
        let digest = self.algorithm.digest(plaintext.as_bytes());
        Ok(CheckResponse { pwned: self.lookup(&digest)?, strength: Some(strength) })
    }

    fn lookup(&self, digest: &CredentialDigest) -> Result<bool, CheckError> {
        self.index.current().contains(digest).map_err(|err| {
            error!(error = %err, algorithm = self.algorithm.name(), "index lookup failed");
            CheckError::InternalLookup(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use hex_literal::hex;
    use pwned_index::{HashIndex, LookupError, SortedIndex, sha1};
    use rand::distributions::Alphanumeric;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    const PASSWORD_SHA1: [u8; 20] = hex!("5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8");
    const I_LOVE_DOGS_SHA1: [u8; 20] = hex!("c524a39c02f142ba0b81da289f2e11332d59b4dd");

    fn service() -> CheckService {
        let corpus = ["password", "i love dogs", "123456", "qwerty", "monkey"];
        let index = SortedIndex::from_digests(corpus.iter().map(|p| sha1(p.as_bytes()))).unwrap();
        CheckService::new(SharedIndex::from_index(index))
    }

    fn secret(password: &str) -> SecretString {
        SecretString::from(password.to_owned())
    }

    fn random_password(rng: &mut StdRng) -> String {
        rng.sample_iter(Alphanumeric).take(16).map(char::from).collect()
    }

    struct BrokenIndex;

    impl HashIndex for BrokenIndex {
        fn contains(&self, _: &CredentialDigest) -> Result<bool, LookupError> {
            Err(LookupError::Io(io::Error::other("disk went away")))
        }

        fn count(&self) -> u64 {
            1
        }
    }

    #[test]
    fn test_fixture_digests() {
        let service = service();
        let digest = CredentialDigest::from_bytes(&PASSWORD_SHA1).unwrap();
        let response = service.check_hash(&digest).unwrap();
        assert_eq!(response, CheckResponse { pwned: true, strength: None });

        let digest = CredentialDigest::from_bytes(&I_LOVE_DOGS_SHA1).unwrap();
        assert!(service.check_hash(&digest).unwrap().pwned);
    }

    #[test]
    fn test_password_path() {
        let service = service();
        let response = service.check_password(&secret("password")).unwrap();
        assert!(response.pwned);
        let strength = response.strength.unwrap();
        assert_eq!(strength.score, 0);

        assert!(service.check_password(&secret("i love dogs")).unwrap().pwned);
    }

    #[test]
    fn test_password_agrees_with_hash() {
        let service = service();
        let mut rng = StdRng::seed_from_u64(8);
        let mut candidates: Vec<String> = (0..32).map(|_| random_password(&mut rng)).collect();
        candidates.extend(["password", "monkey", "", "Password"].map(String::from));

        for password in candidates {
            let by_password = service.check_password(&secret(&password)).unwrap();
            let by_hash = service.check_hash(&sha1(password.as_bytes())).unwrap();
            assert_eq!(by_password.pwned, by_hash.pwned, "{password}");
            assert!(by_password.strength.is_some());
            assert!(by_hash.strength.is_none());
        }
    }

    #[test]
    fn test_random_password_not_pwned() {
        let service = service();
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..16 {
            let password = random_password(&mut rng);
            let response = service.check_password(&secret(&password)).unwrap();
            assert!(!response.pwned);
            assert!(response.strength.is_some());
        }
    }

    #[test]
    fn test_hex_parsing_is_case_insensitive() {
        let service = service();
        let lower = service.check_hash_hex("5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8").unwrap();
        let upper = service.check_hash_hex("5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8").unwrap();
        assert!(lower.pwned);
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_malformed_hashes_are_rejected() {
        let service = service();
        let malformed = [
            "",
            "5baa61e4",
            "zzaa61e4c9b93f3f0682250b6cf8331b7ee68fd8",
            "5baa61e4c9b93f3f0682250b6cf8331b7ee68fd800",
            " 5baa61e4c9b93f3f0682250b6cf8331b7ee68fd8",
        ];
        for hex in malformed {
            let err = service.check_hash_hex(hex).unwrap_err();
            assert!(matches!(err, CheckError::InvalidDigest(_)), "{hex}: {err:?}");
        }
    }

    #[test]
    fn test_too_long_password() {
        let service = service().with_estimator(StrengthEstimator::with_max_len(8));
        let err = service.check_password(&secret("123456789")).unwrap_err();
        assert!(matches!(err, CheckError::InputTooLong(_)));
        assert!(!err.to_string().contains("123456789"));
    }

    #[test]
    fn test_lookup_failure_is_not_a_negative() {
        let service = CheckService::new(SharedIndex::from_index(BrokenIndex));
        let err = service.check(CheckRequest::Hash(sha1(b"password"))).unwrap_err();
        assert!(matches!(err, CheckError::InternalLookup(_)));
        let err = service.check(CheckRequest::Password(secret("password"))).unwrap_err();
        assert!(matches!(err, CheckError::InternalLookup(_)));
    }

    struct Peppered;

    impl DigestAlgorithm for Peppered {
        fn name(&self) -> &'static str {
            "sha1-peppered"
        }

        fn digest_len(&self) -> usize {
            20
        }

        fn digest(&self, plaintext: &[u8]) -> CredentialDigest {
            sha1(&[b"pepper:".as_slice(), plaintext].concat())
        }
    }

    #[test]
    fn test_custom_algorithm() {
        let index = SortedIndex::from_digests([Peppered.digest(b"password")]).unwrap();
        let shared = SharedIndex::from_index(index);

        let peppered = CheckService::new(shared.clone()).with_algorithm(Arc::new(Peppered));
        assert!(peppered.check_password(&secret("password")).unwrap().pwned);

        let plain = CheckService::new(shared);
        assert!(!plain.check_password(&secret("password")).unwrap().pwned);
    }

    #[test]
    fn test_response_serialization() {
        let service = service();
        let json = serde_json::to_value(service.check_hash(&sha1(b"password")).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "pwned": true }));

        let response = service.check_password(&secret("password")).unwrap();
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["pwned"], true);
        assert_eq!(json["strength"]["score"], 0);
        assert!(json["strength"]["crackTimeDisplay"].is_string());
    }
}
