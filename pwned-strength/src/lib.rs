//! Password strength estimation.
//!
//! Thin, bounded wrapper around [`zxcvbn`]: a password is decomposed into its cheapest
//! sequence of recognisable patterns (dictionary words, keyboard walks, repeats, sequences,
//! dates) and rated by the number of guesses an attacker who knows those patterns would need.
//! Inputs over a fixed length are refused before any matching runs.
//!
//! ```
//! use pwned_strength::StrengthEstimator;
//!
//! let report = StrengthEstimator::new().estimate("password").unwrap();
//! assert_eq!(report.score, 0);
//! ```

use serde::Serialize;
use thiserror::Error;
use zxcvbn::ZxcvbnError;
use zxcvbn::feedback::Suggestion;
use zxcvbn::time_estimates::CrackTimeSeconds;

/// Default limit on password length, in characters.
pub const DEFAULT_MAX_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("password is longer than {max} characters")]
pub struct InputTooLong {
    pub max: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrengthReport {
    /// 0 (too guessable) to 4 (very unguessable).
    pub score: u8,
    pub guesses: f64,
    pub guesses_log10: f64,
    /// Seconds, offline attack against a slow hash at 10^4 guesses per second.
    pub crack_time: f64,
    pub crack_time_display: String,
    pub feedback: Feedback,
}

impl StrengthReport {
    /// The report for an empty password: nothing to guess.
    fn blank() -> Self {
        let crack_time = CrackTimeSeconds::Integer(0);
        Self {
            score: 0,
            guesses: 1.0,
            guesses_log10: 0.0,
            crack_time: 0.0,
            crack_time_display: crack_time.to_string(),
            feedback: Feedback {
                warning: None,
                suggestions: vec![
                    Suggestion::UseAFewWordsAvoidCommonPhrases.to_string(),
                    Suggestion::NoNeedForSymbolsDigitsOrUppercaseLetters.to_string(),
                ],
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StrengthEstimator {
    max_len: usize,
}

impl Default for StrengthEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl StrengthEstimator {
    pub fn new() -> Self {
        Self { max_len: DEFAULT_MAX_LEN }
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self { max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Scores `password`. Fails only when it exceeds the configured length limit; nothing is
    /// scanned in that case.
    pub fn estimate(&self, password: &str) -> Result<StrengthReport, InputTooLong> {
        // a char is at most 4 bytes, so this rejects huge inputs without walking them
        if password.len() > self.max_len.saturating_mul(4)
            || password.chars().count() > self.max_len
        {
            return Err(InputTooLong { max: self.max_len });
        }

        let entropy = match zxcvbn::zxcvbn(password, &[]) {
            Ok(entropy) => entropy,
            Err(ZxcvbnError::BlankPassword) | Err(ZxcvbnError::DurationOutOfRange) => {
                return Ok(StrengthReport::blank());
            }
        };

        let slow_hash = entropy.crack_times().offline_slow_hashing_1e4_per_second();
        let crack_time = match slow_hash {
            CrackTimeSeconds::Integer(i) => i as f64,
            CrackTimeSeconds::Float(f) => f,
        };
        let feedback = entropy
            .feedback()
            .as_ref()
            .map(|feedback| Feedback {
                warning: feedback.warning().map(|warning| warning.to_string()),
                suggestions: feedback.suggestions().iter().map(ToString::to_string).collect(),
            })
            .unwrap_or_default();

        Ok(StrengthReport {
            score: entropy.score(),
            guesses: entropy.guesses() as f64,
            guesses_log10: entropy.guesses_log10(),
            crack_time,
            crack_time_display: slow_hash.to_string(),
            feedback,
        })
    }
}
