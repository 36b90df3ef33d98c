//! TOTP generation/verification and the multi-factor challenge state machine.
//!
//! Implements RFC 6238 TOTP over HMAC-SHA1 for the `totp` method; `sms`/`email`
//! compare a server-issued random code; `push` resolves once an out-of-band
//! approval flips the challenge to [`ChallengeStatus::Approved`]. All code
//! comparisons use [`subtle::ConstantTimeEq`] to avoid timing side channels.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::debug;
use uuid::Uuid;

use sark_core::PrincipalId;

use crate::error::{Result, SecurityError};

type HmacSha1 = Hmac<Sha1>;

/// Method used to satisfy an MFA challenge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MfaMethod {
    /// Time-based one-time password, RFC 6238.
    Totp,
    /// Server-generated numeric code delivered over SMS.
    Sms,
    /// Server-generated numeric code delivered over email.
    Email,
    /// Out-of-band approval on a trusted device.
    Push,
}

/// Lifecycle state of an MFA challenge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    /// Awaiting a response.
    Pending,
    /// Verified successfully.
    Approved,
    /// Rejected, either by exceeding `max_attempts` or an explicit wrong answer on the final try.
    Denied,
    /// The challenge's timeout elapsed before it was resolved.
    Expired,
}

/// Configuration for the MFA challenge subsystem.
#[derive(Clone, Copy, Debug)]
pub struct MfaConfig {
    /// Seconds before an unanswered challenge expires.
    pub timeout_seconds: i64,
    /// Digit length of server-generated SMS/email codes.
    pub code_length: usize,
    /// Attempts allowed before a challenge is denied.
    pub max_attempts: u32,
    /// Number of 30-second TOTP windows on each side of `now` accepted as valid.
    pub totp_window: i64,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 120,
            code_length: 6,
            max_attempts: 3,
            totp_window: 1,
        }
    }
}

/// A single outstanding (or resolved) MFA challenge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MfaChallenge {
    id: String,
    principal_id: PrincipalId,
    method: MfaMethod,
    code: Option<String>,
    created_at: i64,
    expires_at: i64,
    attempts: u32,
    max_attempts: u32,
    status: ChallengeStatus,
}

impl MfaChallenge {
    /// Opaque challenge identifier, safe to hand back to the client.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ChallengeStatus {
        self.status
    }

    /// Method this challenge expects.
    #[must_use]
    pub const fn method(&self) -> MfaMethod {
        self.method
    }

    /// Number of verification attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

/// Generates and verifies RFC 6238 TOTP codes.
#[derive(Clone, Copy, Debug, Default)]
pub struct TotpGenerator;

impl TotpGenerator {
    /// Creates a new generator. Stateless.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates a fresh base32-encoded 20-byte secret suitable for `secret`.
    #[must_use]
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes)
    }

    /// Generates the 6-digit code valid at `timestamp` for the given base32 `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidSecret`] if `secret` is not valid base32.
    pub fn generate_code(&self, secret: &str, timestamp: i64) -> Result<String> {
        let secret_bytes = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, secret)
            .ok_or_else(|| SecurityError::InvalidSecret("not valid base32".into()))?;

        let time_step = (timestamp / 30) as u64;
        let time_bytes = time_step.to_be_bytes();

        let mut mac = HmacSha1::new_from_slice(&secret_bytes)
            .map_err(|e| SecurityError::InvalidSecret(e.to_string()))?;
        mac.update(&time_bytes);
        let hmac_hash = mac.finalize().into_bytes();

        let offset = (hmac_hash[19] & 0x0F) as usize;
        let code_bytes = [
            hmac_hash[offset],
            hmac_hash[offset + 1],
            hmac_hash[offset + 2],
            hmac_hash[offset + 3],
        ];
        let code_int = u32::from_be_bytes(code_bytes) & 0x7FFF_FFFF;
        Ok(format!("{:06}", code_int % 1_000_000))
    }

    /// Verifies `code` against `secret`, accepting any window within `+-window` steps of now.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::InvalidSecret`] if `secret` is not valid base32.
    pub fn verify_code(&self, secret: &str, code: &str, timestamp: i64, window: i64) -> Result<bool> {
        for i in -window..=window {
            let candidate = self.generate_code(secret, timestamp + i * 30)?;
            if constant_time_eq(&candidate, code) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// In-memory challenge store and verification state machine.
pub struct MfaChallengeSystem {
    config: MfaConfig,
    totp: TotpGenerator,
    challenges: Arc<DashMap<String, MfaChallenge>>,
}

impl MfaChallengeSystem {
    /// Creates a new challenge system with the supplied configuration.
    #[must_use]
    pub fn new(config: MfaConfig) -> Self {
        Self {
            config,
            totp: TotpGenerator::new(),
            challenges: Arc::new(DashMap::new()),
        }
    }

    /// Creates a new challenge for `principal_id` using `method`.
    ///
    /// For SMS/email, returns the generated code alongside the challenge so the
    /// caller can deliver it out-of-band; for TOTP/push, the code is `None`.
    #[must_use]
    pub fn create_challenge(
        &self,
        principal_id: PrincipalId,
        method: MfaMethod,
    ) -> (MfaChallenge, Option<String>) {
        let now = now_unix();
        let id = Uuid::new_v4().to_string();

        let code = match method {
            MfaMethod::Sms | MfaMethod::Email => Some(generate_numeric_code(self.config.code_length)),
            MfaMethod::Totp | MfaMethod::Push => None,
        };

        let challenge = MfaChallenge {
            id: id.clone(),
            principal_id,
            method,
            code: code.clone(),
            created_at: now,
            expires_at: now + self.config.timeout_seconds,
            attempts: 0,
            max_attempts: self.config.max_attempts,
            status: ChallengeStatus::Pending,
        };

        self.challenges.insert(id, challenge.clone());
        (challenge, code)
    }

    /// Verifies a response to a challenge.
    ///
    /// `secret` is the principal's TOTP secret and is only consulted for
    /// [`MfaMethod::Totp`] challenges.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::ChallengeNotFound`] if no such challenge exists,
    /// or [`SecurityError::ChallengePrincipalMismatch`] if it belongs to another principal.
    pub fn verify_code(
        &self,
        challenge_id: &str,
        principal_id: PrincipalId,
        code: &str,
        secret: Option<&str>,
    ) -> Result<bool> {
        let mut entry = self
            .challenges
            .get_mut(challenge_id)
            .ok_or(SecurityError::ChallengeNotFound)?;

        if entry.principal_id != principal_id {
            return Err(SecurityError::ChallengePrincipalMismatch);
        }

        let now = now_unix();
        if now > entry.expires_at {
            entry.status = ChallengeStatus::Expired;
            return Ok(false);
        }

        entry.attempts += 1;
        if entry.attempts > entry.max_attempts {
            entry.status = ChallengeStatus::Denied;
            return Ok(false);
        }

        let valid = match entry.method {
            MfaMethod::Totp => {
                let secret = secret.ok_or_else(|| SecurityError::InvalidSecret("missing TOTP secret".into()))?;
                self.totp.verify_code(secret, code, now, self.config.totp_window)?
            }
            MfaMethod::Sms | MfaMethod::Email => {
                constant_time_eq(code, entry.code.as_deref().unwrap_or(""))
            }
            MfaMethod::Push => entry.status == ChallengeStatus::Approved,
        };

        if valid {
            entry.status = ChallengeStatus::Approved;
            debug!(challenge_id, "mfa challenge approved");
            Ok(true)
        } else {
            if entry.attempts >= entry.max_attempts {
                entry.status = ChallengeStatus::Denied;
            }
            Ok(false)
        }
    }

    /// Marks a push challenge as approved out-of-band (e.g. via a push notification callback).
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::ChallengeNotFound`] if no such challenge exists.
    pub fn approve_push(&self, challenge_id: &str) -> Result<()> {
        let mut entry = self
            .challenges
            .get_mut(challenge_id)
            .ok_or(SecurityError::ChallengeNotFound)?;
        entry.status = ChallengeStatus::Approved;
        Ok(())
    }

    /// Looks up a challenge by id without mutating it.
    #[must_use]
    pub fn get(&self, challenge_id: &str) -> Option<MfaChallenge> {
        self.challenges.get(challenge_id).map(|e| e.clone())
    }
}

fn generate_numeric_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + (rng.next_u32() % 10) as u8))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totp_round_trips_at_same_time_step() {
        let secret = TotpGenerator::generate_secret();
        let totp = TotpGenerator::new();
        let now = 1_700_000_000;
        let code = totp.generate_code(&secret, now).unwrap();
        assert!(totp.verify_code(&secret, &code, now, 1).unwrap());
    }

    #[test]
    fn totp_rejects_outside_window() {
        let secret = TotpGenerator::generate_secret();
        let totp = TotpGenerator::new();
        let now = 1_700_000_000;
        let code = totp.generate_code(&secret, now).unwrap();
        assert!(!totp.verify_code(&secret, &code, now + 300, 1).unwrap());
    }

    #[test]
    fn sms_challenge_denies_after_max_attempts() {
        let system = MfaChallengeSystem::new(MfaConfig {
            max_attempts: 2,
            ..MfaConfig::default()
        });
        let principal = PrincipalId::random();
        let (challenge, _code) = system.create_challenge(principal, MfaMethod::Sms);

        assert!(!system.verify_code(challenge.id(), principal, "000000", None).unwrap());
        assert!(!system.verify_code(challenge.id(), principal, "000000", None).unwrap());

        let stored = system.get(challenge.id()).unwrap();
        assert_eq!(stored.status(), ChallengeStatus::Denied);
    }

    #[test]
    fn sms_challenge_approves_with_correct_code() {
        let system = MfaChallengeSystem::new(MfaConfig::default());
        let principal = PrincipalId::random();
        let (challenge, code) = system.create_challenge(principal, MfaMethod::Sms);
        let code = code.unwrap();

        assert!(system.verify_code(challenge.id(), principal, &code, None).unwrap());
        assert_eq!(system.get(challenge.id()).unwrap().status(), ChallengeStatus::Approved);
    }

    #[test]
    fn wrong_principal_is_rejected() {
        let system = MfaChallengeSystem::new(MfaConfig::default());
        let principal = PrincipalId::random();
        let other = PrincipalId::random();
        let (challenge, _code) = system.create_challenge(principal, MfaMethod::Sms);

        let err = system.verify_code(challenge.id(), other, "000000", None).unwrap_err();
        assert!(matches!(err, SecurityError::ChallengePrincipalMismatch));
    }

    #[test]
    fn push_challenge_resolves_after_out_of_band_approval() {
        let system = MfaChallengeSystem::new(MfaConfig::default());
        let principal = PrincipalId::random();
        let (challenge, _code) = system.create_challenge(principal, MfaMethod::Push);

        system.approve_push(challenge.id()).unwrap();
        assert!(system.verify_code(challenge.id(), principal, "", None).unwrap());
    }
}
