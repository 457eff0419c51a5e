//! OTP service: atomic issuance, rate limiting, and lockout on top of `OtpRepository`
//! (§4.C6). Codes are hashed with SHA-256 salted by the OTP row id before storage —
//! nothing that looks like a plaintext code is ever persisted.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config::DispatchConfig;
use crate::db::otp_repo::OtpRepository;
use crate::errors::{DispatchError, DispatchResult};
use crate::messaging::MessageProvider;

fn hash_code(id: uuid::Uuid, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

/// An opaque bearer token minted on successful verification. Storing and decoding it
/// on subsequent requests is the HTTP layer's job (§1's pluggable `TokenVerifier`
/// boundary); this service only mints the value.
pub fn mint_access_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

pub struct OtpService {
    repo: OtpRepository,
    provider: Arc<dyn MessageProvider>,
    config: DispatchConfig,
}

impl OtpService {
    pub fn new(repo: OtpRepository, provider: Arc<dyn MessageProvider>, config: DispatchConfig) -> Self {
        Self {
            repo,
            provider,
            config,
        }
    }

    fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
        now.date_naive()
            .and_hms_opt(now.time().hour(), 0, 0)
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
            .unwrap_or(now)
    }

    /// Step 1–3 of §4.C6: check lockout, check the sliding-window rate limit, then
    /// atomically replace any unverified OTP and send it.
    pub async fn request_otp(&self, phone: &str) -> DispatchResult<()> {
        if let Some(lock) = self.repo.find_lock(phone).await? {
            if let Some(until) = lock.locked_until {
                if until > Utc::now() {
                    return Err(DispatchError::Locked { until });
                }
            }
        }

        let now = Utc::now();
        let window = Self::window_start(now);
        let count = self.repo.increment_rate_window(phone, window).await?;
        if count > self.config.otp_max_per_hour as i32 {
            return Err(DispatchError::RateLimited {
                retry_after_sec: (window + ChronoDuration::hours(1) - now).num_seconds().max(0),
            });
        }

        let code = generate_code();
        let id = uuid::Uuid::new_v4();
        let code_hash = hash_code(id, &code);

        let record = match self
            .repo
            .replace_unverified(id, phone, &code_hash, self.config.otp_ttl_min)
            .await
        {
            Ok(record) => record,
            Err(DispatchError::Conflict(_)) => {
                // Lost the race; a fresh id produces a fresh hash for the retry.
                let retry_id = uuid::Uuid::new_v4();
                let retry_hash = hash_code(retry_id, &code);
                self.repo
                    .replace_unverified(retry_id, phone, &retry_hash, self.config.otp_ttl_min)
                    .await?
            }
            Err(e) => return Err(e),
        };

        let message_id = self
            .provider
            .send_template(phone, "otp_code", &[("code", code.as_str())])
            .await
            .map_err(|e| DispatchError::internal_msg(e.to_string()))?;
        self.repo.set_message_id(record.id, &message_id).await?;

        Ok(())
    }

    /// Step 4 of §4.C6: verify the submitted code against the stored hash, resetting
    /// the lock on success and recording a failed attempt (possibly crossing the
    /// lockout threshold) on failure.
    pub async fn verify_otp(&self, phone: &str, submitted_code: &str) -> DispatchResult<String> {
        if let Some(lock) = self.repo.find_lock(phone).await? {
            if let Some(until) = lock.locked_until {
                if until > Utc::now() {
                    return Err(DispatchError::Locked { until });
                }
            }
        }

        let record = self
            .repo
            .find_unverified(phone)
            .await?
            .ok_or_else(|| DispatchError::NotFound("otp".into()))?;

        if record.expires_at < Utc::now() {
            return Err(DispatchError::NotFound("otp".into()));
        }

        let expected_hash = hash_code(record.id, submitted_code);
        if expected_hash != record.code_hash {
            self.repo
                .record_failed_attempt(
                    phone,
                    self.config.otp_lock_threshold,
                    self.config.otp_lock_minutes,
                )
                .await?;
            return Err(DispatchError::ValidationFailed(vec![crate::errors::FieldError {
                field: "code".into(),
                message: "incorrect code".into(),
            }]));
        }

        self.repo.mark_verified(record.id).await?;
        self.repo.reset_lock(phone).await?;
        Ok(mint_access_token())
    }

    pub async fn sweep_expired(&self) -> DispatchResult<(u64, u64)> {
        self.repo.sweep_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_for_same_id_and_code() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(hash_code(id, "123456"), hash_code(id, "123456"));
    }

    #[test]
    fn hash_differs_across_ids_for_same_code() {
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        assert_ne!(hash_code(a, "123456"), hash_code(b, "123456"));
    }

    #[test]
    fn generated_code_is_six_digits() {
        let code = generate_code();
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn access_token_is_64_hex_chars() {
        let token = mint_access_token();
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
