//! Shared test fixtures: an in-memory store and a recording notifier so
//! the engine's flows run without a database or mail delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

use pordisto::auth::notify::Notifier;
use pordisto::auth::otp::OtpPurpose;
use pordisto::auth::store::{AuthStore, NewUser, OtpRecord, RefreshTokenRecord, UserRecord};
use pordisto::auth::{AuthConfig, AuthEngine};

#[derive(Default)]
struct State {
    users: Vec<UserRecord>,
    otps: Vec<OtpRecord>,
    tokens: Vec<RefreshTokenRecord>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Clones share the same state, so tests can keep a handle for
/// inspection while the engine owns its own copy.
#[derive(Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<State>>,
}

impl MemStore {
    pub fn seed_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        is_active: bool,
        email_verified: bool,
    ) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.users.push(UserRecord {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_active,
            email_verified,
            created_at: Utc::now(),
            updated_at: None,
        });
        id
    }

    pub fn seed_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        is_verified: bool,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.otps.push(OtpRecord {
            id,
            identifier: email.to_string(),
            code: code.to_string(),
            purpose,
            attempts: 0,
            is_verified,
            created_at,
            expires_at,
        });
    }

    /// Code of the newest unverified OTP, the one a real user would have
    /// received by email.
    pub fn latest_code(&self, email: &str, purpose: OtpPurpose) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .otps
            .iter()
            .filter(|o| o.identifier == email && o.purpose == purpose && !o.is_verified)
            .max_by_key(|o| (o.created_at, o.id))
            .map(|o| o.code.clone())
    }

    pub fn unverified_count(&self, email: &str, purpose: OtpPurpose) -> usize {
        let state = self.state.lock().unwrap();
        state
            .otps
            .iter()
            .filter(|o| o.identifier == email && o.purpose == purpose && !o.is_verified)
            .count()
    }

    pub fn otp_count(&self, email: &str, purpose: OtpPurpose) -> usize {
        let state = self.state.lock().unwrap();
        state
            .otps
            .iter()
            .filter(|o| o.identifier == email && o.purpose == purpose)
            .count()
    }

    pub fn expire_latest_otp(&self, email: &str, purpose: OtpPurpose) {
        let mut state = self.state.lock().unwrap();
        if let Some(otp) = state
            .otps
            .iter_mut()
            .filter(|o| o.identifier == email && o.purpose == purpose && !o.is_verified)
            .max_by_key(|o| o.created_at)
        {
            otp.expires_at = Utc::now() - Duration::minutes(1);
        }
    }

    /// Backdate the newest unverified OTP so the resend cooldown no
    /// longer applies to it.
    pub fn age_latest_otp(&self, email: &str, purpose: OtpPurpose, seconds: i64) {
        let mut state = self.state.lock().unwrap();
        if let Some(otp) = state
            .otps
            .iter_mut()
            .filter(|o| o.identifier == email && o.purpose == purpose && !o.is_verified)
            .max_by_key(|o| o.created_at)
        {
            otp.created_at -= Duration::seconds(seconds);
        }
    }

    pub fn set_active(&self, user_id: i64, is_active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
            user.is_active = is_active;
        }
    }

    pub fn active_token_count(&self, user_id: i64) -> usize {
        let state = self.state.lock().unwrap();
        state
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && !t.revoked)
            .count()
    }
}

impl AuthStore for MemStore {
    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn replace_otp(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<OtpRecord> {
        let mut state = self.state.lock().unwrap();
        state
            .otps
            .retain(|o| !(o.identifier == identifier && o.purpose == purpose && !o.is_verified));
        let id = state.next_id();
        let record = OtpRecord {
            id,
            identifier: identifier.to_string(),
            code: code.to_string(),
            purpose,
            attempts: 0,
            is_verified: false,
            created_at: Utc::now(),
            expires_at,
        };
        state.otps.push(record.clone());
        Ok(record)
    }

    async fn latest_unverified_otp(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .otps
            .iter()
            .filter(|o| o.identifier == identifier && o.purpose == purpose && !o.is_verified)
            .max_by_key(|o| (o.created_at, o.id))
            .cloned())
    }

    async fn record_failed_attempt(&self, otp_id: i64) -> Result<i32> {
        let mut state = self.state.lock().unwrap();
        let otp = state
            .otps
            .iter_mut()
            .find(|o| o.id == otp_id)
            .ok_or_else(|| anyhow!("otp {otp_id} not found"))?;
        otp.attempts += 1;
        Ok(otp.attempts)
    }

    async fn count_otps_created_since(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .otps
            .iter()
            .filter(|o| {
                o.identifier == identifier && o.purpose == purpose && o.created_at >= since
            })
            .count() as i64)
    }

    async fn create_verified_user(&self, user: NewUser, otp_id: i64) -> Result<UserRecord> {
        let mut state = self.state.lock().unwrap();
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(anyhow!("email already registered"));
        }
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(anyhow!("username already registered"));
        }
        let id = state.next_id();
        let record = UserRecord {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            is_active: true,
            email_verified: true,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.users.push(record.clone());
        if let Some(otp) = state.otps.iter_mut().find(|o| o.id == otp_id) {
            otp.is_verified = true;
        }
        Ok(record)
    }

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let record = RefreshTokenRecord {
            id,
            user_id,
            token: token.to_string(),
            expires_at,
            revoked: false,
        };
        state.tokens.push(record.clone());
        Ok(record)
    }

    async fn active_refresh_token(
        &self,
        token: &str,
        user_id: i64,
    ) -> Result<Option<RefreshTokenRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tokens
            .iter()
            .find(|t| t.token == token && t.user_id == user_id && !t.revoked)
            .cloned())
    }

    async fn revoke_refresh_token(&self, token_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(token) = state.tokens.iter_mut().find(|t| t.id == token_id) {
            token.revoked = true;
        }
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_token_id: i64,
        user_id: i64,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord> {
        let mut state = self.state.lock().unwrap();
        if let Some(token) = state.tokens.iter_mut().find(|t| t.id == old_token_id) {
            token.revoked = true;
        }
        let id = state.next_id();
        let record = RefreshTokenRecord {
            id,
            user_id,
            token: new_token.to_string(),
            expires_at,
            revoked: false,
        };
        state.tokens.push(record.clone());
        Ok(record)
    }

    async fn reset_password(&self, user_id: i64, password_hash: &str, otp_id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| anyhow!("user {user_id} not found"))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Some(Utc::now());
        if let Some(otp) = state.otps.iter_mut().find(|o| o.id == otp_id) {
            otp.is_verified = true;
        }
        for token in state.tokens.iter_mut().filter(|t| t.user_id == user_id) {
            token.revoked = true;
        }
        Ok(())
    }

    async fn change_password(&self, user_id: i64, password_hash: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| anyhow!("user {user_id} not found"))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Some(Utc::now());
        for token in state.tokens.iter_mut().filter(|t| t.user_id == user_id) {
            token.revoked = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub template: &'static str,
}

/// Records every send; flips to failing when a test wants to prove the
/// engine ignores delivery errors.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    fn record(&self, to: &str, template: &'static str) -> Result<()> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            template,
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("smtp unavailable"));
        }
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    async fn send_otp_email(&self, email: &str, _code: &str, _purpose: OtpPurpose) -> Result<()> {
        self.record(email, "otp")
    }

    async fn send_welcome_email(&self, email: &str, _username: &str) -> Result<()> {
        self.record(email, "welcome")
    }

    async fn send_password_reset_confirmation(&self, email: &str, _username: &str) -> Result<()> {
        self.record(email, "password_reset_confirmation")
    }

    async fn send_password_changed_email(&self, email: &str, _username: &str) -> Result<()> {
        self.record(email, "password_changed")
    }
}

pub fn test_config() -> AuthConfig {
    AuthConfig::new(SecretString::from("test-signing-secret".to_string()))
}

/// Engine over fresh in-memory state; the returned store and notifier
/// handles observe everything the engine does.
pub fn setup() -> (
    AuthEngine<MemStore, RecordingNotifier>,
    MemStore,
    RecordingNotifier,
) {
    setup_with(test_config())
}

pub fn setup_with(
    config: AuthConfig,
) -> (
    AuthEngine<MemStore, RecordingNotifier>,
    MemStore,
    RecordingNotifier,
) {
    let store = MemStore::default();
    let notifier = RecordingNotifier::default();
    let engine = AuthEngine::new(store.clone(), notifier.clone(), config);
    (engine, store, notifier)
}
