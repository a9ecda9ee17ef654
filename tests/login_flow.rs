//! Full login flows with the real Argon2 hasher and TOTP provider.

mod common;

use base64::{engine::general_purpose::STANDARD as base64_engine, Engine as _};
use chrono::Duration;
use std::sync::Arc;

use auth_core::cache::InMemoryTokenCache;
use auth_core::clock::Clock;
use auth_core::db::InMemoryUserRepository;
use auth_core::security::mfa::{TotpLiteProvider, TotpProvider};
use auth_core::security::Argon2PasswordHasher;
use auth_core::token::TokenType;
use auth_core::{AuthError, AuthService, LoginOutcome};
use common::{test_config, ManualClock};

const EMAIL: &str = "user@example.com";
const PASSWORD: &str = "CorrectHorse9!";

fn service() -> (AuthService, Arc<InMemoryUserRepository>, Arc<ManualClock>) {
    let repo = Arc::new(InMemoryUserRepository::new());
    let clock = Arc::new(ManualClock::default());
    let service = AuthService::new(
        repo.clone(),
        Arc::new(InMemoryTokenCache::new()),
        Arc::new(Argon2PasswordHasher::new()),
        Arc::new(TotpLiteProvider),
        clock.clone(),
        Arc::new(test_config()),
    )
    .unwrap();
    (service, repo, clock)
}

fn completed(outcome: LoginOutcome) -> auth_core::SessionTokens {
    match outcome {
        LoginOutcome::Complete(session) => session,
        LoginOutcome::MfaRequired { .. } => panic!("unexpected MFA pause"),
    }
}

#[tokio::test]
async fn register_login_refresh_logout() {
    let (service, _, _) = service();
    service.register(EMAIL, PASSWORD).await.unwrap();

    let session = completed(service.login(EMAIL, PASSWORD).await.unwrap());

    let refreshed = service
        .refresh_session(&session.refresh_token, session.refresh_fingerprint.as_deref())
        .await
        .unwrap();
    assert_ne!(refreshed.refresh_token, session.refresh_token);

    // The pre-rotation refresh token is dead.
    assert!(matches!(
        service
            .refresh_session(&session.refresh_token, session.refresh_fingerprint.as_deref())
            .await,
        Err(AuthError::TokenRevoked)
    ));

    service.logout(&refreshed.refresh_token).await.unwrap();
    assert!(matches!(
        service
            .refresh_session(&refreshed.refresh_token, refreshed.refresh_fingerprint.as_deref())
            .await,
        Err(AuthError::TokenRevoked)
    ));
}

#[tokio::test]
async fn wrong_password_then_lockout_then_recovery() {
    let (service, repo, clock) = service();
    let account = service.register(EMAIL, PASSWORD).await.unwrap();

    for _ in 0..5 {
        assert!(matches!(
            service.login(EMAIL, "WrongPassword1!").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    // Locked: even the correct password bounces inside the window.
    let locked = repo.snapshot(account.id).await.unwrap();
    assert_eq!(
        locked.locked_until,
        Some(clock.now() + Duration::minutes(30))
    );
    assert!(matches!(
        service.login(EMAIL, PASSWORD).await,
        Err(AuthError::AccountLocked { .. })
    ));

    // After the window the account recovers on its own.
    clock.advance(Duration::minutes(31));
    let session = completed(service.login(EMAIL, PASSWORD).await.unwrap());
    assert!(!session.access_token.is_empty());
    assert_eq!(repo.snapshot(account.id).await.unwrap().failed_login_count, 0);
}

#[tokio::test]
async fn mfa_pause_totp_completion_and_backup_fallback() {
    let (service, _, clock) = service();
    let account = service.register(EMAIL, PASSWORD).await.unwrap();
    let enrollment = service.enroll_mfa(account.id).await.unwrap();
    assert_eq!(enrollment.backup_codes.len(), 10);

    let outcome = service.login(EMAIL, PASSWORD).await.unwrap();
    assert!(outcome.mfa_required());

    // TOTP completion.
    let seed = base64_engine.decode(&enrollment.secret).unwrap();
    let code = TotpLiteProvider.code(&seed, clock.now().timestamp() as u64);
    let session = service.complete_mfa_login(account.id, &code).await.unwrap();

    let claims = service
        .tokens()
        .verify_token(
            &session.access_token,
            TokenType::Access,
            session.access_fingerprint.as_deref(),
        )
        .await
        .unwrap();
    assert_eq!(claims.sub, account.id.to_string());

    // Backup-code completion works exactly once.
    let backup = enrollment.backup_codes[3].clone();
    service.complete_mfa_login(account.id, &backup).await.unwrap();
    assert!(matches!(
        service.complete_mfa_login(account.id, &backup).await,
        Err(AuthError::MfaInvalid)
    ));
}

#[tokio::test]
async fn access_token_expires_after_ttl() {
    let (service, account_repo, clock) = service();
    let account = service.register(EMAIL, PASSWORD).await.unwrap();
    let session = completed(service.login(EMAIL, PASSWORD).await.unwrap());

    clock.advance(Duration::seconds(901));
    let result = service
        .tokens()
        .verify_token(
            &session.access_token,
            TokenType::Access,
            session.access_fingerprint.as_deref(),
        )
        .await;
    assert!(matches!(result, Err(AuthError::TokenExpired)));

    // The account itself is untouched by token expiry.
    assert!(account_repo.snapshot(account.id).await.unwrap().is_active);
}
