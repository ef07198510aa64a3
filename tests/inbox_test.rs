//! Reporter inbox integration tests
//!
//! Drives intake and the inbox guard over the in-memory store:
//! - unknown case and wrong key are indistinguishable
//! - the sixth attempt in a window is rate limited whatever the credentials
//! - handler replies reach the reporter, internal notes do not

use std::sync::Arc;

use casegate::audit::{AuditAction, AuditLog, RequestContext};
use casegate::auth::{Actor, Role, StaticCaptchaVerifier};
use casegate::cases::{CaseReceipt, CaseService, IntakeService, NewReport, ReporterMode, SenderKind};
use casegate::guard::{GuardLimits, ThreadAccessGuard};
use casegate::identity::{generate_case_id, generate_case_key, CaseKey};
use casegate::sealing::{EncryptionCodec, HkdfKeyResolver};
use casegate::store::{MemoryStore, Store};
use casegate::CaseGateError;

const CAPTCHA: &str = "captcha-ok";

struct Harness {
    store: Arc<MemoryStore>,
    intake: IntakeService,
    guard: ThreadAccessGuard,
    cases: CaseService,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.ensure_default_channel("org-1", "acme").await.unwrap();

    let codec = EncryptionCodec::new(Arc::new(HkdfKeyResolver::new(1, [5u8; 32])));
    let captcha = Arc::new(StaticCaptchaVerifier::accepting(CAPTCHA));
    let audit = AuditLog::new(store.clone(), "salt");

    Harness {
        intake: IntakeService::new(store.clone(), codec, captcha.clone(), audit.clone()),
        guard: ThreadAccessGuard::new(store.clone(), captcha, GuardLimits::default()),
        cases: CaseService::new(store.clone(), audit),
        store,
    }
}

fn ctx(ip: &str) -> RequestContext {
    RequestContext::new(Some(ip.parse().unwrap()), Some("test-agent".into()))
}

async fn file_report(h: &Harness) -> CaseReceipt {
    h.intake
        .create_case(
            "acme",
            NewReport {
                category: "harassment".into(),
                body: "My manager keeps making comments during standups.".into(),
                reporter_mode: ReporterMode::Anonymous,
                contact: None,
                captcha_token: Some(CAPTCHA.into()),
            },
            &ctx("198.51.100.1"),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_unknown_case_and_wrong_key_look_identical() {
    let h = harness().await;
    let receipt = file_report(&h).await;

    let wrong_key = h
        .guard
        .authenticate(
            receipt.case_id.as_str(),
            &generate_case_key(),
            Some(CAPTCHA),
            &ctx("203.0.113.1"),
        )
        .await
        .unwrap_err();

    let unknown_case = h
        .guard
        .authenticate(
            generate_case_id().as_str(),
            &receipt.case_key,
            Some(CAPTCHA),
            &ctx("203.0.113.2"),
        )
        .await
        .unwrap_err();

    let malformed = h
        .guard
        .authenticate("not-a-case", &receipt.case_key, Some(CAPTCHA), &ctx("203.0.113.3"))
        .await
        .unwrap_err();

    for err in [&wrong_key, &unknown_case, &malformed] {
        assert!(matches!(err, CaseGateError::InvalidCredentials));
        assert_eq!(err.status_code(), wrong_key.status_code());
        assert_eq!(err.public_message(), wrong_key.public_message());
        assert_eq!(err.code(), "INVALID_CREDENTIALS");
    }
}

#[tokio::test]
async fn test_sixth_attempt_is_rate_limited() {
    let h = harness().await;
    let receipt = file_report(&h).await;
    let client = ctx("203.0.113.50");

    // Mix of right and wrong keys; each is judged on its credentials
    for attempt in 0..5 {
        let key = if attempt % 2 == 0 {
            receipt.case_key.clone()
        } else {
            generate_case_key()
        };
        let result = h
            .guard
            .authenticate(receipt.case_id.as_str(), &key, Some(CAPTCHA), &client)
            .await;
        if attempt % 2 == 0 {
            assert!(result.is_ok(), "attempt {} should pass", attempt + 1);
        } else {
            assert!(matches!(result, Err(CaseGateError::InvalidCredentials)));
        }
    }

    let err = h
        .guard
        .authenticate(receipt.case_id.as_str(), &receipt.case_key, Some(CAPTCHA), &client)
        .await
        .unwrap_err();
    match err {
        CaseGateError::RateLimited { retry_after_secs } => assert!(retry_after_secs > 0),
        other => panic!("expected RateLimited, got {:?}", other),
    }

    // Another address is unaffected
    assert!(h
        .guard
        .authenticate(
            receipt.case_id.as_str(),
            &receipt.case_key,
            Some(CAPTCHA),
            &ctx("203.0.113.51"),
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn test_captcha_runs_before_credentials() {
    let h = harness().await;
    let receipt = file_report(&h).await;

    let err = h
        .guard
        .authenticate(
            receipt.case_id.as_str(),
            &receipt.case_key,
            Some("wrong-token"),
            &ctx("203.0.113.9"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CaseGateError::CaptchaFailed));
}

#[tokio::test]
async fn test_thread_round_trip_between_reporter_and_handler() {
    let h = harness().await;
    let receipt = file_report(&h).await;
    let reporter = ctx("192.0.2.10");
    let handler = Actor::new("handler-1", "org-1", Role::Handler);

    let session = h
        .guard
        .authenticate(
            receipt.case_id.as_str(),
            &CaseKey::from_presented(receipt.case_key.expose()),
            Some(CAPTCHA),
            &reporter,
        )
        .await
        .unwrap();
    h.guard
        .post_reporter_message(&session, "Adding the dates: 3, 10 and 17 March.", Vec::new())
        .await
        .unwrap();

    h.cases
        .post_handler_message(
            &handler,
            &receipt.case_id,
            "Thank you, we are looking into it.",
            false,
            Vec::new(),
            &RequestContext::default(),
        )
        .await
        .unwrap();
    h.cases
        .post_handler_message(
            &handler,
            &receipt.case_id,
            "Escalate to HR lead",
            true,
            Vec::new(),
            &RequestContext::default(),
        )
        .await
        .unwrap();

    let session = h
        .guard
        .authenticate(
            receipt.case_id.as_str(),
            &receipt.case_key,
            Some(CAPTCHA),
            &reporter,
        )
        .await
        .unwrap();
    let thread = h.guard.list_thread(&session).await.unwrap();
    let senders: Vec<SenderKind> = thread.iter().map(|m| m.sender).collect();
    assert_eq!(senders, vec![SenderKind::Reporter, SenderKind::Handler]);

    let json = serde_json::to_string(&thread).unwrap();
    assert!(!json.contains("handler-1"));
    assert!(!json.contains("Escalate"));

    // Reporter activity never reaches the audit trail
    let audit = h.store.list_audit("org-1").await.unwrap();
    let anonymous: Vec<AuditAction> = audit
        .iter()
        .filter(|r| r.actor_id.is_none())
        .map(|r| r.action)
        .collect();
    assert_eq!(anonymous, vec![AuditAction::CaseCreated]);
    assert!(audit
        .iter()
        .filter(|r| r.action == AuditAction::MessagePosted)
        .all(|r| r.actor_id.as_deref() == Some("handler-1")));
}
