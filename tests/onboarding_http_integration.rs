//! Integration tests for the onboarding HTTP exchanges.
//!
//! Each test spins up an Axum server on a random port and drives it with
//! the real HTTP transport and wizard state machine.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use onboarding_wizard::config::{ClientConfig, ValidationPolicy};
use onboarding_wizard::csrf::{CsrfGuard, SESSION_HEADER, TOKEN_HEADER};
use onboarding_wizard::error::WizardError;
use onboarding_wizard::store::{LibSqlBackend, RecordRepository};
use onboarding_wizard::wizard::{
    CreateResponse, Field, HttpTransport, OnboardingState, Step, StepValidator, SubmissionService,
    SubmitOutcome, WizardData, WizardStateMachine, WizardTransport, onboarding_routes,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Start an Axum server on a random port, return (base url, store).
async fn start_server() -> (String, Arc<LibSqlBackend>) {
    let repo = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let validator = Arc::new(StepValidator::new(
        repo.clone(),
        ValidationPolicy::default(),
    ));
    let submission = Arc::new(SubmissionService::new(validator.clone(), repo.clone()));
    let app = onboarding_routes(OnboardingState {
        validator,
        submission,
        csrf: Arc::new(CsrfGuard::new(Duration::from_secs(60))),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), repo)
}

async fn wizard(base_url: &str) -> WizardStateMachine<HttpTransport> {
    let transport = HttpTransport::connect(ClientConfig::new(base_url))
        .await
        .unwrap();
    WizardStateMachine::new(transport)
}

async fn fill_identity(machine: &WizardStateMachine<HttpTransport>, email: &str, plan: &str) {
    machine.set_input(Field::Name, "Ann").await;
    machine.set_input(Field::Email, email).await;
    machine.set_input(Field::Phone, "+15551234567").await;
    machine.set_input(Field::SubscriptionType, plan).await;
}

async fn fill_address(machine: &WizardStateMachine<HttpTransport>) {
    machine.set_input(Field::AddressLine1, "1 Main Street").await;
    machine.set_input(Field::AddressLine2, "Apt 4").await;
    machine.set_input(Field::City, "Springfield").await;
    machine.set_input(Field::PostalCode, "12345").await;
    machine.set_input(Field::State, "IL").await;
    machine.set_input(Field::Country, "US").await;
}

/// Walk a free wizard to the review step and submit it.
async fn complete_free_wizard(
    base_url: &str,
    email: &str,
) -> (WizardStateMachine<HttpTransport>, SubmitOutcome) {
    let machine = wizard(base_url).await;
    fill_identity(&machine, email, "free").await;
    assert_eq!(machine.advance().await.unwrap().step, Step::Address);
    fill_address(&machine).await;
    assert_eq!(machine.advance().await.unwrap().step, Step::Review);
    let outcome = machine.submit().await.unwrap();
    (machine, outcome)
}

#[tokio::test]
async fn free_wizard_skips_payment_and_creates_user() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, repo) = start_server().await;
        let machine = wizard(&base_url).await;

        fill_identity(&machine, "a@x.com", "free").await;
        let view = machine.advance().await.unwrap();
        assert_eq!(view.step, Step::Address);

        fill_address(&machine).await;
        let view = machine.advance().await.unwrap();
        assert_eq!(view.step, Step::Review);
        let review = view.review.unwrap();
        assert_eq!(review.email, "a@x.com");
        assert!(review.payment.is_none());

        let SubmitOutcome::Created { user_id } = machine.submit().await.unwrap() else {
            panic!("expected the record to be created");
        };
        let record = repo.get_record(user_id).await.unwrap().unwrap();
        assert_eq!(record.user.email, "a@x.com");
        assert!(record.payment.is_none());
        assert_eq!(repo.record_counts().await.unwrap().payments, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn premium_wizard_stores_payment() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, repo) = start_server().await;
        let machine = wizard(&base_url).await;

        fill_identity(&machine, "p@x.com", "premium").await;
        machine.advance().await.unwrap();
        fill_address(&machine).await;
        assert_eq!(machine.advance().await.unwrap().step, Step::Payment);

        machine.set_input(Field::CreditCardNumber, "4111111111111234").await;
        machine.format_expiration_input("1299").await;
        machine.set_input(Field::Cvv, "123").await;
        let view = machine.advance().await.unwrap();
        assert_eq!(view.step, Step::Review);
        let payment = view.review.unwrap().payment.unwrap();
        assert_eq!(payment.masked_card_number, "************1234");
        assert_eq!(payment.expiration_date, "12/99");

        let SubmitOutcome::Created { user_id } = machine.submit().await.unwrap() else {
            panic!("expected the record to be created");
        };
        let record = repo.get_record(user_id).await.unwrap().unwrap();
        assert_eq!(record.payment.unwrap().credit_card_number, "4111111111111234");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn server_errors_keep_wizard_on_step() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, _repo) = start_server().await;
        let machine = wizard(&base_url).await;

        fill_identity(&machine, "not-an-email", "gold").await;
        let view = machine.advance().await.unwrap();
        assert_eq!(view.step, Step::Identity);
        assert!(view.errors.contains(Field::Email));
        assert_eq!(
            view.errors.get(Field::SubscriptionType).unwrap(),
            ["Invalid subscription type."]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn duplicate_email_is_reported_on_second_submission() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, repo) = start_server().await;
        let (_first, outcome) = complete_free_wizard(&base_url, "a@x.com").await;
        assert!(matches!(outcome, SubmitOutcome::Created { .. }));

        // A second wizard with its own session; the identity step now flags
        // the address, so bypass the client and post the create directly.
        let client = reqwest::Client::new();
        let session: Value = client
            .get(format!("{base_url}/onboarding/session"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let resp = client
            .post(format!("{base_url}/onboarding/create"))
            .header(SESSION_HEADER, session["sessionId"].as_str().unwrap())
            .header(TOKEN_HEADER, session["csrfToken"].as_str().unwrap())
            .json(&json!({ "wizard": {
                "name": "Ann", "email": "a@x.com", "phone": "+15551234567",
                "subscriptionType": "free", "addressLine1": "1 Main Street",
                "addressLine2": "Apt 4", "city": "Springfield", "postalCode": "12345",
                "state": "IL", "country": "US"
            }}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["errors"]["email"], json!(["This email is already in use."]));
        assert_eq!(repo.record_counts().await.unwrap().users, 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn identity_step_flags_taken_email() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, _repo) = start_server().await;
        complete_free_wizard(&base_url, "a@x.com").await;

        let machine = wizard(&base_url).await;
        fill_identity(&machine, "a@x.com", "free").await;
        let view = machine.advance().await.unwrap();
        assert_eq!(view.step, Step::Identity);
        assert_eq!(
            view.errors.get(Field::Email).unwrap(),
            ["This email is already in use."]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn forged_token_is_forbidden() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, repo) = start_server().await;
        let machine = wizard(&base_url).await;
        let session_id = machine.transport().session_id().await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{base_url}/onboarding/create"))
            .header(SESSION_HEADER, session_id)
            .header(TOKEN_HEADER, "forged-token")
            .json(&json!({ "wizard": {} }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
        assert_eq!(repo.record_counts().await.unwrap().users, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn session_is_revoked_after_create() {
    timeout(TEST_TIMEOUT, async {
        let (base_url, repo) = start_server().await;
        let (machine, outcome) = complete_free_wizard(&base_url, "a@x.com").await;
        assert!(matches!(outcome, SubmitOutcome::Created { .. }));
        assert!(matches!(
            machine.submit().await,
            Err(WizardError::Completed { .. })
        ));

        let mut data = WizardData::default();
        data.email = "b@x.com".into();
        let response = machine.transport().create(&data).await.unwrap();
        assert_eq!(response, CreateResponse::Forbidden);

        // A renewed session is accepted again.
        machine.transport().renew_session().await.unwrap();
        let response = machine.transport().create(&data).await.unwrap();
        assert!(matches!(response, CreateResponse::Invalid(_)));
        assert_eq!(repo.record_counts().await.unwrap().users, 1);
    })
    .await
    .expect("test timed out");
}
