use std::collections::HashSet;
use std::sync::Mutex;

use actix_web::{test, web, App};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use x402::eip712::{payment_domain, signing_hash};
use x402::fhe::{DecryptionContext, Decryptor, DecryptorConnector};
use x402::ledger::{Ledger, LedgerError, TransferCall, TransferReceipt};
use x402::{
    Authorization, ChainConfig, FhePaymentData, FheSchemeFacilitator, PaymentPayload,
    PaymentRequirements, TokenDomain, X402Error, DEFAULT_TOKEN, SCHEME_NAME, SEPOLIA_NETWORK,
};

use x402_facilitator::routes;
use x402_facilitator::state::AppState;

const SECRET: &[u8] = b"test-secret";

#[derive(Default)]
struct MemoryLedger {
    used: Mutex<HashSet<(Address, B256)>>,
    offline: bool,
}

impl Ledger for MemoryLedger {
    async fn is_nonce_used(&self, _: Address, from: Address, nonce: B256) -> Result<bool, X402Error> {
        Ok(self.used.lock().unwrap().contains(&(from, nonce)))
    }

    async fn transfer_with_authorization(
        &self,
        _: Address,
        call: &TransferCall,
    ) -> Result<TransferReceipt, LedgerError> {
        if !self.used.lock().unwrap().insert((call.from, call.nonce)) {
            return Err(LedgerError::Rejected {
                transaction: None,
                message: "authorization is used or canceled".to_string(),
            });
        }
        Ok(TransferReceipt {
            transaction: B256::repeat_byte(0xaa),
            transferred: Some(B256::repeat_byte(0x77)),
        })
    }

    async fn transfer_receipt(&self, _: Address, _: B256) -> Result<Option<TransferReceipt>, LedgerError> {
        Ok(None)
    }

    async fn block_number(&self) -> Result<u64, X402Error> {
        if self.offline {
            return Err(X402Error::ChainError("connection refused".to_string()));
        }
        Ok(1234)
    }
}

struct FixedAmount;

impl Decryptor for FixedAmount {
    async fn decrypt(&self, _: B256, _: &DecryptionContext) -> Result<U256, X402Error> {
        Ok(U256::from(10_000u64))
    }
}

struct FixedConnector;

impl DecryptorConnector for FixedConnector {
    type Decryptor = FixedAmount;

    async fn connect(&self, _: &str, _: &str) -> Result<FixedAmount, X402Error> {
        Ok(FixedAmount)
    }
}

type TestFacilitator = FheSchemeFacilitator<MemoryLedger, FixedConnector>;

fn make_state(ledger: MemoryLedger, metrics_token: Option<Vec<u8>>) -> web::Data<AppState<TestFacilitator>> {
    web::Data::new(
        AppState::new(
            FheSchemeFacilitator::new(ledger, FixedConnector),
            SECRET.to_vec(),
            ChainConfig::default(),
        )
        .with_metrics_token(metrics_token),
    )
}

fn requirements() -> PaymentRequirements {
    PaymentRequirements {
        scheme: SCHEME_NAME.to_string(),
        network: SEPOLIA_NETWORK.to_string(),
        max_amount_required: U256::from(10_000u64),
        resource: "http://localhost:4021/weather".to_string(),
        description: None,
        mime_type: None,
        pay_to: Address::repeat_byte(0x22),
        max_timeout_seconds: 300,
        asset: DEFAULT_TOKEN,
        extra: Some(TokenDomain {
            name: "ConfidentialUSDC".to_string(),
            version: "1".to_string(),
        }),
    }
}

fn payment(signer: &PrivateKeySigner, req: &PaymentRequirements) -> PaymentPayload {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let authorization = Authorization {
        from: signer.address(),
        to: req.pay_to,
        encrypted_value_handle: B256::repeat_byte(0x33),
        input_proof: Bytes::from(vec![0x0f; 32]),
        valid_after: U256::from(now - 60),
        valid_before: U256::from(now + 300),
        nonce: B256::repeat_byte(0x01),
    };
    let domain = payment_domain(req, &ChainConfig::default()).unwrap();
    let sig = signer
        .sign_hash_sync(&signing_hash(&authorization, &domain))
        .unwrap();
    PaymentPayload {
        x402_version: 1,
        scheme: SCHEME_NAME.to_string(),
        network: SEPOLIA_NETWORK.to_string(),
        payload: FhePaymentData {
            signature: Bytes::from(sig.as_bytes().to_vec()),
            authorization,
        },
    }
}

fn signed_body(payload: &PaymentPayload, req: &PaymentRequirements) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&serde_json::json!({
        "paymentPayload": payload,
        "paymentRequirements": req,
    }))
    .unwrap();
    let sig = x402::hmac::compute_hmac(SECRET, &body);
    (body, sig)
}

#[actix_rt::test]
async fn test_supported_lists_scheme_and_network() {
    let state = make_state(MemoryLedger::default(), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    let req = test::TestRequest::get().uri("/supported").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["kinds"][0]["scheme"], "fhe-transfer");
    assert_eq!(body["kinds"][0]["network"], "eip155:11155111");
    assert_eq!(body["kinds"][0]["x402Version"], 1);
}

#[actix_rt::test]
async fn test_verify_requires_hmac() {
    let state = make_state(MemoryLedger::default(), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    for path in ["/verify", "/settle"] {
        let req = test::TestRequest::post()
            .uri(path)
            .set_payload("{}")
            .insert_header(("Content-Type", "application/json"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 401, "{path}");
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "authentication required");
    }
}

#[actix_rt::test]
async fn test_verify_rejects_bad_hmac() {
    let state = make_state(MemoryLedger::default(), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/verify")
        .set_payload("{}")
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", "deadbeef"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "authentication failed");
}

#[actix_rt::test]
async fn test_valid_hmac_with_malformed_body_is_400() {
    let state = make_state(MemoryLedger::default(), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    let body_bytes = b"not valid json at all";
    let sig = x402::hmac::compute_hmac(SECRET, body_bytes);

    let req = test::TestRequest::post()
        .uri("/settle")
        .set_payload(&body_bytes[..])
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", sig))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["errorReason"], "MalformedPayload");
}

#[actix_rt::test]
async fn test_verify_accepts_signed_payment() {
    let state = make_state(MemoryLedger::default(), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    let signer = PrivateKeySigner::random();
    let req_body = requirements();
    let (body, sig) = signed_body(&payment(&signer, &req_body), &req_body);

    let req = test::TestRequest::post()
        .uri("/verify")
        .set_payload(body)
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", sig))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isValid"], true);
    assert!(body.get("invalidReason").is_none());
    assert_eq!(
        body["payer"].as_str().unwrap().to_lowercase(),
        format!("{:#x}", signer.address())
    );
}

#[actix_rt::test]
async fn test_verify_rejection_is_200_with_reason() {
    let state = make_state(MemoryLedger::default(), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    let signer = PrivateKeySigner::random();
    let req_body = requirements();
    let mut payload = payment(&signer, &req_body);
    payload.payload.authorization.to = Address::repeat_byte(0x99);
    let (body, sig) = signed_body(&payload, &req_body);

    let req = test::TestRequest::post()
        .uri("/verify")
        .set_payload(body)
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", sig))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isValid"], false);
    assert_eq!(body["invalidReason"], "InvalidSignature");
}

#[actix_rt::test]
async fn test_settle_then_replay() {
    let state = make_state(MemoryLedger::default(), None);
    let app = test::init_service(
        App::new()
            .app_data(state)
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    let signer = PrivateKeySigner::random();
    let req_body = requirements();
    let (body, sig) = signed_body(&payment(&signer, &req_body), &req_body);

    let first = test::TestRequest::post()
        .uri("/settle")
        .set_payload(body.clone())
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", sig.clone()))
        .to_request();
    let resp = test::call_service(&app, first).await;
    assert_eq!(resp.status(), 200);
    let settled: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(settled["success"], true);
    assert_eq!(settled["transferredAmount"], "10000");
    assert_eq!(settled["network"], "eip155:11155111");
    assert_eq!(settled["transaction"], B256::repeat_byte(0xaa).to_string());

    let replay = test::TestRequest::post()
        .uri("/settle")
        .set_payload(body)
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", sig))
        .to_request();
    let resp = test::call_service(&app, replay).await;
    assert_eq!(resp.status(), 200);
    let replayed: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(replayed["success"], false);
    assert_eq!(replayed["errorReason"], "NonceAlreadyUsed");
    assert_eq!(replayed["transaction"], "");
}

#[actix_rt::test]
async fn test_health_reports_block_or_degraded() {
    let app = test::init_service(
        App::new()
            .app_data(make_state(MemoryLedger::default(), None))
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["latestBlock"], "1234");

    let offline = MemoryLedger {
        offline: true,
        ..MemoryLedger::default()
    };
    let app = test::init_service(
        App::new()
            .app_data(make_state(offline, None))
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), 503);
}

#[actix_rt::test]
async fn test_metrics_forbidden_without_token_config() {
    let app = test::init_service(
        App::new()
            .app_data(make_state(MemoryLedger::default(), None))
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), 403);
}

#[actix_rt::test]
async fn test_metrics_requires_bearer_token() {
    let app = test::init_service(
        App::new()
            .app_data(make_state(MemoryLedger::default(), Some(b"metrics-token".to_vec())))
            .configure(routes::configure::<TestFacilitator>),
    )
    .await;

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer wrong-token"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer metrics-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}
