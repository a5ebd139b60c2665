mod common;

use alloy::dyn_abi::TypedData;
use alloy::primitives::PrimitiveSignature;
use serde_json::{json, Value};

use rusty_wallet_adapters::keyring::legacy_typed_data_hash;
use rusty_wallet_core::chains::ChainEnum;
use rusty_wallet_core::messages::{EVENT_SIGN_TEXT, EVENT_SIGN_TYPED_DATA};
use rusty_wallet_core::{ApprovalKind, ProviderError, SigningVariant, TypedDataVersion};

use common::{harness, join, ORIGIN};

fn signature(value: &Value) -> PrimitiveSignature {
    value
        .as_str()
        .expect("signature string")
        .parse()
        .expect("65-byte signature")
}

fn mail_typed_data() -> Value {
    json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" }
            ],
            "Person": [
                { "name": "name", "type": "string" },
                { "name": "wallet", "type": "address" }
            ],
            "Mail": [
                { "name": "from", "type": "Person" },
                { "name": "to", "type": "Person" },
                { "name": "contents", "type": "string" }
            ]
        },
        "primaryType": "Mail",
        "domain": {
            "name": "Ether Mail",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
            "to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
            "contents": "Hello, Bob!"
        }
    })
}

#[tokio::test]
async fn personal_sign_hex_message_recovers_to_active_account() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);

    // "hello wallet"
    let message = "0x68656c6c6f2077616c6c6574";
    let call = h.spawn(ORIGIN, "personal_sign", json!([message, h.address_hex()]));
    let prompt = h.approve_next(json!({})).await;
    assert_eq!(prompt.kind, ApprovalKind::SignText);

    let sig = signature(&join(call).await.expect("personal_sign"));
    let recovered = sig
        .recover_address_from_msg(b"hello wallet")
        .expect("recover");
    assert_eq!(recovered, h.address());

    let records = h.adapters.history.signing_records().expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].variant, SigningVariant::PersonalSign);
    assert!(records[0].signature.is_some());
    assert_eq!(h.adapters.telemetry.reports_named(EVENT_SIGN_TEXT).len(), 1);
}

#[tokio::test]
async fn personal_sign_plain_text_is_signed_as_utf8() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);

    let call = h.spawn(ORIGIN, "personal_sign", json!(["Sign in to dapp", h.address_hex()]));
    h.approve_next(json!({})).await;
    let sig = signature(&join(call).await.expect("personal_sign"));
    assert_eq!(
        sig.recover_address_from_msg("Sign in to dapp").expect("recover"),
        h.address()
    );
}

#[tokio::test]
async fn dropped_call_withdraws_its_prompt() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);

    let call = h.spawn(ORIGIN, "personal_sign", json!(["Sign in to dapp", h.address_hex()]));
    h.next_approval().await;
    call.abort();
    assert!(call.await.expect_err("aborted").is_cancelled());

    h.assert_no_prompt();
    assert_eq!(h.adapters.keyring.sign_calls(), 0);
    assert!(h.adapters.history.signing_records().expect("records").is_empty());
}

#[tokio::test]
async fn typed_data_v4_accepts_json_text() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);

    let data = mail_typed_data();
    let call = h.spawn(
        ORIGIN,
        "eth_signTypedData_v4",
        json!([h.address_hex(), data.to_string()]),
    );
    let prompt = h.approve_next(json!({})).await;
    assert_eq!(prompt.kind, ApprovalKind::SignTypedData);

    let sig = signature(&join(call).await.expect("sign typed data"));
    let typed: TypedData = serde_json::from_value(data).expect("typed data");
    let digest = typed.eip712_signing_hash().expect("signing hash");
    assert_eq!(
        sig.recover_address_from_prehash(&digest).expect("recover"),
        h.address()
    );

    let records = h.adapters.history.signing_records().expect("records");
    assert_eq!(
        records[0].variant,
        SigningVariant::TypedData(TypedDataVersion::V4)
    );
    // stored payload is the parsed object, not the raw text
    assert!(records[0].payload.is_object());
    assert_eq!(h.adapters.telemetry.reports_named(EVENT_SIGN_TYPED_DATA).len(), 1);
}

#[tokio::test]
async fn typed_data_v1_uses_message_first_order() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);

    let data = json!([
        { "type": "string", "name": "greeting", "value": "gm" },
        { "type": "uint32", "name": "nonce", "value": "42" }
    ]);
    let call = h.spawn(ORIGIN, "eth_signTypedData_v1", json!([data.clone(), h.address_hex()]));
    h.approve_next(json!({})).await;

    let sig = signature(&join(call).await.expect("sign v1"));
    let digest = legacy_typed_data_hash(&data).expect("legacy hash");
    assert_eq!(
        sig.recover_address_from_prehash(&digest).expect("recover"),
        h.address()
    );
}

#[tokio::test]
async fn typed_data_v4_in_message_first_order_is_rejected_before_prompt() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);

    let err = h
        .call(
            ORIGIN,
            "eth_signTypedData_v4",
            json!([mail_typed_data(), h.address_hex()]),
        )
        .await
        .expect_err("wrong order");
    assert!(matches!(err, ProviderError::InvalidParams(_)));
    h.assert_no_prompt();
    assert_eq!(h.adapters.keyring.sign_calls(), 0);
}

#[tokio::test]
async fn signing_for_another_address_is_rejected() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);
    let other = format!("{:?}", h.add_local_account().address);

    let err = h
        .call(ORIGIN, "personal_sign", json!(["0x01", other]))
        .await
        .expect_err("foreign address");
    assert!(matches!(err, ProviderError::InvalidParams(_)));
    h.assert_no_prompt();
    assert!(h.adapters.history.signing_records().expect("records").is_empty());
}

#[tokio::test]
async fn account_switch_during_message_approval_leaves_no_record() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);
    let other = h.add_local_account();

    let call = h.spawn(ORIGIN, "personal_sign", json!(["0x01", h.address_hex()]));
    let prompt = h.next_approval().await;
    h.adapters
        .accounts
        .switch_to(Some(other))
        .expect("switch account");
    h.adapters
        .approval
        .approve(prompt.id, json!({}))
        .expect("approve");

    let err = join(call).await.expect_err("stale account");
    assert!(matches!(err, ProviderError::InvalidParams(_)));
    assert_eq!(h.adapters.keyring.sign_calls(), 0);
    assert!(h.adapters.history.signing_records().expect("records").is_empty());
}

#[tokio::test]
async fn keyring_failure_is_recorded_and_reported() {
    let h = harness();
    h.connect(ORIGIN, ChainEnum::Eth);

    // v4 payload that is JSON but not a typed-data document
    let call = h.spawn(
        ORIGIN,
        "eth_signTypedData_v4",
        json!([h.address_hex(), { "not": "typed data" }]),
    );
    h.approve_next(json!({})).await;
    let err = join(call).await.expect_err("malformed typed data");
    assert!(matches!(err, ProviderError::InvalidParams(_)));

    let records = h.adapters.history.signing_records().expect("records");
    assert_eq!(records.len(), 1);
    assert!(records[0].signature.is_none());
    assert!(records[0].error.is_some());
    let reports = h.adapters.telemetry.reports_named(EVENT_SIGN_TYPED_DATA);
    assert_eq!(reports[0].payload["success"], false);
}
