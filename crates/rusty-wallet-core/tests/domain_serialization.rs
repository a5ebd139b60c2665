use alloy::primitives::{Address, Bytes, B256, U256};
use rusty_wallet_core::chains::ChainEnum;
use rusty_wallet_core::{
    rpc_response, ApprovalKind, ApprovalRequest, ConnectedSite, ProviderError, SignedTransaction,
    TransactionParams, UiHint,
};

fn params() -> TransactionParams {
    TransactionParams {
        from: Address::repeat_byte(0x11),
        to: Some(Address::repeat_byte(0x22)),
        value: U256::from(1u64),
        data: Bytes::new(),
        gas: 21_000,
        gas_price: Some(5_000_000_000),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        nonce: 7,
        chain_id: 1,
        is_send: true,
        is_speed_up: false,
        is_cancel: false,
    }
}

#[test]
fn chain_enum_uses_uppercase_keys() {
    assert_eq!(
        serde_json::to_value(ChainEnum::Polygon).expect("serialize chain"),
        "POLYGON"
    );
    let chain: ChainEnum = serde_json::from_str("\"ARBITRUM\"").expect("deserialize chain");
    assert_eq!(chain, ChainEnum::Arbitrum);
    assert_eq!(chain.id(), 42161);
}

#[test]
fn connected_site_is_camel_case() {
    let site = ConnectedSite::new("https://dapp.example", ChainEnum::Bsc);
    let json = serde_json::to_value(&site).expect("serialize site");
    assert_eq!(json["isConnected"], true);
    assert_eq!(json["isSigned"], false);
    assert_eq!(json["chain"], "BSC");
}

#[test]
fn approval_request_carries_ui_hint() {
    let request = ApprovalRequest {
        id: 3,
        origin: "https://dapp.example".to_owned(),
        kind: ApprovalKind::SignTx,
        params: serde_json::json!([]),
        ui_hint: UiHint::height(628),
    };
    let json = serde_json::to_value(&request).expect("serialize approval");
    assert_eq!(json["uiHint"]["height"], 628);
    assert_eq!(json["uiHint"]["minHeight"], serde_json::Value::Null);
    assert_eq!(json["kind"], "SignTx");
}

#[test]
fn absent_fee_fields_are_omitted() {
    let json = serde_json::to_value(params()).expect("serialize params");
    assert_eq!(json["gasPrice"], 5_000_000_000u64);
    assert!(json.get("maxFeePerGas").is_none());
    assert!(json.get("maxPriorityFeePerGas").is_none());
    assert_eq!(json["chainId"], 1);

    let decoded: TransactionParams = serde_json::from_value(json).expect("deserialize params");
    assert_eq!(decoded, params());
}

#[test]
fn push_payload_adds_signature_and_raw_bytes() {
    let signed = SignedTransaction {
        tx: params(),
        r: U256::from(1u64),
        s: U256::from(2u64),
        v: 37,
        raw: Bytes::from(vec![0xf8, 0x6c]),
        hash: B256::ZERO,
    };
    let payload = signed.push_payload();
    assert_eq!(payload["v"], "0x25");
    assert_eq!(payload["rawTx"], "0xf86c");
    assert_eq!(payload["nonce"], 7);
    assert!(payload.get("r").is_some());
    assert!(payload.get("s").is_some());
}

#[test]
fn rpc_envelopes_carry_result_or_error() {
    let ok = rpc_response(serde_json::json!(1), Ok(serde_json::json!("0x1")));
    assert_eq!(ok["jsonrpc"], "2.0");
    assert_eq!(ok["result"], "0x1");
    assert!(ok.get("error").is_none());

    let err = rpc_response(
        serde_json::json!("a"),
        Err(ProviderError::UserRejected("declined".to_owned())),
    );
    assert_eq!(err["id"], "a");
    assert_eq!(err["error"]["code"], 4001);
    assert!(err.get("result").is_none());
}
