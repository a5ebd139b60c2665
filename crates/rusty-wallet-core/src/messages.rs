use std::sync::Arc;

use alloy::primitives::{hex, Address};
use serde_json::Value;

use crate::domain::{SigningRecord, SigningVariant, TimestampMs, TypedDataVersion};
use crate::error::ProviderError;
use crate::ports::{ClockPort, HistoryPort, TelemetryPort};
use crate::signer::{MessageSignature, SigningOrchestrator};

pub const EVENT_SIGN_TEXT: &str = "signText";
pub const EVENT_SIGN_TYPED_DATA: &str = "signTypedData";

/// Positional layout of a message-signing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamOrder {
    MessageFirst,
    AddressFirst,
}

impl SigningVariant {
    pub fn param_order(self) -> ParamOrder {
        match self {
            Self::PersonalSign | Self::TypedData(TypedDataVersion::V1) => ParamOrder::MessageFirst,
            Self::TypedData(_) => ParamOrder::AddressFirst,
        }
    }

    fn event(self) -> &'static str {
        match self {
            Self::PersonalSign => EVENT_SIGN_TEXT,
            Self::TypedData(_) => EVENT_SIGN_TYPED_DATA,
        }
    }
}

/// `(message, address)` extracted in the order the variant expects.
pub fn split_params(
    variant: SigningVariant,
    params: &Value,
) -> Result<(Value, Address), ProviderError> {
    let (message_idx, address_idx) = match variant.param_order() {
        ParamOrder::MessageFirst => (0, 1),
        ParamOrder::AddressFirst => (1, 0),
    };
    let message = params
        .get(message_idx)
        .cloned()
        .ok_or_else(|| ProviderError::invalid_params(format!("missing params[{message_idx}]")))?;
    let address = params
        .get(address_idx)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::invalid_params(format!("missing address at params[{address_idx}]"))
        })?
        .parse()
        .map_err(|e| ProviderError::invalid_params(format!("invalid address: {e}")))?;
    Ok((message, address))
}

/// `0x`-prefixed hex is decoded, anything else is signed as UTF-8 text.
pub fn personal_message_bytes(message: &Value) -> Result<Vec<u8>, ProviderError> {
    let text = message
        .as_str()
        .ok_or_else(|| ProviderError::invalid_params("message must be a string"))?;
    match text.strip_prefix("0x").map(hex::decode) {
        Some(Ok(bytes)) => Ok(bytes),
        _ => Ok(text.as_bytes().to_vec()),
    }
}

/// v3/v4 payloads arriving as text are parsed; v1 is passed through untouched.
pub fn typed_payload(version: TypedDataVersion, message: Value) -> Result<Value, ProviderError> {
    match (version, message) {
        (TypedDataVersion::V1, message) => Ok(message),
        (_, Value::String(text)) => serde_json::from_str(&text)
            .map_err(|e| {
                ProviderError::invalid_params(format!("typed data is not valid JSON: {e}"))
            }),
        (_, message) => Ok(message),
    }
}

/// personal_sign and eth_signTypedData* after the approval gate.
pub struct MessageSigner {
    signer: Arc<SigningOrchestrator>,
    history: Arc<dyn HistoryPort>,
    telemetry: Arc<dyn TelemetryPort>,
    clock: Arc<dyn ClockPort>,
}

impl MessageSigner {
    pub fn new(
        signer: Arc<SigningOrchestrator>,
        history: Arc<dyn HistoryPort>,
        telemetry: Arc<dyn TelemetryPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            signer,
            history,
            telemetry,
            clock,
        }
    }

    pub async fn sign(
        &self,
        origin: &str,
        variant: SigningVariant,
        params: &Value,
    ) -> Result<Value, ProviderError> {
        let (message, address) = split_params(variant, params)?;
        // account re-validation happens before any keyring work and leaves no record
        self.signer.resolve_signer(address)?;

        let payload = match variant {
            SigningVariant::PersonalSign => message.clone(),
            SigningVariant::TypedData(version) => typed_payload(version, message)?,
        };
        let signed = match variant {
            SigningVariant::PersonalSign => {
                let bytes = personal_message_bytes(&payload)?;
                self.signer.sign_personal_message(address, &bytes).await
            }
            SigningVariant::TypedData(version) => {
                self.signer.sign_typed_data(address, &payload, version).await
            }
        };
        self.record(origin, address, variant, payload, &signed);

        signed.map(|s| Value::String(s.signature))
    }

    fn record(
        &self,
        origin: &str,
        address: Address,
        variant: SigningVariant,
        payload: Value,
        signed: &Result<MessageSignature, ProviderError>,
    ) {
        let (signature, error) = match signed {
            Ok(s) => (Some(s.signature.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let record = SigningRecord {
            origin: origin.to_owned(),
            address,
            variant,
            payload,
            signature,
            error: error.clone(),
            created_at: TimestampMs(self.clock.now_ms().unwrap_or_default()),
        };
        if let Err(err) = self.history.add_signing_record(record) {
            tracing::warn!(
                %err,
                origin,
                variant = variant.as_str(),
                "failed to record signing history"
            );
        }

        let mut attributes = serde_json::json!({
            "success": signed.is_ok(),
            "variant": variant.as_str(),
            "source": origin,
        });
        if let Ok(s) = signed {
            attributes["keyringType"] = Value::String(s.keyring_type.clone());
        }
        if let Some(error) = error {
            tracing::warn!(origin, variant = variant.as_str(), %error, "message signing failed");
            attributes["error"] = Value::String(error);
        }
        self.telemetry.report(variant.event(), attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn v1_and_v4_read_opposite_positions() {
        let params =
            serde_json::json!([[{ "type": "string", "name": "m", "value": "hi" }], ACCOUNT]);
        let (message, address) =
            split_params(SigningVariant::TypedData(TypedDataVersion::V1), &params).expect("v1");
        assert!(message.is_array());
        assert_eq!(address, ACCOUNT.parse::<Address>().expect("address"));

        assert!(split_params(SigningVariant::TypedData(TypedDataVersion::V4), &params).is_err());
    }

    #[test]
    fn personal_message_decodes_hex_only_when_prefixed() {
        assert_eq!(
            personal_message_bytes(&serde_json::json!("0x68656c6c6f")).expect("hex"),
            b"hello".to_vec()
        );
        assert_eq!(
            personal_message_bytes(&serde_json::json!("hello")).expect("text"),
            b"hello".to_vec()
        );
        assert_eq!(
            personal_message_bytes(&serde_json::json!("0xnothex")).expect("text"),
            b"0xnothex".to_vec()
        );
    }

    #[test]
    fn typed_text_is_parsed_except_for_v1() {
        let text = Value::String(r#"{"primaryType":"Mail"}"#.to_owned());
        let parsed = typed_payload(TypedDataVersion::V4, text.clone()).expect("v4");
        assert_eq!(parsed["primaryType"], "Mail");
        assert_eq!(typed_payload(TypedDataVersion::V1, text.clone()).expect("v1"), text);
        assert!(typed_payload(TypedDataVersion::V3, Value::String("{".to_owned())).is_err());
    }
}
