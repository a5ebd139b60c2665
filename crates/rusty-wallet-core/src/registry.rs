use std::collections::HashMap;

use crate::approval::{self, ApprovalSpec, PreValidator};
use crate::domain::{ApprovalKind, TypedDataVersion, UiHint};
use crate::permission;

/// What runs once a call has cleared the permission and approval gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Accounts,
    Coinbase,
    RequestAccounts,
    ChainId,
    NetVersion,
    SendTransaction,
    PersonalSign,
    SignTypedData(TypedDataVersion),
    AddChain,
    SwitchChain,
    WatchAsset,
    GetEncryptionPublicKey,
    Decrypt,
    GetPermissions,
    RequestPermissions,
    /// Relayed to the read-only RPC collaborator.
    Forward,
}

#[derive(Clone, Copy)]
pub struct MethodSpec {
    pub handler: Handler,
    pub safe: bool,
    pub approval: Option<ApprovalSpec>,
}

impl MethodSpec {
    fn plain(method: &str, handler: Handler) -> Self {
        Self {
            handler,
            safe: permission::is_safe_method(method),
            approval: None,
        }
    }

    fn gated(
        method: &str,
        handler: Handler,
        kind: ApprovalKind,
        pre_validator: PreValidator,
        ui_hint: UiHint,
    ) -> Self {
        Self {
            handler,
            safe: permission::is_safe_method(method),
            approval: Some(ApprovalSpec {
                kind,
                pre_validator,
                ui_hint,
            }),
        }
    }
}

/// Method name to `{safe, approval?, handler}`, consulted at dispatch.
pub struct MethodRegistry {
    methods: HashMap<&'static str, MethodSpec>,
}

impl MethodRegistry {
    pub fn empty() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        use Handler as H;

        let mut registry = Self::empty();
        for (method, handler) in [
            ("eth_accounts", H::Accounts),
            ("eth_coinbase", H::Coinbase),
            ("eth_chainId", H::ChainId),
            ("net_version", H::NetVersion),
            ("wallet_getPermissions", H::GetPermissions),
            ("eth_sendRawTransaction", H::Forward),
        ] {
            registry.register(method, MethodSpec::plain(method, handler));
        }

        let gated: [(&'static str, Handler, ApprovalKind, PreValidator, UiHint); 13] = [
            (
                "eth_requestAccounts",
                H::RequestAccounts,
                ApprovalKind::Connect,
                approval::validate_connect,
                UiHint::height(800),
            ),
            (
                "wallet_requestPermissions",
                H::RequestPermissions,
                ApprovalKind::Connect,
                approval::validate_connect,
                UiHint::height(800),
            ),
            (
                "eth_sendTransaction",
                H::SendTransaction,
                ApprovalKind::SignTx,
                approval::validate_sign_tx,
                UiHint::height(628),
            ),
            (
                "personal_sign",
                H::PersonalSign,
                ApprovalKind::SignText,
                approval::validate_message_first,
                UiHint::height(628),
            ),
            (
                "eth_signTypedData",
                H::SignTypedData(TypedDataVersion::V1),
                ApprovalKind::SignTypedData,
                approval::validate_message_first,
                UiHint::height(628),
            ),
            (
                "eth_signTypedData_v1",
                H::SignTypedData(TypedDataVersion::V1),
                ApprovalKind::SignTypedData,
                approval::validate_message_first,
                UiHint::height(628),
            ),
            (
                "eth_signTypedData_v3",
                H::SignTypedData(TypedDataVersion::V3),
                ApprovalKind::SignTypedData,
                approval::validate_address_first,
                UiHint::height(628),
            ),
            (
                "eth_signTypedData_v4",
                H::SignTypedData(TypedDataVersion::V4),
                ApprovalKind::SignTypedData,
                approval::validate_address_first,
                UiHint::height(628),
            ),
            (
                "wallet_addEthereumChain",
                H::AddChain,
                ApprovalKind::AddChain,
                approval::validate_add_chain,
                UiHint::height(390),
            ),
            (
                "wallet_switchEthereumChain",
                H::SwitchChain,
                ApprovalKind::AddChain,
                approval::validate_add_chain,
                UiHint::height(390),
            ),
            (
                "wallet_watchAsset",
                H::WatchAsset,
                ApprovalKind::AddAsset,
                approval::validate_none,
                UiHint::min_height(600),
            ),
            (
                "eth_getEncryptionPublicKey",
                H::GetEncryptionPublicKey,
                ApprovalKind::GetPublicKey,
                approval::validate_get_public_key,
                UiHint::height(390),
            ),
            (
                "eth_decrypt",
                H::Decrypt,
                ApprovalKind::Decrypt,
                approval::validate_decrypt,
                UiHint::height(390),
            ),
        ];
        for (method, handler, kind, validator, hint) in gated {
            registry.register(method, MethodSpec::gated(method, handler, kind, validator, hint));
        }
        registry
    }

    pub fn register(&mut self, method: &'static str, spec: MethodSpec) {
        self.methods.insert(method, spec);
    }

    pub fn get(&self, method: &str) -> Option<&MethodSpec> {
        self.methods.get(method)
    }

    /// Unregistered methods are forwarded without an approval step.
    pub fn resolve(&self, method: &str) -> MethodSpec {
        self.get(method)
            .copied()
            .unwrap_or_else(|| MethodSpec::plain(method, Handler::Forward))
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_data_versions_use_different_validators() {
        let registry = MethodRegistry::standard();
        let v1 = registry.get("eth_signTypedData_v1").expect("v1");
        let v4 = registry.get("eth_signTypedData_v4").expect("v4");
        assert_eq!(v1.handler, Handler::SignTypedData(TypedDataVersion::V1));
        assert_eq!(v4.handler, Handler::SignTypedData(TypedDataVersion::V4));
        let v1_validator = v1.approval.expect("v1 approval").pre_validator;
        let v4_validator = v4.approval.expect("v4 approval").pre_validator;
        assert!(v1_validator as usize != v4_validator as usize);
    }

    #[test]
    fn signing_methods_are_never_safe() {
        let registry = MethodRegistry::standard();
        for method in [
            "eth_sendTransaction",
            "personal_sign",
            "eth_signTypedData_v4",
            "eth_decrypt",
        ] {
            let spec = registry.get(method).expect("registered");
            assert!(!spec.safe, "{method} must require permission");
            assert!(spec.approval.is_some());
        }
    }

    #[test]
    fn unknown_methods_forward() {
        let registry = MethodRegistry::standard();
        let spec = registry.resolve("eth_getBalance");
        assert_eq!(spec.handler, Handler::Forward);
        assert!(spec.safe);
        assert!(spec.approval.is_none());
        assert!(!registry.resolve("debug_traceCall").safe);
    }
}
