//! Typed parameters for the three internal JSON-RPC methods the connector
//! itself speaks (spec §6): `wc_sessionRequest`, `wc_sessionUpdate`,
//! `wc_exchangeKey`. Arbitrary passthrough methods (`eth_sendTransaction`,
//! `eth_sign`, …) are carried as opaque `serde_json::Value` and are never
//! typed here — the connector does not validate RPC method semantics.

use serde::{Deserialize, Serialize};

/// Metadata describing a peer, resolved lazily by the client-meta provider
/// and read-only after first observation (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMeta {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

/// `wc_sessionRequest` params (singleton array on the wire, per the
/// reference protocol: `params: [{peerId, peerMeta}]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequestParams {
    #[serde(rename = "peerId")]
    pub peer_id: String,
    #[serde(rename = "peerMeta")]
    pub peer_meta: PeerMeta,
}

/// `wc_sessionUpdate` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdateParams {
    pub approved: bool,
    #[serde(rename = "chainId", default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `wc_exchangeKey` params: the initiator's identity and the staged next
/// key, hex-encoded at this boundary (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeKeyParams {
    #[serde(rename = "peerId")]
    pub peer_id: String,
    #[serde(rename = "peerMeta")]
    pub peer_meta: PeerMeta,
    #[serde(rename = "nextKey")]
    pub next_key: String,
}

/// Response params for the handshake approve/reject (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionApprovalResult {
    pub approved: bool,
    #[serde(rename = "chainId", default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<String>>,
    #[serde(rename = "peerId", default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(rename = "peerMeta", default, skip_serializing_if = "Option::is_none")]
    pub peer_meta: Option<PeerMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_update_omits_absent_optional_fields() {
        let params = SessionUpdateParams {
            approved: false,
            chain_id: None,
            accounts: None,
            message: Some("bye".into()),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("chainId").is_none());
        assert!(json.get("accounts").is_none());
        assert_eq!(json["message"], "bye");
    }
}
