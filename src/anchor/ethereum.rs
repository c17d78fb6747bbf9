/// Ethereum calldata anchor.
///
/// `submit` hashes the anchor text with SHA-256 and sends a zero-value
/// legacy transaction to the signer's own address carrying that digest as
/// calldata. The returned transaction hash is the receipt.
///
/// Talks plain JSON-RPC over HTTP; no provider SDK is involved.
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ExternalChainClient;
use crate::crypto::hash;
use crate::error::{LedgerError, Result};

/// Gas for a self-transfer with 32 bytes of calldata, with headroom.
const ANCHOR_GAS_LIMIT: u64 = 25_000;

/// Either credential may be absent, in which case the client reports
/// itself unconfigured.
#[derive(Debug, Clone, Default)]
pub struct EthereumConfig {
    pub rpc_url: Option<String>,
    /// Hex signing key; a `0x` prefix is optional.
    pub private_key_hex: Option<String>,
    pub chain_id: u64,
}

pub struct EthereumClient {
    config: EthereumConfig,
    http: Client,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcReply<T> {
    result: Option<T>,
    error: Option<RpcFault>,
}

#[derive(Deserialize)]
struct RpcFault {
    code: Option<i64>,
    message: String,
}

/// Account state needed to build the next transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TxParams {
    nonce: u64,
    gas_price: u128,
}

impl EthereumClient {
    pub fn new(config: EthereumConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        match (
            non_blank(&self.config.rpc_url),
            non_blank(&self.config.private_key_hex),
        ) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(LedgerError::AnchorUnconfigured),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        rpc_url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let reply: RpcReply<T> = self
            .http
            .post(rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::ExternalAnchor(format!("{method} request failed: {e}")))?
            .json()
            .await
            .map_err(|e| LedgerError::Serialization(format!("{method} reply unreadable: {e}")))?;

        match (reply.result, reply.error) {
            (_, Some(fault)) => Err(LedgerError::ExternalAnchor(format!(
                "{method} rejected (code {}): {}",
                fault.code.unwrap_or_default(),
                fault.message
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(LedgerError::ExternalAnchor(format!(
                "{method} returned no result"
            ))),
        }
    }

    async fn tx_params(&self, rpc_url: &str, from: Address) -> Result<TxParams> {
        let nonce: String = self
            .call(
                rpc_url,
                "eth_getTransactionCount",
                serde_json::json!([format!("{from:?}"), "pending"]),
            )
            .await?;
        let gas_price: String = self
            .call(rpc_url, "eth_gasPrice", serde_json::json!([]))
            .await?;

        Ok(TxParams {
            nonce: parse_nonce(&nonce)?,
            gas_price: parse_quantity(&gas_price)?,
        })
    }

    async fn anchor_digest(&self, digest: &[u8; 32]) -> Result<String> {
        let (rpc_url, key) = self.credentials()?;
        let signer = parse_signer(key)?;

        let params = self.tx_params(rpc_url, signer.address()).await?;
        let tx = anchor_tx(self.config.chain_id, signer.address(), params, digest);
        let raw = sign_raw(&signer, tx).await?;

        self.call(rpc_url, "eth_sendRawTransaction", serde_json::json!([raw]))
            .await
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn parse_signer(key: &str) -> Result<PrivateKeySigner> {
    key.trim()
        .trim_start_matches("0x")
        .parse()
        .map_err(|e| LedgerError::ExternalAnchor(format!("Invalid ETH private key: {e}")))
}

/// Zero-value transaction to `from` itself carrying `digest` as calldata.
fn anchor_tx(chain_id: u64, from: Address, params: TxParams, digest: &[u8; 32]) -> TxLegacy {
    TxLegacy {
        chain_id: Some(chain_id),
        nonce: params.nonce,
        gas_price: params.gas_price,
        gas_limit: ANCHOR_GAS_LIMIT,
        to: TxKind::Call(from),
        value: U256::ZERO,
        input: Bytes::copy_from_slice(digest),
    }
}

/// Sign `tx` and return its EIP-2718 encoding as `0x`-prefixed hex.
async fn sign_raw(signer: &PrivateKeySigner, tx: TxLegacy) -> Result<String> {
    let signature = signer
        .sign_hash(&tx.signature_hash())
        .await
        .map_err(|e| LedgerError::ExternalAnchor(format!("ETH signing failed: {e}")))?;

    let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
    Ok(format!("0x{}", hex::encode(envelope.encoded_2718())))
}

/// Parse a JSON-RPC hex quantity such as `"0x1a"`.
fn parse_quantity(s: &str) -> Result<u128> {
    u128::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| LedgerError::ExternalAnchor(format!("Invalid RPC quantity {s:?}: {e}")))
}

fn parse_nonce(s: &str) -> Result<u64> {
    u64::try_from(parse_quantity(s)?)
        .map_err(|_| LedgerError::ExternalAnchor(format!("Account nonce {s} exceeds u64")))
}

#[async_trait]
impl ExternalChainClient for EthereumClient {
    fn chain_name(&self) -> &str {
        "Ethereum"
    }

    fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn submit(&self, text: &str) -> Result<String> {
        let digest = hash::sha256(text.as_bytes());
        self.anchor_digest(&digest).await
    }
}
