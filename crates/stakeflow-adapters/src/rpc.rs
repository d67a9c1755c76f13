//! JSON-RPC chain transport.
//!
//! Talks to a node that manages its own accounts (`eth_accounts`, `eth_sendTransaction`).
//! After a send is accepted, a background task polls `eth_getTransactionReceipt` and feeds
//! the hash and then the receipt into the event stream returned to the orchestrator.

use crate::egress::validate_rpc_url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use stakeflow_core::config::RpcConfig;
use stakeflow_core::{
    tx_channel, Address, ChainTransport, Hash32, MethodCall, Receipt, TransportError,
    TransportResult, TxEventSender, TxEvents, TxStatus,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

struct RpcClient {
    http: reqwest::Client,
    url: url::Url,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// EIP-1193 code for a request the user declined.
const USER_REJECTED: i64 = 4001;

impl RpcClient {
    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> TransportResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(format!("{method}: {e}"))
                } else {
                    TransportError::Http(format!("{method}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(format!("{method}: HTTP {status}")));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("{method}: {e}")))?;
        decode_envelope(method, envelope)
    }
}

fn decode_envelope<T: DeserializeOwned>(method: &str, envelope: RpcResponse) -> TransportResult<T> {
    if let Some(err) = envelope.error {
        return Err(if err.code == USER_REJECTED {
            TransportError::Rejected(err.message)
        } else {
            TransportError::Rpc {
                code: err.code,
                message: err.message,
            }
        });
    }

    serde_json::from_value(envelope.result.unwrap_or(Value::Null))
        .map_err(|e| TransportError::InvalidResponse(format!("{method}: {e}")))
}

fn strip_0x(raw: &str) -> &str {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw)
}

/// Parse a hex quantity such as `0x1a`.
pub(crate) fn parse_quantity(raw: &str) -> TransportResult<u128> {
    let digits = strip_0x(raw);
    if digits.is_empty() {
        return Err(TransportError::InvalidResponse(format!(
            "empty quantity '{raw}'"
        )));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| TransportError::InvalidResponse(format!("bad quantity '{raw}': {e}")))
}

fn parse_u64(raw: &str) -> TransportResult<u64> {
    u64::try_from(parse_quantity(raw)?)
        .map_err(|_| TransportError::InvalidResponse(format!("quantity '{raw}' exceeds u64")))
}

fn parse_data(raw: &str) -> TransportResult<Vec<u8>> {
    hex::decode(strip_0x(raw))
        .map_err(|e| TransportError::InvalidResponse(format!("bad data '{raw}': {e}")))
}

fn parse_address(raw: &str) -> TransportResult<Address> {
    raw.parse()
        .map_err(|e| TransportError::InvalidResponse(format!("{e}")))
}

fn parse_hash(raw: &str) -> TransportResult<Hash32> {
    raw.parse()
        .map_err(|e| TransportError::InvalidResponse(format!("{e}")))
}

fn quantity(value: u64) -> String {
    format!("0x{value:x}")
}

fn tx_object(call: &MethodCall, gas: Option<u64>) -> Value {
    let mut tx = json!({
        "to": call.to.to_string(),
        "data": format!("0x{}", hex::encode(call.method.calldata())),
    });
    if let Some(from) = call.from {
        tx["from"] = json!(from.to_string());
    }
    if let Some(gas) = gas {
        tx["gas"] = json!(quantity(gas));
    }
    tx
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawReceipt {
    transaction_hash: String,
    block_hash: String,
    block_number: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    cumulative_gas_used: String,
    gas_used: String,
    #[serde(default)]
    effective_gas_price: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "type", default)]
    tx_type: Option<String>,
}

impl RawReceipt {
    pub(crate) fn into_receipt(self) -> TransportResult<Receipt> {
        let status = match self.status.as_deref().map(parse_quantity).transpose()? {
            Some(1) => TxStatus::Success,
            Some(0) => TxStatus::Failure,
            Some(other) => {
                return Err(TransportError::InvalidResponse(format!(
                    "unknown receipt status {other}"
                )))
            }
            None => {
                return Err(TransportError::InvalidResponse(
                    "receipt has no status field".into(),
                ))
            }
        };
        let tx_type = match self.tx_type.as_deref() {
            Some(raw) => u8::try_from(parse_quantity(raw)?).map_err(|_| {
                TransportError::InvalidResponse(format!("transaction type '{raw}' out of range"))
            })?,
            None => 0,
        };

        Ok(Receipt {
            transaction_hash: parse_hash(&self.transaction_hash)?,
            block_hash: parse_hash(&self.block_hash)?,
            block_number: parse_u64(&self.block_number)?,
            from: parse_address(&self.from)?,
            to: self.to.as_deref().map(parse_address).transpose()?,
            cumulative_gas_used: parse_u64(&self.cumulative_gas_used)?,
            gas_used: parse_u64(&self.gas_used)?,
            effective_gas_price: self
                .effective_gas_price
                .as_deref()
                .map(parse_quantity)
                .transpose()?,
            status,
            tx_type,
        })
    }
}

/// Chain transport over HTTP JSON-RPC.
#[derive(Clone)]
pub struct JsonRpcTransport {
    client: Arc<RpcClient>,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl JsonRpcTransport {
    pub fn new(config: &RpcConfig) -> stakeflow_core::Result<Self> {
        let url = validate_rpc_url(&config.url)?;
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                stakeflow_core::StakeflowError::ConfigError(format!(
                    "Failed to create HTTP client: {e}"
                ))
            })?;

        Ok(Self {
            client: Arc::new(RpcClient {
                http,
                url,
                next_id: AtomicU64::new(1),
            }),
            poll_interval: config.receipt_poll_interval(),
            receipt_timeout: config.receipt_timeout(),
        })
    }

    pub fn url(&self) -> &url::Url {
        &self.client.url
    }
}

async fn watch_receipt(
    client: Arc<RpcClient>,
    hash: Hash32,
    sender: TxEventSender,
    poll_interval: Duration,
    receipt_timeout: Duration,
) {
    if !sender.hash(hash).await {
        return;
    }

    let deadline = tokio::time::Instant::now() + receipt_timeout;
    loop {
        match client
            .request::<Option<RawReceipt>>("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await
        {
            Ok(Some(raw)) => {
                match raw.into_receipt() {
                    Ok(receipt) => {
                        sender.receipt(receipt).await;
                    }
                    Err(e) => {
                        sender.fail(e).await;
                    }
                }
                return;
            }
            Ok(None) => debug!(%hash, "receipt not yet available"),
            Err(e) => warn!(%hash, error = %e, "receipt poll failed"),
        }

        if tokio::time::Instant::now() >= deadline {
            sender
                .fail(TransportError::Timeout(format!(
                    "no receipt for {hash} after {}s",
                    receipt_timeout.as_secs()
                )))
                .await;
            return;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[async_trait::async_trait]
impl ChainTransport for JsonRpcTransport {
    async fn chain_id(&self) -> TransportResult<u64> {
        let raw: String = self.client.request("eth_chainId", json!([])).await?;
        parse_u64(&raw)
    }

    async fn accounts(&self) -> TransportResult<Vec<Address>> {
        let raw: Vec<String> = self.client.request("eth_accounts", json!([])).await?;
        raw.iter().map(|a| parse_address(a)).collect()
    }

    #[instrument(skip_all, fields(method = call.method.name()))]
    async fn call(&self, call: &MethodCall) -> TransportResult<Vec<u8>> {
        let raw: String = self
            .client
            .request("eth_call", json!([tx_object(call, None), "latest"]))
            .await?;
        parse_data(&raw)
    }

    #[instrument(skip_all, fields(method = call.method.name()))]
    async fn estimate_gas(&self, call: &MethodCall) -> TransportResult<u64> {
        let raw: String = self
            .client
            .request("eth_estimateGas", json!([tx_object(call, None)]))
            .await?;
        parse_u64(&raw)
    }

    #[instrument(skip_all, fields(method = call.method.name(), gas = gas))]
    async fn send(&self, call: &MethodCall, gas: u64) -> TransportResult<TxEvents> {
        let raw: String = self
            .client
            .request("eth_sendTransaction", json!([tx_object(call, Some(gas))]))
            .await?;
        let hash = parse_hash(&raw)?;
        debug!(%hash, "transaction accepted");

        let (sender, events) = tx_channel();
        tokio::spawn(watch_receipt(
            self.client.clone(),
            hash,
            sender,
            self.poll_interval,
            self.receipt_timeout,
        ));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakeflow_core::ContractMethod;

    #[test]
    fn quantities_parse_with_or_without_prefix() {
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity("ff").unwrap(), 255);
        assert_eq!(parse_u64("0x13882").unwrap(), 80002);
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_u64("0x10000000000000000").is_err());
    }

    #[test]
    fn send_object_carries_gas_and_caller() {
        let call = MethodCall::new(Address([7; 20]), ContractMethod::ClaimReward).from(Address([1; 20]));
        let tx = tx_object(&call, Some(120_000));
        assert_eq!(tx["gas"], "0x1d4c0");
        assert_eq!(tx["from"], Address([1; 20]).to_string());
        assert_eq!(tx["data"], "0xb88a802f");

        let read = tx_object(&MethodCall::new(Address([7; 20]), ContractMethod::GetApy), None);
        assert!(read.get("from").is_none());
        assert!(read.get("gas").is_none());
    }

    fn raw_receipt(status: &str) -> Value {
        json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockHash": format!("0x{}", "cd".repeat(32)),
            "blockNumber": "0x10",
            "from": format!("0x{}", "11".repeat(20)),
            "to": format!("0x{}", "07".repeat(20)),
            "cumulativeGasUsed": "0x5208",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x6fc23ac00",
            "status": status,
            "type": "0x2",
            "logs": [],
        })
    }

    #[test]
    fn receipt_converts_all_fields() {
        let raw: RawReceipt = serde_json::from_value(raw_receipt("0x1")).unwrap();
        let receipt = raw.into_receipt().unwrap();
        assert_eq!(receipt.status, TxStatus::Success);
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.effective_gas_price, Some(30_000_000_000));
        assert_eq!(receipt.tx_type, 2);
        assert_eq!(receipt.to, Some(Address([7; 20])));
    }

    #[test]
    fn reverted_receipt_is_failure() {
        let raw: RawReceipt = serde_json::from_value(raw_receipt("0x0")).unwrap();
        assert_eq!(raw.into_receipt().unwrap().status, TxStatus::Failure);
    }

    #[test]
    fn rpc_errors_map_to_transport_errors() {
        let envelope: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": {"code": -32000, "message": "execution reverted: Staking is paused"}
        }))
        .unwrap();
        let err = decode_envelope::<String>("eth_estimateGas", envelope).unwrap_err();
        assert_eq!(err.user_message(), "execution reverted: Staking is paused");

        let envelope: RpcResponse = serde_json::from_value(json!({
            "error": {"code": 4001, "message": "User denied transaction signature"}
        }))
        .unwrap();
        assert!(matches!(
            decode_envelope::<String>("eth_sendTransaction", envelope),
            Err(TransportError::Rejected(_))
        ));
    }

    #[test]
    fn pending_receipt_is_null_result() {
        let envelope: RpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 3, "result": null})).unwrap();
        let receipt: Option<RawReceipt> =
            decode_envelope("eth_getTransactionReceipt", envelope).unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn constructor_rejects_plain_http_remote() {
        let config = RpcConfig {
            url: "http://rpc.example.com".into(),
            ..RpcConfig::default()
        };
        assert!(JsonRpcTransport::new(&config).is_err());
        assert!(JsonRpcTransport::new(&RpcConfig::default()).is_ok());
    }
}
