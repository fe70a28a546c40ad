//! Thin actix-web JSON query server (spec.md §6 "External interfaces").
//! One endpoint, `POST /rpc`, dispatching on a `method` field the way the
//! upstream chain daemons this node replicates from do it — see
//! `fetcher`/`p2p::protocol::methods` for the query-string flavor this
//! node speaks as a *client*; this module is the read side it offers to
//! its own callers.

use crate::rpc::ApiError;
use crate::store::{key_address, key_hash, Keyspace, Storage, StorageJsonExt};
use crate::workers::cache::CacheHandle;
use crate::workers::node_test::{DayStats, NodeRegistry, TrustRecord};
use actix_web::{post, web, App, HttpServer};
use chain_common::{Address, BalanceInfo, Hash, Token, TransactionInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub cache: Arc<CacheHandle>,
    pub last_100: Arc<Mutex<VecDeque<Hash>>>,
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

fn ok(id: Option<u64>, result: Value) -> RpcResponse {
    RpcResponse { jsonrpc: "2.0", id, result: Some(result), error: None }
}

fn err(id: Option<u64>, e: ApiError) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError { code: e.code(), message: e.to_string() }),
    }
}

fn address_param(params: &Value) -> Result<Address, ApiError> {
    let hex = params
        .get("address")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::InvalidParams("missing `address`".into()))?;
    Address::from_hex(hex).map_err(|e| ApiError::InvalidParams(format!("bad address: {e}")))
}

fn hash_param(params: &Value) -> Result<Hash, ApiError> {
    let hex = params
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::InvalidParams("missing `hash`".into()))?;
    Hash::from_hex(hex).map_err(|e| ApiError::InvalidParams(format!("bad hash: {e}")))
}

fn dispatch(state: &AppState, method: &str, params: &Value) -> Result<Value, ApiError> {
    match method {
        "getBalance" => {
            let addr = address_param(params)?;
            let balance = state
                .store
                .get_json::<BalanceInfo>(Keyspace::Balance, &key_address(&addr))?
                .ok_or(ApiError::NotFound)?;
            Ok(serde_json::to_value(balance).expect("BalanceInfo serializes"))
        }
        "getTransaction" => {
            let hash = hash_param(params)?;
            if let Some(tx) = state.cache.get_tx(&hash) {
                return Ok(serde_json::to_value(tx).expect("TransactionInfo serializes"));
            }
            let tx = state
                .store
                .get_json::<TransactionInfo>(Keyspace::Tx, &key_hash(&hash))?
                .ok_or(ApiError::NotFound)?;
            Ok(serde_json::to_value(tx).expect("TransactionInfo serializes"))
        }
        "getToken" => {
            let addr = address_param(params)?;
            let token = state
                .store
                .get_json::<Token>(Keyspace::Token, &key_address(&addr))?
                .ok_or(ApiError::NotFound)?;
            Ok(serde_json::to_value(token).expect("Token serializes"))
        }
        "getNodeTrust" => {
            let addr = address_param(params)?;
            let record = state
                .store
                .get_json::<TrustRecord>(Keyspace::NodeTrust, &key_address(&addr))?
                .ok_or(ApiError::NotFound)?;
            Ok(serde_json::to_value(record).expect("TrustRecord serializes"))
        }
        "getNodeRegistry" => {
            let registry = state
                .store
                .get_json::<NodeRegistry>(Keyspace::NodeRegistry, b"all")?
                .unwrap_or_default();
            Ok(serde_json::to_value(registry).expect("NodeRegistry serializes"))
        }
        "getNodeStats" => {
            let addr = address_param(params)?;
            let day = params.get("day").and_then(Value::as_u64).unwrap_or(0);
            let mut key = key_address(&addr);
            key.extend_from_slice(&day.to_be_bytes());
            let stats = state
                .store
                .get_json::<DayStats>(Keyspace::NodeStatBlock, &key)?
                .unwrap_or_default();
            Ok(serde_json::to_value(stats).expect("DayStats serializes"))
        }
        "getLastTransactions" => {
            let hashes: Vec<String> = state
                .last_100
                .lock()
                .expect("mutex poisoned")
                .iter()
                .map(Hash::to_hex)
                .collect();
            Ok(serde_json::to_value(hashes).expect("hash list serializes"))
        }
        other => Err(ApiError::UnknownMethod(other.to_string())),
    }
}

#[post("/rpc")]
async fn rpc_endpoint(state: web::Data<AppState>, body: web::Json<RpcRequest>) -> web::Json<RpcResponse> {
    let request = body.into_inner();
    let response = match dispatch(&state, &request.method, &request.params) {
        Ok(result) => ok(request.id, result),
        Err(e) => err(request.id, e),
    };
    web::Json(response)
}

pub async fn run_server(bind_addr: &str, state: AppState) -> std::io::Result<()> {
    let data = web::Data::new(state);
    HttpServer::new(move || App::new().app_data(data.clone()).service(rpc_endpoint))
        .bind(bind_addr)?
        .run()
        .await
}
