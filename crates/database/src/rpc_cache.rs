//! Content-addressed RPC response caching.
//!
//! Wraps an [`EthClient`] and records deterministic responses in the sync
//! store, keyed by `(chainId, md5(canonical(request)))`. The cache is
//! advisory: store failures degrade to a plain client call. Head-relative
//! requests (`latest` tag, hash-keyed lookups whose hash pins the content)
//! are either skipped or safe by construction; number-keyed entries carry
//! their block so reorg handling can prune them.

use std::sync::Arc;

use alloy_primitives::B256;
use async_trait::async_trait;
use eventide_common::{
    types::rpc::{Block, Log, TraceResult, TransactionReceipt},
    BlockTag, EthClient, EthClientError, LogQuery, RpcCacheEntry, SyncStore,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::warn;

use crate::cache_key::canonical_json;

/// An [`EthClient`] that caches deterministic responses in the sync store.
#[derive(Debug)]
pub struct CachedEthClient<C, S> {
    client: C,
    store: Arc<S>,
    chain_id: u64,
    disabled: bool,
}

impl<C: EthClient, S: SyncStore> CachedEthClient<C, S> {
    /// Wraps a client; `disabled` bypasses the cache entirely.
    pub fn new(client: C, store: Arc<S>, chain_id: u64, disabled: bool) -> Self {
        Self {
            client,
            store,
            chain_id,
            disabled,
        }
    }

    async fn lookup(&self, request: &str) -> Option<String> {
        if self.disabled {
            return None;
        }
        match self
            .store
            .get_rpc_request_results(self.chain_id, vec![request.to_owned()])
            .await
        {
            Ok(mut results) => results.pop().flatten(),
            Err(error) => {
                warn!(%error, "rpc cache lookup failed; falling through");
                None
            }
        }
    }

    async fn record(&self, request: String, block_number: Option<u64>, result: String) {
        if self.disabled {
            return;
        }
        let entry = RpcCacheEntry {
            request,
            block_number,
            result,
        };
        if let Err(error) = self
            .store
            .insert_rpc_request_results(self.chain_id, vec![entry])
            .await
        {
            warn!(%error, "rpc cache write failed; response not cached");
        }
    }

    async fn cached<T, F>(
        &self,
        request: serde_json::Value,
        block_number: impl Fn(&T) -> Option<u64>,
        fetch: F,
    ) -> Result<T, EthClientError>
    where
        T: Serialize + DeserializeOwned,
        F: std::future::Future<Output = Result<T, EthClientError>>,
    {
        let request = canonical_json(&request);

        if let Some(raw) = self.lookup(&request).await {
            match serde_json::from_str(&raw) {
                Ok(value) => return Ok(value),
                Err(error) => warn!(%error, "corrupt rpc cache entry; refetching"),
            }
        }

        let value = fetch.await?;
        match serde_json::to_string(&value) {
            Ok(raw) => self.record(request, block_number(&value), raw).await,
            Err(error) => warn!(%error, "unserializable rpc response; not cached"),
        }
        Ok(value)
    }
}

#[async_trait]
impl<C: EthClient, S: SyncStore> EthClient for CachedEthClient<C, S> {
    async fn block_number(&self) -> Result<u64, EthClientError> {
        // head-relative; never cached
        self.client.block_number().await
    }

    async fn block_by_number(
        &self,
        tag: BlockTag,
        with_transactions: bool,
    ) -> Result<Option<Block>, EthClientError> {
        let BlockTag::Number(number) = tag else {
            // head-relative; never cached
            return self.client.block_by_number(tag, with_transactions).await;
        };

        let request = json!({
            "method": "eth_getBlockByNumber",
            "params": [format!("{number:#x}"), with_transactions],
        });
        self.cached(
            request,
            |_: &Option<Block>| Some(number),
            self.client.block_by_number(tag, with_transactions),
        )
        .await
    }

    async fn block_by_hash(
        &self,
        hash: B256,
        with_transactions: bool,
    ) -> Result<Option<Block>, EthClientError> {
        let request = json!({
            "method": "eth_getBlockByHash",
            "params": [format!("{hash:#x}"), with_transactions],
        });
        // hash-keyed: content-addressed, survives reorgs untouched
        self.cached(
            request,
            |_: &Option<Block>| None,
            self.client.block_by_hash(hash, with_transactions),
        )
        .await
    }

    async fn logs(&self, query: LogQuery) -> Result<Vec<Log>, EthClientError> {
        let Some(to_block) = query.to_block else {
            return self.client.logs(query).await;
        };

        let request = json!({
            "method": "eth_getLogs",
            "params": [{
                "fromBlock": query.from_block.map(|b| format!("{b:#x}")),
                "toBlock": format!("{to_block:#x}"),
                "address": query.addresses.iter().map(|a| format!("{a:#x}")).collect::<Vec<_>>(),
                "topics": query.topics.iter().map(|t| {
                    t.as_ref().map(|values| values.iter().map(|v| format!("{v:#x}")).collect::<Vec<_>>())
                }).collect::<Vec<_>>(),
            }],
        });
        self.cached(
            request,
            |_: &Vec<Log>| Some(to_block),
            self.client.logs(query.clone()),
        )
        .await
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, EthClientError> {
        let request = json!({
            "method": "eth_getTransactionReceipt",
            "params": [format!("{hash:#x}")],
        });
        self.cached(
            request,
            |receipt: &Option<TransactionReceipt>| receipt.as_ref().map(|r| r.block_number),
            self.client.transaction_receipt(hash),
        )
        .await
    }

    async fn block_receipts(&self, hash: B256) -> Result<Vec<TransactionReceipt>, EthClientError> {
        let request = json!({
            "method": "eth_getBlockReceipts",
            "params": [format!("{hash:#x}")],
        });
        self.cached(
            request,
            |_: &Vec<TransactionReceipt>| None,
            self.client.block_receipts(hash),
        )
        .await
    }

    async fn trace_block_by_hash(&self, hash: B256) -> Result<Vec<TraceResult>, EthClientError> {
        let request = json!({
            "method": "debug_traceBlockByHash",
            "params": [format!("{hash:#x}"), {"tracer": "callTracer"}],
        });
        self.cached(
            request,
            |_: &Vec<TraceResult>| None,
            self.client.trace_block_by_hash(hash),
        )
        .await
    }
}
