//! Client interface for Ethereum-style JSON-RPC endpoints.
//!
//! The transport (rate limiting, retries at the HTTP layer, batching) lives
//! outside this crate; the sync core consumes the trait below and performs
//! its own task-level retry and range-splitting recovery.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use thiserror::Error;

use crate::types::rpc::{Block, Log, TraceResult, TransactionReceipt};

/// Block selector for `eth_getBlockByNumber`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    /// The chain head.
    Latest,
    /// A specific block number.
    Number(u64),
}

/// Parameters of an `eth_getLogs` call.
///
/// Exactly one of `range` or `block_hash` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub block_hash: Option<B256>,
    /// Address constraint; empty means unconstrained.
    pub addresses: Vec<Address>,
    /// Positional topic constraints; `None` means unconstrained.
    pub topics: [Option<Vec<B256>>; 4],
}

impl LogQuery {
    /// Range-bounded query.
    pub fn range(from_block: u64, to_block: u64) -> Self {
        LogQuery {
            from_block: Some(from_block),
            to_block: Some(to_block),
            ..Default::default()
        }
    }

    /// Single-block query by hash.
    pub fn at_hash(block_hash: B256) -> Self {
        LogQuery {
            block_hash: Some(block_hash),
            ..Default::default()
        }
    }

    /// Constrains the queried addresses.
    pub fn with_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.addresses = addresses;
        self
    }

    /// Constrains one topic position.
    pub fn with_topic(mut self, position: usize, values: Vec<B256>) -> Self {
        self.topics[position] = Some(values);
        self
    }
}

/// Ethereum JSON-RPC surface consumed by the sync core.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait EthClient: Send + Sync + 'static {
    /// `eth_blockNumber`.
    async fn block_number(&self) -> Result<u64, EthClientError>;

    /// `eth_getBlockByNumber`.
    async fn block_by_number(
        &self,
        tag: BlockTag,
        with_transactions: bool,
    ) -> Result<Option<Block>, EthClientError>;

    /// `eth_getBlockByHash`.
    async fn block_by_hash(
        &self,
        hash: B256,
        with_transactions: bool,
    ) -> Result<Option<Block>, EthClientError>;

    /// `eth_getLogs`.
    async fn logs(&self, query: LogQuery) -> Result<Vec<Log>, EthClientError>;

    /// `eth_getTransactionReceipt`.
    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, EthClientError>;

    /// `eth_getBlockReceipts`.
    async fn block_receipts(&self, hash: B256) -> Result<Vec<TransactionReceipt>, EthClientError>;

    /// `debug_traceBlockByHash` with the `callTracer`.
    async fn trace_block_by_hash(&self, hash: B256) -> Result<Vec<TraceResult>, EthClientError>;
}

#[async_trait]
impl<T: EthClient> EthClient for std::sync::Arc<T> {
    async fn block_number(&self) -> Result<u64, EthClientError> {
        (**self).block_number().await
    }

    async fn block_by_number(
        &self,
        tag: BlockTag,
        with_transactions: bool,
    ) -> Result<Option<Block>, EthClientError> {
        (**self).block_by_number(tag, with_transactions).await
    }

    async fn block_by_hash(
        &self,
        hash: B256,
        with_transactions: bool,
    ) -> Result<Option<Block>, EthClientError> {
        (**self).block_by_hash(hash, with_transactions).await
    }

    async fn logs(&self, query: LogQuery) -> Result<Vec<Log>, EthClientError> {
        (**self).logs(query).await
    }

    async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, EthClientError> {
        (**self).transaction_receipt(hash).await
    }

    async fn block_receipts(&self, hash: B256) -> Result<Vec<TransactionReceipt>, EthClientError> {
        (**self).block_receipts(hash).await
    }

    async fn trace_block_by_hash(&self, hash: B256) -> Result<Vec<TraceResult>, EthClientError> {
        (**self).trace_block_by_hash(hash).await
    }
}

/// Fetches a block by number and validates its presence.
///
/// This is a checked version of [`EthClient::block_by_number`] for callers
/// that require the block to exist (historical block tasks, gap filling).
pub async fn block_by_number_checked(
    client: &impl EthClient,
    number: u64,
    with_transactions: bool,
) -> Result<Block, EthClientError> {
    client
        .block_by_number(BlockTag::Number(number), with_transactions)
        .await?
        .ok_or_else(|| {
            EthClientError::InconsistentResponse(format!("block {number} not returned"))
        })
}

/// Fetches logs at a block hash and validates each log's `blockHash`.
pub async fn logs_at_hash_checked(
    client: &impl EthClient,
    block_hash: B256,
) -> Result<Vec<Log>, EthClientError> {
    let logs = client.logs(LogQuery::at_hash(block_hash)).await?;
    for log in &logs {
        if log.block_hash != block_hash {
            return Err(EthClientError::InconsistentResponse(format!(
                "log {} of block {} carries block hash {}",
                log.log_index, block_hash, log.block_hash
            )));
        }
    }
    Ok(logs)
}

/// Errors surfaced by an [`EthClient`].
#[derive(Debug, Error)]
pub enum EthClientError {
    /// Request was rate limited.
    #[error("rate limited")]
    RateLimited,

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP error response outside the JSON-RPC envelope.
    #[error("http error {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// JSON-RPC `InvalidParams` error; historical workers inspect the
    /// message for provider range hints.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The response contradicts the request (wrong block hash, missing
    /// receipt, trace referencing an unknown transaction).
    #[error("inconsistent response: {0}")]
    InconsistentResponse(String),

    /// Other unspecified error.
    #[error(transparent)]
    Other(#[from] eyre::Error),
}

impl EthClientError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a JSON-RPC error.
    pub fn rpc(code: i64, msg: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: msg.into(),
        }
    }

    /// Whether a plain retry may succeed (transient transport conditions).
    ///
    /// `InvalidParams` and HTTP 4xx are not retryable as-is, but may be
    /// recoverable by splitting the requested range.
    pub fn is_retryable(&self) -> bool {
        match self {
            EthClientError::RateLimited
            | EthClientError::Timeout
            | EthClientError::Network(_) => true,
            EthClientError::Http { status, .. } => *status >= 500,
            EthClientError::Rpc { code, .. } => *code == -32603 || *code == 429,
            EthClientError::InvalidParams(_)
            | EthClientError::InconsistentResponse(_)
            | EthClientError::Other(_) => false,
        }
    }

    /// The provider message carried by range-sensitive errors, if any.
    pub fn provider_message(&self) -> Option<&str> {
        match self {
            EthClientError::InvalidParams(msg) => Some(msg),
            EthClientError::Http { message, .. } => Some(message),
            EthClientError::Rpc { message, .. } => Some(message),
            _ => None,
        }
    }
}
