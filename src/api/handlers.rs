use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::str::FromStr;
use std::sync::Mutex;

use crate::blockchain::{Address, Block, Blockchain, Transaction, Wallet};

/// Shared ledger state: one lock around the whole ledger
pub type BlockchainData = web::Data<Mutex<Blockchain>>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address
    pub sender: String,

    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: u64,

    /// The gas attached to the transfer
    pub gas: u64,

    /// The sender's private key (for signing)
    pub private_key: String,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// The address receiving the block reward
    pub miner_address: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    /// Whether the chain passed validation
    pub valid: bool,

    /// The first violation found, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response for the wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,

    /// The wallet's private key (hex encoded)
    pub private_key: String,
}

/// Response for the balance endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    /// The address of the account
    pub address: String,

    /// The replayed balance of the account
    pub balance: i64,
}

/// Get the full blockchain
///
/// Returns the entire blockchain and its validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.lock().unwrap();

    let response = ChainResponse {
        length: chain.blocks().len(),
        chain: chain.blocks().to_vec(),
        is_valid: chain.validate().is_ok(),
    };

    HttpResponse::Ok().json(response)
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.lock().unwrap();
    HttpResponse::Ok().json(chain.pending().to_vec())
}

/// Create a new transaction
///
/// Signs the transaction with the supplied key and adds it to the pending
/// pool
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction created successfully", body = TransactionResponse),
        (status = 400, description = "Invalid transaction data")
    )
)]
pub async fn new_transaction(
    blockchain: BlockchainData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    // Load the signing wallet from the supplied private key
    let private_key_bytes = match hex::decode(&transaction_req.private_key) {
        Ok(bytes) => bytes,
        Err(_) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid private key format. Must be a hex string."
            }));
        }
    };

    let wallet = match Wallet::from_secret_key(&private_key_bytes) {
        Ok(wallet) => wallet,
        Err(err) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid private key: {}", err)
            }));
        }
    };

    let mut transaction = Transaction::new(
        Address(transaction_req.sender.clone()),
        Address(transaction_req.recipient.clone()),
        transaction_req.amount,
        transaction_req.gas,
    );

    // Fails when the key does not hold the sender's identity
    if let Err(err) = transaction.sign(&wallet) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to sign transaction: {}", err)
        }));
    }

    let mut chain = blockchain.lock().unwrap();
    match chain.add_transaction(transaction) {
        Ok(()) => {
            let response = TransactionResponse {
                message: "Transaction will be added to Block".to_string(),
                block_index: chain.blocks().len() as u64,
            };

            HttpResponse::Created().json(response)
        }
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to add transaction: {}", err)
        })),
    }
}

/// Mine a new block
///
/// Bundles all pending transactions plus the block reward into a new block
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Invalid mining request")
    )
)]
pub async fn mine_block(
    blockchain: BlockchainData,
    mine_req: web::Json<MineRequest>,
) -> impl Responder {
    let miner_address = match Address::from_str(&mine_req.miner_address) {
        Ok(address) => address,
        Err(err) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Invalid miner address: {}", err)
            }));
        }
    };

    let mut chain = blockchain.lock().unwrap();
    match chain.mine_pending(&miner_address) {
        Ok(block) => {
            let response = MineResponse {
                message: "New Block Mined".to_string(),
                block: block.clone(),
            };

            HttpResponse::Ok().json(response)
        }
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to mine block: {}", err)
        })),
    }
}

/// Check if the blockchain is valid
///
/// Validates the entire blockchain, reporting the first violation found
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidateResponse)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.lock().unwrap();

    let response = match chain.validate() {
        Ok(()) => ValidateResponse {
            valid: true,
            error: None,
        },
        Err(err) => ValidateResponse {
            valid: false,
            error: Some(err.to_string()),
        },
    };

    HttpResponse::Ok().json(response)
}

/// Create a new wallet
///
/// Creates a new wallet with a random keypair
///
/// The private key must be stored by your own
#[utoipa::path(
    post,
    path = "/api/v1/wallet/new",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet() -> impl Responder {
    let wallet = Wallet::new();

    let response = WalletResponse {
        address: wallet.address().0.clone(),
        private_key: hex::encode(wallet.export_secret_key()),
    };

    HttpResponse::Created().json(response)
}

/// Get the balance of an address
///
/// Replays the chain to derive the address's balance
#[utoipa::path(
    get,
    path = "/api/v1/balance/{address}",
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(blockchain: BlockchainData, address: web::Path<String>) -> impl Responder {
    let address = address.into_inner();
    let chain = blockchain.lock().unwrap();
    let balance = chain.balance_of(&Address(address.clone()));

    HttpResponse::Ok().json(BalanceResponse { address, balance })
}

/// Get the balance of every address seen on the chain
///
/// Replays the chain once and reports every address it mentions
#[utoipa::path(
    get,
    path = "/api/v1/balances",
    responses(
        (status = 200, description = "Balances retrieved successfully", body = Vec<BalanceResponse>)
    )
)]
pub async fn get_balances(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.lock().unwrap();

    let balances: Vec<BalanceResponse> = chain
        .balances()
        .into_iter()
        .map(|(address, balance)| BalanceResponse { address, balance })
        .collect();

    HttpResponse::Ok().json(balances)
}
