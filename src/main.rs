use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Mutex;

mod api;
mod blockchain;
mod config;
mod network;

use blockchain::{Blockchain, ChainConfig, MinerMode};
use config::NodeConfig;
use network::Node;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::validate_chain,
        api::handlers::create_wallet,
        api::handlers::get_balance,
        api::handlers::get_balances
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::crypto::Address,
            blockchain::crypto::DigitalSignature,
            api::schema::DateTimeUtc,
            api::handlers::ChainResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::ValidateResponse,
            api::handlers::WalletResponse,
            api::handlers::BalanceResponse
        )
    ),
    tags(
        (name = "blockchain", description = "Ledger API endpoints")
    ),
    info(
        title = "Minicoin API",
        version = "1.0.0",
        description = "A minimal proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env()?;
    let wallet = config.wallet()?;
    let mint = config.mint_wallet()?;
    let premine_to = config.premine_address()?;

    info!("node identity: {}", wallet.address());

    let mut chain_config = ChainConfig::new(mint, premine_to);
    if config.miner_threads > 1 {
        chain_config.miner = MinerMode::Parallel {
            workers: config.miner_threads,
        };
    }

    let blockchain = web::Data::new(Mutex::new(Blockchain::new(chain_config)));

    // Peer gossip runs alongside the HTTP API
    let node = Node::new(config.public_address.clone());
    let seeds = config.peers.clone();
    let p2p_port = config.p2p_port;
    actix_web::rt::spawn(async move {
        if let Err(err) = node.start(p2p_port, seeds).await {
            error!("peer listener stopped: {}", err);
        }
    });

    info!(
        "starting HTTP server at http://127.0.0.1:{}",
        config.api_port
    );

    let api_port = config.api_port;
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(blockchain.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind(("127.0.0.1", api_port))?
    .run()
    .await?;

    Ok(())
}
