use actix_web::{App, HttpServer, web};
use clap::{Parser, Subcommand};
use log::{error, info};

use blockledger::api::{self, AppState};
use blockledger::blockchain::{Blockchain, ChainStore, SledKv};
use blockledger::config::Config;
use blockledger::error::ChainError;

#[derive(Parser)]
#[command(
    name = "block",
    author,
    version,
    about = "block is a tool for interacting with a blockchain",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine a new block carrying DATA and make it the tip
    Append {
        /// Data recorded in the block's coinbase
        data: String,
    },
    /// View the blockchain
    #[command(subcommand)]
    Print(PrintCommand),
    /// List every unspent output
    Utxo,
    /// Sum the unspent outputs locked to ADDRESS
    Balance { address: String },
    /// List transactions paying to or spending from ADDRESS, newest first
    History { address: String },
    /// Check hashes, proof-of-work and linkage of the whole chain
    Verify,
    /// Destroy the stored chain
    Drop,
    /// Serve the JSON API
    Serve,
}

#[derive(Subcommand)]
enum PrintCommand {
    /// Every block, genesis first
    Chain,
    /// A single block by hash
    Block { hash: String },
    /// The current tip
    Tip,
}

fn open_store(config: &Config) -> Result<ChainStore<SledKv>, ChainError> {
    let engine = SledKv::open(&config.data_dir).map_err(|e| ChainError::StoreRead {
        key: config.data_dir.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(ChainStore::new(engine))
}

fn open_chain(config: &Config) -> Result<Blockchain<SledKv>, ChainError> {
    Blockchain::open(open_store(config)?, config.chain.clone())
}

fn run(cli: Cli, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Append { data } => {
            let mut bc = open_chain(&config)?;
            let block = bc.append(&data)?;
            println!("Block {block}");
        }
        Commands::Print(PrintCommand::Chain) => {
            let bc = open_chain(&config)?;
            println!("Blockchain {{");
            println!("  currentHash: {:?}", bc.current_hash());
            println!("  blocks: [");
            let blocks = match bc.all_blocks() {
                Ok(blocks) => blocks,
                Err(e) => {
                    error!("traversal stopped early: {}", e.source);
                    e.blocks
                }
            };
            for block in &blocks {
                println!("    {block}");
            }
            println!("  ]");
            println!("}}");
        }
        Commands::Print(PrintCommand::Block { hash }) => {
            let bc = open_chain(&config)?;
            println!("Block {}", bc.find_by_hash(&hash)?);
        }
        Commands::Print(PrintCommand::Tip) => {
            let bc = open_chain(&config)?;
            println!("Block {}", bc.find_last()?);
        }
        Commands::Utxo => {
            let bc = open_chain(&config)?;
            let utxo = bc.find_unspent()?;
            let mut grouped: Vec<_> = utxo.by_transaction().into_iter().collect();
            grouped.sort_by(|a, b| a.0.cmp(&b.0));
            for (txid, outputs) in grouped {
                for out in outputs {
                    println!("{txid} {} -> {}", out.value, out.lock_script);
                }
            }
        }
        Commands::Balance { address } => {
            let bc = open_chain(&config)?;
            let utxo = bc.find_unspent()?;
            println!("Balance of {address:?}: {}", utxo.balance(&address));
        }
        Commands::History { address } => {
            let bc = open_chain(&config)?;
            for txn in bc.history(&address)? {
                println!(
                    "{} inputs={} outputs={} value={}",
                    txn.id,
                    txn.inputs.len(),
                    txn.outputs.len(),
                    txn.total_output_value()
                );
            }
        }
        Commands::Verify => {
            let bc = open_chain(&config)?;
            let count = bc.verify()?;
            println!("chain OK: {count} blocks");
        }
        Commands::Drop => {
            open_store(&config)?.clear()?;
            info!("chain at {} destroyed", config.data_dir.display());
        }
        Commands::Serve => actix_web::rt::System::new().block_on(serve(config))?,
    }
    Ok(())
}

async fn serve(config: Config) -> std::io::Result<()> {
    let bc = open_chain(&config).map_err(std::io::Error::other)?;
    let state = web::Data::new(AppState::new(bc));

    println!(
        "⛓️ Starting blockchain API at http://{}:{}",
        config.host, config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();
    let cli = Cli::parse();

    let result = Config::from_env()
        .map_err(Box::<dyn std::error::Error>::from)
        .and_then(|config| run(cli, config));
    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
