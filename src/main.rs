// Entry point for the pow-ledger CLI
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, LevelFilter};
use pow_ledger::{Block, Blockchain, Command, Config, Opt, Transaction, UTXOSet, GLOBAL_CONFIG};
use serde_json::json;
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(opt: &Opt) -> pow_ledger::Result<Config> {
    match &opt.config {
        Some(path) => Config::load(path)?.with_overrides(|key| std::env::var(key).ok()),
        None => (*GLOBAL_CONFIG).clone(),
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&opt)?;

    match opt.command {
        Command::Createblockchain { address } => {
            let blockchain = Blockchain::create_blockchain(&address, &config)?;
            println!(
                "Done! Genesis block: {}",
                HEXLOWER.encode(&blockchain.get_tip_hash()?)
            );
        }
        Command::GetBalance { address } => {
            let utxo_set = UTXOSet::new(Blockchain::open(&config)?);
            let balance = utxo_set.get_balance(&address)?;
            println!("Balance of {address}: {balance}");
        }
        Command::Send { from, to, amount } => {
            let blockchain = Blockchain::open(&config)?;
            let utxo_set = UTXOSet::new(blockchain.clone());
            let transaction = Transaction::new_utxo_transaction(&from, &to, amount, &utxo_set)?;
            let block = blockchain.mine_block(&[transaction])?;
            println!("Success! Block: {}", HEXLOWER.encode(block.get_hash()));
        }
        Command::Printchain { json } => {
            let blockchain = Blockchain::open(&config)?;
            for block in blockchain.iterator()? {
                let block = block?;
                if json {
                    println!("{}", block_to_json(&block));
                } else {
                    print_block(&block);
                }
            }
        }
        Command::Validatechain => {
            let blockchain = Blockchain::open(&config)?;
            let count = blockchain.verify_chain()?;
            println!("Chain is valid: {count} block(s)");
        }
    }
    Ok(())
}

fn print_block(block: &Block) {
    println!("Pre block hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
    println!("Cur block hash: {}", HEXLOWER.encode(block.get_hash()));
    println!("Cur block Timestamp: {}", block.get_timestamp());
    println!("Nonce: {}", block.get_nonce());
    for tx in block.get_transactions() {
        println!("- Transaction txid_hex: {}", HEXLOWER.encode(tx.get_id()));
        if !tx.is_base() {
            for input in tx.get_vin() {
                println!(
                    "-- Input txid = {}, out_idx = {}, from = {}",
                    HEXLOWER.encode(input.get_txid()),
                    input.get_out_idx(),
                    input.get_from_address(),
                );
            }
        }
        for output in tx.get_vout() {
            println!(
                "-- Output value = {}, to = {}",
                output.get_value(),
                output.get_to_address()
            );
        }
    }
    println!()
}

fn block_to_json(block: &Block) -> serde_json::Value {
    let transactions: Vec<serde_json::Value> = block
        .get_transactions()
        .iter()
        .map(|tx| {
            json!({
                "id": HEXLOWER.encode(tx.get_id()),
                "base": tx.is_base(),
                "inputs": tx.get_vin().iter().map(|i| json!({
                    "txid": HEXLOWER.encode(i.get_txid()),
                    "out_idx": i.get_out_idx(),
                    "from": i.get_from_address(),
                })).collect::<Vec<_>>(),
                "outputs": tx.get_vout().iter().map(|o| json!({
                    "value": o.get_value(),
                    "to": o.get_to_address(),
                })).collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "hash": HEXLOWER.encode(block.get_hash()),
        "pre_block_hash": HEXLOWER.encode(block.get_pre_block_hash()),
        "timestamp": block.get_timestamp(),
        "target": HEXLOWER.encode(block.get_target()),
        "nonce": block.get_nonce(),
        "transactions": transactions,
    })
}
