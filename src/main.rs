// Entry point for the ledger CLI
// Every command opens the wallet registry and the ledger from the loaded config
use clap::Parser;
use data_encoding::HEXLOWER;
use ledger_chain::core::monetary::conversions::format_satoshis;
use ledger_chain::{
    convert_address, hash_pub_key, pub_key_hash_from_address, validate_address, Blockchain,
    Command, Config, Opt, Transaction, Wallets,
};
use log::{error, info, LevelFilter};
use std::process;

fn main() {
    // Info by default, RUST_LOG still wins when set
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let mut wallets = Wallets::open(&config.wallet_file)?;

    match command {
        Command::NewWallet => {
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::ListAddresses => {
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::GetBalance { address } => {
            if !validate_address(&address) {
                return Err(format!("Invalid address: {address}").into());
            }
            let blockchain = Blockchain::open(&config, &mut wallets)?;
            let pub_key_hash = pub_key_hash_from_address(&address)?;
            let balance = blockchain.get_balance(&pub_key_hash)?;
            println!(
                "Balance of {address}: {balance} ({})",
                format_satoshis(balance)
            );
        }
        Command::Send {
            from,
            to,
            amount,
            miner,
            data,
        } => {
            for address in [&from, &to, &miner] {
                if !validate_address(address) {
                    return Err(format!("Invalid address: {address}").into());
                }
            }
            let blockchain = Blockchain::open(&config, &mut wallets)?;

            // The miner's reward goes first, then the transfer itself
            let coinbase_tx = Transaction::new_coinbase_tx(&miner, &data)?;
            let transfer = Transaction::new_utxo_transaction(&from, &to, amount, &wallets, &blockchain)?;
            let block = blockchain.mine_block(&[coinbase_tx, transfer])?;
            info!("Sent {amount} from {from} to {to}");
            println!("Success! Block {}", HEXLOWER.encode(block.get_hash()));
        }
        Command::Printchain => {
            let blockchain = Blockchain::open(&config, &mut wallets)?;
            for block in blockchain.iterator() {
                let block = block?;
                println!("Version: {}", block.get_version());
                println!("Pre block hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
                println!("Merkle root: {}", HEXLOWER.encode(block.get_merkle_root()));
                println!("Cur block hash: {}", HEXLOWER.encode(block.get_hash()));
                println!("Nonce: {}", block.get_nonce());
                println!("Difficulty: {}", block.get_difficulty());
                println!("Timestamp: {}", block.get_timestamp());

                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", HEXLOWER.encode(tx.get_id()));

                    if let Some(note) = tx.coinbase_note() {
                        println!("-- Coinbase data: {note}");
                    } else {
                        for input in tx.get_vin() {
                            let pub_key_hash = hash_pub_key(input.get_pub_key());
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                convert_address(pub_key_hash.as_slice()),
                            )
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            convert_address(output.get_pub_key_hash()),
                        )
                    }
                }
                println!()
            }
        }
    }
    Ok(())
}
