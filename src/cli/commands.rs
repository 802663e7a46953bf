use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ledger-chain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    #[command(name = "newwallet", about = "Create a new wallet")]
    NewWallet,
    #[command(
        name = "getbalance",
        about = "Get the wallet balance of the target address"
    )]
    GetBalance {
        #[arg(long = "address", help = "The wallet address")]
        address: String,
    },
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(
        name = "send",
        about = "Send value between addresses and mine it into a new block"
    )]
    Send {
        #[arg(help = "Source wallet address")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send (in base units)")]
        amount: u64,
        #[arg(help = "Address receiving the block reward")]
        miner: String,
        #[arg(help = "Note stored in the block's coinbase transaction")]
        data: String,
    },
    #[command(name = "printchain", about = "Print all blocks in the blockchain")]
    Printchain,
}
