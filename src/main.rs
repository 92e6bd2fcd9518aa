use clap::{Parser, Subcommand};
use log::{info, LevelFilter};

use qfc::{
    crypto::KeyPair, ledger::Ledger, sharding::shard_for, transaction::Transaction,
    LedgerError, Result, DEFAULT_DIFFICULTY, DEFAULT_SHARD_COUNT, NATIVE_ASSET,
};

/// QFC - a sharded proof-of-work ledger with cross-shard atomic settlement
///
/// Ledger state is in-memory and lives for a single invocation; there is no
/// on-disk persistence.
#[derive(Parser)]
#[command(name = "qfc")]
#[command(about = "A sharded proof-of-work ledger with energy-aware mining")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Mining difficulty
    #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Number of shards
    #[arg(short, long, default_value_t = DEFAULT_SHARD_COUNT)]
    shards: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted demo: seed accounts, submit transfers, mine blocks
    Demo {
        /// Number of demo transfers to submit
        #[arg(short, long, default_value = "4")]
        transactions: usize,
    },
    /// Submit a signed transfer from a freshly keyed, seeded sender
    Submit {
        /// Sender address (the first character decides the shard)
        sender: String,
        /// Recipient address
        recipient: String,
        /// Amount of the native asset to transfer
        amount: f64,
        /// Balance seeded to the sender before submission
        #[arg(long, default_value = "1000.0")]
        seed: f64,
    },
    /// Mine the pending pool of the miner's shard
    Mine {
        /// Miner address; the reward is credited here
        miner: String,
        /// Seed the miner and submit a transfer to this address first, so
        /// there is something to mine
        #[arg(long)]
        transfer_to: Option<String>,
        /// Amount for the seeded transfer
        #[arg(long, default_value = "10.0")]
        amount: f64,
    },
    /// Show the balance of an address
    Balance {
        /// Address to query
        address: String,
        /// Asset identifier
        #[arg(long, default_value = NATIVE_ASSET)]
        asset: String,
    },
    /// Print a shard's chain
    Chain {
        /// Shard identifier
        shard: u32,
    },
    /// Print ledger statistics
    Stats,
    /// Show which shard an address routes to
    Route {
        /// Address to route
        address: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match cli.command {
        Commands::Demo { transactions } => run_demo(cli.shards, cli.difficulty, transactions),
        Commands::Submit { sender, recipient, amount, seed } => {
            let ledger = Ledger::new(cli.shards, cli.difficulty)?;
            run_submit(ledger, &sender, &recipient, amount, seed)
        }
        Commands::Mine { miner, transfer_to, amount } => {
            let ledger = Ledger::new(cli.shards, cli.difficulty)?;
            run_mine(ledger, &miner, transfer_to.as_deref(), amount)
        }
        Commands::Balance { address, asset } => {
            let ledger = Ledger::new(cli.shards, cli.difficulty)?;
            println!("{}: {:.2} {}", address, ledger.balance(&address, &asset), asset);
            Ok(())
        }
        Commands::Chain { shard } => {
            let ledger = Ledger::new(cli.shards, cli.difficulty)?;
            match ledger.chain(shard) {
                Some(chain) => {
                    println!("Shard {} chain:", shard);
                    for block in chain {
                        println!("  {}", block);
                    }
                    Ok(())
                }
                None => Err(LedgerError::ShardNotFound(shard)),
            }
        }
        Commands::Stats => {
            let ledger = Ledger::new(cli.shards, cli.difficulty)?;
            println!("{}", ledger.stats());
            Ok(())
        }
        Commands::Route { address } => {
            let shard = shard_for(&address, cli.shards)?;
            println!("{} -> shard {}", address, shard);
            Ok(())
        }
    }
}

/// Key, register, and seed a sender, then submit one signed transfer.
fn run_submit(
    mut ledger: Ledger,
    sender: &str,
    recipient: &str,
    amount: f64,
    seed: f64,
) -> Result<()> {
    info!("Generating key pair for {}", sender);
    let keys = KeyPair::generate()?;
    ledger.register_account(sender, keys.public_key().clone())?;
    ledger.credit(sender, NATIVE_ASSET, seed)?;

    let mut tx = Transaction::new(sender.to_string(), recipient.to_string(), amount)?;
    tx.sign(&keys)?;
    let short = tx.short_hash();

    if ledger.submit(tx) {
        println!("Accepted {}", short);
        println!("  {}: {:.2} {}", sender, ledger.balance(sender, NATIVE_ASSET), NATIVE_ASSET);
        println!("  {}: {:.2} {}", recipient, ledger.balance(recipient, NATIVE_ASSET), NATIVE_ASSET);
    } else {
        println!("Rejected {}", short);
    }
    Ok(())
}

/// Optionally seed a transfer, then drive one mining round for the miner.
fn run_mine(
    mut ledger: Ledger,
    miner: &str,
    transfer_to: Option<&str>,
    amount: f64,
) -> Result<()> {
    if let Some(recipient) = transfer_to {
        info!("Seeding a transfer {} -> {}", miner, recipient);
        let keys = KeyPair::generate()?;
        ledger.register_account(miner, keys.public_key().clone())?;
        ledger.credit(miner, NATIVE_ASSET, amount * 2.0)?;

        let mut tx = Transaction::new(miner.to_string(), recipient.to_string(), amount)?;
        tx.sign(&keys)?;
        if !ledger.submit(tx) {
            println!("Seeded transfer rejected");
        }
    }

    match ledger.mine(miner) {
        Ok(Some(block)) => {
            println!("Mined {} on shard {}", block, ledger.shard_for_address(miner)?)
        }
        Ok(None) => println!("Nothing to mine for {}", miner),
        Err(LedgerError::MiningCancelled) => println!("Mining cancelled for {}", miner),
        Err(err) => return Err(err),
    }

    println!("Miner balance: {:.2} {}", ledger.balance(miner, NATIVE_ASSET), NATIVE_ASSET);
    Ok(())
}

/// Scripted walkthrough of the client surface: submit, mine, balance, chain.
fn run_demo(shards: u32, difficulty: u32, transactions: usize) -> Result<()> {
    // Demo identities; the leading nibble decides the shard.
    const ALICE: &str = "a1c0ffee";
    const CAROL: &str = "2b00cafe"; // same shard as alice under 4 shards
    const FRANK: &str = "f0decade"; // different shard under 4 shards
    const MINER: &str = "b7aa0001";

    let mut ledger = Ledger::new(shards, difficulty)?;

    info!("Generating demo key pair");
    let alice_keys = KeyPair::generate()?;
    ledger.register_account(ALICE, alice_keys.public_key().clone())?;
    ledger.credit(ALICE, NATIVE_ASSET, 1_000.0)?;

    println!("Submitting {} transfers from {}", transactions, ALICE);
    for i in 0..transactions {
        let recipient = if i % 2 == 0 { CAROL } else { FRANK };
        let mut tx = Transaction::new(ALICE.to_string(), recipient.to_string(), 10.0 + i as f64)?;
        tx.sign(&alice_keys)?;

        let accepted = ledger.submit(tx);
        println!("  {} -> {}: {}", ALICE, recipient, if accepted { "accepted" } else { "rejected" });
    }

    for miner in [ALICE, MINER, FRANK] {
        match ledger.mine(miner) {
            Ok(Some(block)) => println!("Mined {} on shard {}", block, ledger.shard_for_address(miner)?),
            Ok(None) => println!("Nothing to mine for {}", miner),
            Err(LedgerError::MiningCancelled) => println!("Mining cancelled for {}", miner),
            Err(err) => return Err(err),
        }
    }

    println!();
    for (address, label) in [(ALICE, "alice"), (CAROL, "carol"), (FRANK, "frank"), (MINER, "miner")] {
        println!("Balance of {} ({}): {:.2} {}", label, address, ledger.balance(address, NATIVE_ASSET), NATIVE_ASSET);
    }

    println!();
    println!("{}", ledger.stats());

    for shard_id in 0..ledger.shard_count() {
        if let Some(chain) = ledger.chain(shard_id) {
            println!("Shard {} chain:", shard_id);
            for block in chain {
                println!("  {}", block);
            }
        }
    }

    ledger.validate()?;
    println!("Chain validation passed");
    Ok(())
}
