use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pow-ledger")]
pub struct Opt {
    #[arg(
        long = "config",
        global = true,
        help = "TOML configuration file (defaults to LEDGER_CONFIG or built-in settings)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createblockchain", about = "Create a new ledger")]
    Createblockchain {
        #[arg(help = "The address that receives the initial supply")]
        address: String,
    },
    #[command(name = "getbalance", about = "Get the balance of an address")]
    GetBalance {
        #[arg(help = "The address")]
        address: String,
    },
    #[command(name = "send", about = "Transfer value and mine it into a new block")]
    Send {
        #[arg(help = "Source address")]
        from: String,
        #[arg(help = "Destination address")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
    },
    #[command(name = "printchain", about = "Print all blocks, newest first")]
    Printchain {
        #[arg(long = "json", help = "Print one JSON object per block")]
        json: bool,
    },
    #[command(name = "validatechain", about = "Check every block hash, link and proof-of-work")]
    Validatechain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let opt = Opt::try_parse_from(["pow-ledger", "send", "alice", "bob", "400"]).unwrap();
        match opt.command {
            Command::Send { from, to, amount } => {
                assert_eq!(from, "alice");
                assert_eq!(to, "bob");
                assert_eq!(amount, 400);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(opt.config.is_none());
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let opt =
            Opt::try_parse_from(["pow-ledger", "printchain", "--json", "--config", "l.toml"])
                .unwrap();
        assert_eq!(opt.config, Some(PathBuf::from("l.toml")));
        assert!(matches!(opt.command, Command::Printchain { json: true }));
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(Opt::try_parse_from(["pow-ledger", "send", "a", "b", "-5"]).is_err());
    }
}
