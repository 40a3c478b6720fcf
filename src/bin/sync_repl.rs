//! Simple CLI for basic durable-write (SyncWrite) operations.

use std::{env, process::exit};

use log::{error, LevelFilter};

use mctools::client::Client;
use mctools::{exercise, parse_address, McClient, McError, Result};

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 7 {
        eprintln!(
            "Usage: {} <host[:port]> <user> <password> <bucket> <op> <key> [value] [args]",
            args.first().map(String::as_str).unwrap_or("sync-repl")
        );
        exit(1);
    }

    if let Err(e) = run(&args) {
        match e {
            // Unknown operation names are reported without the log prefix,
            // matching the usage message style.
            McError::UnknownOperation(_) => eprintln!("{}", e),
            _ => error!("{}", e),
        }
        exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let target = parse_address(&args[1])?;
    let mut client = McClient::connect(&target)?;

    client.enable_xerror()?;
    client.enable_mutation_seqno()?;
    client.enable_tracing()?;
    client.hello("sync-repl")?;
    client.sasl_auth_plain(&args[2], &args[3])?;
    client.select_bucket(&args[4])?;

    let op = &args[5];
    let key = &args[6];
    let value = args.get(7).map(String::as_str);
    let extra = args.get(8..).unwrap_or(&[]);

    exercise::run_op(&mut client, op, key, value, extra)
}
