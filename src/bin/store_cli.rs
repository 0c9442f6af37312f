//! Interactive REPL over a [`logkv::Store`]. No `delete` command: removing a
//! key is out of scope for this store.

use std::io::{self, Write};

use logkv::store::StoreConfig;
use logkv::Store;

fn main() {
    tracing_subscriber::fmt::init();

    let dir = std::env::var("KVSTORE_DIR").unwrap_or_else(|_| "db".to_string());
    let store = Store::open_with_config(&dir, StoreConfig::from_env()).expect("failed to open store");

    println!("logkv store-cli (type help for instructions)");

    loop {
        print!("> ");
        io::stdout().flush().unwrap();
        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            continue;
        }
        if input.is_empty() {
            // EOF on stdin.
            break;
        }

        let mut parts = input.trim().splitn(3, ' ');
        let cmd = match parts.next() {
            Some(c) if !c.is_empty() => c,
            _ => continue,
        };

        match cmd {
            "put" | "set" => {
                let key = match parts.next() {
                    Some(k) => k,
                    None => {
                        println!("Usage: put <key> <value>");
                        continue;
                    }
                };
                let value = match parts.next() {
                    Some(v) => v,
                    None => {
                        println!("Usage: put <key> <value>");
                        continue;
                    }
                };
                match store.put(key, value) {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("Error: {e}"),
                }
            }

            "get" => {
                let key = match parts.next() {
                    Some(k) => k,
                    None => {
                        println!("Usage: get <key>");
                        continue;
                    }
                };
                match store.get(key) {
                    Ok(value) => println!("{value}"),
                    Err(logkv::StoreError::NotFound) => println!("Key not found"),
                    Err(e) => println!("Error: {e}"),
                }
            }

            "list" => match store.list_keys() {
                Ok(mut keys) if !keys.is_empty() => {
                    keys.sort();
                    for key in keys {
                        println!("  {key}");
                    }
                }
                Ok(_) => println!("No keys"),
                Err(e) => println!("Error: {e}"),
            },

            "compact" => match store.compact() {
                Ok(()) => println!("Compaction finished"),
                Err(e) => println!("Compaction error: {e}"),
            },

            "stats" => match store.stats() {
                Ok(stats) => println!("{stats}"),
                Err(e) => println!("Error: {e}"),
            },

            "help" => print_help(),
            "quit" | "exit" => break,

            other => println!("Unknown command: '{other}'"),
        }
    }

    if let Err(e) = store.close() {
        println!("Error closing store: {e}");
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  put <key> <value>");
    println!("  get <key>");
    println!("  list");
    println!("  compact");
    println!("  stats");
    println!("  help");
    println!("  quit / exit");
}
