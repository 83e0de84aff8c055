use passive_listener::common::logger::Logger;
use passive_listener::{ChannelSink, ConfigLoader, Result, ThreadedListener};
use std::env;
use std::io::{self, BufRead};
use std::thread;
use tracing::{error, info};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <config_file>", args[0]);
        std::process::exit(1);
    }

    let config = match ConfigLoader::load(&args[1]) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error parsing config file: {}", e);
            std::process::exit(1);
        }
    };

    match Logger::parse_level(&config.log_level) {
        Ok(level) => Logger::init(level),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    let (sink, connections) = ChannelSink::bounded(config.queue_capacity, config.dispatch_timeout());
    let mut listener = match ThreadedListener::from_config(&config, sink) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error creating listener: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = start(&mut listener) {
        error!(error = %e, "failed to start listener");
        listener.close();
        std::process::exit(1);
    }

    // Drains once the listener drops its sender during shutdown.
    let consumer = thread::Builder::new()
        .name("consumer".to_string())
        .spawn(move || {
            for conn in connections {
                info!(peer = %conn.peer_addr(), "connection received");
            }
        });

    println!("Listening on {}; type 'quit' or close stdin to stop", config.address);
    for line in io::stdin().lock().lines() {
        match line {
            Ok(line) if line.trim() == "quit" => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    let result = listener.shutdown();
    drop(listener);
    if let Ok(consumer) = consumer {
        let _ = consumer.join();
    }

    if let Err(e) = result {
        eprintln!("Listener error: {}", e);
        std::process::exit(1);
    }
    info!("stopped");
}

fn start(listener: &mut ThreadedListener<ChannelSink>) -> Result<()> {
    let addr = listener.bind()?;
    listener.listen()?;
    listener.start()?;
    info!(%addr, "accepting connections");
    Ok(())
}
