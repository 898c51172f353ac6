pub mod binder;
pub mod cli;
pub mod client;
pub mod dom;
pub mod frontend;
pub mod history;
pub mod models;
pub mod server;

use cli::{ Args, Command };
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command {
        Command::Serve(serve) => {
            info!("--- Server Configuration ---");
            info!("Server Address: {}", serve.server_addr);
            info!("HTTP Port: {:?}", serve.http_port);
            info!("History Store Type: {}", serve.history_type);
            if !serve.history_type.eq_ignore_ascii_case("memory") {
                info!("History Store Host: {}", serve.history_host);
            }
            info!("Retention (hours): {}", serve.retention_hours);
            info!("Broadcast Capacity: {}", serve.broadcast_capacity);
            info!("TLS Enabled: {}", serve.enable_tls);
            info!("----------------------------");

            let history = history::initialize_history_store(&serve)?;
            let server = Server::new(history, serve);
            server.run().await
        }
        Command::Join(join) => {
            info!("Joining {} as {}", join.url, join.username);
            frontend::run(join).await
        }
    }
}
