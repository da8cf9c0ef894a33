pub mod assist;
pub mod cli;
pub mod connection;
pub mod console;
pub mod models;
pub mod roster;
pub mod session;
pub mod sync;
pub mod transport;
pub mod view;
pub mod widget;

use cli::Args;
use log::info;
use models::chat::SenderRole;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Role: {}", args.role);
    info!("Endpoint: {}", args.endpoint);
    info!("Transports: {}", args.transports);
    info!("Reconnect Attempts: {}", args.reconnect_attempts);
    info!("Reconnect Delay: {}ms", args.reconnect_delay_ms);
    if let Some(dir) = &args.state_dir {
        info!("State Dir: {}", dir);
    }
    info!("Reply Assistant: {}", args.assist_base_url.as_deref().unwrap_or("disabled"));
    info!("-------------------------");

    match args.role.parse::<SenderRole>()? {
        SenderRole::User => widget::run(&args).await,
        SenderRole::Admin => console::run(&args).await,
    }
}
