mod broker;
mod config;
mod error;
mod init;
mod logger;
mod retransmit;
mod session;

use std::{path::PathBuf, sync::Arc};

use config::BrokerConfig;
use init::MqttEnv;
use mqtt_core::io::read_frame;
use tokio::net::{tcp::OwnedWriteHalf, TcpListener, TcpStream};

use broker::Broker;
use session::{Next, Session};

#[tokio::main]
async fn main() {
    let env = MqttEnv::new(&PathBuf::from("config.toml")).init_env();
    let config = env.config();

    run(config).await;
}

async fn run(config: BrokerConfig) {
    let addr = config.addr();
    let retransmit_interval = config.retransmit_interval();
    let broker: Arc<Broker<OwnedWriteHalf>> = Arc::new(Broker::new(config.max_in_flight()));

    let listener = TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("Could not bind to {addr}: {err}"));

    log::info!("Server listening at {addr}");

    tokio::spawn(retransmit::run(broker.clone(), retransmit_interval));

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                log::info!("New connection: {peer_addr}");

                let broker = broker.clone();
                tokio::spawn(async move {
                    handle_connection(broker, stream).await;
                    log::info!("Connection closed: {peer_addr}");
                });
            }
            Err(err) => {
                log::warn!("Failed to accept connection: {err}");
            }
        }
    }
}

async fn handle_connection(broker: Arc<Broker<OwnedWriteHalf>>, stream: TcpStream) {
    let (mut read_half, write_half) = stream.into_split();
    let mut session = Session::new(broker, write_half);

    loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                log::warn!("Connection read error: {err}");
                break;
            }
        };

        match session.handle_frame(frame).await {
            Ok(Next::Continue) => {}
            Ok(Next::Close) => break,
            Err(err) => {
                log::warn!("Session error: {err}");
                break;
            }
        }
    }

    session.cleanup().await;
}
