use core::net::Ipv4Addr;

use std::{
    fs::File,
    io::Read,
    path::Path,
    str::FromStr,
    time::Duration,
};

use log::LevelFilter;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct BrokerConfig {
    connection: Connection,
    #[serde(default)]
    logger: Logger,
    #[serde(default)]
    broker: Broker,
}

impl BrokerConfig {
    pub fn addr(&self) -> String {
        return self.connection.ip.to_string() + ":" + &self.connection.port.to_string();
    }

    pub fn should_log_file(&self) -> bool {
        return self.logger.file;
    }

    pub fn should_log_console(&self) -> bool {
        return self.logger.console;
    }

    pub fn log_level(&self) -> LevelFilter {
        return LevelFilter::from_str(&self.logger.level).expect(&format!(
            "Invalid log level provided: {}. Accepted levels are: Off, Error, Warn, Info, Debug",
            self.logger.level
        ));
    }

    pub fn max_in_flight(&self) -> usize {
        return self.broker.max_in_flight;
    }

    pub fn retransmit_interval(&self) -> Duration {
        return Duration::from_secs(self.broker.retransmit_interval_secs);
    }
}

impl TryFrom<&Path> for BrokerConfig {
    type Error = toml::de::Error;
    fn try_from(value: &Path) -> Result<Self, toml::de::Error> {
        let mut file = match File::open(value) {
            Ok(file) => file,
            Err(err) => {
                log::warn!(
                    "Could not load file: {} to initialize the configuration.",
                    value.to_str().unwrap_or("")
                );
                log::error!("{err}");
                panic!();
            }
        };

        let mut buf = String::new();
        if let Err(err) = file.read_to_string(&mut buf) {
            log::warn!("Could not read file {}", value.to_str().unwrap_or(""));
            log::error!("{err}");
        }

        let config: BrokerConfig = toml::from_str(&buf)?;

        return Ok(config);
    }
}

#[derive(Deserialize)]
struct Connection {
    ip: Ipv4Addr,
    port: u16,
}

#[derive(Deserialize)]
pub struct Logger {
    console: bool,
    file: bool,
    level: String,
}

impl Default for Logger {
    fn default() -> Self {
        return Self {
            console: true,
            file: false,
            level: String::from("Info"),
        };
    }
}

#[derive(Deserialize)]
pub struct Broker {
    max_in_flight: usize,
    retransmit_interval_secs: u64,
}

impl Default for Broker {
    fn default() -> Self {
        return Self {
            max_in_flight: 1024,
            retransmit_interval_secs: 2,
        };
    }
}
