use std::{
    fs::{self, File},
    path::Path,
};

use crate::{config::BrokerConfig, logger::BrokerLogger};

pub struct MqttEnv {
    config: BrokerConfig,
}

impl MqttEnv {
    pub fn init_env(self) -> Self {
        if self.config.should_log_file() || self.config.should_log_console() {
            if self.config.should_log_file() {
                init_log_fs();
            }

            BrokerLogger::new(&self.config)
                .init(self.config.log_level())
                .expect("Could not initialize logger");
        }

        return self;
    }

    pub fn new(config_path: &Path) -> Self {
        match fs::exists(config_path) {
            Ok(exists) => {
                if !exists {
                    init_config();
                }
            }
            Err(err) => {
                panic!("Could not check for config file's existence, {}", err);
            }
        }

        let config = BrokerConfig::try_from(config_path).unwrap();

        return Self { config };
    }

    pub fn config(self) -> BrokerConfig {
        return self.config;
    }
}

const FILE_CREATE_ERR: &'static str = "Could not create file: ";

pub fn init_log_fs() {
    let path = Path::new("logs");

    if !fs::exists(path).expect("Could not initialize log files") {
        fs::create_dir(path).expect("Could not create logs directory");

        let path = path.to_path_buf();

        let debug = path.join("debug.log");
        if let Err(err) = File::create(&debug) {
            log::error!("{FILE_CREATE_ERR}{}\n\t{err}", debug.display());
        }

        let error = path.join("error.log");
        if let Err(err) = File::create(&error) {
            log::error!("{FILE_CREATE_ERR}{}\n\t{err}", error.display());
        }

        let main = path.join("main.log");
        if let Err(err) = File::create(&main) {
            log::error!("{FILE_CREATE_ERR}{}\n\t{err}", main.display());
        }
    }
}

const CONFIG_PATH: &'static str = "config.toml";

pub fn init_config() {
    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        let contents = r#"
[connection]
ip = "127.0.0.1"
port = 1883

[logger]
console = true
file = false
level = "Info"

[broker]
max_in_flight = 1024
retransmit_interval_secs = 2
"#;

        fs::write(CONFIG_PATH, contents).expect("Could not create config file");
    }
}
