use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_queue_name")]
    pub notification_queue_name: String,
    #[serde(default = "default_failed_queue_name")]
    pub failed_queue_name: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    pub database_url: String,

    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_processing_timeout_ms")]
    pub processing_timeout_ms: u64,
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn default_queue_name() -> String {
    "notification_queue".to_string()
}

fn default_failed_queue_name() -> String {
    "notification_queue.failed".to_string()
}

fn default_prefetch_count() -> u16 {
    1
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_processing_timeout_ms() -> u64 {
    10_000
}

fn default_redelivery_delay_ms() -> u64 {
    1_000
}

fn default_max_retry_attempts() -> u32 {
    10
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_server_port() -> u16 {
    3007
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        if config.broadcast_capacity == 0 {
            return Err(anyhow!("BROADCAST_CAPACITY must be greater than zero"));
        }

        if config.processing_timeout_ms <= config.store_timeout_ms {
            return Err(anyhow!(
                "PROCESSING_TIMEOUT_MS ({}) must exceed STORE_TIMEOUT_MS ({})",
                config.processing_timeout_ms,
                config.store_timeout_ms
            ));
        }

        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }

    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}
