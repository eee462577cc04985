use std::env;

use chrono::Duration;
use log::*;
use spg_common::{Secret, Vnd};

const DEFAULT_SPG_HOST: &str = "127.0.0.1";
const DEFAULT_SPG_PORT: u16 = 8360;
const DEFAULT_TX_TTL_SECONDS: i64 = 300;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 5;
const DEFAULT_AMOUNT_TOLERANCE: i64 = 1000;
const DEFAULT_QR_TEMPLATE: &str = "https://qr.sepay.vn/img";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// How long a pending payment transaction lives before it expires.
    pub transaction_ttl: Duration,
    /// How often the sweeper retires lapsed transactions. Should be a small fraction of the TTL.
    pub sweep_interval_seconds: u64,
    /// Amounts within this distance of a pending transaction's amount count as equal during reconciliation. Absorbs
    /// currency-subunit rounding by some gateways.
    pub amount_tolerance: Vnd,
    /// HMAC key for inbound webhook signatures. An empty key disables verification (development only).
    pub webhook_secret: Secret<String>,
    /// The receiving account that payers transfer into; also feeds the QR image URL.
    pub bank: BankAccountConfig,
}

#[derive(Clone, Debug, Default)]
pub struct BankAccountConfig {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    /// QR image generator endpoint. The rendered image is the gateway's concern; we only compose the URL.
    pub qr_template: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPG_HOST.to_string(),
            port: DEFAULT_SPG_PORT,
            database_url: String::default(),
            transaction_ttl: Duration::seconds(DEFAULT_TX_TTL_SECONDS),
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            amount_tolerance: Vnd::from(DEFAULT_AMOUNT_TOLERANCE),
            webhook_secret: Secret::default(),
            bank: BankAccountConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPG_HOST").ok().unwrap_or_else(|| DEFAULT_SPG_HOST.into());
        let port = env::var("SPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SPG_PORT. {e} Using the default, {DEFAULT_SPG_PORT}, instead."
                    );
                    DEFAULT_SPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SPG_PORT);
        let database_url = env::var("SPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SPG_DATABASE_URL is not set. Please set it to the URL for the SPG database.");
            String::default()
        });
        let transaction_ttl = Duration::seconds(env_i64("SPG_TX_TTL_SECONDS", DEFAULT_TX_TTL_SECONDS));
        #[allow(clippy::cast_sign_loss)]
        let sweep_interval_seconds =
            env_i64("SPG_SWEEP_INTERVAL_SECONDS", DEFAULT_SWEEP_INTERVAL_SECONDS as i64).max(1) as u64;
        let amount_tolerance = Vnd::from(env_i64("SPG_AMOUNT_TOLERANCE", DEFAULT_AMOUNT_TOLERANCE));
        let webhook_secret = env::var("SPG_WEBHOOK_SECRET").map(Secret::new).unwrap_or_else(|_| {
            warn!(
                "🚨️ SPG_WEBHOOK_SECRET is not set, so inbound webhook signatures will NOT be verified. Do not run \
                 like this in production."
            );
            Secret::default()
        });
        let bank = BankAccountConfig::from_env_or_default();
        Self { host, port, database_url, transaction_ttl, sweep_interval_seconds, amount_tolerance, webhook_secret, bank }
    }
}

impl BankAccountConfig {
    pub fn from_env_or_default() -> Self {
        let bank_code = env::var("SPG_BANK_CODE").ok().unwrap_or_else(|| "MB".to_string());
        let account_number = env::var("SPG_BANK_ACCOUNT_NUMBER").ok().unwrap_or_else(|| {
            error!("🪛️ SPG_BANK_ACCOUNT_NUMBER is not set. Inbound transfers cannot be attributed to an account.");
            String::default()
        });
        let account_name = env::var("SPG_BANK_ACCOUNT_NAME").ok().unwrap_or_default();
        let qr_template = env::var("SPG_QR_TEMPLATE_URL").ok().unwrap_or_else(|| DEFAULT_QR_TEMPLATE.to_string());
        Self { bank_code, account_number, account_name, qr_template }
    }

    /// Composes the QR image URL for a payment: the gateway renders a scannable transfer into our account with the
    /// given amount and memo pre-filled.
    pub fn qr_image_url(&self, amount: Vnd, memo: &str) -> String {
        format!(
            "{}?acc={}&bank={}&amount={}&des={}",
            self.qr_template,
            self.account_number,
            self.bank_code,
            amount.value(),
            urlencoding::encode(memo)
        )
    }
}

fn env_i64(var: &str, default: i64) -> i64 {
    match env::var(var) {
        Ok(s) => s.parse::<i64>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {var}: {e}. Using the default, {default}.");
            default
        }),
        Err(_) => default,
    }
}
