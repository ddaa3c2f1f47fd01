use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use mailprobe::{ProbeStrategy, VerificationConfig};

#[derive(Parser)]
#[command(name = "mailprobe-cli", version, about = "Probe email deliverability over SMTP/IMAP")]
pub struct Cli {
    /// input CSV file with a header row
    pub input: PathBuf,

    /// header name of the column holding candidate addresses
    #[arg(long, default_value = "Email")]
    pub column: String,

    /// first data row to process (1-based, inclusive)
    #[arg(long, default_value_t = 1)]
    pub start_row: usize,

    /// last data row to process (inclusive); defaults to the last row
    #[arg(long)]
    pub end_row: Option<usize>,

    /// strategy: probe|send-bounce
    #[arg(long, default_value = "probe")]
    pub strategy: String,

    /// mail account identity (envelope sender, SMTP AUTH and IMAP login)
    #[arg(long, env = "MAILPROBE_ACCOUNT")]
    pub account: String,

    /// app password for the account
    #[arg(long, env = "MAILPROBE_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[arg(long, default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    #[arg(long, default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, default_value = "imap.gmail.com")]
    pub imap_host: String,

    #[arg(long, default_value_t = 993)]
    pub imap_port: u16,

    /// hostname announced in EHLO (defaults to the account's domain)
    #[arg(long)]
    pub helo: Option<String>,

    /// seconds to wait for a bounce notice (send-bounce strategy)
    #[arg(long, default_value_t = 120)]
    pub bounce_wait: u64,

    /// seconds between mailbox scans during the bounce watch
    #[arg(long, default_value_t = 5)]
    pub poll_interval: u64,

    /// seconds to let the probe message transit before the first scan
    #[arg(long, default_value_t = 10)]
    pub settle_delay: u64,

    /// minimum seconds between consecutive probe starts
    #[arg(long, default_value_t = 10)]
    pub probe_delay: u64,

    /// per-operation network timeout in seconds (0 disables)
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// allow a relay that does not offer STARTTLS
    #[arg(long)]
    pub allow_plaintext: bool,

    /// directory for the output artifacts (defaults to the input's directory)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// also print the full report as JSON to stdout
    #[arg(long)]
    pub json: bool,
}

pub fn strategy_from_str(s: &str) -> Result<ProbeStrategy> {
    match s {
        "probe" => Ok(ProbeStrategy::ProbeOnly),
        "send-bounce" => Ok(ProbeStrategy::SendAndWait),
        other => bail!("unknown --strategy '{other}', use: probe|send-bounce"),
    }
}

impl Cli {
    pub fn to_config(&self) -> Result<VerificationConfig> {
        Ok(VerificationConfig {
            account: self.account.clone(),
            password: self.password.clone(),
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            imap_host: self.imap_host.clone(),
            imap_port: self.imap_port,
            helo_domain: self.helo.clone(),
            strategy: strategy_from_str(&self.strategy)?,
            bounce_wait: Duration::from_secs(self.bounce_wait),
            poll_interval: Duration::from_secs(self.poll_interval),
            settle_delay: Duration::from_secs(self.settle_delay),
            probe_delay: Duration::from_secs(self.probe_delay),
            command_timeout: Duration::from_secs(self.timeout),
            require_starttls: !self.allow_plaintext,
        })
    }
}
