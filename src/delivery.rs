use std::fs;
use std::path::PathBuf;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;
use thiserror::Error;

use crate::config::AppConfig;
use crate::report::Report;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("unable to write report to {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("missing smtp setting: {0}")]
    MissingSetting(&'static str),
    #[error("invalid address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("unable to build message: {0}")]
    Message(String),
    #[error("smtp error: {0}")]
    Smtp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReceipt {
    Saved(PathBuf),
    Sent { recipient: String },
}

/// Where a finished report goes.
pub trait Delivery: Send + Sync {
    fn describe(&self) -> String;
    fn deliver(&self, report: &Report) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Writes the report into a directory under its own file name.
pub struct FileDelivery {
    dir: PathBuf,
}

impl FileDelivery {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl Delivery for FileDelivery {
    fn describe(&self) -> String {
        format!("file:{}", self.dir.display())
    }

    fn deliver(&self, report: &Report) -> Result<DeliveryReceipt, DeliveryError> {
        let path = self.dir.join(&report.file_name);
        fs::create_dir_all(&self.dir).map_err(|source| DeliveryError::Io {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&path, &report.html).map_err(|source| DeliveryError::Io {
            path: path.clone(),
            source,
        })?;
        info!("report saved to {}", path.display());
        Ok(DeliveryReceipt::Saved(path))
    }
}

/// Mails the report as an HTML attachment over SMTP with STARTTLS.
pub struct SmtpDelivery {
    host: String,
    port: u16,
    username: String,
    password: String,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpDelivery {
    pub fn from_config(config: &AppConfig) -> Result<Self, DeliveryError> {
        let host = required(&config.smtp_host, "smtp_host")?;
        let username = required(&config.smtp_username, "smtp_username")?;
        let password = required(&config.smtp_password, "smtp_password")?;
        let recipient = required(&config.recipient, "recipient")?;
        let from = config
            .smtp_from
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(username.as_str())
            .to_string();

        Ok(Self {
            host,
            port: config.smtp_port,
            from: parse_mailbox(&from)?,
            to: parse_mailbox(&recipient)?,
            username,
            password,
        })
    }

    pub fn build_message(&self, report: &Report) -> Result<Message, DeliveryError> {
        let attachment = Attachment::new(report.file_name.clone())
            .body(report.html.clone(), ContentType::TEXT_HTML);
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(report.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(summary_text(report)))
                    .singlepart(attachment),
            )
            .map_err(|err| DeliveryError::Message(err.to_string()))
    }
}

impl Delivery for SmtpDelivery {
    fn describe(&self) -> String {
        format!("smtp:{}", self.to)
    }

    fn deliver(&self, report: &Report) -> Result<DeliveryReceipt, DeliveryError> {
        let message = self.build_message(report)?;
        let mailer = SmtpTransport::starttls_relay(&self.host)
            .map_err(|err| DeliveryError::Smtp(err.to_string()))?
            .port(self.port)
            .credentials(Credentials::new(
                self.username.clone(),
                self.password.clone(),
            ))
            .build();
        mailer
            .send(&message)
            .map_err(|err| DeliveryError::Smtp(err.to_string()))?;
        info!("report mailed to {}", self.to);
        Ok(DeliveryReceipt::Sent {
            recipient: self.to.email.to_string(),
        })
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, DeliveryError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(DeliveryError::MissingSetting(name))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|err: lettre::address::AddressError| {
        DeliveryError::Address {
            address: address.to_string(),
            reason: err.to_string(),
        }
    })
}

fn summary_text(report: &Report) -> String {
    format!(
        "{subject}\n\n{count} events found.\nThe full list is attached:\n{file}\n",
        subject = report.subject,
        count = report.event_count,
        file = report.file_name,
    )
}
