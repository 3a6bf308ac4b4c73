//! Digest rendering and SMTP delivery.
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use tracing::debug;

use crate::config::Mail;
use crate::db::DigestEntry;

/// Subject line of every digest mail.
pub const DIGEST_SUBJECT: &str = "Discourse Notifier";

/// Anything that can deliver a rendered digest to one recipient.
#[async_trait]
pub trait MailSink: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<()>;
}

/// Render the plain-text digest body for one user.
///
/// A section appears only when it has entries; names are listed in
/// lexicographic order, one bullet per line.
pub fn render_digest(entry: &DigestEntry) -> String {
    let mut body = String::new();
    if !entry.categories.is_empty() {
        body.push_str("\nCategories\n==========\n\n");
        for name in &entry.categories {
            body.push_str(&format!("* {}\n", name));
        }
    }
    if !entry.tags.is_empty() {
        body.push_str("\nTags\n==========\n\n");
        for name in &entry.tags {
            body.push_str(&format!("* {}\n", name));
        }
    }
    body
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    pub fn from_config(cfg: &Mail) -> Result<Self> {
        let from: Mailbox = cfg.from.parse().context("invalid mail.from address")?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
            .context("failed to create SMTP transport")?
            .port(cfg.smtp_port);
        if !cfg.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.smtp_username.clone(),
                cfg.smtp_password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailSink for SmtpMailer {
    async fn send(&self, to: &str, body: &str) -> Result<()> {
        let recipient: Mailbox = to
            .parse()
            .with_context(|| format!("invalid recipient address {}", to))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(DIGEST_SUBJECT)
            .body(body.to_string())
            .context("failed to build digest message")?;
        self.transport
            .send(message)
            .await
            .context("failed to hand message to SMTP relay")?;
        debug!("delivered digest to {}", to);
        Ok(())
    }
}
