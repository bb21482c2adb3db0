use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP mailer for marketplace notifications.
///
/// Built once at startup from SMTP_* env vars. When SMTP is not configured
/// the gateway runs without a mailer and email delivery is skipped with a
/// debug log, the same way the webhook notifier handles an empty URL list.
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl Mailer {
    pub fn new(
        host: &str,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .context("failed to configure SMTP relay")?;

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from: from.to_string(),
        })
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse().context("invalid SMTP_FROM address")?)
            .to(to.parse().with_context(|| format!("invalid recipient address: {}", to))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build email")?;

        let response = self
            .transport
            .send(message)
            .await
            .context("smtp send failed")?;

        if !response.is_positive() {
            anyhow::bail!("smtp rejected message: {:?}", response.code());
        }

        tracing::info!(to, subject, "notification email sent");
        Ok(())
    }
}
