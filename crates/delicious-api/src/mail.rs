use tracing::info;

#[derive(Debug, Clone)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Outbound mail transport.
pub trait Mailer: Send + Sync {
    fn send(&self, mail: &Mail) -> anyhow::Result<()>;
}

/// Writes every message to the log instead of delivering it.
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl Mailer for LogMailer {
    fn send(&self, mail: &Mail) -> anyhow::Result<()> {
        info!(
            from = %self.from,
            to = %mail.to,
            subject = %mail.subject,
            "Outgoing mail:\n{}",
            mail.text
        );
        Ok(())
    }
}

pub fn password_reset(name: &str, to: &str, reset_url: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Password Reset".to_string(),
        text: format!(
            "Hello {name},\n\n\
             You have requested a password reset. Please follow the link below \
             within the next hour to choose a new password:\n\n\
             {reset_url}\n\n\
             If you didn't request this email, please ignore it.\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_mail_carries_link() {
        let mail = password_reset("Wes", "wes@example.com", "http://localhost/account/reset/abc");
        assert_eq!(mail.to, "wes@example.com");
        assert!(mail.text.contains("Hello Wes"));
        assert!(mail.text.contains("http://localhost/account/reset/abc"));
    }
}
