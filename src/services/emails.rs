//! Message bodies for account emails.

/// A rendered message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

const TOKEN_BLOCK_STYLE: &str =
    "background:#f4f4f4;padding:10px;border-radius:5px;font-family:monospace;word-break:break-all;";

#[must_use]
pub fn verification(to: &str, token: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Verify your email address".to_string(),
        html_body: format!(
            "<h4>Verify your email</h4>\
             <p>Thanks for signing up. Enter this verification token to confirm your address:</p>\
             <div style=\"{TOKEN_BLOCK_STYLE}\">{token}</div>"
        ),
    }
}

#[must_use]
pub fn already_registered(to: &str, public_url: &str) -> OutgoingEmail {
    let public_url = public_url.trim_end_matches('/');
    OutgoingEmail {
        to: to.to_string(),
        subject: "This email is already registered".to_string(),
        html_body: format!(
            "<h4>Email already registered</h4>\
             <p>Someone tried to sign up with <strong>{to}</strong>, which already has an account.</p>\
             <p>If you have forgotten your password, visit the \
             <a href=\"{public_url}/account/forgot-password\">forgot password</a> page.</p>"
        ),
    }
}

#[must_use]
pub fn password_reset(to: &str, token: &str, valid_hours: u32) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Password reset request".to_string(),
        html_body: format!(
            "<h4>Reset your password</h4>\
             <p>Use this token to choose a new password:</p>\
             <div style=\"{TOKEN_BLOCK_STYLE}\">{token}</div>\
             <p>The token expires in {valid_hours} hours. \
             If you did not ask for a reset, ignore this message and your password stays the same.</p>"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_carries_token() {
        let email = verification("a@example.com", "abc123");
        assert_eq!(email.to, "a@example.com");
        assert!(email.html_body.contains("abc123"));
    }

    #[test]
    fn already_registered_links_to_forgot_password() {
        let email = already_registered("a@example.com", "https://app.example.com/");
        assert!(
            email
                .html_body
                .contains("https://app.example.com/account/forgot-password")
        );
    }
}
