/// Subject, plain text and HTML bodies of one message
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMail {
    pub subject: String,
    pub body: String,
    pub body_html: String,
}

pub const VERIFY_SUBJECT: &str = "Account Registration Verification";

// Minimal escaping for text placed inside HTML
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Verification mail sent after signup and on every resend request
pub fn verification_mail(name: &str, link: &str) -> RenderedMail {
    let body = format!(
        "Hi, {}.\n\
        Thank you for signing up.\n\
        Please open the link {} to verify your registration.\n\
        \n\
        Thank you.\n",
        name, link
    );

    let name = escape_html(name);
    let link = escape_html(link);
    let body_html = format!(
        "<p>Hi, {name}</p>\n\
        <p>Thank you for signing up.</p>\n\
        <p>Please open the link <a href=\"{link}\" target=\"_blank\">{link}</a> to verify your registration.</p>\n\
        <br>\n\
        <p>Thank you.</p>\n"
    );

    RenderedMail {
        subject: VERIFY_SUBJECT.to_string(),
        body,
        body_html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_mail_contents() {
        let link = "https://example.com/verify/abc123/";
        let mail = verification_mail("Cak Juice", link);

        assert_eq!(mail.subject, VERIFY_SUBJECT);
        assert!(mail.body.starts_with("Hi, Cak Juice."));
        assert!(mail.body.contains(link));
        assert!(mail.body_html.contains(&format!("<a href=\"{}\"", link)));
        assert!(mail.body_html.contains("<p>Hi, Cak Juice</p>"));
    }

    #[test]
    fn test_html_body_escapes_name() {
        let mail = verification_mail("<script>alert(1)</script>", "https://x.test/verify/a/");
        assert!(!mail.body_html.contains("<script>"));
        assert!(mail.body_html.contains("&lt;script&gt;"));
        // Plain text body is left as entered
        assert!(mail.body.contains("<script>"));
    }
}
