/// Rendered email content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <body style="font-family: Arial, sans-serif; color: #222; max-width: 600px; margin: 0 auto;">
    <h2 style="color: #2b6cb0;">{title}</h2>
    {body}
    <p style="color: #888; font-size: 12px;">This is an automated message. Please do not reply.</p>
  </body>
</html>"#,
        title = escape(title),
    )
}

fn button(href: &str, label: &str) -> String {
    format!(
        r#"<p><a href="{href}" style="background: #2b6cb0; color: #fff; padding: 10px 18px; text-decoration: none; border-radius: 4px;">{label}</a></p>
    <p>If the button does not work, copy this link into your browser:<br>{href}</p>"#,
        href = escape(href),
        label = escape(label),
    )
}

pub fn verification(name: &str, link: &str, ttl_hours: i64) -> Template {
    let body = format!(
        "<p>Hi {name},</p>\n    <p>Thanks for signing up. Please confirm your email address.</p>\n    {button}\n    <p>This link expires in {ttl_hours} hours.</p>",
        name = escape(name),
        button = button(link, "Verify email"),
    );
    Template {
        subject: "Verify your email address".into(),
        html: layout("Verify your email", &body),
        text: format!(
            "Hi {name},\n\nConfirm your email address by opening this link:\n{link}\n\nThe link expires in {ttl_hours} hours."
        ),
    }
}

pub fn welcome(name: &str) -> Template {
    let body = format!(
        "<p>Hi {name},</p>\n    <p>Your email is verified and your account is ready to use.</p>",
        name = escape(name),
    );
    Template {
        subject: "Welcome aboard".into(),
        html: layout("Welcome!", &body),
        text: format!("Hi {name},\n\nYour email is verified and your account is ready to use."),
    }
}

pub fn password_reset(name: &str, link: &str, ttl_minutes: i64) -> Template {
    let body = format!(
        "<p>Hi {name},</p>\n    <p>We received a request to reset your password.</p>\n    {button}\n    <p>This link expires in {ttl_minutes} minutes. If you did not ask for a reset, ignore this email.</p>",
        name = escape(name),
        button = button(link, "Reset password"),
    );
    Template {
        subject: "Reset your password".into(),
        html: layout("Password reset", &body),
        text: format!(
            "Hi {name},\n\nReset your password with this link:\n{link}\n\nThe link expires in {ttl_minutes} minutes. If you did not ask for a reset, ignore this email."
        ),
    }
}

pub fn password_changed(name: &str) -> Template {
    let body = format!(
        "<p>Hi {name},</p>\n    <p>Your password was changed. If this was not you, reset your password immediately.</p>",
        name = escape(name),
    );
    Template {
        subject: "Your password was changed".into(),
        html: layout("Password changed", &body),
        text: format!(
            "Hi {name},\n\nYour password was changed. If this was not you, reset your password immediately."
        ),
    }
}

pub fn contact_received(name: &str, subject: &str) -> Template {
    let body = format!(
        "<p>Hi {name},</p>\n    <p>We received your message &ldquo;{subject}&rdquo; and will get back to you soon.</p>",
        name = escape(name),
        subject = escape(subject),
    );
    Template {
        subject: format!("We received your message: {subject}"),
        html: layout("Thanks for contacting us", &body),
        text: format!(
            "Hi {name},\n\nWe received your message \"{subject}\" and will get back to you soon."
        ),
    }
}

pub fn contact_reply(name: &str, subject: &str, original: &str, reply: &str) -> Template {
    let body = format!(
        "<p>Hi {name},</p>\n    <div style=\"white-space: pre-wrap;\">{reply}</div>\n    <hr>\n    <p style=\"color: #666;\">Your original message:</p>\n    <blockquote style=\"color: #666; white-space: pre-wrap;\">{original}</blockquote>",
        name = escape(name),
        reply = escape(reply),
        original = escape(original),
    );
    Template {
        subject: format!("Re: {subject}"),
        html: layout(&format!("Re: {subject}"), &body),
        text: format!("Hi {name},\n\n{reply}\n\n--- Your original message ---\n{original}"),
    }
}
