//! Text and HTML bodies for every message the portal sends.

use crate::{lifecycle::ReviewAction, service::mail::Email};

const TEAM: &str = "African Research Hub Team";
const SYSTEM: &str = "African Research Hub System";

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn html_page(body: &str) -> String {
    format!("<html><body>{body}</body></html>")
}

pub fn submission_confirmation(to: &str, author: &str, title: &str, abstract_id: i64) -> Email {
    Email {
        to: to.to_string(),
        subject: "Abstract Submission Confirmation - African Research Hub".to_string(),
        text: format!(
            "Hello {author}!\n\n\
             Thank you for submitting your abstract titled: \"{title}\"\n\n\
             Abstract ID: {abstract_id}\n\n\
             We will review your submission and get back to you as soon as possible.\n\n\
             Best regards,\n{TEAM}\n"
        ),
        html: html_page(&format!(
            "<h2>Hello {}!</h2>\
             <p>Thank you for submitting your abstract titled <strong>{}</strong>.</p>\
             <p><strong>Abstract ID:</strong> {abstract_id}</p>\
             <p>We will review your submission and get back to you as soon as possible.</p>\
             <p>Best regards,<br>{TEAM}</p>",
            escape(author),
            escape(title),
        )),
    }
}

pub fn admin_new_submission(to: &str, author: &str, title: &str, abstract_id: i64) -> Email {
    Email {
        to: to.to_string(),
        subject: "New Abstract Submission - African Research Hub".to_string(),
        text: format!(
            "New abstract submitted for review:\n\n\
             Title: {title}\nAuthor: {author}\nAbstract ID: {abstract_id}\n\n\
             Please log in to the admin dashboard to review.\n\n{SYSTEM}\n"
        ),
        html: html_page(&format!(
            "<h2>New Abstract Submission</h2>\
             <p><strong>Title:</strong> {}</p>\
             <p><strong>Author:</strong> {}</p>\
             <p><strong>Abstract ID:</strong> {abstract_id}</p>\
             <p>Please log in to the admin dashboard to review.</p><hr><p><em>{SYSTEM}</em></p>",
            escape(title),
            escape(author),
        )),
    }
}

pub fn review_outcome(
    to: &str,
    author: &str,
    title: &str,
    action: ReviewAction,
    feedback: Option<&str>,
) -> Email {
    let (subject, verdict, closing) = match action {
        ReviewAction::Approve => (
            "Abstract Approved - African Research Hub",
            "approved",
            "Congratulations! Your abstract has been accepted for publication.",
        ),
        ReviewAction::Reject => (
            "Abstract Review Update - African Research Hub",
            "rejected",
            "Please review the feedback and consider resubmitting with revisions.",
        ),
    };
    let text_feedback = feedback.map(|f| format!("Feedback: {f}\n\n")).unwrap_or_default();
    let html_feedback = feedback
        .map(|f| format!("<p><strong>Feedback:</strong> {}</p>", escape(f)))
        .unwrap_or_default();
    Email {
        to: to.to_string(),
        subject: subject.to_string(),
        text: format!(
            "Dear {author},\n\nYour abstract \"{title}\" has been {verdict}.\n\n\
             {text_feedback}{closing}\n\nBest regards,\n{TEAM}\n"
        ),
        html: html_page(&format!(
            "<h2>Dear {},</h2>\
             <p>Your abstract <strong>{}</strong> has been <strong>{verdict}</strong>.</p>\
             {html_feedback}<p>{closing}</p><p>Best regards,<br>{TEAM}</p>",
            escape(author),
            escape(title),
        )),
    }
}

pub fn admin_resubmission(to: &str, author: &str, title: &str, abstract_id: i64) -> Email {
    Email {
        to: to.to_string(),
        subject: "Abstract Resubmitted - African Research Hub".to_string(),
        text: format!(
            "An abstract was revised and resubmitted for review:\n\n\
             Title: {title}\nAuthor: {author}\nAbstract ID: {abstract_id}\n\n{SYSTEM}\n"
        ),
        html: html_page(&format!(
            "<h2>Abstract Resubmitted</h2>\
             <p><strong>Title:</strong> {}</p>\
             <p><strong>Author:</strong> {}</p>\
             <p><strong>Abstract ID:</strong> {abstract_id}</p><hr><p><em>{SYSTEM}</em></p>",
            escape(title),
            escape(author),
        )),
    }
}

pub fn payment_confirmation(
    to: &str,
    author: &str,
    amount: f64,
    currency: &str,
    invoice_id: i64,
) -> Email {
    Email {
        to: to.to_string(),
        subject: "Payment Confirmation - African Research Hub".to_string(),
        text: format!(
            "Dear {author},\n\n\
             Your payment of {currency} {amount:.2} has been successfully processed.\n\
             Invoice ID: {invoice_id}\n\n\
             Your abstract has been published. You can view it from your dashboard.\n\n\
             Best regards,\n{TEAM}\n"
        ),
        html: html_page(&format!(
            "<h2>Dear {},</h2>\
             <p>Your payment of <strong>{} {amount:.2}</strong> has been successfully processed.</p>\
             <p><strong>Invoice ID:</strong> {invoice_id}</p>\
             <p>Your abstract has been published. You can view it from your dashboard.</p>\
             <p>Best regards,<br>{TEAM}</p>",
            escape(author),
            escape(currency),
        )),
    }
}

pub fn password_reset(to: &str, fullname: &str, reset_url: &str, ttl_minutes: i64) -> Email {
    Email {
        to: to.to_string(),
        subject: "Reset Your Password - Conference Portal".to_string(),
        text: format!(
            "Dear {fullname},\n\n\
             You recently requested to reset your password.\n\n\
             Use the link below to choose a new one:\n{reset_url}\n\n\
             This link expires in {ttl_minutes} minutes.\n\n\
             If you did not request a password reset, ignore this email.\n\n\
             Best regards,\n{TEAM}\n"
        ),
        html: html_page(&format!(
            "<h2>Dear {},</h2>\
             <p>You recently requested to reset your password.</p>\
             <p><a href=\"{}\">Reset your password</a></p>\
             <p>This link expires in {ttl_minutes} minutes.</p>\
             <p>If you did not request a password reset, ignore this email.</p>\
             <p>Best regards,<br>{TEAM}</p>",
            escape(fullname),
            escape(reset_url),
        )),
    }
}

pub fn contact_confirmation(to: &str, name: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "We Received Your Message - African Research Hub".to_string(),
        text: format!(
            "Hello {name},\n\n\
             Thank you for contacting African Research Hub. We have received your message \
             and will get back to you within 24-48 hours.\n\n\
             Best regards,\nAfrican Research Hub Support Team\n"
        ),
        html: html_page(&format!(
            "<h2>Hello {},</h2>\
             <p>Thank you for contacting <strong>African Research Hub</strong>. We have received \
             your message and will get back to you within <strong>24-48 hours</strong>.</p>\
             <p>Best regards,<br><strong>African Research Hub Support Team</strong></p>",
            escape(name),
        )),
    }
}

pub fn contact_admin(to: &str, name: &str, email: &str, message: &str, contact_id: i64) -> Email {
    Email {
        to: to.to_string(),
        subject: "New Contact Inquiry - African Research Hub".to_string(),
        text: format!(
            "New contact inquiry received:\n\n\
             From: {name}\nEmail: {email}\nContact ID: {contact_id}\n\n\
             Message:\n{message}\n\n{SYSTEM}\n"
        ),
        html: html_page(&format!(
            "<h2>New Contact Inquiry</h2>\
             <p><strong>From:</strong> {}</p>\
             <p><strong>Email:</strong> <a href=\"mailto:{email_html}\">{email_html}</a></p>\
             <p><strong>Contact ID:</strong> {contact_id}</p>\
             <h3>Message:</h3><p>{}</p><hr><p><em>{SYSTEM}</em></p>",
            escape(name),
            escape(message),
            email_html = escape(email),
        )),
    }
}
