pub mod mailgun;

use async_trait::async_trait;

use crate::models::service::format_price;
use crate::models::{Booking, Customer, Service};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Outcome of a best-effort send; failures are already logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub customer_sent: bool,
    pub business_sent: bool,
}

/// Sends the customer confirmation and the business alert for a confirmed
/// booking. Never fails: delivery problems are logged and reported.
pub async fn dispatch_confirmation(
    state: &AppState,
    booking: &Booking,
    service: &Service,
    customer: &Customer,
    payment_ref: Option<&str>,
) -> DispatchReport {
    let customer_sent = send_logged(state, &customer_confirmation(booking, service, customer), &booking.id).await;

    let business_sent = if state.config.business_email.is_empty() {
        tracing::warn!(booking_id = %booking.id, "BUSINESS_EMAIL not set, skipping booking alert");
        false
    } else {
        let alert = business_alert(booking, service, customer, payment_ref, &state.config.business_email);
        send_logged(state, &alert, &booking.id).await
    };

    DispatchReport {
        customer_sent,
        business_sent,
    }
}

/// Sends one email, logging instead of propagating failure.
pub async fn send_logged(state: &AppState, email: &Email, context: &str) -> bool {
    match state.mailer.send(email).await {
        Ok(()) => {
            tracing::info!(to = %email.to, context = %context, "email sent");
            true
        }
        Err(e) => {
            tracing::warn!(to = %email.to, context = %context, error = %e, "failed to send email");
            false
        }
    }
}

pub fn customer_confirmation(booking: &Booking, service: &Service, customer: &Customer) -> Email {
    let notes = booking
        .notes
        .as_deref()
        .filter(|n| !n.is_empty())
        .map(|n| format!("<p><strong>Special Notes:</strong> {}</p>", escape_html(n)))
        .unwrap_or_default();

    let html = format!(
        "<html><body>\
         <h2>Booking Confirmation</h2>\
         <p>Dear {name},</p>\
         <p>Thank you for your booking! Your appointment has been confirmed.</p>\
         <h3>Booking Details:</h3>\
         <ul>\
         <li><strong>Service:</strong> {service}</li>\
         <li><strong>Date &amp; Time:</strong> {when}</li>\
         <li><strong>Price:</strong> ${price}</li>\
         <li><strong>Reference:</strong> {id}</li>\
         </ul>\
         {notes}\
         <p>If you need to reschedule or cancel, please contact us at least 24 hours in advance.</p>\
         </body></html>",
        name = escape_html(&customer.name),
        service = escape_html(&service.name),
        when = booking.start_at.format("%B %d, %Y at %I:%M %p"),
        price = format_price(service.price_cents),
        id = booking.id,
    );

    Email {
        to: customer.email.clone(),
        subject: format!("Booking Confirmation - {}", service.name),
        html,
    }
}

pub fn business_alert(
    booking: &Booking,
    service: &Service,
    customer: &Customer,
    payment_ref: Option<&str>,
    business_email: &str,
) -> Email {
    let notes = booking
        .notes
        .as_deref()
        .filter(|n| !n.is_empty())
        .map(|n| format!("<p><strong>Customer Notes:</strong> {}</p>", escape_html(n)))
        .unwrap_or_default();

    let html = format!(
        "<html><body>\
         <h2>New Booking Received</h2>\
         <h3>Customer Information:</h3>\
         <ul>\
         <li><strong>Name:</strong> {name}</li>\
         <li><strong>Email:</strong> {email}</li>\
         <li><strong>Phone:</strong> {phone}</li>\
         </ul>\
         <h3>Booking Details:</h3>\
         <ul>\
         <li><strong>Service:</strong> {service}</li>\
         <li><strong>Date &amp; Time:</strong> {when}</li>\
         <li><strong>Price:</strong> ${price}</li>\
         <li><strong>Payment ID:</strong> {payment}</li>\
         </ul>\
         {notes}\
         </body></html>",
        name = escape_html(&customer.name),
        email = escape_html(&customer.email),
        phone = escape_html(&customer.phone),
        service = escape_html(&service.name),
        when = booking.start_at.format("%B %d, %Y at %I:%M %p"),
        price = format_price(service.price_cents),
        payment = escape_html(payment_ref.unwrap_or("n/a")),
    );

    Email {
        to: business_email.to_string(),
        subject: format!("New Booking: {} - {}", service.name, booking.start_at.format("%m/%d/%Y")),
        html,
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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
