use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::ContactForm;
use crate::services::notifications::{self, escape_html, Email};
use crate::state::AppState;

use super::now;

// POST /api/contact
pub async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Json(form): Json<ContactForm>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    form.validate().map_err(AppError::BadRequest)?;

    let email_sent = if state.config.business_email.is_empty() {
        tracing::warn!("BUSINESS_EMAIL not set, contact message stored only");
        false
    } else {
        let email = contact_email(&form, &state.config.business_email);
        notifications::send_logged(&state, &email, "contact").await
    };

    let id = {
        let conn = state.conn();
        queries::insert_contact_message(&conn, &form, email_sent, &now())?
    };
    tracing::info!(contact_id = id, email_sent, "contact message received");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": id, "received": true})),
    ))
}

fn contact_email(form: &ContactForm, business_email: &str) -> Email {
    Email {
        to: business_email.to_string(),
        subject: format!("New Contact Form Submission from {}", form.name.trim()),
        html: format!(
            "<html><body>\
             <h2>New Contact Form Submission</h2>\
             <p><strong>Name:</strong> {}</p>\
             <p><strong>Email:</strong> {}</p>\
             <p><strong>Phone:</strong> {}</p>\
             <p><strong>Message:</strong></p>\
             <p>{}</p>\
             </body></html>",
            escape_html(form.name.trim()),
            escape_html(form.email.trim()),
            escape_html(form.phone.trim()),
            escape_html(form.message.trim()),
        ),
    }
}
