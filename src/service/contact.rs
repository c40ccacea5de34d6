use chrono::Utc;
use log::info;
use validator::Validate;

use crate::{
    db::NewContact,
    dto::ContactDto,
    errors::AppError,
    models::ContactMessage,
    service::emails,
    AppState,
};

pub async fn submit(state: &AppState, dto: ContactDto) -> Result<ContactMessage, AppError> {
    dto.validate()?;
    let contact = state
        .store
        .create_contact(NewContact {
            name: dto.name,
            email: dto.email.to_lowercase(),
            message: dto.message,
            created_at: Utc::now(),
        })
        .await?;
    info!("contact message {} from {}", contact.id, contact.email);

    state
        .mail
        .dispatch(emails::contact_confirmation(&contact.email, &contact.name));
    if let Some(admin) = &state.config.admin_email {
        state.mail.dispatch(emails::contact_admin(
            admin,
            &contact.name,
            &contact.email,
            &contact.message,
            contact.id,
        ));
    }
    Ok(contact)
}
