use chrono::{Duration, Utc};
use log::{error, info, warn};

use crate::{
    db::{ConfirmOutcome, ConfirmPayment, NewCheckout},
    dto::{
        CallbackQuery, CallbackResponse, ConfirmPaymentDto, ConfirmPaymentResponse,
        InitiatePaymentDto, InitiatePaymentResponse,
    },
    errors::AppError,
    models::{AbstractStatus, PaymentStatus},
    service::{
        auth::UserAuthData,
        crypto, emails,
        gateway::{split_name, CheckoutRequest},
    },
    AppState,
};

pub const PAYMENT_METHOD: &str = "paychangu";

/// Opens a hosted checkout for the caller's abstract and records the
/// invoice and payment that will settle it. Nothing is stored unless the
/// gateway hands back a checkout link.
pub async fn initiate(
    state: &AppState,
    principal: &UserAuthData,
    dto: InitiatePaymentDto,
) -> Result<InitiatePaymentResponse, AppError> {
    let target = state
        .store
        .abstract_by_id(dto.abstract_id)
        .await?
        .ok_or_else(|| AppError::not_found("abstract"))?;
    if target.author_id != principal.user_id {
        return Err(AppError::forbidden("only the author may pay for this abstract"));
    }
    if matches!(target.status, AbstractStatus::Rejected | AbstractStatus::Published) {
        return Err(AppError::conflict(format!(
            "cannot pay for an abstract that is {}",
            target.status
        )));
    }

    let config = &state.config;
    let now = Utc::now();
    let tx_ref = crypto::transaction_reference(target.id, now);
    let (first_name, last_name) = split_name(&principal.fullname);
    let session = state
        .gateway
        .create_checkout(CheckoutRequest {
            tx_ref: tx_ref.clone(),
            amount: config.publication_fee,
            currency: config.publication_currency.clone(),
            email: principal.email.clone(),
            first_name,
            last_name,
            callback_url: format!("{}/api/payments/callback", config.api_base_url),
            return_url: format!("{}/dashboard", config.frontend_url),
            title: "Abstract publication fee".to_string(),
            description: format!("Publication fee for abstract #{}: {}", target.id, target.title),
        })
        .await
        .map_err(|err| {
            error!("checkout for abstract {} failed: {}", target.id, err);
            err
        })?;

    let (invoice, payment) = state
        .store
        .record_checkout(NewCheckout {
            abstract_id: target.id,
            amount: config.publication_fee,
            currency: config.publication_currency.clone(),
            method: PAYMENT_METHOD.to_string(),
            transaction_id: session.tx_ref.clone(),
            checkout_url: session.checkout_url.clone(),
            generated_at: now,
            due_date: now + Duration::days(config.invoice_due_days),
        })
        .await?;
    info!(
        "payment {} / invoice {} opened for abstract {} ({})",
        payment.id, invoice.id, target.id, payment.transaction_id
    );

    Ok(InitiatePaymentResponse {
        message: "checkout created".to_string(),
        checkout_url: session.checkout_url,
        tx_ref: payment.transaction_id.clone(),
        payment_id: payment.id,
        invoice_id: invoice.id,
        amount: payment.amount,
        currency: payment.currency,
    })
}

pub async fn confirm(
    state: &AppState,
    dto: ConfirmPaymentDto,
) -> Result<ConfirmPaymentResponse, AppError> {
    let payment_id = match (dto.payment_id, dto.tx_ref.as_deref().map(str::trim)) {
        (Some(id), _) => id,
        (None, Some(tx_ref)) if !tx_ref.is_empty() => {
            state
                .store
                .payment_by_transaction(tx_ref)
                .await?
                .ok_or_else(|| AppError::not_found("payment"))?
                .id
        }
        _ => return Err(AppError::validation("payment_id or tx_ref is required")),
    };
    settle(state, payment_id).await
}

/// Runs the confirmation transaction and mails the author once, on the
/// call that actually flipped the payment.
async fn settle(state: &AppState, payment_id: i64) -> Result<ConfirmPaymentResponse, AppError> {
    let outcome = state
        .store
        .confirm_payment(ConfirmPayment {
            payment_id,
            notification: "Your payment was confirmed and your abstract has been published.".to_string(),
            at: Utc::now(),
        })
        .await?;

    match outcome {
        ConfirmOutcome::Confirmed {
            payment,
            invoice,
            abstract_,
        } => {
            info!(
                "payment {} confirmed, abstract {} is {}",
                payment.id, abstract_.id, abstract_.status
            );
            match state.store.user_by_id(abstract_.author_id).await? {
                Some(author) => state.mail.dispatch(emails::payment_confirmation(
                    &author.email,
                    &author.fullname,
                    payment.amount,
                    &payment.currency,
                    invoice.id,
                )),
                None => warn!("author of abstract {} is gone, no receipt sent", abstract_.id),
            }
            Ok(ConfirmPaymentResponse {
                message: "payment confirmed".to_string(),
                already_confirmed: false,
                payment,
                invoice: Some(invoice),
                abstract_,
            })
        }
        ConfirmOutcome::AlreadyConfirmed {
            payment,
            invoice,
            abstract_,
        } => {
            info!("payment {} was already confirmed", payment.id);
            Ok(ConfirmPaymentResponse {
                message: "payment already confirmed".to_string(),
                already_confirmed: true,
                payment,
                invoice,
                abstract_,
            })
        }
    }
}

fn reports_success(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_lowercase().as_str(),
        "success" | "successful" | "completed"
    )
}

/// Handles the redirect the gateway sends once checkout finishes. The
/// query string is never trusted on its own: settlement needs the
/// gateway's own verification.
pub async fn callback(state: &AppState, query: CallbackQuery) -> Result<CallbackResponse, AppError> {
    let tx_ref = query
        .tx_ref
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::validation("tx_ref is required"))?;

    if let Some(status) = query.status.as_deref() {
        if !reports_success(status) {
            info!("callback for {} reported '{}', nothing to do", tx_ref, status);
            return Ok(CallbackResponse {
                message: "payment was not completed".to_string(),
                tx_ref,
                confirmed: false,
            });
        }
    }

    let payment = state
        .store
        .payment_by_transaction(&tx_ref)
        .await?
        .ok_or_else(|| AppError::not_found("payment"))?;
    if payment.status == PaymentStatus::Confirmed {
        return Ok(CallbackResponse {
            message: "payment already confirmed".to_string(),
            tx_ref,
            confirmed: true,
        });
    }

    if !state.gateway.verify(&tx_ref).await? {
        warn!("gateway could not verify {}", tx_ref);
        return Ok(CallbackResponse {
            message: "payment could not be verified".to_string(),
            tx_ref,
            confirmed: false,
        });
    }

    settle(state, payment.id).await?;
    Ok(CallbackResponse {
        message: "payment confirmed".to_string(),
        tx_ref,
        confirmed: true,
    })
}
