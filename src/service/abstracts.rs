use chrono::Utc;
use log::{info, warn};

use crate::{
    db::{ReviewApplied, ResubmitRecord, ReviewRecord},
    dto::{AbstractDetail, AbstractList, AbstractQuery, NewAbstractDto, ReviewAbstractDto, UpdateAbstractDto},
    errors::AppError,
    lifecycle::{self, ReviewAction, Transition},
    models::{Abstract, AbstractStatus},
    service::{auth::UserAuthData, emails},
    AppState,
};

pub async fn submit(
    state: &AppState,
    principal: &UserAuthData,
    dto: NewAbstractDto,
) -> Result<Abstract, AppError> {
    let new = dto.into_new_abstract(principal.user_id, Utc::now())?;
    let created = state.store.create_abstract(new).await?;
    info!("abstract {} submitted by user {}", created.id, principal.user_id);

    state.mail.dispatch(emails::submission_confirmation(
        &principal.email,
        &principal.fullname,
        &created.title,
        created.id,
    ));
    if let Some(admin) = &state.config.admin_email {
        state.mail.dispatch(emails::admin_new_submission(
            admin,
            &principal.fullname,
            &created.title,
            created.id,
        ));
    }
    Ok(created)
}

pub async fn review(
    state: &AppState,
    principal: &UserAuthData,
    abstract_id: i64,
    dto: ReviewAbstractDto,
) -> Result<ReviewApplied, AppError> {
    principal.require_admin()?;
    if dto.admin_id.is_some_and(|id| id != principal.user_id) {
        return Err(AppError::forbidden("admin_id does not match the signed-in admin"));
    }
    let action = ReviewAction::parse(&dto.action)
        .ok_or_else(|| AppError::validation("action must be 'approve' or 'reject'"))?;

    let current = state
        .store
        .abstract_by_id(abstract_id)
        .await?
        .ok_or_else(|| AppError::not_found("abstract"))?;
    lifecycle::next_status(current.status, action.transition())?;

    let feedback = dto
        .feedback
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
    if action == ReviewAction::Reject && feedback.is_none() {
        warn!("abstract {} rejected without feedback", abstract_id);
    }

    let verdict = match action {
        ReviewAction::Approve => "approved",
        ReviewAction::Reject => "rejected",
    };
    let notification = match &feedback {
        Some(f) => format!("Your abstract '{}' has been {}. Feedback: {}", current.title, verdict, f),
        None => format!("Your abstract '{}' has been {}.", current.title, verdict),
    };

    let applied = state
        .store
        .apply_review(ReviewRecord {
            abstract_id,
            admin_id: principal.user_id,
            action,
            feedback: feedback.clone(),
            notification,
            at: Utc::now(),
        })
        .await?;
    info!(
        "abstract {} {} by admin {}",
        abstract_id, applied.abstract_.status, principal.user_id
    );

    match state.store.user_by_id(applied.abstract_.author_id).await? {
        Some(author) => state.mail.dispatch(emails::review_outcome(
            &author.email,
            &author.fullname,
            &applied.abstract_.title,
            action,
            feedback.as_deref(),
        )),
        None => warn!("author of abstract {} is gone, no review mail", abstract_id),
    }
    Ok(applied)
}

pub async fn resubmit(
    state: &AppState,
    principal: &UserAuthData,
    abstract_id: i64,
    dto: UpdateAbstractDto,
) -> Result<Abstract, AppError> {
    let current = state
        .store
        .abstract_by_id(abstract_id)
        .await?
        .ok_or_else(|| AppError::not_found("abstract"))?;
    if current.author_id != principal.user_id {
        return Err(AppError::forbidden("only the author may resubmit this abstract"));
    }
    lifecycle::next_status(current.status, Transition::Resubmit)?;

    let now = Utc::now();
    let changes = dto.into_changes(now)?;
    let updated = state
        .store
        .apply_resubmission(ResubmitRecord {
            abstract_id,
            author_id: principal.user_id,
            changes,
            notification: format!("Your abstract '{}' was resubmitted for review.", current.title),
            at: now,
        })
        .await?;
    info!("abstract {} resubmitted by user {}", abstract_id, principal.user_id);

    if let Some(admin) = &state.config.admin_email {
        state.mail.dispatch(emails::admin_resubmission(
            admin,
            &principal.fullname,
            &updated.title,
            updated.id,
        ));
    }
    Ok(updated)
}

fn can_see_unpublished(viewer: Option<&UserAuthData>, abstract_: &Abstract) -> bool {
    viewer.is_some_and(|v| v.is_admin() || v.user_id == abstract_.author_id)
}

/// Published abstracts are public; anything else is visible to its author
/// and to admins only, and reads as missing to everyone else.
pub async fn get(
    state: &AppState,
    viewer: Option<&UserAuthData>,
    abstract_id: i64,
) -> Result<AbstractDetail, AppError> {
    let found = state
        .store
        .abstract_by_id(abstract_id)
        .await?
        .ok_or_else(|| AppError::not_found("abstract"))?;
    let privileged = can_see_unpublished(viewer, &found);
    if found.status != AbstractStatus::Published && !privileged {
        return Err(AppError::not_found("abstract"));
    }
    let feedback = if privileged {
        state.store.feedback_for(&[found.id]).await?
    } else {
        Vec::new()
    };
    Ok(AbstractDetail {
        abstract_: found,
        feedback,
    })
}

pub async fn list(
    state: &AppState,
    viewer: Option<&UserAuthData>,
    query: &AbstractQuery,
) -> Result<AbstractList, AppError> {
    let mut filter = query.to_filter()?;
    let requested = query.requested_status()?;
    let is_admin = viewer.is_some_and(UserAuthData::is_admin);
    filter.status = match requested {
        status if is_admin => status,
        None | Some(AbstractStatus::Published) => Some(AbstractStatus::Published),
        Some(_) => return Err(AppError::forbidden("only admins may list unpublished abstracts")),
    };
    let abstracts = state.store.list_abstracts(&filter).await?;
    Ok(AbstractList {
        count: abstracts.len(),
        abstracts,
        limit: filter.limit,
        offset: filter.offset,
    })
}

pub async fn search(
    state: &AppState,
    viewer: Option<&UserAuthData>,
    query: &AbstractQuery,
) -> Result<AbstractList, AppError> {
    if query.q.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(AppError::validation("search query 'q' is required"));
    }
    list(state, viewer, query).await
}
