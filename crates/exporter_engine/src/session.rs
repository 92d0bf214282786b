//! Authenticated session establishment. Login failure is one of the two
//! unrecoverable conditions for a run, so errors here abort the batch.

use std::time::Duration;

use export_logging::export_info;
use exporter_core::WorkflowStage;

use crate::errors::{ExportError, NotFound};
use crate::resolver::{resolve, wait_for_first, Candidate};
use crate::scope::{Query, TextMatch, UiNode, UiScope};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Logs into the site: username field (label first, input-shape fallbacks),
/// an optional "Next" step, password discovery across the page and its
/// frames, then submit.
pub async fn login(
    scope: &dyn UiScope,
    login_url: &str,
    credentials: &Credentials,
) -> Result<(), ExportError> {
    scope.goto(login_url).await?;
    scope.settle().await?;
    export_info!("logging in at {login_url}");

    let username = resolve(
        scope,
        "username field",
        &[
            Candidate::millis(Query::LabeledInput(TextMatch::contains("email")), 2000),
            Candidate::millis(Query::LabeledInput(TextMatch::contains("username")), 1500),
            Candidate::millis(Query::css("input[type='email']"), 1500),
            Candidate::millis(Query::css("input[name*='user' i]"), 1500),
            Candidate::millis(Query::css("input[type='text']"), 1500),
        ],
    )
    .await
    .map_err(|e| ExportError::at_stage(WorkflowStage::LoggingIn, e))?;
    scope.fill(&username, &credentials.username).await?;

    // Two-step logins put an intermediate "Next" between the fields.
    if let Some(next) = wait_for_first(
        scope,
        &Query::role("button", TextMatch::exact("Next")),
        Duration::from_millis(1500),
    )
    .await
    {
        if scope.click(&next).await.is_ok() {
            scope.settle().await?;
            tokio::time::sleep(Duration::from_millis(800)).await;
        }
    }

    let password = match find_password_field(scope).await? {
        Some(node) => node,
        None => {
            // Sometimes a focus nudge is needed before the field renders.
            let _ = scope.press_key("Tab").await;
            tokio::time::sleep(Duration::from_millis(400)).await;
            find_password_field(scope).await?.ok_or_else(|| {
                ExportError::at_stage(WorkflowStage::LoggingIn, NotFound::new("password field"))
            })?
        }
    };
    scope.fill(&password, &credentials.password).await?;

    let submitted = submit_login(scope).await?;
    if !submitted {
        // Enter on the focused password field as the last resort.
        let _ = scope.press_key("Enter").await;
    }
    scope.settle().await?;
    export_info!("login complete");
    Ok(())
}

/// Probes the page and then every embedded frame for a password input.
async fn find_password_field(scope: &dyn UiScope) -> Result<Option<UiNode>, ExportError> {
    let candidates = [
        Candidate::millis(Query::LabeledInput(TextMatch::contains("password")), 3000),
        Candidate::millis(Query::css("input[type='password']"), 2000),
        Candidate::millis(Query::css("input[name*='pass' i]"), 1000),
    ];
    if let Ok(node) = resolve(scope, "password field", &candidates).await {
        return Ok(Some(node));
    }
    for frame in scope.frames().await? {
        if let Ok(node) = resolve(frame.as_ref(), "password field", &candidates).await {
            return Ok(Some(node));
        }
    }
    Ok(None)
}

async fn submit_login(scope: &dyn UiScope) -> Result<bool, ExportError> {
    let buttons = [
        Query::role("button", TextMatch::contains("sign in")),
        Query::role("button", TextMatch::contains("log in")),
        Query::role("button", TextMatch::contains("login")),
        Query::css("button[type='submit']"),
    ];
    for query in &buttons {
        if let Some(button) = wait_for_first(scope, query, Duration::from_millis(1000)).await {
            if scope.click(&button).await.is_ok() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
