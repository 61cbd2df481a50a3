//! HTML page handlers.
//!
//! Method and login requirements are enforced by the gate before these run;
//! routes with `Access::Page` can rely on `Extension<CurrentUser>`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, Redirect},
    Extension, Form,
};
use axum_extra::extract::cookie::CookieJar;

use crate::accounts::{self, AccountError};
use crate::news::{Article, NewsError};
use crate::secrets::NEWS_API_KEY;
use crate::util::{internal_error, safe_redirect_target};

use super::routes::AppState;
use super::session::{self, CurrentUser};
use super::types::{LoginForm, NextQuery, RegisterForm};
use super::views;

type PageResult<T> = Result<T, (StatusCode, String)>;

/// Fetch headlines with the current news key. Upstream failures degrade to an
/// empty list; an unresolvable key is a server error.
async fn headlines(state: &AppState, category: Option<&str>) -> PageResult<Vec<Article>> {
    let key = state
        .secrets
        .resolve(&NEWS_API_KEY)
        .await
        .map_err(internal_error)?;

    match state.news.top_headlines(key.expose(), category).await {
        Ok(articles) => Ok(articles),
        Err(NewsError::Unauthorized) => {
            tracing::warn!(
                "News API rejected key from {}; dropping cached key",
                key.source.label()
            );
            state.secrets.invalidate(NEWS_API_KEY.name).await;
            Ok(Vec::new())
        }
        Err(e) => {
            tracing::warn!("Headlines unavailable: {}", e);
            Ok(Vec::new())
        }
    }
}

pub async fn home(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> PageResult<(CookieJar, Html<String>)> {
    let articles = headlines(&state, None).await?;
    let ads = state.db.list_advertisements().await.map_err(internal_error)?;
    let subscribed = state.db.is_subscribed(user.id).await.map_err(internal_error)?;
    let (jar, flash) = session::take_flash(jar);
    Ok((
        jar,
        Html(views::home(&user, &articles, &ads, subscribed, flash.as_deref())),
    ))
}

pub async fn category(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(name): Path<String>,
) -> PageResult<Html<String>> {
    let name = name.to_lowercase();
    let articles = headlines(&state, Some(&name)).await?;
    let ads = state.db.list_advertisements().await.map_err(internal_error)?;
    Ok(Html(views::category(&user, &name, &articles, &ads)))
}

pub async fn login_page(Query(query): Query<NextQuery>) -> Html<String> {
    Html(views::login(
        None,
        safe_redirect_target(query.next.as_deref()),
    ))
}

pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> PageResult<Result<(CookieJar, Redirect), Html<String>>> {
    let next = safe_redirect_target(form.next.as_deref());
    match accounts::authenticate(&state.db, &form.username, &form.password).await {
        Ok(user) => {
            let jar = state.sessions.login(jar, &user).map_err(internal_error)?;
            tracing::info!("User {} logged in", user.username);
            Ok(Ok((jar, Redirect::to(next.unwrap_or("/")))))
        }
        Err(AccountError::InvalidCredentials) => {
            tracing::debug!("Failed login for {:?}", form.username);
            Ok(Err(Html(views::login(
                Some(&AccountError::InvalidCredentials.to_string()),
                next,
            ))))
        }
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn register_page() -> Html<String> {
    Html(views::register(&[]))
}

pub async fn register_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> PageResult<Result<(CookieJar, Redirect), Html<String>>> {
    if form.password1 != form.password2 {
        return Ok(Err(Html(views::register(&[
            AccountError::PasswordMismatch.to_string()
        ]))));
    }

    match accounts::register(&state.db, &form.registration()).await {
        Ok(user) => {
            let jar = state.sessions.login(jar, &user).map_err(internal_error)?;
            Ok(Ok((jar, Redirect::to("/"))))
        }
        Err(AccountError::Invalid(errors)) => {
            let messages: Vec<String> = errors.into_values().flatten().collect();
            Ok(Err(Html(views::register(&messages))))
        }
        Err(e @ AccountError::DuplicateAccount) => Ok(Err(Html(views::register(&[e.to_string()])))),
        Err(e) => Err(internal_error(e)),
    }
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    (session::logout(jar), Redirect::to("/login"))
}

pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> PageResult<(CookieJar, Redirect)> {
    let changed = state.db.unsubscribe(user.id).await.map_err(internal_error)?;
    let jar = if changed {
        tracing::info!("User {} unsubscribed", user.username);
        session::flash(jar, "Unsubscribed.")
    } else {
        jar
    };
    Ok((jar, Redirect::to("/")))
}

pub async fn subscription_page(Extension(user): Extension<CurrentUser>) -> Html<String> {
    Html(views::payment(&user))
}

pub async fn process_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> PageResult<(CookieJar, Redirect)> {
    state.db.subscribe(user.id).await.map_err(internal_error)?;
    tracing::info!("User {} subscribed", user.username);
    Ok((
        session::flash(jar, "Successfully Subscribed!"),
        Redirect::to("/subscribe/success"),
    ))
}

pub async fn subscription_success(
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> (CookieJar, Html<String>) {
    let (jar, flash) = session::take_flash(jar);
    (jar, Html(views::subscription_success(&user, flash.as_deref())))
}
