//! Server-rendered HTML pages.

use std::fmt::Write;

use crate::db::Advertisement;
use crate::news::Article;
use crate::util::capitalize;

use super::session::CurrentUser;

pub const CATEGORIES: &[&str] = &[
    "business",
    "entertainment",
    "general",
    "health",
    "science",
    "sports",
    "technology",
];

/// Escape text for HTML element content and quoted attributes.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Only http(s) links are rendered as hrefs.
fn safe_href(url: &str) -> Option<String> {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        Some(escape(url.trim()))
    } else {
        None
    }
}

fn layout(title: &str, user: Option<&CurrentUser>, flash: Option<&str>, body: &str) -> String {
    let mut nav = String::new();
    if let Some(user) = user {
        nav.push_str("<nav><a href=\"/\">Home</a>");
        for category in CATEGORIES {
            let _ = write!(
                nav,
                " <a href=\"/category/{}\">{}</a>",
                category,
                capitalize(category)
            );
        }
        let _ = write!(
            nav,
            " <span class=\"user\">{}</span>\
             <form method=\"post\" action=\"/logout\"><button type=\"submit\">Log out</button></form></nav>",
            escape(&user.username)
        );
    }
    let flash = flash
        .map(|m| format!("<div class=\"message\">{}</div>", escape(m)))
        .unwrap_or_default();
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{} | NewsTrends</title></head><body>{}{}<main>{}</main></body></html>",
        escape(title),
        nav,
        flash,
        body
    )
}

fn article_list(articles: &[Article]) -> String {
    if articles.is_empty() {
        return "<p class=\"empty\">No headlines available right now.</p>".to_string();
    }
    let mut out = String::from("<ul class=\"articles\">");
    for article in articles {
        let title = escape(article.title.as_deref().unwrap_or("Untitled"));
        out.push_str("<li>");
        match article.url.as_deref().and_then(safe_href) {
            Some(href) => {
                let _ = write!(out, "<a href=\"{}\" rel=\"noopener\">{}</a>", href, title);
            }
            None => out.push_str(&title),
        }
        if let Some(source) = article.source.name.as_deref() {
            let _ = write!(out, " <small>{}</small>", escape(source));
        }
        if let Some(description) = article.description.as_deref() {
            let _ = write!(out, "<p>{}</p>", escape(description));
        }
        out.push_str("</li>");
    }
    out.push_str("</ul>");
    out
}

fn ad_list(ads: &[Advertisement]) -> String {
    if ads.is_empty() {
        return String::new();
    }
    let mut out = String::from("<aside class=\"ads\">");
    for ad in ads {
        out.push_str("<div class=\"ad\">");
        if let Some(src) = ad.image_url.as_deref().and_then(safe_href) {
            let _ = write!(out, "<img src=\"{}\" alt=\"{}\">", src, escape(&ad.title));
        }
        match ad.target_url.as_deref().and_then(safe_href) {
            Some(href) => {
                let _ = write!(out, "<a href=\"{}\">{}</a>", href, escape(&ad.title));
            }
            None => {
                let _ = write!(out, "<strong>{}</strong>", escape(&ad.title));
            }
        }
        let _ = write!(out, "<p>{}</p></div>", escape(&ad.description));
    }
    out.push_str("</aside>");
    out
}

fn subscription_box(subscribed: bool) -> &'static str {
    if subscribed {
        "<form method=\"post\" action=\"/unsubscribe\"><button type=\"submit\">Unsubscribe</button></form>"
    } else {
        "<a class=\"subscribe\" href=\"/subscribe\">Subscribe</a>"
    }
}

pub fn home(
    user: &CurrentUser,
    articles: &[Article],
    ads: &[Advertisement],
    subscribed: bool,
    flash: Option<&str>,
) -> String {
    let body = format!(
        "<h1>Top Headlines</h1>{}{}{}",
        subscription_box(subscribed),
        article_list(articles),
        ad_list(ads)
    );
    layout("Home", Some(user), flash, &body)
}

pub fn category(
    user: &CurrentUser,
    category: &str,
    articles: &[Article],
    ads: &[Advertisement],
) -> String {
    let title = capitalize(category);
    let body = format!(
        "<h1>{}</h1>{}{}",
        escape(&title),
        article_list(articles),
        ad_list(ads)
    );
    layout(&title, Some(user), None, &body)
}

pub fn login(error: Option<&str>, next: Option<&str>) -> String {
    let next = next
        .map(|n| format!("<input type=\"hidden\" name=\"next\" value=\"{}\">", escape(n)))
        .unwrap_or_default();
    let body = format!(
        "<h1>Log in</h1><form method=\"post\" action=\"/login\">{}\
         <label>Username <input name=\"username\" required></label>\
         <label>Password <input type=\"password\" name=\"password\" required></label>\
         <button type=\"submit\">Log in</button></form>\
         <p><a href=\"/register\">Create an account</a></p>",
        next
    );
    layout("Log in", None, error, &body)
}

pub fn register(errors: &[String]) -> String {
    let errors = if errors.is_empty() {
        String::new()
    } else {
        let items: String = errors
            .iter()
            .map(|e| format!("<li>{}</li>", escape(e)))
            .collect();
        format!("<ul class=\"errors\">{}</ul>", items)
    };
    let body = format!(
        "<h1>Register</h1>{}<form method=\"post\" action=\"/register\">\
         <label>Username <input name=\"username\" required></label>\
         <label>Email <input type=\"email\" name=\"email\"></label>\
         <label>Password <input type=\"password\" name=\"password1\" required></label>\
         <label>Confirm password <input type=\"password\" name=\"password2\" required></label>\
         <button type=\"submit\">Register</button></form>\
         <p><a href=\"/login\">Already have an account?</a></p>",
        errors
    );
    layout("Register", None, None, &body)
}

pub fn payment(user: &CurrentUser) -> String {
    let body = "<h1>Subscribe</h1><p>Get the daily digest of top headlines.</p>\
                <form method=\"post\" action=\"/subscribe/process\">\
                <button type=\"submit\">Subscribe</button></form>";
    layout("Subscribe", Some(user), None, body)
}

pub fn subscription_success(user: &CurrentUser, flash: Option<&str>) -> String {
    let body = "<h1>Thank you</h1><p>Your subscription is active.</p><a href=\"/\">Back to headlines</a>";
    layout("Subscribed", Some(user), flash, body)
}
