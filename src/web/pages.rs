//! Server-rendered HTML pages

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::geoip::GeoRecord;

/// Values every page shows about the visitor
pub struct VisitorView<'a> {
    pub ip: &'a str,
    pub geo: &'a GeoRecord,
    pub session_id: &'a str,
}

fn layout(title: &str, view: &VisitorView<'_>, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body data-session-id="{session_attr}">
<nav><a href="/">Home</a> <a href="/mw">Search</a> <a href="/analytics">Analytics</a></nav>
<main>
{body}
</main>
<footer>
<p>Visitor: {ip} &middot; {city}, {region}, {country} ({lat:.4}, {lon:.4}) &middot; session <code>{session}</code></p>
</footer>
<script src="/static/tracker.js"></script>
</body>
</html>
"#,
        title = text(title),
        session_attr = attr(view.session_id),
        body = body,
        ip = text(view.ip),
        city = text(&view.geo.city),
        region = text(&view.geo.region),
        country = text(&view.geo.country),
        lat = view.geo.latitude,
        lon = view.geo.longitude,
        session = text(view.session_id),
    )
}

pub fn index(view: &VisitorView<'_>) -> String {
    let body = format!(
        r#"<h1>Welcome</h1>
<p>You are visiting from <strong>{city}, {country}</strong>.</p>
<p><a href="/mw" data-track="nav-search">Start searching</a></p>"#,
        city = text(&view.geo.city),
        country = text(&view.geo.country),
    );
    layout("Home", view, &body)
}

pub fn mw(view: &VisitorView<'_>, query: &str) -> String {
    let results = if query.is_empty() {
        String::new()
    } else {
        format!("<p>Showing results for <em>{}</em>.</p>", text(query))
    };
    let body = format!(
        r#"<h1>Search</h1>
<form method="get" action="/mw" data-track="search-form">
<input type="text" name="query" value="{query}" placeholder="Search businesses or places">
<select name="searchType">
<option>Business</option>
<option>Location</option>
<option>State</option>
</select>
<input type="text" name="category" placeholder="Category">
<input type="text" name="rating" placeholder="Min rating">
<input type="text" name="radius" placeholder="Radius (mi)">
<button type="submit">Search</button>
</form>
{results}"#,
        query = attr(query),
        results = results,
    );
    layout("Search", view, &body)
}

pub fn analytics(view: &VisitorView<'_>) -> String {
    let body = r#"<h1>Analytics</h1>
<form id="range">
<input type="date" name="startDate">
<input type="date" name="endDate">
<button type="submit">Load</button>
</form>
<section id="visitors"></section>
<section id="countries"></section>
<section id="searches"></section>
<script src="/static/dashboard.js"></script>"#;
    layout("Analytics", view, body)
}
